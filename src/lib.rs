// ==========================================
// 通用导入引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 按配置将文件批量导入关系库，目标表结构随数据演进
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 抽取/转换/落库
pub mod importer;

// 配置层 - 导入配置与引擎设置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use config::{ConfigManager, EngineSettings, ImportConfigReader};
pub use domain::{Dataset, ImportConfig, JobSummary, Record, TableRef};
pub use importer::{ImportError, ImportJob, ImportResult, ImportRunner, RunOptions};
pub use repository::{DatasetRepositoryImpl, RepositoryError};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "通用导入引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
