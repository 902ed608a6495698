// ==========================================
// 通用导入引擎 - 配置层
// ==========================================
// 职责: 导入配置加载与校验、引擎设置
// 存储: import_config / import_strategy / config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use import_config_trait::{EngineSettings, ImportConfigReader};
