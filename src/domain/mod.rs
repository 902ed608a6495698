// ==========================================
// 通用导入引擎 - 领域模型层
// ==========================================
// 职责: 定义配置、数据集、记录与基础类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod dataset;
pub mod import_config;
pub mod record;
pub mod types;

// 重导出核心类型
pub use dataset::{Dataset, JobSummary, NewDataset, ReferenceIds};
pub use import_config::{ImportConfig, ImportStrategy, MetadataRule, TableRef};
pub use record::Record;
pub use types::{
    ColumnType, DatasetStatus, FileFormat, JobStage, MetadataSource, StrategyKind,
};
