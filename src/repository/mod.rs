// ==========================================
// 通用导入引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 值一律参数化；表名/列名仅使用已校验的标识符
// ==========================================

pub mod dataset_repo;
pub mod error;
pub mod target_table_repo;

// 重导出核心仓储
pub use dataset_repo::{DatasetRepository, DatasetRepositoryImpl, ReferenceTable};
pub use error::{RepositoryError, RepositoryResult};
pub use target_table_repo::TargetTableRepository;
