// ==========================================
// 通用导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 配置缺失 / 校验失败 / 抽取失败 / 落库失败 / 归档失败
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 配置错误（不可重试）=====
    #[error("导入配置不存在或未启用: config_id={0}")]
    ConfigNotFound(i64),

    #[error("导入策略不存在: strategy_id={0}")]
    StrategyNotFound(i64),

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 校验错误（本次运行致命）=====
    #[error("校验失败: {0}")]
    ValidationError(String),

    #[error("严格模式下发现未定义字段 (表 {table}): {}", .fields.join(", "))]
    UnexpectedFields { table: String, fields: Vec<String> },

    // ===== 文件相关错误 =====
    #[error("源目录不存在: {0}")]
    SourceDirectoryMissing(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件抽取失败 ({file}): {message}")]
    ExtractionError { file: String, message: String },

    // ===== 落库与结构变更错误 =====
    #[error("参照数据写入失败: {0}")]
    ReferenceDataError(String),

    #[error("表结构变更失败 ({table}): {message}")]
    SchemaError { table: String, message: String },

    #[error("数据写入失败 ({table}): {message}")]
    LoadError { table: String, message: String },

    // ===== 归档错误（非致命，仅记录日志）=====
    #[error("文件归档失败 ({file}): {message}")]
    ArchiveError { file: String, message: String },

    // ===== 数据库错误 =====
    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 构造抽取错误
    pub fn extraction(file: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ImportError::ExtractionError {
            file: file.into(),
            message: message.to_string(),
        }
    }

    /// 是否属于校验类错误（含严格模式字段校验）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ImportError::ValidationError(_) | ImportError::UnexpectedFields { .. }
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::DatabaseQueryError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
