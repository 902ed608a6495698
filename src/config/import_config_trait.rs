// ==========================================
// 通用导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入作业所需的配置读取接口（不包含实现）
// 红线: 除最后运行时间外，不写入导入配置
// ==========================================

use crate::domain::import_config::{ImportConfig, ImportStrategy};
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;

// ==========================================
// EngineSettings - 引擎级设置
// ==========================================
// 来源: config_kv 表（缺省时使用默认值）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub sample_size: usize,
    pub created_by: String,
    pub role_read_write: String,
    pub role_read_only: String,
    pub default_label: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_size: 5,
            created_by: "import_engine".to_string(),
            role_read_write: "import_rw".to_string(),
            role_read_only: "import_ro".to_string(),
            default_label: "generic_import".to_string(),
        }
    }
}

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入作业的配置读取接口
// 实现者: ConfigManager（import_config / import_strategy / config_kv 表）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 读取并校验导入配置
    ///
    /// # 返回
    /// - Ok(ImportConfig): 启用中的配置
    /// - Err(ConfigNotFound): 配置不存在或未启用
    /// - Err(ValidationError): 配置不满足不变量
    async fn load_import_config(&self, config_id: i64) -> ImportResult<ImportConfig>;

    /// 读取导入策略
    ///
    /// # 返回
    /// - Err(StrategyNotFound): 策略不存在
    async fn load_strategy(&self, strategy_id: i64) -> ImportResult<ImportStrategy>;

    /// 更新导入配置的最后运行时间
    async fn touch_last_modified(&self, config_id: i64, at: DateTime<Utc>) -> ImportResult<()>;

    /// 读取引擎级设置
    async fn engine_settings(&self) -> ImportResult<EngineSettings>;
}

/// 校验导入配置不变量
///
/// - 源目录与归档目录不同
/// - 文件名正则可编译
pub fn validate_import_config(config: &ImportConfig) -> ImportResult<()> {
    if config.source_directory == config.archive_directory {
        return Err(ImportError::ValidationError(format!(
            "源目录与归档目录相同: {}",
            config.source_directory.display()
        )));
    }

    Regex::new(&config.file_pattern).map_err(|e| {
        ImportError::ValidationError(format!("文件名正则无效 ({}): {}", config.file_pattern, e))
    })?;

    if config.filename_delimiter.is_empty() {
        return Err(ImportError::ValidationError(
            "文件名分隔符不能为空".to_string(),
        ));
    }
    Ok(())
}
