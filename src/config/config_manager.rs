// ==========================================
// 通用导入引擎 - 配置管理器
// ==========================================
// 职责: 导入配置加载与校验、引擎设置查询
// 存储: import_config / import_strategy / config_kv 表
// ==========================================

use crate::config::import_config_trait::{validate_import_config, EngineSettings, ImportConfigReader};
use crate::db::{open_shared_connection, SharedConnection};
use crate::domain::import_config::{ImportConfig, ImportStrategy, MetadataRule, TableRef};
use crate::domain::types::{FileFormat, MetadataSource, StrategyKind};
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

// ==========================================
// import_config 原始行
// ==========================================
struct ImportConfigRow {
    id: i64,
    data_source: String,
    dataset_type: String,
    source_directory: String,
    archive_directory: String,
    file_pattern: String,
    file_format: String,
    target_table: String,
    strategy_id: i64,
    label_source: String,
    label_location: Option<String>,
    filename_delimiter: String,
    date_source: String,
    date_location: Option<String>,
    date_format: Option<String>,
    is_active: bool,
    last_modified_at: Option<DateTime<Utc>>,
}

fn parse_source(field: &str, raw: &str) -> ImportResult<MetadataSource> {
    MetadataSource::parse(raw).ok_or_else(|| {
        ImportError::ValidationError(format!("{} 取值无效: {}", field, raw))
    })
}

impl ImportConfigRow {
    fn into_config(self) -> ImportResult<ImportConfig> {
        let file_format = FileFormat::parse(&self.file_format).ok_or_else(|| {
            ImportError::ValidationError(format!("未知的文件格式: {}", self.file_format))
        })?;
        let target_table = TableRef::parse(&self.target_table).ok_or_else(|| {
            ImportError::ValidationError(format!(
                "目标表必须为 schema.table 形式: {}",
                self.target_table
            ))
        })?;

        let config = ImportConfig {
            id: self.id,
            data_source: self.data_source,
            dataset_type: self.dataset_type,
            source_directory: PathBuf::from(self.source_directory),
            archive_directory: PathBuf::from(self.archive_directory),
            file_pattern: self.file_pattern,
            file_format,
            target_table,
            strategy_id: self.strategy_id,
            label_rule: MetadataRule {
                source: parse_source("label_source", &self.label_source)?,
                location: self.label_location,
            },
            filename_delimiter: self.filename_delimiter,
            date_rule: MetadataRule {
                source: parse_source("date_source", &self.date_source)?,
                location: self.date_location,
            },
            date_format: self.date_format,
            is_active: self.is_active,
            last_modified_at: self.last_modified_at,
        };
        validate_import_config(&config)?;
        Ok(config)
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: SharedConnection,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_shared_connection(db_path)?;
        Ok(Self { conn })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> ImportResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ImportError::LockError(format!("锁获取失败: {}", e)))
    }

    /// 从 config_kv 表读取配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> ImportResult<String> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入配置值（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> ImportResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有引擎设置的快照（key → value）
    pub fn get_config_snapshot(&self) -> ImportResult<BTreeMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn load_import_config(&self, config_id: i64) -> ImportResult<ImportConfig> {
        let row = {
            let conn = self.get_conn()?;
            conn.query_row(
                r#"
                SELECT id, data_source, dataset_type, source_directory, archive_directory,
                       file_pattern, file_format, target_table, strategy_id,
                       label_source, label_location, filename_delimiter,
                       date_source, date_location, date_format,
                       is_active, last_modified_at
                FROM import_config
                WHERE id = ?1
                "#,
                params![config_id],
                |row| {
                    Ok(ImportConfigRow {
                        id: row.get(0)?,
                        data_source: row.get(1)?,
                        dataset_type: row.get(2)?,
                        source_directory: row.get(3)?,
                        archive_directory: row.get(4)?,
                        file_pattern: row.get(5)?,
                        file_format: row.get(6)?,
                        target_table: row.get(7)?,
                        strategy_id: row.get(8)?,
                        label_source: row.get(9)?,
                        label_location: row.get(10)?,
                        filename_delimiter: row.get(11)?,
                        date_source: row.get(12)?,
                        date_location: row.get(13)?,
                        date_format: row.get(14)?,
                        is_active: row.get(15)?,
                        last_modified_at: row.get(16)?,
                    })
                },
            )
            .optional()?
        };

        let row = row.ok_or(ImportError::ConfigNotFound(config_id))?;
        if !row.is_active {
            warn!(config_id, "导入配置未启用");
            return Err(ImportError::ConfigNotFound(config_id));
        }

        let config = row.into_config()?;
        debug!(
            config_id,
            target_table = %config.target_table,
            file_format = %config.file_format,
            strategy_id = config.strategy_id,
            "导入配置已加载"
        );
        Ok(config)
    }

    async fn load_strategy(&self, strategy_id: i64) -> ImportResult<ImportStrategy> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, description FROM import_strategy WHERE id = ?1",
                params![strategy_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let (id, name, description) = row.ok_or(ImportError::StrategyNotFound(strategy_id))?;
        let kind = StrategyKind::from_id(id).ok_or(ImportError::StrategyNotFound(id))?;
        Ok(ImportStrategy {
            id,
            kind,
            name,
            description,
        })
    }

    async fn touch_last_modified(&self, config_id: i64, at: DateTime<Utc>) -> ImportResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE import_config SET last_modified_at = ?1 WHERE id = ?2",
            params![at, config_id],
        )?;
        if affected == 0 {
            return Err(ImportError::ConfigNotFound(config_id));
        }
        Ok(())
    }

    async fn engine_settings(&self) -> ImportResult<EngineSettings> {
        let defaults = EngineSettings::default();

        let raw_sample = self.get_config_or_default(
            config_keys::SAMPLE_SIZE,
            &defaults.sample_size.to_string(),
        )?;
        let sample_size = raw_sample
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ImportError::ConfigValueError {
                key: config_keys::SAMPLE_SIZE.to_string(),
                value: raw_sample.clone(),
                message: "必须为正整数".to_string(),
            })?;

        Ok(EngineSettings {
            sample_size,
            created_by: self.get_config_or_default(config_keys::CREATED_BY, &defaults.created_by)?,
            role_read_write: self
                .get_config_or_default(config_keys::ROLE_READ_WRITE, &defaults.role_read_write)?,
            role_read_only: self
                .get_config_or_default(config_keys::ROLE_READ_ONLY, &defaults.role_read_only)?,
            default_label: self
                .get_config_or_default(config_keys::DEFAULT_LABEL, &defaults.default_label)?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 采样
    pub const SAMPLE_SIZE: &str = "import.sample_size";

    // 审计
    pub const CREATED_BY: &str = "import.created_by";

    // 授权角色
    pub const ROLE_READ_WRITE: &str = "import.role_read_write";
    pub const ROLE_READ_ONLY: &str = "import.role_read_only";

    // 未匹配到文件时的数据集标签
    pub const DEFAULT_LABEL: &str = "import.default_label";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use std::sync::{Arc, Mutex};

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn insert_config(manager: &ConfigManager, source: &str, archive: &str, table: &str, active: bool) -> i64 {
        let conn = manager.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO import_config (
                data_source, dataset_type, source_directory, archive_directory,
                file_pattern, file_format, target_table, strategy_id, is_active
            ) VALUES ('erp', 'sales', ?1, ?2, '.*\.csv$', 'csv', ?3, 1, ?4)
            "#,
            params![source, archive, table, active],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[tokio::test]
    async fn test_engine_settings_defaults_and_overrides() {
        let manager = setup();
        assert_eq!(manager.engine_settings().await.unwrap(), EngineSettings::default());

        manager.set_config_value(config_keys::SAMPLE_SIZE, "10").unwrap();
        manager.set_config_value(config_keys::CREATED_BY, "nightly").unwrap();
        let settings = manager.engine_settings().await.unwrap();
        assert_eq!(settings.sample_size, 10);
        assert_eq!(settings.created_by, "nightly");

        manager.set_config_value(config_keys::SAMPLE_SIZE, "0").unwrap();
        let err = manager.engine_settings().await.unwrap_err();
        assert!(matches!(err, ImportError::ConfigValueError { .. }));
    }

    #[tokio::test]
    async fn test_load_import_config() {
        let manager = setup();
        let id = insert_config(&manager, "/data/in", "/data/archive", "main.sales", true);

        let config = manager.load_import_config(id).await.unwrap();
        assert_eq!(config.file_format, FileFormat::Csv);
        assert_eq!(config.target_table.table, "sales");
        assert_eq!(config.label_rule.source, MetadataSource::Filename);
        assert_eq!(config.filename_delimiter, "_");
    }

    #[tokio::test]
    async fn test_load_import_config_failures() {
        let manager = setup();
        let inactive = insert_config(&manager, "/in", "/archive", "main.sales", false);
        let same_dir = insert_config(&manager, "/in", "/in", "main.sales", true);
        let unqualified = insert_config(&manager, "/in", "/archive", "sales", true);

        assert!(matches!(
            manager.load_import_config(inactive).await.unwrap_err(),
            ImportError::ConfigNotFound(_)
        ));
        assert!(matches!(
            manager.load_import_config(999).await.unwrap_err(),
            ImportError::ConfigNotFound(999)
        ));
        assert!(manager.load_import_config(same_dir).await.unwrap_err().is_validation());
        assert!(manager.load_import_config(unqualified).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_load_strategy_and_touch() {
        let manager = setup();
        let strict = manager.load_strategy(3).await.unwrap();
        assert_eq!(strict.kind, StrategyKind::Strict);
        assert!(matches!(
            manager.load_strategy(4).await.unwrap_err(),
            ImportError::StrategyNotFound(4)
        ));

        let id = insert_config(&manager, "/in", "/archive", "main.sales", true);
        let now = Utc::now();
        manager.touch_last_modified(id, now).await.unwrap();
        let config = manager.load_import_config(id).await.unwrap();
        assert!(config.last_modified_at.is_some());
    }
}
