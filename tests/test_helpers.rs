// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库/目录、导入配置写入、作业构造、结果查询
// ==========================================

#![allow(dead_code)]

use generic_import_engine::config::ConfigManager;
use generic_import_engine::db::{open_shared_connection, SharedConnection};
use generic_import_engine::importer::ImportJob;
use generic_import_engine::repository::DatasetRepositoryImpl;
use rusqlite::params;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ==========================================
// TestEnv - 单个测试的隔离环境
// ==========================================
// 数据库、源目录、归档目录均位于同一临时目录下
// （附加的 schema 数据库也落在这里）
pub struct TestEnv {
    _dir: TempDir,
    pub db_path: String,
    pub source_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub conn: SharedConnection,
}

impl TestEnv {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("import.db").to_string_lossy().to_string();
        let source_dir = dir.path().join("inbox");
        let archive_dir = dir.path().join("archive");
        fs::create_dir_all(&source_dir)?;

        let conn = open_shared_connection(&db_path)?;
        Ok(Self {
            _dir: dir,
            db_path,
            source_dir,
            archive_dir,
            conn,
        })
    }

    /// 在源目录写入文件
    pub fn write_source(&self, name: &str, content: &str) -> PathBuf {
        let path = self.source_dir.join(name);
        fs::write(&path, content).expect("Failed to write source file");
        path
    }

    /// 构造导入作业
    pub fn job(&self) -> ImportJob<DatasetRepositoryImpl, ConfigManager> {
        ImportJob::new(
            DatasetRepositoryImpl::new(self.conn.clone()),
            ConfigManager::from_connection(self.conn.clone()),
            self.conn.clone(),
        )
    }

    pub fn config_manager(&self) -> ConfigManager {
        ConfigManager::from_connection(self.conn.clone())
    }

    /// 写入导入配置
    pub fn insert_config(&self, config: &TestConfig) -> i64 {
        let conn = self.conn.lock().expect("Failed to lock connection");
        conn.execute(
            r#"
            INSERT INTO import_config (
                data_source, dataset_type, source_directory, archive_directory,
                file_pattern, file_format, target_table, strategy_id,
                label_source, label_location, filename_delimiter,
                date_source, date_location, date_format, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                config.data_source,
                config.dataset_type,
                self.source_dir.to_string_lossy(),
                self.archive_dir.to_string_lossy(),
                config.file_pattern,
                config.file_format,
                config.target_table,
                config.strategy_id,
                config.label_source,
                config.label_location,
                config.filename_delimiter,
                config.date_source,
                config.date_location,
                config.date_format,
                config.is_active,
            ],
        )
        .expect("Failed to insert import config");
        conn.last_insert_rowid()
    }

    /// 执行任意 DDL/DML
    pub fn execute_batch(&self, sql: &str) {
        let conn = self.conn.lock().expect("Failed to lock connection");
        conn.execute_batch(sql).expect("Failed to execute sql");
    }

    /// 目标表列名（按定义顺序）
    pub fn table_columns(&self, schema: &str, table: &str) -> Vec<String> {
        let conn = self.conn.lock().expect("Failed to lock connection");
        let mut stmt = conn
            .prepare(&format!("PRAGMA \"{}\".table_info(\"{}\")", schema, table))
            .expect("Failed to prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("Failed to query table_info");
        rows.map(|r| r.expect("Failed to read column")).collect()
    }

    /// 单值查询
    pub fn query_i64(&self, sql: &str) -> i64 {
        let conn = self.conn.lock().expect("Failed to lock connection");
        conn.query_row(sql, [], |row| row.get(0))
            .expect("Failed to query value")
    }

    pub fn query_string(&self, sql: &str) -> String {
        let conn = self.conn.lock().expect("Failed to lock connection");
        conn.query_row(sql, [], |row| row.get(0))
            .expect("Failed to query value")
    }

    pub fn dataset_status(&self, dataset_id: i64) -> String {
        self.query_string(&format!("SELECT status FROM dataset WHERE id = {}", dataset_id))
    }

    pub fn source_files(&self) -> Vec<String> {
        list_names(&self.source_dir)
    }

    pub fn archived_files(&self) -> Vec<String> {
        list_names(&self.archive_dir)
    }
}

fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

// ==========================================
// TestConfig - 导入配置构造器
// ==========================================
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub data_source: String,
    pub dataset_type: String,
    pub file_pattern: String,
    pub file_format: String,
    pub target_table: String,
    pub strategy_id: i64,
    pub label_source: String,
    pub label_location: Option<String>,
    pub filename_delimiter: String,
    pub date_source: String,
    pub date_location: Option<String>,
    pub date_format: Option<String>,
    pub is_active: bool,
}

impl TestConfig {
    /// CSV → main.sales，AUTO_EXTEND，标签取文件名第 0 段，日期取第 1 段（YYYYMMDD）
    pub fn csv(target_table: &str) -> Self {
        Self {
            data_source: "erp".to_string(),
            dataset_type: "sales".to_string(),
            file_pattern: r"^sales_.*\.csv$".to_string(),
            file_format: "csv".to_string(),
            target_table: target_table.to_string(),
            strategy_id: 1,
            label_source: "filename".to_string(),
            label_location: Some("0".to_string()),
            filename_delimiter: "_".to_string(),
            date_source: "filename".to_string(),
            date_location: Some("1".to_string()),
            date_format: Some("YYYYMMDD".to_string()),
            is_active: true,
        }
    }

    pub fn strategy(mut self, strategy_id: i64) -> Self {
        self.strategy_id = strategy_id;
        self
    }

    pub fn format(mut self, file_format: &str, file_pattern: &str) -> Self {
        self.file_format = file_format.to_string();
        self.file_pattern = file_pattern.to_string();
        self
    }

    pub fn label(mut self, source: &str, location: Option<&str>) -> Self {
        self.label_source = source.to_string();
        self.label_location = location.map(str::to_string);
        self
    }

    pub fn date(mut self, source: &str, location: Option<&str>, date_format: Option<&str>) -> Self {
        self.date_source = source.to_string();
        self.date_location = location.map(str::to_string);
        self.date_format = date_format.map(str::to_string);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// 5 行 {a,b} 的 CSV
pub fn five_row_csv() -> String {
    let mut content = String::from("a,b\n");
    for i in 1..=5 {
        content.push_str(&format!("{},name_{}\n", i, i));
    }
    content
}
