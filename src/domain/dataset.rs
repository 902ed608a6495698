// ==========================================
// 通用导入引擎 - 数据集领域模型
// ==========================================
// 对齐: dataset 表
// 红线: 本引擎只创建与更新状态，从不删除
// ==========================================

use crate::domain::types::DatasetStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ==========================================
// Dataset - 单次运行产出的数据集
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub label: String,
    pub effective_date: NaiveDate,
    pub data_source_id: i64,
    pub dataset_type_id: i64,
    pub import_config_id: i64,
    pub status: DatasetStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// NewDataset - 待创建数据集
// ==========================================
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub label: String,
    pub effective_date: NaiveDate,
    pub data_source_id: i64,
    pub dataset_type_id: i64,
    pub import_config_id: i64,
    pub created_by: String,
}

// ==========================================
// ReferenceIds - 参照数据主键
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceIds {
    pub data_source_id: i64,
    pub dataset_type_id: i64,
}

// ==========================================
// JobSummary - 作业汇总
// ==========================================
// 用途: 作业返回值，CLI 打印汇总行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub run_id: String,
    pub config_id: i64,
    pub dataset_id: Option<i64>, // dry run 时为 None
    pub label: String,
    pub effective_date: NaiveDate,
    pub files_processed: usize,
    pub records_extracted: usize,
    pub records_transformed: usize,
    pub records_loaded: usize,
    pub files_archived: usize,
    pub archive_failures: usize,
    pub columns_added: Vec<String>,
    pub fields_ignored: Vec<String>,
    pub dry_run: bool,
    pub elapsed_time: Duration,
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dataset = self
            .dataset_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "files={} extracted={} transformed={} loaded={} dataset_id={}",
            self.files_processed,
            self.records_extracted,
            self.records_transformed,
            self.records_loaded,
            dataset
        )?;
        if self.dry_run {
            write!(f, " (dry run)")?;
        }
        Ok(())
    }
}
