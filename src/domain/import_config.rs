// ==========================================
// 通用导入引擎 - 导入配置领域模型
// ==========================================
// 对齐: import_config / import_strategy 表
// 用途: 单次运行的不可变配置快照
// ==========================================

use crate::domain::types::{FileFormat, MetadataSource, StrategyKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ==========================================
// TableRef - 带 schema 限定的表引用
// ==========================================
// 格式: schema.table，两段均需为合法标识符
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    /// 解析 "schema.table"（不接受未限定的表名）
    pub fn parse(qualified: &str) -> Option<Self> {
        let (schema, table) = qualified.trim().split_once('.')?;
        if !is_plain_identifier(schema) || !is_plain_identifier(table) {
            return None;
        }
        Some(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// SQL 中使用的带引号限定名: "schema"."table"
    pub fn quoted(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }

    /// 是否位于主库（SQLite 外键不能跨附加库）
    pub fn is_main_schema(&self) -> bool {
        self.schema.eq_ignore_ascii_case("main")
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ==========================================
// ImportStrategy - 导入策略定义
// ==========================================
// 只携带名称/描述，行为由 StrategyResolver 决定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStrategy {
    pub id: i64,
    pub kind: StrategyKind,
    pub name: String,
    pub description: Option<String>,
}

// ==========================================
// MetadataRule - 标签/日期提取规则
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRule {
    pub source: MetadataSource,
    // static: 字面值 / filename: 分段下标 / file_content: 字段名
    pub location: Option<String>,
}

// ==========================================
// ImportConfig - 导入配置快照
// ==========================================
// 红线: 运行期间不可修改
// 不变量: source_directory != archive_directory; target_table 带 schema 限定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    pub id: i64,
    pub data_source: String,  // 数据源名称（引用 data_source 表）
    pub dataset_type: String, // 数据集类型名称（引用 dataset_type 表）

    // ===== 文件位置 =====
    pub source_directory: PathBuf,
    pub archive_directory: PathBuf,
    pub file_pattern: String, // 文件名正则
    pub file_format: FileFormat,

    // ===== 目标 =====
    pub target_table: TableRef,
    pub strategy_id: i64,

    // ===== 元数据提取 =====
    pub label_rule: MetadataRule,
    pub filename_delimiter: String,
    pub date_rule: MetadataRule,
    pub date_format: Option<String>, // 日期格式文法（如 YYYYMMDD）

    // ===== 状态 =====
    pub is_active: bool,
    pub last_modified_at: Option<DateTime<Utc>>,
}
