// ==========================================
// 通用导入引擎 - 领域类型定义
// ==========================================
// 职责: 文件格式 / 导入策略 / 数据集状态 / 元数据来源 / 列类型
// 红线: 纯类型定义，不含数据访问逻辑
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 文件格式 (File Format)
// ==========================================
// 对齐: import_config.file_format 列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,  // 分隔文本（固定逗号分隔）
    Xlsx, // 新版电子表格
    Xls,  // 旧版电子表格
    Json, // 层级对象
    Xml,  // 标记语言
}

impl FileFormat {
    /// 从配置标签解析（大小写不敏感，兼容常见别名）
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "csv" | "txt" | "delimited" => Some(FileFormat::Csv),
            "xlsx" | "excel" => Some(FileFormat::Xlsx),
            "xls" => Some(FileFormat::Xls),
            "json" => Some(FileFormat::Json),
            "xml" => Some(FileFormat::Xml),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Csv => write!(f, "csv"),
            FileFormat::Xlsx => write!(f, "xlsx"),
            FileFormat::Xls => write!(f, "xls"),
            FileFormat::Json => write!(f, "json"),
            FileFormat::Xml => write!(f, "xml"),
        }
    }
}

// ==========================================
// 导入策略 (Strategy Kind)
// ==========================================
// 行为编码在策略解析器中，这里只做 id 映射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    AutoExtend,   // 1: 自动扩列
    IgnoreExtras, // 2: 忽略多余字段
    Strict,       // 3: 严格校验
}

impl StrategyKind {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(StrategyKind::AutoExtend),
            2 => Some(StrategyKind::IgnoreExtras),
            3 => Some(StrategyKind::Strict),
            _ => None,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            StrategyKind::AutoExtend => 1,
            StrategyKind::IgnoreExtras => 2,
            StrategyKind::Strict => 3,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::AutoExtend => write!(f, "AUTO_EXTEND"),
            StrategyKind::IgnoreExtras => write!(f, "IGNORE_EXTRAS"),
            StrategyKind::Strict => write!(f, "STRICT"),
        }
    }
}

// ==========================================
// 数据集状态 (Dataset Status)
// ==========================================
// 本引擎只写入 New / Active / Failed
// Archived / Superseded 由外部系统写入，这里只做读取兼容
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetStatus {
    New,
    Active,
    Failed,
    Archived,
    Superseded,
}

impl DatasetStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NEW" => Some(DatasetStatus::New),
            "ACTIVE" => Some(DatasetStatus::Active),
            "FAILED" => Some(DatasetStatus::Failed),
            "ARCHIVED" => Some(DatasetStatus::Archived),
            "SUPERSEDED" => Some(DatasetStatus::Superseded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::New => "NEW",
            DatasetStatus::Active => "ACTIVE",
            DatasetStatus::Failed => "FAILED",
            DatasetStatus::Archived => "ARCHIVED",
            DatasetStatus::Superseded => "SUPERSEDED",
        }
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 元数据来源 (Metadata Source)
// ==========================================
// 用于数据集标签与生效日期的提取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    Static,      // 配置中的字面值
    Filename,    // 文件名按分隔符切分后的第 N 段
    FileContent, // 首个文件首条记录的指定字段
}

impl MetadataSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "static" => Some(MetadataSource::Static),
            "filename" | "file_name" => Some(MetadataSource::Filename),
            "file_content" | "content" => Some(MetadataSource::FileContent),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataSource::Static => write!(f, "static"),
            MetadataSource::Filename => write!(f, "filename"),
            MetadataSource::FileContent => write!(f, "file_content"),
        }
    }
}

// ==========================================
// 作业阶段 (Job Stage)
// ==========================================
// 状态机: Initialized → ReferenceDataEnsured → DatasetCreated → Extracted
//        → Transformed → Loaded → Cleaned
// Failed 可由任一非终态进入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStage {
    Initialized,
    ReferenceDataEnsured,
    DatasetCreated,
    Extracted,
    Transformed,
    Loaded,
    Cleaned,
    Failed,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Cleaned | JobStage::Failed)
    }

    /// 下一个正常阶段（终态返回 None）
    pub fn next(&self) -> Option<JobStage> {
        match self {
            JobStage::Initialized => Some(JobStage::ReferenceDataEnsured),
            JobStage::ReferenceDataEnsured => Some(JobStage::DatasetCreated),
            JobStage::DatasetCreated => Some(JobStage::Extracted),
            JobStage::Extracted => Some(JobStage::Transformed),
            JobStage::Transformed => Some(JobStage::Loaded),
            JobStage::Loaded => Some(JobStage::Cleaned),
            JobStage::Cleaned | JobStage::Failed => None,
        }
    }

    /// 判断状态转换是否合法
    pub fn can_transition_to(&self, to: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == JobStage::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ==========================================
// 列类型 (Column Type)
// ==========================================
// 类型推断输出，同时用于解析已有列的声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Numeric,        // NUMERIC(18,6)
    Integer,        // 32 位有符号范围内
    BigInt,         // 超出 32 位范围
    Varchar(usize), // 分档: 50 / 255 / 1000
    Text,           // 无长度限制
}

impl ColumnType {
    /// 生成 DDL 中的类型声明
    pub fn sql(&self) -> String {
        match self {
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Numeric => "NUMERIC(18,6)".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Varchar(len) => format!("VARCHAR({})", len),
            ColumnType::Text => "TEXT".to_string(),
        }
    }

    /// 从已有列的声明类型反解析（未知类型按 TEXT 处理）
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_uppercase();
        if upper.starts_with("BOOL") {
            ColumnType::Boolean
        } else if upper.starts_with("NUMERIC")
            || upper.starts_with("DECIMAL")
            || upper.starts_with("REAL")
            || upper.starts_with("FLOAT")
            || upper.starts_with("DOUBLE")
        {
            ColumnType::Numeric
        } else if upper.starts_with("BIGINT") {
            ColumnType::BigInt
        } else if upper.contains("INT") {
            ColumnType::Integer
        } else if let Some(len) = upper
            .strip_prefix("VARCHAR(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|n| n.trim().parse::<usize>().ok())
        {
            ColumnType::Varchar(len)
        } else {
            ColumnType::Text
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_format_aliases() {
        assert_eq!(FileFormat::parse("CSV"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::parse("excel"), Some(FileFormat::Xlsx));
        assert_eq!(FileFormat::parse("xls"), Some(FileFormat::Xls));
        assert_eq!(FileFormat::parse("parquet"), None);
    }

    #[test]
    fn test_job_stage_transitions() {
        assert!(JobStage::Initialized.can_transition_to(JobStage::ReferenceDataEnsured));
        assert!(JobStage::Extracted.can_transition_to(JobStage::Failed));
        assert!(!JobStage::Initialized.can_transition_to(JobStage::Loaded));
        assert!(!JobStage::Cleaned.can_transition_to(JobStage::Failed));
        assert!(!JobStage::Failed.can_transition_to(JobStage::Initialized));
    }

    #[test]
    fn test_column_type_from_declared() {
        // 外部写入方可能使用的其他类型写法
        assert_eq!(ColumnType::from_declared("decimal(10,2)"), ColumnType::Numeric);
        assert_eq!(ColumnType::from_declared("SMALLINT"), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("varchar( 80 )"), ColumnType::Varchar(80));
        assert_eq!(ColumnType::from_declared("blob"), ColumnType::Text);
        assert_eq!(ColumnType::from_declared(""), ColumnType::Text);
    }
}
