// ==========================================
// 通用导入引擎 - 记录模型
// ==========================================
// 记录 = 有序的 字段名 → 原始值 映射（字段结构在读取文件后才确定）
// 元数据字段仅在管道内流转，不允许写入目标表
// ==========================================

use serde_json::{Map, Value};

/// 单条记录（serde_json 开启 preserve_order，保持源字段顺序）
pub type Record = Map<String, Value>;

// ===== 管道内保留的元数据字段 =====
pub const FIELD_SOURCE_FILE: &str = "__source_file";
pub const FIELD_DATASET_LABEL: &str = "__dataset_label";
pub const FIELD_DATASET_DATE: &str = "__dataset_date";

pub const METADATA_FIELDS: [&str; 3] = [FIELD_SOURCE_FILE, FIELD_DATASET_LABEL, FIELD_DATASET_DATE];

// ===== 目标表系统列 =====
pub const COLUMN_ID: &str = "id";
pub const COLUMN_DATASET_ID: &str = "dataset_id";
pub const COLUMN_CREATED_AT: &str = "created_at";
pub const COLUMN_CREATED_BY: &str = "created_by";

/// 由引擎维护、不参与业务字段比较的系统列
pub const SYSTEM_COLUMNS: [&str; 2] = [COLUMN_ID, COLUMN_DATASET_ID];

/// 审计列（由编排器统一打戳）
pub const AUDIT_COLUMNS: [&str; 2] = [COLUMN_CREATED_AT, COLUMN_CREATED_BY];

// ===== 兜底 blob 记录字段 =====
pub const FIELD_RAW_DATA: &str = "raw_data";
pub const FIELD_FILE_NAME: &str = "file_name";

pub fn is_metadata_field(name: &str) -> bool {
    METADATA_FIELDS.contains(&name)
}

pub fn is_system_column(name: &str) -> bool {
    SYSTEM_COLUMNS.contains(&name)
}

pub fn is_audit_column(name: &str) -> bool {
    AUDIT_COLUMNS.contains(&name)
}

/// 业务字段: 非元数据、非系统列、非审计列
pub fn is_business_field(name: &str) -> bool {
    !is_metadata_field(name) && !is_system_column(name) && !is_audit_column(name)
}

/// 构造兜底 blob 记录（原始文本 + 源文件名）
pub fn blob_record(raw: String, file_name: &str) -> Record {
    let mut record = Record::new();
    record.insert(FIELD_RAW_DATA.to_string(), Value::String(raw));
    record.insert(FIELD_FILE_NAME.to_string(), Value::String(file_name.to_string()));
    record
}

/// 值是否视为空（NULL 或空白字符串）
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// 取值的文本形式（字符串原样，其余序列化）
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
