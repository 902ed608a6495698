// ==========================================
// 通用导入引擎 - 导入策略解析
// ==========================================
// 输入: 批次记录 + 目标表现有列 + 扩列接口
// 输出: 可直接入库的记录（仅业务列 + 审计列）
//
// new     = 批次业务字段 − 现有列
// missing = 现有列 − 批次业务字段
//
// 策略:
// - AUTO_EXTEND  : 逐个追加 new 字段（类型由批次样本推断）
// - IGNORE_EXTRAS: 丢弃 new 字段，仅保留交集
// - STRICT       : new 非空即校验失败；否则同 AUTO_EXTEND 的过滤（不改表）
// ==========================================

use crate::domain::import_config::TableRef;
use crate::domain::record::{
    is_blank, is_business_field, is_system_column, Record, AUDIT_COLUMNS,
};
use crate::domain::types::{ColumnType, StrategyKind};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::ColumnWriter;
use crate::importer::type_inference::infer_type;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

// ==========================================
// Resolution - 解析结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// 过滤后的记录（业务列对齐，缺失值为 NULL）
    pub records: Vec<Record>,
    /// 入库业务列（有序）
    pub columns: Vec<String>,
    pub new_fields: Vec<String>,
    pub missing_fields: Vec<String>,
    /// 被丢弃的字段（IGNORE_EXTRAS 的 new 字段）
    pub ignored_fields: Vec<String>,
    /// 实际新增的列
    pub added_columns: Vec<String>,
}

// ==========================================
// PlannedColumns - dry run 扩列记录器
// ==========================================
// 不执行 DDL，只记录计划追加的列
#[derive(Debug, Default)]
pub struct PlannedColumns {
    planned: RefCell<Vec<(String, ColumnType)>>,
}

impl PlannedColumns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn planned(&self) -> Vec<(String, ColumnType)> {
        self.planned.borrow().clone()
    }
}

impl ColumnWriter for PlannedColumns {
    fn add_column(
        &self,
        table: &TableRef,
        name: &str,
        column_type: ColumnType,
    ) -> ImportResult<bool> {
        let mut planned = self.planned.borrow_mut();
        if planned.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)) {
            return Ok(false);
        }
        info!(table = %table, column = %name, column_type = %column_type, "[dry run] 计划追加列");
        planned.push((name.to_string(), column_type));
        Ok(true)
    }
}

/// 批次业务字段（首次出现顺序）
pub fn batch_fields(records: &[Record]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if is_business_field(key) && !fields.contains(key) {
                fields.push(key.clone());
            }
        }
    }
    fields
}

/// 取字段前 sample_size 个非空值推断类型
fn infer_field_type(records: &[Record], field: &str, sample_size: usize) -> ColumnType {
    let values: Vec<&Value> = records
        .iter()
        .filter_map(|r| r.get(field))
        .filter(|v| !is_blank(v))
        .take(sample_size.max(1))
        .collect();
    infer_type(values)
}

/// 投影记录: 业务列对齐 + 保留审计列
fn project(record: &Record, columns: &[String]) -> Record {
    let mut out = Record::new();
    for column in columns {
        let value = record.get(column).cloned().unwrap_or(Value::Null);
        out.insert(column.clone(), value);
    }
    for audit in AUDIT_COLUMNS {
        if let Some(value) = record.get(audit) {
            out.insert(audit.to_string(), value.clone());
        }
    }
    out
}

/// 解析导入策略
///
/// # 参数
/// - kind: 策略
/// - table: 目标表（已存在）
/// - records: 已标准化、已盖审计戳的记录
/// - existing: 目标表现有列名（含系统/审计列亦可，内部剔除）
/// - writer: 扩列接口
/// - sample_size: 新列类型推断的采样数
pub fn resolve(
    kind: StrategyKind,
    table: &TableRef,
    records: Vec<Record>,
    existing: &BTreeSet<String>,
    writer: &dyn ColumnWriter,
    sample_size: usize,
) -> ImportResult<Resolution> {
    // 与系统列同名的源字段一律丢弃
    let system_named: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| is_system_column(k))
        .map(|k| k.as_str())
        .collect();
    if !system_named.is_empty() {
        warn!(
            table = %table,
            fields = ?system_named,
            "源字段与系统列同名，已丢弃"
        );
    }

    // SQLite 标识符不区分大小写: 按小写比对，缺失列保留表中原名
    let existing_business: BTreeMap<String, &str> = existing
        .iter()
        .map(|c| (c.to_ascii_lowercase(), c.as_str()))
        .filter(|(lower, _)| is_business_field(lower))
        .collect();
    let in_table = |field: &str| existing_business.contains_key(&field.to_ascii_lowercase());

    let batch = batch_fields(&records);
    let new_fields: Vec<String> = batch
        .iter()
        .filter(|f| !in_table(f.as_str()))
        .cloned()
        .collect();
    let missing_fields: Vec<String> = existing_business
        .iter()
        .filter(|(lower, _)| !batch.iter().any(|f| f.eq_ignore_ascii_case(lower)))
        .map(|(_, name)| name.to_string())
        .collect();

    if !missing_fields.is_empty() {
        debug!(table = %table, fields = ?missing_fields, "批次缺少的现有列将写入 NULL");
    }

    let mut resolution = Resolution {
        new_fields: new_fields.clone(),
        missing_fields,
        ..Default::default()
    };

    match kind {
        StrategyKind::AutoExtend => {
            for field in &new_fields {
                let column_type = infer_field_type(&records, field, sample_size);
                if writer.add_column(table, field, column_type)? {
                    resolution.added_columns.push(field.clone());
                }
            }
            resolution.columns = batch;
        }
        StrategyKind::IgnoreExtras => {
            if !new_fields.is_empty() {
                info!(table = %table, fields = ?new_fields, "IGNORE_EXTRAS: 丢弃未定义字段");
            }
            resolution.ignored_fields = new_fields;
            resolution.columns = batch
                .into_iter()
                .filter(|f| in_table(f.as_str()))
                .collect();
        }
        StrategyKind::Strict => {
            if !new_fields.is_empty() {
                return Err(ImportError::UnexpectedFields {
                    table: table.to_string(),
                    fields: new_fields,
                });
            }
            resolution.columns = batch;
        }
    }

    resolution.records = records
        .iter()
        .map(|r| project(r, &resolution.columns))
        .collect();

    debug!(
        table = %table,
        strategy = %kind,
        columns = resolution.columns.len(),
        new = resolution.new_fields.len(),
        added = resolution.added_columns.len(),
        ignored = resolution.ignored_fields.len(),
        "策略解析完成"
    );
    Ok(resolution)
}
