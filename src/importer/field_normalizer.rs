// ==========================================
// 通用导入引擎 - 字段名标准化
// ==========================================
// 规则: 小写 → 非字母数字连续段折叠为单个 '_' → 去首尾 '_'
//       → 数字开头补 'col_' 前缀
// 红线: 纯函数，无缓存，便于直接测试
// ==========================================

use crate::domain::record::{is_metadata_field, Record};
use std::collections::HashSet;

/// 标识符标准化
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_underscore = false;

    for ch in name.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_ascii_alphanumeric() {
            if pending_underscore && !out.is_empty() {
                out.push('_');
            }
            pending_underscore = false;
            out.push(ch);
        } else {
            pending_underscore = true;
        }
    }

    if out.is_empty() {
        return "col_unnamed".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "col_");
    }
    out
}

/// 标准化一条记录的业务字段名（元数据字段保持不变）
///
/// 多个源字段折叠为同名时，后出现者追加 `_2`、`_3` 后缀
pub fn normalize_record(record: Record) -> Record {
    let mut normalized = Record::new();
    let mut used: HashSet<String> = HashSet::new();

    for (key, value) in record {
        if is_metadata_field(&key) {
            normalized.insert(key, value);
            continue;
        }

        let base = sanitize_identifier(&key);
        let mut name = base.clone();
        let mut suffix = 2;
        while used.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        used.insert(name.clone());
        normalized.insert(name, value);
    }

    normalized
}
