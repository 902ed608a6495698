// ==========================================
// 通用导入引擎 - 列类型推断
// ==========================================
// 判定顺序:
// 1. 全部为布尔值/布尔词 → BOOLEAN
// 2. 全部为数值: 任一带非零小数部分 → NUMERIC；否则 INTEGER / BIGINT
// 3. 其他 → 按最长值分档的 VARCHAR，超过最大档为 TEXT
// 空值（NULL/空白串）不参与判定；样本全空 → TEXT
// 红线: 纯函数，无缓存
// ==========================================

use crate::domain::record::is_blank;
use crate::domain::types::ColumnType;
use serde_json::Value;

/// 文本分档阈值
pub const VARCHAR_TIERS: [usize; 3] = [50, 255, 1000];

const BOOLEAN_TOKENS: [&str; 8] = ["true", "false", "yes", "no", "t", "f", "y", "n"];

/// 单个值的数值分类
#[derive(Debug, Clone, Copy, PartialEq)]
enum NumberKind {
    Whole(i128),
    Fractional,
}

fn classify_number(value: &Value) -> Option<NumberKind> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(NumberKind::Whole(i as i128))
            } else if let Some(u) = n.as_u64() {
                Some(NumberKind::Whole(u as i128))
            } else {
                n.as_f64().map(classify_float)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i128>() {
                return Some(NumberKind::Whole(i));
            }
            s.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(classify_float)
        }
        _ => None,
    }
}

fn classify_float(f: f64) -> NumberKind {
    if f.fract() == 0.0 && f.abs() < i128::MAX as f64 {
        NumberKind::Whole(f as i128)
    } else {
        NumberKind::Fractional
    }
}

fn looks_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            BOOLEAN_TOKENS.contains(&lower.as_str())
        }
        _ => false,
    }
}

fn text_length(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    }
}

/// 按最长值选择文本类型
pub fn text_type_for_length(max_len: usize) -> ColumnType {
    VARCHAR_TIERS
        .iter()
        .find(|tier| max_len <= **tier)
        .map(|tier| ColumnType::Varchar(*tier))
        .unwrap_or(ColumnType::Text)
}

/// 根据样本值推断列类型
pub fn infer_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a Value>,
{
    let sample: Vec<&Value> = values.into_iter().filter(|v| !is_blank(v)).collect();
    if sample.is_empty() {
        return ColumnType::Text;
    }

    if sample.iter().all(|v| looks_boolean(v)) {
        return ColumnType::Boolean;
    }

    let numbers: Option<Vec<NumberKind>> = sample.iter().map(|v| classify_number(v)).collect();
    if let Some(numbers) = numbers {
        if numbers.iter().any(|n| matches!(n, NumberKind::Fractional)) {
            return ColumnType::Numeric;
        }
        let exceeds_32 = numbers.iter().any(|n| match n {
            NumberKind::Whole(i) => *i > i32::MAX as i128 || *i < i32::MIN as i128,
            NumberKind::Fractional => false,
        });
        return if exceeds_32 {
            ColumnType::BigInt
        } else {
            ColumnType::Integer
        };
    }

    let max_len = sample.iter().map(|v| text_length(v)).max().unwrap_or(0);
    text_type_for_length(max_len)
}
