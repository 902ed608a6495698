// ==========================================
// 通用导入引擎 - 目标表写入仓储
// ==========================================
// 职责: 向运行期才确定结构的目标表批量写入记录
// 约束:
// - 整批在同一事务内写入，失败整体回滚
// - 每行都带 dataset_id
// - 值按列声明类型转换；无法转换的值按原文本写入（SQLite 动态类型）
// ==========================================

use crate::db::{ensure_schema_attached, SharedConnection};
use crate::domain::import_config::TableRef;
use crate::domain::record::{value_as_text, Record, COLUMN_DATASET_ID};
use crate::domain::types::ColumnType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use tracing::debug;

/// 转换单个值为 SQLite 值
pub fn coerce_value(value: &Value, column_type: ColumnType) -> SqlValue {
    let text = match value_as_text(value) {
        Some(text) => text,
        None => return SqlValue::Null,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return SqlValue::Null;
    }

    match column_type {
        ColumnType::Boolean => match value {
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            _ => match trimmed.to_lowercase().as_str() {
                "true" | "yes" | "t" | "y" | "1" => SqlValue::Integer(1),
                "false" | "no" | "f" | "n" | "0" => SqlValue::Integer(0),
                _ => SqlValue::Text(text),
            },
        },
        ColumnType::Integer | ColumnType::BigInt => {
            if let Ok(i) = trimmed.parse::<i64>() {
                SqlValue::Integer(i)
            } else {
                match trimmed.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        SqlValue::Integer(f as i64)
                    }
                    _ => SqlValue::Text(text),
                }
            }
        }
        ColumnType::Numeric => match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => SqlValue::Real(f),
            _ => SqlValue::Text(text),
        },
        ColumnType::Varchar(_) | ColumnType::Text => SqlValue::Text(text),
    }
}

pub struct TargetTableRepository {
    conn: SharedConnection,
}

impl TargetTableRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入记录（单事务）
    ///
    /// # 参数
    /// - table: 目标表
    /// - dataset_id: 数据集外键
    /// - columns: 写入列及其声明类型（业务列 + 审计列）
    /// - records: 已按策略过滤的记录
    ///
    /// # 返回
    /// - Ok(usize): 写入行数
    /// - Err: 任一行失败，整个事务回滚
    pub fn insert_records(
        &self,
        table: &TableRef,
        dataset_id: i64,
        columns: &[(String, ColumnType)],
        records: &[Record],
    ) -> RepositoryResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        ensure_schema_attached(&conn, &table.schema)?;

        let column_list = std::iter::once(COLUMN_DATASET_ID.to_string())
            .chain(columns.iter().map(|(name, _)| format!("\"{}\"", name)))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len() + 1)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            column_list,
            placeholders
        );
        debug!(table = %table, sql = %sql, rows = records.len(), "批量写入");

        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in records {
                let values = std::iter::once(SqlValue::Integer(dataset_id)).chain(
                    columns.iter().map(|(name, column_type)| {
                        record
                            .get(name)
                            .map(|v| coerce_value(v, *column_type))
                            .unwrap_or(SqlValue::Null)
                    }),
                );
                stmt.execute(params_from_iter(values))?;
                count += 1;
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(count)
    }

    /// 统计某数据集在目标表中的行数
    pub fn count_by_dataset(&self, table: &TableRef, dataset_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        ensure_schema_attached(&conn, &table.schema)?;

        let count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?1",
                table.quoted(),
                COLUMN_DATASET_ID
            ),
            params![dataset_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_coerce_value() {
        assert_eq!(coerce_value(&json!("yes"), ColumnType::Boolean), SqlValue::Integer(1));
        assert_eq!(coerce_value(&json!(false), ColumnType::Boolean), SqlValue::Integer(0));
        assert_eq!(coerce_value(&json!(" 42 "), ColumnType::Integer), SqlValue::Integer(42));
        assert_eq!(coerce_value(&json!("3.0"), ColumnType::BigInt), SqlValue::Integer(3));
        assert_eq!(coerce_value(&json!("2.5"), ColumnType::Numeric), SqlValue::Real(2.5));
        assert_eq!(
            coerce_value(&json!("n/a"), ColumnType::Integer),
            SqlValue::Text("n/a".to_string())
        );
        assert_eq!(coerce_value(&json!(""), ColumnType::Text), SqlValue::Null);
        assert_eq!(coerce_value(&Value::Null, ColumnType::Integer), SqlValue::Null);
    }

    #[test]
    fn test_insert_records_in_transaction() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE sales (id INTEGER PRIMARY KEY AUTOINCREMENT, dataset_id INTEGER NOT NULL, \
             \"amount\" INTEGER NOT NULL, created_by TEXT);",
        )
        .unwrap();
        let repo = TargetTableRepository::new(Arc::new(Mutex::new(conn)));
        let table = TableRef::parse("main.sales").unwrap();
        let columns = vec![
            ("amount".to_string(), ColumnType::Integer),
            ("created_by".to_string(), ColumnType::Text),
        ];

        let good: Vec<Record> = vec![
            serde_json::from_value(json!({"amount": "1", "created_by": "t"})).unwrap(),
            serde_json::from_value(json!({"amount": "2", "created_by": "t"})).unwrap(),
        ];
        assert_eq!(repo.insert_records(&table, 9, &columns, &good).unwrap(), 2);
        assert_eq!(repo.count_by_dataset(&table, 9).unwrap(), 2);

        // 第二行违反 NOT NULL，整批回滚
        let bad: Vec<Record> = vec![
            serde_json::from_value(json!({"amount": "3"})).unwrap(),
            serde_json::from_value(json!({"amount": null})).unwrap(),
        ];
        assert!(repo.insert_records(&table, 10, &columns, &bad).is_err());
        assert_eq!(repo.count_by_dataset(&table, 10).unwrap(), 0);
    }
}
