// ==========================================
// 通用导入引擎 - 目标表结构管理
// ==========================================
// 职责:
// - 读取目标表现有列（每次运行重新读取，不跨运行缓存）
// - 从样本记录推断列类型并建表
// - 追加缺失列（只增不删，重复追加为空操作）
// - 建表后为读写/只读两个应用角色登记权限
// ==========================================

use crate::db::{ensure_schema_attached, schema_exists, SharedConnection};
use crate::domain::import_config::TableRef;
use crate::domain::record::{
    is_business_field, Record, COLUMN_CREATED_AT, COLUMN_CREATED_BY, COLUMN_DATASET_ID, COLUMN_ID,
};
use crate::domain::types::ColumnType;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_normalizer::sanitize_identifier;
use crate::importer::importer_trait::ColumnWriter;
use crate::importer::type_inference::infer_type;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// 默认采样记录数
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

// ==========================================
// ColumnDef / TableSchema - 运行期表结构
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// 按列名查找声明类型（与 SQLite 一致，不区分大小写）
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.column_type)
    }
}

// ==========================================
// GrantRoles - 应用角色
// ==========================================
#[derive(Debug, Clone)]
pub struct GrantRoles {
    pub read_write: String,
    pub read_only: String,
}

impl Default for GrantRoles {
    fn default() -> Self {
        Self {
            read_write: "import_rw".to_string(),
            read_only: "import_ro".to_string(),
        }
    }
}

const READ_WRITE_PRIVILEGES: &str = "SELECT,INSERT,UPDATE,DELETE,USAGE";
const READ_ONLY_PRIVILEGES: &str = "SELECT,USAGE";

// ==========================================
// 纯函数: 样本列推断 / DDL 生成
// ==========================================

/// 从前 sample_size 条记录推断业务列（字段并集，保持首次出现顺序）
pub fn infer_columns(records: &[Record], sample_size: usize) -> Vec<ColumnDef> {
    let sample = &records[..records.len().min(sample_size)];

    let mut names: Vec<String> = Vec::new();
    for record in sample {
        for key in record.keys() {
            if is_business_field(key) && !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    names
        .into_iter()
        .map(|name| {
            let column_type = infer_type(sample.iter().filter_map(|r| r.get(&name)));
            ColumnDef { name, column_type }
        })
        .collect()
}

/// 生成建表语句
pub fn build_create_table_sql(table: &TableRef, columns: &[ColumnDef]) -> String {
    // SQLite 外键不能跨附加库，非 main 库仅保留普通整型列
    let dataset_fk = if table.is_main_schema() {
        format!("{} INTEGER NOT NULL REFERENCES dataset(id)", COLUMN_DATASET_ID)
    } else {
        format!("{} INTEGER NOT NULL", COLUMN_DATASET_ID)
    };

    let mut defs = vec![
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", COLUMN_ID),
        dataset_fk,
    ];
    defs.extend(
        columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.column_type.sql())),
    );
    defs.push(format!(
        "{} TEXT NOT NULL DEFAULT (datetime('now'))",
        COLUMN_CREATED_AT
    ));
    defs.push(format!("{} TEXT", COLUMN_CREATED_BY));

    format!("CREATE TABLE {} (\n    {}\n)", table.quoted(), defs.join(",\n    "))
}

fn read_table_schema(conn: &Connection, table: &TableRef) -> ImportResult<TableSchema> {
    ensure_schema_attached(conn, &table.schema)?;

    let sql = format!(
        "PRAGMA \"{}\".table_info(\"{}\")",
        table.schema, table.table
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?))
    })?;

    let mut columns = Vec::new();
    for row in rows {
        let (name, declared) = row?;
        columns.push(ColumnDef {
            name,
            column_type: ColumnType::from_declared(declared.as_deref().unwrap_or("")),
        });
    }
    Ok(TableSchema { columns })
}

// ==========================================
// SchemaManager
// ==========================================
pub struct SchemaManager {
    conn: SharedConnection,
    roles: GrantRoles,
}

impl SchemaManager {
    pub fn new(conn: SharedConnection, roles: GrantRoles) -> Self {
        Self { conn, roles }
    }

    fn lock(&self) -> ImportResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ImportError::LockError(e.to_string()))
    }

    /// 读取目标表列定义（表不存在时返回空结构）
    pub fn columns_of(&self, table: &TableRef) -> ImportResult<TableSchema> {
        let conn = self.lock()?;
        read_table_schema(&conn, table)
    }

    /// 读取目标表列名集合
    pub fn column_names(&self, table: &TableRef) -> ImportResult<BTreeSet<String>> {
        Ok(self.columns_of(table)?.names())
    }

    /// 目标表是否存在
    ///
    /// schema 数据库文件尚不存在时直接返回 false，不触发附加
    pub fn exists(&self, table: &TableRef) -> ImportResult<bool> {
        let conn = self.lock()?;
        if !schema_exists(&conn, &table.schema)? {
            return Ok(false);
        }
        ensure_schema_attached(&conn, &table.schema)?;

        let sql = format!(
            "SELECT COUNT(*) FROM \"{}\".sqlite_master WHERE type = 'table' AND name = ?1",
            table.schema
        );
        let count: i64 = conn.query_row(&sql, params![table.table], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// 从样本建表
    ///
    /// # 参数
    /// - table: 目标表
    /// - records: 已标准化字段名的记录
    /// - sample_size: 采样条数
    ///
    /// # 返回
    /// - Ok(Vec<ColumnDef>): 推断出的业务列
    /// - Err: 样本为空（校验错误）或 DDL 执行失败
    pub fn create_from_sample(
        &self,
        table: &TableRef,
        records: &[Record],
        sample_size: usize,
    ) -> ImportResult<Vec<ColumnDef>> {
        if records.is_empty() || sample_size == 0 {
            return Err(ImportError::ValidationError(format!(
                "无法从空样本创建目标表 {}",
                table
            )));
        }

        let columns = infer_columns(records, sample_size.max(1));
        let ddl = build_create_table_sql(table, &columns);
        debug!(table = %table, ddl = %ddl, "建表语句");

        let conn = self.lock()?;
        ensure_schema_attached(&conn, &table.schema)?;

        conn.execute(&ddl, []).map_err(|e| ImportError::SchemaError {
            table: table.to_string(),
            message: e.to_string(),
        })?;

        let index_sql = format!(
            "CREATE INDEX IF NOT EXISTS \"{}\".\"idx_{}_{}\" ON \"{}\"({})",
            table.schema, table.table, COLUMN_DATASET_ID, table.table, COLUMN_DATASET_ID
        );
        conn.execute(&index_sql, []).map_err(|e| ImportError::SchemaError {
            table: table.to_string(),
            message: e.to_string(),
        })?;

        self.grant_privileges(&conn, table)?;

        info!(
            table = %table,
            columns = columns.len(),
            "目标表已创建"
        );
        Ok(columns)
    }

    /// 登记两个应用角色的最小权限（幂等）
    fn grant_privileges(&self, conn: &Connection, table: &TableRef) -> ImportResult<()> {
        let grants = [
            (&self.roles.read_write, READ_WRITE_PRIVILEGES),
            (&self.roles.read_only, READ_ONLY_PRIVILEGES),
        ];

        for (role, privileges) in grants {
            conn.execute(
                r#"
                INSERT INTO main.table_grant (schema_name, table_name, role_name, privileges)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(schema_name, table_name, role_name) DO UPDATE SET
                    privileges = excluded.privileges,
                    granted_at = datetime('now')
                "#,
                params![table.schema, table.table, role, privileges],
            )?;
        }

        debug!(
            table = %table,
            read_write = %self.roles.read_write,
            read_only = %self.roles.read_only,
            "权限已登记"
        );
        Ok(())
    }
}

impl ColumnWriter for SchemaManager {
    /// 追加列（ADD COLUMN IF NOT EXISTS 语义）
    fn add_column(
        &self,
        table: &TableRef,
        name: &str,
        column_type: ColumnType,
    ) -> ImportResult<bool> {
        if sanitize_identifier(name) != name {
            return Err(ImportError::ValidationError(format!(
                "列名未经标准化: {}",
                name
            )));
        }

        let conn = self.lock()?;
        let schema = read_table_schema(&conn, table)?;
        if schema.is_empty() {
            return Err(ImportError::SchemaError {
                table: table.to_string(),
                message: "目标表不存在".to_string(),
            });
        }
        if schema.column_type(name).is_some() {
            debug!(table = %table, column = %name, "列已存在，跳过");
            return Ok(false);
        }

        let sql = format!(
            "ALTER TABLE {} ADD COLUMN \"{}\" {}",
            table.quoted(),
            name,
            column_type.sql()
        );
        match conn.execute(&sql, []) {
            Ok(_) => {
                info!(table = %table, column = %name, column_type = %column_type, "已追加列");
                Ok(true)
            }
            // 并发写入方抢先追加同名列，按已存在处理
            Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("duplicate column name") => {
                warn!(table = %table, column = %name, "列已被其他写入方追加");
                Ok(false)
            }
            Err(e) => Err(ImportError::SchemaError {
                table: table.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::FIELD_SOURCE_FILE;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_column_type_ignores_case() {
        let schema = TableSchema {
            columns: vec![ColumnDef {
                name: "Amount".to_string(),
                column_type: ColumnType::Numeric,
            }],
        };

        assert_eq!(schema.column_type("amount"), Some(ColumnType::Numeric));
        assert_eq!(schema.column_type("AMOUNT"), Some(ColumnType::Numeric));
        assert_eq!(schema.column_type("other"), None);
    }

    #[test]
    fn test_infer_columns_union_over_sample_only() {
        let records = vec![
            record(&[("a", json!("1")), (FIELD_SOURCE_FILE, json!("f.csv"))]),
            record(&[("a", json!("2.5")), ("b", json!("x"))]),
            record(&[("c", json!("late"))]),
        ];

        let columns = infer_columns(&records, 2);

        assert_eq!(
            columns,
            vec![
                ColumnDef { name: "a".to_string(), column_type: ColumnType::Numeric },
                ColumnDef { name: "b".to_string(), column_type: ColumnType::Varchar(50) },
            ]
        );
    }

    #[test]
    fn test_infer_columns_skips_system_and_audit() {
        let records = vec![record(&[
            ("id", json!("7")),
            ("dataset_id", json!("1")),
            ("created_at", json!("now")),
            ("amount", json!("3")),
        ])];

        let columns = infer_columns(&records, 5);

        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "amount");
    }

    #[test]
    fn test_build_create_table_sql() {
        let table = TableRef::parse("main.sales").unwrap();
        let columns = vec![ColumnDef { name: "amount".to_string(), column_type: ColumnType::Integer }];

        let sql = build_create_table_sql(&table, &columns);

        assert!(sql.starts_with("CREATE TABLE \"main\".\"sales\""));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("dataset_id INTEGER NOT NULL REFERENCES dataset(id)"));
        assert!(sql.contains("\"amount\" INTEGER"));
        assert!(sql.contains("created_at TEXT NOT NULL"));
        assert!(sql.contains("created_by TEXT"));

        let staged = TableRef::parse("staging.sales").unwrap();
        assert!(!build_create_table_sql(&staged, &columns).contains("REFERENCES"));
    }
}
