// ==========================================
// 通用导入引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 建立引擎自有表（配置 / 参照数据 / 数据集 / 授权记录）
// - 按需附加 schema 限定名对应的数据库
// ==========================================

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前引擎表结构版本
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 共享连接（单作业单连接，顺序执行）
pub type SharedConnection = Arc<Mutex<Connection>>;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、初始化引擎表并包装为共享连接
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<SharedConnection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 初始化引擎自有表（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS import_strategy (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS import_config (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data_source TEXT NOT NULL,
            dataset_type TEXT NOT NULL,
            source_directory TEXT NOT NULL,
            archive_directory TEXT NOT NULL,
            file_pattern TEXT NOT NULL,
            file_format TEXT NOT NULL,
            target_table TEXT NOT NULL,
            strategy_id INTEGER NOT NULL REFERENCES import_strategy(id),
            label_source TEXT NOT NULL DEFAULT 'filename',
            label_location TEXT,
            filename_delimiter TEXT NOT NULL DEFAULT '_',
            date_source TEXT NOT NULL DEFAULT 'filename',
            date_location TEXT,
            date_format TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_modified_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS data_source (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_by TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS dataset_type (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_by TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS dataset (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            effective_date TEXT NOT NULL,
            data_source_id INTEGER NOT NULL REFERENCES data_source(id),
            dataset_type_id INTEGER NOT NULL REFERENCES dataset_type(id),
            import_config_id INTEGER,
            status TEXT NOT NULL DEFAULT 'NEW',
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS table_grant (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            schema_name TEXT NOT NULL,
            table_name TEXT NOT NULL,
            role_name TEXT NOT NULL,
            privileges TEXT NOT NULL,
            granted_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(schema_name, table_name, role_name)
        );

        INSERT OR IGNORE INTO import_strategy (id, name, description) VALUES
            (1, 'AUTO_EXTEND', '自动为新字段扩列'),
            (2, 'IGNORE_EXTRAS', '忽略目标表中不存在的字段'),
            (3, 'STRICT', '出现未定义字段时终止导入');
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 计算 schema 尚需附加的数据库路径
///
/// 说明：
/// - main / temp 为 SQLite 内置 schema，已附加的 schema 同样返回 None
/// - 其他 schema 对应主库同目录下的 `<schema>.db`（内存库则为内存库）
fn pending_attach_path(conn: &Connection, schema: &str) -> rusqlite::Result<Option<String>> {
    if schema.eq_ignore_ascii_case("main") || schema.eq_ignore_ascii_case("temp") {
        return Ok(None);
    }

    let mut main_file: Option<String> = None;
    let mut attached = false;
    {
        let mut stmt = conn.prepare("PRAGMA database_list")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?))
        })?;
        for row in rows {
            let (name, file) = row?;
            if name.eq_ignore_ascii_case(schema) {
                attached = true;
            }
            if name == "main" {
                main_file = file.filter(|f| !f.is_empty());
            }
        }
    }

    if attached {
        return Ok(None);
    }

    Ok(Some(match main_file {
        Some(file) => sibling_database_path(Path::new(&file), schema)
            .to_string_lossy()
            .to_string(),
        None => MEMORY_DATABASE.to_string(),
    }))
}

/// 确保 schema 可用（未附加时附加 `<schema>.db`，文件不存在则由 SQLite 创建）
pub fn ensure_schema_attached(conn: &Connection, schema: &str) -> rusqlite::Result<()> {
    let Some(attach_path) = pending_attach_path(conn, schema)? else {
        return Ok(());
    };

    // schema 名已由 TableRef 校验为合法标识符
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS \"{}\"", schema),
        params![attach_path],
    )?;
    tracing::info!(schema = %schema, path = %attach_path, "已附加 schema 数据库");
    Ok(())
}

/// schema 当前是否可查询（只读判断，不附加、不在磁盘上创建文件）
///
/// 未附加的内存 schema 视为不存在：新附加的内存库中没有任何表
pub fn schema_exists(conn: &Connection, schema: &str) -> rusqlite::Result<bool> {
    Ok(match pending_attach_path(conn, schema)? {
        None => true,
        Some(path) if path == MEMORY_DATABASE => false,
        Some(path) => Path::new(&path).is_file(),
    })
}

/// 默认数据库路径: <用户数据目录>/generic-import/import.db
///
/// 拿不到用户数据目录时回退到当前目录
pub fn default_db_path() -> PathBuf {
    match dirs::data_dir() {
        Some(data_dir) => data_dir.join("generic-import").join("import.db"),
        None => PathBuf::from("./import.db"),
    }
}

const MEMORY_DATABASE: &str = ":memory:";

fn sibling_database_path(main_file: &Path, schema: &str) -> PathBuf {
    let dir = main_file.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}.db", schema))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
        let strategies: i64 = conn
            .query_row("SELECT COUNT(*) FROM import_strategy", [], |row| row.get(0))
            .unwrap();
        assert_eq!(strategies, 3);
    }

    #[test]
    fn test_attach_schema_in_memory() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema_attached(&conn, "staging").unwrap();
        // 再次调用不应重复附加
        ensure_schema_attached(&conn, "staging").unwrap();
        conn.execute_batch("CREATE TABLE staging.t (x INTEGER)").unwrap();
    }

    #[test]
    fn test_schema_exists_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("import.db")).unwrap();
        let sibling = dir.path().join("staging.db");

        assert!(schema_exists(&conn, "main").unwrap());
        assert!(!schema_exists(&conn, "staging").unwrap());
        assert!(!sibling.exists());

        ensure_schema_attached(&conn, "staging").unwrap();
        assert!(sibling.exists());
        assert!(schema_exists(&conn, "staging").unwrap());
    }

    #[test]
    fn test_default_db_path() {
        let path = default_db_path();
        assert!(path.ends_with("import.db"));
    }
}
