// ==========================================
// 通用导入引擎 - 数据集与参照数据仓储
// ==========================================
// 职责: data_source / dataset_type / dataset 表的数据访问
// 红线: Repository 不含业务规则，只做数据 CRUD
// 说明: 每个写操作单独提交（数据集创建、状态更新互不依赖）
// ==========================================

use crate::db::SharedConnection;
use crate::domain::dataset::{Dataset, NewDataset};
use crate::domain::types::DatasetStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// 参照数据表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTable {
    DataSource,
    DatasetType,
}

impl ReferenceTable {
    fn table_name(&self) -> &'static str {
        match self {
            ReferenceTable::DataSource => "data_source",
            ReferenceTable::DatasetType => "dataset_type",
        }
    }
}

// ==========================================
// DatasetRepository Trait
// ==========================================
// 实现者: DatasetRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait DatasetRepository: Send + Sync {
    /// 按名称查找参照数据，不存在时创建
    ///
    /// # 参数
    /// - table: 参照表
    /// - name: 名称（唯一）
    /// - note: 自动创建时写入的描述
    /// - created_by: 审计人
    ///
    /// # 返回
    /// - Ok((id, created)): 主键与是否新建
    async fn ensure_reference(
        &self,
        table: ReferenceTable,
        name: &str,
        note: &str,
        created_by: &str,
    ) -> RepositoryResult<(i64, bool)>;

    /// 创建数据集（状态 NEW）
    async fn create_dataset(&self, dataset: &NewDataset) -> RepositoryResult<i64>;

    /// 更新数据集状态（校验状态迁移）
    async fn update_status(&self, dataset_id: i64, status: DatasetStatus) -> RepositoryResult<()>;

    async fn find_by_id(&self, dataset_id: i64) -> RepositoryResult<Option<Dataset>>;

    /// 查询某导入配置产出的全部数据集（按 id 升序）
    async fn list_by_config(&self, import_config_id: i64) -> RepositoryResult<Vec<Dataset>>;
}

/// 数据集状态迁移表
///
/// NEW → ACTIVE | FAILED；ACTIVE → SUPERSEDED | ARCHIVED；SUPERSEDED → ARCHIVED
pub fn can_transition(from: DatasetStatus, to: DatasetStatus) -> bool {
    use DatasetStatus::*;
    matches!(
        (from, to),
        (New, Active) | (New, Failed) | (Active, Superseded) | (Active, Archived) | (Superseded, Archived)
    )
}

// ==========================================
// DatasetRepositoryImpl
// ==========================================
pub struct DatasetRepositoryImpl {
    conn: SharedConnection,
}

impl DatasetRepositoryImpl {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> rusqlite::Result<(Dataset, String)> {
        let status_raw: String = row.get(6)?;
        Ok((
            Dataset {
                id: row.get(0)?,
                label: row.get(1)?,
                effective_date: row.get::<_, NaiveDate>(2)?,
                data_source_id: row.get(3)?,
                dataset_type_id: row.get(4)?,
                import_config_id: row.get(5)?,
                status: DatasetStatus::New,
                created_by: row.get(7)?,
                created_at: row.get::<_, DateTime<Utc>>(8)?,
                updated_at: row.get::<_, DateTime<Utc>>(9)?,
            },
            status_raw,
        ))
    }

    fn with_status((mut dataset, raw): (Dataset, String)) -> RepositoryResult<Dataset> {
        dataset.status = DatasetStatus::parse(&raw).ok_or_else(|| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message: format!("未知的数据集状态: {}", raw),
        })?;
        Ok(dataset)
    }
}

const DATASET_COLUMNS: &str = "id, label, effective_date, data_source_id, dataset_type_id, \
     import_config_id, status, created_by, created_at, updated_at";

#[async_trait]
impl DatasetRepository for DatasetRepositoryImpl {
    async fn ensure_reference(
        &self,
        table: ReferenceTable,
        name: &str,
        note: &str,
        created_by: &str,
    ) -> RepositoryResult<(i64, bool)> {
        let conn = self.get_conn()?;
        let table_name = table.table_name();

        let existing: Option<i64> = conn
            .query_row(
                &format!("SELECT id FROM {} WHERE name = ?1", table_name),
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok((id, false));
        }

        conn.execute(
            &format!(
                "INSERT INTO {} (name, description, created_by) VALUES (?1, ?2, ?3)",
                table_name
            ),
            params![name, note, created_by],
        )?;
        Ok((conn.last_insert_rowid(), true))
    }

    async fn create_dataset(&self, dataset: &NewDataset) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let now = Utc::now();
        conn.execute(
            r#"
            INSERT INTO dataset (
                label, effective_date, data_source_id, dataset_type_id,
                import_config_id, status, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                dataset.label,
                dataset.effective_date,
                dataset.data_source_id,
                dataset.dataset_type_id,
                dataset.import_config_id,
                DatasetStatus::New.as_str(),
                dataset.created_by,
                now,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update_status(&self, dataset_id: i64, status: DatasetStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM dataset WHERE id = ?1",
                params![dataset_id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.ok_or_else(|| RepositoryError::NotFound {
            entity: "dataset".to_string(),
            id: dataset_id.to_string(),
        })?;

        let from = DatasetStatus::parse(&current).ok_or_else(|| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message: format!("未知的数据集状态: {}", current),
        })?;
        if !can_transition(from, status) {
            return Err(RepositoryError::InvalidStateTransition {
                from: from.to_string(),
                to: status.to_string(),
            });
        }

        conn.execute(
            "UPDATE dataset SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now(), dataset_id],
        )?;
        Ok(())
    }

    async fn find_by_id(&self, dataset_id: i64) -> RepositoryResult<Option<Dataset>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM dataset WHERE id = ?1", DATASET_COLUMNS),
                params![dataset_id],
                Self::map_row,
            )
            .optional()?;
        row.map(Self::with_status).transpose()
    }

    async fn list_by_config(&self, import_config_id: i64) -> RepositoryResult<Vec<Dataset>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM dataset WHERE import_config_id = ?1 ORDER BY id",
            DATASET_COLUMNS
        ))?;
        let rows = stmt.query_map(params![import_config_id], Self::map_row)?;

        let mut datasets = Vec::new();
        for row in rows {
            datasets.push(Self::with_status(row?)?);
        }
        Ok(datasets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use std::sync::{Arc, Mutex};

    fn setup() -> DatasetRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        DatasetRepositoryImpl::new(Arc::new(Mutex::new(conn)))
    }

    #[tokio::test]
    async fn test_ensure_reference_is_idempotent() {
        let repo = setup();

        let (first, created) = repo
            .ensure_reference(ReferenceTable::DataSource, "erp", "auto-created by import config 1", "tester")
            .await
            .unwrap();
        assert!(created);

        let (second, created) = repo
            .ensure_reference(ReferenceTable::DataSource, "erp", "ignored", "tester")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_dataset_lifecycle() {
        let repo = setup();
        let (source_id, _) = repo
            .ensure_reference(ReferenceTable::DataSource, "erp", "n", "tester")
            .await
            .unwrap();
        let (type_id, _) = repo
            .ensure_reference(ReferenceTable::DatasetType, "sales", "n", "tester")
            .await
            .unwrap();

        let id = repo
            .create_dataset(&NewDataset {
                label: "sales".to_string(),
                effective_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                data_source_id: source_id,
                dataset_type_id: type_id,
                import_config_id: 7,
                created_by: "tester".to_string(),
            })
            .await
            .unwrap();

        let dataset = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(dataset.status, DatasetStatus::New);
        assert_eq!(dataset.effective_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());

        repo.update_status(id, DatasetStatus::Active).await.unwrap();
        let err = repo.update_status(id, DatasetStatus::Failed).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidStateTransition { .. }));

        let listed = repo.list_by_config(7).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, DatasetStatus::Active);
    }

    #[tokio::test]
    async fn test_update_status_missing_dataset() {
        let repo = setup();
        let err = repo.update_status(42, DatasetStatus::Active).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
