// ==========================================
// 通用导入引擎 - 导入作业编排
// ==========================================
// 流程:
// 1. 加载配置（不存在/未启用 → 立即失败）
// 2. 确保参照数据（data_source / dataset_type）存在
// 3. 发现文件 → 预读首个文件解析标签/日期 → 创建数据集（NEW）
// 4. 逐文件抽取并打标
// 5. 字段标准化 + 审计戳 → 确保目标表 → 策略解析
// 6. 单事务批量写入 → 数据集 ACTIVE（任一失败 → FAILED）
// 7. 归档源文件 + 更新最后运行时间
//
// dry run: 执行 1-5，不创建数据集、不执行 DDL、不写入、不归档
// ==========================================

use crate::config::import_config_trait::{EngineSettings, ImportConfigReader};
use crate::db::SharedConnection;
use crate::domain::dataset::{JobSummary, NewDataset, ReferenceIds};
use crate::domain::import_config::{ImportConfig, ImportStrategy};
use crate::domain::record::{
    Record, AUDIT_COLUMNS, COLUMN_CREATED_AT, COLUMN_CREATED_BY, FIELD_DATASET_DATE,
    FIELD_DATASET_LABEL, FIELD_SOURCE_FILE,
};
use crate::domain::types::{ColumnType, DatasetStatus, JobStage};
use crate::importer::archiver::archive_all;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_normalizer::normalize_record;
use crate::importer::file_parser::{base_name, FormatExtractor};
use crate::importer::importer_trait::{ColumnWriter, ImportRunner};
use crate::importer::metadata_resolver::{MetadataResolver, ResolvedMetadata};
use crate::importer::schema_manager::{infer_columns, GrantRoles, SchemaManager};
use crate::importer::strategy_resolver::{resolve, PlannedColumns, Resolution};
use crate::repository::dataset_repo::{DatasetRepository, ReferenceTable};
use crate::repository::target_table_repo::TargetTableRepository;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// RunOptions - 运行参数
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub run_date: NaiveDate,
    pub dry_run: bool,
}

impl RunOptions {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// ==========================================
// 阶段跟踪（状态机）
// ==========================================
struct StageTracker {
    run_id: String,
    stage: JobStage,
}

impl StageTracker {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            stage: JobStage::Initialized,
        }
    }

    fn advance(&mut self, to: JobStage) -> ImportResult<()> {
        if !self.stage.can_transition_to(to) {
            return Err(ImportError::Other(anyhow::anyhow!(
                "非法的作业阶段转换: {} → {}",
                self.stage,
                to
            )));
        }
        info!(run_id = %self.run_id, from = %self.stage, to = %to, "作业阶段转换");
        self.stage = to;
        Ok(())
    }

    fn fail(&mut self) {
        if !self.stage.is_terminal() {
            warn!(run_id = %self.run_id, from = %self.stage, "作业进入失败状态");
            self.stage = JobStage::Failed;
        }
    }
}

// ==========================================
// 运行进度（失败时用于输出部分计数）
// ==========================================
#[derive(Debug, Default)]
struct Progress {
    files_processed: usize,
    records_extracted: usize,
    records_transformed: usize,
    records_loaded: usize,
    files_archived: usize,
    archive_failures: usize,
    columns_added: Vec<String>,
    fields_ignored: Vec<String>,
}

impl Progress {
    /// 致命错误统一出口: 错误 + 耗时 + 已完成的部分计数
    fn log_failure(&self, error: &ImportError, dataset_id: Option<i64>, start_time: Instant) {
        error!(
            error = %error,
            dataset_id = ?dataset_id,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            files_processed = self.files_processed,
            records_extracted = self.records_extracted,
            records_transformed = self.records_transformed,
            records_loaded = self.records_loaded,
            "导入失败"
        );
    }
}

// ==========================================
// 数据集创建前的准备结果
// ==========================================
struct Prepared {
    config: ImportConfig,
    strategy: ImportStrategy,
    settings: EngineSettings,
    files: Vec<PathBuf>,
    metadata: ResolvedMetadata,
    peeked: Option<Vec<Record>>,
    dataset_id: Option<i64>,
}

/// 列出源目录中名称匹配正则的文件（非递归，按名称排序）
pub fn discover_files(source_directory: &Path, pattern: &str) -> ImportResult<Vec<PathBuf>> {
    if !source_directory.is_dir() {
        return Err(ImportError::SourceDirectoryMissing(
            source_directory.display().to_string(),
        ));
    }

    let regex = Regex::new(pattern).map_err(|e| {
        ImportError::ValidationError(format!("文件名正则无效 ({}): {}", pattern, e))
    })?;

    let mut files = Vec::new();
    for entry in fs::read_dir(source_directory)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if regex.is_match(&base_name(&path)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// 为记录附加来源文件与数据集元数据
fn tag_record(mut record: Record, file_name: &str, metadata: &ResolvedMetadata) -> Record {
    record.insert(FIELD_SOURCE_FILE.to_string(), Value::String(file_name.to_string()));
    record.insert(FIELD_DATASET_LABEL.to_string(), Value::String(metadata.label.clone()));
    record.insert(
        FIELD_DATASET_DATE.to_string(),
        Value::String(metadata.effective_date.format("%Y-%m-%d").to_string()),
    );
    record
}

// ==========================================
// ImportJob - 导入作业编排器
// ==========================================
pub struct ImportJob<D, C>
where
    D: DatasetRepository,
    C: ImportConfigReader,
{
    // 数据集/参照数据仓储
    datasets: D,

    // 配置读取器
    config: C,

    // 目标表所在连接
    conn: SharedConnection,
}

impl<D, C> ImportJob<D, C>
where
    D: DatasetRepository,
    C: ImportConfigReader,
{
    /// 创建新的 ImportJob 实例
    ///
    /// # 参数
    /// - datasets: 数据集仓储
    /// - config: 配置读取器
    /// - conn: 目标表所在数据库连接
    pub fn new(datasets: D, config: C, conn: SharedConnection) -> Self {
        Self {
            datasets,
            config,
            conn,
        }
    }

    /// 确保参照数据存在，缺失时自动创建
    async fn ensure_reference_data(
        &self,
        config: &ImportConfig,
        settings: &EngineSettings,
    ) -> ImportResult<ReferenceIds> {
        let note = format!("auto-created by import config {}", config.id);

        let (data_source_id, created) = self
            .datasets
            .ensure_reference(
                ReferenceTable::DataSource,
                &config.data_source,
                &note,
                &settings.created_by,
            )
            .await
            .map_err(|e| ImportError::ReferenceDataError(e.to_string()))?;
        if created {
            info!(data_source = %config.data_source, id = data_source_id, "已自动创建数据源");
        }

        let (dataset_type_id, created) = self
            .datasets
            .ensure_reference(
                ReferenceTable::DatasetType,
                &config.dataset_type,
                &note,
                &settings.created_by,
            )
            .await
            .map_err(|e| ImportError::ReferenceDataError(e.to_string()))?;
        if created {
            info!(dataset_type = %config.dataset_type, id = dataset_type_id, "已自动创建数据集类型");
        }

        Ok(ReferenceIds {
            data_source_id,
            dataset_type_id,
        })
    }

    /// 抽取全部文件并打标
    ///
    /// 预读过的首个文件直接复用其记录
    fn extract_all(
        &self,
        config: &ImportConfig,
        resolver: &MetadataResolver<'_>,
        files: &[PathBuf],
        mut peeked: Option<Vec<Record>>,
        progress: &mut Progress,
    ) -> ImportResult<Vec<Record>> {
        let extractor = FormatExtractor::for_format(config.file_format);
        let mut all = Vec::new();

        for (idx, file) in files.iter().enumerate() {
            let records = match (idx, peeked.take()) {
                (0, Some(records)) => records,
                _ => extractor.extract(file)?,
            };

            let file_name = base_name(file);
            let metadata = resolver.resolve(Some(file), records.first());
            debug!(
                file = %file_name,
                records = records.len(),
                label = %metadata.label,
                effective_date = %metadata.effective_date,
                "文件抽取完成"
            );

            progress.files_processed += 1;
            progress.records_extracted += records.len();
            all.extend(
                records
                    .into_iter()
                    .map(|r| tag_record(r, &file_name, &metadata)),
            );
        }
        Ok(all)
    }

    /// 标准化 + 审计戳 + 确保目标表 + 策略解析
    ///
    /// 同步执行，dry run 的扩列记录器不跨越 await
    fn transform(
        &self,
        config: &ImportConfig,
        strategy: &ImportStrategy,
        settings: &EngineSettings,
        records: Vec<Record>,
        dry_run: bool,
        progress: &mut Progress,
    ) -> ImportResult<(Resolution, Vec<(String, ColumnType)>)> {
        let created_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let records: Vec<Record> = records
            .into_iter()
            .map(|r| {
                let mut r = normalize_record(r);
                r.insert(COLUMN_CREATED_AT.to_string(), Value::String(created_at.clone()));
                r.insert(COLUMN_CREATED_BY.to_string(), Value::String(settings.created_by.clone()));
                r
            })
            .collect();
        progress.records_transformed = records.len();

        if records.is_empty() {
            info!(table = %config.target_table, "无可写入记录，跳过目标表处理");
            return Ok((Resolution::default(), Vec::new()));
        }

        let table = &config.target_table;
        let schema_manager = SchemaManager::new(
            self.conn.clone(),
            GrantRoles {
                read_write: settings.role_read_write.clone(),
                read_only: settings.role_read_only.clone(),
            },
        );

        let planned = PlannedColumns::new();
        let (existing, writer): (BTreeSet<String>, &dyn ColumnWriter) = if dry_run {
            let existing = if schema_manager.exists(table)? {
                schema_manager.column_names(table)?
            } else {
                let columns = infer_columns(&records, settings.sample_size);
                info!(
                    table = %table,
                    columns = ?columns.iter().map(|c| format!("{} {}", c.name, c.column_type)).collect::<Vec<_>>(),
                    "[dry run] 目标表不存在，计划从样本建表"
                );
                columns.into_iter().map(|c| c.name).collect()
            };
            (existing, &planned as &dyn ColumnWriter)
        } else {
            if !schema_manager.exists(table)? {
                schema_manager.create_from_sample(table, &records, settings.sample_size)?;
            }
            // 建表后重新读取列
            (schema_manager.column_names(table)?, &schema_manager as &dyn ColumnWriter)
        };

        let resolution = resolve(
            strategy.kind,
            table,
            records,
            &existing,
            writer,
            settings.sample_size,
        )?;
        progress.columns_added = resolution.added_columns.clone();
        progress.fields_ignored = resolution.ignored_fields.clone();

        let load_columns = if dry_run {
            Vec::new()
        } else {
            let schema = schema_manager.columns_of(table)?;
            resolution
                .columns
                .iter()
                .map(String::as_str)
                .chain(AUDIT_COLUMNS)
                .map(|name| {
                    let column_type = schema.column_type(name).unwrap_or(ColumnType::Text);
                    (name.to_string(), column_type)
                })
                .collect()
        };

        Ok((resolution, load_columns))
    }

    /// 数据集创建之后的处理（抽取 → 转换 → 写入）
    #[allow(clippy::too_many_arguments)]
    fn process(
        &self,
        config: &ImportConfig,
        strategy: &ImportStrategy,
        settings: &EngineSettings,
        resolver: &MetadataResolver<'_>,
        files: &[PathBuf],
        peeked: Option<Vec<Record>>,
        dataset_id: Option<i64>,
        tracker: &mut StageTracker,
        progress: &mut Progress,
    ) -> ImportResult<()> {
        let records = self.extract_all(config, resolver, files, peeked, progress)?;
        tracker.advance(JobStage::Extracted)?;

        let dry_run = dataset_id.is_none();
        let (resolution, load_columns) =
            self.transform(config, strategy, settings, records, dry_run, progress)?;
        tracker.advance(JobStage::Transformed)?;

        match dataset_id {
            Some(dataset_id) => {
                let repo = TargetTableRepository::new(self.conn.clone());
                progress.records_loaded = repo
                    .insert_records(&config.target_table, dataset_id, &load_columns, &resolution.records)
                    .map_err(|e| ImportError::LoadError {
                        table: config.target_table.to_string(),
                        message: e.to_string(),
                    })?;
                info!(
                    table = %config.target_table,
                    dataset_id,
                    rows = progress.records_loaded,
                    "数据写入完成"
                );
            }
            None => {
                info!(
                    table = %config.target_table,
                    rows = resolution.records.len(),
                    "[dry run] 跳过数据写入"
                );
            }
        }
        tracker.advance(JobStage::Loaded)?;
        Ok(())
    }

    /// 步骤 1-3: 加载配置 → 参照数据 → 发现文件并解析元数据 → 创建数据集
    ///
    /// 此阶段任一失败时尚无数据集，由调用方统一记录失败日志
    async fn prepare(
        &self,
        config_id: i64,
        options: RunOptions,
        tracker: &mut StageTracker,
    ) -> ImportResult<Prepared> {
        // === 步骤 1: 加载配置 ===
        let config = self.config.load_import_config(config_id).await?;
        let strategy = self.config.load_strategy(config.strategy_id).await?;
        let settings = self.config.engine_settings().await?;
        debug!(
            strategy = %strategy.kind,
            sample_size = settings.sample_size,
            "配置加载完成"
        );

        // === 步骤 2: 参照数据 ===
        let reference = self.ensure_reference_data(&config, &settings).await?;
        tracker.advance(JobStage::ReferenceDataEnsured)?;

        // === 步骤 3: 发现文件，预读首个文件解析数据集元数据 ===
        let files = discover_files(&config.source_directory, &config.file_pattern)?;
        info!(
            source_directory = %config.source_directory.display(),
            files = files.len(),
            "文件发现完成"
        );

        let resolver = MetadataResolver::new(&config, options.run_date, settings.default_label.clone());
        let (metadata, peeked) = match files.first() {
            None => {
                warn!(label = %settings.default_label, "未匹配到文件，使用默认标签");
                (
                    ResolvedMetadata {
                        label: settings.default_label.clone(),
                        effective_date: options.run_date,
                    },
                    None,
                )
            }
            Some(first) if resolver.needs_content() => {
                let records = FormatExtractor::for_format(config.file_format).extract(first)?;
                (resolver.resolve(Some(first), records.first()), Some(records))
            }
            Some(first) => (resolver.resolve(Some(first), None), None),
        };

        let dataset_id = if options.dry_run {
            info!(
                label = %metadata.label,
                effective_date = %metadata.effective_date,
                "[dry run] 跳过数据集创建"
            );
            None
        } else {
            let id = self
                .datasets
                .create_dataset(&NewDataset {
                    label: metadata.label.clone(),
                    effective_date: metadata.effective_date,
                    data_source_id: reference.data_source_id,
                    dataset_type_id: reference.dataset_type_id,
                    import_config_id: config.id,
                    created_by: settings.created_by.clone(),
                })
                .await?;
            info!(dataset_id = id, label = %metadata.label, "数据集已创建");
            Some(id)
        };
        tracker.advance(JobStage::DatasetCreated)?;

        Ok(Prepared {
            config,
            strategy,
            settings,
            files,
            metadata,
            peeked,
            dataset_id,
        })
    }

    /// 归档 + 更新最后运行时间（失败只记录，不影响数据集状态）
    async fn clean_up(&self, config: &ImportConfig, files: &[PathBuf], progress: &mut Progress) {
        let outcome = archive_all(files, &config.archive_directory);
        progress.files_archived = outcome.archived.len();
        progress.archive_failures = outcome.failures;

        if let Err(e) = self.config.touch_last_modified(config.id, Utc::now()).await {
            warn!(config_id = config.id, error = %e, "最后运行时间更新失败");
        }
    }
}

#[async_trait]
impl<D, C> ImportRunner for ImportJob<D, C>
where
    D: DatasetRepository + Send + Sync,
    C: ImportConfigReader + Send + Sync,
{
    #[instrument(skip(self, options), fields(run_id, dry_run = options.dry_run))]
    async fn run(&self, config_id: i64, options: RunOptions) -> ImportResult<JobSummary> {
        let start_time = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        info!(config_id, run_date = %options.run_date, "开始导入");

        let mut tracker = StageTracker::new(&run_id);
        let mut progress = Progress::default();

        let prepared = match self.prepare(config_id, options, &mut tracker).await {
            Ok(prepared) => prepared,
            Err(e) => {
                tracker.fail();
                progress.log_failure(&e, None, start_time);
                return Err(e);
            }
        };
        let Prepared {
            config,
            strategy,
            settings,
            files,
            metadata,
            peeked,
            dataset_id,
        } = prepared;
        let resolver = MetadataResolver::new(&config, options.run_date, settings.default_label.clone());

        // === 步骤 4-6: 抽取 → 转换 → 写入 ===
        let result = self.process(
            &config,
            &strategy,
            &settings,
            &resolver,
            &files,
            peeked,
            dataset_id,
            &mut tracker,
            &mut progress,
        );

        if let Err(e) = result {
            tracker.fail();
            if let Some(id) = dataset_id {
                if let Err(status_err) = self.datasets.update_status(id, DatasetStatus::Failed).await {
                    error!(dataset_id = id, error = %status_err, "数据集状态更新为 FAILED 失败");
                }
            }
            progress.log_failure(&e, dataset_id, start_time);
            return Err(e);
        }

        // === 步骤 7: 数据集生效 → 归档 ===
        if let Some(id) = dataset_id {
            if let Err(e) = self.datasets.update_status(id, DatasetStatus::Active).await {
                let e = ImportError::from(e);
                tracker.fail();
                progress.log_failure(&e, dataset_id, start_time);
                return Err(e);
            }
            self.clean_up(&config, &files, &mut progress).await;
        } else {
            info!(files = files.len(), "[dry run] 跳过归档与最后运行时间更新");
        }
        tracker.advance(JobStage::Cleaned)?;

        let elapsed_time = start_time.elapsed();
        let summary = JobSummary {
            run_id,
            config_id,
            dataset_id,
            label: metadata.label,
            effective_date: metadata.effective_date,
            files_processed: progress.files_processed,
            records_extracted: progress.records_extracted,
            records_transformed: progress.records_transformed,
            records_loaded: progress.records_loaded,
            files_archived: progress.files_archived,
            archive_failures: progress.archive_failures,
            columns_added: progress.columns_added,
            fields_ignored: progress.fields_ignored,
            dry_run: options.dry_run,
            elapsed_time,
        };

        info!(
            dataset_id = ?summary.dataset_id,
            files = summary.files_processed,
            extracted = summary.records_extracted,
            loaded = summary.records_loaded,
            archived = summary.files_archived,
            archive_failures = summary.archive_failures,
            elapsed_ms = elapsed_time.as_millis() as u64,
            "导入完成"
        );
        Ok(summary)
    }
}
