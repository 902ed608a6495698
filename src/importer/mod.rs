// ==========================================
// 通用导入引擎 - 导入层
// ==========================================
// 职责: 文件抽取 → 字段标准化 → 表结构演进 → 策略解析 → 落库 → 归档
// 支持: CSV, Excel (xlsx/xls), JSON, XML
// ==========================================

// 模块声明
pub mod archiver;
pub mod error;
pub mod field_normalizer;
pub mod file_parser;
pub mod import_job;
pub mod importer_trait;
pub mod metadata_resolver;
pub mod schema_manager;
pub mod strategy_resolver;
pub mod type_inference;

// 重导出核心类型
pub use archiver::{archive_all, archive_file, ArchiveOutcome};
pub use error::{ImportError, ImportResult};
pub use field_normalizer::{normalize_record, sanitize_identifier};
pub use file_parser::{CsvParser, ExcelParser, FormatExtractor, JsonParser, SpreadsheetKind, XmlParser};
pub use import_job::{discover_files, ImportJob, RunOptions};
pub use metadata_resolver::{MetadataResolver, ResolvedMetadata};
pub use schema_manager::{ColumnDef, GrantRoles, SchemaManager, TableSchema};
pub use strategy_resolver::{PlannedColumns, Resolution};
pub use type_inference::infer_type;

// 重导出 Trait 接口
pub use importer_trait::{ColumnWriter, FileParser, ImportRunner};
