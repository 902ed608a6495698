// ==========================================
// 通用导入引擎 - 导入组件 Trait
// ==========================================
// 职责: 定义导入管道各组件接口（不包含实现）
// ==========================================

use crate::domain::dataset::JobSummary;
use crate::domain::import_config::TableRef;
use crate::domain::record::Record;
use crate::domain::types::ColumnType;
use crate::importer::error::ImportResult;
use crate::importer::import_job::RunOptions;
use async_trait::async_trait;
use std::path::Path;

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件抽取接口
// 实现者: CsvParser, ExcelParser, JsonParser, XmlParser
pub trait FileParser: Send + Sync {
    /// 解析文件为有序记录列表
    ///
    /// # 参数
    /// - file_path: 文件路径
    ///
    /// # 返回
    /// - Ok(Vec<Record>): 记录列表（空文件返回空列表）
    /// - Err: 文件读取错误、格式错误（有兜底的格式不会返回错误）
    fn parse_to_records(&self, file_path: &Path) -> ImportResult<Vec<Record>>;
}

// ==========================================
// ColumnWriter Trait
// ==========================================
// 用途: 策略解析器扩列接口
// 实现者: SchemaManager（真实 DDL）, PlannedColumns（dry run 仅记录）
pub trait ColumnWriter {
    /// 追加列（已存在时为空操作）
    ///
    /// # 返回
    /// - Ok(true): 新增了列
    /// - Ok(false): 列已存在
    fn add_column(&self, table: &TableRef, name: &str, column_type: ColumnType)
        -> ImportResult<bool>;
}

// ==========================================
// ImportRunner Trait
// ==========================================
// 用途: 单次导入作业入口（CLI 与测试共用）
// 实现者: ImportJob
#[async_trait]
pub trait ImportRunner: Send + Sync {
    /// 执行一次导入
    ///
    /// # 参数
    /// - config_id: 导入配置 ID
    /// - options: 运行日期 / dry run
    ///
    /// # 返回
    /// - Ok(JobSummary): 作业汇总
    /// - Err: 配置缺失、校验失败、抽取或落库失败（数据集已标记为 FAILED）
    async fn run(&self, config_id: i64, options: RunOptions) -> ImportResult<JobSummary>;
}
