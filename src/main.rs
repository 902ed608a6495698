// ==========================================
// 通用导入引擎 - 命令行入口
// ==========================================
// 用法:
//   generic-import --config-id 3 [--run-date 2024-01-15] [--dry-run] [--db PATH] [--log-json]
//
// 成功: 打印汇总行并以 0 退出
// 失败: 打印错误链并以非 0 退出
// ==========================================

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::Parser;
use generic_import_engine::config::ConfigManager;
use generic_import_engine::db::{default_db_path, open_shared_connection};
use generic_import_engine::importer::{ImportJob, ImportRunner, RunOptions};
use generic_import_engine::logging;
use generic_import_engine::repository::DatasetRepositoryImpl;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "generic-import", version, about = "按导入配置将文件导入 SQLite")]
struct Cli {
    /// 导入配置 ID
    #[arg(long)]
    config_id: i64,

    /// 运行日期（YYYY-MM-DD，默认今天）
    #[arg(long)]
    run_date: Option<NaiveDate>,

    /// 只解析与规划，不写库、不归档
    #[arg(long)]
    dry_run: bool,

    /// 数据库文件路径
    #[arg(long, env = "GENERIC_IMPORT_DB")]
    db: Option<PathBuf>,

    /// 以 JSON 行格式输出日志
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    let db_path = cli.db.unwrap_or_else(default_db_path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("无法创建数据库目录: {}", parent.display()))?;
    }
    tracing::info!(db = %db_path.display(), version = generic_import_engine::VERSION, "使用数据库");

    let conn = open_shared_connection(&db_path.to_string_lossy())
        .with_context(|| format!("无法打开数据库: {}", db_path.display()))?;

    let job = ImportJob::new(
        DatasetRepositoryImpl::new(conn.clone()),
        ConfigManager::from_connection(conn.clone()),
        conn,
    );

    let run_date = cli.run_date.unwrap_or_else(|| Local::now().date_naive());
    let options = RunOptions::new(run_date).dry_run(cli.dry_run);

    let summary = job
        .run(cli.config_id, options)
        .await
        .with_context(|| format!("导入失败: config_id={}", cli.config_id))?;

    println!("{}", summary);
    Ok(())
}
