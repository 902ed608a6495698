// ==========================================
// 失败日志集成测试
// ==========================================
// 测试目标: 任一致命路径（含数据集创建之前）都输出
//           带运行 ID、耗时与部分计数的失败事件
// ==========================================

mod test_helpers;

use chrono::NaiveDate;
use generic_import_engine::importer::{ImportError, ImportRunner, RunOptions};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use test_helpers::{five_row_csv, TestConfig, TestEnv};
use tracing::field::{Field, Visit};
use tracing::span::{Id, Record as SpanRecord};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

const FAILURE_MESSAGE: &str = "导入失败";
const SPAN_RUN_ID: &str = "span.run_id";

// ==========================================
// 事件捕获层
// ==========================================
#[derive(Default)]
struct FieldMap(BTreeMap<String, String>);

impl Visit for FieldMap {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

struct RunId(String);

#[derive(Clone, Default)]
struct CapturedEvents {
    events: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
}

impl CapturedEvents {
    fn failures(&self) -> Vec<BTreeMap<String, String>> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.get("message").map(String::as_str) == Some(FAILURE_MESSAGE))
            .cloned()
            .collect()
    }
}

impl<S> Layer<S> for CapturedEvents
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_record(&self, id: &Id, values: &SpanRecord<'_>, ctx: Context<'_, S>) {
        let mut fields = FieldMap::default();
        values.record(&mut fields);
        if let (Some(run_id), Some(span)) = (fields.0.remove("run_id"), ctx.span(id)) {
            span.extensions_mut().insert(RunId(run_id));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = FieldMap::default();
        event.record(&mut fields);

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(run_id) = span.extensions().get::<RunId>() {
                    fields.0.insert(SPAN_RUN_ID.to_string(), run_id.0.clone());
                    break;
                }
            }
        }
        self.events.lock().unwrap().push(fields.0);
    }
}

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
}

/// 在捕获订阅器下运行一次导入，返回错误与失败事件
async fn run_expecting_failure(
    env: &TestEnv,
    config_id: i64,
) -> (ImportError, Vec<BTreeMap<String, String>>) {
    let captured = CapturedEvents::default();
    let subscriber = tracing_subscriber::registry().with(captured.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let err = env
        .job()
        .run(config_id, RunOptions::new(run_date()))
        .await
        .expect_err("Import should fail");
    (err, captured.failures())
}

fn assert_failure_event(event: &BTreeMap<String, String>, dataset_id: &str) {
    assert_eq!(event.get("dataset_id").map(String::as_str), Some(dataset_id));
    assert!(event.contains_key("elapsed_ms"), "missing elapsed_ms: {:?}", event);
    assert!(event.contains_key("error"), "missing error: {:?}", event);
    for counter in ["files_processed", "records_extracted", "records_transformed", "records_loaded"] {
        assert!(event.contains_key(counter), "missing {}: {:?}", counter, event);
    }
    let run_id = event.get(SPAN_RUN_ID).expect("Failure event should carry run_id");
    assert_eq!(run_id.len(), 36);
}

// ==========================================
// 数据集创建之前的失败
// ==========================================
#[tokio::test]
async fn test_config_not_found_logs_failure() {
    let env = TestEnv::new().unwrap();
    let config_id = env.insert_config(&TestConfig::csv("main.sales").inactive());

    let (err, failures) = run_expecting_failure(&env, config_id).await;

    assert!(matches!(err, ImportError::ConfigNotFound(_)));
    assert_eq!(failures.len(), 1);
    assert_failure_event(&failures[0], "None");
    assert_eq!(failures[0]["files_processed"], "0");
}

#[tokio::test]
async fn test_missing_source_directory_logs_failure() {
    let env = TestEnv::new().unwrap();
    let config_id = env.insert_config(&TestConfig::csv("main.sales"));
    std::fs::remove_dir_all(&env.source_dir).unwrap();

    let (err, failures) = run_expecting_failure(&env, config_id).await;

    assert!(matches!(err, ImportError::SourceDirectoryMissing(_)));
    assert_eq!(failures.len(), 1);
    assert_failure_event(&failures[0], "None");
    assert_eq!(env.query_i64("SELECT COUNT(*) FROM dataset"), 0);
}

// ==========================================
// 数据集创建之后的失败
// ==========================================
#[tokio::test]
async fn test_strict_failure_logs_partial_counts() {
    let env = TestEnv::new().unwrap();
    env.execute_batch(
        "CREATE TABLE sales (id INTEGER PRIMARY KEY AUTOINCREMENT, dataset_id INTEGER NOT NULL, \
         a INTEGER, created_at TEXT, created_by TEXT);",
    );
    env.write_source("sales_20240115.csv", &five_row_csv());
    let config_id = env.insert_config(&TestConfig::csv("main.sales").strategy(3));

    let (err, failures) = run_expecting_failure(&env, config_id).await;

    assert!(matches!(err, ImportError::UnexpectedFields { .. }));
    assert_eq!(failures.len(), 1);
    assert_failure_event(&failures[0], "Some(1)");
    assert_eq!(failures[0]["records_extracted"], "5");
    assert_eq!(failures[0]["records_loaded"], "0");
}
