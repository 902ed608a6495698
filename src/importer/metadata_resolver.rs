// ==========================================
// 通用导入引擎 - 标签/日期解析器
// ==========================================
// 来源模式:
// - static:       配置字面值
// - filename:     去扩展名的文件名按分隔符切分，取第 N 段（越界/非数字 → 整个文件名）
// - file_content: 首条记录的指定字段（缺失 → 回退为文件名）
// 日期: 经格式文法翻译后解析，失败时回退为运行日期
// ==========================================

use crate::domain::import_config::{ImportConfig, MetadataRule};
use crate::domain::record::{is_blank, value_as_text, Record};
use crate::domain::types::MetadataSource;
use crate::importer::field_normalizer::sanitize_identifier;
use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;
use tracing::{debug, warn};

/// 日期格式文法词表（按长度优先匹配）
const DATE_TOKENS: [(&str, &str); 9] = [
    ("YYYY", "%Y"),
    ("HH24", "%H"),
    ("YY", "%y"),
    ("MM", "%m"),
    ("DD", "%d"),
    ("HH", "%H"),
    ("MI", "%M"),
    ("SS", "%S"),
    ("T", "T"),
];

/// 未配置日期格式时依次尝试的格式
const DEFAULT_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y%m%d", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d"];

/// 将日期格式文法翻译为 chrono 格式串
///
/// 例如 `YYYY-MM-DDTHH:MI:SS` → `%Y-%m-%dT%H:%M:%S`
pub fn translate_date_format(grammar: &str) -> String {
    let mut out = String::with_capacity(grammar.len() * 2);
    let mut rest = grammar;

    'outer: while !rest.is_empty() {
        for (token, chrono_token) in DATE_TOKENS.iter() {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(chrono_token);
                rest = tail;
                continue 'outer;
            }
        }

        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            if ch == '%' {
                out.push_str("%%");
            } else {
                out.push(ch);
            }
        }
        rest = chars.as_str();
    }

    out
}

/// 按格式文法解析日期（先按日期时间，再按日期）
pub fn parse_date(raw: &str, grammar: Option<&str>) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let formats: Vec<String> = match grammar.map(str::trim).filter(|g| !g.is_empty()) {
        Some(g) => vec![translate_date_format(g)],
        None => DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
    };

    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .map(|dt| dt.date())
            .or_else(|_| NaiveDate::parse_from_str(raw, fmt))
            .ok()
    })
}

/// 去扩展名的文件名
fn file_stem(file: &Path) -> Option<String> {
    file.file_stem().map(|s| s.to_string_lossy().to_string())
}

/// 文件名切分取段
///
/// 下标越界或不可解析时返回整个文件名
pub fn filename_segment(file: &Path, delimiter: &str, index: Option<&str>) -> Option<String> {
    let stem = file_stem(file)?;
    if delimiter.is_empty() {
        return Some(stem);
    }

    let segment = index
        .and_then(|i| i.trim().parse::<usize>().ok())
        .and_then(|i| stem.split(delimiter).nth(i))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Some(segment.unwrap_or(stem))
}

/// 从记录中读取字段（先精确匹配，再按标准化名匹配）
fn record_field(record: &Record, field: &str) -> Option<String> {
    let value = record.get(field).or_else(|| {
        let wanted = sanitize_identifier(field);
        record
            .iter()
            .find(|(key, _)| sanitize_identifier(key) == wanted)
            .map(|(_, v)| v)
    })?;

    if is_blank(value) {
        return None;
    }
    value_as_text(value).map(|s| s.trim().to_string())
}

// ==========================================
// ResolvedMetadata - 解析结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub label: String,
    pub effective_date: NaiveDate,
}

// ==========================================
// MetadataResolver - 标签/日期解析器
// ==========================================
pub struct MetadataResolver<'a> {
    config: &'a ImportConfig,
    run_date: NaiveDate,
    default_label: String,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(config: &'a ImportConfig, run_date: NaiveDate, default_label: impl Into<String>) -> Self {
        Self {
            config,
            run_date,
            default_label: default_label.into(),
        }
    }

    /// 是否需要读取文件内容（决定是否预读首个文件）
    pub fn needs_content(&self) -> bool {
        self.config.label_rule.source == MetadataSource::FileContent
            || self.config.date_rule.source == MetadataSource::FileContent
    }

    fn resolve_raw(
        &self,
        rule: &MetadataRule,
        file: Option<&Path>,
        first_record: Option<&Record>,
    ) -> Option<String> {
        let delimiter = self.config.filename_delimiter.as_str();
        match rule.source {
            MetadataSource::Static => rule.location.clone().filter(|v| !v.trim().is_empty()),
            MetadataSource::Filename => {
                file.and_then(|f| filename_segment(f, delimiter, rule.location.as_deref()))
            }
            MetadataSource::FileContent => {
                let from_content = match (first_record, rule.location.as_deref()) {
                    (Some(record), Some(field)) => record_field(record, field),
                    _ => None,
                };
                match from_content {
                    Some(value) => Some(value),
                    None => {
                        debug!(
                            field = ?rule.location,
                            "首条记录缺少指定字段，回退为文件名"
                        );
                        file.and_then(file_stem)
                    }
                }
            }
        }
    }

    /// 解析数据集标签（无来源时使用默认标签）
    pub fn resolve_label(&self, file: Option<&Path>, first_record: Option<&Record>) -> String {
        self.resolve_raw(&self.config.label_rule, file, first_record)
            .unwrap_or_else(|| self.default_label.clone())
    }

    /// 解析生效日期（解析失败时回退为运行日期）
    pub fn resolve_date(&self, file: Option<&Path>, first_record: Option<&Record>) -> NaiveDate {
        let Some(raw) = self.resolve_raw(&self.config.date_rule, file, first_record) else {
            return self.run_date;
        };

        match parse_date(&raw, self.config.date_format.as_deref()) {
            Some(date) => date,
            None => {
                warn!(
                    raw = %raw,
                    date_format = ?self.config.date_format,
                    fallback = %self.run_date,
                    "日期解析失败，使用运行日期"
                );
                self.run_date
            }
        }
    }

    pub fn resolve(&self, file: Option<&Path>, first_record: Option<&Record>) -> ResolvedMetadata {
        ResolvedMetadata {
            label: self.resolve_label(file, first_record),
            effective_date: self.resolve_date(file, first_record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import_config::TableRef;
    use crate::domain::types::FileFormat;
    use serde_json::json;
    use std::path::PathBuf;

    fn config(label_rule: MetadataRule, date_rule: MetadataRule, date_format: Option<&str>) -> ImportConfig {
        ImportConfig {
            id: 1,
            data_source: "erp".to_string(),
            dataset_type: "sales".to_string(),
            source_directory: PathBuf::from("in"),
            archive_directory: PathBuf::from("archive"),
            file_pattern: ".*".to_string(),
            file_format: FileFormat::Csv,
            target_table: TableRef::parse("main.sales").unwrap(),
            strategy_id: 1,
            label_rule,
            filename_delimiter: "_".to_string(),
            date_rule,
            date_format: date_format.map(|s| s.to_string()),
            is_active: true,
            last_modified_at: None,
        }
    }

    fn rule(source: MetadataSource, location: Option<&str>) -> MetadataRule {
        MetadataRule {
            source,
            location: location.map(|s| s.to_string()),
        }
    }

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[test]
    fn test_translate_date_format() {
        assert_eq!(translate_date_format("YYYYMMDD"), "%Y%m%d");
        assert_eq!(translate_date_format("YYYY-MM-DDTHH:MI:SS"), "%Y-%m-%dT%H:%M:%S");
        assert_eq!(translate_date_format("DD/MM/YY HH24"), "%d/%m/%y %H");
        assert_eq!(translate_date_format("100%"), "100%%");
    }

    #[test]
    fn test_parse_date_with_grammar() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(parse_date("20240115", Some("YYYYMMDD")), expected);
        assert_eq!(parse_date("2024-01-15T08:30:00", Some("YYYY-MM-DDTHH:MI:SS")), expected);
        assert_eq!(parse_date("2024-01-15", None), expected);
        assert_eq!(parse_date("15.01.2024", Some("YYYYMMDD")), None);
    }

    #[test]
    fn test_filename_segment() {
        let file = Path::new("/data/in/sales_20240115_eu.csv");
        assert_eq!(filename_segment(file, "_", Some("1")).as_deref(), Some("20240115"));
        assert_eq!(filename_segment(file, "_", Some("2")).as_deref(), Some("eu"));
        // 越界 / 非数字 → 整个文件名
        assert_eq!(filename_segment(file, "_", Some("9")).as_deref(), Some("sales_20240115_eu"));
        assert_eq!(filename_segment(file, "_", Some("x")).as_deref(), Some("sales_20240115_eu"));
        assert_eq!(filename_segment(file, "_", None).as_deref(), Some("sales_20240115_eu"));
    }

    #[test]
    fn test_resolve_from_filename() {
        let cfg = config(
            rule(MetadataSource::Filename, Some("0")),
            rule(MetadataSource::Filename, Some("1")),
            Some("YYYYMMDD"),
        );
        let resolver = MetadataResolver::new(&cfg, run_date(), "generic_import");

        let meta = resolver.resolve(Some(Path::new("sales_20240115.csv")), None);

        assert_eq!(meta.label, "sales");
        assert_eq!(meta.effective_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_resolve_static_date_reformatted_or_defaulted() {
        let cfg = config(
            rule(MetadataSource::Static, Some("monthly close")),
            rule(MetadataSource::Static, Some("20231231")),
            Some("YYYYMMDD"),
        );
        let resolver = MetadataResolver::new(&cfg, run_date(), "generic_import");
        let meta = resolver.resolve(None, None);
        assert_eq!(meta.label, "monthly close");
        assert_eq!(meta.effective_date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());

        let bad = config(
            rule(MetadataSource::Static, None),
            rule(MetadataSource::Static, Some("not a date")),
            Some("YYYYMMDD"),
        );
        let resolver = MetadataResolver::new(&bad, run_date(), "generic_import");
        let meta = resolver.resolve(None, None);
        assert_eq!(meta.label, "generic_import");
        assert_eq!(meta.effective_date, run_date());
    }

    #[test]
    fn test_file_content_missing_field_falls_back_to_filename() {
        let cfg = config(
            rule(MetadataSource::FileContent, Some("batch_name")),
            rule(MetadataSource::FileContent, Some("report_date")),
            Some("YYYY-MM-DD"),
        );
        let resolver = MetadataResolver::new(&cfg, run_date(), "generic_import");

        let mut record = Record::new();
        record.insert("Report Date".to_string(), json!("2024-02-29"));

        let meta = resolver.resolve(Some(Path::new("daily_feed.csv")), Some(&record));

        // 标签字段缺失 → 文件名；日期字段按标准化名命中
        assert_eq!(meta.label, "daily_feed");
        assert_eq!(meta.effective_date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_no_file_uses_defaults() {
        let cfg = config(
            rule(MetadataSource::Filename, Some("0")),
            rule(MetadataSource::FileContent, Some("d")),
            None,
        );
        let resolver = MetadataResolver::new(&cfg, run_date(), "generic_import");
        let meta = resolver.resolve(None, None);
        assert_eq!(meta.label, "generic_import");
        assert_eq!(meta.effective_date, run_date());
    }
}
