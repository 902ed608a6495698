// ==========================================
// 通用导入引擎 - 文件抽取器实现
// ==========================================
// 支持: 分隔文本 (.csv) / 电子表格 (.xlsx/.xls) / 层级对象 (.json) / 标记语言 (.xml)
// 约定:
// - 空文件返回空列表，不报错
// - JSON / XML 解析失败降级为单条 blob 记录（原文 + 文件名）
// - CSV / Excel 解析失败向上传播
// ==========================================

use crate::domain::record::{blob_record, Record};
use crate::domain::types::FileFormat;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::FileParser;
use calamine::{open_workbook, Data, DataType, Reader, Xls, XlsError, Xlsx, XlsxError};
use chrono::NaiveTime;
use csv::ReaderBuilder;
use serde_json::{Number, Value};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

/// 取文件名（不含目录）
pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// 空文件判定（0 字节）
fn is_empty_file(path: &Path) -> ImportResult<bool> {
    let meta = fs::metadata(path).map_err(|e| ImportError::extraction(base_name(path), e))?;
    Ok(meta.len() == 0)
}

fn read_text(path: &Path) -> ImportResult<String> {
    let bytes = fs::read(path).map_err(|e| ImportError::extraction(base_name(path), e))?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_start_matches('\u{feff}')
        .to_string())
}

/// 表头去重: 重复表头追加 `_2`、`_3` 后缀
fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    headers
        .into_iter()
        .map(|h| {
            let mut name = h.clone();
            let mut suffix = 2;
            while seen.contains(&name) {
                name = format!("{}_{}", h, suffix);
                suffix += 1;
            }
            seen.insert(name.clone());
            name
        })
        .collect()
}

fn all_blank(record: &Record) -> bool {
    record.values().all(crate::domain::record::is_blank)
}

// ==========================================
// CSV Parser 实现
// ==========================================
// 固定逗号分隔，与文件名解析分隔符无关
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_records(&self, file_path: &Path) -> ImportResult<Vec<Record>> {
        let name = base_name(file_path);
        if is_empty_file(file_path)? {
            return Ok(Vec::new());
        }

        let file = File::open(file_path).map_err(|e| ImportError::extraction(&name, e))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        // 读取表头
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ImportError::extraction(&name, e))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let headers = unique_headers(headers);

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result.map_err(|e| ImportError::extraction(&name, e))?;
            let mut record = Record::new();

            // 多出的单元格丢弃，缺少的单元格不生成字段
            for (header, value) in headers.iter().zip(row.iter()) {
                record.insert(header.clone(), Value::String(value.trim().to_string()));
            }

            // 跳过完全空白的行
            if all_blank(&record) {
                continue;
            }
            records.push(record);
        }

        debug!(file = %name, records = records.len(), "CSV 解析完成");
        Ok(records)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetKind {
    Modern, // .xlsx
    Legacy, // .xls
}

pub struct ExcelParser {
    pub kind: SpreadsheetKind,
}

impl ExcelParser {
    pub fn new(kind: SpreadsheetKind) -> Self {
        Self { kind }
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::String(s.trim().to_string()),
        // 日期单元格输出 ISO 文本，无时间部分时只保留日期
        Data::DateTime(_) | Data::DateTimeIso(_) => {
            let datetime = cell
                .as_datetime()
                .or_else(|| cell.as_date().map(|d| d.and_time(NaiveTime::MIN)));
            match datetime {
                Some(dt) if dt.time() == NaiveTime::MIN => {
                    Value::String(dt.format("%Y-%m-%d").to_string())
                }
                Some(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
                None => Value::String(cell.to_string().trim().to_string()),
            }
        }
        other => Value::String(other.to_string().trim().to_string()),
    }
}

/// 读取第一个工作表（首行为表头）
fn read_first_sheet<R>(workbook: &mut R, name: &str) -> ImportResult<Vec<Record>>
where
    R: Reader<BufReader<File>>,
    R::Error: std::fmt::Display,
{
    let sheet_names = workbook.sheet_names();
    let Some(sheet_name) = sheet_names.first().cloned() else {
        return Ok(Vec::new());
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::extraction(name, e))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };

    // 空表头以位置占位名替代
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let text = cell.to_string().trim().to_string();
            if text.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                text
            }
        })
        .collect();
    let headers = unique_headers(headers);

    let mut records = Vec::new();
    for data_row in rows {
        let mut record = Record::new();
        for (idx, header) in headers.iter().enumerate() {
            let value = data_row.get(idx).map(cell_to_value).unwrap_or(Value::Null);
            record.insert(header.clone(), value);
        }

        // 跳过完全空白的行
        if all_blank(&record) {
            continue;
        }
        records.push(record);
    }

    Ok(records)
}

impl FileParser for ExcelParser {
    fn parse_to_records(&self, file_path: &Path) -> ImportResult<Vec<Record>> {
        let name = base_name(file_path);
        if is_empty_file(file_path)? {
            return Ok(Vec::new());
        }

        let records = match self.kind {
            SpreadsheetKind::Modern => {
                let mut workbook: Xlsx<_> = open_workbook(file_path)
                    .map_err(|e: XlsxError| ImportError::extraction(&name, e))?;
                read_first_sheet(&mut workbook, &name)?
            }
            SpreadsheetKind::Legacy => {
                let mut workbook: Xls<_> = open_workbook(file_path)
                    .map_err(|e: XlsError| ImportError::extraction(&name, e))?;
                read_first_sheet(&mut workbook, &name)?
            }
        };

        debug!(file = %name, records = records.len(), "Excel 解析完成");
        Ok(records)
    }
}

// ==========================================
// JSON Parser 实现
// ==========================================
// 根为数组: 每个元素一条记录
// 根为对象/标量: 整个文档作为一条 blob 记录
pub struct JsonParser;

impl FileParser for JsonParser {
    fn parse_to_records(&self, file_path: &Path) -> ImportResult<Vec<Record>> {
        let name = base_name(file_path);
        let text = read_text(file_path)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => map,
                    scalar => {
                        let mut record = Record::new();
                        record.insert("value".to_string(), scalar);
                        record
                    }
                })
                .collect(),
            Ok(document) => vec![blob_record(document.to_string(), &name)],
            Err(e) => {
                warn!(file = %name, error = %e, "JSON 解析失败，降级为原文记录");
                vec![blob_record(text, &name)]
            }
        };

        debug!(file = %name, records = records.len(), "JSON 解析完成");
        Ok(records)
    }
}

// ==========================================
// XML Parser 实现
// ==========================================
// 根元素的每个子元素为一条记录: 属性 + 子元素(标签 → 文本)
// 任何解析失败或无记录元素时降级为 blob 记录，不抛错
pub struct XmlParser;

fn element_text(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_xml_records(text: &str) -> Result<Vec<Record>, String> {
    let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
    let root = doc.root_element();

    let mut records = Vec::new();
    for element in root.children().filter(|n| n.is_element()) {
        let mut record = Record::new();

        for attr in element.attributes() {
            record.insert(attr.name().to_string(), Value::String(attr.value().to_string()));
        }

        let mut has_children = false;
        for child in element.children().filter(|n| n.is_element()) {
            has_children = true;
            record.insert(
                child.tag_name().name().to_string(),
                Value::String(element_text(child)),
            );
        }

        // 叶子元素: 自身标签 → 文本
        if !has_children {
            record.insert(
                element.tag_name().name().to_string(),
                Value::String(element_text(element)),
            );
        }

        records.push(record);
    }

    Ok(records)
}

impl FileParser for XmlParser {
    fn parse_to_records(&self, file_path: &Path) -> ImportResult<Vec<Record>> {
        let name = base_name(file_path);
        let text = read_text(file_path)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records = match parse_xml_records(&text) {
            Ok(records) if !records.is_empty() => records,
            Ok(_) => {
                warn!(file = %name, "XML 无可识别的记录元素，降级为原文记录");
                vec![blob_record(text, &name)]
            }
            Err(e) => {
                warn!(file = %name, error = %e, "XML 解析失败，降级为原文记录");
                vec![blob_record(text, &name)]
            }
        };

        debug!(file = %name, records = records.len(), "XML 解析完成");
        Ok(records)
    }
}

// ==========================================
// 格式抽取器（按配置的文件格式选择）
// ==========================================
// 封闭枚举: 格式集合显式、可穷尽匹配
pub enum FormatExtractor {
    Delimited(CsvParser),
    Spreadsheet(ExcelParser),
    Hierarchical(JsonParser),
    Markup(XmlParser),
}

impl FormatExtractor {
    pub fn for_format(format: FileFormat) -> Self {
        match format {
            FileFormat::Csv => FormatExtractor::Delimited(CsvParser),
            FileFormat::Xlsx => FormatExtractor::Spreadsheet(ExcelParser::new(SpreadsheetKind::Modern)),
            FileFormat::Xls => FormatExtractor::Spreadsheet(ExcelParser::new(SpreadsheetKind::Legacy)),
            FileFormat::Json => FormatExtractor::Hierarchical(JsonParser),
            FileFormat::Xml => FormatExtractor::Markup(XmlParser),
        }
    }

    pub fn extract<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<Vec<Record>> {
        let path = file_path.as_ref();
        match self {
            FormatExtractor::Delimited(parser) => parser.parse_to_records(path),
            FormatExtractor::Spreadsheet(parser) => parser.parse_to_records(path),
            FormatExtractor::Hierarchical(parser) => parser.parse_to_records(path),
            FormatExtractor::Markup(parser) => parser.parse_to_records(path),
        }
    }
}
