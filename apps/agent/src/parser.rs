//! File decoding: CSV/TSV/TXT/XLSX/JSON bytes into records.

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use serde_json::{json, Value};
use std::io::Cursor;

use datalink_wire::Record;

use crate::error::{AgentError, AgentResult};

/// Decode file bytes according to the schema's parsing hints.
pub fn parse_file(
    data: &[u8],
    format: &str,
    has_header: bool,
    delimiter: &str,
) -> AgentResult<Vec<Record>> {
    match format.to_lowercase().as_str() {
        "csv" => parse_delimited(data, has_header, delimiter_byte(delimiter, b',')),
        "tsv" => parse_delimited(data, has_header, delimiter_byte(delimiter, b'\t')),
        "txt" | "text" => {
            // delimited first, line-by-line as the fallback
            match parse_delimited(data, has_header, delimiter_byte(delimiter, b',')) {
                Ok(records) if !records.is_empty() => Ok(records),
                _ => parse_text_lines(data),
            }
        }
        "xlsx" | "excel" => parse_xlsx(data, has_header),
        "json" => parse_json(data),
        other => Err(AgentError::Parse(format!(
            "unsupported file format: {}",
            other
        ))),
    }
}

fn delimiter_byte(delimiter: &str, default: u8) -> u8 {
    delimiter.bytes().next().unwrap_or(default)
}

/// CSV/TSV with a configurable delimiter. A missing header row yields
/// synthesized `column_1..column_N` names.
fn parse_delimited(data: &[u8], has_header: bool, delimiter: u8) -> AgentResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut headers: Option<Vec<String>> = None;
    let mut records = Vec::new();

    for (line, result) in reader.records().enumerate() {
        let row = result.map_err(|e| AgentError::Parse(format!("CSV line {}: {}", line + 1, e)))?;

        if headers.is_none() {
            if has_header {
                headers = Some(row.iter().map(|h| h.trim().to_string()).collect());
                continue;
            }
            headers = Some((1..=row.len()).map(|i| format!("column_{}", i)).collect());
        }

        let names = headers.as_ref().expect("set above");
        let mut record = Record::new();
        for (i, field) in row.iter().enumerate() {
            if let Some(name) = names.get(i) {
                record.insert(name.clone(), infer_type(field.trim()));
            }
        }
        records.push(record);
    }

    Ok(records)
}

/// XLSX: first sheet only.
fn parse_xlsx(data: &[u8], has_header: bool) -> AgentResult<Vec<Record>> {
    let cursor = Cursor::new(data.to_vec());
    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor)
        .map_err(|e| AgentError::Parse(format!("failed to open workbook: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let Some(first_sheet) = sheet_names.first() else {
        return Err(AgentError::Parse("no sheets found in workbook".into()));
    };

    let range = workbook
        .worksheet_range(first_sheet)
        .map_err(|e| AgentError::Parse(format!("failed to read sheet: {}", e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = if has_header {
        match rows.next() {
            Some(row) => row.iter().map(|c| cell_to_string(c).trim().to_string()).collect(),
            None => return Ok(Vec::new()),
        }
    } else {
        (1..=range.width()).map(|i| format!("column_{}", i)).collect()
    };

    let mut records = Vec::new();
    for row in rows {
        let mut record = Record::new();
        for (i, cell) in row.iter().enumerate() {
            if let Some(name) = headers.get(i) {
                record.insert(name.clone(), cell_to_value(cell));
            }
        }
        records.push(record);
    }

    Ok(records)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => json!(i),
        Data::Float(f) => json!(f),
        Data::Bool(b) => json!(b),
        Data::String(s) => infer_type(s.trim()),
        other => json!(other.to_string()),
    }
}

/// JSON: array of objects, a single object (wrapped), or a
/// `{"data": [...]}` envelope.
pub fn parse_json(data: &[u8]) -> AgentResult<Vec<Record>> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| AgentError::Parse(format!("invalid JSON: {}", e)))?;

    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(datalink_wire::record::as_record)
            .collect()),
        Value::Object(mut map) => {
            if let Some(Value::Array(items)) = map.remove("data") {
                let records: Vec<Record> = items
                    .into_iter()
                    .filter_map(datalink_wire::record::as_record)
                    .collect();
                if !records.is_empty() {
                    return Ok(records);
                }
            }
            Ok(vec![map])
        }
        _ => Err(AgentError::Parse("unsupported JSON shape".into())),
    }
}

/// Plain text, one record per non-empty line.
fn parse_text_lines(data: &[u8]) -> AgentResult<Vec<Record>> {
    let text = String::from_utf8_lossy(data);
    let mut records = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut record = Record::new();
        record.insert("line_number".into(), json!(i + 1));
        record.insert("content".into(), json!(line));
        records.push(record);
    }

    Ok(records)
}

/// Type inference on string cells: int, then float, then bool, then
/// string. Empty cells become null.
pub fn infer_type(value: &str) -> Value {
    if value.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = value.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        return json!(f);
    }
    if value.eq_ignore_ascii_case("true") {
        return json!(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return json!(false);
    }
    json!(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_with_header_infers_ints() {
        let records = parse_file(b"id,name\n1,a\n2,b\n", "csv", true, ",").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], json!(1));
        assert_eq!(records[0]["name"], json!("a"));
        assert_eq!(records[1]["id"], json!(2));
        assert_eq!(records[1]["name"], json!("b"));
    }

    #[test]
    fn csv_without_header_synthesizes_columns() {
        let records = parse_file(b"1,a\n2,b\n", "csv", false, ",").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["column_1"], json!(1));
        assert_eq!(records[0]["column_2"], json!("a"));
    }

    #[test]
    fn csv_round_trips_with_header_and_no_nulls() {
        let input = "id,name\n1,a\n2,b\n";
        let first = parse_file(input.as_bytes(), "csv", true, ",").unwrap();

        // re-serialize and parse again
        let mut out = String::from("id,name\n");
        for r in &first {
            out.push_str(&format!("{},{}\n", r["id"], r["name"].as_str().unwrap()));
        }
        let second = parse_file(out.as_bytes(), "csv", true, ",").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tsv_uses_tab_delimiter() {
        let records = parse_file(b"id\tname\n7\tx\n", "tsv", true, "\t").unwrap();
        assert_eq!(records[0]["id"], json!(7));
    }

    #[test]
    fn custom_delimiter_is_honored() {
        let records = parse_file(b"id;name\n5;q\n", "csv", true, ";").unwrap();
        assert_eq!(records[0]["id"], json!(5));
    }

    #[test]
    fn txt_falls_back_to_line_records() {
        let records = parse_file(b"hello world\n\nsecond line\n", "txt", false, "").unwrap();
        // line-per-record when the delimited parse degenerates
        assert!(records
            .iter()
            .all(|r| r.contains_key("content") || r.contains_key("column_1")));
    }

    #[test]
    fn json_envelopes() {
        let array = parse_json(br#"[{"a":1},{"a":2}]"#).unwrap();
        assert_eq!(array.len(), 2);

        let single = parse_json(br#"{"a":1}"#).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0]["a"], json!(1));

        let wrapped = parse_json(br#"{"data":[{"a":1},{"a":2},{"a":3}]}"#).unwrap();
        assert_eq!(wrapped.len(), 3);

        assert!(parse_json(b"42").is_err());
    }

    #[test]
    fn inference_order_is_int_float_bool_string() {
        assert_eq!(infer_type("42"), json!(42));
        assert_eq!(infer_type("4.5"), json!(4.5));
        assert_eq!(infer_type("TRUE"), json!(true));
        assert_eq!(infer_type("false"), json!(false));
        assert_eq!(infer_type("hello"), json!("hello"));
        assert_eq!(infer_type(""), Value::Null);
    }

    #[test]
    fn unsupported_format_is_an_error() {
        assert!(parse_file(b"x", "parquet", true, ",").is_err());
    }
}
