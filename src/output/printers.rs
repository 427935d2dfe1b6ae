//! Printers
//!
//! Render projected records as text. Output is deterministic for the same
//! records and format: column order follows the projection, record order
//! follows the input and trailing whitespace is trimmed from table lines.

use super::path::scalar_text;
use super::projection::{Align, Column, Format, FormatKind};
use crate::error::{CliError, Result};
use serde_json::{Map, Value};

const COLUMN_GAP: &str = "  ";

/// Render `records`. `single` marks the result of a describe/create style
/// command, which structured formats print as one document rather than a list.
pub fn render(format: &Format, records: &[Value], single: bool) -> Result<String> {
    match format.kind {
        FormatKind::None | FormatKind::Disable => Ok(String::new()),
        FormatKind::Json => render_json(format, records, single),
        FormatKind::Yaml => render_yaml(format, records),
        FormatKind::Table => Ok(render_table(format, records)),
        FormatKind::Value => Ok(render_value(format, records)),
        FormatKind::Csv => render_csv(format, records),
        FormatKind::Uri => Ok(render_uri(records)),
    }
}

/// Columns to print: the projection, or every top-level key in order of
/// first appearance when the format names none
fn effective_columns(format: &Format, records: &[Value]) -> Vec<Column> {
    if !format.columns.is_empty() {
        return format.columns.clone();
    }
    let mut names: Vec<String> = Vec::new();
    for record in records {
        if let Some(map) = record.as_object() {
            for key in map.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
    }
    names
        .into_iter()
        .filter_map(|name| {
            Some(Column {
                key: Some(super::path::Key::parse(&name)?),
                transforms: Vec::new(),
                label: None,
                width: None,
                align: Align::Left,
            })
        })
        .collect()
}

/// Text for one table/value/csv cell
fn cell_text(value: &Value, list_sep: &str) -> String {
    match value {
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Array(items) => items
            .iter()
            .map(|v| cell_text(v, list_sep))
            .collect::<Vec<_>>()
            .join(list_sep),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, cell_text(v, list_sep)))
            .collect::<Vec<_>>()
            .join(list_sep),
        other => scalar_text(other),
    }
}

fn rows(columns: &[Column], records: &[Value], list_sep: &str) -> Vec<Vec<String>> {
    records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| cell_text(&c.evaluate(record), list_sep))
                .collect()
        })
        .collect()
}

fn render_table(format: &Format, records: &[Value]) -> String {
    if records.is_empty() {
        return String::new();
    }
    let columns = effective_columns(format, records);
    let body = rows(&columns, records, ",");
    let headings: Vec<String> = columns.iter().map(Column::heading).collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let natural = body
                .iter()
                .map(|row| row[i].chars().count())
                .chain((!format.no_heading).then(|| headings[i].chars().count()))
                .max()
                .unwrap_or(0);
            column.width.map_or(natural, |w| w.max(natural))
        })
        .collect();

    let mut out = String::new();
    let mut emit = |cells: &[String]| {
        let line: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| pad(cell, widths[i], columns[i].align))
            .collect();
        out.push_str(line.join(COLUMN_GAP).trim_end());
        out.push('\n');
    };
    if !format.no_heading {
        emit(&headings);
    }
    for row in &body {
        emit(row);
    }
    out
}

fn pad(cell: &str, width: usize, align: Align) -> String {
    let len = cell.chars().count();
    let fill = width.saturating_sub(len);
    match align {
        Align::Left => format!("{}{}", cell, " ".repeat(fill)),
        Align::Right => format!("{}{}", " ".repeat(fill), cell),
        Align::Center => {
            let left = fill / 2;
            format!("{}{}{}", " ".repeat(left), cell, " ".repeat(fill - left))
        }
    }
}

fn render_value(format: &Format, records: &[Value]) -> String {
    let columns = effective_columns(format, records);
    let mut out = String::new();
    for row in rows(&columns, records, ";") {
        out.push_str(row.join("\t").trim_end());
        out.push('\n');
    }
    out
}

fn render_csv(format: &Format, records: &[Value]) -> Result<String> {
    let columns = effective_columns(format, records);
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    let csv_error = |e: csv::Error| CliError::internal(format!("failed to write csv: {e}"));
    if !format.no_heading && !records.is_empty() {
        writer
            .write_record(columns.iter().map(Column::field_name))
            .map_err(csv_error)?;
    }
    for row in rows(&columns, records, ";") {
        writer.write_record(&row).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CliError::internal(format!("failed to write csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| CliError::internal(format!("csv output is not UTF-8: {e}")))
}

/// Structured formats keep the record shape, restricted to the projected
/// keys when the format names columns
fn project_structured(format: &Format, record: &Value) -> Value {
    if format.columns.is_empty() {
        return record.clone();
    }
    let mut out = Value::Object(Map::new());
    for column in &format.columns {
        let value = column.evaluate(record);
        let placed = match (&column.label, &column.key) {
            (None, Some(key)) => key.without_each().set(&mut out, value.clone()),
            _ => false,
        };
        if !placed {
            if let Value::Object(map) = &mut out {
                map.insert(column.field_name(), value);
            }
        }
    }
    out
}

fn render_json(format: &Format, records: &[Value], single: bool) -> Result<String> {
    let projected: Vec<Value> = records.iter().map(|r| project_structured(format, r)).collect();
    let mut text = match (single, projected.as_slice()) {
        (true, [only]) => serde_json::to_string_pretty(only)?,
        _ => serde_json::to_string_pretty(&projected)?,
    };
    text.push('\n');
    Ok(text)
}

fn render_yaml(format: &Format, records: &[Value]) -> Result<String> {
    let mut docs = Vec::new();
    for record in records {
        let projected = project_structured(format, record);
        let doc = serde_yaml::to_string(&projected)
            .map_err(|e| CliError::internal(format!("failed to render yaml: {e}")))?;
        docs.push(doc);
    }
    Ok(docs.join("---\n"))
}

fn render_uri(records: &[Value]) -> String {
    let mut out = String::new();
    for record in records {
        let uri = record
            .get("selfLink")
            .or_else(|| record.get("name"))
            .map(scalar_text)
            .unwrap_or_default();
        out.push_str(&uri);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<Value> {
        vec![
            json!({"name": "web-1", "zone": "zones/us-central1-a", "cpus": 4, "tags": ["a", "b"],
                   "selfLink": "https://compute.googleapis.com/compute/v1/projects/p/zones/us-central1-a/instances/web-1"}),
            json!({"name": "db", "zone": "zones/europe-west1-b", "cpus": 16, "preemptible": true}),
        ]
    }

    fn fmt(spec: &str) -> Format {
        Format::parse(spec).unwrap()
    }

    #[test]
    fn test_table_layout() {
        let out = render(&fmt("table(name, zone.basename():label=ZONE, cpus:align=right)"), &records(), false).unwrap();
        assert_eq!(
            out,
            "NAME   ZONE            CPUS\n\
             web-1  us-central1-a      4\n\
             db     europe-west1-b    16\n"
        );
    }

    #[test]
    fn test_table_no_heading_width_and_lists() {
        let out = render(&fmt("table[no-heading](name:width=8, tags)"), &records(), false).unwrap();
        assert_eq!(out, "web-1     a,b\ndb\n");
    }

    #[test]
    fn test_table_empty_prints_nothing() {
        assert_eq!(render(&fmt("table(name)"), &[], false).unwrap(), "");
    }

    #[test]
    fn test_value_is_tab_separated() {
        let out = render(&fmt("value(name, cpus, tags, preemptible)"), &records(), false).unwrap();
        assert_eq!(out, "web-1\t4\ta;b\ndb\t16\t\tTrue\n");
    }

    #[test]
    fn test_csv_quotes_and_headers() {
        let data = vec![json!({"name": "a,b", "zone": "z"})];
        let out = render(&fmt("csv(name, zone)"), &data, false).unwrap();
        assert_eq!(out, "name,zone\n\"a,b\",z\n");
        let bare = render(&fmt("csv[no-heading](name)"), &data, false).unwrap();
        assert_eq!(bare, "\"a,b\"\n");
    }

    #[test]
    fn test_json_list_and_single() {
        let list = render(&fmt("json(name)"), &records(), false).unwrap();
        let parsed: Value = serde_json::from_str(&list).unwrap();
        assert_eq!(parsed, json!([{"name": "web-1"}, {"name": "db"}]));

        let single = render(&fmt("json"), &records()[1..], true).unwrap();
        let parsed: Value = serde_json::from_str(&single).unwrap();
        assert_eq!(parsed["cpus"], 16);
        assert_eq!(render(&fmt("json"), &[], false).unwrap(), "[]\n");
    }

    #[test]
    fn test_yaml_documents() {
        let out = render(&fmt("yaml(name, cpus)"), &records(), false).unwrap();
        assert_eq!(out, "name: web-1\ncpus: 4\n---\nname: db\ncpus: 16\n");
    }

    #[test]
    fn test_uri_and_none() {
        let out = render(&fmt("uri"), &records(), false).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].ends_with("/instances/web-1"));
        assert_eq!(lines[1], "db");
        assert_eq!(render(&fmt("none"), &records(), false).unwrap(), "");
        assert_eq!(render(&fmt("disable"), &records(), false).unwrap(), "");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let format = fmt("table(name, zone, cpus)");
        let a = render(&format, &records(), false).unwrap();
        let b = render(&format, &records(), false).unwrap();
        assert_eq!(a, b);
    }
}
