//! Format strings and projections
//!
//! `table[no-heading](name, zone.basename():label=ZONE:width=10:align=right)`
//! parses into a [`Format`]: the printer kind, its attributes and the
//! projected columns with their transforms.

use super::path::{scalar_text, Key};
use chrono::DateTime;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Unknown format [{0}]. Expected one of: table, value, csv, json, yaml, uri, none, disable.")]
    UnknownFormat(String),

    #[error("Unbalanced brackets in format [{0}].")]
    Unbalanced(String),

    #[error("Invalid key [{key}] in format [{format}].")]
    InvalidKey { format: String, key: String },

    #[error("Unknown transform [{0}()].")]
    UnknownTransform(String),

    #[error("Invalid column attribute [{0}].")]
    InvalidAttribute(String),
}

impl From<FormatError> for crate::error::CliError {
    fn from(err: FormatError) -> Self {
        crate::error::CliError::argument(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Table,
    Value,
    Csv,
    Json,
    Yaml,
    Uri,
    None,
    /// No output and no rendering work at all
    Disable,
}

impl FormatKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "table" => Self::Table,
            "value" => Self::Value,
            "csv" => Self::Csv,
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            "uri" => Self::Uri,
            "none" => Self::None,
            "disable" => Self::Disable,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Basename,
    Format { template: String, args: Vec<Key> },
    Date(Option<String>),
    Len,
    Lower,
    Upper,
    YesNo { yes: String, no: String },
    Size,
}

impl Transform {
    fn parse(name: &str, args: Vec<String>) -> Result<Self, FormatError> {
        let arg = |i: usize| args.get(i).cloned();
        Ok(match name {
            "basename" => Self::Basename,
            "format" => {
                let template = arg(0).unwrap_or_default();
                let keys = args
                    .iter()
                    .skip(1)
                    .map(|k| {
                        Key::parse(k).ok_or_else(|| FormatError::InvalidKey {
                            format: format!("format({})", args.join(",")),
                            key: k.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::Format { template, args: keys }
            }
            "date" => Self::Date(arg(0)),
            "len" => Self::Len,
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "yesno" => Self::YesNo {
                yes: arg(0).unwrap_or_else(|| "yes".to_string()),
                no: arg(1).unwrap_or_else(|| "no".to_string()),
            },
            "size" => Self::Size,
            other => return Err(FormatError::UnknownTransform(other.to_string())),
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Basename => "basename",
            Self::Format { .. } => "format",
            Self::Date(_) => "date",
            Self::Len => "len",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::YesNo { .. } => "yesno",
            Self::Size => "size",
        }
    }

    /// Apply to `value`, reading extra keys from `record`
    pub fn apply(&self, value: Value, record: &Value) -> Value {
        match self {
            Self::Basename => match value {
                Value::String(s) => {
                    Value::String(s.trim_end_matches('/').rsplit('/').next().unwrap_or("").to_string())
                }
                other => other,
            },
            Self::Format { template, args } => {
                let values: Vec<String> = if args.is_empty() {
                    vec![scalar_text(&value)]
                } else {
                    args.iter()
                        .map(|k| k.get(record).map(scalar_text).unwrap_or_default())
                        .collect()
                };
                Value::String(fill_template(template, &values))
            }
            Self::Date(fmt) => {
                let Some(text) = value.as_str() else {
                    return value;
                };
                match DateTime::parse_from_rfc3339(text) {
                    Ok(ts) => {
                        let fmt = fmt.as_deref().unwrap_or("%Y-%m-%dT%H:%M:%S");
                        Value::String(ts.format(fmt).to_string())
                    }
                    Err(_) => value,
                }
            }
            Self::Len => Value::from(match &value {
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                Value::String(s) => s.chars().count(),
                Value::Null => 0,
                _ => 1,
            }),
            Self::Lower => Value::String(scalar_text(&value).to_lowercase()),
            Self::Upper => Value::String(scalar_text(&value).to_uppercase()),
            Self::YesNo { yes, no } => {
                let truthy = match &value {
                    Value::Null => false,
                    Value::Bool(b) => *b,
                    Value::String(s) => !s.is_empty(),
                    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                    Value::Array(a) => !a.is_empty(),
                    Value::Object(o) => !o.is_empty(),
                };
                Value::String(if truthy { yes.clone() } else { no.clone() })
            }
            Self::Size => {
                let bytes = match &value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                };
                match bytes {
                    Some(b) => Value::String(human_size(b)),
                    None => value,
                }
            }
        }
    }
}

fn fill_template(template: &str, values: &[String]) -> String {
    let mut out = template.to_string();
    for (i, v) in values.iter().enumerate() {
        out = out.replace(&format!("{{{i}}}"), v);
    }
    out
}

fn human_size(bytes: f64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut size = bytes;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if size.fract() == 0.0 {
        format!("{}{}", size as u64, UNITS[unit])
    } else {
        format!("{:.1}{}", size, UNITS[unit])
    }
}

/// One projected column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: Option<Key>,
    pub transforms: Vec<Transform>,
    pub label: Option<String>,
    pub width: Option<usize>,
    pub align: Align,
}

impl Column {
    /// Heading for table output: explicit label, else the last key name in
    /// upper snake case (`networkIP` -> `NETWORK_IP`)
    pub fn heading(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match self.key.as_ref().and_then(Key::last_field) {
            Some(field) => upper_snake(field),
            None => self
                .transforms
                .first()
                .map(|t| t.name().to_uppercase())
                .unwrap_or_default(),
        }
    }

    /// Field name for csv headers and structured output
    pub fn field_name(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.key {
            Some(key) => key.to_string(),
            None => self.heading().to_lowercase(),
        }
    }

    pub fn evaluate(&self, record: &Value) -> Value {
        let base = match &self.key {
            Some(key) => key.get(record).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        };
        self.transforms
            .iter()
            .fold(base, |value, transform| transform.apply(value, record))
    }

    fn keys(&self, out: &mut Vec<String>) {
        let mut push = |k: String| {
            if !out.contains(&k) {
                out.push(k);
            }
        };
        if let Some(key) = &self.key {
            push(key.to_string());
        }
        for transform in &self.transforms {
            if let Transform::Format { args, .. } = transform {
                for arg in args {
                    push(arg.to_string());
                }
            }
        }
    }
}

fn upper_snake(name: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = name.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev_lower || (next_lower && chars[i - 1].is_uppercase()) {
                out.push('_');
            }
        }
        if *c == '-' {
            out.push('_');
        } else {
            out.extend(c.to_uppercase());
        }
    }
    out
}

/// A parsed `--format` value
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pub kind: FormatKind,
    pub no_heading: bool,
    pub columns: Vec<Column>,
}

impl Format {
    pub fn parse(spec: &str) -> Result<Self, FormatError> {
        let spec = spec.trim();
        let name_end = spec.find(['[', '(']).unwrap_or(spec.len());
        let name = spec[..name_end].trim();
        let kind = FormatKind::from_name(name).ok_or_else(|| FormatError::UnknownFormat(name.to_string()))?;
        let mut rest = spec[name_end..].trim_start();
        let mut no_heading = false;

        if rest.starts_with('[') {
            let close = matching(rest, 0).ok_or_else(|| FormatError::Unbalanced(spec.to_string()))?;
            for attr in split_top(&rest[1..close], ',') {
                match attr.trim() {
                    "no-heading" => no_heading = true,
                    "" => {}
                    other => tracing::debug!("Ignoring format attribute [{}]", other),
                }
            }
            rest = rest[close + 1..].trim_start();
        }

        let mut columns = Vec::new();
        if rest.starts_with('(') {
            let close = matching(rest, 0).ok_or_else(|| FormatError::Unbalanced(spec.to_string()))?;
            for column in split_top(&rest[1..close], ',') {
                let column = column.trim();
                if !column.is_empty() {
                    columns.push(parse_column(column, spec)?);
                }
            }
            rest = rest[close + 1..].trim_start();
        }
        if !rest.is_empty() {
            return Err(FormatError::Unbalanced(spec.to_string()));
        }

        Ok(Self {
            kind,
            no_heading,
            columns,
        })
    }

    /// Keys the projection reads, in column order
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for column in &self.columns {
            column.keys(&mut keys);
        }
        keys
    }
}

fn parse_column(text: &str, spec: &str) -> Result<Column, FormatError> {
    let mut parts = split_top(text, ':').into_iter();
    let expr = parts.next().unwrap_or_default();
    let mut column = Column {
        key: None,
        transforms: Vec::new(),
        label: None,
        width: None,
        align: Align::Left,
    };

    let mut key_parts = Vec::new();
    for step in split_top(expr.trim(), '.') {
        match step.find('(') {
            Some(open) if step.ends_with(')') => {
                let args = split_top(&step[open + 1..step.len() - 1], ',')
                    .into_iter()
                    .map(|a| unquote(a.trim()))
                    .filter(|a| !a.is_empty())
                    .collect();
                column.transforms.push(Transform::parse(step[..open].trim(), args)?);
            }
            _ if column.transforms.is_empty() => key_parts.push(step),
            _ => {
                return Err(FormatError::InvalidKey {
                    format: spec.to_string(),
                    key: expr.clone(),
                })
            }
        }
    }
    if !key_parts.is_empty() {
        let joined = key_parts.join(".");
        column.key = Some(Key::parse(&joined).ok_or_else(|| FormatError::InvalidKey {
            format: spec.to_string(),
            key: joined.clone(),
        })?);
    }

    for attr in parts {
        let (name, value) = attr.split_once('=').unwrap_or((attr.as_str(), ""));
        let value = unquote(value.trim());
        match name.trim() {
            "label" => column.label = Some(value),
            "width" => {
                column.width = Some(value.parse().map_err(|_| FormatError::InvalidAttribute(attr.clone()))?)
            }
            "align" => {
                column.align = match value.as_str() {
                    "left" => Align::Left,
                    "right" => Align::Right,
                    "center" => Align::Center,
                    _ => return Err(FormatError::InvalidAttribute(attr.clone())),
                }
            }
            _ => return Err(FormatError::InvalidAttribute(attr.clone())),
        }
    }
    Ok(column)
}

/// Index of the bracket closing the one at `open`
fn matching(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices().skip_while(|(i, _)| *i < open) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') | (None, '[') => depth += 1,
            (None, ')') | (None, ']') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `sep` outside brackets and quotes
fn split_top(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') | (None, '[') => depth += 1,
            (None, ')') | (None, ']') => depth -= 1,
            (None, c) if c == sep && depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);
    parts
}

fn unquote(text: &str) -> String {
    for q in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return text[1..text.len() - 1].to_string();
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_kinds() {
        assert_eq!(Format::parse("json").unwrap().kind, FormatKind::Json);
        assert_eq!(Format::parse(" yaml ").unwrap().kind, FormatKind::Yaml);
        assert_eq!(Format::parse("none").unwrap().kind, FormatKind::None);
        assert!(matches!(Format::parse("xml"), Err(FormatError::UnknownFormat(_))));
        assert!(matches!(Format::parse("table(name"), Err(FormatError::Unbalanced(_))));
    }

    #[test]
    fn test_parse_table_columns_and_attributes() {
        let format = Format::parse(
            "table[no-heading](name, zone.basename():label=ZONE:width=10:align=right, networkInterfaces[0].networkIP)",
        )
        .unwrap();
        assert_eq!(format.kind, FormatKind::Table);
        assert!(format.no_heading);
        assert_eq!(format.columns.len(), 3);

        let zone = &format.columns[1];
        assert_eq!(zone.key.as_ref().unwrap().to_string(), "zone");
        assert_eq!(zone.transforms, vec![Transform::Basename]);
        assert_eq!(zone.heading(), "ZONE");
        assert_eq!(zone.width, Some(10));
        assert_eq!(zone.align, Align::Right);

        assert_eq!(format.columns[0].heading(), "NAME");
        assert_eq!(format.columns[2].heading(), "NETWORK_IP");
        assert_eq!(format.keys(), vec!["name", "zone", "networkInterfaces[0].networkIP"]);
    }

    #[test]
    fn test_format_transform_reads_other_keys() {
        let format = Format::parse("value(format(\"{0}/{1}\", zone.basename, name):label=PATH)").unwrap();
        let column = &format.columns[0];
        assert!(column.key.is_none());
        assert_eq!(column.heading(), "PATH");
        let record = json!({"name": "vm", "zone": {"basename": "z1"}});
        assert_eq!(column.evaluate(&record), json!("z1/vm"));
        assert_eq!(format.keys(), vec!["zone.basename", "name"]);
    }

    #[test]
    fn test_transforms() {
        let record = json!({});
        assert_eq!(
            Transform::Basename.apply(json!("https://x/zones/us-east1-b"), &record),
            json!("us-east1-b")
        );
        assert_eq!(Transform::Len.apply(json!([1, 2, 3]), &record), json!(3));
        assert_eq!(Transform::Upper.apply(json!("abc"), &record), json!("ABC"));
        assert_eq!(Transform::Lower.apply(json!("ABC"), &record), json!("abc"));
        let yesno = Transform::YesNo {
            yes: "Y".into(),
            no: "N".into(),
        };
        assert_eq!(yesno.apply(json!(true), &record), json!("Y"));
        assert_eq!(yesno.apply(Value::Null, &record), json!("N"));
        assert_eq!(Transform::Size.apply(json!(1536), &record), json!("1.5KiB"));
        assert_eq!(Transform::Size.apply(json!("10737418240"), &record), json!("10GiB"));
        let date = Transform::Date(Some("%Y-%m-%d".into()));
        assert_eq!(date.apply(json!("2024-03-05T10:11:12.000-07:00"), &record), json!("2024-03-05"));
        assert_eq!(date.apply(json!("not a date"), &record), json!("not a date"));
    }

    #[test]
    fn test_chained_transforms() {
        let format = Format::parse("table(machineType.basename().upper())").unwrap();
        let record = json!({"machineType": "zones/a/machineTypes/e2-small"});
        assert_eq!(format.columns[0].evaluate(&record), json!("E2-SMALL"));
        assert_eq!(format.columns[0].heading(), "MACHINE_TYPE");
    }

    #[test]
    fn test_bad_columns() {
        assert!(matches!(Format::parse("table(name.nope())"), Err(FormatError::UnknownTransform(_))));
        assert!(matches!(
            Format::parse("table(name:align=diagonal)"),
            Err(FormatError::InvalidAttribute(_))
        ));
        assert!(matches!(Format::parse("table(name:width=x)"), Err(FormatError::InvalidAttribute(_))));
    }

    #[test]
    fn test_upper_snake() {
        assert_eq!(upper_snake("name"), "NAME");
        assert_eq!(upper_snake("creationTimestamp"), "CREATION_TIMESTAMP");
        assert_eq!(upper_snake("networkIP"), "NETWORK_IP");
        assert_eq!(upper_snake("natIP"), "NAT_IP");
    }
}
