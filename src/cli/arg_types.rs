//! Typed argument values
//!
//! Conversion from the raw command-line string to a typed value. Each
//! function returns the reason for rejection; the caller attaches the
//! argument name.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    String,
    Int { min: Option<i64>, max: Option<i64> },
    /// `--flag` / `--no-flag`; absent stays unset
    Bool,
    /// `30s`, `5m`, `1h30m`, `2d`; a bare number is seconds
    Duration,
    /// RFC 3339 timestamp or a plain `YYYY-MM-DD` date (UTC)
    DateTime,
    Path,
    /// `10GB`, `1TiB`, `512MB`; a bare number is bytes. Units are binary.
    ByteSize,
    Choice(&'static [&'static str]),
    /// Comma separated; repeated occurrences accumulate
    List,
    /// `k=v,k2=v2`; repeated occurrences accumulate
    KeyValue,
}

impl ArgType {
    pub fn int() -> Self {
        Self::Int { min: None, max: None }
    }

    pub fn bounded(min: i64, max: Option<i64>) -> Self {
        Self::Int { min: Some(min), max }
    }

    /// Whether the flag takes a value
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::Bool)
    }

    pub fn accumulates(&self) -> bool {
        matches!(self, Self::List | Self::KeyValue)
    }

    /// Placeholder shown in help
    pub fn metavar(&self, name: &str) -> String {
        match self {
            Self::Choice(choices) => choices.join("|").to_uppercase(),
            Self::List => format!("[{},...]", name.to_uppercase().replace('-', "_")),
            Self::KeyValue => "[KEY=VALUE,...]".to_string(),
            _ => name.to_uppercase().replace('-', "_"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Duration(Duration),
    DateTime(DateTime<FixedOffset>),
    Path(PathBuf),
    Bytes(u64),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

/// Convert every raw occurrence of one argument
pub fn convert(kind: &ArgType, raw: &[String]) -> Result<ArgValue, String> {
    if kind.accumulates() {
        return match kind {
            ArgType::KeyValue => {
                let mut map = BTreeMap::new();
                for occurrence in raw {
                    for (k, v) in parse_key_values(occurrence)? {
                        map.insert(k, v);
                    }
                }
                Ok(ArgValue::Map(map))
            }
            _ => Ok(ArgValue::List(
                raw.iter()
                    .flat_map(|r| r.split(','))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
        };
    }
    let Some(value) = raw.last() else {
        return Err("expected a value".to_string());
    };
    convert_one(kind, value)
}

fn convert_one(kind: &ArgType, value: &str) -> Result<ArgValue, String> {
    match kind {
        ArgType::String | ArgType::Choice(_) => Ok(ArgValue::Str(value.to_string())),
        ArgType::Int { min, max } => {
            let n: i64 = value
                .trim()
                .parse()
                .map_err(|_| format!("Invalid integer value: '{value}'"))?;
            if let Some(min) = min.filter(|m| n < *m) {
                return Err(format!("Value must be greater than or equal to {min}; received: {n}"));
            }
            if let Some(max) = max.filter(|m| n > *m) {
                return Err(format!("Value must be less than or equal to {max}; received: {n}"));
            }
            Ok(ArgValue::Int(n))
        }
        ArgType::Bool => Ok(ArgValue::Bool(
            crate::properties::parse_bool(value).ok_or_else(|| format!("Invalid boolean value: '{value}'"))?,
        )),
        ArgType::Duration => parse_duration(value).map(ArgValue::Duration),
        ArgType::DateTime => parse_datetime(value).map(ArgValue::DateTime),
        ArgType::Path => {
            if value.is_empty() {
                return Err("Path must not be empty".to_string());
            }
            Ok(ArgValue::Path(PathBuf::from(value)))
        }
        ArgType::ByteSize => parse_byte_size(value).map(ArgValue::Bytes),
        ArgType::List | ArgType::KeyValue => convert(kind, &[value.to_string()]),
    }
}

/// `1h30m`, `90s`, `2d`, or a bare number of seconds
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim().to_ascii_lowercase();
    let invalid = || format!("Failed to parse duration: '{text}'");
    if text.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let mut total = 0u64;
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return Err(invalid()),
        };
        total += n * unit;
    }
    if !digits.is_empty() {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}

pub fn parse_datetime(text: &str) -> Result<DateTime<FixedOffset>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| format!("Failed to parse date/time: '{text}'"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("Failed to parse date/time: '{text}'"))?;
    Ok(Utc.from_utc_datetime(&midnight).fixed_offset())
}

/// Size with an optional binary unit (`KB` and `KiB` are both 1024)
pub fn parse_byte_size(text: &str) -> Result<u64, String> {
    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let invalid = || format!("Failed to parse binary size: '{text}'");
    let amount: f64 = number.parse().map_err(|_| invalid())?;
    let exponent = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "K" | "KB" | "KIB" => 1,
        "M" | "MB" | "MIB" => 2,
        "G" | "GB" | "GIB" => 3,
        "T" | "TB" | "TIB" => 4,
        "P" | "PB" | "PIB" => 5,
        _ => return Err(invalid()),
    };
    Ok((amount * 1024f64.powi(exponent)).round() as u64)
}

fn parse_key_values(text: &str) -> Result<Vec<(String, String)>, String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| format!("Bad syntax for dict arg: [{pair}]. Expected KEY=VALUE."))?;
            if k.trim().is_empty() {
                return Err(format!("Bad syntax for dict arg: [{pair}]. Key is empty."));
            }
            Ok((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}
