//! Output pipeline
//!
//! Records pass through filter, flatten, sort, limit, projection and
//! format, in that order. Listing pulls lazily from the item stream, so a
//! limit without a sort stops fetching pages once it is reached.

pub mod filter;
pub mod path;
pub mod printers;
pub mod projection;

pub use filter::{Filter, FilterError};
pub use path::Key;
pub use projection::{Format, FormatError, FormatKind};

use crate::console::Console;
use crate::error::{CliError, Result};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::cmp::Ordering;

/// The user's output flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputOptions {
    pub format: Option<String>,
    pub filter: Option<String>,
    pub sort_by: Vec<String>,
    pub limit: Option<usize>,
    pub flatten: Vec<String>,
}

#[derive(Debug, Clone)]
struct SortKey {
    key: Key,
    reverse: bool,
}

/// A compiled pipeline for one command invocation
#[derive(Debug, Clone)]
pub struct Pipeline {
    filter: Option<Filter>,
    flatten: Vec<Key>,
    sort: Vec<SortKey>,
    limit: Option<usize>,
    format: Format,
}

fn invalid_key(flag: &str, key: &str) -> CliError {
    CliError::argument(format!("Invalid key [{key}] for {flag}."))
}

impl Pipeline {
    /// Compile the flags against the command's default format. A `--format`
    /// of `default` keeps the command's own.
    pub fn new(options: &OutputOptions, default_format: &str) -> Result<Self> {
        let spec = match options.format.as_deref() {
            Some(f) if f.trim() != "default" => f,
            _ => default_format,
        };
        let format = Format::parse(spec)?;
        let filter = match options.filter.as_deref() {
            Some(f) if !f.trim().is_empty() => Some(Filter::parse(f)?),
            _ => None,
        };
        let flatten = options
            .flatten
            .iter()
            .map(|k| Key::parse(k).ok_or_else(|| invalid_key("--flatten", k)))
            .collect::<Result<Vec<_>>>()?;
        let sort = options
            .sort_by
            .iter()
            .map(|field| {
                let (reverse, name) = match field.strip_prefix('~') {
                    Some(rest) => (true, rest),
                    None => (false, field.as_str()),
                };
                let key = Key::parse(name).ok_or_else(|| invalid_key("--sort-by", field))?;
                Ok(SortKey { key, reverse })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            filter,
            flatten,
            sort,
            limit: options.limit,
            format,
        })
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Every key the filter and projection read, for partial fetches
    pub fn referenced_keys(&self) -> Vec<String> {
        let mut keys = self.filter.as_ref().map(Filter::keys).unwrap_or_default();
        for key in self.format.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn accepts(&self, record: &Value) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(record))
    }

    /// One record per element of each flattened list field
    fn flatten_record(&self, record: Value) -> Vec<Value> {
        let mut records = vec![record];
        for key in &self.flatten {
            let target = key.without_each();
            let mut next = Vec::new();
            for record in records {
                match target.get(&record) {
                    Some(Value::Array(items)) if !items.is_empty() => {
                        for item in items.clone() {
                            let mut copy = record.clone();
                            target.set(&mut copy, item);
                            next.push(copy);
                        }
                    }
                    Some(Value::Array(_)) => {
                        let mut copy = record.clone();
                        target.set(&mut copy, Value::Null);
                        next.push(copy);
                    }
                    _ => next.push(record),
                }
            }
            records = next;
        }
        records
    }

    fn sort_records(&self, records: &mut [Value]) {
        if self.sort.is_empty() {
            return;
        }
        records.sort_by(|a, b| {
            for SortKey { key, reverse } in &self.sort {
                let ordering = compare_values(key.get(a), key.get(b));
                let ordering = if *reverse { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Run the record stages over an already-fetched list
    pub fn process(&self, records: Vec<Value>) -> Vec<Value> {
        let mut out: Vec<Value> = records
            .into_iter()
            .filter(|r| self.accepts(r))
            .flat_map(|r| self.flatten_record(r))
            .collect();
        self.finish(&mut out);
        out
    }

    fn finish(&self, records: &mut Vec<Value>) {
        self.sort_records(records);
        if let Some(limit) = self.limit {
            records.truncate(limit);
        }
    }

    /// Pull from `stream` through the record stages. On a mid-stream error
    /// the records gathered so far are returned alongside it.
    pub async fn collect<S>(&self, stream: S) -> (Vec<Value>, Option<CliError>)
    where
        S: Stream<Item = Result<Value>>,
    {
        let cap = if self.sort.is_empty() { self.limit } else { None };
        let mut out = Vec::new();
        if cap == Some(0) {
            return (out, None);
        }
        let mut stream = std::pin::pin!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(record) => {
                    if !self.accepts(&record) {
                        continue;
                    }
                    out.extend(self.flatten_record(record));
                    if cap.is_some_and(|c| out.len() >= c) {
                        break;
                    }
                }
                Err(e) => {
                    self.finish(&mut out);
                    return (out, Some(e));
                }
            }
        }
        self.finish(&mut out);
        (out, None)
    }

    pub fn render(&self, records: &[Value], single: bool) -> Result<String> {
        printers::render(&self.format, records, single)
    }
}

/// Missing values sort first, numbers numerically, everything else by text
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => path::scalar_text(x).cmp(&path::scalar_text(y)),
    }
}

/// Print a listing. Records gathered before a mid-stream failure are still
/// printed, then the failure is returned.
pub async fn print_list<S>(console: &Console, pipeline: &Pipeline, stream: S) -> Result<usize>
where
    S: Stream<Item = Result<Value>>,
{
    let (records, error) = pipeline.collect(stream).await;
    let count = records.len();
    if pipeline.format().kind != FormatKind::Disable {
        console.out(&pipeline.render(&records, false)?)?;
        if count == 0 && error.is_none() && pipeline.format().kind != FormatKind::None {
            console.status("Listed 0 items.");
        }
    }
    match error {
        Some(e) => Err(e),
        None => Ok(count),
    }
}

/// Print one resource, such as the result of a describe or create
pub fn print_resource(console: &Console, pipeline: &Pipeline, resource: &Value) -> Result<()> {
    if pipeline.format().kind == FormatKind::Disable {
        return Ok(());
    }
    console.out(&pipeline.render(std::slice::from_ref(resource), true)?)
}
