//! Field paths into JSON records
//!
//! `a.b[0].c` style keys used by filters, projections, sorting and
//! flattening. A bare field step applied to a list fans out over its
//! elements, so `disks.deviceName` reaches every disk.

use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPart {
    Field(String),
    /// `[n]`; negative counts from the end
    Index(i64),
    /// `[]`: every element
    Each,
}

/// A parsed field path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Key(pub Vec<KeyPart>);

impl Key {
    /// Parse `a.b[0].c`. Returns `None` for syntactically broken keys.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = Vec::new();
        for segment in text.split('.') {
            let (name, mut rest) = match segment.find('[') {
                Some(idx) => (&segment[..idx], &segment[idx..]),
                None => (segment, ""),
            };
            if !name.is_empty() {
                parts.push(KeyPart::Field(name.to_string()));
            } else if rest.is_empty() {
                return None;
            }
            while !rest.is_empty() {
                let close = rest.find(']')?;
                let inner = rest[1..close].trim();
                if inner.is_empty() {
                    parts.push(KeyPart::Each);
                } else {
                    parts.push(KeyPart::Index(inner.parse().ok()?));
                }
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return None;
                }
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last named field, used for default column labels
    pub fn last_field(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|p| match p {
            KeyPart::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Resolve to a single value. Field steps do not fan out over lists.
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for part in &self.0 {
            current = match (part, current) {
                (KeyPart::Field(name), Value::Object(map)) => map.get(name)?,
                (KeyPart::Index(idx), Value::Array(items)) => {
                    let len = items.len() as i64;
                    let idx = if *idx < 0 { len + idx } else { *idx };
                    if idx < 0 {
                        return None;
                    }
                    items.get(idx as usize)?
                }
                (KeyPart::Each, Value::Array(_)) => current,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve to every value reachable, fanning field steps out over lists
    pub fn get_all<'a>(&self, value: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![value];
        for part in &self.0 {
            let mut next = Vec::new();
            for v in current {
                match (part, v) {
                    (KeyPart::Field(name), Value::Object(map)) => next.extend(map.get(name)),
                    (KeyPart::Field(name), Value::Array(items)) => {
                        next.extend(items.iter().filter_map(|i| i.get(name)))
                    }
                    (KeyPart::Index(_), Value::Array(_)) => {
                        next.extend(Key(vec![part.clone()]).get(v))
                    }
                    (KeyPart::Each, Value::Array(items)) => next.extend(items.iter()),
                    _ => {}
                }
            }
            current = next;
        }
        current
    }

    /// Replace the value at this path, creating objects as needed.
    /// Returns false when the path runs through a non-object.
    pub fn set(&self, target: &mut Value, new_value: Value) -> bool {
        let mut current = target;
        let Some((last, init)) = self.0.split_last() else {
            return false;
        };
        for part in init {
            current = match (part, current) {
                (KeyPart::Field(name), Value::Object(map)) => map
                    .entry(name.clone())
                    .or_insert_with(|| Value::Object(Default::default())),
                (KeyPart::Index(idx), Value::Array(items)) if *idx >= 0 => {
                    match items.get_mut(*idx as usize) {
                        Some(v) => v,
                        None => return false,
                    }
                }
                _ => return false,
            };
        }
        match (last, current) {
            (KeyPart::Field(name), Value::Object(map)) => {
                map.insert(name.clone(), new_value);
                true
            }
            (KeyPart::Index(idx), Value::Array(items)) if *idx >= 0 => {
                match items.get_mut(*idx as usize) {
                    Some(slot) => {
                        *slot = new_value;
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// The path without trailing `[]` markers
    pub fn without_each(&self) -> Key {
        let mut parts = self.0.clone();
        while parts.last() == Some(&KeyPart::Each) {
            parts.pop();
        }
        Key(parts)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            match part {
                KeyPart::Field(name) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                KeyPart::Index(i) => write!(f, "[{i}]")?,
                KeyPart::Each => f.write_str("[]")?,
            }
            first = false;
        }
        Ok(())
    }
}

/// Render a scalar for comparison and display. Lists and objects render
/// as compact JSON.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
