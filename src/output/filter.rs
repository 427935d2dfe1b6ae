//! `--filter` expressions
//!
//! ```text
//! expr    := and ("OR" and)*
//! and     := unary (["AND"] unary)*
//! unary   := ("NOT" | "-") unary | primary
//! primary := "(" expr ")" | key op operand | word
//! op      := "=" | "!=" | ":" | "<" | "<=" | ">" | ">=" | "~" | "!~"
//! operand := word | "quoted" | "(" word* ")"
//! ```
//!
//! After `~` and `!~` an unquoted operand keeps balanced parentheses, so
//! `name~^a(b)` is the regex `^a(b)`. An operand that starts with `(` is
//! still a list of alternatives.
//!
//! A key that resolves to a list matches when any element does. A bare
//! word matches when any scalar in the record contains it.

use super::path::{scalar_text, Key};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Parenthesis mismatch in filter [{expr}] at position {pos}.")]
    Parenthesis { expr: String, pos: usize },

    #[error("Operand expected after [{op}] in filter [{expr}].")]
    MissingOperand { expr: String, op: String },

    #[error("Invalid key [{key}] in filter [{expr}].")]
    InvalidKey { expr: String, key: String },

    #[error("Invalid regular expression [{pattern}]: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Unexpected [{token}] in filter [{expr}] at position {pos}.")]
    Unexpected { expr: String, token: String, pos: usize },
}

impl From<FilterError> for crate::error::CliError {
    fn from(err: FilterError) -> Self {
        crate::error::CliError::argument(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Has,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Has => ":",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Match => "~",
            Op::NotMatch => "!~",
        }
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Values(Vec<String>),
    Pattern(Regex),
}

#[derive(Debug, Clone)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Term { key: Key, op: Op, operand: Operand },
    Bare(String),
}

/// A compiled filter expression
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    expr: Option<Expr>,
}

impl Filter {
    pub fn parse(source: &str) -> Result<Self, FilterError> {
        let mut parser = Parser {
            source,
            chars: source.chars().collect(),
            pos: 0,
        };
        parser.skip_ws();
        if parser.at_end() {
            return Ok(Self {
                source: source.to_string(),
                expr: None,
            });
        }
        let expr = parser.parse_or()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.unexpected());
        }
        Ok(Self {
            source: source.to_string(),
            expr: Some(expr),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.expr.as_ref().map_or(true, |e| eval(e, record))
    }

    /// Keys the expression reads, in order of first appearance
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(expr) = &self.expr {
            collect_keys(expr, &mut keys);
        }
        keys
    }
}

fn collect_keys(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::And(a, b) | Expr::Or(a, b) => {
            collect_keys(a, out);
            collect_keys(b, out);
        }
        Expr::Not(e) => collect_keys(e, out),
        Expr::Term { key, .. } => {
            let key = key.to_string();
            if !out.contains(&key) {
                out.push(key);
            }
        }
        Expr::Bare(_) => {}
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

const OP_CHARS: &[char] = &['=', '!', ':', '<', '>', '~'];

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> FilterError {
        let token: String = self.chars[self.pos..]
            .iter()
            .take_while(|c| !c.is_whitespace())
            .collect();
        FilterError::Unexpected {
            expr: self.source.to_string(),
            token,
            pos: self.pos,
        }
    }

    /// Consume `word` if it is next and stands alone
    fn keyword(&mut self, word: &str) -> bool {
        let len = word.chars().count();
        let end = self.pos + len;
        if end > self.chars.len() {
            return false;
        }
        let candidate: String = self.chars[self.pos..end].iter().collect();
        if candidate != word {
            return false;
        }
        match self.chars.get(end) {
            None => {}
            Some(c) if c.is_whitespace() || *c == '(' => {}
            _ => return false,
        }
        self.pos = end;
        true
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if !self.keyword("OR") {
                return Ok(left);
            }
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.at_end() || self.peek() == Some(')') {
                return Ok(left);
            }
            let save = self.pos;
            if self.keyword("OR") {
                self.pos = save;
                return Ok(left);
            }
            self.keyword("AND");
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        self.skip_ws();
        if self.keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.peek() == Some('-') {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        self.skip_ws();
        match self.peek() {
            None => return Err(self.unexpected()),
            Some('(') => {
                let open = self.pos;
                self.pos += 1;
                let expr = self.parse_or()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(FilterError::Parenthesis {
                        expr: self.source.to_string(),
                        pos: open,
                    });
                }
                self.pos += 1;
                return Ok(expr);
            }
            Some(')') => {
                return Err(FilterError::Parenthesis {
                    expr: self.source.to_string(),
                    pos: self.pos,
                })
            }
            Some('"') | Some('\'') => return Ok(Expr::Bare(self.quoted())),
            _ => {}
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || OP_CHARS.contains(&c) {
                break;
            }
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        let after_word = self.pos;
        self.skip_ws();
        let Some(op) = self.operator() else {
            self.pos = after_word;
            if word.is_empty() {
                return Err(self.unexpected());
            }
            return Ok(Expr::Bare(word));
        };

        let key = Key::parse(&word).ok_or_else(|| FilterError::InvalidKey {
            expr: self.source.to_string(),
            key: word.clone(),
        })?;
        self.skip_ws();
        let values = self.operand(op)?;
        let operand = match op {
            Op::Match | Op::NotMatch => {
                let pattern = values.join("|");
                let re = Regex::new(&pattern).map_err(|e| FilterError::InvalidRegex {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Operand::Pattern(re)
            }
            _ => Operand::Values(values),
        };
        Ok(Expr::Term { key, op, operand })
    }

    fn operator(&mut self) -> Option<Op> {
        let two: String = self.chars[self.pos..].iter().take(2).collect();
        let (op, len) = match two.as_str() {
            "!=" => (Op::Ne, 2),
            "!~" => (Op::NotMatch, 2),
            "<=" => (Op::Le, 2),
            ">=" => (Op::Ge, 2),
            _ => match self.peek()? {
                '=' => (Op::Eq, 1),
                ':' => (Op::Has, 1),
                '<' => (Op::Lt, 1),
                '>' => (Op::Gt, 1),
                '~' => (Op::Match, 1),
                _ => return None,
            },
        };
        self.pos += len;
        Some(op)
    }

    fn operand(&mut self, op: Op) -> Result<Vec<String>, FilterError> {
        let missing = || FilterError::MissingOperand {
            expr: self.source.to_string(),
            op: op.symbol().to_string(),
        };
        match self.peek() {
            None => Err(missing()),
            Some('(') => {
                let open = self.pos;
                self.pos += 1;
                let mut values = Vec::new();
                loop {
                    self.skip_ws();
                    match self.peek() {
                        None => {
                            return Err(FilterError::Parenthesis {
                                expr: self.source.to_string(),
                                pos: open,
                            })
                        }
                        Some(')') => {
                            self.pos += 1;
                            break;
                        }
                        _ => {}
                    }
                    if self.keyword("OR") {
                        continue;
                    }
                    values.push(self.word()?);
                }
                if values.is_empty() {
                    return Err(missing());
                }
                Ok(values)
            }
            Some('"') | Some('\'') => Ok(vec![self.quoted()]),
            _ if matches!(op, Op::Match | Op::NotMatch) => Ok(vec![self.pattern()?]),
            _ => {
                let value = self.word()?;
                Ok(vec![value])
            }
        }
    }

    /// An unquoted regex: runs to whitespace or to a `)` that closes an
    /// enclosing group, so `name~^a(b|c)$` keeps its parentheses
    fn pattern(&mut self) -> Result<String, FilterError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.pos += 1;
                    if self.peek().is_some() {
                        self.pos += 1;
                    }
                    continue;
                }
                '(' => depth += 1,
                ')' if depth == 0 => break,
                ')' => depth -= 1,
                c if c.is_whitespace() => break,
                _ => {}
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// A quoted string or a run of characters up to whitespace or `)`
    fn word(&mut self) -> Result<String, FilterError> {
        if matches!(self.peek(), Some('"') | Some('\'')) {
            return Ok(self.quoted());
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ')' || (c == '(' && self.pos == start) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn quoted(&mut self) -> String {
        let quote = self.chars[self.pos];
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\\' {
                if let Some(next) = self.peek() {
                    out.push(next);
                    self.pos += 1;
                }
                continue;
            }
            if c == quote {
                break;
            }
            out.push(c);
        }
        out
    }
}

// =============================================================================
// Evaluation
// =============================================================================

fn eval(expr: &Expr, record: &Value) -> bool {
    match expr {
        Expr::And(a, b) => eval(a, record) && eval(b, record),
        Expr::Or(a, b) => eval(a, record) || eval(b, record),
        Expr::Not(e) => !eval(e, record),
        Expr::Bare(word) => contains_anywhere(record, &word.to_lowercase()),
        Expr::Term { key, op, operand } => {
            let mut values = Vec::new();
            for v in key.get_all(record) {
                match v {
                    Value::Array(items) => values.extend(items.iter()),
                    other => values.push(other),
                }
            }
            match op {
                Op::Ne => !any_match(&values, Op::Eq, operand),
                Op::NotMatch => !any_match(&values, Op::Match, operand),
                _ => any_match(&values, *op, operand),
            }
        }
    }
}

fn any_match(values: &[&Value], op: Op, operand: &Operand) -> bool {
    match operand {
        Operand::Pattern(re) => values
            .iter()
            .any(|v| !v.is_null() && re.is_match(&scalar_text(v))),
        Operand::Values(patterns) => patterns.iter().any(|pattern| {
            if op == Op::Has && pattern == "*" {
                return values.iter().any(|v| !v.is_null());
            }
            values.iter().any(|v| compare(v, op, pattern))
        }),
    }
}

fn compare(value: &Value, op: Op, pattern: &str) -> bool {
    if value.is_null() {
        return false;
    }
    let text = scalar_text(value);
    match op {
        Op::Eq => {
            if let Some(prefix) = pattern.strip_suffix('*') {
                return text.starts_with(prefix);
            }
            match (as_number(value, &text), pattern.parse::<f64>()) {
                (Some(a), Ok(b)) => a == b,
                _ => text == pattern || (value.is_boolean() && text.eq_ignore_ascii_case(pattern)),
            }
        }
        Op::Has => {
            let text = text.to_lowercase();
            let pattern = pattern.to_lowercase();
            match pattern.strip_suffix('*') {
                Some(prefix) => text.split(is_word_break).any(|w| w.starts_with(prefix)),
                None => text.contains(&pattern),
            }
        }
        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let ordering = match (as_number(value, &text), pattern.parse::<f64>()) {
                (Some(a), Ok(b)) => a.partial_cmp(&b),
                _ => Some(text.as_str().cmp(pattern)),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                Op::Lt => ordering == Ordering::Less,
                Op::Le => ordering != Ordering::Greater,
                Op::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
        Op::Ne | Op::Match | Op::NotMatch => false,
    }
}

fn is_word_break(c: char) -> bool {
    !c.is_alphanumeric()
}

fn as_number(value: &Value, text: &str) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(_) => text.parse().ok(),
        _ => None,
    }
}

fn contains_anywhere(value: &Value, needle: &str) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| contains_anywhere(v, needle)),
        Value::Array(items) => items.iter().any(|v| contains_anywhere(v, needle)),
        Value::Null => false,
        scalar => scalar_text(scalar).to_lowercase().contains(needle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vm() -> Value {
        json!({
            "name": "web-1",
            "zone": "us-central1-a",
            "status": "RUNNING",
            "cpus": 4,
            "preemptible": false,
            "tags": {"items": ["http-server", "prod"]},
            "disks": [{"deviceName": "boot", "sizeGb": "10"}, {"deviceName": "data", "sizeGb": "500"}]
        })
    }

    fn check(expr: &str) -> bool {
        Filter::parse(expr).unwrap().matches(&vm())
    }

    #[test]
    fn test_equality_and_inequality() {
        assert!(check("status=RUNNING"));
        assert!(!check("status=running"));
        assert!(check("status!=TERMINATED"));
        assert!(check("missing!=x"));
        assert!(check("cpus=4"));
        assert!(check("cpus=4.0"));
        assert!(check("preemptible=False"));
        assert!(check("name=web*"));
    }

    #[test]
    fn test_has_is_case_insensitive_substring() {
        assert!(check("zone:central"));
        assert!(check("zone:CENTRAL1"));
        assert!(check("zone:us*"));
        assert!(!check("zone:europe"));
        assert!(check("tags.items:prod"));
        assert!(check("zone:*"));
        assert!(!check("missing:*"));
    }

    #[test]
    fn test_numeric_and_string_ordering() {
        assert!(check("cpus>2"));
        assert!(check("cpus>=4"));
        assert!(!check("cpus<4"));
        assert!(check("cpus<=4"));
        assert!(check("name<zzz"));
        assert!(check("disks.sizeGb>100"));
    }

    #[test]
    fn test_regex() {
        assert!(check("name~^web-[0-9]+$"));
        assert!(!check("name~^db"));
        assert!(check("name!~^db"));
        assert!(matches!(
            Filter::parse("name~(unclosed"),
            Err(FilterError::InvalidRegex { .. }) | Err(FilterError::Parenthesis { .. })
        ));
    }

    #[test]
    fn test_regex_keeps_inner_groups() {
        assert!(check("name~^web-(1|2)$"));
        assert!(!check("name~^web-(3)$"));
        assert!(check("name!~^d(b)"));
        assert!(check("(name~^w(eb)) AND status=RUNNING"));
        assert!(check("name~^web\\(?-1"));
        assert!(matches!(
            Filter::parse("name~^a(b"),
            Err(FilterError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_boolean_composition() {
        assert!(check("status=RUNNING AND zone:central"));
        assert!(check("status=RUNNING zone:central"));
        assert!(check("status=STOPPED OR zone:central"));
        assert!(!check("NOT status=RUNNING"));
        assert!(!check("-status=RUNNING"));
        assert!(check("(status=STOPPED OR cpus=4) AND NOT zone:europe"));
    }

    #[test]
    fn test_value_lists() {
        assert!(check("zone:(europe-west1 us-central1)"));
        assert!(check("status=(STOPPED OR RUNNING)"));
        assert!(!check("status=(STOPPED TERMINATED)"));
    }

    #[test]
    fn test_list_fields_match_any_element() {
        assert!(check("disks.deviceName=data"));
        assert!(!check("disks.deviceName=swap"));
        assert!(check("disks[0].deviceName=boot"));
    }

    #[test]
    fn test_bare_terms_and_quotes() {
        assert!(check("http-server"));
        assert!(check("PROD"));
        assert!(!check("staging"));
        assert!(check("name=\"web-1\""));
        assert!(!check("zone:'us central'"));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::parse("").unwrap().matches(&json!({})));
        assert!(Filter::parse("   ").unwrap().matches(&vm()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Filter::parse("(status=RUNNING"), Err(FilterError::Parenthesis { .. })));
        assert!(matches!(Filter::parse("status="), Err(FilterError::MissingOperand { .. })));
        assert!(Filter::parse("status=RUNNING)").is_err());
        assert!(matches!(Filter::parse("a..b=1"), Err(FilterError::InvalidKey { .. })));
    }

    #[test]
    fn test_keys_extracted() {
        let filter = Filter::parse("status=RUNNING AND (zone:a OR status:b) NOT disks[0].sizeGb>1").unwrap();
        assert_eq!(filter.keys(), vec!["status", "zone", "disks[0].sizeGb"]);
    }
}
