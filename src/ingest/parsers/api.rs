// src/ingest/parsers/api.rs
//! JSON API normalizer driven by a declarative field map.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;
use crate::ingest::normalize_text;
use crate::ingest::parsers::{parse_timestamp, timestamp_from_number, ParseContext, ParseOutcome};

/// Where to find each item field inside an API payload.
///
/// Paths are dotted (`data.children`, `meta.published`); numeric segments
/// index into arrays. `items_path` points at the entry list; when absent the
/// root is used (an object root is treated as a single entry).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldMap {
    pub items_path: Option<String>,
    pub title: String,
    pub body: String,
    pub url: String,
    pub published_at: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            items_path: None,
            title: "title".to_string(),
            body: "content".to_string(),
            url: "url".to_string(),
            published_at: "published_at".to_string(),
        }
    }
}

/// Resolve a dotted path against a JSON value.
pub fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |cur, seg| match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(arr) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    })
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn parse(text: &str, ctx: &ParseContext<'_>) -> Result<ParseOutcome, ParseError> {
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Err(ParseError::WrongContentType(
            "expected a JSON document".to_string(),
        ));
    }
    let root: Value =
        serde_json::from_str(trimmed).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let map = &ctx.source.mapping;
    let list = match map.items_path.as_deref() {
        Some(path) => lookup(&root, path).ok_or_else(|| {
            ParseError::SchemaMismatch(format!("items path '{path}' not found"))
        })?,
        None => &root,
    };
    let entries: Vec<&Value> = match list {
        Value::Array(arr) => arr.iter().collect(),
        Value::Object(_) => vec![list],
        _ => {
            return Err(ParseError::SchemaMismatch(
                "items path does not point at an array or object".to_string(),
            ))
        }
    };

    let mut out = ParseOutcome::default();
    for (idx, entry) in entries.into_iter().enumerate() {
        if !entry.is_object() {
            out.errors.push(ParseError::SchemaMismatch(format!(
                "entry {idx} is not an object"
            )));
            continue;
        }

        let title = lookup(entry, &map.title)
            .and_then(as_text)
            .map(|t| normalize_text(&t))
            .unwrap_or_default();
        if title.is_empty() {
            out.errors.push(ParseError::SchemaMismatch(format!(
                "entry {idx}: missing required field '{}'",
                map.title
            )));
            continue;
        }

        let body = lookup(entry, &map.body)
            .and_then(as_text)
            .map(|b| normalize_text(&b))
            .unwrap_or_default();
        let url = lookup(entry, &map.url)
            .and_then(as_text)
            .unwrap_or_default();
        let published = lookup(entry, &map.published_at).and_then(|v| match v {
            Value::Number(n) => n.as_i64().and_then(timestamp_from_number),
            Value::String(s) => parse_timestamp(s),
            _ => None,
        });

        out.items.push(ctx.item(&title, &body, &url, published));
    }
    Ok(out)
}
