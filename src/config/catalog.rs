// src/config/catalog.rs
//! Topic and source definitions as written in the config file, and their
//! validation into the typed catalog the core runs on.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ingest::parsers::api::FieldMap;
use crate::ingest::parsers::html::{HtmlRules, Selector};
use crate::model::{Source, SourceKind, Topic};
use crate::source_weights::{MAX_WEIGHT, MIN_WEIGHT};

fn default_true() -> bool {
    true
}
fn default_refresh_hours() -> u32 {
    6
}
fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDef {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_refresh_hours")]
    pub refresh_hours: u32,
}

/// Raw selector strings for HTML sources; unset entries keep the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorDefs {
    pub item: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// JSON extraction paths (`api` sources).
    pub fields: Option<FieldMap>,
    /// Item/title/body/link rules (`html` sources).
    pub selectors: Option<SelectorDefs>,
    /// Request headers sent with every fetch.
    pub headers: BTreeMap<String, String>,
    /// Query parameters appended to the URL.
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub config: SourceConfig,
}

/// Validated topics and sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub topics: Vec<Topic>,
    pub sources: Vec<Source>,
}

fn name_pattern() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex"))
}

/// `tech_news` -> `Tech News`.
fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(first) => first.to_uppercase().chain(c).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl Catalog {
    pub fn from_defs(topics: Vec<TopicDef>, sources: Vec<SourceDef>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut out = Catalog::default();

        for def in topics {
            if !name_pattern().is_match(&def.name) {
                return Err(ConfigError::topic(
                    &def.name,
                    "name must be lowercase letters, digits and underscores",
                ));
            }
            if !seen.insert(def.name.clone()) {
                return Err(ConfigError::topic(&def.name, "duplicate topic name"));
            }
            if def.refresh_hours < 1 {
                return Err(ConfigError::topic(&def.name, "refresh_hours must be >= 1"));
            }
            out.topics.push(Topic {
                display_name: def.display_name.unwrap_or_else(|| title_case(&def.name)),
                name: def.name,
                description: def.description,
                enabled: def.enabled,
                refresh_hours: def.refresh_hours,
                last_run_at: None,
                last_success_at: None,
            });
        }

        let mut source_names = HashSet::new();
        for def in sources {
            out.sources.push(build_source(def, &seen, &mut source_names)?);
        }
        Ok(out)
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }
}

fn build_source(
    def: SourceDef,
    topics: &HashSet<String>,
    seen: &mut HashSet<String>,
) -> Result<Source, ConfigError> {
    let name = def.name.trim().to_string();
    if name.is_empty() {
        return Err(ConfigError::source("", "name must not be empty"));
    }
    if !seen.insert(name.clone()) {
        return Err(ConfigError::source(&name, "duplicate source name"));
    }
    if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&def.weight) {
        return Err(ConfigError::source(
            &name,
            format!("weight {} outside [{MIN_WEIGHT}, {MAX_WEIGHT}]", def.weight),
        ));
    }
    match url::Url::parse(&def.url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {}
        Ok(u) => {
            return Err(ConfigError::source(
                &name,
                format!("unsupported URL scheme '{}'", u.scheme()),
            ))
        }
        Err(e) => return Err(ConfigError::source(&name, format!("invalid URL: {e}"))),
    }
    if let Some(missing) = def.topics.iter().find(|t| !topics.contains(*t)) {
        return Err(ConfigError::source(
            &name,
            format!("references unknown topic '{missing}'"),
        ));
    }

    let mapping = def.config.fields.unwrap_or_default();
    if def.kind == SourceKind::Api && mapping.title.trim().is_empty() {
        return Err(ConfigError::source(&name, "field map needs a title path"));
    }

    let mut rules = HtmlRules::default();
    if let Some(sel) = def.config.selectors {
        let slots = [
            (sel.item, &mut rules.item),
            (sel.title, &mut rules.title),
            (sel.body, &mut rules.body),
            (sel.link, &mut rules.link),
        ];
        for (raw, slot) in slots {
            if let Some(raw) = raw {
                *slot = Selector::parse(&raw)?;
            }
        }
    }

    for (key, value) in &def.config.headers {
        if HeaderName::from_bytes(key.as_bytes()).is_err() {
            return Err(ConfigError::source(&name, format!("invalid header name '{key}'")));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(ConfigError::source(&name, format!("invalid value for header '{key}'")));
        }
    }

    Ok(Source {
        display_name: def.display_name.unwrap_or_else(|| name.clone()),
        name,
        kind: def.kind,
        url: def.url,
        weight: def.weight,
        enabled: def.enabled,
        topics: def.topics,
        mapping,
        rules,
        headers: def.config.headers,
        params: def.config.params,
    })
}
