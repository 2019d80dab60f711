// src/ingest/parsers/html.rs
//! Streaming HTML normalizer.
//!
//! Markup runs through `lol_html`, an HTML5 tokenizer that never builds a
//! tree. An item starts at an element matching the `item` selector; inside it
//! the first elements matching `title`, `body` and `link` are captured.
//! Structure that matches nothing yields zero items. An item still open when
//! the input ends (unterminated comment, missing closers) is dropped and
//! reported as one `Malformed` error; items closed before it are kept.

use std::cell::RefCell;
use std::rc::Rc;

use lol_html::{ElementContentHandlers, HtmlRewriter, Settings};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, ParseError};
use crate::ingest::normalize_text;
use crate::ingest::parsers::{ParseContext, ParseOutcome};

/// A CSS selector, checked against the rewriter's grammar when built.
///
/// Rules are matched relative to the item (`"{item} {title}"`), so selector
/// lists are refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector(String);

impl Selector {
    /// Selector matching a bare tag name.
    pub fn tag(name: &str) -> Self {
        Self(name.to_ascii_lowercase())
    }

    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(ConfigError::selector(input, "empty selector"));
        }
        if raw.contains(',') {
            return Err(ConfigError::selector(raw, "selector lists are not supported"));
        }
        raw.parse::<lol_html::Selector>()
            .map_err(|e| ConfigError::selector(raw, e))?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `self` scoped to descendants of `item`.
    fn within(&self, item: &Selector) -> Result<lol_html::Selector, ParseError> {
        let scoped = format!("{} {}", item.0, self.0);
        scoped
            .parse()
            .map_err(|e| ParseError::Malformed(format!("selector '{scoped}': {e}")))
    }
}

impl TryFrom<String> for Selector {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(value: Selector) -> Self {
        value.0
    }
}

/// Per-source extraction rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlRules {
    pub item: Selector,
    pub title: Selector,
    pub body: Selector,
    pub link: Selector,
}

impl Default for HtmlRules {
    fn default() -> Self {
        Self {
            item: Selector::tag("article"),
            title: Selector::tag("h2"),
            body: Selector::tag("p"),
            link: Selector::tag("a"),
        }
    }
}

/// Text of the first element matching one rule. Text handlers only fire
/// inside matching elements, so counting starts is enough to tell the first
/// match from later ones.
#[derive(Default)]
struct Capture {
    seen: usize,
    text: String,
}

impl Capture {
    fn push(&mut self, chunk: &str) {
        if self.seen == 1 {
            self.text.push_str(chunk);
        }
    }
}

#[derive(Default)]
struct Draft {
    title: Capture,
    body: Capture,
    link_text: Capture,
    href: Option<String>,
}

#[derive(Default)]
struct State {
    open: Option<Draft>,
    closed: Vec<Draft>,
}

impl State {
    fn start_item(&mut self) {
        // Siblings without end tags (`<li>`) close each other.
        if let Some(prev) = self.open.take() {
            self.closed.push(prev);
        }
        self.open = Some(Draft::default());
    }

    fn end_item(&mut self) {
        if let Some(done) = self.open.take() {
            self.closed.push(done);
        }
    }

    fn draft(&mut self) -> Option<&mut Draft> {
        self.open.as_mut()
    }
}

fn resolve_link(base: &str, href: &str) -> String {
    let href = html_escape::decode_html_entities(href.trim());
    if href.is_empty() {
        return String::new();
    }
    match Url::parse(base).and_then(|b| b.join(&href)) {
        Ok(u) => u.to_string(),
        Err(_) => href.to_string(),
    }
}

pub fn parse(
    text: &str,
    content_type: Option<&str>,
    ctx: &ParseContext<'_>,
) -> Result<ParseOutcome, ParseError> {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("json") || ct.starts_with("image/") {
            return Err(ParseError::WrongContentType(ct));
        }
    }

    let rules = &ctx.source.rules;
    let item_sel: lol_html::Selector = rules
        .item
        .as_str()
        .parse()
        .map_err(|e| ParseError::Malformed(format!("selector '{}': {e}", rules.item.as_str())))?;
    let title_sel = rules.title.within(&rules.item)?;
    let body_sel = rules.body.within(&rules.item)?;
    let link_sel = rules.link.within(&rules.item)?;

    let state = Rc::new(RefCell::new(State::default()));

    let on_item = {
        let state = Rc::clone(&state);
        move |el: &mut lol_html::html_content::Element<'_, '_>| {
            state.borrow_mut().start_item();
            if let Some(handlers) = el.end_tag_handlers() {
                let state = Rc::clone(&state);
                handlers.push(Box::new(move |_end| {
                    state.borrow_mut().end_item();
                    Ok(())
                }));
            }
            Ok(())
        }
    };

    let title_el = {
        let state = Rc::clone(&state);
        move |_: &mut lol_html::html_content::Element<'_, '_>| {
            if let Some(d) = state.borrow_mut().draft() {
                d.title.seen += 1;
            }
            Ok(())
        }
    };
    let title_text = {
        let state = Rc::clone(&state);
        move |t: &mut lol_html::html_content::TextChunk<'_>| {
            if let Some(d) = state.borrow_mut().draft() {
                d.title.push(t.as_str());
            }
            Ok(())
        }
    };

    let body_el = {
        let state = Rc::clone(&state);
        move |_: &mut lol_html::html_content::Element<'_, '_>| {
            if let Some(d) = state.borrow_mut().draft() {
                d.body.seen += 1;
            }
            Ok(())
        }
    };
    let body_text = {
        let state = Rc::clone(&state);
        move |t: &mut lol_html::html_content::TextChunk<'_>| {
            if let Some(d) = state.borrow_mut().draft() {
                d.body.push(t.as_str());
            }
            Ok(())
        }
    };

    // Only anchors carrying an href count; the first one wins.
    let link_el = {
        let state = Rc::clone(&state);
        move |el: &mut lol_html::html_content::Element<'_, '_>| {
            if let Some(d) = state.borrow_mut().draft() {
                if d.href.is_none() {
                    if let Some(href) = el.get_attribute("href") {
                        d.href = Some(href);
                        d.link_text.seen = 1;
                        return Ok(());
                    }
                }
                if d.href.is_some() {
                    d.link_text.seen += 1;
                }
            }
            Ok(())
        }
    };
    let link_text = {
        let state = Rc::clone(&state);
        move |t: &mut lol_html::html_content::TextChunk<'_>| {
            if let Some(d) = state.borrow_mut().draft() {
                d.link_text.push(t.as_str());
            }
            Ok(())
        }
    };

    let settings = Settings {
        element_content_handlers: vec![
            (
                std::borrow::Cow::Owned(item_sel),
                ElementContentHandlers::default().element(on_item),
            ),
            (
                std::borrow::Cow::Owned(title_sel),
                ElementContentHandlers::default()
                    .element(title_el)
                    .text(title_text),
            ),
            (
                std::borrow::Cow::Owned(body_sel),
                ElementContentHandlers::default()
                    .element(body_el)
                    .text(body_text),
            ),
            (
                std::borrow::Cow::Owned(link_sel),
                ElementContentHandlers::default()
                    .element(link_el)
                    .text(link_text),
            ),
        ],
        strict: false,
        ..Settings::default()
    };

    let mut out = ParseOutcome::default();
    let mut rewriter = HtmlRewriter::new(settings, |_: &[u8]| {});
    let fed = rewriter.write(text.as_bytes()).and_then(|()| rewriter.end());

    let mut state = state.borrow_mut();
    for draft in state.closed.drain(..) {
        finish_item(draft, ctx, &mut out);
    }
    match fed {
        Err(e) => {
            // The open item is the one reading stopped inside.
            out.errors.push(ParseError::Malformed(format!("markup unreadable: {e}")));
        }
        Ok(()) if state.open.is_some() => {
            out.errors.push(ParseError::Malformed(
                "input ended inside an unclosed item".to_string(),
            ));
        }
        Ok(()) => {}
    }
    Ok(out)
}

fn finish_item(draft: Draft, ctx: &ParseContext<'_>, out: &mut ParseOutcome) {
    let mut title = normalize_text(&draft.title.text);
    if title.is_empty() {
        title = normalize_text(&draft.link_text.text);
    }
    if title.is_empty() {
        return;
    }
    let body = normalize_text(&draft.body.text);
    let url = draft
        .href
        .as_deref()
        .map(|h| resolve_link(&ctx.source.url, h))
        .unwrap_or_default();
    out.items.push(ctx.item(&title, &body, &url, None));
}
