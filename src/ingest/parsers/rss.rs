// src/ingest/parsers/rss.rs
//! Feed normalizer for RSS 2.0, RSS 1.0 (RDF) and Atom.
//!
//! Reads the document as a stream of XML events; one item per `<item>` or
//! `<entry>`. Reading stops at the first syntax error and keeps the entries
//! completed before it.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;
use crate::ingest::normalize_text;
use crate::ingest::parsers::{parse_timestamp, ParseContext, ParseOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Content,
    Published,
    Updated,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Self::Title),
            "link" => Some(Self::Link),
            "description" | "summary" => Some(Self::Description),
            "content:encoded" | "content" => Some(Self::Content),
            "pubdate" | "published" | "dc:date" | "issued" => Some(Self::Published),
            "updated" | "modified" => Some(Self::Updated),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    title: String,
    link: String,
    description: String,
    content: String,
    published: String,
    updated: String,
}

impl Entry {
    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::Content => &mut self.content,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
        }
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.published).or_else(|| parse_timestamp(&self.updated))
    }
}

/// Field currently being read, with nesting depth below its element.
struct Capture {
    field: Field,
    depth: usize,
    buf: String,
}

fn qname(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

/// Atom-style `<link href="..." rel="alternate"/>`.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value).to_string();
        match attr.key.as_ref() {
            b"href" => href = Some(html_escape::decode_html_entities(&value).to_string()),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }
    match rel.as_deref() {
        None | Some("alternate") => href,
        _ => None,
    }
}

pub fn parse(text: &str, ctx: &ParseContext<'_>) -> Result<ParseOutcome, ParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut out = ParseOutcome::default();
    let mut saw_root = false;
    let mut entry: Option<Entry> = None;
    let mut capture: Option<Capture> = None;

    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => {
                out.errors.push(ParseError::Malformed(format!(
                    "feed unreadable after byte {}: {e}",
                    reader.buffer_position()
                )));
                break;
            }
        };

        match event {
            Event::Start(e) => {
                let name = qname(&e);
                if !saw_root {
                    check_root(&name)?;
                    saw_root = true;
                    continue;
                }
                if let Some(cap) = capture.as_mut() {
                    cap.depth += 1;
                    continue;
                }
                if name == "item" || name == "entry" {
                    entry = Some(Entry::default());
                    continue;
                }
                if let (Some(cur), Some(field)) = (entry.as_mut(), Field::from_name(&name)) {
                    if field == Field::Link {
                        if let Some(href) = atom_href(&e) {
                            if cur.link.is_empty() {
                                cur.link = href;
                            }
                        }
                    }
                    capture = Some(Capture {
                        field,
                        depth: 0,
                        buf: String::new(),
                    });
                }
            }
            Event::Empty(e) => {
                let name = qname(&e);
                if !saw_root {
                    check_root(&name)?;
                    saw_root = true;
                    continue;
                }
                if capture.is_some() {
                    continue;
                }
                if let Some(cur) = entry.as_mut() {
                    if name == "link" && cur.link.is_empty() {
                        if let Some(href) = atom_href(&e) {
                            cur.link = href;
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let Some(cap) = capture.as_mut() {
                    let raw = t.into_inner();
                    let raw = String::from_utf8_lossy(&raw);
                    // XML escaping only; HTML entities are left for normalize_text.
                    match quick_xml::escape::unescape(raw.as_ref()) {
                        Ok(text) => cap.buf.push_str(&text),
                        Err(_) => cap.buf.push_str(&raw),
                    }
                }
            }
            Event::CData(c) => {
                if let Some(cap) = capture.as_mut() {
                    let raw = c.into_inner();
                    cap.buf.push_str(&String::from_utf8_lossy(&raw));
                }
            }
            Event::End(e) => {
                if let Some(cap) = capture.as_mut() {
                    if cap.depth > 0 {
                        cap.depth -= 1;
                        continue;
                    }
                }
                if let Some(cap) = capture.take() {
                    if let Some(cur) = entry.as_mut() {
                        let slot = cur.slot(cap.field);
                        if slot.trim().is_empty() {
                            *slot = cap.buf;
                        }
                    }
                    continue;
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if name == "item" || name == "entry" {
                    if let Some(done) = entry.take() {
                        finish_entry(done, ctx, &mut out);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::WrongContentType(
            "no feed root element".to_string(),
        ));
    }
    Ok(out)
}

fn check_root(name: &str) -> Result<(), ParseError> {
    match name {
        "rss" | "feed" | "rdf:rdf" => Ok(()),
        other => Err(ParseError::WrongContentType(format!(
            "expected a feed, found <{other}>"
        ))),
    }
}

fn finish_entry(entry: Entry, ctx: &ParseContext<'_>, out: &mut ParseOutcome) {
    let title = normalize_text(&entry.title);
    let link = entry.link.trim().to_string();
    if title.is_empty() && link.is_empty() {
        out.errors.push(ParseError::SchemaMismatch(
            "entry without title or link".to_string(),
        ));
        return;
    }
    let body_raw = if entry.content.trim().is_empty() {
        &entry.description
    } else {
        &entry.content
    };
    let body = normalize_text(body_raw);
    let published = entry.published_at();
    out.items.push(ctx.item(&title, &body, &link, published));
}
