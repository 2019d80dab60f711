// tests/parsers_html.rs
use chrono::Utc;

use topic_digest::error::ParseError;
use topic_digest::ingest::fetcher::FetchResponse;
use topic_digest::ingest::parsers::html::{HtmlRules, Selector};
use topic_digest::ingest::parsers::{ParseContext, ParseOutcome, Parser};
use topic_digest::model::{Source, SourceKind};

mod common;

fn parse_with(src: &Source, body: &str) -> Result<ParseOutcome, ParseError> {
    let ctx = ParseContext {
        source: src,
        topic: "weather",
        fetched_at: Utc::now(),
    };
    Parser::Html.parse(
        &FetchResponse::ok(body.to_string()).with_content_type("text/html; charset=utf-8"),
        &ctx,
    )
}

#[test]
fn malformed_markup_keeps_items_before_the_break() {
    let src = common::source("city_weather", SourceKind::Html, 0.7, &["weather"]);
    let out = parse_with(&src, include_str!("fixtures/weather_page.html")).unwrap();

    let titles: Vec<&str> = out.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Storm front reaches the coast", "Heat advisory lifted"]);
    assert_eq!(out.items[0].body, "Gusts of 90 km/h expected overnight.");
    assert_eq!(
        out.items[0].url,
        "https://city-weather.example.com/stories/storm-front"
    );
    assert_eq!(out.items[1].url, "https://weather.example.org/heat");
    assert_eq!(out.items[1].body, "Temperatures return to seasonal averages by Friday.");
    assert!(matches!(out.errors.as_slice(), [ParseError::Malformed(_)]));
}

#[test]
fn custom_selectors_pick_items() {
    let mut src = common::source("board", SourceKind::Html, 0.5, &["weather"]);
    src.rules = HtmlRules {
        item: Selector::parse("li.post").unwrap(),
        title: Selector::parse("span.headline").unwrap(),
        body: Selector::parse("div[data-role=summary]").unwrap(),
        link: Selector::parse("a.permalink").unwrap(),
    };
    let html = r#"<ul>
      <li class="ad"><span class="headline">Sponsored</span></li>
      <li class="post featured">
        <a class="author" href="/u/1">someone</a>
        <span class="headline">Hail in the north</span>
        <div data-role="summary">Pea-sized hail reported.</div>
        <a class="permalink" href="/p/42">#</a>
      </li>
    </ul>"#;
    let out = parse_with(&src, html).unwrap();
    assert!(out.errors.is_empty());
    assert_eq!(out.items.len(), 1);
    assert_eq!(out.items[0].title, "Hail in the north");
    assert_eq!(out.items[0].body, "Pea-sized hail reported.");
    assert_eq!(out.items[0].url, "https://board.example.com/p/42");
}

#[test]
fn link_text_is_the_fallback_title() {
    let src = common::source("links", SourceKind::Html, 0.5, &["weather"]);
    let html = r#"<article><a href="https://x.example/a">Wind easing by noon</a></article>"#;
    let out = parse_with(&src, html).unwrap();
    assert_eq!(out.items[0].title, "Wind easing by noon");
}

#[test]
fn unmatched_structure_is_not_an_error() {
    let src = common::source("empty", SourceKind::Html, 0.5, &["weather"]);
    let out = parse_with(&src, "<html><body><div>No articles today</div></body></html>").unwrap();
    assert!(out.items.is_empty());
    assert!(out.errors.is_empty());
}

#[test]
fn json_content_type_is_rejected() {
    let src = common::source("wrong", SourceKind::Html, 0.5, &["weather"]);
    let ctx = ParseContext {
        source: &src,
        topic: "weather",
        fetched_at: Utc::now(),
    };
    let raw = FetchResponse::ok(r#"{"a":1}"#).with_content_type("application/json");
    assert!(matches!(
        Parser::Html.parse(&raw, &ctx),
        Err(ParseError::WrongContentType(_))
    ));
}

#[test]
fn bare_less_than_in_text_stays_text() {
    let src = common::source("temps", SourceKind::Html, 0.5, &["weather"]);
    let html = "<article><h2>Temps 3 < 5 today</h2><p>Cold.</p></article>";
    let out = parse_with(&src, html).unwrap();
    assert!(out.errors.is_empty(), "{:?}", out.errors);
    assert_eq!(out.items.len(), 1);
    assert_eq!(out.items[0].title, "Temps 3 < 5 today");
    assert_eq!(out.items[0].body, "Cold.");
}

#[test]
fn combinators_narrow_the_rules() {
    let mut src = common::source("desk", SourceKind::Html, 0.5, &["weather"]);
    src.rules = HtmlRules {
        item: Selector::parse("main > section.card").unwrap(),
        title: Selector::parse("header h3").unwrap(),
        ..HtmlRules::default()
    };
    let html = r#"<main>
      <section class="card">
        <h3>Sidebar heading</h3>
        <header><h3>Snow on the passes</h3></header>
        <p>Chains required above 1200 m.</p>
      </section>
      <aside><section class="card"><header><h3>Not a direct child</h3></header></section></aside>
    </main>"#;
    let out = parse_with(&src, html).unwrap();
    let titles: Vec<&str> = out.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Snow on the passes"]);
    assert_eq!(out.items[0].body, "Chains required above 1200 m.");
}
