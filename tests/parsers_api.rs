// tests/parsers_api.rs
use chrono::{TimeZone, Utc};

use topic_digest::error::ParseError;
use topic_digest::ingest::fetcher::FetchResponse;
use topic_digest::ingest::parsers::api::FieldMap;
use topic_digest::ingest::parsers::{ParseContext, ParseOutcome, Parser};
use topic_digest::model::{Source, SourceKind};

mod common;

fn alerts_source() -> Source {
    let mut src = common::source("weather_api", SourceKind::Api, 0.6, &["weather"]);
    src.mapping = FieldMap {
        items_path: Some("data.alerts".into()),
        title: "headline".into(),
        body: "detail.text".into(),
        url: "link".into(),
        published_at: "issued".into(),
    };
    src
}

fn parse(src: &Source, body: &str) -> Result<ParseOutcome, ParseError> {
    let ctx = ParseContext {
        source: src,
        topic: "weather",
        fetched_at: Utc::now(),
    };
    Parser::Api.parse(&FetchResponse::ok(body.to_string()), &ctx)
}

#[test]
fn field_map_extracts_nested_values() {
    let out = parse(&alerts_source(), include_str!("fixtures/weather_api.json")).unwrap();
    assert_eq!(out.items.len(), 2);

    let flood = &out.items[0];
    assert_eq!(flood.title, "Flood watch for river valley");
    assert_eq!(flood.body, "Rainfall of 40 mm expected.");
    assert_eq!(flood.url, "https://api.weather.example.com/alerts/1");
    assert_eq!(flood.published_at, Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap());

    let frost = &out.items[1];
    assert_eq!(frost.published_at, Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap());
}

#[test]
fn bad_entries_are_reported_not_fatal() {
    let out = parse(&alerts_source(), include_str!("fixtures/weather_api.json")).unwrap();
    assert_eq!(out.errors.len(), 2);
    assert!(out
        .errors
        .iter()
        .all(|e| matches!(e, ParseError::SchemaMismatch(_))));
}

#[test]
fn default_mapping_reads_a_top_level_array() {
    let src = common::source("plain", SourceKind::Api, 0.6, &["weather"]);
    let body = r#"[{"title":"A","content":"x","url":"https://a.example/1","published_at":"2024-03-05 14:30:00"}]"#;
    let out = parse(&src, body).unwrap();
    assert_eq!(out.items.len(), 1);
    assert_eq!(out.items[0].body, "x");
}

#[test]
fn missing_items_path_is_a_schema_mismatch() {
    let err = parse(&alerts_source(), r#"{"data":{}}"#).unwrap_err();
    assert!(matches!(err, ParseError::SchemaMismatch(_)));
}

#[test]
fn non_json_payloads_fail() {
    let src = alerts_source();
    assert!(matches!(
        parse(&src, "<rss></rss>"),
        Err(ParseError::WrongContentType(_))
    ));
    assert!(matches!(
        parse(&src, "{\"data\": [1, 2"),
        Err(ParseError::Malformed(_))
    ));
}
