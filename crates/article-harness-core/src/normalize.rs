//! Raw article → canonical record.
//!
//! Pure and deterministic. Nested `headline.main` and `byline.original` are
//! flattened, transport-only fields are dropped, and every other field either
//! maps to a canonical column or is kept in `extra`. Only a missing `uri`
//! rejects the record; any other absent or mistyped field becomes null/empty.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::NormalizationError;
use crate::models::{CanonicalRecord, RawRecord};

/// Fields never stored.
pub const DROPPED_FIELDS: &[&str] = &["multimedia", "keywords", "_id"];

/// Fields consumed into dedicated canonical columns.
const MAPPED_FIELDS: &[&str] = &[
    "uri",
    "headline",
    "byline",
    "pub_date",
    "section_name",
    "section",
    "subsection_name",
    "subsection",
    "word_count",
    "abstract",
    "web_url",
    "lead_paragraph",
    "snippet",
    "source",
    "document_type",
    "news_desk",
    "type_of_material",
];

pub fn normalize(raw: &RawRecord) -> Result<CanonicalRecord, NormalizationError> {
    let empty = Map::new();
    let obj = raw.0.as_object().unwrap_or(&empty);

    let uri = match obj.get("uri").and_then(Value::as_str) {
        Some(u) if !u.trim().is_empty() => u.to_string(),
        _ => return Err(NormalizationError::MissingUri),
    };

    let extra: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| {
            !DROPPED_FIELDS.contains(&k.as_str()) && !MAPPED_FIELDS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut record = CanonicalRecord {
        uri,
        headline: flatten(obj.get("headline"), "main"),
        byline: flatten(obj.get("byline"), "original"),
        published_date: obj
            .get("pub_date")
            .and_then(Value::as_str)
            .and_then(parse_pub_date),
        section: first_str(obj, &["section_name", "section"]).unwrap_or_default(),
        subsection: first_str(obj, &["subsection_name", "subsection"]).unwrap_or_default(),
        word_count: obj.get("word_count").and_then(as_integer),
        sequence_id: None,
        abstract_text: string_field(obj, "abstract"),
        web_url: string_field(obj, "web_url"),
        lead_paragraph: string_field(obj, "lead_paragraph"),
        snippet: string_field(obj, "snippet"),
        source: string_field(obj, "source"),
        document_type: string_field(obj, "document_type"),
        news_desk: string_field(obj, "news_desk"),
        type_of_material: string_field(obj, "type_of_material"),
        extra,
        content_hash: String::new(),
    };
    record.content_hash = content_hash(&record);
    Ok(record)
}

/// `{ "main": "..." }` → `"..."`; a bare string is taken as-is.
fn flatten(value: Option<&Value>, key: &str) -> Option<String> {
    match value? {
        Value::Object(map) => map.get(key).and_then(Value::as_str).map(str::to_string),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| string_field(obj, k))
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts RFC 3339 and the upstream `2024-01-01T05:00:08+0000` form.
pub fn parse_pub_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Hash of the record content, independent of `sequence_id`.
pub fn content_hash(record: &CanonicalRecord) -> String {
    let mut hasher = Sha256::new();
    let fields: [Option<&str>; 13] = [
        Some(record.uri.as_str()),
        record.headline.as_deref(),
        record.byline.as_deref(),
        Some(record.section.as_str()),
        Some(record.subsection.as_str()),
        record.abstract_text.as_deref(),
        record.web_url.as_deref(),
        record.lead_paragraph.as_deref(),
        record.snippet.as_deref(),
        record.source.as_deref(),
        record.document_type.as_deref(),
        record.news_desk.as_deref(),
        record.type_of_material.as_deref(),
    ];
    for field in fields {
        match field {
            Some(s) => {
                hasher.update([1u8]);
                hasher.update((s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    hasher.update(
        record
            .published_date
            .map(|d| d.timestamp_millis())
            .unwrap_or(i64::MIN)
            .to_le_bytes(),
    );
    hasher.update(record.word_count.unwrap_or(i64::MIN).to_le_bytes());
    // serde_json::Map is ordered, so this is stable.
    hasher.update(Value::Object(record.extra.clone()).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> RawRecord {
        RawRecord(json!({
            "_id": "nyt://article/1",
            "uri": "nyt://article/1",
            "headline": { "main": "Main Headline", "kicker": "Kick" },
            "byline": { "original": "By Jane Doe", "person": [] },
            "pub_date": "2024-01-15T05:00:08+0000",
            "section_name": "World",
            "subsection_name": "Europe",
            "word_count": 812,
            "abstract": "Short abstract.",
            "web_url": "https://example.com/a",
            "multimedia": [{ "url": "img.jpg" }],
            "keywords": [{ "name": "subject", "value": "Politics" }],
            "print_page": "A1"
        }))
    }

    #[test]
    fn flattens_and_passes_through() {
        let rec = normalize(&sample()).unwrap();
        assert_eq!(rec.uri, "nyt://article/1");
        assert_eq!(rec.headline.as_deref(), Some("Main Headline"));
        assert_eq!(rec.byline.as_deref(), Some("By Jane Doe"));
        assert_eq!(rec.section, "World");
        assert_eq!(rec.subsection, "Europe");
        assert_eq!(rec.word_count, Some(812));
        assert_eq!(rec.abstract_text.as_deref(), Some("Short abstract."));
        assert_eq!(
            rec.published_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 5, 0, 8).unwrap())
        );
        assert_eq!(rec.sequence_id, None);
        assert_eq!(rec.extra.get("print_page"), Some(&json!("A1")));
    }

    #[test]
    fn drops_transport_fields() {
        let rec = normalize(&sample()).unwrap();
        for key in DROPPED_FIELDS {
            assert!(!rec.extra.contains_key(*key), "{key} leaked into extra");
        }
        let stored = serde_json::to_value(&rec).unwrap();
        assert!(stored.get("multimedia").is_none());
        assert!(stored.get("keywords").is_none());
    }

    #[test]
    fn missing_uri_is_rejected() {
        let raw = RawRecord(json!({ "headline": { "main": "No key" } }));
        assert_eq!(normalize(&raw), Err(NormalizationError::MissingUri));
        let raw = RawRecord(json!({ "uri": "   " }));
        assert_eq!(normalize(&raw), Err(NormalizationError::MissingUri));
        let raw = RawRecord(json!("not an object"));
        assert_eq!(normalize(&raw), Err(NormalizationError::MissingUri));
    }

    #[test]
    fn absent_fields_degrade_to_null() {
        let raw = RawRecord(json!({
            "uri": "nyt://article/2",
            "headline": null,
            "byline": 42,
            "pub_date": "yesterday",
            "word_count": "n/a"
        }));
        let rec = normalize(&raw).unwrap();
        assert_eq!(rec.headline, None);
        assert_eq!(rec.byline, None);
        assert_eq!(rec.published_date, None);
        assert_eq!(rec.word_count, None);
        assert_eq!(rec.section, "");
        assert_eq!(rec.subsection, "");
    }

    #[test]
    fn legacy_section_keys_are_read() {
        let raw = RawRecord(json!({ "uri": "u", "section": "Arts", "subsection": "Music" }));
        let rec = normalize(&raw).unwrap();
        assert_eq!(rec.section, "Arts");
        assert_eq!(rec.subsection, "Music");
    }

    #[test]
    fn hash_ignores_sequence_id_and_tracks_content() {
        let a = normalize(&sample()).unwrap();
        let mut b = a.clone();
        b.sequence_id = Some(7);
        assert_eq!(content_hash(&a), content_hash(&b));

        b.headline = Some("Corrected headline".into());
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_distinguishes_absent_and_empty_material_type() {
        let mut absent = normalize(&sample()).unwrap();
        absent.type_of_material = None;
        let mut empty = absent.clone();
        empty.type_of_material = Some(String::new());
        assert_ne!(content_hash(&absent), content_hash(&empty));
    }

    #[test]
    fn hash_tracks_sub_second_publication_time() {
        let a = normalize(&sample()).unwrap();
        let mut b = a.clone();
        b.published_date = parse_pub_date("2024-01-15T05:00:08.250+0000");
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn normalization_is_deterministic() {
        assert_eq!(normalize(&sample()).unwrap(), normalize(&sample()).unwrap());
    }

    #[test]
    fn parses_rfc3339_dates() {
        assert_eq!(
            parse_pub_date("2024-03-01T00:00:00Z"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
    }
}
