//! Decoded records of the generate stream and the final result set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_END: &str = "end";
pub const STATUS_COMPLETE: &str = "complete";
pub const STATUS_RATE_LIMITED: u16 = 429;

/// One record pushed by the backend: a status discriminator plus a
/// status-dependent `output` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawServerRecord {
    pub status: StatusField,
    #[serde(default)]
    pub output: Value,
}

/// The backend encodes most statuses as strings but rate limiting as the
/// bare number 429.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StatusField {
    Code(u16),
    Label(String),
}

/// A stream record after interpretation, ready for the session machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// `"processing"` or `"end"`: a human-readable progress line.
    Progress { text: String },
    /// `"complete"`: the full ranked result set, in display order.
    Complete { results: ResultSet },
    /// Wire status 429: the backend refused to finish the session.
    RateLimited { message: String },
}

/// A record the client does not understand. Violations are logged and
/// dropped by the transport; they never terminate a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("undecodable stream record: {detail}")]
    MalformedRecord { detail: String },
    #[error("stream record carried unknown status {status}")]
    UnknownStatus { status: String },
    #[error("{status} record carried an unusable output: {detail}")]
    BadOutput { status: String, detail: String },
}

/// Classifies a decoded record into a [`ServerEvent`].
pub fn interpret_record(record: RawServerRecord) -> Result<ServerEvent, ProtocolViolation> {
    match record.status {
        StatusField::Code(STATUS_RATE_LIMITED) => Ok(ServerEvent::RateLimited {
            message: stringify_output(record.output),
        }),
        StatusField::Code(code) => Err(ProtocolViolation::UnknownStatus {
            status: code.to_string(),
        }),
        StatusField::Label(label) => match label.as_str() {
            STATUS_PROCESSING | STATUS_END => match record.output {
                Value::String(text) => Ok(ServerEvent::Progress { text }),
                other => Err(ProtocolViolation::BadOutput {
                    status: label,
                    detail: format!("expected a progress string, got {}", json_kind(&other)),
                }),
            },
            STATUS_COMPLETE => match ResultSet::from_value(record.output) {
                Ok(results) => Ok(ServerEvent::Complete { results }),
                Err(source) => Err(ProtocolViolation::BadOutput {
                    status: label,
                    detail: source.to_string(),
                }),
            },
            _ => Err(ProtocolViolation::UnknownStatus { status: label }),
        },
    }
}

/// Rate-limit outputs are surfaced to the user, so non-string payloads are
/// rendered rather than rejected.
fn stringify_output(output: Value) -> String {
    match output {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One ranked recommendation as delivered by the `complete` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub name: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default, rename = "photo")]
    pub photo_url: String,
    #[serde(default)]
    pub maps_uri: String,
    /// Availability phrase as worded by the backend: `"Available"`,
    /// `"Not Available"` or `"Unknown"`.
    #[serde(default)]
    pub delivery: String,
}

/// The final recommendations keyed by the backend's rank identifiers.
/// Entry order is the payload's object order and is the canonical display
/// order; the set is immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    entries: Vec<(String, Recommendation)>,
}

impl ResultSet {
    /// Decodes the `complete` output object, preserving key order.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let object: serde_json::Map<String, Value> = serde_json::from_value(value)?;
        let mut entries = Vec::with_capacity(object.len());
        for (key, entry) in object {
            entries.push((key, serde_json::from_value(entry)?));
        }
        Ok(Self { entries })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Recommendation)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, Recommendation)] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&Recommendation> {
        self.entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, recommendation)| recommendation)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(raw: Value) -> RawServerRecord {
        serde_json::from_value(raw).expect("record decodes")
    }

    #[test]
    fn processing_record_becomes_progress() {
        let event = interpret_record(record(json!({"status": "processing", "output": "thinking"})))
            .expect("progress event");
        assert_eq!(
            event,
            ServerEvent::Progress {
                text: "thinking".to_string()
            }
        );
    }

    #[test]
    fn end_record_becomes_progress() {
        let event = interpret_record(record(json!({"status": "end", "output": "Saved a liking"})))
            .expect("progress event");
        assert_eq!(
            event,
            ServerEvent::Progress {
                text: "Saved a liking".to_string()
            }
        );
    }

    #[test]
    fn complete_record_keeps_payload_order_and_fields() {
        let event = interpret_record(record(json!({
            "status": "complete",
            "output": {
                "zebra": {
                    "name": "Zebra Bar", "rating": 4.5, "photo": "z.jpg",
                    "maps_uri": "maps://z", "delivery": "Available"
                },
                "apple": {
                    "name": "Apple Cafe", "rating": 3.0, "photo": "a.jpg",
                    "maps_uri": "maps://a", "delivery": "Not Available"
                },
                "mango": {
                    "name": "Mango Grill", "rating": 5.0, "photo": "m.jpg",
                    "maps_uri": "maps://m", "delivery": "Unknown"
                }
            }
        })))
        .expect("complete event");

        let ServerEvent::Complete { results } = event else {
            panic!("expected complete event");
        };
        let keys: Vec<&str> = results.keys().collect();
        assert_eq!(keys, ["zebra", "apple", "mango"]);
        let zebra = results.get("zebra").expect("zebra entry");
        assert_eq!(zebra.name, "Zebra Bar");
        assert_eq!(zebra.photo_url, "z.jpg");
        assert_eq!(zebra.maps_uri, "maps://z");
        assert_eq!(zebra.delivery, "Available");
    }

    #[test]
    fn complete_record_keeps_delivery_phrase_verbatim() {
        let event = interpret_record(record(json!({
            "status": "complete",
            "output": {
                "1": {"name": "Casa Mono", "rating": 4.2, "delivery": "Not Available"}
            }
        })))
        .expect("complete event");

        let ServerEvent::Complete { results } = event else {
            panic!("expected complete event");
        };
        assert_eq!(results.get("1").expect("entry").delivery, "Not Available");
    }

    #[test]
    fn complete_record_defaults_optional_fields() {
        let event = interpret_record(record(json!({
            "status": "complete",
            "output": {"0": {"name": "Bare"}}
        })))
        .expect("complete event");

        let ServerEvent::Complete { results } = event else {
            panic!("expected complete event");
        };
        let bare = results.get("0").expect("entry");
        assert_eq!(bare.rating, 0.0);
        assert_eq!(bare.photo_url, "");
        assert_eq!(bare.maps_uri, "");
        assert_eq!(bare.delivery, "");
    }

    #[test]
    fn rate_limited_record_surfaces_message() {
        let event = interpret_record(record(json!({
            "status": 429,
            "output": "Rate limit reached (From: places)"
        })))
        .expect("rate limited event");
        assert_eq!(
            event,
            ServerEvent::RateLimited {
                message: "Rate limit reached (From: places)".to_string()
            }
        );
    }

    #[test]
    fn rate_limited_record_renders_non_string_output() {
        let event = interpret_record(record(json!({"status": 429, "output": {"limit": 10}})))
            .expect("rate limited event");
        let ServerEvent::RateLimited { message } = event else {
            panic!("expected rate limited event");
        };
        assert!(message.contains("limit"));
    }

    #[test]
    fn unknown_label_status_is_a_violation() {
        let violation = interpret_record(record(json!({"status": "saving", "output": "x"})))
            .expect_err("unknown status");
        assert_eq!(
            violation,
            ProtocolViolation::UnknownStatus {
                status: "saving".to_string()
            }
        );
    }

    #[test]
    fn unknown_numeric_status_is_a_violation() {
        let violation =
            interpret_record(record(json!({"status": 500, "output": "x"}))).expect_err("unknown");
        assert_eq!(
            violation,
            ProtocolViolation::UnknownStatus {
                status: "500".to_string()
            }
        );
    }

    #[test]
    fn progress_with_object_output_is_a_violation() {
        let violation = interpret_record(record(json!({"status": "processing", "output": {}})))
            .expect_err("bad output");
        assert!(matches!(
            violation,
            ProtocolViolation::BadOutput { status, .. } if status == "processing"
        ));
    }

    #[test]
    fn complete_with_array_output_is_a_violation() {
        let violation = interpret_record(record(json!({"status": "complete", "output": [1, 2]})))
            .expect_err("bad output");
        assert!(matches!(
            violation,
            ProtocolViolation::BadOutput { status, .. } if status == "complete"
        ));
    }

    #[test]
    fn complete_entry_without_name_is_a_violation() {
        let violation = interpret_record(record(json!({
            "status": "complete",
            "output": {"0": {"rating": 4.0}}
        })))
        .expect_err("bad output");
        assert!(matches!(violation, ProtocolViolation::BadOutput { .. }));
    }

    #[test]
    fn missing_output_defaults_to_null() {
        let violation =
            interpret_record(record(json!({"status": "processing"}))).expect_err("bad output");
        assert!(matches!(
            violation,
            ProtocolViolation::BadOutput { detail, .. } if detail.contains("null")
        ));
    }

    #[test]
    fn result_set_lookup_and_sizes() {
        let results = ResultSet::from_value(json!({
            "a": {"name": "A"},
            "b": {"name": "B"}
        }))
        .expect("result set");
        assert_eq!(results.len(), 2);
        assert!(!results.is_empty());
        assert_eq!(results.get("b").map(|r| r.name.as_str()), Some("B"));
        assert!(results.get("missing").is_none());
    }
}
