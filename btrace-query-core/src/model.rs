// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Normalized records served to browser clients.
//!
//! Field names follow the JSON shape the UI consumes (`ID`, `ParentID`, ...),
//! not the wire names of the storage service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::proto;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Start/end instants and duration exactly as the backend reported them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "Started")]
    pub started: String,
    #[serde(rename = "Ended")]
    pub ended: String,
    #[serde(rename = "Duration")]
    pub duration: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ParentID")]
    pub parent_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    /// Omitted entirely when the backend sent no timestamp.
    #[serde(rename = "Time", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Timestamp>,
    /// Always present, `[]` when the span has no logs.
    #[serde(rename = "Logs", default)]
    pub logs: Vec<KeyValue>,
}

/// Trace id to the spans of that trace, in arrival order.
///
/// Keyed by a `BTreeMap` so two identical streams serialize to identical
/// bytes.
pub type ServiceDataAggregate = BTreeMap<String, Vec<Span>>;

/// Service names in arrival order, duplicates kept.
pub type ServicesAggregate = Vec<String>;

impl From<proto::KeyValue> for KeyValue {
    fn from(kv: proto::KeyValue) -> Self {
        Self {
            kind: kv.r#type,
            value: kv.value,
        }
    }
}

impl From<proto::Timestamp> for Timestamp {
    fn from(ts: proto::Timestamp) -> Self {
        Self {
            started: ts.started,
            ended: ts.ended,
            duration: ts.duration,
        }
    }
}

impl From<proto::Span> for Span {
    fn from(span: proto::Span) -> Self {
        Self {
            id: span.span_id,
            parent_id: span.parent_span_id,
            name: span.span_name,
            time: span.timestamp.map(Timestamp::from),
            logs: span.logs.into_iter().map(KeyValue::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_span(logs: Vec<proto::KeyValue>, timestamp: Option<proto::Timestamp>) -> proto::Span {
        proto::Span {
            span_id: "s1".to_string(),
            parent_span_id: String::new(),
            span_name: "root".to_string(),
            timestamp,
            logs,
        }
    }

    #[test]
    fn test_span_without_logs_serializes_empty_array() {
        let span = Span::from(wire_span(vec![], None));
        let value = serde_json::to_value(&span).unwrap();
        assert_eq!(
            value,
            json!({"ID": "s1", "ParentID": "", "Name": "root", "Logs": []})
        );
    }

    #[test]
    fn test_timestamp_copied_verbatim() {
        let span = Span::from(wire_span(
            vec![],
            Some(proto::Timestamp {
                started: "1700000000.123".to_string(),
                ended: "not-a-date".to_string(),
                duration: 0.25,
            }),
        ));
        let value = serde_json::to_value(&span).unwrap();
        assert_eq!(
            value["Time"],
            json!({"Started": "1700000000.123", "Ended": "not-a-date", "Duration": 0.25})
        );
    }

    #[test]
    fn test_log_order_preserved() {
        let logs = vec![
            proto::KeyValue {
                r#type: "b".to_string(),
                value: "2".to_string(),
            },
            proto::KeyValue {
                r#type: "a".to_string(),
                value: "1".to_string(),
            },
            proto::KeyValue {
                r#type: "b".to_string(),
                value: "2".to_string(),
            },
        ];
        let span = Span::from(wire_span(logs, None));
        let kinds: Vec<_> = span.logs.iter().map(|kv| kv.kind.as_str()).collect();
        assert_eq!(kinds, vec!["b", "a", "b"]);
    }
}
