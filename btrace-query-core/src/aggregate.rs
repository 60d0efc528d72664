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

//! Aggregate Builder
//!
//! Folds drained records into the terminal artifact of each endpoint: an
//! ordered list of service names, or a map from trace id to normalized spans.

use tracing::{debug, trace};

use crate::model::{ServiceDataAggregate, ServicesAggregate, Span};
use crate::proto;

/// A fold over one drained stream.
pub trait Aggregate {
    type Record;
    type Output;

    fn fold(&mut self, record: Self::Record);

    fn finish(self) -> Self::Output;
}

/// Collects service names verbatim, in arrival order, duplicates included.
#[derive(Debug, Default)]
pub struct ServicesBuilder {
    services: ServicesAggregate,
}

impl ServicesBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregate for ServicesBuilder {
    type Record = proto::Service;
    type Output = ServicesAggregate;

    fn fold(&mut self, record: proto::Service) {
        self.services.push(record.name);
    }

    fn finish(self) -> ServicesAggregate {
        self.services
    }
}

/// Builds the trace id → spans map for one service.
///
/// Each bundle is authoritative for its trace id: a later bundle with the
/// same id replaces the earlier spans instead of merging with them.
#[derive(Debug, Default)]
pub struct ServiceDataBuilder {
    traces: ServiceDataAggregate,
}

impl ServiceDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `bundle` and insert-or-replace it under its trace id.
    /// Returns the spans it displaced, if any.
    pub fn apply(&mut self, bundle: proto::TraceData) -> Option<Vec<Span>> {
        let spans: Vec<Span> = bundle
            .spans
            .into_iter()
            .map(|span| {
                let span = Span::from(span);
                trace!(span_id = %span.id, logs = ?span.logs, "normalized span");
                span
            })
            .collect();

        let replaced = self.traces.insert(bundle.trace_id, spans);
        if let Some(previous) = &replaced {
            debug!(
                replaced_spans = previous.len(),
                "trace bundle replaced an earlier bundle with the same id"
            );
        }
        replaced
    }
}

impl Aggregate for ServiceDataBuilder {
    type Record = proto::TraceData;
    type Output = ServiceDataAggregate;

    fn fold(&mut self, record: proto::TraceData) {
        self.apply(record);
    }

    fn finish(self) -> ServiceDataAggregate {
        self.traces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn span(id: &str, parent: &str, name: &str) -> proto::Span {
        proto::Span {
            span_id: id.to_string(),
            parent_span_id: parent.to_string(),
            span_name: name.to_string(),
            timestamp: None,
            logs: vec![],
        }
    }

    fn bundle(trace_id: &str, spans: Vec<proto::Span>) -> proto::TraceData {
        proto::TraceData {
            trace_id: trace_id.to_string(),
            spans,
        }
    }

    fn build(bundles: Vec<proto::TraceData>) -> ServiceDataAggregate {
        let mut builder = ServiceDataBuilder::new();
        for b in bundles {
            builder.fold(b);
        }
        builder.finish()
    }

    #[test]
    fn test_single_root_span() {
        let traces = build(vec![bundle("t1", vec![span("s1", "", "root")])]);
        assert_eq!(
            serde_json::to_value(&traces).unwrap(),
            json!({"t1": [{"ID": "s1", "ParentID": "", "Name": "root", "Logs": []}]})
        );
    }

    #[test]
    fn test_empty_stream_yields_empty_map() {
        let traces = build(vec![]);
        assert!(traces.is_empty());
        assert_eq!(serde_json::to_string(&traces).unwrap(), "{}");

        let services = ServicesBuilder::new().finish();
        assert_eq!(serde_json::to_string(&services).unwrap(), "[]");
    }

    #[test]
    fn test_bundle_without_spans_yields_empty_array() {
        let traces = build(vec![bundle("t1", vec![])]);
        assert_eq!(serde_json::to_value(&traces).unwrap(), json!({"t1": []}));
    }

    #[test]
    fn test_second_bundle_replaces_first() {
        let mut builder = ServiceDataBuilder::new();
        assert!(builder
            .apply(bundle("t1", vec![span("a", "", "first"), span("b", "a", "child")]))
            .is_none());

        let replaced = builder.apply(bundle("t1", vec![span("c", "", "second")]));
        assert_eq!(replaced.map(|spans| spans.len()), Some(2));

        let traces = builder.finish();
        assert_eq!(traces.len(), 1);
        let ids: Vec<_> = traces["t1"].iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn test_span_order_within_bundle() {
        let traces = build(vec![bundle(
            "t1",
            vec![span("z", "", "root"), span("a", "z", "x"), span("m", "a", "y")],
        )]);
        let ids: Vec<_> = traces["t1"].iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_time_is_never_partial() {
        let mut timed = span("s1", "", "root");
        timed.timestamp = Some(proto::Timestamp {
            started: String::new(),
            ended: String::new(),
            duration: 0.0,
        });
        let traces = build(vec![bundle("t1", vec![timed, span("s2", "s1", "child")])]);
        let value = serde_json::to_value(&traces).unwrap();

        let time = value["t1"][0]["Time"].as_object().unwrap();
        assert_eq!(time.len(), 3);
        assert!(value["t1"][1].get("Time").is_none());
    }

    fn arb_span() -> impl Strategy<Value = proto::Span> {
        (
            "[a-z0-9]{1,6}",
            "[a-z0-9]{0,6}",
            ".{0,8}",
            proptest::option::of(("[0-9]{1,10}", "[0-9]{1,10}", 0.0f32..1e6)),
            proptest::collection::vec((".{0,4}", ".{0,8}"), 0..4),
        )
            .prop_map(|(id, parent, name, ts, logs)| proto::Span {
                span_id: id,
                parent_span_id: parent,
                span_name: name,
                timestamp: ts.map(|(started, ended, duration)| proto::Timestamp {
                    started,
                    ended,
                    duration,
                }),
                logs: logs
                    .into_iter()
                    .map(|(t, v)| proto::KeyValue { r#type: t, value: v })
                    .collect(),
            })
    }

    fn arb_bundle() -> impl Strategy<Value = proto::TraceData> {
        (
            "t[0-3]",
            proptest::collection::vec(arb_span(), 0..5),
        )
            .prop_map(|(trace_id, spans)| proto::TraceData { trace_id, spans })
    }

    proptest! {
        #[test]
        fn prop_services_keep_order_and_duplicates(names in proptest::collection::vec("[a-c]{0,3}", 0..32)) {
            let mut builder = ServicesBuilder::new();
            for name in &names {
                builder.fold(proto::Service { name: name.clone() });
            }
            prop_assert_eq!(builder.finish(), names);
        }

        #[test]
        fn prop_last_bundle_wins(bundles in proptest::collection::vec(arb_bundle(), 0..12)) {
            let traces = build(bundles.clone());

            for (trace_id, spans) in &traces {
                let last = bundles.iter().rev().find(|b| &b.trace_id == trace_id).unwrap();
                let expected: Vec<Span> = last.spans.iter().cloned().map(Span::from).collect();
                prop_assert_eq!(spans, &expected);
            }
            let distinct: std::collections::BTreeSet<_> =
                bundles.iter().map(|b| b.trace_id.clone()).collect();
            prop_assert_eq!(traces.len(), distinct.len());
        }

        #[test]
        fn prop_replay_is_byte_identical(bundles in proptest::collection::vec(arb_bundle(), 0..12)) {
            let first = serde_json::to_vec(&build(bundles.clone())).unwrap();
            let second = serde_json::to_vec(&build(bundles)).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_logs_always_serialized(bundles in proptest::collection::vec(arb_bundle(), 1..6)) {
            let value = serde_json::to_value(build(bundles)).unwrap();
            for spans in value.as_object().unwrap().values() {
                for span in spans.as_array().unwrap() {
                    prop_assert!(span["Logs"].is_array());
                    if let Some(time) = span.get("Time") {
                        prop_assert_eq!(time.as_object().unwrap().len(), 3);
                    }
                }
            }
        }
    }
}
