// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ordered record of everything a dispatch did.
//!
//! Backend calls, event emissions and deferrals are appended to one list in
//! the order they happen. Nothing is reordered or batched, so the position of
//! a record relative to the others is part of what tests can assert.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventOrigin;

/// Outcome of a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CallOutcome {
    /// The call returned a value.
    Ok {
        /// Returned value, summarized for bulky results.
        value: Value,
    },
    /// The call failed.
    Err {
        /// Error class, see [`ModelError::code`](crate::ModelError::code).
        code: String,
        /// Error message.
        message: String,
    },
}

/// One backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Hook tool or Pebble API name, e.g. `relation-set`.
    pub call: String,
    /// Arguments as passed.
    pub args: Value,
    /// What happened.
    pub outcome: CallOutcome,
}

impl CallRecord {
    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, CallOutcome::Ok { .. })
    }

    /// Error class, for failed calls.
    pub fn error_code(&self) -> Option<&str> {
        match &self.outcome {
            CallOutcome::Err { code, .. } => Some(code),
            CallOutcome::Ok { .. } => None,
        }
    }
}

/// One event delivered to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitRecord {
    /// Event name.
    pub event: String,
    /// Framework handle path.
    pub handle_path: String,
    /// How the event arrived.
    pub origin: EventOrigin,
    /// Nesting depth; 0 for top-level deliveries.
    pub depth: usize,
}

/// A trace entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TraceRecord {
    /// A backend call.
    Call(CallRecord),
    /// An event delivery.
    Emit(EmitRecord),
    /// The operator deferred the event with this handle path.
    Defer {
        /// Event name.
        event: String,
        /// Framework handle path.
        handle_path: String,
    },
}

/// Everything one dispatch recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl Trace {
    /// An empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    /// All records in order.
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Backend calls in order.
    pub fn calls(&self) -> impl Iterator<Item = &CallRecord> {
        self.records.iter().filter_map(|r| match r {
            TraceRecord::Call(call) => Some(call),
            _ => None,
        })
    }

    /// Calls named `name`.
    pub fn calls_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CallRecord> {
        self.calls().filter(move |c| c.call == name)
    }

    /// Successful calls named `name`.
    pub fn successful_calls<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CallRecord> {
        self.calls_named(name).filter(|c| c.is_ok())
    }

    /// Failed calls of any name.
    pub fn failed_calls(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls().filter(|c| !c.is_ok())
    }

    /// Event deliveries in order.
    pub fn emitted(&self) -> impl Iterator<Item = &EmitRecord> {
        self.records.iter().filter_map(|r| match r {
            TraceRecord::Emit(emit) => Some(emit),
            _ => None,
        })
    }

    /// Delivered event names, optionally including framework lifecycle events.
    pub fn emitted_names(&self, include_lifecycle: bool) -> Vec<String> {
        self.emitted()
            .filter(|e| include_lifecycle || e.origin != EventOrigin::Lifecycle)
            .map(|e| e.event.clone())
            .collect()
    }

    /// Handle paths of events deferred during the dispatch.
    pub fn deferred(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| match r {
                TraceRecord::Defer { handle_path, .. } => Some(handle_path.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Trace {
        let mut trace = Trace::new();
        trace.push(TraceRecord::Emit(EmitRecord {
            event: "start".to_string(),
            handle_path: "charm/on/start[1]".to_string(),
            origin: EventOrigin::External,
            depth: 0,
        }));
        trace.push(TraceRecord::Call(CallRecord {
            call: "relation-set".to_string(),
            args: json!({"relation_id": 1}),
            outcome: CallOutcome::Ok { value: Value::Null },
        }));
        trace.push(TraceRecord::Call(CallRecord {
            call: "relation-set".to_string(),
            args: json!({"relation_id": 1}),
            outcome: CallOutcome::Err {
                code: "RelationDataAccessError".to_string(),
                message: "denied".to_string(),
            },
        }));
        trace.push(TraceRecord::Defer {
            event: "start".to_string(),
            handle_path: "charm/on/start[1]".to_string(),
        });
        trace.push(TraceRecord::Emit(EmitRecord {
            event: "commit".to_string(),
            handle_path: "charm/on/commit[2]".to_string(),
            origin: EventOrigin::Lifecycle,
            depth: 0,
        }));
        trace
    }

    #[test]
    fn test_filters() {
        let trace = sample();
        assert_eq!(trace.len(), 5);
        assert_eq!(trace.calls_named("relation-set").count(), 2);
        assert_eq!(trace.successful_calls("relation-set").count(), 1);
        assert_eq!(
            trace.failed_calls().next().and_then(|c| c.error_code()),
            Some("RelationDataAccessError")
        );
        assert_eq!(trace.emitted_names(false), vec!["start"]);
        assert_eq!(trace.emitted_names(true), vec!["start", "commit"]);
        assert_eq!(trace.deferred(), vec!["charm/on/start[1]"]);
    }

    #[test]
    fn test_serde_tags() {
        let trace = sample();
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["records"][0]["type"], "emit");
        assert_eq!(json["records"][2]["outcome"]["status"], "err");
        let back: Trace = serde_json::from_value(json).unwrap();
        assert_eq!(back, trace);
    }
}
