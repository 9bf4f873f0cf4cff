//! Append-only, time-ordered event log kept per entity.

use crate::{Error, Event, EventKind, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-entity event history
///
/// Appends must be non-decreasing in time and nothing may follow a death.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, enforcing the log's ordering guarantees
    pub fn append(
        &mut self,
        time: DateTime<Utc>,
        kind: EventKind,
        rule: &str,
        fatal: bool,
    ) -> Result<&Event> {
        if let Some(last) = self.events.last() {
            if last.kind == EventKind::Death {
                return Err(Error::EventLog(format!(
                    "cannot append {} from rule '{}' after death at {}",
                    kind, rule, last.time
                )));
            }
            if time < last.time {
                return Err(Error::EventLog(format!(
                    "{} at {} from rule '{}' precedes last event at {}",
                    kind, time, rule, last.time
                )));
            }
        }

        self.events.push(Event {
            time,
            kind,
            rule: rule.to_string(),
            fatal,
        });
        Ok(&self.events[self.events.len() - 1])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }
}
