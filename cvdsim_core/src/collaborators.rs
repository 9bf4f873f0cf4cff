//! Downstream collaborators: encounter scheduling and the clinical record.
//!
//! The core only announces what happened; how visits are scheduled and how
//! records are written belongs to the caller.

use crate::{Condition, Entity, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Synchronous hooks invoked from rule bodies
pub trait CareCollaborators {
    fn request_emergency_visit(&mut self, time: DateTime<Utc>, entity: &Entity) -> Result<()>;

    /// Called at most once per condition per entity
    fn record_condition(
        &mut self,
        entity: &Entity,
        condition: Condition,
        time: DateTime<Utc>,
    ) -> Result<()>;

    fn record_death(&mut self, entity: &Entity, time: DateTime<Utc>) -> Result<()>;
}

/// Collaborators that ignore every call
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCollaborators;

impl CareCollaborators for NoCollaborators {
    fn request_emergency_visit(&mut self, _time: DateTime<Utc>, _entity: &Entity) -> Result<()> {
        Ok(())
    }

    fn record_condition(
        &mut self,
        _entity: &Entity,
        _condition: Condition,
        _time: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }

    fn record_death(&mut self, _entity: &Entity, _time: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}

/// A call made to the collaborators
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum CareRequest {
    EmergencyVisit {
        entity: Uuid,
        time: DateTime<Utc>,
    },
    Condition {
        entity: Uuid,
        condition: Condition,
        time: DateTime<Utc>,
    },
    Death {
        entity: Uuid,
        time: DateTime<Utc>,
    },
}

/// Collaborators that keep every call in memory, in order
#[derive(Clone, Debug, Default)]
pub struct CareLog {
    pub requests: Vec<CareRequest>,
}

impl CareLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emergency_visits(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| matches!(r, CareRequest::EmergencyVisit { .. }))
            .count()
    }

    pub fn conditions(&self) -> Vec<Condition> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                CareRequest::Condition { condition, .. } => Some(*condition),
                _ => None,
            })
            .collect()
    }

    pub fn deaths(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| matches!(r, CareRequest::Death { .. }))
            .count()
    }
}

impl CareCollaborators for CareLog {
    fn request_emergency_visit(&mut self, time: DateTime<Utc>, entity: &Entity) -> Result<()> {
        self.requests.push(CareRequest::EmergencyVisit {
            entity: entity.id,
            time,
        });
        Ok(())
    }

    fn record_condition(
        &mut self,
        entity: &Entity,
        condition: Condition,
        time: DateTime<Utc>,
    ) -> Result<()> {
        self.requests.push(CareRequest::Condition {
            entity: entity.id,
            condition,
            time,
        });
        Ok(())
    }

    fn record_death(&mut self, entity: &Entity, time: DateTime<Utc>) -> Result<()> {
        self.requests.push(CareRequest::Death {
            entity: entity.id,
            time,
        });
        Ok(())
    }
}
