//! Core domain types for the cardiovascular simulation.
//!
//! This module defines the value types shared by the rules and the
//! collaborators:
//! - Risk-factor measurements (gender, cholesterol, blood pressure)
//! - Clinical conditions and event kinds
//! - The immutable event record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Risk Factors
// ============================================================================

/// Biological sex as used by the Framingham tables
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Gender {
    M,
    F,
}

impl Gender {
    /// Column index into the gender-indexed `[male, female]` parameter pairs
    pub fn index(self) -> usize {
        match self {
            Gender::M => 0,
            Gender::F => 1,
        }
    }

    pub fn pick<T: Copy>(self, pair: [T; 2]) -> T {
        pair[self.index()]
    }
}

/// Serum cholesterol panel in mg/dL
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Cholesterol {
    pub total: f64,
    pub hdl: f64,
}

/// Blood pressure reading in mmHg
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

// ============================================================================
// Conditions and Events
// ============================================================================

/// A condition that ends up as a structured clinical-record entry
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    CoronaryHeartDisease,
    MyocardialInfarction,
    CardiacArrest,
    Stroke,
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::CoronaryHeartDisease => "coronary_heart_disease",
            Condition::MyocardialInfarction => "myocardial_infarction",
            Condition::CardiacArrest => "cardiac_arrest",
            Condition::Stroke => "stroke",
        }
    }
}

/// Type of a simulation event
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Onset of a chronic condition (CHD for this module)
    Diagnosis(Condition),
    MyocardialInfarction,
    CardiacArrest,
    Stroke,
    EmergencyEncounter,
    Death,
}

impl EventKind {
    /// The condition this event puts on the clinical record, if any
    pub fn condition(self) -> Option<Condition> {
        match self {
            EventKind::Diagnosis(condition) => Some(condition),
            EventKind::MyocardialInfarction => Some(Condition::MyocardialInfarction),
            EventKind::CardiacArrest => Some(Condition::CardiacArrest),
            EventKind::Stroke => Some(Condition::Stroke),
            EventKind::EmergencyEncounter | EventKind::Death => None,
        }
    }

    /// Stable label used in traces and rollups
    pub fn label(self) -> &'static str {
        match self {
            EventKind::Diagnosis(_) => "diagnosis",
            EventKind::MyocardialInfarction => "myocardial_infarction",
            EventKind::CardiacArrest => "cardiac_arrest",
            EventKind::Stroke => "stroke",
            EventKind::EmergencyEncounter => "emergency_encounter",
            EventKind::Death => "death",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Diagnosis(condition) => write!(f, "diagnosis({})", condition.as_str()),
            other => f.write_str(other.label()),
        }
    }
}

/// An immutable, causally-linked simulation event
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub time: DateTime<Utc>,
    pub kind: EventKind,
    /// Name of the rule whose body emitted the event
    pub rule: String,
    pub fatal: bool,
}
