#![forbid(unsafe_code)]

//! Core domain model and business logic for the cardiovascular disease
//! simulation.
//!
//! This crate provides:
//! - Domain types (entities, conditions, events)
//! - Framingham risk tables, scoring and risk conversion
//! - The rule engine and its dependency scheduler
//! - CHD and stroke state machines
//! - Persistence (event trace, CSV rollup, cohort snapshots)

pub mod types;
pub mod error;
pub mod entity;
pub mod events;
pub mod config;
pub mod logging;
pub mod risk;
pub mod tables;
pub mod scoring;
pub mod random;
pub mod collaborators;
pub mod rules;
pub mod cardiovascular;
pub mod simulation;
pub mod trace;
pub mod summary;
pub mod snapshot;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use entity::{Attribute, Entity};
pub use events::EventLog;
pub use config::Config;
pub use tables::{framingham_tables, RiskTables};
pub use risk::convert_risk_to_timestep;
pub use rules::{Rule, RuleContext, RuleSet, RuleSpec, Schedule};
pub use collaborators::{CareCollaborators, CareLog};
pub use cardiovascular::CardioModel;
pub use simulation::{run_cohort, RunOptions};
pub use trace::{EventSink, JsonlEventSink};
