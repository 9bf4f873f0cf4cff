//! Entity attribute store.
//!
//! An entity is owned by the wider simulation and shared across disease
//! modules. Attributes with one-way semantics (smoking status, CHD, stroke
//! history, death) can only be changed through setters that enforce them.

use crate::{BloodPressure, Cholesterol, Condition, Error, EventLog, Gender, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Names of the entity attributes rules can declare as inputs or outputs
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Age,
    Gender,
    Cholesterol,
    BloodPressure,
    BpTreated,
    Smoker,
    Diabetes,
    LeftVentricularHypertrophy,
    AtrialFibrillation,
    CoronaryHeartDisease,
    CardioRisk,
    StrokeRisk,
    StrokePoints,
    StrokeHistory,
    IsAlive,
}

impl Attribute {
    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::Age => "age",
            Attribute::Gender => "gender",
            Attribute::Cholesterol => "cholesterol",
            Attribute::BloodPressure => "blood_pressure",
            Attribute::BpTreated => "bp_treated",
            Attribute::Smoker => "smoker",
            Attribute::Diabetes => "diabetes",
            Attribute::LeftVentricularHypertrophy => "left_ventricular_hypertrophy",
            Attribute::AtrialFibrillation => "atrial_fibrillation",
            Attribute::CoronaryHeartDisease => "coronary_heart_disease",
            Attribute::CardioRisk => "cardio_risk",
            Attribute::StrokeRisk => "stroke_risk",
            Attribute::StrokePoints => "stroke_points",
            Attribute::StrokeHistory => "stroke_history",
            Attribute::IsAlive => "is_alive",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_alive() -> bool {
    true
}

/// A synthetic individual
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(default)]
    age: Option<u32>,
    #[serde(default)]
    gender: Option<Gender>,
    #[serde(default)]
    pub cholesterol: Option<Cholesterol>,
    #[serde(default)]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(default)]
    pub bp_treated: Option<bool>,
    #[serde(default)]
    smoker: Option<bool>,

    // Owned by other modules
    #[serde(default)]
    pub diabetes: bool,
    #[serde(default)]
    pub left_ventricular_hypertrophy: bool,
    #[serde(default)]
    pub atrial_fibrillation: bool,

    #[serde(default)]
    coronary_heart_disease: Option<bool>,
    #[serde(default)]
    cardio_risk: Option<f64>,
    #[serde(default)]
    stroke_risk: Option<f64>,
    #[serde(default)]
    stroke_points: Option<u32>,
    #[serde(default)]
    stroke_history: bool,
    #[serde(default = "default_alive")]
    is_alive: bool,

    #[serde(default)]
    events: EventLog,
    #[serde(default)]
    recorded_conditions: BTreeSet<Condition>,
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity {
    /// A living entity with every attribute unset
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            age: None,
            gender: None,
            cholesterol: None,
            blood_pressure: None,
            bp_treated: None,
            smoker: None,
            diabetes: false,
            left_ventricular_hypertrophy: false,
            atrial_fibrillation: false,
            coronary_heart_disease: None,
            cardio_risk: None,
            stroke_risk: None,
            stroke_points: None,
            stroke_history: false,
            is_alive: true,
            events: EventLog::new(),
            recorded_conditions: BTreeSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // Builder helpers for cohort setup
    // ------------------------------------------------------------------

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_cholesterol(mut self, total: f64, hdl: f64) -> Self {
        self.cholesterol = Some(Cholesterol { total, hdl });
        self
    }

    pub fn with_blood_pressure(mut self, systolic: f64, diastolic: f64) -> Self {
        self.blood_pressure = Some(BloodPressure {
            systolic,
            diastolic,
        });
        self
    }

    pub fn with_smoker(mut self, smoker: bool) -> Self {
        self.smoker = Some(smoker);
        self
    }

    pub fn with_coronary_heart_disease(mut self, chd: bool) -> Self {
        self.coronary_heart_disease = Some(chd);
        self
    }

    // ------------------------------------------------------------------
    // Demographics
    // ------------------------------------------------------------------

    pub fn age(&self) -> Option<u32> {
        self.age
    }

    /// Set age; ages never go backwards
    pub fn set_age(&mut self, age: u32) -> Result<()> {
        if let Some(current) = self.age {
            if age < current {
                return Err(Error::Attribute(format!(
                    "age of {} cannot decrease from {} to {}",
                    self.id, current, age
                )));
            }
        }
        self.age = Some(age);
        Ok(())
    }

    pub fn gender(&self) -> Option<Gender> {
        self.gender
    }

    /// Set gender; immutable once set
    pub fn set_gender(&mut self, gender: Gender) -> Result<()> {
        match self.gender {
            Some(current) if current != gender => Err(Error::Attribute(format!(
                "gender of {} is already {:?}",
                self.id, current
            ))),
            _ => {
                self.gender = Some(gender);
                Ok(())
            }
        }
    }

    pub fn bp_treated(&self) -> bool {
        self.bp_treated.unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Write-once and sticky attributes
    // ------------------------------------------------------------------

    pub fn smoker(&self) -> Option<bool> {
        self.smoker
    }

    /// Decide smoking status; a decided status is never redrawn
    pub fn set_smoker(&mut self, smoker: bool) -> Result<()> {
        match self.smoker {
            Some(current) if current != smoker => Err(Error::Attribute(format!(
                "smoking status of {} already decided ({})",
                self.id, current
            ))),
            _ => {
                self.smoker = Some(smoker);
                Ok(())
            }
        }
    }

    pub fn coronary_heart_disease(&self) -> Option<bool> {
        self.coronary_heart_disease
    }

    pub fn has_coronary_heart_disease(&self) -> bool {
        self.coronary_heart_disease == Some(true)
    }

    /// Set the CHD flag; true is permanent
    pub fn set_coronary_heart_disease(&mut self, chd: bool) -> Result<()> {
        if !chd && self.has_coronary_heart_disease() {
            return Err(Error::Attribute(format!(
                "coronary heart disease of {} cannot be reverted",
                self.id
            )));
        }
        self.coronary_heart_disease = Some(chd);
        Ok(())
    }

    pub fn stroke_history(&self) -> bool {
        self.stroke_history
    }

    pub fn mark_stroke_history(&mut self) {
        self.stroke_history = true;
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive
    }

    pub fn mark_dead(&mut self) {
        self.is_alive = false;
    }

    // ------------------------------------------------------------------
    // Per-step risks
    // ------------------------------------------------------------------

    pub fn cardio_risk(&self) -> Option<f64> {
        self.cardio_risk
    }

    pub fn set_cardio_risk(&mut self, risk: f64) -> Result<()> {
        self.cardio_risk = Some(checked_probability(Attribute::CardioRisk, risk)?);
        Ok(())
    }

    pub fn stroke_risk(&self) -> Option<f64> {
        self.stroke_risk
    }

    pub fn set_stroke_risk(&mut self, risk: f64) -> Result<()> {
        self.stroke_risk = Some(checked_probability(Attribute::StrokeRisk, risk)?);
        Ok(())
    }

    pub fn stroke_points(&self) -> Option<u32> {
        self.stroke_points
    }

    pub fn set_stroke_points(&mut self, points: u32) {
        self.stroke_points = Some(points);
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    pub fn has_recorded(&self, condition: Condition) -> bool {
        self.recorded_conditions.contains(&condition)
    }

    /// Remember that `condition` is on the clinical record.
    /// Returns false if it already was.
    pub(crate) fn mark_recorded(&mut self, condition: Condition) -> bool {
        self.recorded_conditions.insert(condition)
    }
}

fn checked_probability(attribute: Attribute, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Probability(format!("{} = {}", attribute, value)))
    }
}
