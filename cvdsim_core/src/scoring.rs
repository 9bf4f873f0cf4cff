//! Framingham point scoring for coronary heart disease and stroke.

use crate::risk::buckets;
use crate::tables::{CoronaryTable, RiskTables};
use crate::config::StrokeConfig;
use crate::{Entity, Gender, Result};

/// Inputs to the CHD score, read from an entity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoronaryFactors {
    pub age: u32,
    pub gender: Gender,
    pub total_cholesterol: f64,
    pub hdl: f64,
    pub systolic: f64,
    pub bp_treated: bool,
    pub smoker: bool,
}

impl CoronaryFactors {
    /// `None` when age, gender, cholesterol or blood pressure is missing
    pub fn from_entity(entity: &Entity) -> Option<Self> {
        let cholesterol = entity.cholesterol?;
        let blood_pressure = entity.blood_pressure?;
        Some(Self {
            age: entity.age()?,
            gender: entity.gender()?,
            total_cholesterol: cholesterol.total,
            hdl: cholesterol.hdl,
            systolic: blood_pressure.systolic,
            bp_treated: entity.bp_treated(),
            smoker: entity.smoker() == Some(true),
        })
    }
}

/// Raw (unclipped) CHD point sum
pub fn coronary_points(table: &CoronaryTable, factors: &CoronaryFactors) -> i32 {
    let age = factors.age as f64;
    let short_age = buckets::AGE_FIVE_YEAR.index(age);
    let long_age = buckets::AGE_TEN_YEAR.index(age);
    let chol = buckets::TOTAL_CHOLESTEROL.index(factors.total_cholesterol);
    let hdl = buckets::HDL.index(factors.hdl);
    let bp = buckets::SYSTOLIC.index(factors.systolic);

    let mut points = table.age_points[short_age];
    points += table.cholesterol_points[long_age][chol];
    if factors.smoker {
        points += table.smoking_points[long_age];
    }
    points += table.hdl_points[hdl];
    points += table.systolic_points[bp][factors.bp_treated as usize];
    points
}

/// Clipped CHD score and its 10-year risk
pub fn coronary_ten_year_risk(tables: &RiskTables, factors: &CoronaryFactors) -> Result<(i32, f64)> {
    let table = tables.coronary(factors.gender);
    let points = table.clip(coronary_points(table, factors));
    Ok((points, table.risk.lookup(points)?))
}

/// Inputs to the stroke score, read from an entity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeFactors {
    pub age: u32,
    pub gender: Gender,
    pub systolic: f64,
    pub bp_treated: bool,
    pub smoker: bool,
    pub left_ventricular_hypertrophy: bool,
    pub diabetes: bool,
    pub coronary_heart_disease: bool,
    pub atrial_fibrillation: bool,
}

impl StrokeFactors {
    /// `None` when age, gender or blood pressure is missing
    pub fn from_entity(entity: &Entity) -> Option<Self> {
        Some(Self {
            age: entity.age()?,
            gender: entity.gender()?,
            systolic: entity.blood_pressure?.systolic,
            bp_treated: entity.bp_treated(),
            smoker: entity.smoker() == Some(true),
            left_ventricular_hypertrophy: entity.left_ventricular_hypertrophy,
            diabetes: entity.diabetes,
            coronary_heart_disease: entity.has_coronary_heart_disease(),
            atrial_fibrillation: entity.atrial_fibrillation,
        })
    }
}

/// Youngest age with a stroke risk at all
pub const STROKE_MIN_AGE: u32 = 20;
/// Youngest age covered by the Framingham stroke profile
pub const STROKE_SCORED_AGE: u32 = 55;

/// Outcome of a stroke risk assessment
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StrokeAssessment {
    /// Under 20: no risk is computed this step
    NotAssessed,
    /// 20-54: population base rate for the age band
    BaseRate { ten_year_risk: f64 },
    /// 55 and over: Framingham score
    Scored { points: u32, ten_year_risk: f64 },
}

impl StrokeAssessment {
    pub fn ten_year_risk(&self) -> Option<f64> {
        match self {
            StrokeAssessment::NotAssessed => None,
            StrokeAssessment::BaseRate { ten_year_risk }
            | StrokeAssessment::Scored { ten_year_risk, .. } => Some(*ten_year_risk),
        }
    }
}

/// Framingham stroke points (only meaningful from age 55)
pub fn stroke_points(tables: &RiskTables, factors: &StrokeFactors) -> Result<u32> {
    let table = tables.stroke(factors.gender);

    let mut points = 0;
    if factors.smoker {
        points += table.smoker_points;
    }
    if factors.left_ventricular_hypertrophy {
        points += table.lvh_points;
    }
    points += table.age.points(factors.age as f64)?;
    points += if factors.bp_treated {
        table.treated_systolic.points(factors.systolic)?
    } else {
        table.untreated_systolic.points(factors.systolic)?
    };
    if factors.diabetes {
        points += table.diabetes_points;
    }
    if factors.coronary_heart_disease {
        points += table.chd_points;
    }
    if factors.atrial_fibrillation {
        points += table.atrial_fibrillation_points;
    }
    Ok(points)
}

/// Pick the base-rate band or the Framingham score by age
pub fn assess_stroke(
    tables: &RiskTables,
    config: &StrokeConfig,
    factors: &StrokeFactors,
) -> Result<StrokeAssessment> {
    let assessment = match factors.age {
        age if age < STROKE_MIN_AGE => StrokeAssessment::NotAssessed,
        age if age < 40 => StrokeAssessment::BaseRate {
            ten_year_risk: factors.gender.pick(config.rate_20_39),
        },
        age if age < STROKE_SCORED_AGE => StrokeAssessment::BaseRate {
            ten_year_risk: factors.gender.pick(config.rate_40_54),
        },
        _ => {
            let points = stroke_points(tables, factors)?;
            let ten_year_risk = tables.stroke(factors.gender).risk.lookup(points as i32)?;
            StrokeAssessment::Scored {
                points,
                ten_year_risk,
            }
        }
    };
    Ok(assessment)
}
