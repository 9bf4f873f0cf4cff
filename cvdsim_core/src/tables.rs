//! Framingham point tables for coronary heart disease and stroke.
//!
//! Tables are immutable once built. [`RiskTables::validate`] proves that
//! every index the scoring code can reach has a populated entry, so a lookup
//! failure at run time means the tables were built or loaded wrong.
//!
//! Sources:
//! - CHD: NHLBI ATP III 10-year risk desk reference (Framingham point scores)
//! - Stroke: Framingham Heart Study stroke risk profile

use crate::{Error, Gender, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Cached default tables, built and validated once
static FRAMINGHAM: Lazy<RiskTables> = Lazy::new(RiskTables::framingham);

/// Get a reference to the built-in Framingham tables
pub fn framingham_tables() -> &'static RiskTables {
    &FRAMINGHAM
}

// ============================================================================
// Table Primitives
// ============================================================================

/// Dense map from an integer point score to a 10-year risk
///
/// `risks[i]` is the risk for score `first_key + i`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PointRiskTable {
    pub first_key: i32,
    pub risks: Vec<f64>,
}

impl PointRiskTable {
    pub fn new(first_key: i32, risks: Vec<f64>) -> Self {
        Self { first_key, risks }
    }

    /// Highest populated score; below `first_key` when the table is empty
    pub fn last_key(&self) -> i64 {
        i64::from(self.first_key) + self.risks.len() as i64 - 1
    }

    pub fn covers(&self, points: i32) -> bool {
        points >= self.first_key && i64::from(points) <= self.last_key()
    }

    /// Exact lookup; a score without an entry is a domain error
    pub fn lookup(&self, points: i32) -> Result<f64> {
        if !self.covers(points) {
            return Err(Error::TableDomain(format!(
                "score {} outside populated keys {}..={}",
                points,
                self.first_key,
                self.last_key()
            )));
        }
        Ok(self.risks[(i64::from(points) - i64::from(self.first_key)) as usize])
    }

    /// Repeat the top entry up to `max_key` so it stands for "that score or more"
    pub fn saturate_to(mut self, max_key: i64) -> Self {
        if let Some(&top) = self.risks.last() {
            while self.last_key() < max_key {
                self.risks.push(top);
            }
        }
        self
    }
}

/// Ordered inclusive ranges; a value scores the position of the first range
/// containing it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RangeTable {
    pub ranges: Vec<RangeInclusive<u32>>,
}

impl RangeTable {
    pub fn new(ranges: Vec<RangeInclusive<u32>>) -> Self {
        Self { ranges }
    }

    /// Highest score this table can produce
    pub fn max_points(&self) -> u32 {
        u32::try_from(self.ranges.len().saturating_sub(1)).unwrap_or(u32::MAX)
    }

    /// Points for `value`, rounded to the nearest whole unit and clamped into
    /// the span the table covers.
    pub fn points(&self, value: f64) -> Result<u32> {
        let (first, last) = match (self.ranges.first(), self.ranges.last()) {
            (Some(first), Some(last)) => (*first.start(), *last.end()),
            _ => return Err(Error::TableDomain("empty range table".into())),
        };

        let rounded = if value.is_nan() { first as f64 } else { value.round() };
        let clamped = rounded.clamp(first as f64, last as f64) as u32;

        self.ranges
            .iter()
            .position(|range| range.contains(&clamped))
            .map(|idx| idx as u32)
            .ok_or_else(|| {
                Error::TableDomain(format!("value {} falls in a gap between ranges", value))
            })
    }

    fn validate(&self, name: &str, errors: &mut Vec<String>) {
        if self.ranges.is_empty() {
            errors.push(format!("{}: no ranges", name));
            return;
        }
        for (i, range) in self.ranges.iter().enumerate() {
            if range.start() > range.end() {
                errors.push(format!("{}: range {} is inverted ({:?})", name, i, range));
            }
        }
        for (i, pair) in self.ranges.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.start() < prev.start() {
                errors.push(format!("{}: range {} starts before range {}", name, i + 1, i));
            } else if *next.start() > prev.end().saturating_add(1) {
                errors.push(format!(
                    "{}: gap between {:?} and {:?}",
                    name, prev, next
                ));
            }
        }
    }
}

// ============================================================================
// Coronary Heart Disease
// ============================================================================

/// Per-gender CHD point tables
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CoronaryTable {
    /// By 5-year age bracket, 20-24 .. 75-79
    pub age_points: [i32; 12],
    /// By 10-year age bracket, then total-cholesterol bracket
    pub cholesterol_points: [[i32; 5]; 6],
    /// By 10-year age bracket, only for smokers
    pub smoking_points: [i32; 6],
    /// <40, 40-49, 50-59, >=60
    pub hdl_points: [i32; 4],
    /// By systolic bracket: `[untreated, treated]`
    pub systolic_points: [[i32; 2]; 6],
    /// Summed points are clipped into `low..=high` before the risk lookup
    pub low: i32,
    pub high: i32,
    pub risk: PointRiskTable,
}

impl CoronaryTable {
    pub fn clip(&self, points: i32) -> i32 {
        points.clamp(self.low, self.high)
    }

    fn validate(&self, name: &str, errors: &mut Vec<String>) {
        if self.low > self.high {
            errors.push(format!("{}: point bounds {}..={} inverted", name, self.low, self.high));
            return;
        }
        if !self.risk.covers(self.low) || !self.risk.covers(self.high) {
            errors.push(format!(
                "{}: risk keys {}..={} do not cover clipped scores {}..={}",
                name,
                self.risk.first_key,
                self.risk.last_key(),
                self.low,
                self.high
            ));
        }
        validate_risks(name, &self.risk, errors);
    }
}

// ============================================================================
// Stroke
// ============================================================================

/// Per-gender stroke point tables (used from age 55)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StrokeTable {
    pub age: RangeTable,
    pub untreated_systolic: RangeTable,
    pub treated_systolic: RangeTable,
    pub smoker_points: u32,
    pub lvh_points: u32,
    pub diabetes_points: u32,
    pub chd_points: u32,
    pub atrial_fibrillation_points: u32,
    pub risk: PointRiskTable,
}

impl StrokeTable {
    /// Largest score reachable by summing every contribution, `None` if the
    /// sum does not fit in a `u32`
    pub fn max_score(&self) -> Option<u32> {
        let systolic = self
            .untreated_systolic
            .max_points()
            .max(self.treated_systolic.max_points());
        [
            self.lvh_points,
            self.age.max_points(),
            systolic,
            self.diabetes_points,
            self.chd_points,
            self.atrial_fibrillation_points,
        ]
        .into_iter()
        .try_fold(self.smoker_points, u32::checked_add)
    }

    fn validate(&self, name: &str, errors: &mut Vec<String>) {
        self.age.validate(&format!("{} age", name), errors);
        self.untreated_systolic
            .validate(&format!("{} untreated systolic", name), errors);
        self.treated_systolic
            .validate(&format!("{} treated systolic", name), errors);

        let Some(max) = self.max_score() else {
            errors.push(format!("{}: point contributions overflow the score range", name));
            return;
        };
        if !self.risk.covers(0) || self.risk.last_key() < i64::from(max) {
            errors.push(format!(
                "{}: risk keys {}..={} do not cover reachable scores 0..={}",
                name,
                self.risk.first_key,
                self.risk.last_key(),
                max
            ));
        }
        validate_risks(name, &self.risk, errors);
    }
}

fn validate_risks(name: &str, table: &PointRiskTable, errors: &mut Vec<String>) {
    if table.risks.is_empty() {
        errors.push(format!("{}: empty risk table", name));
    }
    for (i, risk) in table.risks.iter().enumerate() {
        if !(0.0..=1.0).contains(risk) {
            errors.push(format!(
                "{}: risk for score {} is {}",
                name,
                i64::from(table.first_key) + i as i64,
                risk
            ));
        }
    }
}

// ============================================================================
// Table Set
// ============================================================================

/// All scoring tables, indexed by gender
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RiskTables {
    pub coronary: [CoronaryTable; 2],
    pub stroke: [StrokeTable; 2],
}

impl RiskTables {
    pub fn coronary(&self, gender: Gender) -> &CoronaryTable {
        &self.coronary[gender.index()]
    }

    pub fn stroke(&self, gender: Gender) -> &StrokeTable {
        &self.stroke[gender.index()]
    }

    /// Check index-domain coverage and risk ranges; returns every problem found
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for gender in [Gender::M, Gender::F] {
            self.coronary(gender)
                .validate(&format!("coronary[{:?}]", gender), &mut errors);
            self.stroke(gender)
                .validate(&format!("stroke[{:?}]", gender), &mut errors);
        }
        errors
    }

    /// Validate and turn problems into a single configuration error
    pub fn validated(self) -> Result<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(Error::TableDomain(errors.join("; ")))
        }
    }

    /// Load replacement tables from JSON, rejecting incomplete ones
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let tables: RiskTables = serde_json::from_str(&contents)?;
        let tables = tables.validated()?;
        tracing::info!("Loaded risk tables from {:?}", path);
        Ok(tables)
    }

    /// The published Framingham tables
    pub fn framingham() -> Self {
        let coronary_m = CoronaryTable {
            age_points: [-9, -9, -9, -4, 0, 3, 6, 8, 10, 11, 12, 13],
            cholesterol_points: [
                [0, 4, 7, 9, 11],
                [0, 4, 7, 9, 11],
                [0, 3, 5, 6, 8],
                [0, 2, 3, 4, 5],
                [0, 1, 1, 2, 3],
                [0, 0, 0, 1, 1],
            ],
            smoking_points: [8, 8, 5, 3, 1, 1],
            hdl_points: [2, 1, 0, -1],
            systolic_points: [[0, 0], [0, 1], [1, 2], [1, 2], [1, 2], [2, 3]],
            low: 0,
            high: 17,
            // -1 stands for every score below zero, 17 for every score above 16
            risk: PointRiskTable::new(
                -1,
                vec![
                    0.005, 0.01, 0.01, 0.01, 0.01, 0.01, 0.02, 0.02, 0.03, 0.04, 0.05, 0.06,
                    0.08, 0.1, 0.12, 0.16, 0.20, 0.25, 0.3,
                ],
            ),
        };

        let coronary_f = CoronaryTable {
            age_points: [-7, -7, -7, -3, 0, 3, 6, 8, 10, 12, 14, 16],
            cholesterol_points: [
                [0, 4, 8, 11, 13],
                [0, 4, 8, 11, 13],
                [0, 3, 6, 8, 10],
                [0, 2, 4, 5, 7],
                [0, 1, 2, 3, 4],
                [0, 1, 1, 2, 2],
            ],
            smoking_points: [9, 9, 7, 4, 2, 1],
            hdl_points: [2, 1, 0, -1],
            systolic_points: [[0, 0], [1, 3], [2, 4], [3, 5], [3, 5], [4, 6]],
            low: 8,
            high: 25,
            // 8 stands for every score below 9, 25 for every score above 24
            risk: PointRiskTable::new(
                8,
                vec![
                    0.005, 0.01, 0.01, 0.01, 0.01, 0.02, 0.02, 0.03, 0.04, 0.05, 0.06, 0.08,
                    0.11, 0.14, 0.17, 0.22, 0.27, 0.3,
                ],
            ),
        };

        let stroke_m = StrokeTable {
            age: RangeTable::new(vec![
                54..=56,
                57..=59,
                60..=62,
                63..=65,
                66..=68,
                69..=72,
                73..=75,
                76..=78,
                79..=81,
                82..=84,
                85..=999,
            ]),
            untreated_systolic: RangeTable::new(vec![
                0..=105,
                106..=115,
                116..=125,
                126..=135,
                136..=145,
                146..=155,
                156..=165,
                166..=175,
                176..=185,
                185..=195,
                196..=205,
            ]),
            treated_systolic: RangeTable::new(vec![
                0..=105,
                106..=112,
                113..=117,
                118..=123,
                124..=129,
                130..=135,
                136..=142,
                143..=150,
                151..=161,
                162..=176,
                177..=205,
            ]),
            smoker_points: 3,
            lvh_points: 5,
            diabetes_points: 2,
            chd_points: 4,
            atrial_fibrillation_points: 4,
            risk: PointRiskTable::new(
                0,
                vec![
                    0.0, 0.03, 0.03, 0.04, 0.04, 0.05, 0.05, 0.06, 0.07, 0.08, 0.1, 0.11, 0.13,
                    0.15, 0.17, 0.2, 0.22, 0.26, 0.29, 0.33, 0.37, 0.42, 0.47, 0.52, 0.57,
                    0.63, 0.68, 0.74, 0.79, 0.84, 0.88,
                ],
            ),
        };

        let stroke_f = StrokeTable {
            age: RangeTable::new(vec![
                54..=56,
                57..=59,
                60..=62,
                63..=64,
                65..=67,
                68..=70,
                71..=73,
                74..=76,
                77..=78,
                79..=81,
                82..=999,
            ]),
            untreated_systolic: RangeTable::new(vec![
                0..=95,
                95..=106,
                107..=118,
                119..=130,
                131..=143,
                144..=155,
                156..=167,
                168..=180,
                181..=192,
                193..=204,
                205..=216,
            ]),
            treated_systolic: RangeTable::new(vec![
                0..=95,
                95..=106,
                107..=113,
                114..=119,
                120..=125,
                126..=131,
                132..=139,
                140..=148,
                149..=160,
                161..=204,
                205..=216,
            ]),
            smoker_points: 3,
            lvh_points: 5,
            diabetes_points: 3,
            chd_points: 2,
            atrial_fibrillation_points: 6,
            risk: PointRiskTable::new(
                0,
                vec![
                    0.0, 0.01, 0.01, 0.02, 0.02, 0.02, 0.03, 0.04, 0.04, 0.05, 0.06, 0.08,
                    0.09, 0.11, 0.13, 0.16, 0.19, 0.23, 0.27, 0.32, 0.37, 0.43, 0.5, 0.57,
                    0.64, 0.71, 0.78, 0.84,
                ],
            ),
        };

        // Published stroke tables stop short of the highest reachable sums
        let stroke_m = StrokeTable {
            risk: stroke_m.risk.clone().saturate_to(i64::from(stroke_m.max_score().unwrap_or(0))),
            ..stroke_m
        };
        let stroke_f = StrokeTable {
            risk: stroke_f.risk.clone().saturate_to(i64::from(stroke_f.max_score().unwrap_or(0))),
            ..stroke_f
        };

        RiskTables {
            coronary: [coronary_m, coronary_f],
            stroke: [stroke_m, stroke_f],
        }
    }
}
