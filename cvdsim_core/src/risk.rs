//! Bucketing and risk conversion primitives.
//!
//! Every table lookup goes through [`Bucket::index`] and every long-horizon
//! risk becomes a per-step probability through [`convert_risk_to_timestep`].

use crate::{Error, Result};

/// Days in the reference window of a 10-year Framingham risk
pub const TEN_YEARS_DAYS: f64 = 3650.0;
/// Days in the reference window of an annual risk
pub const ONE_YEAR_DAYS: f64 = 365.0;
/// Length of one simulation step
pub const STEP_DAYS: f64 = 1.0;

/// Clamp-and-bucket mapping from a measurement to a table index
///
/// `index = clamp(floor((value - base) / width) + offset, 0, max)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bucket {
    pub base: f64,
    pub width: f64,
    pub offset: i64,
    pub max: usize,
}

impl Bucket {
    pub const fn new(base: f64, width: f64, offset: i64, max: usize) -> Self {
        Self {
            base,
            width,
            offset,
            max,
        }
    }

    /// Table index for `value`, always within `0..=max`
    pub fn index(&self, value: f64) -> usize {
        let raw = ((value - self.base) / self.width).floor();
        // NaN and infinities collapse to the nearest bound
        let raw = if raw.is_nan() { 0.0 } else { raw };
        let shifted = raw + self.offset as f64;
        shifted.clamp(0.0, self.max as f64) as usize
    }
}

/// Framingham bracket layouts
pub mod buckets {
    use super::Bucket;

    /// 20-24, 25-29, ... 75-79
    pub const AGE_FIVE_YEAR: Bucket = Bucket::new(20.0, 5.0, 0, 11);
    /// 20-29, 30-39, ... 70-79
    pub const AGE_TEN_YEAR: Bucket = Bucket::new(20.0, 10.0, 0, 5);
    /// <160, 160-199, 200-239, 240-279, >=280
    pub const TOTAL_CHOLESTEROL: Bucket = Bucket::new(160.0, 40.0, 1, 4);
    /// <40, 40-49, 50-59, >=60
    pub const HDL: Bucket = Bucket::new(40.0, 10.0, 1, 3);
    /// <120, 120-129, ... 150-159, >=160
    pub const SYSTOLIC: Bucket = Bucket::new(120.0, 10.0, 1, 5);
}

/// Convert a cumulative risk over `reference_days` into the probability of
/// the event within `step_days`, assuming a constant hazard.
///
/// `1 - (1 - p)^(step / reference)`, evaluated in log space so that tiny
/// and near-certain risks keep their precision.
pub fn convert_risk_to_timestep(risk: f64, reference_days: f64, step_days: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&risk) {
        return Err(Error::Probability(format!(
            "cumulative risk {} over {} days",
            risk, reference_days
        )));
    }
    if !(reference_days > 0.0 && reference_days.is_finite()) {
        return Err(Error::Other(format!(
            "reference duration must be positive, got {}",
            reference_days
        )));
    }
    if !(step_days >= 0.0) {
        return Err(Error::Other(format!(
            "step duration must be non-negative, got {}",
            step_days
        )));
    }

    if risk == 0.0 || step_days == 0.0 {
        return Ok(0.0);
    }
    if risk == 1.0 {
        return Ok(1.0);
    }

    let exponent = step_days / reference_days;
    let probability = -(exponent * (-risk).ln_1p()).exp_m1();
    Ok(probability.clamp(0.0, 1.0))
}

/// Per-day probability from a 10-year risk
pub fn daily_from_ten_year(risk: f64) -> Result<f64> {
    convert_risk_to_timestep(risk, TEN_YEARS_DAYS, STEP_DAYS)
}

/// Per-day probability from an annual risk
pub fn daily_from_annual(risk: f64) -> Result<f64> {
    convert_risk_to_timestep(risk, ONE_YEAR_DAYS, STEP_DAYS)
}
