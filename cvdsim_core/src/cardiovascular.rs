//! Cardiovascular disease module: smoking, CHD and stroke.
//!
//! Seven rules, registered in this order:
//!
//! | rule                           | reads                                | writes                     |
//! |--------------------------------|--------------------------------------|----------------------------|
//! | `start_smoking`                | age                                  | smoker                     |
//! | `calculate_cardio_risk`        | cholesterol, age, gender, bp, smoker | cardio_risk                |
//! | `coronary_heart_disease_onset` | cardio_risk                          | coronary_heart_disease     |
//! | `coronary_heart_disease`       | coronary_heart_disease, gender       | is_alive                   |
//! | `no_coronary_heart_disease`    | coronary_heart_disease               | is_alive                   |
//! | `calculate_stroke_risk`        | age, gender, bp, comorbidities, chd  | stroke_risk, stroke_points |
//! | `get_stroke`                   | stroke_risk, stroke_history          | stroke_history, is_alive   |
//!
//! Stroke scoring does not read `stroke_history`, otherwise it would form a
//! cycle with `get_stroke`.

use crate::collaborators::CareCollaborators;
use crate::config::Config;
use crate::risk::{daily_from_annual, daily_from_ten_year};
use crate::rules::{Rule, RuleContext, RuleSet, RuleSpec, Schedule};
use crate::scoring::{self, CoronaryFactors, StrokeAssessment, StrokeFactors};
use crate::tables::{framingham_tables, RiskTables};
use crate::{Attribute, Condition, Entity, Error, EventKind, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Rule names, usable as `Input::After` targets by other modules
pub mod rule_names {
    pub const START_SMOKING: &str = "start_smoking";
    pub const CALCULATE_CARDIO_RISK: &str = "calculate_cardio_risk";
    pub const CORONARY_HEART_DISEASE_ONSET: &str = "coronary_heart_disease_onset";
    pub const CORONARY_HEART_DISEASE: &str = "coronary_heart_disease";
    pub const NO_CORONARY_HEART_DISEASE: &str = "no_coronary_heart_disease";
    pub const CALCULATE_STROKE_RISK: &str = "calculate_stroke_risk";
    pub const GET_STROKE: &str = "get_stroke";
}

/// Age at which smoking status is decided
pub const SMOKING_ONSET_AGE: u32 = 16;

/// Survival multiplier when a bystander is present
pub const BYSTANDER_MULTIPLIER: f64 = 3.0;

/// Offset of the emergency encounter after a stroke
pub const STROKE_ENCOUNTER_DELAY_MINUTES: i64 = 10;
/// Offset of the requested emergency visit after a stroke
pub const STROKE_VISIT_DELAY_MINUTES: i64 = 15;

/// Parameters and tables shared by every rule of the module
#[derive(Clone, Debug)]
pub struct CardioModel {
    pub config: Config,
    pub tables: RiskTables,
}

impl CardioModel {
    /// Validate both inputs up front so no rule sees a bad parameter
    pub fn new(config: Config, tables: RiskTables) -> Result<Self> {
        config.validate()?;
        let tables = tables.validated()?;
        Ok(Self { config, tables })
    }

    /// Model over the built-in Framingham tables
    pub fn with_framingham(config: Config) -> Result<Self> {
        Self::new(config, framingham_tables().clone())
    }
}

type RuleBody = fn(&CardioModel, &mut RuleContext<'_>) -> Result<()>;

struct CardioRule {
    spec: RuleSpec,
    model: Arc<CardioModel>,
    body: RuleBody,
}

impl Rule for CardioRule {
    fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    fn apply(&self, ctx: &mut RuleContext<'_>) -> Result<()> {
        (self.body)(&self.model, ctx)
    }
}

/// Add the module's rules to `rules`
pub fn register(rules: &mut RuleSet, model: Arc<CardioModel>) {
    use rule_names::*;
    use Attribute::*;

    let table: [(RuleSpec, RuleBody); 7] = [
        (
            RuleSpec::new(START_SMOKING).reads(&[Age]).writes(&[Smoker]),
            start_smoking,
        ),
        (
            RuleSpec::new(CALCULATE_CARDIO_RISK)
                .reads(&[Cholesterol, Age, Gender, BloodPressure, BpTreated, Smoker])
                .writes(&[CardioRisk]),
            calculate_cardio_risk,
        ),
        (
            RuleSpec::new(CORONARY_HEART_DISEASE_ONSET)
                .reads(&[CardioRisk])
                .writes(&[CoronaryHeartDisease]),
            coronary_heart_disease_onset,
        ),
        (
            RuleSpec::new(CORONARY_HEART_DISEASE)
                .reads(&[CoronaryHeartDisease, Gender])
                .writes(&[IsAlive]),
            coronary_heart_disease,
        ),
        (
            RuleSpec::new(NO_CORONARY_HEART_DISEASE)
                .reads(&[CoronaryHeartDisease])
                .writes(&[IsAlive]),
            no_coronary_heart_disease,
        ),
        (
            RuleSpec::new(CALCULATE_STROKE_RISK)
                .reads(&[
                    Age,
                    Gender,
                    BloodPressure,
                    BpTreated,
                    Smoker,
                    Diabetes,
                    LeftVentricularHypertrophy,
                    AtrialFibrillation,
                    CoronaryHeartDisease,
                ])
                .writes(&[StrokeRisk, StrokePoints]),
            calculate_stroke_risk,
        ),
        (
            RuleSpec::new(GET_STROKE)
                .reads(&[StrokeRisk, StrokeHistory])
                .writes(&[StrokeHistory, IsAlive]),
            get_stroke,
        ),
    ];

    for (spec, body) in table {
        rules.add(CardioRule {
            spec,
            model: Arc::clone(&model),
            body,
        });
    }
}

/// Schedule containing only this module's rules
pub fn schedule(model: Arc<CardioModel>) -> Result<Schedule> {
    let mut rules = RuleSet::new();
    register(&mut rules, model);
    rules.build()
}

/// Routine-encounter hook: put a known but unrecorded CHD diagnosis on the
/// clinical record. Returns whether anything was recorded.
pub fn perform_encounter(
    entity: &mut Entity,
    time: DateTime<Utc>,
    collaborators: &mut dyn CareCollaborators,
) -> Result<bool> {
    if !entity.is_alive() || !entity.has_coronary_heart_disease() {
        return Ok(false);
    }
    if entity.has_recorded(Condition::CoronaryHeartDisease) {
        return Ok(false);
    }
    collaborators.record_condition(&*entity, Condition::CoronaryHeartDisease, time)?;
    entity.mark_recorded(Condition::CoronaryHeartDisease);
    debug!(entity = %entity.id, "CHD recorded at routine encounter");
    Ok(true)
}

/// Survival probability after a cardiac event
pub fn survival_rate(base: f64, bystander_present: bool) -> f64 {
    let rate = if bystander_present {
        base * BYSTANDER_MULTIPLIER
    } else {
        base
    };
    rate.clamp(0.0, 1.0)
}

// ============================================================================
// Smoking and CHD
// ============================================================================

fn start_smoking(model: &CardioModel, ctx: &mut RuleContext<'_>) -> Result<()> {
    if ctx.entity.smoker().is_some() || ctx.entity.age() != Some(SMOKING_ONSET_AGE) {
        return Ok(());
    }
    let smoker = ctx.chance(model.config.smoking.initiation_probability)?;
    ctx.entity.set_smoker(smoker)?;
    debug!(entity = %ctx.entity.id, smoker, "smoking status decided");
    Ok(())
}

fn calculate_cardio_risk(model: &CardioModel, ctx: &mut RuleContext<'_>) -> Result<()> {
    let Some(factors) = CoronaryFactors::from_entity(ctx.entity) else {
        return Ok(());
    };
    let (points, ten_year) = scoring::coronary_ten_year_risk(&model.tables, &factors)?;
    ctx.entity.set_cardio_risk(daily_from_ten_year(ten_year)?)?;
    debug!(entity = %ctx.entity.id, points, ten_year, "cardio risk");
    Ok(())
}

fn coronary_heart_disease_onset(_model: &CardioModel, ctx: &mut RuleContext<'_>) -> Result<()> {
    if ctx.entity.has_coronary_heart_disease() {
        return Ok(());
    }
    let Some(risk) = ctx.entity.cardio_risk() else {
        return Ok(());
    };

    if ctx.chance(risk)? {
        ctx.entity.set_coronary_heart_disease(true)?;
        ctx.record(EventKind::Diagnosis(Condition::CoronaryHeartDisease), false)?;
    } else {
        ctx.entity.set_coronary_heart_disease(false)?;
    }
    Ok(())
}

fn coronary_heart_disease(model: &CardioModel, ctx: &mut RuleContext<'_>) -> Result<()> {
    if !ctx.entity.has_coronary_heart_disease() {
        return Ok(());
    }
    let Some(gender) = ctx.entity.gender() else {
        return Ok(());
    };

    let chd = &model.config.chd;
    let daily = daily_from_annual(gender.pick(chd.coronary_attack_risk))?;
    if !ctx.chance(daily)? {
        return Ok(());
    }

    let kind = if ctx.chance(chd.mi_proportion)? {
        EventKind::MyocardialInfarction
    } else {
        EventKind::CardiacArrest
    };
    cardiac_emergency(ctx, kind, chd.survive, chd.bystander)
}

fn no_coronary_heart_disease(model: &CardioModel, ctx: &mut RuleContext<'_>) -> Result<()> {
    if ctx.entity.has_coronary_heart_disease() {
        return Ok(());
    }

    let arrest = &model.config.sudden_cardiac_arrest;
    if !ctx.chance(daily_from_annual(arrest.risk)?)? {
        return Ok(());
    }
    cardiac_emergency(
        ctx,
        EventKind::CardiacArrest,
        1.0 - arrest.death,
        model.config.chd.bystander,
    )
}

/// Event, emergency encounter, visit request, then the survival draw
fn cardiac_emergency(
    ctx: &mut RuleContext<'_>,
    kind: EventKind,
    base_survival: f64,
    bystander: f64,
) -> Result<()> {
    let time = ctx.time;
    ctx.record(kind, false)?;
    ctx.record(EventKind::EmergencyEncounter, false)?;
    ctx.request_emergency_visit(time)?;

    let bystander_present = ctx.chance(bystander)?;
    let survival = survival_rate(base_survival, bystander_present);
    if ctx.chance(survival)? {
        debug!(entity = %ctx.entity.id, %kind, bystander_present, "survived");
    } else {
        ctx.record(EventKind::Death, true)?;
    }
    Ok(())
}

// ============================================================================
// Stroke
// ============================================================================

fn calculate_stroke_risk(model: &CardioModel, ctx: &mut RuleContext<'_>) -> Result<()> {
    let Some(factors) = StrokeFactors::from_entity(ctx.entity) else {
        return Ok(());
    };

    match scoring::assess_stroke(&model.tables, &model.config.stroke, &factors)? {
        StrokeAssessment::NotAssessed => {}
        StrokeAssessment::BaseRate { ten_year_risk } => {
            ctx.entity.set_stroke_risk(daily_from_ten_year(ten_year_risk)?)?;
        }
        StrokeAssessment::Scored {
            points,
            ten_year_risk,
        } => {
            ctx.entity.set_stroke_points(points);
            ctx.entity.set_stroke_risk(daily_from_ten_year(ten_year_risk)?)?;
            debug!(entity = %ctx.entity.id, points, ten_year_risk, "stroke score");
        }
    }
    Ok(())
}

fn get_stroke(model: &CardioModel, ctx: &mut RuleContext<'_>) -> Result<()> {
    let Some(risk) = ctx.entity.stroke_risk() else {
        return Ok(());
    };
    if !ctx.chance(risk)? {
        return Ok(());
    }

    let time = ctx.time;
    let encounter = time
        .checked_add_signed(Duration::minutes(STROKE_ENCOUNTER_DELAY_MINUTES))
        .ok_or_else(|| Error::Other(format!("stroke encounter time overflows after {}", time)))?;
    let visit = time
        .checked_add_signed(Duration::minutes(STROKE_VISIT_DELAY_MINUTES))
        .ok_or_else(|| Error::Other(format!("stroke visit time overflows after {}", time)))?;

    ctx.entity.mark_stroke_history();
    ctx.record(EventKind::Stroke, false)?;
    ctx.record_at(encounter, EventKind::EmergencyEncounter, false)?;
    ctx.request_emergency_visit(visit)?;

    // Death is stamped at the encounter so it stays the last event in the log
    if ctx.chance(model.config.stroke.death)? {
        ctx.record_at(encounter, EventKind::Death, true)?;
    }
    Ok(())
}
