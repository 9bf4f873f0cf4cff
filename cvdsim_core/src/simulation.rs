//! Daily simulation driver.
//!
//! Stands in for the outer clock: advances time by one day, ages entities
//! on every 365th day (with a routine encounter), and runs the schedule.
//! Cohorts run in parallel, one seeded generator per entity.

use crate::cardiovascular::perform_encounter;
use crate::collaborators::{CareCollaborators, CareLog};
use crate::random::{entity_rng, RandomSource};
use crate::rules::Schedule;
use crate::{Entity, Error, Event, Result};
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;

/// Days between birthdays and routine encounters
pub const DAYS_PER_YEAR: u32 = 365;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunOptions {
    pub start: DateTime<Utc>,
    pub days: u32,
    pub seed: u64,
}

/// Final state of one entity after a run
#[derive(Clone, Debug)]
pub struct EntityOutcome {
    pub entity: Entity,
    pub care: CareLog,
    /// Days on which the entity was alive at the start of the day
    pub days_alive: u32,
    /// Length of the entity's log before this run
    pub prior_events: usize,
}

impl EntityOutcome {
    /// Events produced by this run, excluding history the entity came in with
    pub fn new_events(&self) -> &[Event] {
        &self.entity.events().as_slice()[self.prior_events..]
    }
}

/// Run `days` days for one entity; returns the days it started alive
pub fn simulate_entity(
    schedule: &Schedule,
    entity: &mut Entity,
    start: DateTime<Utc>,
    days: u32,
    rng: &mut dyn RandomSource,
    collaborators: &mut dyn CareCollaborators,
) -> Result<u32> {
    let mut days_alive = 0;

    for day in 0..days {
        if !entity.is_alive() {
            break;
        }
        let time = start
            .checked_add_signed(Duration::days(i64::from(day)))
            .ok_or_else(|| Error::Other(format!("day {} overflows the calendar", day)))?;

        if day > 0 && day % DAYS_PER_YEAR == 0 {
            if let Some(age) = entity.age() {
                entity.set_age(age + 1)?;
            }
            perform_encounter(entity, time, collaborators)?;
        }

        schedule.run_day(entity, time, rng, collaborators)?;
        days_alive += 1;
    }

    Ok(days_alive)
}

/// Simulate every entity of `cohort` independently, in parallel
///
/// Entity `i` draws from stream `i` of the run seed, so the outcome does not
/// depend on the thread count.
pub fn run_cohort(
    schedule: &Schedule,
    cohort: Vec<Entity>,
    options: &RunOptions,
) -> Result<Vec<EntityOutcome>> {
    tracing::info!(
        entities = cohort.len(),
        days = options.days,
        seed = options.seed,
        "Starting cohort run"
    );

    let outcomes = cohort
        .into_par_iter()
        .enumerate()
        .map(|(index, mut entity)| -> Result<EntityOutcome> {
            let mut rng = entity_rng(options.seed, index as u64);
            let mut care = CareLog::new();
            let prior_events = entity.events().len();
            let days_alive = simulate_entity(
                schedule,
                &mut entity,
                options.start,
                options.days,
                &mut rng,
                &mut care,
            )?;
            Ok(EntityOutcome {
                entity,
                care,
                days_alive,
                prior_events,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let deaths = outcomes.iter().filter(|o| !o.entity.is_alive()).count();
    tracing::info!(entities = outcomes.len(), deaths, "Cohort run finished");
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardiovascular::{schedule, CardioModel};
    use crate::collaborators::NoCollaborators;
    use crate::random::ScriptedDraws;
    use crate::{Config, EventKind, Gender};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    fn risky_schedule() -> Schedule {
        let mut config = Config::default();
        config.chd.coronary_attack_risk = [0.3, 0.3];
        config.sudden_cardiac_arrest.risk = 0.05;
        config.stroke.rate_40_54 = [0.4, 0.4];
        schedule(Arc::new(CardioModel::with_framingham(config).unwrap())).unwrap()
    }

    fn cohort(n: usize) -> Vec<Entity> {
        (0..n)
            .map(|i| {
                let gender = if i % 2 == 0 { Gender::M } else { Gender::F };
                Entity::new()
                    .with_age(45 + (i as u32 % 20))
                    .with_gender(gender)
                    .with_cholesterol(210.0 + i as f64, 45.0)
                    .with_blood_pressure(135.0, 85.0)
            })
            .collect()
    }

    #[test]
    fn test_entity_ages_on_anniversaries() {
        let schedule = schedule(Arc::new(CardioModel::with_framingham(Config::default()).unwrap()))
            .unwrap();
        let mut entity = Entity::new().with_age(15);
        // Every draw fails: nobody starts smoking or dies
        let mut draws = ScriptedDraws::new([]);

        let days = simulate_entity(
            &schedule,
            &mut entity,
            start(),
            2 * DAYS_PER_YEAR + 1,
            &mut draws,
            &mut NoCollaborators,
        )
        .unwrap();

        assert_eq!(days, 2 * DAYS_PER_YEAR + 1);
        assert_eq!(entity.age(), Some(17));
        // Smoking decided on the first day at 16, never again
        assert_eq!(entity.smoker(), Some(false));
    }

    #[test]
    fn test_dead_entity_stops_early() {
        let schedule = risky_schedule();
        let mut entity = Entity::new().with_gender(Gender::M).with_coronary_heart_disease(true);
        // attack, MI, no bystander, death
        let mut draws = ScriptedDraws::new([0.0, 0.0, 0.99, 0.99]);

        let days = simulate_entity(
            &schedule,
            &mut entity,
            start(),
            30,
            &mut draws,
            &mut NoCollaborators,
        )
        .unwrap();

        assert_eq!(days, 1);
        assert!(!entity.is_alive());
        assert_eq!(entity.events().last().map(|e| e.kind), Some(EventKind::Death));
    }

    #[test]
    fn test_cohort_is_reproducible_for_a_seed() {
        let schedule = risky_schedule();
        let options = RunOptions {
            start: start(),
            days: 3 * DAYS_PER_YEAR,
            seed: 2024,
        };

        let members = cohort(16);
        let first = run_cohort(&schedule, members.clone(), &options).unwrap();
        let second = run_cohort(&schedule, members, &options).unwrap();

        assert_eq!(first.len(), 16);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.entity.id, b.entity.id);
            assert_eq!(a.entity.events(), b.entity.events());
            assert_eq!(a.days_alive, b.days_alive);
            assert_eq!(a.care.requests, b.care.requests);
        }
        assert!(first.iter().any(|o| !o.entity.events().is_empty()));
    }

    #[test]
    fn test_continued_run_reports_only_new_events() {
        let schedule = risky_schedule();
        let first_options = RunOptions {
            start: start(),
            days: DAYS_PER_YEAR,
            seed: 9,
        };
        let first = run_cohort(&schedule, cohort(12), &first_options).unwrap();
        for outcome in &first {
            assert_eq!(outcome.prior_events, 0);
            assert_eq!(outcome.new_events().len(), outcome.entity.events().len());
        }
        assert!(first.iter().any(|o| !o.new_events().is_empty()));

        let continued: Vec<Entity> = first.iter().map(|o| o.entity.clone()).collect();
        let second_options = RunOptions {
            start: start() + Duration::days(i64::from(DAYS_PER_YEAR)),
            days: 30,
            seed: 10,
        };
        let second = run_cohort(&schedule, continued, &second_options).unwrap();

        for (before, after) in first.iter().zip(&second) {
            assert_eq!(after.prior_events, before.entity.events().len());
            assert_eq!(
                after.prior_events + after.new_events().len(),
                after.entity.events().len()
            );
            assert!(after
                .new_events()
                .iter()
                .all(|e| e.time >= second_options.start));
        }
    }

    #[test]
    fn test_cohort_invariants_hold() {
        let schedule = risky_schedule();
        let options = RunOptions {
            start: start(),
            days: 2 * DAYS_PER_YEAR,
            seed: 7,
        };

        for outcome in run_cohort(&schedule, cohort(24), &options).unwrap() {
            let events = outcome.entity.events().as_slice();
            assert!(events.windows(2).all(|w| w[0].time <= w[1].time));

            let deaths = events.iter().filter(|e| e.kind == EventKind::Death).count();
            assert!(deaths <= 1);
            if deaths == 1 {
                assert!(!outcome.entity.is_alive());
                assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Death));
                assert_eq!(outcome.care.deaths(), 1);
            }

            let mut conditions = outcome.care.conditions();
            let recorded = conditions.len();
            conditions.sort();
            conditions.dedup();
            assert_eq!(conditions.len(), recorded, "condition recorded twice");
        }
    }
}
