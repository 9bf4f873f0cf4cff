//! Rule engine and dependency scheduler.
//!
//! Rules declare what they read and write. [`RuleSet::build`] turns those
//! declarations into a dependency graph once, sorts it, and returns a
//! [`Schedule`] that runs the rules for one entity and one day at a time.
//!
//! ## Ordering
//!
//! A rule runs after every rule that writes one of its attribute inputs,
//! and after any rule it names directly with [`Input::After`]. Among rules
//! that are ready at the same time, registration order wins, so a given
//! rule set always produces the same order (and the same draw sequence).

use crate::collaborators::CareCollaborators;
use crate::random::{self, RandomSource};
use crate::{Attribute, Entity, Error, EventKind, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

/// Something a rule depends on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    /// Reads an entity attribute
    Attr(Attribute),
    /// Must run after the named rule
    After(&'static str),
}

/// Declarative metadata of a rule
#[derive(Clone, Debug)]
pub struct RuleSpec {
    pub name: &'static str,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Attribute>,
}

impl RuleSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn reads(mut self, attributes: &[Attribute]) -> Self {
        self.inputs
            .extend(attributes.iter().copied().map(Input::Attr));
        self
    }

    pub fn after(mut self, rule: &'static str) -> Self {
        self.inputs.push(Input::After(rule));
        self
    }

    pub fn writes(mut self, attributes: &[Attribute]) -> Self {
        self.outputs.extend_from_slice(attributes);
        self
    }
}

/// A unit of per-day logic
pub trait Rule: Send + Sync {
    fn spec(&self) -> &RuleSpec;

    /// Run the rule body. Returning `Ok(())` without touching the entity is
    /// how a rule says its preconditions were not met.
    fn apply(&self, ctx: &mut RuleContext<'_>) -> Result<()>;
}

/// Everything a rule body may touch during one invocation
pub struct RuleContext<'a> {
    pub time: DateTime<Utc>,
    pub entity: &'a mut Entity,
    rng: &'a mut dyn RandomSource,
    collaborators: &'a mut dyn CareCollaborators,
    rule: &'static str,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        time: DateTime<Utc>,
        entity: &'a mut Entity,
        rng: &'a mut dyn RandomSource,
        collaborators: &'a mut dyn CareCollaborators,
        rule: &'static str,
    ) -> Self {
        Self {
            time,
            entity,
            rng,
            collaborators,
            rule,
        }
    }

    /// Name of the rule being executed
    pub fn rule(&self) -> &'static str {
        self.rule
    }

    /// Bernoulli trial against the injected random source
    pub fn chance(&mut self, p: f64) -> Result<bool> {
        random::chance(&mut *self.rng, p)
    }

    /// Record an event at the current step time
    pub fn record(&mut self, kind: EventKind, fatal: bool) -> Result<()> {
        self.record_at(self.time, kind, fatal)
    }

    /// Record an event, attributed to the running rule
    ///
    /// Conditions go to the clinical record the first time they appear. A
    /// death event marks the entity dead and notifies the record keeper.
    pub fn record_at(&mut self, time: DateTime<Utc>, kind: EventKind, fatal: bool) -> Result<()> {
        self.entity
            .events_mut()
            .append(time, kind, self.rule, fatal)?;
        tracing::debug!(entity = %self.entity.id, rule = self.rule, %kind, fatal, "event");

        if let Some(condition) = kind.condition() {
            if !self.entity.has_recorded(condition) {
                self.collaborators
                    .record_condition(&*self.entity, condition, time)?;
                self.entity.mark_recorded(condition);
            }
        }

        if kind == EventKind::Death {
            self.entity.mark_dead();
            self.collaborators.record_death(&*self.entity, time)?;
        }
        Ok(())
    }

    pub fn request_emergency_visit(&mut self, time: DateTime<Utc>) -> Result<()> {
        self.collaborators.request_emergency_visit(time, &*self.entity)
    }
}

/// Rules collected from one or more modules, not yet ordered
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: impl Rule + 'static) -> &mut Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Build the dependency graph and sort it
    pub fn build(self) -> Result<Schedule> {
        let order = topological_order(&self.rules)?;

        let mut slots: Vec<Option<Box<dyn Rule>>> = self.rules.into_iter().map(Some).collect();
        let rules: Vec<Box<dyn Rule>> = order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect();

        tracing::debug!(
            order = ?rules.iter().map(|r| r.spec().name).collect::<Vec<_>>(),
            "Rule schedule built"
        );
        Ok(Schedule { rules })
    }
}

/// Kahn's algorithm with registration order as the tie-breaker
fn topological_order(rules: &[Box<dyn Rule>]) -> Result<Vec<usize>> {
    let mut by_name: HashMap<&'static str, usize> = HashMap::new();
    for (idx, rule) in rules.iter().enumerate() {
        if by_name.insert(rule.spec().name, idx).is_some() {
            return Err(Error::RuleGraph(format!(
                "rule '{}' registered twice",
                rule.spec().name
            )));
        }
    }

    let mut writers: HashMap<Attribute, Vec<usize>> = HashMap::new();
    for (idx, rule) in rules.iter().enumerate() {
        for output in &rule.spec().outputs {
            writers.entry(*output).or_default().push(idx);
        }
    }

    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); rules.len()];
    for (idx, rule) in rules.iter().enumerate() {
        for input in &rule.spec().inputs {
            let upstream: Vec<usize> = match input {
                Input::Attr(attribute) => writers.get(attribute).cloned().unwrap_or_default(),
                Input::After(name) => match by_name.get(name) {
                    Some(&dep) => vec![dep],
                    None => {
                        return Err(Error::RuleGraph(format!(
                            "rule '{}' runs after unknown rule '{}'",
                            rule.spec().name,
                            name
                        )))
                    }
                },
            };
            for dep in upstream {
                // Reading what you write is not a dependency on yourself
                if dep != idx {
                    successors[dep].insert(idx);
                }
            }
        }
    }

    let mut in_degree = vec![0usize; rules.len()];
    for succ in &successors {
        for &s in succ {
            in_degree[s] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..rules.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(rules.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &s in &successors[next] {
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                ready.insert(s);
            }
        }
    }

    if order.len() != rules.len() {
        let stuck: Vec<&str> = (0..rules.len())
            .filter(|i| in_degree[*i] > 0)
            .map(|i| rules[i].spec().name)
            .collect();
        return Err(Error::RuleGraph(format!(
            "dependency cycle among rules: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

/// What happened to one entity during one day
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DayReport {
    /// Rule bodies invoked
    pub executed: usize,
    /// Events appended to the entity's log
    pub new_events: usize,
    /// The entity died during this pass
    pub died: bool,
}

/// Sorted rules, reused for every entity and every day
pub struct Schedule {
    rules: Vec<Box<dyn Rule>>,
}

impl Schedule {
    /// Rule names in execution order
    pub fn order(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.spec().name).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule once for `entity` at `time`
    ///
    /// Dead entities are skipped entirely; a rule that kills the entity
    /// ends the pass.
    pub fn run_day(
        &self,
        entity: &mut Entity,
        time: DateTime<Utc>,
        rng: &mut dyn RandomSource,
        collaborators: &mut dyn CareCollaborators,
    ) -> Result<DayReport> {
        let mut report = DayReport::default();
        if !entity.is_alive() {
            return Ok(report);
        }

        let span = tracing::debug_span!("day", entity = %entity.id, %time);
        let _guard = span.enter();

        let events_before = entity.events().len();
        for rule in &self.rules {
            if !entity.is_alive() {
                report.died = true;
                break;
            }
            let name = rule.spec().name;
            let mut ctx =
                RuleContext::new(time, &mut *entity, &mut *rng, &mut *collaborators, name);
            rule.apply(&mut ctx)?;
            report.executed += 1;
        }

        report.died |= !entity.is_alive();
        report.new_events = entity.events().len() - events_before;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CareLog, NoCollaborators};
    use crate::random::ScriptedDraws;
    use crate::Condition;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test rule that optionally records an event
    struct StubRule {
        spec: RuleSpec,
        emit: Option<EventKind>,
        calls: Arc<AtomicUsize>,
    }

    impl StubRule {
        fn new(spec: RuleSpec) -> Self {
            Self {
                spec,
                emit: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn emitting(mut self, kind: EventKind) -> Self {
            self.emit = Some(kind);
            self
        }
    }

    impl Rule for StubRule {
        fn spec(&self) -> &RuleSpec {
            &self.spec
        }

        fn apply(&self, ctx: &mut RuleContext<'_>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(kind) = self.emit {
                ctx.record(kind, kind == EventKind::Death)?;
            }
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_orders_by_data_dependencies() {
        let mut set = RuleSet::new();
        set.add(StubRule::new(
            RuleSpec::new("consume")
                .reads(&[Attribute::CardioRisk])
                .writes(&[Attribute::CoronaryHeartDisease]),
        ));
        set.add(StubRule::new(
            RuleSpec::new("score")
                .reads(&[Attribute::Smoker])
                .writes(&[Attribute::CardioRisk]),
        ));
        set.add(StubRule::new(
            RuleSpec::new("smoke")
                .reads(&[Attribute::Age])
                .writes(&[Attribute::Smoker]),
        ));

        let schedule = set.build().unwrap();
        assert_eq!(schedule.order(), vec!["smoke", "score", "consume"]);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let mut set = RuleSet::new();
        for name in ["c", "a", "b"] {
            set.add(StubRule::new(RuleSpec::new(name).reads(&[Attribute::Age])));
        }
        assert_eq!(set.build().unwrap().order(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_after_creates_edge() {
        let mut set = RuleSet::new();
        set.add(StubRule::new(RuleSpec::new("second").after("first")));
        set.add(StubRule::new(RuleSpec::new("first")));
        assert_eq!(set.build().unwrap().order(), vec!["first", "second"]);
    }

    #[test]
    fn test_self_loop_ignored() {
        let mut set = RuleSet::new();
        set.add(StubRule::new(
            RuleSpec::new("sticky")
                .reads(&[Attribute::StrokeHistory])
                .writes(&[Attribute::StrokeHistory]),
        ));
        assert_eq!(set.build().unwrap().order(), vec!["sticky"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut set = RuleSet::new();
        set.add(StubRule::new(
            RuleSpec::new("a")
                .reads(&[Attribute::StrokeRisk])
                .writes(&[Attribute::StrokeHistory]),
        ));
        set.add(StubRule::new(
            RuleSpec::new("b")
                .reads(&[Attribute::StrokeHistory])
                .writes(&[Attribute::StrokeRisk]),
        ));

        match set.build() {
            Err(Error::RuleGraph(message)) => {
                assert!(message.contains("a"));
                assert!(message.contains("b"));
            }
            other => panic!("expected cycle error, got {:?}", other.map(|s| s.order())),
        }
    }

    #[test]
    fn test_duplicate_and_unknown_rules_rejected() {
        let mut set = RuleSet::new();
        set.add(StubRule::new(RuleSpec::new("x")));
        set.add(StubRule::new(RuleSpec::new("x")));
        assert!(matches!(set.build(), Err(Error::RuleGraph(_))));

        let mut set = RuleSet::new();
        set.add(StubRule::new(RuleSpec::new("y").after("missing")));
        assert!(matches!(set.build(), Err(Error::RuleGraph(_))));
    }

    #[test]
    fn test_dead_entity_is_skipped() {
        let stub = StubRule::new(RuleSpec::new("p"));
        let calls = stub.calls.clone();
        let mut set = RuleSet::new();
        set.add(stub);
        let schedule = set.build().unwrap();

        let mut entity = Entity::new();
        entity.mark_dead();
        let report = schedule
            .run_day(&mut entity, t0(), &mut ScriptedDraws::new([]), &mut NoCollaborators)
            .unwrap();

        assert_eq!(report.executed, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_death_stops_remaining_rules() {
        let killer = StubRule::new(RuleSpec::new("killer").writes(&[Attribute::IsAlive]))
            .emitting(EventKind::Death);
        let later = StubRule::new(RuleSpec::new("later").reads(&[Attribute::IsAlive]));
        let later_calls = later.calls.clone();

        let mut set = RuleSet::new();
        set.add(later);
        set.add(killer);
        let schedule = set.build().unwrap();
        assert_eq!(schedule.order(), vec!["killer", "later"]);

        let mut entity = Entity::new();
        let mut care = CareLog::new();
        let report = schedule
            .run_day(&mut entity, t0(), &mut ScriptedDraws::new([]), &mut care)
            .unwrap();

        assert!(report.died);
        assert_eq!(report.executed, 1);
        assert_eq!(report.new_events, 1);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
        assert!(!entity.is_alive());
        assert_eq!(care.deaths(), 1);
    }

    #[test]
    fn test_conditions_recorded_once() {
        let rule = StubRule::new(RuleSpec::new("mi")).emitting(EventKind::MyocardialInfarction);
        let mut set = RuleSet::new();
        set.add(rule);
        let schedule = set.build().unwrap();

        let mut entity = Entity::new();
        let mut care = CareLog::new();
        for day in 0..3 {
            schedule
                .run_day(
                    &mut entity,
                    t0() + chrono::Duration::days(day),
                    &mut ScriptedDraws::new([]),
                    &mut care,
                )
                .unwrap();
        }

        assert_eq!(entity.events().len(), 3);
        assert_eq!(care.conditions(), vec![Condition::MyocardialInfarction]);
        assert!(entity.has_recorded(Condition::MyocardialInfarction));
    }

    /// Collaborators whose clinical record rejects the first write
    struct FlakyRecord {
        failures: usize,
        log: CareLog,
    }

    impl CareCollaborators for FlakyRecord {
        fn request_emergency_visit(&mut self, time: DateTime<Utc>, entity: &Entity) -> Result<()> {
            self.log.request_emergency_visit(time, entity)
        }

        fn record_condition(
            &mut self,
            entity: &Entity,
            condition: Condition,
            time: DateTime<Utc>,
        ) -> Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(Error::Other("record unavailable".to_string()));
            }
            self.log.record_condition(entity, condition, time)
        }

        fn record_death(&mut self, entity: &Entity, time: DateTime<Utc>) -> Result<()> {
            self.log.record_death(entity, time)
        }
    }

    #[test]
    fn test_failed_record_is_retried_next_time() {
        let rule = StubRule::new(RuleSpec::new("mi")).emitting(EventKind::MyocardialInfarction);
        let mut set = RuleSet::new();
        set.add(rule);
        let schedule = set.build().unwrap();

        let mut entity = Entity::new();
        let mut care = FlakyRecord {
            failures: 1,
            log: CareLog::new(),
        };

        let first = schedule.run_day(&mut entity, t0(), &mut ScriptedDraws::new([]), &mut care);
        assert!(first.is_err());
        assert!(!entity.has_recorded(Condition::MyocardialInfarction));
        assert!(care.log.conditions().is_empty());

        schedule
            .run_day(
                &mut entity,
                t0() + chrono::Duration::days(1),
                &mut ScriptedDraws::new([]),
                &mut care,
            )
            .unwrap();
        assert!(entity.has_recorded(Condition::MyocardialInfarction));
        assert_eq!(care.log.conditions(), vec![Condition::MyocardialInfarction]);
    }
}
