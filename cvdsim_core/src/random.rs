//! Random draw sources.
//!
//! Rules never reach for a global generator: the scheduler hands every rule
//! a `&mut dyn RandomSource`. Any `rand` generator works, and
//! [`ScriptedDraws`] replays a fixed sequence for deterministic tests.

use crate::{Error, Result};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

/// A stream of uniform draws in [0, 1)
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;
}

impl<R: RngCore + ?Sized> RandomSource for R {
    fn next_f64(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// One Bernoulli trial: consumes exactly one draw and succeeds when it
/// falls below `p`.
pub fn chance(rng: &mut dyn RandomSource, p: f64) -> Result<bool> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Probability(format!("Bernoulli trial with p = {}", p)));
    }
    Ok(rng.next_f64() < p)
}

/// Generator for a whole run
pub fn seeded(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Independent generator for one entity of a seeded run
///
/// Each entity gets its own ChaCha stream, so results do not depend on how
/// entities are spread across threads.
pub fn entity_rng(seed: u64, entity_index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(entity_index);
    rng
}

/// Replays a fixed list of draws, then a constant fallback
#[derive(Clone, Debug)]
pub struct ScriptedDraws {
    draws: VecDeque<f64>,
    fallback: f64,
    consumed: usize,
}

impl ScriptedDraws {
    /// Once exhausted, every draw is just below 1.0, so no trial succeeds
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            fallback: 1.0 - f64::EPSILON,
            consumed: 0,
        }
    }

    /// Draws taken so far, scripted or not
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.draws.len()
    }
}

impl RandomSource for ScriptedDraws {
    fn next_f64(&mut self) -> f64 {
        self.consumed += 1;
        self.draws.pop_front().unwrap_or(self.fallback)
    }
}
