//! Core abstractions for probabilistic programs.
//!
//! Provides the `Model` trait, the interface a user-written program
//! implements, and the `Evaluator` handle the program calls at every
//! random-variable site during one evaluation pass.

use anyhow::Result;
use rand::Rng;

use crate::distribution::Distribution;
use crate::init::InitStrategy;
use crate::selector::Selector;
use crate::store::{Trace, TraceError};

/// A probabilistic program.
///
/// One call to `evaluate` runs the program once against a store, declaring
/// every random variable through the evaluator handle. A program must
/// declare the same set of variables for given inputs regardless of the
/// evaluation mode; only the way values are produced or consumed differs.
/// Control flow between declarations is unrestricted and may depend on
/// previously declared values.
///
/// The trait is thread-safe to enable parallel-chain scenarios, but a
/// single evaluation is synchronous and runs to completion.
pub trait Model: Send + Sync + 'static {
    fn evaluate<R: Rng>(&self, rng: &mut R, ev: &mut Evaluator<'_>) -> Result<()>;
}

#[derive(Clone, Copy)]
enum EvalMode {
    /// Produce values for absent variables with the given strategy,
    /// tagging new records with `owner`.
    Sample {
        strategy: InitStrategy,
        owner: Option<Selector>,
    },
    /// Consume existing values only; the bindings are fixed and the pass
    /// re-accumulates the joint log-density.
    Recompute,
}

/// Handle through which a program declares its random variables.
///
/// Obtained by the sampling scaffold, never constructed by user code.
pub struct Evaluator<'a> {
    store: &'a mut Trace,
    mode: EvalMode,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn sampling(
        store: &'a mut Trace,
        strategy: InitStrategy,
        owner: Option<Selector>,
    ) -> Self {
        Evaluator {
            store,
            mode: EvalMode::Sample { strategy, owner },
        }
    }

    pub(crate) fn recompute(store: &'a mut Trace) -> Self {
        Evaluator {
            store,
            mode: EvalMode::Recompute,
        }
    }

    /// Declare a scalar random variable.
    ///
    /// Returns the variable's value in natural-support coordinates and
    /// accumulates its log-density contribution into the store.
    pub fn assume<R, D>(&mut self, rng: &mut R, name: &str, dist: D) -> Result<f64, TraceError>
    where
        R: Rng,
        D: Distribution + 'static,
    {
        let values = self.assume_flat(rng, name, dist, None)?;
        Ok(values[0])
    }

    /// Declare a vector random variable of `n` independent draws from
    /// `dist`. Its flattened dimensionality is `n`.
    pub fn assume_vec<R, D>(
        &mut self,
        rng: &mut R,
        name: &str,
        dist: D,
        n: usize,
    ) -> Result<Vec<f64>, TraceError>
    where
        R: Rng,
        D: Distribution + 'static,
    {
        self.assume_flat(rng, name, dist, Some(n))
    }

    /// Add the likelihood contribution of an observed value.
    pub fn observe<D: Distribution>(&mut self, dist: &D, value: f64) {
        self.store.add_log_density(dist.logp(value));
    }

    fn assume_flat<R, D>(
        &mut self,
        rng: &mut R,
        name: &str,
        dist: D,
        n: Option<usize>,
    ) -> Result<Vec<f64>, TraceError>
    where
        R: Rng,
        D: Distribution + 'static,
    {
        if self.store.record(name).is_some() {
            return self.reuse(name, dist);
        }
        let (strategy, owner) = match self.mode {
            EvalMode::Sample { strategy, owner } => (strategy, owner),
            EvalMode::Recompute => return Err(TraceError::MissingVariable(name.to_string())),
        };
        let values = match n {
            Some(n) => strategy.produce_many(rng, &dist, n),
            None => vec![strategy.produce(rng, &dist)],
        };
        let logp: f64 = values.iter().map(|&v| dist.logp(v)).sum();
        self.store.add_log_density(logp);
        self.store.push(name, values.clone(), Box::new(dist), owner);
        Ok(values)
    }

    /// Re-read an already declared variable: accumulate its log-density
    /// under the (possibly updated) distribution and hand its
    /// natural-support values back to the program.
    fn reuse<D>(&mut self, name: &str, dist: D) -> Result<Vec<f64>, TraceError>
    where
        D: Distribution + 'static,
    {
        let owner = match self.mode {
            EvalMode::Sample { owner, .. } => owner,
            EvalMode::Recompute => None,
        };
        let rec = self
            .store
            .record_mut(name)
            .ok_or_else(|| TraceError::MissingVariable(name.to_string()))?;
        let constrained = rec.constrained();
        let mut logp: f64 = constrained.iter().map(|&v| dist.logp(v)).sum();
        if rec.linked {
            if let Some(transform) = dist.transform() {
                logp -= constrained
                    .iter()
                    .map(|&v| transform.log_abs_det_jacobian(v))
                    .sum::<f64>();
            }
        }
        // keep the generating-distribution reference current; parameters
        // may depend on variables declared earlier in this pass
        rec.dist = Box::new(dist);
        if rec.owner.is_none() {
            rec.owner = owner;
        }
        self.store.add_log_density(logp);
        Ok(constrained)
    }
}
