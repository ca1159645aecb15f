//! The generic step-entry protocol shared by all inference algorithms.
//!
//! An algorithm only supplies its own `initial_step` and `step`; the
//! sampler shell decides between a fresh start, a resumed run and
//! user-supplied initial values, and owns the parameter-merge plus
//! log-density recomputation that fresh starts may need.

use anyhow::{bail, Context, Result};
use rand::Rng;
use thiserror::Error;

use crate::init::{initialize_parameters, InitParams, InitStrategy};
use crate::model::{Evaluator, Model};
use crate::selector::Selector;
use crate::store::Trace;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("this sampler does not support resuming from a checkpoint")]
    MissingLoadState,
}

/// A concrete inference algorithm.
///
/// `initial_step` is required of every algorithm, so a missing
/// implementation is a build-time error rather than a runtime one.
/// `load_state` is only needed by algorithms that support resuming and
/// defaults to failing before any entropy is consumed.
pub trait Algorithm: Send + Sync + 'static {
    /// Continuation state between steps. Carries everything a later step
    /// needs, including the bindings, so a resumed run never
    /// re-initializes.
    type State: Send + 'static;

    /// First step of a fresh run, starting from an initialized store.
    ///
    /// `init_params` are the user-supplied initial values, already merged
    /// into the store; they are passed through for algorithms that treat
    /// explicitly initialized positions specially.
    fn initial_step<M, R>(
        &self,
        rng: &mut R,
        model: &M,
        selector: Selector,
        store: Trace,
        init_params: Option<&InitParams>,
    ) -> Result<(Trace, Self::State)>
    where
        M: Model,
        R: Rng;

    /// One continuation step from an existing state.
    fn step<M, R>(
        &self,
        rng: &mut R,
        model: &M,
        selector: Selector,
        state: Self::State,
    ) -> Result<(Trace, Self::State)>
    where
        M: Model,
        R: Rng;

    /// Decode a persisted continuation state. The format is
    /// algorithm-specific and opaque to the shell.
    fn load_state(&self, _data: &[u8]) -> Result<Self::State> {
        bail!(StepError::MissingLoadState)
    }

    /// The strategy used to produce the initial store of a fresh run.
    fn init_strategy(&self) -> InitStrategy {
        InitStrategy::FromPrior
    }
}

/// Pairs an algorithm with the selector that scopes its variable
/// ownership. Immutable after construction; one per inference run or per
/// component of a composite scheme.
pub struct Sampler<A: Algorithm> {
    algorithm: A,
    selector: Selector,
}

/// Optional inputs to [`Sampler::step`], mirroring keyword arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepOptions<'a> {
    /// Persisted continuation state to resume from. When present,
    /// initialization is skipped entirely and `init_params` is ignored.
    pub resume_from: Option<&'a [u8]>,
    /// User-supplied initial values for the variables this sampler owns.
    pub init_params: Option<&'a InitParams>,
}

impl<A: Algorithm> Sampler<A> {
    /// Wrap an algorithm with a fresh selector.
    pub fn new(algorithm: A) -> Self {
        Sampler {
            algorithm,
            selector: Selector::new(),
        }
    }

    /// Wrap an algorithm with an explicitly shared selector. Components
    /// of a composite scheme that must not share ownership use distinct
    /// selectors.
    pub fn with_selector(algorithm: A, selector: Selector) -> Self {
        Sampler {
            algorithm,
            selector,
        }
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// Advance the run by one step.
    ///
    /// With `state` present this is a plain continuation. Otherwise the
    /// shell either resumes from a checkpoint (fatal if it cannot be
    /// decoded; a resume request is never silently downgraded to a fresh
    /// start) or builds a fresh store: one model evaluation driven by the
    /// algorithm's initialization strategy, ownership claimed by this
    /// sampler's selector, user-supplied values merged in and the joint
    /// log-density recomputed, and finally the algorithm's own
    /// `initial_step`.
    pub fn step<M, R>(
        &self,
        rng: &mut R,
        model: &M,
        state: Option<A::State>,
        opts: StepOptions<'_>,
    ) -> Result<(Trace, A::State)>
    where
        M: Model,
        R: Rng,
    {
        if let Some(state) = state {
            return self.algorithm.step(rng, model, self.selector, state);
        }

        if let Some(data) = opts.resume_from {
            let state = self
                .algorithm
                .load_state(data)
                .context("could not decode checkpoint state")?;
            return self.algorithm.step(rng, model, self.selector, state);
        }

        let mut store = AnySampler::Shell(self).init_store(rng, model)?;
        if let Some(params) = opts.init_params {
            initialize_parameters(&mut store, self.selector, params)?;
            store.recompute_log_density(rng, model)?;
        }
        self.algorithm
            .initial_step(rng, model, self.selector, store, opts.init_params)
    }
}

/// Evaluate the model once with prior draws for every variable.
///
/// Has an empty selector scope (no record is tagged) and no continuation
/// state: the pass is the entire "step".
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleFromPrior;

/// Evaluate the model once, drawing each transform-capable variable
/// uniformly in the unconstrained chart.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleFromUniform;

fn run_init<M, R>(
    rng: &mut R,
    model: &M,
    strategy: InitStrategy,
    owner: Option<Selector>,
) -> Result<Trace>
where
    M: Model,
    R: Rng,
{
    let mut store = Trace::new();
    let mut ev = Evaluator::sampling(&mut store, strategy, owner);
    model.evaluate(rng, &mut ev)?;
    Ok(store)
}

impl SampleFromPrior {
    pub fn init_store<M: Model, R: Rng>(&self, rng: &mut R, model: &M) -> Result<Trace> {
        run_init(rng, model, InitStrategy::FromPrior, None)
    }
}

impl SampleFromUniform {
    pub fn init_store<M: Model, R: Rng>(&self, rng: &mut R, model: &M) -> Result<Trace> {
        run_init(rng, model, InitStrategy::FromUniform, None)
    }
}

/// The closed set of samplers that can drive a model evaluation.
///
/// Call sites resolve the variant by matching; all variants share the
/// minimal capability surface of producing initial values and driving one
/// evaluation pass.
pub enum AnySampler<'a, A: Algorithm> {
    FromPrior(SampleFromPrior),
    FromUniform(SampleFromUniform),
    Shell(&'a Sampler<A>),
}

impl<'a, A: Algorithm> AnySampler<'a, A> {
    pub fn strategy(&self) -> InitStrategy {
        match self {
            AnySampler::FromPrior(_) => InitStrategy::FromPrior,
            AnySampler::FromUniform(_) => InitStrategy::FromUniform,
            AnySampler::Shell(sampler) => sampler.algorithm.init_strategy(),
        }
    }

    /// The selector whose ownership newly declared variables receive;
    /// the baseline samplers own nothing.
    pub fn selector(&self) -> Option<Selector> {
        match self {
            AnySampler::FromPrior(_) | AnySampler::FromUniform(_) => None,
            AnySampler::Shell(sampler) => Some(sampler.selector),
        }
    }

    /// Build a fresh store with one model evaluation.
    pub fn init_store<M: Model, R: Rng>(&self, rng: &mut R, model: &M) -> Result<Trace> {
        let mut store = run_init(rng, model, self.strategy(), None)?;
        if let Some(selector) = self.selector() {
            store.claim(selector);
        }
        Ok(store)
    }
}
