//! Runtime scaffolding that lets arbitrary MCMC inference algorithms drive
//! a probabilistic program and manage the resulting variable bindings.
//!
//! The crate owns the generic pieces every algorithm shares: the
//! selector-based ownership model ([`Selector`], [`Sampler`]), the variable
//! store ([`Trace`]) with its constrained/unconstrained representation
//! toggle, the baseline initialization strategies ([`InitStrategy`]) and
//! the step-entry protocol that decides between a fresh start, a resumed
//! run and user-supplied initial values ([`Sampler::step`]).
//!
//! Concrete algorithms implement [`Algorithm`]; probabilistic programs
//! implement [`Model`] and declare their variables through an
//! [`Evaluator`]. Probability distributions are external collaborators
//! behind the [`Distribution`] contract.

pub(crate) mod distribution;
pub(crate) mod init;
pub(crate) mod model;
pub(crate) mod sampler;
pub(crate) mod selector;
pub(crate) mod store;

pub use distribution::{test_distributions, Distribution, SupportTransform};
pub use init::{initialize_parameters, InitParams, InitStrategy};
pub use model::{Evaluator, Model};
pub use sampler::{
    Algorithm, AnySampler, SampleFromPrior, SampleFromUniform, Sampler, StepError, StepOptions,
};
pub use selector::Selector;
pub use store::{Trace, TraceError};
