//! The variable store: an ordered, append-capable map of random-variable
//! bindings plus the accumulated log-density of one program execution.
//!
//! Variables are discovered by running the program, never by static
//! analysis, so records are appended in encounter order and the
//! selector-scoped flattened view preserves that order across
//! re-evaluations of structurally identical programs.

use anyhow::Result;
use itertools::Itertools;
use rand::Rng;
use thiserror::Error;

use crate::distribution::Distribution;
use crate::model::{Evaluator, Model};
use crate::selector::Selector;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("flattened value vector has length {supplied}, but the selector owns {expected} values")]
    DimensionMismatch { expected: usize, supplied: usize },
    #[error("variable `{0}` is not present in the store")]
    MissingVariable(String),
}

pub(crate) struct Record {
    pub(crate) name: String,
    /// Flattened values, in the record's current coordinate chart.
    pub(crate) values: Vec<f64>,
    /// The distribution that generated the values in the most recent
    /// evaluation pass.
    pub(crate) dist: Box<dyn Distribution>,
    pub(crate) owner: Option<Selector>,
    /// Whether `values` currently live in the unconstrained chart.
    /// Only ever true for records whose distribution has a transform.
    pub(crate) linked: bool,
}

impl Record {
    /// The record's values in natural-support coordinates, regardless of
    /// the current chart.
    pub(crate) fn constrained(&self) -> Vec<f64> {
        match (self.linked, self.dist.transform()) {
            (true, Some(t)) => self.values.iter().map(|&v| t.from_unconstrained(v)).collect(),
            _ => self.values.clone(),
        }
    }
}

/// The bindings of a single program execution.
///
/// A trace is exclusively owned by the chain executing it. It is created
/// fresh per chain (or rebuilt by an algorithm's checkpoint state), mutated
/// in place by evaluation and parameter merging, and discarded or persisted
/// at run end.
#[derive(Default)]
pub struct Trace {
    records: Vec<Record>,
    log_density: f64,
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("log_density", &self.log_density)
            .finish_non_exhaustive()
    }
}

impl Trace {
    pub fn new() -> Self {
        Trace::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Variable names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    /// The stored (current-chart) values of one variable.
    pub fn value(&self, name: &str) -> Option<&[f64]> {
        self.record(name).map(|r| r.values.as_slice())
    }

    pub fn log_density(&self) -> f64 {
        self.log_density
    }

    pub(crate) fn record(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name == name)
    }

    pub(crate) fn record_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.name == name)
    }

    pub(crate) fn push(
        &mut self,
        name: &str,
        values: Vec<f64>,
        dist: Box<dyn Distribution>,
        owner: Option<Selector>,
    ) {
        debug_assert!(self.record(name).is_none(), "variable {name} declared twice");
        self.records.push(Record {
            name: name.to_string(),
            values,
            dist,
            owner,
            linked: false,
        });
    }

    pub(crate) fn add_log_density(&mut self, value: f64) {
        self.log_density += value;
    }

    pub(crate) fn reset_log_density(&mut self) {
        self.log_density = 0.;
    }

    /// Assign every currently unowned record to `selector`.
    ///
    /// The baseline initialization samplers have an empty selector scope,
    /// so a sampler shell claims the variables they produced before using
    /// any selector-scoped accessor.
    pub fn claim(&mut self, selector: Selector) {
        for rec in self.records.iter_mut() {
            if rec.owner.is_none() {
                rec.owner = Some(selector);
            }
        }
    }

    /// The concatenated flattened values of the records owned by
    /// `selector`, in insertion order.
    pub fn get_flat(&self, selector: Selector) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.owner == Some(selector))
            .flat_map(|r| r.values.iter().copied())
            .collect_vec()
    }

    /// Positionally overwrite the flattened view of `selector`.
    ///
    /// This writes raw values in the current chart and does not touch the
    /// log-density; callers follow up with [`Trace::recompute_log_density`].
    pub fn set_flat(&mut self, selector: Selector, values: &[f64]) -> Result<(), TraceError> {
        let expected: usize = self
            .records
            .iter()
            .filter(|r| r.owner == Some(selector))
            .map(|r| r.values.len())
            .sum();
        if expected != values.len() {
            return Err(TraceError::DimensionMismatch {
                expected,
                supplied: values.len(),
            });
        }
        let mut rest = values;
        for rec in self
            .records
            .iter_mut()
            .filter(|r| r.owner == Some(selector))
        {
            let (head, tail) = rest.split_at(rec.values.len());
            rec.values.copy_from_slice(head);
            rest = tail;
        }
        Ok(())
    }

    /// Whether any record owned by `selector` is currently in the
    /// unconstrained chart.
    pub fn is_linked(&self, selector: Selector) -> bool {
        self.records
            .iter()
            .filter(|r| r.owner == Some(selector))
            .any(|r| r.linked)
    }

    /// Move the transform-capable records owned by `selector` into the
    /// unconstrained chart.
    ///
    /// The accumulated log-density is adjusted by the log-abs-det-Jacobian
    /// of the transform, evaluated at the constrained values, so that it
    /// remains a proper density in the new chart. Idempotent.
    pub fn link(&mut self, selector: Selector) {
        let mut delta = 0f64;
        for rec in self
            .records
            .iter_mut()
            .filter(|r| r.owner == Some(selector) && !r.linked)
        {
            let Some(transform) = rec.dist.transform() else {
                continue;
            };
            for v in rec.values.iter_mut() {
                delta += transform.log_abs_det_jacobian(*v);
                *v = transform.to_unconstrained(*v);
            }
            rec.linked = true;
        }
        self.log_density -= delta;
    }

    /// Inverse of [`Trace::link`]: restore natural-support coordinates and
    /// the matching log-density bookkeeping. Idempotent.
    pub fn unlink(&mut self, selector: Selector) {
        let mut delta = 0f64;
        for rec in self
            .records
            .iter_mut()
            .filter(|r| r.owner == Some(selector) && r.linked)
        {
            let Some(transform) = rec.dist.transform() else {
                continue;
            };
            for v in rec.values.iter_mut() {
                let constrained = transform.from_unconstrained(*v);
                delta += transform.log_abs_det_jacobian(constrained);
                *v = constrained;
            }
            rec.linked = false;
        }
        self.log_density += delta;
    }

    /// Re-run the model in density-recomputation mode over the current
    /// bindings and replace the accumulated log-density.
    ///
    /// No values are produced and no RNG draws occur; the `rng` argument
    /// only satisfies the model's evaluation signature. Linked records
    /// contribute in the unconstrained chart while the model itself still
    /// observes natural-support values.
    pub fn recompute_log_density<M, R>(&mut self, rng: &mut R, model: &M) -> Result<f64>
    where
        M: Model,
        R: Rng,
    {
        self.reset_log_density();
        let mut ev = Evaluator::recompute(self);
        model.evaluate(rng, &mut ev)?;
        Ok(self.log_density)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    use crate::distribution::test_distributions::{LogNormal, Normal};
    use crate::selector::Selector;

    use super::Trace;

    fn two_variable_trace(selector: Selector) -> Trace {
        let mut trace = Trace::new();
        trace.push("a", vec![1.0], Box::new(Normal::new(0.0, 1.0)), Some(selector));
        trace.push(
            "b",
            vec![2.0, 3.0],
            Box::new(Normal::new(0.0, 1.0)),
            Some(selector),
        );
        trace
    }

    #[test]
    fn flat_view_preserves_insertion_order() {
        let selector = Selector::new();
        let trace = two_variable_trace(selector);
        assert_eq!(trace.names(), vec!["a", "b"]);
        assert_eq!(trace.get_flat(selector), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn flat_view_is_selector_scoped() {
        let mine = Selector::new();
        let other = Selector::new();
        let mut trace = two_variable_trace(mine);
        trace.push("c", vec![9.0], Box::new(Normal::new(0.0, 1.0)), Some(other));
        assert_eq!(trace.get_flat(mine), vec![1.0, 2.0, 3.0]);
        assert_eq!(trace.get_flat(other), vec![9.0]);
    }

    #[test]
    fn set_flat_writes_positionally() {
        let selector = Selector::new();
        let mut trace = two_variable_trace(selector);
        trace.set_flat(selector, &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(trace.value("a").unwrap(), &[4.0]);
        assert_eq!(trace.value("b").unwrap(), &[5.0, 6.0]);
    }

    #[test]
    fn set_flat_rejects_wrong_length() {
        let selector = Selector::new();
        let mut trace = two_variable_trace(selector);
        let err = trace.set_flat(selector, &[1.0]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains('1') && msg.contains('3'), "{msg}");
        // nothing was written
        assert_eq!(trace.get_flat(selector), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn claim_assigns_unowned_records_only() {
        let owner = Selector::new();
        let late = Selector::new();
        let mut trace = Trace::new();
        trace.push("a", vec![1.0], Box::new(Normal::new(0.0, 1.0)), None);
        trace.push("b", vec![2.0], Box::new(Normal::new(0.0, 1.0)), Some(owner));
        trace.claim(late);
        assert_eq!(trace.get_flat(late), vec![1.0]);
        assert_eq!(trace.get_flat(owner), vec![2.0]);
    }

    #[test]
    fn link_unlink_round_trips_values_and_log_density() {
        let selector = Selector::new();
        let dist = LogNormal::new(0.0, 1.0);
        let mut trace = Trace::new();
        trace.push("x", vec![2.5], Box::new(dist), Some(selector));
        trace.add_log_density(-1.25);

        assert!(!trace.is_linked(selector));
        trace.link(selector);
        assert!(trace.is_linked(selector));
        assert_abs_diff_eq!(trace.value("x").unwrap()[0], 2.5f64.ln(), epsilon = 1e-12);
        // density in the unconstrained chart picks up + ln x
        assert_abs_diff_eq!(trace.log_density(), -1.25 + 2.5f64.ln(), epsilon = 1e-12);

        trace.unlink(selector);
        assert!(!trace.is_linked(selector));
        assert_abs_diff_eq!(trace.value("x").unwrap()[0], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(trace.log_density(), -1.25, epsilon = 1e-12);
    }

    #[test]
    fn link_is_idempotent_and_skips_unbounded_support() {
        let selector = Selector::new();
        let mut trace = Trace::new();
        trace.push("n", vec![1.5], Box::new(Normal::new(0.0, 1.0)), Some(selector));
        trace.push("x", vec![2.0], Box::new(LogNormal::new(0.0, 1.0)), Some(selector));

        trace.link(selector);
        let once = trace.get_flat(selector);
        let logp_once = trace.log_density();
        trace.link(selector);
        assert_eq!(trace.get_flat(selector), once);
        assert_abs_diff_eq!(trace.log_density(), logp_once, epsilon = 1e-12);

        // no transform for the normal, so its value stays in natural units
        assert_abs_diff_eq!(trace.value("n").unwrap()[0], 1.5, epsilon = 1e-12);
    }
}
