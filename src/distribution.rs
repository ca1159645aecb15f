//! The distribution contract the sampler scaffold consumes.
//!
//! This crate never implements real probability distributions. It only
//! needs enough of a surface to draw initial values, accumulate
//! log-densities and move values between a distribution's natural support
//! and an unconstrained real coordinate system.

use rand::RngCore;

/// A univariate distribution, as seen by the sampling scaffold.
///
/// The trait is object safe so a variable store can keep a reference to the
/// distribution that generated each of its records.
pub trait Distribution: Send + Sync {
    /// Draw one value from the distribution's natural support.
    fn draw(&self, rng: &mut dyn RngCore) -> f64;

    /// Draw `n` independent values.
    fn draw_many(&self, rng: &mut dyn RngCore, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.draw(rng)).collect()
    }

    /// Log-density at `value`, in natural-support coordinates.
    fn logp(&self, value: f64) -> f64;

    /// The bijection between the support and unconstrained real space, if
    /// the distribution has one. Distributions with unbounded support
    /// return `None` and are left untouched by link/unlink.
    fn transform(&self) -> Option<&dyn SupportTransform> {
        None
    }
}

/// Bijection between a distribution's support and the real line.
///
/// `to_unconstrained` and `from_unconstrained` must be exact inverses. The
/// Jacobian term is always evaluated at the constrained value: a store
/// holding the unconstrained representation of `x` accounts for the change
/// of coordinates by subtracting `log_abs_det_jacobian(x)` from the
/// variable's natural-support log-density.
pub trait SupportTransform: Send + Sync {
    fn to_unconstrained(&self, value: f64) -> f64;
    fn from_unconstrained(&self, real: f64) -> f64;

    /// `log |d to_unconstrained / d value|` at the constrained `value`.
    fn log_abs_det_jacobian(&self, value: f64) -> f64;
}

pub mod test_distributions {
    //! Small concrete distributions for tests and examples.

    use std::f64::consts::TAU;

    use rand::RngCore;
    use rand_distr::Distribution as _;

    use super::{Distribution, SupportTransform};

    #[derive(Debug, Clone, Copy)]
    pub struct Normal {
        pub mu: f64,
        pub sigma: f64,
    }

    impl Normal {
        pub fn new(mu: f64, sigma: f64) -> Self {
            assert!(sigma > 0.);
            Normal { mu, sigma }
        }
    }

    impl Distribution for Normal {
        fn draw(&self, rng: &mut dyn RngCore) -> f64 {
            rand_distr::Normal::new(self.mu, self.sigma)
                .expect("sigma is checked in the constructor")
                .sample(rng)
        }

        fn logp(&self, value: f64) -> f64 {
            let z = (value - self.mu) / self.sigma;
            -0.5 * (TAU.ln() + z * z) - self.sigma.ln()
        }
    }

    /// Log-normal with positive support and a log/exp bijection to the
    /// real line, for exercising link/unlink and `FromUniform`.
    #[derive(Debug, Clone, Copy)]
    pub struct LogNormal {
        pub mu: f64,
        pub sigma: f64,
    }

    impl LogNormal {
        pub fn new(mu: f64, sigma: f64) -> Self {
            assert!(sigma > 0.);
            LogNormal { mu, sigma }
        }
    }

    struct LogTransform;

    static LOG_TRANSFORM: LogTransform = LogTransform;

    impl SupportTransform for LogTransform {
        fn to_unconstrained(&self, value: f64) -> f64 {
            value.ln()
        }

        fn from_unconstrained(&self, real: f64) -> f64 {
            real.exp()
        }

        fn log_abs_det_jacobian(&self, value: f64) -> f64 {
            -value.ln()
        }
    }

    impl Distribution for LogNormal {
        fn draw(&self, rng: &mut dyn RngCore) -> f64 {
            rand_distr::LogNormal::new(self.mu, self.sigma)
                .expect("sigma is checked in the constructor")
                .sample(rng)
        }

        fn logp(&self, value: f64) -> f64 {
            let z = (value.ln() - self.mu) / self.sigma;
            -0.5 * (TAU.ln() + z * z) - self.sigma.ln() - value.ln()
        }

        fn transform(&self) -> Option<&dyn SupportTransform> {
            Some(&LOG_TRANSFORM)
        }
    }
}
