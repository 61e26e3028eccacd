use crate::autodiff::{check_finite, CentralDifference, Gradient};
use crate::error::{HmcError, Result};
use crate::leapfrog::{self, check_step};
use crate::metropolis::{self, HamiltonianState};
use crate::random::RandomSource;
use crate::target::LogDensity;
use crate::value::{ensure_same_shapes, Value};
use log::debug;

/// Configuration for the HMC kernel. Both values are fixed for the run.
#[derive(Debug, Clone)]
pub struct HmcConfig {
    pub step_size: f64,
    pub num_leapfrog_steps: usize,
}

impl Default for HmcConfig {
    fn default() -> Self {
        Self {
            step_size: 0.25,
            num_leapfrog_steps: 2,
        }
    }
}

impl HmcConfig {
    pub fn validate(&self) -> Result<()> {
        check_step(self.step_size, self.num_leapfrog_steps)
    }
}

/// Log-density and gradient at the current state, carried by the caller from
/// one step to the next to skip re-evaluating them.
#[derive(Debug, Clone, Copy)]
pub struct TargetCache<'a> {
    pub log_prob: f64,
    pub grad: &'a [Value],
}

/// Outcome of one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelResults {
    /// New state: the proposal if accepted, the input state otherwise.
    pub state: Vec<Value>,
    pub log_prob: f64,
    pub grad: Vec<Value>,
    pub accepted: bool,
    pub accept_probability: f64,
    pub log_accept_ratio: f64,
    /// Log-density at the end of the trajectory, accepted or not.
    pub proposed_log_prob: f64,
}

impl KernelResults {
    /// Cache to pass to the next call of [`HmcKernel::step`].
    pub fn cache(&self) -> TargetCache<'_> {
        TargetCache {
            log_prob: self.log_prob,
            grad: &self.grad,
        }
    }
}

/// One Hamiltonian Monte Carlo transition with unit mass.
///
/// The kernel holds no state between calls; the only thing carried over is
/// the optional [`TargetCache`] the caller passes back in.
#[derive(Debug, Clone)]
pub struct HmcKernel<G = CentralDifference> {
    config: HmcConfig,
    gradient: G,
}

impl HmcKernel<CentralDifference> {
    pub fn new(config: HmcConfig) -> Result<Self> {
        Self::with_gradient(config, CentralDifference::default())
    }
}

impl<G: Gradient> HmcKernel<G> {
    pub fn with_gradient(config: HmcConfig, gradient: G) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, gradient })
    }

    /// Advances `state` by one transition.
    ///
    /// Draws momentum from `rng`, integrates the leapfrog trajectory, and
    /// applies the Metropolis correction with one more draw. Any error aborts
    /// the transition; nothing is retried.
    pub fn step<R>(
        &self,
        target: &dyn LogDensity,
        state: &[Value],
        cache: Option<TargetCache<'_>>,
        rng: &mut R,
    ) -> Result<KernelResults>
    where
        R: RandomSource + ?Sized,
    {
        let (log_prob, grad) = match cache {
            Some(c) => {
                ensure_same_shapes(state, c.grad, "cached gradient")?;
                if !c.log_prob.is_finite() {
                    return Err(HmcError::Numeric(format!(
                        "cached log-probability is {}",
                        c.log_prob
                    )));
                }
                check_finite(c.grad)?;
                (c.log_prob, c.grad.to_vec())
            }
            None => self.gradient.value_and_gradient(target, state)?,
        };
        ensure_same_shapes(state, &grad, "gradient")?;

        let momentum: Vec<Value> = state.iter().map(|slot| rng.normal_like(slot)).collect();
        let initial = HamiltonianState {
            position: state.to_vec(),
            momentum,
            log_prob,
            grad,
        };

        let end = leapfrog::integrate(
            &initial.position,
            &initial.momentum,
            &initial.grad,
            self.config.step_size,
            self.config.num_leapfrog_steps,
            |q| self.gradient.value_and_gradient(target, q),
        )?;
        let proposed = HamiltonianState {
            position: end.position,
            momentum: end.momentum,
            log_prob: end.log_prob,
            grad: end.grad,
        };
        let proposed_log_prob = proposed.log_prob;

        let outcome = metropolis::accept(&initial, &proposed, rng);
        debug!(
            "hmc step: log_prob {:.6} -> {:.6} ({})",
            initial.log_prob,
            proposed_log_prob,
            if outcome.accepted { "accepted" } else { "rejected" }
        );

        Ok(KernelResults {
            state: outcome.state.position,
            log_prob: outcome.state.log_prob,
            grad: outcome.state.grad,
            accepted: outcome.accepted,
            accept_probability: outcome.accept_probability,
            log_accept_ratio: outcome.log_accept_ratio,
            proposed_log_prob,
        })
    }
}
