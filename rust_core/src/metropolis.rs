use crate::random::RandomSource;
use crate::value::{kinetic_energy, Value};
use log::debug;

/// A point in phase space together with the density evaluated there.
#[derive(Debug, Clone, PartialEq)]
pub struct HamiltonianState {
    pub position: Vec<Value>,
    pub momentum: Vec<Value>,
    pub log_prob: f64,
    pub grad: Vec<Value>,
}

impl HamiltonianState {
    /// `H = -log_prob + ½·Σ p²` with unit mass.
    pub fn hamiltonian(&self) -> f64 {
        -self.log_prob + kinetic_energy(&self.momentum)
    }
}

/// Result of the accept/reject test.
#[derive(Debug, Clone, PartialEq)]
pub struct MetropolisOutcome {
    /// The proposal if accepted, otherwise the initial state.
    pub state: HamiltonianState,
    pub accept_probability: f64,
    pub accepted: bool,
    /// `H_initial − H_proposed`.
    pub log_accept_ratio: f64,
}

/// Metropolis–Hastings correction between two phase-space points.
///
/// Draws one uniform `u` and accepts iff `u < min(1, exp(H₀ − H₁))`. A NaN
/// ratio is treated as probability zero.
pub fn accept<R>(
    initial: &HamiltonianState,
    proposed: &HamiltonianState,
    rng: &mut R,
) -> MetropolisOutcome
where
    R: RandomSource + ?Sized,
{
    let log_accept_ratio = initial.hamiltonian() - proposed.hamiltonian();
    let accept_probability = if log_accept_ratio.is_nan() {
        0.0
    } else {
        log_accept_ratio.min(0.0).exp()
    };

    let u = rng.uniform();
    let accepted = u < accept_probability;
    debug!(
        "metropolis: dH = {log_accept_ratio:.6}, p = {accept_probability:.4}, u = {u:.4}, {}",
        if accepted { "accepted" } else { "rejected" }
    );

    let state = if accepted {
        proposed.clone()
    } else {
        initial.clone()
    };

    MetropolisOutcome {
        state,
        accept_probability,
        accepted,
        log_accept_ratio,
    }
}
