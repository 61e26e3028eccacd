//! Störmer–Verlet (leapfrog) integration of Hamiltonian dynamics under unit
//! mass, applied to all position slots jointly.

use crate::error::{HmcError, Result};
use crate::value::{ensure_same_shapes, Value};

/// End point of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct LeapfrogOutput {
    pub position: Vec<Value>,
    pub momentum: Vec<Value>,
    pub log_prob: f64,
    pub grad: Vec<Value>,
}

/// Integrates `num_steps` leapfrog steps from `(position, momentum)`.
///
/// `grad` is the gradient of the log-density at `position`; `grad_fn`
/// returns `(log_prob, grad)` at a new position and is called once per step.
/// Inputs are not modified.
pub fn integrate<F>(
    position: &[Value],
    momentum: &[Value],
    grad: &[Value],
    step_size: f64,
    num_steps: usize,
    mut grad_fn: F,
) -> Result<LeapfrogOutput>
where
    F: FnMut(&[Value]) -> Result<(f64, Vec<Value>)>,
{
    check_step(step_size, num_steps)?;
    ensure_same_shapes(position, momentum, "momentum")?;
    ensure_same_shapes(position, grad, "gradient")?;

    let mut q = position.to_vec();
    let mut p = momentum.to_vec();

    add_scaled(&mut p, grad, 0.5 * step_size)?;

    let mut log_prob = f64::NAN;
    let mut g = Vec::new();
    for step in 0..num_steps {
        add_scaled(&mut q, &p, step_size)?;
        let (lp, new_grad) = grad_fn(&q)?;
        ensure_same_shapes(&q, &new_grad, "gradient")?;
        log_prob = lp;
        g = new_grad;
        if step + 1 < num_steps {
            add_scaled(&mut p, &g, step_size)?;
        }
    }

    add_scaled(&mut p, &g, 0.5 * step_size)?;

    Ok(LeapfrogOutput {
        position: q,
        momentum: p,
        log_prob,
        grad: g,
    })
}

pub(crate) fn check_step(step_size: f64, num_steps: usize) -> Result<()> {
    if !(step_size.is_finite() && step_size > 0.0) {
        return Err(HmcError::Configuration(format!(
            "step size must be positive and finite, got {step_size}"
        )));
    }
    if num_steps == 0 {
        return Err(HmcError::Configuration(
            "number of leapfrog steps must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn add_scaled(target: &mut [Value], other: &[Value], alpha: f64) -> Result<()> {
    for (t, o) in target.iter_mut().zip(other) {
        t.add_scaled(o, alpha)?;
    }
    Ok(())
}
