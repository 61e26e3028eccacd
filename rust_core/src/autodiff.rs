//! Gradient capabilities for a [`LogDensity`].
//!
//! The kernel only needs `(log_prob, ∇log_prob)` at a position. How the
//! gradient is obtained is pluggable: [`CentralDifference`] works for any
//! density, [`AnalyticGradient`] wraps a hand-derived gradient.

use crate::error::{HmcError, Result};
use crate::target::LogDensity;
use crate::value::{ensure_same_shapes, Value};

pub trait Gradient {
    /// Log-density at `position` and its gradient, one value per slot with
    /// the slot's shape.
    fn value_and_gradient(
        &self,
        density: &dyn LogDensity,
        position: &[Value],
    ) -> Result<(f64, Vec<Value>)>;
}

/// Symmetric finite differences, one pair of evaluations per element.
///
/// The step for element `x` is `rel_step · max(1, |x|)`. When one side of
/// `x` falls outside the density's support the difference is taken one-sided
/// on the other.
#[derive(Debug, Clone, Copy)]
pub struct CentralDifference {
    pub rel_step: f64,
}

impl Default for CentralDifference {
    fn default() -> Self {
        Self { rel_step: 1e-6 }
    }
}

impl Gradient for CentralDifference {
    fn value_and_gradient(
        &self,
        density: &dyn LogDensity,
        position: &[Value],
    ) -> Result<(f64, Vec<Value>)> {
        let logp = density.log_prob(position)?;
        let mut nudged = position.to_vec();
        let mut grad: Vec<Value> = position.iter().map(Value::zeros_like).collect();

        for slot in 0..position.len() {
            for i in 0..position[slot].len() {
                let x = position[slot].as_slice()[i];
                let h = self.rel_step * x.abs().max(1.0);

                nudged[slot].as_mut_slice()[i] = x + h;
                let plus = nudged_log_prob(density, &nudged)?;
                nudged[slot].as_mut_slice()[i] = x - h;
                let minus = nudged_log_prob(density, &nudged)?;
                nudged[slot].as_mut_slice()[i] = x;

                grad[slot].as_mut_slice()[i] = match (plus, minus) {
                    (Some(plus), Some(minus)) => (plus - minus) / (2.0 * h),
                    (Some(plus), None) => (plus - logp) / h,
                    (None, Some(minus)) => (logp - minus) / h,
                    (None, None) => {
                        return Err(HmcError::Numeric(format!(
                            "log-probability is not finite within {h:e} on either side of \
                             slot {slot} element {i} at position {position:?}"
                        )))
                    }
                };
            }
        }

        check_finite(&grad)?;
        Ok((logp, grad))
    }
}

/// Log-density at a perturbed position, `None` outside the support.
fn nudged_log_prob(density: &dyn LogDensity, nudged: &[Value]) -> Result<Option<f64>> {
    match density.log_prob(nudged) {
        Ok(logp) if logp.is_finite() => Ok(Some(logp)),
        Ok(_) | Err(HmcError::Numeric(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Caller-supplied gradient function.
pub struct AnalyticGradient<F>(pub F);

impl<F> Gradient for AnalyticGradient<F>
where
    F: Fn(&[Value]) -> Result<Vec<Value>>,
{
    fn value_and_gradient(
        &self,
        density: &dyn LogDensity,
        position: &[Value],
    ) -> Result<(f64, Vec<Value>)> {
        let logp = density.log_prob(position)?;
        let grad = (self.0)(position)?;
        ensure_same_shapes(position, &grad, "gradient")?;
        check_finite(&grad)?;
        Ok((logp, grad))
    }
}

pub(crate) fn check_finite(grad: &[Value]) -> Result<()> {
    if let Some(slot) = grad.iter().position(|g| !g.is_finite()) {
        return Err(HmcError::Numeric(format!(
            "gradient slot {slot} is not finite: {:?}",
            grad[slot]
        )));
    }
    Ok(())
}
