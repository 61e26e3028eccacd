use crate::error::{HmcError, Result};
use crate::value::{Shape, Value};
use rand::RngCore;
use rand_distr::Distribution as RandDistribution;
use std::f64::consts::TAU;
use std::fmt::Debug;

/// The log-probability contract a site's distribution must satisfy.
///
/// Parameters are fixed at construction; a site whose parameters depend on
/// other sites reads their values from the trace before building its
/// distribution.
pub trait Distribution: Debug {
    /// Element-wise log-density of `value`, same shape as `value`.
    fn log_prob(&self, value: &Value) -> Value;

    /// Draws a value of the given shape.
    fn sample(&self, rng: &mut dyn RngCore, shape: Shape) -> Value;
}

fn draw(shape: Shape, mut next: impl FnMut() -> f64) -> Value {
    match shape {
        Shape::Scalar => Value::Scalar(next()),
        Shape::Vector(n) => Value::Vector((0..n).map(|_| next()).collect()),
    }
}

fn check_scale(family: &str, scale: f64) -> Result<()> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(HmcError::Numeric(format!(
            "{family} scale must be positive and finite, got {scale}"
        )));
    }
    Ok(())
}

// ── Normal ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Normal {
    loc: f64,
    scale: f64,
    sampler: rand_distr::Normal<f64>,
}

impl Normal {
    pub fn new(loc: f64, scale: f64) -> Result<Self> {
        check_scale("normal", scale)?;
        if !loc.is_finite() {
            return Err(HmcError::Numeric(format!(
                "normal loc must be finite, got {loc}"
            )));
        }
        let sampler = rand_distr::Normal::new(loc, scale)
            .map_err(|e| HmcError::Numeric(format!("normal: {e}")))?;
        Ok(Self {
            loc,
            scale,
            sampler,
        })
    }
}

impl Distribution for Normal {
    fn log_prob(&self, value: &Value) -> Value {
        let log_norm = -self.scale.ln() - 0.5 * TAU.ln();
        value.map(|x| {
            let z = (x - self.loc) / self.scale;
            -0.5 * z * z + log_norm
        })
    }

    fn sample(&self, rng: &mut dyn RngCore, shape: Shape) -> Value {
        draw(shape, || self.sampler.sample(&mut *rng))
    }
}

// ── HalfNormal (x ≥ 0) ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HalfNormal {
    scale: f64,
    sampler: rand_distr::Normal<f64>,
}

impl HalfNormal {
    pub fn new(scale: f64) -> Result<Self> {
        check_scale("half-normal", scale)?;
        let sampler = rand_distr::Normal::new(0.0, scale)
            .map_err(|e| HmcError::Numeric(format!("half-normal: {e}")))?;
        Ok(Self { scale, sampler })
    }
}

impl Distribution for HalfNormal {
    fn log_prob(&self, value: &Value) -> Value {
        let log_norm = 2.0f64.ln() - self.scale.ln() - 0.5 * TAU.ln();
        value.map(|x| {
            if x < 0.0 {
                f64::NEG_INFINITY
            } else {
                let z = x / self.scale;
                -0.5 * z * z + log_norm
            }
        })
    }

    fn sample(&self, rng: &mut dyn RngCore, shape: Shape) -> Value {
        draw(shape, || self.sampler.sample(&mut *rng).abs())
    }
}

// ── Uniform (low ≤ x ≤ high) ────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Uniform {
    low: f64,
    high: f64,
}

impl Uniform {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(HmcError::Numeric(format!(
                "uniform bounds must be finite with low < high, got [{low}, {high}]"
            )));
        }
        Ok(Self { low, high })
    }
}

impl Distribution for Uniform {
    fn log_prob(&self, value: &Value) -> Value {
        let log_density = -(self.high - self.low).ln();
        value.map(|x| {
            if x < self.low || x > self.high {
                f64::NEG_INFINITY
            } else {
                log_density
            }
        })
    }

    fn sample(&self, rng: &mut dyn RngCore, shape: Shape) -> Value {
        let sampler = rand_distr::Uniform::new(self.low, self.high);
        draw(shape, || sampler.sample(&mut *rng))
    }
}
