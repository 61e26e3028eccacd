use crate::error::{HmcError, Result};

/// Shape of a site's value. Scalars and flat vectors cover every site the
/// kernel deals with; higher-rank tensors are stored flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Vector(usize),
}

impl Shape {
    /// Number of elements a value of this shape holds.
    pub fn len(&self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Vector(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Value held by a site, a position slot, a momentum slot or a gradient slot.
///
/// Scalars are kept apart from vectors so the common single-parameter case
/// never allocates.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    pub fn shape(&self) -> Shape {
        match self {
            Value::Scalar(_) => Shape::Scalar,
            Value::Vector(v) => Shape::Vector(v.len()),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Value::Scalar(v) => Ok(*v),
            Value::Vector(v) => Err(HmcError::Configuration(format!(
                "expected scalar, got vector of length {}",
                v.len()
            ))),
        }
    }

    /// Elements in storage order; a scalar is a one-element slice.
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Value::Scalar(v) => std::slice::from_ref(v),
            Value::Vector(v) => v,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        match self {
            Value::Scalar(v) => std::slice::from_mut(v),
            Value::Vector(v) => v,
        }
    }

    /// Zero-filled value with the same shape.
    pub fn zeros_like(&self) -> Value {
        self.map(|_| 0.0)
    }

    /// Element-wise map preserving shape.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(v) => Value::Scalar(f(*v)),
            Value::Vector(v) => Value::Vector(v.iter().map(|x| f(*x)).collect()),
        }
    }

    /// Sum of all elements, left to right.
    pub fn sum(&self) -> f64 {
        self.as_slice().iter().sum()
    }

    pub fn is_finite(&self) -> bool {
        self.as_slice().iter().all(|x| x.is_finite())
    }

    /// `self += alpha * other`, element-wise. Shapes must agree exactly.
    pub fn add_scaled(&mut self, other: &Value, alpha: f64) -> Result<()> {
        ensure_same_shape(self, other)?;
        for (a, b) in self.as_mut_slice().iter_mut().zip(other.as_slice()) {
            *a += alpha * b;
        }
        Ok(())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

pub(crate) fn ensure_same_shape(a: &Value, b: &Value) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(HmcError::Configuration(format!(
            "shape mismatch: {:?} vs {:?}",
            a.shape(),
            b.shape()
        )));
    }
    Ok(())
}

/// Checks that two slot lists have the same number of slots and matching
/// per-slot shapes.
pub(crate) fn ensure_same_shapes(a: &[Value], b: &[Value], what: &str) -> Result<()> {
    if a.len() != b.len() {
        return Err(HmcError::Configuration(format!(
            "{what}: expected {} slots, got {}",
            a.len(),
            b.len()
        )));
    }
    for (slot, (x, y)) in a.iter().zip(b).enumerate() {
        if x.shape() != y.shape() {
            return Err(HmcError::Configuration(format!(
                "{what}: slot {slot} has shape {:?}, expected {:?}",
                y.shape(),
                x.shape()
            )));
        }
    }
    Ok(())
}

/// `0.5 · Σ p²` over every element of every slot.
///
/// Slots are visited in position order and elements in storage order, summed
/// into one accumulator, so the result does not depend on how the state is
/// split into slots.
pub fn kinetic_energy(momentum: &[Value]) -> f64 {
    let sum_sq: f64 = momentum
        .iter()
        .flat_map(|slot| slot.as_slice().iter())
        .map(|p| p * p)
        .sum();
    0.5 * sum_sq
}
