use crate::value::Value;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Source of the two kinds of draws a transition needs.
///
/// Any seeded [`rand::Rng`] qualifies. Independent chains must each own a
/// separately seeded source.
pub trait RandomSource {
    /// Uniform draw in `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Standard-normal draw.
    fn standard_normal(&mut self) -> f64;

    /// Standard-normal value with the same shape as `like`.
    fn normal_like(&mut self, like: &Value) -> Value {
        let mut out = like.zeros_like();
        for x in out.as_mut_slice() {
            *x = self.standard_normal();
        }
        out
    }
}

impl<R: Rng> RandomSource for R {
    fn uniform(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn standard_normal(&mut self) -> f64 {
        StandardNormal.sample(self)
    }
}
