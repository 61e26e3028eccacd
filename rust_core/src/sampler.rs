use crate::autodiff::Gradient;
use crate::error::Result;
use crate::hmc::{HmcConfig, HmcKernel, KernelResults, TargetCache};
use crate::intercept::{Observations, ProgramTemplate, Selector};
use crate::random::RandomSource;
use crate::target::{LogDensity, TargetLogProb};
use crate::value::Value;
use log::info;

/// One HMC transition on the latent sites of `program`.
///
/// `state` holds one value per latent slot, in the slot order `selector`
/// assigns. Data-aligned sites take their values from `observations`. Pass
/// the previous call's [`KernelResults::cache`] as `cache` to skip
/// re-evaluating the density at `state`.
pub fn hmc<P, R>(
    program: &P,
    selector: &dyn Selector,
    state: &[Value],
    observations: &Observations,
    config: &HmcConfig,
    cache: Option<TargetCache<'_>>,
    rng: &mut R,
) -> Result<KernelResults>
where
    P: ProgramTemplate + ?Sized,
    R: RandomSource + ?Sized,
{
    let kernel = HmcKernel::new(config.clone())?;
    hmc_with_kernel(&kernel, program, selector, state, observations, 0, cache, rng)
}

/// [`hmc`] with a caller-built kernel, which fixes the gradient capability,
/// and an explicit seed for the forward-sampled (unaligned) sites.
#[allow(clippy::too_many_arguments)]
pub fn hmc_with_kernel<G, P, R>(
    kernel: &HmcKernel<G>,
    program: &P,
    selector: &dyn Selector,
    state: &[Value],
    observations: &Observations,
    forward_seed: u64,
    cache: Option<TargetCache<'_>>,
    rng: &mut R,
) -> Result<KernelResults>
where
    G: Gradient,
    P: ProgramTemplate + ?Sized,
    R: RandomSource + ?Sized,
{
    let target =
        TargetLogProb::new(program, selector, observations).with_forward_seed(forward_seed);
    kernel.step(&target, state, cache, rng)
}

/// Configuration for [`run_chain`].
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub num_draws: usize,
    pub num_burnin: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            num_draws: 1000,
            num_burnin: 500,
        }
    }
}

/// Draws collected by [`run_chain`].
#[derive(Debug, Clone)]
pub struct ChainResult {
    /// samples[draw][slot]
    pub samples: Vec<Vec<Value>>,
    /// Fraction of accepted transitions, burn-in included.
    pub accept_rate: f64,
}

impl ChainResult {
    /// Element-wise posterior mean per slot.
    pub fn mean(&self) -> Vec<Value> {
        let Some(first) = self.samples.first() else {
            return Vec::new();
        };
        let n = self.samples.len() as f64;
        let mut sums: Vec<Value> = first.iter().map(Value::zeros_like).collect();
        for draw in &self.samples {
            for (s, v) in sums.iter_mut().zip(draw) {
                for (a, b) in s.as_mut_slice().iter_mut().zip(v.as_slice()) {
                    *a += b;
                }
            }
        }
        sums.iter().map(|s| s.map(|x| x / n)).collect()
    }

    /// Element-wise posterior variance per slot (divides by the draw count).
    pub fn variance(&self) -> Vec<Value> {
        let means = self.mean();
        let n = self.samples.len() as f64;
        let mut sum_sq: Vec<Value> = means.iter().map(Value::zeros_like).collect();
        for draw in &self.samples {
            for ((s, v), m) in sum_sq.iter_mut().zip(draw).zip(&means) {
                let elems = s.as_mut_slice().iter_mut().zip(v.as_slice());
                for ((a, b), c) in elems.zip(m.as_slice()) {
                    let diff = b - c;
                    *a += diff * diff;
                }
            }
        }
        sum_sq.iter().map(|s| s.map(|x| x / n)).collect()
    }
}

/// Runs one chain from `init`, threading the log-prob/grad cache between
/// steps. The first error stops the chain and is returned.
pub fn run_chain<G, R>(
    kernel: &HmcKernel<G>,
    target: &dyn LogDensity,
    init: Vec<Value>,
    config: &ChainConfig,
    rng: &mut R,
) -> Result<ChainResult>
where
    G: Gradient,
    R: RandomSource + ?Sized,
{
    let total_iters = config.num_burnin + config.num_draws;
    let mut samples = Vec::with_capacity(config.num_draws);
    let mut accepted = 0usize;

    let mut state = init;
    let mut last: Option<KernelResults> = None;

    for iter in 0..total_iters {
        let cache = last.as_ref().map(KernelResults::cache);
        let result = kernel.step(target, &state, cache, &mut *rng)?;
        if result.accepted {
            accepted += 1;
        }
        state.clone_from(&result.state);
        if iter >= config.num_burnin {
            samples.push(state.clone());
        }
        last = Some(result);
    }

    let accept_rate = if total_iters > 0 {
        accepted as f64 / total_iters as f64
    } else {
        0.0
    };
    info!(
        "chain finished: {} draws after {} burn-in, accept rate {:.3}",
        config.num_draws, config.num_burnin, accept_rate
    );

    Ok(ChainResult {
        samples,
        accept_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::AnalyticGradient;
    use crate::distributions::Normal;
    use crate::error::HmcError;
    use crate::graph::NodeId;
    use crate::intercept::{NameSelector, Trace};
    use crate::value::Shape;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn model(t: &mut Trace<'_>) -> Result<Vec<NodeId>> {
        let mu = t.sample("mu", Normal::new(0.0, 1.0)?, &[], Shape::Scalar)?;
        let loc = t.scalar(mu)?;
        let x = t.sample("x", Normal::new(loc, 1.0)?, &[mu], Shape::Vector(3))?;
        Ok(vec![x])
    }

    fn observations() -> Observations {
        let mut obs = Observations::new();
        obs.insert("x_data".to_string(), Value::Vector(vec![0.2, 0.9, 1.3]));
        obs
    }

    #[test]
    fn entry_point_is_reproducible_for_a_seed() {
        let selector = NameSelector::new().latent("mu", 0).data("x", "x_data");
        let obs = observations();
        let config = HmcConfig::default();
        let state = [Value::Scalar(0.5)];

        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            hmc(&model, &selector, &state, &obs, &config, None, &mut rng).unwrap()
        };
        let a = run(9);
        let b = run(9);
        assert_eq!(a, b);
        assert_eq!(a.state[0].shape(), Shape::Scalar);
    }

    // x ~ N(mu + z, 1) with z an unaligned site
    fn nuisance_model(t: &mut Trace<'_>) -> Result<Vec<NodeId>> {
        let mu = t.sample("mu", Normal::new(0.0, 1.0)?, &[], Shape::Scalar)?;
        let z = t.sample("z", Normal::new(0.0, 1.0)?, &[], Shape::Scalar)?;
        let loc = t.scalar(mu)? + t.scalar(z)?;
        let x = t.sample("x", Normal::new(loc, 1.0)?, &[mu, z], Shape::Vector(3))?;
        Ok(vec![x])
    }

    #[test]
    fn forward_seed_reaches_unaligned_sites() {
        let selector = NameSelector::new().latent("mu", 0).data("x", "x_data");
        let obs = observations();
        let config = HmcConfig::default();
        let kernel = HmcKernel::new(config.clone()).unwrap();
        let state = [Value::Scalar(0.5)];

        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(4);
            hmc_with_kernel(&kernel, &nuisance_model, &selector, &state, &obs, seed, None, &mut rng)
                .unwrap()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let default_seed =
            hmc(&nuisance_model, &selector, &state, &obs, &config, None, &mut rng).unwrap();

        assert_eq!(run(0), default_seed);
        assert_ne!(run(0).proposed_log_prob, run(7).proposed_log_prob);
    }

    #[test]
    fn entry_point_uses_the_kernel_gradient() {
        // d/dmu [log N(mu | 0, 1) + sum log N(x_i | mu, 1)] = 2.4 - 4 mu
        let grad_fn = AnalyticGradient(|q: &[Value]| -> Result<Vec<Value>> {
            Ok(vec![Value::Scalar(2.4 - 4.0 * q[0].as_scalar()?)])
        });
        let config = HmcConfig {
            step_size: 0.1,
            num_leapfrog_steps: 3,
        };
        let kernel = HmcKernel::with_gradient(config, grad_fn).unwrap();
        let selector = NameSelector::new().latent("mu", 0).data("x", "x_data");
        let obs = observations();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let out = hmc_with_kernel(
            &kernel,
            &model,
            &selector,
            &[Value::Scalar(-0.3)],
            &obs,
            0,
            None,
            &mut rng,
        )
        .unwrap();
        let mu = out.state[0].as_scalar().unwrap();
        assert_eq!(out.grad, vec![Value::Scalar(2.4 - 4.0 * mu)]);
    }

    #[test]
    fn entry_point_rejects_ambiguous_selector() {
        let selector = NameSelector::new().latent("x", 0).data("x", "x_data");
        let obs = observations();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = hmc(
            &model,
            &selector,
            &[Value::Vector(vec![0.0; 3])],
            &obs,
            &HmcConfig::default(),
            None,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, HmcError::Configuration(_)));
    }

    #[test]
    fn chain_collects_requested_draws() {
        let selector = NameSelector::new().latent("mu", 0).data("x", "x_data");
        let obs = observations();
        let target = TargetLogProb::new(&model, &selector, &obs);
        let kernel = HmcKernel::new(HmcConfig {
            step_size: 0.2,
            num_leapfrog_steps: 4,
        })
        .unwrap();
        let config = ChainConfig {
            num_draws: 50,
            num_burnin: 10,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result =
            run_chain(&kernel, &target, vec![Value::Scalar(0.0)], &config, &mut rng).unwrap();

        assert_eq!(result.samples.len(), 50);
        assert!(result.accept_rate > 0.5);
        assert_eq!(result.mean().len(), 1);
        assert!(result.variance()[0].as_scalar().unwrap() > 0.0);
    }

    #[test]
    fn summaries_are_elementwise() {
        let result = ChainResult {
            samples: vec![
                vec![Value::Vector(vec![1.0, 10.0])],
                vec![Value::Vector(vec![3.0, 10.0])],
            ],
            accept_rate: 1.0,
        };
        assert_eq!(result.mean(), vec![Value::Vector(vec![2.0, 10.0])]);
        assert_eq!(result.variance(), vec![Value::Vector(vec![1.0, 0.0])]);
    }
}
