//! Hamiltonian Monte Carlo over the latent sites of a probabilistic program.
//!
//! A program builds its random variables through an [`intercept::Trace`].
//! A [`intercept::Selector`] decides which sites take their value from the
//! sampler's position (latent) and which from observed data. The
//! [`target::TargetLogProb`] built from the two is the unnormalized
//! log-joint density that [`hmc::HmcKernel`] samples.
//!
//! ```
//! use rvhmc_core::distributions::Normal;
//! use rvhmc_core::error::Result;
//! use rvhmc_core::graph::NodeId;
//! use rvhmc_core::hmc::HmcConfig;
//! use rvhmc_core::intercept::{NameSelector, Observations, Trace};
//! use rvhmc_core::sampler::hmc;
//! use rvhmc_core::value::{Shape, Value};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! fn model(t: &mut Trace<'_>) -> Result<Vec<NodeId>> {
//!     let mu = t.sample("mu", Normal::new(0.0, 1.0)?, &[], Shape::Scalar)?;
//!     let loc = t.scalar(mu)?;
//!     let x = t.sample("x", Normal::new(loc, 1.0)?, &[mu], Shape::Vector(3))?;
//!     Ok(vec![x])
//! }
//!
//! let selector = NameSelector::new().latent("mu", 0).data("x", "x_data");
//! let mut observations = Observations::new();
//! observations.insert("x_data".into(), Value::Vector(vec![0.4, 1.1, 0.8]));
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//! let config = HmcConfig { step_size: 0.2, num_leapfrog_steps: 5 };
//! let mut state = vec![Value::Scalar(0.0)];
//! let mut last = None;
//! for _ in 0..100 {
//!     let result = hmc(
//!         &model,
//!         &selector,
//!         &state,
//!         &observations,
//!         &config,
//!         last.as_ref().map(rvhmc_core::hmc::KernelResults::cache),
//!         &mut rng,
//!     )?;
//!     state = result.state.clone();
//!     last = Some(result);
//! }
//! # Ok::<(), rvhmc_core::error::HmcError>(())
//! ```

pub mod autodiff;
pub mod distributions;
pub mod error;
pub mod graph;
pub mod hmc;
pub mod intercept;
pub mod leapfrog;
pub mod metropolis;
pub mod random;
pub mod sampler;
pub mod target;
pub mod value;

pub use error::{HmcError, Result};
