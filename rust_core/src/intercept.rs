//! Explicit interception of a program's sampling sites.
//!
//! A program receives a [`Trace`] and constructs every random variable
//! through [`Trace::sample`]. The trace consults the [`Selector`] for each
//! site name and either substitutes a position slot (latent), substitutes an
//! observation (data), or draws the value from the site's distribution
//! (unscored). Every constructed node is recorded in the execution's
//! [`Graph`] in construction order.

use crate::distributions::Distribution;
use crate::error::{HmcError, Result};
use crate::graph::{Graph, NodeId, SlotRole};
use crate::value::{Shape, Value};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Observed values keyed by the names [`Selector::align_data`] returns.
pub type Observations = HashMap<String, Value>;

/// Maps site names to latent slots or observation keys.
pub trait Selector {
    /// Position slot substituted at this site, if any.
    fn align_latent(&self, name: &str) -> Option<usize>;

    /// Observation key substituted at this site, if any.
    fn align_data(&self, name: &str) -> Option<String>;

    /// Resolves a site's role. A name matched by both sides is an error.
    fn role(&self, name: &str) -> Result<SlotRole> {
        match (self.align_latent(name), self.align_data(name)) {
            (Some(slot), Some(key)) => Err(HmcError::Configuration(format!(
                "site `{name}` is aligned to latent slot {slot} and to data `{key}`"
            ))),
            (Some(slot), None) => Ok(SlotRole::Latent(slot)),
            (None, Some(key)) => Ok(SlotRole::Data(key)),
            (None, None) => Ok(SlotRole::None),
        }
    }
}

/// Table-driven selector.
///
/// ```
/// use rvhmc_core::intercept::NameSelector;
/// let selector = NameSelector::new().latent("mu", 0).data("x", "x_data");
/// ```
#[derive(Debug, Clone, Default)]
pub struct NameSelector {
    latent: HashMap<String, usize>,
    data: HashMap<String, String>,
}

impl NameSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latent(mut self, site: &str, slot: usize) -> Self {
        self.latent.insert(site.to_string(), slot);
        self
    }

    pub fn data(mut self, site: &str, key: &str) -> Self {
        self.data.insert(site.to_string(), key.to_string());
        self
    }
}

impl Selector for NameSelector {
    fn align_latent(&self, name: &str) -> Option<usize> {
        self.latent.get(name).copied()
    }

    fn align_data(&self, name: &str) -> Option<String> {
        self.data.get(name).cloned()
    }
}

/// Selector built from two plain functions.
pub struct FnSelector<L, D> {
    pub align_latent: L,
    pub align_data: D,
}

impl<L, D> Selector for FnSelector<L, D>
where
    L: Fn(&str) -> Option<usize>,
    D: Fn(&str) -> Option<String>,
{
    fn align_latent(&self, name: &str) -> Option<usize> {
        (self.align_latent)(name)
    }

    fn align_data(&self, name: &str) -> Option<String> {
        (self.align_data)(name)
    }
}

/// A deterministic model: constructs its sites through the trace and returns
/// its terminal node(s).
pub trait ProgramTemplate {
    fn run(&self, trace: &mut Trace<'_>) -> Result<Vec<NodeId>>;
}

impl<F> ProgramTemplate for F
where
    F: Fn(&mut Trace<'_>) -> Result<Vec<NodeId>>,
{
    fn run(&self, trace: &mut Trace<'_>) -> Result<Vec<NodeId>> {
        self(trace)
    }
}

/// Substitution context handed to a program for one execution.
pub struct Trace<'a> {
    graph: Graph,
    selector: &'a dyn Selector,
    latent: &'a [Value],
    observations: &'a Observations,
    /// Site that consumed each latent slot.
    consumed: Vec<Option<NodeId>>,
    rng: ChaCha8Rng,
}

impl<'a> Trace<'a> {
    fn new(
        selector: &'a dyn Selector,
        latent: &'a [Value],
        observations: &'a Observations,
        forward_seed: u64,
    ) -> Self {
        Self {
            graph: Graph::new(),
            selector,
            latent,
            observations,
            consumed: vec![None; latent.len()],
            rng: ChaCha8Rng::seed_from_u64(forward_seed),
        }
    }

    /// Constructs the site `name` with the given distribution.
    ///
    /// `parents` are the sites whose values the distribution's parameters
    /// were computed from; `shape` is the shape of a value drawn for an
    /// unscored site and the shape substituted values must have.
    pub fn sample<D>(
        &mut self,
        name: &str,
        distribution: D,
        parents: &[NodeId],
        shape: Shape,
    ) -> Result<NodeId>
    where
        D: Distribution + 'static,
    {
        let role = self.selector.role(name)?;
        let value = match &role {
            SlotRole::Latent(slot) => {
                let value = self.latent.get(*slot).ok_or_else(|| {
                    HmcError::Configuration(format!(
                        "site `{name}` is aligned to slot {slot} but the state has {} slots",
                        self.latent.len()
                    ))
                })?;
                if let Some(prev) = self.consumed[*slot] {
                    let prev_name = self.graph.node(prev).map(|n| n.name.as_str());
                    return Err(HmcError::Configuration(format!(
                        "sites `{}` and `{name}` are both aligned to slot {slot}",
                        prev_name.unwrap_or("?")
                    )));
                }
                check_shape(name, value, shape)?;
                value.clone()
            }
            SlotRole::Data(key) => {
                let value = self.observations.get(key).ok_or_else(|| {
                    HmcError::Configuration(format!(
                        "site `{name}` is aligned to data `{key}`, which was not supplied"
                    ))
                })?;
                check_shape(name, value, shape)?;
                value.clone()
            }
            SlotRole::None => distribution.sample(&mut self.rng, shape),
        };

        let slot = match role {
            SlotRole::Latent(slot) => Some(slot),
            _ => None,
        };
        let id = self
            .graph
            .add_node(name, value, role, parents, Box::new(distribution))?;
        if let Some(slot) = slot {
            self.consumed[slot] = Some(id);
        }
        Ok(id)
    }

    pub fn value(&self, id: NodeId) -> Result<&Value> {
        self.graph
            .node(id)
            .map(|n| &n.value)
            .ok_or_else(|| HmcError::Configuration(format!("unknown node {}", id.0)))
    }

    /// Value of a scalar site.
    pub fn scalar(&self, id: NodeId) -> Result<f64> {
        self.value(id)?.as_scalar()
    }
}

fn check_shape(name: &str, value: &Value, shape: Shape) -> Result<()> {
    if value.shape() != shape {
        return Err(HmcError::Configuration(format!(
            "site `{name}` declares shape {shape:?} but was given {:?}",
            value.shape()
        )));
    }
    Ok(())
}

/// Output of one intercepted execution.
#[derive(Debug)]
pub struct Execution {
    /// Terminal node(s) the program returned.
    pub outputs: Vec<NodeId>,
    /// Every node constructed, in construction order.
    pub graph: Graph,
}

/// Runs `program` once with `latent[slot]` substituted at latent-aligned
/// sites and `observations[key]` at data-aligned sites.
///
/// Every slot of `latent` must be consumed by exactly one site. Unscored
/// sites draw from a generator seeded with `forward_seed`, so identical
/// inputs give identical executions.
pub fn execute<P>(
    program: &P,
    latent: &[Value],
    selector: &dyn Selector,
    observations: &Observations,
    forward_seed: u64,
) -> Result<Execution>
where
    P: ProgramTemplate + ?Sized,
{
    let mut trace = Trace::new(selector, latent, observations, forward_seed);
    let outputs = program.run(&mut trace)?;

    if let Some(slot) = trace.consumed.iter().position(Option::is_none) {
        return Err(HmcError::Configuration(format!(
            "state slot {slot} is not aligned to any site"
        )));
    }

    Ok(Execution {
        outputs,
        graph: trace.graph,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Normal;

    fn model(t: &mut Trace<'_>) -> Result<Vec<NodeId>> {
        let mu = t.sample("mu", Normal::new(0.0, 1.0)?, &[], Shape::Scalar)?;
        let loc = t.scalar(mu)?;
        let x = t.sample("x", Normal::new(loc, 1.0)?, &[mu], Shape::Vector(3))?;
        Ok(vec![x])
    }

    fn observations() -> Observations {
        let mut obs = Observations::new();
        obs.insert("x_data".to_string(), Value::Vector(vec![0.5, 1.0, 1.5]));
        obs
    }

    #[test]
    fn substitutes_latent_and_data_sites() {
        let selector = NameSelector::new().latent("mu", 0).data("x", "x_data");
        let obs = observations();
        let exec = execute(&model, &[Value::Scalar(0.7)], &selector, &obs, 0).unwrap();

        let g = &exec.graph;
        assert_eq!(g.len(), 2);
        let mu = g.node(g.node_by_name("mu").unwrap()).unwrap();
        assert_eq!(mu.value, Value::Scalar(0.7));
        assert_eq!(mu.role, SlotRole::Latent(0));
        let x = g.node(exec.outputs[0]).unwrap();
        assert_eq!(x.value, obs["x_data"]);
        assert_eq!(x.role, SlotRole::Data("x_data".to_string()));
        assert_eq!(x.parents, vec![mu.id]);
    }

    #[test]
    fn unaligned_sites_are_forward_sampled_reproducibly() {
        let selector = NameSelector::new().latent("mu", 0);
        let obs = Observations::new();
        let a = execute(&model, &[Value::Scalar(0.0)], &selector, &obs, 3).unwrap();
        let b = execute(&model, &[Value::Scalar(0.0)], &selector, &obs, 3).unwrap();
        let xa = a.graph.node(a.outputs[0]).unwrap();
        let xb = b.graph.node(b.outputs[0]).unwrap();
        assert_eq!(xa.role, SlotRole::None);
        assert_eq!(xa.value.shape(), Shape::Vector(3));
        assert_eq!(xa.value, xb.value);
    }

    #[test]
    fn name_matched_by_both_selectors_is_rejected() {
        let selector = NameSelector::new()
            .latent("mu", 0)
            .data("mu", "mu_data")
            .data("x", "x_data");
        let mut obs = observations();
        obs.insert("mu_data".to_string(), Value::Scalar(0.0));
        for _ in 0..2 {
            let err = execute(&model, &[Value::Scalar(0.0)], &selector, &obs, 0).unwrap_err();
            assert!(matches!(err, HmcError::Configuration(_)));
        }
    }

    #[test]
    fn function_selectors_work_like_tables() {
        let selector = FnSelector {
            align_latent: |name: &str| (name == "mu").then_some(0usize),
            align_data: |name: &str| (name == "x").then(|| "x_data".to_string()),
        };
        let obs = observations();
        let exec = execute(&model, &[Value::Scalar(0.1)], &selector, &obs, 0).unwrap();
        let x = exec.graph.node(exec.outputs[0]).unwrap();
        assert!(x.role.is_scored());
    }

    #[test]
    fn missing_observation_is_rejected() {
        let selector = NameSelector::new().latent("mu", 0).data("x", "nope");
        let err = execute(&model, &[Value::Scalar(0.0)], &selector, &observations(), 0)
            .unwrap_err();
        assert!(matches!(err, HmcError::Configuration(_)));
    }

    #[test]
    fn slot_mapping_must_be_complete_and_unambiguous() {
        let selector = NameSelector::new().latent("mu", 1);
        let obs = Observations::new();
        // slot 1 does not exist
        assert!(execute(&model, &[Value::Scalar(0.0)], &selector, &obs, 0).is_err());
        // slot 0 is never consumed
        let two = [Value::Scalar(0.0), Value::Scalar(0.0)];
        assert!(execute(&model, &two, &selector, &obs, 0).is_err());

        let both = NameSelector::new().latent("mu", 0).latent("x", 0);
        let err = execute(&model, &[Value::Scalar(0.0)], &both, &obs, 0).unwrap_err();
        assert!(matches!(err, HmcError::Configuration(_)));
    }

    #[test]
    fn substituted_shape_must_match_site() {
        let selector = NameSelector::new().latent("mu", 0);
        let err = execute(&model, &[Value::Vector(vec![0.0, 1.0])], &selector, &Observations::new(), 0)
            .unwrap_err();
        assert!(matches!(err, HmcError::Configuration(_)));
    }
}
