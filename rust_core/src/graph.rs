use crate::distributions::Distribution;
use crate::error::{HmcError, Result};
use crate::value::Value;
use std::collections::HashMap;

/// Index of a node in the arena of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// How a site's value was decided during interception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRole {
    /// Constructed normally; recorded but never scored.
    None,
    /// Substituted from the given position slot; scored.
    Latent(usize),
    /// Substituted from the observation with the given key; scored.
    Data(String),
}

impl SlotRole {
    pub fn is_scored(&self) -> bool {
        !matches!(self, SlotRole::None)
    }
}

/// One sampled or observed site.
#[derive(Debug)]
pub struct RandomVariable {
    pub id: NodeId,
    pub name: String,
    pub value: Value,
    pub role: SlotRole,
    /// Declared parents, in the order the program listed them.
    pub parents: Vec<NodeId>,
    distribution: Box<dyn Distribution>,
}

impl RandomVariable {
    /// Element-wise log-density of this node's own value.
    pub fn log_prob(&self) -> Value {
        self.distribution.log_prob(&self.value)
    }
}

/// Arena of the nodes constructed during one program execution.
///
/// Nodes are stored in construction order and parent edges are arena
/// indices. A graph lives for one density evaluation and is then dropped.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<RandomVariable>,
    name_to_node: HashMap<String, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node. Names must be unique and parents must already exist.
    pub fn add_node(
        &mut self,
        name: &str,
        value: Value,
        role: SlotRole,
        parents: &[NodeId],
        distribution: Box<dyn Distribution>,
    ) -> Result<NodeId> {
        if self.name_to_node.contains_key(name) {
            return Err(HmcError::Configuration(format!(
                "site `{name}` constructed twice in one execution"
            )));
        }
        if let Some(p) = parents.iter().find(|p| p.0 >= self.nodes.len()) {
            return Err(HmcError::Configuration(format!(
                "site `{name}` declares unknown parent {}",
                p.0
            )));
        }
        let id = NodeId(self.nodes.len());
        self.name_to_node.insert(name.to_string(), id);
        self.nodes.push(RandomVariable {
            id,
            name: name.to_string(),
            value,
            role,
            parents: parents.to_vec(),
            distribution,
        });
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&RandomVariable> {
        self.nodes.get(id.0)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.name_to_node.get(name).copied()
    }

    /// All nodes, in construction order.
    pub fn nodes(&self) -> &[RandomVariable] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn get(&self, id: NodeId) -> Result<&RandomVariable> {
        self.nodes.get(id.0).ok_or_else(|| {
            HmcError::Configuration(format!("node {} is not in this execution", id.0))
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Orders the roots and all their ancestors so that every node follows its
/// parents.
///
/// Depth-first from each root in the order given, visiting parents in their
/// declared order and emitting a node once all its parents are emitted. Each
/// node appears once. Nodes that are not ancestors of any root are left out.
pub fn toposort(graph: &Graph, roots: &[NodeId]) -> Result<Vec<NodeId>> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut order = Vec::with_capacity(graph.len());
    // (node, index of the next parent to visit)
    let mut stack: Vec<(NodeId, usize)> = Vec::new();

    for &root in roots {
        graph.get(root)?;
        if marks[root.0] != Mark::Unvisited {
            continue;
        }
        marks[root.0] = Mark::OnStack;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let (id, next) = *top;
            top.1 += 1;
            let node = graph.get(id)?;
            if let Some(&parent) = node.parents.get(next) {
                graph.get(parent)?;
                match marks[parent.0] {
                    Mark::Unvisited => {
                        marks[parent.0] = Mark::OnStack;
                        stack.push((parent, 0));
                    }
                    Mark::OnStack => {
                        return Err(HmcError::Cycle(graph.get(parent)?.name.clone()));
                    }
                    Mark::Done => {}
                }
            } else {
                marks[id.0] = Mark::Done;
                order.push(id);
                stack.pop();
            }
        }
    }

    Ok(order)
}
