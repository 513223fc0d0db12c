//! Shader graph model: explicit node/link tables addressed by stable ids.
//!
//! Nodes are kept in a plain table with monotonically assigned ids that are
//! never reused, so removals leave every other id valid. Links connect a
//! named output socket to a named input socket; each input socket accepts at
//! most one incoming link (`connect` replaces), fan-out is unbounded.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Stable identifier of a node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// Well-known socket names used by the node kinds the pipeline interprets.
pub mod socket {
    pub const COLOR: &str = "color";
    pub const STRENGTH: &str = "strength";
    pub const EMISSION: &str = "emission";
    pub const SURFACE: &str = "surface";
    pub const BSDF: &str = "bsdf";
    pub const ALPHA: &str = "alpha";
    pub const BASE_COLOR: &str = "baseColor";
    pub const EMISSION_COLOR: &str = "emissionColor";
}

/// Reference to an image a texture node samples from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageRef {
    /// Name of an image datablock owned by the scene.
    Named(String),
    /// Inline `data:image/...;base64,` payload.
    DataUrl(String),
}

/// Closed set of node kinds. Everything the pipeline does not interpret is
/// `Other` and passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Dedicated light-emitting shader.
    Emission { color: [f32; 4], strength: f32 },
    /// General-purpose physically-based surface; emission is one of its
    /// parameter pairs and can contribute light without an Emission node.
    #[serde(rename_all = "camelCase")]
    Principled {
        base_color: [f32; 4],
        emission_color: [f32; 4],
        emission_strength: f32,
        metallic: f32,
        roughness: f32,
    },
    /// Texture lookup bound to an image.
    ImageTexture { image: Option<ImageRef> },
    /// Terminal sink for the material's visible appearance.
    MaterialOutput,
    /// Uninterpreted node (mix shaders, math, attributes, ...).
    Other { label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub from: NodeId,
    pub from_socket: String,
    pub to: NodeId,
    pub to_socket: String,
}

/// Directed acyclic graph of shading nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderGraph {
    next_id: u32,
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl ShaderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node and return its id. Ids are never reused.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(Node { id, kind });
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove a node together with every link touching it. Returns false if
    /// the id was already gone.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return false;
        }
        self.links.retain(|l| l.from != id && l.to != id);
        true
    }

    /// Link an output socket to an input socket, replacing any link already
    /// feeding that input (input sockets have fan-in 1).
    pub fn connect(&mut self, from: NodeId, from_socket: &str, to: NodeId, to_socket: &str) {
        self.links
            .retain(|l| !(l.to == to && l.to_socket == to_socket));
        self.links.push(Link {
            from,
            from_socket: from_socket.to_string(),
            to,
            to_socket: to_socket.to_string(),
        });
    }

    /// The link currently feeding `to.to_socket`, if any.
    pub fn incoming(&self, to: NodeId, to_socket: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.to == to && l.to_socket == to_socket)
    }

    /// First surface output node in table order, the terminal sink for the
    /// material's visible appearance.
    pub fn surface_output(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::MaterialOutput))
            .map(|n| n.id)
    }

    /// All node ids that can reach `start` by following links forward,
    /// including `start` itself.
    pub fn upstream_reachable(&self, start: NodeId) -> HashSet<NodeId> {
        let mut incoming: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for l in &self.links {
            incoming.entry(l.to).or_default().push(l.from);
        }

        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = vec![start];
        while let Some(n) = stack.pop() {
            if !visited.insert(n) {
                continue;
            }
            if let Some(prevs) = incoming.get(&n) {
                stack.extend(prevs.iter().copied());
            }
        }
        visited
    }

    /// Structural validation: every link endpoint exists, every input socket
    /// has at most one incoming link, and the graph has no cycles.
    pub fn validate(&self) -> Result<()> {
        let ids: HashSet<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        if ids.len() != self.nodes.len() {
            bail!("duplicate node id in graph");
        }

        let mut seen_inputs: HashSet<(NodeId, &str)> = HashSet::new();
        for l in &self.links {
            if !ids.contains(&l.from) || !ids.contains(&l.to) {
                bail!("link references missing node: {:?} -> {:?}", l.from, l.to);
            }
            if !seen_inputs.insert((l.to, l.to_socket.as_str())) {
                bail!(
                    "input socket {:?}.{} has more than one incoming link",
                    l.to,
                    l.to_socket
                );
            }
        }

        self.topo_order().map(|_| ())
    }

    /// Kahn's topological sort over the node table. Fails on cycles.
    pub fn topo_order(&self) -> Result<Vec<NodeId>> {
        let mut indeg: HashMap<NodeId, usize> = self.nodes.iter().map(|n| (n.id, 0usize)).collect();
        let mut outgoing: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for l in &self.links {
            if let Some(d) = indeg.get_mut(&l.to) {
                *d += 1;
            }
            outgoing.entry(l.from).or_default().push(l.to);
        }

        let mut q: VecDeque<NodeId> = indeg
            .iter()
            .filter_map(|(id, d)| (*d == 0).then_some(*id))
            .collect();
        let mut order: Vec<NodeId> = Vec::with_capacity(self.nodes.len());

        while let Some(n) = q.pop_front() {
            order.push(n);
            if let Some(nexts) = outgoing.get(&n) {
                for m in nexts {
                    let entry = indeg.get_mut(m).expect("link endpoints checked above");
                    *entry -= 1;
                    if *entry == 0 {
                        q.push_back(*m);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            bail!("cycle detected in shader graph");
        }
        Ok(order)
    }
}
