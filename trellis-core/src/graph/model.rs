//! Graph Model
//!
//! The graph owns the nodes and links of a workflow and answers topology
//! queries. It performs all structural validation (channel names, payload
//! types, single-input occupancy, cycles) but knows nothing about values or
//! processing state.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use super::channel::{InputChannel, OutputChannel};
use super::link::{Link, LinkId};
use super::node::{Node, NodeId};
use crate::error::{EngineError, Result};

/// Nodes and links of a workflow.
///
/// Both maps keep insertion order, which is the declaration order used by
/// the router for tie-breaking and delivery ordering.
#[derive(Debug, Default)]
pub struct Graph {
    /// All nodes in the graph, indexed by ID.
    nodes: IndexMap<NodeId, Node>,

    /// All links in the graph, in creation order.
    links: IndexMap<LinkId, Link>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph and hand its record back.
    ///
    /// The node's links must have been removed first.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node> {
        if !self.nodes.contains_key(&node_id) {
            return Err(EngineError::UnknownNode(node_id));
        }
        if self
            .links
            .values()
            .any(|l| l.source == node_id || l.sink == node_id)
        {
            return Err(EngineError::NodeHasLinks(node_id));
        }
        self.nodes
            .shift_remove(&node_id)
            .ok_or(EngineError::UnknownNode(node_id))
    }

    /// Whether the node is part of the graph.
    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Get a reference to a node.
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// All nodes, in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All nodes, mutably, in declaration order.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Position of the node in declaration order.
    pub fn declaration_index(&self, node_id: NodeId) -> Option<usize> {
        self.nodes.get_index_of(&node_id)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get a link by ID.
    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        self.links.get(&link_id)
    }

    /// All links, in declaration order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Links into `node_id`, in declaration order.
    pub fn links_into(&self, node_id: NodeId) -> Vec<&Link> {
        self.links.values().filter(|l| l.sink == node_id).collect()
    }

    /// Links out of `node_id`, in declaration order.
    pub fn links_out_of(&self, node_id: NodeId) -> Vec<&Link> {
        self.links.values().filter(|l| l.source == node_id).collect()
    }

    /// Links between two nodes.
    pub fn find_links(&self, source: NodeId, sink: NodeId) -> Vec<&Link> {
        self.links
            .values()
            .filter(|l| l.source == source && l.sink == sink)
            .collect()
    }

    /// Look up an output channel of a node by name.
    pub fn output_channel(&self, node_id: NodeId, name: &str) -> Result<(usize, &OutputChannel)> {
        let node = self.node(node_id).ok_or(EngineError::UnknownNode(node_id))?;
        node.output_channel(name)
            .ok_or_else(|| EngineError::UnknownChannel {
                node: node_id,
                direction: "output",
                channel: name.to_string(),
            })
    }

    /// Look up an input channel of a node by name.
    pub fn input_channel(&self, node_id: NodeId, name: &str) -> Result<(usize, &InputChannel)> {
        let node = self.node(node_id).ok_or(EngineError::UnknownNode(node_id))?;
        node.input_channel(name)
            .ok_or_else(|| EngineError::UnknownChannel {
                node: node_id,
                direction: "input",
                channel: name.to_string(),
            })
    }

    /// Input channel descriptor of a link's sink.
    pub fn sink_channel(&self, link: &Link) -> Option<&InputChannel> {
        self.node(link.sink)?
            .description()
            .inputs()
            .get(link.sink_channel)
    }

    /// Connect `source.output` to `sink.input`.
    ///
    /// Validates channel names, payload types, single-input occupancy,
    /// duplicates and cycles before inserting.
    pub fn add_link(
        &mut self,
        source: NodeId,
        output: &str,
        sink: NodeId,
        input: &str,
    ) -> Result<LinkId> {
        let (source_channel, out) = self.output_channel(source, output)?;
        let (sink_channel, inp) = self.input_channel(sink, input)?;

        if out.payload.id() != inp.payload.id() {
            return Err(EngineError::IncompatibleChannels {
                output: out.name.clone(),
                output_type: out.payload.name(),
                input: inp.name.clone(),
                input_type: inp.payload.name(),
            });
        }

        let single = inp.is_single();
        for existing in self.links.values() {
            if existing.sink != sink || existing.sink_channel != sink_channel {
                continue;
            }
            if existing.source == source && existing.source_channel == source_channel {
                return Err(EngineError::DuplicateLink(existing.id));
            }
            if single {
                return Err(EngineError::InputOccupied {
                    node: sink,
                    channel: input.to_string(),
                });
            }
        }

        if self.creates_cycle(source, sink) {
            return Err(EngineError::Cycle {
                source_node: source,
                sink,
            });
        }

        let link = Link::new(source, source_channel, sink, sink_channel);
        let id = link.id;
        self.links.insert(id, link);
        Ok(id)
    }

    /// Remove a link and hand it back.
    pub fn remove_link(&mut self, link_id: LinkId) -> Result<Link> {
        self.links
            .shift_remove(&link_id)
            .ok_or(EngineError::UnknownLink(link_id))
    }

    /// Whether a link `source -> sink` would close a cycle.
    pub fn creates_cycle(&self, source: NodeId, sink: NodeId) -> bool {
        source == sink || self.downstream(sink).contains(&source)
    }

    /// All nodes reachable from `node_id` following links forward.
    pub fn downstream(&self, node_id: NodeId) -> HashSet<NodeId> {
        self.traverse(node_id, |l| (l.source, l.sink))
    }

    /// All nodes from which `node_id` is reachable.
    pub fn upstream(&self, node_id: NodeId) -> HashSet<NodeId> {
        self.traverse(node_id, |l| (l.sink, l.source))
    }

    /// BFS over links, `edge` maps a link to `(from, to)`.
    fn traverse(&self, start: NodeId, edge: impl Fn(&Link) -> (NodeId, NodeId)) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            for link in self.links.values() {
                let (from, to) = edge(link);
                if from == current && visited.insert(to) {
                    queue.push_back(to);
                }
            }
        }

        visited.remove(&start);
        visited
    }
}
