//! Graph Nodes
//!
//! This module defines the node record that lives in the graph model.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::channel::{InputChannel, OutputChannel};
use crate::widget::WidgetDescription;

/// Unique identifier for a node in the graph.
///
/// Ids are handed out in increasing order, so comparing two ids compares
/// the order in which the nodes were created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A node in the graph.
///
/// The node owns its persisted configuration blob. The blob is opaque to the
/// engine; it is produced and consumed by the settings provider.
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// User-visible title.
    title: String,

    /// Component type of the node.
    description: Rc<WidgetDescription>,

    /// Stored configuration, if the node has ever been configured.
    properties: Option<Vec<u8>>,
}

impl Node {
    /// Create a new node of the given component type.
    pub fn new(description: Rc<WidgetDescription>, title: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            title: title.into(),
            description,
            properties: None,
        }
    }

    /// Create a node with a previously stored configuration blob.
    pub fn with_properties(mut self, properties: Vec<u8>) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set the node's title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Get the node's component type.
    pub fn description(&self) -> &Rc<WidgetDescription> {
        &self.description
    }

    /// Get the stored configuration blob.
    pub fn properties(&self) -> Option<&[u8]> {
        self.properties.as_deref()
    }

    /// Replace the stored configuration blob.
    pub fn set_properties(&mut self, properties: Vec<u8>) {
        self.properties = Some(properties);
    }

    /// Look up an input channel by name.
    pub fn input_channel(&self, name: &str) -> Option<(usize, &InputChannel)> {
        self.description
            .inputs()
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }

    /// Look up an output channel by name.
    pub fn output_channel(&self, name: &str) -> Option<(usize, &OutputChannel)> {
        self.description
            .outputs()
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("type", &self.description.name())
            .field("has_properties", &self.properties.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::testing::probe_description;

    #[test]
    fn node_ids_are_unique_and_ordered() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
    }

    #[test]
    fn channel_lookup_by_name() {
        let node = Node::new(probe_description(), "probe");
        let (index, input) = node.input_channel("B").unwrap();
        assert_eq!(index, 1);
        assert!(input.is_single());
        assert!(node.input_channel("missing").is_none());
        assert_eq!(node.output_channel("Out").unwrap().0, 0);
    }

    #[test]
    fn properties_round_trip() {
        let mut node = Node::new(probe_description(), "probe").with_properties(vec![1, 2]);
        assert_eq!(node.properties(), Some(&[1u8, 2][..]));
        node.set_properties(vec![3]);
        assert_eq!(node.properties(), Some(&[3u8][..]));
    }
}
