//! Graph Links
//!
//! A link is a directed edge from an output channel of one node to an input
//! channel of another. Links are immutable once created.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::node::NodeId;

/// Unique identifier for a link.
///
/// Ids increase with creation, so sorting links by id yields the
/// link-declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(u64);

impl LinkId {
    /// Generate a new unique link ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A directed link `(source, output) -> (sink, input)`.
///
/// Channels are referenced by their position in the component type's
/// declaration, which is stable for the lifetime of the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub source: NodeId,
    pub source_channel: usize,
    pub sink: NodeId,
    pub sink_channel: usize,
}

impl Link {
    /// Create a new link with a fresh id.
    pub fn new(source: NodeId, source_channel: usize, sink: NodeId, sink_channel: usize) -> Self {
        Self {
            id: LinkId::new(),
            source,
            source_channel,
            sink,
            sink_channel,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}:{} -> {}:{})",
            self.id, self.source, self.source_channel, self.sink, self.sink_channel
        )
    }
}
