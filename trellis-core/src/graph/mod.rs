//! Graph Model
//!
//! This module holds the workflow topology: nodes, the links between their
//! channels, and the channel descriptors declared by component types.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes are positions in the workflow, each of a component type
//! - Links connect an output channel of one node to an input channel of another
//!
//! The graph is read-mostly while signals are scheduled and is mutated only
//! through explicit add/remove calls on the control thread.
//!
//! # Design Decisions
//!
//! 1. Nodes and links live in insertion-ordered maps. Iteration order is the
//!    declaration order, which the router relies on for deterministic
//!    scheduling and link delivery order.
//!
//! 2. Removing a node hands the owned [`Node`] record back to the caller.
//!    Holding that record is proof that the node is no longer in the graph,
//!    which is what the widget manager's destroy path requires.
//!
//! 3. Channels are referenced by position inside a link, so delivery never
//!    looks a channel up by name.

mod channel;
mod link;
mod model;
mod node;

pub use channel::{Cardinality, InputChannel, OutputChannel, PayloadType};
pub use link::{Link, LinkId};
pub use model::Graph;
pub use node::{Node, NodeId};
