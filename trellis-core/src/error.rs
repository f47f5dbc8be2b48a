//! Error types for the engine.
//!
//! Every fallible engine operation returns [`Result`]. Component code (input
//! handlers, constructors, post-update hooks) reports failures as a
//! [`BoxError`], which the engine wraps with the node and handler identity.

use thiserror::Error;

use crate::graph::{LinkId, NodeId};

/// Boxed error returned by component code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of an input handler or post-update hook.
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The node is not part of the graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The link is not part of the graph.
    #[error("unknown link {0}")]
    UnknownLink(LinkId),

    /// The node's component type declares no such channel.
    #[error("node {node} has no {direction} channel named '{channel}'")]
    UnknownChannel {
        node: NodeId,
        direction: &'static str,
        channel: String,
    },

    /// Output and input payload types differ.
    #[error("cannot connect '{output}' ({output_type}) to '{input}' ({input_type})")]
    IncompatibleChannels {
        output: String,
        output_type: &'static str,
        input: String,
        input_type: &'static str,
    },

    /// A single input already has an incoming link.
    #[error("input '{channel}' of node {node} is already connected")]
    InputOccupied { node: NodeId, channel: String },

    /// The exact same link already exists.
    #[error("link already exists as {0}")]
    DuplicateLink(LinkId),

    /// The link would close a cycle.
    #[error("linking {source_node} to {sink} would create a cycle")]
    Cycle { source_node: NodeId, sink: NodeId },

    /// A node can only leave the graph once its links are gone.
    #[error("node {0} still has links")]
    NodeHasLinks(NodeId),

    /// Component construction failed.
    #[error("failed to create widget '{title}' for node {node}: {source}")]
    Construction {
        node: NodeId,
        title: String,
        #[source]
        source: BoxError,
    },

    /// Destroy was requested while the component was still being built.
    #[error("node {0} was removed while its widget was being initialized")]
    RemovedWhileInitializing(NodeId),

    /// Re-entrant input update or initialization of the same node.
    #[error("node {node} re-entered {state}")]
    Reentrant { node: NodeId, state: &'static str },

    /// A component handler or post-update hook failed.
    #[error("error calling '{handler}' of node {node}: {source}")]
    Handler {
        node: NodeId,
        handler: String,
        #[source]
        source: BoxError,
    },

    /// A delivered payload did not have the declared type.
    #[error("expected payload of type {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Settings blob could not be encoded.
    #[error("settings encode error: {0}")]
    SettingsEncode(#[from] rmp_serde::encode::Error),

    /// Settings blob could not be decoded.
    #[error("settings decode error: {0}")]
    SettingsDecode(#[from] rmp_serde::decode::Error),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// The scheme was closed; no further processing.
    #[error("scheme is closed")]
    Closed,
}

impl EngineError {
    /// Wrap a component failure with the node and handler identity.
    pub fn handler(node: NodeId, handler: impl Into<String>, source: BoxError) -> Self {
        Self::Handler {
            node,
            handler: handler.into(),
            source,
        }
    }

    /// The node this error is about, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::UnknownNode(node)
            | Self::NodeHasLinks(node)
            | Self::RemovedWhileInitializing(node) => Some(*node),
            Self::UnknownChannel { node, .. }
            | Self::InputOccupied { node, .. }
            | Self::Construction { node, .. }
            | Self::Reentrant { node, .. }
            | Self::Handler { node, .. } => Some(*node),
            _ => None,
        }
    }
}
