//! Host notifications.

use crate::error::EngineError;
use crate::graph::NodeId;
use crate::state::ProcessingState;
use crate::widget::UserMessage;

/// Receives node-level notifications for display.
///
/// Observers are purely observational and never call back into delivery.
pub trait HostObserver {
    fn node_state_changed(&self, _node: NodeId, _state: ProcessingState) {}

    fn node_progress_changed(&self, _node: NodeId, _percent: f32) {}

    fn node_status_message_changed(&self, _node: NodeId, _text: &str) {}

    fn node_message_changed(&self, _node: NodeId, _message: &UserMessage) {}

    /// A delivery to `node` failed.
    fn node_error(&self, _node: NodeId, _error: &EngineError) {}
}
