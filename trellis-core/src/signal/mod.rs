//! Signals
//!
//! Routing of output values to the inputs of downstream widgets.
//!
//! - [`SignalRouter`]: per-link pending slots, the update front, and
//!   delivery of a node's pending inputs in link-declaration order.
//! - [`InputSequence`]: index bookkeeping for ordered-multiple inputs.

mod router;
mod sequence;

pub use router::SignalRouter;
pub use sequence::{InputSequence, LinkUpdate, SequenceOp};
