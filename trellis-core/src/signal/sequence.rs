//! Multi-Input Sequencer
//!
//! An ordered-multiple input presents its links to the component as one
//! ordered sequence. The component is told about changes with
//! `insert(index, value)`, `set(index, value)` and `remove(index)`, where
//! `index` is the link's position among the links currently in the sequence.
//!
//! # Positions
//!
//! The sequence is kept as a sorted list of link ids. Link ids grow with
//! creation, so the sorted order is the link-declaration order, and a link's
//! index is recomputed on every update with a binary search. Removing a link
//! shifts every later link down by one.
//!
//! # Null Filtering
//!
//! With `filter_none`, a `None` payload takes the link out of the sequence
//! (`remove`) and a later value puts it back (`insert`) at its declaration
//! position. Without it, `None` is stored like any other value.
//!
//! # Two-Phase Updates
//!
//! [`InputSequence::plan`] computes the operation without changing the
//! sequence; [`InputSequence::commit`] applies it. The router commits only
//! after the component's handler accepted the call, so the sequence always
//! mirrors what the component has seen.

use smallvec::SmallVec;

use crate::graph::LinkId;
use crate::value::Value;

/// What happened on a link since the last delivery.
#[derive(Debug, Clone)]
pub enum LinkUpdate {
    /// A new payload.
    Value(Option<Value>),
    /// The link was removed.
    Closed,
}

/// A call against the component's ordered collection.
#[derive(Debug, Clone)]
pub enum SequenceOp {
    Insert(usize, Option<Value>),
    Set(usize, Option<Value>),
    Remove(usize),
}

impl SequenceOp {
    /// Handler name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            SequenceOp::Insert(..) => "insert",
            SequenceOp::Set(..) => "set",
            SequenceOp::Remove(_) => "remove",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            SequenceOp::Insert(i, _) | SequenceOp::Set(i, _) | SequenceOp::Remove(i) => *i,
        }
    }
}

/// Present links of one ordered-multiple input.
#[derive(Debug, Clone, Default)]
pub struct InputSequence {
    present: SmallVec<[LinkId; 4]>,
    filter_none: bool,
}

impl InputSequence {
    pub fn new(filter_none: bool) -> Self {
        Self {
            present: SmallVec::new(),
            filter_none,
        }
    }

    /// Current position of `link`, if it is in the sequence.
    pub fn index_of(&self, link: LinkId) -> Option<usize> {
        self.present.binary_search(&link).ok()
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    /// Links in sequence order.
    pub fn links(&self) -> &[LinkId] {
        &self.present
    }

    /// The operation `update` on `link` translates to, if any.
    pub fn plan(&self, link: LinkId, update: &LinkUpdate) -> Option<SequenceOp> {
        let found = self.present.binary_search(&link);
        match (update, found) {
            (LinkUpdate::Closed, Ok(index)) => Some(SequenceOp::Remove(index)),
            (LinkUpdate::Closed, Err(_)) => None,
            (LinkUpdate::Value(None), Ok(index)) if self.filter_none => {
                Some(SequenceOp::Remove(index))
            }
            (LinkUpdate::Value(None), Err(_)) if self.filter_none => None,
            (LinkUpdate::Value(value), Ok(index)) => Some(SequenceOp::Set(index, value.clone())),
            (LinkUpdate::Value(value), Err(position)) => {
                Some(SequenceOp::Insert(position, value.clone()))
            }
        }
    }

    /// Apply a planned operation for `link`.
    pub fn commit(&mut self, link: LinkId, op: &SequenceOp) {
        match op {
            SequenceOp::Insert(position, _) => self.present.insert(*position, link),
            SequenceOp::Remove(index) => {
                self.present.remove(*index);
            }
            SequenceOp::Set(..) => {}
        }
    }
}
