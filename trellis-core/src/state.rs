//! Processing State Tracker
//!
//! Per-node processing flags, kept independently of the graph model. The
//! tracker is the single source of truth for whether a node may currently
//! receive input.
//!
//! # Flags
//!
//! - `INITIALIZING`: the node's widget is being constructed.
//! - `INPUT_UPDATE`: the router is delivering inputs to the node.
//! - `READY`: the widget accepts new inputs (default set).
//! - `INVALIDATED`: the widget's outputs are stale.
//! - `PROCESSING`: busy indicator for progress display, never gates delivery.
//!
//! *Blocking* is derived: invalidated and not ready.
//!
//! # Notifications
//!
//! Every mutator returns the list of [`StateChange`]s it caused and passes
//! each of them to the registered listeners. Setting a flag to the value it
//! already has changes nothing and notifies nobody. A change of the derived
//! blocking flag is reported as its own [`StateChange::Blocking`].

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::graph::NodeId;
use crate::subscription::{ListenerSet, Subscription};

/// Processing state flags of one node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessingState(u8);

impl ProcessingState {
    pub const INITIALIZING: u8 = 1 << 0;
    pub const INPUT_UPDATE: u8 = 1 << 1;
    pub const READY: u8 = 1 << 2;
    pub const INVALIDATED: u8 = 1 << 3;
    pub const PROCESSING: u8 = 1 << 4;

    /// State of a node with no recorded activity: ready, nothing else.
    pub const fn idle() -> Self {
        Self(Self::READY)
    }

    /// Raw flag bits.
    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_initializing(&self) -> bool {
        self.0 & Self::INITIALIZING != 0
    }

    pub fn is_input_update(&self) -> bool {
        self.0 & Self::INPUT_UPDATE != 0
    }

    pub fn is_ready(&self) -> bool {
        self.0 & Self::READY != 0
    }

    pub fn is_invalidated(&self) -> bool {
        self.0 & Self::INVALIDATED != 0
    }

    pub fn is_processing(&self) -> bool {
        self.0 & Self::PROCESSING != 0
    }

    /// Invalidated and not ready.
    pub fn is_blocking(&self) -> bool {
        self.is_invalidated() && !self.is_ready()
    }

    /// Whether destroying the node's widget must wait.
    pub fn delays_deletion(&self) -> bool {
        self.is_input_update() || self.is_blocking()
    }

    /// Whether the node may be selected for delivery.
    pub fn accepts_input(&self) -> bool {
        !self.is_initializing() && !self.is_input_update() && self.is_ready()
    }

    fn with(self, flag: u8, on: bool) -> Self {
        if on {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Debug for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in [
            (Self::INITIALIZING, "Initializing"),
            (Self::INPUT_UPDATE, "InputUpdate"),
            (Self::READY, "Ready"),
            (Self::INVALIDATED, "Invalidated"),
            (Self::PROCESSING, "Processing"),
        ] {
            if self.0 & flag != 0 {
                set.entry(&name);
            }
        }
        if self.is_blocking() {
            set.entry(&"Blocking");
        }
        set.finish()
    }
}

/// A single flag transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Initializing(bool),
    InputUpdate(bool),
    Ready(bool),
    Invalidated(bool),
    Blocking(bool),
    Processing(bool),
}

/// Changes caused by one mutator call.
pub type StateChanges = SmallVec<[StateChange; 4]>;

type StateListener = Box<dyn FnMut(NodeId, StateChange, ProcessingState)>;

/// Owns the processing state of every tracked node.
#[derive(Default)]
pub struct StateTracker {
    states: IndexMap<NodeId, ProcessingState>,
    listeners: ListenerSet<StateListener>,
}

impl StateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current flags of a node. Untracked nodes report [`ProcessingState::idle`].
    pub fn get(&self, node: NodeId) -> ProcessingState {
        self.states.get(&node).copied().unwrap_or_default()
    }

    /// Whether the tracker holds a record for the node.
    pub fn contains(&self, node: NodeId) -> bool {
        self.states.contains_key(&node)
    }

    /// Drop a node's record. Emits nothing.
    pub fn remove(&mut self, node: NodeId) -> Option<ProcessingState> {
        self.states.shift_remove(&node)
    }

    /// Register a listener for all state changes.
    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(NodeId, StateChange, ProcessingState) + 'static,
    {
        self.listeners.subscribe(Box::new(listener))
    }

    pub fn set_ready(&mut self, node: NodeId, ready: bool) -> StateChanges {
        self.update(node, ProcessingState::READY, ready)
    }

    pub fn set_invalidated(&mut self, node: NodeId, invalidated: bool) -> StateChanges {
        self.update(node, ProcessingState::INVALIDATED, invalidated)
    }

    /// Set invalidated and clear ready (`true`), or the reverse (`false`).
    pub fn set_blocking(&mut self, node: NodeId, blocking: bool) -> StateChanges {
        let mut changes = self.set_invalidated(node, blocking);
        changes.extend(self.set_ready(node, !blocking));
        changes
    }

    pub fn set_processing(&mut self, node: NodeId, processing: bool) -> StateChanges {
        self.update(node, ProcessingState::PROCESSING, processing)
    }

    pub fn enter_initializing(&mut self, node: NodeId) -> Result<StateChanges> {
        if self.get(node).is_initializing() {
            return Err(EngineError::Reentrant {
                node,
                state: "initialization",
            });
        }
        Ok(self.update(node, ProcessingState::INITIALIZING, true))
    }

    pub fn exit_initializing(&mut self, node: NodeId) -> StateChanges {
        self.update(node, ProcessingState::INITIALIZING, false)
    }

    pub fn enter_input_update(&mut self, node: NodeId) -> Result<StateChanges> {
        if self.get(node).is_input_update() {
            return Err(EngineError::Reentrant {
                node,
                state: "input update",
            });
        }
        Ok(self.update(node, ProcessingState::INPUT_UPDATE, true))
    }

    pub fn exit_input_update(&mut self, node: NodeId) -> StateChanges {
        self.update(node, ProcessingState::INPUT_UPDATE, false)
    }

    fn update(&mut self, node: NodeId, flag: u8, on: bool) -> StateChanges {
        let entry = self.states.entry(node).or_default();
        let before = *entry;
        let after = before.with(flag, on);
        let mut changes = StateChanges::new();
        if before == after {
            return changes;
        }
        *entry = after;

        changes.push(match flag {
            ProcessingState::INITIALIZING => StateChange::Initializing(on),
            ProcessingState::INPUT_UPDATE => StateChange::InputUpdate(on),
            ProcessingState::READY => StateChange::Ready(on),
            ProcessingState::INVALIDATED => StateChange::Invalidated(on),
            _ => StateChange::Processing(on),
        });
        if before.is_blocking() != after.is_blocking() {
            changes.push(StateChange::Blocking(after.is_blocking()));
        }

        debug!(node = %node, state = ?after, ?changes, "processing state changed");
        for change in &changes {
            self.listeners.for_each(|l| l(node, *change, after));
        }
        changes
    }
}
