//! Widget Lifecycle Manager
//!
//! Owns the live widget instance of every node. Instances are created on
//! demand and destroyed exactly once, after their node left the graph.
//!
//! # Deferred Destruction
//!
//! Destroying a node whose state is `InputUpdate` or blocking does not
//! release the instance. The record moves to a delayed set and is released
//! when [`WidgetManager::on_state_changed`] sees those flags clear.
//!
//! Release itself is two-step. Records leave the manager's tables right
//! away, but the instances are only dropped by
//! [`WidgetManager::flush_releases`], which the scheme calls once the
//! current operation has unwound.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::description::{Instance, WidgetInit};
use super::env::Env;
use super::handle::{Report, ReportQueue, WidgetHandle};
use super::settings::{MsgPackSettings, SettingsProvider};
use crate::error::{EngineError, Result};
use crate::graph::{Node, NodeId};
use crate::state::StateTracker;

struct WidgetRecord {
    node: NodeId,
    title: String,
    instance: Box<dyn Instance>,
    handle: WidgetHandle,
}

/// One live instance per node.
pub struct WidgetManager {
    items: IndexMap<NodeId, WidgetRecord>,
    delay_delete: IndexMap<NodeId, WidgetRecord>,
    release_queue: Vec<WidgetRecord>,
    reports: ReportQueue,
    settings: Rc<dyn SettingsProvider>,
    env: Env,
}

impl WidgetManager {
    /// Create a manager persisting configuration with `settings`.
    pub fn new(settings: Rc<dyn SettingsProvider>, env: Env) -> Self {
        Self {
            items: IndexMap::new(),
            delay_delete: IndexMap::new(),
            release_queue: Vec::new(),
            reports: ReportQueue::new(),
            settings,
            env,
        }
    }

    /// The live instance of `node`, constructing it first if needed.
    ///
    /// Construction failures are returned and leave no record behind.
    pub fn widget_for(
        &mut self,
        node: &Node,
        tracker: &mut StateTracker,
    ) -> Result<&mut dyn Instance> {
        let id = node.id();
        if !self.items.contains_key(&id) {
            self.create(node, tracker)?;
        }
        let record = self.items.get_mut(&id).ok_or(EngineError::UnknownNode(id))?;
        Ok(record.instance.as_mut())
    }

    fn create(&mut self, node: &Node, tracker: &mut StateTracker) -> Result<()> {
        let id = node.id();
        let description = node.description();
        let settings = self.settings.load(description, node.properties())?;

        tracker.enter_initializing(id)?;
        let handle = self.reports.handle_for(id);
        let init = WidgetInit {
            node: id,
            title: node.title().to_string(),
            handle: handle.clone(),
            settings,
            env: self.env.view(),
        };
        let created = description.create(init);
        tracker.exit_initializing(id);

        match created {
            Ok(instance) => {
                info!(node = %id, title = node.title(), kind = description.name(), "widget created");
                self.items.insert(
                    id,
                    WidgetRecord {
                        node: id,
                        title: node.title().to_string(),
                        instance,
                        handle,
                    },
                );
                Ok(())
            }
            Err(source) => {
                handle.detach();
                tracker.remove(id);
                Err(EngineError::Construction {
                    node: id,
                    title: node.title().to_string(),
                    source,
                })
            }
        }
    }

    /// The live instance of `node`, if it has one.
    pub fn instance(&self, node: NodeId) -> Option<&dyn Instance> {
        self.items.get(&node).map(|r| r.instance.as_ref())
    }

    pub fn instance_mut(&mut self, node: NodeId) -> Option<&mut dyn Instance> {
        match self.items.get_mut(&node) {
            Some(record) => Some(record.instance.as_mut()),
            None => None,
        }
    }

    /// Whether `node` has a live instance.
    pub fn contains(&self, node: NodeId) -> bool {
        self.items.contains_key(&node)
    }

    /// Title the instance was created with.
    pub fn title(&self, node: NodeId) -> Option<&str> {
        self.items
            .get(&node)
            .or_else(|| self.delay_delete.get(&node))
            .map(|r| r.title.as_str())
    }

    /// Destroy the instance of a node that was removed from the graph.
    ///
    /// The node's configuration blob is refreshed and the instance's delete
    /// hook runs immediately. Release waits while the node is updating or
    /// blocking.
    pub fn destroy(&mut self, node: &mut Node, tracker: &mut StateTracker) -> Result<()> {
        let id = node.id();
        if tracker.get(id).is_initializing() {
            return Err(EngineError::RemovedWhileInitializing(id));
        }
        let Some(mut record) = self.items.shift_remove(&id) else {
            tracker.remove(id);
            return Ok(());
        };

        match self.settings.pack(node.description(), record.instance.as_ref()) {
            Ok(blob) => node.set_properties(blob),
            Err(err) => warn!(node = %id, error = %err, "failed to pack widget settings"),
        }
        record.instance.on_delete();

        let state = tracker.get(id);
        if state.delays_deletion() {
            debug!(node = %id, ?state, "widget removed while busy, deferring deletion");
            self.delay_delete.insert(id, record);
        } else {
            self.release(record, tracker);
        }
        Ok(())
    }

    /// Re-check a delayed record after `node`'s state changed.
    ///
    /// Returns whether the record was released.
    pub fn on_state_changed(&mut self, node: NodeId, tracker: &mut StateTracker) -> bool {
        if tracker.get(node).delays_deletion() {
            return false;
        }
        match self.delay_delete.shift_remove(&node) {
            Some(record) => {
                debug!(node = %node, "delayed delete");
                self.release(record, tracker);
                true
            }
            None => false,
        }
    }

    fn release(&mut self, record: WidgetRecord, tracker: &mut StateTracker) {
        record.handle.detach();
        tracker.remove(record.node);
        self.release_queue.push(record);
    }

    /// Drop every released instance. Returns how many were dropped.
    pub fn flush_releases(&mut self) -> usize {
        let released = self.release_queue.len();
        for record in self.release_queue.drain(..) {
            debug!(node = %record.node, "widget released");
        }
        released
    }

    /// Whether `node`'s instance is waiting in the delayed set.
    pub fn is_delayed(&self, node: NodeId) -> bool {
        self.delay_delete.contains_key(&node)
    }

    pub fn delayed_count(&self) -> usize {
        self.delay_delete.len()
    }

    pub fn pending_releases(&self) -> usize {
        self.release_queue.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Apply queued widget reports.
    ///
    /// State reports go to `tracker` (and may release delayed records).
    /// Everything else is returned in report order. Reports of released
    /// widgets are dropped.
    pub fn drain(&mut self, tracker: &mut StateTracker) -> Vec<(NodeId, Report)> {
        let mut forwarded = Vec::new();
        for envelope in self.reports.drain() {
            let node = envelope.node;
            if !envelope.is_attached() {
                warn!(node = %node, report = ?envelope.report, "report from a released widget");
                continue;
            }
            match envelope.report {
                Report::Ready(on) => {
                    tracker.set_ready(node, on);
                }
                Report::Invalidated(on) => {
                    tracker.set_invalidated(node, on);
                }
                Report::Blocking(on) => {
                    tracker.set_blocking(node, on);
                }
                Report::ProcessingStarted => {
                    tracker.set_processing(node, true);
                    forwarded.push((node, Report::Progress(0.0)));
                }
                Report::ProcessingFinished => {
                    tracker.set_processing(node, false);
                    forwarded.push((node, Report::Progress(0.0)));
                }
                report => {
                    forwarded.push((node, report));
                    continue;
                }
            }
            self.on_state_changed(node, tracker);
        }
        forwarded
    }

    /// Wait until a widget reports something.
    pub async fn wait(&mut self) -> bool {
        self.reports.wait().await
    }

    /// Store the current configuration of `node`'s instance in its record.
    pub fn pack_into(&self, node: &mut Node) -> Result<()> {
        if let Some(record) = self.items.get(&node.id()) {
            let blob = self.settings.pack(node.description(), record.instance.as_ref())?;
            node.set_properties(blob);
        }
        Ok(())
    }

    /// Forward an environment change to every live instance.
    pub fn env_changed(&mut self, key: &str, new: Option<&serde_json::Value>, old: Option<&serde_json::Value>) {
        for record in self.items.values_mut() {
            record.instance.workflow_env_changed(key, new, old);
        }
    }

    /// Delete and release every instance, delayed ones included.
    pub fn shutdown(&mut self, tracker: &mut StateTracker) {
        for (_, mut record) in self.items.drain(..).collect::<Vec<_>>() {
            record.instance.on_delete();
            self.release(record, tracker);
        }
        for (_, record) in self.delay_delete.drain(..).collect::<Vec<_>>() {
            self.release(record, tracker);
        }
        self.flush_releases();
    }
}

impl Default for WidgetManager {
    fn default() -> Self {
        Self::new(Rc::new(MsgPackSettings::new()), Env::new())
    }
}
