//! Scheme
//!
//! The [`Scheme`] ties the graph model, the processing state tracker, the
//! widget manager and the signal router together, and is what a host drives.
//!
//! # Driving a Scheme
//!
//! All engine state lives on the thread that owns the scheme. Widgets report
//! through their handles; reports are applied by [`Scheme::pump`], before
//! and after every delivery, and by [`Scheme::wait_reports`] for hosts that
//! await widget activity.
//!
//! A scheduling pass ([`Scheme::process_queued`]) delivers to every node of
//! the current update front. A failing node is logged, reported to the
//! observers and left pending; the other nodes of the pass still run unless
//! [`SchemeConfig::stop_on_error`] is set.

mod config;
mod observer;

pub use config::SchemeConfig;
pub use observer::HostObserver;

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value as Json;
use tracing::{debug, error, warn};

use crate::error::{EngineError, Result};
use crate::graph::{Graph, Link, LinkId, Node, NodeId};
use crate::signal::SignalRouter;
use crate::state::{ProcessingState, StateTracker};
use crate::subscription::{ListenerSet, Subscription};
use crate::value::Value;
use crate::widget::{
    Env, EnvView, Instance, MsgPackSettings, Report, SettingsProvider, Widget, WidgetManager,
};

type StateLog = Rc<RefCell<Vec<(NodeId, ProcessingState)>>>;

/// Outcome of one or more scheduling passes.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Nodes that received their inputs, in delivery order.
    pub processed: Vec<NodeId>,
    /// Nodes whose delivery failed, with the error.
    pub failed: Vec<(NodeId, EngineError)>,
}

impl PassReport {
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty() && self.failed.is_empty()
    }
}

/// A workflow and its live widgets.
pub struct Scheme {
    config: SchemeConfig,
    graph: Graph,
    tracker: StateTracker,
    widgets: WidgetManager,
    router: SignalRouter,
    env: Env,
    observers: ListenerSet<Box<dyn HostObserver>>,
    state_log: StateLog,
    _state_subscription: Subscription,
    closed: bool,
}

impl Scheme {
    /// Create an empty scheme storing settings as MessagePack.
    pub fn new(config: SchemeConfig) -> Self {
        Self::with_settings(config, Rc::new(MsgPackSettings::new()))
    }

    /// Create an empty scheme with a custom settings provider.
    pub fn with_settings(config: SchemeConfig, settings: Rc<dyn SettingsProvider>) -> Self {
        let env = Env::new();
        let mut tracker = StateTracker::new();
        let state_log: StateLog = Rc::default();
        let log = Rc::clone(&state_log);
        let subscription = tracker.subscribe(move |node, _change, state| {
            log.borrow_mut().push((node, state));
        });

        Self {
            config,
            graph: Graph::new(),
            tracker,
            widgets: WidgetManager::new(settings, env.clone()),
            router: SignalRouter::new(),
            env,
            observers: ListenerSet::new(),
            state_log,
            _state_subscription: subscription,
            closed: false,
        }
    }

    pub fn config(&self) -> &SchemeConfig {
        &self.config
    }

    /// The workflow topology.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Register a host observer. Dropping the subscription unregisters it.
    pub fn subscribe(&mut self, observer: impl HostObserver + 'static) -> Subscription {
        self.observers.subscribe(Box::new(observer))
    }

    /// Insert a node.
    ///
    /// With eager widget creation, a failing constructor fails the insertion
    /// and the node is taken out again.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        let id = self.graph.add_node(node);
        if self.config.create_widgets_eagerly {
            if let Err(err) = self.create_widget(id) {
                self.graph.remove_node(id)?;
                self.router.forget_node(id);
                return Err(err);
            }
            self.pump();
        }
        Ok(id)
    }

    fn create_widget(&mut self, id: NodeId) -> Result<()> {
        let node = self.graph.node(id).ok_or(EngineError::UnknownNode(id))?;
        self.widgets.widget_for(node, &mut self.tracker)?;
        Ok(())
    }

    /// Remove a node with all its links and hand back its record.
    ///
    /// The record's configuration blob holds the widget's last settings.
    /// The widget itself may outlive this call if it is still busy.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        if !self.graph.contains_node(id) {
            return Err(EngineError::UnknownNode(id));
        }
        if self.tracker.get(id).is_initializing() {
            return Err(EngineError::RemovedWhileInitializing(id));
        }

        let links: Vec<LinkId> = self
            .graph
            .links_into(id)
            .into_iter()
            .chain(self.graph.links_out_of(id))
            .map(|l| l.id)
            .collect();
        for link in links {
            self.remove_link(link)?;
        }

        let mut node = self.graph.remove_node(id)?;
        self.router.forget_node(id);
        self.widgets.destroy(&mut node, &mut self.tracker)?;

        self.observers.for_each(|o| {
            o.node_progress_changed(id, 0.0);
            o.node_status_message_changed(id, "");
        });
        self.flush_state_log();
        debug!(node = %id, title = node.title(), "node removed");
        Ok(node)
    }

    /// Connect `source.output` to `sink.input`.
    pub fn add_link(
        &mut self,
        source: NodeId,
        output: &str,
        sink: NodeId,
        input: &str,
    ) -> Result<LinkId> {
        let id = self.graph.add_link(source, output, sink, input)?;
        if let Some(link) = self.graph.link(id) {
            self.router.link_added(link);
        }
        Ok(id)
    }

    /// Remove a link. The sink is told on its next delivery.
    pub fn remove_link(&mut self, id: LinkId) -> Result<Link> {
        let link = self.graph.remove_link(id)?;
        self.router.link_removed(&link);
        Ok(link)
    }

    /// The live widget of `id`, constructing it if needed.
    pub fn widget_for(&mut self, id: NodeId) -> Result<&mut dyn Instance> {
        let node = self.graph.node(id).ok_or(EngineError::UnknownNode(id))?;
        self.widgets.widget_for(node, &mut self.tracker)
    }

    /// The live widget of `id` as its concrete type.
    pub fn widget<W: Widget>(&self, id: NodeId) -> Option<&W> {
        self.widgets.instance(id)?.as_any().downcast_ref::<W>()
    }

    pub fn widget_mut<W: Widget>(&mut self, id: NodeId) -> Option<&mut W> {
        self.widgets.instance_mut(id)?.as_any_mut().downcast_mut::<W>()
    }

    /// Processing state of a node.
    pub fn state(&self, id: NodeId) -> ProcessingState {
        self.tracker.get(id)
    }

    /// Set a node's readiness from the host side.
    pub fn set_ready(&mut self, id: NodeId, ready: bool) -> Result<()> {
        self.ensure_tracked(id)?;
        self.tracker.set_ready(id, ready);
        self.widgets.on_state_changed(id, &mut self.tracker);
        self.flush_state_log();
        Ok(())
    }

    /// Set a node's invalidated flag from the host side.
    pub fn set_invalidated(&mut self, id: NodeId, invalidated: bool) -> Result<()> {
        self.ensure_tracked(id)?;
        self.tracker.set_invalidated(id, invalidated);
        self.widgets.on_state_changed(id, &mut self.tracker);
        self.flush_state_log();
        Ok(())
    }

    /// Nodes in the graph and removed nodes awaiting release have a state.
    fn ensure_tracked(&self, id: NodeId) -> Result<()> {
        if self.graph.contains_node(id) || self.widgets.is_delayed(id) {
            Ok(())
        } else {
            Err(EngineError::UnknownNode(id))
        }
    }

    /// Whether a removed node's widget is still waiting to be released.
    pub fn is_deletion_deferred(&self, id: NodeId) -> bool {
        self.widgets.is_delayed(id)
    }

    /// Post a value on a link, replacing any undelivered one.
    pub fn post(&mut self, link: LinkId, value: Option<Value>) -> Result<()> {
        self.router.post(link, value)
    }

    /// Mark a link's value as stale.
    pub fn post_invalidate(&mut self, link: LinkId) -> Result<()> {
        self.router.post_invalidate(link)
    }

    /// Last value posted on a link.
    pub fn link_contents(&self, link: LinkId) -> Option<Value> {
        self.router.link_contents(link)
    }

    /// Nodes currently eligible for delivery, in selection order.
    pub fn update_front(&self) -> Vec<NodeId> {
        self.router.update_front(&self.graph, &self.tracker)
    }

    /// Deliver to the first node of the update front.
    ///
    /// Returns the node, or `None` if the front is empty.
    pub fn process_next(&mut self) -> Result<Option<NodeId>> {
        self.ensure_open()?;
        self.pump();
        let Some(id) = self.update_front().first().copied() else {
            return Ok(None);
        };
        let result = self.deliver_to(id);
        self.widgets.flush_releases();
        result.map(|_| Some(id))
    }

    /// Run one scheduling pass over the current update front.
    pub fn process_queued(&mut self) -> Result<PassReport> {
        self.ensure_open()?;
        self.pump();

        let mut report = PassReport::default();
        for id in self.update_front() {
            if !self.update_front().contains(&id) {
                continue;
            }
            match self.deliver_to(id) {
                Ok(()) => report.processed.push(id),
                Err(err) if self.config.stop_on_error => {
                    self.widgets.flush_releases();
                    return Err(err);
                }
                Err(err) => report.failed.push((id, err)),
            }
        }

        self.widgets.flush_releases();
        Ok(report)
    }

    /// Run scheduling passes until nothing is left to deliver, a pass
    /// delivers nothing successfully, or `max_passes` is reached.
    pub fn run_until_idle(&mut self) -> Result<PassReport> {
        let mut total = PassReport::default();
        for _ in 0..self.config.max_passes {
            let pass = self.process_queued()?;
            let progressed = !pass.processed.is_empty();
            total.processed.extend(pass.processed);
            total.failed.extend(pass.failed);
            if !progressed {
                return Ok(total);
            }
        }
        warn!(max_passes = self.config.max_passes, "scheduling did not settle");
        Ok(total)
    }

    fn deliver_to(&mut self, id: NodeId) -> Result<()> {
        let node = self.graph.node(id).ok_or(EngineError::UnknownNode(id))?;
        let description = Rc::clone(node.description());
        let instance = self.widgets.widget_for(node, &mut self.tracker)?;
        let result = self
            .router
            .deliver(id, instance, &description, &mut self.tracker);
        self.widgets.on_state_changed(id, &mut self.tracker);

        match result {
            Ok(_) => {
                self.pump();
                Ok(())
            }
            Err(err) => {
                let title = self.graph.node(id).map(|n| n.title()).unwrap_or_default();
                match &err {
                    EngineError::Handler { handler, .. } => {
                        error!(node = %id, title, handler = handler.as_str(), error = %err, "error calling input handler")
                    }
                    _ => error!(node = %id, title, error = %err, "input delivery failed"),
                }
                self.apply_reports(Some(id));
                self.observers.for_each(|o| o.node_error(id, &err));
                Err(err)
            }
        }
    }

    /// Apply everything widgets reported so far. Returns the number of
    /// forwarded reports.
    pub fn pump(&mut self) -> usize {
        let applied = self.apply_reports(None);
        self.widgets.flush_releases();
        applied
    }

    /// Wait until a widget reports something, then apply it.
    pub async fn wait_reports(&mut self) -> usize {
        self.widgets.wait().await;
        self.pump()
    }

    /// Route drained reports. Outputs of `failed` are dropped.
    fn apply_reports(&mut self, failed: Option<NodeId>) -> usize {
        let reports = self.widgets.drain(&mut self.tracker);
        let count = reports.len();
        for (id, report) in reports {
            if !self.graph.contains_node(id) {
                debug!(node = %id, "report from a node that is not in the scheme");
                continue;
            }
            if failed == Some(id) && report.is_output() {
                debug!(node = %id, "dropping output of a failed delivery");
                continue;
            }
            match report {
                Report::Output { channel, value } => {
                    if let Err(err) = self.router.send(&self.graph, id, &channel, value) {
                        error!(node = %id, channel = channel.as_str(), error = %err, "invalid output channel");
                    }
                }
                Report::InvalidateOutput { channel } => {
                    if let Err(err) = self.router.invalidate_output(&self.graph, id, &channel) {
                        error!(node = %id, channel = channel.as_str(), error = %err, "invalid output channel");
                    }
                }
                Report::Progress(percent) => {
                    self.observers.for_each(|o| o.node_progress_changed(id, percent))
                }
                Report::StatusMessage(text) => self
                    .observers
                    .for_each(|o| o.node_status_message_changed(id, &text)),
                Report::Message(message) => self
                    .observers
                    .for_each(|o| o.node_message_changed(id, &message)),
                other => debug!(node = %id, report = ?other, "unhandled report"),
            }
        }
        self.flush_state_log();
        count
    }

    fn flush_state_log(&mut self) {
        let mut changes = std::mem::take(&mut *self.state_log.borrow_mut());
        changes.dedup();
        for (id, state) in changes {
            self.observers.for_each(|o| o.node_state_changed(id, state));
        }
    }

    /// Set (`Some`) or remove (`None`) a runtime environment key and tell
    /// every widget if the value changed.
    pub fn set_runtime_env(&mut self, key: &str, value: Option<Json>) {
        let old = match &value {
            Some(v) => self.env.set(key, v.clone()),
            None => self.env.remove(key),
        };
        if old != value {
            self.widgets.env_changed(key, value.as_ref(), old.as_ref());
        }
    }

    pub fn runtime_env(&self) -> EnvView {
        self.env.view()
    }

    /// Store every live widget's settings in its node record.
    pub fn sync_node_properties(&mut self) -> Result<()> {
        for node in self.graph.nodes_mut() {
            self.widgets.pack_into(node)?;
        }
        Ok(())
    }

    /// Stop processing, store settings and delete every widget.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let synced = self.sync_node_properties();
        self.widgets.shutdown(&mut self.tracker);
        self.router.clear();
        self.flush_state_log();
        debug!(nodes = self.graph.node_count(), "scheme closed");
        synced
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Self::new(SchemeConfig::default())
    }
}

impl Drop for Scheme {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to store widget settings on drop");
        }
    }
}
