//! Widget Handles
//!
//! A [`WidgetHandle`] is how a component talks back to the engine: sending
//! outputs, flipping its ready / invalidated flags, reporting progress and
//! messages. The handle never touches engine state directly. Every call
//! becomes a [`Report`] pushed into an ordered queue that the control thread
//! drains.
//!
//! # Thread Safety
//!
//! Handles are `Send + Sync + Clone`. A component may hand a clone to a
//! background thread and report from there; the reports reach the state
//! tracker in the order they were made, and only once the control thread
//! drains the queue.
//!
//! Once the component is released its handle is detached, and later reports
//! are dropped when drained.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::collections::VecDeque;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::graph::NodeId;
use crate::value::Value;

/// Severity of a [`UserMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// An info / warning / error message shown on the node.
///
/// `contents: None` clears the message with that id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub severity: Severity,
    pub id: String,
    pub contents: Option<String>,
}

/// A single component report.
#[derive(Debug, Clone)]
pub enum Report {
    Output { channel: String, value: Option<Value> },
    InvalidateOutput { channel: String },
    Ready(bool),
    Invalidated(bool),
    Blocking(bool),
    ProcessingStarted,
    Progress(f32),
    ProcessingFinished,
    StatusMessage(String),
    Message(UserMessage),
}

impl Report {
    /// Whether the report changes processing state flags.
    pub fn is_state(&self) -> bool {
        matches!(
            self,
            Report::Ready(_)
                | Report::Invalidated(_)
                | Report::Blocking(_)
                | Report::ProcessingStarted
                | Report::ProcessingFinished
        )
    }

    /// Whether the report forwards data downstream.
    pub fn is_output(&self) -> bool {
        matches!(self, Report::Output { .. } | Report::InvalidateOutput { .. })
    }
}

/// A report together with its origin.
#[derive(Debug)]
pub struct Envelope {
    pub node: NodeId,
    pub report: Report,
    attached: Arc<AtomicBool>,
}

impl Envelope {
    /// Whether the reporting component was still attached when drained.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

/// Reporting handle given to a component at construction.
#[derive(Debug, Clone)]
pub struct WidgetHandle {
    node: NodeId,
    tx: UnboundedSender<Envelope>,
    attached: Arc<AtomicBool>,
}

impl WidgetHandle {
    /// The node this handle reports for.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether the component is still wired to the engine.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Send `value` on the output channel named `channel`.
    pub fn send<T>(&self, channel: &str, value: Option<T>)
    where
        T: Any + Send + Sync,
    {
        self.send_value(channel, value.map(Value::new));
    }

    /// Send an already wrapped value.
    pub fn send_value(&self, channel: &str, value: Option<Value>) {
        self.report(Report::Output {
            channel: channel.to_string(),
            value,
        });
    }

    /// Mark the value on `channel` as stale until the next send.
    pub fn invalidate(&self, channel: &str) {
        self.report(Report::InvalidateOutput {
            channel: channel.to_string(),
        });
    }

    pub fn set_ready(&self, ready: bool) {
        self.report(Report::Ready(ready));
    }

    pub fn set_invalidated(&self, invalidated: bool) {
        self.report(Report::Invalidated(invalidated));
    }

    /// `true`: invalidated and not ready. `false`: the reverse.
    pub fn set_blocking(&self, blocking: bool) {
        self.report(Report::Blocking(blocking));
    }

    pub fn progress_init(&self) {
        self.report(Report::ProcessingStarted);
    }

    pub fn progress_set(&self, percent: f32) {
        self.report(Report::Progress(percent));
    }

    pub fn progress_finished(&self) {
        self.report(Report::ProcessingFinished);
    }

    pub fn set_status_message(&self, text: impl Into<String>) {
        self.report(Report::StatusMessage(text.into()));
    }

    pub fn set_message(&self, message: UserMessage) {
        self.report(Report::Message(message));
    }

    fn report(&self, report: Report) {
        let envelope = Envelope {
            node: self.node,
            report,
            attached: Arc::clone(&self.attached),
        };
        if self.tx.send(envelope).is_err() {
            trace!(node = %self.node, "report queue closed");
        }
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }
}

/// Receiving end of all handles issued by one widget manager.
#[derive(Debug)]
pub struct ReportQueue {
    tx: UnboundedSender<Envelope>,
    rx: UnboundedReceiver<Envelope>,
    /// Envelopes received by `wait` but not drained yet.
    received: VecDeque<Envelope>,
}

impl ReportQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            received: VecDeque::new(),
        }
    }

    /// Issue a new, attached handle for `node`.
    pub fn handle_for(&self, node: NodeId) -> WidgetHandle {
        WidgetHandle {
            node,
            tx: self.tx.clone(),
            attached: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Take everything queued so far, in report order.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out: Vec<Envelope> = self.received.drain(..).collect();
        while let Ok(envelope) = self.rx.try_recv() {
            out.push(envelope);
        }
        out
    }

    /// Wait until at least one report is queued.
    ///
    /// Returns `false` if no report can ever arrive. The queue keeps a
    /// sender of its own, so in practice this only waits.
    pub async fn wait(&mut self) -> bool {
        if !self.received.is_empty() {
            return true;
        }
        match self.rx.recv().await {
            Some(envelope) => {
                self.received.push_back(envelope);
                true
            }
            None => false,
        }
    }
}

impl Default for ReportQueue {
    fn default() -> Self {
        Self::new()
    }
}
