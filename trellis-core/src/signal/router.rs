//! Signal Router
//!
//! The router keeps one pending slot per link, decides which nodes are ready
//! for delivery (the *update front*), and delivers a node's pending inputs to
//! its widget in one pass.
//!
//! # Slots
//!
//! A link's slot holds at most one undelivered update. Posting again replaces
//! it, so only the latest value per link is ever delivered. A removed link
//! keeps a `Closed` slot in the router until the sink has been told.
//!
//! # Update Front
//!
//! A node is in the front when all of these hold:
//!
//! 1. It is still in the graph and its state accepts input.
//! 2. At least one incoming slot holds a value or a close.
//! 3. Every single input link has carried something at least once.
//! 4. No incoming slot is invalidated.
//! 5. No upstream node has pending input, is invalidated, or is busy
//!    (initializing, updating, blocking).
//!
//! Nodes are ordered by when they first got pending input, then by their
//! position in the graph.
//!
//! # Delivery
//!
//! A pass delivers the node's removed links first and its other pending slots
//! after them, each group in link-declaration order, then calls the
//! post-update hook once. Slots are cleared only if the whole
//! pass succeeded; a failed pass leaves them for the next one.

use std::collections::HashMap;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::sequence::{InputSequence, LinkUpdate, SequenceOp};
use crate::error::{EngineError, Result};
use crate::graph::{Cardinality, Graph, Link, LinkId, NodeId};
use crate::state::StateTracker;
use crate::value::Value;
use crate::widget::{Instance, WidgetDescription};

#[derive(Debug, Clone)]
enum Slot {
    Idle,
    Value(Option<Value>),
    Invalidated,
    Closed,
}

impl Slot {
    fn is_pending(&self) -> bool {
        matches!(self, Slot::Value(_) | Slot::Closed)
    }
}

#[derive(Debug)]
struct LinkState {
    link: Link,
    slot: Slot,
    /// Bumped on every slot change; a delivered slot is cleared only if it
    /// did not change during the pass.
    generation: u64,
    /// Has carried a value (or `None`) at least once.
    primed: bool,
    /// Last value posted on the link.
    contents: Option<Value>,
}

struct Pending {
    link: LinkId,
    channel: usize,
    generation: u64,
    update: LinkUpdate,
}

/// Pending-value table and delivery engine.
#[derive(Debug, Default)]
pub struct SignalRouter {
    links: IndexMap<LinkId, LinkState>,
    /// Last value sent on each `(node, output channel)`.
    outputs: HashMap<(NodeId, usize), Option<Value>>,
    sequences: HashMap<(NodeId, usize), InputSequence>,
    /// Sequence number of the send that first made a node pending.
    queued: HashMap<NodeId, u64>,
    next_seq: u64,
    now_updating: Option<NodeId>,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new link. If its source already sent on the link's output
    /// channel, that value is posted right away.
    pub fn link_added(&mut self, link: &Link) {
        self.links.insert(
            link.id,
            LinkState {
                link: link.clone(),
                slot: Slot::Idle,
                generation: 0,
                primed: false,
                contents: None,
            },
        );

        if let Some(value) = self.outputs.get(&(link.source, link.source_channel)).cloned() {
            debug!(link = %link, "seeding new link with the last sent value");
            let seq = self.bump_seq();
            self.post_at(link.id, value, seq);
        }
    }

    /// React to a removed link: the sink is told on its next pass.
    pub fn link_removed(&mut self, link: &Link) {
        let Some(state) = self.links.get_mut(&link.id) else {
            return;
        };
        if !state.primed && !state.slot.is_pending() {
            self.links.shift_remove(&link.id);
            return;
        }
        state.slot = Slot::Closed;
        state.generation += 1;
        state.contents = None;

        let seq = self.bump_seq();
        self.enqueue(link.sink, seq);
    }

    /// Drop everything known about a node that left the graph.
    pub fn forget_node(&mut self, node: NodeId) {
        self.links.retain(|_, s| s.link.sink != node);
        self.outputs.retain(|(source, _), _| *source != node);
        self.sequences.retain(|(sink, _), _| *sink != node);
        self.queued.remove(&node);
    }

    /// Replace `link`'s pending slot with `value`.
    pub fn post(&mut self, link: LinkId, value: Option<Value>) -> Result<()> {
        if !self.links.contains_key(&link) {
            return Err(EngineError::UnknownLink(link));
        }
        let seq = self.bump_seq();
        self.post_at(link, value, seq);
        Ok(())
    }

    fn post_at(&mut self, link: LinkId, value: Option<Value>, seq: u64) {
        let Some(state) = self.links.get_mut(&link) else {
            return;
        };
        match state.slot {
            Slot::Closed => return,
            Slot::Value(_) => trace!(link = %link, "compressing pending value"),
            _ => {}
        }
        state.slot = Slot::Value(value.clone());
        state.generation += 1;
        state.primed = true;
        state.contents = value;

        let sink = state.link.sink;
        self.enqueue(sink, seq);
    }

    /// Mark `link` as stale: its sink waits until a new value arrives.
    pub fn post_invalidate(&mut self, link: LinkId) -> Result<()> {
        let state = self
            .links
            .get_mut(&link)
            .ok_or(EngineError::UnknownLink(link))?;
        if !matches!(state.slot, Slot::Closed) {
            state.slot = Slot::Invalidated;
            state.generation += 1;
        }
        Ok(())
    }

    /// Send `value` from `source`'s output channel named `channel`.
    ///
    /// Returns how many links it was posted to.
    pub fn send(
        &mut self,
        graph: &Graph,
        source: NodeId,
        channel: &str,
        value: Option<Value>,
    ) -> Result<usize> {
        let (index, _) = graph.output_channel(source, channel)?;
        self.outputs.insert((source, index), value.clone());

        let targets: Vec<LinkId> = graph
            .links_out_of(source)
            .into_iter()
            .filter(|l| l.source_channel == index)
            .map(|l| l.id)
            .collect();
        let seq = self.bump_seq();
        for link in &targets {
            self.post_at(*link, value.clone(), seq);
        }
        debug!(node = %source, channel, links = targets.len(), "output sent");
        Ok(targets.len())
    }

    /// Invalidate every link out of `source`'s output channel `channel`.
    pub fn invalidate_output(&mut self, graph: &Graph, source: NodeId, channel: &str) -> Result<usize> {
        let (index, _) = graph.output_channel(source, channel)?;
        let targets: Vec<LinkId> = graph
            .links_out_of(source)
            .into_iter()
            .filter(|l| l.source_channel == index)
            .map(|l| l.id)
            .collect();
        for link in &targets {
            self.post_invalidate(*link)?;
        }
        Ok(targets.len())
    }

    /// Last value posted on `link`.
    pub fn link_contents(&self, link: LinkId) -> Option<Value> {
        self.links.get(&link).and_then(|s| s.contents.clone())
    }

    /// Whether `link`'s slot is invalidated.
    pub fn is_invalidated(&self, link: LinkId) -> bool {
        matches!(self.links.get(&link).map(|s| &s.slot), Some(Slot::Invalidated))
    }

    /// Links into `node` with undelivered updates, in declaration order.
    pub fn pending(&self, node: NodeId) -> Vec<LinkId> {
        let mut links: Vec<LinkId> = self
            .links
            .values()
            .filter(|s| s.link.sink == node && s.slot.is_pending())
            .map(|s| s.link.id)
            .collect();
        links.sort();
        links
    }

    pub fn has_pending(&self, node: NodeId) -> bool {
        self.links
            .values()
            .any(|s| s.link.sink == node && s.slot.is_pending())
    }

    /// Node currently receiving a delivery, if any.
    pub fn now_updating(&self) -> Option<NodeId> {
        self.now_updating
    }

    /// Nodes eligible for delivery, in selection order.
    pub fn update_front(&self, graph: &Graph, tracker: &StateTracker) -> Vec<NodeId> {
        let mut front: Vec<(u64, usize, NodeId)> = self
            .queued
            .iter()
            .filter(|(node, _)| self.is_eligible(**node, graph, tracker))
            .filter_map(|(node, seq)| {
                graph
                    .declaration_index(*node)
                    .map(|index| (*seq, index, *node))
            })
            .collect();
        front.sort_unstable();
        front.into_iter().map(|(_, _, node)| node).collect()
    }

    fn is_eligible(&self, node: NodeId, graph: &Graph, tracker: &StateTracker) -> bool {
        if !graph.contains_node(node) || !tracker.get(node).accepts_input() {
            return false;
        }
        if !self.has_pending(node) || self.inputs_held(node, graph) {
            return false;
        }
        graph.upstream(node).into_iter().all(|up| {
            let state = tracker.get(up);
            !(self.has_pending(up)
                || state.is_invalidated()
                || state.is_initializing()
                || state.delays_deletion())
        })
    }

    /// Whether some incoming link holds the node back.
    fn inputs_held(&self, node: NodeId, graph: &Graph) -> bool {
        self.links
            .values()
            .filter(|s| s.link.sink == node)
            .any(|s| match s.slot {
                Slot::Invalidated => true,
                Slot::Closed => false,
                _ => {
                    !s.primed
                        && graph
                            .sink_channel(&s.link)
                            .map(|c| c.is_single())
                            .unwrap_or(false)
                }
            })
    }

    /// Deliver all pending inputs of `node` to its widget.
    ///
    /// Returns the number of links delivered. On error the node's slots are
    /// left as they were.
    pub fn deliver(
        &mut self,
        node: NodeId,
        instance: &mut dyn Instance,
        description: &WidgetDescription,
        tracker: &mut StateTracker,
    ) -> Result<usize> {
        if self.now_updating.is_some() {
            return Err(EngineError::Reentrant {
                node,
                state: "input update",
            });
        }

        let mut batch: SmallVec<[Pending; 4]> = self
            .links
            .values()
            .filter(|s| s.link.sink == node)
            .filter_map(|s| {
                let update = match &s.slot {
                    Slot::Value(value) => LinkUpdate::Value(value.clone()),
                    Slot::Closed => LinkUpdate::Closed,
                    _ => return None,
                };
                Some(Pending {
                    link: s.link.id,
                    channel: s.link.sink_channel,
                    generation: s.generation,
                    update,
                })
            })
            .collect();
        batch.sort_by_key(|p| (!matches!(p.update, LinkUpdate::Closed), p.link));

        tracker.enter_input_update(node)?;
        self.now_updating = Some(node);
        let result = self.deliver_batch(node, instance, description, &batch);
        self.now_updating = None;
        tracker.exit_input_update(node);

        result?;

        for pending in &batch {
            let unchanged = self
                .links
                .get(&pending.link)
                .map(|s| s.generation == pending.generation)
                .unwrap_or(false);
            if !unchanged {
                continue;
            }
            if matches!(pending.update, LinkUpdate::Closed) {
                self.links.shift_remove(&pending.link);
            } else if let Some(state) = self.links.get_mut(&pending.link) {
                state.slot = Slot::Idle;
            }
        }
        if !self.has_pending(node) {
            self.queued.remove(&node);
        }

        debug!(node = %node, links = batch.len(), "inputs delivered");
        Ok(batch.len())
    }

    fn deliver_batch(
        &mut self,
        node: NodeId,
        instance: &mut dyn Instance,
        description: &WidgetDescription,
        batch: &[Pending],
    ) -> Result<()> {
        for pending in batch {
            let channel = description.inputs().get(pending.channel).ok_or_else(|| {
                EngineError::UnknownChannel {
                    node,
                    direction: "input",
                    channel: pending.channel.to_string(),
                }
            })?;

            if channel.is_single() {
                let value = match &pending.update {
                    LinkUpdate::Value(value) => value.as_ref(),
                    LinkUpdate::Closed => None,
                };
                trace!(node = %node, link = %pending.link, channel = %channel.name, "calling input handler");
                instance
                    .input_single(pending.channel, value)
                    .map_err(|e| EngineError::handler(node, channel.name.as_str(), e))?;
                continue;
            }

            let filter_none = matches!(
                channel.cardinality,
                Cardinality::Multiple { filter_none: true }
            );
            let sequence = self
                .sequences
                .entry((node, pending.channel))
                .or_insert_with(|| InputSequence::new(filter_none));
            let Some(op) = sequence.plan(pending.link, &pending.update) else {
                continue;
            };

            trace!(node = %node, link = %pending.link, channel = %channel.name, op = op.name(), index = op.index(), "calling multiple input handler");
            let called = match &op {
                SequenceOp::Insert(index, value) => {
                    instance.input_insert(pending.channel, *index, value.as_ref())
                }
                SequenceOp::Set(index, value) => {
                    instance.input_set(pending.channel, *index, value.as_ref())
                }
                SequenceOp::Remove(index) => instance.input_remove(pending.channel, *index),
            };
            called.map_err(|e| EngineError::handler(node, format!("{}.{}", channel.name, op.name()), e))?;
            sequence.commit(pending.link, &op);
        }

        instance
            .handle_new_signals()
            .map_err(|e| EngineError::handler(node, "handle_new_signals", e))
    }

    /// Forget all pending state.
    pub fn clear(&mut self) {
        self.links.clear();
        self.outputs.clear();
        self.sequences.clear();
        self.queued.clear();
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn enqueue(&mut self, node: NodeId, seq: u64) {
        self.queued.entry(node).or_insert(seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::widget::testing::{probe_description, Call, Probe};
    use crate::widget::WidgetManager;

    struct Fixture {
        graph: Graph,
        tracker: StateTracker,
        manager: WidgetManager,
        router: SignalRouter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: Graph::new(),
                tracker: StateTracker::new(),
                manager: WidgetManager::default(),
                router: SignalRouter::new(),
            }
        }

        fn node(&mut self) -> NodeId {
            let id = self.graph.add_node(Node::new(probe_description(), "probe"));
            let node = self.graph.node(id).unwrap();
            self.manager.widget_for(node, &mut self.tracker).unwrap();
            id
        }

        fn link(&mut self, source: NodeId, sink: NodeId, input: &str) -> LinkId {
            let id = self.graph.add_link(source, "Out", sink, input).unwrap();
            let link = self.graph.link(id).unwrap().clone();
            self.router.link_added(&link);
            id
        }

        fn unlink(&mut self, link: LinkId) {
            let link = self.graph.remove_link(link).unwrap();
            self.router.link_removed(&link);
        }

        fn post(&mut self, link: LinkId, value: Option<i64>) {
            self.router.post(link, value.map(Value::new)).unwrap();
        }

        fn front(&self) -> Vec<NodeId> {
            self.router.update_front(&self.graph, &self.tracker)
        }

        fn deliver(&mut self, node: NodeId) -> Result<usize> {
            let description = self.graph.node(node).unwrap().description().clone();
            let instance = self.manager.instance_mut(node).unwrap();
            self.router.deliver(node, instance, &description, &mut self.tracker)
        }

        fn calls(&self, node: NodeId) -> Vec<Call> {
            let instance = self.manager.instance(node).unwrap();
            instance.as_any().downcast_ref::<Probe>().unwrap().calls.clone()
        }
    }

    #[test]
    fn single_inputs_need_a_first_value() {
        let mut fx = Fixture::new();
        let (a, b, n) = (fx.node(), fx.node(), fx.node());
        let la = fx.link(a, n, "A");
        let lb = fx.link(b, n, "B");

        fx.post(la, Some(5));
        assert!(fx.front().is_empty());

        fx.post(lb, None);
        assert_eq!(fx.front(), vec![n]);

        assert_eq!(fx.deliver(n).unwrap(), 2);
        assert_eq!(
            fx.calls(n),
            vec![Call::Input("A", Some(5)), Call::Input("B", None), Call::NewSignals]
        );
        assert!(fx.front().is_empty());
    }

    #[test]
    fn later_posts_replace_pending_values() {
        let mut fx = Fixture::new();
        let (a, n) = (fx.node(), fx.node());
        let la = fx.link(a, n, "A");

        for v in 1..=4 {
            fx.post(la, Some(v));
        }
        fx.deliver(n).unwrap();
        assert_eq!(fx.calls(n), vec![Call::Input("A", Some(4)), Call::NewSignals]);
    }

    #[test]
    fn links_are_delivered_in_declaration_order() {
        let mut fx = Fixture::new();
        let (a, b, n) = (fx.node(), fx.node(), fx.node());
        let first = fx.link(b, n, "B");
        let second = fx.link(a, n, "A");

        fx.post(second, Some(2));
        fx.post(first, Some(1));
        fx.deliver(n).unwrap();
        assert_eq!(
            fx.calls(n),
            vec![Call::Input("B", Some(1)), Call::Input("A", Some(2)), Call::NewSignals]
        );
    }

    #[test]
    fn not_ready_nodes_are_held_back() {
        let mut fx = Fixture::new();
        let (a, n) = (fx.node(), fx.node());
        let la = fx.link(a, n, "A");

        fx.tracker.set_ready(n, false);
        fx.post(la, Some(1));
        fx.post(la, Some(2));
        assert!(fx.front().is_empty());

        fx.tracker.set_ready(n, true);
        assert_eq!(fx.front(), vec![n]);
        fx.deliver(n).unwrap();
        assert_eq!(fx.calls(n)[0], Call::Input("A", Some(2)));
    }

    #[test]
    fn downstream_waits_for_pending_and_invalidated_upstream() {
        let mut fx = Fixture::new();
        let (a, b, c) = (fx.node(), fx.node(), fx.node());
        let ab = fx.link(a, b, "A");
        let bc = fx.link(b, c, "A");

        fx.post(ab, Some(1));
        fx.post(bc, Some(1));
        assert_eq!(fx.front(), vec![b]);

        fx.deliver(b).unwrap();
        assert_eq!(fx.front(), vec![c]);

        fx.tracker.set_invalidated(b, true);
        assert!(fx.front().is_empty());
    }

    #[test]
    fn invalidated_link_holds_the_sink() {
        let mut fx = Fixture::new();
        let (a, n) = (fx.node(), fx.node());
        let la = fx.link(a, n, "A");
        fx.post(la, Some(1));
        fx.deliver(n).unwrap();

        fx.router.post_invalidate(la).unwrap();
        assert!(fx.router.is_invalidated(la));
        assert!(fx.front().is_empty());

        fx.post(la, Some(2));
        assert_eq!(fx.front(), vec![n]);
    }

    #[test]
    fn front_is_ordered_by_first_pending_input() {
        let mut fx = Fixture::new();
        let (a, x, y) = (fx.node(), fx.node(), fx.node());
        let ly = fx.link(a, y, "A");
        let lx = fx.link(a, x, "A");

        fx.post(ly, Some(1));
        fx.post(lx, Some(1));
        assert_eq!(fx.front(), vec![y, x]);

        fx.router.send(&fx.graph, a, "Out", Some(Value::new(2_i64))).unwrap();
        assert_eq!(fx.front(), vec![y, x]);
    }

    #[test]
    fn removed_single_link_delivers_none() {
        let mut fx = Fixture::new();
        let (a, n) = (fx.node(), fx.node());
        let la = fx.link(a, n, "A");
        fx.post(la, Some(3));
        fx.deliver(n).unwrap();

        fx.unlink(la);
        assert_eq!(fx.front(), vec![n]);
        fx.deliver(n).unwrap();
        assert_eq!(&fx.calls(n)[2..], &[Call::Input("A", None), Call::NewSignals]);
        assert!(fx.router.pending(n).is_empty());
    }

    #[test]
    fn never_used_link_is_dropped_silently() {
        let mut fx = Fixture::new();
        let (a, n) = (fx.node(), fx.node());
        let la = fx.link(a, n, "A");
        fx.unlink(la);
        assert!(fx.front().is_empty());
        assert!(!fx.router.has_pending(n));
    }

    #[test]
    fn multiple_input_indices_follow_current_links() {
        let mut fx = Fixture::new();
        let (a, b, c, n) = (fx.node(), fx.node(), fx.node(), fx.node());
        let la = fx.link(a, n, "L");
        let lb = fx.link(b, n, "L");
        let lc = fx.link(c, n, "L");
        for link in [la, lb, lc] {
            fx.post(link, Some(0));
        }
        fx.deliver(n).unwrap();

        fx.unlink(lb);
        fx.deliver(n).unwrap();
        fx.post(lc, Some(9));
        fx.deliver(n).unwrap();

        assert_eq!(
            &fx.calls(n)[4..],
            &[
                Call::Remove("L", 1),
                Call::NewSignals,
                Call::Set("L", 1, Some(9)),
                Call::NewSignals,
            ]
        );
    }

    #[test]
    fn removals_are_delivered_before_insertions() {
        let mut fx = Fixture::new();
        let (a, b, n) = (fx.node(), fx.node(), fx.node());
        let la = fx.link(a, n, "L");
        let lb = fx.link(b, n, "L");
        fx.post(lb, Some(2));
        fx.deliver(n).unwrap();

        fx.post(la, Some(1));
        fx.unlink(lb);
        fx.deliver(n).unwrap();

        assert_eq!(
            &fx.calls(n)[2..],
            &[
                Call::Remove("L", 0),
                Call::Insert("L", 0, Some(1)),
                Call::NewSignals,
            ]
        );
    }

    #[test]
    fn output_memory_seeds_new_links() {
        let mut fx = Fixture::new();
        let (a, n) = (fx.node(), fx.node());
        fx.router.send(&fx.graph, a, "Out", Some(Value::new(11_i64))).unwrap();

        let la = fx.link(a, n, "A");
        assert_eq!(fx.router.link_contents(la).unwrap().downcast_ref::<i64>(), Some(&11));
        assert_eq!(fx.router.pending(n), vec![la]);
    }

    #[test]
    fn unknown_output_channel_is_an_error() {
        let mut fx = Fixture::new();
        let a = fx.node();
        assert!(matches!(
            fx.router.send(&fx.graph, a, "Missing", None),
            Err(EngineError::UnknownChannel { .. })
        ));
    }

    #[test]
    fn forgetting_a_node_clears_its_slots() {
        let mut fx = Fixture::new();
        let (a, n) = (fx.node(), fx.node());
        let la = fx.link(a, n, "A");
        fx.post(la, Some(1));

        fx.router.forget_node(n);
        assert!(!fx.router.has_pending(n));
        assert!(fx.front().is_empty());
    }
}
