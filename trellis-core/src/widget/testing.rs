//! A recording widget shared by unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value as Json;

use super::description::{Widget, WidgetDescription, WidgetInit};
use super::env::Env;
use super::handle::{ReportQueue, WidgetHandle};
use crate::error::HandlerResult;
use crate::graph::NodeId;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Input(&'static str, Option<i64>),
    Insert(&'static str, usize, Option<i64>),
    Set(&'static str, usize, Option<i64>),
    Remove(&'static str, usize),
    NewSignals,
    Deleted,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Inputs `A`, `B` (single i64), `L` (multiple i64) and `F` (multiple i64,
/// filtering `None`). Outputs `Out` (i64) and `Text` (String).
pub struct Probe {
    pub calls: Vec<Call>,
    pub handle: WidgetHandle,
    settings: Json,
    log: Option<CallLog>,
}

impl Probe {
    fn record(&mut self, call: Call) -> HandlerResult {
        if let Some(log) = &self.log {
            log.borrow_mut().push(call.clone());
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Widget for Probe {
    fn handle_new_signals(&mut self) -> HandlerResult {
        self.record(Call::NewSignals)
    }

    fn settings(&self) -> Json {
        self.settings.clone()
    }

    fn on_delete(&mut self) {
        let _ = self.record(Call::Deleted);
    }
}

pub fn probe_description() -> Rc<WidgetDescription> {
    build(None)
}

/// Like [`probe_description`], but every call is also appended to `log`.
pub fn probe_description_with(log: CallLog) -> Rc<WidgetDescription> {
    build(Some(log))
}

fn build(log: Option<CallLog>) -> Rc<WidgetDescription> {
    WidgetDescription::builder::<Probe>("Probe")
        .input::<i64, _>("A", |w, v| w.record(Call::Input("A", v.copied())))
        .input::<i64, _>("B", |w, v| w.record(Call::Input("B", v.copied())))
        .multi_input::<i64, _, _, _>(
            "L",
            false,
            |w, i, v| w.record(Call::Insert("L", i, v.copied())),
            |w, i, v| w.record(Call::Set("L", i, v.copied())),
            |w, i| w.record(Call::Remove("L", i)),
        )
        .multi_input::<i64, _, _, _>(
            "F",
            true,
            |w, i, v| w.record(Call::Insert("F", i, v.copied())),
            |w, i, v| w.record(Call::Set("F", i, v.copied())),
            |w, i| w.record(Call::Remove("F", i)),
        )
        .output::<i64>("Out")
        .output::<String>("Text")
        .build(move |init: WidgetInit| {
            Ok(Probe {
                calls: Vec::new(),
                handle: init.handle,
                settings: init.settings,
                log: log.clone(),
            })
        })
}

pub fn probe_init() -> WidgetInit {
    probe_init_with_settings(Json::Null)
}

pub fn probe_init_with_settings(settings: Json) -> WidgetInit {
    let node = NodeId::new();
    WidgetInit {
        node,
        title: "probe".to_string(),
        handle: ReportQueue::new().handle_for(node),
        settings,
        env: Env::new().view(),
    }
}
