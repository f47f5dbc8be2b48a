//! Trellis Core
//!
//! This crate provides the node lifecycle and signal delivery engine of the
//! Trellis dataflow editor. It implements:
//!
//! - A per-node processing state machine (ready / invalidated / blocking /
//!   initializing / input update)
//! - Lazy widget creation and deferred widget destruction
//! - Signal routing with per-link compression, an update front, and
//!   ordered delivery including ordered-multiple inputs
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: nodes, links and channel descriptors
//! - `state`: the processing state tracker
//! - `widget`: component registration, live instances and their handles
//! - `signal`: the signal router and the multi-input sequencer
//! - `scheme`: the facade a host drives
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::{Node, Scheme, SchemeConfig, Widget, WidgetDescription, Value};
//!
//! struct Doubler { handle: WidgetHandle }
//! impl Widget for Doubler {}
//!
//! let doubler = WidgetDescription::builder::<Doubler>("Doubler")
//!     .input::<i64, _>("In", |w, v| {
//!         w.handle.send("Out", v.map(|v| v * 2));
//!         Ok(())
//!     })
//!     .output::<i64>("Out")
//!     .build(|init| Ok(Doubler { handle: init.handle }));
//!
//! let mut scheme = Scheme::new(SchemeConfig::default());
//! let a = scheme.add_node(Node::new(doubler.clone(), "a"))?;
//! let b = scheme.add_node(Node::new(doubler, "b"))?;
//! let link = scheme.add_link(a, "Out", b, "In")?;
//!
//! scheme.post(link, Some(Value::new(21_i64)))?;
//! scheme.run_until_idle()?;
//! ```

pub mod error;
pub mod graph;
pub mod scheme;
pub mod signal;
pub mod state;
pub mod subscription;
pub mod value;
pub mod widget;

pub use error::{BoxError, EngineError, HandlerResult, Result};
pub use graph::{Cardinality, Graph, Link, LinkId, Node, NodeId};
pub use scheme::{HostObserver, PassReport, Scheme, SchemeConfig};
pub use signal::SignalRouter;
pub use state::{ProcessingState, StateChange, StateTracker};
pub use subscription::Subscription;
pub use value::Value;
pub use widget::{
    Env, EnvView, Instance, MsgPackSettings, SettingsProvider, Severity, UserMessage, Widget,
    WidgetDescription, WidgetHandle, WidgetInit, WidgetManager,
};
