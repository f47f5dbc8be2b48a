//! Widgets
//!
//! Live component instances and everything around them.
//!
//! # Overview
//!
//! - [`WidgetDescription`]: registration record of a component type, built
//!   once with typed input handlers.
//! - [`WidgetManager`]: one live instance per node, created lazily and
//!   destroyed through the deferred-destruction protocol.
//! - [`WidgetHandle`]: the component's side of the connection; reports are
//!   queued and applied on the control thread.
//! - [`SettingsProvider`]: persists component configuration.
//! - [`Env`]: runtime environment shared by all components.

mod description;
mod env;
mod handle;
mod manager;
mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use description::{DescriptionBuilder, Instance, Widget, WidgetDescription, WidgetInit};
pub use env::{Env, EnvView};
pub use handle::{Envelope, Report, ReportQueue, Severity, UserMessage, WidgetHandle};
pub use manager::WidgetManager;
pub use settings::{MsgPackSettings, SettingsProvider};
