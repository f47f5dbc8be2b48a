//! Widget Descriptions
//!
//! A [`WidgetDescription`] is the registration record of a component type:
//! its input and output channels, its constructor, and a table mapping every
//! input channel to a typed handler.
//!
//! # Handler Table
//!
//! Handlers are registered once, with the builder, in channel declaration
//! order. Delivery resolves a handler by channel position; there is no name
//! lookup on the delivery path. Single channels register one handler.
//! Ordered-multiple channels register three (insert / set / remove).
//!
//! The builder is generic over the concrete widget type, so handlers receive
//! `&mut W` and a typed payload. The engine only sees the object-safe
//! [`Instance`] trait that the builder produces.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::{BoxError, EngineError, HandlerResult};
use crate::graph::{Cardinality, InputChannel, NodeId, OutputChannel, PayloadType};
use crate::value::Value;

use super::env::EnvView;
use super::handle::WidgetHandle;

/// Behavior every component type implements besides its input handlers.
pub trait Widget: 'static {
    /// Called once after all handler calls of a delivery pass.
    fn handle_new_signals(&mut self) -> HandlerResult {
        Ok(())
    }

    /// Current configuration, packed by the settings provider.
    fn settings(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Called exactly once before the instance is released.
    fn on_delete(&mut self) {}

    /// A runtime environment key changed.
    fn workflow_env_changed(
        &mut self,
        _key: &str,
        _new: Option<&serde_json::Value>,
        _old: Option<&serde_json::Value>,
    ) {
    }
}

/// Everything a constructor receives.
pub struct WidgetInit {
    pub node: NodeId,
    pub title: String,
    pub handle: WidgetHandle,
    pub settings: serde_json::Value,
    pub env: EnvView,
}

/// Object-safe view of a live component instance.
pub trait Instance {
    fn input_single(&mut self, channel: usize, value: Option<&Value>) -> HandlerResult;
    fn input_insert(&mut self, channel: usize, index: usize, value: Option<&Value>) -> HandlerResult;
    fn input_set(&mut self, channel: usize, index: usize, value: Option<&Value>) -> HandlerResult;
    fn input_remove(&mut self, channel: usize, index: usize) -> HandlerResult;
    fn handle_new_signals(&mut self) -> HandlerResult;
    fn settings(&self) -> serde_json::Value;
    fn on_delete(&mut self);
    fn workflow_env_changed(
        &mut self,
        key: &str,
        new: Option<&serde_json::Value>,
        old: Option<&serde_json::Value>,
    );

    /// The concrete widget.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

type SingleFn<W> = Box<dyn Fn(&mut W, Option<&Value>) -> HandlerResult>;
type IndexedFn<W> = Box<dyn Fn(&mut W, usize, Option<&Value>) -> HandlerResult>;
type RemoveFn<W> = Box<dyn Fn(&mut W, usize) -> HandlerResult>;
type Factory = Box<dyn Fn(WidgetInit) -> Result<Box<dyn Instance>, BoxError>>;

enum InputHandler<W> {
    Single(SingleFn<W>),
    Multiple {
        insert: IndexedFn<W>,
        set: IndexedFn<W>,
        remove: RemoveFn<W>,
    },
}

fn typed<T: Any>(value: Option<&Value>) -> Result<Option<&T>, BoxError> {
    match value {
        None => Ok(None),
        Some(v) => v.downcast_ref::<T>().map(Some).ok_or_else(|| {
            EngineError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: v.type_name(),
            }
            .into()
        }),
    }
}

fn cardinality_error(channel: usize, expected: &str) -> BoxError {
    format!("channel {channel} is not a {expected} input").into()
}

/// A widget bound to its type's handler table.
struct Bound<W> {
    widget: W,
    handlers: Rc<[InputHandler<W>]>,
}

impl<W: Widget> Instance for Bound<W> {
    fn input_single(&mut self, channel: usize, value: Option<&Value>) -> HandlerResult {
        match self.handlers.get(channel) {
            Some(InputHandler::Single(f)) => f(&mut self.widget, value),
            _ => Err(cardinality_error(channel, "single")),
        }
    }

    fn input_insert(&mut self, channel: usize, index: usize, value: Option<&Value>) -> HandlerResult {
        match self.handlers.get(channel) {
            Some(InputHandler::Multiple { insert, .. }) => insert(&mut self.widget, index, value),
            _ => Err(cardinality_error(channel, "multiple")),
        }
    }

    fn input_set(&mut self, channel: usize, index: usize, value: Option<&Value>) -> HandlerResult {
        match self.handlers.get(channel) {
            Some(InputHandler::Multiple { set, .. }) => set(&mut self.widget, index, value),
            _ => Err(cardinality_error(channel, "multiple")),
        }
    }

    fn input_remove(&mut self, channel: usize, index: usize) -> HandlerResult {
        match self.handlers.get(channel) {
            Some(InputHandler::Multiple { remove, .. }) => remove(&mut self.widget, index),
            _ => Err(cardinality_error(channel, "multiple")),
        }
    }

    fn handle_new_signals(&mut self) -> HandlerResult {
        self.widget.handle_new_signals()
    }

    fn settings(&self) -> serde_json::Value {
        self.widget.settings()
    }

    fn on_delete(&mut self) {
        self.widget.on_delete()
    }

    fn workflow_env_changed(
        &mut self,
        key: &str,
        new: Option<&serde_json::Value>,
        old: Option<&serde_json::Value>,
    ) {
        self.widget.workflow_env_changed(key, new, old)
    }

    fn as_any(&self) -> &dyn Any {
        &self.widget
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.widget
    }
}

/// Registration record of a component type.
pub struct WidgetDescription {
    name: String,
    inputs: Vec<InputChannel>,
    outputs: Vec<OutputChannel>,
    factory: Factory,
}

impl WidgetDescription {
    /// Start describing a component type.
    pub fn builder<W: Widget>(name: impl Into<String>) -> DescriptionBuilder<W> {
        DescriptionBuilder {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input channels, in declaration order.
    pub fn inputs(&self) -> &[InputChannel] {
        &self.inputs
    }

    /// Output channels, in declaration order.
    pub fn outputs(&self) -> &[OutputChannel] {
        &self.outputs
    }

    /// Run the constructor.
    pub(crate) fn create(&self, init: WidgetInit) -> Result<Box<dyn Instance>, BoxError> {
        (self.factory)(init)
    }
}

impl fmt::Debug for WidgetDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetDescription")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// Builder for [`WidgetDescription`].
pub struct DescriptionBuilder<W> {
    name: String,
    inputs: Vec<InputChannel>,
    outputs: Vec<OutputChannel>,
    handlers: Vec<InputHandler<W>>,
}

impl<W: Widget> DescriptionBuilder<W> {
    /// Declare a single input with its handler.
    ///
    /// The handler receives `None` when the link carries no value or was
    /// removed.
    pub fn input<T, F>(mut self, name: &str, handler: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut W, Option<&T>) -> HandlerResult + 'static,
    {
        self.inputs.push(InputChannel {
            name: name.to_string(),
            payload: PayloadType::of::<T>(),
            cardinality: Cardinality::Single,
        });
        self.handlers.push(InputHandler::Single(Box::new(move |w: &mut W, v: Option<&Value>| {
            handler(w, typed::<T>(v)?)
        })));
        self
    }

    /// Declare an ordered-multiple input with its three handlers.
    pub fn multi_input<T, I, S, R>(
        mut self,
        name: &str,
        filter_none: bool,
        insert: I,
        set: S,
        remove: R,
    ) -> Self
    where
        T: Any + Send + Sync,
        I: Fn(&mut W, usize, Option<&T>) -> HandlerResult + 'static,
        S: Fn(&mut W, usize, Option<&T>) -> HandlerResult + 'static,
        R: Fn(&mut W, usize) -> HandlerResult + 'static,
    {
        self.inputs.push(InputChannel {
            name: name.to_string(),
            payload: PayloadType::of::<T>(),
            cardinality: Cardinality::Multiple { filter_none },
        });
        self.handlers.push(InputHandler::Multiple {
            insert: Box::new(move |w: &mut W, i: usize, v: Option<&Value>| {
                insert(w, i, typed::<T>(v)?)
            }),
            set: Box::new(move |w: &mut W, i: usize, v: Option<&Value>| {
                set(w, i, typed::<T>(v)?)
            }),
            remove: Box::new(remove),
        });
        self
    }

    /// Declare an output channel.
    pub fn output<T: Any + Send + Sync>(mut self, name: &str) -> Self {
        self.outputs.push(OutputChannel {
            name: name.to_string(),
            payload: PayloadType::of::<T>(),
        });
        self
    }

    /// Finish with the component's constructor.
    pub fn build<C>(self, constructor: C) -> Rc<WidgetDescription>
    where
        C: Fn(WidgetInit) -> Result<W, BoxError> + 'static,
    {
        let handlers: Rc<[InputHandler<W>]> = Rc::from(self.handlers);
        let factory: Factory = Box::new(move |init: WidgetInit| {
            let widget = constructor(init)?;
            Ok(Box::new(Bound {
                widget,
                handlers: Rc::clone(&handlers),
            }) as Box<dyn Instance>)
        });

        Rc::new(WidgetDescription {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            factory,
        })
    }
}
