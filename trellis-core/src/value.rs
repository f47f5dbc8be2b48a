//! Channel Payloads
//!
//! Values travelling over links are type-erased and shared. A value is
//! produced once by an output channel and may be delivered to any number of
//! sinks, so it lives behind an `Arc` and is never copied.
//!
//! The "closed / no value" sentinel is `None`: every place that carries a
//! payload uses `Option<Value>`.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A shared, type-erased payload.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// Wrap a value.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the payload as `T`, if it has that type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether the payload has type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// `TypeId` of the payload.
    pub fn type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    /// Name of the payload type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether two values share the same allocation.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}
