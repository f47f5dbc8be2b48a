//! Channel descriptors.
//!
//! Channels are declared per component type. Inputs carry a cardinality;
//! outputs only a name and payload type.

use std::any::{Any, TypeId};

/// How many links may feed an input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one incoming link.
    Single,

    /// Any number of links, each with a position in an ordered sequence.
    ///
    /// With `filter_none`, a `None` payload removes the link's entry from the
    /// sequence instead of storing an empty entry.
    Multiple { filter_none: bool },
}

impl Cardinality {
    /// Whether this is the single-link cardinality.
    pub fn is_single(&self) -> bool {
        matches!(self, Cardinality::Single)
    }
}

/// Payload type of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    /// The payload type for `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// `TypeId` of the payload.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Type name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// An input channel declared by a component type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputChannel {
    pub name: String,
    pub payload: PayloadType,
    pub cardinality: Cardinality,
}

impl InputChannel {
    /// Whether this input accepts a single link.
    pub fn is_single(&self) -> bool {
        self.cardinality.is_single()
    }
}

/// An output channel declared by a component type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChannel {
    pub name: String,
    pub payload: PayloadType,
}
