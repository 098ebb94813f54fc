//! The portable value message exchanged with orchestration layers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{num::DataType, shape::Shape};

/// A serialized tensor: element type, shape and row-major content in host byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TensorMessage {
    pub dtype: DataType,
    pub shape: Shape,
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    pub content: Vec<u8>,
}

/// One member of a struct message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StructElement {
    pub name: Option<String>,
    pub value: ValueMessage,
}

/// A serialized computation. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComputationMessage {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueMessage {
    Tensor(TensorMessage),
    Struct(Vec<StructElement>),
    Computation(ComputationMessage),
}

impl ValueMessage {
    /// Builds an unnamed struct from its members, in order.
    pub fn unnamed_struct(values: impl IntoIterator<Item = ValueMessage>) -> Self {
        let elements = values
            .into_iter()
            .map(|value| StructElement { name: None, value })
            .collect();
        Self::Struct(elements)
    }

    #[inline]
    pub fn as_tensor(&self) -> Option<&TensorMessage> {
        match self {
            ValueMessage::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    #[inline]
    pub fn as_struct(&self) -> Option<&[StructElement]> {
        match self {
            ValueMessage::Struct(elements) => Some(elements),
            _ => None,
        }
    }
}

impl From<TensorMessage> for ValueMessage {
    #[inline]
    fn from(value: TensorMessage) -> Self {
        Self::Tensor(value)
    }
}
