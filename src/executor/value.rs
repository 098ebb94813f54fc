use std::sync::Arc;

use derive_more::Display;

use crate::{message::ValueMessage, num::DataType, service::GlobalData};

/// A tensor held by the service, paired with its element type.
///
/// Owns its allocation exclusively. [`Value`]s alias it through an [`Arc`], so the allocation is
/// released once, when the last of them is dropped.
#[derive(Debug)]
pub struct ServiceTensor {
    data: GlobalData,
    dtype: DataType,
}

impl ServiceTensor {
    #[inline]
    pub fn new(data: GlobalData, dtype: DataType) -> Self {
        Self { data, dtype }
    }

    #[inline]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    #[inline]
    pub fn global_data(&self) -> &GlobalData {
        &self.data
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Tensor,
    Struct,
    Unimplemented,
}

impl ValueType {
    /// Classifies the kind of value a message would embed as.
    pub fn of(message: &ValueMessage) -> Self {
        match message {
            ValueMessage::Tensor(_) => ValueType::Tensor,
            ValueMessage::Struct(_) => ValueType::Struct,
            ValueMessage::Computation(_) => ValueType::Unimplemented,
        }
    }
}

/// A value resident in a [`ServiceExecutor`](super::ServiceExecutor).
///
/// Immutable once built. Cloning never touches the service.
#[derive(Debug, Clone)]
pub enum Value {
    Tensor(Arc<ServiceTensor>),
    Struct(Arc<[Value]>),
}

impl Value {
    #[inline]
    pub fn r#type(&self) -> ValueType {
        match self {
            Value::Tensor(_) => ValueType::Tensor,
            Value::Struct(_) => ValueType::Struct,
        }
    }

    #[inline]
    pub fn tensor(&self) -> Option<&Arc<ServiceTensor>> {
        match self {
            Value::Tensor(tensor) => Some(tensor),
            Value::Struct(_) => None,
        }
    }

    #[inline]
    pub fn structure(&self) -> Option<&[Value]> {
        match self {
            Value::Tensor(_) => None,
            Value::Struct(values) => Some(values),
        }
    }

    /// Number of tensor leaves in the tree.
    pub fn leaves(&self) -> usize {
        match self {
            Value::Tensor(_) => 1,
            Value::Struct(values) => values.iter().map(Value::leaves).sum(),
        }
    }
}

impl From<Vec<Value>> for Value {
    #[inline]
    fn from(value: Vec<Value>) -> Self {
        Self::Struct(value.into())
    }
}
