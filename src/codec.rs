//! Conversion between [`ValueMessage`]s and host-resident tensors.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    message::{TensorMessage, ValueMessage},
    num::{DataType, Scalar},
    shape::Shape,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("expected a tensor value, found a {0} value")]
    NotTensor(&'static str),
    #[error("tensor content of {actual} bytes does not match shape {shape} of {dtype} ({expected} bytes)")]
    Size {
        shape: Shape,
        dtype: DataType,
        expected: usize,
        actual: usize,
    },
    #[error("tensor of shape {shape} and type {dtype} is too large to address")]
    Overflow { shape: Shape, dtype: DataType },
    #[error("tensor type error: data type {0} mismatches {1}")]
    Type(DataType, DataType),
    #[error("invalid bool byte {1:#04x} at element {0}")]
    Bool(usize, u8),
}

/// A tensor whose contents live in host memory.
///
/// Cloning is cheap: the contents are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTensor {
    dtype: DataType,
    shape: Shape,
    data: Arc<[u8]>,
}

impl HostTensor {
    /// Creates a tensor from raw contents. Fails if the contents do not fit the shape.
    pub fn new(
        dtype: DataType,
        shape: impl Into<Shape>,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<Self, CodecError> {
        let shape = shape.into();
        let data = data.into();

        let Some(expected) = shape
            .checked_size()
            .and_then(|size| size.checked_mul(dtype.size()))
        else {
            return Err(CodecError::Overflow { shape, dtype });
        };
        if data.len() != expected {
            return Err(CodecError::Size {
                shape,
                dtype,
                expected,
                actual: data.len(),
            });
        }
        if dtype == DataType::Bool {
            if let Some((index, &byte)) = data.iter().enumerate().find(|(_, x)| **x > 1) {
                return Err(CodecError::Bool(index, byte));
            }
        }
        Ok(Self { dtype, shape, data })
    }

    /// Creates a tensor from typed elements.
    #[inline]
    pub fn from_slice<T: Scalar>(shape: impl Into<Shape>, data: &[T]) -> Result<Self, CodecError> {
        let data: &[u8] = bytemuck::cast_slice(data);
        Self::new(T::DATA_TYPE, shape, data)
    }

    #[inline]
    pub fn from_bools(shape: impl Into<Shape>, data: &[bool]) -> Result<Self, CodecError> {
        let data: Vec<u8> = data.iter().map(|&x| x as u8).collect();
        Self::new(DataType::Bool, shape, data)
    }

    #[inline]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape.clone()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(crate) fn shared_data(&self) -> Arc<[u8]> {
        self.data.clone()
    }

    /// Copies the contents out as typed elements. Returns error if type mismatches.
    pub fn to_vec<T: Scalar>(&self) -> Result<Vec<T>, CodecError> {
        if self.dtype != T::DATA_TYPE {
            return Err(CodecError::Type(self.dtype, T::DATA_TYPE));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    pub fn to_bools(&self) -> Result<Vec<bool>, CodecError> {
        if self.dtype != DataType::Bool {
            return Err(CodecError::Type(self.dtype, DataType::Bool));
        }
        Ok(self.data.iter().map(|&x| x != 0).collect())
    }
}

/// Decodes a tensor-shaped message into a host tensor.
pub fn decode(message: &ValueMessage) -> Result<HostTensor, CodecError> {
    let Some(tensor) = message.as_tensor() else {
        let kind = match message.as_struct() {
            Some(_) => "struct",
            None => "computation",
        };
        return Err(CodecError::NotTensor(kind));
    };
    let TensorMessage {
        dtype,
        shape,
        content,
    } = tensor;
    HostTensor::new(*dtype, shape.clone(), content.as_slice())
}

/// Encodes a host tensor into a tensor-shaped message.
pub fn encode(tensor: &HostTensor) -> ValueMessage {
    ValueMessage::Tensor(TensorMessage {
        dtype: tensor.dtype,
        shape: tensor.shape.clone(),
        content: tensor.data.to_vec(),
    })
}
