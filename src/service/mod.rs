//! Boundary to the remote compute service that owns tensor storage.
//!
//! A [`Client`] moves [`Literal`]s into the service, where each allocation is represented on the
//! host by an exclusively owned [`GlobalData`] handle, and moves them back out again.
//! Dropping the handle releases the remote allocation.

use std::sync::Arc;

use derive_more::{Deref, Display};
use thiserror::Error;

use crate::{
    codec::{CodecError, HostTensor},
    num::DataType,
    platform::BoxFuture,
    shape::Shape,
};

pub use host::{HostBuilder, HostClient};
pub use registry::{HostPlatform, Platform, PlatformRegistry};

pub mod host;
pub mod registry;

/// Identifies one allocation inside the service.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deref)]
pub struct RemoteId(uid::Id<RemoteId>);

impl RemoteId {
    #[inline]
    pub fn new() -> Self {
        Self(uid::Id::new())
    }
}

impl Default for RemoteId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("platform {0} is not registered")]
    Platform(String),
    #[error("allocation {0} not found in service")]
    NotFound(RemoteId),
    #[error("resource exhausted: requested {requested} bytes with {available} bytes available")]
    ResourceExhausted { requested: usize, available: usize },
    #[error("literal of type {0} cannot be read as {1}")]
    Type(PrimitiveType, DataType),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("service disconnected")]
    Disconnected,
    #[error("{0}")]
    Other(String),
}

impl From<flume::RecvError> for ServiceError {
    #[inline]
    fn from(_: flume::RecvError) -> Self {
        Self::Disconnected
    }
}

impl<T> From<flume::SendError<T>> for ServiceError {
    #[inline]
    fn from(_: flume::SendError<T>) -> Self {
        Self::Disconnected
    }
}

/// Element types the service stores natively.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl From<DataType> for PrimitiveType {
    fn from(value: DataType) -> Self {
        match value {
            DataType::Bool => PrimitiveType::Pred,
            DataType::I8 => PrimitiveType::S8,
            DataType::I16 => PrimitiveType::S16,
            DataType::I32 => PrimitiveType::S32,
            DataType::I64 => PrimitiveType::S64,
            DataType::U8 => PrimitiveType::U8,
            DataType::U16 => PrimitiveType::U16,
            DataType::U32 => PrimitiveType::U32,
            DataType::U64 => PrimitiveType::U64,
            DataType::F16 => PrimitiveType::F16,
            DataType::F32 => PrimitiveType::F32,
            DataType::F64 => PrimitiveType::F64,
        }
    }
}

/// Contents of a tensor in the form the service transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    r#type: PrimitiveType,
    shape: Shape,
    data: Arc<[u8]>,
}

impl Literal {
    /// Borrows the contents of a host tensor. No bytes are copied.
    pub fn from_host(tensor: &HostTensor) -> Self {
        let r#type = tensor.dtype().into();
        let shape = tensor.shape();
        let data = tensor.shared_data();
        Self {
            r#type,
            shape,
            data,
        }
    }

    /// Converts back into a host tensor of the recorded `dtype`.
    pub fn into_host(self, dtype: DataType) -> Result<HostTensor, ServiceError> {
        if self.r#type != PrimitiveType::from(dtype) {
            return Err(ServiceError::Type(self.r#type, dtype));
        }
        let tensor = HostTensor::new(dtype, self.shape, self.data)?;
        Ok(tensor)
    }

    #[inline]
    pub fn primitive_type(&self) -> PrimitiveType {
        self.r#type
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape.clone()
    }

    #[inline]
    pub fn data_size(&self) -> usize {
        self.data.len()
    }
}

/// Hook through which a [`GlobalData`] hands its allocation back to the service.
pub trait Release: std::fmt::Debug + Send + Sync {
    fn release(&self, id: RemoteId);
}

/// An allocation living in the service. Released when dropped; never cloned.
#[derive(Debug)]
pub struct GlobalData {
    id: RemoteId,
    release: Arc<dyn Release>,
}

impl GlobalData {
    #[inline]
    pub fn new(id: RemoteId, release: Arc<dyn Release>) -> Self {
        Self { id, release }
    }

    #[inline]
    pub fn id(&self) -> RemoteId {
        self.id
    }
}

impl Drop for GlobalData {
    fn drop(&mut self) {
        self.release.release(self.id);
    }
}

/// A handle to a compute service. Must be safe to call from many tasks at once.
pub trait Client: std::fmt::Debug + Send + Sync {
    /// Name of the platform the client is bound to.
    fn platform(&self) -> &str;

    /// Copies a literal into a new service allocation.
    fn transfer_to_server(&self, literal: Literal)
    -> BoxFuture<'_, Result<GlobalData, ServiceError>>;

    /// Copies an allocation's contents back to the host.
    fn transfer<'a>(&'a self, data: &'a GlobalData) -> BoxFuture<'a, Result<Literal, ServiceError>>;

    /// Number of live allocations in the service.
    fn allocations(&self) -> BoxFuture<'_, Result<usize, ServiceError>>;
}
