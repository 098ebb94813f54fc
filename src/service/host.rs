use std::sync::Arc;

use futures::FutureExt;
use rustc_hash::FxHashMap as HashMap;

use super::{Client, GlobalData, Literal, Release, RemoteId, ServiceError};
use crate::platform::{self, BoxFuture};

pub const HOST_PLATFORM: &str = "host";

#[derive(Debug)]
enum ServiceEvent {
    Upload {
        literal: Literal,
        sender: flume::Sender<Result<RemoteId, ServiceError>>,
    },
    Download {
        id: RemoteId,
        sender: flume::Sender<Result<Literal, ServiceError>>,
    },
    Release {
        id: RemoteId,
    },
    Count {
        sender: flume::Sender<usize>,
    },
}

#[derive(Debug, Default)]
struct Backend {
    /// Maximum number of bytes the service may hold.
    capacity: Option<usize>,
    /// Number of bytes currently held.
    used: usize,
    /// Allocations in the service.
    buffers: HashMap<RemoteId, Literal>,
}

impl Backend {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    fn upload(&mut self, literal: Literal) -> Result<RemoteId, ServiceError> {
        let requested = literal.data_size();
        if let Some(capacity) = self.capacity {
            let available = capacity.saturating_sub(self.used);
            if requested > available {
                return Err(ServiceError::ResourceExhausted {
                    requested,
                    available,
                });
            }
        }

        let id = RemoteId::new();
        log::debug!("upload {id}: {} bytes of {}", requested, literal.primitive_type());
        self.used += requested;
        self.buffers.insert(id, literal);
        Ok(id)
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    fn download(&self, id: RemoteId) -> Result<Literal, ServiceError> {
        log::debug!("download {id}");
        self.buffers.get(&id).cloned().ok_or(ServiceError::NotFound(id))
    }

    fn release(&mut self, id: RemoteId) {
        match self.buffers.remove(&id) {
            Some(literal) => {
                log::debug!("release {id}");
                self.used -= literal.data_size();
            }
            None => log::error!("unable to release unknown allocation {id}"),
        }
    }
}

#[derive(Debug, Clone)]
struct HostRelease(flume::Sender<ServiceEvent>);

impl Release for HostRelease {
    fn release(&self, id: RemoteId) {
        _ = self.0.send(ServiceEvent::Release { id })
    }
}

/// Client of a service that keeps its allocations in host memory, served by a background task.
#[derive(Debug, Clone)]
pub struct HostClient {
    /// Sends requests to the backend.
    sender: flume::Sender<ServiceEvent>,
    /// Shared by every [`GlobalData`] this client hands out.
    release: Arc<HostRelease>,
}

impl Client for HostClient {
    #[inline]
    fn platform(&self) -> &str {
        HOST_PLATFORM
    }

    fn transfer_to_server(
        &self,
        literal: Literal,
    ) -> BoxFuture<'_, Result<GlobalData, ServiceError>> {
        async move {
            let (sender, receiver) = flume::bounded(0);
            let event = ServiceEvent::Upload { literal, sender };
            self.sender.send_async(event).await?;
            let id = receiver.recv_async().await??;
            Ok(GlobalData::new(id, self.release.clone()))
        }
        .boxed()
    }

    fn transfer<'a>(&'a self, data: &'a GlobalData) -> BoxFuture<'a, Result<Literal, ServiceError>> {
        async move {
            let (sender, receiver) = flume::bounded(0);
            let id = data.id();
            self.sender
                .send_async(ServiceEvent::Download { id, sender })
                .await?;
            receiver.recv_async().await?
        }
        .boxed()
    }

    fn allocations(&self) -> BoxFuture<'_, Result<usize, ServiceError>> {
        async move {
            let (sender, receiver) = flume::bounded(0);
            self.sender.send_async(ServiceEvent::Count { sender }).await?;
            Ok(receiver.recv_async().await?)
        }
        .boxed()
    }
}

#[derive(Debug, Default, Clone)]
pub struct HostBuilder {
    pub capacity: Option<usize>,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the total number of bytes the service may hold.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub async fn build(self) -> HostClient {
        let backend = Backend {
            capacity: self.capacity,
            ..Default::default()
        };

        let (sender, receiver) = flume::unbounded();
        platform::spawn(serve(backend, receiver));

        let release = Arc::new(HostRelease(sender.clone()));
        HostClient { sender, release }
    }
}

async fn serve(mut backend: Backend, receiver: flume::Receiver<ServiceEvent>) {
    while let Ok(event) = receiver.recv_async().await {
        match event {
            ServiceEvent::Upload { literal, sender } => {
                let id = backend.upload(literal);
                // the requester is gone, so nobody owns the allocation
                if let Err(err) = sender.send_async(id).await {
                    log::error!("upload: requester is gone");
                    if let Ok(id) = err.into_inner() {
                        backend.release(id);
                    }
                }
            }
            ServiceEvent::Download { id, sender } => {
                let data = backend.download(id);
                if sender.send_async(data).await.is_err() {
                    log::error!("download {id}: requester is gone");
                }
            }
            ServiceEvent::Release { id } => backend.release(id),
            ServiceEvent::Count { sender } => {
                let count = backend.buffers.len();
                if sender.send_async(count).await.is_err() {
                    log::error!("allocation count: requester is gone");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, sync::Arc};

    use itertools::Itertools;

    use super::{HostBuilder, ServiceEvent};
    use crate::{
        codec::HostTensor,
        num::DataType,
        service::{Client, GlobalData, Literal, Release, RemoteId, ServiceError},
    };

    #[derive(Debug)]
    struct NoRelease;

    impl Release for NoRelease {
        fn release(&self, _id: RemoteId) {}
    }

    #[tokio::test]
    async fn test_transfer() -> Result<(), Box<dyn Error>> {
        let client = HostBuilder::new().build().await;

        let data = (0..12).map(|x| x as f32 * 0.5).collect_vec();
        let tensor = HostTensor::from_slice([4, 3], &data)?;
        let global = client.transfer_to_server(Literal::from_host(&tensor)).await?;
        assert_eq!(client.allocations().await?, 1);

        let literal = client.transfer(&global).await?;
        let output = literal.into_host(DataType::F32)?;
        assert_eq!(output.to_vec::<f32>()?, data);

        drop(global);
        assert_eq!(client.allocations().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_capacity() -> Result<(), Box<dyn Error>> {
        let client = HostBuilder::new().capacity(16).build().await;

        let tensor = HostTensor::from_slice([3], &[1i32, 2, 3])?;
        let first = client.transfer_to_server(Literal::from_host(&tensor)).await?;

        let result = client.transfer_to_server(Literal::from_host(&tensor)).await;
        assert_eq!(
            result.map(|data| data.id()),
            Err(ServiceError::ResourceExhausted {
                requested: 12,
                available: 4,
            })
        );

        // releasing makes room again
        drop(first);
        let second = client.transfer_to_server(Literal::from_host(&tensor)).await?;
        assert_eq!(client.allocations().await?, 1);
        drop(second);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_allocation() {
        let client = HostBuilder::new().build().await;
        let id = RemoteId::new();
        let data = GlobalData::new(id, Arc::new(NoRelease));
        assert_eq!(client.transfer(&data).await, Err(ServiceError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_dropped_reply() -> Result<(), Box<dyn Error>> {
        let client = HostBuilder::new().build().await;
        let tensor = HostTensor::from_slice([2], &[1u8, 2])?;
        let global = client.transfer_to_server(Literal::from_host(&tensor)).await?;

        // replies to requesters that are gone are dropped; the service keeps serving
        let (sender, receiver) = flume::bounded(0);
        drop(receiver);
        let id = global.id();
        client
            .sender
            .send_async(ServiceEvent::Download { id, sender })
            .await?;

        let (sender, receiver) = flume::bounded(0);
        drop(receiver);
        let literal = Literal::from_host(&tensor);
        client
            .sender
            .send_async(ServiceEvent::Upload { literal, sender })
            .await?;

        assert_eq!(client.allocations().await?, 1);
        drop(global);
        assert_eq!(client.allocations().await?, 0);
        Ok(())
    }
}
