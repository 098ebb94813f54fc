use std::sync::Arc;

use futures::FutureExt;

use super::{
    Executor, ExecutorError, ParallelTasks, ServiceTensor, Value, ValueFuture, ValueType,
};
use crate::{
    codec,
    message::{StructElement, ValueMessage},
    platform::{self, BoxFuture},
    service::{Client, Literal, PlatformRegistry},
};

/// An executor that keeps every tensor in a compute service and only composes structs locally.
#[derive(Debug, Clone)]
pub struct ServiceExecutor {
    /// Shared by every operation of the executor, possibly from several tasks at once.
    client: Arc<dyn Client>,
}

impl ServiceExecutor {
    #[inline]
    pub fn new(client: Arc<dyn Client>) -> Self {
        Self { client }
    }

    /// Name of the platform the executor targets.
    #[inline]
    pub fn platform(&self) -> &str {
        self.client.platform()
    }

    #[inline]
    pub fn client(&self) -> &Arc<dyn Client> {
        &self.client
    }
}

/// Creates an executor on the platform registered as `platform_name`.
pub async fn create_service_executor(
    registry: &PlatformRegistry,
    platform_name: &str,
) -> Result<Arc<ServiceExecutor>, ExecutorError> {
    let platform = registry.lookup(platform_name).map_err(|err| {
        ExecutorError::Internal(format!(
            "failed to find platform {platform_name}; it may not be registered: {err}"
        ))
    })?;
    let client = registry
        .get_or_create_client(platform.as_ref())
        .await
        .map_err(|err| {
            ExecutorError::Internal(format!(
                "failed to construct client for platform {platform_name}: {err}"
            ))
        })?;
    Ok(Arc::new(ServiceExecutor::new(client)))
}

#[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
async fn embed_tensor(client: &dyn Client, message: &ValueMessage) -> Result<Value, ExecutorError> {
    let tensor = codec::decode(message)?;
    let literal = Literal::from_host(&tensor);
    let data = client.transfer_to_server(literal).await.map_err(|err| {
        ExecutorError::InvalidArgument(format!("failed to transfer literal to service: {err}"))
    })?;
    let tensor = ServiceTensor::new(data, tensor.dtype());
    Ok(Value::Tensor(Arc::new(tensor)))
}

/// Embeds a message, children in order. Stops at the first child that fails.
fn create_value_any<'a>(
    client: &'a dyn Client,
    message: &'a ValueMessage,
) -> BoxFuture<'a, Result<Value, ExecutorError>> {
    async move {
        match (ValueType::of(message), message) {
            (ValueType::Tensor, _) => embed_tensor(client, message).await,
            (ValueType::Struct, ValueMessage::Struct(elements)) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(create_value_any(client, &element.value).await?);
                }
                Ok(Value::from(values))
            }
            (kind, _) => Err(ExecutorError::Unimplemented(format!(
                "cannot embed a value of type {kind} in a service executor"
            ))),
        }
    }
    .boxed()
}

#[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
async fn create_value_root(
    client: Arc<dyn Client>,
    message: ValueMessage,
) -> Result<Value, ExecutorError> {
    let value = create_value_any(client.as_ref(), &message).await;
    if let Err(err) = &value {
        log::debug!("failed to create value: {err}");
    }
    value
}

/// Where a materialized tensor goes in the output message.
enum Slot {
    Tensor(usize),
    Struct(Vec<Slot>),
}

impl Slot {
    fn fill(self, tensors: &mut [Option<ValueMessage>]) -> Result<ValueMessage, ExecutorError> {
        match self {
            Slot::Tensor(index) => tensors.get_mut(index).and_then(Option::take).ok_or_else(|| {
                ExecutorError::Internal(format!("tensor {index} was never materialized"))
            }),
            Slot::Struct(slots) => {
                let elements = slots
                    .into_iter()
                    .map(|slot| {
                        let value = slot.fill(tensors)?;
                        Ok(StructElement { name: None, value })
                    })
                    .collect::<Result<_, ExecutorError>>()?;
                Ok(ValueMessage::Struct(elements))
            }
        }
    }
}

/// Walks `value` depth-first, scheduling one transfer back to the host per tensor leaf.
///
/// Each unit owns its leaf and the client, so neither has to outlive anything on this stack.
fn schedule(
    client: &Arc<dyn Client>,
    value: &Value,
    tasks: &mut ParallelTasks<ValueMessage, ExecutorError>,
) -> Slot {
    match value {
        Value::Tensor(tensor) => {
            let client = client.clone();
            let tensor = tensor.clone();
            let index = tasks.add_task(async move {
                let literal = client.transfer(tensor.global_data()).await.map_err(|err| {
                    ExecutorError::Internal(format!(
                        "failed to transfer tensor from service to host: {err}"
                    ))
                })?;
                let tensor = literal.into_host(tensor.dtype()).map_err(|err| {
                    ExecutorError::Internal(format!("failed to convert literal to tensor: {err}"))
                })?;
                let message = platform::spawn_blocking(move || codec::encode(&tensor)).await?;
                Ok(message)
            });
            Slot::Tensor(index)
        }
        Value::Struct(values) => {
            let slots = values
                .iter()
                .map(|value| schedule(client, value, tasks))
                .collect();
            Slot::Struct(slots)
        }
    }
}

#[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
async fn materialize_value(
    client: Arc<dyn Client>,
    value: ValueFuture<Value>,
) -> Result<ValueMessage, ExecutorError> {
    let value = value.wait().await?;

    let mut tasks = ParallelTasks::new();
    let slot = schedule(&client, &value, &mut tasks);
    log::debug!("materializing {} tensors", tasks.len());

    let tensors = tasks.wait_all().await.inspect_err(|err| {
        log::warn!("materialization failed: {err}");
    })?;
    let mut tensors: Vec<_> = tensors.into_iter().map(Some).collect();
    slot.fill(&mut tensors)
}

impl Executor for ServiceExecutor {
    type Value = Value;

    #[inline]
    fn name(&self) -> &'static str {
        "ServiceExecutor"
    }

    fn create_value(&self, message: ValueMessage) -> Result<ValueFuture<Value>, ExecutorError> {
        let client = self.client.clone();
        Ok(ValueFuture::spawn(create_value_root(client, message)))
    }

    fn create_call(
        &self,
        _function: ValueFuture<Value>,
        _argument: Option<ValueFuture<Value>>,
    ) -> Result<ValueFuture<Value>, ExecutorError> {
        Err(ExecutorError::Unimplemented(
            "calls are not supported by the service executor".into(),
        ))
    }

    fn create_struct(
        &self,
        _members: Vec<ValueFuture<Value>>,
    ) -> Result<ValueFuture<Value>, ExecutorError> {
        Err(ExecutorError::Unimplemented(
            "structs of embedded values are not supported by the service executor".into(),
        ))
    }

    fn create_selection(
        &self,
        _value: ValueFuture<Value>,
        _index: u32,
    ) -> Result<ValueFuture<Value>, ExecutorError> {
        Err(ExecutorError::Unimplemented(
            "selections are not supported by the service executor".into(),
        ))
    }

    fn materialize(
        &self,
        value: ValueFuture<Value>,
    ) -> BoxFuture<'_, Result<ValueMessage, ExecutorError>> {
        materialize_value(self.client.clone(), value).boxed()
    }
}
