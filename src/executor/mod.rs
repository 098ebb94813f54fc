//! Executors embed [`ValueMessage`]s as executor-resident values and materialize them back.
//!
//! ## Key Components
//! 1. **Values**: [`Value`] is a tree of structs whose leaves are tensors held by the service,
//!    shared by reference count so copies never transfer data again.
//! 2. **Futures**: [`ValueFuture`] is a one-shot result with any number of waiters.
//! 3. **Fan-out**: [`ParallelTasks`] runs independent transfers concurrently and joins them.
//! 4. **Executors**: the [`Executor`] trait is the surface orchestration layers call;
//!    [`ServiceExecutor`] implements it on top of a [`Client`](crate::service::Client).

use derive_more::Display;
use futures::{FutureExt, future::Shared};
use thiserror::Error;

use crate::{
    codec::CodecError,
    message::ValueMessage,
    platform::{self, BoxFuture},
};

pub use parallel::ParallelTasks;
pub use service::{ServiceExecutor, create_service_executor};
pub use value::{ServiceTensor, Value, ValueType};

pub mod parallel;
pub mod service;
pub mod value;

/// Coarse classification of an [`ExecutorError`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Unimplemented,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("failed to decode value: {0}")]
    Decode(#[from] CodecError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::Decode(_) | ExecutorError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            ExecutorError::Unimplemented(_) => ErrorKind::Unimplemented,
            ExecutorError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<tokio::task::JoinError> for ExecutorError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Internal(format!("task failed to complete: {value}"))
    }
}

/// A value being computed in the background.
///
/// Resolved exactly once. Clones share the same result, and every waiter observes it whole.
#[derive(Clone)]
pub struct ValueFuture<V: Clone>(Shared<BoxFuture<'static, Result<V, ExecutorError>>>);

impl<V: Clone> std::fmt::Debug for ValueFuture<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.0.peek() {
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "failed",
            None => "pending",
        };
        f.debug_tuple("ValueFuture").field(&state).finish()
    }
}

impl<V: Clone + Send + Sync + 'static> ValueFuture<V> {
    /// Runs `future` on the task substrate and returns a handle to its result.
    pub fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<V, ExecutorError>> + Send + 'static,
    {
        let handle = platform::spawn(future);
        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(err.into()),
            }
        };
        Self(future.boxed().shared())
    }

    /// A future that is already resolved.
    pub fn ready(result: Result<V, ExecutorError>) -> Self {
        Self(futures::future::ready(result).boxed().shared())
    }

    /// Waits for the result. Any number of waiters may wait at once.
    pub async fn wait(&self) -> Result<V, ExecutorError> {
        self.0.clone().await
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.0.peek().is_some()
    }
}

/// The operations an executor offers to orchestration layers.
pub trait Executor: Send + Sync {
    type Value: Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Starts embedding `message` and returns without waiting for it.
    fn create_value(&self, message: ValueMessage)
    -> Result<ValueFuture<Self::Value>, ExecutorError>;

    /// Applies a function value to an optional argument.
    fn create_call(
        &self,
        function: ValueFuture<Self::Value>,
        argument: Option<ValueFuture<Self::Value>>,
    ) -> Result<ValueFuture<Self::Value>, ExecutorError>;

    /// Builds a struct out of values that are already embedded.
    fn create_struct(
        &self,
        members: Vec<ValueFuture<Self::Value>>,
    ) -> Result<ValueFuture<Self::Value>, ExecutorError>;

    /// Selects the `index`-th member of a struct value.
    fn create_selection(
        &self,
        value: ValueFuture<Self::Value>,
        index: u32,
    ) -> Result<ValueFuture<Self::Value>, ExecutorError>;

    /// Waits for `value` and converts it back into a message.
    fn materialize(
        &self,
        value: ValueFuture<Self::Value>,
    ) -> BoxFuture<'_, Result<ValueMessage, ExecutorError>>;
}

#[cfg(test)]
mod tests {
    use std::{
        error::Error,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::{ErrorKind, ExecutorError, ValueFuture};
    use crate::codec::CodecError;

    #[test]
    fn test_kind() {
        let err = ExecutorError::from(CodecError::NotTensor("struct"));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            ExecutorError::Unimplemented("call".into()).kind(),
            ErrorKind::Unimplemented
        );
        assert_eq!(
            ExecutorError::Internal("oops".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_waiters() -> Result<(), Box<dyn Error>> {
        let runs = Arc::new(AtomicUsize::new(0));
        let future = {
            let runs = runs.clone();
            ValueFuture::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(42usize)
            })
        };

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let future = future.clone();
                tokio::spawn(async move { future.wait().await })
            })
            .collect();
        for waiter in waiters {
            assert_eq!(waiter.await??, 42);
        }

        // resolved futures answer without running again
        assert!(future.is_resolved());
        assert_eq!(future.wait().await?, 42);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let err = ExecutorError::Internal("remote service crashed".into());
        let future = ValueFuture::<usize>::spawn({
            let err = err.clone();
            async move { Err(err) }
        });
        let other = future.clone();
        assert_eq!(future.wait().await, Err(err.clone()));
        assert_eq!(other.wait().await, Err(err));
    }

    #[tokio::test]
    async fn test_panic_is_internal() {
        let future = ValueFuture::<usize>::spawn(async {
            let value: Option<usize> = None;
            Ok(value.expect("boom"))
        });
        let err = future.wait().await.err();
        assert_eq!(err.map(|err| err.kind()), Some(ErrorKind::Internal));
    }
}
