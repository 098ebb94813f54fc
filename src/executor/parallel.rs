use futures::{StreamExt, stream::FuturesUnordered};
use tokio::task::{JoinError, JoinHandle};

use crate::platform;

/// A group of independent units of work that run concurrently and are joined together.
///
/// Units start as soon as they are added. They must not depend on each other: the join gives no
/// ordering among them, only that all of them have finished.
#[derive(Debug)]
pub struct ParallelTasks<T, E> {
    tasks: Vec<JoinHandle<Result<T, E>>>,
}

impl<T, E> Default for ParallelTasks<T, E> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<T, E> ParallelTasks<T, E>
where
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a unit and returns its index among the outputs of [`Self::wait_all`].
    pub fn add_task<F>(&mut self, future: F) -> usize
    where
        F: std::future::Future<Output = Result<T, E>> + Send + 'static,
    {
        let index = self.tasks.len();
        self.tasks.push(platform::spawn(future));
        index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every unit to finish.
    ///
    /// Returns the outputs in the order the units were added, or the first failure to complete.
    /// A failure does not stop the other units; they still run to the end before this returns.
    /// Which failure is reported when several units fail at about the same time is unspecified.
    pub async fn wait_all(self) -> Result<Vec<T>, E> {
        let mut outputs: Vec<Option<T>> = (0..self.tasks.len()).map(|_| None).collect();
        let mut error = None;

        let mut pending: FuturesUnordered<_> = self
            .tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| async move { (index, task.await) })
            .collect();
        while let Some((index, result)) = pending.next().await {
            match result.map_err(E::from).and_then(|output| output) {
                Ok(output) => outputs[index] = Some(output),
                Err(err) => _ = error.get_or_insert(err),
            }
        }

        match error {
            Some(err) => Err(err),
            None => Ok(outputs.into_iter().flatten().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use tokio::task::JoinError;

    use super::ParallelTasks;

    #[derive(Debug, PartialEq, Eq)]
    enum TestError {
        Unit(usize),
        Join,
    }

    impl From<JoinError> for TestError {
        fn from(_: JoinError) -> Self {
            Self::Join
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_outputs_in_order() {
        let mut tasks = ParallelTasks::<usize, TestError>::new();
        for index in 0..16 {
            // later units finish first
            let delay = Duration::from_millis(32 - 2 * index as u64);
            let id = tasks.add_task(async move {
                tokio::time::sleep(delay).await;
                Ok(index)
            });
            assert_eq!(id, index);
        }
        assert_eq!(tasks.len(), 16);
        assert_eq!(tasks.wait_all().await, Ok((0..16).collect()));
    }

    #[tokio::test]
    async fn test_empty() {
        let tasks = ParallelTasks::<(), TestError>::new();
        assert!(tasks.is_empty());
        assert_eq!(tasks.wait_all().await, Ok(vec![]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_waits_for_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut tasks = ParallelTasks::<(), TestError>::new();

        tasks.add_task(async { Err(TestError::Unit(0)) });
        for _ in 0..4 {
            let finished = finished.clone();
            tasks.add_task(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        assert_eq!(tasks.wait_all().await, Err(TestError::Unit(0)));
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_first_completed_failure() {
        let mut tasks = ParallelTasks::<(), TestError>::new();
        tasks.add_task(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(TestError::Unit(0))
        });
        tasks.add_task(async { Err(TestError::Unit(1)) });
        assert_eq!(tasks.wait_all().await, Err(TestError::Unit(1)));
    }
}
