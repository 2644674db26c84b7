//! This module provides the fixed-size worker pool draining a benchmark phase's work queue.

use std::future::Future;
use std::num::NonZeroUsize;

use futures::future::{self, FutureExt};
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;

use crate::Error;

/// A bounded queue, fully populated and closed on creation, then drained by a pool of workers.
///
/// Popping never waits for new items: once the queue is observed empty, it stays empty.
///
/// # Example
/// ```
/// # tokio_test::block_on(async {
/// # use blobload::task::Queue;
/// let queue = Queue::new(vec!["a", "b"]);
///
/// assert_eq!(queue.pop().await, Some("a"));
/// assert_eq!(queue.pop().await, Some("b"));
/// assert_eq!(queue.pop().await, None);
/// # })
/// ```
#[derive(Debug)]
pub struct Queue<T> {
    receiver: Mutex<mpsc::Receiver<T>>,
    len: usize,
}

impl<T> Queue<T> {
    pub fn new(items: Vec<T>) -> Self {
        let len = items.len();
        let (sender, receiver) = mpsc::channel(len.max(1));

        for item in items {
            let sent = sender.try_send(item);
            debug_assert!(sent.is_ok(), "queue capacity matches its item count");
        }

        // dropping the only sender closes the queue, so that draining it does not wait for anything
        drop(sender);

        Self {
            receiver: Mutex::new(receiver),
            len,
        }
    }

    /// Pop the next item, or `None` once the queue is drained.
    pub async fn pop(&self) -> Option<T> {
        self.receiver.lock().await.try_recv().ok()
    }

    /// Number of items the queue was created with.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A fixed-size pool of workers running until their own work is exhausted.
///
/// Each worker is spawned from a factory receiving the worker index, and typically loops on a shared [`Queue`].
/// The pool is complete once every worker has returned.
///
/// # Fail fast
/// The first worker error is returned by [`Pool::join()`] and aborts every other worker. Dropping the pool also
/// aborts the workers still running.
///
/// # Example
/// ```
/// # tokio_test::block_on(async {
/// # use std::num::NonZeroUsize;
/// # use std::sync::Arc;
/// # use blobload::task::{Pool, Queue};
/// let queue = Arc::new(Queue::new((0..6).collect()));
///
/// let pool = Pool::start(NonZeroUsize::new(3).unwrap(), |id| {
///     let queue = Arc::clone(&queue);
///
///     async move {
///         while let Some(i) = queue.pop().await {
///             println!("Hello from task #{i} on worker {id}!");
///         }
///
///         Ok::<_, blobload::Error>(())
///     }
/// });
///
/// pool.join().await.unwrap();
/// # })
/// ```
#[derive(Debug, Default)]
pub struct Pool {
    workers: Vec<Worker>,
}

impl Pool {
    /// Start a pool with `size` workers.
    pub fn start<F, Fut>(size: NonZeroUsize, mut spawn: F) -> Self
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let workers = (0..size.get()).map(|id| Worker::new(id, spawn(id))).collect();

        Self { workers }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to complete, or for the first one to fail.
    pub async fn join(mut self) -> Result<(), Error> {
        let workers = std::mem::take(&mut self.workers);

        future::try_join_all(workers).await?;

        Ok(())
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    handle: tokio::task::JoinHandle<Result<(), Error>>,
}

impl Worker {
    fn new(id: usize, task: impl Future<Output = Result<(), Error>> + Send + 'static) -> Worker {
        tracing::debug!("Starting worker {id}...");

        Worker {
            id,
            handle: tokio::spawn(task.in_current_span()),
        }
    }
}

impl Future for Worker {
    type Output = Result<(), Error>;

    #[inline]
    fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Self::Output> {
        self.handle.poll_unpin(cx).map(|joined| Ok(joined??))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            tracing::debug!("Aborting worker {}...", self.id);

            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn size(size: usize) -> NonZeroUsize {
        NonZeroUsize::new(size).unwrap()
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let queue = Queue::<u8>::new(vec![]);

        assert!(queue.is_empty());
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_drains_queue() {
        for workers in [1, 2, 7, 64] {
            let queue = Arc::new(Queue::new((0..50).collect::<Vec<u32>>()));
            let drained = Arc::new(std::sync::Mutex::new(vec![]));

            let pool = Pool::start(size(workers), |_| {
                let queue = Arc::clone(&queue);
                let drained = Arc::clone(&drained);

                async move {
                    while let Some(item) = queue.pop().await {
                        tokio::task::yield_now().await;
                        drained.lock().unwrap().push(item);
                    }
                    Ok(())
                }
            });
            assert_eq!(pool.size(), workers);

            pool.join().await.unwrap();

            let mut drained = std::mem::take(&mut *drained.lock().unwrap());
            drained.sort_unstable();
            assert_eq!(drained, (0..50).collect::<Vec<_>>(), "{workers} workers");
        }
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_pool_fails_fast() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let pool = Pool::start(size(3), |id| {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);

            async move {
                started.fetch_add(1, Ordering::SeqCst);

                if id == 0 {
                    return Err(Error::Config("worker 0 failed".into()));
                }

                tokio::time::sleep(Duration::from_secs(3600)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let err = tokio::time::timeout(Duration::from_secs(10), pool.join()).await.unwrap().unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(logs_contain("Aborting worker"));
    }

    #[tokio::test]
    async fn test_worker_panic_is_an_error() {
        let pool = Pool::start(size(1), |_| async {
            let items: Vec<u8> = vec![];
            assert!(!items.is_empty(), "boom");
            Ok(())
        });

        assert!(matches!(pool.join().await, Err(Error::Join(_))));
    }
}
