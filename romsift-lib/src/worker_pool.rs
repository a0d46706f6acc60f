//! Bounded pool of tokio workers.
//!
//! Work items go through a bounded `async-channel` whose receiver every
//! worker clones, so idle workers pull the next item as soon as they are
//! free. Results come back tagged with the item's submission index, which
//! lets callers either stream them or collect them in submission order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running pool. Dropping it does not stop the workers; they finish the
/// items already submitted and exit when the work channel drains.
pub struct WorkerPool<R: Send + 'static> {
    results: mpsc::UnboundedReceiver<(usize, R)>,
    _handles: Vec<JoinHandle<()>>,
}

impl<R: Send + 'static> WorkerPool<R> {
    /// Spawn `workers` tasks (at least one) and feed them `items`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<W, F, Fut>(workers: usize, items: Vec<W>, process: F) -> Self
    where
        W: Send + 'static,
        F: Fn(W) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let workers = workers.max(1);
        let (work_tx, work_rx) = async_channel::bounded::<(usize, W)>(workers);
        let (result_tx, results) = mpsc::unbounded_channel();
        let process = Arc::new(process);

        let handles = (0..workers)
            .map(|id| {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let process = process.clone();
                tokio::spawn(async move {
                    while let Ok((index, item)) = work_rx.recv().await {
                        let result = process(item).await;
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                    log::trace!("worker {id} done");
                })
            })
            .collect();
        drop(result_tx);

        tokio::spawn(async move {
            for item in items.into_iter().enumerate() {
                if work_tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Self {
            results,
            _handles: handles,
        }
    }

    /// Next finished item with its submission index, in completion order.
    /// `None` once every item is processed.
    pub async fn recv(&mut self) -> Option<(usize, R)> {
        self.results.recv().await
    }

    /// Wait for every item and return the results in submission order.
    pub async fn collect(mut self) -> Vec<R> {
        let mut finished = Vec::new();
        while let Some(result) = self.recv().await {
            finished.push(result);
        }
        finished.sort_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, r)| r).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn collects_in_submission_order() {
        let pool = WorkerPool::start(3, (0..10u64).collect(), |n| async move {
            tokio::time::sleep(Duration::from_millis(10 - n)).await;
            n * 2
        });
        assert_eq!(pool.collect().await, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_worker_count() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());
        let pool = WorkerPool::start(2, vec![(); 8], move |_| {
            let (a, p) = (a.clone(), p.clone());
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                a.fetch_sub(1, Ordering::SeqCst);
            }
        });
        assert_eq!(pool.collect().await.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_workers_still_runs() {
        let pool = WorkerPool::start(0, vec![1, 2], |n| async move { n });
        assert_eq!(pool.collect().await, vec![1, 2]);
    }
}
