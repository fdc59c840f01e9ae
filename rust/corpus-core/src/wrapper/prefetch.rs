// rust/corpus-core/src/wrapper/prefetch.rs

//! Ordered, bounded-concurrency prefetching over wrapped samples.
//!
//! Samples are produced on the consumer's thread in index order, and each
//! one's load step runs on a fixed pool of worker threads. At most
//! `prefetch` load steps are in flight; results come back strictly in index
//! order whatever order the workers finish in.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::debug;

pub use crate::config::PrefetchConfig;
use crate::error::{CorpusError, Result};

/// A sample whose expensive load step can run ahead of consumption.
pub trait Prefetch: Send + 'static {
    fn id(&self) -> &str;

    /// Runs the load step, caching its result inside the sample.
    fn prefetch(&self) -> Result<()>;
}

struct Job<T> {
    sample: T,
    cancelled: Arc<AtomicBool>,
    reply: Sender<Result<T>>,
}

enum Pending<T> {
    InFlight {
        cancelled: Arc<AtomicBool>,
        reply: Receiver<Result<T>>,
    },
    /// A source error, kept in line so it surfaces at its own position.
    Failed(CorpusError),
}

impl<T> Pending<T> {
    fn cancel(&self) {
        if let Pending::InFlight { cancelled, .. } = self {
            cancelled.store(true, Ordering::Relaxed);
        }
    }
}

fn worker_loop<T: Prefetch>(jobs: Receiver<Job<T>>, stop_flag: Arc<AtomicBool>) {
    while let Ok(job) = jobs.recv() {
        if stop_flag.load(Ordering::Relaxed) || job.cancelled.load(Ordering::Relaxed) {
            continue;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.sample.prefetch()));
        let result = match outcome {
            Ok(Ok(())) => Ok(job.sample),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CorpusError::load(
                job.sample.id(),
                "prefetch worker panicked",
            )),
        };
        // The consumer may have gone away; nothing is waiting then.
        let _ = job.reply.send(result);
    }
}

/// Iterator running each sample's load step on a worker pool.
///
/// The first error, whether from the source or from a load step, is yielded
/// at its position; everything still queued is then cancelled and the
/// iterator ends. Dropping the iterator early cancels outstanding work the
/// same way. With `shutdown_wait` set, teardown joins the workers, so it
/// waits for load steps already running.
pub struct ThreadedPrefetchIterator<'a, T: Prefetch> {
    source: Box<dyn Iterator<Item = Result<T>> + 'a>,
    source_done: bool,
    jobs: Option<Sender<Job<T>>>,
    workers: Vec<JoinHandle<()>>,
    pending: VecDeque<Pending<T>>,
    stop_flag: Arc<AtomicBool>,
    depth: usize,
    shutdown_wait: bool,
    done: bool,
}

impl<'a, T: Prefetch> ThreadedPrefetchIterator<'a, T> {
    pub fn new<I>(source: I, config: &PrefetchConfig) -> Result<Self>
    where
        I: Iterator<Item = Result<T>> + 'a,
    {
        config.validate()?;
        let (sender, receiver) = channel::unbounded::<Job<T>>();
        let stop_flag = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.num_workers);
        for i in 0..config.num_workers {
            let jobs = receiver.clone();
            let stop = stop_flag.clone();
            let handle = thread::Builder::new()
                .name(format!("corpus-prefetch-{i}"))
                .spawn(move || worker_loop(jobs, stop))
                .map_err(|e| CorpusError::config_with_source("failed to spawn prefetch worker", e))?;
            workers.push(handle);
        }
        debug!(
            num_workers = config.num_workers,
            prefetch = config.prefetch,
            "prefetch pool started"
        );

        Ok(Self {
            source: Box::new(source),
            source_done: false,
            jobs: Some(sender),
            workers,
            pending: VecDeque::with_capacity(config.prefetch),
            stop_flag,
            depth: config.prefetch,
            shutdown_wait: config.shutdown_wait,
            done: false,
        })
    }

    /// Number of load steps submitted but not yet yielded.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn submit(&mut self, sample: T) -> Pending<T> {
        let Some(jobs) = &self.jobs else {
            return Pending::Failed(CorpusError::load(sample.id(), "prefetch pool is shut down"));
        };
        let id = sample.id().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let (reply_tx, reply_rx) = channel::bounded(1);
        let job = Job {
            sample,
            cancelled: cancelled.clone(),
            reply: reply_tx,
        };
        match jobs.send(job) {
            Ok(()) => Pending::InFlight {
                cancelled,
                reply: reply_rx,
            },
            Err(_) => Pending::Failed(CorpusError::load(id, "prefetch pool is shut down")),
        }
    }

    fn fill(&mut self) {
        while !self.source_done && self.pending.len() < self.depth {
            match self.source.next() {
                Some(Ok(sample)) => {
                    let pending = self.submit(sample);
                    self.pending.push_back(pending);
                }
                Some(Err(e)) => {
                    self.pending.push_back(Pending::Failed(e));
                    self.source_done = true;
                }
                None => self.source_done = true,
            }
        }
    }

    fn shutdown(&mut self) {
        if self.jobs.is_none() {
            return;
        }
        self.stop_flag.store(true, Ordering::Relaxed);
        for pending in self.pending.drain(..) {
            pending.cancel();
        }
        self.jobs = None;

        let workers = std::mem::take(&mut self.workers);
        if self.shutdown_wait {
            for handle in workers {
                let _ = handle.join();
            }
        }
        debug!(wait = self.shutdown_wait, "prefetch pool torn down");
    }
}

impl<T: Prefetch> Iterator for ThreadedPrefetchIterator<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.fill();
        let Some(front) = self.pending.pop_front() else {
            self.done = true;
            self.shutdown();
            return None;
        };

        let result = match front {
            Pending::Failed(e) => Err(e),
            Pending::InFlight { reply, .. } => reply.recv().unwrap_or_else(|_| {
                Err(CorpusError::load(
                    "<prefetch>",
                    "prefetch worker exited before replying",
                ))
            }),
        };
        if result.is_err() {
            self.done = true;
            self.shutdown();
        }
        Some(result)
    }
}

impl<T: Prefetch> Drop for ThreadedPrefetchIterator<'_, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;
    use std::time::Duration;

    struct Slow {
        id: String,
        delay_ms: u64,
        fail: bool,
        loaded: OnceLock<usize>,
        started: Arc<AtomicUsize>,
    }

    impl Prefetch for Slow {
        fn id(&self) -> &str {
            &self.id
        }

        fn prefetch(&self) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(self.delay_ms));
            if self.fail {
                return Err(CorpusError::load(&self.id, "decode failed"));
            }
            if self.id == "panic" {
                panic!("decoder crashed");
            }
            let _ = self.loaded.set(self.id.len());
            Ok(())
        }
    }

    fn items(
        n: usize,
        started: &Arc<AtomicUsize>,
        fail_at: Option<usize>,
    ) -> Vec<Result<Slow>> {
        (0..n)
            .map(|i| {
                Ok(Slow {
                    id: format!("s{i}"),
                    // Later samples finish first.
                    delay_ms: ((n - i) % 4) as u64 * 2,
                    fail: fail_at == Some(i),
                    loaded: OnceLock::new(),
                    started: started.clone(),
                })
            })
            .collect()
    }

    fn config(num_workers: usize, prefetch: usize) -> PrefetchConfig {
        PrefetchConfig::default()
            .with_num_workers(num_workers)
            .with_prefetch(prefetch)
    }

    #[test]
    fn test_preserves_order() {
        for (workers, depth) in [(1, 1), (4, 8), (8, 2), (3, 50)] {
            let started = Arc::new(AtomicUsize::new(0));
            let iter =
                ThreadedPrefetchIterator::new(items(50, &started, None).into_iter(), &config(workers, depth))
                    .unwrap();
            let out: Vec<_> = iter.map(|r| r.unwrap()).collect();
            let ids: Vec<_> = out.iter().map(|s| s.id.clone()).collect();
            let expected: Vec<_> = (0..50).map(|i| format!("s{i}")).collect();
            assert_eq!(ids, expected, "workers={workers} prefetch={depth}");
            assert!(out.iter().all(|s| s.loaded.get().is_some()));
        }
    }

    #[test]
    fn test_in_flight_is_bounded() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut iter =
            ThreadedPrefetchIterator::new(items(20, &started, None).into_iter(), &config(2, 3))
                .unwrap();
        iter.next().unwrap().unwrap();
        assert!(iter.in_flight() <= 3);
    }

    #[test]
    fn test_error_is_yielded_in_position_and_stops() {
        let started = Arc::new(AtomicUsize::new(0));
        let iter = ThreadedPrefetchIterator::new(items(10, &started, Some(3)).into_iter(), &config(4, 4))
            .unwrap();
        let out: Vec<_> = iter.collect();
        assert_eq!(out.len(), 4);
        assert!(out[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(out[3], Err(CorpusError::Load { .. })));
    }

    #[test]
    fn test_source_error_keeps_position() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut source = items(5, &started, None);
        source[2] = Err(CorpusError::index_out_of_range(2, 2));
        let iter = ThreadedPrefetchIterator::new(source.into_iter(), &config(2, 4)).unwrap();
        let out: Vec<_> = iter.collect();
        assert_eq!(out.len(), 3);
        assert!(out[1].is_ok());
        assert!(matches!(out[2], Err(CorpusError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_worker_panic_becomes_error() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut source = items(3, &started, None);
        if let Ok(sample) = &mut source[1] {
            sample.id = "panic".to_string();
        }
        let iter = ThreadedPrefetchIterator::new(source.into_iter(), &config(2, 2)).unwrap();
        let out: Vec<_> = iter.collect();
        assert_eq!(out.len(), 2);
        let err = out[1].as_ref().err().unwrap();
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_early_drop_cancels_queued_work() {
        let started = Arc::new(AtomicUsize::new(0));
        let config = config(1, 2).with_shutdown_wait(true);
        let mut iter = ThreadedPrefetchIterator::new(items(40, &started, None).into_iter(), &config)
            .unwrap();
        iter.next().unwrap().unwrap();
        drop(iter);
        assert!(started.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let started = Arc::new(AtomicUsize::new(0));
        assert!(ThreadedPrefetchIterator::new(items(1, &started, None).into_iter(), &config(0, 1)).is_err());
        assert!(ThreadedPrefetchIterator::new(items(1, &started, None).into_iter(), &config(1, 0)).is_err());
    }
}
