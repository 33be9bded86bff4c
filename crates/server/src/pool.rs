//! A fixed-size pool of OS threads fed by a `crossbeam_channel` job queue.
//! Used both for the main client-connection worker pool (30 threads) and,
//! separately, for the small pool that runs `CONNECT` tunnel relay
//! directions — kept distinct so long-lived tunnels can never starve
//! keep-alive request handling.

use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A bounded pool of worker threads pulling jobs off a shared queue.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` threads named `"{name_prefix}-{n}"`, each looping on
    /// `receiver.recv()` until the channel is closed.
    pub fn new(size: usize, name_prefix: &str) -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
        let handles = (0..size)
            .map(|i| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("{name_prefix}-{i}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("spawning a worker pool thread")
            })
            .collect();
        WorkerPool { sender: Some(sender), handles }
    }

    /// Queues a job. The acceptor loop is the only producer in practice, so
    /// this never blocks on a full queue (the channel is unbounded) — the
    /// bound on concurrency comes from the fixed thread count, not the
    /// queue depth.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }

    /// Closes the job queue and joins every worker thread, waiting for
    /// in-flight jobs to finish. The caller is responsible for bounding how
    /// long that takes (see `Server::shutdown`'s grace deadline).
    pub fn join(mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Closes the job queue and waits up to `timeout` for every worker
    /// thread to finish. std has no API to forcibly cancel a running
    /// thread, so past the deadline this simply stops waiting: the joiner
    /// itself moves to a background thread and the caller proceeds, which
    /// in practice means the process exits around whatever is left.
    pub fn join_with_timeout(mut self, timeout: std::time::Duration) {
        self.sender.take();
        let handles = std::mem::take(&mut self.handles);
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            for handle in handles {
                let _ = handle.join();
            }
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv_timeout(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_submitted_jobs_across_the_pool() {
        let pool = WorkerPool::new(4, "test-worker");
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
