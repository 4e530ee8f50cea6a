//! Device-API worker threads
//!
//! Slow device operations run on one dedicated OS thread per domain (for
//! example `filesystem`). Jobs posted to a worker run in submission order.
//! A job that panics is logged and the worker moves on to the next one.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::EventError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A named thread draining a FIFO job queue
pub struct WorkerThread {
    domain: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    /// Start the worker thread for `domain`.
    pub fn spawn(domain: impl Into<String>) -> Result<Self, EventError> {
        let domain = domain.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let thread_domain = domain.clone();
        let handle = std::thread::Builder::new()
            .name(format!("worker-{domain}"))
            .spawn(move || {
                tracing::debug!(domain = %thread_domain, "Worker started");
                while let Some(job) = receiver.blocking_recv() {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                        let message = extract_panic_message(&panic);
                        tracing::error!(domain = %thread_domain, message = %message, "Worker job panicked");
                    }
                }
                tracing::debug!(domain = %thread_domain, "Worker stopped");
            })
            .map_err(|source| EventError::Spawn {
                domain: domain.clone(),
                source,
            })?;

        Ok(Self {
            domain,
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Queue `job` behind everything posted before it.
    pub fn post<F>(&self, job: F) -> Result<(), EventError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let stopped = || EventError::WorkerStopped(self.domain.clone());
        sender
            .as_ref()
            .ok_or_else(stopped)?
            .send(Box::new(job))
            .map_err(|_| stopped())
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Stop accepting jobs, let queued jobs finish and join the thread.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let Some(handle) = self.handle.lock().take() else {
            return;
        };

        // The last reference can be dropped by a job on this very thread.
        if handle.thread().id() == std::thread::current().id() {
            return;
        }

        if handle.join().is_err() {
            tracing::error!(domain = %self.domain, "Worker thread panicked");
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("domain", &self.domain)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Worker threads keyed by domain
#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: DashMap<String, Arc<WorkerThread>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool with one worker already running per domain
    pub fn with_domains<I, S>(domains: I) -> Result<Self, EventError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pool = Self::new();
        for domain in domains {
            pool.get_or_spawn(domain.as_ref())?;
        }
        Ok(pool)
    }

    /// The worker for `domain`, started on first use
    pub fn get_or_spawn(&self, domain: &str) -> Result<Arc<WorkerThread>, EventError> {
        match self.workers.entry(domain.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let worker = Arc::new(WorkerThread::spawn(domain)?);
                entry.insert(worker.clone());
                Ok(worker)
            }
        }
    }

    pub fn get(&self, domain: &str) -> Option<Arc<WorkerThread>> {
        self.workers.get(domain).map(|w| w.value().clone())
    }

    /// Post a job to the worker of `domain`, starting it if needed
    pub fn post<F>(&self, domain: &str, job: F) -> Result<(), EventError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.get_or_spawn(domain)?.post(job)
    }

    /// Running domains, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.workers.iter().map(|w| w.key().clone()).collect();
        domains.sort();
        domains
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stop and join every worker
    pub fn shutdown(&self) {
        let workers: Vec<Arc<WorkerThread>> = self.workers.iter().map(|w| w.value().clone()).collect();
        self.workers.clear();
        for worker in workers {
            worker.shutdown();
        }
    }
}

/// Extract a panic message from a panic payload
fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_submission_order() {
        let worker = WorkerThread::spawn("ordering").unwrap();
        let (tx, rx) = std_mpsc::channel();

        for i in 0..50 {
            let tx = tx.clone();
            worker.post(move || tx.send(i).unwrap()).unwrap();
        }
        worker.shutdown();

        let received: Vec<i32> = rx.try_iter().collect();
        assert_eq!(received, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_job_does_not_stop_worker() {
        let worker = WorkerThread::spawn("panics").unwrap();
        let (tx, rx) = std_mpsc::channel();

        worker.post(|| panic!("device failure")).unwrap();
        worker.post(move || tx.send("after").unwrap()).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "after");
    }

    #[test]
    fn test_post_after_shutdown_fails() {
        let worker = WorkerThread::spawn("stopped").unwrap();
        worker.shutdown();
        assert!(!worker.is_running());
        assert!(matches!(worker.post(|| {}), Err(EventError::WorkerStopped(d)) if d == "stopped"));
    }

    #[test]
    fn test_worker_runs_on_named_thread() {
        let worker = WorkerThread::spawn("filesystem").unwrap();
        let (tx, rx) = std_mpsc::channel();
        worker
            .post(move || tx.send(std::thread::current().name().map(str::to_string)).unwrap())
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("worker-filesystem"));
    }

    #[test]
    fn test_pool_reuses_domain_workers() {
        let pool = WorkerPool::with_domains(["filesystem", "storage"]).unwrap();
        assert_eq!(pool.domains(), vec!["filesystem", "storage"]);

        let first = pool.get_or_spawn("filesystem").unwrap();
        let second = pool.get_or_spawn("filesystem").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let (tx, rx) = std_mpsc::channel();
        pool.post("messaging", move || tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(pool.len(), 3);

        pool.shutdown();
        assert!(pool.is_empty());
        assert!(!first.is_running());
    }

    #[test]
    fn test_extract_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(extract_panic_message(&payload), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(extract_panic_message(&payload), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(extract_panic_message(&payload), "Unknown panic");
    }
}
