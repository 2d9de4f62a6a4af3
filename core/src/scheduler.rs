//! Off-thread request dispatch with completions delivered to the caller.
//!
//! # Design
//! A `Scheduler` owns a private tokio runtime whose blocking pool plays the
//! worker pool. `submit` keeps the callback on the caller's side, keyed by
//! `JobId`, and ships only the URL, the config and a cancel token to a
//! worker. The worker sends a `Completion` back over an mpsc channel once the
//! transport returns, and `run` pops completions on the calling thread and
//! invokes the matching callback.
//!
//! Because callbacks never leave the driving thread they need not be `Send`,
//! and two callbacks can never run at the same time. Every submitted job
//! produces exactly one callback invocation: a transport failure, a worker
//! panic and a cancellation each arrive as an `Err`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::SchedulerConfig;
use crate::error::Error;
use crate::http::{RequestConfig, Response};
use crate::transport::{Client, Transport};

/// Identifies one submitted job within its scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Returned by `Scheduler::submit`; lets the caller cancel the job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    cancel: CancelToken,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Request cancellation.
    ///
    /// A worker that has not started the request yet skips it. Either way the
    /// callback receives `Err(Error::Cancelled)` instead of the outcome.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

type Callback = Box<dyn FnOnce(Result<Response, Error>)>;

struct PendingJob {
    cancel: CancelToken,
    on_complete: Callback,
}

struct Completion {
    id: JobId,
    outcome: Result<Response, Error>,
}

/// Caller-owned worker pool plus completion queue.
///
/// Not `Send`: callbacks run on whichever thread owns the scheduler, inside
/// `run` or `run_nowait`.
pub struct Scheduler {
    runtime: Option<Runtime>,
    handle: Handle,
    transport: Arc<dyn Transport>,
    completions_tx: mpsc::Sender<Completion>,
    completions_rx: mpsc::Receiver<Completion>,
    pending: HashMap<JobId, PendingJob>,
    next_id: u64,
}

impl Scheduler {
    /// A scheduler that performs requests with a default `Client`.
    pub fn new(config: &SchedulerConfig) -> Result<Self, Error> {
        Self::with_transport(config, Client::default())
    }

    pub fn with_transport(config: &SchedulerConfig, transport: impl Transport + 'static) -> Result<Self, Error> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads.max(1))
            .thread_name("aoi-worker")
            .build()
            .map_err(Error::Pool)?;
        let handle = runtime.handle().clone();
        let (completions_tx, completions_rx) = mpsc::channel();

        Ok(Self {
            runtime: Some(runtime),
            handle,
            transport: Arc::new(transport),
            completions_tx,
            completions_rx,
            pending: HashMap::new(),
            next_id: 0,
        })
    }

    /// Queue `config` against `url` and return without waiting.
    ///
    /// `on_complete` runs exactly once, during a later `run` or `run_nowait`
    /// on this thread.
    pub fn submit<F>(&mut self, url: impl Into<String>, config: RequestConfig, on_complete: F) -> JobHandle
    where
        F: FnOnce(Result<Response, Error>) + 'static,
    {
        let id = JobId(self.next_id);
        self.next_id += 1;
        let cancel = CancelToken::default();
        let url = url.into();
        log::debug!("{id}: queued {} {url}", config.method);

        self.pending.insert(
            id,
            PendingJob {
                cancel: cancel.clone(),
                on_complete: Box::new(on_complete),
            },
        );

        let transport = Arc::clone(&self.transport);
        let worker_cancel = cancel.clone();
        let tx = self.completions_tx.clone();
        let handle = self.handle.clone();
        self.handle.spawn(async move {
            let work = handle.spawn_blocking(move || {
                if worker_cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                transport.perform(&url, &config).map_err(Error::from)
            });
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::JobFailed(e.to_string())),
            };
            if tx.send(Completion { id, outcome }).is_err() {
                log::debug!("{id}: scheduler gone before completion");
            }
        });

        JobHandle { id, cancel }
    }

    /// Number of jobs whose callback has not run yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Block until every pending job has completed, running callbacks as
    /// completions arrive. Returns the number of callbacks invoked.
    pub fn run(&mut self) -> usize {
        let mut delivered = 0;
        while !self.pending.is_empty() {
            // The scheduler holds a sender, so `recv` only fails if that
            // invariant is broken.
            let Ok(completion) = self.completions_rx.recv() else {
                break;
            };
            if self.deliver(completion) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Run callbacks for completions that are already available, without
    /// blocking. Returns the number of callbacks invoked.
    pub fn run_nowait(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            if self.deliver(completion) {
                delivered += 1;
            }
        }
        delivered
    }

    fn deliver(&mut self, completion: Completion) -> bool {
        let Some(job) = self.pending.remove(&completion.id) else {
            log::warn!("{}: completion for unknown job", completion.id);
            return false;
        };
        let outcome = if job.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            completion.outcome
        };
        match &outcome {
            Ok(response) => log::debug!("{}: completed with status {}", completion.id, response.status),
            Err(e) => log::debug!("{}: failed: {e}", completion.id),
        }
        (job.on_complete)(outcome);
        true
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::warn!(
                "scheduler dropped with {} pending jobs; their callbacks will not run",
                self.pending.len()
            );
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex};
    use std::thread::{self, ThreadId};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::error::TransportError;

    /// Answers `fake://host/<status>` with that status and the URL as body.
    #[derive(Default)]
    struct StatusFromUrl {
        calls: AtomicUsize,
        threads: Mutex<Vec<ThreadId>>,
    }

    impl Transport for StatusFromUrl {
        fn perform(&self, url: &str, _config: &RequestConfig) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.threads.lock().unwrap().push(thread::current().id());
            let status = url.rsplit('/').next().unwrap().parse().unwrap();
            Ok(Response {
                status,
                body: url.as_bytes().to_vec(),
                ..Response::default()
            })
        }
    }

    struct Panics;

    impl Transport for Panics {
        fn perform(&self, _url: &str, _config: &RequestConfig) -> Result<Response, TransportError> {
            panic!("transport blew up");
        }
    }

    /// `fake://host/hold` reports that it started and then blocks until the
    /// test meets it at `release`. Any other URL answers 200 at once.
    struct Gated {
        calls: AtomicUsize,
        started: Mutex<mpsc::Sender<()>>,
        release: Barrier,
    }

    impl Gated {
        fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
            let (started, started_rx) = mpsc::channel();
            let gated = Self {
                calls: AtomicUsize::new(0),
                started: Mutex::new(started),
                release: Barrier::new(2),
            };
            (Arc::new(gated), started_rx)
        }
    }

    impl Transport for Gated {
        fn perform(&self, url: &str, _config: &RequestConfig) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.ends_with("/hold") {
                self.started.lock().unwrap().send(()).unwrap();
                self.release.wait();
            }
            Ok(Response {
                status: 200,
                ..Response::default()
            })
        }
    }

    fn scheduler(transport: impl Transport + 'static) -> Scheduler {
        Scheduler::with_transport(&SchedulerConfig { worker_threads: 4 }, transport).unwrap()
    }

    #[test]
    fn run_without_jobs_returns_immediately() {
        let mut scheduler = scheduler(StatusFromUrl::default());
        assert_eq!(scheduler.run(), 0);
        assert_eq!(scheduler.run_nowait(), 0);
    }

    #[test]
    fn callback_runs_once_on_the_driving_thread() {
        let transport = Arc::new(StatusFromUrl::default());
        let mut scheduler = scheduler(Arc::clone(&transport));
        let seen: Rc<RefCell<Vec<(ThreadId, u16)>>> = Rc::default();

        let sink = Rc::clone(&seen);
        scheduler.submit("fake://host/200", RequestConfig::get(), move |outcome| {
            sink.borrow_mut()
                .push((thread::current().id(), outcome.unwrap().status));
        });
        assert_eq!(scheduler.pending(), 1);
        assert!(seen.borrow().is_empty(), "callback must wait for run");

        assert_eq!(scheduler.run(), 1);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(*seen.borrow(), vec![(thread::current().id(), 200)]);

        let worker_threads = transport.threads.lock().unwrap();
        assert_eq!(worker_threads.len(), 1);
        assert_ne!(worker_threads[0], thread::current().id());
    }

    #[test]
    fn ten_jobs_each_get_their_own_result() {
        let transport = Arc::new(StatusFromUrl::default());
        let mut scheduler = scheduler(Arc::clone(&transport));
        let results: Rc<RefCell<Vec<(u16, u16, Vec<u8>)>>> = Rc::default();

        for i in 0..10u16 {
            let expected = 200 + i;
            let sink = Rc::clone(&results);
            scheduler.submit(format!("fake://host/{expected}"), RequestConfig::get(), move |outcome| {
                let response = outcome.unwrap();
                sink.borrow_mut().push((expected, response.status, response.body));
            });
        }

        assert_eq!(scheduler.run(), 10);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 10);
        let results = results.borrow();
        assert_eq!(results.len(), 10);
        for (expected, status, body) in results.iter() {
            assert_eq!(status, expected);
            assert_eq!(body, format!("fake://host/{expected}").as_bytes());
        }
    }

    #[test]
    fn worker_panic_is_delivered_as_job_failure() {
        let mut scheduler = scheduler(Panics);
        let outcome: Rc<RefCell<Option<Result<Response, Error>>>> = Rc::default();

        let slot = Rc::clone(&outcome);
        scheduler.submit("fake://host/200", RequestConfig::get(), move |result| {
            *slot.borrow_mut() = Some(result);
        });

        assert_eq!(scheduler.run(), 1);
        assert!(matches!(*outcome.borrow(), Some(Err(Error::JobFailed(_)))));
    }

    #[test]
    fn cancelled_job_still_calls_back_once() {
        let mut scheduler = scheduler(StatusFromUrl::default());
        let calls: Rc<RefCell<Vec<Result<Response, Error>>>> = Rc::default();

        let sink = Rc::clone(&calls);
        let handle = scheduler.submit("fake://host/200", RequestConfig::get(), move |result| {
            sink.borrow_mut().push(result);
        });
        handle.cancel();
        assert!(handle.is_cancelled());

        assert_eq!(scheduler.run(), 1);
        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Err(Error::Cancelled)));
    }

    #[test]
    fn run_nowait_delivers_available_completions() {
        let mut scheduler = scheduler(StatusFromUrl::default());
        let count = Rc::new(RefCell::new(0));

        for status in [200, 404] {
            let count = Rc::clone(&count);
            scheduler.submit(format!("fake://host/{status}"), RequestConfig::get(), move |_| {
                *count.borrow_mut() += 1;
            });
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut delivered = 0;
        while scheduler.pending() > 0 && Instant::now() < deadline {
            delivered += scheduler.run_nowait();
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(delivered, 2);
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn job_ids_are_unique() {
        let mut scheduler = scheduler(StatusFromUrl::default());
        let a = scheduler.submit("fake://host/200", RequestConfig::get(), |_| {});
        let b = scheduler.submit("fake://host/200", RequestConfig::get(), |_| {});
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().to_string(), "job-0");
        scheduler.run();
    }

    #[test]
    fn job_cancelled_while_queued_never_reaches_the_transport() {
        let (transport, started) = Gated::new();
        let mut scheduler =
            Scheduler::with_transport(&SchedulerConfig { worker_threads: 1 }, Arc::clone(&transport)).unwrap();
        let outcomes: Rc<RefCell<Vec<(&str, Result<Response, Error>)>>> = Rc::default();

        let sink = Rc::clone(&outcomes);
        scheduler.submit("fake://host/hold", RequestConfig::get(), move |outcome| {
            sink.borrow_mut().push(("hold", outcome));
        });
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        // The only worker is busy, so this job sits in the queue.
        let sink = Rc::clone(&outcomes);
        let queued = scheduler.submit("fake://host/200", RequestConfig::get(), move |outcome| {
            sink.borrow_mut().push(("queued", outcome));
        });
        queued.cancel();
        transport.release.wait();

        assert_eq!(scheduler.run(), 2);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        let outcomes = outcomes.borrow();
        assert_eq!(outcomes.len(), 2);
        for (name, outcome) in outcomes.iter() {
            match *name {
                "hold" => assert_eq!(outcome.as_ref().unwrap().status, 200),
                _ => assert!(matches!(outcome, Err(Error::Cancelled))),
            }
        }
    }

    #[test]
    fn dropping_with_a_job_in_flight_skips_its_callback() {
        let (transport, started) = Gated::new();
        let fired = Rc::new(Cell::new(false));

        let mut scheduler = scheduler(Arc::clone(&transport));
        let flag = Rc::clone(&fired);
        scheduler.submit("fake://host/hold", RequestConfig::get(), move |_| flag.set(true));
        started.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(scheduler.pending(), 1);

        drop(scheduler);
        transport.release.wait();

        assert!(!fired.get());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
