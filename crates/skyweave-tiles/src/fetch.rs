//! Asynchronous payload fetching.
//!
//! The cache hands [`FetchRequest`]s to a [`Fetcher`] and later drains
//! [`FetchCompletion`]s from its own channel on the render thread. Fetchers
//! never touch tile state.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::FetchError;

/// Correlates a completion with the request that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchTicket(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub url: String,
}

#[derive(Debug)]
pub struct FetchCompletion {
    pub ticket: FetchTicket,
    pub result: Result<Vec<u8>, FetchError>,
}

/// Starts fetches. Completions go to `done`, from any thread, in any order.
pub trait Fetcher {
    fn fetch(&self, request: FetchRequest, done: &Sender<FetchCompletion>);
}

/// Blocking byte source used by [`PooledFetcher`] workers.
pub type Transport = Arc<dyn Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync>;

struct Job {
    request: FetchRequest,
    done: Sender<FetchCompletion>,
}

/// A fixed pool of worker threads running a blocking [`Transport`].
pub struct PooledFetcher {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl PooledFetcher {
    /// Spawn `threads` workers (at least one).
    pub fn new(threads: usize, transport: Transport) -> Result<Self, FetchError> {
        let (jobs, job_rx) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads.max(1));

        for i in 0..threads.max(1) {
            let job_rx: Receiver<Job> = job_rx.clone();
            let transport = Arc::clone(&transport);
            let handle = std::thread::Builder::new()
                .name(format!("tile-fetch-{i}"))
                .spawn(move || {
                    while let Ok(job) = job_rx.recv() {
                        let result = transport(&job.request.url);
                        if let Err(err) = &result {
                            tracing::debug!(url = %job.request.url, %err, "fetch failed");
                        }
                        // The cache may have been dropped; nothing to report to.
                        let _ = job.done.send(FetchCompletion {
                            ticket: job.request.ticket,
                            result,
                        });
                    }
                })
                .map_err(FetchError::Spawn)?;
            workers.push(handle);
        }

        Ok(Self {
            jobs: Some(jobs),
            workers,
        })
    }

    /// One worker per CPU beyond the render thread.
    pub fn with_defaults(transport: Transport) -> Result<Self, FetchError> {
        let threads = num_cpus::get().saturating_sub(1).max(1);
        Self::new(threads, transport)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Fetcher for PooledFetcher {
    fn fetch(&self, request: FetchRequest, done: &Sender<FetchCompletion>) {
        let ticket = request.ticket;
        let sent = self.jobs.as_ref().is_some_and(|jobs| {
            jobs.send(Job {
                request,
                done: done.clone(),
            })
            .is_ok()
        });
        if !sent {
            let _ = done.send(FetchCompletion {
                ticket,
                result: Err(FetchError::Shutdown),
            });
        }
    }
}

impl Drop for PooledFetcher {
    fn drop(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("tile fetch worker panicked");
            }
        }
    }
}

/// Transport that reads URLs as paths below `root`.
///
/// A `file://` prefix is stripped; relative URLs resolve against `root`.
pub fn file_transport(root: impl Into<PathBuf>) -> Transport {
    let root = root.into();
    Arc::new(move |url: &str| read_file(&root, url))
}

fn read_file(root: &Path, url: &str) -> Result<Vec<u8>, FetchError> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    let path = root.join(path);
    std::fs::read(&path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => FetchError::NotFound {
            url: url.to_string(),
        },
        _ => FetchError::Io {
            url: url.to_string(),
            source,
        },
    })
}

/// A fetcher driven by the host: requests are recorded and completed
/// explicitly with [`HostFetcher::complete`] or [`HostFetcher::complete_all`].
#[derive(Default)]
pub struct HostFetcher {
    pending: RefCell<Vec<(FetchRequest, Sender<FetchCompletion>)>>,
    calls: RefCell<usize>,
}

impl HostFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of fetches ever started.
    pub fn call_count(&self) -> usize {
        *self.calls.borrow()
    }

    /// URLs of fetches not yet completed, in request order.
    pub fn pending_urls(&self) -> Vec<String> {
        self.pending.borrow().iter().map(|(r, _)| r.url.clone()).collect()
    }

    /// Complete the fetch for `ticket`. Returns false if it is not pending.
    pub fn complete(&self, ticket: FetchTicket, result: Result<Vec<u8>, FetchError>) -> bool {
        let mut pending = self.pending.borrow_mut();
        let Some(pos) = pending.iter().position(|(r, _)| r.ticket == ticket) else {
            return false;
        };
        let (request, done) = pending.remove(pos);
        let _ = done.send(FetchCompletion {
            ticket: request.ticket,
            result,
        });
        true
    }

    /// Complete every pending fetch using `respond(url)`. Returns the count.
    pub fn complete_all(&self, mut respond: impl FnMut(&str) -> Result<Vec<u8>, FetchError>) -> usize {
        let drained: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        let count = drained.len();
        for (request, done) in drained {
            let result = respond(&request.url);
            let _ = done.send(FetchCompletion {
                ticket: request.ticket,
                result,
            });
        }
        count
    }
}

impl Fetcher for HostFetcher {
    fn fetch(&self, request: FetchRequest, done: &Sender<FetchCompletion>) {
        *self.calls.borrow_mut() += 1;
        self.pending.borrow_mut().push((request, done.clone()));
    }
}
