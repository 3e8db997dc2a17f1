//! Allocation of bucket arrays for upcoming resizes.
//!
//! Once a table gets large, even *allocating* its replacement becomes a noticeable pause. The
//! [`HashMap`](crate::HashMap) therefore asks an [`Allocate`] implementation for the next bucket
//! array ahead of time, and only starts the resize once that array has been handed back. The
//! hand-off is a [`PendingBuckets`], which the map polls (never waits on) and claims exactly once.
//!
//! Two allocators are provided:
//!
//!  - [`InlineAllocator`] allocates on the calling thread. Its results are ready immediately.
//!  - [`BackgroundAllocator`] (requires the `std` feature) sends the work to a dedicated
//!    [`Worker`] thread.

use crate::raw::Buckets;
use core::fmt;

#[cfg(feature = "std")]
use crossbeam_channel::{Receiver, Sender, TryRecvError};
#[cfg(feature = "std")]
use std::{
    boxed::Box,
    io,
    panic::{self, AssertUnwindSafe},
    string::String,
    sync::Arc,
    thread::{self, JoinHandle},
};

/// Tables with at least this many buckets have their replacement allocated through the map's
/// [`Allocate`] implementation rather than inline.
pub const BACKGROUND_CUTOFF: usize = 1024;

/// A source of bucket arrays for upcoming resizes.
pub trait Allocate {
    /// Starts allocating a bucket array with `len` buckets.
    ///
    /// `len` is always a power of two. This must not block on the allocation itself.
    fn submit(&mut self, len: usize) -> PendingBuckets;
}

/// A bucket array that may not have been allocated yet.
///
/// Consumed by [`try_claim`](PendingBuckets::try_claim), so its result can only be taken once.
pub struct PendingBuckets {
    state: State,
}

enum State {
    Ready(Buckets),
    #[cfg(feature = "std")]
    Waiting(Receiver<Buckets>),
}

/// The outcome of polling a [`PendingBuckets`].
#[derive(Debug)]
pub enum Claim {
    /// The allocation has finished.
    Ready(Buckets),
    /// The allocation is still in progress; poll the returned handle again later.
    Pending(PendingBuckets),
    /// The allocation will never finish, for example because the worker went away.
    Failed,
}

impl PendingBuckets {
    /// Wraps an already-allocated bucket array.
    pub fn ready(buckets: Buckets) -> Self {
        Self {
            state: State::Ready(buckets),
        }
    }

    /// Takes the bucket array if it is available, without blocking.
    pub fn try_claim(self) -> Claim {
        match self.state {
            State::Ready(buckets) => Claim::Ready(buckets),
            #[cfg(feature = "std")]
            State::Waiting(rx) => match rx.try_recv() {
                Ok(buckets) => Claim::Ready(buckets),
                Err(TryRecvError::Empty) => Claim::Pending(PendingBuckets {
                    state: State::Waiting(rx),
                }),
                Err(TryRecvError::Disconnected) => Claim::Failed,
            },
        }
    }
}

impl fmt::Debug for PendingBuckets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            State::Ready(ref buckets) => f.debug_tuple("Ready").field(buckets).finish(),
            #[cfg(feature = "std")]
            State::Waiting(_) => f.write_str("Waiting"),
        }
    }
}

/// Allocates bucket arrays on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineAllocator;

impl Allocate for InlineAllocator {
    #[cfg_attr(feature = "inline-more", inline)]
    fn submit(&mut self, len: usize) -> PendingBuckets {
        PendingBuckets::ready(Buckets::with_len(len))
    }
}

/// The sending half of a bucket-array hand-off.
///
/// Dropping it without calling [`complete`](Handoff::complete) makes the matching
/// [`PendingBuckets`] report [`Claim::Failed`].
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct Handoff {
    tx: Sender<Buckets>,
}

#[cfg(feature = "std")]
impl Handoff {
    /// Hands `buckets` to the waiting [`PendingBuckets`].
    pub fn complete(self, buckets: Buckets) {
        // The map may have been dropped in the meantime, in which case nobody wants these.
        let _ = self.tx.send(buckets);
    }
}

/// Creates a single-use channel for handing a bucket array from a producer to the map.
#[cfg(feature = "std")]
pub fn handoff() -> (Handoff, PendingBuckets) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        Handoff { tx },
        PendingBuckets {
            state: State::Waiting(rx),
        },
    )
}

#[cfg(feature = "std")]
type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single dedicated thread that runs allocation jobs in submission order.
///
/// Dropping the `Worker` closes its queue and joins the thread once it has finished any jobs
/// already submitted.
#[cfg(feature = "std")]
pub struct Worker {
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

#[cfg(feature = "std")]
impl Worker {
    /// Spawns the worker thread.
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let thread = thread::Builder::new()
            .name(String::from("pauseless-alloc"))
            .spawn(move || {
                for job in rx {
                    // A panicking job drops its Handoff, which the map observes as a failed
                    // claim. The worker itself keeps going.
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::warn!("allocation job panicked");
                    }
                }
                tracing::trace!("allocation worker shutting down");
            })?;
        tracing::debug!("spawned allocation worker");
        Ok(Self {
            jobs: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queues `job` to run on the worker.
    ///
    /// Returns `false` if the worker is no longer accepting jobs; `job` is dropped in that case.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.jobs {
            Some(ref jobs) => jobs.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Allocates `len` buckets on the worker.
    pub fn allocate(&self, len: usize) -> PendingBuckets {
        let (handoff, pending) = handoff();
        if !self.execute(move || handoff.complete(Buckets::with_len(len))) {
            tracing::warn!(len, "allocation worker is gone");
        }
        pending
    }
}

#[cfg(feature = "std")]
impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(feature = "std")]
impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("running", &self.jobs.is_some())
            .finish()
    }
}

/// Allocates bucket arrays on a dedicated [`Worker`] thread.
///
/// [`new`](BackgroundAllocator::new) does not spawn anything; the worker is started the first
/// time a table grows past [`BACKGROUND_CUTOFF`], so small maps never pay for a thread. Clones
/// taken after the worker exists share it; use [`spawn`](BackgroundAllocator::spawn) or
/// [`with_worker`](BackgroundAllocator::with_worker) to have several maps use one thread.
///
/// If the worker cannot be spawned, allocations fall back to the calling thread.
#[cfg(feature = "std")]
#[derive(Clone, Debug, Default)]
pub struct BackgroundAllocator {
    worker: Option<Arc<Worker>>,
}

#[cfg(feature = "std")]
impl BackgroundAllocator {
    /// Creates an allocator that spawns its worker on first use.
    pub const fn new() -> Self {
        Self { worker: None }
    }

    /// Creates an allocator with a freshly spawned worker.
    pub fn spawn() -> io::Result<Self> {
        Ok(Self::with_worker(Arc::new(Worker::spawn()?)))
    }

    /// Creates an allocator that submits to an existing worker.
    pub fn with_worker(worker: Arc<Worker>) -> Self {
        Self {
            worker: Some(worker),
        }
    }

    /// Returns the worker, if one has been spawned.
    pub fn worker(&self) -> Option<&Arc<Worker>> {
        self.worker.as_ref()
    }
}

#[cfg(feature = "std")]
impl Allocate for BackgroundAllocator {
    fn submit(&mut self, len: usize) -> PendingBuckets {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => match Worker::spawn() {
                Ok(worker) => Arc::new(worker),
                Err(error) => {
                    tracing::warn!(%error, len, "could not spawn allocation worker, allocating inline");
                    return PendingBuckets::ready(Buckets::with_len(len));
                }
            },
        };
        let pending = worker.allocate(len);
        self.worker = Some(worker);
        pending
    }
}

/// The allocator used by [`HashMap`](crate::HashMap) unless another one is given.
#[cfg(feature = "std")]
pub type DefaultAllocator = BackgroundAllocator;

/// The allocator used by [`HashMap`](crate::HashMap) unless another one is given.
#[cfg(not(feature = "std"))]
pub type DefaultAllocator = InlineAllocator;

#[cfg(all(test, feature = "std"))]
pub(crate) fn wait(mut pending: PendingBuckets) -> Option<Buckets> {
    loop {
        match pending.try_claim() {
            Claim::Ready(buckets) => return Some(buckets),
            Claim::Pending(p) => {
                pending = p;
                thread::yield_now();
            }
            Claim::Failed => return None,
        }
    }
}
