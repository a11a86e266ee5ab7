//! Worker fan-out, cooperative cancellation and the incremental input
//! buffer.
//!
//! Block coding and tile transcoding are bounded CPU tasks with no
//! shared mutable state, so parallelism is scoped threads over disjoint
//! chunks; results come back in index order regardless of completion
//! order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::J2kError;

/// Cooperative cancellation token. Workers poll between blocks; on
/// cancellation in-flight work is discarded and `Cancelled` surfaces.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), J2kError> {
        if self.is_cancelled() {
            Err(J2kError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Map `f` over `items` with up to `workers` scoped threads, preserving
/// input order in the result. Errors and cancellation abort the whole
/// map.
pub fn parallel_map<T, R, F>(
    items: &[T],
    workers: usize,
    token: &CancellationToken,
    f: F,
) -> Result<Vec<R>, J2kError>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> Result<R, J2kError> + Sync,
{
    token.check()?;
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let workers = workers.max(1).min(items.len());
    if workers == 1 {
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            token.check()?;
            out.push(f(i, item)?);
        }
        return Ok(out);
    }

    let mut slots: Vec<Option<Result<R, J2kError>>> = Vec::with_capacity(items.len());
    slots.resize_with(items.len(), || None);
    let chunk = items.len().div_ceil(workers);

    std::thread::scope(|scope| {
        let mut remaining: &mut [Option<Result<R, J2kError>>] = &mut slots;
        for (w, chunk_items) in items.chunks(chunk).enumerate() {
            let (head, tail) = remaining.split_at_mut(chunk_items.len());
            remaining = tail;
            let f = &f;
            let token = token.clone();
            let base = w * chunk;
            scope.spawn(move || {
                for (i, (item, slot)) in chunk_items.iter().zip(head.iter_mut()).enumerate() {
                    if token.is_cancelled() {
                        *slot = Some(Err(J2kError::Cancelled));
                        return;
                    }
                    *slot = Some(f(base + i, item));
                }
            });
        }
    });

    let mut out = Vec::with_capacity(items.len());
    for slot in slots {
        match slot {
            Some(Ok(r)) => out.push(r),
            Some(Err(e)) => return Err(e),
            None => return Err(J2kError::Cancelled),
        }
    }
    Ok(out)
}

/// Thread-safe byte accumulator feeding the partial-decode driver.
/// Concurrent appenders are permitted; reads serialise on the mutex.
#[derive(Debug, Default)]
pub struct IncrementalBuffer {
    inner: Mutex<IncrementalInner>,
}

#[derive(Debug, Default)]
struct IncrementalInner {
    data: Vec<u8>,
    complete: bool,
}

impl IncrementalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock().expect("incremental buffer poisoned");
        inner.data.extend_from_slice(bytes);
    }

    pub fn mark_complete(&self) {
        self.inner
            .lock()
            .expect("incremental buffer poisoned")
            .complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.inner
            .lock()
            .expect("incremental buffer poisoned")
            .complete
    }

    pub fn buffer_size(&self) -> usize {
        self.inner
            .lock()
            .expect("incremental buffer poisoned")
            .data
            .len()
    }

    /// Whether enough bytes are present to attempt a decode.
    pub fn can_decode(&self, min_bytes: usize) -> bool {
        let inner = self.inner.lock().expect("incremental buffer poisoned");
        inner.complete || inner.data.len() >= min_bytes
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.inner
            .lock()
            .expect("incremental buffer poisoned")
            .data
            .clone()
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("incremental buffer poisoned");
        inner.data.clear();
        inner.complete = false;
    }
}
