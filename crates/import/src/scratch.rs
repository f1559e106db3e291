//! Reusable scratch buffers.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pool of vectors reused across batches.
///
/// [`checkout`](Self::checkout) hands out a cleared buffer; dropping the
/// guard clears it again and returns it to the pool, on every exit path.
#[derive(Debug)]
pub struct ScratchPool<T> {
    free: Mutex<Vec<Vec<T>>>,
}

impl<T> Default for ScratchPool<T> {
    fn default() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }
}

impl<T> ScratchPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks out an empty buffer with room for at least `capacity` items.
    pub fn checkout(&self, capacity: usize) -> ScratchBuffer<'_, T> {
        let mut buffer = self.lock().pop().unwrap_or_default();
        buffer.clear();
        buffer.reserve(capacity);
        ScratchBuffer { pool: self, buffer }
    }

    /// Returns the number of buffers waiting in the pool.
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<T>>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A buffer checked out of a [`ScratchPool`].
#[derive(Debug)]
pub struct ScratchBuffer<'a, T> {
    pool: &'a ScratchPool<T>,
    buffer: Vec<T>,
}

impl<T> Deref for ScratchBuffer<'_, T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl<T> DerefMut for ScratchBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl<T> Drop for ScratchBuffer<'_, T> {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        self.pool.lock().push(buffer);
    }
}
