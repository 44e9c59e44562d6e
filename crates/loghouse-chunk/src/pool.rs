//! Scratch Buffer Pool
//!
//! Iterators decompress every sealed block into a scratch buffer. Those
//! buffers are block-target sized (hundreds of KiB), so churning through
//! them per block would dominate allocator traffic on the read path.
//! This module keeps a small process-wide pool of decode buffers that
//! iterators check out on first use and return on close.
//!
//! The pool is a pure optimization: correctness never depends on it, a
//! buffer handed out is always cleared by the codec before reuse, and
//! any buffer may simply be dropped instead of returned.

use std::sync::Mutex;

/// Buffers kept in the pool at most.
const POOL_CAP: usize = 16;

/// Buffers larger than this are dropped rather than pooled, so one
/// pathological block can't pin memory forever.
const MAX_POOLED_CAPACITY: usize = 32 * 1024 * 1024;

static POOL: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());

/// Check a scratch buffer out of the pool, or allocate a fresh one.
///
/// The capacity hint is untrusted (it may come from parsed metadata)
/// and only bounds the pre-allocation; buffers grow as needed.
pub(crate) fn get_scratch(capacity_hint: usize) -> Vec<u8> {
    if let Ok(mut pool) = POOL.lock() {
        if let Some(buf) = pool.pop() {
            return buf;
        }
    }
    Vec::with_capacity(capacity_hint.min(MAX_POOLED_CAPACITY))
}

/// Return a scratch buffer to the pool.
pub(crate) fn put_scratch(mut buf: Vec<u8>) {
    if buf.capacity() == 0 || buf.capacity() > MAX_POOLED_CAPACITY {
        return;
    }
    buf.clear();
    if let Ok(mut pool) = POOL.lock() {
        if pool.len() < POOL_CAP {
            pool.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_cycle() {
        let mut buf = get_scratch(128);
        buf.extend_from_slice(b"leftover");
        put_scratch(buf);
        let again = get_scratch(128);
        // pooled buffers come back cleared
        assert!(again.is_empty());
    }

    #[test]
    fn test_zero_capacity_not_pooled() {
        put_scratch(Vec::new());
        // nothing to assert beyond "does not panic": a zero-capacity
        // buffer is dropped instead of pooled
    }

    #[test]
    fn test_oversized_buffer_dropped() {
        put_scratch(Vec::with_capacity(MAX_POOLED_CAPACITY + 1));
    }
}
