use crate::core::types::now_ms;
use std::sync::atomic::{AtomicU64, Ordering};

/// Strictly increasing nonce source anchored to wall-clock milliseconds.
///
/// Each value is `max(now_ms, previous + 1)`, so values never repeat even
/// when many callers race within the same millisecond or the clock steps back.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    last: AtomicU64,
}

static GLOBAL: NonceGenerator = NonceGenerator::new();

impl NonceGenerator {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        let now = now_ms().max(0) as u64;
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Process-wide nonce shared by every adapter and stream.
pub fn next_nonce() -> u64 {
    GLOBAL.next()
}
