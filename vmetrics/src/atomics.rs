//! Atomic storage for metric values.
//!
//! Every metric needs a 64-bit atomic regardless of whether the standard library exposes one for
//! the target architecture, so on 32-bit targets we fall back to `portable-atomic`.
//!
//! Floating-point values are stored as their IEEE-754 bit pattern inside an `AtomicU64` and are
//! updated with a compare-and-swap loop.

use std::sync::atomic::Ordering;

#[cfg(target_pointer_width = "32")]
pub(crate) use portable_atomic::AtomicU64;
#[cfg(not(target_pointer_width = "32"))]
pub(crate) use std::sync::atomic::AtomicU64;

/// An `f64` cell backed by an `AtomicU64`.
#[derive(Debug)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub(crate) fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Adds `delta` and returns the previous value.
    pub(crate) fn add(&self, delta: f64) -> f64 {
        loop {
            let result = self.0.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |curr| {
                let input = f64::from_bits(curr);
                let output = input + delta;
                Some(output.to_bits())
            });

            if let Ok(prev) = result {
                break f64::from_bits(prev);
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}
