use crate::atomics::AtomicF64;
use crate::formatting::{write_sample, Value};

/// A floating-point counter.
///
/// Updates go through a compare-and-swap loop, so concurrent `add` calls are never lost.
#[derive(Debug, Default)]
pub struct FloatCounter {
    value: AtomicF64,
}

impl FloatCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to the counter.
    pub fn add(&self, n: f64) {
        self.value.add(n);
    }

    /// Subtracts `n` from the counter.
    pub fn sub(&self, n: f64) {
        self.value.add(-n);
    }

    /// Gets the current value.
    pub fn get(&self) -> f64 {
        self.value.get()
    }

    /// Overwrites the current value.
    pub fn set(&self, n: f64) {
        self.value.set(n);
    }

    pub(crate) fn marshal_to(&self, prefix: &str, buffer: &mut String) {
        write_sample(buffer, prefix, Value::Float(self.get()));
    }
}
