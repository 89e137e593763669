use std::sync::atomic::Ordering;

use crate::atomics::AtomicU64;
use crate::formatting::{write_sample, Value};

/// A monotonically increasing integer counter.
///
/// All operations are single atomic instructions. Decrementing below zero wraps around, exactly as
/// the underlying `u64` arithmetic does.
///
/// Counters are obtained from a [`Set`](crate::Set) or from the default registry with
/// [`new_counter`](crate::new_counter) / [`get_or_create_counter`](crate::get_or_create_counter).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the counter by one.
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::AcqRel);
    }

    /// Adds `n` to the counter.
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::AcqRel);
    }

    /// Gets the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Overwrites the current value.
    pub fn set(&self, n: u64) {
        self.value.store(n, Ordering::Release);
    }

    pub(crate) fn marshal_to(&self, prefix: &str, buffer: &mut String) {
        write_sample(buffer, prefix, Value::Unsigned(self.get()));
    }
}

#[cfg(test)]
mod tests {
    use super::Counter;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    enum Op {
        Inc,
        Dec,
        Add(u64),
        Set(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Inc),
            Just(Op::Dec),
            any::<u64>().prop_map(Op::Add),
            any::<u64>().prop_map(Op::Set),
        ]
    }

    #[test]
    fn test_serial_operations() {
        let c = Counter::new();
        c.inc();
        assert_eq!(c.get(), 1);
        c.set(123);
        assert_eq!(c.get(), 123);
        c.dec();
        assert_eq!(c.get(), 122);
        c.add(3);
        assert_eq!(c.get(), 125);

        let mut buffer = String::new();
        c.marshal_to("foobar", &mut buffer);
        assert_eq!(buffer, "foobar 125\n");
    }

    #[test]
    fn test_zero_value_is_rendered() {
        let c = Counter::new();
        let mut buffer = String::new();
        c.marshal_to(r#"foo{a="b"}"#, &mut buffer);
        assert_eq!(buffer, "foo{a=\"b\"} 0\n");
    }

    #[test]
    fn test_concurrent_increments_are_monotonic() {
        let c = Counter::new();
        std::thread::scope(|s| {
            for _ in 0..5 {
                s.spawn(|| {
                    let mut prev = c.get();
                    for _ in 0..10 {
                        c.inc();
                        let n = c.get();
                        assert!(n > prev, "counter went from {prev} to {n}");
                        prev = n;
                    }
                });
            }
        });
        assert_eq!(c.get(), 50);
    }

    proptest! {
        #[test]
        fn test_value_matches_net_effect(ops in proptest::collection::vec(op(), 0..64)) {
            let c = Counter::new();
            let mut expected = 0u64;
            for op in &ops {
                match *op {
                    Op::Inc => { c.inc(); expected = expected.wrapping_add(1); }
                    Op::Dec => { c.dec(); expected = expected.wrapping_sub(1); }
                    Op::Add(n) => { c.add(n); expected = expected.wrapping_add(n); }
                    Op::Set(n) => { c.set(n); expected = n; }
                }
            }
            prop_assert_eq!(c.get(), expected);
        }
    }
}
