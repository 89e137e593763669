//! A bounded sampling reservoir used to estimate quantiles.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

const MAX_SAMPLES: usize = 1000;

/// Keeps a uniform random sample of at most 1000 observations (Algorithm R) together with the exact
/// minimum, maximum and count of everything observed.
///
/// The generator is seeded deterministically and re-seeded on [`reset`](Reservoir::reset), so the
/// same stream of observations always yields the same sample.
#[derive(Debug)]
pub(crate) struct Reservoir {
    samples: Vec<f64>,
    sorted: Vec<f64>,
    count: u64,
    min: f64,
    max: f64,
    rng: Xoshiro256StarStar,
}

impl Reservoir {
    pub(crate) fn new() -> Self {
        Self {
            samples: Vec::with_capacity(MAX_SAMPLES),
            sorted: Vec::new(),
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            rng: Xoshiro256StarStar::seed_from_u64(0),
        }
    }

    pub(crate) fn update(&mut self, v: f64) {
        self.count += 1;
        if v < self.min {
            self.min = v;
        }
        if v > self.max {
            self.max = v;
        }

        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(v);
        } else {
            let idx = self.rng.random_range(0..self.count);
            if idx < MAX_SAMPLES as u64 {
                self.samples[idx as usize] = v;
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.samples.clear();
        self.count = 0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.rng = Xoshiro256StarStar::seed_from_u64(0);
    }

    /// Writes the estimate for every `phi` in `phis` into `dst`.
    ///
    /// `phi <= 0` yields the exact minimum and `phi >= 1` the exact maximum. Every estimate is
    /// `NaN` when nothing has been observed.
    pub(crate) fn quantiles(&mut self, dst: &mut Vec<f64>, phis: &[f64]) {
        self.sorted.clear();
        self.sorted.extend_from_slice(&self.samples);
        self.sorted.sort_unstable_by(f64::total_cmp);

        dst.clear();
        dst.extend(phis.iter().map(|phi| self.quantile_sorted(*phi)));
    }

    fn quantile_sorted(&self, phi: f64) -> f64 {
        if self.sorted.is_empty() || phi.is_nan() {
            return f64::NAN;
        }
        if phi <= 0.0 {
            return self.min;
        }
        if phi >= 1.0 {
            return self.max;
        }

        let last = self.sorted.len() - 1;
        let idx = ((phi * last as f64) + 0.5) as usize;
        self.sorted[idx.min(last)]
    }
}
