//! FFT cross-correlation primitive.
//!
//! Uses the convolution theorem: corr(a, b) = IFFT(FFT(a) * conj(FFT(b))).
//! Both inputs are zero-padded to a power of two that is at least
//! `len(a) + len(b) + 1` so the circular result never wraps onto itself.
//! These functions have no side effects and don't do I/O.

use std::fmt;

use rustfft::{num_complex::Complex, FftPlanner};

/// Full result of one cross-correlation.
#[derive(Clone)]
pub struct Correlation {
    /// Length of the first input.
    pub len1: usize,
    /// Length of the second input.
    pub len2: usize,
    /// FFT size both inputs were padded to.
    pub pad_size: usize,
    /// Index of the largest magnitude in `curve` (first one on ties).
    pub peak_index: usize,
    /// Correlation magnitude for every circular shift, `pad_size` long.
    pub curve: Vec<f64>,
}

impl fmt::Debug for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlation")
            .field("len1", &self.len1)
            .field("len2", &self.len2)
            .field("pad_size", &self.pad_size)
            .field("peak_index", &self.peak_index)
            .field("peak", &self.peak())
            .finish()
    }
}

/// Linear-domain reading of a circular peak index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// `s1` must be advanced by this many samples to line up with `s2`.
    Forward(usize),
    /// The peak sits in the wrapped half: `s2` must be advanced instead.
    Backward(usize),
}

impl Correlation {
    /// Peak correlation magnitude.
    pub fn peak(&self) -> f64 {
        self.curve.get(self.peak_index).copied().unwrap_or(0.0)
    }

    /// Map the circular peak index back to a linear shift.
    ///
    /// Indices past `pad_size / 2` represent negative lags.
    pub fn shift(&self) -> Shift {
        if self.peak_index > self.pad_size / 2 {
            Shift::Backward(self.pad_size - self.peak_index)
        } else {
            Shift::Forward(self.peak_index)
        }
    }
}

/// Smallest power of two that holds `len1 + len2 + 1` samples.
pub fn pad_size_for(len1: usize, len2: usize) -> usize {
    (len1 + len2 + 1).next_power_of_two()
}

/// Cross-correlate two sample sequences.
///
/// Convenience wrapper that plans a fresh FFT. Loops that correlate many
/// windows should hold a [`Correlator`] instead.
pub fn cross_correlate(s1: &[f64], s2: &[f64]) -> Correlation {
    Correlator::new().correlate(s1, s2)
}

/// Reusable correlator that caches FFT plans between calls.
///
/// Not shared between threads: each worker owns its own.
pub struct Correlator {
    planner: FftPlanner<f64>,
}

impl Correlator {
    /// Create a new correlator.
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Cross-correlate `s1` against `s2`.
    ///
    /// Returns the magnitude curve (scaled by `1 / pad_size`) and its argmax.
    pub fn correlate(&mut self, s1: &[f64], s2: &[f64]) -> Correlation {
        let pad_size = pad_size_for(s1.len(), s2.len());

        let fft = self.planner.plan_fft_forward(pad_size);
        let ifft = self.planner.plan_fft_inverse(pad_size);

        let mut a = zero_padded(s1, pad_size);
        let mut b = zero_padded(s2, pad_size);

        fft.process(&mut a);
        fft.process(&mut b);

        // Multiply a by conjugate of b (correlation in frequency domain)
        let mut product: Vec<Complex<f64>> =
            a.iter().zip(b.iter()).map(|(x, y)| x * y.conj()).collect();

        ifft.process(&mut product);

        let scale = 1.0 / pad_size as f64;
        let curve: Vec<f64> = product.iter().map(|c| c.norm() * scale).collect();
        let peak_index = argmax(&curve);

        Correlation {
            len1: s1.len(),
            len2: s2.len(),
            pad_size,
            peak_index,
            curve,
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

fn zero_padded(samples: &[f64], len: usize) -> Vec<Complex<f64>> {
    let mut out: Vec<Complex<f64>> = samples.iter().map(|&x| Complex::new(x, 0.0)).collect();
    out.resize(len, Complex::new(0.0, 0.0));
    out
}

/// Index of the first maximum.
fn argmax(values: &[f64]) -> usize {
    let mut best_idx = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i;
        }
    }
    best_idx
}
