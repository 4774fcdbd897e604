//! # Fast Fourier Transform (FFT) Module
//!
//! FFT-accelerated version of the YIN difference function.
//!
//! The direct difference function costs O(N²) per frame. Expanding the
//! square gives
//!
//! ```text
//! d(τ) = Σ x[i]² + Σ x[i+τ]² − 2·Σ x[i]·x[i+τ]      (i < W)
//! ```
//!
//! where the two energy terms come from a running sum of squares and the
//! cross term is a correlation computed with RustFFT in O(N log N).

use rustfft::{num_complex::Complex, FftPlanner};

/// Computes `d(τ)` for `τ` in `0..signal.len() / 2` using an FFT correlation.
///
/// The planner is passed in so repeated calls with the same frame size reuse
/// the cached plans.
///
/// # Arguments
/// * `planner` - Planner shared across frames
/// * `signal` - Full analysis frame of N samples
///
/// # Returns
/// * `Vec<f32>` of length N/2, matching the direct double loop up to round-off
pub fn difference_function(planner: &mut FftPlanner<f32>, signal: &[f32]) -> Vec<f32> {
    let n = signal.len();
    let window = n / 2;
    if window == 0 {
        return Vec::new();
    }

    // Running sum of squares: energy of x[a..b] is prefix[b] - prefix[a].
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0_f64);
    let mut acc = 0.0_f64;
    for &sample in signal {
        acc += (sample as f64) * (sample as f64);
        prefix.push(acc);
    }

    let correlation = cross_correlation(planner, signal, window);

    let head_energy = prefix[window];
    (0..window)
        .map(|tau| {
            let lagged_energy = prefix[tau + window] - prefix[tau];
            let diff = head_energy + lagged_energy - 2.0 * correlation[tau] as f64;
            // Round-off can push perfect matches slightly below zero.
            diff.max(0.0) as f32
        })
        .collect()
}

/// `r(τ) = Σ_{i<window} x[i]·x[i+τ]` for `τ < window`.
///
/// Computed as a circular correlation of length N. Because `i + τ < 2·window <= N`
/// for every term used, no wrapped samples leak into the result.
fn cross_correlation(planner: &mut FftPlanner<f32>, signal: &[f32], window: usize) -> Vec<f32> {
    let n = signal.len();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut head: Vec<Complex<f32>> = signal
        .iter()
        .enumerate()
        .map(|(i, &s)| Complex {
            re: if i < window { s } else { 0.0 },
            im: 0.0,
        })
        .collect();
    let mut full: Vec<Complex<f32>> = signal
        .iter()
        .map(|&s| Complex { re: s, im: 0.0 })
        .collect();

    fft.process(&mut head);
    fft.process(&mut full);

    let mut spectrum: Vec<Complex<f32>> = head
        .iter()
        .zip(full.iter())
        .map(|(h, x)| h.conj() * *x)
        .collect();
    ifft.process(&mut spectrum);

    // RustFFT does not normalize the inverse transform.
    let scale = 1.0 / n as f32;
    spectrum
        .iter()
        .take(window)
        .map(|c| c.re * scale)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(signal: &[f32]) -> Vec<f32> {
        let window = signal.len() / 2;
        (0..window)
            .map(|tau| {
                (0..window)
                    .map(|i| {
                        let delta = signal[i] - signal[i + tau];
                        delta * delta
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn matches_direct_difference() {
        let signal: Vec<f32> = (0..512)
            .map(|i| {
                let t = i as f32 / 8000.0;
                0.6 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
                    + 0.2 * (2.0 * std::f32::consts::PI * 660.0 * t).sin()
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fast = difference_function(&mut planner, &signal);
        let slow = direct(&signal);

        assert_eq!(fast.len(), slow.len());
        for (tau, (f, s)) in fast.iter().zip(slow.iter()).enumerate() {
            assert!(
                (f - s).abs() <= 5e-3 * s.max(1.0),
                "lag {}: fft {} vs direct {}",
                tau,
                f,
                s
            );
        }
    }

    #[test]
    fn silence_has_zero_difference() {
        let mut planner = FftPlanner::new();
        let diff = difference_function(&mut planner, &[0.0; 64]);
        assert_eq!(diff.len(), 32);
        assert!(diff.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn odd_lengths_use_floor_half_window() {
        let mut planner = FftPlanner::new();
        let signal = [0.1, -0.2, 0.3, -0.4, 0.5];
        let diff = difference_function(&mut planner, &signal);
        assert_eq!(diff.len(), 2);
        let expected = direct(&signal);
        for (f, s) in diff.iter().zip(expected.iter()) {
            assert!((f - s).abs() < 1e-5);
        }
    }
}
