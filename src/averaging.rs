//! Incoherent averaging of delay envelopes across frames.

use ndarray::prelude::*;
use ndarray::Zip;

/// The mixing coefficient `a = 1 - exp(-t_coh / t_incoh)` for an exponential
/// average refreshed every coherent integration, with a memory of one
/// incoherent integration.
pub fn smoothing_coefficient(coherent_integration_time: f64, incoherent_integration_time: f64) -> f64 {
    1.0 - (-coherent_integration_time / incoherent_integration_time).exp()
}

/// How many coherent integrations fit in an incoherent integration (rounded
/// down).
pub fn frames_per_incoherent_integration(
    coherent_integration_time: f64,
    incoherent_integration_time: f64,
) -> usize {
    (incoherent_integration_time / coherent_integration_time).floor() as usize
}

/// An exponentially-weighted running average of delay envelopes. It has the
/// same length as the trial delays and starts at all zeros.
#[derive(Debug, Clone)]
pub struct RunningAverage {
    envelope: Array1<f64>,
    coefficient: f64,
}

impl RunningAverage {
    pub fn new(len: usize, coefficient: f64) -> RunningAverage {
        RunningAverage {
            envelope: Array1::zeros(len),
            coefficient,
        }
    }

    /// `average = a * current + (1 - a) * average`, in place.
    pub fn update(&mut self, current: ArrayView1<f64>) {
        let a = self.coefficient;
        Zip::from(&mut self.envelope)
            .and(&current)
            .for_each(|avg, &cur| *avg = a * cur + (1.0 - a) * *avg);
    }

    pub fn view(&self) -> ArrayView1<f64> {
        self.envelope.view()
    }

    pub fn reset(&mut self) {
        self.envelope.fill(0.0);
    }
}

/// The median of `values`; the mean of the two middle values if there is an
/// even number of them. NaN if any value is NaN, `None` if there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    if values.iter().any(|v| v.is_nan()) {
        return Some(f64::NAN);
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn coefficient_from_integration_times() {
        assert_abs_diff_eq!(smoothing_coefficient(1.6, 30.0), 1.0 - (-1.6_f64 / 30.0).exp());
        assert_eq!(frames_per_incoherent_integration(1.6, 30.0), 18);
        assert_eq!(frames_per_incoherent_integration(2.0, 1.0), 0);
    }

    #[test]
    fn running_average_converges_on_a_constant_envelope() {
        let mut average = RunningAverage::new(3, 0.25);
        let current = array![4.0, 8.0, 0.0];
        average.update(current.view());
        assert_abs_diff_eq!(average.view()[0], 1.0);
        assert_abs_diff_eq!(average.view()[1], 2.0);

        for _ in 0..200 {
            average.update(current.view());
        }
        for (avg, cur) in average.view().iter().zip(current.iter()) {
            assert_abs_diff_eq!(*avg, *cur, epsilon = 1e-12);
        }

        average.reset();
        assert!(average.view().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn median_of_odd_and_even_lengths() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert!(median(&[1.0, f64::NAN]).unwrap().is_nan());
    }
}
