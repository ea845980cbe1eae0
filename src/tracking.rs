//! The closed fringe-tracking loop.
//!
//! Every frame a random atmospheric delay error is drawn, the tricoupler is
//! simulated and its delay envelope folded into a running average. While the
//! loop is allowed to, the correction delay is re-estimated from the running
//! average, the coherence is corrected with it and a bias-subtracted squared
//! visibility is recorded.

use std::{f64::consts::TAU, time::Instant};

use indicatif::ProgressBar;
use log::{debug, info, trace, warn};
use ndarray::prelude::*;
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use thiserror::Error;

use crate::{
    averaging::{median, smoothing_coefficient, RunningAverage},
    combiner::{Combiner, NoiseError, NoiseModel, Tricoupler},
    config::{ConfigError, TrackerConfig},
    delay::{find_delay, group_delay_envelope, TrialDelays},
    fringe::fringe_envelope,
    ChannelSet, SourceParams,
};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Noise(#[from] NoiseError),
}

/// When the correction delay may be re-estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayUpdatePolicy {
    /// Re-estimate every frame while the frame counter is below the number of
    /// frames per incoherent integration. The counter is never reset, so after
    /// the first incoherent integration the correction is frozen.
    FirstIncoherentPeriod,

    /// Re-estimate once at the end of every incoherent integration, resetting
    /// the frame counter each time.
    EveryIncoherentPeriod,
}

/// The state carried from frame to frame.
#[derive(Debug, Clone)]
pub struct TrackingState {
    pub running_average: RunningAverage,

    /// The delay currently applied by the delay line \[m\].
    pub correction_delay: f64,

    pub frame_counter: usize,
}

impl TrackingState {
    pub fn new(num_trial_delays: usize, smoothing_coefficient: f64) -> TrackingState {
        TrackingState {
            running_average: RunningAverage::new(num_trial_delays, smoothing_coefficient),
            correction_delay: 0.0,
            frame_counter: 0,
        }
    }

    /// Advance the frame counter and report whether the correction should be
    /// re-estimated this frame.
    fn tick(&mut self, policy: DelayUpdatePolicy, frames_per_incoherent: usize) -> bool {
        match policy {
            DelayUpdatePolicy::FirstIncoherentPeriod => {
                let update = self.frame_counter < frames_per_incoherent;
                self.frame_counter += 1;
                update
            }
            DelayUpdatePolicy::EveryIncoherentPeriod => {
                self.frame_counter += 1;
                let update = self.frame_counter >= frames_per_incoherent;
                if update {
                    self.frame_counter = 0;
                }
                update
            }
        }
    }
}

/// What happened in a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    /// \[m\]
    pub atmospheric_delay: f64,

    /// The correction delay after this frame \[m\].
    pub correction_delay: f64,

    /// Present only if the correction was re-estimated this frame.
    pub squared_visibility: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TrackingReport {
    pub frames: Vec<FrameOutcome>,

    /// The squared-visibility noise floor that was subtracted.
    pub bias: f64,

    pub final_correction_delay: f64,
}

impl TrackingReport {
    /// Every bias-subtracted squared visibility recorded, in frame order.
    pub fn squared_visibilities(&self) -> Vec<f64> {
        self.frames
            .iter()
            .filter_map(|f| f.squared_visibility)
            .collect()
    }

    pub fn median_squared_visibility(&self) -> Option<f64> {
        median(&self.squared_visibilities())
    }
}

/// Undo a correction delay on a coherence: divide out each channel's fringe
/// envelope at `correction_delay` and rotate out the linear phase
/// `2π correction_delay / λ`.
pub fn correct_coherence(
    gamma: ArrayView1<Complex64>,
    correction_delay: f64,
    channels: &ChannelSet,
) -> Array1<Complex64> {
    gamma
        .iter()
        .zip(channels.iter())
        .map(|(g, (lam, bandpass))| {
            let envelope = fringe_envelope(correction_delay, lam, bandpass);
            let rotation = Complex64::from_polar(1.0, TAU * correction_delay / lam);
            g / envelope * rotation
        })
        .collect()
}

/// Put back the linear phase `2π correction_delay / λ` removed by a delay line,
/// so that a coherence measured behind the delay line peaks at the full
/// atmospheric delay in a group-delay envelope.
pub fn restore_delay_phase(
    gamma: ArrayView1<Complex64>,
    correction_delay: f64,
    channels: &ChannelSet,
) -> Array1<Complex64> {
    gamma
        .iter()
        .zip(channels.wavelengths())
        .map(|(g, &lam)| g * Complex64::from_polar(1.0, -TAU * correction_delay / lam))
        .collect()
}

/// The mean of `|γ|²` across channels, minus `bias`.
pub fn squared_visibility(gamma: ArrayView1<Complex64>, bias: f64) -> f64 {
    gamma.iter().map(|g| g.norm_sqr()).sum::<f64>() / gamma.len() as f64 - bias
}

/// Measure the squared-visibility noise floor: simulate `num_frames` frames of
/// an unresolved source with no delay error and take the median of the
/// resulting squared visibilities.
pub fn estimate_bias<R: Rng + ?Sized>(
    combiner: &Tricoupler,
    source: &SourceParams,
    num_frames: usize,
    rng: &mut R,
) -> f64 {
    let source = source.unresolved_noise_floor();
    let estimates = (0..num_frames)
        .map(|_| {
            let gamma = combiner.measure_coherence(0.0, 0.0, &source, &mut *rng);
            squared_visibility(gamma.view(), 0.0)
        })
        .collect::<Vec<_>>();
    median(&estimates).unwrap_or(0.0)
}

/// Drives the tracking loop. Owns its random number generator, so a seeded
/// generator gives a reproducible run.
pub struct FringeTracker<R: Rng> {
    combiner: Tricoupler,
    source: SourceParams,
    trial_delays: TrialDelays,
    frames_per_incoherent: usize,
    policy: DelayUpdatePolicy,
    feed_back_correction: bool,
    delay_error: Uniform<f64>,
    bias: f64,
    state: TrackingState,
    rng: R,

    /// How many frames have been processed, for logging.
    frames_processed: usize,
}

impl<R: Rng> FringeTracker<R> {
    /// Set up a tracker with a shot- and read-noise-limited tricoupler and
    /// measure the bias.
    pub fn new(config: &TrackerConfig, rng: R) -> Result<FringeTracker<R>, TrackerError> {
        let noise = NoiseModel::shot_and_read(config.read_noise)?;
        let combiner = Tricoupler::new(config.channels.clone(), noise);
        FringeTracker::with_combiner(config, combiner, rng)
    }

    /// Like [`FringeTracker::new`], but with a caller-supplied combiner.
    pub fn with_combiner(
        config: &TrackerConfig,
        combiner: Tricoupler,
        mut rng: R,
    ) -> Result<FringeTracker<R>, TrackerError> {
        config.validate()?;

        let bias = estimate_bias(&combiner, &config.source, config.num_bias_frames, &mut rng);
        info!("Squared-visibility bias: {bias}");

        let coefficient = smoothing_coefficient(
            config.coherent_integration_time,
            config.incoherent_integration_time,
        );
        let frames_per_incoherent = config.frames_per_incoherent_integration();
        debug!(
            "Smoothing coefficient {coefficient}, {frames_per_incoherent} frames per incoherent integration"
        );

        Ok(FringeTracker {
            combiner,
            source: config.source,
            trial_delays: config.trial_delays.clone(),
            frames_per_incoherent,
            policy: config.delay_update_policy,
            feed_back_correction: config.feed_back_correction,
            delay_error: Uniform::new_inclusive(
                -config.delay_error_bound,
                config.delay_error_bound,
            ),
            bias,
            state: TrackingState::new(config.trial_delays.len(), coefficient),
            rng,
            frames_processed: 0,
        })
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// Process one frame with a random atmospheric delay error.
    pub fn step(&mut self) -> FrameOutcome {
        let atmospheric_delay = self.delay_error.sample(&mut self.rng);
        self.step_with_delay(atmospheric_delay)
    }

    /// Process one frame with the given atmospheric delay \[m\].
    pub fn step_with_delay(&mut self, atmospheric_delay: f64) -> FrameOutcome {
        let start = Instant::now();

        let applied_correction = if self.feed_back_correction {
            self.state.correction_delay
        } else {
            0.0
        };
        let gamma = self.combiner.measure_coherence(
            atmospheric_delay,
            applied_correction,
            &self.source,
            &mut self.rng,
        );
        if gamma.iter().any(|g| !g.is_finite()) {
            warn!("Non-finite coherence this frame; a channel had no counts");
        }

        // The running average is kept in absolute delay, so it stays valid
        // when the correction changes.
        let uncorrected = restore_delay_phase(
            gamma.view(),
            applied_correction,
            &self.combiner.channels,
        );
        let envelope = group_delay_envelope(
            uncorrected.view(),
            &self.trial_delays,
            self.combiner.channels.wavelengths(),
        );
        self.state.running_average.update(envelope.view());

        let mut squared_vis = None;
        if self.state.tick(self.policy, self.frames_per_incoherent) {
            let correction_delay =
                find_delay(self.state.running_average.view(), &self.trial_delays);
            self.state.correction_delay = correction_delay;

            // What is left after the correction this frame was measured with.
            let residual_delay = correction_delay - applied_correction;
            let corrected =
                correct_coherence(gamma.view(), residual_delay, &self.combiner.channels);
            squared_vis = Some(squared_visibility(corrected.view(), self.bias));
            trace!("New correction delay {correction_delay:e} (residual {residual_delay:e})");
        }

        debug!(
            "Frame {}: delay error {atmospheric_delay:e}, correction {:e}, time elapsed = {:.3} ms",
            self.frames_processed,
            self.state.correction_delay,
            start.elapsed().as_secs_f64() * 1000.0
        );

        self.frames_processed += 1;

        FrameOutcome {
            atmospheric_delay,
            correction_delay: self.state.correction_delay,
            squared_visibility: squared_vis,
        }
    }

    /// Run `num_frames` frames in order.
    pub fn run(&mut self, num_frames: usize, progress_bar: Option<ProgressBar>) -> TrackingReport {
        let mut frames = Vec::with_capacity(num_frames);
        for _ in 0..num_frames {
            frames.push(self.step());
            if let Some(progress_bar) = progress_bar.as_ref() {
                progress_bar.inc(1);
            }
        }
        if let Some(progress_bar) = progress_bar.as_ref() {
            progress_bar.abandon_with_message("Finished tracking");
        }

        TrackingReport {
            frames,
            bias: self.bias,
            final_correction_delay: self.state.correction_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::config::ObservingSetup;

    fn config() -> TrackerConfig {
        ObservingSetup {
            seed: Some(0),
            num_frames: 40,
            num_bias_frames: 20,
            ..Default::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn zero_residual_delay_recovers_the_visibility() {
        let config = config();
        let tri = Tricoupler::new(config.channels.clone(), NoiseModel::Noiseless);
        let mut rng = StdRng::seed_from_u64(0);
        let gamma = tri.measure_coherence(1.3e-5, 1.3e-5, &config.source, &mut rng);
        let corrected = correct_coherence(gamma.view(), 0.0, &config.channels);
        assert_abs_diff_eq!(
            squared_visibility(corrected.view(), 0.0),
            config.source.visibility.powi(2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn correction_undoes_the_delay_phase() {
        let config = config();
        let tri = Tricoupler::new(config.channels.clone(), NoiseModel::Noiseless);
        let mut rng = StdRng::seed_from_u64(0);
        let delay = 2e-6;
        let gamma = tri.measure_coherence(delay, 0.0, &config.source, &mut rng);
        let corrected = correct_coherence(gamma.view(), delay, &config.channels);
        for g in corrected.iter() {
            assert_abs_diff_eq!(g.norm(), config.source.visibility, epsilon = 1e-9);
            assert_abs_diff_eq!(g.arg(), PI / 6.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn noiseless_bias_is_zero() {
        let config = config();
        let tri = Tricoupler::new(config.channels.clone(), NoiseModel::Noiseless);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(estimate_bias(&tri, &config.source, 10, &mut rng), 0.0);
    }

    #[test]
    fn first_period_policy_freezes_the_correction() {
        let config = config();
        let mut tracker = FringeTracker::new(&config, StdRng::seed_from_u64(3)).unwrap();
        let report = tracker.run(40, None);
        assert_eq!(report.squared_visibilities().len(), 18);
        assert!(report.frames[..18].iter().all(|f| f.squared_visibility.is_some()));
        let frozen = report.frames[17].correction_delay;
        assert!(report.frames[18..]
            .iter()
            .all(|f| f.squared_visibility.is_none() && f.correction_delay == frozen));
        assert_eq!(tracker.state().frame_counter, 40);
    }

    #[test]
    fn every_period_policy_keeps_updating() {
        let mut config = config();
        config.delay_update_policy = DelayUpdatePolicy::EveryIncoherentPeriod;
        let mut tracker = FringeTracker::new(&config, StdRng::seed_from_u64(3)).unwrap();
        let report = tracker.run(40, None);
        let updated = report
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.squared_visibility.is_some())
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        assert_eq!(updated, vec![17, 35]);
    }

    #[test]
    fn noiseless_tracking_without_delay_error() {
        let mut config = config();
        config.delay_error_bound = 0.0;
        let tri = Tricoupler::new(config.channels.clone(), NoiseModel::Noiseless);
        let mut tracker = FringeTracker::with_combiner(&config, tri, StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(tracker.bias(), 0.0);
        let report = tracker.run(5, None);
        assert_eq!(report.final_correction_delay, 0.0);
        for v2 in report.squared_visibilities() {
            assert_abs_diff_eq!(v2, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn fed_back_correction_stays_locked_on_a_constant_delay() {
        let mut config = config();
        config.delay_error_bound = 0.0;
        assert!(config.feed_back_correction);
        let tri = Tricoupler::new(config.channels.clone(), NoiseModel::Noiseless);
        let mut tracker = FringeTracker::with_combiner(&config, tri, StdRng::seed_from_u64(0)).unwrap();

        let frames = (0..8)
            .map(|_| tracker.step_with_delay(1e-5))
            .collect::<Vec<_>>();
        let locked = frames[0].correction_delay;
        assert!((locked - 1e-5).abs() < 3e-7, "locked at {locked:e}");
        for frame in &frames {
            assert_eq!(frame.correction_delay, locked);
            let v2 = frame.squared_visibility.unwrap();
            assert_abs_diff_eq!(v2, 0.25, epsilon = 0.01);
        }
    }

    #[test]
    fn restoring_the_delay_phase_gives_the_full_delay_phase() {
        let config = config();
        let tri = Tricoupler::new(config.channels.clone(), NoiseModel::Noiseless);
        let mut rng = StdRng::seed_from_u64(0);
        let behind = tri.measure_coherence(1.5e-6, 5e-7, &config.source, &mut rng);
        let restored = restore_delay_phase(behind.view(), 5e-7, &config.channels);
        let direct = tri.measure_coherence(1.5e-6, 0.0, &config.source, &mut rng);
        for (r, d) in restored.iter().zip(direct.iter()) {
            assert_abs_diff_eq!((r * d.conj()).arg(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let config = config();
        let run = || {
            let mut tracker = FringeTracker::new(&config, StdRng::seed_from_u64(9)).unwrap();
            tracker.run(20, None).frames
        };
        assert_eq!(run(), run());
    }
}
