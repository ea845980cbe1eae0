use approx::assert_abs_diff_eq;
use rand::{rngs::StdRng, SeedableRng};

use fringe_tracker::{
    combiner::{Combiner, NoiseModel, Tricoupler},
    config::ObservingSetup,
    tracking::{correct_coherence, estimate_bias, squared_visibility, DelayUpdatePolicy, FringeTracker},
    SourceParams,
};

fn setup() -> ObservingSetup {
    ObservingSetup {
        num_frames: 60,
        num_bias_frames: 200,
        seed: Some(1234),
        ..Default::default()
    }
}

#[test]
fn bias_is_reproducible_with_a_seed() {
    let config = setup().build().unwrap();
    let tri = Tricoupler::new(config.channels.clone(), NoiseModel::default());
    let bias = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        estimate_bias(&tri, &config.source, config.num_bias_frames, &mut rng)
    };
    let first = bias(77);
    assert_eq!(first, bias(77));
    assert!(first > 0.0, "noise should give a positive bias");
}

#[test]
fn bias_subtracted_zero_visibility_averages_to_zero() {
    let config = setup().build().unwrap();
    let tri = Tricoupler::new(config.channels.clone(), NoiseModel::default());
    let mut rng = StdRng::seed_from_u64(5);
    let bias = estimate_bias(&tri, &config.source, 1000, &mut rng);

    let unresolved = SourceParams {
        visibility: 0.0,
        ..config.source
    };
    let num_trials = 2000;
    let mean = (0..num_trials)
        .map(|_| {
            let gamma = tri.measure_coherence(0.0, 0.0, &unresolved, &mut rng);
            let corrected = correct_coherence(gamma.view(), 0.0, &config.channels);
            squared_visibility(corrected.view(), bias)
        })
        .sum::<f64>()
        / num_trials as f64;
    // The median is a slightly low estimate of the mean for this skewed
    // distribution, so allow a little of the bias itself.
    assert_abs_diff_eq!(mean, 0.0, epsilon = 0.1 * bias);
}

#[test]
fn bright_source_tracking_recovers_the_visibility() {
    let config = ObservingSetup {
        r_mag: -2.0,
        delay_error_bound: 1e-6,
        feed_back_correction: false,
        ..setup()
    }
    .build()
    .unwrap();
    let mut tracker = FringeTracker::new(&config, StdRng::seed_from_u64(8)).unwrap();
    let report = tracker.run(config.num_frames, None);

    let v2 = report.median_squared_visibility().unwrap();
    assert_abs_diff_eq!(v2, 0.25, epsilon = 0.05);
    // Within the main lobe of the fringe packet.
    assert!(report.final_correction_delay.abs() < 3e-6);
}

#[test]
fn policies_differ_only_in_when_they_update() {
    let mut config = setup().build().unwrap();
    let first = FringeTracker::new(&config, StdRng::seed_from_u64(2))
        .unwrap()
        .run(60, None);
    config.delay_update_policy = DelayUpdatePolicy::EveryIncoherentPeriod;
    let every = FringeTracker::new(&config, StdRng::seed_from_u64(2))
        .unwrap()
        .run(60, None);

    assert_eq!(first.bias, every.bias);
    assert_eq!(first.squared_visibilities().len(), 18);
    assert_eq!(every.squared_visibilities().len(), 3);
    // Same random draws, so the same atmosphere.
    assert_eq!(first.frames[0].atmospheric_delay, every.frames[0].atmospheric_delay);
}
