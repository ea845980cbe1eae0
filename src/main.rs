use clap::{AppSettings, Parser};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};

use fringe_tracker::{
    config::ObservingSetup,
    tracking::{DelayUpdatePolicy, FringeTracker, TrackerError},
};

/// Simulate closed-loop group-delay tracking with a tricoupler and report the
/// bias-corrected squared visibility.
#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
struct Args {
    /// The number of frames (coherent integrations) to track for.
    #[clap(short = 'n', long)]
    num_frames: Option<usize>,

    /// The number of zero-visibility frames used to measure the bias.
    #[clap(long)]
    num_bias_frames: Option<usize>,

    /// The R magnitude of the star.
    #[clap(long)]
    r_mag: Option<f64>,

    /// The visibility modulus of the star.
    #[clap(long)]
    visibility: Option<f64>,

    /// The phase of the star's coherence [rad].
    #[clap(long)]
    coherence_phase: Option<f64>,

    /// The seeing [arcsec].
    #[clap(long)]
    seeing: Option<f64>,

    /// The wind speed of the turbulent layer [m/s].
    #[clap(long)]
    wind_speed: Option<f64>,

    /// Atmospheric delay errors are drawn uniformly from plus or minus this
    /// [m].
    #[clap(long)]
    delay_error: Option<f64>,

    /// Detector read noise [e-].
    #[clap(long)]
    read_noise: Option<f64>,

    /// Re-estimate the delay at the end of every incoherent integration,
    /// rather than only during the first one.
    #[clap(long)]
    every_incoherent_period: bool,

    /// Simulate every frame as if no delay correction had been applied.
    #[clap(long)]
    no_feedback: bool,

    /// Seed the random number generator for a reproducible run.
    #[clap(long)]
    seed: Option<u64>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    no_progress_bars: bool,
}

impl Args {
    fn into_setup(self) -> ObservingSetup {
        let mut setup = ObservingSetup::default();
        if let Some(num_frames) = self.num_frames {
            setup.num_frames = num_frames;
        }
        if let Some(num_bias_frames) = self.num_bias_frames {
            setup.num_bias_frames = num_bias_frames;
        }
        if let Some(r_mag) = self.r_mag {
            setup.r_mag = r_mag;
        }
        if let Some(visibility) = self.visibility {
            setup.visibility = visibility;
        }
        if let Some(coherence_phase) = self.coherence_phase {
            setup.coherence_phase = coherence_phase;
        }
        if let Some(seeing) = self.seeing {
            setup.seeing = seeing;
        }
        if let Some(wind_speed) = self.wind_speed {
            setup.wind_speed = wind_speed;
        }
        if let Some(delay_error) = self.delay_error {
            setup.delay_error_bound = delay_error;
        }
        if let Some(read_noise) = self.read_noise {
            setup.read_noise = read_noise;
        }
        if self.every_incoherent_period {
            setup.delay_update_policy = DelayUpdatePolicy::EveryIncoherentPeriod;
        }
        setup.feed_back_correction = !self.no_feedback;
        setup.seed = self.seed;
        setup
    }
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), TrackerError> {
    let args = Args::parse();
    setup_logging(args.verbosity);
    let no_progress_bars = args.no_progress_bars;

    let config = args.into_setup().build()?;
    info!(
        "{} channels, {} trial delays, {:.1} photons per pixel per frame",
        config.channels.len(),
        config.trial_delays.len(),
        config.source.flux
    );
    debug!(
        "Coherent integration {:.3} ms, incoherent integration {:.3} ms",
        config.coherent_integration_time * 1000.0,
        config.incoherent_integration_time * 1000.0
    );

    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut tracker = FringeTracker::new(&config, rng)?;

    let progress = ProgressBar::with_draw_target(
        Some(config.num_frames as _),
        if no_progress_bars {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stdout()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} frames ({elapsed_precise}<{eta_precise})").unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message("Tracking");
    progress.tick();

    let report = tracker.run(config.num_frames, Some(progress));

    let estimates = report.squared_visibilities();
    info!("{} squared-visibility estimates", estimates.len());
    match report.median_squared_visibility() {
        Some(v2) => info!(
            "Median V^2 = {v2} (true V^2 = {})",
            config.source.visibility.powi(2)
        ),
        None => info!("The delay was never re-estimated; no V^2 estimates"),
    }
    info!("Final correction delay: {:e} m", report.final_correction_delay);

    Ok(())
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.init();
}
