//! Estimate the group delay of a single frame from a simulated AC coupler by
//! chi-squared minimisation, then apply it to a tricoupler measurement and
//! report the squared visibility.

use clap::{AppSettings, Parser};
use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};

use fringe_tracker::{
    combiner::{AcCoupler, Combiner, NoiseModel, Tricoupler},
    config::ObservingSetup,
    delay::{find_delay_ac, refine_delay_ac, ChiSquaredAc, EnvelopeSink, TrialDelays},
    tracking::squared_visibility,
};

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
struct Args {
    /// The atmospheric delay to recover [m].
    #[clap(long, default_value = "1.62e-5")]
    delay: f64,

    /// The R magnitude of the star.
    #[clap(long, default_value = "-5")]
    r_mag: f64,

    /// The visibility modulus of the star.
    #[clap(long)]
    visibility: Option<f64>,

    /// The seeing [arcsec]. Sets the integration time.
    #[clap(long)]
    seeing: Option<f64>,

    /// Extra glass in one arm of the AC coupler [m].
    #[clap(long)]
    glass_length: Option<f64>,

    /// Detector read noise [e-].
    #[clap(long)]
    read_noise: Option<f64>,

    /// The number of trial delays between -5e-5 and 5e-5 m.
    #[clap(long, default_value = "50000")]
    num_trial_delays: usize,

    /// Polish the grid estimate with a Nelder-Mead search.
    #[clap(long)]
    refine: bool,

    /// Write the chi-squared curve to stdout as "delay chi2" lines.
    #[clap(long)]
    print_curve: bool,

    /// Seed the random number generator for a reproducible run.
    #[clap(long)]
    seed: Option<u64>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv).
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,
}

impl Args {
    fn setup(&self) -> ObservingSetup {
        let mut setup = ObservingSetup {
            r_mag: self.r_mag,
            // The AC coupler splits the light between two outputs.
            num_outputs: 2,
            seed: self.seed,
            ..Default::default()
        };
        if let Some(visibility) = self.visibility {
            setup.visibility = visibility;
        }
        if let Some(seeing) = self.seeing {
            setup.seeing = seeing;
        }
        if let Some(glass_length) = self.glass_length {
            setup.glass_length = glass_length;
        }
        if let Some(read_noise) = self.read_noise {
            setup.read_noise = read_noise;
        }
        setup
    }
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stdout)
        .format_target(false)
        .filter_level(match args.verbosity {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .init();

    let config = args.setup().build()?;
    let channels = &config.channels;
    let glass = config.glass;
    let source = config.source;
    debug!(
        "{:.1} photons per pixel in {:.3} ms",
        source.flux,
        config.coherent_integration_time * 1000.0
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = NoiseModel::shot_and_read(config.read_noise)?;
    let ac = AcCoupler::new(channels.clone(), glass, noise);
    let gamma_r = ac.measure_coherence(args.delay, 0.0, &source, &mut rng);

    let trial_delays = TrialDelays::linspace(-5e-5, 5e-5, args.num_trial_delays)?;
    let mut print_curve = |delays: &[f64], chi2: &[f64]| {
        for (d, c) in delays.iter().zip(chi2) {
            println!("{d:e} {c}");
        }
    };
    let sink: Option<&mut dyn EnvelopeSink> = if args.print_curve {
        Some(&mut print_curve)
    } else {
        None
    };
    let mut fix_delay = find_delay_ac(gamma_r.view(), &trial_delays, channels, &glass, sink);

    if args.refine && trial_delays.len() > 1 {
        let step = trial_delays.as_slice()[1] - trial_delays.as_slice()[0];
        let chi_squared = ChiSquaredAc::new(gamma_r.view(), channels, &glass);
        fix_delay = refine_delay_ac(chi_squared, fix_delay, step, 100)?;
    }
    info!("Delay estimate = {fix_delay:e}");
    info!("Off by: {:e}", fix_delay.abs() - args.delay.abs());

    // Apply the estimate on a tricoupler to measure the visibility.
    let tri = Tricoupler::new(config.channels.clone(), noise);
    let new_gamma = tri.measure_coherence(args.delay, fix_delay, &source, &mut rng);
    info!(
        "Visibility^2 estimate = {}",
        squared_visibility(new_gamma.view(), 0.0)
    );

    Ok(())
}
