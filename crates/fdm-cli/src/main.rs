//! Frequency Demodulation Command-Line Interface
//!
//! Runs the canned test signals from `fdm-sim` through the `fdm-core`
//! pipeline and prints the processing report:
//! - `sine`, `sinefm`, `sineexp`: full demodulation to a frequency series
//!   (plus an amplitude decay fit for `sineexp`)
//! - `detector-noise`: averaged white-noise PSD against its target level
//! - `thermal-psd`: simulated thermomechanical PSD and oscillator fit

mod plot;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use fdm_core::store::{JsonStore, RecordStore};
use fdm_core::{fit_amplitude_decay, DemodConfig, FitOptions, OscillatorFit, PsdAccumulator, Signal};
use fdm_sim::{
    detector_noise, sine, sine_exp, sine_fm, DetectorNoiseConfig, SineConfig, SineExpConfig,
    SineFmConfig, ThermalConfig, ThermalOscillator,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// pm² to m²
const PM2_TO_M2: f64 = 1e-24;

#[derive(Parser)]
#[command(name = "fdm")]
#[command(author, version, about = "Frequency demodulation of oscillator signals", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a test signal and run it through the pipeline
    Run {
        /// Test signal to generate
        #[arg(value_enum)]
        signal: TestSignal,

        /// Seed for the noise generator
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Demodulation settings (TOML); defaults depend on the signal
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory to write the result container into (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print a plain-text plot of the frequency series or PSD
        #[arg(long)]
        ascii: bool,

        /// Plot width in columns
        #[arg(long, default_value = "72")]
        width: usize,

        /// Plot height in rows
        #[arg(long, default_value = "16")]
        height: usize,

        /// Cantilever temperature for the thermal PSD fit [K]
        #[arg(long, default_value = "300.0")]
        temperature: f64,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TestSignal {
    /// 2 kHz sinusoid with a little noise
    Sine,
    /// 4 kHz to 6 kHz frequency ramp
    Sinefm,
    /// Exponentially decaying 2 kHz sinusoid
    Sineexp,
    /// White detector noise PSD
    DetectorNoise,
    /// Simulated thermomechanical PSD
    ThermalPsd,
}

impl TestSignal {
    fn container_name(self) -> &'static str {
        match self {
            TestSignal::Sine => "sine",
            TestSignal::Sinefm => "sinefm",
            TestSignal::Sineexp => "sineexp",
            TestSignal::DetectorNoise => "detector-noise",
            TestSignal::ThermalPsd => "thermal-psd",
        }
    }
}

/// Options shared by every `run` variant
struct RunOptions {
    seed: u64,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    plot: Option<(usize, usize)>,
    temperature: f64,
}

fn load_config(path: Option<&Path>, default: DemodConfig) -> Result<DemodConfig> {
    match path {
        Some(path) => DemodConfig::load_from_file(path)
            .with_context(|| format!("Failed to load demodulation config {}", path.display())),
        None => Ok(default),
    }
}

fn open_output(dir: &Path, name: &str) -> Result<(JsonStore, fdm_core::store::ContainerHandle)> {
    let mut store = JsonStore::new(dir)
        .with_context(|| format!("Failed to open output directory {}", dir.display()))?;
    let handle = store
        .create_container(name)
        .with_context(|| format!("Failed to create container {name}"))?;
    Ok((store, handle))
}

fn print_frequency_plot(signal: &Signal, plot: Option<(usize, usize)>) {
    if let (Some((width, height)), Some(fit)) = (plot, signal.chunk_fit()) {
        println!();
        println!("Instantaneous frequency [Hz] vs. time [s]");
        println!("{}", plot::ascii_plot(&fit.time, &fit.frequency, width, height, false, "s"));
    }
}

fn print_psd_plot(psd: &PsdAccumulator, unit: &str, plot: Option<(usize, usize)>) {
    if let Some((width, height)) = plot {
        // positive frequencies only
        let (freq, power): (Vec<f64>, Vec<f64>) = psd
            .frequency_axis()
            .iter()
            .zip(psd.averaged_power())
            .filter(|(f, _)| **f > 0.0)
            .map(|(f, p)| (*f, *p))
            .unzip();
        println!();
        println!("Power spectrum [{unit}^2/Hz] vs. frequency [Hz]");
        println!("{}", plot::ascii_plot(&freq, &power, width, height, true, "Hz"));
    }
}

fn run_demodulation(
    kind: TestSignal,
    mut signal: Signal,
    default: DemodConfig,
    opts: &RunOptions,
) -> Result<()> {
    let config = load_config(opts.config.as_deref(), default)?;
    let start = Instant::now();
    signal
        .demodulate(&config)
        .with_context(|| format!("Demodulation of the {} signal failed", kind.container_name()))?;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "demodulation finished");

    println!("{}", signal.summary());
    println!("{signal}");

    let decay = if kind == TestSignal::Sineexp {
        let fit = fit_amplitude_decay(&signal).context("Amplitude decay fit failed")?;
        println!("{fit}");
        Some(fit)
    } else {
        None
    };

    print_frequency_plot(&signal, opts.plot);

    if let Some(dir) = &opts.output {
        let (mut store, handle) = open_output(dir, kind.container_name())?;
        signal
            .save(&mut store, handle)
            .context("Failed to save the signal")?;
        if let Some(fit) = &decay {
            fit.save(&mut store, handle)
                .context("Failed to save the decay fit")?;
        }
        store.close(handle).context("Failed to close the container")?;
        println!("Saved to {}", store.container_path(kind.container_name()).display());
    }
    Ok(())
}

fn save_psd(psd: &PsdAccumulator, kind: TestSignal, dir: &Path, unit: &str) -> Result<()> {
    let (mut store, handle) = open_output(dir, kind.container_name())?;
    psd.save(&mut store, handle, unit).context("Failed to save the PSD")?;
    store.close(handle).context("Failed to close the container")?;
    println!("Saved to {}", store.container_path(kind.container_name()).display());
    Ok(())
}

fn run_detector_noise(opts: &RunOptions) -> Result<()> {
    let config = DetectorNoiseConfig {
        seed: opts.seed,
        ..Default::default()
    };
    let segments = detector_noise(&config).context("Failed to generate detector noise")?;
    let mut psd = PsdAccumulator::new();
    psd.average_segments(&segments, config.dt, "x", "pm", None)
        .context("Failed to average the noise spectra")?;

    let averages = config.segments as f64;
    println!("{}", "-".repeat(50));
    println!("detector noise test report");
    println!("{}", "-".repeat(50));
    println!(
        "target psd = {:0.4e} +/- {:0.4e} pm^2/Hz",
        config.level,
        config.level / averages.sqrt()
    );
    println!("actual psd = {:0.4e} +/- {:0.4e} pm^2/Hz", psd.mean(), psd.std());
    println!("3-sigma relative error = {:0.4}", 3.0 / averages.sqrt());
    println!(
        " actual relative error = {:0.4}",
        (config.level - psd.mean()) / config.level
    );
    println!("{}", "-".repeat(50));

    print_psd_plot(&psd, "pm", opts.plot);
    if let Some(dir) = &opts.output {
        save_psd(&psd, TestSignal::DetectorNoise, dir, "pm")?;
    }
    Ok(())
}

fn run_thermal_psd(opts: &RunOptions) -> Result<()> {
    if !(opts.temperature > 0.0) {
        bail!("Temperature must be positive, got {} K", opts.temperature);
    }
    let config = ThermalConfig {
        temperature: opts.temperature,
        seed: opts.seed,
        ..Default::default()
    };
    let f0 = config.f0;
    let simulator = ThermalOscillator::new(config).context("Invalid thermal configuration")?;

    let start = Instant::now();
    let record = simulator.simulate().context("Thermal simulation failed")?;
    let psd = record.psd().context("Failed to average the thermal spectra")?;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "thermal psd ready");

    println!(
        "x thermal = {:6.3} pm = {:0.3e} m",
        record.x_thermal * 1e12,
        record.x_thermal
    );
    println!("p thermal = {:0.3e} kg m/s", record.p_thermal);
    for line in psd.report() {
        println!("{line}");
    }

    let options = FitOptions {
        power_scale: PM2_TO_M2,
        ..FitOptions::band(0.5 * f0, 1.5 * f0)
    };
    let fit = OscillatorFit::fit(&psd, opts.temperature, &options)
        .context("Oscillator fit to the thermal PSD failed")?;
    println!("{fit}");

    print_psd_plot(&psd, "pm", opts.plot);
    if let Some(dir) = &opts.output {
        save_psd(&psd, TestSignal::ThermalPsd, dir, "pm")?;
    }
    Ok(())
}

fn cmd_run(kind: TestSignal, opts: RunOptions) -> Result<()> {
    match kind {
        TestSignal::Sine => {
            let config = SineConfig {
                seed: opts.seed,
                ..Default::default()
            };
            let signal = sine(&config)?.into_signal()?;
            run_demodulation(kind, signal, config.demod_config(), &opts)
        }
        TestSignal::Sinefm => {
            let config = SineFmConfig {
                seed: opts.seed,
                ..Default::default()
            };
            let signal = sine_fm(&config)?.into_signal()?;
            run_demodulation(kind, signal, config.demod_config(), &opts)
        }
        TestSignal::Sineexp => {
            let config = SineExpConfig {
                seed: opts.seed,
                ..Default::default()
            };
            let signal = sine_exp(&config)?.into_signal()?;
            run_demodulation(kind, signal, config.demod_config(), &opts)
        }
        TestSignal::DetectorNoise => run_detector_noise(&opts),
        TestSignal::ThermalPsd => run_thermal_psd(&opts),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            signal,
            seed,
            config,
            output,
            ascii,
            width,
            height,
            temperature,
        } => cmd_run(
            signal,
            RunOptions {
                seed,
                config,
                output,
                plot: ascii.then_some((width, height)),
                temperature,
            },
        ),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
    }
}
