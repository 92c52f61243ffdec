//! # VerODE CLI
//!
//! Command-line interface for validated integration of the standard problems.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use ndarray::Array1;
use std::path::PathBuf;
use verode_contractors::{
    adams_moulton_coefficients, Contractor, FixedStepIntegrator, HermiteObreschkoffCoefficients,
    MethodConfig, RunConfig, Trajectory,
};
use verode_core::{
    damped_oscillator, exponential_decay, harmonic_oscillator, interval_vector, max_width,
    parametric_decay, uncertain_decay, IVector, LinearOde,
};

#[derive(Parser)]
#[command(name = "verode")]
#[command(author = "Yatrogenesis")]
#[command(version = "0.1.0")]
#[command(about = "Validated ODE integration with interval contractors", long_about = None)]
struct Cli {
    /// Log progress to stderr (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate a standard problem
    Run {
        /// Problem to integrate
        #[arg(value_enum)]
        problem: Problem,
        /// JSON file with method and integrator settings
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Contractor (overrides the config file)
        #[arg(short, long, value_enum)]
        method: Option<Method>,
        /// Taylor order for Lohner and the Adams-Moulton bootstrap
        #[arg(long, default_value_t = 4)]
        order: usize,
        /// Explicit Hermite-Obreschkoff order
        #[arg(long, default_value_t = 3)]
        p: usize,
        /// Implicit Hermite-Obreschkoff order
        #[arg(long, default_value_t = 3)]
        q: usize,
        /// Adams-Moulton step count
        #[arg(long, default_value_t = 3)]
        am_steps: usize,
        /// Number of steps
        #[arg(short = 'n', long)]
        steps: Option<usize>,
        /// Step size
        #[arg(short = 'H', long)]
        step_size: Option<f64>,
        /// Print every N-th grid point
        #[arg(long, default_value_t = 10)]
        every: usize,
        /// Write the trajectory as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the standard problems
    Problems,

    /// Print method coefficients
    Coefficients {
        #[arg(value_enum)]
        method: Method,
        #[arg(long, default_value_t = 3)]
        p: usize,
        #[arg(long, default_value_t = 3)]
        q: usize,
        #[arg(long, default_value_t = 3)]
        am_steps: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    Lohner,
    HermiteObreschkoff,
    AdamsMoulton,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Problem {
    Decay,
    UncertainDecay,
    ParametricDecay,
    Oscillator,
    DampedOscillator,
}

impl Problem {
    fn all() -> [Problem; 5] {
        [
            Problem::Decay,
            Problem::UncertainDecay,
            Problem::ParametricDecay,
            Problem::Oscillator,
            Problem::DampedOscillator,
        ]
    }

    fn description(self) -> &'static str {
        match self {
            Problem::Decay => "x' = -x, x0 in [0.99, 1.01]",
            Problem::UncertainDecay => "x' = a x, a in [-1.1, -0.9], x0 = 1",
            Problem::ParametricDecay => "x' = p x, p in [-1.2, -0.8], x0 in [0.98, 1.02]",
            Problem::Oscillator => "x'' = -x, x0 in [0.99, 1.01] x [-0.01, 0.01]",
            Problem::DampedOscillator => "x'' = -x - p x', p in [0.1, 0.2]",
        }
    }

    /// Right-hand side, initial set and parameter set
    fn setup(self) -> anyhow::Result<(LinearOde, IVector, IVector)> {
        let none = Array1::from_vec(vec![]);
        let box2 = || interval_vector(&[0.99, -0.01], &[1.01, 0.01]);
        Ok(match self {
            Problem::Decay => (exponential_decay(1.0), interval_vector(&[0.99], &[1.01])?, none),
            Problem::UncertainDecay => (
                uncertain_decay(-1.1, -0.9)?,
                interval_vector(&[1.0], &[1.0])?,
                none,
            ),
            Problem::ParametricDecay => (
                parametric_decay(),
                interval_vector(&[0.98], &[1.02])?,
                interval_vector(&[-1.2], &[-0.8])?,
            ),
            Problem::Oscillator => (harmonic_oscillator(1.0), box2()?, none),
            Problem::DampedOscillator => (
                damped_oscillator(1.0),
                box2()?,
                interval_vector(&[0.1], &[0.2])?,
            ),
        })
    }
}

// ============================================================================
// LOGGING
// ============================================================================

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR".red().bold(),
            Level::Warn => "WARN".yellow().bold(),
            Level::Info => "INFO".green(),
            Level::Debug => "DEBUG".blue(),
            Level::Trace => "TRACE".dimmed(),
        };
        eprintln!("{level} {}", record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn method_config(method: Method, order: usize, p: usize, q: usize, am_steps: usize) -> MethodConfig {
    match method {
        Method::Lohner => MethodConfig::Lohner { order },
        Method::HermiteObreschkoff => MethodConfig::HermiteObreschkoff { p, q },
        Method::AdamsMoulton => MethodConfig::AdamsMoulton {
            steps: am_steps,
            order,
            refinements: 2,
            variable_step: false,
        },
    }
}

fn print_trajectory(traj: &Trajectory, every: usize) {
    let every = every.max(1);
    let last = traj.len().saturating_sub(1);
    for (i, (t, x)) in traj.times.iter().zip(&traj.enclosures).enumerate() {
        if i % every != 0 && i != last {
            continue;
        }
        let components: Vec<String> = x.iter().map(|c| format!("{c:.8}")).collect();
        println!(
            "  t = {:>8.4}  {}  {}",
            t,
            components.join("  "),
            format!("width {:.3e}", max_width(x)).dimmed()
        );
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            problem,
            config,
            method,
            order,
            p,
            q,
            am_steps,
            steps,
            step_size,
            every,
            output,
        } => {
            let mut run = match &config {
                Some(path) => RunConfig::load(path)
                    .with_context(|| format!("reading settings from {}", path.display()))?,
                None => RunConfig::default(),
            };
            if let Some(method) = method {
                run.method = method_config(method, order, p, q, am_steps);
            }
            if let Some(steps) = steps {
                run.integrator.steps = steps;
            }
            if let Some(h) = step_size {
                run.integrator.step_size = h;
            }
            run.validate()?;

            let (rhs, x0, params) = problem.setup()?;
            println!(
                "{} {} with {}",
                "Integrating".green().bold(),
                problem.description(),
                run.method.name().cyan()
            );
            println!(
                "  {} steps of h = {} up to t = {}",
                run.integrator.steps,
                run.integrator.step_size,
                run.integrator.horizon(0.0)
            );

            let contractor = Contractor::from_config(rhs, &run.method)?;
            let mut integrator = FixedStepIntegrator::new(contractor, run.integrator.clone())?;
            let trajectory = integrator
                .integrate(&x0, &params, 0.0)
                .with_context(|| format!("{} integration failed", run.method.name()))?;

            print_trajectory(&trajectory, every);
            println!(
                "{} max width {:.3e}",
                "Done:".green().bold(),
                trajectory.max_width()
            );

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&trajectory)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("  Trajectory written to {}", path.display().to_string().cyan());
            }
        }

        Commands::Problems => {
            println!("{}", "Standard problems:".green().bold());
            println!();
            for problem in Problem::all() {
                let name = problem
                    .to_possible_value()
                    .map(|v| v.get_name().to_string())
                    .unwrap_or_default();
                println!("  {:<18} {}", name.cyan(), problem.description());
            }
        }

        Commands::Coefficients {
            method,
            p,
            q,
            am_steps,
        } => match method {
            Method::Lohner => {
                println!("{}", "Lohner uses plain Taylor weights h^i".yellow());
            }
            Method::HermiteObreschkoff => {
                let c = HermiteObreschkoffCoefficients::new(p, q);
                println!("{} p = {p}, q = {q}", "Hermite-Obreschkoff".green().bold());
                for (i, w) in c.cpq.iter().enumerate() {
                    println!("  cpq[{i}] = {w:.12}");
                }
                for (i, w) in c.cqp.iter().enumerate() {
                    println!("  cqp[{i}] = {w:.12}");
                }
                println!("  gamma  = {:.12}", c.gamma);
            }
            Method::AdamsMoulton => {
                let c = adams_moulton_coefficients(am_steps)?;
                println!("{} s = {am_steps}", "Adams-Moulton".green().bold());
                for (i, b) in c.beta.iter().enumerate() {
                    println!("  beta[{i}] = {b:.12}");
                }
                println!("  gamma   = {:.12}", c.gamma);
            }
        },
    }

    Ok(())
}
