use std::{
    hint::black_box,
    io::{self, Read},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use ink_solver::{
    Config, SolveOptions, SolveReport, Sketch,
    textual::{Labels, Problem},
};

#[derive(Parser)]
#[command(name = "ink", version, about, long_about = None)]
struct Cli {
    /// Path to the sketch file.
    /// Use '-' for stdin.
    #[arg(short = 'f', long)]
    filepath: PathBuf,

    /// How many frames to solve when measuring performance.
    #[arg(long, default_value_t = 100)]
    frames: u32,

    /// Show the final value of every named variable.
    #[arg(long = "show-variables")]
    show_variables: bool,

    /// Print the solved sketch in its persisted JSON form.
    #[arg(long)]
    json: bool,

    /// Fingers place their handles exactly instead of pulling on them.
    #[arg(long = "finger-of-god")]
    finger_of_god: bool,

    /// Polar vectors away from any finger keep their length and angle.
    #[arg(long = "stabilize-gizmos")]
    stabilize_gizmos: bool,

    /// Give up on a cluster after this many minimizer iterations.
    #[arg(long = "max-iterations")]
    max_iterations: Option<usize>,
}

struct Run {
    sketch: Sketch,
    labels: Labels,
    report: SolveReport,
    per_frame: Duration,
}

fn main() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ink_solver=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match main_inner(&cli) {
        Ok(run) => {
            if let Err(e) = print_output(&run, &cli) {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            print_failure_output(&e);
            std::process::exit(1);
        }
    }
}

fn main_inner(cli: &Cli) -> anyhow::Result<Run> {
    let text = read_problem(cli)?;
    let problem = Problem::from_str(&text)?;
    let (mut sketch, labels) = problem.to_sketch()?;

    let mut config = Config::default();
    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations;
    }
    sketch.set_config(config);
    sketch.set_options(SolveOptions {
        stabilize_gizmos: cli.stabilize_gizmos,
    });
    sketch.set_finger_of_god(cli.finger_of_god);

    // Every frame starts from the sketch as drawn, so each one does the same work.
    let unsolved = sketch.clone();
    let report = sketch.solve().context("Could not solve sketch")?;

    let frames = cli.frames.max(1);
    let now = std::time::Instant::now();
    for _ in 0..frames {
        let mut frame = unsolved.clone();
        black_box(frame.solve())?;
    }
    let per_frame = now.elapsed() / frames;
    tracing::debug!(frames, ?per_frame, "measured");

    Ok(Run {
        sketch,
        labels,
        report,
        per_frame,
    })
}

/// Prints the output nicely to stdout.
fn print_output(run: &Run, cli: &Cli) -> anyhow::Result<()> {
    let Run {
        sketch,
        labels,
        report,
        per_frame,
    } = run;
    print_report(report);
    print_performance(*per_frame, cli.frames.max(1));
    println!("Handles:");
    for (label, id) in labels.handles() {
        let position = sketch.position(id)?;
        println!("\t{label}: ({:.2}, {:.2})", position.x, position.y);
    }
    if cli.show_variables {
        println!("Variables:");
        for (name, id) in labels.variables() {
            let value = sketch.value(id)?;
            let lock = if sketch.is_locked(id)? { " (locked)" } else { "" };
            println!("\t{name} = {value:.4}{lock}");
        }
    }
    if cli.json {
        println!("{}", sketch.to_json()?);
    }
    Ok(())
}

fn print_report(report: &SolveReport) {
    use colored::Colorize;
    let SolveReport {
        clusters,
        solved,
        fully_determined,
        abandoned,
        failed: _,
        iterations,
    } = report;
    println!(
        "Clusters: {clusters} ({solved} solved, {fully_determined} fully determined by knowns)"
    );
    if *abandoned > 0 {
        let l = format!("{abandoned} clusters hit the iteration limit and were left as they were");
        println!("{}", l.yellow());
    }
    println!("Iterations needed: {iterations}");
}

fn print_performance(duration: Duration, frames: u32) {
    use colored::Colorize;
    let time = format!("{}μs", duration.as_micros());
    println!("Solved in {time} (mean over {frames} frames)");
    let frames_per_second = Duration::from_secs(1).as_micros() / duration.as_micros().max(1);
    let frames_per_second = if frames_per_second <= 60 {
        frames_per_second.to_string().red()
    } else {
        frames_per_second.to_string().normal()
    };
    println!("i.e. {frames_per_second} frames per second");
}

fn print_failure_output(error: &anyhow::Error) {
    use colored::Colorize;
    eprintln!("{}: {error:#}", "Could not solve sketch".red());
    if let Some(ink_solver::SolverError::Minimizer { cluster, .. }) =
        error.downcast_ref::<ink_solver::SolverError>()
    {
        eprintln!("Cluster {cluster} might have contradictory constraints. Try unlocking something.");
    }
}

/// Read the sketch text from a file or stdin, depending on user args.
/// They pass a filename, or '-' for stdin.
fn read_problem(cli: &Cli) -> anyhow::Result<String> {
    // Read from file
    if cli.filepath != PathBuf::from("-") {
        return std::fs::read_to_string(&cli.filepath)
            .with_context(|| format!("Could not read {}", cli.filepath.display()));
    }

    // Read from stdin
    let mut text = String::with_capacity(100);
    io::stdin().read_to_string(&mut text)?;
    Ok(text)
}
