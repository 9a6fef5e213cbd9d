use std::path::PathBuf;

use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use neat_maze::config::Config;
use neat_maze::generation::GenerationPipeline;
use neat_maze::persistence;

/// Minimal positional/flag parsing over `std::env::args`, matching the ambient stack's
/// preference for a dependency-light binary entry point (§6).
struct Cli {
    config: Option<PathBuf>,
    generations: u32,
    seed: u64,
    resume_from: Option<PathBuf>,
    save_to: Option<PathBuf>,
}

impl Cli {
    fn parse() -> Self {
        let mut cli = Cli {
            config: None,
            generations: 100,
            seed: 0,
            resume_from: None,
            save_to: None,
        };
        let mut args = std::env::args().skip(1);
        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--config" => cli.config = args.next().map(PathBuf::from),
                "--generations" => {
                    cli.generations = args.next().and_then(|v| v.parse().ok()).unwrap_or(cli.generations)
                }
                "--seed" => cli.seed = args.next().and_then(|v| v.parse().ok()).unwrap_or(cli.seed),
                "--resume-from" => cli.resume_from = args.next().map(PathBuf::from),
                "--save-to" => cli.save_to = args.next().map(PathBuf::from),
                other => eprintln!("ignoring unrecognized argument: {other}"),
            }
        }
        cli
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut pipeline = if let Some(path) = &cli.resume_from {
        persistence::load(path).into_diagnostic()?
    } else {
        let config = match &cli.config {
            Some(path) => Config::load(path).into_diagnostic()?,
            None => Config::default(),
        };
        GenerationPipeline::new(config, cli.seed).into_diagnostic()?
    };

    for stats in pipeline.by_ref().take(cli.generations as usize) {
        println!(
            "gen {:>4} | species {:>3} | best {:>10.2} | avg {:>10.2}",
            stats.generation, stats.species_count, stats.best_fitness, stats.average_fitness
        );
    }

    if let Some(path) = &cli.save_to {
        persistence::save(&pipeline, path).into_diagnostic()?;
        println!("saved pipeline to {}", path.display());
    }

    if let Some(best) = pipeline.best_genome() {
        println!("best genome overall: id {} fitness {:.2}", best.id, best.fitness);
    }

    Ok(())
}
