//! Hourly electricity load forecasting pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use loadcast::{config::Config, pipeline::Pipeline};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "loadcast")]
#[command(about = "Hourly electricity load forecasting pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "loadcast.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline, start to finish
    Run,
    /// Merge the raw load and temperature series
    Ingest,
    /// Build features, select, and scale
    Prepare,
    /// Fit base models and report holdout accuracy
    Train,
    /// Search hyperparameters per model family
    Tune,
    /// Fit the stacking ensemble and persist the final artifact
    Stack,
    /// Evaluate the persisted ensemble on the holdout, sliced by regime
    Evaluate,
    /// Predict one value from a JSON feature mapping
    Predict {
        /// Path to a JSON object of feature name → value
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let pipeline = Pipeline::new(config);

    match cli.command {
        Commands::Run => pipeline.run()?,
        Commands::Ingest => {
            pipeline.ingest()?;
        }
        Commands::Prepare => {
            pipeline.prepare()?;
        }
        Commands::Train => {
            pipeline.train()?;
        }
        Commands::Tune => {
            pipeline.tune()?;
        }
        Commands::Stack => {
            pipeline.stack()?;
        }
        Commands::Evaluate => {
            pipeline.evaluate()?;
        }
        Commands::Predict { input } => {
            let value = pipeline.predict_file(&input)?;
            println!("{value}");
        }
    }
    Ok(())
}
