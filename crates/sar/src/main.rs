use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sar_recommender::{read_json_records, RecommendParams, Sar, SarConfig, SarModel, TracingObserver};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sar")]
#[command(about = "Fit and query SAR recommendation models", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "SAR_CONFIG", help = "Configuration file (TOML, JSON or YAML)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fit a model from a JSON array of interaction records")]
    Fit {
        #[arg(short, long, help = "Interaction records (JSON)")]
        input: PathBuf,

        #[arg(short, long, help = "Where to write the fitted model")]
        model: PathBuf,
    },

    #[command(about = "Top-k recommendations for users")]
    Recommend {
        #[arg(short, long, help = "Fitted model file")]
        model: PathBuf,

        #[arg(short, long = "user", help = "User id to score (repeatable)")]
        users: Vec<String>,

        #[arg(long, help = "Ad-hoc interaction records (JSON) for users outside the model")]
        adhoc: Option<PathBuf>,

        #[arg(short = 'k', long, default_value = "10", help = "Items per user")]
        top_k: usize,

        #[arg(long, help = "Keep items the user already interacted with")]
        keep_seen: bool,

        #[arg(long, help = "Fail on ids the model has never seen")]
        strict: bool,
    },

    #[command(about = "Items most similar to an item")]
    Similar {
        #[arg(short, long, help = "Fitted model file")]
        model: PathBuf,

        #[arg(short, long, help = "Item id")]
        item: String,

        #[arg(short = 'k', long, default_value = "10", help = "Number of items")]
        top_k: usize,
    },

    #[command(about = "Most popular items")]
    Popular {
        #[arg(short, long, help = "Fitted model file")]
        model: PathBuf,

        #[arg(short = 'k', long, default_value = "10", help = "Number of items")]
        top_k: usize,
    },

    #[command(about = "Print model statistics")]
    Stats {
        #[arg(short, long, help = "Fitted model file")]
        model: PathBuf,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Fit { input, model } => {
            let config = SarConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
            let file = File::open(&input)
                .with_context(|| format!("Failed to open {}", input.display()))?;
            let records = read_json_records(BufReader::new(file), &config.columns)
                .with_context(|| format!("Failed to read interactions from {}", input.display()))?;

            let fitted = Sar::new(config)
                .with_observer(Arc::new(TracingObserver))
                .fit(&records)
                .context("Failed to fit model")?;
            fitted
                .save_to_path(&model)
                .with_context(|| format!("Failed to write model to {}", model.display()))?;

            print_json(&fitted.stats())?;
        }
        Commands::Recommend {
            model,
            users,
            adhoc,
            top_k,
            keep_seen,
            strict,
        } => {
            let fitted = load_model(&model)?;
            let mut params = RecommendParams::top_k(top_k);
            if keep_seen {
                params = params.keep_seen();
            }
            if strict {
                params = params.reject_unknown();
            }

            let mut output = fitted.recommend(&users, &params)?;
            if let Some(path) = adhoc {
                let file = File::open(&path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                let records = read_json_records(BufReader::new(file), &fitted.config().columns)?;
                output.extend(fitted.recommend_adhoc(&records, &params)?);
            }

            print_json(&output)?;
        }
        Commands::Similar { model, item, top_k } => {
            let fitted = load_model(&model)?;
            print_json(&fitted.similar_items(&item, top_k)?)?;
        }
        Commands::Popular { model, top_k } => {
            let fitted = load_model(&model)?;
            print_json(&fitted.popular_items(top_k)?)?;
        }
        Commands::Stats { model } => {
            let fitted = load_model(&model)?;
            print_json(&fitted.stats())?;
        }
    }

    Ok(())
}

fn load_model(path: &Path) -> Result<SarModel> {
    SarModel::load_from_path(path).with_context(|| format!("Failed to load model from {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
