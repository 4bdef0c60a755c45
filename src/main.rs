use anyhow::{Context, Result};
use clap::Parser;
use polars::prelude::*;
use pvm_bridge::{layout, BridgeConfig, PvmEngine};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pvm-bridge")]
#[command(about = "Price-Volume-Mix bridge over a tabular dataset")]
#[command(version)]
struct Args {
    /// Dataset to analyse (CSV or Parquet)
    data: PathBuf,

    /// Bridge configuration (JSON)
    #[arg(short, long, default_value = "bridge.json")]
    config: PathBuf,

    /// Override the hierarchy from the configuration (comma separated)
    #[arg(long, value_delimiter = ',')]
    hierarchy: Option<Vec<String>>,

    /// Override the dimension used to label the largest components
    #[arg(long)]
    dimension: Option<String>,

    /// Override the number of top components per effect
    #[arg(long)]
    max_components: Option<usize>,

    /// Print every effect row as well
    #[arg(long)]
    rows: bool,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = BridgeConfig::from_path(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    if let Some(hierarchy) = args.hierarchy {
        config.hierarchy = hierarchy;
    }
    if let Some(dimension) = args.dimension {
        config.dimension = Some(dimension);
    }
    if let Some(max_components) = args.max_components {
        config.max_components = max_components;
    }
    config.validate()?;

    let data = load_dataset(&args.data)?;
    info!(
        "Loaded {} rows x {} columns from {}",
        data.height(),
        data.width(),
        args.data.display()
    );

    let engine = PvmEngine::from_config(data, &config)?;
    let calculated = engine.calculate(&config.hierarchy, config.return_detail)?;

    let summary = engine.summarize(&calculated)?;
    let reconciliation = engine.reconcile(&calculated)?;
    let components = match config.dimension.as_deref().or(config.hierarchy.last().map(|s| s.as_str())) {
        Some(dimension) => {
            engine.find_largest_components(&calculated, dimension, config.max_components)?
        }
        None => Vec::new(),
    };

    let report = json!({
        "periods": engine.periods().labels(),
        "summary": summary,
        "reconciliation": reconciliation,
        "components": components,
        "waterfall": layout(&components),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.rows {
        println!("{}", calculated);
    }

    Ok(())
}

fn load_dataset(path: &Path) -> Result<DataFrame> {
    let df = match path.extension().and_then(|s| s.to_str()) {
        Some("parquet") => LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect()?,
        _ => LazyCsvReader::new(path)
            .with_infer_schema_length(Some(1000))
            .finish()?
            .collect()?,
    };
    Ok(df)
}
