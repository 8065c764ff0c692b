use clap::{Parser, Subcommand};
use district_maps::{config, pipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the point heatmap clipped to the district boundaries
    Heatmap {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Generate the district choropleth with tooltips
    Choropleth {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Heatmap { config } => {
            tracing::info!("Generating heatmap with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            pipeline::run_heatmap(&app_config)?;
        }
        Commands::Choropleth { config } => {
            tracing::info!("Generating choropleth with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            pipeline::run_choropleth(&app_config)?;
        }
    }

    Ok(())
}
