use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "oddsight")]
#[command(about = "Odds aggregation and EV opportunity engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the refresh engine with the web API
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Config profile overlay (loads Config.<profile>.toml)
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Run one refresh cycle and print the resulting opportunities
    Scan {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Config profile overlay (loads Config.<profile>.toml)
        #[arg(short, long)]
        profile: Option<String>,
        /// Only print opportunities at or above this EV%
        #[arg(long)]
        min_ev: Option<f64>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, profile } => {
            commands::run::run(&config, profile.as_deref()).await?;
        }
        Commands::Scan {
            config,
            profile,
            min_ev,
            json,
        } => {
            commands::scan::run(&config, profile.as_deref(), min_ev, json).await?;
        }
    }

    Ok(())
}
