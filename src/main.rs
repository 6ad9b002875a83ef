use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "prodscope")]
#[command(about = "Product analysis from external scraper workers, cached per URL", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Path to a YAML settings file")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Analyze one or more product URLs against a shared cache")]
    Analyze {
        #[arg(required = true, help = "Product URLs, handled in order")]
        urls: Vec<String>,
    },

    #[command(about = "Print the reviews URL derived from a product URL")]
    ReviewsUrl {
        #[arg(help = "Product URL")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    cli::init_logging(cli.verbose);

    let config = cli::Config {
        verbose: cli.verbose,
        settings_path: cli.config,
    };

    match cli.command {
        Commands::Analyze { urls } => {
            cli::analyze(urls, &config).await?;
        }
        Commands::ReviewsUrl { url } => {
            cli::reviews_url(&url);
        }
    }

    Ok(())
}
