use anyhow::{Context, Result};
use log::LevelFilter;
use serde_json::json;
use std::path::PathBuf;

use prodscope::config::Settings;
use prodscope::contexts::{self, Analyzer};

pub struct Config {
    pub verbose: bool,
    pub settings_path: Option<PathBuf>,
}

/// Initializes env_logger; `RUST_LOG` applies unless `--verbose` forces debug
pub fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

/// Handles each URL in order against one shared cache and prints the
/// result or error object as JSON.
pub async fn analyze(urls: Vec<String>, config: &Config) -> Result<()> {
    let settings = Settings::load(config.settings_path.as_deref())
        .context("Failed to load settings")?;

    if config.verbose {
        println!(
            "Workers: {} {} | {}",
            settings.python,
            settings.product_script_path().display(),
            settings.reviews_script_path().display()
        );
    }

    let analyzer = Analyzer::from_settings(&settings);
    let total = urls.len();
    let mut failed = 0;

    for url in urls {
        match analyzer.handle(&url).await {
            Ok(result) => {
                let rendered = serde_json::to_string_pretty(&result)
                    .context("Failed to serialize analysis result")?;
                println!("{}", rendered);
            }
            Err(e) => {
                failed += 1;
                eprintln!("✗ {}: {}", url, e);
                let body = json!({
                    "url": url,
                    "status": e.status(),
                    "body": e.body(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&body).context("Failed to serialize error")?
                );
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} request(s) failed", failed, total);
    }
    Ok(())
}

pub fn reviews_url(url: &str) {
    println!("{}", contexts::reviews_url(url));
}
