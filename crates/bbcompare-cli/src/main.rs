mod export;
mod summary;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use bbcompare_browser::{BrowserOptions, ChromiumDriverFactory};
use bbcompare_core::{AppConfig, CoreError, ProvidersFile, ScrapeRequest};
use bbcompare_scraper::{OrchestratorSettings, SessionOrchestrator};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::export::ExportFormat;

/// Exit status for a postcode that fails validation.
const EXIT_INVALID_POSTCODE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "bbcompare", version)]
#[command(about = "Compare UK broadband deals available at a postcode")]
struct Cli {
    /// UK postcode to search, e.g. "SW1A 1AA".
    #[arg(long, required_unless_present = "list_providers")]
    postcode: Option<String>,

    /// Provider ids to scrape, comma separated. Defaults to every configured provider.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    providers: Vec<String>,

    /// Address entry to select. The first listed address is used when omitted.
    #[arg(long)]
    address: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Output directory. Defaults to `BBCOMPARE_OUTPUT_DIR`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Tracing filter used when `RUST_LOG` is unset, e.g. `debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Providers file. Defaults to `BBCOMPARE_PROVIDERS_PATH`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum concurrent provider sessions.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: Option<u16>,

    /// Print the configured providers and exit.
    #[arg(long)]
    list_providers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    #[value(alias = "excel")]
    Xlsx,
    Json,
    All,
}

impl OutputFormat {
    fn exports(self) -> Vec<ExportFormat> {
        match self {
            OutputFormat::Csv => vec![ExportFormat::Csv],
            OutputFormat::Xlsx => vec![ExportFormat::Xlsx],
            OutputFormat::Json => vec![ExportFormat::Json],
            OutputFormat::All => vec![ExportFormat::Csv, ExportFormat::Xlsx, ExportFormat::Json],
        }
    }
}

impl Cli {
    /// Requested provider ids, `None` meaning all. `all` anywhere in the list selects all.
    fn provider_selection(&self) -> Option<Vec<String>> {
        let ids: Vec<String> = self
            .providers
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if ids.is_empty() || ids.iter().any(|p| p == "all") {
            None
        } else {
            Some(ids)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "run aborted");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = bbcompare_core::load_app_config()?;
    init_tracing(cli.log_level.as_deref(), &config)?;

    let providers_path = cli.config.clone().unwrap_or_else(|| config.providers_path.clone());
    let providers = bbcompare_core::load_providers(&providers_path)
        .with_context(|| format!("loading providers from {}", providers_path.display()))?;

    if cli.list_providers {
        print_providers(&providers);
        return Ok(ExitCode::SUCCESS);
    }

    let postcode = cli.postcode.as_deref().unwrap_or_default();
    let request = match ScrapeRequest::new(postcode, cli.address.clone(), cli.provider_selection()) {
        Ok(request) => request,
        Err(CoreError::InvalidPostcode(raw)) => {
            tracing::error!(postcode = %raw, "invalid postcode");
            eprintln!("error: {raw:?} is not a valid UK postcode");
            return Ok(ExitCode::from(EXIT_INVALID_POSTCODE));
        }
    };

    if let Some(ids) = &request.providers {
        let unknown: Vec<&str> = ids
            .iter()
            .filter(|id| providers.get(id).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            let known: Vec<&str> = providers.ids().collect();
            anyhow::bail!(
                "unknown provider(s): {} (configured: {})",
                unknown.join(", "),
                known.join(", ")
            );
        }
    }

    let mut settings = OrchestratorSettings::from_app_config(&config);
    if let Some(n) = cli.concurrency {
        settings.max_concurrent_sessions = Some(usize::from(n));
    }

    let browser = BrowserOptions {
        headless: config.headless,
        chrome_path: config.chrome_path.clone(),
        ..BrowserOptions::default()
    };
    let factory = Arc::new(
        ChromiumDriverFactory::launch(&browser)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?,
    );

    let orchestrator = SessionOrchestrator::new(providers.providers, Arc::clone(&factory) as _, settings)?;
    let outcome = orchestrator.run(&request).await;
    drop(orchestrator);
    if let Ok(factory) = Arc::try_unwrap(factory) {
        factory.shutdown().await;
    }
    let result = outcome?;

    let output_dir = cli.output.clone().unwrap_or_else(|| config.output_dir.clone());
    let written = export::write_all(&result, &cli.format.exports(), &output_dir)?;

    println!("{}", summary::render(&result, &written));

    if result.has_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("no provider produced usable results");
        Ok(ExitCode::FAILURE)
    }
}

fn init_tracing(cli_level: Option<&str>, config: &AppConfig) -> anyhow::Result<()> {
    let fallback = cli_level.unwrap_or(&config.log_level);
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(!config.env.plain_logs())
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(env = %config.env, "tracing initialized");
    Ok(())
}

fn print_providers(providers: &ProvidersFile) {
    for provider in &providers.providers {
        println!("{:<14} {:<16} {}", provider.id, provider.name, provider.base_url);
    }
}
