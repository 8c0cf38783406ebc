mod cli;

use vodcheck::{
    config::{self, Config},
    fetch::ReqwestFetcher,
    Verifier,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(concurrency) = cli.concurrency {
        config.run.concurrency = concurrency;
    }
    if let Some(threshold) = cli.threshold {
        config.validation.threshold_ticks = threshold;
    }
    if let Some(max) = cli.max_fragments {
        config.run.max_fragments_per_list = max;
    }
    if let Some(timeout) = cli.timeout {
        config.fetch.timeout_secs = timeout;
    }
}

async fn verify(cli: &Cli, config: Config) -> Result<bool> {
    let fetcher = Arc::new(ReqwestFetcher::new(&config.fetch)?);
    let verifier = Verifier::new(fetcher, config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight fragments");
            on_signal.cancel();
        }
    });

    let report = verifier.run(&cli.url, cancel).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print!("{}", report.render_summary());
    }

    Ok(!report.has_issues())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vodcheck=trace,vodcheck_media=debug,vodcheck_manifest=debug".to_string()
        } else {
            "vodcheck=info,vodcheck_manifest=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::load_config_or_default(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    config::validate_config(&config)?;

    let rt = tokio::runtime::Runtime::new()?;
    let clean = rt.block_on(verify(&cli, config))?;

    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
