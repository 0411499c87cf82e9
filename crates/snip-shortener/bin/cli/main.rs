mod cli;

use crate::cli::{Command, CLI};
use anyhow::Context;
use clap::Parser;
use snip_core::ShortCode;
use snip_generator::Crc32Generator;
use snip_shortener::{Shortened, Shortener, ShortenerService};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(&config.log_level, config.log_json)?;

    let backend = config.storage_backend()?;
    info!(storage_backend = %backend, "starting snip");

    let repository = snip_storage::open(&backend)
        .await
        .with_context(|| format!("failed to open {backend} storage"))?;
    let service = ShortenerService::new(repository, Crc32Generator::new());

    // Close even when the command failed so scheduled deletes are applied.
    let outcome = run(&service, &config).await;
    service.close().await.context("failed to close storage")?;
    outcome
}

fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {level}"))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(())
}

async fn run<S: Shortener + ?Sized>(service: &S, config: &CLI) -> anyhow::Result<()> {
    match &config.command {
        Command::Shorten { url, owner } => {
            let shortened = service.create_url(url.as_bytes(), owner).await?;
            if let Shortened::Existing(code) = &shortened {
                info!(code = %code, "url was already shortened");
            }
            println!("{}", shortened.code().to_url(&config.base_url));
        }
        Command::Batch { urls, owner } => {
            for code in service.create_url_batch(urls, owner).await? {
                println!("{}", code.to_url(&config.base_url));
            }
        }
        Command::Resolve { code } => {
            let code = ShortCode::new(code.as_str())?;
            println!("{}", service.get_url(&code).await?);
        }
        Command::List { owner } => {
            for record in service.urls_by_owner(owner).await? {
                println!(
                    "{}\t{}",
                    record.code.to_url(&config.base_url),
                    record.original_url
                );
            }
        }
        Command::Delete { codes, owner } => {
            let codes = codes
                .iter()
                .map(|code| ShortCode::new(code.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let requested = codes.len();
            service.delete_urls(codes, owner).await?;
            info!(owner = %owner, requested, "delete scheduled");
        }
        Command::Stats => {
            let stats = service.stats().await?;
            println!("{}", serde_json::to_string(&stats)?);
        }
        Command::Ping => {
            service.ping_storage().await?;
            println!("ok");
        }
    }

    Ok(())
}
