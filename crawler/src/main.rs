use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dysdera_core::{
    CrawlerContext, Dispatcher, DocumentStoreSink, ExtractorSink, FetchClient, FileStoreSink,
    OpenPolicy,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Crawl a set of seed domains, respecting robots.txt, and persist every
/// HTML page it finds.
#[derive(Parser, Debug)]
#[command(name = "dysdera")]
#[command(about = "Polite, focused web crawler")]
struct Cli {
    /// Path to a file with seed URLs (one per line)
    #[arg(long)]
    seeds: String,
    /// Directory the document store or flat-file sink writes into
    #[arg(long, default_value = "./sample_data")]
    output: PathBuf,
    /// Use the flat-file sink instead of the embedded sled document store
    #[arg(long, default_value_t = false)]
    flat_files: bool,
    /// 0 disables duplicate checking, 1 checks exact content hashes, >1
    /// checks simhash distance against that value
    #[arg(long, default_value_t = 3)]
    duplicate_sensibility: u32,
    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    /// User-Agent string sent on every request and matched against robots.txt
    /// User-agent blocks
    #[arg(long, default_value = "dysdera-crawler/0.1")]
    user_agent: String,
    /// Restrict crawling to only the seed domains, never following a link
    /// off-domain
    #[arg(long, default_value_t = false)]
    same_domain_only: bool,
    /// Print tracing spans at debug level to the console as well as to
    /// dysdera.log
    #[arg(long, default_value_t = false)]
    verbose: bool,
    /// Path the file log layer writes to
    #[arg(long, default_value = "dysdera.log")]
    log_file: PathBuf,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let console_filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let log_file = File::create(&cli.log_file)
        .with_context(|| format!("opening log file {}", cli.log_file.display()))?;
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("info"));

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

fn load_seeds(path: &str) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("opening seeds file {}", path))?;
    let reader = BufReader::new(file);
    let mut seeds = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        seeds.push(line.to_string());
    }
    Ok(seeds)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let seeds = load_seeds(&cli.seeds)?;
    if seeds.is_empty() {
        anyhow::bail!("no seed URLs found in {}", cli.seeds);
    }

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("creating output directory {}", cli.output.display()))?;

    let sink: Arc<dyn ExtractorSink> = if cli.flat_files {
        Arc::new(FileStoreSink::new(cli.output.clone()))
    } else {
        Arc::new(DocumentStoreSink::open(&cli.output)?)
    };

    let policy: Arc<dyn dysdera_core::CrawlPolicy> = if cli.same_domain_only {
        Arc::new(dysdera_core::DomainPolicy::new(seed_hosts(&seeds)))
    } else {
        Arc::new(OpenPolicy)
    };

    let timeout = Duration::from_secs(cli.timeout_secs);
    let client = FetchClient::new(&cli.user_agent, timeout)?;
    let duplicate_sensibility = cli.duplicate_sensibility;

    let mut dispatcher = Dispatcher::new(move |event_tx| {
        CrawlerContext::new(client, policy, sink, duplicate_sensibility, timeout, event_tx)
    });

    tracing::info!(count = seeds.len(), "starting crawl");
    dispatcher.start(seeds).await;
    tracing::info!("crawl finished");
    Ok(())
}

fn seed_hosts(seeds: &[String]) -> Vec<String> {
    seeds
        .iter()
        .filter_map(|s| dysdera_core::Url::parse(s, None).ok())
        .map(|u| u.host().to_string())
        .collect()
}
