//! auditfeed CLI
//!
//! Lists and downloads a tenant's Management Activity audit content.

use std::path::PathBuf;
use std::sync::Arc;

use auditfeed_dl::config::DEFAULT_BASE_URL;
use auditfeed_dl::{
    AuditFetcher, Config, Error, OutputConfig, RunSummary, StaticTokenProvider, TimeRange,
    TokenProvider, cancel_on_signal,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt};

/// Log directives used when `RUST_LOG` is unset; per-blob failures are logged at warn
const DEFAULT_LOG_FILTER: &str = "warn";

/// Download audit content from the Management Activity feed.
#[derive(Parser, Debug)]
#[command(name = "auditfeed", version, about)]
struct Cli {
    /// Tenant (directory) id.
    #[arg(long, env = "AUDITFEED_TENANT_ID", global = true)]
    tenant_id: Option<String>,

    /// Bearer token for the management API.
    #[arg(long, env = "AUDITFEED_ACCESS_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Management API root.
    #[arg(
        long,
        env = "AUDITFEED_BASE_URL",
        default_value = DEFAULT_BASE_URL,
        global = true
    )]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every content blob in a time window.
    Fetch(FetchArgs),
    /// List the content blobs available in a time window.
    ListContent(RangeArgs),
    /// List the tenant's feed subscriptions.
    ListSubs,
    /// Start the subscription for a content type.
    StartSub(StartSubArgs),
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// Content type to list.
    #[arg(long = "type", default_value = "DLP.All")]
    content_type: String,

    /// Relative window ending now, e.g. 24h, 7d, 1d12h.
    #[arg(long)]
    since: Option<String>,

    /// Window start (RFC 3339).
    #[arg(long)]
    start: Option<String>,

    /// Window end (RFC 3339).
    #[arg(long)]
    end: Option<String>,
}

impl RangeArgs {
    fn time_range(&self) -> TimeRange {
        TimeRange {
            since: self.since.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[command(flatten)]
    range: RangeArgs,

    /// Directory for one JSON file per blob [default: audit-out].
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write newline-delimited JSON records to stdout instead of files.
    #[arg(long)]
    stdout: bool,

    /// Blobs fetched in parallel.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
}

#[derive(Args, Debug)]
struct StartSubArgs {
    /// Content type to subscribe to.
    #[arg(long = "type", default_value = "DLP.All")]
    content_type: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Fetch(args) => fetch(&cli, args).await,
        Command::ListContent(args) => list_content(&cli, args).await,
        Command::ListSubs => list_subs(&cli).await,
        Command::StartSub(args) => start_sub(&cli, args).await,
    }
}

async fn fetch(cli: &Cli, args: &FetchArgs) -> anyhow::Result<()> {
    let mut config = base_config(cli, &args.range.content_type);
    config.output = OutputConfig {
        out_dir: args.out.clone(),
        stdout: args.stdout,
    };
    config.pool.concurrency = args.concurrency;

    let fetcher = AuditFetcher::new(config, tokens(cli)?)?;
    let watcher = tokio::spawn(cancel_on_signal(fetcher.cancel_token()));

    let result = fetcher.fetch(&args.range.time_range()).await;
    watcher.abort();
    let summary = result?;

    // Keep stdout pure NDJSON when records are streamed there
    let line = serde_json::to_string(&summary_json(&summary))?;
    if args.stdout {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
    Ok(())
}

async fn list_content(cli: &Cli, args: &RangeArgs) -> anyhow::Result<()> {
    let config = base_config(cli, &args.content_type);
    let fetcher = AuditFetcher::new(config, tokens(cli)?)?;

    let (window, items) = fetcher.list_content(&args.time_range()).await?;
    let listing = json!({
        "contentType": args.content_type,
        "startTime": window.start_iso(),
        "endTime": window.end_iso(),
        "items": items,
    });
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

async fn list_subs(cli: &Cli) -> anyhow::Result<()> {
    let fetcher = AuditFetcher::new(base_config(cli, "DLP.All"), tokens(cli)?)?;
    let subs = fetcher.list_subscriptions().await?;
    println!("{}", serde_json::to_string_pretty(&subs)?);
    Ok(())
}

async fn start_sub(cli: &Cli, args: &StartSubArgs) -> anyhow::Result<()> {
    let fetcher = AuditFetcher::new(base_config(cli, &args.content_type), tokens(cli)?)?;
    let sub = fetcher.start_subscription(None).await?;
    println!("{}", serde_json::to_string_pretty(&sub)?);
    Ok(())
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn base_config(cli: &Cli, content_type: &str) -> Config {
    let mut config = Config::default();
    config.feed.tenant_id = cli.tenant_id.clone().unwrap_or_default();
    config.feed.base_url = cli.base_url.clone();
    config.feed.content_type = content_type.to_string();
    config
}

fn tokens(cli: &Cli) -> Result<Arc<dyn TokenProvider>, Error> {
    let token = cli.token.clone().ok_or_else(|| {
        Error::Auth("no access token: pass --token or set AUDITFEED_ACCESS_TOKEN".to_string())
    })?;
    Ok(Arc::new(StaticTokenProvider::new(token)))
}

fn summary_json(summary: &RunSummary) -> serde_json::Value {
    let mut out = json!({
        "blobs": summary.blobs_downloaded,
        "records": summary.records_written,
        "failed": summary.failed(),
    });
    if !summary.failures.is_empty() {
        out["failures"] = json!(summary.failures);
    }
    if summary.skipped > 0 {
        out["skipped"] = json!(summary.skipped);
    }
    out
}
