// src/main.rs
//! Net Sniffer
//!
//! Issues requests through an intercepted session and prints the resulting
//! request log.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use http::Method;
use net_sniffer::observability::{init_metrics, init_tracing};
use net_sniffer::{
    ExportFormat, Exporter, LogStore, ReqwestTransport, Session, SessionConfiguration,
    SnifferConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "net-sniffer", version, about = "Log outbound HTTP(S) requests")]
struct Cli {
    /// URLs to request
    urls: Vec<String>,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Export format: json, har or yaml
    #[arg(short, long)]
    format: Option<ExportFormat>,

    /// Write the log here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    metrics: bool,

    /// Log level, overrides the configuration
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SnifferConfig::load_from(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;
    let metrics = if cli.metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    info!("Starting net-sniffer v{}", net_sniffer::VERSION);

    LogStore::configure_shared(config.store.max_entries);
    net_sniffer::start();

    let transport = Arc::new(ReqwestTransport::new(&config.transport)?);
    let session = Session::new(SessionConfiguration::default_config().with_transport(transport));

    let method: Method = cli
        .method
        .parse()
        .with_context(|| format!("Invalid method {:?}", cli.method))?;

    if cli.urls.is_empty() {
        warn!("No URLs given, exporting an empty log");
    }

    let mut requests = Vec::with_capacity(cli.urls.len());
    for url in &cli.urls {
        let request = http::Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .body(Bytes::new())
            .with_context(|| format!("Invalid request URL {:?}", url))?;
        requests.push(request);
    }

    let fetches = requests.into_iter().map(|request| {
        let session = session.clone();
        async move { session.fetch(request).await }
    });
    let results = futures::future::join_all(fetches).await;

    for (url, result) in cli.urls.iter().zip(results) {
        match result {
            Ok(response) => info!(
                url = %url,
                status = response.status().as_u16(),
                bytes = response.body().len(),
                "Request finished"
            ),
            Err(e) => warn!(url = %url, "Request failed: {}", e),
        }
    }

    let format = cli.format.unwrap_or(config.export.format);
    let exporter = Exporter::new(format);
    let entries = LogStore::shared().snapshot();

    match cli.output.or(config.export.path) {
        Some(path) => exporter.export_to_file(&entries, &path)?,
        None => println!("{}", exporter.export(&entries)?),
    }

    if let Some(handle) = metrics {
        eprintln!("{}", handle.render());
    }

    Ok(())
}
