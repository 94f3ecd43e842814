//! PDF Sandbox CLI
//!
//! Opens a PDF in a sandbox session and prints document info or its layer
//! configuration as JSON.

use anyhow::{bail, Context};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_sandbox::config::Config;
use pdf_sandbox::document::Metadata;
use pdf_sandbox::Session;

const USAGE: &str = "usage: pdf-sandbox <info|layers> <file.pdf>";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Info {
    page_count: usize,
    encrypted: bool,
    metadata: Metadata,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "pdf_sandbox=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let mut args = std::env::args().skip(1);
    let (Some(command), Some(file)) = (args.next(), args.next()) else {
        bail!(USAGE);
    };

    let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {file}"))?;
    let session = Session::start(config.session)?;
    let doc = session
        .open_document_from_bytes(bytes)
        .await
        .with_context(|| format!("Failed to open {file}"))?;

    let output = match command.as_str() {
        "info" => serde_json::to_string_pretty(&Info {
            page_count: doc.page_count().await?,
            encrypted: doc.is_encrypted().await?,
            metadata: doc.metadata().await?,
        })?,
        "layers" => serde_json::to_string_pretty(&doc.layers().config().await?)?,
        other => {
            doc.close().await;
            bail!("unknown command '{other}'\n{USAGE}");
        }
    };
    println!("{output}");

    doc.close().await;
    session.shutdown().await;
    Ok(())
}
