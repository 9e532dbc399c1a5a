#![cfg(not(tarpaulin_include))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use docshare::app::DocumentList;
use docshare::loader::{self, ParserRegistry, UploadedFile};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Parse .xlsx and .docx files locally and print the normalized records
#[derive(Parser, Debug)]
#[command(name = "preview", version)]
struct Cli {
    /// Files to parse
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docshare=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match tokio::fs::read(path).await {
            Ok(bytes) => files.push(UploadedFile::new(name, bytes)),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot read file"),
        }
    }

    let documents = match loader::parse_batch(Arc::new(ParserRegistry::default()), files).await {
        Ok(documents) => documents,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let output = DocumentList { documents };
    let json = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", json);

    Ok(ExitCode::SUCCESS)
}
