//! facegate - face verification for gate stations.

mod config;
mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_embed::{ExtractReply, HttpEmbedder, ImageSource};
use facegate_faceid::{
    CatalogEntry, FaceIdError, Gate, IdentityStore, MemoryStore, RedbStore, VerifyRequest,
    VerifyResponse,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::Config;

/// facegate - match gate camera faces against a registered catalog.
///
/// Embeddings are extracted by a remote model service and kept per model
/// family in named slots of a local identity store.
///
/// Configuration is read from ~/.facegate/config.yaml.
#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face verification for gate stations")]
#[command(version)]
struct Cli {
    /// Config file (default is ~/.facegate/config.yaml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill missing embeddings from registered images
    Sync {
        /// Embedding slot to fill
        #[arg(long)]
        slot: Option<String>,
        /// Concurrent extractions
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Verify a face image (path or URL) against the catalog
    Verify {
        image: String,
        /// Catalog snapshot (export file) instead of the store
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Distance allowance; the similarity cutoff is 1 - threshold
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Extract an embedding from an image (path or URL)
    Extract { image: String },
    /// Compare the faces in two images
    Compare {
        a: String,
        b: String,
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Export populated identities as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Register identities from a JSON export file
    Import { file: PathBuf },
    /// Start the HTTP service
    Serve {
        /// Listen address (e.g. :8080)
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (mut cfg, base_dir) = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync { slot, concurrency } => {
            if let Some(slot) = slot {
                cfg.matching.slot = slot;
            }
            if let Some(n) = concurrency {
                cfg.sync.concurrency = n;
            }
            let gate = build_gate(&cfg, open_store(&cfg, &base_dir)?)?;
            let report = gate.sync().await?;
            print_json(&report)
        }
        Commands::Verify {
            image,
            catalog,
            threshold,
        } => {
            let store: Arc<dyn IdentityStore> = match &catalog {
                Some(_) => Arc::new(MemoryStore::new()),
                None => open_store(&cfg, &base_dir)?,
            };
            let gate = build_gate(&cfg, store)?;

            let mut req = match image_source(&image)? {
                ImageSource::Url(url) => VerifyRequest::with_image_url(url),
                ImageSource::Bytes(b) => VerifyRequest::with_image(b),
            };
            req.threshold = threshold;
            if let Some(path) = catalog {
                req.catalog = Some(load_catalog(&path)?);
            }

            let resp = match gate.verify(req).await {
                Ok(outcome) => VerifyResponse::from(outcome),
                Err(FaceIdError::InvalidInput(msg)) => VerifyResponse::input_error(msg),
                Err(e) => return Err(e.into()),
            };
            print_json(&resp)?;
            if !resp.verified {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Extract { image } => {
            let gate = build_gate(&cfg, Arc::new(MemoryStore::new()))?;
            let reply = ExtractReply::from_result(gate.extract(&image_source(&image)?).await);
            print_json(&reply)?;
            if reply.error.is_some() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Compare { a, b, threshold } => {
            let gate = build_gate(&cfg, Arc::new(MemoryStore::new()))?;
            let verdict = gate
                .compare(&image_source(&a)?, &image_source(&b)?, threshold)
                .await?;
            print_json(&verdict)
        }
        Commands::Export { output } => {
            let gate = build_gate(&cfg, open_store(&cfg, &base_dir)?)?;
            let records = gate.export()?;
            match output {
                Some(path) => {
                    facegate_faceid::save_json(&records, &path)?;
                    eprintln!("Exported {} identities to {}", records.len(), path.display());
                    Ok(())
                }
                None => print_json(&records),
            }
        }
        Commands::Import { file } => {
            let gate = build_gate(&cfg, open_store(&cfg, &base_dir)?)?;
            let records = facegate_faceid::load_json(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let summary = gate.import(&records)?;
            print_json(&summary)
        }
        Commands::Serve { addr } => {
            let gate = build_gate(&cfg, open_store(&cfg, &base_dir)?)?;
            let addr = addr.unwrap_or_else(|| cfg.server.addr.clone());
            server::serve(&addr, Arc::new(gate)).await
        }
    }
}

fn build_gate(cfg: &Config, store: Arc<dyn IdentityStore>) -> Result<Gate> {
    let embedder = HttpEmbedder::with_config(cfg.embed_config())?;
    tracing::debug!(
        base_url = embedder.base_url(),
        model = %cfg.embedder.model,
        slot = %cfg.slot(),
        "facegate: gate configured"
    );
    Ok(Gate::new(Arc::new(embedder), store, cfg.gate_config()))
}

fn open_store(cfg: &Config, base_dir: &Path) -> Result<Arc<dyn IdentityStore>> {
    let path = config::store_path(cfg, base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store =
        RedbStore::open(&path).with_context(|| format!("open store {}", path.display()))?;
    Ok(Arc::new(store))
}

/// `http(s)://` arguments are passed to the model service as locators;
/// anything else is read as a local image file.
fn image_source(arg: &str) -> Result<ImageSource> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(ImageSource::url(arg));
    }
    let data = std::fs::read(arg).with_context(|| format!("read image {arg}"))?;
    Ok(ImageSource::bytes(data))
}

/// Loads an export file as a catalog snapshot; records without an embedding
/// are not part of it.
fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>> {
    let records = facegate_faceid::load_json(path)
        .with_context(|| format!("read catalog {}", path.display()))?;
    Ok(records
        .into_iter()
        .filter(|r| !r.embedding.is_empty())
        .map(|r| CatalogEntry::new(r.identity_key, r.name, r.embedding))
        .collect())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_faceid::{ExportRecord, save_json};

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "facegate", "-v", "verify", "https://img/x.jpg", "--threshold", "0.4",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Verify {
                image, threshold, ..
            } => {
                assert_eq!(image, "https://img/x.jpg");
                assert_eq!(threshold, Some(0.4));
            }
            _ => panic!("expected verify"),
        }

        let cli = Cli::try_parse_from(["facegate", "sync", "--slot", "facenet"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync { slot: Some(ref s), .. } if s == "facenet"));
    }

    #[test]
    fn image_source_splits_urls_and_files() {
        assert!(matches!(
            image_source("https://img/x.jpg").unwrap(),
            ImageSource::Url(_)
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.jpg");
        std::fs::write(&path, b"\xff\xd8").unwrap();
        match image_source(path.to_str().unwrap()).unwrap() {
            ImageSource::Bytes(b) => assert_eq!(&b[..], b"\xff\xd8"),
            other => panic!("expected bytes, got {other:?}"),
        }

        assert!(image_source(dir.path().join("missing.jpg").to_str().unwrap()).is_err());
    }

    #[test]
    fn catalog_file_skips_unpopulated_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        save_json(
            &[
                ExportRecord {
                    identity_key: "A".into(),
                    name: "Asha".into(),
                    image_locator: None,
                    embedding: vec![1.0, 0.0],
                },
                ExportRecord {
                    identity_key: "B".into(),
                    name: "Bilal".into(),
                    image_locator: Some("https://img/b.jpg".into()),
                    embedding: vec![],
                },
            ],
            &path,
        )
        .unwrap();

        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].identity_key, "A");
    }
}
