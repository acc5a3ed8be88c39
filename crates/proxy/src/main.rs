//! yaml-schema-router
//!
//! A transparent proxy between an LSP client and yaml-language-server that
//! makes the server schema-aware for Kubernetes resources and CRDs. The
//! router inspects every opened/edited document, resolves its
//! `apiVersion`/`kind` to JSON schemas, caches them on disk, and injects the
//! mapping into the server's configuration at the right moment of the
//! handshake. No inline annotations, no per-project settings.
//!
//! ## Usage
//!
//! Point your editor at `yaml-schema-router` instead of
//! `yaml-language-server`:
//!
//! ```toml
//! [language-server.yaml-language-server]
//! command = "yaml-schema-router"
//! ```

mod engine;
mod framing;
mod proxy;

use anyhow::{Context, Result};
use clap::Parser;
use engine::{FeatureDefaults, RouterEngine};
use proxy::Proxy;
use router_detector::{Chain, CrdDetector, CrdSchemaConfig, K8sDetector, K8sSchemaConfig};
use router_registry::Registry;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout for schema downloads. Downloads happen on the editor
/// relay path, so they must be bounded tightly.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(
    name = "yaml-schema-router",
    version,
    about = "Schema-aware proxy in front of yaml-language-server"
)]
struct Args {
    /// Path to write logs to. Stdout carries LSP traffic and must stay
    /// clean; an empty value sends logs to stderr instead.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Path to the yaml-language-server executable.
    #[arg(long, default_value = "yaml-language-server")]
    lsp_path: String,

    /// Accepted and ignored; LSP clients append it unconditionally.
    #[arg(long = "stdio")]
    _stdio: bool,
}

fn default_log_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home
            .join(".config")
            .join(router_registry::APP_DIR_NAME)
            .join("router.log"),
        None => std::env::temp_dir().join("yaml-schema-router.log"),
    }
}

fn init_logging(log_file: &Path) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if log_file.as_os_str().is_empty() {
        builder.target(env_logger::Target::Stderr);
    } else {
        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("failed to open log file {}", log_file.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

async fn run(args: Args) -> Result<i32> {
    log::info!(
        "starting yaml-schema-router, using LSP executable: {}",
        args.lsp_path
    );

    let registry = Arc::new(
        Registry::open_user_cache(DOWNLOAD_TIMEOUT)
            .context("failed to initialize schema registry")?,
    );

    let k8s_config = K8sSchemaConfig::default();
    let chain = Chain::new(vec![
        Box::new(K8sDetector::new(Arc::clone(&registry), k8s_config.clone())),
        Box::new(CrdDetector::new(
            Arc::clone(&registry),
            CrdSchemaConfig::default(),
            k8s_config,
        )),
    ]);

    let engine = Arc::new(RouterEngine::new(
        registry,
        chain,
        FeatureDefaults::default(),
    ));

    let code = Proxy::new(args.lsp_path, engine).run().await?;
    log::info!("proxy shut down cleanly");
    Ok(code)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_file = args.log_file.clone().unwrap_or_else(default_log_path);
    if let Err(err) = init_logging(&log_file) {
        eprintln!("yaml-schema-router: {err:#}");
        std::process::exit(1);
    }

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            log::error!("fatal error: {err:#}");
            std::process::exit(1);
        }
    }
}
