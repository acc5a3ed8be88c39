//! Proxy supervisor: child process lifecycle and the two relay loops.

use crate::engine::{RouterEngine, NUDGE_PAYLOAD};
use crate::framing::{read_frame, write_frame, FrameError};
use anyhow::{Context, Result};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::Command;

/// Runs the language server as a child and relays framed traffic in both
/// directions through the interception engine.
pub struct Proxy {
    lsp_path: String,
    engine: Arc<RouterEngine>,
}

impl Proxy {
    pub fn new(lsp_path: String, engine: Arc<RouterEngine>) -> Self {
        Self { lsp_path, engine }
    }

    /// Runs until the server exits or a shutdown signal arrives. Returns the
    /// child's exit code when it terminated on its own, `0` after a
    /// signal-initiated shutdown.
    pub async fn run(&self) -> Result<i32> {
        let mut child = Command::new(&self.lsp_path)
            .arg("--stdio")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start language server ({})", self.lsp_path))?;

        let server_in = child
            .stdin
            .take()
            .context("server stdin pipe unavailable")?;
        let server_out = child
            .stdout
            .take()
            .context("server stdout pipe unavailable")?;

        log::info!(
            "language server started (pid: {})",
            child.id().map_or_else(|| "?".to_string(), |pid| pid.to_string())
        );

        let engine = Arc::clone(&self.engine);
        let editor_loop = tokio::spawn(async move {
            // Returning drops `server_in`, closing the server's stdin.
            editor_to_server(engine, tokio::io::stdin(), server_in).await;
        });

        let engine = Arc::clone(&self.engine);
        let server_loop = tokio::spawn(async move {
            server_to_editor(engine, server_out, tokio::io::stdout()).await;
        });

        let status = tokio::select! {
            status = child.wait() => {
                status.context("failed to wait on language server")?
            }
            _ = shutdown_signal() => {
                log::info!("shutdown signal received, terminating language server");
                child
                    .start_kill()
                    .context("failed to terminate language server")?;
                let _ = child.wait().await;
                editor_loop.abort();
                server_loop.abort();
                return Ok(0);
            }
        };

        // The child is gone; its stdout is at EOF, so the server loop drains
        // whatever is buffered and returns on its own.
        let _ = server_loop.await;
        editor_loop.abort();

        log::info!("language server exited: {status}");
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(err) => {
            // Fall back to SIGINT only.
            log::warn!("failed to install SIGTERM handler: {err}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Relays editor frames into the server pipe, emitting a configuration-pull
/// nudge whenever a document handler changed the schema mapping. The nudge
/// is written from this task, so it serializes with forwarded frames.
async fn editor_to_server<R, W>(engine: Arc<RouterEngine>, editor_in: R, server_in: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(editor_in);
    let mut writer = server_in;

    loop {
        let payload = match read_frame(&mut reader).await {
            Ok(payload) => payload,
            Err(FrameError::Eof) => return,
            Err(err) => {
                log::error!("[editor] framing error: {err}");
                return;
            }
        };

        let action = engine.handle_editor_frame(&payload).await;

        if action.nudge {
            log::info!("[editor] triggering configuration pull");
            if let Err(err) = write_frame(&mut writer, NUDGE_PAYLOAD).await {
                log::error!("[editor] failed to write to server: {err}");
                return;
            }
        }

        let outbound = action.rewritten.as_deref().unwrap_or(&payload);
        if let Err(err) = write_frame(&mut writer, outbound).await {
            log::error!("[editor] failed to write to server: {err}");
            return;
        }
    }
}

/// Relays server frames to the editor, coercing the advertised sync
/// capability on the way through.
async fn server_to_editor<R, W>(engine: Arc<RouterEngine>, server_out: R, editor_out: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(server_out);
    let mut writer = editor_out;

    loop {
        let payload = match read_frame(&mut reader).await {
            Ok(payload) => payload,
            Err(FrameError::Eof) => return,
            Err(err) => {
                log::error!("[server] framing error: {err}");
                return;
            }
        };

        let rewritten = engine.handle_server_frame(&payload);
        let outbound = rewritten.as_deref().unwrap_or(&payload);
        if let Err(err) = write_frame(&mut writer, outbound).await {
            log::error!("[server] failed to write to editor: {err}");
            return;
        }
    }
}
