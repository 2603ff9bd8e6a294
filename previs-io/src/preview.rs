//! # Preview Server
//!
//! Owns the dev server that renders the component under edit, and answers
//! one question for the agents: "is the latest build being served yet?".
//! Bundling itself is the dev server's business.

use crate::error::{self, Error, ErrorKind, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::Instant;

pub const DEFAULT_PORT: u16 = 3434;

const PORT_PLACEHOLDER: &str = "{port}";

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub port: u16,
    /// argv of the dev server; `{port}` is substituted
    pub command: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            command: ["npx", "vite", "--port", PORT_PLACEHOLDER, "--strictPort"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cwd: None,
            poll_interval: Duration::from_millis(150),
            max_wait: Duration::from_secs(60),
        }
    }
}

impl PreviewConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Parse a whitespace separated command line, e.g. from an env var
    pub fn with_command_line(mut self, line: &str) -> Self {
        self.command = line.split_whitespace().map(String::from).collect();
        self
    }

    pub fn url(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    fn resolved_command(&self) -> Vec<String> {
        let port = self.port.to_string();
        self.command
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port))
            .collect()
    }
}

pub struct PreviewServer {
    config: PreviewConfig,
    child: Option<Child>,
    client: reqwest::Client,
}

impl PreviewServer {
    /// Spawn the dev server. It is killed when the server is dropped.
    pub fn start(config: PreviewConfig) -> Result<Self> {
        let argv = config.resolved_command();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::config_invalid("PREVIS_DEV_SERVER", "preview command is empty"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .kill_on_drop(true)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped());
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| error::spawn_failed(program.clone(), e).with_operation("preview::start"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_log(stderr));
        }

        tracing::info!(url = %config.url(), "preview server started");
        Ok(Self {
            config,
            child: Some(child),
            client: reqwest::Client::new(),
        })
    }

    /// Use a server somebody else is already running
    pub fn attach(config: PreviewConfig) -> Self {
        Self {
            config,
            child: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Block until the preview answers HTTP 200
    pub async fn ensure_build(&mut self) -> Result<()> {
        let url = self.url();
        let started = Instant::now();

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait().map_err(Error::from)? {
                    let program = self.config.command.first().cloned().unwrap_or_default();
                    return Err(error::exited(program, status.code(), "preview server exited")
                        .with_operation("preview::ensure_build"));
                }
            }

            match self.client.get(&url).send().await {
                Ok(res) if res.status().is_success() => {
                    tracing::debug!(%url, elapsed_ms = started.elapsed().as_millis() as u64, "preview ready");
                    return Ok(());
                }
                Ok(res) => tracing::trace!(status = res.status().as_u16(), "preview not ready"),
                Err(e) => tracing::trace!(error = %e, "preview not reachable"),
            }

            if started.elapsed() >= self.config.max_wait {
                return Err(error::build_timeout(url, started.elapsed())
                    .with_operation("preview::ensure_build"));
            }
        }
    }

    /// Stop the dev server, if we own one
    pub async fn dispose(mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            match child.kill().await {
                Ok(()) => {}
                // already gone
                Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
                Err(e) => {
                    return Err(Error::new(ErrorKind::ProcessFailed, "failed to stop preview server")
                        .with_operation("preview::dispose")
                        .set_source(e))
                }
            }
            tracing::info!("preview server stopped");
        }
        Ok(())
    }
}

/// Forward dev server output to the debug log until the pipe closes.
/// An unread pipe would fill up and stall the server mid build.
async fn drain_log(stream: impl AsyncRead + Unpin) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                if !text.is_empty() {
                    tracing::debug!("{}", text);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "dev server log closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fast(port: u16) -> PreviewConfig {
        PreviewConfig {
            port,
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_millis(300),
            ..PreviewConfig::default()
        }
    }

    #[test]
    fn test_port_substitution() {
        let config = PreviewConfig::default()
            .with_port(4000)
            .with_command_line("npx vite --port {port}");
        assert_eq!(config.resolved_command(), vec!["npx", "vite", "--port", "4000"]);
        assert_eq!(config.url(), "http://localhost:4000/");
    }

    #[tokio::test]
    async fn test_ensure_build_waits_for_200() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                    .await;
            }
        });

        let mut server = PreviewServer::attach(fast(port));
        tokio_test::assert_ok!(server.ensure_build().await);
        server.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_build_times_out() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut server = PreviewServer::attach(fast(port));
        let err = server.ensure_build().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BuildTimeout);
    }

    #[tokio::test]
    async fn test_noisy_dev_server_is_not_blocked() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("logged");
        let config = PreviewConfig {
            command: vec![
                "sh".into(),
                "-c".into(),
                "head -c 200000 /dev/zero >&2; touch \"$0\"".into(),
                marker.display().to_string(),
            ],
            ..fast(1)
        };
        let server = PreviewServer::start(config).unwrap();

        let mut waited = Duration::ZERO;
        while !marker.exists() && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        assert!(marker.exists(), "dev server stalled writing its log");
        server.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_exited_child_fails_fast() {
        let config = PreviewConfig {
            command: vec!["sh".into(), "-c".into(), "exit 0".into()],
            max_wait: Duration::from_secs(30),
            ..fast(1)
        };
        let mut server = PreviewServer::start(config).unwrap();
        let err = server.ensure_build().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessFailed);
    }
}
