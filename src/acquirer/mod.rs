//! Acquirer - one image per call from a local device or remote endpoint
//!
//! ## Responsibilities
//!
//! - Local capture through an external program writing JPEG to stdout
//! - Remote snapshot fetch over HTTP
//! - Bounding every attempt with a timeout that kills the process or
//!   aborts the transfer

mod types;

pub use types::*;

use crate::error::{Error, Result};
use crate::source_config::{SourceConfig, SourceMode};
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};

/// Default local capture program
pub const DEFAULT_CAPTURE_PROGRAM: &str = "rpicam-jpeg";

/// Fixed bound for local capture, independent of source options
pub const LOCAL_CAPTURE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Lower bound for remote fetch; raised to the source's offline timeout
pub const MIN_REMOTE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Largest accepted capture output
pub const MAX_CAPTURE_BYTES: usize = 5 * 1024 * 1024;

/// Stderr kept for failure messages
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// Strategy that turns a source configuration into one frame.
///
/// Implementations must bound their own waits; the scheduler never
/// applies an outer timeout.
pub trait Acquire: Send + Sync + 'static {
    fn acquire(
        &self,
        config: &SourceConfig,
    ) -> impl Future<Output = std::result::Result<Frame, AcquireError>> + Send;
}

/// Acquisition bound for a source
pub fn timeout_for(config: &SourceConfig) -> Duration {
    match config.mode {
        SourceMode::Local => LOCAL_CAPTURE_TIMEOUT,
        _ => config.offline_timeout.max(MIN_REMOTE_TIMEOUT),
    }
}

/// Arguments for a headless single-frame capture to stdout
pub fn capture_args(config: &SourceConfig) -> Vec<String> {
    vec![
        "--nopreview".to_string(),
        "-o".to_string(),
        "-".to_string(),
        "-t".to_string(),
        "1".to_string(),
        "--width".to_string(),
        config.width.to_string(),
        "--height".to_string(),
        config.height.to_string(),
    ]
}

/// Keep the head of stderr for error messages, discard the rest
async fn read_stderr(mut stderr: ChildStderr) -> Vec<u8> {
    let mut head = Vec::new();
    if (&mut stderr)
        .take(MAX_STDERR_BYTES)
        .read_to_end(&mut head)
        .await
        .is_ok()
    {
        let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
    }
    head
}

/// Production acquirer
pub struct SnapshotAcquirer {
    /// HTTP client for snapshot URLs
    client: reqwest::Client,
    /// Local capture executable
    capture_program: String,
}

impl SnapshotAcquirer {
    /// Create new SnapshotAcquirer
    pub fn new(capture_program: impl Into<String>) -> Result<Self> {
        // Cameras live on the local network
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            capture_program: capture_program.into(),
        })
    }

    pub fn capture_program(&self) -> &str {
        &self.capture_program
    }

    /// Capture a frame with the local capture program
    ///
    /// The child is spawned with kill_on_drop, so when the timeout fires,
    /// the output overflows, or the surrounding task is aborted, dropping
    /// it kills the process. Stdout is never buffered past
    /// `MAX_CAPTURE_BYTES + 1`.
    async fn capture_local(
        &self,
        config: &SourceConfig,
        bound: Duration,
    ) -> std::result::Result<Frame, AcquireError> {
        let mut child = Command::new(&self.capture_program)
            .args(capture_args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AcquireError::TransportError(format!(
                    "{} spawn failed: {}",
                    self.capture_program, e
                ))
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(AcquireError::TransportError(format!(
                "{} stdio not captured",
                self.capture_program
            )));
        };

        // Drained concurrently so a chatty stderr cannot stall stdout
        let stderr_task = tokio::spawn(read_stderr(stderr));

        let run = async {
            let mut data = Vec::new();
            stdout
                .take(MAX_CAPTURE_BYTES as u64 + 1)
                .read_to_end(&mut data)
                .await
                .map_err(|e| {
                    AcquireError::TransportError(format!(
                        "{} read failed: {}",
                        self.capture_program, e
                    ))
                })?;

            if data.len() > MAX_CAPTURE_BYTES {
                return Err(AcquireError::FrameTooLarge {
                    limit: MAX_CAPTURE_BYTES,
                });
            }

            let status = child.wait().await.map_err(|e| {
                AcquireError::TransportError(format!(
                    "{} execution failed: {}",
                    self.capture_program, e
                ))
            })?;

            Ok::<_, AcquireError>((status, data))
        };

        let (status, data) = match tokio::time::timeout(bound, run).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    program = %self.capture_program,
                    timeout_ms = bound.as_millis() as u64,
                    "Capture timeout, process killed via kill_on_drop"
                );
                return Err(AcquireError::Timeout(bound));
            }
        };

        if !status.success() {
            let stderr = stderr_task.await.unwrap_or_default();
            return Err(AcquireError::CaptureFailed {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        if data.is_empty() {
            return Err(AcquireError::EmptyCapture);
        }

        Ok(Frame::new(data, "image/jpeg"))
    }

    /// Fetch a frame from a snapshot URL
    ///
    /// Dropping the request future on timeout aborts the transfer.
    async fn fetch_remote(
        &self,
        url: &str,
        bound: Duration,
    ) -> std::result::Result<Frame, AcquireError> {
        let request = async {
            let resp = self
                .client
                .get(url)
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(AcquireError::HttpError {
                    code: status.as_u16(),
                });
            }

            let content_type = normalize_content_type(
                resp.headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok()),
            );

            let bytes = resp.bytes().await?;
            if bytes.is_empty() {
                return Err(AcquireError::EmptyCapture);
            }

            Ok::<_, AcquireError>(Frame::new(bytes.to_vec(), content_type))
        };

        match tokio::time::timeout(bound, request).await {
            Ok(result) => result,
            Err(_) => Err(AcquireError::Timeout(bound)),
        }
    }
}

impl Acquire for SnapshotAcquirer {
    async fn acquire(&self, config: &SourceConfig) -> std::result::Result<Frame, AcquireError> {
        let bound = timeout_for(config);

        match config.mode {
            SourceMode::Local => self.capture_local(config, bound).await,
            SourceMode::Snapshot => {
                let url = config.url.as_deref().ok_or_else(|| {
                    AcquireError::ConfigError("No URL configured for snapshot mode".to_string())
                })?;
                self.fetch_remote(url, bound).await
            }
            SourceMode::Stream => Err(AcquireError::ConfigError(
                "Stream sources are not polled".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local(width: u32, height: u32) -> SourceConfig {
        SourceConfig {
            width,
            height,
            ..Default::default()
        }
    }

    fn snapshot(url: &str) -> SourceConfig {
        SourceConfig {
            mode: SourceMode::Snapshot,
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    /// Serve one canned HTTP response on a random port
    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/snapshot.jpg", addr)
    }

    /// Accept one connection, read the request, never answer
    async fn serve_stalled() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(socket);
        });
        format!("http://{}/snapshot.jpg", addr)
    }

    #[cfg(unix)]
    fn write_script(name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!(
            "picam-poller-{}-{}.sh",
            name,
            std::process::id()
        ));
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_capture_args_sized() {
        let args = capture_args(&local(800, 600));
        assert_eq!(
            args,
            vec!["--nopreview", "-o", "-", "-t", "1", "--width", "800", "--height", "600"]
        );
    }

    #[test]
    fn test_local_timeout_is_fixed() {
        let config = SourceConfig {
            refresh_interval: Duration::from_millis(60_000),
            offline_timeout: Duration::from_millis(30_000),
            ..local(800, 600)
        };
        assert_eq!(timeout_for(&config), Duration::from_millis(2000));
    }

    #[test]
    fn test_remote_timeout_floor() {
        let mut config = snapshot("http://cam/snap.jpg");
        config.offline_timeout = Duration::from_millis(8000);
        assert_eq!(timeout_for(&config), Duration::from_millis(8000));

        config.offline_timeout = Duration::ZERO;
        assert_eq!(timeout_for(&config), Duration::from_millis(5000));
    }

    #[test]
    fn test_normalize_content_type() {
        assert_eq!(normalize_content_type(Some("image/png; q=1")), "image/png");
        assert_eq!(normalize_content_type(Some("")), DEFAULT_CONTENT_TYPE);
        assert_eq!(normalize_content_type(None), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_data_uri() {
        let frame = Frame::new(b"abc".to_vec(), "image/jpeg");
        assert_eq!(frame.to_data_uri(), "data:image/jpeg;base64,YWJj");
    }

    #[tokio::test]
    async fn test_snapshot_without_url_is_config_error() {
        let acquirer = SnapshotAcquirer::new(DEFAULT_CAPTURE_PROGRAM).unwrap();
        let config = SourceConfig {
            mode: SourceMode::Snapshot,
            url: None,
            ..Default::default()
        };
        let err = acquirer.acquire(&config).await.unwrap_err();
        assert!(matches!(err, AcquireError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_transport_error() {
        let acquirer = SnapshotAcquirer::new("/nonexistent/picam-capture").unwrap();
        let err = acquirer.acquire(&local(640, 480)).await.unwrap_err();
        assert!(matches!(err, AcquireError::TransportError(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_capture_reads_stdout() {
        let program = write_script("ok", "printf 'JPEGDATA'");
        let acquirer = SnapshotAcquirer::new(program).unwrap();
        let frame = acquirer.acquire(&local(640, 480)).await.unwrap();
        assert_eq!(frame.data, b"JPEGDATA");
        assert_eq!(frame.content_type, "image/jpeg");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_capture_empty_output() {
        let program = write_script("empty", "exit 0");
        let acquirer = SnapshotAcquirer::new(program).unwrap();
        let err = acquirer.acquire(&local(640, 480)).await.unwrap_err();
        assert!(matches!(err, AcquireError::EmptyCapture));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_capture_nonzero_exit() {
        let program = write_script("fail", "echo 'no camera' >&2; exit 3");
        let acquirer = SnapshotAcquirer::new(program).unwrap();
        match acquirer.acquire(&local(640, 480)).await.unwrap_err() {
            AcquireError::CaptureFailed { stderr, .. } => assert_eq!(stderr, "no camera"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// True once the process is gone or only a zombie remains
    #[cfg(target_os = "linux")]
    fn process_dead(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_local_capture_hang_times_out_and_kills_child() {
        let pid_file = std::env::temp_dir().join(format!(
            "picam-poller-hang-{}.pid",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&pid_file);
        let program = write_script(
            "hang",
            &format!("echo $$ > {}\nexec sleep 30", pid_file.display()),
        );
        let acquirer = SnapshotAcquirer::new(program).unwrap();

        let started = std::time::Instant::now();
        let err = acquirer.acquire(&local(640, 480)).await.unwrap_err();
        assert!(matches!(err, AcquireError::Timeout(d) if d == LOCAL_CAPTURE_TIMEOUT));
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut dead = false;
        for _ in 0..40 {
            if process_dead(pid) {
                dead = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(dead, "capture process {} still running", pid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_capture_at_limit_is_accepted() {
        let program = write_script("at-limit", &format!("head -c {} /dev/zero", MAX_CAPTURE_BYTES));
        let acquirer = SnapshotAcquirer::new(program).unwrap();
        let frame = acquirer.acquire(&local(640, 480)).await.unwrap();
        assert_eq!(frame.data.len(), MAX_CAPTURE_BYTES);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_capture_over_limit_is_too_large() {
        let program = write_script(
            "over-limit",
            &format!("head -c {} /dev/zero", MAX_CAPTURE_BYTES + 1),
        );
        let acquirer = SnapshotAcquirer::new(program).unwrap();
        let err = acquirer.acquire(&local(640, 480)).await.unwrap_err();
        assert!(matches!(
            err,
            AcquireError::FrameTooLarge { limit } if limit == MAX_CAPTURE_BYTES
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_capture_runaway_output_stops_at_limit() {
        let program = write_script("runaway", "exec cat /dev/zero");
        let acquirer = SnapshotAcquirer::new(program).unwrap();
        let err = acquirer.acquire(&local(640, 480)).await.unwrap_err();
        // Fails on the size cap, not by running into the timeout
        assert!(matches!(err, AcquireError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_remote_fetch_strips_content_type_params() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: image/png; charset=binary\r\nContent-Length: 3\r\nConnection: close\r\n\r\nabc",
        )
        .await;
        let acquirer = SnapshotAcquirer::new(DEFAULT_CAPTURE_PROGRAM).unwrap();
        let frame = acquirer.acquire(&snapshot(&url)).await.unwrap();
        assert_eq!(frame.data, b"abc");
        assert_eq!(frame.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_remote_fetch_non_2xx() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let acquirer = SnapshotAcquirer::new(DEFAULT_CAPTURE_PROGRAM).unwrap();
        let err = acquirer.acquire(&snapshot(&url)).await.unwrap_err();
        assert!(matches!(err, AcquireError::HttpError { code: 404 }));
    }

    #[tokio::test]
    async fn test_remote_fetch_empty_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let acquirer = SnapshotAcquirer::new(DEFAULT_CAPTURE_PROGRAM).unwrap();
        let err = acquirer.acquire(&snapshot(&url)).await.unwrap_err();
        assert!(matches!(err, AcquireError::EmptyCapture));
    }

    #[tokio::test]
    async fn test_remote_fetch_stall_times_out() {
        let acquirer = SnapshotAcquirer::new(DEFAULT_CAPTURE_PROGRAM).unwrap();

        let mut floor = snapshot(&serve_stalled().await);
        floor.offline_timeout = Duration::ZERO;
        let mut raised = snapshot(&serve_stalled().await);
        raised.offline_timeout = Duration::from_millis(6000);

        let started = std::time::Instant::now();
        let timed = |config: SourceConfig| {
            let acquirer = &acquirer;
            async move {
                let err = acquirer.acquire(&config).await.unwrap_err();
                (err, started.elapsed())
            }
        };
        let ((floor_err, floor_elapsed), (raised_err, raised_elapsed)) =
            tokio::join!(timed(floor), timed(raised));

        assert!(matches!(floor_err, AcquireError::Timeout(d) if d == MIN_REMOTE_TIMEOUT));
        assert!(floor_elapsed >= MIN_REMOTE_TIMEOUT);
        assert!(
            matches!(raised_err, AcquireError::Timeout(d) if d == Duration::from_millis(6000))
        );
        assert!(raised_elapsed >= Duration::from_millis(6000));
        assert!(raised_elapsed < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_remote_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let acquirer = SnapshotAcquirer::new(DEFAULT_CAPTURE_PROGRAM).unwrap();
        let err = acquirer
            .acquire(&snapshot(&format!("http://{}/snap.jpg", addr)))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::TransportError(_)));
    }
}
