use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, broadcast};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

use super::types::{
    DAEMON_BINARY, DaemonConfig, DaemonManagerEvent, DaemonState, HEALTH_POLL_INTERVAL,
    PING_TIMEOUT,
};
use crate::lib::error::{ArcboxError, Result};

/// Looks for the daemon binary: explicit override, app bundle, next to the
/// running executable, then `PATH`.
pub fn find_daemon_binary(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!("Configured daemon binary {} does not exist", path.display());
        return None;
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    #[cfg(target_os = "macos")]
    {
        // <App>.app/Contents/MacOS/<exe>
        let bundle = exe_dir
            .as_deref()
            .and_then(Path::parent)
            .and_then(Path::parent);
        if let Some(bundle) = bundle {
            let candidate = bundle.join("Contents").join("MacOS").join(DAEMON_BINARY);
            if candidate.is_file() {
                info!("Found daemon in bundle: {}", candidate.display());
                return Some(candidate);
            }
        }
    }

    if let Some(dir) = exe_dir {
        let candidate = dir.join(DAEMON_BINARY);
        if candidate.is_file() {
            info!("Found daemon alongside executable: {}", candidate.display());
            return Some(candidate);
        }
    }

    match which::which(DAEMON_BINARY) {
        Ok(path) => {
            info!("Found daemon in PATH: {}", path.display());
            Some(path)
        }
        Err(_) => {
            warn!("Daemon binary not found");
            None
        }
    }
}

/// Health probe: `GET /_ping` on the Docker API socket.
pub async fn ping_daemon(socket: &Path) -> bool {
    let probe = async {
        let mut stream = UnixStream::connect(socket).await?;
        stream
            .write_all(b"GET /_ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await?;
        let mut status_line = String::new();
        BufReader::new(stream).read_line(&mut status_line).await?;
        Ok::<_, std::io::Error>(status_line)
    };

    match timeout(PING_TIMEOUT, probe).await {
        Ok(Ok(status_line)) => is_ok_status(&status_line),
        Ok(Err(e)) => {
            debug!("Ping {} failed: {}", socket.display(), e);
            false
        }
        Err(_) => {
            debug!("Ping {} timed out", socket.display());
            false
        }
    }
}

fn is_ok_status(status_line: &str) -> bool {
    let mut parts = status_line.split_whitespace();
    matches!(
        (parts.next(), parts.next()),
        (Some(version), Some("200")) if version.starts_with("HTTP/")
    )
}

fn forward_output<R>(reader: R, stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if stderr {
                warn!("[daemon:err] {}", line);
            } else {
                debug!("[daemon] {}", line);
            }
        }
    });
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .map_err(|e| ArcboxError::Daemon(format!("failed to signal daemon: {}", e))),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> Result<()> {
    child.start_kill()?;
    Ok(())
}

/// Owns the daemon process for the lifetime of the desktop app.
pub struct DaemonManager {
    config: DaemonConfig,
    state: Mutex<DaemonState>,
    child: Mutex<Option<Child>>,
    events: broadcast::Sender<DaemonManagerEvent>,
}

impl DaemonManager {
    pub fn new(config: DaemonConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        DaemonManager {
            config,
            state: Mutex::new(DaemonState::Stopped),
            child: Mutex::new(None),
            events,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonManagerEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> DaemonState {
        self.state.lock().await.clone()
    }

    /// True when the daemon was started by this manager rather than attached to.
    pub async fn owns_process(&self) -> bool {
        self.child.lock().await.is_some()
    }

    async fn set_state(&self, state: DaemonState) {
        let mut current = self.state.lock().await;
        if *current == state {
            return;
        }
        info!("Daemon state: {:?} -> {:?}", *current, state);
        *current = state.clone();
        drop(current);
        let _ = self.events.send(DaemonManagerEvent::StateChanged(state));
    }

    async fn fail(&self, msg: String) -> Result<()> {
        error!("Daemon failed: {}", msg);
        self.set_state(DaemonState::Failed(msg.clone())).await;
        Err(ArcboxError::Daemon(msg))
    }

    pub async fn start(&self) -> Result<()> {
        {
            let state = self.state.lock().await;
            if matches!(*state, DaemonState::Starting | DaemonState::Running) {
                debug!("Daemon already {}", state.label());
                return Ok(());
            }
        }

        let Some(binary) = find_daemon_binary(self.config.binary.as_deref()) else {
            return self.fail("daemon binary not found".to_string()).await;
        };
        self.set_state(DaemonState::Starting).await;

        if let Err(e) = tokio::fs::create_dir_all(&self.config.data_dir).await {
            return self
                .fail(format!("failed to create data dir: {}", e))
                .await;
        }

        if ping_daemon(&self.config.socket).await {
            info!("Daemon already running at {}", self.config.socket.display());
            self.set_state(DaemonState::Running).await;
            return Ok(());
        }

        // stale socket from a previous run
        let _ = tokio::fs::remove_file(&self.config.socket).await;

        info!(
            "Starting daemon: {} daemon --socket {}",
            binary.display(),
            self.config.socket.display()
        );
        let spawned = Command::new(&binary)
            .arg("daemon")
            .arg("--socket")
            .arg(&self.config.socket)
            .arg("--data-dir")
            .arg(&self.config.data_dir)
            .arg("--foreground")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return self.fail(format!("failed to spawn daemon: {}", e)).await,
        };

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, false);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, true);
        }

        let started = Instant::now();
        loop {
            if ping_daemon(&self.config.socket).await {
                info!("Daemon is ready");
                *self.child.lock().await = Some(child);
                self.set_state(DaemonState::Running).await;
                return Ok(());
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    return self.fail(format!("daemon exited with {}", status)).await;
                }
                Ok(None) => {}
                Err(e) => {
                    return self
                        .fail(format!("failed to check daemon status: {}", e))
                        .await;
                }
            }

            if started.elapsed() > self.config.startup_timeout {
                let _ = child.kill().await;
                return self
                    .fail(format!(
                        "daemon did not become ready within {}s",
                        self.config.startup_timeout.as_secs_f32()
                    ))
                    .await;
            }

            sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    /// Stops a daemon this manager spawned. An attached daemon keeps running.
    pub async fn stop(&self) -> Result<()> {
        let child = self.child.lock().await.take();
        match child {
            Some(mut child) => {
                info!("Stopping daemon");
                terminate(&mut child)?;
                match timeout(self.config.stop_timeout, child.wait()).await {
                    Ok(Ok(status)) => debug!("Daemon exited with {}", status),
                    Ok(Err(e)) => warn!("Failed to wait for daemon: {}", e),
                    Err(_) => {
                        warn!("Daemon did not exit in time, killing it");
                        child.kill().await?;
                    }
                }
            }
            None => debug!("No owned daemon process to stop"),
        }
        self.set_state(DaemonState::Stopped).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    fn config(dir: &TempDir, binary: Option<PathBuf>) -> DaemonConfig {
        DaemonConfig {
            binary,
            socket: dir.path().join("docker.sock"),
            data_dir: dir.path().join("data"),
            startup_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(1),
        }
    }

    fn serve_ping(socket: &Path, status: &'static str) {
        let listener = UnixListener::bind(socket).unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 512];
                let _ = stream.read(&mut buf).await;
                let response = format!("HTTP/1.1 {}\r\nContent-Length: 2\r\n\r\nOK", status);
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
    }

    #[test]
    fn status_line_must_be_200() {
        assert!(is_ok_status("HTTP/1.1 200 OK\r\n"));
        assert!(!is_ok_status("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(!is_ok_status("OK"));
        assert!(!is_ok_status(""));
    }

    #[tokio::test]
    async fn ping_against_fake_daemon() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("docker.sock");
        assert!(!ping_daemon(&socket).await);

        serve_ping(&socket, "200 OK");
        assert!(ping_daemon(&socket).await);
    }

    #[tokio::test]
    async fn unhealthy_status_is_not_running() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("docker.sock");
        serve_ping(&socket, "503 Service Unavailable");
        assert!(!ping_daemon(&socket).await);
    }

    #[tokio::test]
    async fn missing_binary_fails() {
        let dir = TempDir::new().unwrap();
        let manager = DaemonManager::new(config(&dir, Some(dir.path().join("nope"))));
        let mut rx = manager.subscribe();

        assert!(manager.start().await.is_err());
        assert!(matches!(manager.state().await, DaemonState::Failed(_)));
        assert!(matches!(
            rx.try_recv(),
            Ok(DaemonManagerEvent::StateChanged(DaemonState::Failed(_)))
        ));
    }

    #[tokio::test]
    async fn attaches_to_running_daemon() {
        let dir = TempDir::new().unwrap();
        let manager = DaemonManager::new(config(&dir, Some(PathBuf::from("/bin/sh"))));
        serve_ping(&manager.config().socket, "200 OK");
        let mut rx = manager.subscribe();

        manager.start().await.unwrap();
        assert_eq!(manager.state().await, DaemonState::Running);
        assert!(!manager.owns_process().await);
        assert!(dir.path().join("data").is_dir());

        // a second start is a no-op
        manager.start().await.unwrap();
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                DaemonManagerEvent::StateChanged(DaemonState::Starting),
                DaemonManagerEvent::StateChanged(DaemonState::Running),
            ]
        );

        manager.stop().await.unwrap();
        assert_eq!(manager.state().await, DaemonState::Stopped);
        assert!(ping_daemon(&manager.config().socket).await);
    }

    #[tokio::test]
    async fn exiting_process_fails() {
        let dir = TempDir::new().unwrap();
        // `sh daemon ...` exits immediately: there is no script named `daemon`
        let manager = DaemonManager::new(config(&dir, Some(PathBuf::from("/bin/sh"))));

        let err = manager.start().await.unwrap_err();
        assert!(err.to_string().contains("exited"));
        assert!(!manager.owns_process().await);
    }

    #[tokio::test]
    async fn startup_timeout_kills_process() {
        use std::os::unix::fs::PermissionsExt;

        // a daemon that runs but never binds its socket
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("arcbox");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let mut cfg = config(&dir, Some(script));
        cfg.startup_timeout = Duration::from_millis(500);
        let manager = DaemonManager::new(cfg);

        let err = manager.start().await.unwrap_err();
        assert!(err.to_string().contains("did not become ready"));
        assert!(matches!(manager.state().await, DaemonState::Failed(_)));
    }

    #[tokio::test]
    async fn stop_without_process_is_stopped() {
        let dir = TempDir::new().unwrap();
        let manager = DaemonManager::new(config(&dir, None));
        manager.stop().await.unwrap();
        assert_eq!(manager.state().await, DaemonState::Stopped);
    }
}
