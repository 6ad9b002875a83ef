use crate::config::Settings;
use crate::contexts::Worker;
use crate::data::outcome::classify_diagnostics;
use crate::data::{FailureKind, FetchFailure, FetchKind, FetchOutcome};
use async_trait::async_trait;
use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Longest diagnostic excerpt carried in a failure detail
const DETAIL_LIMIT: usize = 300;

/// How long pipes may stay open once the worker has exited
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Runs scraper scripts as child processes: `<interpreter> <script> <url>`.
///
/// The script writes one JSON document to stdout and exits 0 on success.
/// Anything else is a failure, classified by what the script wrote to stderr.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    interpreter: String,
    product_script: PathBuf,
    reviews_script: PathBuf,
    timeout: Duration,
}

struct WorkerOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ProcessWorker {
    /// Creates a new ProcessWorker
    ///
    /// # Arguments
    /// * `interpreter` - Program used to run the scripts (e.g. `python3`)
    /// * `product_script` - Entry point for product snapshots
    /// * `reviews_script` - Entry point for review lists
    /// * `timeout` - Upper bound for one run; the child is killed past it
    pub fn new(
        interpreter: impl Into<String>,
        product_script: impl Into<PathBuf>,
        reviews_script: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            product_script: product_script.into(),
            reviews_script: reviews_script.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.python.clone(),
            settings.product_script_path(),
            settings.reviews_script_path(),
            settings.timeout(),
        )
    }

    fn script_for(&self, kind: FetchKind) -> &Path {
        match kind {
            FetchKind::Product => &self.product_script,
            FetchKind::Reviews => &self.reviews_script,
        }
    }

    async fn execute(&self, kind: FetchKind, url: &str) -> FetchOutcome {
        let script = self.script_for(kind);

        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // kill_on_drop covers every early return below
            .kill_on_drop(true);
        // Own process group, so descendants can be killed with the worker
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            FetchFailure::new(
                FailureKind::ProcessError,
                format!(
                    "failed to spawn {} worker `{} {}`: {}",
                    kind,
                    self.interpreter,
                    script.display(),
                    e
                ),
            )
        })?;
        let pgid = child.id();

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                terminate(&mut child, pgid, kind).await;
                return Err(FetchFailure::new(
                    FailureKind::ProcessError,
                    format!("{} worker started without output pipes", kind),
                ));
            }
        };

        debug!("{} worker started (pid {:?}) for {}", kind, pgid, url);

        // Pipes drain on their own tasks so a chatty child cannot block on a
        // full pipe buffer while we wait for it to exit.
        let stdout_reader = tokio::spawn(read_pipe(stdout));
        let stderr_reader = tokio::spawn(read_pipe(stderr));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(&mut child, pgid, kind).await;
                stdout_reader.abort();
                stderr_reader.abort();
                return Err(FetchFailure::new(
                    FailureKind::ProcessError,
                    format!("failed to wait for {} worker: {}", kind, e),
                ));
            }
            Err(_) => {
                terminate(&mut child, pgid, kind).await;
                stdout_reader.abort();
                stderr_reader.abort();
                return Err(FetchFailure::new(
                    FailureKind::Timeout,
                    format!(
                        "{} worker did not finish within {}s",
                        kind,
                        self.timeout.as_secs_f64()
                    ),
                ));
            }
        };

        // The worker has exited. Anything it left behind still holds the
        // pipes open and must not outlive the attempt.
        kill_group(pgid, kind);
        let stdout = drain(stdout_reader, kind, "stdout").await;
        let stderr = drain(stderr_reader, kind, "stderr").await;

        classify_output(
            kind,
            WorkerOutput {
                status,
                stdout,
                stderr,
            },
        )
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn run(&self, kind: FetchKind, url: &str) -> FetchOutcome {
        self.execute(kind, url).await
    }
}

async fn read_pipe<R>(mut pipe: R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Collects what a pipe reader gathered, waiting at most `PIPE_GRACE`
async fn drain(
    reader: JoinHandle<io::Result<Vec<u8>>>,
    kind: FetchKind,
    stream: &str,
) -> Vec<u8> {
    let abort = reader.abort_handle();
    match tokio::time::timeout(PIPE_GRACE, reader).await {
        Ok(Ok(Ok(buf))) => buf,
        Ok(Ok(Err(e))) => {
            warn!("failed to read {} worker {}: {}", kind, stream, e);
            Vec::new()
        }
        Ok(Err(e)) => {
            warn!("{} worker {} reader did not complete: {}", kind, stream, e);
            Vec::new()
        }
        Err(_) => {
            abort.abort();
            warn!("{} worker {} still open after exit, discarding", kind, stream);
            Vec::new()
        }
    }
}

/// Kills the worker's process group, then the child itself, and reaps it
async fn terminate(child: &mut Child, pgid: Option<u32>, kind: FetchKind) {
    kill_group(pgid, kind);
    if let Err(e) = child.kill().await {
        warn!("failed to kill {} worker: {}", kind, e);
    }
}

#[cfg(unix)]
fn kill_group(pgid: Option<u32>, kind: FetchKind) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(raw) = pgid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // ESRCH: the group is already empty
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("failed to kill {} worker process group {}: {}", kind, raw, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>, _kind: FetchKind) {}

fn classify_output(kind: FetchKind, output: WorkerOutput) -> FetchOutcome {
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostics = format!("{}\n{}", stderr, stdout);
        return Err(FetchFailure::new(
            classify_diagnostics(&diagnostics),
            format!(
                "{} worker exited with {}: {}",
                kind,
                output.status,
                excerpt(&diagnostics)
            ),
        ));
    }

    let payload: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|e| {
        FetchFailure::new(
            FailureKind::ParseError,
            format!("{} worker printed invalid JSON: {}", kind, e),
        )
    })?;

    // The scripts report their own failures in-band as {"error": "..."}
    if let Some(message) = payload.get("error").and_then(|v| v.as_str()) {
        return Err(FetchFailure::new(
            classify_diagnostics(&format!("{}\n{}", message, stderr)),
            format!("{} worker reported: {}", kind, excerpt(message)),
        ));
    }

    Ok(payload)
}

/// Last meaningful lines of diagnostic output, bounded in length
fn excerpt(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let tail = lines[lines.len().saturating_sub(3)..].join(" | ");
    if tail.chars().count() > DETAIL_LIMIT {
        let cut: String = tail.chars().take(DETAIL_LIMIT).collect();
        format!("{}...", cut)
    } else if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::time::Instant;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "prodscope_worker_{}_{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Worker whose product and reviews entry points run the given shell bodies
    fn shell_worker(name: &str, product: &str, reviews: &str, timeout: Duration) -> ProcessWorker {
        let dir = test_dir(name);
        let product_path = dir.join("product.sh");
        let reviews_path = dir.join("reviews.sh");
        fs::write(&product_path, product).unwrap();
        fs::write(&reviews_path, reviews).unwrap();
        ProcessWorker::new("sh", product_path, reviews_path, timeout)
    }

    #[tokio::test]
    async fn test_success_returns_payload() {
        let worker = shell_worker(
            "success",
            r#"printf '{"data": {"title": "Desk", "url": "%s"}}' "$1""#,
            "echo '[]'",
            Duration::from_secs(10),
        );

        let payload = worker.run(FetchKind::Product, "https://amazon.com/dp/X").await;

        assert_eq!(
            payload,
            Ok(json!({"data": {"title": "Desk", "url": "https://amazon.com/dp/X"}}))
        );
        let reviews = worker.run(FetchKind::Reviews, "u").await;
        assert_eq!(reviews, Ok(json!([])));
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_rate_limit_marker() {
        let worker = shell_worker(
            "ratelimit",
            "echo 'HTTP Error 429: Too Many Requests' >&2; exit 1",
            "exit 1",
            Duration::from_secs(10),
        );

        let failure = worker.run(FetchKind::Product, "u").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert!(failure.detail.contains("429"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_marker_is_process_error() {
        let worker = shell_worker(
            "crash",
            "echo 'Traceback: KeyError' >&2; exit 3",
            "exit 1",
            Duration::from_secs(10),
        );

        let failure = worker.run(FetchKind::Product, "u").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::ProcessError);
        assert!(failure.detail.contains("KeyError"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let worker = shell_worker(
            "badjson",
            "echo 'Scraping page 1/3'",
            "exit 1",
            Duration::from_secs(10),
        );

        let failure = worker.run(FetchKind::Product, "u").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::ParseError);
    }

    #[tokio::test]
    async fn test_in_band_error_object_is_classified() {
        let worker = shell_worker(
            "inband",
            r#"echo '{"error": "Failed after 2 attempts: request blocked"}'"#,
            r#"echo '{"error": "No data retrieved from any pages."}'"#,
            Duration::from_secs(10),
        );

        let product = worker.run(FetchKind::Product, "u").await.unwrap_err();
        assert_eq!(product.kind, FailureKind::RateLimited);

        let reviews = worker.run(FetchKind::Reviews, "u").await.unwrap_err();
        assert_eq!(reviews.kind, FailureKind::ProcessError);
        assert!(reviews.detail.contains("No data retrieved"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_process_error() {
        let worker = ProcessWorker::new(
            "/nonexistent/prodscope-interpreter",
            "product.py",
            "reviews.py",
            Duration::from_secs(1),
        );

        let failure = worker.run(FetchKind::Product, "u").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::ProcessError);
        assert!(failure.detail.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_timeout_kills_worker() {
        let dir = test_dir("timeout");
        let pid_file = dir.join("pid");
        let worker = shell_worker(
            "timeout",
            &format!("echo $$ > '{}'; exec sleep 30", pid_file.display()),
            "exit 0",
            Duration::from_millis(500),
        );

        let started = Instant::now();
        let failure = worker.run(FetchKind::Product, "u").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.trim())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success(), "worker process {} outlived the timeout", pid.trim());

        let _ = fs::remove_dir_all(&dir);
    }

    /// Alive and not a zombie waiting to be reaped
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .unwrap_or_default()
                .trim_start()
                .starts_with('Z'),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    async fn gone_within(pid: &str, limit: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < limit {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        !is_running(pid)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_background_descendant_does_not_delay_success() {
        let dir = test_dir("descendant");
        let pid_file = dir.join("descendant.pid");
        let worker = shell_worker(
            "descendant",
            &format!(
                r#"echo '{{"data": {{"title": "Desk"}}}}'; sleep 30 & echo $! > '{}'; exit 0"#,
                pid_file.display()
            ),
            "exit 0",
            Duration::from_secs(10),
        );

        let started = Instant::now();
        let payload = worker.run(FetchKind::Product, "u").await;

        assert_eq!(payload, Ok(json!({"data": {"title": "Desk"}})));
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid = fs::read_to_string(&pid_file).unwrap();
        assert!(
            gone_within(&pid, Duration::from_secs(2)).await,
            "descendant {} outlived the worker",
            pid.trim()
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_descendants() {
        let dir = test_dir("descendant_timeout");
        let pid_file = dir.join("descendant.pid");
        let worker = shell_worker(
            "descendant_timeout",
            &format!("sleep 30 & echo $! > '{}'; wait", pid_file.display()),
            "exit 0",
            Duration::from_millis(500),
        );

        let failure = worker.run(FetchKind::Product, "u").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::Timeout);
        let pid = fs::read_to_string(&pid_file).unwrap();
        assert!(
            gone_within(&pid, Duration::from_secs(2)).await,
            "descendant {} outlived the timeout",
            pid.trim()
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_excerpt_keeps_tail() {
        let text = "line one\n\nline two\nline three\nline four\n";
        assert_eq!(excerpt(text), "line two | line three | line four");
        assert_eq!(excerpt("  \n"), "no diagnostic output");
        assert!(excerpt(&"x".repeat(1000)).ends_with("..."));
    }
}
