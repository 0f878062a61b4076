use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::request::EngineInvocation;

/// Engine output lines worth surfacing at info level.
const SIGNIFICANT_MARKERS: [&str; 6] = ["[", "s]", "SUCCESS", "ERROR", "Imported", "Exporting"];

pub fn is_significant(line: &str) -> bool {
    SIGNIFICANT_MARKERS.iter().any(|m| line.contains(m))
}

#[derive(Debug)]
pub struct ProcessOutcome {
    /// `None` when the process was killed on timeout.
    pub status: Option<ExitStatus>,
    pub lines: Vec<String>,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }
}

fn keep_line(lines: &mut Vec<String>, raw: Vec<u8>) {
    let line = String::from_utf8_lossy(&raw).trim().to_string();
    if line.is_empty() {
        return;
    }
    if is_significant(&line) {
        info!(engine = %line, "engine output");
    } else {
        debug!(engine = %line, "engine output");
    }
    lines.push(line);
}

/// Runs `invocation`, reading stdout and stderr incrementally into one ordered
/// line log. If `limit` elapses first the child is killed and reaped.
pub async fn run_bounded(invocation: &EngineInvocation, limit: Duration) -> io::Result<ProcessOutcome> {
    let started = Instant::now();

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("engine stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("engine stderr not captured"))?;

    let mut lines = Vec::new();

    let finished = {
        let run = async {
            let mut out = BufReader::new(stdout).split(b'\n');
            let mut err = BufReader::new(stderr).split(b'\n');
            let (mut out_open, mut err_open) = (true, true);

            while out_open || err_open {
                tokio::select! {
                    segment = out.next_segment(), if out_open => match segment? {
                        Some(raw) => keep_line(&mut lines, raw),
                        None => out_open = false,
                    },
                    segment = err.next_segment(), if err_open => match segment? {
                        Some(raw) => keep_line(&mut lines, raw),
                        None => err_open = false,
                    },
                }
            }

            child.wait().await
        };
        timeout(limit, run).await
    };

    match finished {
        Ok(status) => Ok(ProcessOutcome {
            status: Some(status?),
            lines,
            elapsed: started.elapsed(),
        }),
        Err(_) => {
            warn!(
                program = %invocation.program.display(),
                limit_secs = limit.as_secs(),
                "engine exceeded its time limit, killing"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill engine process");
            }
            Ok(ProcessOutcome {
                status: None,
                lines,
                elapsed: started.elapsed(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> EngineInvocation {
        EngineInvocation {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[test]
    fn significant_markers() {
        assert!(is_significant("[1.2s] Importing USD: a.usda"));
        assert!(is_significant("SUCCESS: Conversion complete"));
        assert!(!is_significant("Blender 4.1.0 (hash abc)"));
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let outcome = run_bounded(&sh("echo one; echo two 1>&2; echo; exit 4"), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(outcome.status.unwrap().code(), Some(4));
        assert_eq!(outcome.lines.len(), 2);
        assert!(outcome.lines.contains(&"one".to_string()));
        assert!(outcome.lines.contains(&"two".to_string()));
    }

    #[tokio::test]
    async fn kills_process_that_overruns() {
        let outcome = run_bounded(&sh("echo started; sleep 30"), Duration::from_millis(300))
            .await
            .unwrap();

        assert!(outcome.timed_out());
        assert!(outcome.elapsed < Duration::from_secs(10));
        assert_eq!(outcome.lines, vec!["started".to_string()]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let invocation = EngineInvocation {
            program: PathBuf::from("/nonexistent/engine-binary"),
            args: vec![],
        };
        let err = run_bounded(&invocation, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
