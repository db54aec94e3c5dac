//! Task runner trait and the external-process implementation.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::RunnerConfig;
use super::descriptor::TaskDescriptor;
use super::error::TaskError;

/// Executes one transformation task against the local input.
///
/// On success the descriptor's output file is expected to exist; runners
/// do not verify it.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs the task to completion.
    async fn run(&self, task: &TaskDescriptor) -> Result<(), TaskError>;
}

/// Runs tasks as external processes with no stdin.
pub struct ProcessRunner {
    config: RunnerConfig,
}

impl ProcessRunner {
    /// Creates a new process runner with the given configuration.
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Creates a runner with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RunnerConfig::default())
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Checks that the configured program can be launched.
    pub async fn validate(&self) -> Result<(), TaskError> {
        self.validate_program(&self.config.program).await
    }

    /// Checks that `program` can be launched by running `program -version`.
    ///
    /// A nonzero exit only logs a warning; failing to spawn is an error.
    pub async fn validate_program(&self, program: &str) -> Result<(), TaskError> {
        let status = Command::new(program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| TaskError::LaunchFailed {
                name: "validate".to_string(),
                program: program.to_string(),
                source: e,
            })?;

        if !status.success() {
            warn!(
                program,
                code = ?status.code(),
                "Transformation program reported a failure for -version"
            );
        }
        Ok(())
    }
}

/// How long captured output may stay open after the process exits.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Forwards each line of a child's output stream to the log.
///
/// Lines are decoded lossily and the stream is read until EOF, so the
/// child never sees a closed pipe.
fn forward_lines<R>(task: String, stream: &'static str, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    debug!(task = %task, stream, "{}", text.trim_end());
                }
                Err(e) => {
                    debug!(task = %task, stream, error = %e, "Output stream closed");
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl TaskRunner for ProcessRunner {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(&self, task: &TaskDescriptor) -> Result<(), TaskError> {
        if !tokio::fs::try_exists(&task.input_local_path)
            .await
            .unwrap_or(false)
        {
            return Err(TaskError::InputMissing {
                path: task.input_local_path.clone(),
            });
        }

        info!(task = %task.name, command = %task.command, "Starting transformation");
        let start = Instant::now();

        let mut command = Command::new(&task.command.program);
        command
            .args(&task.command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.config.capture_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        let mut child = command.spawn().map_err(|e| TaskError::LaunchFailed {
            name: task.name.clone(),
            program: task.command.program.clone(),
            source: e,
        })?;

        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward_lines(task.name.clone(), "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(task.name.clone(), "stderr", stderr));
        }

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let status = match timeout(timeout_duration, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(TaskError::Io {
                    name: task.name.clone(),
                    source: e,
                })
            }
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                for forwarder in forwarders {
                    forwarder.abort();
                }
                return Err(TaskError::Timeout {
                    name: task.name.clone(),
                    timeout_secs: self.config.timeout_secs,
                });
            }
        };

        // Descendants may still hold the pipes open after the child exits
        let drained = timeout(OUTPUT_DRAIN_GRACE, async {
            for forwarder in forwarders.iter_mut() {
                let _ = forwarder.await;
            }
        })
        .await
        .is_ok();
        if !drained {
            debug!(task = %task.name, "Output still open after exit, detaching");
            for forwarder in &forwarders {
                forwarder.abort();
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        if !status.success() {
            warn!(task = %task.name, code = ?status.code(), duration_ms, "Transformation failed");
            return Err(TaskError::ExitStatus {
                name: task.name.clone(),
                code: status.code(),
            });
        }

        info!(task = %task.name, duration_ms, "Transformation finished");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::task::CommandSpec;
    use std::path::Path;
    use tempfile::TempDir;

    fn descriptor(dir: &Path, program: &str, args: &[&str]) -> TaskDescriptor {
        let input = dir.join("movie.mov");
        std::fs::write(&input, b"raw video").unwrap();
        TaskDescriptor {
            name: "test".to_string(),
            command: CommandSpec::new(program, args.iter().map(|a| a.to_string()).collect()),
            input_local_path: input,
            output_local_path: dir.join("movie.out"),
            destination_container: "out".to_string(),
            destination_key: "movie.out".to_string(),
            content_type: "application/octet-stream".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_process_produces_output() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("movie.mov");
        let output = temp.path().join("movie.out");
        let task = descriptor(
            temp.path(),
            "cp",
            &[input.to_str().unwrap(), output.to_str().unwrap()],
        );

        ProcessRunner::with_defaults().run(&task).await.unwrap();
        assert_eq!(std::fs::read(output).unwrap(), b"raw video");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let temp = TempDir::new().unwrap();
        let task = descriptor(temp.path(), "sh", &["-c", "exit 3"]);

        let result = ProcessRunner::with_defaults().run(&task).await;
        assert!(matches!(
            result,
            Err(TaskError::ExitStatus { code: Some(3), .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let temp = TempDir::new().unwrap();
        let task = descriptor(temp.path(), "definitely-not-a-real-program-vidfan", &[]);

        let result = ProcessRunner::with_defaults().run(&task).await;
        assert!(matches!(result, Err(TaskError::LaunchFailed { .. })));
    }

    #[tokio::test]
    async fn test_missing_input_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut task = descriptor(temp.path(), "true", &[]);
        task.input_local_path = temp.path().join("absent.mov");

        let result = ProcessRunner::with_defaults().run(&task).await;
        assert!(matches!(result, Err(TaskError::InputMissing { .. })));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let temp = TempDir::new().unwrap();
        let task = descriptor(temp.path(), "sleep", &["30"]);
        let runner = ProcessRunner::new(RunnerConfig::default().with_timeout(1));

        let start = Instant::now();
        let result = runner.run(&task).await;
        assert!(matches!(
            result,
            Err(TaskError::Timeout { timeout_secs: 1, .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_captured_output_does_not_block() {
        let temp = TempDir::new().unwrap();
        let task = descriptor(
            temp.path(),
            "sh",
            &["-c", "echo to-stdout; echo to-stderr >&2"],
        );
        let runner = ProcessRunner::new(RunnerConfig::default().with_capture_output(true));

        runner.run(&task).await.unwrap();
    }

    #[tokio::test]
    async fn test_captured_output_with_invalid_utf8() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("movie.mov");
        let output = temp.path().join("movie.out");
        let script = "printf 'bad \\377 byte\\n' >&2; sleep 0.2; \
                      i=0; while [ $i -lt 2000 ]; do echo \"line $i\" >&2; i=$((i+1)); done; \
                      cp \"$0\" \"$1\"";
        let task = descriptor(
            temp.path(),
            "sh",
            &[
                "-c",
                script,
                input.to_str().unwrap(),
                output.to_str().unwrap(),
            ],
        );
        let runner = ProcessRunner::new(RunnerConfig::default().with_capture_output(true));

        runner.run(&task).await.unwrap();
        assert_eq!(std::fs::read(output).unwrap(), b"raw video");
    }

    #[tokio::test]
    async fn test_lingering_descendant_does_not_block() {
        let temp = TempDir::new().unwrap();
        let task = descriptor(temp.path(), "sh", &["-c", "sleep 30 & echo started"]);
        let runner = ProcessRunner::new(
            RunnerConfig::default()
                .with_capture_output(true)
                .with_timeout(20),
        );

        let start = Instant::now();
        runner.run(&task).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_validate_launchable_program() {
        let runner = ProcessRunner::with_defaults();
        runner.validate_program("true").await.unwrap();
        // Launches but exits nonzero: only a warning
        runner.validate_program("false").await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_missing_program() {
        let runner = ProcessRunner::new(
            RunnerConfig::default().with_program("definitely-not-a-real-program-vidfan"),
        );
        assert!(matches!(
            runner.validate().await,
            Err(TaskError::LaunchFailed { .. })
        ));
    }
}
