//! External diff tool execution.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CancelSignal, DiffPrimitive};
use crate::error::DiffError;

const BLESSED_PLACEHOLDER: &str = "{blessed}";
const CURRENT_PLACEHOLDER: &str = "{current}";
const DIFF_PLACEHOLDER: &str = "{diff}";

/// Captured output of one diff tool invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl CommandOutput {
    /// First token on stdout, or else stderr, that parses as a float.
    pub fn score(&self) -> Option<f64> {
        first_float(&self.stdout).or_else(|| first_float(&self.stderr))
    }
}

/// Runs an external program as the difference primitive.
///
/// The argument template may reference `{blessed}`, `{current}` and `{diff}`;
/// they are replaced with the paths of the pair and the composite output.
#[derive(Debug, Clone)]
pub struct CommandDiff {
    program: String,
    args: Vec<String>,
    success_codes: Vec<i32>,
}

impl CommandDiff {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            success_codes: vec![0],
        }
    }

    /// Parse a whitespace-separated command line such as
    /// `"perceptualdiff {blessed} {current} -output {diff}"`.
    pub fn parse(template: &str) -> Option<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    /// Exit codes that still count as a completed comparison. Some tools exit
    /// non-zero whenever the images differ.
    pub fn with_success_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_codes = codes;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn render_args(&self, blessed: &Path, current: &Path, diff_out: &Path) -> Vec<String> {
        let blessed = blessed.to_string_lossy();
        let current = current.to_string_lossy();
        let diff_out = diff_out.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(BLESSED_PLACEHOLDER, &blessed)
                    .replace(CURRENT_PLACEHOLDER, &current)
                    .replace(DIFF_PLACEHOLDER, &diff_out)
            })
            .collect()
    }

    /// Execute the tool once and capture its output.
    ///
    /// When `cancel` fires the child is killed and reaped before this
    /// returns [`DiffError::Cancelled`].
    pub async fn execute(
        &self,
        blessed: &Path,
        current: &Path,
        diff_out: &Path,
        cancel: &CancelSignal,
    ) -> Result<CommandOutput, DiffError> {
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(self.render_args(blessed, current, diff_out))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DiffError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(program = %self.program, error = %e, "failed to kill diff command");
                }
                stdout.abort();
                stderr.abort();
                return Err(DiffError::Cancelled);
            }
        };

        let stdout = stdout.await.map_err(|e| DiffError::Join(e.to_string()))??;
        let stderr = stderr.await.map_err(|e| DiffError::Join(e.to_string()))??;

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Result<String, DiffError> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[async_trait]
impl DiffPrimitive for CommandDiff {
    fn name(&self) -> &str {
        &self.program
    }

    async fn diff(
        &self,
        blessed: &Path,
        current: &Path,
        diff_out: &Path,
        cancel: &CancelSignal,
    ) -> Result<f64, DiffError> {
        let output = self.execute(blessed, current, diff_out, cancel).await?;
        debug!(
            program = %self.program,
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            "diff command finished"
        );

        if !self.success_codes.contains(&output.exit_code) {
            return Err(DiffError::ExitStatus {
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        output.score().ok_or(DiffError::NoScore)
    }
}

fn first_float(text: &str) -> Option<f64> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .find_map(|token| token.parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 10,
        }
    }

    #[test]
    fn test_score_prefers_stdout() {
        assert_eq!(output(0, "score: 0.25\n", "7").score(), Some(0.25));
    }

    #[test]
    fn test_score_falls_back_to_stderr() {
        assert_eq!(output(1, "", "1234 (0.0188)").score(), Some(1234.0));
    }

    #[test]
    fn test_no_score() {
        assert_eq!(output(0, "FAIL: images differ", "").score(), None);
    }

    #[test]
    fn test_parse_template() {
        let cmd = CommandDiff::parse("pdiff {blessed} {current} -o {diff}").unwrap();
        assert_eq!(cmd.program(), "pdiff");
        let args = cmd.render_args(Path::new("/b/x.png"), Path::new("/c/x.png"), Path::new("/t/d.png"));
        assert_eq!(args, vec!["/b/x.png", "/c/x.png", "-o", "/t/d.png"]);
        assert!(CommandDiff::parse("   ").is_none());
    }

    #[tokio::test]
    async fn test_execute_echo_reports_score() {
        let cmd = CommandDiff::new("echo", vec!["0.5".to_string()]);
        let score = cmd
            .diff(Path::new("a.png"), Path::new("b.png"), Path::new("d.png"), &CancelSignal::new())
            .await
            .expect("diff failed");
        assert_eq!(score, 0.5);
    }

    #[tokio::test]
    async fn test_failing_command_is_exit_status_error() {
        let cmd = CommandDiff::new("false", vec![]);
        let err = cmd
            .diff(Path::new("a.png"), Path::new("b.png"), Path::new("d.png"), &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiffError::ExitStatus { .. }));
    }

    #[tokio::test]
    async fn test_accepted_nonzero_exit_code() {
        let cmd = CommandDiff::new("sh", vec!["-c".to_string(), "echo 3.5; exit 1".to_string()])
            .with_success_codes(vec![0, 1]);
        let score = cmd
            .diff(Path::new("a.png"), Path::new("b.png"), Path::new("d.png"), &CancelSignal::new())
            .await
            .expect("diff failed");
        assert_eq!(score, 3.5);
    }

    #[tokio::test]
    async fn test_cancel_kills_running_command() {
        let cmd = CommandDiff::new("sleep", vec!["30".to_string()]);
        let cancel = CancelSignal::new();
        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let err = cmd
            .diff(Path::new("a.png"), Path::new("b.png"), Path::new("d.png"), &cancel)
            .await
            .unwrap_err();
        trigger.await.unwrap();
        assert!(matches!(err, DiffError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = CommandDiff::new("definitely-not-a-real-diff-tool", vec![]);
        let err = cmd
            .diff(Path::new("a.png"), Path::new("b.png"), Path::new("d.png"), &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiffError::Spawn { .. }));
    }
}
