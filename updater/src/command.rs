//! 외부 명령 실행
//!
//! 셸(Windows: `cmd /C`, 그 외: `sh -c`)로 명령 줄을 실행하고 stdout/stderr를
//! 수집합니다. 기본은 무제한 대기이며, 타임아웃이나 취소 토큰이 발동하면
//! 자식 프로세스를 강제 종료합니다.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{InstallerError, Result};

/// 명령 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// 프로세스가 스스로 종료했는지 (시그널 종료면 false)
    pub exit_completed: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// 실행 옵션
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 콘솔 창 표시 여부 (Windows 전용, 다른 OS에서는 무시)
    pub visible: bool,
    /// None이면 무제한 대기
    pub timeout: Option<Duration>,
}

/// 셸 명령 실행기
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    options: RunOptions,
}

impl CommandRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn build_command(&self, working_dir: &Path, command_line: &str) -> Command {
        let mut cmd = shell_command(command_line);
        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.options.visible {
            apply_creation_flags(&mut cmd);
        }
        cmd
    }

    /// `working_dir`에서 `command_line`을 실행하고 종료까지 대기
    pub async fn run(
        &self,
        working_dir: &Path,
        command_line: &str,
        cancel: &CancellationToken,
    ) -> Result<CommandResult> {
        tracing::info!("[Command] {} (in {})", command_line, working_dir.display());

        let child = self
            .build_command(working_dir, command_line)
            .spawn()
            .map_err(|e| InstallerError::Process(format!("'{}': {}", command_line, e)))?;

        // wait_with_output가 소유권을 가져가므로 select!에서 future가 드롭되면
        // kill_on_drop으로 자식 프로세스가 종료된다
        let wait = child.wait_with_output();
        let output = match self.options.timeout {
            Some(limit) => tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(InstallerError::Cancelled(command_line.to_string()));
                }
                res = tokio::time::timeout(limit, wait) => match res {
                    Ok(out) => out,
                    Err(_) => {
                        tracing::warn!("[Command] Killed after {}s: {}", limit.as_secs(), command_line);
                        return Err(InstallerError::Timeout {
                            command: command_line.to_string(),
                            duration_secs: limit.as_secs(),
                        });
                    }
                },
            },
            None => tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(InstallerError::Cancelled(command_line.to_string()));
                }
                out = wait => out,
            },
        }
        .map_err(|e| InstallerError::Process(format!("'{}': {}", command_line, e)))?;

        let result = CommandResult {
            exit_completed: output.status.code().is_some(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.stdout.trim().is_empty() {
            tracing::debug!("[Command] stdout: {}", result.stdout.trim());
        }
        if !result.stderr.trim().is_empty() {
            tracing::warn!("[Command] stderr: {}", result.stderr.trim());
        }
        tracing::info!("[Command] {} exited with {:?}", command_line, result.exit_code);

        Ok(result)
    }

    /// 실행 후 종료 코드가 0이 아니면 `CommandFailed`
    pub async fn run_checked(
        &self,
        working_dir: &Path,
        command_line: &str,
        cancel: &CancellationToken,
    ) -> Result<CommandResult> {
        let result = self.run(working_dir, command_line, cancel).await?;
        if !result.success() {
            return Err(InstallerError::CommandFailed {
                command: command_line.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }
}

#[cfg(target_os = "windows")]
fn shell_command(command_line: &str) -> Command {
    let mut cmd = Command::new("cmd.exe");
    cmd.arg("/C").arg(command_line);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn shell_command(command_line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);
    cmd
}

/// Windows에서 콘솔 창을 숨김
#[cfg(target_os = "windows")]
fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_stderr_in_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();

        let runner = CommandRunner::default();
        let result = runner
            .run(tmp.path(), "cat marker.txt; echo oops 1>&2", &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.exit_completed);
        assert_eq!(result.stdout, "here");
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_and_checked() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = CommandRunner::default();
        let cancel = CancellationToken::new();

        let result = runner.run(tmp.path(), "exit 3", &cancel).await.unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());

        let err = runner
            .run_checked(tmp.path(), "echo migrate failed 1>&2; exit 1", &cancel)
            .await
            .unwrap_err();
        match err {
            InstallerError::CommandFailed { exit_code, stderr, .. } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "migrate failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_working_dir_is_process_error() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = CommandRunner::default();
        let err = runner
            .run(&tmp.path().join("missing"), "true", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PROCESS_ERROR");
    }

    #[tokio::test]
    async fn timeout_kills_hung_process() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(RunOptions {
            visible: false,
            timeout: Some(Duration::from_millis(200)),
        });

        let started = std::time::Instant::now();
        let err = runner
            .run(tmp.path(), "sleep 30", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TIMEOUT");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = CommandRunner::default();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = runner.run(tmp.path(), "sleep 30", &cancel).await.unwrap_err();
        assert_eq!(err.error_code(), "CANCELLED");
    }
}
