//! 설치 오케스트레이터
//!
//! ## 실행 순서
//! 1. 활성화된 대상의 설치 경로 검증
//! 2. 경로 저장 (네트워크 작업 전에 한 번)
//! 3. 프론트: 릴리스 조회 → 다운로드 → 압축 해제
//! 4. 백엔드: php.ini 확장 토글 → 다운로드 → 압축 해제 → 후처리 명령
//!
//! 대상은 항상 프론트, 백엔드 순서로 하나씩 처리하며 첫 번째 실패에서 실행을
//! 끝냅니다. 이미 풀린 파일은 되돌리지 않습니다.
//!
//! 스크래치 파일명이 대상마다 고정이므로 한 파이프라인에서 동시에 두 실행이
//! 돌면 서로의 다운로드를 덮어씁니다. `run`은 실행 중이면 `AlreadyRunning`으로
//! 즉시 거부합니다.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveInstaller;
use crate::command::CommandRunner;
use crate::download::{DownloadProgress, Downloader};
use crate::error::{InstallerError, Result};
use crate::github::GitHubClient;
use crate::paths::{PathStore, PersistedPaths};
use crate::php_ini::set_extension_state;
use crate::{format_bytes, InstallTarget, InstallerConfig, TargetKind};

pub const NO_ASSET_MESSAGE: &str = "No .zip asset found in the latest release.";
pub const COMPLETED_MESSAGE: &str = "Download and migration completed successfully!";

/// 실행 단계
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunPhase {
    Resolving,
    Downloading(TargetKind),
    Extracting(TargetKind),
    Provisioning(TargetKind),
    Completed,
    Failed,
}

/// 진행 상태를 받는 쪽 (GUI/CLI)
pub trait StatusSink: Send + Sync {
    fn phase(&self, _phase: RunPhase) {}
    fn progress(&self, _target: TargetKind, _progress: DownloadProgress) {}
    fn message(&self, _message: &str) {}
}

/// 아무것도 표시하지 않는 sink
pub struct NullSink;

impl StatusSink for NullSink {}

/// 호출 측 입력 (GUI 체크박스/경로 입력에 해당)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallRequest {
    pub install_front: bool,
    pub install_back: bool,
    pub front_path: String,
    pub back_path: String,
    /// php.ini 경로 (비어 있으면 확장 토글 생략)
    pub config_file_path: String,
    pub first_time_setup: bool,
    pub enable_extension: bool,
}

impl InstallRequest {
    fn target(&self, kind: TargetKind) -> InstallTarget {
        let (enabled, path) = match kind {
            TargetKind::Front => (self.install_front, &self.front_path),
            TargetKind::Back => (self.install_back, &self.back_path),
        };
        InstallTarget {
            kind,
            enabled,
            destination: PathBuf::from(path.trim()),
            source_url: None,
        }
    }

    fn persisted_paths(&self) -> PersistedPaths {
        PersistedPaths {
            front: self.front_path.clone(),
            back: self.back_path.clone(),
            config_file: self.config_file_path.clone(),
        }
    }
}

/// 대상별 결과
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum TargetOutcome {
    Skipped,
    Installed,
    /// 설치할 아카이브가 없음 (에러 아님)
    NothingToInstall(String),
}

/// 실행 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub front: TargetOutcome,
    pub back: TargetOutcome,
    pub message: String,
    pub started_at: String,
    pub finished_at: String,
}

/// 템플릿 환경 파일 활성화 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvActivation {
    Activated,
    AlreadyPresent,
}

/// `<dir>/<template>`을 `<dir>/<active>`로 이름 변경
///
/// 활성 파일이 이미 있으면 건드리지 않는다.
pub fn activate_env_file(dir: &Path, template: &str, active: &str) -> Result<EnvActivation> {
    let active_path = dir.join(active);
    if active_path.exists() {
        tracing::info!("[Pipeline] {} already present, keeping it", active_path.display());
        return Ok(EnvActivation::AlreadyPresent);
    }

    let template_path = dir.join(template);
    if !template_path.is_file() {
        return Err(InstallerError::NotFound(template_path.display().to_string()));
    }

    std::fs::rename(&template_path, &active_path)
        .map_err(|e| InstallerError::from_io(&e, "rename env template", &template_path))?;
    tracing::info!(
        "[Pipeline] Renamed {} → {}",
        template_path.display(),
        active_path.display()
    );
    Ok(EnvActivation::Activated)
}

/// 실행 중 플래그를 잡고 있다가 드롭 시 해제
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| InstallerError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken, operation: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(InstallerError::Cancelled(operation.to_string()));
    }
    Ok(())
}

/// 설치 파이프라인
pub struct InstallPipeline {
    config: InstallerConfig,
    resolver: GitHubClient,
    downloader: Downloader,
    archive: ArchiveInstaller,
    runner: CommandRunner,
    paths: PathStore,
    running: AtomicBool,
}

impl InstallPipeline {
    pub fn new(config: InstallerConfig) -> Result<Self> {
        let resolver = GitHubClient::with_base_url(
            &config.github_owner,
            &config.github_repo,
            config.api_base_url.as_deref(),
        )?;
        let downloader = Downloader::new(config.resolved_scratch_dir())?;
        let runner = CommandRunner::new(config.run_options());
        let paths = PathStore::new(config.paths_file.clone());

        Ok(Self {
            config,
            resolver,
            downloader,
            archive: ArchiveInstaller::new(),
            runner,
            paths,
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn path_store(&self) -> &PathStore {
        &self.paths
    }

    pub fn resolver(&self) -> &GitHubClient {
        &self.resolver
    }

    /// 실행 중이면 트리거를 비활성화해야 함
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 한 번의 "업데이트" 실행
    pub async fn run(
        &self,
        request: &InstallRequest,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let _guard = RunGuard::acquire(&self.running)?;
        let started_at = chrono::Utc::now().to_rfc3339();

        match self.run_targets(request, sink, cancel).await {
            Ok((front, back)) => {
                sink.phase(RunPhase::Completed);
                sink.message(COMPLETED_MESSAGE);
                tracing::info!("[Pipeline] Run completed (front: {:?}, back: {:?})", front, back);
                Ok(RunReport {
                    front,
                    back,
                    message: COMPLETED_MESSAGE.to_string(),
                    started_at,
                    finished_at: chrono::Utc::now().to_rfc3339(),
                })
            }
            Err(e) => {
                tracing::error!("[Pipeline] Run failed ({}): {}", e.error_code(), e);
                sink.phase(RunPhase::Failed);
                sink.message(&format!("An error occurred: {}", e));
                Err(e)
            }
        }
    }

    async fn run_targets(
        &self,
        request: &InstallRequest,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<(TargetOutcome, TargetOutcome)> {
        let front = request.target(TargetKind::Front);
        let back = request.target(TargetKind::Back);

        for target in [&front, &back] {
            if target.enabled && target.destination.as_os_str().is_empty() {
                return Err(InstallerError::Validation(format!(
                    "Please enter the {}end folder path.",
                    target.kind.display_name()
                )));
            }
        }

        self.paths.save_paths(&request.persisted_paths())?;
        sink.message("Starting download...");

        let front_outcome = if front.enabled {
            self.install_front(front, sink, cancel).await?
        } else {
            TargetOutcome::Skipped
        };

        let back_outcome = if back.enabled {
            self.install_back(back, request, sink, cancel).await?
        } else {
            TargetOutcome::Skipped
        };

        Ok((front_outcome, back_outcome))
    }

    async fn install_front(
        &self,
        mut target: InstallTarget,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<TargetOutcome> {
        ensure_not_cancelled(cancel, "resolve")?;
        sink.phase(RunPhase::Resolving);
        let artifact = self.resolver.resolve_latest().await?;
        sink.message(&format!("Latest version: {}", artifact.display_name));

        let Some(url) = artifact.download_url else {
            sink.message(NO_ASSET_MESSAGE);
            return Ok(TargetOutcome::NothingToInstall(NO_ASSET_MESSAGE.to_string()));
        };
        target.source_url = Some(url);

        self.fetch_and_extract(&target, sink, cancel).await?;
        sink.message("Front files downloaded and extracted successfully!");
        Ok(TargetOutcome::Installed)
    }

    async fn install_back(
        &self,
        mut target: InstallTarget,
        request: &InstallRequest,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<TargetOutcome> {
        let extension = &self.config.extension_name;
        let ini_path = request.config_file_path.trim();
        if ini_path.is_empty() {
            tracing::warn!("[Pipeline] No php.ini path given, skipping '{}' extension toggle", extension);
        } else {
            let outcome = set_extension_state(Path::new(ini_path), extension, request.enable_extension);
            sink.message(&outcome.message);
            if outcome.is_failure() {
                return Err(InstallerError::Config(format!(
                    "Failed to update the {} extension in php.ini. {}",
                    extension, outcome.message
                )));
            }
        }

        target.source_url = Some(self.config.backend_url.clone());
        self.fetch_and_extract(&target, sink, cancel).await?;
        sink.message("Back files downloaded and extracted successfully!");

        sink.phase(RunPhase::Provisioning(TargetKind::Back));
        sink.message("Running database operations...");
        self.provision(&target.destination, request.first_time_setup, sink, cancel)
            .await?;

        Ok(TargetOutcome::Installed)
    }

    async fn fetch_and_extract(
        &self,
        target: &InstallTarget,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let kind = target.kind;
        let url = target.source_url.as_deref().ok_or_else(|| {
            InstallerError::Validation(format!("No download URL for {}", kind.display_name()))
        })?;

        sink.phase(RunPhase::Downloading(kind));
        sink.message(&format!("Downloading {} files...", kind.display_name()));
        let archive_path = self
            .downloader
            .download(url, kind.scratch_file_name(), cancel, |progress| {
                sink.progress(kind, progress);
                sink.message(&format!(
                    "Downloading {} files... {}/{}",
                    kind.display_name(),
                    format_bytes(progress.bytes_downloaded),
                    format_bytes(progress.total_bytes)
                ));
            })
            .await?;

        ensure_not_cancelled(cancel, "extract")?;
        sink.phase(RunPhase::Extracting(kind));
        let installer = self.archive;
        let destination = target.destination.clone();
        tokio::task::spawn_blocking(move || installer.install(&archive_path, &destination))
            .await
            .map_err(|e| InstallerError::Internal(anyhow::anyhow!("extract task failed: {}", e)))??;

        Ok(())
    }

    async fn provision(
        &self,
        dir: &Path,
        first_time_setup: bool,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let steps = &self.config.provisioning;

        if first_time_setup {
            activate_env_file(dir, &steps.env_template, &steps.env_file)?;
            for command in [
                &steps.dependency_install,
                &steps.migrate_seed,
                &steps.storage_link,
            ] {
                self.run_step(dir, command, sink, cancel).await?;
            }
            sink.message("Database setup completed successfully!");
        } else {
            self.run_step(dir, &steps.migrate, sink, cancel).await?;
            sink.message("Database migrations completed successfully!");
        }

        Ok(())
    }

    async fn run_step(
        &self,
        dir: &Path,
        command: &str,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if command.trim().is_empty() {
            tracing::debug!("[Pipeline] Empty provisioning command, skipped");
            return Ok(());
        }
        sink.message(&format!("Running '{}'...", command));
        self.runner.run_checked(dir, command, cancel).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_template_is_activated_once() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".env.example"), "APP_KEY=").unwrap();

        assert_eq!(
            activate_env_file(tmp.path(), ".env.example", ".env").unwrap(),
            EnvActivation::Activated
        );
        assert!(!tmp.path().join(".env.example").exists());

        std::fs::write(tmp.path().join(".env"), "APP_KEY=configured").unwrap();
        std::fs::write(tmp.path().join(".env.example"), "APP_KEY=").unwrap();
        assert_eq!(
            activate_env_file(tmp.path(), ".env.example", ".env").unwrap(),
            EnvActivation::AlreadyPresent
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join(".env")).unwrap(),
            "APP_KEY=configured"
        );
    }

    #[test]
    fn missing_env_template_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = activate_env_file(tmp.path(), ".env.example", ".env").unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn run_guard_is_single_flight() {
        let flag = AtomicBool::new(false);
        let guard = RunGuard::acquire(&flag).unwrap();
        assert!(matches!(
            RunGuard::acquire(&flag),
            Err(InstallerError::AlreadyRunning)
        ));
        drop(guard);
        assert!(RunGuard::acquire(&flag).is_ok());
    }

    #[test]
    fn request_trims_destination() {
        let request = InstallRequest {
            install_front: true,
            front_path: "   ".into(),
            ..Default::default()
        };
        let target = request.target(TargetKind::Front);
        assert!(target.enabled);
        assert!(target.destination.as_os_str().is_empty());
    }
}
