//! # MSAR ERP 업데이터 라이브러리
//!
//! 최신 릴리스를 내려받아 설치 디렉터리에 풀고, 백엔드의 경우 php.ini 패치와
//! 외부 명령(composer, artisan)으로 후처리까지 수행합니다.
//!
//! ## 파이프라인
//! ```text
//! GitHubClient ─▶ Downloader ─▶ ArchiveInstaller ─▶ (백엔드) php.ini 패치 + CommandRunner
//!                                         │
//!                          PathStore (실행 전에 경로 저장)
//! ```
//! - **github.rs**: 최신 릴리스 조회, 첫 번째 `.zip` 에셋 선택
//! - **download.rs**: 스트리밍 다운로드 + 진행률 콜백
//! - **archive.rs**: 최상위 폴더 제거 후 압축 해제, zip-slip 차단
//! - **php_ini.rs**: `extension=` 지시어 토글
//! - **command.rs**: 셸 명령 실행 (타임아웃/취소 지원)
//! - **paths.rs**: 마지막 사용 경로 저장
//! - **pipeline.rs**: 위 단계를 순서대로 묶는 오케스트레이터

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod archive;
pub mod command;
pub mod download;
pub mod error;
pub mod github;
pub mod paths;
pub mod php_ini;
pub mod pipeline;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use archive::ArchiveInstaller;
pub use command::{CommandResult, CommandRunner, RunOptions};
pub use download::{DownloadProgress, Downloader};
pub use error::{InstallerError, Result};
pub use github::{GitHubClient, ReleaseArtifact};
pub use paths::{PathStore, PersistedPaths};
pub use php_ini::{set_extension_state, PatchOutcome, PatchStatus};
pub use pipeline::{
    InstallPipeline, InstallRequest, NullSink, RunPhase, RunReport, StatusSink, TargetOutcome,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ══════════════════════════════════════════════════════
// 설치 대상
// ══════════════════════════════════════════════════════

/// 설치 대상 종류
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Front,
    Back,
}

impl TargetKind {
    /// 스크래치 디렉터리에 저장할 다운로드 파일명
    pub fn scratch_file_name(&self) -> &'static str {
        match self {
            TargetKind::Front => "front.zip",
            TargetKind::Back => "back.zip",
        }
    }

    /// 사용자 표시용 이름
    pub fn display_name(&self) -> &'static str {
        match self {
            TargetKind::Front => "front",
            TargetKind::Back => "back",
        }
    }
}

/// 한 번의 실행에서 처리할 대상
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    pub kind: TargetKind,
    pub enabled: bool,
    pub destination: PathBuf,
    /// 프론트는 릴리스 조회 후 결정되므로 비어 있을 수 있음
    pub source_url: Option<String>,
}

// ══════════════════════════════════════════════════════
// 설정
// ══════════════════════════════════════════════════════

/// 백엔드 최초 설정/마이그레이션 명령
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// 활성화할 템플릿 환경 파일
    pub env_template: String,
    pub env_file: String,
    pub dependency_install: String,
    pub migrate_seed: String,
    pub storage_link: String,
    /// 최초 설정이 아닐 때 실행
    pub migrate: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            env_template: ".env.example".to_string(),
            env_file: ".env".to_string(),
            dependency_install: "composer update".to_string(),
            migrate_seed: "php artisan migrate --seed".to_string(),
            storage_link: "php artisan storage:link".to_string(),
            migrate: "php artisan migrate".to_string(),
        }
    }
}

/// 업데이터 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallerConfig {
    /// 프론트엔드 릴리스 레포지토리 소유자
    pub github_owner: String,
    pub github_repo: String,
    /// API 베이스 URL 오버라이드 (테스트용 로컬 서버 지원)
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// 백엔드 아카이브 URL (브랜치 아카이브, 릴리스 조회 없음)
    pub backend_url: String,
    /// 경로 목록 파일
    pub paths_file: PathBuf,
    /// 다운로드 임시 디렉터리 (None이면 OS 임시 디렉터리)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// php.ini에서 토글할 확장
    pub extension_name: String,
    pub show_command_window: bool,
    /// None이면 외부 명령을 무제한 대기
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    pub provisioning: ProvisioningConfig,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            github_owner: "ihec-iq".to_string(),
            github_repo: "msar-erp".to_string(),
            api_base_url: None,
            backend_url: "https://github.com/ihec-iq/msar-backend-11/archive/refs/heads/main.zip"
                .to_string(),
            paths_file: PathBuf::from("paths.txt"),
            scratch_dir: None,
            extension_name: "zip".to_string(),
            show_command_window: false,
            command_timeout_secs: None,
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl InstallerConfig {
    pub fn resolved_scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            visible: self.show_command_window,
            timeout: self.command_timeout_secs.map(std::time::Duration::from_secs),
        }
    }
}

// ══════════════════════════════════════════════════════
// 유틸리티
// ══════════════════════════════════════════════════════

/// 바이트 수를 사람이 읽기 쉬운 문자열로 (1024 단위, 소수 둘째 자리까지)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut order = 0;
    let mut len = bytes as f64;

    while len >= 1024.0 && order < UNITS.len() - 1 {
        order += 1;
        len /= 1024.0;
    }

    let rounded = format!("{:.2}", len);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[order])
}
