//! 에러 분류 및 변환
//!
//! ## 지원하는 에러 상황
//! - 릴리스 조회/다운로드 중 네트워크 오류, 응답 파싱 실패
//! - 아카이브/설정 파일 누락, 경로 탈출(zip-slip) 엔트리
//! - 파일 시스템 쓰기 실패
//! - 외부 명령 실행 실패 (실행 불가, 비정상 종료, 타임아웃)

use std::path::Path;

/// 설치 파이프라인 에러 타입
#[derive(thiserror::Error, Debug)]
pub enum InstallerError {
    /// 릴리스 조회/다운로드 전송 실패 또는 비정상 HTTP 상태
    #[error("Network error during {operation}: {message}")]
    Network { operation: String, message: String },

    /// 응답 본문 파싱 실패
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// 아카이브/설정 파일 등 필수 파일 누락
    #[error("File not found: {0}")]
    NotFound(String),

    /// 대상 디렉터리 밖을 가리키는 아카이브 엔트리
    #[error("Unsafe archive entry '{entry}': {reason}")]
    UnsafePath { entry: String, reason: String },

    /// 파일 시스템 오류
    #[error("File system error during {operation} on '{path}': {message}")]
    Io {
        operation: String,
        path: String,
        message: String,
    },

    /// 외부 프로세스를 시작하지 못함
    #[error("Error running command: {0}")]
    Process(String),

    /// 외부 프로세스가 실패 코드로 종료됨
    #[error("Command '{command}' exited with code {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// 외부 프로세스 대기 시간 초과 (프로세스는 강제 종료됨)
    #[error("Command '{command}' timed out after {duration_secs}s")]
    Timeout { command: String, duration_secs: u64 },

    /// php.ini 형식 아님 / 확장 수정 불가
    #[error("Configuration error: {0}")]
    Config(String),

    /// 입력값 검증 실패
    #[error("{0}")]
    Validation(String),

    /// 취소 토큰에 의해 중단됨
    #[error("Operation cancelled during {0}")]
    Cancelled(String),

    /// 이미 실행 중인 설치가 있음
    #[error("An installation is already running")]
    AlreadyRunning,

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, InstallerError>;

impl InstallerError {
    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "NETWORK_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnsafePath { .. } => "UNSAFE_PATH",
            Self::Io { .. } => "IO_ERROR",
            Self::Process(_) => "PROCESS_ERROR",
            Self::CommandFailed { .. } => "COMMAND_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Cancelled(_) => "CANCELLED",
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 사용자가 수동으로 다시 시도할 가치가 있는 에러인지 확인
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::Cancelled(_)
                | Self::AlreadyRunning
                | Self::CommandFailed { .. }
        )
    }

    /// reqwest 에러를 InstallerError로 변환
    pub fn from_reqwest(err: &reqwest::Error, operation: &str) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else if let Some(status) = err.status() {
            format!("HTTP {}", status)
        } else {
            err.to_string()
        };
        Self::Network {
            operation: operation.to_string(),
            message,
        }
    }

    /// IO 에러를 InstallerError로 변환 (NotFound는 별도 분류)
    pub fn from_io(err: &std::io::Error, operation: &str, path: &Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path.display().to_string());
        }
        Self::Io {
            operation: operation.to_string(),
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
