//! 파이프라인 시나리오 테스트 (네트워크 없이 실행 가능한 흐름)
//!
//! ## 테스트 시나리오
//! 1. 입력 검증: 경로 누락 시 아무것도 저장/다운로드하지 않음
//! 2. 경로 저장: 네트워크 실패 전에 경로가 먼저 저장됨
//! 3. php.ini 하드 실패: 다운로드 전에 백엔드 처리 중단
//! 4. 바이트 포맷

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::{
    format_bytes, DownloadProgress, InstallPipeline, InstallRequest, InstallerConfig,
    PathStore, RunPhase, StatusSink, TargetKind, TargetOutcome,
};

/// 받은 이벤트를 모두 기록하는 sink
#[derive(Default)]
struct RecordingSink {
    phases: Mutex<Vec<RunPhase>>,
    messages: Mutex<Vec<String>>,
}

impl StatusSink for RecordingSink {
    fn phase(&self, phase: RunPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn progress(&self, _target: TargetKind, _progress: DownloadProgress) {}

    fn message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// 닫힌 포트를 API/백엔드 주소로 쓰는 설정
fn offline_config(dir: &std::path::Path) -> InstallerConfig {
    InstallerConfig {
        api_base_url: Some("http://127.0.0.1:9".to_string()),
        backend_url: "http://127.0.0.1:9/back.zip".to_string(),
        paths_file: dir.join("paths.txt"),
        scratch_dir: Some(dir.join("scratch")),
        ..InstallerConfig::default()
    }
}

// ═══════════════════════════════════════════════════════
// 1. 입력 검증
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn missing_destination_fails_before_saving_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = InstallPipeline::new(offline_config(tmp.path())).unwrap();
    let sink = RecordingSink::default();

    let request = InstallRequest {
        install_back: true,
        back_path: String::new(),
        ..Default::default()
    };

    let err = pipeline
        .run(&request, &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    assert_eq!(err.to_string(), "Please enter the backend folder path.");
    assert!(!tmp.path().join("paths.txt").exists());
    assert_eq!(*sink.phases.lock().unwrap(), vec![RunPhase::Failed]);
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn nothing_enabled_completes_and_saves_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = InstallPipeline::new(offline_config(tmp.path())).unwrap();
    let sink = RecordingSink::default();

    let request = InstallRequest {
        front_path: "C:\\xampp\\htdocs\\msar".into(),
        back_path: "C:\\xampp\\htdocs\\msar-api".into(),
        ..Default::default()
    };

    let report = pipeline
        .run(&request, &sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.front, TargetOutcome::Skipped);
    assert_eq!(report.back, TargetOutcome::Skipped);
    assert_eq!(report.message, "Download and migration completed successfully!");

    let stored = PathStore::new(tmp.path().join("paths.txt")).load();
    assert_eq!(
        stored,
        vec![
            "C:\\xampp\\htdocs\\msar".to_string(),
            "C:\\xampp\\htdocs\\msar-api".to_string(),
            String::new(),
        ]
    );
}

// ═══════════════════════════════════════════════════════
// 2. 네트워크 실패
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn paths_are_saved_even_when_resolution_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = InstallPipeline::new(offline_config(tmp.path())).unwrap();
    let sink = RecordingSink::default();
    let front_dir = tmp.path().join("front");

    let request = InstallRequest {
        install_front: true,
        front_path: front_dir.to_string_lossy().to_string(),
        config_file_path: "C:\\php\\php.ini".into(),
        ..Default::default()
    };

    let err = pipeline
        .run(&request, &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "NETWORK_ERROR");
    assert!(err.is_recoverable());

    let stored = PathStore::new(tmp.path().join("paths.txt")).load_paths();
    assert_eq!(stored.front, front_dir.to_string_lossy());
    assert_eq!(stored.config_file, "C:\\php\\php.ini");

    let phases = sink.phases.lock().unwrap();
    assert_eq!(*phases, vec![RunPhase::Resolving, RunPhase::Failed]);
    assert!(!front_dir.exists());
}

#[tokio::test]
async fn cancelled_run_stops_before_resolving() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = InstallPipeline::new(offline_config(tmp.path())).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = InstallRequest {
        install_front: true,
        front_path: tmp.path().join("front").to_string_lossy().to_string(),
        ..Default::default()
    };

    let err = pipeline
        .run(&request, &RecordingSink::default(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CANCELLED");
}

// ═══════════════════════════════════════════════════════
// 3. php.ini
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn missing_php_ini_halts_backend_before_download() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = InstallPipeline::new(offline_config(tmp.path())).unwrap();
    let sink = RecordingSink::default();

    let request = InstallRequest {
        install_back: true,
        back_path: tmp.path().join("back").to_string_lossy().to_string(),
        config_file_path: tmp.path().join("php.ini").to_string_lossy().to_string(),
        enable_extension: true,
        ..Default::default()
    };

    let err = pipeline
        .run(&request, &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "CONFIG_ERROR");
    assert!(err.to_string().contains("Failed to update the zip extension"));
    assert!(!sink
        .phases
        .lock()
        .unwrap()
        .contains(&RunPhase::Downloading(TargetKind::Back)));
}

#[tokio::test]
async fn already_enabled_extension_does_not_halt() {
    let tmp = tempfile::tempdir().unwrap();
    let ini = tmp.path().join("php.ini");
    std::fs::write(&ini, "extension=zip\n").unwrap();

    let pipeline = InstallPipeline::new(offline_config(tmp.path())).unwrap();
    let sink = RecordingSink::default();

    let request = InstallRequest {
        install_back: true,
        back_path: tmp.path().join("back").to_string_lossy().to_string(),
        config_file_path: ini.to_string_lossy().to_string(),
        enable_extension: true,
        ..Default::default()
    };

    // php.ini는 통과하고 (닫힌 포트) 다운로드에서 실패해야 함
    let err = pipeline
        .run(&request, &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "NETWORK_ERROR");
    assert!(sink
        .messages
        .lock()
        .unwrap()
        .iter()
        .any(|m| m.contains("already enabled")));
    assert!(sink
        .phases
        .lock()
        .unwrap()
        .contains(&RunPhase::Downloading(TargetKind::Back)));
}

// ═══════════════════════════════════════════════════════
// 4. 바이트 포맷
// ═══════════════════════════════════════════════════════

#[test]
fn format_bytes_units() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(512), "512 B");
    assert_eq!(format_bytes(1024), "1 KB");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
    assert_eq!(format_bytes(1_288_490_189), "1.2 GB");
}

#[test]
fn config_defaults_match_reference_setup() {
    let cfg = InstallerConfig::default();
    assert_eq!(cfg.github_owner, "ihec-iq");
    assert_eq!(cfg.github_repo, "msar-erp");
    assert_eq!(cfg.extension_name, "zip");
    assert_eq!(cfg.provisioning.migrate, "php artisan migrate");
    assert!(cfg.run_options().timeout.is_none());
    assert_eq!(TargetKind::Front.scratch_file_name(), "front.zip");
}
