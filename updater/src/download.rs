//! 스트리밍 다운로드
//!
//! 응답 헤더를 먼저 받아 `Content-Length`를 확인한 뒤, 본문을 청크 단위로
//! 스크래치 디렉터리의 고정 파일명에 기록합니다. 같은 파일명으로 다시 받으면
//! 이전 실행에서 남은 파일을 그대로 덮어씁니다.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{InstallerError, Result};

/// 다운로드 진행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// 0..=100
    pub percent: u8,
    pub bytes_downloaded: u64,
    /// 알 수 없으면 0
    pub total_bytes: u64,
}

impl DownloadProgress {
    /// `total_bytes`가 0이면 진행률을 계산할 수 없으므로 `None`
    pub fn compute(bytes_downloaded: u64, total_bytes: u64) -> Option<Self> {
        if total_bytes == 0 {
            return None;
        }
        let percent = (bytes_downloaded.saturating_mul(100) / total_bytes).min(100) as u8;
        Some(Self {
            percent,
            bytes_downloaded,
            total_bytes,
        })
    }
}

/// URL → 로컬 임시 파일 다운로더
pub struct Downloader {
    http: reqwest::Client,
    scratch_dir: PathBuf,
}

impl Downloader {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        // 큰 아카이브도 받아야 하므로 전체 타임아웃 대신 연결 타임아웃만 둔다
        let http = reqwest::Client::builder()
            .user_agent(concat!("UpdaterERP/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| InstallerError::from_reqwest(&e, "create HTTP client"))?;

        Ok(Self {
            http,
            scratch_dir: scratch_dir.into(),
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// 다운로드 대상 경로 (스크래치 디렉터리 + 파일명, 항상 동일)
    pub fn destination_for(&self, file_name: &str) -> PathBuf {
        self.scratch_dir.join(file_name)
    }

    /// `url`을 `<scratch_dir>/<file_name>`으로 받아 경로를 반환
    ///
    /// 청크마다 `on_progress`를 호출하며, 총 크기를 모르면 호출하지 않는다.
    /// 청크를 기다리기 전에 `cancel`을 확인한다.
    pub async fn download<F>(
        &self,
        url: &str,
        file_name: &str,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(DownloadProgress),
    {
        let dest = self.destination_for(file_name);
        tracing::info!("[Download] {} → {}", url, dest.display());

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(InstallerError::Cancelled(format!("download of {}", file_name)));
            }
            res = self.http.get(url).send() => {
                res.map_err(|e| InstallerError::from_reqwest(&e, "download request"))?
            }
        };

        if !response.status().is_success() {
            return Err(InstallerError::Network {
                operation: "download request".to_string(),
                message: format!("{} returned {}", url, response.status()),
            });
        }

        let total_bytes = response.content_length().unwrap_or(0);
        if total_bytes == 0 {
            tracing::debug!("[Download] No Content-Length, progress will not be reported");
        }

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| InstallerError::from_io(&e, "create scratch dir", &self.scratch_dir))?;

        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| InstallerError::from_io(&e, "create download file", &dest))?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(InstallerError::Cancelled(format!("download of {}", file_name)));
            }

            let chunk = match stream.next().await {
                Some(chunk) => {
                    chunk.map_err(|e| InstallerError::from_reqwest(&e, "read download chunk"))?
                }
                None => break,
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| InstallerError::from_io(&e, "write download file", &dest))?;
            downloaded = downloaded.saturating_add(chunk.len() as u64);

            if let Some(progress) = DownloadProgress::compute(downloaded, total_bytes) {
                on_progress(progress);
            }
        }

        file.flush()
            .await
            .map_err(|e| InstallerError::from_io(&e, "flush download file", &dest))?;

        tracing::info!(
            "[Download] Downloaded {} ({} bytes)",
            file_name, downloaded
        );
        Ok(dest)
    }
}
