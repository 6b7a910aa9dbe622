//! 마지막으로 사용한 설치 경로 저장소
//!
//! 한 줄에 값 하나, 위치로 의미가 정해지는 평문 파일입니다:
//! `[front 경로, back 경로, php.ini 경로]`. 저장은 항상 전체 덮어쓰기입니다.

use std::path::{Path, PathBuf};

use crate::error::{InstallerError, Result};

/// 경로 목록 파일
#[derive(Debug, Clone)]
pub struct PathStore {
    file: PathBuf,
}

impl PathStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// 저장된 값 목록. 파일이 없거나 읽지 못하면 빈 목록
    pub fn load(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.file) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("[Paths] Failed to read {}: {}", self.file.display(), e);
                Vec::new()
            }
        }
    }

    /// 값 목록 전체를 덮어써서 저장 (이전 값과 병합하지 않음)
    pub fn save<S: AsRef<str>>(&self, values: &[S]) -> Result<()> {
        let mut content = String::new();
        for value in values {
            content.push_str(value.as_ref());
            content.push('\n');
        }

        if let Some(parent) = self.file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| InstallerError::from_io(&e, "create paths dir", parent))?;
        }
        std::fs::write(&self.file, content)
            .map_err(|e| InstallerError::from_io(&e, "save paths", &self.file))?;

        tracing::debug!("[Paths] Saved {} value(s) to {}", values.len(), self.file.display());
        Ok(())
    }

    pub fn load_paths(&self) -> PersistedPaths {
        PersistedPaths::from_values(&self.load())
    }

    pub fn save_paths(&self, paths: &PersistedPaths) -> Result<()> {
        self.save(&paths.to_values())
    }
}

/// 위치 기반 경로 목록의 타입 뷰 (이전 버전 파일은 세 번째 값이 없을 수 있음)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedPaths {
    pub front: String,
    pub back: String,
    pub config_file: String,
}

impl PersistedPaths {
    pub fn from_values(values: &[String]) -> Self {
        let at = |i: usize| values.get(i).cloned().unwrap_or_default();
        Self {
            front: at(0),
            back: at(1),
            config_file: at(2),
        }
    }

    /// 항상 세 칸을 채워서 저장 (빈 칸은 빈 문자열)
    pub fn to_values(&self) -> [String; 3] {
        [
            self.front.clone(),
            self.back.clone(),
            self.config_file.clone(),
        ]
    }
}
