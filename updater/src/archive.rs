//! 아카이브 설치
//!
//! zip 아카이브의 최상위 폴더를 벗겨낸 뒤 대상 디렉터리에 덮어쓰기로 풀고,
//! 끝나면 아카이브 파일을 삭제합니다.
//!
//! 모든 엔트리 경로를 먼저 검사하고 나서 쓰기를 시작하므로, 경로 탈출 엔트리가
//! 하나라도 있으면 대상 디렉터리에는 아무것도 기록되지 않습니다. 대상 트리 안에
//! 이미 있는 심볼릭 링크(디렉터리든 파일이든)를 지나는 엔트리도 거부합니다.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use crate::error::{InstallerError, Result};

/// 쓰기 전에 검증이 끝난 엔트리
struct PlannedEntry {
    index: usize,
    relative: PathBuf,
}

/// zip 아카이브 설치기
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveInstaller;

impl ArchiveInstaller {
    pub fn new() -> Self {
        Self
    }

    /// `archive_path`를 `destination`에 풀고 아카이브를 삭제
    ///
    /// 블로킹 I/O이므로 async 컨텍스트에서는 `spawn_blocking`으로 호출한다.
    pub fn install(&self, archive_path: &Path, destination: &Path) -> Result<()> {
        if !archive_path.is_file() {
            return Err(InstallerError::NotFound(archive_path.display().to_string()));
        }

        std::fs::create_dir_all(destination)
            .map_err(|e| InstallerError::from_io(&e, "create destination", destination))?;
        let canonical_dest = destination
            .canonicalize()
            .map_err(|e| InstallerError::from_io(&e, "resolve destination", destination))?;

        tracing::info!(
            "[Archive] Extracting {} → {}",
            archive_path.display(),
            canonical_dest.display()
        );

        let file = File::open(archive_path)
            .map_err(|e| InstallerError::from_io(&e, "open archive", archive_path))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| InstallerError::Io {
            operation: "read archive".to_string(),
            path: archive_path.display().to_string(),
            message: e.to_string(),
        })?;

        let plan = plan_entries(&mut archive, &canonical_dest)?;

        for entry in &plan {
            let out_path = canonical_dest.join(&entry.relative);
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InstallerError::from_io(&e, "create directory", parent))?;
            }

            let mut zip_entry = archive.by_index(entry.index).map_err(|e| InstallerError::Io {
                operation: "read archive entry".to_string(),
                path: entry.relative.display().to_string(),
                message: e.to_string(),
            })?;
            let mut outfile = File::create(&out_path)
                .map_err(|e| InstallerError::from_io(&e, "create file", &out_path))?;
            std::io::copy(&mut zip_entry, &mut outfile)
                .map_err(|e| InstallerError::from_io(&e, "write file", &out_path))?;
        }

        tracing::info!("[Archive] Extracted {} file(s)", plan.len());

        // 설치된 트리는 이미 올바르므로 삭제 실패는 로그만 남긴다
        if let Err(e) = std::fs::remove_file(archive_path) {
            tracing::warn!(
                "[Archive] Failed to delete {}: {}",
                archive_path.display(),
                e
            );
        }

        Ok(())
    }
}

/// 모든 파일 엔트리의 상대 경로를 계산하고 검증
fn plan_entries<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    canonical_dest: &Path,
) -> Result<Vec<PlannedEntry>> {
    let mut plan = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| InstallerError::Io {
            operation: "read archive entry".to_string(),
            path: format!("#{}", index),
            message: e.to_string(),
        })?;

        let name = entry.name().to_string();
        if entry.is_dir() || name.ends_with('/') || name.ends_with('\\') {
            continue;
        }

        let relative = strip_top_level(&name)?;
        ensure_no_links(canonical_dest, &relative, &name)?;
        plan.push(PlannedEntry { index, relative });
    }

    Ok(plan)
}

/// 첫 번째 경로 세그먼트(아카이브의 최상위 폴더)를 제거한 상대 경로
///
/// 남은 경로가 비었거나 `.`/`..`/루트/드라이브 세그먼트를 포함하면 거부한다.
pub fn strip_top_level(entry_name: &str) -> Result<PathBuf> {
    let segments: Vec<&str> = entry_name
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect();

    let rest = segments.get(1..).unwrap_or_default();
    if rest.is_empty() {
        return Err(unsafe_entry(entry_name, "no path left after the top-level folder"));
    }

    let mut relative = PathBuf::new();
    for segment in rest {
        if *segment == "." || *segment == ".." {
            return Err(unsafe_entry(entry_name, "relative directory segment"));
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => relative.push(segment),
            _ => return Err(unsafe_entry(entry_name, "segment is not a plain name")),
        }
    }

    Ok(relative)
}

/// 대상 트리 안에 이미 있는 경로 구성요소를 따라가며 심볼릭 링크가 없는지 확인
///
/// 존재하지 않는 구성요소부터는 압축 해제가 새로 만들기 때문에 검사를 멈춘다.
fn ensure_no_links(canonical_dest: &Path, relative: &Path, entry_name: &str) -> Result<()> {
    let mut current = canonical_dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(unsafe_entry(entry_name, "path goes through a symbolic link"));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(InstallerError::from_io(&e, "inspect path", &current)),
        }
    }
    Ok(())
}

fn unsafe_entry(entry: &str, reason: &str) -> InstallerError {
    InstallerError::UnsafePath {
        entry: entry.to_string(),
        reason: reason.to_string(),
    }
}
