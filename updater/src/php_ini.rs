//! php.ini 확장 토글
//!
//! `extension=<name>` / `extension=php_<name>.dll` 줄을 찾아 주석(`;`)을 붙이거나
//! 떼고, 없으면 끝에 추가합니다. 구조화된 ini 파서가 아니라 줄 단위 텍스트 패치이며,
//! 건드리지 않은 줄과 줄 순서는 그대로 유지됩니다. UTF-8이 아닌 줄도 바이트
//! 그대로 다시 씁니다.
//!
//! 실패는 에러 대신 [`PatchOutcome`]으로 돌려줍니다. 호출 측은 `status`를 보고
//! 중단 여부를 결정합니다.

use std::path::Path;

use regex::{Regex, RegexBuilder};

/// 패치 대상 파일명
pub const PHP_INI_FILE_NAME: &str = "php.ini";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    /// 파일을 수정함
    Modified,
    /// 이미 원하는 상태라 수정하지 않음
    AlreadyInState,
    /// 파일이 없음
    NotFound,
    /// php.ini가 아니거나 읽기/쓰기 실패
    NotModifiable,
}

/// 패치 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub changed: bool,
    pub status: PatchStatus,
    pub message: String,
}

impl PatchOutcome {
    fn new(status: PatchStatus, message: String) -> Self {
        Self {
            changed: status == PatchStatus::Modified,
            status,
            message,
        }
    }

    /// 호출 측이 하드 실패로 취급해야 하는 상태인지
    pub fn is_failure(&self) -> bool {
        matches!(self.status, PatchStatus::NotFound | PatchStatus::NotModifiable)
    }
}

/// `extension=<name>` 또는 `extension=php_<name>.dll`에 매칭 (대소문자 무시, 주석 허용)
fn directive_pattern(extension: &str) -> Regex {
    let name = regex::escape(extension);
    RegexBuilder::new(&format!(
        r"^(;+)?\s*extension\s*=\s*(?:{name}|php_{name}\.dll)\s*$"
    ))
    .case_insensitive(true)
    .build()
    .expect("escaped extension pattern is valid")
}

/// 줄 목록에 토글을 적용하고 변경 여부를 반환
///
/// 매칭되는 줄은 위에서 아래로 모두 갱신한다.
pub fn apply_to_lines(lines: &mut Vec<String>, extension: &str, enable: bool) -> bool {
    if extension.trim().is_empty() {
        return false;
    }
    let pattern = directive_pattern(extension);
    let mut found = false;
    let mut changed = false;

    for line in lines.iter_mut() {
        let trimmed = line.trim();
        let Some(caps) = pattern.captures(trimmed) else {
            continue;
        };
        found = true;
        let commented = caps.get(1).is_some();

        if enable && commented {
            *line = trimmed.trim_start_matches(';').trim().to_string();
            changed = true;
        } else if !enable && !commented {
            *line = format!(";{}", trimmed);
            changed = true;
        }
    }

    if !found && enable {
        lines.push(format!("extension={}", extension));
        changed = true;
    }

    changed
}

/// `path`의 php.ini에서 `extension` 확장을 켜거나 끔
pub fn set_extension_state(path: &Path, extension: &str, enable: bool) -> PatchOutcome {
    let action = if enable { "enabled" } else { "disabled" };

    if extension.trim().is_empty() {
        return PatchOutcome::new(
            PatchStatus::NotModifiable,
            "Extension name must not be empty".to_string(),
        );
    }

    if !path.is_file() {
        return PatchOutcome::new(
            PatchStatus::NotFound,
            format!("php.ini not found at '{}'", path.display()),
        );
    }

    let is_php_ini = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.eq_ignore_ascii_case(PHP_INI_FILE_NAME))
        .unwrap_or(false);
    if !is_php_ini {
        return PatchOutcome::new(
            PatchStatus::NotModifiable,
            format!("'{}' is not a {} file", path.display(), PHP_INI_FILE_NAME),
        );
    }

    let raw = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) => {
            return PatchOutcome::new(
                PatchStatus::NotModifiable,
                format!("Failed to read '{}': {}", path.display(), e),
            );
        }
    };

    let newline: &[u8] = if raw.windows(2).any(|w| w == b"\r\n") { b"\r\n" } else { b"\n" };
    let raw_lines = split_lines(&raw);
    let original: Vec<String> = raw_lines
        .iter()
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .collect();
    let mut lines = original.clone();

    if !apply_to_lines(&mut lines, extension, enable) {
        tracing::debug!("[PhpIni] {} already {}", extension, action);
        return PatchOutcome::new(
            PatchStatus::AlreadyInState,
            format!("Extension '{}' is already {}.", extension, action),
        );
    }

    // 바뀌지 않은 줄은 원본 바이트를 그대로 쓴다
    let mut output = Vec::with_capacity(raw.len() + 32);
    for (i, line) in lines.iter().enumerate() {
        match (raw_lines.get(i), original.get(i)) {
            (Some(raw_line), Some(before)) if before == line => output.extend_from_slice(raw_line),
            _ => output.extend_from_slice(line.as_bytes()),
        }
        output.extend_from_slice(newline);
    }

    if let Err(e) = std::fs::write(path, output) {
        return PatchOutcome::new(
            PatchStatus::NotModifiable,
            format!("Failed to write '{}': {}", path.display(), e),
        );
    }

    tracing::info!("[PhpIni] Extension '{}' {} in {}", extension, action, path.display());
    PatchOutcome::new(
        PatchStatus::Modified,
        format!("Extension '{}' {} successfully.", extension, action),
    )
}

/// `str::lines`와 같은 규칙으로 바이트를 줄 단위로 나눔 (`\n`, `\r\n`)
fn split_lines(raw: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = raw
        .split(|b| *b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .collect();
    if raw.is_empty() || raw.ends_with(b"\n") {
        lines.pop();
    }
    lines
}
