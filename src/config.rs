//! 업데이터 설정 파일 관리
//!
//! `config/updater.toml`에서 설정을 로드합니다. 없는 키는 기본값을 사용합니다.

use anyhow::Result;
use std::path::{Path, PathBuf};
use updater_erp_lib::InstallerConfig;

/// 설정 파일 경로 결정
pub fn config_file_path() -> PathBuf {
    // 1. 실행 파일 옆 config/updater.toml
    if let Some(dir) = exe_dir() {
        let cfg = dir.join("config").join("updater.toml");
        if cfg.exists() {
            return cfg;
        }
    }

    // 2. 기본: CWD의 config/updater.toml (생성용)
    PathBuf::from("config").join("updater.toml")
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// 기본 설정 (경로 파일은 실행 파일 옆 paths.txt)
pub fn default_config() -> InstallerConfig {
    let mut cfg = InstallerConfig::default();
    if let Some(dir) = exe_dir() {
        cfg.paths_file = dir.join("paths.txt");
    }
    cfg
}

/// TOML 파일에서 설정 로드 (없으면 기본값)
pub fn load_config() -> Result<InstallerConfig> {
    load_config_from(&config_file_path())
}

pub fn load_config_from(path: &Path) -> Result<InstallerConfig> {
    if !path.exists() {
        tracing::debug!("[Config] {} not found, using defaults", path.display());
        return Ok(default_config());
    }

    let content = std::fs::read_to_string(path)?;
    let parsed: toml::Value = content.parse()?;
    tracing::debug!("[Config] Loaded {}", path.display());
    Ok(parse_config(&parsed))
}

pub fn parse_config(val: &toml::Value) -> InstallerConfig {
    let mut cfg = default_config();
    if let Some(v) = val.get("github_owner").and_then(|v| v.as_str()) {
        cfg.github_owner = v.to_string();
    }
    if let Some(v) = val.get("github_repo").and_then(|v| v.as_str()) {
        cfg.github_repo = v.to_string();
    }
    if let Some(v) = val.get("api_base_url").and_then(|v| v.as_str()) {
        cfg.api_base_url = Some(v.to_string());
    }
    if let Some(v) = val.get("backend_url").and_then(|v| v.as_str()) {
        cfg.backend_url = v.to_string();
    }
    if let Some(v) = val.get("paths_file").and_then(|v| v.as_str()) {
        cfg.paths_file = PathBuf::from(v);
    }
    if let Some(v) = val.get("scratch_dir").and_then(|v| v.as_str()) {
        cfg.scratch_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = val.get("extension_name").and_then(|v| v.as_str()) {
        cfg.extension_name = v.to_string();
    }
    if let Some(v) = val.get("show_command_window").and_then(|v| v.as_bool()) {
        cfg.show_command_window = v;
    }
    if let Some(v) = val.get("command_timeout_secs").and_then(|v| v.as_integer()) {
        // 0 이하는 무제한
        cfg.command_timeout_secs = (v > 0).then_some(v as u64);
    }

    if let Some(p) = val.get("provisioning") {
        let steps = &mut cfg.provisioning;
        for (key, slot) in [
            ("env_template", &mut steps.env_template),
            ("env_file", &mut steps.env_file),
            ("dependency_install", &mut steps.dependency_install),
            ("migrate_seed", &mut steps.migrate_seed),
            ("storage_link", &mut steps.storage_link),
            ("migrate", &mut steps.migrate),
        ] {
            if let Some(v) = p.get(key).and_then(|v| v.as_str()) {
                *slot = v.to_string();
            }
        }
    }
    cfg
}

/// config set <key> <value>
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    set_config_value_in(&config_file_path(), key, value)
}

pub fn set_config_value_in(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut table: toml::value::Table = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        content
            .parse::<toml::Value>()?
            .as_table()
            .cloned()
            .unwrap_or_default()
    } else {
        toml::value::Table::new()
    };

    let toml_val: toml::Value = match key {
        "show_command_window" => {
            toml::Value::Boolean(value.parse::<bool>().map_err(|_| {
                anyhow::anyhow!("Invalid boolean value: '{}' (use true/false)", value)
            })?)
        }
        "command_timeout_secs" => {
            toml::Value::Integer(value.parse::<i64>().map_err(|_| {
                anyhow::anyhow!("Invalid integer value: '{}'", value)
            })?)
        }
        "github_owner" | "github_repo" | "api_base_url" | "backend_url" | "paths_file"
        | "scratch_dir" | "extension_name" => toml::Value::String(value.to_string()),
        _ => {
            anyhow::bail!(
                "Unknown config key: '{}'\nAvailable: {}",
                key,
                CONFIG_KEYS.join(", ")
            );
        }
    };

    table.insert(key.to_string(), toml_val);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(&toml::Value::Table(table))?;
    std::fs::write(path, content)?;

    Ok(())
}

/// `config set`으로 바꿀 수 있는 키
pub const CONFIG_KEYS: [&str; 9] = [
    "github_owner",
    "github_repo",
    "api_base_url",
    "backend_url",
    "paths_file",
    "scratch_dir",
    "extension_name",
    "show_command_window",
    "command_timeout_secs",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&tmp.path().join("updater.toml")).unwrap();
        assert_eq!(cfg.github_repo, "msar-erp");
        assert!(cfg.paths_file.ends_with("paths.txt"));
    }

    #[test]
    fn parses_top_level_and_provisioning_keys() {
        let parsed: toml::Value = r#"
            github_owner = "acme"
            api_base_url = "http://127.0.0.1:9876"
            command_timeout_secs = 600
            show_command_window = true

            [provisioning]
            dependency_install = "composer install --no-dev"
            migrate = "php artisan migrate --force"
        "#
        .parse()
        .unwrap();

        let cfg = parse_config(&parsed);
        assert_eq!(cfg.github_owner, "acme");
        assert_eq!(cfg.github_repo, "msar-erp");
        assert_eq!(cfg.api_base_url.as_deref(), Some("http://127.0.0.1:9876"));
        assert_eq!(cfg.command_timeout_secs, Some(600));
        assert!(cfg.show_command_window);
        assert_eq!(cfg.provisioning.dependency_install, "composer install --no-dev");
        assert_eq!(cfg.provisioning.migrate, "php artisan migrate --force");
        assert_eq!(cfg.provisioning.storage_link, "php artisan storage:link");
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let parsed: toml::Value = "command_timeout_secs = 0".parse().unwrap();
        assert_eq!(parse_config(&parsed).command_timeout_secs, None);
    }

    #[test]
    fn set_value_validates_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config").join("updater.toml");

        set_config_value_in(&path, "github_owner", "acme").unwrap();
        set_config_value_in(&path, "command_timeout_secs", "120").unwrap();
        assert!(set_config_value_in(&path, "show_command_window", "maybe").is_err());
        assert!(set_config_value_in(&path, "unknown_key", "x").is_err());

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.github_owner, "acme");
        assert_eq!(cfg.command_timeout_secs, Some(120));
    }
}
