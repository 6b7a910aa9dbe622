//! 업데이터 CLI
//!
//! ## 사용법
//! ```text
//! updater-erp install --front --back [--first-setup] [--enable-ext|--disable-ext]
//!                     [--front-path <dir>] [--back-path <dir>] [--php-ini <file>]
//! updater-erp resolve                            # 최신 프론트 릴리스 확인
//! updater-erp paths                              # 저장된 경로 표시
//! updater-erp php-ext <php.ini> <name> on|off    # 확장 토글만 실행
//! updater-erp config                             # 설정 표시
//! updater-erp config set <key> <value>           # 설정 변경
//! updater-erp help                               # 도움말
//! ```
//!
//! 경로 플래그를 생략하면 마지막 실행에서 저장된 경로를 사용합니다.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use updater_erp_lib::{
    format_bytes, set_extension_state, DownloadProgress, InstallPipeline, InstallRequest,
    PathStore, RunPhase, StatusSink, TargetKind, TargetOutcome,
};

use crate::config::{config_file_path, load_config, set_config_value, CONFIG_KEYS};

/// CLI 실행 (프로그램 이름을 제외한 인자)
pub fn run_cli(cli_args: Vec<String>) {
    // stdout은 사용자 출력 전용, 로그는 stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    rt.block_on(async move {
        if let Err(e) = run_cli_async(cli_args).await {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
    });
}

async fn run_cli_async(args: Vec<String>) -> anyhow::Result<()> {
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    if args_ref.is_empty() || matches!(args_ref[0], "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    if matches!(args_ref[0], "--version" | "-V") {
        println!("updater-erp {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match args_ref[0] {
        "install" => cmd_install(&args_ref[1..]).await,
        "resolve" => cmd_resolve().await,
        "paths" => cmd_paths(),
        "php-ext" => cmd_php_ext(&args_ref[1..]),
        "config" => cmd_config(&args_ref[1..]),
        other => {
            eprintln!("✗ Unknown command: {}", other);
            eprintln!("  Run 'updater-erp help' for usage.");
            std::process::exit(1);
        }
    }
}

// ═══════════════════════════════════════════════════════
// 인자 파싱
// ═══════════════════════════════════════════════════════

/// `install` 플래그
#[derive(Debug, Default, PartialEq, Eq)]
struct InstallArgs {
    front: bool,
    back: bool,
    first_setup: bool,
    enable_ext: bool,
    front_path: Option<String>,
    back_path: Option<String>,
    php_ini: Option<String>,
}

impl InstallArgs {
    fn parse(args: &[&str]) -> anyhow::Result<Self> {
        let mut parsed = InstallArgs {
            enable_ext: true,
            ..Default::default()
        };

        let mut iter = args.iter();
        while let Some(&arg) = iter.next() {
            match arg {
                "--front" => parsed.front = true,
                "--back" => parsed.back = true,
                "--first-setup" => parsed.first_setup = true,
                "--enable-ext" => parsed.enable_ext = true,
                "--disable-ext" => parsed.enable_ext = false,
                "--front-path" | "--back-path" | "--php-ini" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("{} requires a value", arg))?
                        .to_string();
                    match arg {
                        "--front-path" => parsed.front_path = Some(value),
                        "--back-path" => parsed.back_path = Some(value),
                        _ => parsed.php_ini = Some(value),
                    }
                }
                other => anyhow::bail!("Unknown install flag: {}", other),
            }
        }

        Ok(parsed)
    }

    /// 생략된 경로는 저장된 값으로 채운다
    fn into_request(self, store: &PathStore) -> InstallRequest {
        let stored = store.load_paths();
        InstallRequest {
            install_front: self.front,
            install_back: self.back,
            front_path: self.front_path.unwrap_or(stored.front),
            back_path: self.back_path.unwrap_or(stored.back),
            config_file_path: self.php_ini.unwrap_or(stored.config_file),
            first_time_setup: self.first_setup,
            enable_extension: self.enable_ext,
        }
    }
}

// ═══════════════════════════════════════════════════════
// 진행 표시
// ═══════════════════════════════════════════════════════

/// 터미널 출력용 sink (진행률은 stderr 한 줄을 다시 그림)
#[derive(Default)]
struct ConsoleSink {
    progress_line_open: AtomicBool,
}

impl ConsoleSink {
    fn close_progress_line(&self) {
        if self.progress_line_open.swap(false, Ordering::AcqRel) {
            eprintln!();
        }
    }
}

impl StatusSink for ConsoleSink {
    fn phase(&self, phase: RunPhase) {
        self.close_progress_line();
        match phase {
            RunPhase::Resolving => println!("⏳ Checking the latest release..."),
            RunPhase::Extracting(kind) => println!("⏳ Extracting {} files...", kind.display_name()),
            RunPhase::Provisioning(kind) => {
                println!("⏳ Provisioning {} installation...", kind.display_name())
            }
            _ => {}
        }
    }

    fn progress(&self, target: TargetKind, progress: DownloadProgress) {
        self.progress_line_open.store(true, Ordering::Release);
        let mut err = std::io::stderr().lock();
        let _ = write!(
            err,
            "\r  {:<5} [{:<25}] {:>3}%  {}/{}   ",
            target.display_name(),
            "#".repeat(progress.percent as usize / 4),
            progress.percent,
            format_bytes(progress.bytes_downloaded),
            format_bytes(progress.total_bytes)
        );
        let _ = err.flush();
    }

    fn message(&self, message: &str) {
        // 진행 중 메시지는 진행 줄이 대신 표시
        if message.starts_with("Downloading ") && message.contains('/') {
            return;
        }
        self.close_progress_line();
        println!("  {}", message);
    }
}

// ═══════════════════════════════════════════════════════
// 명령어 핸들러
// ═══════════════════════════════════════════════════════

async fn cmd_install(args: &[&str]) -> anyhow::Result<()> {
    let parsed = InstallArgs::parse(args)?;
    if !parsed.front && !parsed.back {
        println!("⚠ Nothing selected. Use --front and/or --back.");
    }

    let cfg = load_config()?;
    let pipeline = InstallPipeline::new(cfg)?;
    let request = parsed.into_request(pipeline.path_store());

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!();
                eprintln!("⚠ Cancelling...");
                cancel.cancel();
            }
        })
    };

    let sink = ConsoleSink::default();
    let result = pipeline.run(&request, &sink, &cancel).await;
    ctrl_c.abort();
    sink.close_progress_line();

    let report = result?;
    println!();
    for (kind, outcome) in [(TargetKind::Front, &report.front), (TargetKind::Back, &report.back)] {
        match outcome {
            TargetOutcome::Installed => println!("  ✓ {}: installed", kind.display_name()),
            TargetOutcome::Skipped => println!("  - {}: skipped", kind.display_name()),
            TargetOutcome::NothingToInstall(msg) => {
                println!("  ⚠ {}: {}", kind.display_name(), msg)
            }
        }
    }
    println!("✓ {}", report.message);
    Ok(())
}

async fn cmd_resolve() -> anyhow::Result<()> {
    let cfg = load_config()?;
    let pipeline = InstallPipeline::new(cfg)?;
    let artifact = pipeline.resolver().resolve_latest().await?;

    println!("📋 Latest Release");
    println!("─────────────────────────────────────────────");
    println!("  Repository: {}/{}", pipeline.config().github_owner, pipeline.config().github_repo);
    println!("  Version:    {}", artifact.display_name);
    match artifact.download_url {
        Some(url) => println!("  Archive:    {}", url),
        None => println!("  Archive:    (no .zip asset)"),
    }
    Ok(())
}

fn cmd_paths() -> anyhow::Result<()> {
    let cfg = load_config()?;
    let store = PathStore::new(cfg.paths_file);
    let stored = store.load_paths();

    let show = |v: &str| if v.is_empty() { "(not set)".to_string() } else { v.to_string() };
    println!("📋 Stored Paths");
    println!("─────────────────────────────────────────────");
    println!("  front:   {}", show(&stored.front));
    println!("  back:    {}", show(&stored.back));
    println!("  php.ini: {}", show(&stored.config_file));
    println!();
    println!("  File: {}", store.file().display());
    Ok(())
}

fn cmd_php_ext(args: &[&str]) -> anyhow::Result<()> {
    let (path, name, enable) = match args {
        [path, name, state] => {
            let enable = match *state {
                "on" | "enable" => true,
                "off" | "disable" => false,
                other => anyhow::bail!("Invalid state: '{}' (use on/off)", other),
            };
            (*path, *name, enable)
        }
        _ => {
            eprintln!("Usage: updater-erp php-ext <php.ini> <extension> on|off");
            std::process::exit(1);
        }
    };

    let outcome = set_extension_state(Path::new(path), name, enable);
    if outcome.is_failure() {
        anyhow::bail!("{}", outcome.message);
    }
    println!("✓ {}", outcome.message);
    Ok(())
}

fn cmd_config(args: &[&str]) -> anyhow::Result<()> {
    match args.first().copied() {
        Some("set") if args.len() >= 3 => {
            let key = args[1];
            let value = args[2..].join(" ");
            set_config_value(key, &value)?;
            println!("✓ {} = {}", key, value);
        }
        Some("set") => {
            eprintln!("Usage: updater-erp config set <key> <value>");
            eprintln!("Keys: {}", CONFIG_KEYS.join(", "));
        }
        Some("--json") => {
            let cfg = load_config()?;
            println!("{}", serde_json::to_string(&cfg)?);
        }
        _ => {
            let cfg = load_config()?;
            let steps = &cfg.provisioning;
            println!("📋 Updater Configuration");
            println!("─────────────────────────────────────────────");
            println!("  github_owner:         {}", cfg.github_owner);
            println!("  github_repo:          {}", cfg.github_repo);
            println!(
                "  api_base_url:         {}",
                cfg.api_base_url.as_deref().unwrap_or(updater_erp_lib::github::DEFAULT_API_BASE_URL)
            );
            println!("  backend_url:          {}", cfg.backend_url);
            println!("  paths_file:           {}", cfg.paths_file.display());
            println!("  scratch_dir:          {}", cfg.resolved_scratch_dir().display());
            println!("  extension_name:       {}", cfg.extension_name);
            println!("  show_command_window:  {}", cfg.show_command_window);
            println!(
                "  command_timeout_secs: {}",
                cfg.command_timeout_secs
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "(unbounded)".to_string())
            );
            println!();
            println!("  [provisioning]");
            println!("  env_template:         {}", steps.env_template);
            println!("  env_file:             {}", steps.env_file);
            println!("  dependency_install:   {}", steps.dependency_install);
            println!("  migrate_seed:         {}", steps.migrate_seed);
            println!("  storage_link:         {}", steps.storage_link);
            println!("  migrate:              {}", steps.migrate);
            println!();
            println!("  Config file: {}", config_file_path().display());
            println!();
            println!("  Change with: updater-erp config set <key> <value>");
        }
    }
    Ok(())
}

fn print_help() {
    println!("updater-erp — MSAR ERP Updater / Installer");
    println!();
    println!("USAGE:");
    println!("  updater-erp <command> [args...]");
    println!();
    println!("COMMANDS:");
    println!("  install [flags]                   Download and install front/back");
    println!("  resolve                           Show the latest front release");
    println!("  paths                             Show the stored paths");
    println!("  php-ext <php.ini> <name> on|off   Toggle a PHP extension");
    println!("  config                            Show updater configuration");
    println!("  config set <key> <value>          Change a config value");
    println!("  help                              This help message");
    println!();
    println!("INSTALL FLAGS:");
    println!("  --front                 Install the front end (latest release .zip)");
    println!("  --back                  Install the back end (branch archive)");
    println!("  --first-setup           Create .env, install dependencies, migrate + seed");
    println!("  --enable-ext            Enable the PHP extension before install (default)");
    println!("  --disable-ext           Disable the PHP extension before install");
    println!("  --front-path <dir>      Front install folder (default: stored)");
    println!("  --back-path <dir>       Back install folder (default: stored)");
    println!("  --php-ini <file>        php.ini to patch (default: stored)");
    println!();
    println!("EXAMPLES:");
    println!("  updater-erp install --front --front-path C:\\xampp\\htdocs\\msar");
    println!("  updater-erp install --back --first-setup --php-ini C:\\xampp\\php\\php.ini");
    println!("  updater-erp config set command_timeout_secs 900");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_flags_are_parsed() {
        let parsed = InstallArgs::parse(&[
            "--front",
            "--back",
            "--first-setup",
            "--disable-ext",
            "--back-path",
            "/srv/msar-api",
        ])
        .unwrap();

        assert!(parsed.front && parsed.back && parsed.first_setup);
        assert!(!parsed.enable_ext);
        assert_eq!(parsed.back_path.as_deref(), Some("/srv/msar-api"));
        assert_eq!(parsed.front_path, None);
    }

    #[test]
    fn extension_is_enabled_by_default() {
        assert!(InstallArgs::parse(&["--back"]).unwrap().enable_ext);
    }

    #[test]
    fn bad_install_flags_are_rejected() {
        assert!(InstallArgs::parse(&["--front-path"]).is_err());
        assert!(InstallArgs::parse(&["--everything"]).is_err());
    }

    #[test]
    fn omitted_paths_fall_back_to_stored_values() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PathStore::new(tmp.path().join("paths.txt"));
        store.save(&["/srv/front", "/srv/back", "/etc/php/php.ini"]).unwrap();

        let request = InstallArgs::parse(&["--front", "--front-path", "/opt/front"])
            .unwrap()
            .into_request(&store);

        assert_eq!(request.front_path, "/opt/front");
        assert_eq!(request.back_path, "/srv/back");
        assert_eq!(request.config_file_path, "/etc/php/php.ini");
        assert!(request.install_front && !request.install_back);
    }
}
