//! GitHub Release API 클라이언트
//!
//! 최신 릴리스를 조회하고, 에셋 목록에서 설치할 `.zip` 아카이브를 고릅니다.

use serde::Deserialize;

use crate::error::{InstallerError, Result};

/// 기본 API 베이스 URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// 설치 대상으로 인정하는 에셋 확장자
const ARCHIVE_EXTENSION: &str = ".zip";

/// GitHub Release 응답 (필요한 필드만)
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    #[serde(default)]
    pub tag_name: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// GitHub Release Asset
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: Option<String>,
}

/// 최신 릴리스에서 결정된 설치 아티팩트
///
/// `download_url`이 `None`이면 설치할 아카이브가 없다는 뜻이며 에러가 아님.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseArtifact {
    pub display_name: String,
    pub download_url: Option<String>,
}

impl GitHubRelease {
    /// 표시용 이름: `name`이 비어 있으면 `tag_name`
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.tag_name.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    /// 에셋 목록 순서대로 첫 번째 `.zip` 에셋을 골라 아티팩트로 변환
    pub fn to_artifact(&self) -> ReleaseArtifact {
        let download_url = self
            .assets
            .iter()
            .find(|a| a.name.ends_with(ARCHIVE_EXTENSION))
            .and_then(|a| a.browser_download_url.clone());

        ReleaseArtifact {
            display_name: self.display_name(),
            download_url,
        }
    }
}

/// 응답 본문 문자열을 아티팩트로 파싱
pub fn parse_latest_release(body: &str) -> Result<ReleaseArtifact> {
    let release: GitHubRelease =
        serde_json::from_str(body).map_err(|e| InstallerError::Parse(e.to_string()))?;
    Ok(release.to_artifact())
}

/// GitHub API 클라이언트
pub struct GitHubClient {
    owner: String,
    repo: String,
    http: reqwest::Client,
    /// API 베이스 URL (기본: "https://api.github.com")
    /// 로컬 mock 서버 테스트 시 "http://127.0.0.1:9876" 등으로 오버라이드
    base_url: String,
}

impl GitHubClient {
    pub fn new(owner: &str, repo: &str) -> Result<Self> {
        Self::with_base_url(owner, repo, None)
    }

    /// base_url을 오버라이드할 수 있는 생성자 (테스트/mock 서버용)
    pub fn with_base_url(owner: &str, repo: &str, base_url: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("UpdaterERP/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| InstallerError::from_reqwest(&e, "create HTTP client"))?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            http,
            base_url: base_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.base_url, self.owner, self.repo
        )
    }

    /// 최신 릴리스 조회 → 첫 번째 `.zip` 에셋
    pub async fn resolve_latest(&self) -> Result<ReleaseArtifact> {
        let url = self.latest_release_url();
        tracing::info!("[Resolver] Fetching latest release: {}", url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| InstallerError::from_reqwest(&e, "fetch latest release"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InstallerError::Network {
                operation: "fetch latest release".to_string(),
                message: format!("GitHub API error ({}): {}", status, body.trim()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| InstallerError::from_reqwest(&e, "read release body"))?;

        let artifact = parse_latest_release(&body)?;
        match artifact.download_url {
            Some(ref url) => tracing::info!(
                "[Resolver] {} → {}",
                artifact.display_name, url
            ),
            None => tracing::warn!(
                "[Resolver] {} has no {} asset",
                artifact.display_name, ARCHIVE_EXTENSION
            ),
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_zip_asset() {
        let json = r#"{
            "tag_name": "v2.0.0",
            "name": "MSAR ERP 2.0",
            "assets": [
                { "name": "app.txt", "browser_download_url": "https://x/app.txt" },
                { "name": "app-v2.zip", "browser_download_url": "https://x/y.zip" },
                { "name": "app-v2-debug.zip", "browser_download_url": "https://x/z.zip" }
            ]
        }"#;

        let artifact = parse_latest_release(json).unwrap();
        assert_eq!(artifact.display_name, "MSAR ERP 2.0");
        assert_eq!(artifact.download_url.as_deref(), Some("https://x/y.zip"));
    }

    #[test]
    fn no_zip_asset_is_not_an_error() {
        let json = r#"{
            "name": "notes only",
            "assets": [ { "name": "CHANGELOG.md", "browser_download_url": "https://x/c.md" } ]
        }"#;

        let artifact = parse_latest_release(json).unwrap();
        assert_eq!(artifact.download_url, None);
        assert_eq!(artifact.display_name, "notes only");
    }

    #[test]
    fn display_name_falls_back_to_tag() {
        let json = r#"{ "tag_name": "v1.4.2", "name": null, "assets": [] }"#;
        let artifact = parse_latest_release(json).unwrap();
        assert_eq!(artifact.display_name, "v1.4.2");
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let err = parse_latest_release("<html>rate limited</html>").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn base_url_override_is_trimmed() {
        let client =
            GitHubClient::with_base_url("ihec-iq", "msar-erp", Some("http://127.0.0.1:9876/"))
                .unwrap();
        assert_eq!(
            client.latest_release_url(),
            "http://127.0.0.1:9876/repos/ihec-iq/msar-erp/releases/latest"
        );

        let client = GitHubClient::with_base_url("o", "r", Some("  ")).unwrap();
        assert_eq!(
            client.latest_release_url(),
            "https://api.github.com/repos/o/r/releases/latest"
        );
    }
}
