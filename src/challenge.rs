//! 挑戰提供者能力介面與 HTTP-01 實作。
//!
//! 會話在建構時選定一個提供者；提供者只依賴它實際需要的協作者
//! （網站根目錄配置、檔案權限、HTTP 客戶端），不回引會話本身。

use std::os::unix::fs::DirBuilderExt;
use std::{
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::ClientConfig,
    http::{HttpClient, HttpError},
    jwk::{Jwk, JwkError},
};

/// HTTP-01 的挑戰類型字串。
pub const HTTP01: &str = "http-01";

/// 挑戰檔案的公開路徑前綴（URL 與本地佈局共用）。
const WELL_KNOWN_PATH: &str = ".well-known/acme-challenge";

/// 本地自檢使用的檔案名稱與內容。
const SELF_CHECK_FILE: &str = "local_check.txt";
const SELF_CHECK_BODY: &str = "OK";

/// 定義與挑戰流程相關的錯誤類型，一律攜帶所屬域名。
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("Challenge request for {domain} failed: {source}")]
    Request {
        domain: String,
        #[source]
        source: HttpError,
    },
    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Self-check for {domain} failed: {detail}")]
    SelfCheckFailed { domain: String, detail: String },
    #[error("Token for {domain} not served correctly at {url}")]
    TokenMismatch { domain: String, url: String },
    #[error("JWK error: {0}")]
    Jwk(#[from] JwkError),
}

type Result<T> = std::result::Result<T, ChallengeError>;

/// CA 在授權物件中提供的單個挑戰記錄。
#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    /// 挑戰類型，例如 `"http-01"`。
    #[serde(rename = "type")]
    pub kind: String,
    /// 應答此挑戰時要 POST 的 URL。
    pub uri: String,
    /// 挑戰 token，用於生成 key authorization。
    pub token: String,
    /// 伺服器端的挑戰狀態。
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct AuthorizationBody {
    challenges: Vec<Challenge>,
}

/// 從授權回應主體中選出第一個與指定類型相符的挑戰。
///
/// 同類型有多個時以伺服器順序的第一個為準。
pub fn select_challenge(
    body: &[u8],
    kind: &str,
) -> std::result::Result<Option<Challenge>, serde_json::Error> {
    let parsed: AuthorizationBody = serde_json::from_slice(body)?;
    Ok(parsed.challenges.into_iter().find(|c| c.kind == kind))
}

/// 已放置到網站根目錄的 token 檔案。
///
/// 作用域式持有：值在任何退出路徑（提前返回、錯誤、panic）被丟棄時
/// 一併刪除檔案，對應手動 write/unlink 配對容易遺漏的清理。
#[derive(Debug)]
pub struct PlacedToken {
    path: PathBuf,
    key_authorization: String,
}

impl PlacedToken {
    /// 檔案的實際路徑。
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 檔案承載的 key authorization 內容。
    pub fn key_authorization(&self) -> &str {
        &self.key_authorization
    }
}

impl Drop for PlacedToken {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove token file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// 挑戰提供者能力：自檢、放置與清除 token。
///
/// 會話對每個域名依序呼叫 [`validate_domain_control`]、[`prepare`]；
/// token 的刪除由 [`PlacedToken`] 的作用域保證，[`cleanup`] 供呼叫方
/// 在作用域之外做冪等的補充清理。
///
/// [`validate_domain_control`]: ChallengeProvider::validate_domain_control
/// [`prepare`]: ChallengeProvider::prepare
/// [`cleanup`]: ChallengeProvider::cleanup
pub trait ChallengeProvider {
    /// 此提供者能應答的挑戰類型。
    fn kind(&self) -> &'static str;

    /// 在聯繫 CA 之前確認本機確實控制該域名。
    fn validate_domain_control(&self, domain: &str) -> Result<()>;

    /// 放置挑戰應答並確認其可被外部取得。
    fn prepare(&self, domain: &str, challenge: &Challenge, jwk: &Jwk) -> Result<PlacedToken>;

    /// 盡力刪除挑戰應答檔案。冪等；失敗僅記錄。
    fn cleanup(&self, domain: &str, challenge: &Challenge);
}

/// HTTP-01 挑戰提供者。
///
/// Token 寫入 `<webRoot>[/<domain>]/.well-known/acme-challenge/`，
/// 再經 `http://<domain>/.well-known/acme-challenge/<token>` 自行取回
/// 比對，確保 CA 稍後的驗證請求能成功。
#[derive(Debug)]
pub struct Http01Provider {
    web_root: PathBuf,
    append_domain: bool,
    append_well_known_path: bool,
    file_mode: u32,
    http: HttpClient,
}

impl Http01Provider {
    pub fn new(
        web_root: PathBuf,
        append_domain: bool,
        append_well_known_path: bool,
        file_mode: u32,
        http: HttpClient,
    ) -> Self {
        Http01Provider {
            web_root,
            append_domain,
            append_well_known_path,
            file_mode,
            http,
        }
    }

    /// 根據配置組裝提供者，內部建立自己的 HTTP 客戶端。
    pub fn from_config(config: &ClientConfig) -> std::result::Result<Self, HttpError> {
        Ok(Self::new(
            config.web_root_dir.clone(),
            config.append_domain,
            config.append_well_known_path,
            config.web_server_file_perm,
            HttpClient::new()?,
        ))
    }

    /// 該域名挑戰檔案的本地目錄。
    fn well_known_dir(&self, domain: &str) -> PathBuf {
        let mut dir = self.web_root.clone();
        if self.append_domain {
            dir.push(domain);
        }
        if self.append_well_known_path {
            dir.push(WELL_KNOWN_PATH);
        }
        dir
    }

    /// 該域名挑戰檔案的公開 URL。驗證走明文 HTTP。
    fn challenge_url(&self, domain: &str, file: &str) -> String {
        format!("http://{}/{}/{}", domain, WELL_KNOWN_PATH, file)
    }

    /// 確保挑戰目錄存在；新建目錄須可被網頁伺服器讀取。
    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(dir)
            .map_err(|e| ChallengeError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
    }

    /// 寫入挑戰檔案並套用配置的檔案權限。
    fn place_file(&self, dir: &Path, name: &str, content: &str) -> Result<PlacedToken> {
        let path = dir.join(name);
        let io_err = |path: &Path, e| ChallengeError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        fs::write(&path, content).map_err(|e| io_err(&path, e))?;
        let token = PlacedToken {
            path: path.clone(),
            key_authorization: content.to_string(),
        };
        fs::set_permissions(&path, fs::Permissions::from_mode(self.file_mode))
            .map_err(|e| io_err(&path, e))?;
        Ok(token)
    }
}

impl ChallengeProvider for Http01Provider {
    fn kind(&self) -> &'static str {
        HTTP01
    }

    fn validate_domain_control(&self, domain: &str) -> Result<()> {
        let dir = self.well_known_dir(domain);
        self.ensure_dir(&dir)?;

        // token 作用域涵蓋取回請求，無論結果如何檔案都會被刪除
        let _token = self.place_file(&dir, SELF_CHECK_FILE, SELF_CHECK_BODY)?;
        let url = self.challenge_url(domain, SELF_CHECK_FILE);
        debug!("Self-check fetch {}", url);

        let response = self
            .http
            .get(&url)
            .map_err(|source| ChallengeError::Request {
                domain: domain.to_string(),
                source,
            })?;

        if response.status != 200 || response.body != SELF_CHECK_BODY.as_bytes() {
            return Err(ChallengeError::SelfCheckFailed {
                domain: domain.to_string(),
                detail: format!("GET {} returned status {}", url, response.status),
            });
        }

        info!("Self-check passed for {}", domain);
        Ok(())
    }

    fn prepare(&self, domain: &str, challenge: &Challenge, jwk: &Jwk) -> Result<PlacedToken> {
        let key_authorization = jwk.key_authorization(&challenge.token)?;
        let dir = self.well_known_dir(domain);
        self.ensure_dir(&dir)?;

        let token = self.place_file(&dir, &challenge.token, &key_authorization)?;
        info!(
            "Placed challenge token for {} at {}",
            domain,
            token.path().display()
        );

        let url = self.challenge_url(domain, &challenge.token);
        let response = self
            .http
            .get(&url)
            .map_err(|source| ChallengeError::Request {
                domain: domain.to_string(),
                source,
            })?;

        if response.status != 200 || response.body != key_authorization.as_bytes() {
            return Err(ChallengeError::TokenMismatch {
                domain: domain.to_string(),
                url,
            });
        }

        Ok(token)
    }

    fn cleanup(&self, domain: &str, challenge: &Challenge) {
        let path = self.well_known_dir(domain).join(&challenge.token);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed challenge token {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPair;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::tempdir;

    fn provider(web_root: &Path) -> Http01Provider {
        Http01Provider::new(
            web_root.to_path_buf(),
            false,
            true,
            0o644,
            HttpClient::new().unwrap(),
        )
    }

    /// 從網站根目錄提供檔案的極簡源站，持續服務到進程結束。
    fn spawn_origin(root: PathBuf) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                let path = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .trim_start_matches('/')
                    .to_string();
                match fs::read(root.join(&path)) {
                    Ok(body) => {
                        let _ = write!(
                            stream,
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        let _ = stream.write_all(&body);
                    }
                    Err(_) => {
                        let _ = write!(
                            stream,
                            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        );
                    }
                }
            }
        });
        format!("{}", addr)
    }

    #[test]
    fn test_well_known_dir_layout() {
        let dir = tempdir().unwrap();
        let flat = provider(dir.path());
        assert_eq!(
            flat.well_known_dir("example.com"),
            dir.path().join(".well-known/acme-challenge")
        );

        let nested = Http01Provider::new(
            dir.path().to_path_buf(),
            true,
            true,
            0o644,
            HttpClient::new().unwrap(),
        );
        assert_eq!(
            nested.well_known_dir("example.com"),
            dir.path().join("example.com/.well-known/acme-challenge")
        );
    }

    #[test]
    fn test_placed_token_removed_on_drop() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());
        let well_known = provider.well_known_dir("example.com");
        provider.ensure_dir(&well_known).unwrap();

        let path = {
            let token = provider.place_file(&well_known, "tok", "content").unwrap();
            assert!(token.path().is_file());
            let mode = fs::metadata(token.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
            token.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());
        let challenge = Challenge {
            kind: HTTP01.to_string(),
            uri: String::new(),
            token: "absent-token".to_string(),
            status: String::new(),
        };
        // 目標檔案不存在時不得報錯
        provider.cleanup("example.com", &challenge);
        provider.cleanup("example.com", &challenge);
    }

    #[test]
    fn test_select_challenge_first_match() {
        let body = br#"{
            "status": "pending",
            "challenges": [
                {"type": "dns-01", "uri": "http://ca/c/1", "token": "t1", "status": "pending"},
                {"type": "http-01", "uri": "http://ca/c/2", "token": "t2", "status": "pending"},
                {"type": "http-01", "uri": "http://ca/c/3", "token": "t3", "status": "pending"}
            ]
        }"#;
        let selected = select_challenge(body, HTTP01).unwrap().unwrap();
        assert_eq!(selected.uri, "http://ca/c/2");
        assert_eq!(selected.token, "t2");

        assert!(select_challenge(body, "tls-alpn-01").unwrap().is_none());
    }

    #[test]
    fn test_self_check_round_trip() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());
        let domain = spawn_origin(dir.path().to_path_buf());

        provider.validate_domain_control(&domain).unwrap();
        // 檢查檔案不得殘留
        let leftover = provider.well_known_dir(&domain).join(SELF_CHECK_FILE);
        assert!(!leftover.exists());
    }

    #[test]
    fn test_self_check_failure_is_domain_tagged() {
        let dir = tempdir().unwrap();
        let empty = tempdir().unwrap();
        let provider = provider(dir.path());
        // 源站從另一個目錄服務，自檢必然 404
        let domain = spawn_origin(empty.path().to_path_buf());

        let err = provider.validate_domain_control(&domain).unwrap_err();
        match err {
            ChallengeError::SelfCheckFailed { domain: tagged, .. } => {
                assert_eq!(tagged, domain)
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let leftover = provider.well_known_dir(&domain).join(SELF_CHECK_FILE);
        assert!(!leftover.exists());
    }

    #[test]
    fn test_prepare_serves_key_authorization() {
        let dir = tempdir().unwrap();
        let provider = provider(dir.path());
        let domain = spawn_origin(dir.path().to_path_buf());

        let key_pair = KeyPair::generate(2048).unwrap();
        let jwk = Jwk::from_key_pair(&key_pair).unwrap();
        let challenge = Challenge {
            kind: HTTP01.to_string(),
            uri: "http://ca/challenge/1".to_string(),
            token: "prepared-token".to_string(),
            status: "pending".to_string(),
        };

        let placed = provider.prepare(&domain, &challenge, &jwk).unwrap();
        assert_eq!(
            placed.key_authorization(),
            jwk.key_authorization("prepared-token").unwrap()
        );
        assert!(placed.path().is_file());

        drop(placed);
        let leftover = provider.well_known_dir(&domain).join("prepared-token");
        assert!(!leftover.exists());
    }
}
