//! ACME 會話：從帳戶註冊到憑證鏈組裝的協議狀態機。
//!
//! 會話是單線程、順序的：域名依序處理，沒有協議層級的重試。
//! 第一個不可恢復的狀況立即向上拋出，並附帶伺服器的診斷主體。
//! 會話值在 [`AcmeSession::issue`] 中被消耗，重複使用在編譯期即被
//! 拒絕。

use std::{thread, time::Duration};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    account::Account,
    certificate::{self, CertificateBundle, CertificateError},
    challenge::{select_challenge, ChallengeError, ChallengeProvider},
    config::{ClientConfig, ConfigError},
    csr::{CsrBuilder, CsrError},
    directory::AcmeDirectory,
    http::{HttpClient, HttpError, HttpResponse},
    jwk::{Jwk, JwkError},
    jws::{Jws, JwsError},
    key::{self, KeyError, KeyPair},
    nonce::{NonceError, NonceStore},
    payload::{
        ChallengeAnswerPayload, NewAuthorizationPayload, NewCertificatePayload,
        NewRegistrationPayload, PayloadT,
    },
};

/// 定義會話操作可能產生的錯誤。
///
/// 此錯誤列舉聚合各協作模組的錯誤，並補上協議層級的失敗情形。
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("JWK error: {0}")]
    Jwk(#[from] JwkError),
    #[error("JWS error: {0}")]
    Jws(#[from] JwsError),
    #[error("Request error: {0}")]
    Http(#[from] HttpError),
    #[error("Nonce error: {0}")]
    Nonce(#[from] NonceError),
    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),
    #[error("CSR error: {0}")]
    Csr(#[from] CsrError),
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No domains supplied")]
    NoDomains,
    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Missing Location header in response from {url}")]
    MissingLocation { url: String },
    #[error("No {kind} challenge offered for {domain}")]
    NoCompatibleChallenge { domain: String, kind: String },
    #[error("Authorization for {domain} ended {status}: {body}")]
    AuthorizationFailed {
        domain: String,
        status: String,
        body: String,
    },
    #[error("Authorization polling for {domain} exhausted after {attempts} attempts")]
    AuthorizationPollExhausted { domain: String, attempts: u32 },
    #[error("Certificate polling exhausted after {attempts} attempts")]
    CertificatePollExhausted { attempts: u32 },
}

type Result<T> = std::result::Result<T, SessionError>;

/// 一次簽發流程的會話。
///
/// 持有快取的 nonce 與帳戶狀態；不可跨線程共享，也不可重複使用。
pub struct AcmeSession {
    config: ClientConfig,
    directory: AcmeDirectory,
    http: HttpClient,
    nonce: NonceStore,
    account: Account,
    jwk: Jwk,
    provider: Box<dyn ChallengeProvider>,
}

impl std::fmt::Debug for AcmeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeSession")
            .field("config", &self.config)
            .field("directory", &self.directory)
            .field("http", &self.http)
            .field("nonce", &self.nonce)
            .field("account", &self.account)
            .field("jwk", &self.jwk)
            .field("provider", &self.provider.kind())
            .finish()
    }
}

impl AcmeSession {
    /// 建立會話：驗證配置、綁定端點、載入（或建立）帳戶金鑰。
    ///
    /// 配置驗證先於其他一切，未完成配置的部署在任何網路或檔案系統
    /// 活動之前被拒絕。
    ///
    /// # Errors
    ///
    /// 返回 [`SessionError::Config`] 當配置驗證失敗，或其他錯誤當
    /// 協作者初始化失敗時。
    pub fn new(
        config: ClientConfig,
        provider: Box<dyn ChallengeProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let directory = AcmeDirectory::new(config.ca_url());
        let http = HttpClient::new()?;
        let nonce = NonceStore::new(directory.directory.clone());
        let account = Account::load_or_create(&config)?;
        let jwk = Jwk::from_key_pair(&account.key_pair)?;

        Ok(AcmeSession {
            config,
            directory,
            http,
            nonce,
            account,
            jwk,
            provider,
        })
    }

    /// 為給定域名簽發一份憑證。
    ///
    /// 流程：註冊帳戶（僅首次）→ 全部域名本地自檢 → 逐域名授權 →
    /// 提交 CSR 並組裝憑證鏈。會話值被消耗；任何失敗都會在 token
    /// 檔案清理完成後向上拋出。
    ///
    /// # Errors
    ///
    /// 任何非預期狀態碼、缺失的 `Location` 標頭或輪詢耗盡都是致命
    /// 的，錯誤中攜帶伺服器回應主體。
    pub fn issue(mut self, domains: &[String]) -> Result<CertificateBundle> {
        if domains.is_empty() {
            return Err(SessionError::NoDomains);
        }
        info!("Starting issuance for {} domain(s)", domains.len());

        self.register()?;

        // 任一域名自檢失敗就在聯繫 CA 之前中止
        for domain in domains {
            self.provider.validate_domain_control(domain)?;
        }

        for domain in domains {
            self.authorize(domain)?;
        }

        self.finalize(domains)
    }

    /// 發出一個簽名請求並讀回回應。
    ///
    /// 消耗當前 nonce，將回應標頭中的 `Replay-Nonce` 留給下一個請求。
    /// 相對 URI 以 CA 基底解析。
    fn signed_request<P: PayloadT>(&mut self, uri: &str, payload: &P) -> Result<HttpResponse> {
        let url = self.directory.resolve(uri);
        let nonce = self.nonce.take(&self.http)?;
        let jws = Jws::sign(&self.account.key_pair, &self.jwk, &nonce, payload.to_base64()?)?;

        debug!("POST {}", url);
        let response = self.http.post(&url, jws.to_json()?)?;
        self.nonce.absorb(&response);
        Ok(response)
    }

    /// 註冊帳戶。金鑰在先前執行中已存在時跳過。
    fn register(&mut self) -> Result<()> {
        if !self.account.newly_created {
            debug!("Account key already present; skipping registration");
            return Ok(());
        }

        let url = self.directory.new_reg.clone();
        let payload =
            NewRegistrationPayload::new(self.account.agreement.as_deref(), &self.account.contact);
        let response = self.signed_request(&url, &payload)?;
        if response.status != 201 {
            // 金鑰檔案存在 ⇔ 帳戶已註冊；註冊失敗時撤回剛建立的金鑰
            let key_path = self.config.account_dir.join(key::ACCOUNT_KEY_FILE);
            if let Err(e) = std::fs::remove_file(&key_path) {
                warn!("Failed to remove unregistered key {}: {}", key_path.display(), e);
            }
            return Err(Self::unexpected(&url, &response));
        }

        info!("Account registered");
        Ok(())
    }

    /// 為單一域名取得授權：new-authz、挑戰應答、輪詢至終結狀態。
    fn authorize(&mut self, domain: &str) -> Result<()> {
        info!("Requesting authorization for {}", domain);

        let url = self.directory.new_authz.clone();
        let response = self.signed_request(&url, &NewAuthorizationPayload::new(domain))?;
        if response.status != 201 {
            return Err(Self::unexpected(&url, &response));
        }
        let auth_url = response
            .location()
            .ok_or_else(|| SessionError::MissingLocation { url: url.clone() })?
            .to_string();

        let challenge = select_challenge(&response.body, self.provider.kind())?.ok_or_else(|| {
            SessionError::NoCompatibleChallenge {
                domain: domain.to_string(),
                kind: self.provider.kind().to_string(),
            }
        })?;

        // token 在此作用域內存活；之後的任何退出路徑都會刪除檔案
        let token = self.provider.prepare(domain, &challenge, &self.jwk)?;

        let answer = ChallengeAnswerPayload::new(
            self.provider.kind(),
            token.key_authorization(),
            &challenge.token,
        );
        let response = self.signed_request(&challenge.uri, &answer)?;
        if !response.is_success() {
            return Err(Self::unexpected(&challenge.uri, &response));
        }

        self.poll_authorization(domain, &auth_url)?;

        drop(token);
        info!("Authorization for {} is valid", domain);
        Ok(())
    }

    /// 輪詢授權 URL 直到狀態離開 `pending`。
    fn poll_authorization(&mut self, domain: &str, auth_url: &str) -> Result<()> {
        let url = self.directory.resolve(auth_url);
        for attempt in 0..self.config.poll_attempts {
            let response = self.http.get(&url)?;
            self.nonce.absorb(&response);
            if response.status != 200 {
                return Err(Self::unexpected(&url, &response));
            }

            let body: serde_json::Value = response.json()?;
            match body["status"].as_str().unwrap_or("") {
                "pending" => {
                    debug!(
                        "Authorization for {} still pending (attempt {})",
                        domain,
                        attempt + 1
                    );
                    thread::sleep(Duration::from_millis(self.config.poll_interval_ms));
                }
                "valid" => return Ok(()),
                status => {
                    error!("Authorization for {} ended {}", domain, status);
                    return Err(SessionError::AuthorizationFailed {
                        domain: domain.to_string(),
                        status: status.to_string(),
                        body: response.body_str(),
                    });
                }
            }
        }

        Err(SessionError::AuthorizationPollExhausted {
            domain: domain.to_string(),
            attempts: self.config.poll_attempts,
        })
    }

    /// 最終化：生成域名金鑰、提交 CSR、輪詢憑證並組裝鏈。
    fn finalize(&mut self, domains: &[String]) -> Result<CertificateBundle> {
        info!("Generating domain key and CSR");
        let domain_key = KeyPair::generate(self.config.cert_rsa_key_bits)?;
        let csr = CsrBuilder::new(
            domains,
            &self.config.cert_distinguished_name,
            &self.config.cert_digest_alg,
        )
        .build_der_base64(&domain_key)?;

        let url = self.directory.new_cert.clone();
        let response = self.signed_request(&url, &NewCertificatePayload::new(csr))?;
        if response.status != 201 {
            return Err(Self::unexpected(&url, &response));
        }
        let cert_url = response
            .location()
            .ok_or_else(|| SessionError::MissingLocation { url: url.clone() })?
            .to_string();
        let cert_url = self.directory.resolve(&cert_url);

        for _ in 0..self.config.poll_attempts {
            let response = self.http.get(&cert_url)?;
            self.nonce.absorb(&response);

            match response.status {
                202 => {
                    debug!("Certificate not ready yet");
                    thread::sleep(Duration::from_millis(self.config.poll_interval_ms));
                }
                200 => {
                    let leaf = certificate::pem_from_der(&response.body);
                    let up_links = response.up_links();

                    let mut chain = String::new();
                    for link in &up_links {
                        let issuer_url = self.directory.resolve(link);
                        debug!("Fetching issuer certificate {}", issuer_url);
                        let issuer = self.http.get(&issuer_url)?;
                        if issuer.status != 200 {
                            return Err(Self::unexpected(&issuer_url, &issuer));
                        }
                        chain.push_str(&certificate::pem_from_der(&issuer.body));
                    }

                    let dh_params = match self.config.dh_param_path() {
                        Some(path) => Some(certificate::load_or_generate_dh(
                            &path,
                            self.config.dh_param_bits,
                        )?),
                        None => None,
                    };

                    let key = String::from_utf8_lossy(&domain_key.to_pem()?).into_owned();
                    info!(
                        "Certificate issued with {} intermediate(s)",
                        up_links.len()
                    );
                    return Ok(CertificateBundle {
                        leaf,
                        chain,
                        key,
                        dh_params,
                    });
                }
                _ => return Err(Self::unexpected(&cert_url, &response)),
            }
        }

        Err(SessionError::CertificatePollExhausted {
            attempts: self.config.poll_attempts,
        })
    }

    /// 將非預期回應連同伺服器診斷主體包成錯誤。
    fn unexpected(url: &str, response: &HttpResponse) -> SessionError {
        SessionError::UnexpectedStatus {
            url: url.to_string(),
            status: response.status,
            body: response.body_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::Http01Provider;
    use tempfile::tempdir;

    #[test]
    fn test_new_rejects_unconfigured_contacts() {
        let dir = tempdir().unwrap();
        let account_dir = dir.path().join("account");
        let config = ClientConfig {
            account_dir: account_dir.clone(),
            ..ClientConfig::default()
        };
        let provider = Http01Provider::from_config(&config).unwrap();

        let err = AcmeSession::new(config, Box::new(provider)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Config(ConfigError::DefaultContact(_))
        ));
        // 驗證先於一切：帳戶目錄不得被建立
        assert!(!account_dir.exists());
    }

    #[test]
    fn test_issue_rejects_empty_domain_list() {
        let dir = tempdir().unwrap();
        let config = ClientConfig {
            account_dir: dir.path().join("account"),
            cert_account_contact: vec!["mailto:ops@example.com".to_string()],
            ..ClientConfig::default()
        };
        let provider = Http01Provider::from_config(&config).unwrap();
        let session = AcmeSession::new(config, Box::new(provider)).unwrap();

        assert!(matches!(
            session.issue(&[]),
            Err(SessionError::NoDomains)
        ));
    }
}
