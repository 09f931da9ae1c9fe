//! 客戶端配置與啟動前驗證。

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 正式環境 CA 端點。
pub const DEFAULT_CA: &str = "https://acme-v01.api.letsencrypt.org";
/// 測試（staging）環境 CA 端點。
pub const DEFAULT_CA_TESTING: &str = "https://acme-staging.api.letsencrypt.org";

/// 出廠預設的聯絡 URI。部署時必須替換；驗證階段一律拒絕。
pub const DEFAULT_CONTACTS: [&str; 2] = ["mailto:cert-admin@example.com", "tel:+12025551212"];

/// 配置驗證失敗的各種情形。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Account contact list is empty")]
    EmptyContact,
    #[error("Shipped default account contact must be replaced: {0}")]
    DefaultContact(String),
    #[error("Contact URI must be mailto: or tel:, got {0}")]
    UnsupportedContactUri(String),
    #[error("Distinguished name requires a country name")]
    MissingCountryName,
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),
}

/// 證書主體的 Distinguished Name 欄位；`country_name` 為必填。
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistinguishedName {
    pub country_name: String,
    pub state_or_province_name: Option<String>,
    pub locality_name: Option<String>,
    pub organization_name: Option<String>,
    pub organizational_unit_name: Option<String>,
}

impl Default for DistinguishedName {
    fn default() -> Self {
        DistinguishedName {
            country_name: "US".to_string(),
            state_or_province_name: None,
            locality_name: None,
            organization_name: None,
            organizational_unit_name: None,
        }
    }
}

/// 會話的完整配置。
///
/// 所有欄位都有預設值；[`ClientConfig::validate`] 在任何網路活動之前
/// 執行，拒絕未完成配置的部署。
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// 啟用時改用測試環境 CA。
    pub debug: bool,
    /// 正式環境 CA 基底 URL。
    pub ca: String,
    /// 測試環境 CA 基底 URL。
    pub ca_testing: String,
    /// 訂閱者協議 URL，註冊時隨載荷送出。
    pub agreement: Option<String>,
    /// 證書主體欄位。
    pub cert_distinguished_name: DistinguishedName,
    /// 帳戶聯絡 URI 清單（`mailto:` 或 `tel:`）。
    pub cert_account_contact: Vec<String>,
    /// 支援的金鑰類型，目前僅 `"RSA"`。
    pub cert_key_types: Vec<String>,
    /// RSA 金鑰位數。
    pub cert_rsa_key_bits: u32,
    /// CSR 簽名摘要演算法。
    pub cert_digest_alg: String,
    /// DH 參數檔案路徑；相對路徑以帳戶目錄為基底，空字串停用。
    pub dh_param_file: String,
    /// 生成 DH 參數時的位數。
    pub dh_param_bits: u32,
    /// 帳戶金鑰存放目錄。
    pub account_dir: PathBuf,
    /// HTTP-01 挑戰檔案的網站根目錄。
    pub web_root_dir: PathBuf,
    /// 是否在網站根目錄後插入一層域名目錄。
    pub append_domain: bool,
    /// 是否在路徑後附加 `/.well-known/acme-challenge`。
    pub append_well_known_path: bool,
    /// 挑戰檔案的權限模式，須可被網頁伺服器讀取。
    pub web_server_file_perm: u32,
    /// 輪詢間隔（毫秒）。
    pub poll_interval_ms: u64,
    /// 輪詢次數上限。
    pub poll_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            debug: false,
            ca: DEFAULT_CA.to_string(),
            ca_testing: DEFAULT_CA_TESTING.to_string(),
            agreement: None,
            cert_distinguished_name: DistinguishedName::default(),
            cert_account_contact: DEFAULT_CONTACTS.iter().map(|s| s.to_string()).collect(),
            cert_key_types: vec!["RSA".to_string()],
            cert_rsa_key_bits: 2048,
            cert_digest_alg: "sha256".to_string(),
            dh_param_file: String::new(),
            dh_param_bits: 2048,
            account_dir: PathBuf::from("/var/lib/rcert/account"),
            web_root_dir: PathBuf::from("/var/www"),
            append_domain: false,
            append_well_known_path: true,
            web_server_file_perm: 0o644,
            poll_interval_ms: 1500,
            poll_attempts: 60,
        }
    }
}

impl ClientConfig {
    /// 驗證配置。必須在任何網路請求之前呼叫。
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyContact`]：聯絡清單為空。
    /// - [`ConfigError::DefaultContact`]：仍帶著出廠預設聯絡方式。
    /// - [`ConfigError::UnsupportedContactUri`]：非 `mailto:`/`tel:`。
    /// - [`ConfigError::MissingCountryName`]：DN 缺少國家欄位。
    /// - [`ConfigError::UnsupportedKeyType`]：要求了 RSA 以外的金鑰。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cert_account_contact.is_empty() {
            return Err(ConfigError::EmptyContact);
        }
        for contact in &self.cert_account_contact {
            if DEFAULT_CONTACTS.contains(&contact.as_str()) {
                return Err(ConfigError::DefaultContact(contact.clone()));
            }
            if !contact.starts_with("mailto:") && !contact.starts_with("tel:") {
                return Err(ConfigError::UnsupportedContactUri(contact.clone()));
            }
        }
        if self.cert_distinguished_name.country_name.is_empty() {
            return Err(ConfigError::MissingCountryName);
        }
        for key_type in &self.cert_key_types {
            if key_type != "RSA" {
                return Err(ConfigError::UnsupportedKeyType(key_type.clone()));
            }
        }
        Ok(())
    }

    /// 根據 `debug` 旗標選擇 CA 基底 URL。
    pub fn ca_url(&self) -> &str {
        if self.debug {
            &self.ca_testing
        } else {
            &self.ca
        }
    }

    /// DH 參數檔案的實際路徑。
    ///
    /// 相對路徑以帳戶目錄為基底解析；空字串表示停用，返回 `None`。
    pub fn dh_param_path(&self) -> Option<PathBuf> {
        if self.dh_param_file.is_empty() {
            return None;
        }
        let path = Path::new(&self.dh_param_file);
        Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.account_dir.join(path)
        })
    }
}
