//! # ACME 憑證自動化客戶端
//!
//! 本庫實作 ACME 協議引擎，向 CA（例如 Let's Encrypt）為一組 DNS
//! 名稱申請 X.509 憑證，主要涵蓋以下幾個部分：
//!
//! - **session**: 協議狀態機，負責帳戶註冊、逐域名授權、挑戰派發、
//!   輪詢、CSR 提交與憑證鏈下載。
//! - **challenge**: 可插拔的挑戰提供者能力（本地自檢、token 放置與
//!   清理），目前實作 HTTP-01。
//! - **jws / jwk / nonce**: 簽名請求引擎，包括 JWS 構造、JWK 編碼與
//!   防重放 nonce 管理。
//!
//! ## 特性
//!
//! - 帳戶金鑰自動生成與持久化，首次執行時向 CA 註冊
//! - 每個簽名請求消耗一個新鮮 nonce，由回應標頭補充
//! - HTTP-01 挑戰在觸發 CA 驗證前先行本地自檢
//! - 挑戰 token 檔案以作用域方式持有，任何退出路徑都會清理
//! - 簽發結果包含葉憑證、簽發者鏈與域名私鑰（皆為 PEM）
//!
//! ## 使用方式
//!
//! ```no_run
//! use rcert::{AcmeSession, ClientConfig, Http01Provider};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. 準備配置；出廠預設的聯絡方式必須替換
//!     let mut config = ClientConfig::default();
//!     config.cert_account_contact = vec!["mailto:ops@example.com".to_string()];
//!     config.web_root_dir = "/var/www".into();
//!
//!     // 2. 選定挑戰提供者並建立會話
//!     let provider = Http01Provider::from_config(&config)?;
//!     let session = AcmeSession::new(config, Box::new(provider))?;
//!
//!     // 3. 簽發；會話值在此被消耗
//!     let domains = vec!["example.com".to_string(), "www.example.com".to_string()];
//!     let bundle = session.issue(&domains)?;
//!
//!     println!("{}", bundle.leaf);
//!     Ok(())
//! }
//! ```
//!
//! 更多詳細 API 說明請參考各個模組的文檔。

pub mod account;
pub mod base64;
pub mod certificate;
pub mod challenge;
pub mod config;
pub mod csr;
pub mod directory;
pub mod http;
pub mod jwk;
pub mod jws;
pub mod key;
pub mod logger;
pub mod nonce;
pub mod payload;
pub mod session;

pub use certificate::CertificateBundle;
pub use challenge::{ChallengeProvider, Http01Provider};
pub use config::{ClientConfig, DistinguishedName};
pub use session::{AcmeSession, SessionError};
