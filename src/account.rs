//! ACME 帳戶：金鑰對與聯絡資訊。

use log::info;

use crate::{
    config::ClientConfig,
    key::{KeyError, KeyPair},
};

/// 表示一個 ACME 帳戶。
///
/// 金鑰對持久化在帳戶目錄下，首次執行時建立，之後重用；
/// 單次執行期間帳戶內容不可變。
#[derive(Debug)]
pub struct Account {
    /// 帳戶金鑰對。
    pub key_pair: KeyPair,
    /// 聯絡 URI 清單，註冊時送往 CA。
    pub contact: Vec<String>,
    /// 訂閱者協議 URL。
    pub agreement: Option<String>,
    /// 金鑰是否為本次執行新建。新建意味著帳戶尚未在 CA 註冊，
    /// 會話需要先發出註冊請求。
    pub newly_created: bool,
}

impl Account {
    /// 從帳戶目錄載入金鑰對；不存在時生成並持久化。
    ///
    /// # Errors
    ///
    /// 金鑰載入、生成或寫入失敗時返回 [`KeyError`]。
    pub fn load_or_create(config: &ClientConfig) -> Result<Self, KeyError> {
        let (key_pair, newly_created) =
            KeyPair::load_or_create(&config.account_dir, config.cert_rsa_key_bits)?;

        if newly_created {
            info!(
                "Generated account key in {}",
                config.account_dir.display()
            );
        } else {
            info!("Reusing account key from {}", config.account_dir.display());
        }

        Ok(Account {
            key_pair,
            contact: config.cert_account_contact.clone(),
            agreement: config.agreement.clone(),
            newly_created,
        })
    }
}
