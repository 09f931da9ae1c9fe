//! Replay-Nonce 的保存與補充。
//!
//! 會話中同一時刻只持有一個 nonce：每個簽名請求取走並消耗它，
//! 回應標頭中的 `Replay-Nonce` 則補上下一個。快取為空時向
//! `GET <ca>/directory` 重新取得。

use thiserror::Error;

use crate::http::{HttpClient, HttpError, HttpResponse};

/// 表示在取得 nonce 時可能發生的錯誤狀況。
#[derive(Debug, Error)]
pub enum NonceError {
    /// 當刷新請求失敗時回傳此錯誤。
    #[error("Failed to refresh nonce: {0}")]
    Request(#[from] HttpError),
    /// 當回應中缺少 `Replay-Nonce` 標頭時回傳此錯誤。
    #[error("No Replay-Nonce header in response from {0}")]
    NoNonceHeader(String),
}

/// 保存最近一次觀察到的 `Replay-Nonce`。
///
/// 每個值最多被取用一次；[`NonceStore::take`] 之後必須由下一個
/// 回應經 [`NonceStore::absorb`] 補充。
#[derive(Debug)]
pub struct NonceStore {
    directory_url: String,
    current: Option<String>,
}

impl NonceStore {
    /// 建立一個空的 [`NonceStore`]，以指定的目錄 URL 作為刷新來源。
    pub fn new(directory_url: impl Into<String>) -> Self {
        Self {
            directory_url: directory_url.into(),
            current: None,
        }
    }

    /// 取走當前 nonce；快取為空時向目錄端點刷新。
    ///
    /// # Errors
    ///
    /// 無法取得 nonce 對當前請求而言是致命的：返回
    /// [`NonceError::Request`] 或 [`NonceError::NoNonceHeader`]。
    pub fn take(&mut self, http: &HttpClient) -> Result<String, NonceError> {
        if let Some(nonce) = self.current.take() {
            return Ok(nonce);
        }

        let response = http.get(&self.directory_url)?;
        match response.replay_nonce() {
            Some(nonce) => Ok(nonce.to_string()),
            None => Err(NonceError::NoNonceHeader(self.directory_url.clone())),
        }
    }

    /// 從回應標頭補充 nonce；標頭不存在時保持原狀。
    pub fn absorb(&mut self, response: &HttpResponse) {
        if let Some(nonce) = response.replay_nonce() {
            self.current = Some(nonce.to_string());
        }
    }
}
