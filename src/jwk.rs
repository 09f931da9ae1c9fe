//! JSON Web Key (JWK) 的封裝，目前僅支援 RSA 公鑰。

use openssl::sha::sha256;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    base64,
    key::{KeyError, KeyPair},
};

/// JWK 相關操作的錯誤類型。
#[derive(Debug, Error)]
pub enum JwkError {
    /// 公鑰參數提取失敗。
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    /// 序列化錯誤。
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, JwkError>;

/// RSA 格式的 JWK，包含 ACME 簽名請求所需的公開參數。
///
/// `n` 與 `e` 為模數與公開指數的 big-endian 位元組串經 URL-safe Base64
/// 編碼後的結果，不帶填充。
#[derive(Debug, Clone, Serialize)]
pub struct Jwk {
    kty: &'static str,
    n: String,
    e: String,
}

impl Jwk {
    /// 根據給定的金鑰對產生 JWK。
    ///
    /// # Errors
    ///
    /// 返回 [`JwkError::Key`] 當公鑰參數無法取得時。
    pub fn from_key_pair(key_pair: &KeyPair) -> Result<Self> {
        let (n, e) = key_pair.rsa_components()?;
        Ok(Jwk {
            kty: "RSA",
            n: base64::encode(n),
            e: base64::encode(e),
        })
    }

    /// 產生 key authorization 雜湊所要求的標準 JSON 表示：
    /// `{"e":E,"kty":"RSA","n":N}`，鍵依字典序排列且不含任何空白。
    ///
    /// 此處刻意逐鍵構造 [`Map`]（底層為有序映射），避免一般序列化
    /// 路徑對鍵順序不做保證的問題。
    pub fn canonical_json(&self) -> Result<String> {
        let mut map = Map::new();
        map.insert("e".to_string(), Value::String(self.e.clone()));
        map.insert("kty".to_string(), Value::String(self.kty.to_string()));
        map.insert("n".to_string(), Value::String(self.n.clone()));

        Ok(serde_json::to_string(&Value::Object(map))?)
    }

    /// 計算 JWK 縮影：URL-safe Base64(SHA-256(標準 JSON))。
    pub fn thumbprint(&self) -> Result<String> {
        let hash = sha256(self.canonical_json()?.as_bytes());
        Ok(base64::encode(hash))
    }

    /// 組合挑戰的 key authorization 字串：`token + "." + thumbprint`。
    pub fn key_authorization(&self, token: &str) -> Result<String> {
        Ok(format!("{}.{}", token, self.thumbprint()?))
    }
}
