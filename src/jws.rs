//! JSON Web Signature (JWS) 請求主體的構造。
//!
//! 協議的每個 POST 都是一個 JWS 物件：
//! `header` 為未保護標頭 `{alg, jwk}`，`protected` 為標頭加上當前
//! nonce 後的 URL-safe Base64，簽名輸入為
//! `protected64 + "." + payload64`。序列化依結構欄位順序輸出、
//! 不含多餘空白，確保簽名輸入的位元組確定。

use serde::Serialize;
use thiserror::Error;

use crate::{
    base64,
    jwk::{Jwk, JwkError},
    key::{KeyError, KeyPair},
};

const ALG_RS256: &str = "RS256";

/// 表示與 JWS 相關的錯誤。
#[derive(Debug, Error)]
pub enum JwsError {
    /// 當 JSON 序列化過程中發生錯誤時回傳此錯誤。
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// JWK 構造失敗。
    #[error("JWK error: {0}")]
    Jwk(#[from] JwkError),
    /// 簽名失敗。
    #[error("Signing error: {0}")]
    Key(#[from] KeyError),
}

type Result<T> = std::result::Result<T, JwsError>;

/// 未保護標頭：演算法與帳戶公鑰。
#[derive(Debug, Serialize)]
struct JwsHeader<'a> {
    alg: &'static str,
    jwk: &'a Jwk,
}

/// 保護標頭：未保護標頭聯集當前 nonce。
#[derive(Debug, Serialize)]
struct ProtectedHeader<'a> {
    alg: &'static str,
    jwk: &'a Jwk,
    nonce: &'a str,
}

/// 一個完整的簽名請求主體。
#[derive(Debug, Serialize)]
pub struct Jws<'a> {
    header: JwsHeader<'a>,
    protected: String,
    payload: String,
    signature: String,
}

impl<'a> Jws<'a> {
    /// 以帳戶金鑰對給定載荷簽名，產生可直接 POST 的 JWS。
    ///
    /// # 參數
    ///
    /// - `key_pair`: 帳戶私鑰，用於 RS256 簽名。
    /// - `jwk`: 帳戶公鑰的 JWK 表示，嵌入兩個標頭中。
    /// - `nonce`: 本次請求消耗的 `Replay-Nonce`。
    /// - `payload_b64`: 已 URL-safe Base64 編碼的載荷。
    ///
    /// # Errors
    ///
    /// 序列化或簽名失敗時返回對應的 [`JwsError`]。
    pub fn sign(
        key_pair: &KeyPair,
        jwk: &'a Jwk,
        nonce: &str,
        payload_b64: String,
    ) -> Result<Self> {
        let protected = ProtectedHeader {
            alg: ALG_RS256,
            jwk,
            nonce,
        };
        let protected64 = base64::encode(serde_json::to_string(&protected)?);

        let signing_input = format!("{}.{}", protected64, payload_b64);
        let signature = base64::encode(key_pair.sign(signing_input.as_bytes())?);

        Ok(Jws {
            header: JwsHeader {
                alg: ALG_RS256,
                jwk,
            },
            protected: protected64,
            payload: payload_b64,
            signature,
        })
    }

    /// 將 JWS 序列化為 JSON 格式的 POST 主體。
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::{hash::MessageDigest, sign::Verifier};
    use serde_json::Value;

    #[test]
    fn test_jws_structure() {
        let key_pair = KeyPair::generate(2048).unwrap();
        let jwk = Jwk::from_key_pair(&key_pair).unwrap();
        let payload = base64::encode("{\"resource\":\"new-reg\"}");

        let jws = Jws::sign(&key_pair, &jwk, "nonce-abc", payload.clone()).unwrap();
        let value: Value = serde_json::from_str(&jws.to_json().unwrap()).unwrap();

        assert_eq!(value["header"]["alg"], "RS256");
        assert_eq!(value["header"]["jwk"]["kty"], "RSA");
        assert_eq!(value["payload"], Value::String(payload));
        assert!(value["protected"].is_string());
        assert!(value["signature"].is_string());
    }

    #[test]
    fn test_protected_header_carries_nonce() {
        let key_pair = KeyPair::generate(2048).unwrap();
        let jwk = Jwk::from_key_pair(&key_pair).unwrap();

        let jws = Jws::sign(&key_pair, &jwk, "nonce-xyz", base64::encode("{}")).unwrap();
        let protected = base64::decode(&jws.protected).unwrap();
        let value: Value = serde_json::from_slice(&protected).unwrap();

        assert_eq!(value["nonce"], "nonce-xyz");
        assert_eq!(value["alg"], "RS256");
        assert_eq!(value["jwk"]["kty"], "RSA");
    }

    #[test]
    fn test_signature_verifies_over_signing_input() {
        let key_pair = KeyPair::generate(2048).unwrap();
        let jwk = Jwk::from_key_pair(&key_pair).unwrap();
        let payload = base64::encode("{\"resource\":\"new-authz\"}");

        let jws = Jws::sign(&key_pair, &jwk, "n", payload).unwrap();

        let signing_input = format!("{}.{}", jws.protected, jws.payload);
        let signature = base64::decode(&jws.signature).unwrap();

        let mut verifier = Verifier::new(MessageDigest::sha256(), key_pair.pkey()).unwrap();
        verifier.update(signing_input.as_bytes()).unwrap();
        assert!(verifier.verify(&signature).unwrap());
    }
}
