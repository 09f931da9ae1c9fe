//! ACME 請求載荷（payload）的型別化定義。
//!
//! 每種請求對應一個結構，各自攜帶協議要求的 `resource` 欄位；
//! 簽名引擎只消費序列化後的 JSON。

use serde::Serialize;

use crate::base64;

/// 定義所有請求載荷共有的序列化操作。
pub trait PayloadT: Serialize {
    /// 將載荷轉換成 JSON 格式的字串。
    ///
    /// # 錯誤
    ///
    /// 若序列化失敗，則回傳 [`serde_json::Error`]。
    fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 將載荷先轉換成 JSON 字串，再以 URL-safe Base64 編碼。
    fn to_base64(&self) -> Result<String, serde_json::Error> {
        Ok(base64::encode(self.to_json_string()?))
    }
}

/// 帳戶註冊（`new-reg`）的載荷。
#[derive(Debug, Serialize)]
pub struct NewRegistrationPayload {
    resource: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    agreement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<Vec<String>>,
}

impl NewRegistrationPayload {
    /// 建立註冊載荷。`agreement` 為訂閱者協議 URL，`contact` 為
    /// 聯絡 URI 清單；兩者皆為可選。
    pub fn new(agreement: Option<&str>, contact: &[String]) -> Self {
        NewRegistrationPayload {
            resource: "new-reg",
            agreement: agreement.map(str::to_string),
            contact: if contact.is_empty() {
                None
            } else {
                Some(contact.to_vec())
            },
        }
    }
}

impl PayloadT for NewRegistrationPayload {}

/// 表示一個識別項，描述待驗證的主機名稱。
#[derive(Debug, Serialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub value: String,
}

/// 域名授權（`new-authz`）的載荷。
#[derive(Debug, Serialize)]
pub struct NewAuthorizationPayload {
    resource: &'static str,
    identifier: Identifier,
}

impl NewAuthorizationPayload {
    /// 為指定域名建立授權載荷，識別項類型固定為 `"dns"`。
    pub fn new(domain: &str) -> Self {
        NewAuthorizationPayload {
            resource: "new-authz",
            identifier: Identifier {
                type_: "dns",
                value: domain.to_string(),
            },
        }
    }
}

impl PayloadT for NewAuthorizationPayload {}

/// 挑戰應答的載荷，通知 CA 可以開始驗證。
#[derive(Debug, Serialize)]
pub struct ChallengeAnswerPayload {
    resource: &'static str,
    #[serde(rename = "type")]
    type_: String,
    #[serde(rename = "keyAuthorization")]
    key_authorization: String,
    token: String,
}

impl ChallengeAnswerPayload {
    pub fn new(kind: &str, key_authorization: &str, token: &str) -> Self {
        ChallengeAnswerPayload {
            resource: "challenge",
            type_: kind.to_string(),
            key_authorization: key_authorization.to_string(),
            token: token.to_string(),
        }
    }
}

impl PayloadT for ChallengeAnswerPayload {}

/// 憑證簽發（`new-cert`）的載荷，攜帶 URL-safe Base64 編碼的 CSR DER。
#[derive(Debug, Serialize)]
pub struct NewCertificatePayload {
    resource: &'static str,
    csr: String,
}

impl NewCertificatePayload {
    pub fn new(csr_der_b64: String) -> Self {
        NewCertificatePayload {
            resource: "new-cert",
            csr: csr_der_b64,
        }
    }
}

impl PayloadT for NewCertificatePayload {}
