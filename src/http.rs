//! 薄封裝的阻塞式 HTTP 客戶端。
//!
//! ACME 會話需要讀取回應標頭（`Location`、`Replay-Nonce`、`Link`），
//! 因此本模組將狀態碼、標頭與原始回應主體一併返回，非 2xx 回應不視為
//! 錯誤，由呼叫方自行判斷。

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use thiserror::Error;

const HEADER_REPLAY_NONCE: &str = "Replay-Nonce";
const HEADER_LOCATION: &str = "Location";
const HEADER_LINK: &str = "Link";

/// 每個 HTTP 請求的逾時上限。
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP 傳輸層可能發生的錯誤。
#[derive(Debug, Error)]
pub enum HttpError {
    /// 網路層請求失敗（連線、逾時、TLS 驗證等）。
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// 阻塞式 HTTP 客戶端。
///
/// 預設帶上 `Accept: application/json` 與 `Content-Type: application/json`
/// 標頭，驗證伺服器 TLS，不自動跟隨重定向。
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// 建立一個新的 [`HttpClient`] 實例。
    ///
    /// # 錯誤
    ///
    /// 當底層客戶端初始化失敗時返回 [`HttpError::Request`]。
    pub fn new() -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    /// 發送 GET 請求並讀取完整回應。
    pub fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let response = self.client.get(url).send()?;
        HttpResponse::read(response)
    }

    /// 發送帶主體的 POST 請求並讀取完整回應。
    pub fn post(&self, url: &str, body: String) -> Result<HttpResponse, HttpError> {
        let response = self.client.post(url).body(body).send()?;
        HttpResponse::read(response)
    }
}

/// 一次 HTTP 往返的完整結果：狀態碼、標頭區塊與原始主體。
#[derive(Debug)]
pub struct HttpResponse {
    /// HTTP 狀態碼。
    pub status: u16,
    /// 回應標頭。
    pub headers: HeaderMap,
    /// 原始回應主體。
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// 將 `reqwest` 回應讀成自有結構，主體整段載入。
    fn read(response: reqwest::blocking::Response) -> Result<Self, HttpError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes()?.to_vec();

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// 狀態碼是否為 2xx。
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 取得指定標頭的值（大小寫不敏感）；值非 UTF-8 時視為不存在。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `Location` 標頭。
    pub fn location(&self) -> Option<&str> {
        self.header(HEADER_LOCATION)
    }

    /// `Replay-Nonce` 標頭。
    pub fn replay_nonce(&self) -> Option<&str> {
        self.header(HEADER_REPLAY_NONCE)
    }

    /// 解析所有 `Link: <url>; rel="up"` 標頭，按標頭出現順序返回 URL。
    ///
    /// 同一個標頭值中允許以逗號分隔多個連結。
    pub fn up_links(&self) -> Vec<String> {
        let mut links = Vec::new();
        for value in self.headers.get_all(HEADER_LINK) {
            let Ok(value) = value.to_str() else { continue };
            for part in value.split(',') {
                let part = part.trim();
                let Some(rest) = part.strip_prefix('<') else {
                    continue;
                };
                let Some((url, params)) = rest.split_once('>') else {
                    continue;
                };
                let is_up = params.split(';').any(|p| {
                    matches!(p.trim(), "rel=\"up\"" | "rel=up")
                });
                if is_up {
                    links.push(url.to_string());
                }
            }
        }
        links
    }

    /// 回應主體的字串形式（非 UTF-8 位元組以替代字符呈現）。
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 將回應主體解析為 JSON。
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
