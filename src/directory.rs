//! ACME 目錄：CA 基底 URL 與派生端點路徑。

/// 會話啟動時綁定的端點集合。
///
/// 基底 URL 的尾端斜線一律正規化移除；所有端點由基底派生。
#[derive(Debug, Clone)]
pub struct AcmeDirectory {
    base: String,
    /// nonce 的刷新來源。
    pub directory: String,
    /// 帳戶註冊端點。
    pub new_reg: String,
    /// 域名授權端點。
    pub new_authz: String,
    /// 憑證簽發端點。
    pub new_cert: String,
}

impl AcmeDirectory {
    /// 根據 CA 基底 URL 派生全部端點。
    pub fn new(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        AcmeDirectory {
            directory: format!("{}/directory", base),
            new_reg: format!("{}/acme/new-reg", base),
            new_authz: format!("{}/acme/new-authz", base),
            new_cert: format!("{}/acme/new-cert", base),
            base,
        }
    }

    /// 解析請求目標：絕對 URI 原樣通過，相對 URI 併入基底。
    pub fn resolve(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri.to_string()
        } else {
            format!("{}/{}", self.base, uri.trim_start_matches('/'))
        }
    }
}
