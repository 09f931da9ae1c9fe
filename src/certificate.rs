//! 憑證的 PEM 封裝、簽發結果包與 DH 參數處理。

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use openssl::dh::Dh;
use thiserror::Error;

/// 證書打包相關操作可能出現的錯誤類型。
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("DH parameter file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 一次簽發流程的完整產物。
#[derive(Debug)]
pub struct CertificateBundle {
    /// 葉憑證（PEM）。
    pub leaf: String,
    /// 簽發者憑證鏈（PEM，依 `Link: rel="up"` 標頭順序串接）。
    pub chain: String,
    /// 域名私鑰（PEM）。
    pub key: String,
    /// DH 參數（PEM），未配置時為 `None`。
    pub dh_params: Option<String>,
}

/// 將 DER 格式的憑證封裝為 PEM。
///
/// 輸出為 `-----BEGIN CERTIFICATE-----`、每行 64 字符的標準 Base64
/// 內容與 `-----END CERTIFICATE-----`，各行以 `\n` 結尾。
pub fn pem_from_der(der: &[u8]) -> String {
    let encoded = openssl::base64::encode_block(der);
    let mut pem = String::with_capacity(encoded.len() + encoded.len() / 64 + 64);

    pem.push_str("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).expect("Base64 is ASCII"));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// 讀取既有的 DH 參數檔案；不存在時生成新參數並持久化。
///
/// 既有檔案會先經過解析驗證再原樣返回。
///
/// # Errors
///
/// 返回 [`CertificateError::OpenSsl`] 當解析或生成失敗，
/// [`CertificateError::Io`] 當檔案讀寫失敗。
pub fn load_or_generate_dh(path: &Path, bits: u32) -> Result<String, CertificateError> {
    match fs::read(path) {
        Ok(pem) => {
            Dh::params_from_pem(&pem)?;
            Ok(String::from_utf8_lossy(&pem).into_owned())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let dh = Dh::generate_params(bits, 2)?;
            let pem = dh.params_to_pem()?;
            fs::write(path, &pem).map_err(|e| CertificateError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            Ok(String::from_utf8_lossy(&pem).into_owned())
        }
        Err(e) => Err(CertificateError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pem_armor_format() {
        let der = vec![0xAB; 100];
        let pem = pem_from_der(&der);

        let lines: Vec<&str> = pem.lines().collect();
        assert_eq!(lines.first(), Some(&"-----BEGIN CERTIFICATE-----"));
        assert_eq!(lines.last(), Some(&"-----END CERTIFICATE-----"));
        assert!(pem.ends_with("-----END CERTIFICATE-----\n"));

        // 100 位元組 → 136 個 Base64 字符 → 64 + 64 + 8
        let content = &lines[1..lines.len() - 1];
        assert_eq!(content.len(), 3);
        assert_eq!(content[0].len(), 64);
        assert_eq!(content[1].len(), 64);
        assert_eq!(content[2].len(), 8);
    }

    #[test]
    fn test_pem_round_trips_through_openssl() {
        let der = vec![0x30, 0x03, 0x02, 0x01, 0x07];
        let pem = pem_from_der(&der);
        let body: String = pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();
        assert_eq!(openssl::base64::decode_block(&body).unwrap(), der);
    }

    #[test]
    fn test_dh_generate_then_reuse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dh.pem");

        // 測試使用小位數，生成大參數耗時過長
        let generated = load_or_generate_dh(&path, 512).unwrap();
        assert!(generated.contains("BEGIN DH PARAMETERS"));

        let reloaded = load_or_generate_dh(&path, 512).unwrap();
        assert_eq!(generated, reloaded);
    }
}
