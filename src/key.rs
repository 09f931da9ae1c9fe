//! RSA 金鑰對的產生、載入、持久化與簽名。

use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;
use std::{fs, path::PathBuf};

use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use thiserror::Error;

/// 帳戶目錄下私鑰檔案的固定名稱。
pub const ACCOUNT_KEY_FILE: &str = "private.key";

/// 金鑰相關操作的錯誤列舉。
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),
    #[error("Key file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

type Result<T> = std::result::Result<T, KeyError>;

/// 表示一組 RSA 金鑰對。
///
/// 公鑰參數（模數與指數）直接由私鑰取得，供 JWK 與 CSR 使用。
#[derive(Debug)]
pub struct KeyPair {
    pri_key: PKey<Private>,
}

impl KeyPair {
    /// 預設的金鑰位數。
    pub const DEFAULT_BITS: u32 = 2048;

    /// 產生指定位數的新 RSA 金鑰對。
    ///
    /// # Errors
    ///
    /// 金鑰生成失敗時返回 [`KeyError::OpenSsl`]。
    pub fn generate(bits: u32) -> Result<Self> {
        let rsa = Rsa::generate(bits)?;
        Ok(Self {
            pri_key: PKey::from_rsa(rsa)?,
        })
    }

    /// 根據 PEM 格式的私鑰資料建立金鑰對。
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        Ok(Self {
            pri_key: PKey::private_key_from_pem(pem)?,
        })
    }

    /// 將私鑰匯出為 PKCS#8 PEM。
    pub fn to_pem(&self) -> Result<Vec<u8>> {
        Ok(self.pri_key.private_key_to_pem_pkcs8()?)
    }

    /// 從 `<dir>/private.key` 載入金鑰對；不存在時產生新金鑰並持久化。
    ///
    /// 目錄不存在時以 0700 權限建立，私鑰檔案以 0600 權限寫入。
    /// 返回值的第二個元素標記金鑰是否為本次新建（新建意味著帳戶尚未
    /// 在 CA 註冊過）。
    ///
    /// # Errors
    ///
    /// 返回 [`KeyError::Io`] 當目錄或檔案操作失敗，[`KeyError::OpenSsl`]
    /// 當金鑰生成或解析失敗。
    pub fn load_or_create(dir: &Path, bits: u32) -> Result<(Self, bool)> {
        let key_path = dir.join(ACCOUNT_KEY_FILE);

        match fs::read(&key_path) {
            Ok(pem) => return Ok((Self::from_pem(&pem)?, false)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(KeyError::Io {
                    path: key_path,
                    source: e,
                })
            }
        }

        if !dir.is_dir() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(dir)
                .map_err(|e| KeyError::Io {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
        }

        let key_pair = Self::generate(bits)?;
        let pem = key_pair.to_pem()?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&key_path)
            .map_err(|e| KeyError::Io {
                path: key_path.clone(),
                source: e,
            })?;
        file.write_all(&pem).map_err(|e| KeyError::Io {
            path: key_path,
            source: e,
        })?;

        Ok((key_pair, true))
    }

    /// 取得 RSA 公鑰參數 `(n, e)`，皆為 big-endian 無符號位元組串。
    pub fn rsa_components(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let rsa = self.pri_key.rsa()?;
        Ok((rsa.n().to_vec(), rsa.e().to_vec()))
    }

    /// 以 RSA-PKCS#1 v1.5 搭配 SHA-256 對資料簽名。
    ///
    /// # Errors
    ///
    /// 簽名過程失敗時返回 [`KeyError::OpenSsl`]。
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.pri_key)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }

    /// 內部私鑰的引用，供 CSR 簽署使用。
    pub fn pkey(&self) -> &PKey<Private> {
        &self.pri_key
    }
}
