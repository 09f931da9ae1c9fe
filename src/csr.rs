//! PKCS#10 證書簽名請求（CSR）的構建。

use openssl::{
    hash::MessageDigest,
    stack::Stack,
    x509::{
        extension::{BasicConstraints, KeyUsage, SubjectAlternativeName},
        X509NameBuilder, X509Req,
    },
};
use thiserror::Error;

use crate::{base64, config::DistinguishedName, key::KeyPair};

/// 用於描述建立 CSR 過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("No domains to request")]
    NoDomains,
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedDigest(String),
}

type Result<T> = std::result::Result<T, CsrError>;

/// CSR 建構器。
///
/// 主體的 `commonName` 取第一個域名，`subjectAltName` 擴展依輸入順序
/// 列出全部域名的 `DNS:` 項目，另帶 `basicConstraints = CA:FALSE` 與
/// `keyUsage = nonRepudiation, digitalSignature, keyEncipherment`。
pub struct CsrBuilder<'a> {
    domains: &'a [String],
    dn: &'a DistinguishedName,
    digest_alg: &'a str,
}

impl<'a> CsrBuilder<'a> {
    pub fn new(domains: &'a [String], dn: &'a DistinguishedName, digest_alg: &'a str) -> Self {
        CsrBuilder {
            domains,
            dn,
            digest_alg,
        }
    }

    /// 以指定的域名金鑰構建並簽署 X509 請求。
    ///
    /// # 錯誤
    ///
    /// 域名清單為空時返回 [`CsrError::NoDomains`]；摘要演算法名稱無法
    /// 識別時返回 [`CsrError::UnsupportedDigest`]；其餘 OpenSSL 層級的
    /// 失敗以 [`CsrError::OpenSsl`] 回傳。
    pub fn build(&self, key_pair: &KeyPair) -> Result<X509Req> {
        if self.domains.is_empty() {
            return Err(CsrError::NoDomains);
        }
        let digest = MessageDigest::from_name(self.digest_alg)
            .ok_or_else(|| CsrError::UnsupportedDigest(self.digest_alg.to_string()))?;

        let mut req_builder = X509Req::builder()?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_text("C", &self.dn.country_name)?;
        if let Some(state) = &self.dn.state_or_province_name {
            name.append_entry_by_text("ST", state)?;
        }
        if let Some(locality) = &self.dn.locality_name {
            name.append_entry_by_text("L", locality)?;
        }
        if let Some(organization) = &self.dn.organization_name {
            name.append_entry_by_text("O", organization)?;
        }
        if let Some(unit) = &self.dn.organizational_unit_name {
            name.append_entry_by_text("OU", unit)?;
        }
        name.append_entry_by_text("CN", &self.domains[0])?;
        req_builder.set_subject_name(&name.build())?;

        let mut extensions = Stack::new()?;
        extensions.push(BasicConstraints::new().build()?)?;
        extensions.push(
            KeyUsage::new()
                .non_repudiation()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        let mut san = SubjectAlternativeName::new();
        for domain in self.domains {
            san.dns(domain);
        }
        extensions.push(san.build(&req_builder.x509v3_context(None))?)?;
        req_builder.add_extensions(&extensions)?;

        req_builder.set_pubkey(key_pair.pkey())?;
        req_builder.sign(key_pair.pkey(), digest)?;

        Ok(req_builder.build())
    }

    /// 構建 CSR 並將 DER 重編碼為傳輸用的 URL-safe Base64。
    pub fn build_der_base64(&self, key_pair: &KeyPair) -> Result<String> {
        Ok(base64::encode(self.build(key_pair)?.to_der()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::nid::Nid;

    fn test_dn() -> DistinguishedName {
        DistinguishedName {
            country_name: "DE".to_string(),
            state_or_province_name: Some("Berlin".to_string()),
            locality_name: Some("Berlin".to_string()),
            organization_name: Some("Example GmbH".to_string()),
            organizational_unit_name: None,
        }
    }

    #[test]
    fn test_common_name_is_first_domain() {
        let domains = vec!["example.com".to_string(), "www.example.com".to_string()];
        let dn = test_dn();
        let key_pair = KeyPair::generate(2048).unwrap();

        let req = CsrBuilder::new(&domains, &dn, "sha256").build(&key_pair).unwrap();
        let cn = req
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(cn, "example.com");
    }

    #[test]
    fn test_san_lists_all_domains_in_order() {
        let domains = vec![
            "one.example".to_string(),
            "two.example".to_string(),
            "three.example".to_string(),
        ];
        let dn = test_dn();
        let key_pair = KeyPair::generate(2048).unwrap();

        let der = CsrBuilder::new(&domains, &dn, "sha256")
            .build(&key_pair)
            .unwrap()
            .to_der()
            .unwrap();

        // dNSName 項目以 IA5String 依輸入順序出現在 DER 中
        let positions: Vec<usize> = domains
            .iter()
            .map(|d| {
                der.windows(d.len())
                    .position(|w| w == d.as_bytes())
                    .unwrap_or_else(|| panic!("{} missing from CSR", d))
            })
            .collect();
        assert!(positions[0] < positions[1] && positions[1] < positions[2]);
    }

    #[test]
    fn test_request_signature_is_valid() {
        let domains = vec!["example.com".to_string()];
        let dn = test_dn();
        let key_pair = KeyPair::generate(2048).unwrap();

        let req = CsrBuilder::new(&domains, &dn, "sha256").build(&key_pair).unwrap();
        assert!(req.verify(key_pair.pkey()).unwrap());
    }

    #[test]
    fn test_empty_domains_rejected() {
        let dn = test_dn();
        let key_pair = KeyPair::generate(2048).unwrap();
        let result = CsrBuilder::new(&[], &dn, "sha256").build(&key_pair);
        assert!(matches!(result, Err(CsrError::NoDomains)));
    }

    #[test]
    fn test_unknown_digest_rejected() {
        let domains = vec!["example.com".to_string()];
        let dn = test_dn();
        let key_pair = KeyPair::generate(2048).unwrap();
        let result = CsrBuilder::new(&domains, &dn, "sha513").build(&key_pair);
        assert!(matches!(result, Err(CsrError::UnsupportedDigest(_))));
    }
}
