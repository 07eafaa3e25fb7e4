// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client certificate issuance for connection-settings offers.

use std::path::{Path, PathBuf};

use rcgen::{
    Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};

use crate::registry::{InstanceId, TlsCertificate};

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("no CA configured (set --ca-cert and --ca-key)")]
    NotConfigured,
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid CA: {0}")]
    InvalidCa(rcgen::Error),
    #[error("failed to issue certificate: {0}")]
    Issue(rcgen::Error),
}

/// Signs per-agent client certificates with a CA loaded at startup.
pub struct CertIssuer {
    ca_cert: Certificate,
    ca_key: KeyPair,
    ca_cert_pem: String,
    validity: time::Duration,
}

impl CertIssuer {
    pub fn from_pem(
        ca_cert_pem: &str,
        ca_key_pem: &str,
        validity_days: u32,
    ) -> Result<Self, CertError> {
        let ca_key = KeyPair::from_pem(ca_key_pem).map_err(CertError::InvalidCa)?;
        let params = CertificateParams::from_ca_cert_pem(ca_cert_pem).map_err(CertError::InvalidCa)?;
        // Re-signing keeps the issuer name and key; only the signature bytes differ.
        let ca_cert = params.self_signed(&ca_key).map_err(CertError::InvalidCa)?;
        Ok(Self {
            ca_cert,
            ca_key,
            ca_cert_pem: ca_cert_pem.to_owned(),
            validity: time::Duration::days(i64::from(validity_days)),
        })
    }

    pub fn from_files(
        ca_cert: &Path,
        ca_key: &Path,
        validity_days: u32,
    ) -> Result<Self, CertError> {
        let cert_pem = read_pem(ca_cert)?;
        let key_pem = read_pem(ca_key)?;
        Self::from_pem(&cert_pem, &key_pem, validity_days)
    }

    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// Issue a fresh client-auth certificate and key for `id`.
    pub fn issue_client_cert(&self, id: &InstanceId) -> Result<TlsCertificate, CertError> {
        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(CertError::Issue)?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, id.to_string());
        dn.push(DnType::OrganizationName, "fleetd agent");
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.key_usages =
            vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + self.validity;

        let key_pair = KeyPair::generate().map_err(CertError::Issue)?;
        let cert =
            params.signed_by(&key_pair, &self.ca_cert, &self.ca_key).map_err(CertError::Issue)?;

        let fingerprint = ring::digest::digest(&ring::digest::SHA256, cert.der());
        tracing::info!(instance_id = %id, "issued client certificate");
        Ok(TlsCertificate {
            cert_pem: cert.pem(),
            private_key_pem: key_pair.serialize_pem(),
            ca_cert_pem: self.ca_cert_pem.clone(),
            sha256_fingerprint: hex::encode(fingerprint.as_ref()),
        })
    }
}

fn read_pem(path: &Path) -> Result<String, CertError> {
    std::fs::read_to_string(path).map_err(|source| CertError::Read { path: path.to_owned(), source })
}

#[cfg(test)]
#[path = "certs_tests.rs"]
mod tests;
