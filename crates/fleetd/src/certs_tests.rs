// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rcgen::{BasicConstraints, DnValue};

use super::*;

/// Generate a throwaway CA and return its (cert, key) PEM.
fn test_ca() -> anyhow::Result<(String, String)> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "fleetd test CA");
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
    let key = KeyPair::generate()?;
    let cert = params.self_signed(&key)?;
    Ok((cert.pem(), key.serialize_pem()))
}

#[test]
fn issues_client_cert_for_instance() -> anyhow::Result<()> {
    let (ca_pem, key_pem) = test_ca()?;
    let issuer = CertIssuer::from_pem(&ca_pem, &key_pem, 30)?;
    let id = InstanceId::new_v4();

    let cert = issuer.issue_client_cert(&id)?;
    assert!(cert.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
    assert!(cert.private_key_pem.contains("PRIVATE KEY"));
    assert_eq!(cert.ca_cert_pem, ca_pem);
    assert_eq!(cert.sha256_fingerprint.len(), 64);

    let parsed = CertificateParams::from_ca_cert_pem(&cert.cert_pem)?;
    match parsed.distinguished_name.get(&DnType::CommonName) {
        Some(DnValue::Utf8String(cn)) => assert_eq!(cn, &id.to_string()),
        other => anyhow::bail!("unexpected common name: {other:?}"),
    }
    assert!(parsed.extended_key_usages.contains(&ExtendedKeyUsagePurpose::ClientAuth));
    Ok(())
}

#[test]
fn every_issue_gets_a_fresh_key() -> anyhow::Result<()> {
    let (ca_pem, key_pem) = test_ca()?;
    let issuer = CertIssuer::from_pem(&ca_pem, &key_pem, 30)?;
    let id = InstanceId::new_v4();

    let first = issuer.issue_client_cert(&id)?;
    let second = issuer.issue_client_cert(&id)?;
    assert_ne!(first.private_key_pem, second.private_key_pem);
    assert_ne!(first.sha256_fingerprint, second.sha256_fingerprint);
    Ok(())
}

#[test]
fn loads_ca_from_files() -> anyhow::Result<()> {
    let (ca_pem, key_pem) = test_ca()?;
    let dir = tempfile::tempdir()?;
    let cert_path = dir.path().join("ca.cert.pem");
    let key_path = dir.path().join("ca.key.pem");
    std::fs::write(&cert_path, &ca_pem)?;
    std::fs::write(&key_path, &key_pem)?;

    let issuer = CertIssuer::from_files(&cert_path, &key_path, 365)?;
    assert_eq!(issuer.ca_cert_pem(), ca_pem);
    issuer.issue_client_cert(&InstanceId::new_v4())?;
    Ok(())
}

#[test]
fn missing_ca_file_names_the_path() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("nope.pem");
    let err = match CertIssuer::from_files(&missing, &missing, 1) {
        Ok(_) => anyhow::bail!("expected an error"),
        Err(e) => e,
    };
    assert!(matches!(err, CertError::Read { .. }));
    assert!(err.to_string().contains("nope.pem"));
    Ok(())
}

#[test]
fn garbage_ca_is_rejected() {
    let result = CertIssuer::from_pem("not a cert", "not a key", 1);
    assert!(matches!(result, Err(CertError::InvalidCa(_))));
}
