//! 集成测试共用的自签名身份。

#![allow(dead_code)]

use std::fs;

use rustls_pki_types::CertificateDer;
use spark_h3::TransportOptions;
use tempfile::TempDir;

/// 写入临时目录的证书与私钥；目录随该值一起释放。
pub struct Identity {
    pub options: TransportOptions,
    pub cert: CertificateDer<'static>,
    _dir: TempDir,
}

pub fn write_identity() -> anyhow::Result<Identity> {
    let dir = tempfile::tempdir()?;
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])?;
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    fs::write(&cert_path, cert.pem())?;
    fs::write(&key_path, key_pair.serialize_pem())?;
    Ok(Identity {
        options: TransportOptions::new(
            key_path.display().to_string(),
            cert_path.display().to_string(),
        ),
        cert: cert.der().clone(),
        _dir: dir,
    })
}
