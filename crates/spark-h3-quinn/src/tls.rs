//! TLS 材料加载与 QUIC 服务端配置。
//!
//! 证书链与私钥均以 PEM 读取；握手固定 TLS 1.3，ALPN 仅通告 `h3`。
//! 明文私钥直接交给 rustls；`ENCRYPTED PRIVATE KEY`（PKCS#8 + PBES2）由 `pkcs8` 以口令解密后
//! 再交给 rustls。

use std::fs;
use std::sync::Arc;

use pkcs8::EncryptedPrivateKeyInfo;
use pkcs8::der::Document;
use quinn::crypto::rustls::QuicServerConfig;
use quinn::{IdleTimeout, TransportConfig, VarInt};
use rustls_pki_types::pem::{self, PemObject};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use spark_h3::{EngineError, EngineLimits, TransportOptions};
use tracing::debug;

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// HTTP/3 的 ALPN 标识。
pub const ALPN_H3: &[u8] = b"h3";

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, EngineError> {
    value
        .filter(|path| !path.is_empty())
        .ok_or_else(|| EngineError::tls(format!("{what} file not configured")))
}

/// 读取 PEM 证书链。
pub fn load_certificates(path: &str) -> Result<Vec<CertificateDer<'static>>, EngineError> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|error| {
            EngineError::tls(format!("cannot load certificate chain `{path}`: {error}"))
        })?;
    if certs.is_empty() {
        return Err(EngineError::tls(format!(
            "certificate file `{path}` contains no certificates"
        )));
    }
    Ok(certs)
}

/// 读取 PEM 私钥。
///
/// # 契约
/// - 明文 PKCS#8、PKCS#1、SEC1 直接返回，此时口令不参与；
/// - 文件中只有 `ENCRYPTED PRIVATE KEY` 时需要 `passphrase`，解密结果为 PKCS#8；
/// - 口令缺失或错误均为 [`EngineError::Tls`]。
pub fn load_private_key(
    path: &str,
    passphrase: Option<&str>,
) -> Result<PrivateKeyDer<'static>, EngineError> {
    match PrivateKeyDer::from_pem_file(path) {
        Ok(key) => {
            if passphrase.is_some() {
                debug!(key_file = path, "private key is not encrypted, passphrase unused");
            }
            Ok(key)
        }
        Err(pem::Error::NoItemsFound) => match passphrase {
            Some(passphrase) => decrypt_private_key(path, passphrase),
            None => Err(EngineError::tls(format!(
                "private key `{path}` holds no unencrypted key; an encrypted key needs a passphrase"
            ))),
        },
        Err(other) => Err(EngineError::tls(format!(
            "cannot load private key `{path}`: {other}"
        ))),
    }
}

fn decrypt_private_key(path: &str, passphrase: &str) -> Result<PrivateKeyDer<'static>, EngineError> {
    let text = fs::read_to_string(path)
        .map_err(|error| EngineError::io(format!("read private key `{path}`"), error))?;
    let (label, document) = Document::from_pem(&text).map_err(|error| {
        EngineError::tls(format!("private key `{path}` is not a PEM key: {error}"))
    })?;
    if label != ENCRYPTED_KEY_LABEL {
        return Err(EngineError::tls(format!(
            "private key `{path}` has unsupported PEM label `{label}`"
        )));
    }
    let encrypted = EncryptedPrivateKeyInfo::try_from(document.as_bytes()).map_err(|error| {
        EngineError::tls(format!("malformed encrypted private key `{path}`: {error}"))
    })?;
    let secret = encrypted.decrypt(passphrase).map_err(|error| {
        EngineError::tls(format!(
            "cannot decrypt private key `{path}` (wrong passphrase?): {error}"
        ))
    })?;
    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        secret.as_bytes().to_vec(),
    )))
}

/// 由传输参数构造 rustls 服务端配置。
pub fn server_crypto(options: &TransportOptions) -> Result<rustls::ServerConfig, EngineError> {
    let cert_path = required(options.cert_file.as_deref(), "certificate")?;
    let key_path = required(options.key_file.as_deref(), "private key")?;
    let passphrase = options
        .passphrase
        .as_deref()
        .filter(|passphrase| !passphrase.is_empty());

    let certs = load_certificates(cert_path)?;
    let key = load_private_key(key_path, passphrase)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|error| EngineError::tls(error.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|error| EngineError::tls(format!("certificate and key rejected: {error}")))?;
    config.alpn_protocols = vec![ALPN_H3.to_vec()];
    Ok(config)
}

/// 组装 quinn 服务端配置：TLS 参数叠加引擎限额。
pub fn server_config(
    options: &TransportOptions,
    limits: &EngineLimits,
) -> Result<quinn::ServerConfig, EngineError> {
    let crypto = QuicServerConfig::try_from(server_crypto(options)?)
        .map_err(|error| EngineError::tls(error.to_string()))?;

    let idle = IdleTimeout::try_from(limits.idle_timeout()).map_err(|_| EngineError::Config {
        reason: format!("idle timeout {}ms is out of range", limits.idle_timeout_ms),
    })?;
    let mut transport = TransportConfig::default();
    transport
        .max_idle_timeout(Some(idle))
        .max_concurrent_bidi_streams(VarInt::from_u32(limits.max_concurrent_streams));

    let mut config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
    config.transport_config(Arc::new(transport));
    Ok(config)
}
