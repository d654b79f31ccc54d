//! Signing key and certificate, loaded, cross-checked and published as one unit
//!
//! Token issuing, token verification and TLS handshakes each load the current
//! [`KeyPair`] once from [`KeyStore`] and use it for the whole operation, so a
//! rotation never exposes a key from one pair with the certificate of another.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
#[cfg(not(target_os = "windows"))]
use rustls::crypto::aws_lc_rs as provider;
#[cfg(target_os = "windows")]
use rustls::crypto::ring as provider;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;

use crate::error::MqstoreError;
use crate::token::Claims;

pub struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    certified: Arc<CertifiedKey>,
    subject: String,
}

impl KeyPair {
    /// Build a pair from PEM contents. The certificate's public key must verify a
    /// token signed with the private key, otherwise the pair is rejected.
    pub fn from_pem(key_pem: &[u8], cert_pem: &[u8]) -> Result<Self, MqstoreError> {
        let encoding = EncodingKey::from_rsa_pem(key_pem)
            .map_err(|e| MqstoreError::config_reload(format!("bad private key, {}", e)))?;

        let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem)
            .map_err(|e| MqstoreError::config_reload(format!("bad certificate pem, {}", e)))?;
        let cert = pem.parse_x509().map_err(|e| MqstoreError::config_reload(format!("bad certificate, {}", e)))?;
        let decoding = DecodingKey::from_rsa_der(cert.public_key().subject_public_key.data.as_ref());
        let subject = cert.subject().to_string();

        Self::self_check(&encoding, &decoding)?;

        let chain = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MqstoreError::config_reload(format!("bad certificate chain, {:?}", e)))?;
        let key = PrivateKeyDer::from_pem_slice(key_pem)
            .map_err(|e| MqstoreError::config_reload(format!("bad private key, {:?}", e)))?;
        let signing_key = provider::default_provider()
            .key_provider
            .load_private_key(key)
            .map_err(|e| MqstoreError::config_reload(format!("unsupported private key, {}", e)))?;
        let certified = Arc::new(CertifiedKey::new(chain, signing_key));

        Ok(Self { encoding, decoding, certified, subject })
    }

    /// Read both files, then build the pair
    pub async fn load(key_path: &str, cert_path: &str) -> Result<Self, MqstoreError> {
        let key_pem = tokio::fs::read(key_path)
            .await
            .map_err(|e| MqstoreError::config_reload(format!("read {} failure, {}", key_path, e)))?;
        let cert_pem = tokio::fs::read(cert_path)
            .await
            .map_err(|e| MqstoreError::config_reload(format!("read {} failure, {}", cert_path, e)))?;
        Self::from_pem(&key_pem, &cert_pem)
    }

    fn self_check(encoding: &EncodingKey, decoding: &DecodingKey) -> Result<(), MqstoreError> {
        let now = mqstore_utils::timestamp_secs();
        let claims = Claims { username: "keypair-check".into(), iat: now, exp: now + 60 };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, encoding)
            .map_err(|e| MqstoreError::config_reload(format!("sign with private key failure, {}", e)))?;
        jsonwebtoken::decode::<Claims>(&token, decoding, &Validation::new(Algorithm::RS256))
            .map_err(|e| MqstoreError::config_reload(format!("private key does not match certificate, {}", e)))?;
        Ok(())
    }

    #[inline]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    #[inline]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    #[inline]
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        self.certified.clone()
    }

    #[inline]
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair {{ subject: {} }}", self.subject)
    }
}

pub struct KeyStore {
    current: ArcSwap<KeyPair>,
}

impl KeyStore {
    #[inline]
    pub fn new(pair: KeyPair) -> Self {
        Self { current: ArcSwap::from_pointee(pair) }
    }

    #[inline]
    pub fn load(&self) -> Arc<KeyPair> {
        self.current.load_full()
    }

    #[inline]
    pub fn swap(&self, pair: KeyPair) -> Arc<KeyPair> {
        log::info!("keypair rotated, subject: {}", pair.subject());
        self.current.swap(Arc::new(pair))
    }
}

/// Hands every TLS handshake the certificate of the pair current at hello time
pub struct CertResolver {
    keys: Arc<KeyStore>,
}

impl CertResolver {
    #[inline]
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }
}

impl fmt::Debug for CertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertResolver {{ {:?} }}", self.keys.load())
    }
}

impl ResolvesServerCert for CertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.keys.load().certified_key())
    }
}

/// Crypto provider used for keys and TLS, aws-lc-rs or ring on windows
#[inline]
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(provider::default_provider())
}

/// Server TLS configuration bound to the hot-swapped keypair
pub fn server_config(keys: Arc<KeyStore>) -> crate::Result<rustls::ServerConfig> {
    let mut cfg = rustls::ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| anyhow::anyhow!(e))?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(CertResolver::new(keys)));
    cfg.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(cfg)
}
