//! TLS 1.2 client context authenticated by a pre-shared key
//!
//! No certificates are involved: the cipher list is restricted to PSK suites
//! and peer verification is disabled, so trust rests on the shared secret.

use crate::error::{SessionError, TunnelError};
use openssl::error::ErrorStack;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode, SslVersion};
use pskgate_config::PresharedKey;
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

/// OpenSSL's `PSK_MAX_IDENTITY_LEN`
const MAX_IDENTITY_LEN: usize = 128;

/// OpenSSL's `PSK_MAX_PSK_LEN`
const MAX_SECRET_LEN: usize = 256;

const PSK_CIPHERS: &str = "PSK";

/// Shared, immutable client context. Cloning is cheap.
#[derive(Clone)]
pub(crate) struct PskConnector {
    connector: SslConnector,
}

impl PskConnector {
    pub fn new(psk: &PresharedKey) -> Result<Self, TunnelError> {
        let identity = psk.identity().as_bytes().to_vec();
        let secret = psk.secret().to_vec();

        if identity.contains(&0) {
            return Err(TunnelError::Tls(
                "PSK identity must not contain NUL bytes".to_string(),
            ));
        }
        if identity.len() > MAX_IDENTITY_LEN {
            return Err(TunnelError::Tls(format!(
                "PSK identity is {} bytes, at most {} are supported",
                identity.len(),
                MAX_IDENTITY_LEN
            )));
        }
        if secret.len() > MAX_SECRET_LEN {
            return Err(TunnelError::Tls(format!(
                "PSK secret is {} bytes, at most {} are supported",
                secret.len(),
                MAX_SECRET_LEN
            )));
        }

        let mut builder = SslConnector::builder(SslMethod::tls_client())?;
        builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
        builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;
        builder.set_cipher_list(PSK_CIPHERS)?;
        builder.set_verify(SslVerifyMode::NONE);

        builder.set_psk_client_callback(move |_ssl, _hint, identity_out, secret_out| {
            // identity is written NUL-terminated
            if identity.len() >= identity_out.len() || secret.len() > secret_out.len() {
                return Err(ErrorStack::get());
            }
            identity_out[..identity.len()].copy_from_slice(&identity);
            identity_out[identity.len()] = 0;
            secret_out[..secret.len()].copy_from_slice(&secret);
            Ok(secret.len())
        });

        Ok(Self {
            connector: builder.build(),
        })
    }

    /// Run the client handshake over an already connected socket.
    ///
    /// `server_name` is sent as SNI unless it is an IP literal.
    pub async fn handshake(
        &self,
        server_name: &str,
        address: &str,
        tcp: TcpStream,
    ) -> Result<SslStream<TcpStream>, SessionError> {
        let handshake_error = |reason: String| SessionError::Handshake {
            address: address.to_string(),
            reason,
        };

        let ssl = self
            .connector
            .configure()
            .and_then(|config| config.verify_hostname(false).into_ssl(server_name))
            .map_err(|e| handshake_error(e.to_string()))?;

        let mut stream = SslStream::new(ssl, tcp).map_err(|e| handshake_error(e.to_string()))?;

        Pin::new(&mut stream)
            .connect()
            .await
            .map_err(|e| handshake_error(e.to_string()))?;

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_builds_for_valid_key() {
        let psk = PresharedKey::new("id1", "secret1").unwrap();
        assert!(PskConnector::new(&psk).is_ok());
    }

    #[test]
    fn test_identity_too_long() {
        let psk = PresharedKey::new("x".repeat(MAX_IDENTITY_LEN + 1), "secret1").unwrap();
        match PskConnector::new(&psk) {
            Err(TunnelError::Tls(reason)) => assert!(reason.contains("identity")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("oversized identity accepted"),
        }
    }

    #[test]
    fn test_secret_too_long() {
        let psk = PresharedKey::new("id1", "k".repeat(MAX_SECRET_LEN + 1)).unwrap();
        assert!(matches!(PskConnector::new(&psk), Err(TunnelError::Tls(_))));
    }

    #[test]
    fn test_identity_with_nul_rejected() {
        let psk = PresharedKey::new("id\0one", "secret1").unwrap();
        assert!(matches!(PskConnector::new(&psk), Err(TunnelError::Tls(_))));
    }
}
