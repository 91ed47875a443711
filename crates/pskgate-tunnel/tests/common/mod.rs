//! Shared helpers for tunnel integration tests

#![allow(dead_code)]

use openssl::ssl::{Ssl, SslAcceptor, SslMethod, SslVersion};
use pskgate_tunnel::{PresharedKey, TunnelConfig};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_openssl::SslStream;

pub const IDENTITY: &str = "id1";
pub const SECRET: &str = "secret1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A loopback port that was free a moment ago
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn tunnel_config(local_port: u16, remote_host: &str, remote_port: u16) -> TunnelConfig {
    TunnelConfig::new(
        local_port,
        remote_host,
        remote_port,
        PresharedKey::new(IDENTITY, SECRET).unwrap(),
    )
    .unwrap()
}

/// TLS 1.2 PSK server that echoes everything back and closes its write side
/// once the client has finished sending
pub struct PskEchoServer {
    pub addr: SocketAddr,
    key: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PskEchoServer {
    pub async fn start(bind: &str, identity: &str, key: &str) -> Self {
        let listener = TcpListener::bind(bind).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let expected_identity = identity.as_bytes().to_vec();
        let key = Arc::new(Mutex::new(key.as_bytes().to_vec()));
        let callback_key = key.clone();

        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server()).unwrap();
        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .unwrap();
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_2))
            .unwrap();
        builder.set_cipher_list("PSK").unwrap();
        builder.set_psk_server_callback(move |_ssl, identity, psk_out| {
            if identity != Some(expected_identity.as_slice()) {
                // unknown identity fails the handshake
                return Ok(0);
            }
            let key = callback_key.lock().unwrap();
            psk_out[..key.len()].copy_from_slice(&key);
            Ok(key.len())
        });
        let acceptor = Arc::new(builder.build());

        let task = tokio::spawn(async move {
            loop {
                let (tcp, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => continue,
                };
                let acceptor = acceptor.clone();

                tokio::spawn(async move {
                    let ssl = Ssl::new(acceptor.context()).unwrap();
                    let mut stream = SslStream::new(ssl, tcp).unwrap();
                    if Pin::new(&mut stream).accept().await.is_err() {
                        return;
                    }

                    let (mut reader, mut writer) = tokio::io::split(stream);
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                    let _ = writer.shutdown().await;
                });
            }
        });

        Self { addr, key, task }
    }

    /// Change the key expected from now on
    pub fn set_key(&self, key: &str) {
        *self.key.lock().unwrap() = key.as_bytes().to_vec();
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Accepts TCP connections and never says anything, holding them open
pub struct SilentServer {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl SilentServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        Self { addr, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Send `payload` through the tunnel and read the same number of bytes back
pub async fn echo_round_trip(stream: &mut TcpStream, payload: &[u8]) -> Vec<u8> {
    stream.write_all(payload).await.unwrap();

    let mut echoed = vec![0u8; payload.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut echoed))
        .await
        .expect("echo timed out")
        .expect("echo read failed");
    echoed
}

/// Whether the peer closed the connection (EOF or reset) within `within`
pub async fn closed_by_peer(stream: &mut TcpStream, within: Duration) -> bool {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(within, stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) => false,
        Err(_) => false,
    }
}

/// Poll `condition` every 20ms until it holds or `within` elapses
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
