//! TLS transport to the master: pinned CA or (loudly) unverified.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AgentError, AgentResult};

/// Anything the session can frame over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Dial the master, wrapping in TLS when enabled. Minimum TLS 1.2.
pub async fn connect(config: &Config) -> AgentResult<Box<dyn Transport>> {
    let address = config.master_address();
    let tcp = TcpStream::connect(&address)
        .await
        .map_err(|e| AgentError::Master(format!("connect to {} failed: {}", address, e)))?;

    if !config.tls.enabled {
        info!(%address, "connected to master (no TLS)");
        return Ok(Box::new(tcp));
    }

    let client_config = build_client_config(config)?;
    let connector = TlsConnector::from(Arc::new(client_config));
    let server_name = ServerName::try_from(config.master_host.clone())
        .map_err(|_| AgentError::Master(format!("invalid TLS server name '{}'", config.master_host)))?;

    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| AgentError::Master(format!("TLS handshake failed: {}", e)))?;

    info!(%address, "connected to master over TLS");
    Ok(Box::new(stream))
}

fn build_client_config(config: &Config) -> AgentResult<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS12,
        &rustls::version::TLS13,
    ]);

    if config.tls.skip_verify {
        warn!("TLS certificate verification disabled (INSECURE)");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    if !config.tls.ca_path.is_empty() {
        let file = std::fs::File::open(&config.tls.ca_path)
            .map_err(|e| AgentError::Master(format!("cannot read CA bundle: {}", e)))?;
        for cert in rustls_pemfile::certs(&mut std::io::BufReader::new(file)) {
            let cert = cert.map_err(|e| AgentError::Master(format!("invalid CA bundle: {}", e)))?;
            roots
                .add(cert)
                .map_err(|e| AgentError::Master(format!("invalid CA certificate: {}", e)))?;
        }
        info!(ca = %config.tls.ca_path, "loaded pinned CA bundle");
    } else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

/// Accept-anything verifier for TLS_SKIP_VERIFY deployments.
#[derive(Debug)]
struct NoVerification;

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
