use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::dns::DNSPacket;
use crate::error::{AttemptError, ExchangeError, Result, TransportError};
use crate::lookup::{HostResolver, SystemResolver};
use crate::tkey::{ExchangeRequest, ExchangeResult, validate_response};
use crate::transport::{TcpTransport, Transport};
use crate::tsig::{SignedQuery, SigningContext};

/// Performs TKEY exchanges against a nameserver.
///
/// Each call to [`TkeyClient::exchange`] is independent: the signing
/// context, query id and attempt history belong to that call alone.
#[derive(Clone)]
pub struct TkeyClient {
    config: ClientConfig,
    resolver: Arc<dyn HostResolver>,
    transport: Arc<dyn Transport>,
}

impl TkeyClient {
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(TcpTransport::new(&config));
        Self::with_collaborators(config, Arc::new(SystemResolver), transport)
    }

    pub fn with_collaborators(
        config: ClientConfig,
        resolver: Arc<dyn HostResolver>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            resolver,
            transport,
        }
    }

    /// Negotiates a key with `request.target_host`.
    ///
    /// Every resolved address is tried once, in order, until one returns a
    /// usable reply. The reply is then checked for the single TKEY answer.
    pub async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResult> {
        // Mode and encoding problems surface before any network activity
        let query = request.build_query()?;
        let signing = SigningContext::for_request(request)?;

        let addresses = self.resolve(&request.target_host).await?;
        let response = self.deliver(&query, &signing, &addresses).await?;

        let result = validate_response(&response)?;
        info!(
            "TKEY exchange for {} with {} succeeded (expiration={})",
            result.tkey.name, request.target_host, result.tkey.expiration
        );
        Ok(result)
    }

    async fn resolve(&self, host: &str) -> Result<Vec<SocketAddr>> {
        let ips = self
            .resolver
            .lookup(host)
            .await
            .map_err(|reason| ExchangeError::ResolutionFailure {
                host: host.to_string(),
                reason,
            })?;

        if ips.is_empty() {
            return Err(ExchangeError::ResolutionFailure {
                host: host.to_string(),
                reason: "no addresses found".to_string(),
            });
        }

        Ok(ips
            .into_iter()
            .map(|ip| SocketAddr::new(ip, self.config.port))
            .collect())
    }

    async fn deliver(
        &self,
        query: &DNSPacket,
        signing: &SigningContext,
        addresses: &[SocketAddr],
    ) -> Result<DNSPacket> {
        let mut failures = Vec::new();

        for &address in addresses {
            match self.attempt(query, signing, address).await {
                Ok(response) => return Ok(response),
                Err(cause) => {
                    debug!("TKEY query to {} failed: {}", address, cause);
                    failures.push(AttemptError { address, cause });
                }
            }
        }

        warn!("All {} address(es) failed for TKEY query", failures.len());
        Err(ExchangeError::TransportFailure(failures))
    }

    /// One delivery to one address. A reply that parses, carries the query
    /// id and has QR set ends the failover loop even if its TSIG is bad.
    async fn attempt(
        &self,
        query: &DNSPacket,
        signing: &SigningContext,
        address: SocketAddr,
    ) -> std::result::Result<DNSPacket, TransportError> {
        // Fresh signature per attempt so the signed time stays current
        let signed: SignedQuery = signing.sign(query).map_err(TransportError::Signing)?;

        let reply = self.transport.exchange(address, &signed.bytes).await?;
        let response = DNSPacket::parse(&reply)?;

        if response.header.id != signed.id {
            return Err(TransportError::IdMismatch {
                expected: signed.id,
                received: response.header.id,
            });
        }
        if !response.header.qr {
            return Err(TransportError::NotAResponse);
        }

        if let Err(e) = signing.verify_response(&signed, &reply) {
            warn!("Response from {} failed TSIG verification: {}", address, e);
        }

        debug!(
            "Usable reply from {}: rcode={}, answers={}, additional={}",
            address,
            response.response_code(),
            response.answers.len(),
            response.resources.len()
        );
        Ok(response)
    }
}

impl std::fmt::Debug for TkeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TkeyClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Runs one exchange with default settings over the system resolver and
/// TCP.
pub async fn exchange_tkey(request: ExchangeRequest) -> Result<ExchangeResult> {
    TkeyClient::new(ClientConfig::default()).exchange(&request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tkey::{TkeyMode, TkeyRecord};
    use crate::tsig::{TsigKey, request_mac_for_test, sign_response_for_test, unix_time};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SECRET: &str = "c2VjcmV0LWtleS1tYXRlcmlhbA==";

    /// Answers one TCP query with a TKEY reply signed by `key` (if any).
    async fn serve_once(listener: TcpListener, key: Option<TsigKey>) -> Vec<u8> {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut len = [0u8; 2];
        socket.read_exact(&mut len).await.unwrap();
        let mut query_bytes = vec![0; u16::from_be_bytes(len) as usize];
        socket.read_exact(&mut query_bytes).await.unwrap();
        let query = DNSPacket::parse(&query_bytes).unwrap();

        let request_tkey = TkeyRecord::from_resource(&query.resources[0]).unwrap();
        let mut answer = request_tkey.clone();
        answer.key = "feed".to_string();
        answer.key_size = 2;

        let mut reply = DNSPacket::default();
        reply.header.id = query.header.id;
        reply.header.qr = true;
        reply.questions = query.questions.clone();
        reply.answers.push(answer.to_resource().unwrap());

        let bytes = match key {
            Some(key) => {
                let mac = request_mac_for_test(&query_bytes);
                sign_response_for_test(&key, &mac, &reply, unix_time(), 0)
            }
            None => reply.serialize().unwrap(),
        };

        socket.write_all(&(bytes.len() as u16).to_be_bytes()).await.unwrap();
        socket.write_all(&bytes).await.unwrap();
        query_bytes
    }

    fn loopback_client(port: u16) -> TkeyClient {
        TkeyClient::new(ClientConfig {
            port,
            ..ClientConfig::default()
        })
    }

    #[tokio::test]
    async fn test_tsig_signed_exchange_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let key = TsigKey::from_base64("update-key.example.com.", "hmac-sha256", SECRET).unwrap();
        let server = tokio::spawn(serve_once(listener, Some(key)));

        let request = ExchangeRequest::new("127.0.0.1", "tkey.example.com.", "hmac-sha256.", TkeyMode::DiffieHellman)
            .with_lifetime(3600)
            .with_key_material(vec![0xAA; 16])
            .with_tsig("update-key.example.com.", "hmac-sha256", SECRET);

        let result = loopback_client(port).exchange(&request).await.unwrap();
        assert_eq!(result.tkey.key, "feed");
        assert_eq!(result.tkey.mode, 2);
        assert!(result.additional_records.is_empty());

        let sent = DNSPacket::parse(&server.await.unwrap()).unwrap();
        assert_eq!(sent.resources.len(), 2);
        assert_eq!(sent.resources[1].name(), "update-key.example.com.");
    }

    #[tokio::test]
    async fn test_gss_exchange_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_once(listener, None));

        let request = ExchangeRequest::new("127.0.0.1", "tkey.example.com.", "gss-tsig.", TkeyMode::Gss)
            .with_lifetime(60)
            .with_key_material(b"token".to_vec())
            .with_tsig("update-key.example.com.", "hmac-sha256", SECRET);

        let result = loopback_client(port).exchange(&request).await.unwrap();
        assert_eq!(result.tkey.algorithm, "gss-tsig.");

        // GSS negotiation never attaches a TSIG
        let sent = DNSPacket::parse(&server.await.unwrap()).unwrap();
        assert_eq!(sent.resources.len(), 1);
        let sent_tkey = TkeyRecord::from_resource(&sent.resources[0]).unwrap();
        assert_eq!(sent_tkey.key_bytes().unwrap(), b"token".to_vec());
    }

    #[tokio::test]
    async fn test_wrong_tsig_key_still_returns_result() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let other = TsigKey::from_base64("update-key.example.com.", "hmac-sha256", "b3RoZXI=").unwrap();
        let _server = tokio::spawn(serve_once(listener, Some(other)));

        let request = ExchangeRequest::new("127.0.0.1", "tkey.example.com.", "hmac-sha256.", TkeyMode::Delete)
            .with_tsig("update-key.example.com.", "hmac-sha256", SECRET);

        let result = loopback_client(port).exchange(&request).await.unwrap();
        assert_eq!(result.tkey.inception, 0);
        assert_eq!(result.tkey.expiration, 0);
    }

    #[tokio::test]
    async fn test_unreachable_port_reports_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = ExchangeRequest::new("127.0.0.1", "tkey.example.com.", "gss-tsig.", TkeyMode::Gss);
        match loopback_client(port).exchange(&request).await {
            Err(ExchangeError::TransportFailure(attempts)) => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].address, SocketAddr::new([127, 0, 0, 1].into(), port));
            }
            other => panic!("Expected TransportFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_client_debug_omits_collaborators() {
        let rendered = format!("{:?}", TkeyClient::new(ClientConfig::default()));
        assert!(rendered.starts_with("TkeyClient { config: ClientConfig"));
    }
}
