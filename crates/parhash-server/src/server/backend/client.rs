//! Single-buffer hashing backends.
//!
//! [`HashBackend`] is the seam between the dispatch engine and the network:
//! the engine only ever asks a backend to hash one buffer. [`GrpcBackend`] is
//! the production implementation, a long-lived tonic [`Channel`] to one
//! `hashsvc.HashService` endpoint, created once at startup and cloned per call.

use bytes::Bytes;
use core::time::Duration;
use parhash_core::{
    Error, Result,
    proto::hashsvc::{HashReq, hash_service_client::HashServiceClient},
};
use tonic::{
    Request, Status,
    transport::{Channel, Endpoint},
};

/// A downstream service that hashes exactly one buffer per call.
#[tonic::async_trait]
pub trait HashBackend: Send + Sync + 'static {
    /// Address as configured by the operator. Used as the `backend` metric
    /// label and in error messages.
    fn address(&self) -> &str;

    /// Hashes `data`.
    ///
    /// Dropping the returned future abandons the call.
    async fn hash(&self, data: Bytes) -> core::result::Result<Bytes, Status>;
}

/// A `hashsvc.HashService` endpoint reached over a shared HTTP/2 channel.
#[derive(Clone, Debug)]
pub struct GrpcBackend {
    address: String,
    client: HashServiceClient<Channel>,
}

impl GrpcBackend {
    /// Connects to `address` and waits for the channel to come up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the address is not a valid URI or the
    /// endpoint cannot be reached within `connect_timeout`.
    pub async fn connect(address: &str, connect_timeout: Duration) -> Result<Self> {
        let channel = endpoint(address, connect_timeout)?
            .connect()
            .await
            .map_err(|e| Error::Connect {
                backend: address.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::with_channel(address, channel))
    }

    /// Builds a channel to `address` that connects on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the address is not a valid URI.
    pub fn connect_lazy(address: &str, connect_timeout: Duration) -> Result<Self> {
        let channel = endpoint(address, connect_timeout)?.connect_lazy();
        Ok(Self::with_channel(address, channel))
    }

    fn with_channel(address: &str, channel: Channel) -> Self {
        Self {
            address: address.to_string(),
            client: HashServiceClient::new(channel),
        }
    }
}

#[tonic::async_trait]
impl HashBackend for GrpcBackend {
    fn address(&self) -> &str {
        &self.address
    }

    async fn hash(&self, data: Bytes) -> core::result::Result<Bytes, Status> {
        // Clients are cheap handles over the shared channel.
        let mut client = self.client.clone();
        let response = client.hash(Request::new(HashReq { data })).await?;
        Ok(response.into_inner().hash)
    }
}

/// Turns an operator-supplied address into a tonic endpoint. Bare
/// `host:port` addresses are dialled over plaintext HTTP/2.
fn endpoint(address: &str, connect_timeout: Duration) -> Result<Endpoint> {
    let uri = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let endpoint = Endpoint::from_shared(uri).map_err(|e| Error::Connect {
        backend: address.to_string(),
        reason: e.to_string(),
    })?;
    Ok(endpoint.connect_timeout(connect_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_an_http_scheme() -> Result<()> {
        let bare = endpoint("127.0.0.1:50052", Duration::from_secs(1))?;
        assert_eq!(bare.uri().scheme_str(), Some("http"));
        assert_eq!(
            bare.uri().authority().map(|a| a.as_str()),
            Some("127.0.0.1:50052")
        );

        let explicit = endpoint("https://hash.internal:443", Duration::from_secs(1))?;
        assert_eq!(explicit.uri().scheme_str(), Some("https"));
        Ok(())
    }

    #[test]
    fn malformed_address_is_a_connect_error() {
        match endpoint("not a uri", Duration::from_secs(1)) {
            Err(Error::Connect { backend, .. }) => assert_eq!(backend, "not a uri"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("malformed address accepted"),
        }
    }

    #[tokio::test]
    async fn lazy_backend_keeps_configured_address() -> Result<()> {
        let backend = GrpcBackend::connect_lazy("127.0.0.1:1", Duration::from_millis(100))?;
        assert_eq!(backend.address(), "127.0.0.1:1");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_backend_fails_eager_connect() {
        // Port 1 is privileged and not listening in any test environment.
        let err = GrpcBackend::connect("127.0.0.1:1", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect { .. }), "got {err:?}");
    }
}
