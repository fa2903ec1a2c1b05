//! gRPC client for the agreement service and the connector that builds it.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

use reconcile::ports::{AgreementAuthority, AuthorityConnector};
use reconcile::{AgreementSettings, AuthorityError, UserLogin, Verdict};

use crate::proto::{GetSignedStatusRequest, GetSignedStatusResponse, GET_SIGNED_STATUS_PATH};

/// Default connect and per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected agreement service client.
///
/// Cheap to clone; clones share one HTTP/2 channel.
#[derive(Debug, Clone)]
pub struct GrpcAuthority {
    grpc: Grpc<Channel>,
    bearer: MetadataValue<Ascii>,
}

impl GrpcAuthority {
    pub fn new(channel: Channel, bearer: MetadataValue<Ascii>) -> Self {
        Self {
            grpc: Grpc::new(channel),
            bearer,
        }
    }
}

#[async_trait]
impl AgreementAuthority for GrpcAuthority {
    async fn signed_status(&self, login: &UserLogin) -> Result<Verdict, AuthorityError> {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| AuthorityError::Unavailable {
                message: e.to_string(),
            })?;

        let mut request = tonic::Request::new(GetSignedStatusRequest {
            github_username: login.as_str().to_owned(),
        });
        request
            .metadata_mut()
            .insert("authorization", self.bearer.clone());

        let codec = ProstCodec::<GetSignedStatusRequest, GetSignedStatusResponse>::default();
        let response = grpc
            .unary(request, PathAndQuery::from_static(GET_SIGNED_STATUS_PATH), codec)
            .await
            .map_err(|status| AuthorityError::Rpc {
                message: format!("{:?}: {}", status.code(), status.message()),
            })?;

        let signed = response.into_inner().has_signed;
        debug!(login = %login, signed, "Agreement status lookup");
        Ok(Verdict::from_signed(signed))
    }
}

/// Reads the bearer credential from `path` and turns it into request
/// metadata.
pub async fn load_credential(path: &Path) -> Result<MetadataValue<Ascii>, AuthorityError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AuthorityError::Credential {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(AuthorityError::Credential {
            message: format!("{} is empty", path.display()),
        });
    }
    format!("Bearer {token}")
        .parse()
        .map_err(|_| AuthorityError::Credential {
            message: format!("{} contains characters not allowed in metadata", path.display()),
        })
}

/// Builds a [`GrpcAuthority`] from the `[agreement]` settings on demand.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    endpoint: Option<String>,
    credential_path: Option<PathBuf>,
    timeout: Duration,
}

impl GrpcConnector {
    pub fn new(endpoint: Option<String>, credential_path: Option<PathBuf>) -> Self {
        Self {
            endpoint,
            credential_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &AgreementSettings) -> Self {
        Self::new(settings.endpoint.clone(), settings.credential_path.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> Result<Endpoint, AuthorityError> {
        let uri = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthorityError::NotConfigured {
                message: "no endpoint".into(),
            })?;

        let endpoint = Endpoint::from_shared(uri.to_owned())
            .map_err(|e| AuthorityError::NotConfigured {
                message: format!("invalid endpoint '{uri}': {e}"),
            })?
            .connect_timeout(self.timeout)
            .timeout(self.timeout);

        if uri.starts_with("https://") {
            return endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| AuthorityError::Unavailable {
                    message: format!("TLS setup failed: {e}"),
                });
        }

        let host = endpoint.uri().host().unwrap_or_default();
        if !is_loopback(host) {
            return Err(AuthorityError::NotConfigured {
                message: format!("endpoint '{uri}' must use https"),
            });
        }
        warn!(endpoint = %uri, "Connecting to agreement authority without TLS");
        Ok(endpoint)
    }
}

/// Plaintext is only accepted for a local authority.
fn is_loopback(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

#[async_trait]
impl AuthorityConnector for GrpcConnector {
    async fn connect(&self) -> Result<Arc<dyn AgreementAuthority>, AuthorityError> {
        let endpoint = self.endpoint()?;
        let credential_path = self
            .credential_path
            .as_deref()
            .ok_or_else(|| AuthorityError::NotConfigured {
                message: "no credential path".into(),
            })?;
        let bearer = load_credential(credential_path).await?;

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| AuthorityError::Unavailable {
                message: format!("{}: {e}", endpoint.uri()),
            })?;
        info!(endpoint = %endpoint.uri(), "Agreement authority channel established");
        Ok(Arc::new(GrpcAuthority::new(channel, bearer)))
    }
}
