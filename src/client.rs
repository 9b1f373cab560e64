use std::path::PathBuf;

use async_trait::async_trait;

use crate::{api, providers::ProviderId};

/// What storage knows about the certificate of a primary domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateMeta {
    pub exists: bool,

    /// End of validity in epoch seconds. Set whenever `exists` is.
    pub not_after: Option<i64>,

    pub cert_path: Option<PathBuf>,
}

impl CertificateMeta {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(not_after: i64, cert_path: impl Into<PathBuf>) -> Self {
        Self {
            exists: true,
            not_after: Some(not_after),
            cert_path: Some(cert_path.into()),
        }
    }
}

/// The ACME client and challenge back ends, as seen by the manager.
///
/// Orders are addressed by their primary domain. An implementation keeps whatever it needs per
/// order (order URL, authorization URLs, challenge tokens, the certificate key) and the manager
/// only drives it from one step to the next.
///
/// The `bool` returning steps report whether the step succeeded. A `false` leaves the order where
/// it was so the step is tried again on the next pass. Implementations log the reason.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Creates an order at the ACME server for `domains`, primary first.
    async fn new_order(&self, domains: &[String]) -> eyre::Result<api::Order>;

    /// Refreshes the order for `primary` (POST-as-GET), `None` when it cannot be obtained.
    async fn order_info(&self, primary: &str) -> Option<api::Order>;

    /// Fetches the authorization for `domain` within the order for `primary`.
    async fn get_authorization(&self, primary: &str, domain: &str) -> Option<api::Authorization>;

    async fn get_auth_by_url(&self, url: &str) -> eyre::Result<api::Authorization>;

    /// Provisions the challenge for `domain` through `provider`: publishes the TXT record or
    /// places the HTTP token.
    async fn solve_challenge(&self, primary: &str, domain: &str, provider: &ProviderId) -> bool;

    /// Tells the server the challenge for `domain` can be validated.
    async fn mark_challenge_as_ready(&self, primary: &str, domain: &str) -> bool;

    /// Removes whatever was provisioned for `domain`.
    async fn cleanup_provision(&self, primary: &str, domain: &str) -> bool;

    /// Submits the CSR for the order.
    async fn finalize(&self, primary: &str) -> bool;

    /// Downloads the issued certificate and persists it.
    async fn fetch_certificate(&self, primary: &str) -> bool;

    async fn get_certificate_meta(&self, primary: &str) -> eyre::Result<CertificateMeta>;
}
