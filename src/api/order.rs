use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`api::Order`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Some authorizations are not yet valid.
    Pending,
    /// Every authorization is valid, the CSR can be submitted.
    Ready,
    /// The CSR was accepted and the certificate is being issued.
    Processing,
    /// The certificate is ready for download.
    Valid,
    /// The order failed and will never progress.
    Invalid,
}

/// An ACME order as last seen on the server.
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43.570360537Z",
///   "identifiers": [
///     { "type": "dns", "value": "example.com" }
///   ],
///   "authorizations": [
///     "https://example.com/acme/authz/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs"
///   ],
///   "finalize": "https://example.com/acme/finalize/7738992/18234324"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub status: OrderStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    #[serde(default)]
    pub identifiers: Vec<api::Identifier>,

    /// Authorization URLs, one per identifier.
    #[serde(default)]
    pub authorizations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,
}

impl Order {
    /// A freshly created order for `domains`, as a server would answer a `newOrder` request.
    pub fn pending(domains: &[String]) -> Self {
        Self {
            status: OrderStatus::Pending,
            expires: None,
            identifiers: domains.iter().map(|d| api::Identifier::dns(d)).collect(),
            authorizations: Vec::new(),
            finalize: None,
            certificate: None,
            error: None,
        }
    }

    /// Returns all domains associated with this order.
    pub fn domains(&self) -> Vec<&str> {
        self.identifiers
            .iter()
            .map(|identifier| identifier.value.as_str())
            .collect()
    }
}
