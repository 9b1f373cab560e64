use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`api::Challenge`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// The parts of a challenge object the manager looks at: its kind, its status and the error the
/// server reported when validation failed. Other members (`url`, `token`, `validated`) are left to
/// the [`ProtocolClient`] that provisions the challenge.
///
/// See [RFC 8555 §7.1.5].
///
/// [RFC 8555 §7.1.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.5
/// [`ProtocolClient`]: crate::ProtocolClient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,

    pub status: ChallengeStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,
}
