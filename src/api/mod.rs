//! ACME objects as reported by a [`ProtocolClient`].
//!
//! These mirror the server-side order, authorization and challenge resources closely enough to
//! drive the order life cycle and to dump them into the log when something goes wrong. Statuses
//! are closed enums so every state the server can report is matched explicitly.
//!
//! [`ProtocolClient`]: crate::ProtocolClient

use std::fmt;

use serde::{Deserialize, Serialize};

mod authorization;
mod challenge;
mod identifier;
mod order;

pub use self::{
    authorization::{Authorization, AuthorizationStatus},
    challenge::{Challenge, ChallengeStatus},
    identifier::Identifier,
    order::{Order, OrderStatus},
};

/// An RFC 7807 problem document returned by the ACME server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            _ => write!(f, "{}", self._type),
        }
    }
}

/// A problem scoped to one identifier of a multi-domain order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type")]
    pub _type: String,
    pub detail: Option<String>,
    pub identifier: Option<Identifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_display() {
        let problem = Problem {
            _type: "urn:ietf:params:acme:error:dns".to_owned(),
            detail: Some("NXDOMAIN looking up TXT".to_owned()),
            subproblems: None,
        };
        assert_eq!(
            problem.to_string(),
            "urn:ietf:params:acme:error:dns: NXDOMAIN looking up TXT"
        );

        let problem = Problem {
            _type: "urn:ietf:params:acme:error:rateLimited".to_owned(),
            ..Default::default()
        };
        assert_eq!(problem.to_string(), "urn:ietf:params:acme:error:rateLimited");
    }

    #[test]
    fn test_problem_skips_empty_fields() {
        let problem = Problem {
            _type: "badNonce".to_owned(),
            ..Default::default()
        };
        let json = serde_json::to_string(&problem).unwrap();
        assert_eq!(json, r#"{"type":"badNonce"}"#);
    }
}
