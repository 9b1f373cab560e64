use std::io;

use crate::api::Problem;

/// Failures that stop the manager.
///
/// Per-certificate problems (a metadata lookup that fails, a challenge provider that refuses a
/// step) are not represented here. Those are logged and retried on the next pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration could not be validated. Fatal at startup.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The ACME server marked an order as invalid.
    #[error("order for {primary} is invalid{}", problem_suffix(.detail))]
    OrderInvalid {
        primary: String,
        detail: Option<Problem>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn problem_suffix(detail: &Option<Problem>) -> String {
    detail
        .as_ref()
        .map(|problem| format!(": {problem}"))
        .unwrap_or_default()
}

impl Error {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_invalid_display() {
        let err = Error::OrderInvalid {
            primary: "example.com".to_owned(),
            detail: None,
        };
        assert_eq!(err.to_string(), "order for example.com is invalid");

        let err = Error::OrderInvalid {
            primary: "example.com".to_owned(),
            detail: Some(Problem {
                _type: "urn:ietf:params:acme:error:unauthorized".to_owned(),
                detail: Some("no TXT record found".to_owned()),
                subproblems: None,
            }),
        };
        assert_eq!(
            err.to_string(),
            "order for example.com is invalid: urn:ietf:params:acme:error:unauthorized: no TXT record found"
        );
    }
}
