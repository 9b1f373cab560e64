//! Per-order state machine.
//!
//! An order walks its domains strictly one at a time. For the domain currently being authorized
//! the challenge goes through:
//!
//! 1. [`ChallengeStatus::New`]: nothing provisioned yet.
//! 2. [`ChallengeStatus::Solved`]: the provider published the TXT record or HTTP token.
//! 3. [`ChallengeStatus::Marked`]: the server was told to validate.
//! 4. [`ChallengeStatus::Validated`]: the server reported the authorization valid and the
//!    provisioned artifact was removed.
//!
//! Once every domain is validated the CSR is submitted and, when the server has issued the
//! certificate, it is downloaded and the order forgotten.

use std::collections::BTreeMap;

use eyre::WrapErr as _;

use crate::{
    client::ProtocolClient,
    providers::{ProviderId, Providers},
};

/// Local progress of the challenge for one domain. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChallengeStatus {
    New,
    Solved,
    Marked,
    Validated,
}

/// An order that is open at the ACME server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderState {
    domains: Vec<String>,

    /// Index into `domains` of the domain currently being authorized.
    idx: usize,

    challenges: BTreeMap<String, ChallengeStatus>,
    csr_sent: bool,
}

impl OrderState {
    fn new(domains: &[String]) -> Self {
        Self {
            domains: domains.to_vec(),
            idx: 0,
            challenges: domains
                .iter()
                .map(|domain| (domain.clone(), ChallengeStatus::New))
                .collect(),
            csr_sent: false,
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Domain currently being authorized.
    pub fn current_domain(&self) -> &str {
        &self.domains[self.idx]
    }

    pub fn current_status(&self) -> ChallengeStatus {
        self.status(self.current_domain())
            .unwrap_or(ChallengeStatus::New)
    }

    pub fn status(&self, domain: &str) -> Option<ChallengeStatus> {
        self.challenges.get(domain).copied()
    }

    pub fn csr_sent(&self) -> bool {
        self.csr_sent
    }

    pub fn all_validated(&self) -> bool {
        self.challenges
            .values()
            .all(|status| *status == ChallengeStatus::Validated)
    }

    fn set_current(&mut self, status: ChallengeStatus) {
        let domain = self.domains[self.idx].clone();
        self.challenges.insert(domain, status);
    }

    /// Marks the current domain validated and moves on to the next one, if any.
    fn validate_current(&mut self) {
        self.set_current(ChallengeStatus::Validated);

        if self.idx + 1 < self.domains.len() {
            self.idx += 1;
        }
    }
}

/// The in-flight orders, keyed by primary domain.
///
/// There is at most one entry per primary domain. It is created by [`place_order`] and removed
/// only by a successful [`get_certificate`].
///
/// [`place_order`]: RunState::place_order
/// [`get_certificate`]: RunState::get_certificate
#[derive(Debug, Default)]
pub struct RunState {
    orders: BTreeMap<String, OrderState>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, primary: &str) -> Option<&OrderState> {
        self.orders.get(primary)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Primary domains of all open orders, in sorted order.
    pub fn primaries(&self) -> impl Iterator<Item = &str> {
        self.orders.keys().map(String::as_str)
    }

    fn order_mut(&mut self, primary: &str) -> Option<&mut OrderState> {
        let order = self.orders.get_mut(primary);
        if order.is_none() {
            log::warn!("no open order for {primary}");
        }
        order
    }

    /// Opens an order for `domains` unless one is already open for the primary domain.
    ///
    /// Returns whether a new order was placed.
    pub async fn place_order(
        &mut self,
        client: &dyn ProtocolClient,
        domains: &[String],
    ) -> eyre::Result<bool> {
        let Some(primary) = domains.first() else {
            eyre::bail!("cannot order a certificate without names");
        };

        if self.orders.contains_key(primary) {
            return Ok(false);
        }

        let order = client
            .new_order(domains)
            .await
            .wrap_err_with(|| format!("cannot place order for {primary}"))?;

        log::info!(
            "placed order for {} (server status {:?})",
            domains.join(", "),
            order.status
        );

        self.orders.insert(primary.clone(), OrderState::new(domains));
        Ok(true)
    }

    /// Provisions the challenge for the current domain of the order.
    ///
    /// Returns the provider that solved it, so the caller can wait for DNS propagation, or
    /// `None` if nothing was solved.
    pub async fn solve_challenge(
        &mut self,
        client: &dyn ProtocolClient,
        providers: &Providers<'_>,
        primary: &str,
    ) -> Option<ProviderId> {
        let order = self.order_mut(primary)?;

        if order.current_status() != ChallengeStatus::New {
            return None;
        }

        let domain = order.current_domain().to_owned();

        let Some(provider) = providers.provider_for_domain(&domain) else {
            log::warn!("no challenge provider configured for {domain}");
            return None;
        };

        if !client.solve_challenge(primary, &domain, provider).await {
            log::warn!("provider {provider} failed to solve challenge for {domain}");
            return None;
        }

        order.set_current(ChallengeStatus::Solved);
        log::info!("challenge for {domain} solved via {provider}");

        Some(provider.clone())
    }

    /// Asks the server to validate the solved challenge of the current domain.
    pub async fn mark_challenge_as_ready(
        &mut self,
        client: &dyn ProtocolClient,
        primary: &str,
    ) -> bool {
        let Some(order) = self.order_mut(primary) else {
            return false;
        };

        if order.current_status() != ChallengeStatus::Solved {
            return false;
        }

        let domain = order.current_domain().to_owned();

        if !client.mark_challenge_as_ready(primary, &domain).await {
            log::warn!("cannot mark challenge for {domain} as ready");
            return false;
        }

        order.set_current(ChallengeStatus::Marked);
        log::info!("challenge for {domain} marked as ready");
        true
    }

    /// Removes the provisioned challenge once its authorization is valid and moves the order on
    /// to its next domain.
    pub async fn cleanup_challenge(&mut self, client: &dyn ProtocolClient, primary: &str) -> bool {
        let Some(order) = self.order_mut(primary) else {
            return false;
        };

        if order.current_status() != ChallengeStatus::Marked {
            return false;
        }

        let domain = order.current_domain().to_owned();

        if !client.cleanup_provision(primary, &domain).await {
            log::warn!("cannot clean up challenge for {domain}");
            return false;
        }

        order.validate_current();
        log::info!("authorization for {domain} is valid");
        true
    }

    /// Validates the current domain without provisioning anything, for when the server already
    /// holds a valid authorization for it.
    pub fn skip_challenge(&mut self, primary: &str) -> bool {
        let Some(order) = self.order_mut(primary) else {
            return false;
        };

        if order.current_status() != ChallengeStatus::New {
            return false;
        }

        log::info!(
            "authorization for {} is already valid",
            order.current_domain()
        );
        order.validate_current();
        true
    }

    pub fn all_challenges_solved(&self, primary: &str) -> bool {
        self.orders
            .get(primary)
            .is_some_and(OrderState::all_validated)
    }

    /// Submits the CSR. A CSR is only ever submitted once per order.
    pub async fn send_csr(&mut self, client: &dyn ProtocolClient, primary: &str) -> bool {
        let Some(order) = self.order_mut(primary) else {
            return false;
        };

        if order.csr_sent {
            return true;
        }

        if !order.all_validated() {
            log::warn!("not sending CSR for {primary}, authorizations are incomplete");
            return false;
        }

        if !client.finalize(primary).await {
            log::warn!("cannot finalize order for {primary}");
            return false;
        }

        order.csr_sent = true;
        log::info!("CSR sent for {primary}");
        true
    }

    /// Downloads the issued certificate and closes the order.
    pub async fn get_certificate(&mut self, client: &dyn ProtocolClient, primary: &str) -> bool {
        if !self.orders.contains_key(primary) {
            log::warn!("no open order for {primary}");
            return false;
        }

        if !client.fetch_certificate(primary).await {
            log::warn!("cannot fetch certificate for {primary}");
            return false;
        }

        self.orders.remove(primary);
        log::info!("certificate for {primary} retrieved");
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{config::Config, test::MockClient};

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    fn config() -> Config {
        Config::validate(&json!({
            "certificates": [
                { "names": ["example.com"], "provider": "http" },
                { "names": ["example.org", "www.example.org"], "provider": "dns:vultr" }
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_place_order_is_idempotent() {
        let client = MockClient::new();
        let mut state = RunState::new();

        assert!(state.place_order(&client, &names(&["example.com"])).await.unwrap());
        assert!(!state.place_order(&client, &names(&["example.com"])).await.unwrap());

        assert_eq!(state.len(), 1);
        assert_eq!(state.primaries().collect::<Vec<_>>(), ["example.com"]);
        assert_eq!(client.count("new_order"), 1);

        let order = state.get("example.com").unwrap();
        assert_eq!(order.idx(), 0);
        assert_eq!(order.status("example.com"), Some(ChallengeStatus::New));
        assert!(!order.csr_sent());
    }

    #[tokio::test]
    async fn test_place_order_failure_creates_nothing() {
        let client = MockClient::new();
        client.fail("new_order");
        let mut state = RunState::new();

        let err = state
            .place_order(&client, &names(&["example.com"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("example.com"));
        assert!(state.is_empty());

        assert!(state.place_order(&client, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_single_domain_life_cycle() {
        let config = config();
        let providers = Providers::new(&config);
        let client = MockClient::new();
        let mut state = RunState::new();
        let status = |state: &RunState| state.get("example.com").unwrap().current_status();

        state
            .place_order(&client, &names(&["example.com"]))
            .await
            .unwrap();
        assert_eq!(status(&state), ChallengeStatus::New);

        let provider = state
            .solve_challenge(&client, &providers, "example.com")
            .await
            .unwrap();
        assert!(!provider.is_dns());
        assert_eq!(status(&state), ChallengeStatus::Solved);

        assert!(state.mark_challenge_as_ready(&client, "example.com").await);
        assert_eq!(status(&state), ChallengeStatus::Marked);
        assert!(!state.all_challenges_solved("example.com"));

        assert!(state.cleanup_challenge(&client, "example.com").await);
        assert_eq!(status(&state), ChallengeStatus::Validated);
        assert!(state.all_challenges_solved("example.com"));

        assert!(state.send_csr(&client, "example.com").await);
        assert!(state.get("example.com").unwrap().csr_sent());

        assert!(state.get_certificate(&client, "example.com").await);
        assert!(state.get("example.com").is_none());
        assert!(state.is_empty());

        assert_eq!(
            client.calls(),
            [
                "new_order example.com",
                "solve_challenge example.com http",
                "mark_challenge_as_ready example.com",
                "cleanup_provision example.com",
                "finalize example.com",
                "fetch_certificate example.com",
            ]
        );
    }

    #[tokio::test]
    async fn test_steps_out_of_order_are_refused() {
        let config = config();
        let providers = Providers::new(&config);
        let client = MockClient::new();
        let mut state = RunState::new();

        state
            .place_order(&client, &names(&["example.com"]))
            .await
            .unwrap();

        assert!(!state.mark_challenge_as_ready(&client, "example.com").await);
        assert!(!state.cleanup_challenge(&client, "example.com").await);
        assert!(!state.send_csr(&client, "example.com").await);

        state
            .solve_challenge(&client, &providers, "example.com")
            .await
            .unwrap();
        assert!(state
            .solve_challenge(&client, &providers, "example.com")
            .await
            .is_none());
        assert_eq!(client.count("solve_challenge"), 1);
        assert_eq!(client.count("finalize"), 0);
    }

    #[tokio::test]
    async fn test_failed_steps_keep_status() {
        let config = config();
        let providers = Providers::new(&config);
        let client = MockClient::new();
        let mut state = RunState::new();

        state
            .place_order(&client, &names(&["example.com"]))
            .await
            .unwrap();

        client.fail("solve_challenge");
        assert!(state
            .solve_challenge(&client, &providers, "example.com")
            .await
            .is_none());
        assert_eq!(
            state.get("example.com").unwrap().current_status(),
            ChallengeStatus::New
        );

        client.succeed("solve_challenge");
        client.fail("mark_challenge_as_ready");
        state
            .solve_challenge(&client, &providers, "example.com")
            .await
            .unwrap();
        assert!(!state.mark_challenge_as_ready(&client, "example.com").await);
        assert_eq!(
            state.get("example.com").unwrap().current_status(),
            ChallengeStatus::Solved
        );

        client.fail("fetch_certificate");
        assert!(!state.get_certificate(&client, "example.com").await);
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn test_multi_domain_order_advances_one_at_a_time() {
        let config = config();
        let providers = Providers::new(&config);
        let client = MockClient::new();
        let mut state = RunState::new();
        let domains = names(&["example.org", "www.example.org"]);

        state.place_order(&client, &domains).await.unwrap();

        let provider = state
            .solve_challenge(&client, &providers, "example.org")
            .await
            .unwrap();
        assert!(provider.is_dns());
        state.mark_challenge_as_ready(&client, "example.org").await;
        state.cleanup_challenge(&client, "example.org").await;

        let order = state.get("example.org").unwrap();
        assert_eq!(order.idx(), 1);
        assert_eq!(order.current_domain(), "www.example.org");
        assert_eq!(order.status("example.org"), Some(ChallengeStatus::Validated));
        assert_eq!(order.status("www.example.org"), Some(ChallengeStatus::New));
        assert!(!state.all_challenges_solved("example.org"));

        state
            .solve_challenge(&client, &providers, "example.org")
            .await
            .unwrap();
        state.mark_challenge_as_ready(&client, "example.org").await;
        state.cleanup_challenge(&client, "example.org").await;

        let order = state.get("example.org").unwrap();
        assert_eq!(order.idx(), 1);
        assert!(state.all_challenges_solved("example.org"));

        assert_eq!(
            client.calls()[1..],
            [
                "solve_challenge example.org dns:vultr",
                "mark_challenge_as_ready example.org",
                "cleanup_provision example.org",
                "solve_challenge www.example.org dns:vultr",
                "mark_challenge_as_ready www.example.org",
                "cleanup_provision www.example.org",
            ]
        );
    }

    #[tokio::test]
    async fn test_skip_challenge() {
        let client = MockClient::new();
        let mut state = RunState::new();

        state
            .place_order(&client, &names(&["example.org", "www.example.org"]))
            .await
            .unwrap();

        assert!(state.skip_challenge("example.org"));
        assert_eq!(state.get("example.org").unwrap().idx(), 1);
        assert!(state.skip_challenge("example.org"));
        assert!(state.all_challenges_solved("example.org"));
        assert!(!state.skip_challenge("example.org"));
    }

    #[tokio::test]
    async fn test_send_csr_only_once() {
        let client = MockClient::new();
        let mut state = RunState::new();

        state
            .place_order(&client, &names(&["example.com"]))
            .await
            .unwrap();
        state.skip_challenge("example.com");

        assert!(state.send_csr(&client, "example.com").await);
        assert!(state.send_csr(&client, "example.com").await);
        assert_eq!(client.count("finalize"), 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let config = config();
        let providers = Providers::new(&config);
        let client = MockClient::new();
        let mut state = RunState::new();

        assert!(state
            .solve_challenge(&client, &providers, "example.com")
            .await
            .is_none());
        assert!(!state.mark_challenge_as_ready(&client, "example.com").await);
        assert!(!state.cleanup_challenge(&client, "example.com").await);
        assert!(!state.skip_challenge("example.com"));
        assert!(!state.all_challenges_solved("example.com"));
        assert!(!state.send_csr(&client, "example.com").await);
        assert!(!state.get_certificate(&client, "example.com").await);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_provider() {
        let config = Config::validate(&json!({})).unwrap();
        let providers = Providers::new(&config);
        let client = MockClient::new();
        let mut state = RunState::new();

        state
            .place_order(&client, &names(&["example.net"]))
            .await
            .unwrap();

        assert!(state
            .solve_challenge(&client, &providers, "example.net")
            .await
            .is_none());
        assert_eq!(client.count("solve_challenge"), 0);
    }
}
