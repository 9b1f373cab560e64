//! The control loop.

use std::{sync::Arc, time::Duration};

use rand::{rngs::StdRng, RngCore, SeedableRng as _};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    api::{self, AuthorizationStatus, OrderStatus},
    client::ProtocolClient,
    config::Config,
    env::{Clock, Sleeper, SystemClock, TokioSleeper},
    error::Error,
    orders::{ChallengeStatus, RunState},
    providers::Providers,
    scheduler,
};

/// How long to wait after publishing a DNS challenge before the server is asked to validate it.
pub const DNS_PROPAGATION_WAIT: Duration = Duration::from_secs(120);

/// Keeps the configured certificates issued and renewed.
///
/// Every pass refreshes the expiry of all certificates, opens orders for those that are missing
/// or due for renewal, advances each open order by one step and then sleeps until the next pass.
///
/// Orders are advanced one after the other on a single task. A DNS propagation wait therefore
/// holds back every other order for its duration.
pub struct Manager {
    config: Config,
    state: RunState,
    client: Arc<dyn ProtocolClient>,
    clock: Box<dyn Clock>,
    sleeper: Box<dyn Sleeper>,
    rng: Box<dyn RngCore + Send + Sync>,
    cancel: CancellationToken,
}

impl Manager {
    /// Creates a manager on the wall clock and tokio timer.
    pub fn new(config: Config, client: Arc<dyn ProtocolClient>) -> Self {
        Self {
            config,
            state: RunState::new(),
            client,
            clock: Box::new(SystemClock),
            sleeper: Box::new(TokioSleeper),
            rng: Box::new(StdRng::from_entropy()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + Sync + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    /// Stops [`run`](Self::run) at its next suspension point once `cancel` is cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The open orders.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs passes until cancelled.
    ///
    /// Returns an error only when the server rejects an order. The error is deliberately not
    /// isolated to its certificate; callers are expected to stop the process on it.
    pub async fn run(&mut self) -> Result<(), Error> {
        log::info!(
            "managing {} certificate(s), renewing {}s before expiry",
            self.config.certificates.len(),
            self.config.renew_time,
        );

        loop {
            let sleep = self.pass().await?;

            log::debug!(
                "{} open order(s), next pass in {}s",
                self.state.len(),
                sleep.as_secs()
            );

            if !self.suspend(sleep).await {
                break;
            }
        }

        log::info!("certificate manager stopped");
        Ok(())
    }

    /// Runs one pass and returns how long to sleep before the next one.
    pub async fn pass(&mut self) -> Result<Duration, Error> {
        let now = self.clock.now();

        let report =
            scheduler::refresh_expiries(&mut self.config.certificates, &*self.client, now).await;

        if !report.failures.is_empty() {
            log::warn!(
                "metadata lookup failed for {} certificate(s)",
                report.failures.len()
            );
        }

        self.place_due_orders(now).await;

        let primaries = self.state.primaries().map(str::to_owned).collect::<Vec<_>>();

        for primary in primaries {
            if self.cancel.is_cancelled() {
                break;
            }

            self.advance(&primary).await?;
        }

        // an open order or a missing certificate keeps polling at the active interval
        let settled = self.state.is_empty() && scheduler::all_present(&self.config.certificates);
        let min_expire_in = if settled {
            report.min_expire_in
        } else {
            0
        };

        Ok(scheduler::next_sleep(
            min_expire_in,
            self.config.renew_time,
            &mut *self.rng,
        ))
    }

    async fn place_due_orders(&mut self, now: i64) {
        let renew_time = self.config.renew_time;

        for cert in &self.config.certificates {
            let due = cert.expires_at < 0 || cert.expires_at.saturating_sub(now) <= renew_time;
            if !due {
                continue;
            }

            if let Err(err) = self.state.place_order(&*self.client, cert.names()).await {
                log::error!("{err:#}");
            }
        }
    }

    /// Advances the order for `primary` by one step according to its status at the server.
    async fn advance(&mut self, primary: &str) -> Result<(), Error> {
        let Some(order) = self.client.order_info(primary).await else {
            log::warn!("cannot fetch order for {primary}, retrying next pass");
            return Ok(());
        };

        match order.status {
            OrderStatus::Pending | OrderStatus::Ready => {
                self.advance_challenges(primary, order.status).await;
            }

            OrderStatus::Processing => {
                log::debug!("order for {primary} is being processed");
            }

            OrderStatus::Valid => {
                self.state.get_certificate(&*self.client, primary).await;
            }

            OrderStatus::Invalid => return Err(self.invalid_order(primary, &order).await),
        }

        Ok(())
    }

    async fn advance_challenges(&mut self, primary: &str, status: OrderStatus) {
        let Some(order) = self.state.get(primary) else {
            return;
        };

        if order.all_validated() {
            if status == OrderStatus::Ready {
                self.state.send_csr(&*self.client, primary).await;
            } else {
                log::debug!("waiting for order for {primary} to become ready");
            }
            return;
        }

        let domain = order.current_domain().to_owned();

        match order.current_status() {
            ChallengeStatus::New => {
                let already_valid = self
                    .client
                    .get_authorization(primary, &domain)
                    .await
                    .is_some_and(|auth| auth.is_valid());

                if already_valid {
                    self.state.skip_challenge(primary);
                    return;
                }

                let providers = Providers::new(&self.config);
                let solved = self
                    .state
                    .solve_challenge(&*self.client, &providers, primary)
                    .await;

                if solved.is_some_and(|provider| provider.is_dns()) {
                    log::info!(
                        "waiting {}s for DNS propagation of {domain}",
                        DNS_PROPAGATION_WAIT.as_secs()
                    );
                    self.suspend(DNS_PROPAGATION_WAIT).await;
                }
            }

            ChallengeStatus::Solved => {
                self.state
                    .mark_challenge_as_ready(&*self.client, primary)
                    .await;
            }

            ChallengeStatus::Marked => {
                let Some(auth) = self.client.get_authorization(primary, &domain).await else {
                    log::warn!("cannot fetch authorization for {domain}, retrying next pass");
                    return;
                };

                match auth.status {
                    AuthorizationStatus::Valid => {
                        self.state.cleanup_challenge(&*self.client, primary).await;
                    }

                    AuthorizationStatus::Pending => {
                        log::debug!("authorization for {domain} is pending");
                    }

                    AuthorizationStatus::Invalid
                    | AuthorizationStatus::Deactivated
                    | AuthorizationStatus::Expired
                    | AuthorizationStatus::Revoked => {
                        log::warn!("authorization for {domain} is {:?}", auth.status);
                    }
                }
            }

            ChallengeStatus::Validated => {}
        }
    }

    /// Logs everything known about a rejected order and builds the fatal error for it.
    async fn invalid_order(&self, primary: &str, order: &api::Order) -> Error {
        log::error!("order for {primary} is invalid: {}", dump(order));

        let mut detail = order.error.clone();

        for url in &order.authorizations {
            match self.client.get_auth_by_url(url).await {
                Ok(auth) => {
                    log::error!("authorization {url}: {}", dump(&auth));

                    if detail.is_none() {
                        detail = auth.problem().cloned();
                    }
                }
                Err(err) => log::error!("cannot fetch authorization {url}: {err:#}"),
            }
        }

        Error::OrderInvalid {
            primary: primary.to_owned(),
            detail,
        }
    }

    /// Sleeps for `duration`. Returns `false` if cancelled first.
    async fn suspend(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.sleeper.sleep(duration) => true,
        }
    }
}

fn dump<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| format!("<unserializable: {err}>"))
}
