//! Runs the manager against an in-process issuer that hands out self-signed certificates.
//!
//! Certificates are written to `./acme-demo/domains/<primary>/`. Stop with Ctrl-C.

use std::{collections::HashMap, sync::Arc};

use acme_manager::{
    api::{self, AuthorizationStatus, OrderStatus},
    CertificateMeta, Certificate, Config, FileStore, Manager, ProtocolClient, ProviderId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use time::OffsetDateTime;
use zeroize::Zeroizing;

struct DemoOrder {
    domains: Vec<String>,
    validated: Vec<String>,
    finalized: bool,
}

/// Validates every challenge as soon as it is marked ready and signs certificates itself.
struct SelfSignedIssuer {
    store: FileStore,
    orders: Mutex<HashMap<String, DemoOrder>>,
}

impl SelfSignedIssuer {
    fn issue(domains: &[String]) -> eyre::Result<Certificate> {
        let mut params = rcgen::CertificateParams::new(domains.to_vec())?;
        params.not_after = OffsetDateTime::now_utc() + time::Duration::days(90);

        let key = rcgen::KeyPair::generate()?;
        let cert = params.self_signed(&key)?;

        Certificate::parse(Zeroizing::new(key.serialize_pem()), cert.pem())
    }
}

#[async_trait]
impl ProtocolClient for SelfSignedIssuer {
    async fn new_order(&self, domains: &[String]) -> eyre::Result<api::Order> {
        self.orders.lock().insert(
            domains[0].clone(),
            DemoOrder {
                domains: domains.to_vec(),
                validated: Vec::new(),
                finalized: false,
            },
        );

        Ok(api::Order::pending(domains))
    }

    async fn order_info(&self, primary: &str) -> Option<api::Order> {
        let orders = self.orders.lock();
        let order = orders.get(primary)?;

        let mut info = api::Order::pending(&order.domains);
        info.status = if order.finalized {
            OrderStatus::Valid
        } else if order.validated.len() == order.domains.len() {
            OrderStatus::Ready
        } else {
            OrderStatus::Pending
        };

        Some(info)
    }

    async fn get_authorization(&self, primary: &str, domain: &str) -> Option<api::Authorization> {
        let orders = self.orders.lock();
        let order = orders.get(primary)?;

        let status = if order.validated.iter().any(|d| d == domain) {
            AuthorizationStatus::Valid
        } else {
            AuthorizationStatus::Pending
        };

        Some(api::Authorization {
            identifier: api::Identifier::dns(domain),
            status,
            expires: None,
            challenges: Vec::new(),
            wildcard: None,
        })
    }

    async fn get_auth_by_url(&self, url: &str) -> eyre::Result<api::Authorization> {
        eyre::bail!("no authorization at {url}")
    }

    async fn solve_challenge(&self, _primary: &str, domain: &str, provider: &ProviderId) -> bool {
        log::info!("pretending {provider} provisioned a challenge for {domain}");
        true
    }

    async fn mark_challenge_as_ready(&self, primary: &str, domain: &str) -> bool {
        match self.orders.lock().get_mut(primary) {
            Some(order) => {
                order.validated.push(domain.to_owned());
                true
            }
            None => false,
        }
    }

    async fn cleanup_provision(&self, _primary: &str, _domain: &str) -> bool {
        true
    }

    async fn finalize(&self, primary: &str) -> bool {
        match self.orders.lock().get_mut(primary) {
            Some(order) => {
                order.finalized = true;
                true
            }
            None => false,
        }
    }

    async fn fetch_certificate(&self, primary: &str) -> bool {
        let Some(order) = self.orders.lock().remove(primary) else {
            return false;
        };

        match Self::issue(&order.domains).and_then(|cert| self.store.save(primary, &cert)) {
            Ok(()) => true,
            Err(err) => {
                log::error!("cannot issue certificate for {primary}: {err:#}");
                false
            }
        }
    }

    async fn get_certificate_meta(&self, primary: &str) -> eyre::Result<CertificateMeta> {
        self.store.certificate_meta(primary)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::validate(&json!({
        "data_dir": "acme-demo",
        "certificates": [
            { "names": ["example.com", "www.example.com"], "provider": "http" },
            { "names": ["example.org"], "provider": "http" }
        ]
    }))?;

    let issuer = SelfSignedIssuer {
        store: FileStore::new(&config.data_dir),
        orders: Mutex::new(HashMap::new()),
    };

    let mut manager = Manager::new(config, Arc::new(issuer));

    let cancel = manager.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    // an invalid order ends the process with an error
    manager.run().await?;

    Ok(())
}
