//! Keeps TLS certificates from ACME (Automatic Certificate Management Environment) providers such
//! as [Let's Encrypt](https://letsencrypt.org/) issued and renewed, without manual intervention.
//!
//! Given a list of certificates, each covering one or more domain names, the [`Manager`] runs a
//! control loop that:
//!
//! 1. refreshes the expiry of every stored certificate;
//! 2. places an [RFC 8555] order for each certificate that is missing or inside its renewal
//!    window;
//! 3. advances every open order by one step (solve a challenge, ask for validation, clean up,
//!    submit the CSR, download the certificate);
//! 4. sleeps until the next pass, for a jittered time that is short while something is in
//!    progress and long otherwise.
//!
//! Talking to the ACME server and provisioning challenges is left to a [`ProtocolClient`]
//! implementation. Certificates are read back through it, typically from a [`FileStore`].
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use acme_manager::{Config, Manager, ProtocolClient};
//!
//! async fn run(client: Arc<dyn ProtocolClient>) -> eyre::Result<()> {
//!     let config = Config::load("acme.json")?;
//!     let mut manager = Manager::new(config, client);
//!
//!     // only returns when an order is rejected by the server
//!     manager.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Domain Ownership
//!
//! Each name of a certificate is authorized on its own, strictly one after the other, through the
//! challenge provider configured for the certificate. Providers whose id is `dns` or starts with
//! `dns:`/`dns-` publish DNS records; the manager waits [`DNS_PROPAGATION_WAIT`] after solving such
//! a challenge before asking the server to validate it.
//!
//! # Rate Limits
//!
//! ACME providers rate limit their API. Outside of active issuance the manager sleeps until just
//! before the renewal window of the earliest expiring certificate opens, so it stays well clear of
//! those limits.
//!
//! [RFC 8555]: https://datatracker.ietf.org/doc/html/rfc8555

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod cert;
mod client;
mod error;
mod manager;
mod store;

pub mod api;
pub mod config;
pub mod env;
pub mod orders;
pub mod providers;
pub mod scheduler;


pub use crate::{
    cert::Certificate,
    client::{CertificateMeta, ProtocolClient},
    config::{CertificateSpec, Config},
    error::Error,
    manager::{Manager, DNS_PROPAGATION_WAIT},
    orders::{ChallengeStatus, OrderState, RunState},
    providers::{ProviderId, Providers},
    store::FileStore,
};
