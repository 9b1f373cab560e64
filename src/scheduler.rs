//! Expiry tracking and poll interval computation.

use std::{ops::RangeInclusive, time::Duration};

use rand::Rng;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    client::ProtocolClient,
    config::{CertificateSpec, EXPIRY_UNKNOWN},
};

/// Poll interval, in seconds, while certificates are missing or being issued.
pub const ACTIVE_POLL_SECS: RangeInclusive<u64> = 10..=30;

/// When the renewal window opens closer than this, in seconds, polling switches to
/// [`ACTIVE_POLL_SECS`].
pub const RENEWAL_HORIZON_SECS: i64 = 3600;

/// Outcome of [`refresh_expiries`].
#[derive(Debug, Default)]
pub struct ExpiryReport {
    /// Seconds until the earliest known expiry, `0` when no expiry is known.
    pub min_expire_in: i64,

    /// Certificates whose metadata could not be read, by primary domain.
    pub failures: Vec<(String, eyre::Report)>,
}

/// Refreshes `expires_at` of every certificate from stored metadata.
///
/// A failed lookup is logged and reported but never stops the other certificates from being
/// refreshed; the failed certificate keeps its previous `expires_at`.
pub async fn refresh_expiries(
    certificates: &mut [CertificateSpec],
    client: &dyn ProtocolClient,
    now: i64,
) -> ExpiryReport {
    let mut report = ExpiryReport::default();
    let mut min_expire_in: Option<i64> = None;

    for cert in certificates.iter_mut() {
        let primary = cert.primary().to_owned();

        let meta = match client.get_certificate_meta(&primary).await {
            Ok(meta) => meta,
            Err(err) => {
                log::error!("cannot read certificate metadata for {primary}: {err:#}");
                report.failures.push((primary, err));
                continue;
            }
        };

        if !meta.exists {
            log::debug!("no certificate for {primary}");
            cert.expires_at = EXPIRY_UNKNOWN;
            continue;
        }

        let Some(not_after) = meta.not_after else {
            log::error!("certificate metadata for {primary} has no expiry");
            report.failures.push((
                primary,
                eyre::eyre!("certificate metadata has no expiry"),
            ));
            continue;
        };

        cert.expires_at = not_after;
        let expires_in = not_after.saturating_sub(now);

        log::debug!(
            "certificate for {primary} expires at {} (in {} days)",
            format_timestamp(not_after),
            expires_in / 86_400,
        );

        min_expire_in = Some(min_expire_in.map_or(expires_in, |min| min.min(expires_in)));
    }

    report.min_expire_in = min_expire_in.unwrap_or(0);
    report
}

/// Whether every certificate has a known expiry.
pub fn all_present(certificates: &[CertificateSpec]) -> bool {
    certificates.iter().all(|cert| cert.expires_at >= 0)
}

/// Computes how long to sleep before the next pass.
///
/// Polls fast while nothing is known or while a renewal is due within the hour. Otherwise it
/// sleeps a random time between 80% and 100% of the time left before the renewal window opens,
/// so independently started managers do not poll in lockstep.
pub fn next_sleep<R>(min_expire_in: i64, renew_time: i64, rng: &mut R) -> Duration
where
    R: Rng + ?Sized,
{
    if min_expire_in <= 0 {
        return Duration::from_secs(rng.gen_range(ACTIVE_POLL_SECS));
    }

    let slack = min_expire_in.saturating_sub(renew_time);

    if slack > RENEWAL_HORIZON_SECS {
        // ceil(0.8 * slack)
        let low = (slack - slack / 5).max(1);
        Duration::from_secs(rng.gen_range(low as u64..=slack as u64))
    } else {
        Duration::from_secs(rng.gen_range(ACTIVE_POLL_SECS))
    }
}

fn format_timestamp(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}
