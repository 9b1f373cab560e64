use std::io::{BufReader, Cursor};

use der::Decode as _;
use eyre::{eyre, WrapErr as _};
use zeroize::Zeroizing;

/// Issued certificate chain with its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    private_key_pem: Zeroizing<String>,
    certificate: String,
}

impl Certificate {
    /// Checks that `certificate` holds a parseable end-entity certificate and `private_key_pem` a
    /// private key.
    pub fn parse(private_key_pem: Zeroizing<String>, certificate: String) -> eyre::Result<Self> {
        not_after_from_pem(&certificate)?;

        let mut rdr = BufReader::new(Cursor::new(private_key_pem.as_bytes()));
        rustls_pemfile::private_key(&mut rdr)
            .wrap_err("read private key PEM")?
            .ok_or_else(|| eyre!("no private key in PEM"))?;

        Ok(Certificate {
            private_key_pem,
            certificate,
        })
    }

    /// The private key in PEM format.
    pub fn private_key(&self) -> &str {
        &self.private_key_pem
    }

    /// The certificate chain in PEM format.
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// The certificate chain in DER format, end-entity certificate first.
    pub fn certificate_chain(&self) -> eyre::Result<Vec<Vec<u8>>> {
        certificate_chain(&self.certificate)
    }

    /// End of validity of the end-entity certificate, in epoch seconds.
    pub fn not_after(&self) -> eyre::Result<i64> {
        not_after_from_pem(&self.certificate)
    }

    /// Whole days left until the certificate expires, negative once expired.
    pub fn valid_days_left(&self, now: i64) -> eyre::Result<i64> {
        Ok((self.not_after()? - now).div_euclid(86_400))
    }
}

fn certificate_chain(pem: &str) -> eyre::Result<Vec<Vec<u8>>> {
    let mut rdr = BufReader::new(Cursor::new(pem.as_bytes()));

    rustls_pemfile::certs(&mut rdr)
        .map(|res| res.map(|cert| cert.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Reads the end of validity, in epoch seconds, of the first certificate in a PEM chain.
pub(crate) fn not_after_from_pem(pem: &str) -> eyre::Result<i64> {
    let chain = certificate_chain(pem)?;
    let cert_ee = chain
        .first() // EE cert is first
        .ok_or_else(|| eyre!("no certificates in chain"))?;

    let cert = x509_cert::Certificate::from_der(cert_ee).wrap_err("decode certificate")?;
    let not_after = cert.tbs_certificate.validity.not_after.to_unix_duration();

    i64::try_from(not_after.as_secs()).wrap_err("certificate expiry out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::self_signed;

    // 2030-01-01T00:00:00Z
    const NOT_AFTER: i64 = 1_893_456_000;

    #[test]
    fn test_parse_and_expiry() {
        let (cert_pem, key_pem) = self_signed(&["example.com"], (2030, 1, 1));
        let cert = Certificate::parse(Zeroizing::new(key_pem), cert_pem).unwrap();

        assert_eq!(cert.not_after().unwrap(), NOT_AFTER);
        assert_eq!(cert.certificate_chain().unwrap().len(), 1);
        assert!(cert.private_key().contains("PRIVATE KEY"));

        assert_eq!(cert.valid_days_left(NOT_AFTER - 10 * 86_400).unwrap(), 10);
        assert_eq!(cert.valid_days_left(NOT_AFTER - 10 * 86_400 + 1).unwrap(), 9);
        assert_eq!(cert.valid_days_left(NOT_AFTER + 1).unwrap(), -1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let (cert_pem, key_pem) = self_signed(&["example.com"], (2030, 1, 1));

        assert!(Certificate::parse(Zeroizing::new(key_pem.clone()), "nope".to_owned()).is_err());
        assert!(Certificate::parse(Zeroizing::new("nope".to_owned()), cert_pem.clone()).is_err());

        let corrupt = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        assert!(not_after_from_pem(corrupt).is_err());
    }
}
