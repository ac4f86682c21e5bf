//! Package link signing and license renewal links

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

use crate::config::LicensingConfig;
use crate::domain::LicenseRecord;

type HmacSha256 = Hmac<Sha256>;

/// Calls into the licensing subsystem
pub trait LicensingService: Send + Sync {
    /// Signed, time-limited package URL for one license and requesting site
    fn sign_download_url(&self, download_id: i64, license_key: &str, requesting_url: &str)
    -> String;

    /// Checkout URL renewing the given license
    fn get_renewal_url(&self, license: &LicenseRecord) -> String;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PackageTokenError {
    #[error("Malformed package token")]
    Malformed,

    #[error("Package token signature mismatch")]
    BadSignature,

    #[error("Package token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },
}

/// Contents of a verified package token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageGrant {
    pub download_id: i64,
    pub license_key: String,
    pub requesting_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs package links with a shared secret.
///
/// Links look like `{site_url}/edd-sl/package_download/{token}` where the token is
/// URL-safe base64 of `expires:license_key:download_id:b64(url):signature`, the
/// signature being a hex HMAC-SHA256 of everything before it.
pub struct SignedUrlLicensing {
    site_url: String,
    checkout_url: String,
    mac: HmacSha256,
    link_ttl: Duration,
}

impl SignedUrlLicensing {
    pub fn new(site_url: String, checkout_url: String, secret: String, link_ttl: Duration) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            checkout_url,
            mac: HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts keys of any length"),
            link_ttl,
        }
    }

    pub fn from_config(config: &LicensingConfig) -> Self {
        Self::new(
            config.site_url.clone(),
            config.checkout_url.clone(),
            config.signing_secret.clone(),
            Duration::from_secs(config.package_ttl_hours * 3600),
        )
    }

    fn keyed(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }

    fn signature(&self, payload: &str) -> String {
        hex::encode(self.keyed(payload).finalize().into_bytes())
    }

    /// Build the package token for an explicit expiry (unix seconds)
    pub fn package_token(
        &self,
        download_id: i64,
        license_key: &str,
        requesting_url: &str,
        expires: i64,
    ) -> String {
        let payload = format!(
            "{}:{}:{}:{}",
            expires,
            license_key,
            download_id,
            URL_SAFE_NO_PAD.encode(requesting_url)
        );
        let signature = self.signature(&payload);
        URL_SAFE_NO_PAD.encode(format!("{}:{}", payload, signature))
    }

    /// Check a token's signature and expiry against `now`
    pub fn verify_package_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<PackageGrant, PackageTokenError> {
        let decoded = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| PackageTokenError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| PackageTokenError::Malformed)?;

        // The license key sits in the middle and may itself contain ':'.
        let (payload, signature) = decoded
            .rsplit_once(':')
            .ok_or(PackageTokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| PackageTokenError::BadSignature)?;
        self.keyed(payload)
            .verify_slice(&signature)
            .map_err(|_| PackageTokenError::BadSignature)?;

        let (expires, rest) = payload.split_once(':').ok_or(PackageTokenError::Malformed)?;
        let mut tail = rest.rsplitn(3, ':');
        let url_b64 = tail.next().ok_or(PackageTokenError::Malformed)?;
        let download_id = tail.next().ok_or(PackageTokenError::Malformed)?;
        let license_key = tail.next().ok_or(PackageTokenError::Malformed)?;

        let expires: i64 = expires.parse().map_err(|_| PackageTokenError::Malformed)?;
        let expires_at =
            DateTime::from_timestamp(expires, 0).ok_or(PackageTokenError::Malformed)?;
        if now.timestamp() > expires {
            return Err(PackageTokenError::Expired {
                expired_at: expires_at,
            });
        }

        let requesting_url = URL_SAFE_NO_PAD
            .decode(url_b64)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(PackageTokenError::Malformed)?;

        Ok(PackageGrant {
            download_id: download_id
                .parse()
                .map_err(|_| PackageTokenError::Malformed)?,
            license_key: license_key.to_string(),
            requesting_url,
            expires_at,
        })
    }

    pub fn verify_package_token(&self, token: &str) -> Result<PackageGrant, PackageTokenError> {
        self.verify_package_token_at(token, Utc::now())
    }

    /// Extract the token from a package URL built by this signer
    pub fn token_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(&self.site_url)?
            .strip_prefix("/edd-sl/package_download/")
    }
}

impl LicensingService for SignedUrlLicensing {
    fn sign_download_url(
        &self,
        download_id: i64,
        license_key: &str,
        requesting_url: &str,
    ) -> String {
        let expires = Utc::now().timestamp() + self.link_ttl.as_secs() as i64;
        format!(
            "{}/edd-sl/package_download/{}",
            self.site_url,
            self.package_token(download_id, license_key, requesting_url, expires)
        )
    }

    fn get_renewal_url(&self, license: &LicenseRecord) -> String {
        let separator = if self.checkout_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}edd_license_key={}&download_id={}",
            self.checkout_url,
            separator,
            urlencoding::encode(&license.license_key),
            license.download_id
        )
    }
}
