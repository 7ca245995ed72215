//! Media file to download URL resolution.

use streamfleet_core::signing::signed_download_url;
use streamfleet_core::types::Timestamp;
use streamfleet_db::models::media::MediaFile;

use crate::config::FleetConfig;

/// Resolves a media file to a URL the worker can download.
pub trait MediaResolver: Send + Sync {
    /// `None` when the file cannot be served; the caller drops it.
    fn download_url(&self, file: &MediaFile, now: Timestamp) -> Option<String>;
}

/// Direct CDN URL when the file has one, otherwise a signed link to the
/// download endpoint when a base URL and secret are configured.
#[derive(Debug, Clone, Default)]
pub struct SignedMediaResolver {
    base_url: Option<String>,
    secret: Option<String>,
    ttl_secs: i64,
}

impl SignedMediaResolver {
    pub fn new(base_url: Option<String>, secret: Option<String>, ttl_secs: i64) -> Self {
        Self {
            base_url,
            secret,
            ttl_secs,
        }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        Self::new(
            config.download_base_url.clone(),
            config.download_signing_secret.clone(),
            config.download_link_ttl_secs,
        )
    }
}

impl MediaResolver for SignedMediaResolver {
    fn download_url(&self, file: &MediaFile, now: Timestamp) -> Option<String> {
        if let Some(cdn) = file.cdn_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(cdn.to_string());
        }
        let base = self.base_url.as_deref()?;
        let secret = self.secret.as_deref()?;
        Some(signed_download_url(base, secret, file.id, self.ttl_secs, now))
    }
}
