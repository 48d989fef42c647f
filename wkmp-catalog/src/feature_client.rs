//! Client for the external low-level feature service (§4.7's feature-fetch
//! addon): given a MusicBrainz track id, fetch its feature vectors and
//! return the raw JSON blob verbatim for storage in `Features.data`.

use std::time::Duration;

use wkmp_common::{Error, Result};

#[derive(Clone)]
pub struct FeatureClient {
    http: reqwest::Client,
    base_url: String,
}

impl FeatureClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");

        Self { http, base_url: base_url.into() }
    }

    /// Fetch the feature blob for a track by MusicBrainz id. Non-2xx
    /// responses and transport errors are reported as `Error::Transient`
    /// so the scan engine logs and skips rather than aborting the scan.
    pub async fn fetch(&self, musicbrainz_track_id: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), musicbrainz_track_id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Transient(format!(
                "feature service returned {}",
                response.status()
            )));
        }

        response.text().await.map_err(|e| Error::Transient(e.to_string()))
    }
}
