// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Paged, rate-limited, authenticated release fetches against the
//! upstream hosting API (spec §4.4).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::error::CoreError;
use crate::model::{Asset, Release, RepoKey};
use crate::rate_limiter::RateLimiter;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("release-tracker/", env!("CARGO_PKG_VERSION"));
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct RawAsset {
    name: String,
    browser_download_url: String,
    size: u64,
    content_type: Option<String>,
    #[serde(default)]
    digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    html_url: String,
    tarball_url: Option<String>,
    zipball_url: Option<String>,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

fn into_release(repo: &RepoKey, raw: RawRelease) -> Release {
    Release {
        repo: repo.clone(),
        tag: raw.tag_name.clone(),
        name: raw.name.unwrap_or(raw.tag_name),
        published_at: raw.published_at.unwrap_or_else(Utc::now),
        draft: raw.draft,
        prerelease: raw.prerelease,
        html_url: raw.html_url,
        tarball_url: raw.tarball_url,
        zipball_url: raw.zipball_url,
        assets: raw
            .assets
            .into_iter()
            .map(|a| Asset {
                name: a.name,
                download_url: a.browser_download_url,
                size: a.size,
                content_type: a.content_type,
                digest: a.digest,
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitStatus {
    pub remaining: Option<u32>,
    pub reset_at: Option<SystemTime>,
}

pub struct ApiClient {
    client: Client,
    api_base: String,
    token: Option<String>,
    rate_limiter: RateLimiter,
}

impl ApiClient {
    pub fn new(
        token: Option<String>,
        rate_limit_delay: Duration,
        request_timeout: Duration,
    ) -> Result<Self, CoreError> {
        Self::with_base_url(DEFAULT_API_BASE.to_string(), token, rate_limit_delay, request_timeout)
    }

    pub fn with_base_url(
        api_base: String,
        token: Option<String>,
        rate_limit_delay: Duration,
        request_timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| CoreError::ConfigInvalid(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base,
            token,
            rate_limiter: RateLimiter::new(rate_limit_delay),
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn get(&self, url: &str) -> Result<Option<reqwest::Response>, CoreError> {
        let mut attempt = 0u32;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            attempt += 1;
            self.rate_limiter.acquire().await;

            let response = self
                .authorize(self.client.get(url))
                .send()
                .await
                .map_err(|e| CoreError::Transient(e.to_string()));

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(e);
                    }
                    warn!(attempt, "transport error, retrying: {}", e);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    continue;
                }
            };

            match response.status() {
                StatusCode::NOT_FOUND => return Ok(None),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(CoreError::CredentialRejected(format!(
                        "upstream API returned {}",
                        response.status()
                    )));
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let reset_at = parse_reset_header(&response);
                    let sleep_for = reset_sleep_duration(reset_at);
                    warn!(attempt, ?sleep_for, "rate limited by upstream");
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CoreError::RateLimited { reset_at });
                    }
                    tokio::time::sleep(sleep_for).await;
                    continue;
                }
                status if status.is_server_error() => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CoreError::Transient(format!("upstream returned {status}")));
                    }
                    warn!(attempt, %status, "server error, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    continue;
                }
                status if status.is_success() => return Ok(Some(response)),
                status => {
                    return Err(CoreError::Transient(format!(
                        "unexpected upstream status {status}"
                    )));
                }
            }
        }
    }

    /// Fetch the single latest release for a repository, falling back
    /// to listing releases and picking the first eligible entry when
    /// the dedicated endpoint is unavailable (spec §4.4, "Pagination").
    #[instrument(skip(self))]
    pub async fn latest_release(
        &self,
        repo: &RepoKey,
        include_prereleases: bool,
    ) -> Result<Option<Release>, CoreError> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, repo.owner, repo.repo
        );

        if let Some(response) = self.get(&url).await? {
            let raw: RawRelease = response
                .json()
                .await
                .map_err(|e| CoreError::Transient(format!("decoding release JSON: {e}")))?;
            return Ok(Some(into_release(repo, raw)));
        }

        // /releases/latest only considers non-draft, non-prerelease
        // entries; repositories with nothing but prereleases get a 404
        // there, so fall back to the list endpoint.
        self.first_eligible_from_list(repo, include_prereleases)
            .await
    }

    async fn first_eligible_from_list(
        &self,
        repo: &RepoKey,
        include_prereleases: bool,
    ) -> Result<Option<Release>, CoreError> {
        let url = format!(
            "{}/repos/{}/{}/releases?per_page=30&page=1",
            self.api_base, repo.owner, repo.repo
        );

        let Some(response) = self.get(&url).await? else {
            return Ok(None);
        };

        let raw: Vec<RawRelease> = response
            .json()
            .await
            .map_err(|e| CoreError::Transient(format!("decoding releases JSON: {e}")))?;

        let found = raw
            .into_iter()
            .find(|r| !r.draft && (include_prereleases || !r.prerelease));

        Ok(found.map(|r| into_release(repo, r)))
    }

    #[instrument(skip(self))]
    pub async fn rate_limit_status(&self) -> Result<RateLimitStatus, CoreError> {
        let url = format!("{}/rate_limit", self.api_base);

        let Some(response) = self.get(&url).await? else {
            return Ok(RateLimitStatus {
                remaining: None,
                reset_at: None,
            });
        };

        #[derive(Deserialize)]
        struct Resources {
            core: Core,
        }
        #[derive(Deserialize)]
        struct Core {
            remaining: u32,
            reset: u64,
        }
        #[derive(Deserialize)]
        struct Body {
            resources: Resources,
        }

        let body: Body = response
            .json()
            .await
            .map_err(|e| CoreError::Transient(format!("decoding rate_limit JSON: {e}")))?;

        Ok(RateLimitStatus {
            remaining: Some(body.resources.core.remaining),
            reset_at: Some(UNIX_EPOCH + Duration::from_secs(body.resources.core.reset)),
        })
    }
}

fn parse_reset_header(response: &reqwest::Response) -> Option<SystemTime> {
    response
        .headers()
        .get("x-ratelimit-reset")
        .or_else(|| response.headers().get("retry-after"))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(|epoch_secs| UNIX_EPOCH + Duration::from_secs(epoch_secs))
}

/// Sleep until one second past `reset_at`; a reset already in the past
/// (spec §8, boundary behavior) means "retry immediately".
fn reset_sleep_duration(reset_at: Option<SystemTime>) -> Duration {
    match reset_at {
        Some(reset_at) => {
            let target = reset_at + Duration::from_secs(1);
            target
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        }
        None => INITIAL_BACKOFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_in_the_past_yields_zero_sleep() {
        let reset_at = SystemTime::now() - Duration::from_secs(60);
        assert_eq!(reset_sleep_duration(Some(reset_at)), Duration::ZERO);
    }

    #[test]
    fn reset_in_the_future_sleeps_past_it() {
        let reset_at = SystemTime::now() + Duration::from_secs(10);
        let sleep_for = reset_sleep_duration(Some(reset_at));
        assert!(sleep_for >= Duration::from_secs(10));
        assert!(sleep_for <= Duration::from_secs(12));
    }
}
