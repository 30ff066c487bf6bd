// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Generic artifact-repository backend (spec §4.3.3): the document
//! lives at `<repository>/<prefix>/version_db.json` over plain HTTP,
//! authenticated with either an API key header or basic credentials.
//! Same last-writer-wins semantics as the object-store backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{BackendKind, VersionDatabase};
use crate::config::Config;
use crate::error::CoreError;
use crate::model::VersionDbDocument;

const OBJECT_NAME: &str = "version_db.json";

enum Credential {
    ApiKey(String),
    Basic { username: String, password: String },
    None,
}

pub struct ArtifactoryBackend {
    client: Client,
    base_url: String,
    repository: String,
    path_prefix: String,
    credential: Credential,
}

impl ArtifactoryBackend {
    pub fn from_config(config: &Config) -> Result<Self, CoreError> {
        let settings = &config.download.artifactory_storage;
        let base_url = settings.base_url.clone().ok_or_else(|| {
            CoreError::ConfigInvalid("artifactory_storage.base_url is required".to_string())
        })?;
        let repository = settings.repository.clone().ok_or_else(|| {
            CoreError::ConfigInvalid("artifactory_storage.repository is required".to_string())
        })?;

        let client = Client::builder()
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()
            .map_err(|e| CoreError::ConfigInvalid(format!("building HTTP client: {e}")))?;

        let credential = if let Ok(api_key) = std::env::var("ARTIFACTORY_API_KEY") {
            Credential::ApiKey(api_key)
        } else if let (Ok(username), Ok(password)) = (
            std::env::var("ARTIFACTORY_USERNAME"),
            std::env::var("ARTIFACTORY_PASSWORD"),
        ) {
            Credential::Basic { username, password }
        } else {
            Credential::None
        };

        Ok(Self {
            client,
            base_url,
            repository,
            path_prefix: settings.path_prefix.clone().unwrap_or_default(),
            credential,
        })
    }

    fn object_url(&self) -> String {
        let mut segments = vec![self.base_url.trim_end_matches('/').to_string(), self.repository.clone()];
        if !self.path_prefix.is_empty() {
            segments.push(self.path_prefix.trim_matches('/').to_string());
        }
        segments.push(OBJECT_NAME.to_string());
        segments.join("/")
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credential {
            Credential::ApiKey(key) => builder.header("X-JFrog-Art-Api", key),
            Credential::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            Credential::None => builder,
        }
    }
}

#[async_trait]
impl VersionDatabase for ArtifactoryBackend {
    async fn load(&self) -> Result<VersionDbDocument, CoreError> {
        let url = self.object_url();
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(VersionDbDocument::empty(BackendKind::Artifactory.tag()));
        }

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(CoreError::CredentialRejected(format!(
                "artifact repository returned {}",
                response.status()
            )));
        }

        if !response.status().is_success() {
            return Err(CoreError::StorageUnavailable(format!(
                "artifact repository returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::StorageCorrupt(format!("{url}: {e}")))
    }

    async fn save(&self, document: &VersionDbDocument) -> Result<(), CoreError> {
        let url = self.object_url();
        let serialized = serde_json::to_vec_pretty(document)
            .map_err(|e| CoreError::StorageCorrupt(e.to_string()))?;

        let response = self
            .authorize(self.client.put(&url))
            .header(reqwest::header::CONTENT_LENGTH, serialized.len())
            .body(serialized)
            .send()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(CoreError::CredentialRejected(format!(
                "artifact repository rejected upload: {}",
                response.status()
            )));
        }

        if !response.status().is_success() {
            return Err(CoreError::StorageUnavailable(format!(
                "artifact repository returned {} on upload",
                response.status()
            )));
        }

        Ok(())
    }
}
