//! Confluent schema registry REST client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompatibilityLevel, RegisteredSchema, SchemaRegistry};
use crate::error::RegistryError;

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    compatibility_level: CompatibilityLevel,
}

#[derive(Debug, Serialize)]
struct ConfigRequest {
    compatibility: CompatibilityLevel,
}

#[derive(Debug, Serialize)]
struct SchemaRequest<'a> {
    schema: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    id: u32,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    id: u32,
    version: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
}

/// Schema registry reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpSchemaRegistry {
    http: reqwest::Client,
    url: String,
}

impl HttpSchemaRegistry {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path)
    }

    /// Subject compatibility, falling back to the global level when the
    /// subject has no config of its own
    fn compatibility_request(&self, subject: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.endpoint(&format!("config/{subject}")))
            .query(&[("defaultToGlobal", "true")])
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: ErrorResponse = response.json().await.unwrap_or_default();
        Err(RegistryError::Status {
            code: status.as_u16(),
            message: body.message,
        })
    }
}

#[async_trait]
impl SchemaRegistry for HttpSchemaRegistry {
    async fn get_compatibility(
        &self,
        subject: &str,
    ) -> Result<Option<CompatibilityLevel>, RegistryError> {
        debug!(subject, "get subject compatibility");
        let response = self.compatibility_request(subject).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let config: ConfigResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        Ok(Some(config.compatibility_level))
    }

    async fn set_compatibility(
        &self,
        subject: &str,
        level: CompatibilityLevel,
    ) -> Result<(), RegistryError> {
        debug!(subject, %level, "set subject compatibility");
        let response = self
            .http
            .put(self.endpoint(&format!("config/{subject}")))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&ConfigRequest {
                compatibility: level,
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_schema(
        &self,
        subject: &str,
        schema: &str,
    ) -> Result<RegisteredSchema, RegistryError> {
        debug!(subject, "register schema");
        let request = SchemaRequest { schema };
        let response = self
            .http
            .post(self.endpoint(&format!("subjects/{subject}/versions")))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&request)
            .send()
            .await?;
        let registered: RegisterResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;

        // the register call only answers the id
        let response = self
            .http
            .post(self.endpoint(&format!("subjects/{subject}")))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&request)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::SubjectNotFound(subject.to_string()));
        }
        let lookup: LookupResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        if lookup.id != registered.id {
            return Err(RegistryError::Decode(format!(
                "subject {subject} answered id {} after registering id {}",
                lookup.id, registered.id
            )));
        }

        Ok(RegisteredSchema {
            id: registered.id,
            version: lookup.version,
            subject: subject.to_string(),
            schema: schema.to_string(),
        })
    }
}
