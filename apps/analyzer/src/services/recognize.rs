use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::entity::{EntityType, RawEntity};
use crate::services::{EntityRecognizer, ServiceError};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const LANGUAGE_CODE: &str = "en";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectEntitiesRequest<'a> {
    text: &'a str,
    language_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectEntitiesResponse {
    #[serde(default)]
    entities: Vec<WireEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEntity {
    #[serde(rename = "Type")]
    entity_type: EntityType,
    text: String,
    score: f32,
    begin_offset: usize,
    end_offset: usize,
}

impl From<WireEntity> for RawEntity {
    fn from(w: WireEntity) -> Self {
        RawEntity::new(w.entity_type, w.text, w.begin_offset, w.end_offset, w.score)
    }
}

/// Client for a detect-entities endpoint speaking the
/// `{"Entities": [{"Type", "Text", "Score", "BeginOffset", "EndOffset"}]}` shape.
#[derive(Clone)]
pub struct HttpEntityRecognizer {
    client: Client,
    endpoint: String,
}

impl HttpEntityRecognizer {
    pub fn new(endpoint: String) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl EntityRecognizer for HttpEntityRecognizer {
    async fn detect_entities(&self, text: &str) -> Result<Vec<RawEntity>, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&DetectEntitiesRequest {
                text,
                language_code: LANGUAGE_CODE,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: DetectEntitiesResponse = response.json().await?;
        let mut entities: Vec<RawEntity> = body.entities.into_iter().map(RawEntity::from).collect();
        entities.sort_by_key(|e| (e.start_offset, e.end_offset));

        debug!("Entity service returned {} entities", entities.len());
        Ok(entities)
    }
}
