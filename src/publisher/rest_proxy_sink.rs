//! Kafka REST proxy sink.
//!
//! Produces records with the v2 JSON embedded format:
//! `POST {base}/topics/{topic}` with `{"records":[{"key":..,"value":..}]}`.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use super::StreamSink;
use crate::error::PublishError;

const CONTENT_TYPE_V2_JSON: &str = "application/vnd.kafka.json.v2+json";
const ACCEPT_V2: &str = "application/vnd.kafka.v2+json";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: [ProduceRecord<'a>; 1],
}

#[derive(Serialize)]
struct ProduceRecord<'a> {
    key: &'a str,
    value: &'a Value,
}

/// Delivers records to a Kafka REST proxy over HTTP.
pub struct RestProxySink {
    client: Client,
    base_url: String,
}

impl RestProxySink {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{}", self.base_url, topic)
    }
}

fn produce_body(key: &str, value: &Value) -> Result<Vec<u8>, PublishError> {
    let request = ProduceRequest {
        records: [ProduceRecord { key, value }],
    };
    Ok(serde_json::to_vec(&request)?)
}

impl StreamSink for RestProxySink {
    fn send(&self, topic: &str, key: &str, value: &Value) -> Result<(), PublishError> {
        let body = produce_body(key, value)?;

        let response = self
            .client
            .post(self.topic_url(topic))
            .header(CONTENT_TYPE, CONTENT_TYPE_V2_JSON)
            .header(ACCEPT, ACCEPT_V2)
            .body(body)
            .send()
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}
