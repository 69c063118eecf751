//! OpenAI-compatible chat-completions oracle.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::decision::DecisionKind;
use crate::error::OracleError;
use crate::io::config::ChatOracleConfig;
use crate::io::oracle::{Oracle, OracleRequest};

const SYSTEM_MESSAGE: &str = "You are the planning component of an authorized security assessment. \
Answer with a single JSON object that matches the provided schema and nothing else.";

/// Oracle backed by a `/chat/completions` endpoint with strict JSON-schema output.
pub struct ChatOracle {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl ChatOracle {
    pub fn new(config: &ChatOracleConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "no api key set, sending unauthenticated requests");
        }
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl Oracle for ChatOracle {
    #[instrument(skip_all, fields(kind = %request.kind, model = %self.model))]
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = request_body(&self.model, request)?;

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key);
        }

        info!("calling chat oracle");
        let response = req
            .send()
            .map_err(|err| OracleError::transport(format!("POST {}: {err}", self.endpoint)))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| OracleError::transport(format!("read response body: {err}")))?;
        if !status.is_success() {
            return Err(OracleError::transport(format!(
                "POST {} returned {status}: {}",
                self.endpoint,
                text.trim()
            )));
        }
        debug!(bytes = text.len(), "chat oracle responded");
        extract_content(request.kind, &text)
    }
}

fn request_body(model: &str, request: &OracleRequest) -> Result<Value, OracleError> {
    Ok(json!({
        "model": model,
        "messages": [
            { "role": "system", "content": SYSTEM_MESSAGE },
            { "role": "user", "content": request.prompt },
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": request.kind.as_str(),
                "strict": true,
                "schema": response_schema(request.kind)?,
            },
        },
    }))
}

/// The decision schema without the meta keys strict-mode endpoints reject.
fn response_schema(kind: DecisionKind) -> Result<Value, OracleError> {
    let mut schema: Value = serde_json::from_str(kind.schema())
        .map_err(|err| OracleError::decode(kind, format!("embedded schema: {err}")))?;
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    Ok(schema)
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn extract_content(kind: DecisionKind, body: &str) -> Result<String, OracleError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|err| OracleError::decode(kind, format!("chat response: {err}")))?;
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| OracleError::decode(kind, "chat response without choices"))?;
    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(OracleError::decode(kind, format!("model refused: {refusal}")));
    }
    message
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| OracleError::decode(kind, "chat response without content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_strict_schema() {
        let request = OracleRequest {
            kind: DecisionKind::FrontierUpdate,
            prompt: "what next".to_string(),
        };
        let body = request_body("grok-2-latest", &request).expect("body");

        assert_eq!(body["model"], "grok-2-latest");
        assert_eq!(body["messages"][1]["content"], "what next");
        let format = &body["response_format"]["json_schema"];
        assert_eq!(format["name"], "frontier_update");
        assert_eq!(format["strict"], true);
        assert!(format["schema"].get("$schema").is_none());
        assert_eq!(format["schema"]["required"], json!(["add", "remove"]));
    }

    #[test]
    fn extracts_first_choice_content() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"{\"leads\":[]}"}}]}"#;
        let content = extract_content(DecisionKind::FrontierSeed, body).expect("content");
        assert_eq!(content, r#"{"leads":[]}"#);
    }

    #[test]
    fn missing_content_is_a_decode_error() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let err = extract_content(DecisionKind::Digest, body).unwrap_err();
        assert!(err.is_decode());

        let err = extract_content(DecisionKind::Digest, r#"{"choices":[]}"#).unwrap_err();
        assert!(err.to_string().contains("without choices"));
    }

    #[test]
    fn refusal_is_a_decode_error() {
        let body = r#"{"choices":[{"message":{"content":null,"refusal":"cannot help"}}]}"#;
        let err = extract_content(DecisionKind::NextStep, body).unwrap_err();
        assert!(err.to_string().contains("cannot help"));
    }
}
