use crate::config::NarrativeConfig;
use crate::error::{KpiEngineError, Result};
use crate::llm::types::*;
use crate::narrative::NarrativeGenerator;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

/// HTTP client for the narrative service (Gemini `generateContent`).
///
/// All connection settings come from the [`NarrativeConfig`] given at construction.
#[derive(Clone)]
pub struct NarrativeClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl NarrativeClient {
    pub fn new(config: &NarrativeConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(KpiEngineError::ConfigError(
                "narrative.api_key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    pub async fn generate_content(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let payload = build_request(system_prompt, user_prompt);

        let res = self.client.post(self.endpoint()).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(KpiEngineError::NarrativeFailed(format!(
                "Narrative service error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;
        extract_text(body)
    }
}

impl std::fmt::Debug for NarrativeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrativeClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl NarrativeGenerator for NarrativeClient {
    fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        self.generate_content(system_prompt, user_prompt)
    }
}

/// Request body asking for JSON shaped like [`NarrativeResponse`](crate::narrative::NarrativeResponse).
pub fn build_request(system_prompt: &str, user_prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::user(user_prompt)],
        system_instruction: Some(Content::user(system_prompt)),
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: Some(narrative_schema()),
        },
    }
}

/// The response schema in the OpenAPI subset the service accepts.
fn narrative_schema() -> serde_json::Value {
    let list = serde_json::json!({ "type": "ARRAY", "items": { "type": "STRING" } });
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING" },
            "key_insights": list,
            "risks": list,
            "recommendations": list,
            "variance_drivers": list,
        },
        "required": ["summary", "key_insights", "risks", "recommendations"],
    })
}

/// First text part of the first candidate.
pub fn extract_text(body: GenerateContentResponse) -> Result<String> {
    body.candidates
        .ok_or_else(|| KpiEngineError::NarrativeFailed("No candidates returned".to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| KpiEngineError::NarrativeFailed("Empty candidates list".to_string()))?
        .content
        .parts
        .into_iter()
        .next()
        .map(|part| part.text)
        .ok_or_else(|| KpiEngineError::NarrativeFailed("No parts in content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let err = NarrativeClient::new(&NarrativeConfig::default()).unwrap_err();
        assert!(matches!(err, KpiEngineError::ConfigError(_)));
    }

    #[test]
    fn test_endpoint_uses_configured_base_url() {
        let config = NarrativeConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            model: "test-model".to_string(),
            ..NarrativeConfig::default()
        }
        .with_api_key("k");

        let client = NarrativeClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1/models/test-model:generateContent?key=k"
        );
        assert!(!format!("{:?}", client).contains("key=k"));
    }

    #[test]
    fn test_request_serialization() {
        let request = build_request("system", "user prompt");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "user prompt");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "system");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            json["generationConfig"]["responseSchema"]["properties"]["risks"]["type"],
            "ARRAY"
        );
    }

    #[test]
    fn test_extract_text() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"role": "model", "parts": [{"text": "{\"summary\": \"ok\"}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), r#"{"summary": "ok"}"#);

        let empty = GenerateContentResponse::default();
        assert!(extract_text(empty).is_err());
    }
}
