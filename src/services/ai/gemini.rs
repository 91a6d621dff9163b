use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{LlmProvider, Message};

pub struct GeminiProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        // Gemini wants "model" instead of "assistant" for its own turns
        let contents: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                let role = if msg.role == "assistant" { "model" } else { "user" };
                json!({
                    "role": role,
                    "parts": [{ "text": msg.content }],
                })
            })
            .collect();

        let body = json!({
            "system_instruction": { "parts": [{ "text": system_prompt }] },
            "contents": contents,
            "generationConfig": { "temperature": 0.7 },
        });

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(std::time::Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .context("failed to call Gemini API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Gemini response")?;

        if !status.is_success() {
            anyhow::bail!("Gemini API error ({}): {}", status, data);
        }

        data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing content in Gemini response"))
    }
}
