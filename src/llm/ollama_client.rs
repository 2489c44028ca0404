//! Ollama Client - plain-text completions from an Ollama server

use crate::config::FallbackConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Ollama API client
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    client: Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaClient {
    /// Create a client; requests are bounded by the configured timeout
    pub fn new(config: &FallbackConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a completion
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                num_predict: Some(512), // one SQL statement
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?
            .error_for_status()
            .context("Ollama returned an error status")?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        if !ollama_response.done {
            tracing::debug!(model = %self.model, "Ollama response not marked done");
        }
        Ok(ollama_response.response)
    }

    /// Check if Ollama server is available
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Strip a surrounding markdown code block (```sql ... ``` or ``` ... ```)
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1 FROM videos;\n```"), "SELECT 1 FROM videos;");
        assert_eq!(strip_code_fences("```\nSELECT 1 FROM videos\n```\nextra"), "SELECT 1 FROM videos");
        assert_eq!(strip_code_fences("  SELECT 1 FROM videos  "), "SELECT 1 FROM videos");
    }

    #[test]
    fn test_client_from_config() {
        let mut config = FallbackConfig::default();
        config.base_url = "http://localhost:11434/".to_string();
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.model(), "llama3.2:3b");
        assert_eq!(client.base_url, "http://localhost:11434");
    }
}
