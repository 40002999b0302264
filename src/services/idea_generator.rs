use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    config::Config,
    errors::{AppError, Result},
    models::{clamp_score, GeneratedIdea},
};

pub const DEFAULT_PROMPT: &str = "A unique and innovative game concept";

const SYSTEM_PROMPT: &str = r#"You are a creative game design expert. Generate an innovative and detailed game idea based on the user's prompt.

The response should be a valid JSON object with this exact structure:
{
  "title": "A catchy, memorable game title (max 60 characters)",
  "description": "A compelling 2-3 sentence description of the game concept, mechanics, and what makes it unique (100-200 characters)",
  "category": "One of: Video Game, Board Game, Card Game, Mobile Game, VR Game",
  "genre": "One of: Action, Adventure, RPG, Strategy, Puzzle, Simulation, Racing, Sports, Horror, Platformer, Fighting, Shooter",
  "viability": 7-10 (integer - how technically feasible and commercially viable),
  "originality": 6-10 (integer - how unique and innovative the concept is),
  "marketAppeal": 6-10 (integer - how appealing to target audience)
}

Focus on something fresh and exciting that is grounded in good game design principles."#;

/// Produces one game idea per call. Failures are surfaced to the caller so
/// no credit is spent on them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdeaGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedIdea>;
}

pub fn effective_prompt(prompt: Option<&str>) -> &str {
    match prompt.map(str::trim) {
        Some(p) if !p.is_empty() => p,
        _ => DEFAULT_PROMPT,
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIdea {
    title: String,
    description: String,
    category: String,
    genre: String,
    viability: f64,
    originality: f64,
    market_appeal: f64,
}

impl From<RawIdea> for GeneratedIdea {
    fn from(raw: RawIdea) -> Self {
        GeneratedIdea {
            title: raw.title,
            description: raw.description,
            category: raw.category,
            genre: raw.genre,
            viability: clamp_score(raw.viability.round() as i64),
            originality: clamp_score(raw.originality.round() as i64),
            market_appeal: clamp_score(raw.market_appeal.round() as i64),
        }
    }
}

/// Pull the outermost `{ ... }` span out of free-form model output.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn parse_idea(text: &str) -> Result<GeneratedIdea> {
    let json = extract_json_object(text)
        .ok_or_else(|| AppError::Generation("no JSON object in model response".to_string()))?;
    let raw: RawIdea = serde_json::from_str(json)
        .map_err(|e| AppError::Generation(format!("malformed idea JSON: {}", e)))?;
    Ok(raw.into())
}

pub struct GeminiIdeaGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiIdeaGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.gemini_base_url.clone(),
            config.gemini_model.clone(),
            config.gemini_api_key.clone(),
            Duration::from_secs(config.generation_timeout_secs),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

#[async_trait]
impl IdeaGenerator for GeminiIdeaGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedIdea> {
        let api_key = match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => return Err(AppError::Generation("generator API key not configured".to_string())),
        };

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: format!(
                        "{}\n\nUser's game idea prompt: \"{}\"\n\nGenerate a creative game idea:",
                        SYSTEM_PROMPT,
                        effective_prompt(Some(prompt))
                    ),
                }],
            }],
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            tracing::error!("Idea generator returned error: {}", response.status());
            return Err(AppError::Generation(format!(
                "generator returned {}",
                response.status()
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("unreadable response: {}", e)))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        let idea = parse_idea(&text)?;
        tracing::debug!(title = %idea.title, "Generated idea");
        Ok(idea)
    }
}
