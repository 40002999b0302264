use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MIN_SCORE: u8 = 6;
pub const MAX_SCORE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedIdea {
    pub title: String,
    pub description: String,
    pub category: String,
    pub genre: String,
    pub viability: u8,
    pub originality: u8,
    pub market_appeal: u8,
}

/// Clamp a model-reported score into the advertised 6..=10 range.
pub fn clamp_score(raw: i64) -> u8 {
    raw.clamp(MIN_SCORE as i64, MAX_SCORE as i64) as u8
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
}
