use serde::Serialize;
use thiserror::Error;

use super::types::ParsedFeed;

/// A problem that makes a feed unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationError {
    #[error("Feed title is required")]
    MissingTitle,

    #[error("Feed URL is required")]
    MissingUrl,

    #[error("Episode {index} ({guid}) has no audio URL")]
    EpisodeMissingAudio { index: usize, guid: String },
}

/// A problem worth surfacing that does not invalidate the feed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationWarning {
    #[error("Feed has no episodes")]
    NoEpisodes,

    #[error("Episode {index} has no title")]
    EpisodeMissingTitle { index: usize },

    #[error("Episode {index} has no GUID")]
    EpisodeMissingGuid { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// `true` exactly when `errors` is empty
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// Classifies the problems in a parsed feed. Pure; never touches the network.
pub fn validate_feed(feed: &ParsedFeed) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if feed.title.trim().is_empty() {
        errors.push(ValidationError::MissingTitle);
    }
    if feed.url.trim().is_empty() {
        errors.push(ValidationError::MissingUrl);
    }
    if feed.episodes.is_empty() {
        warnings.push(ValidationWarning::NoEpisodes);
    }

    for (index, episode) in feed.episodes.iter().enumerate() {
        if episode.audio_url.trim().is_empty() {
            errors.push(ValidationError::EpisodeMissingAudio {
                index,
                guid: episode.guid.clone(),
            });
        }
        if episode.title.trim().is_empty() {
            warnings.push(ValidationWarning::EpisodeMissingTitle { index });
        }
        if episode.guid.trim().is_empty() {
            warnings.push(ValidationWarning::EpisodeMissingGuid { index });
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}
