//! Provider request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to the reasoning provider.
///
/// Timeouts are enforced by the caller (turn pipeline, shadow analyzer,
/// evaluation aggregator), not by the provider itself, so the retry and
/// degrade policy lives in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    /// The user-facing prompt content
    pub prompt: String,
    /// System/persona instruction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output token cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the provider for a strict-JSON response (scoring, summaries)
    pub json_output: bool,
}

impl ReasoningRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: None,
            max_tokens: None,
            json_output: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Opaque handle to a synthesized audio segment.
///
/// The engine never carries raw audio; transport of the actual bytes is the
/// media layer's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioHandle {
    /// Handle identifier
    pub id: Uuid,
    /// Voice the segment was rendered with
    pub voice: String,
    /// Content type of the rendered audio
    pub mime_type: String,
    /// Rendered payload size, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_len: Option<u64>,
    /// When synthesis finished
    pub created_at: DateTime<Utc>,
}

impl AudioHandle {
    pub fn new(voice: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            voice: voice.into(),
            mime_type: mime_type.into(),
            byte_len: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_byte_len(mut self, byte_len: u64) -> Self {
        self.byte_len = Some(byte_len);
        self
    }
}
