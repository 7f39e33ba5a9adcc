//! Prompt composition for the reasoning provider.
//!
//! Composition is deterministic: the same session state, stage, tier, and
//! turn history always yield the same payload, so turn content can be tested
//! without a live provider. History is bounded to a fixed recency window to
//! keep payload size flat no matter how long the interview runs.

use sha2::{Digest, Sha256};

use crate::catalog::{DifficultyTier, StageConfig};
use crate::error::{Error, Result};
use crate::pipeline::Turn;
use crate::providers::ReasoningRequest;
use crate::session::Session;

/// Composer tunables.
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// How many recent turns the payload may reference
    pub recent_window: usize,
    /// Company name the persona speaks for
    pub company: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            recent_window: 6,
            company: "the hiring company".to_string(),
        }
    }
}

/// The instruction payload sent to the reasoning provider for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPayload {
    /// Persona/system instruction
    pub system: String,
    /// Rendered recent transcript (empty at session start)
    pub transcript: String,
    /// Deterministically selected seed question from the stage pool
    pub seed_question: String,
    /// True when the session has no history and the payload asks for a greeting
    pub greeting: bool,
    /// Content digest, stored on the Turn as the composed-prompt reference
    pub digest: String,
}

impl PromptPayload {
    /// Build the reasoning request for a candidate utterance.
    pub fn to_request(&self, utterance: &str) -> ReasoningRequest {
        let mut prompt = String::new();
        if !self.transcript.is_empty() {
            prompt.push_str("Recent conversation:\n");
            prompt.push_str(&self.transcript);
            prompt.push('\n');
        }
        prompt.push_str("Candidate: ");
        prompt.push_str(utterance);
        prompt.push_str("\n\nRespond as the interviewer.");
        ReasoningRequest::new(prompt)
            .with_system(self.system.clone())
            .with_temperature(0.7)
    }
}

/// Builds the per-turn instruction payload.
#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    config: ComposerConfig,
}

impl PromptComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Compose the payload for the session's next turn.
    ///
    /// Fails only on a malformed stage configuration; an empty history
    /// degrades to the generic greeting payload instead of failing.
    pub fn compose(
        &self,
        session: &Session,
        stage: &StageConfig,
        tier: DifficultyTier,
        recent_turns: &[Turn],
    ) -> Result<PromptPayload> {
        if stage.rubric.is_empty() {
            return Err(Error::composition(format!(
                "stage {} has an empty rubric",
                stage.id
            )));
        }

        let window = recent_turns
            .len()
            .saturating_sub(self.config.recent_window);
        let recent = &recent_turns[window..];
        let seed_question = self.pick_seed_question(session, stage, recent_turns.len() as u64);

        let mut system = String::new();
        system.push_str(&format!(
            "You are {}, representing {} in the {} of a live voice interview for a {} position.\n",
            stage.persona, self.config.company, stage.name, session.job_role
        ));
        system.push_str(
            "Your replies are spoken aloud: keep them short, conversational, and ask exactly one question at a time.\n",
        );

        system.push_str(&format!(
            "\nCURRENT DIFFICULTY: {}\n{}\n",
            tier,
            tier.guidance()
        ));

        system.push_str("\nCOMPETENCY FOCUS for this stage:\n");
        for dimension in &stage.rubric {
            system.push_str(&format!(
                "- {} ({})\n",
                dimension,
                dimension.description()
            ));
        }

        if recent.is_empty() {
            system.push_str(&format!(
                "\nThis is the start of the stage. Greet the candidate, introduce yourself in one sentence, then open with: {}\n",
                seed_question
            ));
        } else {
            system.push_str(&format!(
                "\nIf the current thread is exhausted, move on to: {}\n",
                seed_question
            ));
        }

        let transcript = render_transcript(recent);

        let mut hasher = Sha256::new();
        hasher.update(system.as_bytes());
        hasher.update(transcript.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        Ok(PromptPayload {
            system,
            transcript,
            seed_question,
            greeting: recent.is_empty(),
            digest,
        })
    }

    /// Deterministic question selection: hash of (session id, turn sequence)
    /// indexes the stage pool, so a session replays identically but distinct
    /// sessions vary.
    fn pick_seed_question(&self, session: &Session, stage: &StageConfig, seq: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(session.id.0.as_bytes());
        hasher.update(seq.to_be_bytes());
        let hash = hasher.finalize();
        let index = u64::from_be_bytes(hash[..8].try_into().expect("digest is 32 bytes"))
            as usize
            % stage.seed_questions.len();
        stage.seed_questions[index].clone()
    }
}

fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str("Candidate: ");
        out.push_str(&turn.utterance);
        out.push('\n');
        if let Some(reply) = &turn.reply {
            out.push_str("Interviewer: ");
            out.push_str(reply);
            out.push('\n');
        }
    }
    out
}
