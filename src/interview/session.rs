use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::analyzer::{AnalysisError, AnalysisResult};
use super::questions::ExperienceLevel;

/// Where the session currently is in the ask-answer-review loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No question set.
    Idle,
    /// Question set, awaiting the spoken answer.
    QuestionReady,
    /// Analysis outcome (result or error) present.
    Analyzed,
}

#[derive(Debug, Error)]
#[error("No hay ninguna pregunta activa para registrar una respuesta.")]
pub struct NoActiveQuestion;

/// One mock-interview session: a single question, a single analysis.
///
/// The phase is derived from which slots are filled, so the two can
/// never disagree; an outcome only exists while a question is set, and
/// reset clears both together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: Uuid,
    pub role: String,
    pub experience: ExperienceLevel,
    question: Option<String>,
    outcome: Option<Result<AnalysisResult, AnalysisError>>,
    pub started_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn new(role: impl Into<String>, experience: ExperienceLevel) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: role.into(),
            experience,
            question: None,
            outcome: None,
            started_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.question, &self.outcome) {
            (None, _) => SessionPhase::Idle,
            (Some(_), None) => SessionPhase::QuestionReady,
            (Some(_), Some(_)) => SessionPhase::Analyzed,
        }
    }

    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn outcome(&self) -> Option<&Result<AnalysisResult, AnalysisError>> {
        self.outcome.as_ref()
    }

    /// Install a freshly generated question. If a previous question was
    /// already analyzed this is an implicit reset first: one question
    /// per session, never two analyses alive at once.
    pub fn set_question(&mut self, question: String) {
        if self.outcome.is_some() {
            info!("New question while analyzed, resetting previous round");
            self.reset();
        }
        self.question = Some(question);
    }

    /// Record the analysis outcome for the active question. Success and
    /// failure both fill the slot; only the variant differs.
    pub fn record_outcome(
        &mut self,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) -> Result<(), NoActiveQuestion> {
        if self.question.is_none() {
            return Err(NoActiveQuestion);
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Explicit restart: clears question and outcome atomically. Never
    /// triggered automatically.
    pub fn reset(&mut self) {
        self.question = None;
        self.outcome = None;
        info!("Session {} reset", self.id);
    }
}
