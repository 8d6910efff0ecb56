use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gemini::{RemoteError, TextModel};

/// Candidate experience level, matching the original selector values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceLevel {
    NoExperience,
    Junior,
    Mid,
    Senior,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 4] = [
        ExperienceLevel::NoExperience,
        ExperienceLevel::Junior,
        ExperienceLevel::Mid,
        ExperienceLevel::Senior,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ExperienceLevel::NoExperience => "Sin experiencia",
            ExperienceLevel::Junior => "Junior",
            ExperienceLevel::Mid => "Mid",
            ExperienceLevel::Senior => "Senior",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "Sin experiencia" => Some(ExperienceLevel::NoExperience),
            "Junior" => Some(ExperienceLevel::Junior),
            "Mid" => Some(ExperienceLevel::Mid),
            "Senior" => Some(ExperienceLevel::Senior),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum GenerationError {
    #[error("El modelo alcanzó su límite de uso. Espera unos minutos e inténtalo de nuevo. ({0})")]
    Quota(String),
    #[error("No se pudo generar la pregunta: {0}")]
    Other(String),
}

/// Builds the recruiter prompt and requests one interview question from
/// the text model.
pub struct QuestionGenerator {
    model: Arc<dyn TextModel>,
}

impl QuestionGenerator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Generate a single hard-but-fair interview question for the given
    /// role and level. Failures are non-fatal: the caller surfaces them
    /// and leaves the session question unset.
    pub async fn generate(
        &self,
        role: &str,
        experience: ExperienceLevel,
    ) -> Result<String, GenerationError> {
        let prompt = build_question_prompt(role, experience);

        info!(
            "Generating interview question for role '{}' at level {}",
            role, experience
        );

        let text = self.model.generate_text(&prompt).await.map_err(|e| match e {
            RemoteError::Quota(msg) => GenerationError::Quota(msg),
            RemoteError::Other(msg) => GenerationError::Other(msg),
        })?;

        let question = text.trim().to_string();
        if question.is_empty() {
            warn!("Model returned an empty question");
            return Err(GenerationError::Other(
                "el modelo devolvió una respuesta vacía".to_string(),
            ));
        }

        info!(
            "Generated question: {}",
            question.chars().take(50).collect::<String>()
        );

        Ok(question)
    }
}

fn build_question_prompt(role: &str, experience: ExperienceLevel) -> String {
    format!(
        "Actúa como un reclutador experto. Genera una sola pregunta de entrevista \
         difícil pero justa para un puesto de {} nivel {}. \
         Solo dame la pregunta, sin saludos.",
        role,
        experience.label()
    )
}
