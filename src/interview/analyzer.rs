use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::gemini::{MultimodalModel, RemoteError};

/// MIME type of the answer recordings the capture layer produces.
const AUDIO_MIME: &str = "audio/wav";

/// The five skills every analysis scores, 1-10 each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillScores {
    #[serde(rename = "Tecnicismo")]
    pub tecnicismo: u8,
    #[serde(rename = "Claridad")]
    pub claridad: u8,
    #[serde(rename = "Seguridad")]
    pub seguridad: u8,
    #[serde(rename = "Vocabulario")]
    pub vocabulario: u8,
    #[serde(rename = "Empatía")]
    pub empatia: u8,
}

impl SkillScores {
    pub fn entries(&self) -> [(&'static str, u8); 5] {
        [
            ("Tecnicismo", self.tecnicismo),
            ("Claridad", self.claridad),
            ("Seguridad", self.seguridad),
            ("Vocabulario", self.vocabulario),
            ("Empatía", self.empatia),
        ]
    }

    fn out_of_range(&self) -> Option<(&'static str, u8)> {
        self.entries()
            .into_iter()
            .find(|(_, score)| !(1..=10).contains(score))
    }
}

/// Parsed evaluation of one spoken answer. Immutable once constructed;
/// discarded on session reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub transcript: String,
    pub feedback_short: String,
    pub scores: SkillScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisErrorKind {
    Quota,
    Other,
}

/// Non-fatal analysis failure, surfaced in place of the result. For
/// malformed remote responses the raw text is kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AnalysisError {
    pub kind: AnalysisErrorKind,
    pub message: String,
    pub raw: Option<String>,
}

impl AnalysisError {
    fn quota(detail: String) -> Self {
        AnalysisError {
            kind: AnalysisErrorKind::Quota,
            message: format!(
                "El modelo alcanzó su límite de uso. Espera unos minutos e inténtalo de nuevo. ({})",
                detail
            ),
            raw: None,
        }
    }

    fn other(message: String) -> Self {
        AnalysisError {
            kind: AnalysisErrorKind::Other,
            message,
            raw: None,
        }
    }

    fn malformed(message: String, raw: &str) -> Self {
        AnalysisError {
            kind: AnalysisErrorKind::Other,
            message,
            raw: Some(raw.to_string()),
        }
    }
}

/// Wire shape the model is instructed to produce.
#[derive(Deserialize)]
struct RawAnalysis {
    transcripcion: String,
    feedback_corto: String,
    scores: SkillScores,
}

type CacheKey = [u8; 32];
type Outcome = Result<AnalysisResult, AnalysisError>;

/// Uploads a recorded answer plus the analysis prompt to the multimodal
/// model and parses the strict-JSON evaluation.
///
/// Results are memoized per (audio, question) pair so a re-render never
/// re-issues the remote call for the same recording.
pub struct AnswerAnalyzer {
    model: Arc<dyn MultimodalModel>,
    cache: Mutex<HashMap<CacheKey, Outcome>>,
}

impl AnswerAnalyzer {
    pub fn new(model: Arc<dyn MultimodalModel>) -> Self {
        Self {
            model,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn analyze(&self, audio: &[u8], question: &str) -> Outcome {
        if audio.is_empty() {
            return Err(AnalysisError::other(
                "No se recibió audio para analizar.".to_string(),
            ));
        }

        let key = cache_key(audio, question);
        if let Some(cached) = self.cache.lock().get(&key) {
            info!("Analysis cache hit, skipping remote call");
            return cached.clone();
        }

        info!("Analyzing {} byte answer recording", audio.len());

        let raw_text = match self
            .model
            .analyze_audio(&build_analysis_prompt(question), audio, AUDIO_MIME)
            .await
        {
            Ok(text) => text,
            // Remote failures are transient: surface them without
            // caching so a retry re-issues the call.
            Err(RemoteError::Quota(detail)) => return Err(AnalysisError::quota(detail)),
            Err(RemoteError::Other(detail)) => {
                return Err(AnalysisError::other(format!(
                    "El análisis falló: {}",
                    detail
                )))
            }
        };

        let outcome = parse_analysis(&raw_text);
        if let Err(e) = &outcome {
            warn!("Analysis response rejected: {}", e.message);
        }

        // Ok results and malformed responses are both deterministic for
        // this recording; cache either so quota is never burned twice.
        self.cache.lock().insert(key, outcome.clone());

        outcome
    }
}

fn cache_key(audio: &[u8], question: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update((audio.len() as u64).to_le_bytes());
    hasher.update(audio);
    hasher.update(question.as_bytes());
    hasher.finalize().into()
}

fn build_analysis_prompt(question: &str) -> String {
    format!(
        "Escucha el audio adjunto. Es la respuesta de un candidato a la pregunta: \"{}\".\n\
         \n\
         Tu tarea:\n\
         1. Transcribe exactamente lo que dijo el candidato.\n\
         2. Da un consejo breve para mejorar (máximo 2 líneas).\n\
         3. Puntúa del 1 al 10 cada habilidad: Tecnicismo, Claridad, Seguridad, Vocabulario, Empatía.\n\
         \n\
         Responde únicamente con un objeto JSON con exactamente estos campos:\n\
         {{\"transcripcion\": \"...\", \"feedback_corto\": \"...\", \"scores\": {{\"Tecnicismo\": 1, \"Claridad\": 1, \"Seguridad\": 1, \"Vocabulario\": 1, \"Empatía\": 1}}}}\n\
         No escribas ningún texto fuera del JSON.",
        question
    )
}

/// Strip a Markdown code-fence wrapper (with or without a language tag)
/// before parsing. The model is told not to fence its output but does
/// so anyway often enough that this normalization step is load-bearing.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse and validate the remote response. Any JSON failure, missing
/// key, or out-of-range score classifies as a generic analysis error
/// carrying the raw text; nothing is silently coerced.
fn parse_analysis(raw_text: &str) -> Outcome {
    let stripped = strip_code_fences(raw_text);

    let parsed: RawAnalysis = serde_json::from_str(stripped).map_err(|e| {
        AnalysisError::malformed(
            format!("La respuesta del modelo no es el JSON esperado: {}", e),
            raw_text,
        )
    })?;

    if let Some((skill, score)) = parsed.scores.out_of_range() {
        return Err(AnalysisError::malformed(
            format!(
                "Puntuación fuera de rango: {} = {} (se esperaba 1..10)",
                skill, score
            ),
            raw_text,
        ));
    }

    Ok(AnalysisResult {
        transcript: parsed.transcripcion,
        feedback_short: parsed.feedback_corto,
        scores: parsed.scores,
    })
}
