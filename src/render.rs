use crate::interview::{AnalysisError, AnalysisResult};

/// Width of the score bars, one glyph per point.
const BAR_WIDTH: u8 = 10;

/// Format the analysis panel: transcript, advice, and a five-row score
/// table standing in for the radar chart.
pub fn render_report(question: &str, result: &AnalysisResult) -> String {
    let mut out = String::new();

    out.push_str("=== Análisis de la respuesta ===\n\n");
    out.push_str(&format!("Pregunta: {}\n\n", question));
    out.push_str(&format!("Transcripción:\n{}\n\n", result.transcript));
    out.push_str(&format!("Consejo:\n{}\n\n", result.feedback_short));
    out.push_str("Puntuaciones:\n");

    for (skill, score) in result.scores.entries() {
        out.push_str(&format!("  {:<12} {} {:>2}/10\n", skill, score_bar(score), score));
    }

    out
}

/// Format an analysis failure, including the raw remote text when the
/// response could not be parsed.
pub fn render_error(error: &AnalysisError) -> String {
    let mut out = format!("⚠ {}\n", error.message);
    if let Some(raw) = &error.raw {
        out.push_str("\nRespuesta original del modelo:\n");
        out.push_str(raw);
        out.push('\n');
    }
    out
}

fn score_bar(score: u8) -> String {
    let filled = score.min(BAR_WIDTH) as usize;
    let mut bar = String::new();
    bar.push_str(&"█".repeat(filled));
    bar.push_str(&"░".repeat(BAR_WIDTH as usize - filled));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::{AnalysisErrorKind, SkillScores};

    #[test]
    fn test_report_contains_all_sections() {
        let result = AnalysisResult {
            transcript: "I used caching".to_string(),
            feedback_short: "Be more specific.".to_string(),
            scores: SkillScores {
                tecnicismo: 7,
                claridad: 8,
                seguridad: 6,
                vocabulario: 7,
                empatia: 5,
            },
        };

        let report = render_report("¿Cómo escalarías el servicio?", &result);
        assert!(report.contains("¿Cómo escalarías el servicio?"));
        assert!(report.contains("I used caching"));
        assert!(report.contains("Be more specific."));
        for skill in ["Tecnicismo", "Claridad", "Seguridad", "Vocabulario", "Empatía"] {
            assert!(report.contains(skill), "missing skill row: {}", skill);
        }
        assert!(report.contains("8/10"));
    }

    #[test]
    fn test_score_bar_proportions() {
        assert_eq!(score_bar(10), "█".repeat(10));
        assert_eq!(score_bar(1), format!("█{}", "░".repeat(9)));
    }

    #[test]
    fn test_error_panel_includes_raw_text_when_present() {
        let error = AnalysisError {
            kind: AnalysisErrorKind::Other,
            message: "La respuesta del modelo no es el JSON esperado".to_string(),
            raw: Some("Lo siento, no puedo.".to_string()),
        };

        let panel = render_error(&error);
        assert!(panel.contains("JSON esperado"));
        assert!(panel.contains("Lo siento, no puedo."));
    }

    #[test]
    fn test_error_panel_without_raw_text() {
        let error = AnalysisError {
            kind: AnalysisErrorKind::Quota,
            message: "Espera unos minutos.".to_string(),
            raw: None,
        };

        let panel = render_error(&error);
        assert!(panel.contains("Espera unos minutos."));
        assert!(!panel.contains("Respuesta original"));
    }
}
