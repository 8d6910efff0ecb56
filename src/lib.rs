pub mod config;
pub mod gemini;
pub mod interview;
pub mod render;

pub use config::{ConfigError, Settings};
pub use gemini::{GeminiClient, MultimodalModel, RemoteError, TextModel};
pub use interview::{
    AnalysisError, AnalysisErrorKind, AnalysisResult, AnswerAnalyzer, ExperienceLevel,
    GenerationError, InterviewSession, QuestionGenerator, SessionPhase, SkillScores,
};
