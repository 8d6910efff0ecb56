use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};

use intervoz::render::{render_error, render_report};
use intervoz::{
    AnswerAnalyzer, ExperienceLevel, GeminiClient, InterviewSession, QuestionGenerator,
    SessionPhase, Settings,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("=== Intervoz: Simulador de entrevistas con Gemini ===");
    println!("Recibe una pregunta y responde con tu voz (archivo .wav).\n");

    // A missing API key halts before any interview flow starts.
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let client = Arc::new(GeminiClient::new(&settings));
    let generator = QuestionGenerator::new(client.clone());
    let analyzer = AnswerAnalyzer::new(client);

    let role = prompt_line("Rol al que aplicas", "Data Scientist Junior")?;
    let experience = prompt_experience()?;
    let mut session = InterviewSession::new(role, experience);

    info!("Session {} started", session.id);

    loop {
        match session.phase() {
            SessionPhase::Idle => {
                println!("\nGenerando pregunta...");
                match generator.generate(&session.role, session.experience).await {
                    Ok(question) => {
                        println!("\n🧑‍💼 Entrevistador: {}\n", question);
                        session.set_question(question);
                    }
                    Err(e) => {
                        // Non-fatal: the question stays unset and the
                        // user may retry the action.
                        eprintln!("⚠ {}", e);
                        if !ask_yes_no("¿Intentar de nuevo?")? {
                            break;
                        }
                    }
                }
            }
            SessionPhase::QuestionReady => {
                let Some(question) = session.question().map(str::to_string) else {
                    continue;
                };

                let path = prompt_line("Ruta del archivo .wav con tu respuesta", "")?;
                if path.is_empty() {
                    println!("Entrevista terminada.");
                    break;
                }

                let audio = match load_recording(&path) {
                    Ok(audio) => audio,
                    Err(e) => {
                        eprintln!("⚠ No se pudo leer la grabación: {:#}", e);
                        continue;
                    }
                };

                println!("\nGemini está escuchando y analizando...");
                let outcome = analyzer.analyze(&audio, &question).await;
                if let Err(e) = session.record_outcome(outcome) {
                    error!("Could not record outcome: {}", e);
                }
            }
            SessionPhase::Analyzed => {
                if let (Some(question), Some(outcome)) = (session.question(), session.outcome()) {
                    match outcome {
                        Ok(result) => println!("\n{}", render_report(question, result)),
                        Err(e) => println!("\n{}", render_error(e)),
                    }
                }

                if ask_yes_no("🔄 ¿Reiniciar entrevista (nueva pregunta)?")? {
                    session.reset();
                } else {
                    println!("Entrevista terminada.");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Validate the recording with hound, then hand the raw file bytes to
/// the analyzer (the remote API receives the container as-is).
fn load_recording(path: &str) -> Result<Vec<u8>> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("'{}' no es un archivo WAV legible", path))?;
    let spec = reader.spec();
    let seconds = reader.duration() as f64 / spec.sample_rate.max(1) as f64;

    info!(
        "Loaded recording: {:.1}s, {} Hz, {} channel(s)",
        seconds, spec.sample_rate, spec.channels
    );

    std::fs::read(path).with_context(|| format!("No se pudo leer '{}'", path))
}

fn prompt_line(label: &str, default: &str) -> Result<String> {
    if default.is_empty() {
        print!("{} (vacío para salir): ", label);
    } else {
        print!("{} [{}]: ", label, default);
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim();

    Ok(if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    })
}

fn prompt_experience() -> Result<ExperienceLevel> {
    println!("Nivel de experiencia:");
    for (i, level) in ExperienceLevel::ALL.iter().enumerate() {
        println!("  {}. {}", i + 1, level);
    }

    loop {
        let choice = prompt_line("Elige una opción", "2")?;
        match choice.trim().parse::<usize>() {
            Ok(n) if (1..=ExperienceLevel::ALL.len()).contains(&n) => {
                return Ok(ExperienceLevel::ALL[n - 1]);
            }
            _ => {
                if let Some(level) = ExperienceLevel::from_label(&choice) {
                    return Ok(level);
                }
                println!("Opción no válida.");
            }
        }
    }
}

fn ask_yes_no(label: &str) -> Result<bool> {
    let answer = prompt_line(&format!("{} (s/n)", label), "s")?;
    Ok(matches!(answer.to_lowercase().as_str(), "s" | "si" | "sí" | "y" | "yes"))
}
