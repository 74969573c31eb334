//! Interactive read-eval loop.
//!
//! Single-threaded and turn-by-turn: one prompt, one query, one fully
//! drained response stream, then the next prompt. Control commands are
//! matched case-insensitively before anything is sent to the service.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{error, info};

use tabletalk_core::errors::AgentError;

use crate::connection::Session;
use crate::render::Renderer;

const PROMPT: &str = "You: ";

/// What the operator typed, after command matching.
#[derive(Debug, PartialEq, Eq)]
pub enum LoopCommand {
    Exit,
    Interrupt,
    NewSession,
    Query(String),
    Empty,
}

pub fn parse_command(line: &str) -> LoopCommand {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => LoopCommand::Empty,
        "exit" | "quit" => LoopCommand::Exit,
        "interrupt" => LoopCommand::Interrupt,
        "new" => LoopCommand::NewSession,
        _ => LoopCommand::Query(trimmed.to_string()),
    }
}

pub async fn run_interactive(session: &mut Session) -> Result<(), AgentError> {
    let mut editor = DefaultEditor::new()
        .map_err(|error| tabletalk_core::errors::RenderError::Sink(to_io(error)))?;
    let mut renderer = Renderer::stdout();

    println!("Ask questions about the dataset. Commands: exit, interrupt, new.");
    if let Some(resume) = session.store().resolve_resume_id() {
        println!("Resuming session {resume}.");
    }

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => {
                error!(error = %error, "could not read input");
                break;
            }
        };

        let _ = editor.add_history_entry(line.as_str());

        match parse_command(&line) {
            LoopCommand::Empty => continue,
            LoopCommand::Exit => break,
            LoopCommand::Interrupt => {
                if let Err(error) = session.interrupt().await {
                    println!("{}", error.user_message());
                    error!(error = %error, "interrupt failed");
                } else {
                    println!("Interrupted.");
                }
            }
            LoopCommand::NewSession => {
                match session.reset().await {
                    Ok(()) => println!("Started a new session."),
                    Err(error) => {
                        println!("{}", error.user_message());
                        error!(error = %error, "session reset failed");
                    }
                }
            }
            LoopCommand::Query(query) => {
                if let Err(error) = session.run_turn(&query, &mut renderer).await {
                    println!("{}", error.user_message());
                    error!(error = %error, "turn failed");
                }
            }
        }
    }

    session.disconnect().await;
    info!("interactive loop finished");
    Ok(())
}

fn to_io(error: ReadlineError) -> std::io::Error {
    match error {
        ReadlineError::Io(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_command, LoopCommand};

    #[test]
    fn commands_match_case_insensitively() {
        assert_eq!(parse_command("EXIT"), LoopCommand::Exit);
        assert_eq!(parse_command("  Quit "), LoopCommand::Exit);
        assert_eq!(parse_command("Interrupt"), LoopCommand::Interrupt);
        assert_eq!(parse_command("NEW"), LoopCommand::NewSession);
    }

    #[test]
    fn anything_else_is_a_query() {
        assert_eq!(
            parse_command("what is the total revenue?"),
            LoopCommand::Query("what is the total revenue?".to_string())
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_command("   "), LoopCommand::Empty);
    }

    #[test]
    fn queries_containing_command_words_are_still_queries() {
        assert_eq!(
            parse_command("exit rows from the dataset"),
            LoopCommand::Query("exit rows from the dataset".to_string())
        );
    }
}
