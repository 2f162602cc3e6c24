//! Terminal front-end: command parsing and rendering.

use std::path::PathBuf;

use crate::chat::render::{source_lines, to_terminal};
use crate::chat::{ControllerEvent, Feedback, Message, TurnInFlight, TurnOutcome};
use crate::prompts::{Audience, CONNECTION_APOLOGY, CONVERSATION_STARTERS, SCENARIOS};

/// One line of user input, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text to submit (may be empty).
    Send(String),
    /// `/deep`
    ToggleDeepDive,
    /// `/attach <path>`
    Attach(PathBuf),
    /// `/detach`
    Detach,
    /// `/summarize`
    Summarize,
    /// `/starters`
    ListStarters,
    /// `/starter <n>`, 1-based
    Starter(usize),
    /// `/scenarios`
    ListScenarios,
    /// `/scenario <n>`, 1-based
    Scenario(usize),
    /// `/up <n>` or `/down <n>`, 1-based message number
    Feedback(usize, Feedback),
    /// `/history`
    History,
    /// `/clear`
    Clear,
    /// `/logout`
    Logout,
    /// `/quit`
    Quit,
    /// `/help`
    Help,
    /// Anything else starting with `/`.
    Unknown(String),
}

/// Decode one input line
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let number = || arg.parse::<usize>().ok().filter(|n| *n >= 1);

    match (name.to_lowercase().as_str(), arg.is_empty()) {
        ("deep", _) => Command::ToggleDeepDive,
        ("attach", false) => Command::Attach(PathBuf::from(arg)),
        ("detach", _) => Command::Detach,
        ("summarize", _) => Command::Summarize,
        ("starters", _) => Command::ListStarters,
        ("starter", false) => number().map_or_else(|| Command::Unknown(line.to_string()), Command::Starter),
        ("scenarios", _) => Command::ListScenarios,
        ("scenario", false) => number().map_or_else(|| Command::Unknown(line.to_string()), Command::Scenario),
        ("up", false) => number().map_or_else(
            || Command::Unknown(line.to_string()),
            |n| Command::Feedback(n, Feedback::Up),
        ),
        ("down", false) => number().map_or_else(
            || Command::Unknown(line.to_string()),
            |n| Command::Feedback(n, Feedback::Down),
        ),
        ("history", _) => Command::History,
        ("clear", _) => Command::Clear,
        ("logout", _) => Command::Logout,
        ("quit" | "exit", _) => Command::Quit,
        ("help", _) => Command::Help,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Help text for the interactive prompt
pub const HELP: &str = "\
Commands:
  <text>            ask the coach
  /deep             toggle deep analysis
  /attach <path>    attach a PDF or Word document
  /detach           remove the attached document
  /summarize        summarize the attached document
  /starters         list conversation starters
  /starter <n>      send conversation starter n
  /scenarios        list guided role-play scenarios
  /scenario <n>     start scenario n
  /up <n>, /down <n> rate message n
  /history          show the conversation
  /clear            clear chat history
  /logout           log out and forget history
  /quit             exit";

/// Numbered conversation starters
pub fn format_starters() -> String {
    CONVERSATION_STARTERS
        .iter()
        .enumerate()
        .map(|(i, s)| format!("  {}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered guided scenarios with their setup
pub fn format_scenarios() -> String {
    SCENARIOS
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let audience = match s.audience {
                Audience::Student => "student",
                Audience::Staff => "staff",
            };
            format!("  {}. {} ({})\n     {}", i + 1, s.title, audience, s.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One message as shown in `/history`, numbered from 1
pub fn format_message(number: usize, message: &Message) -> String {
    let who = if message.is_ai() { "Coach" } else { "You" };
    let rating = match message.feedback {
        Some(Feedback::Up) => " [+]",
        Some(Feedback::Down) => " [-]",
        None => "",
    };

    let mut out = format!("#{} {}{}:\n{}", number, who, rating, to_terminal(message));
    if message.is_ai() && !message.sources.is_empty() {
        out.push_str("\nSources:");
        for line in source_lines(&message.sources) {
            out.push_str("\n  ");
            out.push_str(&line);
        }
    }
    out
}

/// The whole conversation
pub fn format_history(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, m)| format_message(i + 1, m))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Waiting label shown when a turn starts
pub fn format_waiting(in_flight: &TurnInFlight) -> String {
    match in_flight.detail() {
        Some(detail) => format!("{} {}", in_flight.headline(), detail),
        None => in_flight.headline().to_string(),
    }
}

/// Terminal rendering of a controller event; `None` for silent events
pub fn format_event(event: &ControllerEvent) -> Option<String> {
    match event {
        ControllerEvent::TurnStarted {
            shape,
            attachment_label,
            ..
        } => Some(format_waiting(&TurnInFlight {
            shape: *shape,
            attachment_label: attachment_label.clone(),
        })),
        ControllerEvent::ChunkApplied { delta, .. } => Some(delta.clone()),
        ControllerEvent::TurnFailed { .. } => Some(CONNECTION_APOLOGY.to_string()),
        ControllerEvent::TurnFinished { outcome } => match outcome {
            TurnOutcome::Completed | TurnOutcome::Failed => None,
            TurnOutcome::Abandoned => Some("(reply abandoned)".to_string()),
            TurnOutcome::Rejected(reason) => Some(format!("Not sent: {}", reason)),
        },
        ControllerEvent::SubmitRejected { reason } => Some(format!("Not sent: {}", reason)),
        ControllerEvent::FeedbackChanged { feedback, .. } => Some(match feedback {
            Some(Feedback::Up) => "Marked as helpful.".to_string(),
            Some(Feedback::Down) => "Marked as not helpful.".to_string(),
            None => "Rating cleared.".to_string(),
        }),
        ControllerEvent::HistoryCleared => Some("Chat history has been cleared.".to_string()),
        ControllerEvent::DeepDiveChanged { enabled } => Some(format!(
            "Deep analysis {}",
            if *enabled { "on" } else { "off" }
        )),
        ControllerEvent::AttachmentChanged { file_name } => file_name
            .as_ref()
            .map(|name| format!("Attached {}", name)),
        ControllerEvent::LoggedOut { username } => Some(format!("Goodbye, {}.", username)),
    }
}
