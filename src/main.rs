use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use inclusion_coach::{
    chat::{Attachment, ControllerEvent, ControllerHandle, ConversationController, UserAction},
    cli::{self, Command},
    config::{Config, LogFormat},
    error::SessionError,
    gemini::GeminiClient,
    prompts::{CONVERSATION_STARTERS, SCENARIOS},
    session::SessionContext,
    storage::{SqliteStorage, Storage},
};

/// Terminal client for the Inclusion Coach
#[derive(Debug, Parser)]
#[command(name = "inclusion-coach", version, about)]
struct Args {
    /// Log in as this user instead of resuming the saved session
    #[arg(long)]
    username: Option<String>,

    /// Start with deep analysis switched on
    #[arg(long)]
    deep_dive: bool,
}

type Input = Lines<BufReader<Stdin>>;

/// How the chat loop ended
enum Exit {
    Quit,
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Inclusion Coach starting..."
    );

    // Initialize storage
    let storage: Arc<dyn Storage> = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Arc::new(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize Gemini client
    let gemini = match GeminiClient::new(&config.gemini, config.request.clone()) {
        Ok(c) => {
            info!(
                base_url = %config.gemini.base_url,
                chat_model = %config.gemini.chat_model,
                deep_dive_model = %config.gemini.deep_dive_model,
                "Gemini client initialized"
            );
            Arc::new(c)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Gemini client");
            return Err(e.into());
        }
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let mut session = match args.username.as_deref() {
        Some(name) => Some(SessionContext::login(storage.clone(), name).await?),
        None => SessionContext::resume(storage.clone()).await?,
    };

    loop {
        let current = match session.take() {
            Some(s) => s,
            None => match prompt_login(&storage, &mut input).await? {
                Some(s) => s,
                None => break,
            },
        };

        println!("Welcome, {}. Type /help for commands.\n", current.username());
        println!("{}", cli::format_history(current.store().messages()));
        if current.store().shows_starters() {
            println!("\nTry one of these (/starter <n>):\n{}", cli::format_starters());
        }

        let controller =
            ConversationController::new(current, gemini.clone()).with_deep_dive(args.deep_dive);
        let (handle, task) = controller.spawn();
        let printer = tokio::spawn(print_events(handle.subscribe()));

        let exit = chat_loop(&handle, &mut input).await;
        drop(handle);
        let controller = task.await?;
        let ended = controller.is_ended();
        // closes the event channel so the printer drains and stops
        drop(controller);
        let _ = printer.await;

        match exit? {
            Exit::Logout if ended => continue,
            _ => break,
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Ask for a name until one is given; `None` on end of input
async fn prompt_login(
    storage: &Arc<dyn Storage>,
    input: &mut Input,
) -> anyhow::Result<Option<SessionContext>> {
    loop {
        print!("Enter your name to start: ");
        std::io::stdout().flush()?;

        let Some(line) = input.next_line().await? else {
            return Ok(None);
        };
        match SessionContext::login(storage.clone(), &line).await {
            Ok(session) => return Ok(Some(session)),
            Err(SessionError::EmptyUsername) => println!("Please enter your name."),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read commands and forward them to the controller
async fn chat_loop(handle: &ControllerHandle, input: &mut Input) -> anyhow::Result<Exit> {
    while let Some(line) = input.next_line().await? {
        let action = match cli::parse_command(&line) {
            Command::Send(text) => UserAction::Submit(text),
            Command::ToggleDeepDive => UserAction::ToggleDeepDive,
            Command::Attach(path) => match Attachment::from_path(&path).await {
                Ok(attachment) => UserAction::Attach(attachment),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Attachment rejected");
                    println!("Could not attach: {}", e);
                    continue;
                }
            },
            Command::Detach => UserAction::RemoveAttachment,
            Command::Summarize => UserAction::Summarize,
            Command::ListStarters => {
                println!("{}", cli::format_starters());
                continue;
            }
            Command::Starter(n) if n <= CONVERSATION_STARTERS.len() => {
                UserAction::SelectStarter(n - 1)
            }
            Command::Starter(n) => {
                println!("There is no starter {}.", n);
                continue;
            }
            Command::ListScenarios => {
                println!("{}", cli::format_scenarios());
                continue;
            }
            Command::Scenario(n) if n <= SCENARIOS.len() => UserAction::StartScenario(n - 1),
            Command::Scenario(n) => {
                println!("There is no scenario {}.", n);
                continue;
            }
            Command::Feedback(n, value) => {
                let messages = handle.history().await?;
                match messages.get(n - 1).filter(|m| m.is_ai()) {
                    Some(message) => UserAction::Feedback {
                        message_id: message.id.clone(),
                        value,
                    },
                    None => {
                        println!("Message #{} is not a coach reply.", n);
                        continue;
                    }
                }
            }
            Command::History => {
                println!("{}", cli::format_history(&handle.history().await?));
                continue;
            }
            Command::Clear => UserAction::ClearHistory,
            Command::Logout => {
                handle.send(UserAction::Logout).await?;
                return Ok(Exit::Logout);
            }
            Command::Quit => return Ok(Exit::Quit),
            Command::Help => {
                println!("{}", cli::HELP);
                continue;
            }
            Command::Unknown(command) => {
                println!("Unknown command {}. Type /help.", command);
                continue;
            }
        };

        handle.send(action).await?;
    }

    Ok(Exit::Quit)
}

/// Print controller events; streamed deltas are written inline
async fn print_events(mut events: broadcast::Receiver<ControllerEvent>) {
    let mut mid_line = false;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if let ControllerEvent::ChunkApplied { delta, .. } = &event {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
            mid_line = true;
            continue;
        }

        if mid_line {
            println!();
            mid_line = false;
        }
        if let Some(line) = cli::format_event(&event) {
            println!("{}", line);
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
