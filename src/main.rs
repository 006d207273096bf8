use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use arcticchat::budget::{BudgetGuard, GuardError, TokenizerCell, TokenizerSource};
use arcticchat::classify::{Classification, Classifier, HuggingFaceClassifier};
use arcticchat::completion::{CompletionClient, ReplicateClient};
use arcticchat::config::AppConfig;
use arcticchat::conversation::{ConversationHistory, ConversationTurn, TurnFormatter};
use arcticchat::error::ChatError;
use arcticchat::extract::{DocumentExtractor, Extractor, OcrExtractor, PdfExtractor, Upload};
use arcticchat::logging;
use arcticchat::session::{ChatSession, TurnEvent};

#[derive(Parser, Debug)]
#[command(name = "arcticchat", author, version, about = "Ask about food labels; uploads are read with PDF extraction or OCR")]
struct Cli {
    /// Config file (defaults to ./arcticchat.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Tokenizer: hub identifier, path to tokenizer.json, or `estimate`
    #[arg(long, global = true, value_name = "ID|PATH|estimate")]
    tokenizer: Option<String>,

    /// Override the prompt token ceiling
    #[arg(long, global = true, value_name = "TOKENS")]
    ceiling: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat
    Chat,
    /// Format a one-message conversation and check it against the budget
    Prompt {
        /// The user message
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Print the text extracted from a PDF or label photo
    Extract {
        file: PathBuf,
        /// Also label the text with the classifier
        #[arg(long)]
        classify: bool,
    },
    /// Print the effective configuration, secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init(&config.log_level);

    match cli.command {
        Command::Chat => run_chat(config).await,
        Command::Prompt { message } => run_prompt(config, message.join(" ")).await,
        Command::Extract { file, classify } => run_extract(config, file, classify).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(tokenizer) = &cli.tokenizer {
        config.tokenizer = TokenizerSource::parse_arg(tokenizer);
    }
    if let Some(ceiling) = cli.ceiling {
        config.budget.ceiling = ceiling;
    }
    config.validate()?;
    Ok(config)
}

/// Load the tokenizer off the async runtime; it may download a vocabulary.
async fn build_guard(config: &AppConfig) -> Result<BudgetGuard> {
    let tokenizers = Arc::new(TokenizerCell::new(config.tokenizer.clone()));
    let cell = Arc::clone(&tokenizers);
    let counter = tokio::task::spawn_blocking(move || cell.get())
        .await?
        .with_context(|| format!("loading tokenizer {}", tokenizers.source()))?;
    Ok(BudgetGuard::new(config.budget.clone(), counter))
}

fn build_extractor(config: &AppConfig) -> DocumentExtractor {
    DocumentExtractor::new(
        PdfExtractor::new(),
        OcrExtractor::new(&config.ocr.binary, &config.ocr.language),
    )
}

fn build_classifier(config: &AppConfig) -> HuggingFaceClassifier {
    HuggingFaceClassifier::new(&config.classifier.model)
        .with_base_url(&config.classifier.base_url)
        .with_api_token(config.classifier.api_token.clone())
}

async fn run_prompt(config: AppConfig, message: String) -> Result<ExitCode> {
    let guard = build_guard(&config).await?;

    let mut history = ConversationHistory::new(config.greeting.clone());
    history.push(ConversationTurn::user(message));
    let prompt = TurnFormatter::format(&history);
    print!("{prompt}");

    match guard.check(&prompt) {
        Ok(pass) => {
            println!(
                "tokens: {} / {} ({:?}, {} left)",
                pass.measured,
                pass.ceiling,
                pass.status,
                pass.remaining()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(GuardError::Exceeded(exceeded)) => {
            println!("tokens: {} / {} (Exceeded)", exceeded.measured, exceeded.ceiling);
            eprintln!("{}", exceeded.to_string().yellow());
            Ok(ExitCode::from(2))
        }
        Err(GuardError::Tokenizer(err)) => Err(err.into()),
    }
}

async fn run_extract(config: AppConfig, file: PathBuf, classify: bool) -> Result<ExitCode> {
    let upload = Upload::from_path(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let text = build_extractor(&config).extract(&upload).await?;
    println!("{text}");

    if classify || config.classifier.enabled {
        let labels = build_classifier(&config).classify(&text).await?;
        print_labels(&labels);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_labels(labels: &[Classification]) {
    for label in labels {
        println!("{:>6.1}%  {}", label.score * 100.0, label.label.dimmed());
    }
}

async fn run_chat(config: AppConfig) -> Result<ExitCode> {
    let token = config.require_api_token()?;
    if let Some(notice) = config.credential_warning() {
        eprintln!("{}", notice.yellow());
    }

    let client = ReplicateClient::new(token)
        .with_base_url(&config.replicate.base_url)
        .with_model(&config.replicate.model);
    let guard = build_guard(&config).await?;
    let extractor = build_extractor(&config);
    let classifier = config.classifier.enabled.then(|| build_classifier(&config));
    let mut session = ChatSession::new(config.session_config());

    println!("{}", "Type a message, /upload <file>, /retry, /clear, or /quit.".dimmed());
    print_assistant(session.history().last().content());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".bold());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();

        match input.split_once(' ').map_or((input, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/retry", _) | ("", _) => {
                // Re-send the unanswered user turn, if any
                if !session.needs_response() {
                    if !input.is_empty() {
                        eprintln!("{}", "Nothing to retry.".yellow());
                    }
                    continue;
                }
            }
            ("/clear", _) => {
                session.reset();
                print_assistant(session.history().last().content());
                continue;
            }
            ("/upload", "") => {
                eprintln!("{}", "Usage: /upload <file>".yellow());
                continue;
            }
            ("/upload", path) => {
                let upload = match Upload::from_path(std::path::Path::new(path)).await {
                    Ok(upload) => upload,
                    Err(err) => {
                        report(&ChatError::from(err));
                        continue;
                    }
                };
                match session.submit_upload(&extractor, &upload).await {
                    Ok(text) => {
                        println!("{}", text.dimmed());
                        if let Some(classifier) = &classifier {
                            match classifier.classify(&text).await {
                                Ok(labels) => print_labels(&labels),
                                Err(err) => report(&ChatError::from(err)),
                            }
                        }
                    }
                    Err(err) => {
                        report(&err);
                        continue;
                    }
                }
            }
            _ => {
                if let Err(err) = session.submit_user(line.clone()) {
                    if !matches!(err, ChatError::EmptyInput) {
                        report(&err);
                    }
                    continue;
                }
            }
        }

        run_turn(&mut session, &guard, &client).await;
    }

    Ok(ExitCode::SUCCESS)
}

/// One reply, rendered as it streams. Ctrl-C abandons it.
async fn run_turn(session: &mut ChatSession, guard: &BudgetGuard, client: &dyn CompletionClient) {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(render_events(rx));
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = session.respond(guard, client, &cancel, Some(&tx)).await;

    interrupt.abort();
    drop(tx);
    let _ = printer.await;

    if let Err(err) = result {
        report(&err);
    }
}

async fn render_events(mut events: mpsc::UnboundedReceiver<TurnEvent>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut streaming = false;
    while let Some(event) = events.recv().await {
        match event {
            TurnEvent::Admitted(pass) if pass.status.should_warn() => {
                spinner.suspend(|| {
                    eprintln!(
                        "{}",
                        format!(
                            "Conversation is at {:.0}% of the {}-token limit.",
                            pass.usage_fraction() * 100.0,
                            pass.ceiling
                        )
                        .yellow()
                    )
                });
            }
            TurnEvent::Admitted(_) | TurnEvent::BudgetExceeded(_) => {}
            TurnEvent::Fragment(fragment) => {
                if !streaming {
                    spinner.finish_and_clear();
                    print!("{} ", "assistant".cyan().bold());
                    streaming = true;
                }
                print!("{fragment}");
                let _ = std::io::stdout().flush();
            }
            TurnEvent::Completed(_) => println!(),
            TurnEvent::Discarded { partial_chars, .. } => {
                if streaming {
                    println!();
                }
                if partial_chars > 0 {
                    eprintln!("{}", "(partial reply discarded)".dimmed());
                }
            }
        }
    }
    spinner.finish_and_clear();
}

fn print_assistant(text: &str) {
    println!("{} {}", "assistant".cyan().bold(), text);
}

fn report(err: &ChatError) {
    eprintln!("{}", err.to_string().red());
    if err.offers_reset() {
        eprintln!("{}", "Type /clear to clear the chat and start over.".dimmed());
    }
}
