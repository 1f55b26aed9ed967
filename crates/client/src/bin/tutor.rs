use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tutor_client::{
    TurnController, TurnSnapshot, TurnState,
    api::HttpTutorApi,
    capture::{AudioFileCapture, CaptureSource, ScriptedTranscriptCapture},
    history_store::{HistoryStore, JsonFileHistoryStore},
    orchestration::OrchestrationClient,
    playback::FilePlaybackSink,
};
use tutor_core::conversation::{ConversationHistory, ExamContext};

/// Tutor - talk to the exam tutor from the terminal
#[derive(Parser)]
#[command(name = "tutor", version, about)]
struct Cli {
    /// Base URL of the tutor server
    #[arg(long, env = "TUTOR_SERVER_URL", default_value = "http://localhost:3000")]
    server_url: String,

    /// Where the conversation history is kept
    #[arg(long, env = "TUTOR_HISTORY_FILE", default_value = "tutor_history.json")]
    history_file: PathBuf,

    /// Exam being prepared for (e.g. "GCSE")
    #[arg(long, default_value = "GCSE")]
    exam_type: String,

    #[arg(long, default_value = "Biology")]
    subject: String,

    #[arg(long, default_value = "General revision")]
    topic: String,

    #[arg(long)]
    difficulty: Option<String>,

    /// Directory reply audio is written to
    #[arg(long, default_value = "replies")]
    out_dir: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a recorded question through the full voice pipeline
    Ask {
        /// Recording of the question
        #[arg(short, long)]
        audio: PathBuf,
        /// MIME type of the recording; guessed from the extension if omitted
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Ask a question as text, as live recognition would hear it
    Say {
        text: String,
        /// The question currently being worked on
        #[arg(long)]
        question: Option<String>,
        /// The student's working notes
        #[arg(long)]
        working_space: Option<String>,
    },
    /// Show the stored conversation history
    History {
        /// Forget all stored turns
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,tutor_client=info",
        1 => "info,tutor_client=debug",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let store = Arc::new(JsonFileHistoryStore::new(&cli.history_file));
    let history = store.load().await.with_context(|| {
        format!("Failed to read history from {}", cli.history_file.display())
    })?;

    let mut exam_context = ExamContext::new(cli.exam_type, cli.subject, cli.topic);
    if let Some(difficulty) = cli.difficulty {
        exam_context = exam_context.with_difficulty(difficulty);
    }

    let (capture, question): (Arc<dyn CaptureSource>, _) = match cli.command {
        Command::History { clear } => {
            if clear {
                store.save(&ConversationHistory::new()).await?;
                println!("History cleared.");
            } else {
                print_history(&history);
            }
            return Ok(true);
        }
        Command::Ask { audio, mime_type } => {
            (Arc::new(AudioFileCapture::new(audio, mime_type)), None)
        }
        Command::Say {
            text,
            question,
            working_space,
        } => (
            Arc::new(ScriptedTranscriptCapture::new(text)),
            Some((question, working_space)),
        ),
    };
    let recording = question.is_none();

    let client = OrchestrationClient::new(Arc::new(HttpTutorApi::new(&cli.server_url)), store);
    let controller = TurnController::new(
        client,
        capture,
        Arc::new(FilePlaybackSink::new(&cli.out_dir)),
        history,
        exam_context,
    );
    if let Some((question, working_space)) = question {
        controller.set_question(question, working_space).await;
    }

    let (tx, mut rx) = watch::channel(controller.snapshot());
    controller.subscribe(move |snapshot| {
        tx.send_replace(snapshot.clone());
    });

    info!(server = %cli.server_url, "Starting turn");
    controller.start().await;
    if recording && controller.snapshot().state == TurnState::Capturing {
        // The whole file is the recording, so the user "stops" right away.
        controller.stop().await;
    }

    let finished = tokio::select! {
        done = rx.wait_for(|s| matches!(s.state, TurnState::Idle | TurnState::Error)) => {
            done.map(|s| s.clone()).ok()
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            None
        }
    };
    controller.dispose().await;

    let Some(snapshot) = finished else {
        return Ok(false);
    };
    Ok(report(&snapshot))
}

fn report(snapshot: &TurnSnapshot) -> bool {
    if let Some(message) = &snapshot.error {
        eprintln!("{message}");
        return false;
    }
    if !snapshot.transcript.is_empty() {
        println!("You:   {}", snapshot.transcript);
    }
    println!("Tutor: {}", snapshot.reply_text);
    true
}

fn print_history(history: &ConversationHistory) {
    if history.is_empty() {
        println!("No conversation yet.");
        return;
    }
    for (i, turn) in history.iter().enumerate() {
        println!("{}. You:   {}", i + 1, turn.user);
        println!("   Tutor: {}", turn.assistant);
    }
}
