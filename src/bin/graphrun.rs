use anyhow::{bail, Context, Result};
use graphrun::api::UploadClient;
use graphrun::config::Config;
use graphrun::state::{DecisionRequest, ResumeOutcome, SessionDriver, SessionUpdate};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const USAGE: &str =
    "usage: graphrun [--database PATH | --database-ref UUID] [--resume-mode continue|new_stream] <question>";

struct Args {
    question: String,
    database_path: Option<PathBuf>,
    database_reference: Option<String>,
    resume_mode: Option<String>,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args> {
    let mut question_words = Vec::new();
    let mut database_path = None;
    let mut database_reference = None;
    let mut resume_mode = None;

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--database" => {
                let path = raw.next().context("--database requires a path")?;
                database_path = Some(PathBuf::from(path));
            }
            "--database-ref" => {
                database_reference = Some(raw.next().context("--database-ref requires a uuid")?);
            }
            "--resume-mode" => {
                resume_mode = Some(raw.next().context("--resume-mode requires a value")?);
            }
            "-h" | "--help" => bail!("{USAGE}"),
            _ => question_words.push(arg),
        }
    }

    if database_path.is_some() && database_reference.is_some() {
        bail!("--database and --database-ref are mutually exclusive");
    }
    let question = question_words.join(" ");
    if question.trim().is_empty() {
        bail!("{USAGE}");
    }

    Ok(Args {
        question,
        database_path,
        database_reference,
        resume_mode,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let mut config = Config::load()?;
    if let Some(mode) = args.resume_mode.as_deref() {
        config.resume_mode = graphrun::config::ResumeMode::parse(mode)
            .with_context(|| format!("unknown resume mode '{mode}'"))?;
    }
    config.validate()?;

    let database_reference = match (&args.database_path, args.database_reference) {
        (Some(path), _) => {
            let uploader = UploadClient::new(&config)?;
            let uuid = uploader
                .upload_file(path)
                .await
                .with_context(|| format!("uploading {}", path.display()))?;
            eprintln!("uploaded {} as {uuid}", path.display());
            Some(uuid)
        }
        (None, reference) => reference,
    };

    let mut driver = SessionDriver::from_config(&config);
    let canceller = driver.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            print_update(update);
        }
    });

    let result = driver
        .run(args.question, database_reference, Some(&update_tx))
        .await;
    drop(update_tx);
    let _ = printer.await;

    let summary = result?;
    let state = serde_json::to_string_pretty(&*summary.state)?;
    println!("{state}");
    if summary.cancelled {
        eprintln!("session cancelled");
    }
    if summary.awaiting_human_feedback {
        eprintln!(
            "session closed while awaiting a decision (thread {})",
            summary.thread_id.as_deref().unwrap_or("<unknown>")
        );
    }
    Ok(())
}

fn print_update(update: SessionUpdate) {
    match update {
        SessionUpdate::Started { generation } => eprintln!("session {generation} started"),
        SessionUpdate::State(state) => {
            if let Some(sender) = state.last_sender() {
                eprintln!("update from {sender}");
            }
        }
        SessionUpdate::DomainError { message } => eprintln!("pipeline error: {message}"),
        SessionUpdate::DecisionRequired(request) => {
            tokio::spawn(prompt_decision(request));
        }
        SessionUpdate::Resumed(outcome) => match outcome {
            ResumeOutcome::Submitted { decision, .. } => eprintln!("decision sent: {decision:?}"),
            ResumeOutcome::AlreadyResolved { .. } => eprintln!("decision already recorded"),
            ResumeOutcome::NoPendingToolCall { thread_id } => {
                eprintln!("thread {thread_id} has nothing to resume")
            }
            ResumeOutcome::NoThread => eprintln!("no thread to resume"),
        },
        SessionUpdate::ResumeFailed(message) => eprintln!("resume failed: {message}"),
        SessionUpdate::Closed => eprintln!("session closed"),
    }
}

async fn prompt_decision(request: DecisionRequest) {
    eprint!("Approve the hypothesis and continue? [y/N] ");
    let _ = std::io::stderr().flush();

    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    let approved = match stdin.read_line(&mut line).await {
        Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => return,
    };
    let _ = request.response_tx.send(approved);
}
