//! Ask command - answers questions about a document directory

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::domain::rag::{
    ProviderSelection, QueryOutcome, QueryRequest, RagAnswer, RagOrchestrator,
};

/// Arguments for the ask command
#[derive(Args, Clone)]
pub struct AskArgs {
    /// Directory of .txt/.md documents to index
    #[arg(long)]
    pub docs: PathBuf,

    /// Conversation session to ask within
    #[arg(long, default_value = "cli")]
    pub session: String,

    /// Completion provider name (overrides config)
    #[arg(long)]
    pub provider: Option<String>,

    /// Provider to try once if the selected one is unavailable
    #[arg(long)]
    pub fallback: Option<String>,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Keep reading questions from stdin
    #[arg(long, short)]
    pub interactive: bool,

    /// Question to ask
    pub question: Option<String>,
}

/// Run the ask command
pub async fn run(args: AskArgs) -> anyhow::Result<()> {
    let config = super::init()?;

    let mut selection = config.completion.selection(args.provider.as_deref());
    if let Some(fallback) = &args.fallback {
        selection = selection.with_fallback(fallback);
    }

    if args.question.is_none() && !args.interactive {
        anyhow::bail!("a question is required unless --interactive is set");
    }

    let rag = super::build_orchestrator(&config, &args.docs, &selection).await?;

    if let Some(question) = &args.question {
        ask(&rag, &args, &selection, question).await?;
    }

    if args.interactive {
        interactive(&rag, &args, &selection).await?;
    }

    Ok(())
}

async fn interactive(
    rag: &RagOrchestrator,
    args: &AskArgs,
    selection: &ProviderSelection,
) -> anyhow::Result<()> {
    println!("Ask a question (/clear resets the conversation, /exit quits).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                rag.sessions().clear(&args.session).await;
                println!("Conversation cleared.");
            }
            question => {
                if let Err(e) = ask(rag, args, selection, question).await {
                    eprintln!("error: {e}");
                }
            }
        }
    }

    Ok(())
}

async fn ask(
    rag: &RagOrchestrator,
    args: &AskArgs,
    selection: &ProviderSelection,
    question: &str,
) -> anyhow::Result<()> {
    let mut request = QueryRequest::new(&args.session, question, selection.clone());
    if args.stream {
        request = request.streaming();
    }

    let answer = match rag.query(request).await? {
        QueryOutcome::Complete(answer) => {
            println!("{}", answer.answer);
            answer
        }
        QueryOutcome::Stream(stream) => {
            let mut stdout = std::io::stdout();
            let answer = stream
                .for_each_fragment(|fragment| {
                    print!("{fragment}");
                    let _ = stdout.flush();
                })
                .await?;
            println!();
            answer
        }
    };

    print_sources(&answer, selection);
    Ok(())
}

fn print_sources(answer: &RagAnswer, selection: &ProviderSelection) {
    if answer.used_fallback(&selection.completion) {
        println!("(answered by {} / {})", answer.served_by, answer.model);
    }

    if answer.retrieval.is_empty() {
        return;
    }

    println!("\nSources:");
    for (i, scored) in answer.retrieval.iter().enumerate() {
        let metadata = &scored.chunk.metadata;
        let section = metadata
            .section
            .as_deref()
            .map(|s| format!(" > {s}"))
            .unwrap_or_default();
        println!(
            "  [{}] {}{} (score {:.3})",
            i + 1,
            metadata.source_name,
            section,
            scored.score
        );
    }
}
