//! Command-line entry point: ask one question and print the answer.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use portal_assistant::llm::GeminiClient;
use portal_assistant::portal::client::HttpPortalClient;
use portal_assistant::{Assistant, AssistantConfig};

#[derive(Debug, Parser)]
#[command(name = "assist", about = "Ask the portal assistant a question")]
struct Args {
    /// The question to answer.
    question: String,

    /// Query this portal path directly instead of classifying the question.
    #[arg(long)]
    path: Option<String>,

    /// Narrow the retrieved records to the one with this id.
    #[arg(long)]
    item_id: Option<i64>,

    /// Print the reply as JSON instead of plain text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let args = Args::parse();
    let cfg = AssistantConfig::from_env();

    let llm = GeminiClient::new(&cfg.gemini_api_key, &cfg.gemini_model, cfg.http_timeout)
        .context("building the model client (is GEMINI_API_KEY set?)")?;
    let portal = HttpPortalClient::new(&cfg).context("building the portal client")?;

    let assistant = Assistant::new(Box::new(llm), Box::new(portal), cfg);
    let reply = assistant
        .ask(&args.question, args.path.as_deref(), args.item_id)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        println!("{}", reply.answer);
        if let Some(source) = &reply.data_source {
            eprintln!("[data source: {source}]");
        }
    }
    Ok(())
}
