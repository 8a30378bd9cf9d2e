//! Run a one-shot prompt through weft and print the transcript.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable. The
//! prompt is a system message (optional), a user message, and one assistant
//! generation recorded under the `answer` output.
//!
//! # Examples
//!
//! ```sh
//! # Basic request
//! weft --user "Name three rivers in Europe."
//!
//! # Streamed, with a system prompt and model selection
//! weft --system "Answer in one line." --user "What is SSE?" \
//!   --model anthropic/claude-sonnet-4 --stream
//!
//! # Pipe content from stdin, stop at the first blank line
//! cat notes.md | weft --user "Summarize:" --stdin --stop '\n\n'
//!
//! # Offline run against the echo connector, printing outputs as JSON
//! weft --user "hello" --dry-run --outputs
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use futures::StreamExt;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use weft_openrouter::{OpenRouterCompletion, OpenRouterConfig};
use weft_rs::prelude::*;

/// Run a one-shot prompt through weft and print the transcript.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "weft")]
struct Cli {
    // ── Message content ────────────────────────────────────────
    /// System prompt to set the assistant's behavior
    #[arg(long)]
    system: Option<String>,

    /// User message to send
    #[arg(long)]
    user: Option<String>,

    /// Read user content from stdin
    #[arg(long)]
    stdin: bool,

    // ── Model selection ────────────────────────────────────────
    /// Model to use (overrides the config file)
    #[arg(long)]
    model: Option<String>,

    /// JSON config file with connector defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the plain completions endpoint instead of chat
    #[arg(long)]
    completion: bool,

    // ── Generation parameters ──────────────────────────────────
    /// Maximum tokens to generate
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Nucleus sampling threshold (0.0 – 1.0)
    #[arg(long)]
    top_p: Option<f32>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Regex at which the answer is cut
    #[arg(long)]
    stop: Option<String>,

    /// Stream the answer as it is generated
    #[arg(long)]
    stream: bool,

    // ── Output ─────────────────────────────────────────────────
    /// Do not print role headers
    #[arg(long)]
    no_roles: bool,

    /// Disable colors
    #[arg(long)]
    no_color: bool,

    /// Print the recorded outputs as JSON after the transcript
    #[arg(long)]
    outputs: bool,

    /// Answer with the offline echo connector instead of calling the API
    #[arg(long)]
    dry_run: bool,
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_stdin_content() -> Result<String, WeftError> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| WeftError::Config(format!("failed to read stdin: {e}")))?;
    Ok(buf)
}

fn build_user_content(cli: &Cli) -> Result<String, WeftError> {
    let stdin_text = if cli.stdin {
        Some(read_stdin_content()?)
    } else {
        None
    };

    match (&cli.user, stdin_text) {
        (Some(msg), Some(piped)) => Ok(format!("{msg}\n\n{piped}")),
        (Some(msg), None) => Ok(msg.clone()),
        (None, Some(piped)) => Ok(piped),
        (None, None) => Err(WeftError::Config(
            "provide --user, --stdin, or both".to_string(),
        )),
    }
}

fn load_config(cli: &Cli) -> Result<OpenRouterConfig, WeftError> {
    let mut config = match &cli.config {
        Some(path) => OpenRouterConfig::from_json_file(path)?,
        None => OpenRouterConfig::default(),
    };
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(temperature) = cli.temperature {
        config.temperature = Some(temperature);
    }
    if cli.completion {
        config.chat = false;
    }
    Ok(config)
}

fn gen_options(cli: &Cli) -> Result<GenOptions, WeftError> {
    let mut options = GenOptions::new().with_stream(cli.stream);
    if let Some(max_tokens) = cli.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }
    if let Some(top_p) = cli.top_p {
        options = options.with_top_p(top_p);
    }
    if let Some(pattern) = &cli.stop {
        options = options.with_stop_pattern(pattern)?;
    }
    Ok(options)
}

/// System message, user message, then the generated answer. Message text is
/// passed as constants so it is neither normalized nor treated as template
/// syntax.
fn build_prompt(system_text: Option<&str>, user_text: String, options: GenOptions) -> ActionInput {
    let mut parts = Vec::new();
    if let Some(text) = system_text {
        parts.push(ActionInput::from(system().wrap(ActionInput::from(text))));
    }
    parts.push(ActionInput::from(user().wrap(ActionInput::from(user_text))));
    parts.push(ActionInput::from(ai("answer", options)));
    ActionInput::list(parts)
}

async fn run(cli: Cli) -> Result<(), WeftError> {
    let config = load_config(&cli)?;
    let user_text = build_user_content(&cli)?;
    let prompt = build_prompt(cli.system.as_deref(), user_text, gen_options(&cli)?);

    let chat = config.chat;
    let llm = if cli.dry_run {
        Llm::new(ScriptedCompletion::echo(), chat)
    } else {
        Llm::new(OpenRouterCompletion::from_env(config)?, chat)
    };
    let llm = llm
        .with_event_handler(LoggingHandler)
        .with_streaming(cli.stream);

    let execution = llm.run(prompt, Value::Null);
    let outputs = execution.outputs_handle();
    let options = RenderOptions::default()
        .with_roles(!cli.no_roles)
        .with_color(!cli.no_color);

    let mut rendered = render_stream(execution, io::stdout(), options);
    while let Some(item) = rendered.next().await {
        item?;
    }

    if cli.outputs {
        let json = serde_json::to_string_pretty(&outputs.snapshot())
            .map_err(|e| WeftError::Stream(format!("failed to serialize outputs: {e}")))?;
        println!("{json}");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
