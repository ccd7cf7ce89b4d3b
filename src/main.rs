//! Code-Act Agent CLI
//!
//! Runs one conversation turn for a task and prints the resulting transcript.

use std::path::PathBuf;

use code_act_agent::runner::{CommandRunner, LLMRunner};
use code_act_agent::sandbox::LocalSandbox;
use code_act_agent::{AgentConfig, ChatInput, CodeActAgent, Message, Validate};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} [--media <path>] <task>", program);
    eprintln!("\nAsks the agent to solve a task by running code in a local sandbox.");
    eprintln!("\nEnvironment variables:");
    eprintln!("  CODE_ACT_CONFIG=<file>      Load configuration from a .toml or .yaml file");
    eprintln!("  CODE_ACT_WORKSPACE=<dir>    Workspace for the artifact file (default: .)");
    eprintln!("  CODE_ACT_MODEL_CLI=<prog>   Model CLI reading the prompt on stdin (default: claude --print)");
    eprintln!("  AGENT_DEBUG=1               Dump prompts and model replies at debug level");
    std::process::exit(1);
}

fn parse_args(args: &[String]) -> Option<ChatInput> {
    let mut media: Option<PathBuf> = None;
    let mut words = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--media" {
            media = Some(PathBuf::from(iter.next()?));
        } else {
            words.push(arg.as_str());
        }
    }

    if words.is_empty() {
        return None;
    }
    Some(ChatInput::Task {
        content: words.join(" "),
        media,
    })
}

fn load_config() -> Result<AgentConfig, String> {
    let config = match std::env::var_os("CODE_ACT_CONFIG") {
        Some(path) => AgentConfig::load(PathBuf::from(path))
            .map_err(|e| e.to_string())?
            .with_workspace_override(AgentConfig::workspace_from_env()),
        None => AgentConfig::from_env(),
    };

    let warnings = config
        .validate()
        .into_result()
        .map_err(|e| e.to_string())?;
    for warning in warnings {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

fn print_transcript(chat: &[Message]) {
    for message in chat {
        println!("{}", "=".repeat(60));
        println!("{}", message.role.label());
        println!("{}", "=".repeat(60));
        println!("{}", message.content);
        println!();
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("code-act-agent");
    let Some(input) = parse_args(&args) else {
        usage(program);
    };

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runner: Box<dyn LLMRunner> = match std::env::var("CODE_ACT_MODEL_CLI") {
        Ok(program) if !program.trim().is_empty() => {
            tracing::info!(cli = %program, "using custom model CLI");
            Box::new(CommandRunner::with_program(program, vec![]))
        }
        _ => {
            tracing::info!("using claude CLI");
            Box::new(CommandRunner::new())
        }
    };

    let provider = LocalSandbox::new(config.sandbox.clone());
    let agent = CodeActAgent::new(provider, runner, config);

    match agent.chat(input, None).await {
        Ok(chat) => print_transcript(&chat),
        Err(e) => {
            eprintln!("Agent failed: {}", e);
            std::process::exit(1);
        }
    }
}
