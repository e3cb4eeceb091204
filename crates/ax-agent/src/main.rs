//! ax-agent, the sandboxed runner binary.
//!
//! Spawned by the host with socket paths and workspace on the command line,
//! the turn payload on stdin, and assistant output streamed to stdout.
//! Diagnostics go to stderr so the host can keep the streams apart.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;

use ax_agent::{AgentInput, AgentRunner, RunnerConfig};
use ax_ipc::IpcClient;
use ax_llm::{AnthropicProvider, LlmProvider, OpenAiCompatProvider, ProviderSettings};
use ax_proxy::TcpBridge;

#[derive(Parser)]
#[command(name = "ax-agent", about = "AX sandboxed agent runner")]
struct Args {
    /// Host IPC socket path.
    #[arg(long, env = "AX_IPC_SOCKET")]
    ipc_socket: std::path::PathBuf,

    /// Host credential proxy socket path.
    #[arg(long, env = "AX_PROXY_SOCKET")]
    proxy_socket: std::path::PathBuf,

    /// Workspace directory.
    #[arg(long, env = "AX_WORKSPACE")]
    workspace: std::path::PathBuf,

    /// Skills directory.
    #[arg(long, env = "AX_SKILLS_DIR")]
    skills_dir: std::path::PathBuf,

    /// LLM provider selector.
    #[arg(long, env = "AX_LLM_PROVIDER", default_value = "claude")]
    provider: String,

    /// Model identifier.
    #[arg(long, env = "AX_MODEL", default_value = "claude-sonnet-4-20250514")]
    model: String,

    /// Model context window.
    #[arg(long, env = "AX_CONTEXT_WINDOW", default_value_t = 200_000)]
    context_window: usize,

    /// Max tokens per response.
    #[arg(long, env = "AX_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Agent type label.
    #[arg(long, env = "AX_AGENT_TYPE", default_value = "assistant")]
    agent_type: String,

    /// Security profile name (surfaced in the prompt).
    #[arg(long, env = "AX_PROFILE", default_value = "standard")]
    profile: String,

    /// Sandbox backend name (surfaced in the prompt).
    #[arg(long, env = "AX_SANDBOX_KIND", default_value = "subprocess")]
    sandbox_kind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();

    // Model SDK traffic goes TCP → bridge → host proxy. The agent holds no
    // credentials; the proxy injects them host-side.
    let bridge = TcpBridge::bind(&args.proxy_socket)
        .await
        .context("binding model bridge")?;
    let base_url = bridge.base_url().context("resolving bridge address")?;
    let _bridge_task = bridge.spawn();

    let settings = ProviderSettings::new(&args.model)
        .base_url(base_url)
        .max_tokens(args.max_tokens);
    let provider: Box<dyn LlmProvider> = match args.provider.as_str() {
        "openai-compat" => Box::new(OpenAiCompatProvider::new(settings)),
        _ => Box::new(AnthropicProvider::new(settings)),
    };

    let remote = ax_agent::tools::RemoteTools::new(IpcClient::new(&args.ipc_socket));
    let runner = AgentRunner::new(
        provider,
        remote,
        RunnerConfig {
            workspace: args.workspace,
            skills_dir: args.skills_dir,
            agent_type: args.agent_type,
            profile: args.profile,
            sandbox_kind: args.sandbox_kind,
            context_window: args.context_window,
        },
    );

    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("reading stdin payload")?;
    let input = AgentInput::parse(&raw);

    let mut stdout = tokio::io::stdout();
    runner
        .run(input, &mut stdout)
        .await
        .context("agent turn failed")?;
    Ok(())
}
