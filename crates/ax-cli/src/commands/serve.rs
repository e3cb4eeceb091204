//! `ax serve`: run the trusted host.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use ax_audit::{AuditSink, JsonlAuditSink, MemoryAuditSink};
use ax_config::SecurityProfile;
use ax_core::AgentId;
use ax_host::{
    ChannelRegistry, HttpState, RequestRouter, RouterDeps, SessionStore, SkillStore,
    http, web::{DisabledBrowser, HttpWebProvider},
};
use ax_llm::{AnthropicProvider, FallbackChain, LlmProvider, OpenAiCompatProvider, ProviderSettings};
use ax_memory::{FileMemoryStore, InMemoryStore, MemoryStore};
use ax_proxy::{OAuthRefresher, SecretStore};
use ax_scheduler::{CronTicker, FileJobStore, JobStore, MemoryJobStore};
use ax_taint::{SessionTaintTracker, TaintBudget};

use crate::client::api_socket;

/// Run the host until SIGINT/SIGTERM.
pub async fn run(state_root: &Path) -> Result<()> {
    let config = ax_config::load_from(&state_root.join("ax.yaml"))?;

    init_tracing(&config);
    for warning in ax_config::validate(&config) {
        eprintln!("{} {warning}", "config warning:".yellow());
    }

    std::fs::create_dir_all(state_root.join("data"))?;
    std::fs::create_dir_all(state_root.join("run"))?;

    // Process-wide singletons, created here and threaded into constructors.
    let budget = Arc::new(TaintBudget::new());
    let tracker = Arc::new(SessionTaintTracker::new());
    let secrets = Arc::new(SecretStore::load(state_root.join(".env"))?);

    let audit: Arc<dyn AuditSink> = match config.providers.audit.as_str() {
        "memory" => Arc::new(MemoryAuditSink::new()),
        _ => Arc::new(JsonlAuditSink::open(state_root.join("data/audit/audit.jsonl"))?),
    };

    let memory: Arc<dyn MemoryStore> = match config.providers.memory.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        _ => Arc::new(FileMemoryStore::new(state_root.join("data/memory"))),
    };

    let jobs: Arc<dyn JobStore> = match config.providers.scheduler.as_str() {
        "memory" => Arc::new(MemoryJobStore::new()),
        _ => Arc::new(FileJobStore::new(state_root.join("data/scheduler/jobs.json"))),
    };

    // Eager OAuth refresh; failures are non-fatal at startup.
    let refresher = Arc::new(OAuthRefresher::new(
        Arc::clone(&secrets),
        "ANTHROPIC_OAUTH",
        "https://console.anthropic.com/v1/oauth/token",
        "ax-host",
    ));
    if let Err(e) = refresher.refresh_if_needed().await {
        warn!(error = %e, "OAuth refresh failed; re-authenticate before the token expires");
    }
    let refresh_task = Arc::clone(&refresher).spawn_refresh_loop();

    // Host-side provider chain: primary first, configured fallbacks after.
    let llm = build_llm_chain(&config, &secrets);

    let channels = Arc::new(ChannelRegistry::new());
    channels
        .start(&config.providers.channels)
        .context("starting channel adapters")?;

    let session_store = Arc::new(SessionStore::open(
        state_root.join("data/sessions/last.json"),
    ));

    let agent_bin = agent_binary_path()?;
    let profile = config.profile;
    let model_name = config.model.model.clone();
    let heartbeat_mins = config.scheduler.heartbeat_interval_mins;
    let active_hours = (
        config.scheduler.active_hours_start,
        config.scheduler.active_hours_end,
    );

    let router = Arc::new(RequestRouter::new(RouterDeps {
        config,
        state_root: state_root.to_path_buf(),
        budget,
        tracker,
        audit: Arc::clone(&audit),
        secrets,
        memory,
        jobs: Arc::clone(&jobs),
        web: Arc::new(HttpWebProvider::new(None)),
        browser: Arc::new(DisabledBrowser),
        skills: Arc::new(SkillStore::new(state_root.join("skills"))),
        llm,
        session_store,
        channels,
        agent_bin,
    }));

    // HTTP API on the Unix socket.
    let http_task = http::serve(
        api_socket(state_root),
        Arc::new(HttpState {
            router: Arc::clone(&router),
            agent_id: AgentId::parse("default").context("default agent id")?,
            model_name,
        }),
    )?;

    // Scheduler: ticker fires jobs into a channel the host drains.
    let ticker = Arc::new(CronTicker::new(jobs, active_hours));
    let (fired_tx, mut fired_rx) = mpsc::channel(16);
    let ticker_task = ticker.spawn(fired_tx);
    let scheduler_router = Arc::clone(&router);
    let consumer_task = tokio::spawn(async move {
        while let Some(fired) = fired_rx.recv().await {
            info!(job = %fired.job.id, "Running scheduled job");
            if let Err(e) = scheduler_router.handle_fired_job(&fired).await {
                warn!(job = %fired.job.id, error = %e, "Scheduled job failed");
            }
        }
    });

    // Heartbeat: a periodic synthetic turn delivered to the last channel,
    // gated by the same active-hours window as cron jobs.
    let heartbeat_task = spawn_heartbeat(Arc::clone(&router), heartbeat_mins, active_hours);

    println!(
        "{} profile={} socket={}",
        "ax host running".green().bold(),
        profile_label(profile),
        api_socket(state_root).display()
    );

    shutdown_signal().await;
    info!("Shutting down");

    ticker_task.abort();
    consumer_task.abort();
    heartbeat_task.abort();
    http_task.abort();
    refresh_task.abort();
    audit.flush().context("flushing audit log")?;
    Ok(())
}

fn init_tracing(config: &ax_config::Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_llm_chain(
    config: &ax_config::Config,
    secrets: &Arc<SecretStore>,
) -> Arc<dyn LlmProvider> {
    let make = |selector: &str| -> Box<dyn LlmProvider> {
        let mut settings = ProviderSettings::new(&config.model.model)
            .max_tokens(config.model.max_tokens);
        match selector {
            "openai-compat" => {
                if let Some(key) = secrets.get("OPENAI_API_KEY") {
                    settings = settings.api_key(key);
                }
                Box::new(OpenAiCompatProvider::new(settings))
            },
            _ => {
                if let Some(key) = secrets.get("ANTHROPIC_API_KEY") {
                    settings = settings.api_key(key);
                }
                Box::new(AnthropicProvider::new(settings))
            },
        }
    };

    let mut providers = vec![make(&config.providers.llm)];
    for name in &config.model.fallback {
        providers.push(make(name));
    }
    Arc::new(FallbackChain::new(providers))
}

fn agent_binary_path() -> Result<std::path::PathBuf> {
    let current = std::env::current_exe().context("resolving current executable")?;
    let dir = current
        .parent()
        .context("executable has no parent directory")?;
    Ok(dir.join("ax-agent"))
}

fn profile_label(profile: SecurityProfile) -> &'static str {
    match profile {
        SecurityProfile::Paranoid => "paranoid",
        SecurityProfile::Standard => "standard",
        SecurityProfile::PowerUser => "power-user",
    }
}

fn spawn_heartbeat(
    router: Arc<RequestRouter>,
    interval_mins: u64,
    active_hours: (u8, u8),
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if interval_mins == 0 {
            return;
        }
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(interval_mins.saturating_mul(60)));
        interval.tick().await; // first tick is immediate; skip it
        loop {
            interval.tick().await;
            // Heartbeats honor the same window as cron jobs; outside it the
            // tick is skipped, not rescheduled.
            if !ax_scheduler::in_active_hours(active_hours, chrono::Local::now()) {
                continue;
            }
            let Ok(agent) = AgentId::parse("default") else { return };
            let fired = ax_scheduler::FiredJob {
                job: ax_scheduler::CronJob::at(
                    ax_core::Timestamp::now(),
                    agent,
                    "Heartbeat: review your queue and memory; reply only if something needs attention.",
                )
                .with_delivery(ax_scheduler::Delivery {
                    mode: ax_scheduler::DeliveryMode::Channel,
                    target: Some(ax_scheduler::DeliveryTarget::last()),
                }),
                minute_key: String::new(),
            };
            if let Err(e) = router.handle_fired_job(&fired).await {
                warn!(error = %e, "Heartbeat turn failed");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(term) => term,
            Err(_) => {
                let _ = ctrl_c.await;
                return;
            },
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
