//! The agent loop: stream model output, dispatch tools, repeat.

use futures::StreamExt;
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use ax_llm::{
    ChatMessage, CompletionChunk, LlmProvider, ToolDef, ToolInvocation, ToolOutcome,
};
use ax_prompt::{IdentityFiles, PromptBuilder, PromptContext, SkillSummary};

use crate::error::AgentResult;
use crate::guard::{CORRECTIVE_INSTRUCTION, scheduling_claim_without_call};
use crate::input::AgentInput;
use crate::tools::{LocalTools, RemoteTools};

/// Safety cap on model round-trips per turn.
const MAX_ITERATIONS: usize = 12;

/// Static facts about this agent run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Workspace root (also holds the identity files the host copied in).
    pub workspace: PathBuf,
    /// Directory of skill markdown files.
    pub skills_dir: PathBuf,
    /// Agent type label.
    pub agent_type: String,
    /// Security profile name.
    pub profile: String,
    /// Sandbox backend name.
    pub sandbox_kind: String,
    /// Model context window.
    pub context_window: usize,
}

/// Drives one agent turn.
pub struct AgentRunner<P: LlmProvider> {
    provider: P,
    builder: PromptBuilder,
    local: LocalTools,
    remote: RemoteTools,
    config: RunnerConfig,
}

impl<P: LlmProvider> AgentRunner<P> {
    /// Create a runner.
    #[must_use]
    pub fn new(provider: P, remote: RemoteTools, config: RunnerConfig) -> Self {
        Self {
            provider,
            builder: PromptBuilder::standard(),
            local: LocalTools::new(&config.workspace),
            remote,
            config,
        }
    }

    /// Assemble the prompt context for this turn.
    fn prompt_context(&self, input: &AgentInput, now: String) -> PromptContext {
        let read = |name: &str| {
            std::fs::read_to_string(self.config.workspace.join(name)).unwrap_or_default()
        };
        let identity = IdentityFiles {
            agents_md: read("AGENTS.md"),
            bootstrap_md: read("BOOTSTRAP.md"),
            soul_md: read("SOUL.md"),
            identity_md: read("IDENTITY.md"),
        };

        let mut skills = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.config.skills_dir) {
            let mut paths: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|e| e == "md"))
                .collect();
            paths.sort();
            for path in paths {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    let name = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default();
                    skills.push(SkillSummary { name, content });
                }
            }
        }

        let taint = input.taint_state.unwrap_or_default();
        let history_tokens = input
            .history
            .iter()
            .map(|t| ax_taint::estimate_tokens(&t.content))
            .sum();

        PromptContext {
            agent_type: self.config.agent_type.clone(),
            workspace: self.config.workspace.clone(),
            skills,
            profile: self.config.profile.clone(),
            sandbox_kind: self.config.sandbox_kind.clone(),
            taint_ratio: taint.ratio,
            taint_threshold: taint.threshold,
            identity,
            context_window: self.config.context_window,
            history_tokens,
            now,
            heartbeat_enabled: true,
            reply_gate_enabled: true,
        }
    }

    /// Run the turn, streaming assistant text to `out` as it arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the model fails after fallback or stdout breaks.
    /// Individual tool failures never abort the turn; they go back to the
    /// model as error outcomes.
    pub async fn run<W>(&self, input: AgentInput, out: &mut W) -> AgentResult<String>
    where
        W: AsyncWrite + Unpin,
    {
        let now = chrono::Utc::now().to_rfc3339();
        let ctx = self.prompt_context(&input, now);
        let built = self.builder.build(&ctx);
        debug!(
            modules = ?built.modules.iter().map(|m| m.name).collect::<Vec<_>>(),
            tokens = built.estimated_tokens,
            build_ms = built.build_ms,
            "Prompt assembled"
        );

        let mut tools: Vec<ToolDef> = LocalTools::definitions();
        tools.extend(RemoteTools::definitions());

        let mut messages: Vec<ChatMessage> = Vec::new();
        for turn in &input.history {
            match turn.role.as_str() {
                "assistant" => messages.push(ChatMessage::assistant(&turn.content)),
                _ => messages.push(ChatMessage::user(&turn.content)),
            }
        }
        messages.push(ChatMessage::user(&input.message));

        let mut called_tools: Vec<String> = Vec::new();
        let mut corrected = false;
        let mut final_text = String::new();

        for iteration in 0..MAX_ITERATIONS {
            let mut stream = self.provider.stream(&messages, &tools, &built.text).await?;

            let mut text = String::new();
            let mut invocations: Vec<ToolInvocation> = Vec::new();

            while let Some(chunk) = stream.next().await {
                match chunk? {
                    CompletionChunk::TextDelta { text: delta } => {
                        out.write_all(delta.as_bytes()).await?;
                        out.flush().await?;
                        text.push_str(&delta);
                    },
                    CompletionChunk::ToolUse { invocation } => {
                        invocations.push(invocation);
                    },
                    CompletionChunk::Done { usage } => {
                        debug!(
                            input_tokens = usage.input_tokens,
                            output_tokens = usage.output_tokens,
                            iteration,
                            "Model round-trip done"
                        );
                    },
                }
            }

            if !invocations.is_empty() {
                messages.push(ChatMessage::invocations(invocations.clone()));
                for invocation in invocations {
                    called_tools.push(invocation.name.clone());
                    let outcome = self.dispatch(&invocation).await;
                    messages.push(ChatMessage::outcome(outcome));
                }
                continue;
            }

            // Terminal text with no tool calls: check the guard once.
            if !corrected && scheduling_claim_without_call(&text, &called_tools) {
                warn!("Scheduling claim without a scheduler call; injecting correction");
                messages.push(ChatMessage::assistant(&text));
                messages.push(ChatMessage::system(CORRECTIVE_INSTRUCTION));
                corrected = true;
                continue;
            }

            final_text = text;
            break;
        }

        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(final_text)
    }

    /// Route one invocation to local or remote execution. Never fails the
    /// turn: errors become error outcomes.
    async fn dispatch(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let result = if LocalTools::handles(&invocation.name) {
            self.local
                .execute(&invocation.name, &invocation.arguments)
                .await
        } else if RemoteTools::handles(&invocation.name) {
            self.remote
                .execute(&invocation.name, &invocation.arguments)
                .await
        } else {
            return ToolOutcome::err(
                invocation.id.clone(),
                format!("unknown tool: {}", invocation.name),
            );
        };

        match result {
            Ok(content) => ToolOutcome::ok(invocation.id.clone(), content),
            Err(e) => ToolOutcome::err(invocation.id.clone(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ax_ipc::IpcClient;
    use ax_llm::{ChunkStream, LlmError, LlmResult, TokenUsage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted provider: pops one chunk list per call.
    struct ScriptedProvider {
        script: Mutex<Vec<Vec<CompletionChunk>>>,
    }

    impl ScriptedProvider {
        fn new(mut turns: Vec<Vec<CompletionChunk>>) -> Self {
            turns.reverse();
            Self {
                script: Mutex::new(turns),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test"
        }

        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDef],
            _system: &str,
        ) -> LlmResult<ChunkStream> {
            let chunks = self
                .script
                .lock()
                .map_err(|_| LlmError::MalformedEvent("poisoned".to_string()))?
                .pop()
                .unwrap_or_else(|| {
                    vec![CompletionChunk::Done {
                        usage: TokenUsage::default(),
                    }]
                });
            Ok(Box::pin(futures::stream::iter(
                chunks.into_iter().map(Ok),
            )))
        }
    }

    fn runner(dir: &TempDir, provider: ScriptedProvider) -> AgentRunner<ScriptedProvider> {
        AgentRunner::new(
            provider,
            RemoteTools::new(IpcClient::new(dir.path().join("absent.sock"))),
            RunnerConfig {
                workspace: dir.path().to_path_buf(),
                skills_dir: dir.path().join("skills"),
                agent_type: "assistant".to_string(),
                profile: "standard".to_string(),
                sandbox_kind: "subprocess".to_string(),
                context_window: 200_000,
            },
        )
    }

    fn text_turn(text: &str) -> Vec<CompletionChunk> {
        vec![
            CompletionChunk::TextDelta {
                text: text.to_string(),
            },
            CompletionChunk::Done {
                usage: TokenUsage::default(),
            },
        ]
    }

    #[tokio::test]
    async fn test_streams_text_to_stdout() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir, ScriptedProvider::new(vec![text_turn("hello user")]));

        let mut out = Vec::new();
        let final_text = runner
            .run(AgentInput::parse("hi"), &mut out)
            .await
            .unwrap();
        assert_eq!(final_text, "hello user");
        assert_eq!(String::from_utf8(out).unwrap(), "hello user\n");
    }

    #[tokio::test]
    async fn test_local_tool_round_trip() {
        let dir = TempDir::new().unwrap();
        let write_call = vec![
            CompletionChunk::ToolUse {
                invocation: ToolInvocation {
                    id: "c1".to_string(),
                    name: "fs_write".to_string(),
                    arguments: serde_json::json!({"path": "x.txt", "content": "data"}),
                },
            },
            CompletionChunk::Done {
                usage: TokenUsage::default(),
            },
        ];
        let runner = runner(
            &dir,
            ScriptedProvider::new(vec![write_call, text_turn("done")]),
        );

        let mut out = Vec::new();
        let final_text = runner
            .run(AgentInput::parse("write x"), &mut out)
            .await
            .unwrap();
        assert_eq!(final_text, "done");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("x.txt")).unwrap(),
            "data"
        );
    }

    #[tokio::test]
    async fn test_hallucination_guard_forces_correction() {
        let dir = TempDir::new().unwrap();
        // First turn claims scheduling without any tool call; the runner
        // must loop once more with the corrective instruction.
        let runner = runner(
            &dir,
            ScriptedProvider::new(vec![
                text_turn("I've scheduled a task for 3pm."),
                text_turn("Correction: nothing was scheduled yet."),
            ]),
        );

        let mut out = Vec::new();
        let final_text = runner
            .run(AgentInput::parse("schedule something"), &mut out)
            .await
            .unwrap();
        assert_eq!(final_text, "Correction: nothing was scheduled yet.");
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_outcome_not_crash() {
        let dir = TempDir::new().unwrap();
        let bad_call = vec![
            CompletionChunk::ToolUse {
                invocation: ToolInvocation {
                    id: "c9".to_string(),
                    name: "teleport".to_string(),
                    arguments: serde_json::json!({}),
                },
            },
            CompletionChunk::Done {
                usage: TokenUsage::default(),
            },
        ];
        let runner = runner(&dir, ScriptedProvider::new(vec![bad_call, text_turn("ok")]));

        let mut out = Vec::new();
        let final_text = runner
            .run(AgentInput::parse("go"), &mut out)
            .await
            .unwrap();
        assert_eq!(final_text, "ok");
    }
}
