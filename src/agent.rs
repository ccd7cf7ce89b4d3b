//! The conversation loop.
//!
//! [`CodeActAgent`] drives rounds of: show the artifact store to the model,
//! ask for a decision, optionally run the decision's code in the sandbox, and
//! pull the sandbox's artifact changes back. Rounds are strictly sequential;
//! the loop ends when the model hands control back, repeats itself, becomes
//! unreachable, or the iteration cap is hit.

use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactStore;
use crate::config::AgentConfig;
use crate::debug::{debug_prompt, debug_reply};
use crate::error::{Error, Result};
use crate::message::{validate_transcript, ChatInput, Message};
use crate::parser::{parse_decision, Decision};
use crate::prompt::PromptTemplate;
use crate::runner::LLMRunner;
use crate::sandbox::{Boilerplate, Sandbox, SandboxProvider};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The model asked for the user's input.
    UserTurn,
    /// The model repeated its previous decision.
    Stalled,
    /// The iteration cap was reached; the task may be incomplete.
    IterationLimit,
    /// The model could not be reached after retries.
    ModelUnavailable,
}

/// Result of one [`CodeActAgent::run`] call.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    /// The caller-facing transcript.
    pub chat: Vec<Message>,
    /// Rounds started, i.e. model calls attempted.
    pub rounds: u32,
    pub termination: TerminationReason,
}

impl ConversationOutcome {
    /// Returns true if the model itself ended the loop.
    pub fn handed_back(&self) -> bool {
        matches!(
            self.termination,
            TerminationReason::UserTurn | TerminationReason::Stalled
        )
    }
}

/// Per-call loop bookkeeping.
#[derive(Debug, Default)]
struct LoopState {
    iterations: u32,
    last_decision: Option<Decision>,
    termination: Option<TerminationReason>,
}

/// The caller-facing transcript and the one used to build prompts.
///
/// Every message is appended to both; they differ only in how user messages
/// with media were rewritten before the first round.
struct Transcripts {
    original: Vec<Message>,
    internal: Vec<Message>,
}

impl Transcripts {
    fn new(chat: Vec<Message>) -> Self {
        Self {
            internal: chat.clone(),
            original: chat,
        }
    }

    fn push(&mut self, message: Message) {
        self.internal.push(message.clone());
        self.original.push(message);
    }
}

/// Agent that chats with the user and acts by running code in a sandbox.
pub struct CodeActAgent<P: SandboxProvider, R: LLMRunner> {
    provider: P,
    runner: R,
    config: AgentConfig,
    template: PromptTemplate,
    boilerplate: Boilerplate,
}

impl<P: SandboxProvider, R: LLMRunner> CodeActAgent<P, R> {
    /// Creates a new agent.
    pub fn new(provider: P, runner: R, config: AgentConfig) -> Self {
        Self {
            provider,
            runner,
            config,
            template: PromptTemplate::default(),
            boilerplate: Boilerplate::default(),
        }
    }

    /// Replaces the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Replaces the code boilerplate.
    pub fn with_boilerplate(mut self, boilerplate: Boilerplate) -> Self {
        self.boilerplate = boilerplate;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Chats with a bare task or a full transcript and returns the updated
    /// transcript.
    pub async fn chat(
        &self,
        input: impl Into<ChatInput>,
        artifacts: Option<&mut ArtifactStore>,
    ) -> Result<Vec<Message>> {
        self.chat_with_code(input.into().into_messages(), artifacts)
            .await
    }

    /// Runs the loop over `chat` and returns the updated transcript.
    ///
    /// Without `artifacts`, a fresh store is created at the configured
    /// artifact path.
    pub async fn chat_with_code(
        &self,
        chat: Vec<Message>,
        artifacts: Option<&mut ArtifactStore>,
    ) -> Result<Vec<Message>> {
        Ok(self.run(chat, artifacts).await?.chat)
    }

    /// Runs the loop and reports how it ended.
    ///
    /// Fails only on empty input, unusable media, sandbox creation and
    /// artifact storage errors. A sandbox that cannot move the artifact file
    /// counts as a storage error. Code that fails in the sandbox and model
    /// outages are reported in the transcript instead.
    pub async fn run(
        &self,
        chat: Vec<Message>,
        artifacts: Option<&mut ArtifactStore>,
    ) -> Result<ConversationOutcome> {
        validate_transcript(&chat)?;

        let mut default_store;
        let store = match artifacts {
            Some(store) => store,
            None => {
                default_store = ArtifactStore::new(self.config.artifact_path());
                default_store.save()?;
                &mut default_store
            }
        };

        let mut sandbox = self.provider.create()?;
        let result = self.drive(&mut sandbox, chat, store).await;

        if let Err(e) = sandbox.cleanup() {
            tracing::error!(error = %e, path = ?sandbox.path(), "failed to clean up sandbox");
        }

        let outcome = result?;
        tracing::info!(
            rounds = outcome.rounds,
            termination = ?outcome.termination,
            "conversation loop finished"
        );
        Ok(outcome)
    }

    async fn drive(
        &self,
        sandbox: &mut P::Sandbox,
        chat: Vec<Message>,
        store: &mut ArtifactStore,
    ) -> Result<ConversationOutcome> {
        let mut transcripts = Transcripts::new(chat);
        self.attach_media(sandbox, &mut transcripts.internal, store)
            .await?;
        store.save()?;

        let mut state = LoopState::default();
        while state.iterations < self.config.max_iterations {
            state.iterations += 1;
            let round = state.iterations;
            tracing::info!(round, max = self.config.max_iterations, "starting round");

            let remote_artifacts = sandbox
                .upload(store.save_path())
                .await
                .map_err(|e| Error::storage(store.save_path(), format!("upload to sandbox failed: {}", e)))?;
            transcripts.push(Message::observation(store.show()));

            let decision = match self.ask_model(round, &transcripts.internal).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(round, error = %e, "model unavailable, returning to user");
                    transcripts.push(Message::observation(format!("Model call failed: {}", e)));
                    state.termination = Some(TerminationReason::ModelUnavailable);
                    break;
                }
            };
            if self.config.verbosity >= 1 {
                tracing::info!(round, decision = %decision.to_transcript_text(), "model decision");
            }
            transcripts.push(Message::assistant(decision.to_transcript_text()));

            if state.last_decision.as_ref() == Some(&decision) {
                tracing::warn!(round, "model repeated its last decision, returning to user");
                state.termination = Some(TerminationReason::Stalled);
                break;
            }
            if decision.let_user_respond {
                state.termination = Some(TerminationReason::UserTurn);
                break;
            }

            if let Some(code) = &decision.code {
                let observation = self
                    .execute_code(sandbox, code, &remote_artifacts)
                    .await;
                if self.config.verbosity >= 1 {
                    tracing::info!(round, output = %observation, "execution output");
                }
                transcripts.push(Message::observation(observation));

                let local_artifacts = sandbox.download(&remote_artifacts).await.map_err(|e| {
                    Error::storage(&remote_artifacts, format!("download from sandbox failed: {}", e))
                })?;
                store.load(&local_artifacts)?;
                store.save()?;
            } else {
                tracing::debug!(round, "no code in decision, continuing");
            }

            state.last_decision = Some(decision);
        }

        let termination = state
            .termination
            .unwrap_or(TerminationReason::IterationLimit);
        if termination == TerminationReason::IterationLimit {
            tracing::warn!(
                max = self.config.max_iterations,
                "iteration limit reached before the model handed back"
            );
        }
        store.save()?;

        Ok(ConversationOutcome {
            chat: transcripts.original,
            rounds: state.iterations,
            termination,
        })
    }

    /// Uploads media referenced by the transcript and registers each file as
    /// a placeholder artifact. Only the internal transcript is rewritten.
    async fn attach_media(
        &self,
        sandbox: &P::Sandbox,
        internal: &mut [Message],
        store: &mut ArtifactStore,
    ) -> Result<()> {
        for message in internal.iter_mut() {
            let Some(media) = message.media.take() else {
                continue;
            };

            let mut remote_media = Vec::with_capacity(media.len());
            for path in &media {
                let remote = sandbox.upload(path).await.map_err(|e| {
                    Error::InvalidInput(format!("media {} could not be uploaded: {}", path.display(), e))
                })?;
                message
                    .content
                    .push_str(&format!(" Media name {}", remote.display()));
                store.insert_placeholder(remote.to_string_lossy());
                remote_media.push(remote);
            }
            message.media = Some(remote_media);
        }
        Ok(())
    }

    /// Asks the model for the next decision, retrying transient failures.
    async fn ask_model(&self, round: u32, internal: &[Message]) -> Result<Decision> {
        let prompt = self.template.render(internal);
        debug_prompt(round, self.runner.name(), &prompt);
        let messages = [Message::user(prompt)];

        let policy = self.config.retry_policy();
        let mut backoff = policy.backoff();
        let mut attempt = 1;
        loop {
            match self.runner.complete(&messages, false).await {
                Ok(raw) => {
                    debug_reply(round, &raw);
                    return Ok(parse_decision(&raw));
                }
                Err(e) if attempt < policy.attempts() => {
                    let delay = backoff.next_delay();
                    tracing::warn!(round, attempt, error = %e, delay = ?delay, "model call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs `code` with the artifact store in scope and renders the result
    /// as observation text. Failures become text, never errors.
    async fn execute_code(
        &self,
        sandbox: &P::Sandbox,
        code: &str,
        remote_artifacts: &std::path::Path,
    ) -> String {
        let store_path = sandbox.path().join(remote_artifacts);
        let source = self.boilerplate.wrap(code, &store_path);
        match sandbox.execute(&source).await {
            Ok(output) => {
                if !output.success() {
                    tracing::warn!(
                        exit_code = ?output.exit_code,
                        timed_out = output.timed_out,
                        "code execution failed"
                    );
                }
                output.text()
            }
            Err(e) => {
                tracing::warn!(error = %e, "sandbox could not run code");
                format!("Execution could not start: {}", e)
            }
        }
    }
}
