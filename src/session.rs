// src/session.rs

use crate::config::{Config, GenerationSettings};
use crate::conversation::Conversation;
use crate::keys::KeyPool;
use crate::llm::gemini::{GeminiClient, Outcome};
use crate::llm::resolver;
use crate::retry::{transition, Action, Event, State};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Progress reported while a message is being retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An attempt failed; `key` is the 1-based position that was used.
    AttemptFailed { key: usize, outcome: Outcome },
    /// Now using key `position` (1-based) of `total`.
    Rotated { position: usize, total: usize },
    ModelDowngraded { from: String, to: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `key` is the 1-based position of the key that produced the answer.
    Answer { text: String, key: usize },
    Empty,
    Exhausted { attempts: u32 },
}

/// Everything one chat session owns: keys, history and the model in use.
#[derive(Debug)]
pub struct Session {
    client: GeminiClient,
    pool: KeyPool,
    conversation: Conversation,
    model: String,
    fallback_model: String,
    downgraded: bool,
    max_history: usize,
    generation: GenerationSettings,
    retry_multiplier: u32,
    backoff: Duration,
}

impl Session {
    pub fn new(client: GeminiClient, pool: KeyPool, model: String, config: &Config) -> Self {
        Self {
            client,
            pool,
            conversation: Conversation::new(),
            model,
            fallback_model: config.fallback_model.clone(),
            downgraded: false,
            max_history: config.max_history,
            generation: config.generation.clone(),
            retry_multiplier: config.retry_multiplier,
            backoff: config.backoff(),
        }
    }

    /// Picks the model for a new session: the configured one, the resolved one
    /// (queried with the first key), or the fallback.
    pub async fn choose_model(client: &GeminiClient, pool: &KeyPool, config: &Config) -> String {
        if let Some(model) = &config.model {
            return model.clone();
        }
        if !config.resolve_model {
            return config.fallback_model.clone();
        }
        resolver::resolve_or_fallback(
            client,
            pool.first(),
            &config.preferred_models,
            &config.fallback_model,
        )
        .await
    }

    pub fn attempt_budget(&self) -> u32 {
        let pool_size = u32::try_from(self.pool.len()).unwrap_or(u32::MAX);
        pool_size.saturating_mul(self.retry_multiplier.max(1)).max(1)
    }

    pub async fn ask(&mut self, message: &str) -> Reply {
        self.ask_with(message, |_| {}).await
    }

    /// Sends `message`, retrying and rotating keys until an answer arrives or the budget runs out.
    #[instrument(skip(self, message, on_notice), fields(model = %self.model))]
    pub async fn ask_with<F>(&mut self, message: &str, mut on_notice: F) -> Reply
    where
        F: FnMut(Notice),
    {
        let budget = self.attempt_budget();
        let (mut state, mut action) = transition(State::Idle, Event::Start, budget);

        loop {
            match action {
                Action::Send => {}
                Action::Retry { rotate } => {
                    if rotate {
                        self.rotate(&mut on_notice);
                    }
                    tokio::time::sleep(self.backoff).await;
                }
                Action::Deliver(text) => {
                    self.conversation.append_exchange(message, &text);
                    info!(turns = self.conversation.len(), "Exchange completed");
                    return Reply::Answer {
                        text,
                        key: self.pool.index() + 1,
                    };
                }
                Action::ReportEmpty => return Reply::Empty,
                Action::GiveUp { rotate } => {
                    if rotate {
                        self.rotate(&mut on_notice);
                    }
                    warn!(attempts = budget, "No response obtained");
                    return Reply::Exhausted { attempts: budget };
                }
                Action::Ignore => {
                    warn!(?state, "Retry controller received an unexpected event");
                    return Reply::Exhausted { attempts: 0 };
                }
            }

            let key_position = self.pool.index() + 1;
            let history = self.conversation.recent(self.max_history);
            let outcome = self
                .client
                .generate(history, message, self.pool.active(), &self.model, &self.generation)
                .await;
            debug!(key = key_position, ?outcome, "Attempt finished");

            if !matches!(outcome, Outcome::Success(_) | Outcome::EmptyResponse) {
                on_notice(Notice::AttemptFailed {
                    key: key_position,
                    outcome: outcome.clone(),
                });
            }
            if outcome.is_model_not_found() {
                self.downgrade_model(&mut on_notice);
            }

            (state, action) = transition(state, Event::Completed(outcome), budget);
        }
    }

    fn rotate<F: FnMut(Notice)>(&mut self, on_notice: &mut F) {
        let (index, total) = self.pool.rotate();
        info!(position = index + 1, total, "Switched API key");
        on_notice(Notice::Rotated {
            position: index + 1,
            total,
        });
    }

    // One-shot: a 404 swaps to the fallback model the first time only.
    fn downgrade_model<F: FnMut(Notice)>(&mut self, on_notice: &mut F) {
        if self.downgraded || self.model == self.fallback_model {
            return;
        }
        self.downgraded = true;
        let from = std::mem::replace(&mut self.model, self.fallback_model.clone());
        warn!(%from, to = %self.model, "Model not found, downgrading");
        on_notice(Notice::ModelDowngraded {
            from,
            to: self.model.clone(),
        });
    }

    pub fn pool(&self) -> &KeyPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut KeyPool {
        &mut self.pool
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn reset_conversation(&mut self) {
        self.conversation.reset();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: String) {
        self.model = model;
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}
