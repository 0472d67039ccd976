//! Resolution engine: per-session conversation state machine
//!
//! States:
//! - **Idle**: input is looked up (exact → fuzzy), then tried as arithmetic
//!   (result memoized as a math record), otherwise the engine asks to be taught
//!   and moves to `Learning`.
//! - **Learning(pattern)**: the next input is stored as the answer to
//!   `pattern` and the engine returns to `Idle`. There is no cancel path.
//!
//! Every user input and bot emission is appended to the session transcript.

use std::sync::Arc;

use serde::Serialize;

use knowmesh_core::config::EmptyAnswerPolicy;
use knowmesh_core::matcher;
use knowmesh_core::{ArithmeticEvaluator, KnowledgeKind, KnowledgeStore, Message};
use knowmesh_mesh::MeshReplicator;

use crate::state::AppState;

const SOURCE_MESH: &str = "MESH_NETWORK";
const SOURCE_LOCAL: &str = "LOCAL_CACHE";
const SYNC_NOTICE: &str = "SYNCING TO MESH NETWORK...";
const LEARNED_TEXT: &str = "Bilgi P2P ağına şifrelenip dağıtıldı! Herkesin veritabanına işlendi.";
const DECLINED_TEXT: &str = "Boş bir cevap kaydedilmedi.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Learning { pending_pattern: String },
}

/// What the engine emitted for one input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Reply {
    Matched { id: i64, text: String },
    /// Arithmetic result; `id` of the memoized record when it was stored.
    Computed { id: Option<i64>, text: String },
    AskToTeach { pattern: String, text: String },
    /// `id` is `None` when the store declined the answer.
    Learned { id: Option<i64>, pattern: String, text: String },
    Reprompt { pattern: String, text: String },
    /// Blank input while idle.
    Ignored,
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Matched { text, .. }
            | Self::Computed { text, .. }
            | Self::AskToTeach { text, .. }
            | Self::Learned { text, .. }
            | Self::Reprompt { text, .. } => text,
            Self::Ignored => "",
        }
    }
}

fn ask_to_teach(pattern: &str) -> String {
    format!("Bunu evrensel ağda bulamadım. \"{pattern}\" nedir? Öğretirsen tüm dünyaya yayarım.")
}

fn reprompt(pattern: &str) -> String {
    format!("Boş bir cevap öğretemezsin. \"{pattern}\" nedir?")
}

pub struct ResolutionEngine {
    state: EngineState,
    store: Arc<KnowledgeStore>,
    evaluator: ArithmeticEvaluator,
    link: Option<Arc<MeshReplicator>>,
    empty_answer: EmptyAnswerPolicy,
    transcript: Vec<Message>,
}

impl ResolutionEngine {
    pub fn new(
        store: Arc<KnowledgeStore>,
        evaluator: ArithmeticEvaluator,
        link: Option<Arc<MeshReplicator>>,
        empty_answer: EmptyAnswerPolicy,
    ) -> Self {
        Self {
            state: EngineState::Idle,
            store,
            evaluator,
            link,
            empty_answer,
            transcript: Vec::new(),
        }
    }

    /// Fresh session over the shared collaborators.
    pub fn for_session(app: &AppState) -> Self {
        Self::new(
            Arc::clone(&app.store),
            app.evaluator.clone(),
            app.replicator.clone(),
            app.config.engine.empty_answer,
        )
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn pending_pattern(&self) -> Option<&str> {
        match &self.state {
            EngineState::Learning { pending_pattern } => Some(pending_pattern),
            EngineState::Idle => None,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Handle one user input to completion.
    pub fn handle(&mut self, text: &str) -> Reply {
        self.transcript.push(Message::user(text));

        match std::mem::replace(&mut self.state, EngineState::Idle) {
            EngineState::Learning { pending_pattern } => self.learn(pending_pattern, text),
            EngineState::Idle => self.resolve(text),
        }
    }

    fn resolve(&mut self, text: &str) -> Reply {
        if text.trim().is_empty() {
            return Reply::Ignored;
        }

        let connected = self.link.as_ref().is_some_and(|l| l.is_connected());
        let source = if connected { SOURCE_MESH } else { SOURCE_LOCAL };
        self.transcript
            .push(Message::system(format!("SEARCHING {source} FOR '{text}'...")));

        let table = self.store.get_all();
        if let Some(hit) = matcher::find_match(text, &table) {
            tracing::debug!(id = hit.record.id, tier = ?hit.tier, "Knowledge match");
            return self.emit(Reply::Matched {
                id: hit.record.id,
                text: hit.record.response.clone(),
            });
        }

        if let Some(result) = self.evaluator.try_evaluate(text) {
            let memo = self.store.insert(text, &result, KnowledgeKind::Math);
            tracing::debug!(expression = %text, memoized = memo.is_some(), "Arithmetic fallback");
            return self.emit(Reply::Computed {
                id: memo.map(|r| r.id),
                text: result,
            });
        }

        tracing::debug!(pattern = %text, "No match, entering learning mode");
        self.state = EngineState::Learning {
            pending_pattern: text.to_string(),
        };
        self.emit(Reply::AskToTeach {
            pattern: text.to_string(),
            text: ask_to_teach(text),
        })
    }

    fn learn(&mut self, pattern: String, answer: &str) -> Reply {
        if answer.trim().is_empty() && self.empty_answer == EmptyAnswerPolicy::Reprompt {
            let text = reprompt(&pattern);
            self.state = EngineState::Learning {
                pending_pattern: pattern.clone(),
            };
            return self.emit(Reply::Reprompt { pattern, text });
        }

        let stored = self.store.insert(&pattern, answer, KnowledgeKind::General);
        let text = match &stored {
            Some(_) => {
                self.transcript.push(Message::system(SYNC_NOTICE));
                LEARNED_TEXT.to_string()
            }
            None => DECLINED_TEXT.to_string(),
        };
        self.emit(Reply::Learned {
            id: stored.map(|r| r.id),
            pattern,
            text,
        })
    }

    fn emit(&mut self, reply: Reply) -> Reply {
        self.transcript.push(Message::bot(reply.text()));
        reply
    }
}
