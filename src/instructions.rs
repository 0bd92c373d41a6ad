//! System instructions for the Gemini chat agent, with file hot-reload.
//!
//! [`SystemInstructions`] is a cheap-to-clone shared cell.  When an
//! instruction file is configured and readable at startup, an
//! [`InstructionWatcher`] component polls its size and modification time and
//! swaps the text in place; every session picks up the new text on its next
//! turn.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::InstructionsConfig;
use crate::runtime::{Component, ComponentFuture};

const DEFAULT_INSTRUCTIONS: [&str; 8] = [
    "You are a friendly and helpful waste sorting assistant.",
    "You help to decide what type of cart the waste should be sorted to.",
    "Answer according to cart types used in Washington state in the United States of America, unless the user explicitly specifies another location and waste collection company.",
    "Ensure your answers are concise, unless the user requests a more complete approach.",
    "When presented with inquiries seeking information, provide answers that reflect a deep understanding of the field, guaranteeing their correctness.",
    "For prompts involving reasoning, provide a clear explanation of each step in the reasoning process before presenting the final answer.",
    "For any non-English queries, respond that you understand English only.",
    "Return answer as html without backticks.",
];

/// Built-in instructions used when no file is configured or it is empty.
pub fn default_instructions() -> String {
    DEFAULT_INSTRUCTIONS.join(" ")
}

/// Shared, swappable instruction text.
#[derive(Debug, Clone)]
pub struct SystemInstructions {
    text: Arc<RwLock<Arc<str>>>,
}

impl Default for SystemInstructions {
    fn default() -> Self {
        Self::new(default_instructions())
    }
}

impl SystemInstructions {
    pub fn new(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self { text: Arc::new(RwLock::new(Arc::from(text))) }
    }

    /// Current text.
    pub fn get(&self) -> Arc<str> {
        match self.text.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the text; blank input restores the defaults.
    pub fn set(&self, text: impl Into<String>) {
        let mut text: String = text.into();
        if text.trim().is_empty() {
            text = default_instructions();
        }
        let mut guard = match self.text.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::from(text);
    }
}

/// Resolve the instructions from config.
///
/// Returns the shared cell plus the watched path when the configured file
/// was readable.  An unreadable file is logged and the defaults are used
/// without a watcher.
pub fn load(cfg: &InstructionsConfig) -> (SystemInstructions, Option<PathBuf>) {
    let Some(path) = cfg.path() else {
        return (SystemInstructions::default(), None);
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!(path = %path.display(), "system instructions loaded from file");
            let instructions = SystemInstructions::default();
            instructions.set(text);
            (instructions, Some(path))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "system instruction file unreadable, using defaults");
            (SystemInstructions::default(), None)
        }
    }
}

// ── Watcher ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

async fn fingerprint(path: &Path) -> std::io::Result<Fingerprint> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(Fingerprint { len: meta.len(), modified: meta.modified().ok() })
}

/// Polls the instruction file and reloads it on change.
#[derive(Debug)]
pub struct InstructionWatcher {
    path: PathBuf,
    instructions: SystemInstructions,
    interval: Duration,
}

impl InstructionWatcher {
    pub fn new(path: PathBuf, instructions: SystemInstructions, interval: Duration) -> Self {
        Self { path, instructions, interval }
    }

    async fn watch(self, shutdown: CancellationToken) {
        let mut last = match fingerprint(&self.path).await {
            Ok(fp) => Some(fp),
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "cannot access file, continue watching");
                None
            }
        };
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(path = %self.path.display(), "instruction watcher stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let current = match fingerprint(&self.path).await {
                        Ok(fp) => fp,
                        Err(e) => {
                            error!(path = %self.path.display(), error = %e, "cannot access file, continue watching");
                            continue;
                        }
                    };
                    if last == Some(current) {
                        continue;
                    }
                    match tokio::fs::read_to_string(&self.path).await {
                        Ok(text) => {
                            self.instructions.set(text);
                            last = Some(current);
                            info!(path = %self.path.display(), bytes = current.len, "system instructions reloaded");
                        }
                        Err(e) => {
                            error!(path = %self.path.display(), error = %e, "failed to read system instructions");
                        }
                    }
                }
            }
        }
    }
}

impl Component for InstructionWatcher {
    fn id(&self) -> &str {
        "instructions"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            self.watch(shutdown).await;
            Ok(())
        })
    }
}
