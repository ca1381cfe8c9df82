//! Operator interaction: confirmation prompts and external editing.

use std::io::{self, BufRead, Write};
use std::process::Command;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::client::{CliError, CliResult};

/// Interactive decisions the mutation workflow delegates to a person.
#[async_trait]
pub(crate) trait Operator: Send + Sync {
    /// Ask a yes/no question; only an explicit yes counts.
    async fn confirm(&self, prompt: &str) -> CliResult<bool>;

    /// Let the operator edit `initial` and return the saved text.
    async fn edit(&self, initial: &str) -> CliResult<String>;
}

/// Operator attached to the controlling terminal.
pub(crate) struct TerminalOperator {
    editor: String,
}

impl TerminalOperator {
    pub(crate) const fn new(editor: String) -> Self {
        Self { editor }
    }
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn confirm(&self, prompt: &str) -> CliResult<bool> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stderr = io::stderr();
            write!(stderr, "{prompt} [y/N]: ").and_then(|()| stderr.flush())?;
            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer)?;
            Ok::<_, io::Error>(is_affirmative(&answer))
        })
        .await
        .map_err(|err| CliError::failure(anyhow!("confirmation prompt failed: {err}")))?
        .map_err(|err| CliError::failure(anyhow!("failed to read confirmation: {err}")))
    }

    async fn edit(&self, initial: &str) -> CliResult<String> {
        let editor = self.editor.clone();
        let initial = initial.to_string();
        tokio::task::spawn_blocking(move || run_editor(&editor, &initial))
            .await
            .map_err(|err| CliError::failure(anyhow!("editor task failed: {err}")))?
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn run_editor(editor: &str, initial: &str) -> CliResult<String> {
    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| CliError::validation("no editor configured; set VISUAL or EDITOR"))?;

    let mut file = tempfile::Builder::new()
        .prefix("flowctl-")
        .suffix(".json")
        .tempfile()
        .map_err(|err| CliError::failure(anyhow!("failed to create temp file: {err}")))?;
    file.write_all(initial.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| CliError::failure(anyhow!("failed to write temp file: {err}")))?;

    let status = Command::new(program)
        .args(parts)
        .arg(file.path())
        .status()
        .map_err(|err| CliError::failure(anyhow!("failed to launch editor '{program}': {err}")))?;
    if !status.success() {
        return Err(CliError::failure(anyhow!(
            "editor '{program}' exited with {status}; nothing was submitted"
        )));
    }

    std::fs::read_to_string(file.path())
        .map_err(|err| CliError::failure(anyhow!("failed to read edited document: {err}")))
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::Operator;
    use crate::client::CliResult;

    /// Operator replaying canned answers and recording every prompt.
    #[derive(Default)]
    pub(crate) struct ScriptedOperator {
        answers: Mutex<VecDeque<bool>>,
        edits: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOperator {
        pub(crate) fn answering(answers: &[bool]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                ..Self::default()
            }
        }

        pub(crate) fn with_edit(self, text: impl Into<String>) -> Self {
            self.edits.lock().expect("edits lock").push_back(text.into());
            self
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }
    }

    #[async_trait]
    impl Operator for ScriptedOperator {
        async fn confirm(&self, prompt: &str) -> CliResult<bool> {
            self.prompts.lock().expect("prompts lock").push(prompt.to_string());
            Ok(self
                .answers
                .lock()
                .expect("answers lock")
                .pop_front()
                .unwrap_or(false))
        }

        async fn edit(&self, initial: &str) -> CliResult<String> {
            Ok(self
                .edits
                .lock()
                .expect("edits lock")
                .pop_front()
                .unwrap_or_else(|| initial.to_string()))
        }
    }
}
