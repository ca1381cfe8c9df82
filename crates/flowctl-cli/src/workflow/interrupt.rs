//! Ctrl-C handling shared by every step of a command.

use std::sync::Arc;

use tokio::sync::watch;

use crate::client::{CliError, CliResult};

/// Interrupt flag flipped once by the Ctrl-C listener.
#[derive(Clone)]
pub(crate) struct Interrupt {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Interrupt {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Spawn a task that flips the flag on the first Ctrl-C.
    pub(crate) fn listen_for_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::debug!("interrupt received");
                    interrupt.trigger();
                }
                Err(err) => tracing::warn!(error = %err, "cannot listen for Ctrl-C"),
            }
        });
    }

    pub(crate) fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fail with [`CliError::Interrupted`] if the flag is already set.
    pub(crate) fn check(&self) -> CliResult<()> {
        if self.is_set() {
            Err(CliError::Interrupted {
                outcome_unknown: false,
            })
        } else {
            Ok(())
        }
    }

    /// Resolve once the flag is set.
    pub(crate) async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|set| *set).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
