//! "Hierarchy changed" signal
//!
//! A generation counter published on a `watch` channel. Every committed
//! mutation bumps it; whoever caches a derived view compares generations
//! and reloads when they differ.

use crate::error::Result;
use crate::storage::Transaction;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct ChangeSignal {
    sender: Arc<watch::Sender<u64>>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Record one committed mutation
    pub fn bump(&self) {
        self.sender.send_modify(|generation| *generation += 1);
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }

    /// Commit a mutating unit and bump once it is visible
    pub(crate) async fn commit(&self, tx: Box<dyn Transaction>) -> Result<()> {
        tx.commit().await?;
        self.bump();
        Ok(())
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}
