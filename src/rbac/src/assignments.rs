//! User -> item assignments
//!
//! Usernames are opaque strings; no user table backs them.

use crate::error::{RbacError, Result};
use crate::signal::ChangeSignal;
use crate::storage::{AssignmentFilter, Storage};
use crate::types::Assignment;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AssignmentStore {
    storage: Arc<dyn Storage>,
    changes: ChangeSignal,
}

impl AssignmentStore {
    pub fn new(storage: Arc<dyn Storage>, changes: ChangeSignal) -> Self {
        Self { storage, changes }
    }

    /// Grant `item_name` to `username`
    ///
    /// # Errors
    ///
    /// - `NotFound` if the item does not exist
    /// - `DuplicateKey` if the pair is already assigned
    pub async fn assign(&self, item_name: &str, username: &str) -> Result<Assignment> {
        let mut tx = self.storage.begin().await?;
        if tx.fetch_item(item_name).await?.is_none() {
            return Err(RbacError::item_not_found(item_name));
        }
        if !tx
            .fetch_assignments(&AssignmentFilter::pair(item_name, username))
            .await?
            .is_empty()
        {
            return Err(RbacError::DuplicateKey {
                entity: "Assignment",
                key: format!("{} @ {}", item_name, username),
            });
        }

        let assignment = Assignment::new(item_name, username);
        tx.insert_assignment(&assignment).await?;
        self.changes.commit(tx).await?;

        info!("Assigned '{}' to user '{}'", item_name, username);
        Ok(assignment)
    }

    /// Revoke one assignment; `false` if it did not exist
    pub async fn revoke(&self, item_name: &str, username: &str) -> Result<bool> {
        let mut tx = self.storage.begin().await?;
        let removed = tx
            .delete_assignments(&AssignmentFilter::pair(item_name, username))
            .await?;
        if removed == 0 {
            return Ok(false);
        }
        self.changes.commit(tx).await?;

        info!("Revoked '{}' from user '{}'", item_name, username);
        Ok(true)
    }

    /// Revoke everything assigned to `username`; `false` if nothing was
    pub async fn revoke_all(&self, username: &str) -> Result<bool> {
        let mut tx = self.storage.begin().await?;
        let removed = tx
            .delete_assignments(&AssignmentFilter::User(username.to_string()))
            .await?;
        if removed == 0 {
            return Ok(false);
        }
        self.changes.commit(tx).await?;

        info!("Revoked {} assignments from user '{}'", removed, username);
        Ok(true)
    }

    pub async fn get(&self, item_name: &str, username: &str) -> Result<Assignment> {
        let mut tx = self.storage.begin_read().await?;
        tx.fetch_assignments(&AssignmentFilter::pair(item_name, username))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RbacError::NotFound {
                entity: "Assignment",
                name: format!("{} @ {}", item_name, username),
            })
    }

    /// Every assignment held by `username`
    pub async fn assignments_for_user(&self, username: &str) -> Result<Vec<Assignment>> {
        if username.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.storage.begin_read().await?;
        tx.fetch_assignments(&AssignmentFilter::User(username.to_string()))
            .await
    }

    pub async fn remove_all(&self) -> Result<u64> {
        let mut tx = self.storage.begin().await?;
        let removed = tx.delete_assignments(&AssignmentFilter::All).await?;
        if removed == 0 {
            return Ok(0);
        }
        self.changes.commit(tx).await?;

        info!("Removed all assignments ({})", removed);
        Ok(removed)
    }
}
