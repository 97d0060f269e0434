use async_trait::async_trait;
use tokio::sync::watch;

use super::change_event::ChangeSubscription;
use super::deeds_model::{Deed, DeedPatch};
use super::partition::Partition;
use crate::errors::Result;

/// Trait for the remote deed table
#[async_trait]
pub trait DeedStoreTrait: Send + Sync {
    /// Rows owned by `user_id` in `partition`, oldest first. For the legacy
    /// partition untagged rows are included.
    async fn list_deeds(&self, user_id: &str, partition: &Partition) -> Result<Vec<Deed>>;
    async fn insert_deeds(&self, deeds: Vec<Deed>) -> Result<Vec<Deed>>;
    async fn update_deed(&self, deed_id: &str, patch: DeedPatch) -> Result<()>;
    async fn delete_deed(&self, deed_id: &str) -> Result<()>;
}

/// Trait for the authentication session
pub trait AuthProviderTrait: Send + Sync {
    /// Signed-in user id, if any.
    fn current_user_id(&self) -> Option<String>;

    /// Receiver that changes whenever the signed-in user changes.
    fn watch_user_id(&self) -> watch::Receiver<Option<String>>;
}

/// Trait for the realtime change feed
#[async_trait]
pub trait ChangeFeedTrait: Send + Sync {
    /// Opens `channel`, delivering every change to rows owned by `user_id`.
    /// The feed does not filter by partition.
    async fn subscribe(&self, channel: &str, user_id: &str) -> Result<ChangeSubscription>;
}
