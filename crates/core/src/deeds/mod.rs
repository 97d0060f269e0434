//! Deeds module - domain models, partition rules, and collaborator traits.

mod change_event;
mod deeds_model;
mod deeds_traits;
mod partition;

#[cfg(test)]
mod deeds_model_tests;

pub use change_event::{ChangeEvent, ChangeSubscription};
pub use deeds_model::{CopyOutcome, Deed, DeedField, DeedNature, DeedPatch, ExtraFields};
pub use deeds_traits::{AuthProviderTrait, ChangeFeedTrait, DeedStoreTrait};
pub use partition::Partition;
