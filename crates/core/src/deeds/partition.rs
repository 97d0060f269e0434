//! Partition (table type) inclusion rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::LEGACY_PARTITION;

/// Logical table a deed belongs to.
///
/// The legacy partition also owns rows that were written before the
/// `table_type` column existed and therefore carry no tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition(String);

impl Partition {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn legacy() -> Self {
        Self(LEGACY_PARTITION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_legacy(&self) -> bool {
        self.0 == LEGACY_PARTITION
    }

    /// Whether a row tagged `tag` belongs in this partition.
    pub fn matches(&self, tag: Option<&str>) -> bool {
        match tag {
            Some(tag) => tag == self.0,
            None => self.is_legacy(),
        }
    }

    /// Realtime channel name for this partition.
    pub fn channel_name(&self) -> String {
        format!("deeds-{}", self.0)
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::legacy()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Partition {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_partition_accepts_untagged_rows() {
        let partition = Partition::legacy();
        assert!(partition.matches(Some(LEGACY_PARTITION)));
        assert!(partition.matches(None));
        assert!(!partition.matches(Some("schedule")));
    }

    #[test]
    fn test_other_partitions_require_exact_tag() {
        let partition = Partition::new("schedule");
        assert!(partition.matches(Some("schedule")));
        assert!(!partition.matches(None));
        assert!(!partition.matches(Some("Schedule")));
        assert!(!partition.matches(Some(LEGACY_PARTITION)));
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(Partition::new("schedule").channel_name(), "deeds-schedule");
    }
}
