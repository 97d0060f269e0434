use std::time::Duration;

/// Identity used when nobody is signed in
pub const ANONYMOUS_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Partition that also owns rows created before tagging existed
pub const LEGACY_PARTITION: &str = "default";

/// Quiet period before a field edit is persisted
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Remote table holding deed rows
pub const DEEDS_TABLE: &str = "deeds";

/// Extra fields every new deed starts with
pub const INITIAL_EXTRA_FIELD_KEYS: [&str; 3] = ["extent", "surveyNo", "village"];
