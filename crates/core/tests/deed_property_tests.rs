//! Property-based integration tests for partition matching, preview
//! rendering, and row decoding.

use std::collections::BTreeMap;

use deedbook_core::deeds::{Deed, DeedField, ExtraFields, Partition};
use deedbook_core::templates::render_pattern;
use proptest::prelude::*;

// =============================================================================
// Generators
// =============================================================================

/// Generates a partition name, sometimes the legacy one.
fn arb_partition_name() -> impl Strategy<Value = String> {
    prop_oneof![Just("default".to_string()), "[a-z][a-z0-9-]{0,12}"]
}

/// Generates text without placeholder braces.
fn arb_plain_text() -> impl Strategy<Value = String> {
    "[^{}]{0,60}"
}

fn blank_deed() -> Deed {
    Deed::blank("d1", "u1", "default", "2024-01-02")
}

// =============================================================================
// Partition matching
// =============================================================================

proptest! {
    #[test]
    fn prop_tagged_rows_match_only_their_partition(
        name in arb_partition_name(),
        tag in arb_partition_name(),
    ) {
        let partition = Partition::new(name.clone());
        prop_assert_eq!(partition.matches(Some(&tag)), tag == name);
    }

    #[test]
    fn prop_untagged_rows_belong_to_legacy_only(name in arb_partition_name()) {
        let partition = Partition::new(name.clone());
        prop_assert_eq!(partition.matches(None), name == "default");
    }
}

// =============================================================================
// Preview rendering
// =============================================================================

proptest! {
    #[test]
    fn prop_text_without_placeholders_is_unchanged(text in arb_plain_text()) {
        prop_assert_eq!(render_pattern(&text, &blank_deed()), text);
    }

    #[test]
    fn prop_unknown_placeholders_stay_verbatim(
        prefix in arb_plain_text(),
        key in "zz[a-z]{1,10}",
    ) {
        let pattern = format!("{}{{{}}}", prefix, key);
        prop_assert_eq!(render_pattern(&pattern, &blank_deed()), pattern);
    }

    #[test]
    fn prop_extra_fields_resolve_ignoring_case(
        key in "zz[a-z]{1,10}",
        value in arb_plain_text(),
    ) {
        let mut deed = blank_deed();
        deed.custom_fields.insert(key.clone(), value.clone());
        let pattern = format!("[{{{}}}]", key.to_uppercase());
        prop_assert_eq!(render_pattern(&pattern, &deed), format!("[{}]", value));
    }

    #[test]
    fn prop_substituted_values_are_not_rescanned(party in "\\{[a-z]{1,8}\\}") {
        let mut deed = blank_deed();
        deed.set_field(DeedField::ExecutedBy, &party).unwrap();
        prop_assert_eq!(render_pattern("by {executedBy}", &deed), format!("by {}", party));
    }
}

// =============================================================================
// Row decoding
// =============================================================================

proptest! {
    #[test]
    fn prop_string_extra_fields_decode_unchanged(
        fields in proptest::collection::btree_map("[a-zA-Z]{1,10}", "[ -~]{0,20}", 0..6),
    ) {
        let decoded: ExtraFields = serde_json::to_value(&fields)
            .and_then(serde_json::from_value)
            .unwrap();
        let decoded: BTreeMap<String, String> = decoded
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        prop_assert_eq!(decoded, fields);
    }

    #[test]
    fn prop_numeric_extra_fields_decode_as_text(key in "[a-z]{1,8}", n in any::<i64>()) {
        let mut row = serde_json::Map::new();
        row.insert(key.clone(), serde_json::Value::from(n));
        let decoded: ExtraFields = serde_json::from_value(serde_json::Value::Object(row)).unwrap();
        let expected = n.to_string();
        prop_assert_eq!(decoded.get(&key), Some(expected.as_str()));
    }
}
