//! Tests for deed domain models.

#[cfg(test)]
mod tests {
    use crate::deeds::{Deed, DeedField, DeedNature, DeedPatch, ExtraFields};
    use crate::errors::{Error, ValidationError};
    use serde_json::json;

    // ==================== Row Deserialization Tests ====================

    #[test]
    fn test_deed_deserializes_backend_row() {
        let row = json!({
            "id": "d1",
            "user_id": "u1",
            "table_type": "schedule",
            "deed_type": "Sale Deed",
            "executed_by": "Ravi",
            "in_favour_of": "Meena",
            "date": "2024-03-01",
            "document_number": "1234/2024",
            "nature_of_doc": "Xerox",
            "custom_fields": { "extent": "2 acres" },
            "created_at": "2024-03-01T10:00:00.123456+00:00"
        });

        let deed: Deed = serde_json::from_value(row).unwrap();
        assert_eq!(deed.table_type.as_deref(), Some("schedule"));
        assert_eq!(deed.nature_of_doc, DeedNature::Xerox);
        assert_eq!(deed.custom_fields.get("extent"), Some("2 acres"));
        assert!(deed.created_at.is_some());
    }

    #[test]
    fn test_deed_tolerates_nulls_from_legacy_rows() {
        let row = json!({
            "id": "d1",
            "user_id": "u1",
            "table_type": null,
            "deed_type": null,
            "executed_by": null,
            "nature_of_doc": null,
            "custom_fields": null
        });

        let deed: Deed = serde_json::from_value(row).unwrap();
        assert_eq!(deed.table_type, None);
        assert_eq!(deed.deed_type, "");
        assert_eq!(deed.nature_of_doc, DeedNature::Original);
        assert!(deed.custom_fields.is_empty());
    }

    #[test]
    fn test_bad_nature_does_not_fail_the_list() {
        let rows = json!([
            { "id": "d1", "nature_of_doc": "Xerox" },
            { "id": "d2", "nature_of_doc": "" },
            { "id": "d3", "nature_of_doc": "xerox" },
            { "id": "d4", "nature_of_doc": "Certified copy" },
            { "id": "d5", "nature_of_doc": 7 }
        ]);

        let deeds: Vec<Deed> = serde_json::from_value(rows).unwrap();
        let natures: Vec<DeedNature> = deeds.iter().map(|d| d.nature_of_doc).collect();
        assert_eq!(
            natures,
            vec![
                DeedNature::Xerox,
                DeedNature::Original,
                DeedNature::Xerox,
                DeedNature::Original,
                DeedNature::Original,
            ]
        );
    }

    #[test]
    fn test_extra_fields_coerce_non_string_values() {
        let fields: ExtraFields = serde_json::from_value(json!({
            "extent": 2.5,
            "registered": true,
            "remarks": null,
            "surveyNo": "45/2"
        }))
        .unwrap();

        assert_eq!(fields.get("extent"), Some("2.5"));
        assert_eq!(fields.get("registered"), Some("true"));
        assert_eq!(fields.get("remarks"), Some(""));
        assert_eq!(fields.get("surveyNo"), Some("45/2"));
    }

    #[test]
    fn test_extra_fields_case_insensitive_lookup() {
        let fields: ExtraFields = [("surveyNo", "12")].into_iter().collect();
        assert_eq!(fields.get_ignore_case("SURVEYNO"), Some("12"));
        assert_eq!(fields.get("surveyno"), None);
    }

    // ==================== Blank Deed Tests ====================

    #[test]
    fn test_blank_deed_has_initial_shape() {
        let deed = Deed::blank("d1", "u1", "schedule", "2024-05-01");
        assert_eq!(deed.table_type.as_deref(), Some("schedule"));
        assert_eq!(deed.date, "2024-05-01");
        assert!(deed.deed_type.is_empty());
        assert!(deed.executed_by.is_empty());
        assert_eq!(deed.custom_fields, ExtraFields::initial());
        assert!(deed.custom_fields.iter().all(|(_, v)| v.is_empty()));
    }

    #[test]
    fn test_clone_into_partition_keeps_content_and_date() {
        let mut source = Deed::blank("d1", "u1", "default", "2023-01-09");
        source.deed_type = "Gift Deed".to_string();
        source.custom_fields.insert("extent", "1 acre");

        let copy = source.clone_into_partition("d2", "u2", "schedule");
        assert_eq!(copy.id, "d2");
        assert_eq!(copy.user_id, "u2");
        assert_eq!(copy.table_type.as_deref(), Some("schedule"));
        assert_eq!(copy.date, "2023-01-09");
        assert_eq!(copy.deed_type, "Gift Deed");
        assert_eq!(copy.custom_fields.get("extent"), Some("1 acre"));
    }

    // ==================== Field Tests ====================

    #[test]
    fn test_deed_field_parsing() {
        assert_eq!("in-favour-of".parse::<DeedField>().unwrap(), DeedField::InFavourOf);
        assert_eq!("document_number".parse::<DeedField>().unwrap(), DeedField::DocumentNumber);
        assert_eq!("nature".parse::<DeedField>().unwrap(), DeedField::Nature);
        assert!(matches!(
            "color".parse::<DeedField>(),
            Err(Error::Validation(ValidationError::UnknownField(_)))
        ));
    }

    #[test]
    fn test_set_nature_rejects_unknown_value() {
        let mut deed = Deed::blank("d1", "u1", "default", "2024-05-01");
        deed.set_field(DeedField::Nature, "Xerox").unwrap();
        assert_eq!(deed.nature_of_doc, DeedNature::Xerox);

        let err = deed.set_field(DeedField::Nature, "Certified").unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidNature(_))
        ));
        assert_eq!(deed.nature_of_doc, DeedNature::Xerox);
    }

    #[test]
    fn test_patch_json_uses_column_names() {
        let patch = DeedPatch::Field {
            field: DeedField::ExecutedBy,
            value: "Ravi".to_string(),
        };
        assert_eq!(patch.to_json(), json!({ "executed_by": "Ravi" }));

        let extras: ExtraFields = [("extent", "2 acres"), ("village", "Kodur")]
            .into_iter()
            .collect();
        assert_eq!(
            DeedPatch::ExtraFields(extras).to_json(),
            json!({ "custom_fields": { "extent": "2 acres", "village": "Kodur" } })
        );
    }
}
