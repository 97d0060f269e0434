//! Deed templates: per-category preview patterns and expected extra fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::INITIAL_EXTRA_FIELD_KEYS;
use crate::errors::{Error, Result};

/// An extra field a deed category expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateField {
    pub key: String,
    pub label: String,
}

impl TemplateField {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
        }
    }
}

/// Template for one deed category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeedTemplate {
    pub deed_type: String,
    pub preview_pattern: String,
    #[serde(default)]
    pub fields: Vec<TemplateField>,
}

impl DeedTemplate {
    pub fn declares(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.key == key)
    }
}

/// Templates keyed by deed type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, DeedTemplate>,
}

impl TemplateCatalog {
    pub fn new(templates: impl IntoIterator<Item = DeedTemplate>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|t| (t.deed_type.clone(), t))
                .collect(),
        }
    }

    /// Templates shipped with the application.
    pub fn builtin() -> Self {
        let extent = TemplateField::new("extent", "Extent");
        let survey = TemplateField::new("surveyNo", "Survey No.");
        let village = TemplateField::new("village", "Village");

        Self::new([
            DeedTemplate {
                deed_type: "Sale Deed".to_string(),
                preview_pattern: "{deedType} dated {date} executed by {executedBy} in favour of {inFavourOf} conveying {extent} in Sy. No. {surveyNo}, {village} (Doc. No. {documentNumber}, {nature})".to_string(),
                fields: vec![
                    extent.clone(),
                    survey.clone(),
                    village.clone(),
                    TemplateField::new("considerationAmount", "Consideration"),
                ],
            },
            DeedTemplate {
                deed_type: "Mortgage Deed".to_string(),
                preview_pattern: "{deedType} dated {date} executed by {executedBy} in favour of {inFavourOf} for {loanAmount} over {extent} in Sy. No. {surveyNo} (Doc. No. {documentNumber}, {nature})".to_string(),
                fields: vec![
                    extent.clone(),
                    survey.clone(),
                    village.clone(),
                    TemplateField::new("loanAmount", "Loan Amount"),
                ],
            },
            DeedTemplate {
                deed_type: "Gift Deed".to_string(),
                preview_pattern: "{deedType} dated {date} executed by {executedBy} in favour of {inFavourOf} ({relationship}) gifting {extent} in Sy. No. {surveyNo} (Doc. No. {documentNumber}, {nature})".to_string(),
                fields: vec![
                    extent.clone(),
                    survey.clone(),
                    village.clone(),
                    TemplateField::new("relationship", "Relationship"),
                ],
            },
            DeedTemplate {
                deed_type: "Release Deed".to_string(),
                preview_pattern: "{deedType} dated {date} executed by {executedBy} releasing rights in favour of {inFavourOf} over {extent} in Sy. No. {surveyNo} (Doc. No. {documentNumber}, {nature})".to_string(),
                fields: vec![extent.clone(), survey.clone(), village.clone()],
            },
            DeedTemplate {
                deed_type: "Partition Deed".to_string(),
                preview_pattern: "{deedType} dated {date} between {executedBy} and {inFavourOf} allotting {extent} in Sy. No. {surveyNo} as {scheduleItem} (Doc. No. {documentNumber}, {nature})".to_string(),
                fields: vec![
                    extent.clone(),
                    survey.clone(),
                    village.clone(),
                    TemplateField::new("scheduleItem", "Schedule"),
                ],
            },
            DeedTemplate {
                deed_type: "Settlement Deed".to_string(),
                preview_pattern: "{deedType} dated {date} executed by {executedBy} settling {extent} in Sy. No. {surveyNo} on {inFavourOf} (Doc. No. {documentNumber}, {nature})".to_string(),
                fields: vec![extent.clone(), survey.clone(), village.clone()],
            },
            DeedTemplate {
                deed_type: "Lease Deed".to_string(),
                preview_pattern: "{deedType} dated {date} executed by {executedBy} leasing {extent} to {inFavourOf} for {leasePeriod} (Doc. No. {documentNumber}, {nature})".to_string(),
                fields: vec![
                    extent.clone(),
                    survey.clone(),
                    village,
                    TemplateField::new("leasePeriod", "Lease Period"),
                ],
            },
            DeedTemplate {
                deed_type: "Power of Attorney".to_string(),
                preview_pattern: "{deedType} dated {date} executed by {executedBy} appointing {inFavourOf} as agent in respect of {extent} in Sy. No. {surveyNo} (Doc. No. {documentNumber}, {nature})".to_string(),
                fields: vec![extent, survey],
            },
        ])
    }

    /// Parses a JSON array of templates.
    pub fn from_json(json: &str) -> Result<Self> {
        let templates: Vec<DeedTemplate> = serde_json::from_str(json)
            .map_err(|e| Error::Template(format!("Invalid template file: {}", e)))?;
        if let Some(blank) = templates.iter().find(|t| t.deed_type.trim().is_empty()) {
            return Err(Error::Template(format!(
                "Template with pattern '{}' has no deed type",
                blank.preview_pattern
            )));
        }
        Ok(Self::new(templates))
    }

    /// Adds or replaces templates, keyed by deed type.
    pub fn merge(&mut self, other: TemplateCatalog) {
        self.templates.extend(other.templates);
    }

    pub fn get(&self, deed_type: &str) -> Option<&DeedTemplate> {
        self.templates.get(deed_type)
    }

    pub fn deed_types(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeedTemplate> {
        self.templates.values()
    }

    /// Extra-field keys an input should be rendered for. Categories without
    /// a template fall back to the initial shape.
    pub fn extra_field_keys(&self, deed_type: &str) -> Vec<&str> {
        match self.get(deed_type) {
            Some(template) => template.fields.iter().map(|f| f.key.as_str()).collect(),
            None => INITIAL_EXTRA_FIELD_KEYS.to_vec(),
        }
    }

    /// Whether `key` may be edited on a deed of `deed_type`.
    pub fn allows_extra_field(&self, deed_type: &str, key: &str) -> bool {
        INITIAL_EXTRA_FIELD_KEYS.contains(&key)
            || self.get(deed_type).is_some_and(|t| t.declares(key))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_lookup() {
        let catalog = TemplateCatalog::builtin();
        let sale = catalog.get("Sale Deed").unwrap();
        assert!(sale.declares("considerationAmount"));
        assert!(catalog.get("sale deed").is_none());
        assert!(catalog.deed_types().any(|t| t == "Power of Attorney"));
    }

    #[test]
    fn test_extra_field_keys_fall_back_to_initial_shape() {
        let catalog = TemplateCatalog::builtin();
        assert_eq!(
            catalog.extra_field_keys("Unknown Deed"),
            vec!["extent", "surveyNo", "village"]
        );
        assert!(catalog
            .extra_field_keys("Lease Deed")
            .contains(&"leasePeriod"));
    }

    #[test]
    fn test_allows_extra_field() {
        let catalog = TemplateCatalog::builtin();
        assert!(catalog.allows_extra_field("Mortgage Deed", "loanAmount"));
        assert!(catalog.allows_extra_field("Unknown Deed", "extent"));
        assert!(!catalog.allows_extra_field("Sale Deed", "loanAmount"));
    }

    #[test]
    fn test_from_json_and_merge() {
        let json = r#"[
            { "deedType": "Sale Deed", "previewPattern": "{deedType}: {executedBy}", "fields": [] },
            { "deedType": "Exchange Deed", "previewPattern": "{deedType} of {extent}",
              "fields": [{ "key": "extent", "label": "Extent" }] }
        ]"#;
        let custom = TemplateCatalog::from_json(json).unwrap();
        assert_eq!(custom.len(), 2);

        let mut catalog = TemplateCatalog::builtin();
        let before = catalog.len();
        catalog.merge(custom);
        assert_eq!(catalog.len(), before + 1);
        assert_eq!(
            catalog.get("Sale Deed").unwrap().preview_pattern,
            "{deedType}: {executedBy}"
        );
    }

    #[test]
    fn test_from_json_rejects_blank_deed_type() {
        let json = r#"[{ "deedType": " ", "previewPattern": "x" }]"#;
        assert!(matches!(
            TemplateCatalog::from_json(json),
            Err(Error::Template(_))
        ));
        assert!(TemplateCatalog::from_json("not json").is_err());
    }
}
