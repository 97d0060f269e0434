//! Preview sentence generation for a deed row.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::templates_model::TemplateCatalog;
use crate::deeds::Deed;

/// Pattern used when the deed's category has no template.
pub const DEFAULT_PREVIEW_PATTERN: &str =
    "{deedType} dated {date} executed by {executedBy} in favour of {inFavourOf} (Doc. No. {documentNumber}, {nature})";

lazy_static! {
    /// A `{name}` token; braces cannot nest.
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{([^{}]+)\}").expect("Invalid regex pattern");
}

/// Renders the preview for `deed` using its category's template.
pub fn render_preview(deed: &Deed, catalog: &TemplateCatalog) -> String {
    let pattern = catalog
        .get(&deed.deed_type)
        .map(|t| t.preview_pattern.as_str())
        .unwrap_or(DEFAULT_PREVIEW_PATTERN);
    render_pattern(pattern, deed)
}

/// Substitutes placeholders in `pattern`.
///
/// Known placeholders match case-sensitively. Any other `{key}` is looked up
/// in the deed's extra fields ignoring case; tokens matching nothing are kept
/// verbatim. Substituted values are not scanned again.
pub fn render_pattern(pattern: &str, deed: &Deed) -> String {
    PLACEHOLDER
        .replace_all(pattern, |caps: &Captures| {
            let name = &caps[1];
            match known_placeholder(name, deed) {
                Some(value) => value,
                None => match deed.custom_fields.get_ignore_case(name) {
                    Some(value) => Cow::Borrowed(value),
                    None => Cow::Owned(caps[0].to_string()),
                },
            }
            .into_owned()
        })
        .into_owned()
}

fn known_placeholder<'a>(name: &str, deed: &'a Deed) -> Option<Cow<'a, str>> {
    let value = match name {
        "deedType" => Cow::Borrowed(deed.deed_type.as_str()),
        "executedBy" => Cow::Borrowed(deed.executed_by.as_str()),
        "inFavourOf" => Cow::Borrowed(deed.in_favour_of.as_str()),
        "date" => Cow::Borrowed(deed.date.as_str()),
        "documentNumber" => Cow::Borrowed(deed.document_number.as_str()),
        "nature" => Cow::Borrowed(deed.nature_of_doc.as_str()),
        "extent" | "surveyNo" => Cow::Borrowed(deed.custom_fields.get(name).unwrap_or("")),
        _ => return None,
    };
    Some(value)
}
