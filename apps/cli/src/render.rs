//! Plain-text rendering of the register.

use std::fmt::Write;

use deedbook_core::templates::{render_preview, TemplateCatalog};
use deedbook_core::Deed;

const DATE_WIDTH: usize = 10;
const DOC_WIDTH: usize = 10;
const NATURE_WIDTH: usize = 8;

/// Renders the deeds as a numbered register, one block per deed.
///
/// The first line of each block carries the serial number, date, document
/// number, and nature. The description cell follows, indented: category,
/// parties, preview sentence, then any filled-in extra fields.
pub fn render_table(deeds: &[Deed], templates: &TemplateCatalog) -> String {
    if deeds.is_empty() {
        return "No deeds.\n".to_string();
    }

    let seq_width = deeds.len().to_string().len().max(2);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>seq$}  {:<date$}  {:<doc$}  {:<nature$}  Description",
        "#",
        "Date",
        "Doc No",
        "Nature",
        seq = seq_width,
        date = DATE_WIDTH,
        doc = DOC_WIDTH,
        nature = NATURE_WIDTH,
    );

    let indent = " ".repeat(seq_width + DATE_WIDTH + DOC_WIDTH + NATURE_WIDTH + 8);
    for (index, deed) in deeds.iter().enumerate() {
        let description = description_lines(deed, templates);
        let mut lines = description.iter();
        let _ = writeln!(
            out,
            "{:>seq$}  {:<date$}  {:<doc$}  {:<nature$}  {}",
            index + 1,
            or_dash(&deed.date),
            or_dash(&deed.document_number),
            deed.nature_of_doc.as_str(),
            lines.next().map(String::as_str).unwrap_or(""),
            seq = seq_width,
            date = DATE_WIDTH,
            doc = DOC_WIDTH,
            nature = NATURE_WIDTH,
        );
        for line in lines {
            let _ = writeln!(out, "{}{}", indent, line);
        }
        let _ = writeln!(out, "{}id: {}", indent, deed.id);
    }
    out
}

fn description_lines(deed: &Deed, templates: &TemplateCatalog) -> Vec<String> {
    let mut lines = vec![
        or_dash(&deed.deed_type).to_string(),
        format!("Executed by: {}", or_dash(&deed.executed_by)),
        format!("In favour of: {}", or_dash(&deed.in_favour_of)),
        render_preview(deed, templates),
    ];
    let extras: Vec<String> = deed
        .custom_fields
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect();
    if !extras.is_empty() {
        lines.push(extras.join("; "));
    }
    lines
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

/// Lists the catalog, one category per line with its extra fields.
pub fn render_templates(templates: &TemplateCatalog) -> String {
    let mut out = String::new();
    for template in templates.iter() {
        let fields: Vec<String> = template
            .fields
            .iter()
            .map(|f| format!("{} ({})", f.key, f.label))
            .collect();
        let _ = writeln!(out, "{}", template.deed_type);
        if fields.is_empty() {
            let _ = writeln!(out, "  fields: -");
        } else {
            let _ = writeln!(out, "  fields: {}", fields.join(", "));
        }
        let _ = writeln!(out, "  preview: {}", template.preview_pattern);
    }
    out
}
