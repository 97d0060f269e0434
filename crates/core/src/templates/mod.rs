//! Templates module - per-category preview patterns and extra-field schemas.

mod preview;
mod templates_model;

pub use preview::{render_pattern, render_preview, DEFAULT_PREVIEW_PATTERN};
pub use templates_model::{DeedTemplate, TemplateCatalog, TemplateField};
