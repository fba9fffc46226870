use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use tera::{Context, Tera};

use crate::error::{PlanError, tera_message};
use crate::model::FileSnapshot;
use crate::path::PathDescriptor;

/// Marker rendered for `{{ i }}`; replaced by the conflict index or removed.
pub const INDEX_PLACEHOLDER: &str = "--FILEINDEXHERE--";

const TEMPLATE_NAME: &str = "output";

/// A compiled output template.
#[derive(Debug)]
pub struct OutputTemplate {
    source: String,
    tera: Tera,
}

impl OutputTemplate {
    /// Compile `source`; syntax errors surface here, before any input is resolved.
    pub fn parse(source: &str) -> Result<Self, PlanError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, source)
            .map_err(|err| PlanError::Template(tera_message(&err)))?;
        Ok(Self {
            source: source.to_string(),
            tera,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, context: &Context) -> Result<String, tera::Error> {
        self.tera.render(TEMPLATE_NAME, context)
    }
}

/// Variables exposed to the output template for one input.
pub fn build_context(input: &PathDescriptor, snapshot: &FileSnapshot, now: DateTime<Local>) -> Context {
    let grandparent = input.dir().parent().unwrap_or(input.dir());
    let mut dates = BTreeMap::new();
    dates.insert("now", now.to_rfc3339());
    dates.insert("modified", snapshot.modified.to_rfc3339());

    let mut context = Context::new();
    context.insert("i", INDEX_PLACEHOLDER);
    context.insert("f", input.base_name());
    context.insert("abs", &input.abs().to_string_lossy());
    context.insert("rel", &input.rel().to_string_lossy());
    context.insert("ext", input.extension());
    context.insert("p", &grandparent.to_string_lossy());
    context.insert("isDirectory", &snapshot.is_dir);
    context.insert("date", &dates);
    context.insert("size", &snapshot.size);
    context
}
