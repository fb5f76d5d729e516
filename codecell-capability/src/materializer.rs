//! Deterministic `{name}`-placeholder substitution into template source.
//! This module never executes, imports, or evaluates the text it produces —
//! it is pure string substitution; the resulting source text is handed to
//! the sandbox to run, not run here.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::index::Template;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("missing_parameter: {0}")]
    MissingParameter(String),
}

pub struct Materializer;

impl Materializer {
    /// Substitutes every `{name}` placeholder found in `template.source` with
    /// the JSON-textual form of `params[name]`. A placeholder with no
    /// matching param fails before any sandbox work begins; a param with no
    /// matching placeholder is silently ignored.
    pub fn render(
        template: &Template,
        params: &BTreeMap<String, Value>,
    ) -> Result<String, MaterializeError> {
        let mut out = String::with_capacity(template.source.len());
        let mut rest = template.source.as_str();

        while let Some(start) = rest.find('{') {
            let Some(end) = rest[start..].find('}') else {
                out.push_str(rest);
                rest = "";
                break;
            };
            let end = start + end;
            out.push_str(&rest[..start]);

            let name = &rest[start + 1..end];
            let value = params
                .get(name)
                .ok_or_else(|| MaterializeError::MissingParameter(name.to_string()))?;
            out.push_str(&textual(value));

            rest = &rest[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn textual(value: &Value) -> String {
    match value {
        Value::String(s) => serde_json::to_string(s).unwrap_or_else(|_| s.clone()),
        other => other.to_string(),
    }
}
