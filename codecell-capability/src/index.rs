//! Startup-loaded, read-only mapping from intent name to capability
//! metadata, plus the template text each capability materializes from.
//! Lookups never mutate state and a miss is "unknown", not a failure.

use std::collections::HashMap;

use codecell_types::CapabilityEntry;
use serde::Deserialize;

/// A parameterized program source string with `{name}` placeholders.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub id: String,
    pub source: String,
}

pub struct CapabilityIndex {
    entries: HashMap<String, CapabilityEntry>,
    templates: HashMap<String, Template>,
}

impl CapabilityIndex {
    /// The only constructor — there is no runtime mutation API, enforcing
    /// "process-wide, loaded at startup, never mutated at runtime".
    pub fn load(entries: Vec<CapabilityEntry>, templates: Vec<Template>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    pub fn lookup(&self, intent_name: &str) -> Option<&CapabilityEntry> {
        self.entries.get(intent_name)
    }

    pub fn template_for(&self, entry: &CapabilityEntry) -> Option<&Template> {
        self.templates.get(&entry.template_id)
    }

    /// Convenience: resolve an intent name directly to its template text.
    pub fn template_for_intent(&self, intent_name: &str) -> Option<&Template> {
        self.lookup(intent_name).and_then(|e| self.template_for(e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
