//! Mapping from target kinds to config sections.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::apply::Reflect;

/// Picks the section of a config that targets of one kind receive.
pub type SectionFn<C> = fn(&C) -> &dyn Reflect;

/// Table of target kind → config section, built once at startup.
///
/// A config usually bundles one section per asset kind (texture, model,
/// audio, ...). Targets report their kind; the registry resolves which
/// section is applied to them.
pub struct SectionRegistry<C> {
    sections: HashMap<String, SectionFn<C>>,
}

impl<C> Default for SectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SectionRegistry<C> {
    pub fn new() -> Self {
        Self {
            sections: HashMap::new(),
        }
    }

    /// Register the section for a target kind, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, section: SectionFn<C>) -> &mut Self {
        let kind = kind.into();
        debug!("Registered config section for target kind {kind}");
        self.sections.insert(kind, section);
        self
    }

    /// Builder form of [`SectionRegistry::register`].
    pub fn with(mut self, kind: impl Into<String>, section: SectionFn<C>) -> Self {
        self.register(kind, section);
        self
    }

    /// The section of `config` for targets of `kind`, if the kind is known.
    pub fn section<'a>(&self, kind: &str, config: &'a C) -> Option<&'a dyn Reflect> {
        self.sections.get(kind).map(|section| section(config))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.sections.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.sections.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl<C> fmt::Debug for SectionRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
