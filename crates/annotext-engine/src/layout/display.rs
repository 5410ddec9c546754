use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-annotation-kind visualization policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// Annotations of this kind leave no trace in the layout.
    #[default]
    Invisible,
    /// Bracket-style start/end tags wrapped in a foldable container.
    ShowTags,
    /// Inline overlay with start/end caps inside the token run.
    ShowHighlights,
}

/// A display-mode change for one annotation kind, handed to `reconcile` as
/// the incremental-reuse hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTransition {
    pub kind: String,
    pub from: DisplayMode,
    pub to: DisplayMode,
}

/// Runtime-mutable registry of display modes, keyed by annotation kind.
/// Unknown kinds are Invisible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayModeRegistry {
    modes: BTreeMap<String, DisplayMode>,
}

impl DisplayModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode_for(&self, kind: &str) -> DisplayMode {
        self.modes.get(kind).copied().unwrap_or_default()
    }

    /// Set a kind's mode; returns the transition if anything changed.
    pub fn set(&mut self, kind: impl Into<String>, mode: DisplayMode) -> Option<ModeTransition> {
        let kind = kind.into();
        let from = self.mode_for(&kind);
        if from == mode {
            return None;
        }
        self.modes.insert(kind.clone(), mode);
        Some(ModeTransition {
            kind,
            from,
            to: mode,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DisplayMode)> {
        self.modes.iter().map(|(k, m)| (k.as_str(), *m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kinds_are_invisible() {
        let registry = DisplayModeRegistry::new();
        assert_eq!(registry.mode_for("person"), DisplayMode::Invisible);
    }

    #[test]
    fn set_reports_transitions_only_on_change() {
        let mut registry = DisplayModeRegistry::new();
        let t = registry.set("person", DisplayMode::ShowTags).unwrap();
        assert_eq!(t.from, DisplayMode::Invisible);
        assert_eq!(t.to, DisplayMode::ShowTags);

        assert!(registry.set("person", DisplayMode::ShowTags).is_none());

        let t = registry.set("person", DisplayMode::ShowHighlights).unwrap();
        assert_eq!(t.from, DisplayMode::ShowTags);
    }
}
