use std::ops::Range;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for an annotation that survives view refreshes
///
/// Annotation *views* may be recreated at any time; every cross-pass
/// comparison and every map key in the layout, selection and viewport code
/// uses this ID, never object identity.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct AnnotationId(Uuid);

impl AnnotationId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A typed, attributed range over tokens
///
/// The token range is end-exclusive. Annotations may nest, overlap without
/// nesting ("interleave"), and share start positions; ordering between them
/// is always the index's canonical order (start index, then creation
/// sequence), never insertion luck.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub kind: String,
    pub token_range: Range<usize>,
    attributes: Vec<(String, String)>,
    pub(crate) seq: u64,
}

impl Annotation {
    pub fn new(kind: impl Into<String>, token_range: Range<usize>) -> Self {
        Self {
            id: AnnotationId::fresh(),
            kind: kind.into(),
            token_range,
            attributes: Vec::new(),
            seq: 0,
        }
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Attribute lookup by name; insertion order is irrelevant for equality
    /// but preserved for tag rendering.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value.into(),
            None => self.attributes.push((name, value.into())),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Index over all annotations of a document
///
/// Iteration is always in canonical order: by start token index, then by
/// creation sequence for equal starts. This is what makes interleaved or
/// co-starting annotations open and close in a deterministic, repeatable
/// order during layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationIndex {
    items: Vec<Annotation>,
    next_seq: u64,
}

impl AnnotationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert an annotation, assigning its creation sequence number.
    pub fn add(&mut self, mut annotation: Annotation) -> AnnotationId {
        annotation.seq = self.next_seq;
        self.next_seq += 1;
        let id = annotation.id;
        let at = self
            .items
            .partition_point(|a| Self::canonical_key(a) <= Self::canonical_key(&annotation));
        self.items.insert(at, annotation);
        id
    }

    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let at = self.items.iter().position(|a| a.id == id)?;
        Some(self.items.remove(at))
    }

    /// Resolve a stable ID to the current annotation view, if it still exists.
    pub fn resolve(&self, id: AnnotationId) -> Option<&Annotation> {
        self.items.iter().find(|a| a.id == id)
    }

    pub(crate) fn resolve_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.items.iter_mut().find(|a| a.id == id)
    }

    /// Re-sort a single annotation after its range changed.
    pub(crate) fn reposition(&mut self, id: AnnotationId) {
        if let Some(at) = self.items.iter().position(|a| a.id == id) {
            let annotation = self.items.remove(at);
            let at = self
                .items
                .partition_point(|a| Self::canonical_key(a) <= Self::canonical_key(&annotation));
            self.items.insert(at, annotation);
        }
    }

    /// All annotations in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.items.iter()
    }

    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Annotation> + 'a {
        self.items.iter().filter(move |a| a.kind == kind)
    }

    pub fn starting_at(&self, token: usize) -> impl Iterator<Item = &Annotation> {
        self.items
            .iter()
            .filter(move |a| a.token_range.start == token && !a.token_range.is_empty())
    }

    pub fn ending_at(&self, token: usize) -> impl Iterator<Item = &Annotation> {
        self.items
            .iter()
            .filter(move |a| a.token_range.end == token && !a.token_range.is_empty())
    }

    pub fn overlapping(&self, range: Range<usize>) -> impl Iterator<Item = &Annotation> {
        self.items.iter().filter(move |a| {
            a.token_range.start < range.end && a.token_range.end > range.start
        })
    }

    fn canonical_key(a: &Annotation) -> (usize, u64) {
        (a.token_range.start, a.seq)
    }
}

/// Calculate the overlap between two token ranges.
pub(crate) fn range_overlap(a: &Range<usize>, b: &Range<usize>) -> usize {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    end.saturating_sub(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_value_identities() {
        let a = Annotation::new("person", 0..2);
        let id = a.id;
        let mut index = AnnotationIndex::new();
        index.add(a);

        // A recreated view of the same annotation compares by ID.
        let resolved = index.resolve(id).unwrap();
        assert_eq!(resolved.id, id);
        assert!(index.resolve(AnnotationId::fresh()).is_none());
    }

    #[test]
    fn canonical_order_sorts_by_start_then_creation() {
        let mut index = AnnotationIndex::new();
        let late_start = index.add(Annotation::new("b", 5..7));
        let first_added = index.add(Annotation::new("a", 2..9));
        let second_added = index.add(Annotation::new("a", 2..4));

        let order: Vec<AnnotationId> = index.iter().map(|a| a.id).collect();
        assert_eq!(order, vec![first_added, second_added, late_start]);
    }

    #[test]
    fn overlap_queries_are_end_exclusive() {
        let mut index = AnnotationIndex::new();
        let id = index.add(Annotation::new("x", 2..5));

        assert_eq!(index.overlapping(0..2).count(), 0);
        assert_eq!(index.overlapping(4..6).count(), 1);
        assert_eq!(index.overlapping(5..8).count(), 0);
        assert_eq!(index.starting_at(2).next().unwrap().id, id);
        assert_eq!(index.ending_at(5).next().unwrap().id, id);
    }

    #[test]
    fn attribute_lookup_ignores_insertion_order() {
        let a = Annotation::new("person", 0..1)
            .with_attribute("role", "subject")
            .with_attribute("case", "nominative");
        let b = Annotation::new("person", 0..1)
            .with_attribute("case", "nominative")
            .with_attribute("role", "subject");

        assert_eq!(a.attribute("case"), b.attribute("case"));
        assert_eq!(a.attribute("role"), Some("subject"));
        assert_eq!(a.attribute("missing"), None);
    }

    #[test]
    fn empty_annotations_never_open() {
        let mut index = AnnotationIndex::new();
        index.add(Annotation::new("x", 3..3));
        assert_eq!(index.starting_at(3).count(), 0);
        assert_eq!(index.ending_at(3).count(), 0);
    }
}
