//! Cross-block resolution of a finalized range selection into domain-level
//! results: covered tokens, partial-token offsets and boundary annotations,
//! independent of how annotation boundaries fragmented the token run.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::document::Document;
use crate::document::annotations::AnnotationId;
use crate::layout::block::{BlockArena, Fragment};
use crate::selection::{NormalizedRange, SelectionKind};

/// Domain-level view of a finalized selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    /// Fully or partially covered tokens.
    pub tokens: Range<usize>,
    /// In-token byte offset where the selection enters the first token
    /// (0 when the token is fully covered).
    pub first_token_offset: usize,
    /// In-token byte offset where the selection leaves the last token
    /// (the token's length when it is fully covered).
    pub last_token_offset: usize,
    /// Annotations with a start or end boundary inside the covered range,
    /// including ones whose caps ended up in different blocks.
    pub annotations: BTreeSet<AnnotationId>,
}

pub fn resolve_range(
    doc: &Document,
    arena: &BlockArena,
    range: &NormalizedRange,
) -> Option<ResolvedSelection> {
    let first = arena.position_of(range.first)?;
    let last = arena.position_of(range.last)?;

    if range.kind == SelectionKind::Tag {
        let mut annotations = BTreeSet::new();
        for &key in &arena.visual_order()[first..=last] {
            if let Some(tag) = arena.tag(key) {
                annotations.insert(tag.annotation);
            }
        }
        return Some(ResolvedSelection {
            tokens: 0..0,
            first_token_offset: 0,
            last_token_offset: 0,
            annotations,
        });
    }

    let mut entry: Option<(usize, usize)> = None;
    let mut exit: Option<(usize, usize)> = None;
    for pos in first..=last {
        let key = arena.visual_order()[pos];
        let Some(block) = arena.text(key) else {
            continue;
        };
        let lo = if pos == first { range.first_offset } else { 0 };
        let hi = if pos == last {
            range.last_offset
        } else {
            block.rendered_len(doc)
        };
        for (span, fragment) in block.fragment_spans(doc) {
            let Fragment::Token(token) = fragment else {
                continue;
            };
            if span.start >= hi || span.end <= lo {
                continue;
            }
            if entry.is_none() {
                entry = Some((token, lo.saturating_sub(span.start)));
            }
            exit = Some((token, hi.min(span.end) - span.start));
        }
    }

    let (first_token, first_token_offset) = entry?;
    let (last_token, last_token_offset) = exit?;
    let tokens = first_token..last_token + 1;

    let mut annotations = BTreeSet::new();
    for annotation in doc.annotations().iter() {
        if annotation.token_range.is_empty() {
            continue;
        }
        let (start, end) = (annotation.token_range.start, annotation.token_range.end);
        let starts_inside = start >= tokens.start && start < tokens.end;
        let ends_inside = end > tokens.start && end <= tokens.end;
        if starts_inside || ends_inside {
            annotations.insert(annotation.id);
        }
    }

    Some(ResolvedSelection {
        tokens,
        first_token_offset,
        last_token_offset,
        annotations,
    })
}
