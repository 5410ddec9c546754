//! The selection model: anchor/focus selections over Text or Tag Blocks,
//! point classification for clicks, and descriptor-based survival across
//! reconciliation passes.
//!
//! Selections hold `BlockKey`s only within a pass. Before a reconciliation
//! the state is captured as token/annotation descriptors and re-resolved
//! against the new arena afterward; a stale endpoint degrades to a cleared
//! selection, never a panic.

pub mod point;
pub mod resolve;

pub use point::{PointTarget, TagRegion, classify_point};
pub use resolve::{ResolvedSelection, resolve_range};

use crate::document::Document;
use crate::document::annotations::AnnotationId;
use crate::layout::block::{Block, BlockArena, BlockKey, Fragment, SelectionPaint};

/// Which family of blocks a selection ranges over. Starting a selection of
/// one kind clears any selection of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Token,
    Tag,
}

/// A selection sorted into visual order: `first` precedes `last`;
/// `inverted` remembers that the user's anchor was visually after the focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRange {
    pub kind: SelectionKind,
    pub first: BlockKey,
    pub first_offset: usize,
    pub last: BlockKey,
    pub last_offset: usize,
    pub inverted: bool,
}

/// Result of finishing a selection gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    None,
    /// Anchor and focus coincided: a pure click, classified semantically.
    Point(PointTarget),
    Range(NormalizedRange),
}

/// One selection endpoint, expressed in content terms so it can be
/// re-resolved after the arena is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EndpointDescriptor {
    Token { token: usize, offset: usize },
    TagEdge {
        annotation: AnnotationId,
        is_start: bool,
        offset: usize,
    },
}

/// A selection captured before a reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    kind: SelectionKind,
    anchor: EndpointDescriptor,
    focus: EndpointDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveSelection {
    kind: SelectionKind,
    anchor: (BlockKey, usize),
    focus: (BlockKey, usize),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    active: Option<ActiveSelection>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn kind(&self) -> Option<SelectionKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    /// Begin a selection at a block offset, clearing any existing one.
    pub fn start(&mut self, arena: &mut BlockArena, doc: &Document, key: BlockKey, offset: usize) {
        self.clear(arena);
        let Some(kind) = kind_of_block(arena, key) else {
            return;
        };
        let active = ActiveSelection {
            kind,
            anchor: (key, offset),
            focus: (key, offset),
        };
        let range = normalize(arena, &active);
        diff_paint(arena, doc, kind, None, range.as_ref());
        self.active = Some(active);
    }

    /// Move the focus endpoint, repainting only the blocks whose selection
    /// state actually changed.
    pub fn extend(&mut self, arena: &mut BlockArena, doc: &Document, key: BlockKey, offset: usize) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let kind = active.kind;
        let old = normalize(arena, active);
        active.focus = (key, offset);
        let new = normalize(arena, active);
        diff_paint(arena, doc, kind, old.as_ref(), new.as_ref());
    }

    /// Finish the gesture. A zero-extent selection becomes a point
    /// classification; anything else finalizes as a range.
    pub fn end(
        &mut self,
        arena: &mut BlockArena,
        doc: &Document,
        key: BlockKey,
        offset: usize,
    ) -> SelectionOutcome {
        self.extend(arena, doc, key, offset);
        let Some(active) = &self.active else {
            return SelectionOutcome::None;
        };
        if active.anchor == active.focus {
            let target = classify_point(doc, arena, key, offset);
            self.clear(arena);
            return SelectionOutcome::Point(target);
        }
        match normalize(arena, active) {
            Some(range) => SelectionOutcome::Range(range),
            None => {
                self.clear(arena);
                SelectionOutcome::None
            }
        }
    }

    pub fn clear(&mut self, arena: &mut BlockArena) {
        let Some(active) = self.active.take() else {
            return;
        };
        let Some(range) = normalize(arena, &active) else {
            return;
        };
        let first = arena.position_of(range.first);
        let last = arena.position_of(range.last);
        if let (Some(first), Some(last)) = (first, last) {
            let keys: Vec<BlockKey> = arena.visual_order()[first..=last].to_vec();
            for key in keys {
                set_paint(arena, active.kind, key, SelectionPaint::None);
            }
        }
    }

    pub fn normalized(&self, arena: &BlockArena) -> Option<NormalizedRange> {
        normalize(arena, self.active.as_ref()?)
    }

    /// Resolve the current selection to domain-level results.
    pub fn resolve(&self, doc: &Document, arena: &BlockArena) -> Option<ResolvedSelection> {
        resolve_range(doc, arena, &self.normalized(arena)?)
    }

    /// Capture the selection in content terms before the arena is rebuilt.
    pub fn capture(&self, arena: &BlockArena, doc: &Document) -> Option<SelectionSnapshot> {
        let active = self.active.as_ref()?;
        Some(SelectionSnapshot {
            kind: active.kind,
            anchor: describe_endpoint(arena, doc, active.kind, active.anchor)?,
            focus: describe_endpoint(arena, doc, active.kind, active.focus)?,
        })
    }

    /// Re-resolve a captured selection against a freshly reconciled arena.
    /// Returns false (with no selection left) when an endpoint went stale.
    pub fn restore(
        &mut self,
        snapshot: &SelectionSnapshot,
        arena: &mut BlockArena,
        doc: &Document,
    ) -> bool {
        self.active = None;
        let anchor = resolve_endpoint(arena, doc, &snapshot.anchor);
        let focus = resolve_endpoint(arena, doc, &snapshot.focus);
        let (Some(anchor), Some(focus)) = (anchor, focus) else {
            return false;
        };
        let active = ActiveSelection {
            kind: snapshot.kind,
            anchor,
            focus,
        };
        let Some(range) = normalize(arena, &active) else {
            return false;
        };
        diff_paint(arena, doc, snapshot.kind, None, Some(&range));
        self.active = Some(active);
        true
    }
}

fn kind_of_block(arena: &BlockArena, key: BlockKey) -> Option<SelectionKind> {
    match arena.get(key)? {
        Block::Text(_) => Some(SelectionKind::Token),
        Block::Tag(_) => Some(SelectionKind::Tag),
        Block::Container(_) => None,
    }
}

fn normalize(arena: &BlockArena, active: &ActiveSelection) -> Option<NormalizedRange> {
    let (anchor_key, anchor_offset) = active.anchor;
    let (focus_key, focus_offset) = active.focus;
    let anchor_pos = arena.position_of(anchor_key)?;
    let focus_pos = arena.position_of(focus_key)?;
    let inverted = (anchor_pos, anchor_offset) > (focus_pos, focus_offset);
    let ((first, first_offset), (last, last_offset)) = if inverted {
        (active.focus, active.anchor)
    } else {
        (active.anchor, active.focus)
    };
    Some(NormalizedRange {
        kind: active.kind,
        first,
        first_offset,
        last,
        last_offset,
        inverted,
    })
}

fn block_len(arena: &BlockArena, doc: &Document, key: BlockKey) -> usize {
    match arena.get(key) {
        Some(Block::Text(b)) => b.rendered_len(doc),
        Some(Block::Tag(t)) => t.text.len(),
        _ => 0,
    }
}

fn set_paint(arena: &mut BlockArena, kind: SelectionKind, key: BlockKey, paint: SelectionPaint) {
    match (kind, arena.get_mut(key)) {
        (SelectionKind::Token, Some(Block::Text(b))) => b.paint = paint,
        (SelectionKind::Tag, Some(Block::Tag(b))) => b.paint = paint,
        _ => {}
    }
}

/// Apply the difference between two normalized ranges as block paint:
/// deselect blocks that fell out, fully select blocks newly and wholly
/// included, and recompute partial bounds on the at-most-two boundary blocks.
fn diff_paint(
    arena: &mut BlockArena,
    doc: &Document,
    kind: SelectionKind,
    old: Option<&NormalizedRange>,
    new: Option<&NormalizedRange>,
) {
    let span = |arena: &BlockArena, n: &NormalizedRange| -> Option<(usize, usize)> {
        Some((arena.position_of(n.first)?, arena.position_of(n.last)?))
    };
    let old_span = old.and_then(|n| span(arena, n));
    let new_span = new.and_then(|n| span(arena, n));

    if let Some((old_first, old_last)) = old_span {
        let keys: Vec<BlockKey> = arena.visual_order()[old_first..=old_last].to_vec();
        for (i, key) in keys.into_iter().enumerate() {
            let pos = old_first + i;
            let kept = new_span.is_some_and(|(nf, nl)| pos >= nf && pos <= nl);
            if !kept {
                set_paint(arena, kind, key, SelectionPaint::None);
            }
        }
    }

    let (Some(n), Some((new_first, new_last))) = (new, new_span) else {
        return;
    };
    let keys: Vec<BlockKey> = arena.visual_order()[new_first..=new_last].to_vec();
    for (i, key) in keys.into_iter().enumerate() {
        let pos = new_first + i;
        let interior = pos > new_first && pos < new_last;
        // Interior blocks that were already interior keep their Full paint.
        if interior && old_span.is_some_and(|(of, ol)| pos > of && pos < ol) {
            continue;
        }
        let paint = if new_first == new_last {
            SelectionPaint::Partial(n.first_offset..n.last_offset)
        } else if pos == new_first {
            SelectionPaint::Partial(n.first_offset..block_len(arena, doc, key))
        } else if pos == new_last {
            SelectionPaint::Partial(0..n.last_offset)
        } else {
            SelectionPaint::Full
        };
        set_paint(arena, kind, key, paint);
    }
}

fn describe_endpoint(
    arena: &BlockArena,
    doc: &Document,
    kind: SelectionKind,
    (key, offset): (BlockKey, usize),
) -> Option<EndpointDescriptor> {
    match kind {
        SelectionKind::Token => {
            let block = arena.text(key)?;
            // The token at the offset, or the nearest one before it; an
            // offset before the first token attaches to that token's start.
            let mut best: Option<(usize, usize)> = None;
            for (span, fragment) in block.fragment_spans(doc) {
                let Fragment::Token(token) = fragment else {
                    continue;
                };
                if span.start <= offset {
                    best = Some((token, (offset - span.start).min(span.end - span.start)));
                } else {
                    if best.is_none() {
                        best = Some((token, 0));
                    }
                    break;
                }
            }
            let (token, offset) = best?;
            Some(EndpointDescriptor::Token { token, offset })
        }
        SelectionKind::Tag => {
            let tag = arena.tag(key)?;
            Some(EndpointDescriptor::TagEdge {
                annotation: tag.annotation,
                is_start: tag.is_start,
                offset,
            })
        }
    }
}

fn resolve_endpoint(
    arena: &BlockArena,
    doc: &Document,
    descriptor: &EndpointDescriptor,
) -> Option<(BlockKey, usize)> {
    match descriptor {
        EndpointDescriptor::Token { token, offset } => {
            let key = arena.find_text_block_at_token(*token)?;
            let block = arena.text(key)?;
            let (span, _) = block
                .fragment_spans(doc)
                .into_iter()
                .find(|(_, f)| matches!(f, Fragment::Token(t) if t == token))?;
            Some((key, span.start + (*offset).min(span.end - span.start)))
        }
        EndpointDescriptor::TagEdge {
            annotation,
            is_start,
            offset,
        } => {
            let key = arena.tag_block_for(*annotation, *is_start)?;
            let len = arena.tag(key)?.text.len();
            Some((key, (*offset).min(len)))
        }
    }
}
