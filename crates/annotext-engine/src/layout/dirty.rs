use std::ops::Range;

use crate::document::annotations::AnnotationId;
use crate::layout::display::DisplayMode;

/// What a display transition (or annotation add/remove) does to the layout,
/// per affected annotation. A single mode change decomposes into up to two
/// effects, e.g. ShowHighlights -> ShowTags is HideHighlights + ShowTags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ShowTags,
    HideTags,
    ShowHighlights,
    HideHighlights,
}

impl Effect {
    pub fn of_transition(from: DisplayMode, to: DisplayMode) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(2);
        match from {
            DisplayMode::ShowTags => effects.push(Effect::HideTags),
            DisplayMode::ShowHighlights => effects.push(Effect::HideHighlights),
            DisplayMode::Invisible => {}
        }
        match to {
            DisplayMode::ShowTags => effects.push(Effect::ShowTags),
            DisplayMode::ShowHighlights => effects.push(Effect::ShowHighlights),
            DisplayMode::Invisible => {}
        }
        effects
    }
}

/// One annotation's identity and extent, captured at dirtying time so that
/// removed annotations (no longer resolvable) can still be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEdge {
    pub id: AnnotationId,
    pub token_range: Range<usize>,
}

/// Accumulated damage between reconciliation passes
///
/// An explicit value instead of scattered boolean flags: token-index
/// intervals touched by edits, display effects with the annotations they
/// apply to, and token-index shifts so that the previous pass's block
/// metadata can be re-aligned before reuse matching. Consumed and cleared
/// atomically by `reconcile()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtyRegion {
    token_intervals: Vec<Range<usize>>,
    effects: Vec<(Effect, Vec<AnnotationEdge>)>,
    shifts: Vec<(usize, isize)>,
    full: bool,
}

impl DirtyRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.full
            && self.token_intervals.is_empty()
            && self.effects.is_empty()
            && self.shifts.is_empty()
    }

    /// Force the next pass to rebuild from scratch.
    pub fn mark_all(&mut self) {
        self.full = true;
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn mark_token(&mut self, token: usize) {
        self.mark_tokens(token..token + 1);
    }

    pub fn mark_tokens(&mut self, interval: Range<usize>) {
        if !interval.is_empty() {
            self.token_intervals.push(interval);
        }
    }

    pub fn push_effect(&mut self, effect: Effect, edges: Vec<AnnotationEdge>) {
        if !edges.is_empty() {
            self.effects.push((effect, edges));
        }
    }

    /// Record that token indices at/after `at` moved by `delta` (an insert
    /// or removal), so stale block token ranges can be re-aligned.
    pub fn push_shift(&mut self, at: usize, delta: isize) {
        self.shifts.push((at, delta));
    }

    pub fn effects(&self) -> &[(Effect, Vec<AnnotationEdge>)] {
        &self.effects
    }

    pub fn shifts(&self) -> &[(usize, isize)] {
        &self.shifts
    }

    /// Merged, sorted token intervals.
    pub fn normalized_intervals(&self) -> Vec<Range<usize>> {
        let mut intervals = self.token_intervals.clone();
        intervals.sort_by_key(|r| (r.start, r.end));
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if interval.start <= last.end => {
                    last.end = last.end.max(interval.end);
                }
                _ => merged.push(interval),
            }
        }
        merged
    }

    /// Consume the accumulated damage, leaving the region empty.
    pub fn take(&mut self) -> DirtyRegion {
        std::mem::take(self)
    }
}
