//! The view controller: single owner of one document view's mutable state.
//!
//! All layout, selection and stabilization state lives here, mutated only
//! through the explicit entry points below. Reconciliation is strictly
//! synchronous and not re-entrant; callers queue triggers rather than
//! nesting passes. Separate document views own independent controllers.

use tracing::error;

use crate::document::annotations::{Annotation, AnnotationId};
use crate::document::{DocChange, Document, DocumentError};
use crate::layout::block::{BlockArena, BlockKey};
use crate::layout::dirty::{AnnotationEdge, DirtyRegion, Effect};
use crate::layout::display::{DisplayMode, DisplayModeRegistry};
use crate::layout::reconcile::{self, ReconcileStats};
use crate::selection::{
    PointTarget, ResolvedSelection, SelectionOutcome, SelectionState, classify_point,
};
use crate::viewport::{
    BlockMetrics, RestorePath, StabilizerConfig, ViewportAnchor, ViewportStabilizer,
};

/// Notified when the finalized selection changes, including when it is
/// cleared or lost across a reconciliation pass.
pub trait SelectionListener {
    fn selection_changed(&mut self, selection: Option<&ResolvedSelection>);
}

/// Notified when a two-step pending action (context-menu gesture over a
/// range) is armed or disarmed.
pub trait PendingActionListener {
    fn pending_action_changed(&mut self, pending: Option<&ResolvedSelection>);
}

/// What `ensure_visible` should bring into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityTarget {
    Token(usize),
    Annotation(AnnotationId),
}

pub struct ViewController {
    document: Document,
    modes: DisplayModeRegistry,
    arena: BlockArena,
    selection: SelectionState,
    stabilizer: ViewportStabilizer,
    dirty: DirtyRegion,
    stats: ReconcileStats,
    reconciling: bool,
    selection_listeners: Vec<Box<dyn SelectionListener>>,
    pending_listeners: Vec<Box<dyn PendingActionListener>>,
}

impl ViewController {
    pub fn new(document: Document) -> Self {
        Self::with_config(document, StabilizerConfig::default())
    }

    pub fn with_config(document: Document, config: StabilizerConfig) -> Self {
        let mut dirty = DirtyRegion::new();
        dirty.mark_all();
        Self {
            document,
            modes: DisplayModeRegistry::new(),
            arena: BlockArena::new(),
            selection: SelectionState::new(),
            stabilizer: ViewportStabilizer::new(config),
            dirty,
            stats: ReconcileStats::default(),
            reconciling: false,
            selection_listeners: Vec::new(),
            pending_listeners: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn arena(&self) -> &BlockArena {
        &self.arena
    }

    pub fn modes(&self) -> &DisplayModeRegistry {
        &self.modes
    }

    pub fn last_stats(&self) -> ReconcileStats {
        self.stats
    }

    pub fn stabilizer_config(&self) -> StabilizerConfig {
        self.stabilizer.config()
    }

    pub fn set_stabilizer_config(&mut self, config: StabilizerConfig) {
        self.stabilizer.set_config(config);
    }

    pub fn add_selection_listener(&mut self, listener: Box<dyn SelectionListener>) {
        self.selection_listeners.push(listener);
    }

    pub fn add_pending_action_listener(&mut self, listener: Box<dyn PendingActionListener>) {
        self.pending_listeners.push(listener);
    }

    // ---- document edits (accumulate damage, consumed by reconcile) ----

    pub fn insert_token(&mut self, at: usize, value: &str) -> Result<(), DocumentError> {
        let change = self.document.insert_token(at, value)?;
        self.fold_change(change);
        Ok(())
    }

    pub fn remove_token(&mut self, at: usize) -> Result<(), DocumentError> {
        let change = self.document.remove_token(at)?;
        self.fold_change(change);
        Ok(())
    }

    pub fn replace_token(&mut self, at: usize, value: &str) -> Result<(), DocumentError> {
        let change = self.document.replace_token(at, value)?;
        self.fold_change(change);
        Ok(())
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<AnnotationId, DocumentError> {
        let change = self.document.add_annotation(annotation)?;
        let id = match &change {
            DocChange::AnnotationAdded { id } => *id,
            _ => unreachable!("add_annotation yields AnnotationAdded"),
        };
        self.fold_change(change);
        Ok(id)
    }

    pub fn remove_annotation(&mut self, id: AnnotationId) -> Result<(), DocumentError> {
        let change = self.document.remove_annotation(id)?;
        self.fold_change(change);
        Ok(())
    }

    pub fn set_annotation_kind(
        &mut self,
        id: AnnotationId,
        kind: impl Into<String>,
    ) -> Result<(), DocumentError> {
        let change = self.document.set_annotation_kind(id, kind)?;
        self.fold_change(change);
        Ok(())
    }

    pub fn set_annotation_attribute(
        &mut self,
        id: AnnotationId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), DocumentError> {
        let change = self.document.set_annotation_attribute(id, name, value)?;
        self.fold_change(change);
        Ok(())
    }

    /// Fold a change notification into the dirty region for the next pass.
    fn fold_change(&mut self, change: DocChange) {
        match change {
            DocChange::TokenInserted { index } => {
                self.dirty.push_shift(index, 1);
                self.dirty.mark_token(index);
            }
            DocChange::TokenRemoved { index } => {
                self.dirty.push_shift(index, -1);
                self.dirty.mark_token(index);
            }
            DocChange::TokenChanged { index } => {
                self.dirty.mark_token(index);
            }
            DocChange::AnnotationAdded { id } => {
                if let Some(annotation) = self.document.annotations().resolve(id) {
                    let mode = self.modes.mode_for(&annotation.kind);
                    let edge = AnnotationEdge {
                        id,
                        token_range: annotation.token_range.clone(),
                    };
                    for effect in Effect::of_transition(DisplayMode::Invisible, mode) {
                        self.dirty.push_effect(effect, vec![edge.clone()]);
                    }
                }
            }
            DocChange::AnnotationRemoved {
                id,
                kind,
                token_range,
            } => {
                let mode = self.modes.mode_for(&kind);
                let edge = AnnotationEdge { id, token_range };
                for effect in Effect::of_transition(mode, DisplayMode::Invisible) {
                    self.dirty.push_effect(effect, vec![edge.clone()]);
                }
            }
            DocChange::AnnotationKindChanged { id, old_kind } => {
                if let Some(annotation) = self.document.annotations().resolve(id) {
                    let from = self.modes.mode_for(&old_kind);
                    let to = self.modes.mode_for(&annotation.kind);
                    let edge = AnnotationEdge {
                        id,
                        token_range: annotation.token_range.clone(),
                    };
                    for effect in Effect::of_transition(from, to) {
                        self.dirty.push_effect(effect, vec![edge.clone()]);
                    }
                }
            }
            // Tag text is re-rendered every pass; only Text Blocks are
            // reused, so an attribute edit needs no dirtying.
            DocChange::AttributeChanged { .. } => {}
        }
    }

    // ---- display modes ----

    pub fn display_mode(&self, kind: &str) -> DisplayMode {
        self.modes.mode_for(kind)
    }

    pub fn set_display_mode(&mut self, kind: &str, mode: DisplayMode) {
        let Some(transition) = self.modes.set(kind, mode) else {
            return;
        };
        let edges: Vec<AnnotationEdge> = self
            .document
            .annotations()
            .of_kind(kind)
            .map(|a| AnnotationEdge {
                id: a.id,
                token_range: a.token_range.clone(),
            })
            .collect();
        for effect in Effect::of_transition(transition.from, transition.to) {
            self.dirty.push_effect(effect, edges.clone());
        }
    }

    /// Fold or unfold a container. Returns false when the annotation has no
    /// container in the current layout.
    pub fn set_folded(&mut self, annotation: AnnotationId, folded: bool) -> bool {
        let Some(key) = self.arena.container_for(annotation) else {
            return false;
        };
        if let Some(crate::layout::block::Block::Container(container)) = self.arena.get_mut(key) {
            container.folded = folded;
            return true;
        }
        false
    }

    // ---- reconciliation ----

    /// Run one reconciliation pass over the accumulated dirty region. The
    /// selection is carried across the pass by content descriptors; if an
    /// endpoint goes stale the selection is cleared and listeners are
    /// notified once.
    pub fn reconcile(&mut self) -> ReconcileStats {
        debug_assert!(!self.reconciling, "reconcile() must not be re-entered");
        if self.reconciling {
            error!("re-entrant reconcile() call ignored");
            return self.stats;
        }
        self.reconciling = true;

        let was_active = self.selection.is_active();
        let snapshot = self.selection.capture(&self.arena, &self.document);
        let dirty = self.dirty.take();
        let previous = std::mem::take(&mut self.arena);
        let (arena, stats) = reconcile::run(&self.document, &self.modes, previous, dirty);
        self.arena = arena;
        self.stats = stats;

        match snapshot {
            Some(snapshot) => {
                let restored = self
                    .selection
                    .restore(&snapshot, &mut self.arena, &self.document);
                if !restored {
                    self.notify_selection(None);
                }
            }
            // An endpoint that cannot be captured (it sits on a block with
            // no token to describe it by) cannot survive the rebuild; its
            // keys must not be left to alias blocks of the new arena.
            None if was_active => {
                self.selection.clear(&mut self.arena);
                self.notify_selection(None);
            }
            None => {}
        }

        self.reconciling = false;
        stats
    }

    /// Record the viewport anchor before a pass. The caller re-renders after
    /// `reconcile()` so the metrics reflect the new layout, then hands the
    /// anchor to [`restore_viewport`](Self::restore_viewport).
    pub fn record_viewport(&self, metrics: &impl BlockMetrics) -> Option<ViewportAnchor> {
        self.stabilizer.record(&self.arena, metrics)
    }

    /// Re-anchor the viewport after a pass.
    pub fn restore_viewport(
        &self,
        anchor: &ViewportAnchor,
        metrics: &mut impl BlockMetrics,
    ) -> RestorePath {
        self.stabilizer.restore(anchor, &self.arena, metrics)
    }

    // ---- selection ----

    pub fn select_start(&mut self, key: BlockKey, offset: usize) {
        self.selection
            .start(&mut self.arena, &self.document, key, offset);
    }

    pub fn select_extend(&mut self, key: BlockKey, offset: usize) {
        self.selection
            .extend(&mut self.arena, &self.document, key, offset);
    }

    /// Finish the gesture. A finalized range notifies selection listeners;
    /// with `context_menu` set it also arms the pending-action listeners.
    pub fn select_end(
        &mut self,
        key: BlockKey,
        offset: usize,
        context_menu: bool,
    ) -> SelectionOutcome {
        let outcome = self
            .selection
            .end(&mut self.arena, &self.document, key, offset);
        match &outcome {
            SelectionOutcome::Range(_) => {
                let resolved = self.resolve_selection();
                self.notify_selection(resolved.as_ref());
                if context_menu {
                    self.notify_pending(resolved.as_ref());
                }
            }
            SelectionOutcome::Point(_) => self.notify_selection(None),
            SelectionOutcome::None => {}
        }
        outcome
    }

    /// Classify a position without changing the selection.
    pub fn select_point(&self, key: BlockKey, offset: usize) -> PointTarget {
        classify_point(&self.document, &self.arena, key, offset)
    }

    pub fn clear_selection(&mut self) {
        if self.selection.is_active() {
            self.selection.clear(&mut self.arena);
            self.notify_selection(None);
            self.notify_pending(None);
        }
    }

    pub fn resolve_selection(&self) -> Option<ResolvedSelection> {
        self.selection.resolve(&self.document, &self.arena)
    }

    fn notify_selection(&mut self, resolved: Option<&ResolvedSelection>) {
        for listener in &mut self.selection_listeners {
            listener.selection_changed(resolved);
        }
    }

    fn notify_pending(&mut self, resolved: Option<&ResolvedSelection>) {
        for listener in &mut self.pending_listeners {
            listener.pending_action_changed(resolved);
        }
    }

    // ---- visibility ----

    /// Bring a token or annotation into view. With `show_parents`, folded
    /// ancestor containers are unfolded first; without it a folded target
    /// fails. Returns false when the target has no block in the current
    /// layout, e.g. an annotation whose kind is Invisible.
    pub fn ensure_visible(
        &mut self,
        target: VisibilityTarget,
        show_parents: bool,
        metrics: &mut impl BlockMetrics,
    ) -> bool {
        let key = match target {
            VisibilityTarget::Token(token) => self.arena.find_text_block_at_token(token),
            VisibilityTarget::Annotation(id) => {
                let Some(annotation) = self.document.annotations().resolve(id) else {
                    return false;
                };
                if self.modes.mode_for(&annotation.kind) == DisplayMode::Invisible {
                    return false;
                }
                self.arena
                    .find_text_block_at_token(annotation.token_range.start)
            }
        };
        let Some(key) = key else {
            return false;
        };

        // Unfolds are provisional until the target proves scrollable; a
        // request that cannot complete must leave the fold state untouched.
        let mut unfolded: Vec<BlockKey> = Vec::new();
        for ancestor in self.arena.ancestors_of(key) {
            let Some(crate::layout::block::Block::Container(container)) =
                self.arena.get_mut(ancestor)
            else {
                continue;
            };
            if container.folded {
                if !show_parents {
                    return false;
                }
                container.folded = false;
                unfolded.push(ancestor);
            }
        }

        let lookup = self.arena.text(key).map(|b| b.serial).and_then(|serial| {
            Some((metrics.block_top(serial)?, metrics.block_height(serial)?))
        });
        let Some((top, height)) = lookup else {
            for ancestor in unfolded {
                if let Some(crate::layout::block::Block::Container(container)) =
                    self.arena.get_mut(ancestor)
                {
                    container.folded = true;
                }
            }
            return false;
        };
        let scroll = metrics.scroll_offset();
        let viewport = metrics.viewport_height();
        if top >= scroll && top + height <= scroll + viewport {
            return true;
        }
        // Scroll the block's top to the stabilization line.
        let target_line = viewport * i64::from(self.stabilizer.config().stable_fraction) / 100;
        metrics.set_scroll_offset((top - target_line).max(0));
        true
    }
}
