//! The reconciliation engine: one walk over the document that builds or
//! updates the Block Model, reusing as many unchanged Text Blocks as it can.
//!
//! The walk visits every document position once. At each position it first
//! closes highlight spans and containers whose end has arrived (containers
//! close strictly LIFO, so an annotation whose end index has passed stays
//! open, force-extended, until every container opened inside it has
//! closed), then honors paragraph seams, then opens annotations starting
//! here, then appends the token itself.
//!
//! On incremental passes the previous pass's clean Text Blocks become reuse
//! candidates. Whenever the walk is about to open a brand-new Text Block it
//! probes the candidate list (one monotone cursor, both sides are
//! token-ordered) and splices a matching candidate in wholesale, skipping
//! the walk to the candidate's end.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use tracing::{debug, trace};

use crate::document::Document;
use crate::document::annotations::AnnotationId;
use crate::layout::block::{
    Block, BlockArena, BlockKey, ContainerBlock, Fragment, SelectionPaint, TagBlock, TextBlock,
};
use crate::layout::dirty::{AnnotationEdge, DirtyRegion, Effect};
use crate::layout::display::{DisplayMode, DisplayModeRegistry};
use crate::layout::tags;

/// What a reconciliation pass did, for logging and regression tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Text Blocks built from scratch this pass.
    pub text_blocks_built: usize,
    /// Clean Text Blocks spliced in from the previous pass.
    pub text_blocks_reused: usize,
    /// Container Blocks created (fold state carried by annotation ID).
    pub containers: usize,
}

impl ReconcileStats {
    pub fn reuse_ratio(&self) -> f64 {
        let total = self.text_blocks_built + self.text_blocks_reused;
        if total == 0 {
            return 1.0;
        }
        self.text_blocks_reused as f64 / total as f64
    }
}

pub(crate) fn run(
    doc: &Document,
    modes: &DisplayModeRegistry,
    previous: BlockArena,
    dirty: DirtyRegion,
) -> (BlockArena, ReconcileStats) {
    let serial_counter = previous.serial_counter();
    let fold_state = collect_fold_state(&previous);
    let candidates = collect_clean_candidates(doc, previous, &dirty);

    let mut walker = Walker {
        doc,
        modes,
        arena: BlockArena::new_pass(serial_counter),
        container_stack: Vec::new(),
        open_text: None,
        open_highlights: Vec::new(),
        candidates,
        cursor: 0,
        fold_state,
        stats: ReconcileStats::default(),
    };
    walker.walk();

    let mut arena = walker.arena;
    arena.finish_pass();
    let stats = walker.stats;
    debug!(
        built = stats.text_blocks_built,
        reused = stats.text_blocks_reused,
        containers = stats.containers,
        "reconciliation pass complete"
    );
    (arena, stats)
}

fn collect_fold_state(previous: &BlockArena) -> HashMap<AnnotationId, bool> {
    let mut fold_state = HashMap::new();
    for key in 0..previous.len() {
        if let Some(container) = previous.get(BlockKey(key)).and_then(Block::as_container) {
            fold_state.insert(container.annotation, container.folded);
        }
    }
    fold_state
}

/// Extract the previous pass's Text Blocks that survive the dirtying rules,
/// token ranges re-aligned through any recorded index shifts, sorted by
/// token index (they already are: visual order is token order).
fn collect_clean_candidates(
    doc: &Document,
    previous: BlockArena,
    dirty: &DirtyRegion,
) -> Vec<Option<TextBlock>> {
    if dirty.is_full() || previous.is_empty() {
        return Vec::new();
    }

    let mut blocks = previous.into_text_blocks();
    for &(at, delta) in dirty.shifts() {
        for block in &mut blocks {
            apply_shift(block, at, delta);
        }
    }

    let intervals = dirty.normalized_intervals();
    blocks
        .into_iter()
        .filter(|b| b.clean && !b.token_range.is_empty())
        .filter(|b| !is_dirtied(doc, b, &intervals, dirty))
        .map(Some)
        .collect()
}

fn apply_shift(block: &mut TextBlock, at: usize, delta: isize) {
    let shift = |index: usize, is_start: bool| -> usize {
        let moves = if delta > 0 && is_start {
            index >= at
        } else {
            index > at
        };
        if moves {
            index.checked_add_signed(delta).unwrap_or(0)
        } else {
            index
        }
    };
    block.token_range =
        shift(block.token_range.start, true)..shift(block.token_range.end, false);
    for fragment in &mut block.fragments {
        if let Fragment::Token(i) = fragment {
            *i = shift(*i, true);
        }
    }
}

fn is_dirtied(
    doc: &Document,
    block: &TextBlock,
    intervals: &[Range<usize>],
    dirty: &DirtyRegion,
) -> bool {
    let range = &block.token_range;

    // Edited token intervals dirty overlapping blocks and the blocks that
    // touch the interval's boundaries (an insertion at a block seam belongs
    // to either side).
    for interval in intervals {
        let overlaps = interval.start < range.end && interval.end > range.start;
        let touches = interval.start == range.end || interval.end == range.start;
        if overlaps || touches {
            return true;
        }
    }

    for (effect, edges) in dirty.effects() {
        for edge in edges {
            if edge_dirties(doc, block, *effect, edge) {
                return true;
            }
        }
    }
    false
}

fn edge_dirties(doc: &Document, block: &TextBlock, effect: Effect, edge: &AnnotationEdge) -> bool {
    let range = &block.token_range;
    let (s, e) = (edge.token_range.start, edge.token_range.end);
    match effect {
        // A new tag pair splits the blocks its boundaries land strictly
        // inside of; blocks that already end/start at the boundary keep
        // their content and move intact.
        Effect::ShowTags => {
            (range.start < s && s < range.end) || (range.start < e && e < range.end)
        }
        // Removing a tag pair merges the blocks on both sides of each
        // boundary, unless a paragraph break already separates them.
        Effect::HideTags => {
            for boundary in [s, e] {
                if doc.has_break_before(boundary) {
                    continue;
                }
                if range.end == boundary || range.start == boundary {
                    return true;
                }
            }
            false
        }
        // The opening cap lands in the block holding the start token, the
        // closing cap in the block holding the last covered token; the
        // neighbor on the other side of each seam may legally receive the
        // cap instead, so it is dirtied too unless a paragraph intervenes.
        Effect::ShowHighlights => {
            if block.contains_token(s) || (range.end == s && !doc.has_break_before(s)) {
                return true;
            }
            if e > 0 && block.contains_token(e - 1) {
                return true;
            }
            range.start == e && !doc.has_break_before(e)
        }
        // Only blocks that actually carry this annotation's caps (or have it
        // crossing a boundary) change when the highlight is hidden.
        Effect::HideHighlights => {
            block.incoming_ends.contains(&edge.id)
                || block.outgoing_starts.contains(&edge.id)
                || block.fragments.iter().any(|f| match f {
                    Fragment::HighlightStart(id) | Fragment::HighlightEnd(id) => *id == edge.id,
                    _ => false,
                })
        }
    }
}

enum Push {
    Inserted,
    /// A clean candidate was spliced in instead; resume the walk here.
    Spliced(usize),
}

struct Walker<'a> {
    doc: &'a Document,
    modes: &'a DisplayModeRegistry,
    arena: BlockArena,
    container_stack: Vec<BlockKey>,
    open_text: Option<TextBlock>,
    /// Currently open ShowHighlights spans as (id, end index).
    open_highlights: Vec<(AnnotationId, usize)>,
    candidates: Vec<Option<TextBlock>>,
    cursor: usize,
    fold_state: HashMap<AnnotationId, bool>,
    stats: ReconcileStats,
}

impl<'a> Walker<'a> {
    fn walk(&mut self) {
        let len = self.doc.token_count();
        let mut t = 0;

        'walk: while t <= len {
            self.close_highlights_at(t);
            self.close_containers_at(t);
            if t == len {
                break;
            }

            // Paragraph breaks are hard layout seams.
            if self.doc.has_break_before(t) {
                self.flush_text();
            }

            let opening: Vec<(AnnotationId, Range<usize>, DisplayMode)> = self
                .doc
                .annotations()
                .starting_at(t)
                .map(|a| (a.id, a.token_range.clone(), self.modes.mode_for(&a.kind)))
                // Edits can shrink an annotation to an empty range; it covers
                // nothing, so it opens nothing.
                .filter(|(_, range, mode)| *mode != DisplayMode::Invisible && !range.is_empty())
                .collect();

            // Inter-token space, unless a tag or cap is about to be inserted
            // first.
            if opening.is_empty() {
                if let Some(block) = &mut self.open_text {
                    if !block.fragments.is_empty() {
                        block.fragments.push(Fragment::Space);
                    }
                }
            }

            let openers = opening.len();
            for (i, (id, range, mode)) in opening.into_iter().enumerate() {
                match mode {
                    DisplayMode::ShowHighlights => {
                        // A splice consumes the rest of the candidate's range
                        // and would skip the annotations still waiting to
                        // open here; only the last opener may reuse.
                        if i + 1 < openers {
                            self.push_fragment_fresh(t, Fragment::HighlightStart(id));
                            self.open_highlights.push((id, range.end));
                            continue;
                        }
                        match self.push_fragment(t, Fragment::HighlightStart(id)) {
                            Push::Spliced(jump) => {
                                t = jump;
                                continue 'walk;
                            }
                            Push::Inserted => self.open_highlights.push((id, range.end)),
                        }
                    }
                    DisplayMode::ShowTags => self.open_container(id, range),
                    DisplayMode::Invisible => {}
                }
            }

            match self.push_fragment(t, Fragment::Token(t)) {
                Push::Spliced(jump) => t = jump,
                Push::Inserted => t += 1,
            }
        }

        self.flush_text();
        self.force_close_remaining();
    }

    /// Close highlight spans whose end has arrived, innermost first.
    fn close_highlights_at(&mut self, t: usize) {
        while let Some(at) = self
            .open_highlights
            .iter()
            .rposition(|&(_, end)| end <= t)
        {
            let (id, _) = self.open_highlights.remove(at);
            // The closing cap goes into the open block, or opens a new one.
            match self.push_fragment(t, Fragment::HighlightEnd(id)) {
                Push::Inserted => {}
                // Candidates never lead with a closing cap (that would make
                // them boundary-crossing, hence never clean).
                Push::Spliced(_) => unreachable!("spliced on a closing cap"),
            }
        }
    }

    /// Close containers whose end has arrived, strictly LIFO: a container
    /// whose own end has passed waits for the containers opened inside it.
    fn close_containers_at(&mut self, t: usize) {
        while let Some(&top) = self.container_stack.last() {
            let end = match self.arena.get(top).and_then(Block::as_container) {
                Some(c) => c.token_range.end,
                None => break,
            };
            if end > t {
                break;
            }
            self.close_top_container();
        }
    }

    fn close_top_container(&mut self) {
        let Some(top) = self.container_stack.pop() else {
            return;
        };
        // Content built while this container was open belongs to it.
        self.container_stack.push(top);
        self.flush_text();
        self.container_stack.pop();

        let annotation = match self.arena.get(top).and_then(Block::as_container) {
            Some(c) => c.annotation,
            None => return,
        };
        // Orphaned edge: the annotation vanished mid-structure. Degrade to a
        // bare closing bracket rather than failing the pass.
        let text = self
            .doc
            .annotations()
            .resolve(annotation)
            .map(tags::render_end_tag)
            .unwrap_or_else(|| "</>".to_string());
        let end_tag = self.arena.alloc(Block::Tag(TagBlock {
            annotation,
            is_start: false,
            index: 0,
            text,
            paint: SelectionPaint::None,
        }));
        if let Some(Block::Container(container)) = self.arena.get_mut(top) {
            container.end_tag = Some(end_tag);
        }
    }

    fn force_close_remaining(&mut self) {
        while !self.container_stack.is_empty() {
            self.close_top_container();
        }
    }

    fn open_container(&mut self, id: AnnotationId, range: Range<usize>) {
        self.flush_text();

        let annotation = match self.doc.annotations().resolve(id) {
            Some(a) => a,
            // Defensive: an open for an annotation the index cannot resolve
            // is treated as absent.
            None => return,
        };
        let start_tag = self.arena.alloc(Block::Tag(TagBlock {
            annotation: id,
            is_start: true,
            index: 0,
            text: tags::render_start_tag(annotation).text,
            paint: SelectionPaint::None,
        }));
        // Reuse the prior container identity for this annotation: fold state
        // survives the rebuild.
        let folded = self.fold_state.get(&id).copied().unwrap_or(false);
        let container = self.arena.alloc(Block::Container(ContainerBlock {
            annotation: id,
            folded,
            token_range: range,
            start_tag,
            end_tag: None,
            children: Vec::new(),
        }));
        self.attach(container);
        self.container_stack.push(container);
        self.stats.containers += 1;
    }

    fn push_fragment(&mut self, t: usize, fragment: Fragment) -> Push {
        if self.open_text.is_none() {
            if let Some(jump) = self.try_reuse(t, &fragment) {
                return Push::Spliced(jump);
            }
        }
        self.push_fragment_fresh(t, fragment);
        Push::Inserted
    }

    /// Append to the open block (opening one if needed) without probing the
    /// candidate list.
    fn push_fragment_fresh(&mut self, t: usize, fragment: Fragment) {
        if self.open_text.is_none() {
            let serial = self.arena.take_serial();
            self.open_text = Some(TextBlock::open_at(serial, t));
        }
        let block = self.open_text.as_mut().expect("text block just ensured");
        if let Fragment::Token(i) = fragment {
            block.token_range.end = i + 1;
        }
        block.fragments.push(fragment);
    }

    /// Probe the clean-candidate list for a block starting exactly here with
    /// a matching leading fragment, and splice it in wholesale.
    fn try_reuse(&mut self, t: usize, fragment: &Fragment) -> Option<usize> {
        // A highlight span crossing into this position would make any
        // candidate here boundary-crossing, which clean blocks never are.
        if !self.open_highlights.is_empty() {
            return None;
        }
        while self.cursor < self.candidates.len() {
            match &self.candidates[self.cursor] {
                None => self.cursor += 1,
                Some(c) if c.token_range.start < t => self.cursor += 1,
                _ => break,
            }
        }
        {
            let candidate = self.candidates.get(self.cursor)?.as_ref()?;
            if candidate.token_range.start != t {
                return None;
            }
            if !candidate.leading_fragment()?.leads_like(fragment) {
                return None;
            }
        }

        let mut block = self.candidates[self.cursor].take().expect("checked above");
        self.cursor += 1;
        let jump = block.token_range.end;
        trace!(start = t, end = jump, serial = block.serial, "splicing clean block");

        block.paint = SelectionPaint::None;
        // Spanning-highlight cache is stale by definition after a re-layout.
        block.incoming_ends.clear();
        block.outgoing_starts.clear();
        block.byte_range = token_bytes(self.doc, &block.token_range);

        self.stats.text_blocks_reused += 1;
        let key = self.arena.alloc(Block::Text(block));
        self.attach(key);
        Some(jump)
    }

    fn flush_text(&mut self) {
        let Some(mut block) = self.open_text.take() else {
            return;
        };
        if block.fragments.is_empty() {
            return;
        }

        let mut starts = BTreeSet::new();
        let mut ends = BTreeSet::new();
        for fragment in &block.fragments {
            match fragment {
                Fragment::HighlightStart(id) => {
                    starts.insert(*id);
                }
                Fragment::HighlightEnd(id) => {
                    ends.insert(*id);
                }
                _ => {}
            }
        }
        block.outgoing_starts = starts.difference(&ends).copied().collect();
        block.incoming_ends = ends.difference(&starts).copied().collect();
        block.byte_range = token_bytes(self.doc, &block.token_range);

        // Cleanliness re-validation: a definite token range, no
        // boundary-crossing highlight IDs, and a sane max token index.
        block.clean = !block.token_range.is_empty()
            && block.incoming_ends.is_empty()
            && block.outgoing_starts.is_empty()
            && block.token_range.end <= self.doc.token_count();

        self.stats.text_blocks_built += 1;
        let key = self.arena.alloc(Block::Text(block));
        self.attach(key);
    }

    fn attach(&mut self, key: BlockKey) {
        match self.container_stack.last().copied() {
            Some(top) => {
                if let Some(Block::Container(container)) = self.arena.get_mut(top) {
                    container.children.push(key);
                }
            }
            None => self.arena.push_root(key),
        }
    }
}

fn token_bytes(doc: &Document, range: &Range<usize>) -> Range<usize> {
    if range.is_empty() {
        return 0..0;
    }
    let start = doc
        .token(range.start)
        .map(|t| t.byte_range.start)
        .unwrap_or(0);
    let end = doc
        .token(range.end - 1)
        .map(|t| t.byte_range.end)
        .unwrap_or(start);
    start..end.max(start)
}
