use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use crate::document::Document;
use crate::document::annotations::AnnotationId;

/// Rendered glyphs for highlight caps. Kept ASCII so offsets in rendered
/// text stay byte offsets.
pub const HIGHLIGHT_START_CAP: char = '[';
pub const HIGHLIGHT_END_CAP: char = ']';

/// One run element inside a Text Block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    /// The token at this document position.
    Token(usize),
    /// Inter-token whitespace.
    Space,
    /// Opening cap of a ShowHighlights annotation.
    HighlightStart(AnnotationId),
    /// Closing cap of a ShowHighlights annotation.
    HighlightEnd(AnnotationId),
}

impl Fragment {
    /// Two fragments lead a block equivalently when they are the same kind of
    /// thing: the same annotation's cap, or both plain tokens (the token
    /// *position* is what the reuse probe matched on already).
    pub(crate) fn leads_like(&self, other: &Fragment) -> bool {
        match (self, other) {
            (Fragment::Token(_), Fragment::Token(_)) => true,
            (Fragment::HighlightStart(a), Fragment::HighlightStart(b)) => a == b,
            (Fragment::HighlightEnd(a), Fragment::HighlightEnd(b)) => a == b,
            (Fragment::Space, Fragment::Space) => true,
            _ => false,
        }
    }
}

/// Selection highlight state applied to a block by the selection model
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionPaint {
    #[default]
    None,
    Full,
    /// Partial highlight between two offsets in the block's rendered text.
    Partial(Range<usize>),
}

/// A rendered contiguous run of tokens, whitespace and highlight caps
///
/// Token runs are contiguous and non-overlapping across Text Blocks; the
/// ordered concatenation of all Text Blocks' token ranges reproduces the
/// document token sequence exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Construction stamp, preserved when the block is carried over into a
    /// later pass. This is the only notion of "same object" the engine has.
    pub serial: u64,
    /// Position in the global text-block sequence; renumbered every pass.
    pub index: usize,
    pub token_range: Range<usize>,
    pub byte_range: Range<usize>,
    pub fragments: Vec<Fragment>,
    /// Content guaranteed unchanged since the last full render.
    pub clean: bool,
    /// Annotations whose highlight span enters this block from an earlier one.
    pub incoming_ends: BTreeSet<AnnotationId>,
    /// Annotations whose highlight span leaves this block for a later one.
    pub outgoing_starts: BTreeSet<AnnotationId>,
    pub paint: SelectionPaint,
}

impl TextBlock {
    pub(crate) fn open_at(serial: u64, token: usize) -> Self {
        Self {
            serial,
            index: 0,
            token_range: token..token,
            byte_range: 0..0,
            fragments: Vec::new(),
            clean: false,
            incoming_ends: BTreeSet::new(),
            outgoing_starts: BTreeSet::new(),
            paint: SelectionPaint::None,
        }
    }

    pub fn leading_fragment(&self) -> Option<&Fragment> {
        self.fragments.first()
    }

    pub fn contains_token(&self, token: usize) -> bool {
        self.token_range.contains(&token)
    }

    pub fn has_boundary_ids(&self) -> bool {
        !self.incoming_ends.is_empty() || !self.outgoing_starts.is_empty()
    }

    /// The block's visible text: token values, single spaces and cap glyphs.
    pub fn rendered_text(&self, doc: &Document) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Token(t) => out.push_str(&doc.token_text(*t)),
                Fragment::Space => out.push(' '),
                Fragment::HighlightStart(_) => out.push(HIGHLIGHT_START_CAP),
                Fragment::HighlightEnd(_) => out.push(HIGHLIGHT_END_CAP),
            }
        }
        out
    }

    /// Byte spans of each fragment within the rendered text, in order.
    pub fn fragment_spans(&self, doc: &Document) -> Vec<(Range<usize>, Fragment)> {
        let mut spans = Vec::with_capacity(self.fragments.len());
        let mut offset = 0;
        for fragment in &self.fragments {
            let len = match fragment {
                Fragment::Token(t) => doc.token_text(*t).len(),
                Fragment::Space | Fragment::HighlightStart(_) | Fragment::HighlightEnd(_) => 1,
            };
            spans.push((offset..offset + len, *fragment));
            offset += len;
        }
        spans
    }

    pub fn rendered_len(&self, doc: &Document) -> usize {
        self.fragments
            .iter()
            .map(|f| match f {
                Fragment::Token(t) => doc.token_text(*t).len(),
                _ => 1,
            })
            .sum()
    }
}

/// One edge (start or end) of one annotation's tag in ShowTags mode
#[derive(Debug, Clone, PartialEq)]
pub struct TagBlock {
    pub annotation: AnnotationId,
    pub is_start: bool,
    /// Position in the global tag-block sequence; renumbered every pass.
    pub index: usize,
    /// Rendered tag text, recomputed from the annotation's kind + attributes.
    pub text: String,
    pub paint: SelectionPaint,
}

/// Foldable wrapper around one ShowTags annotation's tag pair and content
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerBlock {
    pub annotation: AnnotationId,
    pub folded: bool,
    pub token_range: Range<usize>,
    pub start_tag: BlockKey,
    pub end_tag: Option<BlockKey>,
    pub children: Vec<BlockKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(TextBlock),
    Tag(TagBlock),
    Container(ContainerBlock),
}

impl Block {
    pub fn as_text(&self) -> Option<&TextBlock> {
        match self {
            Block::Text(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextBlock> {
        match self {
            Block::Text(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&TagBlock> {
        match self {
            Block::Tag(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerBlock> {
        match self {
            Block::Container(b) => Some(b),
            _ => None,
        }
    }
}

/// Handle into the block arena. Only valid within a single reconciliation
/// pass; anything that must survive a pass re-resolves by content instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey(pub(crate) usize);

/// The Block Model: an indexed, append/replace collection instead of a
/// pointer graph
///
/// The arena is rebuilt on every reconciliation pass; reused Text Blocks are
/// moved in by value, keeping their serial stamps. Selection and viewport
/// code hold `(token range | annotation id, offset)` descriptors and
/// re-resolve against the current arena on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockArena {
    blocks: Vec<Block>,
    roots: Vec<BlockKey>,
    /// Leaf blocks (Text and Tag) in visual order; built by `finish_pass`.
    order: Vec<BlockKey>,
    positions: HashMap<BlockKey, usize>,
    parents: HashMap<BlockKey, BlockKey>,
    next_serial: u64,
}

impl BlockArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh arena for a new pass, continuing the previous serial counter.
    pub(crate) fn new_pass(next_serial: u64) -> Self {
        Self {
            next_serial,
            ..Self::default()
        }
    }

    pub(crate) fn take_serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    pub(crate) fn serial_counter(&self) -> u64 {
        self.next_serial
    }

    pub(crate) fn alloc(&mut self, block: Block) -> BlockKey {
        let key = BlockKey(self.blocks.len());
        self.blocks.push(block);
        key
    }

    pub(crate) fn push_root(&mut self, key: BlockKey) {
        self.roots.push(key);
    }

    pub fn get(&self, key: BlockKey) -> Option<&Block> {
        self.blocks.get(key.0)
    }

    pub fn get_mut(&mut self, key: BlockKey) -> Option<&mut Block> {
        self.blocks.get_mut(key.0)
    }

    pub fn text(&self, key: BlockKey) -> Option<&TextBlock> {
        self.get(key).and_then(Block::as_text)
    }

    pub fn text_mut(&mut self, key: BlockKey) -> Option<&mut TextBlock> {
        self.get_mut(key).and_then(Block::as_text_mut)
    }

    pub fn tag(&self, key: BlockKey) -> Option<&TagBlock> {
        self.get(key).and_then(Block::as_tag)
    }

    pub fn roots(&self) -> &[BlockKey] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Leaf blocks (Text and Tag) in visual order.
    pub fn visual_order(&self) -> &[BlockKey] {
        &self.order
    }

    /// Position of a leaf block in the visual order.
    pub fn position_of(&self, key: BlockKey) -> Option<usize> {
        self.positions.get(&key).copied()
    }

    /// The container a block sits directly inside, if any.
    pub fn parent_of(&self, key: BlockKey) -> Option<BlockKey> {
        self.parents.get(&key).copied()
    }

    /// Containers wrapping a block, innermost first.
    pub fn ancestors_of(&self, key: BlockKey) -> Vec<BlockKey> {
        let mut out = Vec::new();
        let mut current = key;
        while let Some(parent) = self.parent_of(current) {
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Text blocks in visual order.
    pub fn text_blocks(&self) -> impl Iterator<Item = &TextBlock> {
        self.order.iter().filter_map(|&k| self.text(k))
    }

    pub fn text_block_keys(&self) -> impl Iterator<Item = BlockKey> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|&k| self.text(k).is_some())
    }

    pub fn find_text_block_at_token(&self, token: usize) -> Option<BlockKey> {
        self.text_block_keys()
            .find(|&k| self.text(k).is_some_and(|b| b.contains_token(token)))
    }

    pub fn find_by_serial(&self, serial: u64) -> Option<BlockKey> {
        self.text_block_keys()
            .find(|&k| self.text(k).is_some_and(|b| b.serial == serial))
    }

    pub fn container_for(&self, annotation: AnnotationId) -> Option<BlockKey> {
        self.blocks.iter().enumerate().find_map(|(i, b)| match b {
            Block::Container(c) if c.annotation == annotation => Some(BlockKey(i)),
            _ => None,
        })
    }

    pub fn tag_block_for(&self, annotation: AnnotationId, is_start: bool) -> Option<BlockKey> {
        self.blocks.iter().enumerate().find_map(|(i, b)| match b {
            Block::Tag(t) if t.annotation == annotation && t.is_start == is_start => {
                Some(BlockKey(i))
            }
            _ => None,
        })
    }

    /// Compute visual order, parent links and per-kind indices after a pass.
    pub(crate) fn finish_pass(&mut self) {
        self.order.clear();
        self.positions.clear();
        self.parents.clear();

        let roots = self.roots.clone();
        for root in roots {
            self.walk_visual(root, None);
        }

        let mut text_index = 0;
        let mut tag_index = 0;
        for &key in &self.order.clone() {
            match self.blocks.get_mut(key.0) {
                Some(Block::Text(b)) => {
                    b.index = text_index;
                    text_index += 1;
                }
                Some(Block::Tag(b)) => {
                    b.index = tag_index;
                    tag_index += 1;
                }
                _ => {}
            }
        }
    }

    fn walk_visual(&mut self, key: BlockKey, parent: Option<BlockKey>) {
        if let Some(parent) = parent {
            self.parents.insert(key, parent);
        }
        match self.get(key) {
            Some(Block::Text(_)) | Some(Block::Tag(_)) => {
                self.positions.insert(key, self.order.len());
                self.order.push(key);
            }
            Some(Block::Container(c)) => {
                let start = c.start_tag;
                let end = c.end_tag;
                let children = c.children.clone();
                self.walk_visual(start, Some(key));
                for child in children {
                    self.walk_visual(child, Some(key));
                }
                if let Some(end) = end {
                    self.walk_visual(end, Some(key));
                }
            }
            None => {}
        }
    }

    /// Consume the arena, yielding its Text Blocks by value in visual order.
    /// Serial stamps travel with the blocks into the next pass.
    pub(crate) fn into_text_blocks(self) -> Vec<TextBlock> {
        let BlockArena { blocks, order, .. } = self;
        let mut slots: Vec<Option<Block>> = blocks.into_iter().map(Some).collect();
        order
            .iter()
            .filter_map(|key| match slots.get_mut(key.0).and_then(Option::take) {
                Some(Block::Text(b)) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// Token ranges of all Text Blocks in visual order; the coverage
    /// invariant says concatenating these reproduces the token sequence.
    pub fn token_coverage(&self) -> Vec<Range<usize>> {
        self.text_blocks()
            .map(|b| b.token_range.clone())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn text_block(arena: &mut BlockArena, tokens: Range<usize>, fragments: Vec<Fragment>) -> BlockKey {
        let serial = arena.take_serial();
        let mut block = TextBlock::open_at(serial, tokens.start);
        block.token_range = tokens;
        block.fragments = fragments;
        arena.alloc(Block::Text(block))
    }

    #[test]
    fn rendered_text_and_spans_line_up() {
        let doc = Document::from_text("The quick fox");
        let id = AnnotationId::fresh();
        let mut arena = BlockArena::new();
        let key = text_block(
            &mut arena,
            0..3,
            vec![
                Fragment::Token(0),
                Fragment::HighlightStart(id),
                Fragment::Token(1),
                Fragment::Space,
                Fragment::Token(2),
                Fragment::HighlightEnd(id),
            ],
        );
        let block = arena.text(key).unwrap();
        assert_eq!(block.rendered_text(&doc), "The[quick fox]");

        let spans = block.fragment_spans(&doc);
        assert_eq!(spans[0], (0..3, Fragment::Token(0)));
        assert_eq!(spans[1], (3..4, Fragment::HighlightStart(id)));
        assert_eq!(spans[2], (4..9, Fragment::Token(1)));
        assert_eq!(spans[5], (10..14, Fragment::HighlightEnd(id)));
        assert_eq!(block.rendered_len(&doc), 14);
    }

    #[test]
    fn finish_pass_orders_depth_first_and_renumbers() {
        let mut arena = BlockArena::new();
        let a = AnnotationId::fresh();

        let before = text_block(&mut arena, 0..1, vec![Fragment::Token(0)]);
        let inner = text_block(&mut arena, 1..3, vec![Fragment::Token(1), Fragment::Space, Fragment::Token(2)]);
        let after = text_block(&mut arena, 3..4, vec![Fragment::Token(3)]);

        let start_tag = arena.alloc(Block::Tag(TagBlock {
            annotation: a,
            is_start: true,
            index: 99,
            text: "<np>".into(),
            paint: SelectionPaint::None,
        }));
        let end_tag = arena.alloc(Block::Tag(TagBlock {
            annotation: a,
            is_start: false,
            index: 99,
            text: "</np>".into(),
            paint: SelectionPaint::None,
        }));
        let container = arena.alloc(Block::Container(ContainerBlock {
            annotation: a,
            folded: false,
            token_range: 1..3,
            start_tag,
            end_tag: Some(end_tag),
            children: vec![inner],
        }));

        arena.push_root(before);
        arena.push_root(container);
        arena.push_root(after);
        arena.finish_pass();

        assert_eq!(arena.visual_order(), &[before, start_tag, inner, end_tag, after]);
        assert_eq!(arena.text(before).unwrap().index, 0);
        assert_eq!(arena.text(inner).unwrap().index, 1);
        assert_eq!(arena.text(after).unwrap().index, 2);
        assert_eq!(arena.tag(start_tag).unwrap().index, 0);
        assert_eq!(arena.tag(end_tag).unwrap().index, 1);

        assert_eq!(arena.parent_of(inner), Some(container));
        assert_eq!(arena.ancestors_of(start_tag), vec![container]);
        assert_eq!(arena.position_of(end_tag), Some(3));
        assert_eq!(arena.token_coverage(), vec![0..1, 1..3, 3..4]);
        assert_eq!(arena.container_for(a), Some(container));
        assert_eq!(arena.find_text_block_at_token(2), Some(inner));
    }
}
