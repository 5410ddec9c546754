//! End-to-end scenarios driven through the public controller API.

use annotext_engine::{
    Annotation, Block, BlockMetrics, DisplayMode, Document, RestorePath, ViewController,
};

/// Flat geometry over the controller's text blocks: every block is one
/// fixed-height strip, addressed by serial.
struct FlatMetrics {
    viewport_height: i64,
    scroll: i64,
    blocks: Vec<(u64, i64)>,
}

impl FlatMetrics {
    fn rendered(controller: &ViewController, scroll: i64, height_per_block: i64) -> Self {
        Self {
            viewport_height: 60,
            scroll,
            blocks: controller
                .arena()
                .text_blocks()
                .map(|b| (b.serial, height_per_block))
                .collect(),
        }
    }
}

impl BlockMetrics for FlatMetrics {
    fn viewport_height(&self) -> i64 {
        self.viewport_height
    }
    fn scroll_offset(&self) -> i64 {
        self.scroll
    }
    fn set_scroll_offset(&mut self, offset: i64) {
        self.scroll = offset;
    }
    fn block_top(&self, serial: u64) -> Option<i64> {
        let mut top = 0;
        for &(s, h) in &self.blocks {
            if s == serial {
                return Some(top);
            }
            top += h;
        }
        None
    }
    fn block_height(&self, serial: u64) -> Option<i64> {
        self.blocks
            .iter()
            .find(|&&(s, _)| s == serial)
            .map(|&(_, h)| h)
    }
}

fn rendered_texts(controller: &ViewController) -> Vec<String> {
    let arena = controller.arena();
    arena
        .visual_order()
        .iter()
        .map(|&k| match arena.get(k).unwrap() {
            Block::Text(b) => b.rendered_text(controller.document()),
            Block::Tag(t) => t.text.clone(),
            Block::Container(_) => unreachable!("containers are not leaves"),
        })
        .collect()
}

#[test]
fn animal_highlight_to_tags_scenario() {
    let mut controller = ViewController::new(Document::from_text("The quick fox"));
    let id = controller
        .add_annotation(Annotation::new("ANIMAL", 1..3))
        .unwrap();
    controller.set_display_mode("ANIMAL", DisplayMode::ShowHighlights);
    controller.reconcile();

    // One block with the opening cap before "quick" and the closing one
    // after "fox".
    assert_eq!(rendered_texts(&controller), vec!["The[quick fox]"]);

    controller.set_display_mode("ANIMAL", DisplayMode::ShowTags);
    controller.reconcile();

    assert_eq!(
        rendered_texts(&controller),
        vec!["The", "<ANIMAL>", "quick fox", "</ANIMAL>"]
    );
    assert!(controller.arena().container_for(id).is_some());

    // "The" did not change content and comes out of the pass clean.
    let the_block = controller.arena().text_blocks().next().unwrap();
    assert_eq!(the_block.token_range, 0..1);
    assert!(the_block.clean);
}

#[test]
fn unrelated_toggle_keeps_centered_paragraph_anchored() {
    // Three paragraphs of four tokens; the annotation lives in paragraph 1.
    let values: Vec<String> = (0..12).map(|i| format!("w{i}")).collect();
    let mut controller = ViewController::new(Document::from_tokens(values.iter(), &[4, 8]));
    controller
        .add_annotation(Annotation::new("note", 1..3))
        .unwrap();
    controller.reconcile();

    let paragraph2_serial = controller
        .arena()
        .text_blocks()
        .nth(1)
        .map(|b| b.serial)
        .unwrap();

    // Scrolled so paragraph 2 is centered: blocks 40px at tops 0/40/80,
    // viewport 60 at scroll 50.
    let mut metrics = FlatMetrics::rendered(&controller, 50, 40);
    let offset_before = metrics.block_top(paragraph2_serial).unwrap() - metrics.scroll;
    let anchor = controller.record_viewport(&metrics).unwrap();

    controller.set_display_mode("note", DisplayMode::ShowTags);
    controller.reconcile();

    // Re-render: paragraph 1 split around the new container, 2 and 3 kept.
    let scroll = metrics.scroll;
    let mut metrics = FlatMetrics::rendered(&controller, scroll, 40);
    let path = controller.restore_viewport(&anchor, &mut metrics);

    assert_eq!(path, RestorePath::SameBlock);
    let offset_after = metrics.block_top(paragraph2_serial).unwrap() - metrics.scroll;
    assert_eq!(offset_after, offset_before);
}

#[test]
fn hiding_a_removed_highlight_leaves_others_unaffected() {
    let mut controller =
        ViewController::new(Document::from_tokens(["a", "b", "c", "d", "e", "f"], &[]));
    let kept = controller
        .add_annotation(Annotation::new("X", 0..2))
        .unwrap();
    let removed = controller
        .add_annotation(Annotation::new("Y", 2..4))
        .unwrap();
    controller.set_display_mode("X", DisplayMode::ShowHighlights);
    controller.set_display_mode("Y", DisplayMode::ShowHighlights);
    controller.reconcile();
    assert_eq!(rendered_texts(&controller), vec!["[a b][c d] e f"]);

    // The annotation whose caps should disappear is itself already gone;
    // the pass must not fail and X's caps must survive.
    controller.remove_annotation(removed).unwrap();
    controller.reconcile();
    assert_eq!(rendered_texts(&controller), vec!["[a b] c d e f"]);
    assert!(controller.document().annotations().resolve(kept).is_some());
}

#[test]
fn interleaved_annotations_round_trip_through_modes() {
    let mut controller =
        ViewController::new(Document::from_tokens(["v", "w", "x", "y", "z"], &[]));
    controller
        .add_annotation(Annotation::new("a", 0..2))
        .unwrap();
    controller
        .add_annotation(Annotation::new("b", 1..4))
        .unwrap();
    controller.set_display_mode("a", DisplayMode::ShowTags);
    controller.set_display_mode("b", DisplayMode::ShowTags);
    controller.reconcile();

    // b interleaves with a, so a's container force-extends until b closes.
    assert_eq!(
        rendered_texts(&controller),
        vec!["<a>", "v", "<b>", "w x y", "</b>", "</a>", "z"]
    );

    controller.set_display_mode("a", DisplayMode::Invisible);
    controller.set_display_mode("b", DisplayMode::Invisible);
    controller.reconcile();
    assert_eq!(rendered_texts(&controller), vec!["v w x y z"]);
}
