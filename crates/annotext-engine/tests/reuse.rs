//! Regression tests for the incremental-reuse path: work after a localized
//! change must stay proportional to the change, not the document.

use annotext_engine::{Annotation, DisplayMode, Document, ViewController};

fn large_controller() -> ViewController {
    // 10,000 tokens, a paragraph break every 5 tokens -> 2,000 blocks.
    let values: Vec<String> = (0..10_000).map(|i| format!("w{i}")).collect();
    let breaks: Vec<usize> = (1..2_000).map(|i| i * 5).collect();
    let mut controller = ViewController::new(Document::from_tokens(values.iter(), &breaks));
    for start in [1_000, 3_000, 5_000, 7_000, 9_000] {
        controller
            .add_annotation(Annotation::new("ent", start..start + 3))
            .unwrap();
    }
    controller
}

#[test]
fn mode_toggle_reuses_at_least_99_percent() {
    let mut controller = large_controller();
    let stats = controller.reconcile();
    assert_eq!(stats.text_blocks_built, 2_000);

    controller.set_display_mode("ent", DisplayMode::ShowTags);
    let stats = controller.reconcile();

    let total = stats.text_blocks_built + stats.text_blocks_reused;
    assert!(
        stats.reuse_ratio() >= 0.99,
        "reused {} of {total} blocks",
        stats.text_blocks_reused
    );
    // Only the five annotated paragraphs were rebuilt, independent of N.
    assert!(stats.text_blocks_built <= 5 * 2);

    // Every block comes out clean again.
    let clean = controller.arena().text_blocks().filter(|b| b.clean).count();
    assert_eq!(clean, total);
}

#[test]
fn reconcile_twice_preserves_block_identity() {
    let mut controller = large_controller();
    controller.set_display_mode("ent", DisplayMode::ShowHighlights);
    controller.reconcile();

    let serials: Vec<u64> = controller.arena().text_blocks().map(|b| b.serial).collect();
    let stats = controller.reconcile();

    assert_eq!(stats.text_blocks_built, 0);
    assert_eq!(stats.text_blocks_reused, serials.len());
    let again: Vec<u64> = controller.arena().text_blocks().map(|b| b.serial).collect();
    assert_eq!(serials, again, "reused blocks keep object identity");
}

#[test]
fn single_edit_rebuilds_one_paragraph() {
    let mut controller = large_controller();
    controller.reconcile();

    controller.insert_token(4_002, "inserted").unwrap();
    let stats = controller.reconcile();

    assert_eq!(stats.text_blocks_built, 1);
    assert_eq!(stats.text_blocks_reused, 1_999);
}
