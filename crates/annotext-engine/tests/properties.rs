//! Property tests: the coverage invariant must hold for any document,
//! any display-mode configuration and any toggle/edit sequence.

use annotext_engine::{Annotation, DisplayMode, Document, ViewController};
use proptest::prelude::*;

const KINDS: [&str; 3] = ["alpha", "beta", "gamma"];

fn assert_coverage(controller: &ViewController) {
    let mut next = 0;
    for range in controller.arena().token_coverage() {
        assert_eq!(range.start, next, "gap or overlap at token {next}");
        next = range.end;
    }
    assert_eq!(
        next,
        controller.document().token_count(),
        "coverage must reach the document end"
    );
}

fn mode_strategy() -> impl Strategy<Value = DisplayMode> {
    prop_oneof![
        Just(DisplayMode::Invisible),
        Just(DisplayMode::ShowTags),
        Just(DisplayMode::ShowHighlights),
    ]
}

fn controller_strategy() -> impl Strategy<Value = (usize, Vec<usize>, Vec<(usize, usize, usize)>)> {
    (5usize..40).prop_flat_map(|token_count| {
        (
            Just(token_count),
            proptest::collection::vec(1..token_count, 0..5),
            proptest::collection::vec((0..token_count, 1usize..6, 0usize..3), 0..6),
        )
    })
}

fn build_controller(
    token_count: usize,
    breaks: &[usize],
    annotations: &[(usize, usize, usize)],
) -> ViewController {
    let values: Vec<String> = (0..token_count).map(|i| format!("t{i}")).collect();
    let mut controller = ViewController::new(Document::from_tokens(values.iter(), breaks));
    for &(start, len, kind) in annotations {
        let end = (start + len).min(token_count);
        if end > start {
            controller
                .add_annotation(Annotation::new(KINDS[kind], start..end))
                .unwrap();
        }
    }
    controller
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn coverage_invariant_under_random_toggles(
        (token_count, breaks, annotations) in controller_strategy(),
        toggles in proptest::collection::vec((0usize..3, mode_strategy()), 1..10),
    ) {
        let mut controller = build_controller(token_count, &breaks, &annotations);
        controller.reconcile();
        assert_coverage(&controller);

        for (kind, mode) in toggles {
            controller.set_display_mode(KINDS[kind], mode);
            controller.reconcile();
            assert_coverage(&controller);
        }
    }

    #[test]
    fn coverage_invariant_under_random_edits(
        (token_count, breaks, annotations) in controller_strategy(),
        modes in proptest::collection::vec(mode_strategy(), 3),
        edits in proptest::collection::vec((any::<bool>(), 0usize..64), 1..10),
    ) {
        let mut controller = build_controller(token_count, &breaks, &annotations);
        for (kind, mode) in KINDS.iter().zip(modes) {
            controller.set_display_mode(kind, mode);
        }
        controller.reconcile();
        assert_coverage(&controller);

        for (insert, pos) in edits {
            let count = controller.document().token_count();
            if insert {
                controller.insert_token(pos % (count + 1), "new").unwrap();
            } else if count > 0 {
                controller.remove_token(pos % count).unwrap();
            }
            controller.reconcile();
            assert_coverage(&controller);
        }
    }

    #[test]
    fn selection_restore_never_panics_under_toggles(
        (token_count, breaks, annotations) in controller_strategy(),
        toggles in proptest::collection::vec((0usize..3, mode_strategy()), 1..6),
    ) {
        let mut controller = build_controller(token_count, &breaks, &annotations);
        controller.reconcile();

        let first_key = controller.arena().text_block_keys().next();
        if let Some(key) = first_key {
            controller.select_start(key, 0);
            controller.select_extend(key, 3);
        }

        for (kind, mode) in toggles {
            controller.set_display_mode(KINDS[kind], mode);
            controller.reconcile();
            // Either the selection survived re-resolution or it was cleared;
            // both must leave the controller consistent.
            let _ = controller.resolve_selection();
            assert_coverage(&controller);
        }
    }
}
