use annotext_engine::{Annotation, Document, ViewController};

/// Builds a controller over `paragraphs` paragraphs of five tokens each,
/// with an "ent" annotation at the start of every 200th paragraph.
#[allow(dead_code)]
pub fn generate_controller(paragraphs: usize) -> ViewController {
    let values: Vec<String> = (0..paragraphs * 5).map(|i| format!("w{i}")).collect();
    let breaks: Vec<usize> = (1..paragraphs).map(|i| i * 5).collect();
    let mut controller = ViewController::new(Document::from_tokens(values.iter(), &breaks));
    for start in (0..paragraphs * 5).step_by(1_000) {
        controller
            .add_annotation(Annotation::new("ent", start..start + 3))
            .unwrap();
    }
    controller
}
