//! Point-selection classification: what a single click or cursor position
//! inside a block actually refers to.

use crate::document::Document;
use crate::document::annotations::{Annotation, AnnotationId};
use crate::layout::block::{Block, BlockArena, BlockKey, Fragment};
use crate::layout::tags;

/// Sub-region of a start tag's rendered text, resolved through the tag's
/// parallel classification index rather than by parsing the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRegion {
    Kind,
    AttributeName { name: String },
    AttributeValue { name: String },
    Punctuation,
}

/// Semantic target of a point selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointTarget {
    Token { token: usize, offset: usize },
    Whitespace,
    HighlightStartCap(AnnotationId),
    HighlightEndCap(AnnotationId),
    StartTag { annotation: AnnotationId, region: TagRegion },
    EndTag { annotation: AnnotationId },
    /// The body of a folded container, between its tag pair.
    TagConnector,
    Outside,
}

/// Classify a byte offset within a block's rendered text. Offsets at the very
/// end of the text resolve to the trailing fragment's end, so a click at a
/// token's right boundary still classifies as that token.
pub fn classify_point(
    doc: &Document,
    arena: &BlockArena,
    key: BlockKey,
    offset: usize,
) -> PointTarget {
    match arena.get(key) {
        Some(Block::Text(block)) => {
            let spans = block.fragment_spans(doc);
            // Containment wins, except that a token's right boundary beats
            // the following space: clicking at a token's end still means
            // that token.
            let picked = spans
                .iter()
                .find(|(r, f)| {
                    r.start <= offset && offset < r.end && !matches!(f, Fragment::Space)
                })
                .or_else(|| {
                    spans
                        .iter()
                        .find(|(r, f)| r.end == offset && matches!(f, Fragment::Token(_)))
                })
                .or_else(|| {
                    spans
                        .iter()
                        .find(|(r, _)| r.start <= offset && offset < r.end)
                })
                .or_else(|| spans.last());
            let Some((span, fragment)) = picked else {
                return PointTarget::Outside;
            };
            match fragment {
                Fragment::Token(t) => PointTarget::Token {
                    token: *t,
                    offset: offset
                        .saturating_sub(span.start)
                        .min(span.end - span.start),
                },
                Fragment::Space => PointTarget::Whitespace,
                Fragment::HighlightStart(id) => PointTarget::HighlightStartCap(*id),
                Fragment::HighlightEnd(id) => PointTarget::HighlightEndCap(*id),
            }
        }
        Some(Block::Tag(tag)) => {
            let Some(annotation) = doc.annotations().resolve(tag.annotation) else {
                return PointTarget::Outside;
            };
            if tag.is_start {
                PointTarget::StartTag {
                    annotation: tag.annotation,
                    region: classify_tag_offset(annotation, offset),
                }
            } else {
                PointTarget::EndTag {
                    annotation: tag.annotation,
                }
            }
        }
        Some(Block::Container(_)) => PointTarget::TagConnector,
        None => PointTarget::Outside,
    }
}

fn classify_tag_offset(annotation: &Annotation, offset: usize) -> TagRegion {
    let render = tags::render_start_tag(annotation);
    let Some(&class) = render.classes.get(offset) else {
        return TagRegion::Punctuation;
    };
    match class {
        tags::CLASS_KIND => TagRegion::Kind,
        tags::CLASS_ATTR_NAME | tags::CLASS_ATTR_VALUE => {
            // Which attribute: count name-run starts up to the offset.
            let mut attr = 0usize;
            let mut prev = 0u8;
            for &c in &render.classes[..=offset] {
                if c == tags::CLASS_ATTR_NAME && prev != tags::CLASS_ATTR_NAME {
                    attr += 1;
                }
                prev = c;
            }
            let name = annotation
                .attributes()
                .nth(attr.saturating_sub(1))
                .map(|(n, _)| n.to_string())
                .unwrap_or_default();
            if class == tags::CLASS_ATTR_NAME {
                TagRegion::AttributeName { name }
            } else {
                TagRegion::AttributeValue { name }
            }
        }
        _ => TagRegion::Punctuation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::annotations::Annotation;
    use rstest::rstest;

    #[rstest]
    // "<np role=\"subj\" num=\"sg\">"
    #[case(0, TagRegion::Punctuation)]
    #[case(1, TagRegion::Kind)]
    #[case(4, TagRegion::AttributeName { name: "role".into() })]
    #[case(10, TagRegion::AttributeValue { name: "role".into() })]
    #[case(16, TagRegion::AttributeName { name: "num".into() })]
    #[case(21, TagRegion::AttributeValue { name: "num".into() })]
    // Past the end degrades to punctuation, never panics.
    #[case(999, TagRegion::Punctuation)]
    fn tag_offsets_classify_by_region(#[case] offset: usize, #[case] expected: TagRegion) {
        let annotation = Annotation::new("np", 0..2)
            .with_attribute("role", "subj")
            .with_attribute("num", "sg");
        assert_eq!(classify_tag_offset(&annotation, offset), expected);
    }
}
