//! Tag text rendering for ShowTags annotations.
//!
//! Start tags render as `<kind attr="value" ...>` with a parallel index
//! string carrying one classification byte per rendered byte. Point
//! classification looks click offsets up in that index instead of parsing
//! the tag text.

use crate::document::annotations::Annotation;

/// Classification bytes of the parallel index string.
pub(crate) const CLASS_KIND: u8 = b'k';
pub(crate) const CLASS_ATTR_NAME: u8 = b'n';
pub(crate) const CLASS_ATTR_VALUE: u8 = b'v';
pub(crate) const CLASS_PUNCTUATION: u8 = b'p';

pub(crate) struct TagRender {
    pub text: String,
    /// One byte per byte of `text`.
    pub classes: Vec<u8>,
}

pub(crate) fn render_start_tag(annotation: &Annotation) -> TagRender {
    let mut text = String::new();
    let mut classes = Vec::new();
    let mut push = |s: &str, class: u8| {
        text.push_str(s);
        classes.extend(std::iter::repeat_n(class, s.len()));
    };

    push("<", CLASS_PUNCTUATION);
    push(&annotation.kind, CLASS_KIND);
    for (name, value) in annotation.attributes() {
        push(" ", CLASS_PUNCTUATION);
        push(name, CLASS_ATTR_NAME);
        push("=\"", CLASS_PUNCTUATION);
        push(value, CLASS_ATTR_VALUE);
        push("\"", CLASS_PUNCTUATION);
    }
    push(">", CLASS_PUNCTUATION);

    TagRender { text, classes }
}

pub(crate) fn render_end_tag(annotation: &Annotation) -> String {
    format!("</{}>", annotation.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_tag_text_and_classes_are_parallel() {
        let annotation = Annotation::new("np", 0..2)
            .with_attribute("role", "subj")
            .with_attribute("num", "sg");
        let render = render_start_tag(&annotation);

        assert_eq!(render.text, "<np role=\"subj\" num=\"sg\">");
        assert_eq!(render.text.len(), render.classes.len());
        assert_eq!(
            String::from_utf8(render.classes).unwrap(),
            "pkkpnnnnppvvvvppnnnppvvpp"
        );
    }

    #[test]
    fn end_tag_is_kind_only() {
        let annotation = Annotation::new("np", 0..2).with_attribute("x", "y");
        assert_eq!(render_end_tag(&annotation), "</np>");
    }
}
