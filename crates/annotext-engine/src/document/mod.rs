pub mod annotations;

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::ops::Range;

use thiserror::Error;
use xi_rope::delta::{Builder, Transformer};
use xi_rope::{Delta, Rope, RopeInfo};

use crate::document::annotations::{Annotation, AnnotationId, AnnotationIndex};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document bytes are not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("token index {index} out of bounds (document has {len} tokens)")]
    TokenOutOfBounds { index: usize, len: usize },

    #[error("token value {value:?} is empty or contains whitespace")]
    InvalidToken { value: String },

    #[error("annotation range {start}..{end} outside document bounds (document has {len} tokens)")]
    AnnotationOutOfBounds { start: usize, end: usize, len: usize },

    #[error("unknown annotation {0}")]
    UnknownAnnotation(AnnotationId),
}

/// Immutable positional unit of document text
///
/// A token belongs to exactly one document position; the value string is
/// sliced from the rope on demand via its byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub byte_range: Range<usize>,
}

/// Change notification consumed by the view layer's dirty tracking
#[derive(Debug, Clone, PartialEq)]
pub enum DocChange {
    TokenInserted { index: usize },
    TokenRemoved { index: usize },
    TokenChanged { index: usize },
    AnnotationAdded { id: AnnotationId },
    /// Carries the removed annotation's identity and extent, since the index
    /// can no longer resolve it.
    AnnotationRemoved {
        id: AnnotationId,
        kind: String,
        token_range: Range<usize>,
    },
    AnnotationKindChanged {
        id: AnnotationId,
        old_kind: String,
    },
    AttributeChanged { id: AnnotationId },
}

/// Ordered token sequence plus annotation index over a single rope buffer
///
/// The rope is the source of truth for text; tokens are byte ranges into it,
/// transformed through every edit delta the same way anchors are transformed
/// in rope-based editors. Paragraph breaks are token-index metadata: a token
/// index in `paragraph_breaks` has a hard layout seam immediately before it.
pub struct Document {
    buffer: Rope,
    tokens: Vec<Token>,
    paragraph_breaks: BTreeSet<usize>,
    annotations: AnnotationIndex,
    version: u64,
}

impl Document {
    /// Tokenize plain text on whitespace; blank lines become paragraph breaks.
    pub fn from_text(text: &str) -> Self {
        let mut tokens = Vec::new();
        let mut paragraph_breaks = BTreeSet::new();
        let mut pending_break = false;
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            if line.trim().is_empty() {
                if !tokens.is_empty() {
                    pending_break = true;
                }
            } else {
                let mut word_start = None;
                for (i, ch) in line.char_indices().chain([(line.len(), '\n')]) {
                    if ch.is_whitespace() {
                        if let Some(start) = word_start.take() {
                            if pending_break {
                                paragraph_breaks.insert(tokens.len());
                                pending_break = false;
                            }
                            tokens.push(Token {
                                byte_range: offset + start..offset + i,
                            });
                        }
                    } else if word_start.is_none() {
                        word_start = Some(i);
                    }
                }
            }
            offset += line.len();
        }

        Self {
            buffer: Rope::from(text),
            tokens,
            paragraph_breaks,
            annotations: AnnotationIndex::new(),
            version: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(Self::from_text(std::str::from_utf8(bytes)?))
    }

    /// Build a document from bare token values, optionally with paragraph
    /// breaks before the given token indices. Convenient for tests.
    pub fn from_tokens<I, S>(values: I, breaks: &[usize]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let breaks: BTreeSet<usize> = breaks.iter().copied().collect();
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                if breaks.contains(&i) {
                    text.push_str("\n\n");
                } else {
                    text.push(' ');
                }
            }
            text.push_str(value.as_ref());
        }
        Self::from_text(&text)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn token_text(&self, index: usize) -> Cow<'_, str> {
        match self.tokens.get(index) {
            Some(token) => self.slice_to_cow(token.byte_range.clone()),
            None => Cow::Borrowed(""),
        }
    }

    /// True when a paragraph break separates token `index` from its
    /// predecessor. Token 0 never has a break before it.
    pub fn has_break_before(&self, index: usize) -> bool {
        index > 0 && self.paragraph_breaks.contains(&index)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    pub fn annotations(&self) -> &AnnotationIndex {
        &self.annotations
    }

    /// Slice the buffer, clamping to document bounds to avoid rope panics on
    /// ranges that went stale mid-update.
    pub fn slice_to_cow(&self, range: Range<usize>) -> Cow<'_, str> {
        let doc_len = self.buffer.len();
        let start = range.start.min(doc_len);
        let end = range.end.min(doc_len).max(start);
        self.buffer.slice_to_cow(start..end)
    }

    // ---- token edits ----

    pub fn insert_token(&mut self, at: usize, value: &str) -> Result<DocChange, DocumentError> {
        if at > self.tokens.len() {
            return Err(DocumentError::TokenOutOfBounds {
                index: at,
                len: self.tokens.len(),
            });
        }
        validate_token_value(value)?;

        let (pos, text, value_start) = if self.tokens.is_empty() {
            (0, value.to_string(), 0)
        } else if at == self.tokens.len() {
            let end = self.tokens[at - 1].byte_range.end;
            (end, format!(" {value}"), 1)
        } else {
            let start = self.tokens[at].byte_range.start;
            (start, format!("{value} "), 0)
        };

        let mut builder = Builder::new(self.buffer.len());
        builder.replace(pos..pos, Rope::from(text.as_str()));
        let delta = builder.build();
        self.apply_delta(&delta);

        let value_range = pos + value_start..pos + value_start + value.len();
        self.tokens.insert(at, Token { byte_range: value_range });
        self.shift_token_indices(at, 1);
        self.version += 1;
        Ok(DocChange::TokenInserted { index: at })
    }

    pub fn remove_token(&mut self, at: usize) -> Result<DocChange, DocumentError> {
        if at >= self.tokens.len() {
            return Err(DocumentError::TokenOutOfBounds {
                index: at,
                len: self.tokens.len(),
            });
        }

        let range = self.tokens[at].byte_range.clone();
        // Take the separating whitespace with the token.
        let delete_range = if at + 1 < self.tokens.len() {
            range.start..self.tokens[at + 1].byte_range.start
        } else if at > 0 {
            self.tokens[at - 1].byte_range.end..range.end
        } else {
            range
        };

        let mut builder = Builder::new(self.buffer.len());
        builder.delete(delete_range);
        let delta = builder.build();
        self.tokens.remove(at);
        self.apply_delta(&delta);
        self.shift_token_indices(at, -1);
        self.version += 1;
        Ok(DocChange::TokenRemoved { index: at })
    }

    pub fn replace_token(&mut self, at: usize, value: &str) -> Result<DocChange, DocumentError> {
        if at >= self.tokens.len() {
            return Err(DocumentError::TokenOutOfBounds {
                index: at,
                len: self.tokens.len(),
            });
        }
        validate_token_value(value)?;

        let range = self.tokens[at].byte_range.clone();
        let mut builder = Builder::new(self.buffer.len());
        builder.replace(range.clone(), Rope::from(value));
        let delta = builder.build();
        self.apply_delta(&delta);
        self.tokens[at].byte_range = range.start..range.start + value.len();
        self.version += 1;
        Ok(DocChange::TokenChanged { index: at })
    }

    // ---- annotation edits ----

    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<DocChange, DocumentError> {
        let range = annotation.token_range.clone();
        if range.start > range.end || range.end > self.tokens.len() {
            return Err(DocumentError::AnnotationOutOfBounds {
                start: range.start,
                end: range.end,
                len: self.tokens.len(),
            });
        }
        let id = self.annotations.add(annotation);
        self.version += 1;
        Ok(DocChange::AnnotationAdded { id })
    }

    pub fn remove_annotation(&mut self, id: AnnotationId) -> Result<DocChange, DocumentError> {
        let removed = self
            .annotations
            .remove(id)
            .ok_or(DocumentError::UnknownAnnotation(id))?;
        self.version += 1;
        Ok(DocChange::AnnotationRemoved {
            id,
            kind: removed.kind,
            token_range: removed.token_range,
        })
    }

    pub fn set_annotation_kind(
        &mut self,
        id: AnnotationId,
        kind: impl Into<String>,
    ) -> Result<DocChange, DocumentError> {
        let annotation = self
            .annotations
            .resolve_mut(id)
            .ok_or(DocumentError::UnknownAnnotation(id))?;
        let old_kind = std::mem::replace(&mut annotation.kind, kind.into());
        self.version += 1;
        Ok(DocChange::AnnotationKindChanged { id, old_kind })
    }

    pub fn set_annotation_attribute(
        &mut self,
        id: AnnotationId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<DocChange, DocumentError> {
        let annotation = self
            .annotations
            .resolve_mut(id)
            .ok_or(DocumentError::UnknownAnnotation(id))?;
        annotation.set_attribute(name, value);
        self.version += 1;
        Ok(DocChange::AttributeChanged { id })
    }

    // ---- internals ----

    fn apply_delta(&mut self, delta: &Delta<RopeInfo>) {
        self.buffer = delta.apply(&self.buffer);
        let doc_len = self.buffer.len();
        let mut transformer = Transformer::new(delta);
        for token in &mut self.tokens {
            // Insertions at a token's start push it right; insertions at its
            // end do not absorb into it.
            let start = transformer.transform(token.byte_range.start, true);
            let end = transformer.transform(token.byte_range.end, false);
            if start <= end && end <= doc_len {
                token.byte_range = start..end;
            } else {
                let start = start.min(doc_len);
                token.byte_range = start..end.min(doc_len).max(start);
            }
        }
    }

    /// Shift token-index metadata (paragraph breaks, annotation ranges) after
    /// an insertion (+1) or removal (-1) at `at`.
    fn shift_token_indices(&mut self, at: usize, delta: isize) {
        let token_len = self.tokens.len();
        let shift = |index: usize, is_end: bool| -> usize {
            // Insertion at `at` pushes starts sitting at `at` right; removal
            // leaves them in place so the successor token slides in.
            let moves = if delta > 0 && !is_end {
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

        self.paragraph_breaks = self
            .paragraph_breaks
            .iter()
            .filter_map(|&b| {
                let b = if delta < 0 && b == at {
                    // The removed token was paragraph-initial; its successor
                    // becomes the paragraph start.
                    b
                } else {
                    shift(b, false)
                };
                (b > 0 && b < token_len).then_some(b)
            })
            .collect();

        let ids: Vec<AnnotationId> = self.annotations.iter().map(|a| a.id).collect();
        for id in ids {
            if let Some(annotation) = self.annotations.resolve_mut(id) {
                let start = shift(annotation.token_range.start, false);
                let end = shift(annotation.token_range.end, true).max(start);
                annotation.token_range = start..end;
            }
            // The walk depends on canonical index order; restore it after
            // the range change.
            self.annotations.reposition(id);
        }
    }
}

fn validate_token_value(value: &str) -> Result<(), DocumentError> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(DocumentError::InvalidToken {
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token_values(doc: &Document) -> Vec<String> {
        (0..doc.token_count())
            .map(|i| doc.token_text(i).into_owned())
            .collect()
    }

    #[test]
    fn tokenizes_on_whitespace_with_paragraph_breaks() {
        let doc = Document::from_text("The quick fox\n\njumps over");
        assert_eq!(token_values(&doc), vec!["The", "quick", "fox", "jumps", "over"]);
        assert!(doc.has_break_before(3));
        assert!(!doc.has_break_before(0));
        assert!(!doc.has_break_before(1));
    }

    #[test]
    fn from_tokens_round_trips_breaks() {
        let doc = Document::from_tokens(["a", "b", "c", "d"], &[2]);
        assert_eq!(token_values(&doc), vec!["a", "b", "c", "d"]);
        assert!(doc.has_break_before(2));
        assert!(!doc.has_break_before(3));
    }

    #[test]
    fn insert_token_shifts_later_ranges() {
        let mut doc = Document::from_text("The fox");
        let change = doc.insert_token(1, "quick").unwrap();
        assert_eq!(change, DocChange::TokenInserted { index: 1 });
        assert_eq!(token_values(&doc), vec!["The", "quick", "fox"]);
        assert_eq!(doc.text(), "The quick fox");
    }

    #[test]
    fn insert_token_at_end_appends() {
        let mut doc = Document::from_text("The quick");
        doc.insert_token(2, "fox").unwrap();
        assert_eq!(token_values(&doc), vec!["The", "quick", "fox"]);
        assert_eq!(doc.text(), "The quick fox");
    }

    #[test]
    fn remove_token_takes_separator_along() {
        let mut doc = Document::from_text("The quick fox");
        doc.remove_token(1).unwrap();
        assert_eq!(token_values(&doc), vec!["The", "fox"]);
        assert_eq!(doc.text(), "The fox");

        doc.remove_token(1).unwrap();
        assert_eq!(token_values(&doc), vec!["The"]);
        doc.remove_token(0).unwrap();
        assert_eq!(doc.token_count(), 0);
    }

    #[test]
    fn replace_token_keeps_neighbors_intact() {
        let mut doc = Document::from_text("The quick brown fox");
        doc.replace_token(1, "sluggish").unwrap();
        assert_eq!(token_values(&doc), vec!["The", "sluggish", "brown", "fox"]);
    }

    #[test]
    fn rejects_whitespace_token_values() {
        let mut doc = Document::from_text("a b");
        assert!(matches!(
            doc.insert_token(0, "two words"),
            Err(DocumentError::InvalidToken { .. })
        ));
        assert!(matches!(
            doc.replace_token(0, ""),
            Err(DocumentError::InvalidToken { .. })
        ));
    }

    #[test]
    fn annotation_ranges_follow_token_edits() {
        let mut doc = Document::from_text("The quick fox jumps");
        let id = match doc.add_annotation(Annotation::new("np", 1..3)).unwrap() {
            DocChange::AnnotationAdded { id } => id,
            other => panic!("unexpected change {other:?}"),
        };

        doc.insert_token(0, "Lo").unwrap();
        assert_eq!(doc.annotations().resolve(id).unwrap().token_range, 2..4);

        doc.remove_token(0).unwrap();
        assert_eq!(doc.annotations().resolve(id).unwrap().token_range, 1..3);

        // Removing a covered token shrinks the annotation.
        doc.remove_token(1).unwrap();
        assert_eq!(doc.annotations().resolve(id).unwrap().token_range, 1..2);
    }

    #[test]
    fn edits_keep_annotation_order_canonical() {
        let mut doc = Document::from_text("a b c d e");
        let first = match doc.add_annotation(Annotation::new("x", 2..4)).unwrap() {
            DocChange::AnnotationAdded { id } => id,
            other => panic!("unexpected change {other:?}"),
        };
        let second = match doc.add_annotation(Annotation::new("y", 3..5)).unwrap() {
            DocChange::AnnotationAdded { id } => id,
            other => panic!("unexpected change {other:?}"),
        };

        // The removal slides both annotations onto the same start token;
        // creation order breaks the tie.
        doc.remove_token(2).unwrap();
        assert_eq!(doc.annotations().resolve(first).unwrap().token_range, 2..3);
        assert_eq!(doc.annotations().resolve(second).unwrap().token_range, 2..4);
        let ids: Vec<AnnotationId> = doc.annotations().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn out_of_bounds_annotations_are_rejected() {
        let mut doc = Document::from_text("one two");
        let err = doc.add_annotation(Annotation::new("x", 1..5)).unwrap_err();
        assert!(matches!(err, DocumentError::AnnotationOutOfBounds { .. }));
    }

    #[test]
    fn paragraph_break_survives_removal_of_paragraph_initial_token() {
        let mut doc = Document::from_tokens(["a", "b", "c", "d"], &[2]);
        doc.remove_token(2).unwrap();
        // "d" (now index 2) starts the second paragraph.
        assert!(doc.has_break_before(2));
    }
}
