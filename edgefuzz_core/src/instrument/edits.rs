use super::InstrumentError;

/// A pending text insertion against the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub pos: usize,
    pub text: String,
    /// Tie-breaker between edits at the same offset: lower goes first.
    pub order: u64,
}

/// Collects insertions during the tree walk and applies them in one pass.
///
/// Offsets always refer to the unmodified source, so recording an edit never invalidates the
/// offsets of other edits.
#[derive(Debug, Default)]
pub struct EditBuffer {
    edits: Vec<Edit>,
    next_order: u64,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an insertion ordered after every edit recorded so far at the same offset.
    pub fn insert(&mut self, pos: usize, text: impl Into<String>) {
        let order = self.next_order;
        self.next_order += 1;
        self.edits.push(Edit {
            pos,
            text: text.into(),
            order,
        });
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Produces the modified source. Edits are sorted by `(pos, order)`.
    pub fn apply(mut self, source: &str) -> Result<String, InstrumentError> {
        for edit in &self.edits {
            if edit.pos > source.len() {
                return Err(InstrumentError::OffsetOutOfBounds {
                    offset: edit.pos,
                    len: source.len(),
                });
            }
            if !source.is_char_boundary(edit.pos) {
                return Err(InstrumentError::NotCharBoundary { offset: edit.pos });
            }
        }
        self.edits.sort_by_key(|e| (e.pos, e.order));

        let extra: usize = self.edits.iter().map(|e| e.text.len()).sum();
        let mut out = String::with_capacity(source.len() + extra);
        let mut last = 0;
        for edit in &self.edits {
            out.push_str(&source[last..edit.pos]);
            out.push_str(&edit.text);
            last = edit.pos;
        }
        out.push_str(&source[last..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_at_same_offset_keep_recording_order() {
        let mut edits = EditBuffer::new();
        edits.insert(3, "B");
        edits.insert(0, ">");
        edits.insert(3, "C");
        edits.insert(6, "<");
        assert_eq!(edits.len(), 4);
        assert_eq!(edits.apply("abcdef").unwrap(), ">abcBCdef<");
    }

    #[test]
    fn empty_buffer_returns_source() {
        assert_eq!(EditBuffer::new().apply("unchanged").unwrap(), "unchanged");
    }

    #[test]
    fn invalid_offsets_are_rejected() {
        let mut edits = EditBuffer::new();
        edits.insert(10, "x");
        assert!(matches!(
            edits.apply("short"),
            Err(InstrumentError::OffsetOutOfBounds { offset: 10, len: 5 })
        ));

        let mut edits = EditBuffer::new();
        edits.insert(1, "x");
        assert!(matches!(
            edits.apply("é"),
            Err(InstrumentError::NotCharBoundary { offset: 1 })
        ));
    }
}
