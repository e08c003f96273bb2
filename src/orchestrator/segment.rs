//! Segment assembly: accumulates transcript fragments for the utterance
//! currently being spoken, and decides what text a flush produces.

/// Owns the text state for one in-progress utterance.
///
/// Confirmed (`Final`) fragments accumulate space-joined; the latest
/// unconfirmed (`Partial`) hypothesis is kept separately and only used as a
/// fallback when a flush happens before anything was confirmed. Confirmed
/// text always wins over a pending hypothesis.
#[derive(Debug, Default)]
pub struct SegmentAssembler {
    confirmed: Vec<String>,
    pending: Option<String>,
}

impl SegmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new hypothesis replaces the previous one outright.
    pub fn on_partial(&mut self, text: &str) {
        if !text.is_empty() {
            self.pending = Some(text.to_string());
        }
    }

    /// Confirmed text is appended; the hypothesis it grew out of is dropped.
    pub fn on_final(&mut self, text: &str) {
        if !text.is_empty() {
            self.confirmed.push(text.to_string());
        }
        self.pending = None;
    }

    /// Whether any fragment (confirmed or not) has arrived for this
    /// utterance. Drives arming of the segment ceiling timer.
    pub fn has_fragment(&self) -> bool {
        !self.confirmed.is_empty() || self.pending.is_some()
    }

    /// Take the flushable text and reset for the next utterance.
    ///
    /// Confirmed fragments joined with single spaces; if none were confirmed,
    /// the pending hypothesis; `None` when there is nothing at all.
    pub fn flush(&mut self) -> Option<String> {
        let text = if self.confirmed.is_empty() {
            self.pending.take()
        } else {
            Some(self.confirmed.join(" "))
        };
        self.clear();
        text
    }

    /// Drop everything without producing text.
    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.pending = None;
    }

    /// Drop only the unconfirmed hypothesis, keeping confirmed fragments.
    pub fn drop_pending(&mut self) {
        self.pending = None;
    }
}
