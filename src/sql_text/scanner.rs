use super::parsers::{is_block_comment_end, is_block_comment_start, is_line_comment_start};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Bracketed,
    Backticked,
    LineComment,
    BlockComment,
}

/// One byte of SQL text seen outside comments.
///
/// Quoted literals and identifiers are reported once, at their opening quote, with
/// `quoted == true`; their contents are skipped.
#[derive(Clone, Copy, Debug)]
pub(super) struct Scanned {
    pub(super) idx: usize,
    pub(super) quoted: bool,
}

pub(super) struct Scanner<'a> {
    bytes: &'a [u8],
    idx: usize,
    state: State,
}

impl<'a> Scanner<'a> {
    pub(super) fn new(sql: &'a str) -> Self {
        Self {
            bytes: sql.as_bytes(),
            idx: 0,
            state: State::Normal,
        }
    }

    /// Skip ahead so that the next byte examined is `idx`. Only valid in `Normal` state.
    pub(super) fn jump_to(&mut self, idx: usize) {
        debug_assert_eq!(self.state, State::Normal);
        self.idx = idx.max(self.idx);
    }

    fn close_quote(&mut self, quote: u8) {
        if self.bytes.get(self.idx + 1) == Some(&quote) {
            self.idx += 2; // doubled quote is an escape
        } else {
            self.state = State::Normal;
            self.idx += 1;
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Scanned;

    fn next(&mut self) -> Option<Scanned> {
        while self.idx < self.bytes.len() {
            let b = self.bytes[self.idx];
            match self.state {
                State::Normal => {
                    let opened = match b {
                        b'\'' => Some(State::SingleQuoted),
                        b'"' => Some(State::DoubleQuoted),
                        b'[' => Some(State::Bracketed),
                        b'`' => Some(State::Backticked),
                        _ => None,
                    };
                    if let Some(state) = opened {
                        let idx = self.idx;
                        self.state = state;
                        self.idx += 1;
                        return Some(Scanned { idx, quoted: true });
                    }
                    if is_line_comment_start(self.bytes, self.idx) {
                        self.state = State::LineComment;
                        self.idx += 2;
                    } else if is_block_comment_start(self.bytes, self.idx) {
                        self.state = State::BlockComment;
                        self.idx += 2;
                    } else {
                        let idx = self.idx;
                        self.idx += 1;
                        return Some(Scanned { idx, quoted: false });
                    }
                }
                State::SingleQuoted if b == b'\'' => self.close_quote(b'\''),
                State::DoubleQuoted if b == b'"' => self.close_quote(b'"'),
                State::Backticked if b == b'`' => self.close_quote(b'`'),
                State::Bracketed if b == b']' => {
                    self.state = State::Normal;
                    self.idx += 1;
                }
                State::LineComment if b == b'\n' => {
                    self.state = State::Normal;
                    self.idx += 1;
                }
                State::BlockComment if is_block_comment_end(self.bytes, self.idx) => {
                    self.state = State::Normal;
                    self.idx += 2;
                }
                _ => self.idx += 1,
            }
        }
        None
    }
}
