//! Markdown cleanup for relayed text.
//!
//! Chat clients render plain text, so emphasis markers are stripped and runs
//! of blank lines collapsed. A run of `*` is a marker only when it touches a
//! word; spaced or digit-enclosed asterisks (`5 * 4`, `2*3`, `* item`) are
//! kept. The cleaner is incremental: markers split across fragments are
//! handled the same as markers inside one fragment.

/// Most consecutive newlines passed through (one blank line).
const MAX_NEWLINES: usize = 2;

/// Incremental text cleaner, one per streamed reply.
#[derive(Debug)]
pub struct TextCleaner {
    /// A lone `_` that may still turn into `__`.
    pending_underscore: bool,
    /// Run of `*` held until the character after it is known.
    pending_stars: usize,
    /// Last input character before any pending run.
    prev: Option<char>,
    /// Newlines emitted since the last visible character.
    newlines: usize,
    /// Whitespace at the start of a line, dropped if the line stays blank.
    indent: String,
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self {
            pending_underscore: false,
            pending_stars: 0,
            prev: None,
            // Suppresses leading blank lines.
            newlines: MAX_NEWLINES,
            indent: String::new(),
        }
    }
}

impl TextCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clean one fragment; may hold back a trailing `_`, a run of `*` or
    /// indentation.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut out = String::with_capacity(fragment.len());

        for c in fragment.chars() {
            if c == '*' {
                self.flush_underscore(&mut out);
                self.pending_stars += 1;
                continue;
            }

            self.resolve_stars(Some(c), &mut out);
            match c {
                '_' if self.pending_underscore => self.pending_underscore = false,
                '_' => self.pending_underscore = true,
                _ => {
                    self.flush_underscore(&mut out);
                    self.push_char(c, &mut out);
                }
            }
            self.prev = Some(c);
        }

        out
    }

    /// Flush anything held back at the end of the reply.
    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        self.resolve_stars(None, &mut out);
        self.flush_underscore(&mut out);
        self.indent.clear();
        out
    }

    /// Drop a pending `*` run that delimits emphasis, emit it otherwise.
    fn resolve_stars(&mut self, next: Option<char>, out: &mut String) {
        let stars = std::mem::take(&mut self.pending_stars);
        if stars == 0 {
            return;
        }

        let spaced = |c: Option<char>| c.map_or(true, char::is_whitespace);
        let digit = |c: Option<char>| c.is_some_and(|c| c.is_ascii_digit());
        let literal = (spaced(self.prev) && spaced(next)) || (digit(self.prev) && digit(next));
        if literal {
            for _ in 0..stars {
                self.push_visible('*', out);
            }
        }
    }

    fn flush_underscore(&mut self, out: &mut String) {
        if self.pending_underscore {
            self.pending_underscore = false;
            self.push_visible('_', out);
        }
    }

    fn push_char(&mut self, c: char, out: &mut String) {
        match c {
            '\r' => {}
            '\n' => {
                self.indent.clear();
                if self.newlines < MAX_NEWLINES {
                    out.push('\n');
                }
                self.newlines += 1;
            }
            c if c.is_whitespace() && self.newlines > 0 => self.indent.push(c),
            c => self.push_visible(c, out),
        }
    }

    fn push_visible(&mut self, c: char, out: &mut String) {
        out.push_str(&self.indent);
        self.indent.clear();
        self.newlines = 0;
        out.push(c);
    }
}

/// Clean a complete reply in one go.
pub fn clean_text(text: &str) -> String {
    let mut cleaner = TextCleaner::new();
    let mut out = cleaner.push(text);
    out.push_str(&cleaner.finish());
    out
}
