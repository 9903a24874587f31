//! Scrollable console view
//!
//! Holds the rendered console lines, the scroll position and the auto-follow
//! flag. While following, the view stays pinned to the newest line; any
//! manual scroll turns following off until the user jumps back to the bottom.

use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ANSI pattern is valid"));

/// Console lines plus scroll state
#[derive(Debug, Clone)]
pub struct LogView {
    lines: Vec<String>,
    open_line: bool,
    offset: usize,
    height: usize,
    auto_follow: bool,
}

impl LogView {
    /// Creates an empty view that follows new output
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            open_line: false,
            offset: 0,
            height: 0,
            auto_follow: true,
        }
    }

    /// Appends console text; a trailing partial line is continued next time
    pub fn append(&mut self, text: &str) {
        let text = sanitize(text);
        let segments: Vec<&str> = text.split('\n').collect();
        let (complete, tail) = segments.split_at(segments.len() - 1);

        for segment in complete {
            self.push_segment(segment);
            self.open_line = false;
        }
        if let Some(tail) = tail.first().filter(|tail| !tail.is_empty()) {
            self.push_segment(tail);
            self.open_line = true;
        }

        if self.auto_follow {
            self.offset = self.max_offset();
        } else {
            self.offset = self.offset.min(self.max_offset());
        }
    }

    /// Discards everything and shows `text` instead
    pub fn replace(&mut self, text: &str) {
        self.lines.clear();
        self.open_line = false;
        self.offset = 0;
        self.append(text);
    }

    /// Sets how many lines fit on screen
    pub fn set_viewport(&mut self, height: usize) {
        self.height = height;
        if self.auto_follow {
            self.offset = self.max_offset();
        } else {
            self.offset = self.offset.min(self.max_offset());
        }
    }

    /// Scrolls towards older output and stops following
    pub fn scroll_up(&mut self, lines: usize) {
        self.auto_follow = false;
        self.offset = self.offset.saturating_sub(lines);
    }

    /// Scrolls towards newer output and stops following
    pub fn scroll_down(&mut self, lines: usize) {
        self.auto_follow = false;
        self.offset = (self.offset + lines).min(self.max_offset());
    }

    /// Scrolls one screen up
    pub fn page_up(&mut self) {
        self.scroll_up(self.height.max(1));
    }

    /// Scrolls one screen down
    pub fn page_down(&mut self) {
        self.scroll_down(self.height.max(1));
    }

    /// Shows the first line and stops following
    pub fn jump_to_top(&mut self) {
        self.auto_follow = false;
        self.offset = 0;
    }

    /// Shows the newest line and resumes following
    pub fn jump_to_bottom(&mut self) {
        self.auto_follow = true;
        self.offset = self.max_offset();
    }

    /// Flips auto-follow; turning it on also jumps to the bottom
    pub fn toggle_follow(&mut self) {
        if self.auto_follow {
            self.auto_follow = false;
        } else {
            self.jump_to_bottom();
        }
    }

    /// Whether new output scrolls into view
    #[must_use]
    pub fn is_following(&self) -> bool {
        self.auto_follow
    }

    /// Index of the first visible line
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of lines held
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// All lines
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines currently on screen
    #[must_use]
    pub fn visible_lines(&self) -> &[String] {
        let start = self.offset.min(self.lines.len());
        let end = (start + self.height).min(self.lines.len());
        &self.lines[start..end]
    }

    fn push_segment(&mut self, segment: &str) {
        match self.lines.last_mut() {
            Some(last) if self.open_line => last.push_str(segment),
            _ => self.lines.push(segment.to_string()),
        }
    }

    fn max_offset(&self) -> usize {
        self.lines.len().saturating_sub(self.height)
    }
}

impl Default for LogView {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops ANSI escapes and control characters other than tab and newline
fn sanitize(text: &str) -> String {
    ANSI_ESCAPE
        .replace_all(text, "")
        .chars()
        .filter(|c| !c.is_control() || *c == '\t' || *c == '\n')
        .collect()
}
