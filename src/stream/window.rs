//! Bounded sliding window over streamed text.

/// Accumulated response text awaiting moderation.
///
/// Until the first check completes the window grows freely and any content
/// makes a check due. Afterwards it keeps only the newest `window_size`
/// characters and a check is due whenever it is full.
#[derive(Debug, Clone)]
pub struct ContentWindow {
    buffer: String,
    len_chars: usize,
    window_size: usize,
    first_check_done: bool,
    unchecked_chars: usize,
}

impl ContentWindow {
    /// `window_size` below 1 is raised to 1.
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: String::new(),
            len_chars: 0,
            window_size: window_size.max(1),
            first_check_done: false,
            unchecked_chars: 0,
        }
    }

    /// Append streamed text. Returns true when a check is due.
    ///
    /// Empty text never makes a check due.
    pub fn add_content(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }

        let added = text.chars().count();
        self.buffer.push_str(text);
        self.len_chars += added;
        self.unchecked_chars += added;

        if self.first_check_done {
            self.trim();
            self.len_chars >= self.window_size
        } else {
            self.len_chars > 0
        }
    }

    /// Window text sent to the checker.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Length in characters.
    pub fn len_chars(&self) -> usize {
        self.len_chars
    }

    /// True if nothing was accumulated.
    pub fn is_empty(&self) -> bool {
        self.len_chars == 0
    }

    /// Configured bound.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// True once steady-state mode is active.
    pub fn is_first_check_done(&self) -> bool {
        self.first_check_done
    }

    /// True if text arrived since the last check.
    pub fn has_unchecked(&self) -> bool {
        self.unchecked_chars > 0
    }

    /// Forget that any text is unchecked.
    pub fn mark_checked(&mut self) {
        self.unchecked_chars = 0;
    }

    /// Switch to steady-state mode. Only the first call has an effect.
    pub fn complete_first_check(&mut self) {
        if !self.first_check_done {
            self.first_check_done = true;
            self.trim();
        }
    }

    /// Drop the oldest characters until the bound holds.
    fn trim(&mut self) {
        if self.len_chars <= self.window_size {
            return;
        }
        let excess = self.len_chars - self.window_size;
        let cut = self
            .buffer
            .char_indices()
            .nth(excess)
            .map_or(self.buffer.len(), |(idx, _)| idx);
        self.buffer.drain(..cut);
        self.len_chars = self.window_size;
        self.unchecked_chars = self.unchecked_chars.min(self.len_chars);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_check_due_on_any_content() {
        let mut w = ContentWindow::new(50);
        assert!(!w.add_content(""));
        assert!(w.add_content("Hi"));
        assert!(!w.is_first_check_done());
    }

    #[test]
    fn test_first_check_mode_grows_past_bound() {
        let mut w = ContentWindow::new(4);
        assert!(w.add_content("abcdefgh"));
        assert_eq!(w.len_chars(), 8);

        w.complete_first_check();
        assert_eq!(w.text(), "efgh");
        assert_eq!(w.len_chars(), 4);
    }

    #[test]
    fn test_steady_state_due_only_when_full() {
        let mut w = ContentWindow::new(10);
        w.add_content("seed");
        w.complete_first_check();
        w.mark_checked();

        assert!(!w.add_content("abc"));
        assert!(w.add_content("xyz"));
        assert_eq!(w.len_chars(), 10);
        assert!(w.add_content("more"));
        assert_eq!(w.text(), "abcxyzmore");
    }

    #[test]
    fn test_bound_holds_after_every_mutation() {
        let mut w = ContentWindow::new(7);
        w.add_content("x");
        w.complete_first_check();
        for piece in ["ab", "cdefghij", "k", "", "lmnopqrstuvwxyz"] {
            w.add_content(piece);
            assert!(w.len_chars() <= 7);
            assert_eq!(w.text().chars().count(), w.len_chars());
        }
        assert_eq!(w.text(), "tuvwxyz");
    }

    #[test]
    fn test_trim_respects_char_boundaries() {
        let mut w = ContentWindow::new(3);
        w.add_content("违规内容测试");
        w.complete_first_check();
        assert_eq!(w.text(), "容测试");
    }

    #[test]
    fn test_unchecked_tracking() {
        let mut w = ContentWindow::new(10);
        assert!(!w.has_unchecked());
        w.add_content("abc");
        assert!(w.has_unchecked());
        w.mark_checked();
        assert!(!w.has_unchecked());
    }

    #[test]
    fn test_complete_first_check_is_idempotent() {
        let mut w = ContentWindow::new(2);
        w.add_content("abcd");
        w.complete_first_check();
        w.complete_first_check();
        assert_eq!(w.text(), "cd");
        assert!(w.is_first_check_done());
    }
}
