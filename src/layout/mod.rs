//! Greedy word wrapping against a caller-supplied width measurement.
//!
//! The engine knows nothing about fonts or pixels: callers pass a closure
//! that returns the rendered width of a candidate line, which keeps the
//! function pure and lets tests drive it with a fixed-advance measurer.

/// Lines produced by wrapping one block of text.
///
/// Empty input produces zero lines. Every line that exists is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutResult {
    lines: Vec<String>,
}

impl LayoutResult {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines joined with hard breaks, the form handed to the drawing primitive.
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Wrap `text` so that each line measures at most `max_width`.
///
/// Words are never split: a single word wider than `max_width` sits alone on
/// its own line and is allowed to overflow.
pub fn wrap<F>(text: &str, mut measure: F, max_width: f32) -> LayoutResult
where
    F: FnMut(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }

        let candidate = format!("{} {}", current, word);
        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    LayoutResult { lines }
}
