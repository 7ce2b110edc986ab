//! Line-based diffing between note snapshots.
//!
//! The output is meant to be read by a language model, not applied by a
//! patch tool: lines are compared index-by-index, so inserting a line near
//! the top of a note shows every following line as changed. Reordered lines
//! come out as removal/addition pairs.

/// Lines of unchanged context kept around each change.
pub const CONTEXT_LINES: usize = 2;

const ADDED_PREFIX: &str = "+ ";
const REMOVED_PREFIX: &str = "- ";
const CONTEXT_PREFIX: &str = "  ";

/// One parsed line of serialized diff text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Added(&'a str),
    Removed(&'a str),
    Context(&'a str),
}

impl<'a> DiffLine<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        if let Some(rest) = line.strip_prefix(ADDED_PREFIX) {
            Some(Self::Added(rest))
        } else if let Some(rest) = line.strip_prefix(REMOVED_PREFIX) {
            Some(Self::Removed(rest))
        } else {
            line.strip_prefix(CONTEXT_PREFIX).map(Self::Context)
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Context(_))
    }
}

struct DiffWriter<'a> {
    old: Vec<&'a str>,
    new: Vec<&'a str>,
    context: usize,
    out: Vec<String>,
    /// Highest line index already written, so context never repeats.
    last_written: Option<usize>,
}

impl<'a> DiffWriter<'a> {
    fn unchanged(&self, index: usize) -> bool {
        matches!(
            (self.old.get(index), self.new.get(index)),
            (Some(old), Some(new)) if old == new
        )
    }

    fn already_written(&self, index: usize) -> bool {
        self.last_written.is_some_and(|last| index <= last)
    }

    fn context_before(&mut self, index: usize) {
        for j in index.saturating_sub(self.context)..index {
            if !self.already_written(j) && self.unchanged(j) {
                self.out.push(format!("{CONTEXT_PREFIX}{}", self.new[j]));
                self.last_written = Some(j);
            }
        }
    }

    fn context_after(&mut self, index: usize) {
        for j in index + 1..=index + self.context {
            if !self.unchanged(j) {
                break;
            }
            self.out.push(format!("{CONTEXT_PREFIX}{}", self.new[j]));
            self.last_written = Some(j);
        }
    }

    fn run(mut self) -> Vec<String> {
        let len = self.old.len().max(self.new.len());
        for i in 0..len {
            match (self.old.get(i).copied(), self.new.get(i).copied()) {
                (None, Some(added)) => {
                    self.context_before(i);
                    self.out.push(format!("{ADDED_PREFIX}{added}"));
                    self.last_written = Some(i);
                    self.context_after(i);
                }
                (Some(removed), None) => {
                    self.out.push(format!("{REMOVED_PREFIX}{removed}"));
                    self.last_written = Some(i);
                }
                (Some(old), Some(new)) if old != new => {
                    self.context_before(i);
                    self.out.push(format!("{REMOVED_PREFIX}{old}"));
                    self.out.push(format!("{ADDED_PREFIX}{new}"));
                    self.last_written = Some(i);
                    self.context_after(i);
                }
                _ => {}
            }
        }
        self.out
    }
}

/// Diff two texts line by line. Returns `None` when they are identical.
pub fn compute_diff(old_text: &str, new_text: &str) -> Option<String> {
    compute_diff_with_context(old_text, new_text, CONTEXT_LINES)
}

pub fn compute_diff_with_context(old_text: &str, new_text: &str, context: usize) -> Option<String> {
    if old_text == new_text {
        return None;
    }

    let lines = DiffWriter {
        old: old_text.split('\n').collect(),
        new: new_text.split('\n').collect(),
        context,
        out: Vec::new(),
        last_written: None,
    }
    .run();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Replay a diff against `base`.
///
/// Context and removed lines are located by searching forward from the
/// cursor; added lines are inserted at the cursor. Lines that cannot be
/// located are skipped. Not a guaranteed inverse of [`compute_diff`].
pub fn apply_diff(base: &str, diff_text: &str) -> String {
    let mut result: Vec<String> = base.split('\n').map(str::to_string).collect();
    let mut cursor = 0usize;

    for line in diff_text.split('\n') {
        match DiffLine::parse(line) {
            Some(DiffLine::Context(text)) => {
                if let Some(pos) = find_from(&result, cursor, text) {
                    cursor = pos + 1;
                }
            }
            Some(DiffLine::Removed(text)) => {
                if let Some(pos) = find_from(&result, cursor, text) {
                    result.remove(pos);
                    cursor = pos;
                }
            }
            Some(DiffLine::Added(text)) => {
                let at = cursor.min(result.len());
                result.insert(at, text.to_string());
                cursor = at + 1;
            }
            None => {}
        }
    }

    result.join("\n")
}

fn find_from(lines: &[String], start: usize, needle: &str) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, line)| line.as_str() == needle)
        .map(|(pos, _)| pos)
}

/// Counts of what a diff touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub sections: usize,
    pub added: usize,
    pub removed: usize,
}

pub fn diff_stats(diff_text: &str) -> DiffStats {
    let mut stats = DiffStats::default();
    let mut in_section = false;

    for line in diff_text.split('\n') {
        match DiffLine::parse(line) {
            Some(change) if change.is_change() => {
                if matches!(change, DiffLine::Added(_)) {
                    stats.added += 1;
                } else {
                    stats.removed += 1;
                }
                if !in_section {
                    stats.sections += 1;
                    in_section = true;
                }
            }
            _ => in_section = false,
        }
    }

    stats
}

/// One-line human readable description of a diff.
pub fn summarize_diff(diff_text: &str) -> String {
    if diff_text.is_empty() {
        return "No changes".to_string();
    }

    let stats = diff_stats(diff_text);
    format!(
        "{} section(s) modified with {} addition(s) and {} removal(s)",
        stats.sections, stats.added, stats.removed
    )
}
