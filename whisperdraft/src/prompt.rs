//! Prompt template for diff responses.

use chrono::TimeZone;
use shared_types::DiffRecord;

/// Characters of note content included in the prompt.
pub const CONTENT_PREVIEW_CHARS: usize = 1500;
/// Earlier queued diffs sent along with the newest one.
pub const DIFF_HISTORY: usize = 3;

const INSTRUCTIONS: &str = "Please provide a thoughtful, quiet response to these changes. Be attentive and present, but not intrusive.
Offer gentle suggestions, reflections, or questions that might help the writer.
Keep your response brief and supportive.";

/// Note content cut to `CONTENT_PREVIEW_CHARS`, with `...` when cut.
pub fn content_preview(content: &str) -> String {
    match content.char_indices().nth(CONTENT_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}

/// Wall-clock label for a diff timestamp.
pub fn change_time(timestamp_ms: i64) -> String {
    match chrono::Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(time) => time.format("%H:%M:%S").to_string(),
        None => timestamp_ms.to_string(),
    }
}

/// Content block, then one timestamped entry per diff, then instructions.
pub fn build_diff_prompt(diffs: &[DiffRecord], current_content: &str) -> String {
    let mut prompt = format!(
        "The user is writing a document. Here's the current content:\n---\n{}\n---\n\nRecent changes:\n",
        content_preview(current_content)
    );

    for diff in diffs {
        prompt.push_str(&format!(
            "\n[Change at {}]:\n{}\n",
            change_time(diff.timestamp),
            diff.changes
        ));
    }

    prompt.push('\n');
    prompt.push_str(INSTRUCTIONS);
    prompt
}
