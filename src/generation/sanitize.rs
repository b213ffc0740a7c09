//! Strip markdown code fences from model output.

const FENCE: &str = "```";

/// Remove a leading fence line (with optional language tag) and a trailing
/// fence, then trim. Text without fences is only trimmed.
///
/// Whatever follows the opening fence on its line counts as a language tag
/// only if it is a single word; otherwise it is kept as content.
pub fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix(FENCE) {
        let (line, body) = match rest.find('\n') {
            Some(end) => (&rest[..end], &rest[end + 1..]),
            None => (rest, ""),
        };
        text = if is_language_tag(line.trim_end_matches('\r').trim_matches([' ', '\t'])) {
            body
        } else {
            rest
        };
    }

    text = text.trim_end();
    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest;
    }

    text.trim().to_string()
}

fn is_language_tag(tag: &str) -> bool {
    tag.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '_' | '.'))
}
