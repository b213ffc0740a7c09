//! Prompt construction for flowchart generation.

/// Fixed instructions sent ahead of every code snippet
pub const INSTRUCTIONS: &str = "\
You are a senior engineer who explains code with diagrams. Read the code below \
and produce ONE complete, self-contained HTML document that renders an \
interactive flowchart of its control flow.

Requirements:
- Start with <!DOCTYPE html> and end with </html>. Output nothing before or after the document.
- Load Mermaid from https://cdn.jsdelivr.net/npm/mermaid@11/dist/mermaid.min.js and call mermaid.initialize({ startOnLoad: true, theme: 'dark' }).
- Put the diagram in a single <pre class=\"mermaid\"> block using `flowchart TD` syntax.
- One node per meaningful step: entry points, decisions (diamond nodes), loops, calls, returns and error paths.
- Label decision edges with the condition (Yes/No, true/false, or the matched case).
- Quote any node label that contains punctuation; never use raw parentheses or brackets inside labels.
- Add a title with the function or file name and a short one-paragraph summary above the diagram.
- Add zoom in, zoom out and reset buttons that scale the rendered SVG, and allow panning by dragging.
- Style: dark background (#0f172a), light text, rounded nodes, responsive layout, no external CSS frameworks.
- Do not include markdown, code fences or commentary.";

/// Build the full prompt for one snippet.
///
/// The code is embedded verbatim between markers so the model can tell it
/// apart from the instructions.
pub fn build_prompt(code: &str) -> String {
    let mut out = String::with_capacity(INSTRUCTIONS.len() + code.len() + 64);
    out.push_str(INSTRUCTIONS);
    out.push_str("\n\nCODE START\n");
    out.push_str(code);
    if !code.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("CODE END\n");
    out
}
