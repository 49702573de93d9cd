//! Prompts sent to the vision model.
//!
//! Every prompt lives here so the wording can change without touching the
//! retry or classification logic. The classifier relies on the model answering
//! with a leading "Yes"/"No"; see [`crate::pipeline::classify::is_affirmative`].

/// Transcription rules shared by every page.
const TRANSCRIBE_RULES: &str = r#"Transcribe the text content from the provided page image and output it in Markdown syntax (not code blocks). Follow these steps:

1. Examine the page carefully.

2. Identify all elements present on the page: headers, body text, footnotes, tables, visualizations, captions and page numbers.

3. Use Markdown syntax to format the output:
   - Headings: #, ##, ###
   - Lists: - or * for unordered, 1. 2. 3. for ordered
   - Repeat a list marker for every item.

4. If the element is a visualization:
   - Provide a detailed description in natural language.
   - Do not transcribe text inside the visualization after describing it.

5. If the element is a table or a table of contents:
   - Create a Markdown table, ensuring every row has the same number of columns.
   - Keep the table's layout and do not split it into multiple tables.
   - If a merged cell spans several rows or columns, put the text in the top-left cell and ' ' in the others.
   - Put sub-headers in their own row, separate from the header row.

6. If the element is a paragraph:
   - Transcribe each text element verbatim, without skipping any word.

7. If the element is a header, footer, footnote or page number:
   - Transcribe each text element verbatim, without skipping any word.

Output only the transcription, with no explanation or commentary."#;

/// Build the transcription prompt, optionally carrying the previous page's text.
///
/// The carry-over is only supplied when a table straddles the page boundary,
/// so the model can continue the table instead of starting a new one.
pub fn transcribe_prompt(previous_text: Option<&str>) -> String {
    match previous_text {
        Some(prev) if !prev.is_empty() => format!(
            "{TRANSCRIBE_RULES}\n\nHere is the text from the previous page, for reference when continuing any incomplete element (for example a table or paragraph):\n\n<previous_page>\n{prev}\n</previous_page>"
        ),
        _ => TRANSCRIBE_RULES.to_string(),
    }
}

/// Does the page end with a table (ignoring any footer)?
pub const TRAILING_TABLE_PROMPT: &str = "Check the last visible content on this page and confirm whether the last element (before any page footer) is a table. Answer 'Yes' if it is, 'No' otherwise.";

/// Does the page start with a table (ignoring any header)?
pub const LEADING_TABLE_PROMPT: &str = "Check the first visible content on this page and confirm whether the first element (after any page header) is a table. Answer 'Yes' if it is, 'No' otherwise.";

/// Build the summary prompt for a finished media transcription.
pub fn insights_prompt(transcript: &str, labels_json: &str) -> String {
    format!(
        "You are given the transcript of a video and the labels detected in its frames.\n\
Write a concise summary of what the video is about, combining what is said with what is shown. \
Mention the main topics, people or objects, and any notable events.\n\n\
<transcript>\n{transcript}\n</transcript>\n\n<video_labels>\n{labels_json}\n</video_labels>"
    )
}
