/*!
 * Prompt templates for batch translation and summaries.
 *
 * Batch prompts carry the items as a JSON array and demand a bare JSON array
 * back. Summary prompts describe a fixed Markdown layout that ends with a
 * literal end marker so truncation can be detected.
 */

use serde::Serialize;

use crate::translation::batch::BatchItem;

/// Literal marker that closes a complete summary
pub const END_MARKER: &str = "<!-- END -->";

/// Prompt template with `{placeholder}` variables.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Instructions for translating one batch of subtitle items.
    pub const BATCH_TRANSLATOR: &'static str = r#"You are a professional subtitle translator. Translate the "text" of every item below into {target_language}.

## Rules
1. Return exactly {count} items, one for every input item, with the same "id" values.
2. Never merge or split items, even when a sentence continues into the next id.
3. Keep line breaks inside an item's text exactly where they are.
4. An item with empty text must come back with empty text.
5. Answer with a bare JSON array of objects shaped like {"id": 0, "text": "..."}. No prose, no explanations, no code fences.

## Items
{items}"#;

    /// Directive appended when a previous answer could not be used.
    pub const STRICT_SUFFIX: &'static str = r#"

IMPORTANT: your previous answer was not valid. Output JSON only. The reply must start with "[" and end with "]", contain exactly {count} objects and escape every double quote inside text values."#;

    /// Instructions for a long-form Markdown summary.
    pub const SUMMARY: &'static str = r#"You write "Too Long To Watch" summaries of videos from their subtitles. Write the summary in {language}.

Use exactly this Markdown layout, in this order:

# <a short descriptive title>
*Tags: <3 to 8 comma-separated topics>*

## Key Points
Between {min_points} and {max_points} bullet points with the main ideas.

## Actions or Next Steps
Only include this section when the video recommends concrete actions.

## Summary
Chronological lines in the form `HH:MM:SS description`, one per line, without bullet markers, covering the whole video.

Finish the document with the line {end_marker} and nothing after it.

## Subtitles
{subtitles}"#;

    /// Directive for continuing a truncated summary.
    pub const CONTINUATION: &'static str = r#"

## Continuation
Your previous answer was cut off. It ended with:
"""
{anchor}
"""
Continue from exactly that point. Do not repeat anything that was already written and keep the same layout. End with {end_marker}."#;

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Replace one placeholder.
    pub fn set(mut self, name: &str, value: &str) -> Self {
        self.template = self.template.replace(&format!("{{{}}}", name), value);
        self
    }

    /// Finished prompt text.
    pub fn render(self) -> String {
        self.template
    }
}

/// Wire form of one batch item inside the prompt.
#[derive(Debug, Clone, Serialize)]
struct PromptItem<'a> {
    id: u64,
    text: &'a str,
}

/// Build the prompt for one batch.
///
/// `strict` appends the JSON-only directive used after a failed answer.
pub fn batch_translation_prompt(items: &[BatchItem], target_language: &str, strict: bool) -> String {
    let wire: Vec<PromptItem> = items.iter().map(|i| PromptItem { id: i.id, text: &i.text }).collect();
    let json = serde_json::to_string_pretty(&wire).unwrap_or_else(|_| "[]".to_string());
    let count = items.len().to_string();

    let mut prompt = PromptTemplate::new(PromptTemplate::BATCH_TRANSLATOR)
        .set("target_language", target_language)
        .set("count", &count)
        .set("items", &json)
        .render();

    if strict {
        prompt.push_str(&PromptTemplate::new(PromptTemplate::STRICT_SUFFIX).set("count", &count).render());
    }
    prompt
}

/// Build the first-round summary prompt.
pub fn summary_prompt(subtitles: &str, language: &str, bullet_range: (usize, usize)) -> String {
    PromptTemplate::new(PromptTemplate::SUMMARY)
        .set("language", language)
        .set("min_points", &bullet_range.0.to_string())
        .set("max_points", &bullet_range.1.to_string())
        .set("end_marker", END_MARKER)
        .set("subtitles", subtitles)
        .render()
}

/// Build a continuation prompt from the original instructions and the output tail.
pub fn continuation_prompt(base_prompt: &str, anchor: &str) -> String {
    let mut prompt = base_prompt.to_string();
    prompt.push_str(
        &PromptTemplate::new(PromptTemplate::CONTINUATION)
            .set("anchor", anchor)
            .set("end_marker", END_MARKER)
            .render(),
    );
    prompt
}
