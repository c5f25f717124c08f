#[cfg(test)]
mod tests;

use fancy_regex::Regex;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use std::sync::LazyLock;

static HTML_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<]+?>").expect("valid regex"));

static BLANK_LINES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").expect("valid regex"));

/// Convert markdown to plain text.
///
/// Block elements are separated by a blank line so paragraph boundaries
/// survive for chunking. Inline markup keeps only its text, HTML tags are
/// dropped and YAML front matter is skipped.
#[inline]
pub fn strip_markdown(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS;

    let mut text = String::new();
    let mut in_metadata = false;
    // Lines of the HTML block being read; tags may span several of them
    let mut html_block: Option<String> = None;

    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(Tag::MetadataBlock(_)) => in_metadata = true,
            Event::End(TagEnd::MetadataBlock(_)) => in_metadata = false,
            _ if in_metadata => {}
            Event::Start(Tag::List(_)) => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Event::Text(content)
            | Event::Code(content)
            | Event::InlineMath(content)
            | Event::DisplayMath(content) => text.push_str(&content),
            Event::Start(Tag::HtmlBlock) => html_block = Some(String::new()),
            Event::Html(html) | Event::InlineHtml(html) => match html_block.as_mut() {
                Some(block) => block.push_str(&html),
                None => text.push_str(&HTML_TAG_REGEX.replace_all(&html, "")),
            },
            Event::End(TagEnd::HtmlBlock) => {
                if let Some(block) = html_block.take() {
                    text.push_str(&HTML_TAG_REGEX.replace_all(&block, ""));
                }
                end_block(&mut text);
            }
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::Rule => end_block(&mut text),
            Event::End(TagEnd::Item | TagEnd::TableHead | TagEnd::TableRow) => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Event::End(TagEnd::TableCell) => text.push(' '),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::BlockQuote(_)
                | TagEnd::CodeBlock
                | TagEnd::List(_)
                | TagEnd::Table
                | TagEnd::FootnoteDefinition,
            ) => end_block(&mut text),
            _ => {}
        }
    }

    BLANK_LINES_REGEX
        .replace_all(&text, "\n\n")
        .trim()
        .to_string()
}

/// Terminate the current block with a blank line
fn end_block(text: &mut String) {
    let trimmed_len = text.trim_end_matches([' ', '\t', '\n']).len();
    text.truncate(trimmed_len);
    if !text.is_empty() {
        text.push_str("\n\n");
    }
}
