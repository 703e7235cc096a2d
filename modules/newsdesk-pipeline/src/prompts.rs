//! Prompt text for every completion call the pipeline makes. Output formats
//! here are load-bearing: the strict parsers in `parse` expect exactly what
//! these prompts demand.

use newsdesk_common::{Article, Destination};

pub const EDITOR_SYSTEM: &str =
    "You are a wire-service news editor. Follow the requested output format exactly, \
     with no preamble and no commentary.";

pub fn ranking(candidates: &[&Article], top_n: usize) -> String {
    let mut lines = String::new();
    for (i, article) in candidates.iter().enumerate() {
        lines.push_str(&format!(
            "{}. {} - {}\n",
            i + 1,
            article.title,
            article.description
        ));
    }
    format!(
        "Here are today's candidate stories:\n\n{lines}\n\
         Pick the {top_n} most newsworthy. Reply with only their numbers, \
         comma separated, on a single line."
    )
}

pub fn summarize_and_rewrite(title: &str, content: &str) -> String {
    format!(
        "Title: {title}\n\nArticle:\n{content}\n\n\
         Write a two-sentence summary, then rewrite the article in clear neutral prose.\n\
         Output format:\n\
         SUMMARY:\n<summary>\n\
         REWRITTEN:\n<rewritten article>"
    )
}

pub fn extract_entities(content: &str) -> String {
    format!(
        "List the named entities in this article.\n\n{content}\n\n\
         Output format, one line each, comma separated values, 'none' when empty:\n\
         PEOPLE: ...\nORGANIZATIONS: ...\nLOCATIONS: ..."
    )
}

pub fn hashtags(title: &str, summary: &str) -> String {
    format!(
        "Title: {title}\nSummary: {summary}\n\n\
         Suggest up to 8 social hashtags for this story. \
         Reply with only the hashtags, comma separated, on a single line."
    )
}

pub fn website(title: &str, content: &str) -> String {
    format!(
        "Title: {title}\n\nArticle:\n{content}\n\n\
         Produce the website rendition.\n\
         Output format:\n\
         HEADLINE: <headline>\n\
         SUMMARY: <one-sentence standfirst>\n\
         PARAGRAPH_1: <paragraph>\n\
         PARAGRAPH_2: <paragraph>\n\
         PARAGRAPH_3: <paragraph>"
    )
}

pub fn telegram_teaser(title: &str, summary: &str) -> String {
    format!(
        "Title: {title}\nSummary: {summary}\n\n\
         Write a two-sentence teaser for a Telegram news channel. \
         Plain text only, no hashtags, no links."
    )
}

pub fn instagram_caption(title: &str, summary: &str) -> String {
    format!(
        "Title: {title}\nSummary: {summary}\n\n\
         Write an Instagram caption for this story, under 300 characters, \
         engaging but factual. Plain text only, no hashtags."
    )
}

pub fn image_prompts(headline: &str, summary: &str) -> String {
    format!(
        "Story: {headline}\n{summary}\n\n\
         Write one photorealistic image generation prompt per platform. \
         No text or lettering in the images.\n\
         Output format, one line each:\n\
         WEBSITE: <prompt>\n\
         TELEGRAM: <prompt>\n\
         INSTAGRAM: <prompt>"
    )
}

/// Used when the prompt completion cannot be parsed; imagery still ships.
pub fn fallback_image_prompt(headline: &str, dest: Destination) -> String {
    let framing = match dest {
        Destination::Website => "wide editorial news photograph",
        Destination::Telegram => "square news thumbnail photograph",
        Destination::Instagram => "vertical editorial photograph",
    };
    format!("{framing} illustrating: {headline}, photorealistic, no text")
}
