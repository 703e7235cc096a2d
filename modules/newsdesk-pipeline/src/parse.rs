//! Strict parsers for model output. Each parser matches one prompt in
//! `prompts`; a reply that does not fit the demanded format is a
//! `ParseError`, never a guess.

use std::collections::HashMap;

use newsdesk_common::{Destination, Entities, ParseError, WebsiteContent};

/// Selection from a ranking reply: 1-based indices, comma separated. Every
/// token must be a number inside the candidate range; anything else fails
/// the whole parse so the caller can leave the batch untouched.
pub fn selection(
    output: &str,
    candidate_count: usize,
    top_n: usize,
) -> Result<Vec<usize>, ParseError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ParseError::new("empty ranking reply"))?;

    let mut picked = Vec::new();
    for token in line.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let n: usize = token
            .parse()
            .map_err(|_| ParseError::new(format!("non-numeric ranking token: {token:?}")))?;
        if n == 0 || n > candidate_count {
            return Err(ParseError::new(format!(
                "ranking index {n} outside 1..={candidate_count}"
            )));
        }
        let index = n - 1;
        if !picked.contains(&index) {
            picked.push(index);
        }
    }
    if picked.is_empty() {
        return Err(ParseError::new("ranking reply selected nothing"));
    }
    picked.truncate(top_n);
    Ok(picked)
}

/// SUMMARY / REWRITTEN block pair.
pub fn summary_rewrite(output: &str) -> Result<(String, String), ParseError> {
    let summary = block_after(output, "SUMMARY:", Some("REWRITTEN:"))
        .ok_or_else(|| ParseError::new("missing SUMMARY block"))?;
    let rewritten = block_after(output, "REWRITTEN:", None)
        .ok_or_else(|| ParseError::new("missing REWRITTEN block"))?;
    Ok((summary, rewritten))
}

/// PEOPLE / ORGANIZATIONS / LOCATIONS lines. At least one prefix must be
/// present; an absent or 'none' line is an empty list.
pub fn entities(output: &str) -> Result<Entities, ParseError> {
    let people = csv_line(output, "PEOPLE:");
    let organizations = csv_line(output, "ORGANIZATIONS:");
    let locations = csv_line(output, "LOCATIONS:");
    if people.is_none() && organizations.is_none() && locations.is_none() {
        return Err(ParseError::new("no entity lines in reply"));
    }
    Ok(Entities {
        people: people.unwrap_or_default(),
        organizations: organizations.unwrap_or_default(),
        locations: locations.unwrap_or_default(),
    })
}

/// Comma separated hashtags, normalized to a leading '#', capped at 8.
pub fn hashtags(output: &str) -> Result<Vec<String>, ParseError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ParseError::new("empty hashtag reply"))?;

    let mut tags: Vec<String> = Vec::new();
    for raw in line.split([',', ' ']).map(str::trim) {
        let tag = raw.trim_start_matches('#');
        if tag.is_empty() {
            continue;
        }
        let normalized = format!("#{}", tag.replace(char::is_whitespace, ""));
        if !tags.contains(&normalized) {
            tags.push(normalized);
        }
    }
    if tags.is_empty() {
        return Err(ParseError::new("no hashtags in reply"));
    }
    tags.truncate(8);
    Ok(tags)
}

/// HEADLINE / SUMMARY / PARAGRAPH_n lines. Headline, summary and at least
/// one paragraph are required.
pub fn website(output: &str) -> Result<WebsiteContent, ParseError> {
    let headline = line_after(output, "HEADLINE:")
        .ok_or_else(|| ParseError::new("missing HEADLINE line"))?;
    let summary = line_after(output, "SUMMARY:")
        .ok_or_else(|| ParseError::new("missing website SUMMARY line"))?;
    let mut paragraphs = Vec::new();
    for n in 1..=3 {
        if let Some(p) = line_after(output, &format!("PARAGRAPH_{n}:")) {
            paragraphs.push(p);
        }
    }
    if paragraphs.is_empty() {
        return Err(ParseError::new("no PARAGRAPH lines in reply"));
    }
    Ok(WebsiteContent {
        headline,
        summary,
        paragraphs,
    })
}

/// One-liner replies (teasers, captions): trimmed, outer quotes stripped.
pub fn plain_text(output: &str) -> Result<String, ParseError> {
    let text = output
        .trim()
        .trim_matches('"')
        .trim_matches('\u{201C}')
        .trim_matches('\u{201D}')
        .trim()
        .to_string();
    if text.is_empty() {
        return Err(ParseError::new("empty text reply"));
    }
    Ok(text)
}

/// WEBSITE / TELEGRAM / INSTAGRAM prompt lines. Missing destinations are
/// simply absent; the caller falls back per destination.
pub fn image_prompts(output: &str) -> HashMap<Destination, String> {
    let mut prompts = HashMap::new();
    for dest in Destination::ALL {
        let prefix = format!("{}:", dest.as_str().to_uppercase());
        if let Some(p) = line_after(output, &prefix) {
            prompts.insert(dest, p);
        }
    }
    prompts
}

fn line_after(output: &str, prefix: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix(prefix))
        .map(|rest| rest.trim().to_string())
        .filter(|rest| !rest.is_empty())
}

fn csv_line(output: &str, prefix: &str) -> Option<Vec<String>> {
    let rest = line_after(output, prefix)?;
    if rest.eq_ignore_ascii_case("none") {
        return Some(Vec::new());
    }
    Some(
        rest.split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    )
}

/// Text between `start` and the next occurrence of `end` (or the end of the
/// reply), trimmed.
fn block_after(output: &str, start: &str, end: Option<&str>) -> Option<String> {
    let begin = output.find(start)? + start.len();
    let rest = &output[begin..];
    let until = end.and_then(|e| rest.find(e)).unwrap_or(rest.len());
    let text = rest[..until].trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_parses_comma_separated_numbers() {
        assert_eq!(selection("2, 4", 5, 3).unwrap(), vec![1, 3]);
        assert_eq!(selection("1", 5, 1).unwrap(), vec![0]);
    }

    #[test]
    fn selection_caps_at_top_n_and_dedups() {
        assert_eq!(selection("3, 3, 1, 2", 5, 2).unwrap(), vec![2, 0]);
    }

    #[test]
    fn selection_rejects_prose_out_of_range_and_empty() {
        assert!(selection("I would pick the first story", 5, 1).is_err());
        assert!(selection("6", 5, 1).is_err());
        assert!(selection("0", 5, 1).is_err());
        assert!(selection("", 5, 1).is_err());
        assert!(selection("1 and 2", 5, 2).is_err());
    }

    #[test]
    fn summary_rewrite_splits_blocks() {
        let reply = "SUMMARY:\nShort and sharp.\nStill the summary.\nREWRITTEN:\nThe new body.";
        let (summary, rewritten) = summary_rewrite(reply).unwrap();
        assert_eq!(summary, "Short and sharp.\nStill the summary.");
        assert_eq!(rewritten, "The new body.");
    }

    #[test]
    fn summary_rewrite_requires_both_blocks() {
        assert!(summary_rewrite("SUMMARY:\nOnly this.").is_err());
        assert!(summary_rewrite("Just prose.").is_err());
    }

    #[test]
    fn entities_handles_none_and_missing_lines() {
        let reply = "PEOPLE: Ada Lovelace, Alan Turing\nORGANIZATIONS: none\nLOCATIONS: London";
        let e = entities(reply).unwrap();
        assert_eq!(e.people, vec!["Ada Lovelace", "Alan Turing"]);
        assert!(e.organizations.is_empty());
        assert_eq!(e.locations, vec!["London"]);

        assert!(entities("nothing structured here").is_err());
    }

    #[test]
    fn hashtags_normalize_and_cap() {
        let tags = hashtags("#ai, ml, #ai, #rust news").unwrap();
        assert_eq!(tags, vec!["#ai", "#ml", "#rust", "#news"]);

        let many = hashtags("#a,#b,#c,#d,#e,#f,#g,#h,#i,#j").unwrap();
        assert_eq!(many.len(), 8);
    }

    #[test]
    fn website_requires_headline_summary_paragraph() {
        let reply = "HEADLINE: Big News\nSUMMARY: It happened.\nPARAGRAPH_1: First.\nPARAGRAPH_2: Second.";
        let w = website(reply).unwrap();
        assert_eq!(w.headline, "Big News");
        assert_eq!(w.paragraphs.len(), 2);

        assert!(website("HEADLINE: Big News\nSUMMARY: It happened.").is_err());
        assert!(website("PARAGRAPH_1: Orphan.").is_err());
    }

    #[test]
    fn plain_text_strips_quotes() {
        assert_eq!(plain_text("\"A teaser.\"\n").unwrap(), "A teaser.");
        assert!(plain_text("  \"\"  ").is_err());
    }

    #[test]
    fn image_prompts_missing_lines_are_absent() {
        let reply = "WEBSITE: wide shot\nINSTAGRAM: tall shot";
        let prompts = image_prompts(reply);
        assert_eq!(prompts[&Destination::Website], "wide shot");
        assert_eq!(prompts[&Destination::Instagram], "tall shot");
        assert!(!prompts.contains_key(&Destination::Telegram));
    }
}
