//! Turns model output into a display tree.
//!
//! Replies are never interpreted as markup: every piece of text ends up in a
//! plain `String` inside a [`Span`], so a front end renders them verbatim.
//! Supported structure is deliberately small: `#` headings, `*`/`-` list
//! items, paragraphs (one per non-blank line) and `**bold**` spans.

use std::sync::LazyLock;

use regex::Regex;

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold pattern is valid"));

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("heading pattern is valid"));

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[*-]\s+(.*)$").expect("list item pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Bold(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Span> },
    ListItem(Vec<Span>),
    Paragraph(Vec<Span>),
}

/// Split a line into text and bold spans
pub fn parse_spans(line: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in BOLD.captures_iter(line) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            spans.push(Span::Text(line[last..whole.start()].to_string()));
        }
        spans.push(Span::Bold(inner.as_str().to_string()));
        last = whole.end();
    }

    if last < line.len() {
        spans.push(Span::Text(line[last..].to_string()));
    }

    spans
}

/// Parse a full reply into blocks, one per non-blank line
pub fn parse_reply(text: &str) -> Vec<Block> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let trimmed = line.trim_start();
            if let Some(caps) = HEADING.captures(trimmed) {
                Block::Heading {
                    level: caps[1].len() as u8,
                    spans: parse_spans(&caps[2]),
                }
            } else if let Some(caps) = LIST_ITEM.captures(trimmed) {
                Block::ListItem(parse_spans(&caps[1]))
            } else {
                Block::Paragraph(parse_spans(line))
            }
        })
        .collect()
}

/// Flatten spans back into plain text (no emphasis markers)
pub fn spans_text(spans: &[Span]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Span::Text(t) | Span::Bold(t) => t.as_str(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_spans() {
        assert_eq!(
            parse_spans("Use **urea** and **compost** now"),
            vec![
                Span::Text("Use ".to_string()),
                Span::Bold("urea".to_string()),
                Span::Text(" and ".to_string()),
                Span::Bold("compost".to_string()),
                Span::Text(" now".to_string()),
            ]
        );
    }

    #[test]
    fn test_unbalanced_markers_stay_text() {
        assert_eq!(
            parse_spans("2 * 3 is **not closed"),
            vec![Span::Text("2 * 3 is **not closed".to_string())]
        );
    }

    #[test]
    fn test_blocks() {
        let reply = "## Suitable Crop\nRice grows **well** here.\n\n* Water daily\n- Weed weekly\n";

        assert_eq!(
            parse_reply(reply),
            vec![
                Block::Heading {
                    level: 2,
                    spans: vec![Span::Text("Suitable Crop".to_string())],
                },
                Block::Paragraph(vec![
                    Span::Text("Rice grows ".to_string()),
                    Span::Bold("well".to_string()),
                    Span::Text(" here.".to_string()),
                ]),
                Block::ListItem(vec![Span::Text("Water daily".to_string())]),
                Block::ListItem(vec![Span::Text("Weed weekly".to_string())]),
            ]
        );
    }

    #[test]
    fn test_markup_is_kept_verbatim() {
        let blocks = parse_reply("<script>alert(1)</script>");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![Span::Text(
                "<script>alert(1)</script>".to_string()
            )])]
        );
    }

    #[test]
    fn test_bold_only_line_is_paragraph_not_list() {
        let blocks = parse_reply("**Fertilizer:** NPK 10-26-26");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![
                Span::Bold("Fertilizer:".to_string()),
                Span::Text(" NPK 10-26-26".to_string()),
            ])]
        );
        assert_eq!(spans_text(&parse_spans("**a** b")), "a b");
    }
}
