//! Crop and fertilizer recommendation prompts for farmers.

use std::sync::LazyLock;

use regex::Regex;

use crate::services::reply_parser::{Block, Span};

const LABELS_PATTERN: &str = r"Suitable Crop:|Fertilizer:|Additional Tips:";

static LABELS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(LABELS_PATTERN).expect("label pattern is valid"));

const FARMER_INSTRUCTIONS: &str = "Provide recommendations in simple language for farmers:
1. Start with the crop name that is suitable for the conditions.
2. Mention the exact fertilizer required.
3. Use simple sentences and direct instructions.
4. Include any other farming tips, but keep them in separate paragraphs.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    English,
    Hindi,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
        }
    }
}

/// Field conditions a recommendation is asked for. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CropQuery {
    pub soil_type: Option<String>,
    pub climate: Option<String>,
    pub crop: Option<String>,
    pub rainfall: Option<String>,
    pub temperature: Option<String>,
    pub language: Language,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl CropQuery {
    /// `Soil type: .., Climate: ..` followed by whichever optional fields are set
    pub fn conditions(&self) -> String {
        let mut query = format!(
            "Soil type: {}, Climate: {}",
            present(&self.soil_type).unwrap_or("unknown"),
            present(&self.climate).unwrap_or("unknown"),
        );

        let optional = [
            ("Crop", &self.crop),
            ("Rainfall", &self.rainfall),
            ("Temperature", &self.temperature),
        ];
        for (label, value) in optional {
            if let Some(value) = present(value) {
                query.push_str(&format!(", {label}: {value}"));
            }
        }

        query
    }
}

pub fn build_recommendation_prompt(query: &CropQuery) -> String {
    format!(
        "Provide recommendations based on the following inputs in {}: {}.\n{}",
        query.language.name(),
        query.conditions(),
        FARMER_INSTRUCTIONS
    )
}

/// Text following a bold label keeps one separating space
fn push_text(spans: &mut Vec<Span>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match spans.last() {
        Some(Span::Bold(_)) => spans.push(Span::Text(format!(" {text}"))),
        _ => spans.push(Span::Text(text.to_string())),
    }
}

/// Render a recommendation as display blocks.
///
/// `*` and `#` are dropped; each known label opens a new paragraph and is
/// shown in bold.
pub fn format_recommendation(text: &str) -> Vec<Block> {
    let cleaned: String = text.chars().filter(|c| *c != '*' && *c != '#').collect();
    let mut blocks = Vec::new();

    for line in cleaned.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut spans: Vec<Span> = Vec::new();
        let mut last = 0;

        for label in LABELS.find_iter(line) {
            push_text(&mut spans, &line[last..label.start()]);
            if !spans.is_empty() {
                blocks.push(Block::Paragraph(std::mem::take(&mut spans)));
            }
            spans.push(Span::Bold(label.as_str().to_string()));
            last = label.end();
        }

        push_text(&mut spans, &line[last..]);
        if !spans.is_empty() {
            blocks.push(Block::Paragraph(spans));
        }
    }

    blocks
}
