//! Terminal rendering for conversations, replies and notices.

use std::io::{Write, stdout};

use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use gemchat_core::attachments::ImageAttachment;
use gemchat_core::models::{Conversation, Message, Notice, NoticeLevel, Sender};
use gemchat_core::services::{Block, Span, parse_reply};

const USER_COLOR: Color = Color::Green;
const ASSISTANT_COLOR: Color = Color::Cyan;
const DIM_COLOR: Color = Color::DarkGrey;

fn sender_label(sender: Sender) -> (&'static str, Color) {
    match sender {
        Sender::User => ("You", USER_COLOR),
        Sender::Assistant => ("Gemini", ASSISTANT_COLOR),
    }
}

fn queue_spans(out: &mut impl Write, spans: &[Span]) -> std::io::Result<()> {
    for span in spans {
        match span {
            Span::Text(text) => queue!(out, Print(text))?,
            Span::Bold(text) => queue!(
                out,
                SetAttribute(Attribute::Bold),
                Print(text),
                SetAttribute(Attribute::NormalIntensity)
            )?,
        }
    }
    Ok(())
}

/// Print a display tree, one line per block
pub fn print_blocks(blocks: &[Block]) -> std::io::Result<()> {
    let mut out = stdout();

    for block in blocks {
        match block {
            Block::Heading { spans, .. } => {
                queue!(out, SetAttribute(Attribute::Bold), SetAttribute(Attribute::Underlined))?;
                queue_spans(&mut out, spans)?;
                queue!(out, SetAttribute(Attribute::Reset))?;
            }
            Block::ListItem(spans) => {
                queue!(out, Print("  • "))?;
                queue_spans(&mut out, spans)?;
            }
            Block::Paragraph(spans) => queue_spans(&mut out, spans)?,
        }
        queue!(out, Print("\n"))?;
    }

    out.flush()
}

/// Print the coloured `You:` / `Gemini:` prefix without a newline
pub fn print_label(sender: Sender) -> std::io::Result<()> {
    let (label, color) = sender_label(sender);
    let mut out = stdout();
    queue!(
        out,
        SetForegroundColor(color),
        SetAttribute(Attribute::Bold),
        Print(format!("{label}: ")),
        SetAttribute(Attribute::Reset),
        ResetColor
    )?;
    out.flush()
}

/// Append revealed characters to the current line
pub fn print_partial(text: &str) -> std::io::Result<()> {
    let mut out = stdout();
    queue!(out, Print(text))?;
    out.flush()
}

pub fn print_message(message: &Message) -> std::io::Result<()> {
    print_label(message.sender)?;

    if let Some(uri) = &message.image {
        match ImageAttachment::from_data_uri(uri) {
            Ok(image) => print_dim(&format!("[{}, {} bytes] ", image.mime_type, image.data.len()))?,
            Err(_) => print_dim("[image] ")?,
        }
    }

    match message.sender {
        Sender::User => {
            println!("{}", message.text);
            Ok(())
        }
        Sender::Assistant => {
            println!();
            print_blocks(&parse_reply(&message.text))
        }
    }
}

pub fn print_conversation(conversation: &Conversation) -> std::io::Result<()> {
    let mut out = stdout();
    queue!(
        out,
        SetAttribute(Attribute::Bold),
        Print(format!("── {} ──\n", conversation.title())),
        SetAttribute(Attribute::Reset)
    )?;
    out.flush()?;

    for message in conversation.messages() {
        print_message(message)?;
    }
    Ok(())
}

/// Numbered list of conversations, newest first, active one marked
pub fn print_conversation_list(
    conversations: &[Conversation],
    active_id: Option<&str>,
) -> std::io::Result<()> {
    let mut out = stdout();

    for (index, conversation) in conversations.iter().enumerate() {
        let marker = if Some(conversation.id()) == active_id { "*" } else { " " };
        queue!(
            out,
            Print(format!("{marker} {:>2}. ", index + 1)),
            SetAttribute(Attribute::Bold),
            Print(conversation.title()),
            SetAttribute(Attribute::Reset),
            SetForegroundColor(DIM_COLOR),
            Print(format!(
                "  ({}, {} messages)\n",
                conversation.id(),
                conversation.message_count()
            )),
            ResetColor
        )?;
    }

    out.flush()
}

pub fn print_dim(text: &str) -> std::io::Result<()> {
    let mut out = stdout();
    queue!(out, SetForegroundColor(DIM_COLOR), Print(text), ResetColor)?;
    out.flush()
}

pub fn print_info(text: &str) -> std::io::Result<()> {
    print_dim(text)?;
    println!();
    Ok(())
}

/// Notices go to stderr so piped output stays clean
pub fn print_notices(notices: &[Notice]) -> std::io::Result<()> {
    let mut err = std::io::stderr();

    for notice in notices {
        let (label, color) = match notice.level {
            NoticeLevel::Warning => ("warning", Color::Yellow),
            NoticeLevel::Error => ("error", Color::Red),
        };
        queue!(
            err,
            SetForegroundColor(color),
            Print(format!("{label}: ")),
            ResetColor,
            Print(format!("{}\n", notice.message))
        )?;
    }

    err.flush()
}
