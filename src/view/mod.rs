//! Terminal rendering of store state. Everything here is a pure function of
//! its inputs; printing is left to `commands`.

use crate::db::models::{Chat, IndexedDocument, Message, Sender, Theme};
use crate::store::SendRequest;
use colored::{ColoredString, Colorize};
use std::path::PathBuf;

/// Share of the terminal width a bubble may take.
const BUBBLE_RATIO: f32 = 0.75;

fn paint_user(text: &str, theme: Theme) -> ColoredString {
    match theme {
        Theme::Light => text.blue(),
        Theme::Dark => text.bright_cyan(),
    }
}

fn paint_bot(text: &str, theme: Theme) -> ColoredString {
    match theme {
        Theme::Light => text.normal(),
        Theme::Dark => text.bright_white(),
    }
}

/// Word-wraps `text` to `width` columns, keeping explicit line breaks.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let mut line = String::new();
        for word in raw.split(' ') {
            let mut word = word.to_string();
            // Words longer than a line are hard-split.
            while word.chars().count() > width {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let head: String = word.chars().take(width).collect();
                word = word.chars().skip(width).collect();
                lines.push(head);
            }
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > width && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        lines.push(line);
    }
    lines
}

#[derive(Debug, Clone)]
pub struct Sidebar {
    pub open: bool,
}

impl Default for Sidebar {
    fn default() -> Self {
        Self { open: true }
    }
}

impl Sidebar {
    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn render(&self, chats: &[Chat], active_id: &str) -> String {
        if chats.is_empty() {
            return if self.open {
                "No chats yet".dimmed().to_string()
            } else {
                String::new()
            };
        }
        if !self.open {
            return chats
                .iter()
                .map(|c| if c.id == active_id { "[💬]" } else { " 💬 " })
                .collect::<Vec<_>>()
                .join("");
        }
        chats
            .iter()
            .enumerate()
            .map(|(i, chat)| {
                let label = format!("{:>2}. {}", i + 1, chat.title);
                if chat.id == active_id {
                    format!("▸ {}", label.bold())
                } else {
                    format!("  {}", label)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Renders one message as a bubble: user messages right-aligned, bot messages left.
pub fn render_message(message: &Message, width: usize, theme: Theme) -> Vec<String> {
    let bubble_width = ((width as f32) * BUBBLE_RATIO) as usize;
    let text = if message.text.is_empty() && message.sender == Sender::Bot {
        "…"
    } else {
        message.text.as_str()
    };
    let mut body = wrap(text, bubble_width.saturating_sub(2));
    if let Some(file) = &message.file {
        body.insert(0, format!("📎 {}", file));
    }

    body.into_iter()
        .map(|line| match message.sender {
            Sender::User => {
                let pad = width.saturating_sub(line.chars().count() + 2);
                format!("{}{} │", " ".repeat(pad), paint_user(&line, theme))
            }
            Sender::Bot => format!("│ {}", paint_bot(&line, theme)),
        })
        .collect()
}

/// Renders the tail of the transcript that fits in `height` lines.
pub fn render_transcript(messages: &[Message], height: usize, width: usize, theme: Theme) -> String {
    if messages.is_empty() {
        return "Ask something...".dimmed().to_string();
    }
    let mut lines = Vec::new();
    for (i, message) in messages.iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.extend(render_message(message, width, theme));
    }
    let skip = lines.len().saturating_sub(height);
    lines[skip..].join("\n")
}

pub fn render_documents(documents: &[IndexedDocument], active: Option<&str>) -> String {
    if documents.is_empty() {
        return "No PDFs indexed yet.".to_string();
    }
    documents
        .iter()
        .map(|doc| {
            let marker = if Some(doc.filename.as_str()) == active { "*" } else { " " };
            format!("{} {} ({} pages)", marker, doc.filename, doc.page_count)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pending input: question text and an optional staged file.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    pub text: String,
    pub attachment: Option<PathBuf>,
}

impl Composer {
    pub fn can_send(&self) -> bool {
        !self.text.trim().is_empty() || self.attachment.is_some()
    }

    pub fn attach(&mut self, path: PathBuf) {
        self.attachment = Some(path);
    }

    pub fn detach(&mut self) -> Option<PathBuf> {
        self.attachment.take()
    }

    /// Empties the composer into a request, or `None` if there is nothing to send.
    pub fn take(&mut self) -> Option<SendRequest> {
        if !self.can_send() {
            return None;
        }
        Some(SendRequest {
            text: std::mem::take(&mut self.text),
            file: self.attachment.take(),
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("API key cannot be empty.")]
    EmptyApiKey,
}

/// The settings overlay's save check.
pub struct SettingsOverlay;

impl SettingsOverlay {
    pub fn save(input: &str) -> Result<String, SettingsError> {
        let key = input.trim();
        if key.is_empty() {
            return Err(SettingsError::EmptyApiKey);
        }
        Ok(key.to_string())
    }

    /// Shows the stored key with only its ends visible.
    pub fn mask(key: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        if chars.is_empty() {
            return "(not set)".to_string();
        }
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Turns successive whole-answer snapshots into terminal output.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    shown: String,
}

impl StreamPrinter {
    /// Text to print so the terminal shows `snapshot`.
    pub fn update(&mut self, snapshot: &str) -> String {
        let out = match snapshot.strip_prefix(self.shown.as_str()) {
            Some(rest) => rest.to_string(),
            // Not a continuation (an error replaced the answer).
            None => format!("\n{}", snapshot),
        };
        self.shown = snapshot.to_string();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_wrap_respects_width_and_newlines() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("one\ntwo", 10), vec!["one", "two"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn test_sidebar_highlights_active_chat() {
        plain();
        let chats = vec![Chat::new("Chat 2"), Chat::new("Chat 1")];
        let mut sidebar = Sidebar::default();
        let open = sidebar.render(&chats, &chats[1].id);
        assert_eq!(open, "   1. Chat 2\n▸  2. Chat 1");

        sidebar.toggle();
        assert_eq!(sidebar.render(&chats, &chats[0].id), "[💬] 💬 ");
        assert_eq!(sidebar.render(&[], "x"), "");
        sidebar.toggle();
        assert_eq!(sidebar.render(&[], "x"), "No chats yet");
    }

    #[test]
    fn test_transcript_shows_only_the_tail() {
        plain();
        let messages: Vec<Message> = (0..10).map(|i| Message::bot(format!("line {}", i))).collect();
        let rendered = render_transcript(&messages, 3, 40, Theme::Light);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.last(), Some(&"│ line 9"));
        assert!(!rendered.contains("line 0"));
    }

    #[test]
    fn test_user_bubble_is_right_aligned() {
        plain();
        let lines = render_message(&Message::user("hi"), 20, Theme::Dark);
        assert_eq!(lines, vec![format!("{}hi │", " ".repeat(16))]);
    }

    #[test]
    fn test_attachment_is_listed_in_bubble() {
        plain();
        let msg = Message::user("Uploaded PDF: a.pdf").with_file("a.pdf");
        let lines = render_message(&msg, 60, Theme::Light);
        assert!(lines[0].contains("📎 a.pdf"));
    }

    #[test]
    fn test_composer_needs_text_or_attachment() {
        let mut composer = Composer::default();
        assert!(!composer.can_send());
        assert!(composer.take().is_none());

        composer.text = "   ".to_string();
        assert!(!composer.can_send());

        composer.attach(PathBuf::from("a.pdf"));
        assert!(composer.can_send());
        let request = composer.take().unwrap();
        assert_eq!(request.file, Some(PathBuf::from("a.pdf")));
        assert!(!composer.can_send());
    }

    #[test]
    fn test_settings_rejects_blank_key() {
        assert_eq!(SettingsOverlay::save("  "), Err(SettingsError::EmptyApiKey));
        assert_eq!(SettingsOverlay::save(" k1 ").unwrap(), "k1");
        assert_eq!(SettingsOverlay::mask("abcdefghijkl"), "abcd...ijkl");
        assert_eq!(SettingsOverlay::mask(""), "(not set)");
    }

    #[test]
    fn test_stream_printer_prints_only_new_text() {
        let mut printer = StreamPrinter::default();
        assert_eq!(printer.update("The "), "The ");
        assert_eq!(printer.update("The document "), "document ");
        assert_eq!(printer.update("Error: boom"), "\nError: boom");
    }

    #[test]
    fn test_documents_mark_active() {
        let docs = vec![
            IndexedDocument {
                filename: "a.pdf".into(),
                page_count: 2,
                collection_name: None,
            },
            IndexedDocument {
                filename: "b.pdf".into(),
                page_count: 7,
                collection_name: None,
            },
        ];
        assert_eq!(
            render_documents(&docs, Some("b.pdf")),
            "  a.pdf (2 pages)\n* b.pdf (7 pages)"
        );
        assert_eq!(render_documents(&[], None), "No PDFs indexed yet.");
    }
}
