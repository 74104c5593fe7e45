//! Session transcript shared by the TUI and the headless `ask` mode.

use crate::client::Reply;
use crate::markup::html_to_text;

pub const NO_THOUGHTS: &str = "No thoughts were generated.";

/// One rendered entry in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    User(String),
    Reply { thoughts: String, output: String },
    /// Client-generated message: fallback apologies and connection failures.
    Notice(String),
}

impl Turn {
    /// Build a reply turn from a raw backend reply.
    pub fn from_reply(reply: &Reply) -> Self {
        let thoughts = reply
            .thoughts
            .as_deref()
            .map(html_to_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_THOUGHTS.to_string());

        Turn::Reply {
            thoughts,
            output: html_to_text(&reply.output),
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Turn::Reply { .. })
    }
}

/// Append-only list of turns for the lifetime of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Plain-text rendering used by the headless mode.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            match turn {
                Turn::User(text) => {
                    out.push_str("You:\n");
                    out.push_str(text);
                }
                Turn::Reply { thoughts, output } => {
                    out.push_str("Thought Process:\n");
                    out.push_str(thoughts);
                    out.push_str("\n\nStory:\n");
                    out.push_str(output);
                }
                Turn::Notice(text) => out.push_str(text),
            }
            out.push_str("\n\n");
        }
        out.trim_end().to_string()
    }
}
