//! Llama-3 style chat template.
//!
//! A conversation is serialized as
//!
//! ```text
//! {bos}<|start_header_id|>{role}<|end_header_id|>\n\n{content}<|eot_id|>...{eos}
//! ```
//!
//! with one header/content/`<|eot_id|>` block per turn and the content trimmed.

use serde::{Deserialize, Serialize};

pub const START_HEADER: &str = "<|start_header_id|>";
pub const END_HEADER: &str = "<|end_header_id|>";
pub const END_OF_TURN: &str = "<|eot_id|>";
pub const LLAMA3_BOS: &str = "<|begin_of_text|>";

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTemplate {
    pub bos_token: String,
    pub eos_token: String,
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self::llama3()
    }
}

impl ChatTemplate {
    /// Llama-3 markers, with `<|eot_id|>` doubling as the end-of-sequence token.
    #[must_use]
    pub fn llama3() -> Self {
        Self::with_markers(LLAMA3_BOS, END_OF_TURN)
    }

    pub fn with_markers(bos: impl Into<String>, eos: impl Into<String>) -> Self {
        Self { bos_token: bos.into(), eos_token: eos.into() }
    }

    /// Render a conversation to flat text.
    ///
    /// An empty conversation renders as `{bos}{eos}`. Roles are not validated.
    #[must_use]
    pub fn format(&self, turns: &[ChatTurn]) -> String {
        let body: usize = turns
            .iter()
            .map(|t| START_HEADER.len() + t.role.len() + END_HEADER.len() + 2 + t.content.len() + END_OF_TURN.len())
            .sum();
        let mut text = String::with_capacity(self.bos_token.len() + body + self.eos_token.len());

        text.push_str(&self.bos_token);
        for turn in turns {
            text.push_str(START_HEADER);
            text.push_str(&turn.role);
            text.push_str(END_HEADER);
            text.push_str("\n\n");
            text.push_str(turn.content.trim());
            text.push_str(END_OF_TURN);
        }
        text.push_str(&self.eos_token);
        text
    }

    /// Jinja source equivalent to [`ChatTemplate::format`], for installing on a tokenizer.
    #[must_use]
    pub fn jinja(&self) -> String {
        format!(
            "{{{{ bos_token }}}}{{% for message in messages %}}{{{{ '{START_HEADER}' + message['role'] + '{END_HEADER}\\n\\n' + message['content'] | trim + '{END_OF_TURN}' }}}}{{% endfor %}}{{{{ eos_token }}}}"
        )
    }
}
