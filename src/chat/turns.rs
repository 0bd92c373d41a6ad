//! Turn-marker chat for raw-prompt models (Gemma chat template).
//!
//! The model sees one flat string.  Each turn is wrapped in
//! `<start_of_turn>{role}` … `<end_of_turn>`, the prompt ends with an open
//! model turn, and the reply is cut back to the text inside the last model
//! turn.  History is the list of formatted turn strings in arrival order,
//! two per successful exchange.

use crate::llm::{ProviderError, TextModel};

pub const START_TURN_USER: &str = "<start_of_turn>user";
pub const START_TURN_MODEL: &str = "<start_of_turn>model";
pub const END_TURN: &str = "<end_of_turn>";

/// Fixed preamble of every prompt.
const PREAMBLE: &str = "Respond in plain text. No formatting.\n";

/// `"{start}\n{text}{END_TURN}"`.
pub fn format_turn(start: &str, text: &str) -> String {
    format!("{start}\n{text}{END_TURN}")
}

/// Keep only the text inside the model's final turn.
///
/// Text up to and including the last `<start_of_turn>model` is dropped, then
/// everything from the last `<end_of_turn>` on.  Markers that are absent
/// leave the response untouched on that side.  No whitespace is trimmed.
pub fn sanitize(response: &str) -> &str {
    let mut text = response;
    if let Some(pos) = text.rfind(START_TURN_MODEL) {
        text = &text[pos + START_TURN_MODEL.len()..];
    }
    if let Some(pos) = text.rfind(END_TURN) {
        text = &text[..pos];
    }
    text
}

#[derive(Debug, Clone, Default)]
pub struct TurnChat {
    history: Vec<String>,
}

impl TurnChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// The conversation so far: turns joined by newlines with a trailing
    /// newline, or the empty string for a fresh chat.
    pub fn prompt(&self) -> String {
        if self.history.is_empty() {
            return String::new();
        }
        let mut out = self.history.join("\n");
        out.push('\n');
        out
    }

    /// Full prompt for `msg`: preamble, history, the new user turn, and an
    /// open model turn.
    pub fn build_prompt(&self, msg: &str) -> String {
        let user_turn = format_turn(START_TURN_USER, msg);
        format!(
            "{PREAMBLE}{}{}\n{START_TURN_MODEL}",
            self.prompt(),
            user_turn.trim_end_matches([' ', '\n'])
        )
    }

    /// Record a completed exchange.
    pub fn record(&mut self, msg: &str, reply: &str) {
        self.history.push(format_turn(START_TURN_USER, msg));
        self.history.push(format_turn(START_TURN_MODEL, reply));
    }

    /// Send `msg` through `model`, returning the sanitised reply.
    ///
    /// History only changes when the model call succeeds.
    pub async fn send(&mut self, model: &TextModel, msg: &str) -> Result<String, ProviderError> {
        let prompt = self.build_prompt(msg);
        let response = model.complete(&prompt).await?;
        let reply = sanitize(&response).to_string();
        self.record(msg, &reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;

    #[test]
    fn fresh_chat_has_empty_prompt() {
        assert_eq!(TurnChat::new().prompt(), "");
    }

    #[test]
    fn first_prompt_layout() {
        let chat = TurnChat::new();
        assert_eq!(
            chat.build_prompt("Where do batteries go?"),
            "Respond in plain text. No formatting.\n\
             <start_of_turn>user\nWhere do batteries go?<end_of_turn>\n\
             <start_of_turn>model"
        );
    }

    #[test]
    fn prompt_includes_history_in_order() {
        let mut chat = TurnChat::new();
        chat.record("hi", "hello");
        assert_eq!(
            chat.prompt(),
            "<start_of_turn>user\nhi<end_of_turn>\n<start_of_turn>model\nhello<end_of_turn>\n"
        );
        let prompt = chat.build_prompt("again");
        assert!(prompt.starts_with("Respond in plain text. No formatting.\n<start_of_turn>user\nhi"));
        assert!(prompt.ends_with("<start_of_turn>user\nagain<end_of_turn>\n<start_of_turn>model"));
    }

    #[test]
    fn sanitize_cuts_to_last_model_turn() {
        let raw = "prompt echo <start_of_turn>model\nold<end_of_turn><start_of_turn>model\nThe answer<end_of_turn>\nextra";
        assert_eq!(sanitize(raw), "\nThe answer");
    }

    #[test]
    fn sanitize_without_markers_is_identity() {
        assert_eq!(sanitize("  plain reply \n"), "  plain reply \n");
    }

    #[test]
    fn sanitize_end_marker_only() {
        assert_eq!(sanitize("answer<end_of_turn>trailing"), "answer");
    }

    #[tokio::test]
    async fn send_appends_two_turns_on_success() {
        let model = TextModel::Dummy(DummyProvider::scripted(["<start_of_turn>model\nGreen cart<end_of_turn>"]));
        let mut chat = TurnChat::new();
        let reply = chat.send(&model, "Food scraps?").await.unwrap();
        assert_eq!(reply, "\nGreen cart");
        assert_eq!(
            chat.history(),
            &[
                "<start_of_turn>user\nFood scraps?<end_of_turn>".to_string(),
                "<start_of_turn>model\n\nGreen cart<end_of_turn>".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn send_passes_built_prompt_to_model() {
        let dummy = DummyProvider::scripted(["ok"]);
        let model = TextModel::Dummy(dummy.clone());
        let mut chat = TurnChat::new();
        chat.record("earlier", "reply");
        let expected = chat.build_prompt("now");
        chat.send(&model, "now").await.unwrap();
        assert_eq!(dummy.calls()[0].contents[0].text, expected);
    }

    #[tokio::test]
    async fn failed_send_leaves_history_untouched() {
        let model = TextModel::Dummy(DummyProvider::failing("endpoint down"));
        let mut chat = TurnChat::new();
        chat.record("a", "b");
        let err = chat.send(&model, "c").await.unwrap_err();
        assert!(err.to_string().contains("endpoint down"));
        assert_eq!(chat.history().len(), 2);
    }
}
