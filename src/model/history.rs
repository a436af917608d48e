//! Sliding window of screenshots and replies sent with each request.

use serde_json::Value;
use std::collections::VecDeque;

use super::client::MessageBuilder;
use crate::actions::add_box_token;

/// Default number of screenshots sent per request.
pub const DEFAULT_HISTORY_N: usize = 5;

/// Screenshots and model replies of the current run.
///
/// Only the newest `history_n` screenshots are kept. Replies are kept in full
/// and the oldest ones are dropped when building messages, so that every
/// replayed reply is paired with the screenshot it answered.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    history_n: usize,
    images: VecDeque<String>,
    responses: Vec<String>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_N)
    }
}

impl ConversationHistory {
    pub fn new(history_n: usize) -> Self {
        Self {
            history_n: history_n.max(1),
            images: VecDeque::new(),
            responses: Vec::new(),
        }
    }

    pub fn history_n(&self) -> usize {
        self.history_n
    }

    /// Add a base64 PNG screenshot.
    pub fn push_screenshot(&mut self, image_base64: impl Into<String>) {
        self.images.push_back(image_base64.into());
        while self.images.len() > self.history_n {
            self.images.pop_front();
        }
    }

    /// Record a raw model reply.
    pub fn push_response(&mut self, response: impl Into<String>) {
        self.responses.push(response.into());
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn response_count(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.responses.is_empty()
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.responses.clear();
    }

    /// Build the request: prompt messages, then (screenshot, reply) pairs for
    /// the last replies, then the newest screenshot.
    pub fn build_messages(&self, prompt_messages: &[Value]) -> Vec<Value> {
        let mut messages = prompt_messages.to_vec();
        let replayed = self.responses.len().min(self.images.len().saturating_sub(1));
        let first_reply = self.responses.len() - replayed;
        let mut images = self.images.iter();

        // Screenshots older than the replayed replies have no partner.
        for _ in 0..self.images.len().saturating_sub(replayed + 1) {
            images.next();
        }

        for response in &self.responses[first_reply..] {
            if let Some(image) = images.next() {
                messages.push(MessageBuilder::create_user_image_message(image));
            }
            messages.push(MessageBuilder::create_assistant_message(&add_box_token(
                response,
            )));
        }

        if let Some(current) = images.next() {
            messages.push(MessageBuilder::create_user_image_message(current));
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(messages: &[Value]) -> Vec<String> {
        messages
            .iter()
            .map(|m| m["role"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn image_url(message: &Value) -> &str {
        message["content"][0]["image_url"]["url"]
            .as_str()
            .unwrap_or_default()
    }

    #[test]
    fn test_first_step_sends_prompt_and_screenshot() {
        let mut history = ConversationHistory::new(5);
        history.push_screenshot("img0");
        let prompt = vec![MessageBuilder::create_user_text_message("task")];

        let messages = history.build_messages(&prompt);
        assert_eq!(roles(&messages), vec!["user", "user"]);
        assert_eq!(image_url(&messages[1]), "data:image/png;base64,img0");
    }

    #[test]
    fn test_replies_interleave_with_screenshots() {
        let mut history = ConversationHistory::new(5);
        history.push_screenshot("img0");
        history.push_response("Thought: a\nAction: click(start_box='(1,2)')");
        history.push_screenshot("img1");

        let messages = history.build_messages(&[]);
        assert_eq!(roles(&messages), vec!["user", "assistant", "user"]);
        assert_eq!(image_url(&messages[0]), "data:image/png;base64,img0");
        assert_eq!(
            messages[1]["content"][0]["text"],
            "Thought: a\nAction: click(start_box='<|box_start|>(1,2)<|box_end|>')"
        );
        assert_eq!(image_url(&messages[2]), "data:image/png;base64,img1");
    }

    #[test]
    fn test_window_keeps_newest_images() {
        let mut history = ConversationHistory::new(3);
        for i in 0..6 {
            history.push_screenshot(format!("img{}", i));
            if i < 5 {
                history.push_response(format!("reply{}", i));
            }
        }
        assert_eq!(history.image_count(), 3);
        assert_eq!(history.response_count(), 5);

        let messages = history.build_messages(&[]);
        let images: Vec<&str> = messages
            .iter()
            .filter(|m| m["role"] == "user")
            .map(image_url)
            .collect();
        assert_eq!(
            images,
            vec![
                "data:image/png;base64,img3",
                "data:image/png;base64,img4",
                "data:image/png;base64,img5",
            ]
        );
        // img3 answered by reply3, img4 by reply4.
        assert_eq!(messages[1]["content"][0]["text"], "reply3");
        assert_eq!(messages[3]["content"][0]["text"], "reply4");
        assert_eq!(messages.len(), 5);
    }

    #[test]
    fn test_clear() {
        let mut history = ConversationHistory::default();
        history.push_screenshot("img");
        history.push_response("reply");
        assert!(!history.is_empty());
        history.clear();
        assert!(history.is_empty());
        assert!(history.build_messages(&[]).is_empty());
    }
}
