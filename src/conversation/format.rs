//! Role-tagged prompt formatting.

use super::history::ConversationHistory;

/// Role tag for user turns.
pub const USER_TAG: &str = "user";

/// Role tag for assistant turns, also used as the trailing generation slot.
pub const ASSISTANT_TAG: &str = "assistant";

/// A prompt string built from a history snapshot.
///
/// Always ends with an `assistant` line followed by an empty line, which
/// tells the model to continue as the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormattedPrompt(String);

impl FormattedPrompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for FormattedPrompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FormattedPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flattens a conversation into a single prompt.
///
/// Each turn becomes `"<role>\n<content>"`; turns are joined with newlines and
/// an open `assistant` slot is appended. Content is passed through untouched;
/// length limits are enforced by the budget guard, not here.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnFormatter;

impl TurnFormatter {
    pub fn format(history: &ConversationHistory) -> FormattedPrompt {
        let mut lines: Vec<String> = history
            .iter()
            .map(|turn| format!("{}\n{}", turn.role().tag(), turn.content()))
            .collect();
        lines.push(ASSISTANT_TAG.to_string());
        lines.push(String::new());
        FormattedPrompt(lines.join("\n"))
    }
}
