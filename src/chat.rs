//! The "ask" workflow: conversation memory in, grounded answer out.
//!
//! ```text
//! recent turns ──► context ──► Vault::query ──► answer
//!                                              │
//!                     SessionStore ◄── user + assistant messages
//! ```

use serde_json::json;

use crate::error::VaultError;
use crate::memory::{Message, Metadata, Role, SessionStore};
use crate::models::QueryResult;
use crate::vault::Vault;

/// Answer `question` using the current session's recent turns as context,
/// then record the exchange in the session.
///
/// Failures to save the exchange are logged and do not discard the
/// answer. A failed query records nothing.
pub async fn ask(
    vault: &Vault,
    memory: &mut SessionStore,
    question: &str,
    max_results: usize,
) -> Result<QueryResult, VaultError> {
    let recent = memory.recent_context(vault.config().retrieval.context_messages);
    let context = format_context(recent);
    let context = (!context.is_empty()).then_some(context.as_str());

    let result = vault.query(question, context, max_results).await?;

    if let Err(e) = memory.add_message(Role::User, question, Metadata::new()) {
        tracing::warn!(error = %e, "could not record question");
    }

    let mut metadata = Metadata::new();
    metadata.insert("sources".to_string(), json!(result.sources));
    metadata.insert("grounded".to_string(), json!(result.grounded));
    if let Err(e) = memory.add_message(Role::Assistant, &result.answer, metadata) {
        tracing::warn!(error = %e, "could not record answer");
    }

    Ok(result)
}

/// One `role: content` line per message.
pub fn format_context(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
            timestamp: String::new(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn context_lines_keep_order() {
        let messages = vec![
            message(Role::User, "What is in the garden?"),
            message(Role::Assistant, "Tomatoes."),
        ];
        assert_eq!(
            format_context(&messages),
            "user: What is in the garden?\nassistant: Tomatoes."
        );
        assert_eq!(format_context(&[]), "");
    }
}
