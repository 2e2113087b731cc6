use crate::models::Message;

/// Keeps at most `window` messages, preferring higher importance.
///
/// Turns without a context weigh 0. Among equal importance the more recent
/// turn (higher id) is kept, so uniform importance keeps the last `window`
/// turns. The result is in ascending id order. At or under the window the
/// input is returned untouched.
pub fn prune_context(mut messages: Vec<Message>, window: usize) -> Vec<Message> {
    if messages.len() <= window {
        return messages;
    }

    messages.sort_by(|a, b| {
        b.importance()
            .total_cmp(&a.importance())
            .then_with(|| b.id.cmp(&a.id))
    });
    messages.truncate(window);
    messages.sort_by_key(|m| m.id);
    messages
}
