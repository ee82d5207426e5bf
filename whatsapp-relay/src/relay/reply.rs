//! Reply formatting for WhatsApp delivery.

/// Normalize a model reply and split it into separate WhatsApp messages.
///
/// Literal `\n` escape sequences become newlines. The reply is split on
/// `marker` (no split when the marker is empty); parts are trimmed and
/// blank parts dropped.
pub fn split_reply(reply: &str, marker: &str) -> Vec<String> {
    let normalized = reply.replace("\\n", "\n");

    let parts: Vec<&str> = if marker.is_empty() {
        vec![normalized.as_str()]
    } else {
        normalized.split(marker).collect()
    };

    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
