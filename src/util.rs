use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

#[inline]
pub(crate) fn unix_now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos())
}

/// Synthesized completion id: `chatcmpl-` followed by the current
/// nanosecond timestamp.
#[must_use]
pub(crate) fn synthesized_completion_id() -> String {
    format!("chatcmpl-{}", unix_now_nanos())
}

/// Truncate `text` to at most `max_bytes`, backing off to a char boundary.
#[must_use]
pub(crate) fn truncate_for_log(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_completion_id_prefix() {
        let id = synthesized_completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert!(id["chatcmpl-".len()..].bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundary() {
        assert_eq!(truncate_for_log("hello", 10), "hello");
        assert_eq!(truncate_for_log("hello", 3), "hel");
        // "é" is two bytes; cutting in the middle backs off.
        assert_eq!(truncate_for_log("aé", 2), "a");
    }
}
