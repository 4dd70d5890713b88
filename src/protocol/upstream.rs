//! Wire types for the upstream provider's stream events.
//!
//! The upstream speaks the chat-completion chunk dialect but carries its
//! secondary channel in `choices[0].delta.reasoning`. Only the fields the
//! relay consumes are modelled; everything else is ignored.

use serde::{Deserialize, Deserializer};

/// One decoded upstream SSE payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created: Option<u64>,
    #[serde(default)]
    pub choices: Option<Vec<UpstreamChoice>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamChoice {
    #[serde(default)]
    pub delta: Option<UpstreamDelta>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamDelta {
    #[serde(default, deserialize_with = "lenient_string")]
    pub reasoning: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
}

impl UpstreamEvent {
    /// Parse one payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when `payload` is not a JSON object of the
    /// expected shape.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// The first choice, if the event carries one.
    #[must_use]
    pub fn first_choice(&self) -> Option<&UpstreamChoice> {
        self.choices.as_ref().and_then(|choices| choices.first())
    }

    #[must_use]
    pub fn into_first_choice(self) -> Option<UpstreamChoice> {
        self.choices.and_then(|choices| choices.into_iter().next())
    }
}

// Non-string values (numbers, objects) are treated as absent rather than
// failing the whole event.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => Some(text),
        _ => None,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| secs as u64)
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reasoning_event() {
        let event = UpstreamEvent::parse(
            r#"{"id":"gen-1","created":1700000000,"choices":[{"index":0,"delta":{"reasoning":"he"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(event.id.as_deref(), Some("gen-1"));
        assert_eq!(event.created, Some(1_700_000_000));
        let choice = event.first_choice().unwrap();
        let delta = choice.delta.as_ref().unwrap();
        assert_eq!(delta.reasoning.as_deref(), Some("he"));
        assert!(delta.content.is_none());
        assert!(choice.finish_reason.is_none());
    }

    #[test]
    fn test_parse_finish_without_delta() {
        let event = UpstreamEvent::parse(r#"{"choices":[{"finish_reason":"content_filter"}]}"#)
            .unwrap();
        let choice = event.first_choice().unwrap();
        assert!(choice.delta.is_none());
        assert_eq!(choice.finish_reason.as_deref(), Some("content_filter"));
    }

    #[test]
    fn test_parse_tolerates_odd_field_types() {
        let event = UpstreamEvent::parse(
            r#"{"id":12,"created":1700000000.5,"choices":[{"delta":{"content":null,"reasoning":{"x":1}}}]}"#,
        )
        .unwrap();
        assert!(event.id.is_none());
        assert_eq!(event.created, Some(1_700_000_000));
        let delta = event.first_choice().unwrap().delta.as_ref().unwrap();
        assert!(delta.content.is_none());
        assert!(delta.reasoning.is_none());
    }

    #[test]
    fn test_parse_without_choices() {
        let event = UpstreamEvent::parse(r#"{"id":"x","usage":{"total_tokens":3}}"#).unwrap();
        assert!(event.first_choice().is_none());

        let event = UpstreamEvent::parse(r#"{"choices":[]}"#).unwrap();
        assert!(event.first_choice().is_none());
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(UpstreamEvent::parse("not json").is_err());
        assert!(UpstreamEvent::parse("42").is_err());
    }
}
