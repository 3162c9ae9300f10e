//! Topic filter matching.
//!
//! A subscription pattern may contain a single wildcard marker:
//!
//! - **Multi-level (`#`)**: matches from the marker's position through the
//!   rest of the topic, across any number of levels.
//!   `sensors/#` matches `sensors/temp` and `sensors/room1/temp`.
//! - **Single-level (`+`)**: replaces exactly one level.
//!   `sensors/+/temp` matches `sensors/room1/temp` but not
//!   `sensors/room1/humidity/temp`.
//!
//! Only the first marker found is honored, and `#` is looked up before `+`.
//! Patterns with several markers therefore behave positionally rather than
//! as a full MQTT filter: `a/#/+` is treated as prefix `a/` plus suffix `/+`.

/// Multi-level wildcard marker.
pub const MULTI_LEVEL_WILDCARD: char = '#';

/// Single-level wildcard marker.
pub const SINGLE_LEVEL_WILDCARD: char = '+';

/// Topic level separator.
pub const LEVEL_SEPARATOR: char = '/';

/// Decide whether a concrete `topic` matches a subscription `pattern`.
///
/// `topic` must be wildcard-free, as delivered by the engine. Comparison is
/// case-sensitive and byte-exact.
///
/// # Examples
///
/// ```rust
/// use iot_mqtt_bridge::network::application::mqtt::topic::matches;
///
/// assert!(matches("a/#", "a/b/c"));
/// assert!(!matches("a/#", "x/b/c"));
/// assert!(matches("a/+/c", "a/b/c"));
/// assert!(!matches("a/+/c", "a/b/d/c"));
/// assert!(matches("a/b", "a/b"));
/// ```
pub fn matches(pattern: &str, topic: &str) -> bool {
    if let Some(index) = pattern.find(MULTI_LEVEL_WILDCARD) {
        let (prefix, suffix) = split_around(pattern, index);
        // Prefix and suffix are checked independently; `#` spans any levels.
        return topic.starts_with(prefix) && topic.ends_with(suffix);
    }

    if let Some(index) = pattern.find(SINGLE_LEVEL_WILDCARD) {
        let (prefix, suffix) = split_around(pattern, index);
        return topic
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .is_some_and(|level| !level.contains(LEVEL_SEPARATOR));
    }

    pattern == topic
}

// Both markers are one byte wide, so `index + 1` is always a char boundary.
fn split_around(pattern: &str, index: usize) -> (&str, &str) {
    (&pattern[..index], &pattern[index + 1..])
}
