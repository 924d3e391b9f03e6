// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Topic name / topic filter parsing and wildcard matching.
//!
//! A topic name (carried in PUBLISH) is a `/`-separated sequence of levels
//! and never contains `+` or `#`. A topic filter (carried in SUBSCRIBE) may
//! use `+` to match exactly one level and `#` to match zero or more
//! trailing levels; `#` is only legal as the final token.

use crate::error::DecodeError;

/// Returns true if `name` is a valid topic name for PUBLISH: non-empty, no
/// wildcard characters.
#[must_use]
pub fn is_valid_topic_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['+', '#'])
}

/// Validates a subscription topic filter: non-empty, `+` only ever occupies
/// a whole level, `#` only ever occupies a whole level and only as the last
/// one.
pub fn validate_topic_filter(filter: &str) -> Result<(), DecodeError> {
    if filter.is_empty() {
        return Err(DecodeError::EmptyTopicFilter);
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        let is_last = i + 1 == levels.len();
        if level.contains('#') && (*level != "#" || !is_last) {
            return Err(DecodeError::InvalidTopicFilter);
        }
        if level.contains('+') && *level != "+" {
            return Err(DecodeError::InvalidTopicFilter);
        }
    }
    Ok(())
}

/// Returns true if topic name `topic` matches subscription filter `filter`.
///
/// Topic filters starting with `$` are matched only by exact level-by-level
/// prefix: a leading wildcard level in the filter never matches a leading
/// `$...` level in the topic (used for `$SYS`).
#[must_use]
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    if topic_levels.first().is_some_and(|l| l.starts_with('$'))
        && !filter_levels.first().is_some_and(|l| l.starts_with('$'))
    {
        return false;
    }

    match_levels(&topic_levels, &filter_levels)
}

fn match_levels(topic: &[&str], filter: &[&str]) -> bool {
    match (topic.first(), filter.first()) {
        (_, Some(&"#")) => true,
        (Some(t), Some(&"+")) if !t.is_empty() => match_levels(&topic[1..], &filter[1..]),
        (Some(t), Some(f)) if t == f => match_levels(&topic[1..], &filter[1..]),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(topic_matches_filter("a/b/c", "a/b/c"));
        assert!(!topic_matches_filter("a/b/c", "a/b"));
    }

    #[test]
    fn plus_matches_one_level() {
        assert!(topic_matches_filter("sensors/room1/temp", "sensors/+/temp"));
        assert!(!topic_matches_filter("sensors/room1/sub/temp", "sensors/+/temp"));
    }

    #[test]
    fn hash_matches_trailing_levels() {
        assert!(topic_matches_filter("a/b/c", "a/#"));
        assert!(topic_matches_filter("a", "a/#"));
        assert!(topic_matches_filter("a/b/c/d", "a/b/#"));
    }

    #[test]
    fn dollar_prefix_is_not_matched_by_wildcards() {
        assert!(!topic_matches_filter("$SYS/broker/uptime", "#"));
        assert!(!topic_matches_filter("$SYS/broker/uptime", "+/broker/uptime"));
        assert!(topic_matches_filter(
            "$SYS/broker/uptime",
            "$SYS/broker/uptime"
        ));
        assert!(topic_matches_filter("$SYS/broker/uptime", "$SYS/#"));
    }

    #[test]
    fn filter_validation_rejects_misplaced_wildcards() {
        assert_eq!(validate_topic_filter(""), Err(DecodeError::EmptyTopicFilter));
        assert_eq!(
            validate_topic_filter("a/#/b"),
            Err(DecodeError::InvalidTopicFilter)
        );
        assert_eq!(
            validate_topic_filter("a/b#"),
            Err(DecodeError::InvalidTopicFilter)
        );
        assert_eq!(
            validate_topic_filter("a/fo+o"),
            Err(DecodeError::InvalidTopicFilter)
        );
        assert!(validate_topic_filter("a/+/b/#").is_ok());
    }
}
