//! Topic names, topic filters and the tenant/source split
//!
//! A topic name is 2 to 21 `/`-separated ASCII alphanumeric segments. The first
//! segment is the owning tenant id, the remaining segments form the `source`.
//! Store-topic patterns are MQTT topic filters and may use `+` and a trailing `#`.

use std::fmt::{self, Write};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::FormatError;

pub const MIN_SEGMENTS: usize = 2;
pub const MAX_SEGMENTS: usize = 21;

/// Separator used in place of `/` when a topic travels as a single URL path segment
pub const PATH_PARAM_SEPARATOR: char = '|';

static TOPIC_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^[A-Za-z0-9]+(/[A-Za-z0-9]+){{{},{}}}$", MIN_SEGMENTS - 1, MAX_SEGMENTS - 1))
        .unwrap_or_else(|e| unreachable!("topic rule is a constant pattern, {e}"))
});

/// Whether `topic` matches the segment grammar
#[inline]
pub fn is_valid_topic(topic: &str) -> bool {
    TOPIC_RULE.is_match(topic)
}

/// Restore `/` separators in a topic that was carried as one URL path segment
#[inline]
pub fn decode_path_param(param: &str) -> String {
    param.replace(PATH_PARAM_SEPARATOR, "/")
}

/// A well-formed topic split into its tenant id and source path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPath {
    pub tenant_id: String,
    pub source: String,
}

impl TopicPath {
    #[inline]
    pub fn parse(topic: &str) -> Result<Self, FormatError> {
        if !is_valid_topic(topic) {
            return Err(FormatError::Topic(topic.into()));
        }
        match topic.split_once('/') {
            Some((tenant_id, source)) => Ok(Self { tenant_id: tenant_id.into(), source: source.into() }),
            None => Err(FormatError::Topic(topic.into())),
        }
    }

    /// Tenant id of a topic, `None` when the topic is malformed
    #[inline]
    pub fn tenant_of(topic: &str) -> Option<&str> {
        if is_valid_topic(topic) {
            topic.split('/').next()
        } else {
            None
        }
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.source)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("InvalidFilter({0})")]
    InvalidFilter(String),
    #[error("InvalidLevel({0})")]
    InvalidLevel(String),
}

#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Hash)]
pub enum Level {
    Normal(String),
    SingleWildcard, // Single level wildcard +
    MultiWildcard,  // Multi-level wildcard #
}

impl Level {
    #[inline]
    fn matches(&self, segment: &str) -> bool {
        match self {
            Level::Normal(s) => s == segment,
            Level::SingleWildcard | Level::MultiWildcard => true,
        }
    }
}

impl FromStr for Level {
    type Err = TopicError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, TopicError> {
        match s {
            "+" => Ok(Level::SingleWildcard),
            "#" => Ok(Level::MultiWildcard),
            "" => Err(TopicError::InvalidLevel("empty level".into())),
            _ if s.contains(['+', '#']) => {
                Err(TopicError::InvalidLevel(format!("invalid level `{}` contains +|#", s)))
            }
            _ if !s.bytes().all(|b| b.is_ascii_alphanumeric()) => {
                Err(TopicError::InvalidLevel(format!("invalid level `{}`, only ASCII letters and digits", s)))
            }
            _ => Ok(Level::Normal(String::from(s))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Normal(s) => f.write_str(s),
            Level::SingleWildcard => f.write_char('+'),
            Level::MultiWildcard => f.write_char('#'),
        }
    }
}

/// A parsed store-topic pattern
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Hash)]
pub struct TopicFilter(Vec<Level>);

impl TopicFilter {
    #[inline]
    pub fn levels(&self) -> &[Level] {
        &self.0
    }

    /// Whether a concrete topic name is delivered to this filter
    pub fn matches_str(&self, topic: &str) -> bool {
        let mut segments = topic.split('/');
        for level in &self.0 {
            if let Level::MultiWildcard = level {
                return true;
            }
            match segments.next() {
                Some(segment) if level.matches(segment) => continue,
                _ => return false,
            }
        }
        segments.next().is_none()
    }
}

impl FromStr for TopicFilter {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, TopicError> {
        let levels = s.split('/').map(Level::from_str).collect::<Result<Vec<_>, TopicError>>()?;
        let misplaced_multi = levels
            .iter()
            .position(|l| matches!(l, Level::MultiWildcard))
            .map(|pos| pos != levels.len() - 1)
            .unwrap_or(false);
        //Without a trailing `#` a filter needs as many levels as the shortest topic.
        let too_short = levels.len() < MIN_SEGMENTS && !matches!(levels.last(), Some(Level::MultiWildcard));
        if misplaced_multi || too_short || levels.len() > MAX_SEGMENTS {
            return Err(TopicError::InvalidFilter(format!("invalid topic filter `{}`", s)));
        }
        Ok(TopicFilter(levels))
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, level) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char('/')?;
            }
            level.fmt(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_grammar() {
        assert!(is_valid_topic("boiler1/temp"));
        assert!(is_valid_topic("boiler1/floor2/room7/temp"));
        assert!(!is_valid_topic("boiler1"));
        assert!(!is_valid_topic("boiler1/"));
        assert!(!is_valid_topic("/temp"));
        assert!(!is_valid_topic("boiler1//temp"));
        assert!(!is_valid_topic("boiler-1/temp"));
        assert!(!is_valid_topic("boiler1/temp#"));
        assert!(!is_valid_topic("boiler1/+"));
        assert!(!is_valid_topic("boiler1/te mp"));
        assert!(!is_valid_topic("boilér/temp"));
    }

    #[test]
    fn test_topic_segment_bounds() {
        let build = |n: usize| (0..n).map(|i| format!("s{i}")).collect::<Vec<_>>().join("/");
        assert!(!is_valid_topic(&build(1)));
        assert!(is_valid_topic(&build(2)));
        assert!(is_valid_topic(&build(21)));
        assert!(!is_valid_topic(&build(22)));
    }

    #[test]
    fn test_topic_path() {
        let p = TopicPath::parse("boiler1/floor2/temp").unwrap();
        assert_eq!(p.tenant_id, "boiler1");
        assert_eq!(p.source, "floor2/temp");
        assert_eq!(p.to_string(), "boiler1/floor2/temp");
        assert_eq!(TopicPath::parse("boiler1"), Err(FormatError::Topic("boiler1".into())));
        assert_eq!(TopicPath::tenant_of("boiler1/temp"), Some("boiler1"));
        assert_eq!(TopicPath::tenant_of("boiler1/te_mp"), None);
    }

    #[test]
    fn test_decode_path_param() {
        assert_eq!(decode_path_param("boiler1|floor2|temp"), "boiler1/floor2/temp");
        assert_eq!(decode_path_param("boiler1/temp"), "boiler1/temp");
    }

    #[test]
    fn test_filter_matches() {
        let f: TopicFilter = "boiler1/#".parse().unwrap();
        assert!(f.matches_str("boiler1/temp"));
        assert!(f.matches_str("boiler1/floor2/temp"));
        assert!(!f.matches_str("boiler2/temp"));

        let f: TopicFilter = "+/temp".parse().unwrap();
        assert!(f.matches_str("boiler1/temp"));
        assert!(!f.matches_str("boiler1/floor2/temp"));

        let f: TopicFilter = "boiler1/temp".parse().unwrap();
        assert!(f.matches_str("boiler1/temp"));
        assert!(!f.matches_str("boiler1/temp/raw"));
        assert!(!f.matches_str("boiler1"));
        assert_eq!(f.to_string(), "boiler1/temp");
    }

    #[test]
    fn test_filter_parse_errors() {
        assert!("boiler1/#/temp".parse::<TopicFilter>().is_err());
        assert!("boiler1/te+mp".parse::<TopicFilter>().is_err());
        assert!("boiler1//temp".parse::<TopicFilter>().is_err());
        assert!("".parse::<TopicFilter>().is_err());
        assert!("boiler-1/temp".parse::<TopicFilter>().is_err());
        assert!("boiler1/te_mp".parse::<TopicFilter>().is_err());
        assert!("boiler1/tèmp".parse::<TopicFilter>().is_err());
        assert!("boiler1".parse::<TopicFilter>().is_err());
        assert!("+".parse::<TopicFilter>().is_err());
        assert!("#".parse::<TopicFilter>().is_ok());
        assert_eq!("a/+/#".parse::<TopicFilter>().unwrap().levels().len(), 3);
    }
}
