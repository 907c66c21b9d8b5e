//! Subscription spec parsing and MQTT topic filter validation
//!
//! A subscription spec is either `<filter>` or `<filter>:<qos>`. The QoS
//! separator is the last `:` in the spec; without one the subscription
//! defaults to QoS 1. Parsing is pure: the same spec always yields the same
//! result.

use std::fmt;
use thiserror::Error;

const QOS_SEPARATOR: char = ':';
const LEVEL_SEPARATOR: char = '/';
const SINGLE_LEVEL_WILDCARD: &str = "+";
const MULTI_LEVEL_WILDCARD: &str = "#";

/// QoS applied when a spec carries no `:<qos>` suffix
pub const DEFAULT_QOS: u8 = 1;

/// A validated topic filter and the QoS it is subscribed with.
///
/// Values only come out of [`parse`] / [`parse_all`], so `qos` is always
/// 0, 1 or 2 and `filter` is always a well-formed MQTT topic filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicSubscription {
    filter: String,
    qos: u8,
}

impl TopicSubscription {
    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn qos(&self) -> u8 {
        self.qos
    }
}

impl fmt::Display for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filter, self.qos)
    }
}

/// Reasons a single subscription spec is rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicFilterError {
    #[error("subscription spec is empty")]
    EmptySpec,
    #[error("topic filter is empty")]
    EmptyFilter,
    #[error("invalid QoS '{0}': expected an integer")]
    InvalidQos(String),
    #[error("QoS must be 0, 1, or 2 (got {0})")]
    QosOutOfRange(i64),
    #[error("topic filter cannot contain ':' when a QoS is specified")]
    ColonInFilter,
    #[error("topic filter contains a null character")]
    NullCharacter,
    #[error("topic filter must not start or end with '/'")]
    LeadingOrTrailingSlash,
    #[error("topic filter contains an empty level")]
    EmptyLevel,
    #[error("multi-level wildcard '#' must be the last level")]
    MultiLevelWildcardNotLast,
    #[error("single-level wildcard '+' must occupy an entire level")]
    PartialSingleLevelWildcard,
    #[error("multi-level wildcard '#' must occupy an entire level")]
    PartialMultiLevelWildcard,
}

/// Batch parsing failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("at least one topic subscription is required")]
    NoSubscriptions,
    #[error("subscription at index {index} ('{spec}') is invalid: {source}")]
    Invalid {
        index: usize,
        spec: String,
        #[source]
        source: TopicFilterError,
    },
}

/// Parse one subscription spec into a validated [`TopicSubscription`]
pub fn parse(spec: &str) -> Result<TopicSubscription, TopicFilterError> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(TopicFilterError::EmptySpec);
    }

    let (filter, qos) = split_filter_and_qos(trimmed)?;
    validate_filter(filter)?;

    Ok(TopicSubscription {
        filter: filter.to_string(),
        qos,
    })
}

/// Parse an ordered list of specs, failing on the first invalid one.
///
/// Caller order is preserved in the output.
pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> Result<Vec<TopicSubscription>, SubscriptionError> {
    if specs.is_empty() {
        return Err(SubscriptionError::NoSubscriptions);
    }

    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            parse(spec.as_ref()).map_err(|source| SubscriptionError::Invalid {
                index,
                spec: spec.as_ref().to_string(),
                source,
            })
        })
        .collect()
}

fn split_filter_and_qos(spec: &str) -> Result<(&str, u8), TopicFilterError> {
    let Some((filter, qos_part)) = spec.rsplit_once(QOS_SEPARATOR) else {
        return Ok((spec, DEFAULT_QOS));
    };

    let qos: i64 = qos_part
        .trim()
        .parse()
        .map_err(|_| TopicFilterError::InvalidQos(qos_part.to_string()))?;
    if !(0..=2).contains(&qos) {
        return Err(TopicFilterError::QosOutOfRange(qos));
    }

    let filter = filter.trim_end();
    if filter.is_empty() {
        return Err(TopicFilterError::EmptyFilter);
    }
    if filter.contains(QOS_SEPARATOR) {
        return Err(TopicFilterError::ColonInFilter);
    }

    Ok((filter, qos as u8))
}

/// Validate a bare topic filter against the MQTT wildcard rules
pub fn validate_filter(filter: &str) -> Result<(), TopicFilterError> {
    if filter.is_empty() {
        return Err(TopicFilterError::EmptyFilter);
    }
    if filter.contains('\0') {
        return Err(TopicFilterError::NullCharacter);
    }
    if filter.starts_with(LEVEL_SEPARATOR) || filter.ends_with(LEVEL_SEPARATOR) {
        return Err(TopicFilterError::LeadingOrTrailingSlash);
    }
    if filter.contains("//") {
        return Err(TopicFilterError::EmptyLevel);
    }

    let levels: Vec<&str> = filter.split(LEVEL_SEPARATOR).collect();
    let last = levels.len() - 1;
    for (position, level) in levels.iter().enumerate() {
        match *level {
            SINGLE_LEVEL_WILDCARD => {}
            MULTI_LEVEL_WILDCARD if position == last => {}
            MULTI_LEVEL_WILDCARD => return Err(TopicFilterError::MultiLevelWildcardNotLast),
            other if other.contains('+') => {
                return Err(TopicFilterError::PartialSingleLevelWildcard)
            }
            other if other.contains('#') => {
                return Err(TopicFilterError::PartialMultiLevelWildcard)
            }
            _ => {}
        }
    }

    Ok(())
}
