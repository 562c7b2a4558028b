use std::fmt;

use super::Protocol;

/// What a client should listen for. Carries no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    /// An MQTT topic filter; `+` and `#` wildcards are honoured.
    Mqtt { topic: String },
    /// An in-process subscription keyed by id.
    Loopback { subscription_id: String },
}

impl Subscription {
    pub fn mqtt(topic: impl Into<String>) -> Self {
        Subscription::Mqtt {
            topic: topic.into(),
        }
    }

    pub fn loopback(subscription_id: impl Into<String>) -> Self {
        Subscription::Loopback {
            subscription_id: subscription_id.into(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Subscription::Mqtt { .. } => Protocol::Mqtt,
            Subscription::Loopback { .. } => Protocol::Loopback,
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subscription::Mqtt { topic } => write!(f, "mqtt topic '{topic}'"),
            Subscription::Loopback { subscription_id } => {
                write!(f, "loopback id '{subscription_id}'")
            }
        }
    }
}

/// Matches an MQTT topic name against a topic filter.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
