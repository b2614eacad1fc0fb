//! Topic Mapping
//!
//! Converts a namespace path into an outbound message topic. The mapping is
//! a plain concatenation of the configured prefix and the path; the walker
//! guarantees path well-formedness, so no normalization happens here.

/// Maps namespace paths to broker topics.
#[derive(Debug, Clone)]
pub struct TopicMapper {
    prefix: String,
}

impl TopicMapper {
    /// Create a mapper with the given topic prefix.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Build the topic for a namespace path.
    pub fn to_topic(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
