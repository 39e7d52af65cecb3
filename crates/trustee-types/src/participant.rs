//! Participant identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use utoipa::ToSchema;

/// A dataspace participant (connector or data trustee)
///
/// Two participants are the same participant when their `name` and `url`
/// match. The `id` (usually a DID) is informational and does not take part
/// in equality, because negotiation messages build participants without one.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Participant {
    /// Participant identifier (e.g. a DID), may be absent
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable name
    pub name: String,
    /// Whitelist API URL of the participant's connector, empty when unknown
    #[serde(default)]
    pub url: String,
}

impl Participant {
    /// Create a participant with an identifier
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            url: url.into(),
        }
    }

    /// Create a participant without an identifier
    pub fn anonymous(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: url.into(),
        }
    }

    /// Whether a URL is known for this participant
    pub fn has_url(&self) -> bool {
        !self.url.is_empty()
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.url == other.url
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.url.hash(state);
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Participant{{id='{}', name='{}', url='{}'}}",
            self.id.as_deref().unwrap_or("null"),
            self.name,
            self.url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_id() {
        let a = Participant::new("did:example:1", "trustee", "http://trustee.com");
        let b = Participant::new("did:example:2", "trustee", "http://trustee.com");
        let c = Participant::anonymous("trustee", "http://other.com");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_missing_fields_deserialize() {
        let p: Participant = serde_json::from_str(r#"{"name":"consumer"}"#).unwrap();
        assert_eq!(p.id, None);
        assert!(!p.has_url());
    }
}
