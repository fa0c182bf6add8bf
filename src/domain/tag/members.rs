//! Member list stored under a tag index key

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Keys currently associated with one tag.
///
/// Encoded as a JSON array of strings regardless of backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMembers(Vec<String>);

impl TagMembers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a stored member list
    pub fn decode(raw: &str) -> Result<Self, DomainError> {
        serde_json::from_str(raw)
            .map_err(|e| DomainError::decode(format!("Invalid tag member list: {}", e)))
    }

    /// Encodes the member list for storage
    pub fn encode(&self) -> Result<String, DomainError> {
        serde_json::to_string(self)
            .map_err(|e| DomainError::decode(format!("Failed to encode tag member list: {}", e)))
    }

    /// Returns a new list with `key` first, followed by every other existing member
    pub fn with_member(&self, key: &str) -> Self {
        let mut keys = Vec::with_capacity(self.0.len() + 1);
        keys.push(key.to_string());
        keys.extend(self.0.iter().filter(|member| *member != key).cloned());
        Self(keys)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|member| member == key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn into_keys(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for TagMembers {
    fn from(keys: Vec<String>) -> Self {
        Self(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_member_on_empty() {
        let members = TagMembers::new().with_member("k1");
        assert_eq!(members.keys(), &["k1".to_string()]);
    }

    #[test]
    fn test_with_member_puts_key_first() {
        let members = TagMembers::from(vec!["a".to_string(), "b".to_string()]).with_member("c");
        assert_eq!(members.keys()[0], "c");
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn test_with_member_deduplicates() {
        let members = TagMembers::from(vec!["a".to_string(), "b".to_string()]).with_member("b");

        assert_eq!(members.len(), 2);
        assert_eq!(members.keys()[0], "b");
        assert!(members.contains("a"));
    }

    #[test]
    fn test_decode_json_array() {
        let members = TagMembers::decode(r#"["person01","person02"]"#).unwrap();

        assert_eq!(members.len(), 2);
        assert!(members.contains("person01"));
        assert!(members.contains("person02"));
    }

    #[test]
    fn test_decode_rejects_malformed_data() {
        let error = TagMembers::decode("not json").unwrap_err();
        assert!(error.is_decode());

        let error = TagMembers::decode(r#"{"key":"value"}"#).unwrap_err();
        assert!(error.is_decode());
    }

    #[test]
    fn test_encode_matches_decode_format() {
        let members = TagMembers::new().with_member("b").with_member("a");
        assert_eq!(members.encode().unwrap(), r#"["a","b"]"#);
    }
}
