//! User profile: process-local learner context.
//!
//! Attributes such as `sleep_hours` or `stress_level` are materialised as
//! working-memory facts before the engine runs, so authored rules treat them
//! exactly like facts extracted from the utterance. The profile is mutable
//! and owned by the host; it is never persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::fact::{Fact, FactOrigin, FactValue};

/// A mapping from attribute name to scalar value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    attrs: BTreeMap<String, FactValue>,
}

impl UserProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FactValue> {
        self.attrs.get(name)
    }

    /// Set an attribute. Non-finite numbers and empty names are rejected
    /// with a structured error and the profile is left unchanged.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FactValue>) -> Result<(), ProfileError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        let value = value.into();
        if let FactValue::Number(n) = value {
            if !n.is_finite() {
                return Err(ProfileError::NonFiniteNumber { name });
            }
        }
        self.attrs.insert(name, value);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.attrs.clear();
    }

    /// Materialise every attribute as a profile-origin fact, name-sorted.
    pub fn snapshot(&self) -> Vec<Fact> {
        self.attrs
            .iter()
            .map(|(name, value)| {
                Fact::new(name.clone(), value.clone()).with_origin(FactOrigin::Profile)
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FactValue)> {
        self.attrs.iter()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear_roundtrip() {
        let mut profile = UserProfile::new();
        profile.set("sleep_hours", 5i64).unwrap();
        profile.set("stress_level", "high").unwrap();

        assert_eq!(profile.get("sleep_hours"), Some(&FactValue::Number(5.0)));
        assert_eq!(profile.len(), 2);

        profile.clear();
        assert!(profile.is_empty());
    }

    #[test]
    fn non_finite_numbers_are_rejected_and_state_unchanged() {
        let mut profile = UserProfile::new();
        profile.set("sleep_hours", 7i64).unwrap();

        let err = profile.set("sleep_hours", f64::NAN).unwrap_err();
        assert!(matches!(err, ProfileError::NonFiniteNumber { .. }));
        assert_eq!(profile.get("sleep_hours"), Some(&FactValue::Number(7.0)));

        assert!(profile.set("exam_in_days", f64::INFINITY).is_err());
        assert!(profile.get("exam_in_days").is_none());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut profile = UserProfile::new();
        assert!(matches!(
            profile.set("  ", "x").unwrap_err(),
            ProfileError::EmptyName
        ));
    }

    #[test]
    fn snapshot_produces_sorted_profile_facts() {
        let mut profile = UserProfile::new();
        profile.set("stress_level", "high").unwrap();
        profile.set("sleep_hours", 5i64).unwrap();

        let facts = profile.snapshot();
        let names: Vec<&str> = facts.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["sleep_hours", "stress_level"]);
        assert!(facts.iter().all(|f| f.origin == FactOrigin::Profile));
        assert!(facts.iter().all(|f| f.confidence == 1.0));
    }
}
