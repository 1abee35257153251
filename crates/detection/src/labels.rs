//! Label policies for zero-shot classification.
//!
//! A policy bundles the candidate vocabulary sent to the classifier, the
//! subset of labels that count as a positive detection, and the confidence
//! threshold a positive label must clear. The two shipped policies
//! (vandalism, flooding) are independent instantiations of the same
//! mechanism and always run side by side.

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

/// Vocabulary + positive subset + threshold for one detector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelPolicy {
    /// Stable identifier, also part of the result-cache key.
    pub id: String,
    /// Full candidate label set handed to the classifier.
    pub labels: Vec<String>,
    /// Labels that, when scored above `threshold`, make the verdict Positive.
    pub positive_labels: Vec<String>,
    /// Strict lower bound on the confidence of a surviving label.
    pub threshold: f32,
}

impl LabelPolicy {
    /// Graffiti / vandalism detection over a CLIP-style classifier.
    pub fn vandalism() -> Self {
        Self {
            id: "vandalism".to_string(),
            labels: vec![
                "graffiti".to_string(),
                "vandalism".to_string(),
                "spray paint".to_string(),
                "street art".to_string(),
                "clean wall".to_string(),
                "public property".to_string(),
                "normal street".to_string(),
            ],
            positive_labels: vec![
                "graffiti".to_string(),
                "vandalism".to_string(),
                "spray paint".to_string(),
            ],
            threshold: 0.4,
        }
    }

    /// Street flooding / waterlogging detection.
    pub fn flooding() -> Self {
        Self {
            id: "flooding".to_string(),
            labels: vec![
                "flood".to_string(),
                "flooded street".to_string(),
                "waterlogged road".to_string(),
                "standing water".to_string(),
                "heavy rain".to_string(),
                "dry street".to_string(),
                "normal street".to_string(),
            ],
            positive_labels: vec![
                "flood".to_string(),
                "flooded street".to_string(),
                "waterlogged road".to_string(),
                "standing water".to_string(),
            ],
            threshold: 0.4,
        }
    }

    pub fn is_positive(&self, label: &str) -> bool {
        self.positive_labels.iter().any(|l| l == label)
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.id.trim().is_empty() {
            return Err(DetectionError::InvalidConfig(
                "label policy id must not be empty".into(),
            ));
        }
        if self.labels.is_empty() {
            return Err(DetectionError::InvalidConfig(
                "label policy needs at least one candidate label".into(),
            ));
        }
        if self.positive_labels.is_empty() {
            return Err(DetectionError::InvalidConfig(
                "label policy needs at least one positive label".into(),
            ));
        }
        if let Some(missing) = self
            .positive_labels
            .iter()
            .find(|l| !self.labels.contains(l))
        {
            return Err(DetectionError::InvalidConfig(format!(
                "positive label '{missing}' is not in the candidate set"
            )));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(DetectionError::InvalidConfig(
                "threshold must be strictly between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_policies_are_valid() {
        assert!(LabelPolicy::vandalism().validate().is_ok());
        assert!(LabelPolicy::flooding().validate().is_ok());
    }

    #[test]
    fn vandalism_policy_matches_detector_constants() {
        let policy = LabelPolicy::vandalism();
        assert_eq!(policy.id, "vandalism");
        assert_eq!(policy.labels.len(), 7);
        assert!(policy.is_positive("graffiti"));
        assert!(policy.is_positive("spray paint"));
        assert!(!policy.is_positive("street art"));
        assert!(!policy.is_positive("clean wall"));
        assert_eq!(policy.threshold, 0.4);
    }

    #[test]
    fn positive_labels_must_be_candidates() {
        let policy = LabelPolicy {
            id: "broken".into(),
            labels: vec!["a".into()],
            positive_labels: vec!["b".into()],
            threshold: 0.5,
        };
        assert!(matches!(
            policy.validate(),
            Err(DetectionError::InvalidConfig(msg)) if msg.contains("'b'")
        ));
    }

    #[test]
    fn threshold_bounds_enforced() {
        let mut policy = LabelPolicy::vandalism();
        policy.threshold = 0.0;
        assert!(policy.validate().is_err());
        policy.threshold = 1.0;
        assert!(policy.validate().is_err());
        policy.threshold = 0.99;
        assert!(policy.validate().is_ok());
    }
}
