//! Deterministic stub classifier.
//!
//! Used when the client mode is `"stub"`: scores are derived from a hash of
//! the image bytes and the label text, so identical input always yields
//! identical output with no network and negligible CPU. Tests, demos, and
//! offline development run against this mode.

use fxhash::hash64;

use crate::labels::LabelPolicy;
use crate::ScoredLabel;

pub(crate) fn stub_scores(image: &[u8], policy: &LabelPolicy) -> Vec<ScoredLabel> {
    let seed = hash64(&image);
    policy
        .labels
        .iter()
        .map(|label| {
            let h = hash64(&(seed, label.as_str()));
            ScoredLabel {
                label: label.clone(),
                confidence: (h % 1000) as f32 / 999.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_scores_are_deterministic() {
        let policy = LabelPolicy::vandalism();
        let a = stub_scores(b"same photo", &policy);
        let b = stub_scores(b"same photo", &policy);
        assert_eq!(a, b);
    }

    #[test]
    fn different_images_score_differently() {
        let policy = LabelPolicy::vandalism();
        let a = stub_scores(b"photo one", &policy);
        let b = stub_scores(b"photo two", &policy);
        assert_ne!(a, b);
    }

    #[test]
    fn one_score_per_candidate_label_in_range() {
        let policy = LabelPolicy::flooding();
        let scores = stub_scores(b"photo", &policy);

        assert_eq!(scores.len(), policy.labels.len());
        for score in &scores {
            assert!((0.0..=1.0).contains(&score.confidence));
        }
    }
}
