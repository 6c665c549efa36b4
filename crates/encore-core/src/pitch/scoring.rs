//! Cents-based scoring and feedback tiers

use serde::{Deserialize, Serialize};

use crate::lyrics::Rgb;
use crate::music::cents_between;

/// Upper bound (exclusive) of the "perfect" tier in cents
pub const PERFECT_CENTS: f64 = 15.0;
/// Upper bound (exclusive) of the "slightly off" tier in cents
pub const SLIGHTLY_OFF_CENTS: f64 = 50.0;
/// Upper bound (exclusive) of the "off" tier in cents
pub const OFF_CENTS: f64 = 100.0;

/// Display feedback bucket of a pitch result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackTier {
    Perfect,
    SlightlyOff,
    Off,
    FarOff,
}

impl FeedbackTier {
    /// Bucket by `|cents|`
    pub fn from_cents(cents: f64) -> Self {
        let magnitude = cents.abs();
        if magnitude < PERFECT_CENTS {
            FeedbackTier::Perfect
        } else if magnitude < SLIGHTLY_OFF_CENTS {
            FeedbackTier::SlightlyOff
        } else if magnitude < OFF_CENTS {
            FeedbackTier::Off
        } else {
            FeedbackTier::FarOff
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            FeedbackTier::Perfect => "Perfect!",
            FeedbackTier::SlightlyOff => "Almost there",
            FeedbackTier::Off => "A little off",
            FeedbackTier::FarOff => "Keep trying",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            FeedbackTier::Perfect => "🎯",
            FeedbackTier::SlightlyOff => "👍",
            FeedbackTier::Off => "🤔",
            FeedbackTier::FarOff => "💪",
        }
    }

    pub fn color(self) -> Rgb {
        match self {
            FeedbackTier::Perfect => Rgb::new(0x4C, 0xAF, 0x50),
            FeedbackTier::SlightlyOff => Rgb::new(0x8B, 0xC3, 0x4A),
            FeedbackTier::Off => Rgb::new(0xFF, 0x98, 0x00),
            FeedbackTier::FarOff => Rgb::new(0xF4, 0x43, 0x36),
        }
    }
}

/// Which side of the target the singer is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PitchDirection {
    Sharp,
    Flat,
    /// Within the perfect tier
    Centered,
}

impl PitchDirection {
    pub fn from_cents(cents: f64) -> Self {
        if cents.abs() < PERFECT_CENTS {
            PitchDirection::Centered
        } else if cents > 0.0 {
            PitchDirection::Sharp
        } else {
            PitchDirection::Flat
        }
    }
}

/// Scoring thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringRules {
    /// `|cents|` at or below which a sample is on pitch
    pub tolerance_cents: f64,
    /// `|cents|` at which accuracy reaches zero
    pub zero_accuracy_cents: f64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            tolerance_cents: 50.0,
            zero_accuracy_cents: 200.0,
        }
    }
}

/// Score of one detected frequency against a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub cents: f64,
    pub accuracy: f64,
    pub is_on_pitch: bool,
    pub tier: FeedbackTier,
    pub direction: PitchDirection,
}

/// Score `detected` Hz against `target` Hz at the given confidence
///
/// `accuracy = (1 - |cents| / zero_accuracy_cents).max(0) * confidence`,
/// clamped to 0..1.
pub fn score(detected: f64, target: f64, confidence: f64, rules: &ScoringRules) -> Score {
    let cents = cents_between(detected, target);
    let magnitude = cents.abs();
    let falloff = if rules.zero_accuracy_cents > 0.0 {
        (1.0 - magnitude / rules.zero_accuracy_cents).max(0.0)
    } else {
        0.0
    };

    Score {
        cents,
        accuracy: (falloff * confidence.clamp(0.0, 1.0)).clamp(0.0, 1.0),
        is_on_pitch: magnitude <= rules.tolerance_cents,
        tier: FeedbackTier::from_cents(cents),
        direction: PitchDirection::from_cents(cents),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let s = score(440.0, 440.0, 1.0, &ScoringRules::default());
        assert_eq!(s.cents, 0.0);
        assert_eq!(s.accuracy, 1.0);
        assert!(s.is_on_pitch);
        assert_eq!(s.tier, FeedbackTier::Perfect);
        assert_eq!(s.direction, PitchDirection::Centered);
    }

    #[test]
    fn test_one_semitone_sharp() {
        let s = score(466.16, 440.0, 1.0, &ScoringRules::default());
        assert!((s.cents - 100.0).abs() < 0.1, "cents {}", s.cents);
        assert!(!s.is_on_pitch);
        assert_eq!(s.direction, PitchDirection::Sharp);
        assert!((s.accuracy - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_accuracy_monotonic_and_scaled_by_confidence() {
        let rules = ScoringRules::default();
        let mut previous = f64::INFINITY;
        for cents in (0..=300).step_by(10) {
            let detected = 440.0 * 2f64.powf(-(cents as f64) / 1200.0);
            let s = score(detected, 440.0, 1.0, &rules);
            assert!(s.accuracy <= previous);
            assert!((0.0..=1.0).contains(&s.accuracy));
            previous = s.accuracy;
        }
        assert_eq!(score(440.0, 440.0, 0.6, &rules).accuracy, 0.6);
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let rules = ScoringRules {
            tolerance_cents: 50.0,
            zero_accuracy_cents: 200.0,
        };
        let at_tolerance = 440.0 * 2f64.powf(49.999 / 1200.0);
        assert!(score(at_tolerance, 440.0, 1.0, &rules).is_on_pitch);
        let past = 440.0 * 2f64.powf(50.5 / 1200.0);
        assert!(!score(past, 440.0, 1.0, &rules).is_on_pitch);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(FeedbackTier::from_cents(14.9), FeedbackTier::Perfect);
        assert_eq!(FeedbackTier::from_cents(-15.0), FeedbackTier::SlightlyOff);
        assert_eq!(FeedbackTier::from_cents(49.9), FeedbackTier::SlightlyOff);
        assert_eq!(FeedbackTier::from_cents(50.0), FeedbackTier::Off);
        assert_eq!(FeedbackTier::from_cents(-99.9), FeedbackTier::Off);
        assert_eq!(FeedbackTier::from_cents(100.0), FeedbackTier::FarOff);
        assert_eq!(PitchDirection::from_cents(-30.0), PitchDirection::Flat);
    }

    #[test]
    fn test_tier_display_fields() {
        for tier in [
            FeedbackTier::Perfect,
            FeedbackTier::SlightlyOff,
            FeedbackTier::Off,
            FeedbackTier::FarOff,
        ] {
            assert!(!tier.message().is_empty());
            assert!(!tier.emoji().is_empty());
        }
        assert_ne!(FeedbackTier::Perfect.color(), FeedbackTier::FarOff.color());
    }
}
