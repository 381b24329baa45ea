use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::MarketError;

/// Storage flags recorded on a harvest batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConditions {
    #[serde(default)]
    pub temperature_controlled: bool,
    #[serde(default)]
    pub humidity_controlled: bool,
}

impl StorageConditions {
    pub fn factor(&self) -> f64 {
        let temperature = if self.temperature_controlled { 1.0 } else { 1.3 };
        let humidity = if self.humidity_controlled { 1.0 } else { 1.2 };
        temperature * humidity
    }
}

/// Discrete spoilage risk, 1 (very low) to 5 (very high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RiskLevel(u8);

impl RiskLevel {
    pub const MIN: RiskLevel = RiskLevel(1);
    pub const MAX: RiskLevel = RiskLevel(5);

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0)
            .contains(&level)
            .then_some(RiskLevel(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn from_score(score: f64) -> Self {
        match score {
            s if s <= 0.3 => RiskLevel(1),
            s if s <= 0.5 => RiskLevel(2),
            s if s <= 0.7 => RiskLevel(3),
            s if s <= 0.9 => RiskLevel(4),
            _ => RiskLevel(5),
        }
    }
}

/// Inputs of the estimator, borrowed from a batch and its crop profile.
#[derive(Debug, Clone, Copy)]
pub struct RiskInput {
    pub harvest_date: OffsetDateTime,
    pub shelf_life_days: i32,
    pub spoilage_sensitivity: i32,
    pub storage: StorageConditions,
}

/// Whole days between harvest and `now`. Future harvest dates count as zero.
pub fn days_in_storage(harvest_date: OffsetDateTime, now: OffsetDateTime) -> i64 {
    (now - harvest_date).whole_days().max(0)
}

/// Raw score before it is bucketed into a level.
pub fn risk_score(input: &RiskInput, now: OffsetDateTime) -> Result<f64, MarketError> {
    validate(input)?;
    if input.shelf_life_days == 0 {
        return Ok(f64::INFINITY);
    }
    let days = days_in_storage(input.harvest_date, now) as f64;
    Ok((days / f64::from(input.shelf_life_days))
        * (f64::from(input.spoilage_sensitivity) / 10.0)
        * input.storage.factor())
}

pub fn estimate(input: &RiskInput, now: OffsetDateTime) -> Result<RiskLevel, MarketError> {
    risk_score(input, now).map(RiskLevel::from_score)
}

fn validate(input: &RiskInput) -> Result<(), MarketError> {
    if input.shelf_life_days < 0 {
        return Err(MarketError::InvalidInput(format!(
            "shelf life must not be negative, got {}",
            input.shelf_life_days
        )));
    }
    if !(1..=10).contains(&input.spoilage_sensitivity) {
        return Err(MarketError::InvalidInput(format!(
            "spoilage sensitivity must be between 1 and 10, got {}",
            input.spoilage_sensitivity
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::datetime, Duration};

    const NOW: OffsetDateTime = datetime!(2026-10-16 12:00 UTC);

    fn input(days_ago: i64, shelf: i32, sensitivity: i32, storage: StorageConditions) -> RiskInput {
        RiskInput {
            harvest_date: NOW - Duration::days(days_ago),
            shelf_life_days: shelf,
            spoilage_sensitivity: sensitivity,
            storage,
        }
    }

    fn controlled() -> StorageConditions {
        StorageConditions { temperature_controlled: true, humidity_controlled: true }
    }

    #[test]
    fn fresh_well_stored_insensitive_crop_is_lowest_risk() {
        let level = estimate(&input(0, 7, 1, controlled()), NOW).unwrap();
        assert_eq!(level, RiskLevel::MIN);
    }

    #[test]
    fn long_expired_sensitive_uncontrolled_crop_is_highest_risk() {
        let level = estimate(&input(400, 7, 10, StorageConditions::default()), NOW).unwrap();
        assert_eq!(level, RiskLevel::MAX);
    }

    #[test]
    fn thresholds_bucket_scores() {
        // 10-day shelf life, sensitivity 10, controlled: score = days / 10
        let cases = [(3, 1), (4, 2), (5, 2), (6, 3), (7, 3), (8, 4), (9, 4), (10, 5)];
        for (days, expected) in cases {
            let level = estimate(&input(days, 10, 10, controlled()), NOW).unwrap();
            assert_eq!(level.get(), expected, "days = {days}");
        }
    }

    #[test]
    fn storage_factor_compounds() {
        let none = StorageConditions::default();
        assert!((none.factor() - 1.56).abs() < 1e-9);
        let temp_only = StorageConditions { temperature_controlled: true, humidity_controlled: false };
        assert!((temp_only.factor() - 1.2).abs() < 1e-9);
        assert_eq!(controlled().factor(), 1.0);
    }

    #[test]
    fn partial_days_are_floored() {
        let mut i = input(0, 10, 10, controlled());
        i.harvest_date = NOW - Duration::hours(3 * 24 + 23);
        assert_eq!(days_in_storage(i.harvest_date, NOW), 3);
        assert_eq!(estimate(&i, NOW).unwrap().get(), 1);
    }

    #[test]
    fn zero_shelf_life_is_immediately_max_risk() {
        let level = estimate(&input(0, 0, 1, controlled()), NOW).unwrap();
        assert_eq!(level, RiskLevel::MAX);
    }

    #[test]
    fn future_harvest_date_counts_as_fresh() {
        let i = input(-30, 7, 10, StorageConditions::default());
        assert_eq!(days_in_storage(i.harvest_date, NOW), 0);
        assert_eq!(estimate(&i, NOW).unwrap(), RiskLevel::MIN);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let negative_shelf = estimate(&input(1, -1, 5, controlled()), NOW);
        assert!(matches!(negative_shelf, Err(MarketError::InvalidInput(_))));
        for sensitivity in [0, -3, 11] {
            let res = estimate(&input(1, 7, sensitivity, controlled()), NOW);
            assert!(matches!(res, Err(MarketError::InvalidInput(_))), "sensitivity {sensitivity}");
        }
    }

    #[test]
    fn levels_stay_in_range() {
        for days in [-5, 0, 1, 3, 7, 30, 365, 4000] {
            for shelf in [0, 1, 5, 30, 365] {
                for sensitivity in 1..=10 {
                    let level = estimate(
                        &input(days, shelf, sensitivity, StorageConditions::default()),
                        NOW,
                    )
                    .unwrap();
                    assert!((1..=5).contains(&level.get()));
                }
            }
        }
    }

    #[test]
    fn score_is_monotonic_in_days_and_sensitivity() {
        let storage = StorageConditions { temperature_controlled: false, humidity_controlled: true };
        let mut previous = 0.0;
        for days in 0..60 {
            let score = risk_score(&input(days, 14, 6, storage), NOW).unwrap();
            assert!(score >= previous);
            previous = score;
        }
        let mut previous = 0.0;
        for sensitivity in 1..=10 {
            let score = risk_score(&input(9, 14, sensitivity, storage), NOW).unwrap();
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn risk_level_constructor_bounds() {
        assert!(RiskLevel::new(0).is_none());
        assert_eq!(RiskLevel::new(3).map(RiskLevel::get), Some(3));
        assert!(RiskLevel::new(6).is_none());
    }

    #[test]
    fn storage_conditions_default_missing_flags() {
        let parsed: StorageConditions =
            serde_json::from_str(r#"{"temperature_controlled": true}"#).unwrap();
        assert!(parsed.temperature_controlled);
        assert!(!parsed.humidity_controlled);
    }
}
