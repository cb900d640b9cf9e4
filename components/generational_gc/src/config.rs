//! Tuning configuration for the collector.
//!
//! Every option is validated when the collector is built. Out-of-range
//! values are rejected with [`GcError::Configuration`], never clamped.

use crate::error::{GcError, GcResult};
use crate::object::MAX_AGE;
use serde::{Deserialize, Serialize};

/// Smallest accepted promotion threshold.
pub const MIN_PROMOTION_THRESHOLD: u8 = 2;

/// Collector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Bytes covered by one card-table entry (power of two)
    pub card_size: usize,
    /// Survival age at which a young object is promoted to Old (2..=15)
    pub promotion_threshold: u8,
    /// Capacity of Eden in bytes
    pub eden_size: usize,
    /// Eden size divided by the size of one survivor region
    pub survivor_ratio: usize,
    /// Fraction of the target survivor region that may be filled before
    /// survivors overflow into Old
    pub survivor_occupancy_limit: f64,
    /// Initial capacity of Old in bytes
    pub old_size: usize,
    /// Old occupancy fraction that requests a major cycle, and after a
    /// major cycle, growth of Old
    pub old_growth_trigger: f64,
    /// Minor cycles between forced major cycles (0 disables)
    pub major_cycle_interval: usize,
    /// Gray objects processed per tracer step
    pub incremental_step_budget: usize,
    /// Check the tri-color invariant after every completed trace
    pub verify_after_trace: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            card_size: 512,
            promotion_threshold: 6,
            eden_size: 256 * 1024, // 256KB
            survivor_ratio: 8,
            survivor_occupancy_limit: 0.9,
            old_size: 1024 * 1024, // 1MB
            old_growth_trigger: 0.75,
            major_cycle_interval: 0,
            incremental_step_budget: 256,
            verify_after_trace: cfg!(debug_assertions),
        }
    }
}

impl GcConfig {
    /// Parses a JSON document and validates it. Missing keys take their
    /// default values.
    pub fn from_json(text: &str) -> GcResult<Self> {
        let config: GcConfig = serde_json::from_str(text)
            .map_err(|e| GcError::config(format!("malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> String {
        // Every field is a plain number or bool; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Checks every option against its accepted range.
    pub fn validate(&self) -> GcResult<()> {
        if self.card_size == 0 || !self.card_size.is_power_of_two() {
            return Err(GcError::config(format!(
                "card_size must be a power of two, got {}",
                self.card_size
            )));
        }
        validate_promotion_threshold(self.promotion_threshold)?;
        if self.eden_size == 0 {
            return Err(GcError::config("eden_size must be non-zero"));
        }
        if self.survivor_ratio == 0 {
            return Err(GcError::config("survivor_ratio must be at least 1"));
        }
        if self.survivor_size() == 0 {
            return Err(GcError::config(format!(
                "survivor_ratio {} leaves no survivor space for eden_size {}",
                self.survivor_ratio, self.eden_size
            )));
        }
        check_fraction("survivor_occupancy_limit", self.survivor_occupancy_limit)?;
        if self.old_size == 0 {
            return Err(GcError::config("old_size must be non-zero"));
        }
        check_fraction("old_growth_trigger", self.old_growth_trigger)?;
        if self.incremental_step_budget == 0 {
            return Err(GcError::config("incremental_step_budget must be at least 1"));
        }
        Ok(())
    }

    /// Capacity of each survivor region.
    pub fn survivor_size(&self) -> usize {
        if self.survivor_ratio == 0 {
            return 0;
        }
        self.eden_size / self.survivor_ratio
    }

    pub fn with_card_size(mut self, card_size: usize) -> Self {
        self.card_size = card_size;
        self
    }

    pub fn with_promotion_threshold(mut self, threshold: u8) -> Self {
        self.promotion_threshold = threshold;
        self
    }

    pub fn with_eden_size(mut self, bytes: usize) -> Self {
        self.eden_size = bytes;
        self
    }

    pub fn with_survivor_ratio(mut self, ratio: usize) -> Self {
        self.survivor_ratio = ratio;
        self
    }

    pub fn with_survivor_occupancy_limit(mut self, limit: f64) -> Self {
        self.survivor_occupancy_limit = limit;
        self
    }

    pub fn with_old_size(mut self, bytes: usize) -> Self {
        self.old_size = bytes;
        self
    }

    pub fn with_old_growth_trigger(mut self, trigger: f64) -> Self {
        self.old_growth_trigger = trigger;
        self
    }

    pub fn with_major_cycle_interval(mut self, cycles: usize) -> Self {
        self.major_cycle_interval = cycles;
        self
    }

    pub fn with_incremental_step_budget(mut self, budget: usize) -> Self {
        self.incremental_step_budget = budget;
        self
    }

    pub fn with_verify_after_trace(mut self, verify: bool) -> Self {
        self.verify_after_trace = verify;
        self
    }
}

/// Rejects promotion thresholds outside `2..=15`.
pub fn validate_promotion_threshold(threshold: u8) -> GcResult<()> {
    if !(MIN_PROMOTION_THRESHOLD..=MAX_AGE).contains(&threshold) {
        return Err(GcError::config(format!(
            "promotion_threshold must be within {}..={}, got {}",
            MIN_PROMOTION_THRESHOLD, MAX_AGE, threshold
        )));
    }
    Ok(())
}

fn check_fraction(name: &str, value: f64) -> GcResult<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(GcError::config(format!(
            "{} must be within (0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}
