//! Promotion threshold tuning.
//!
//! The collector reports survival statistics after every minor cycle and
//! asks a [`PromotionPolicy`] for the threshold to use next. The heap only
//! accepts or rejects the suggestion; it never tunes itself.

use crate::config::MIN_PROMOTION_THRESHOLD;
use crate::heap::SurvivalStats;
use crate::object::MAX_AGE;

/// Decides the promotion threshold between minor cycles.
pub trait PromotionPolicy: Send {
    /// Returns the threshold for the next minor cycle, or None to keep the
    /// current one.
    fn next_threshold(&mut self, current: u8, survival: &SurvivalStats) -> Option<u8>;

    /// Short name for logs and telemetry.
    fn name(&self) -> &'static str;
}

/// Never changes the threshold.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedPromotion;

impl PromotionPolicy for FixedPromotion {
    fn next_threshold(&mut self, _current: u8, _survival: &SurvivalStats) -> Option<u8> {
        None
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Reactive threshold tuning.
///
/// When most young objects survive, copying them between survivor regions
/// again and again is wasted work, so the threshold drops by one. When
/// almost nothing survives, objects are given longer to die young and the
/// threshold rises by one. Cycles that saw fewer than `min_sample` young
/// objects are ignored.
#[derive(Debug, Clone, Copy)]
pub struct AdaptivePromotion {
    /// Survival rate at or above which the threshold is lowered
    pub high_water: f64,
    /// Survival rate at or below which the threshold is raised
    pub low_water: f64,
    /// Smallest young population worth reacting to
    pub min_sample: usize,
    pub min_threshold: u8,
    pub max_threshold: u8,
}

impl AdaptivePromotion {
    pub fn new(low_water: f64, high_water: f64) -> Self {
        AdaptivePromotion {
            low_water,
            high_water,
            ..Self::default()
        }
    }
}

impl Default for AdaptivePromotion {
    fn default() -> Self {
        AdaptivePromotion {
            high_water: 0.5,
            low_water: 0.1,
            min_sample: 16,
            min_threshold: MIN_PROMOTION_THRESHOLD,
            max_threshold: MAX_AGE,
        }
    }
}

impl PromotionPolicy for AdaptivePromotion {
    fn next_threshold(&mut self, current: u8, survival: &SurvivalStats) -> Option<u8> {
        if survival.young_before < self.min_sample {
            return None;
        }
        let next = if survival.rate >= self.high_water {
            current.saturating_sub(1).max(self.min_threshold)
        } else if survival.rate <= self.low_water {
            current.saturating_add(1).min(self.max_threshold)
        } else {
            current
        };
        (next != current).then_some(next)
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}
