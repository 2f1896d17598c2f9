//! Level curve
//!
//! `requirement(L) = base + L² · quad + L · linear` is the XP needed to
//! advance from level `L` to `L + 1`. All level arithmetic in the workspace
//! goes through [`LevelCurve`]; nothing else derives levels on its own.

use crate::error::{LevelingError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE: u64 = 100;
pub const DEFAULT_QUAD: u64 = 20;
pub const DEFAULT_LINEAR: u64 = 50;

/// Quadratic XP curve. Stateless and `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCurve {
    base: u64,
    quad: u64,
    linear: u64,
}

/// Position of a total inside its level, computed in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub xp_into_level: u64,
    pub xp_needed_for_level: u64,
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            quad: DEFAULT_QUAD,
            linear: DEFAULT_LINEAR,
        }
    }
}

impl LevelCurve {
    /// Build a curve. It must be strictly positive and strictly increasing,
    /// so `base > 0` and at least one of `quad` / `linear` is non-zero.
    pub fn new(base: u64, quad: u64, linear: u64) -> Result<Self> {
        if base == 0 {
            return Err(LevelingError::InvalidCurve(
                "base must be greater than zero".to_string(),
            ));
        }
        if quad == 0 && linear == 0 {
            return Err(LevelingError::InvalidCurve(
                "quad and linear cannot both be zero".to_string(),
            ));
        }
        Ok(Self { base, quad, linear })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn quad(&self) -> u64 {
        self.quad
    }

    pub fn linear(&self) -> u64 {
        self.linear
    }

    /// XP needed to go from `level` to `level + 1`.
    pub fn requirement_for(&self, level: u32) -> u64 {
        let l = u64::from(level);
        self.base
            .saturating_add(l.saturating_mul(l).saturating_mul(self.quad))
            .saturating_add(l.saturating_mul(self.linear))
    }

    pub fn level_from_total(&self, total_xp: u64) -> u32 {
        self.progress_within_level(total_xp).level
    }

    /// Walk the curve from level 0, subtracting each requirement while the
    /// remainder still covers it.
    pub fn progress_within_level(&self, total_xp: u64) -> LevelProgress {
        let mut level = 0u32;
        let mut remainder = total_xp;

        loop {
            let needed = self.requirement_for(level);
            if remainder < needed || level == u32::MAX {
                return LevelProgress {
                    level,
                    xp_into_level: remainder,
                    xp_needed_for_level: needed,
                };
            }
            remainder -= needed;
            level += 1;
        }
    }

    /// Cumulative XP needed to reach `level` from zero.
    pub fn total_for_level(&self, level: u32) -> u64 {
        (0..level).fold(0u64, |acc, l| acc.saturating_add(self.requirement_for(l)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_requirements() {
        let curve = LevelCurve::default();
        assert_eq!(curve.requirement_for(0), 100);
        assert_eq!(curve.requirement_for(1), 170);
        assert_eq!(curve.requirement_for(2), 280);
        assert_eq!(curve.requirement_for(10), 100 + 2000 + 500);
    }

    #[test]
    fn test_requirement_strictly_increasing() {
        let curve = LevelCurve::default();
        for level in 0..500 {
            assert!(
                curve.requirement_for(level + 1) > curve.requirement_for(level),
                "curve flattened at level {}",
                level
            );
        }

        let linear_only = LevelCurve::new(1, 0, 1).unwrap();
        for level in 0..500 {
            assert!(linear_only.requirement_for(level + 1) > linear_only.requirement_for(level));
        }
    }

    #[test]
    fn test_level_boundaries() {
        let curve = LevelCurve::default();
        assert_eq!(curve.level_from_total(0), 0);
        assert_eq!(curve.level_from_total(99), 0);
        assert_eq!(curve.level_from_total(100), 1);
        assert_eq!(curve.level_from_total(269), 1);
        assert_eq!(curve.level_from_total(270), 2);
        assert_eq!(curve.level_from_total(500), 2);
        assert_eq!(curve.level_from_total(550), 3);
    }

    #[test]
    fn test_progress_agrees_with_level() {
        let curve = LevelCurve::default();
        for total in (0..20_000u64).step_by(7) {
            let progress = curve.progress_within_level(total);
            assert_eq!(progress.level, curve.level_from_total(total));
            assert!(progress.xp_into_level < progress.xp_needed_for_level);
            assert_eq!(progress.xp_needed_for_level, curve.requirement_for(progress.level));
        }
    }

    #[test]
    fn test_progress_partial_level() {
        let progress = LevelCurve::default().progress_within_level(500);
        assert_eq!(
            progress,
            LevelProgress {
                level: 2,
                xp_into_level: 230,
                xp_needed_for_level: 280,
            }
        );
    }

    #[test]
    fn test_total_for_level_inverts_level_from_total() {
        let curve = LevelCurve::default();
        assert_eq!(curve.total_for_level(0), 0);
        assert_eq!(curve.total_for_level(1), 100);
        assert_eq!(curve.total_for_level(3), 100 + 170 + 280);
        for level in 0..200 {
            let total = curve.total_for_level(level);
            assert_eq!(curve.level_from_total(total), level);
            if total > 0 {
                assert_eq!(curve.level_from_total(total - 1), level - 1);
            }
        }
    }

    #[test]
    fn test_huge_totals_do_not_overflow() {
        let curve = LevelCurve::default();
        let progress = curve.progress_within_level(u64::MAX);
        assert!(progress.level > 0);
        assert!(progress.xp_into_level < progress.xp_needed_for_level);
        assert_eq!(curve.requirement_for(u32::MAX), u64::MAX);
    }

    #[test]
    fn test_invalid_curves_rejected() {
        assert!(matches!(
            LevelCurve::new(0, 20, 50),
            Err(LevelingError::InvalidCurve(_))
        ));
        assert!(matches!(
            LevelCurve::new(100, 0, 0),
            Err(LevelingError::InvalidCurve(_))
        ));
        assert!(LevelCurve::new(100, 0, 50).is_ok());
    }
}
