//! Runtime tuning knobs for kernel construction.

use crate::error::{Error, Result};
use crate::kernels::{DEFAULT_DOG_SIGMA_RATIO, DEFAULT_SIGMA_HW_RATIO, MAX_KERNEL_HW};

/// Kernel-construction knobs shared by every filter object.
///
/// The defaults reproduce the shipped detector behavior; deserialize a
/// partial document to override individual fields.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FilterTuning {
    /// Kernel half-width per axis is `ceil(sigma_hw_ratio * sigma)`.
    pub sigma_hw_ratio: f64,
    /// Default inhibitory/excitatory sigma ratio for DoG filters. Must be > 1.
    pub dog_sigma_ratio: f64,
    /// Hard ceiling on any kernel half-width.
    pub max_kernel_hw: usize,
    /// Re-center LoG kernels so the implied full kernel sums to zero.
    ///
    /// Off by default: the detector ships with the raw scale-normalized LoG,
    /// which keeps a small DC response.
    pub log_zero_sum: bool,
}

impl Default for FilterTuning {
    fn default() -> Self {
        Self {
            sigma_hw_ratio: DEFAULT_SIGMA_HW_RATIO,
            dog_sigma_ratio: DEFAULT_DOG_SIGMA_RATIO,
            max_kernel_hw: MAX_KERNEL_HW,
            log_zero_sum: false,
        }
    }
}

impl FilterTuning {
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma_hw_ratio > 0.0) {
            return Err(Error::ParameterValue(format!(
                "sigma_hw_ratio must be positive, got {}",
                self.sigma_hw_ratio
            )));
        }
        if !(self.dog_sigma_ratio > 1.0) {
            return Err(Error::ParameterValue(format!(
                "dog_sigma_ratio must be > 1, got {}",
                self.dog_sigma_ratio
            )));
        }
        if self.max_kernel_hw == 0 {
            return Err(Error::ParameterValue(
                "max_kernel_hw must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Default half-width for a kernel at `sigma`, at least 1.
    pub fn default_hw(&self, sigma: f64) -> usize {
        ((self.sigma_hw_ratio * sigma).ceil() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_behavior() {
        let t = FilterTuning::default();
        assert_eq!(t.sigma_hw_ratio, 3.0);
        assert_eq!(t.dog_sigma_ratio, 1.1);
        assert_eq!(t.max_kernel_hw, 64);
        assert!(!t.log_zero_sum);
        t.validate().expect("defaults are valid");
    }

    #[test]
    fn default_hw_rounds_up() {
        let t = FilterTuning::default();
        assert_eq!(t.default_hw(1.0), 3);
        assert_eq!(t.default_hw(1.1), 4);
        assert_eq!(t.default_hw(0.1), 1);
    }

    #[test]
    fn bad_ratio_is_rejected() {
        let t = FilterTuning {
            dog_sigma_ratio: 1.0,
            ..FilterTuning::default()
        };
        assert!(matches!(t.validate(), Err(Error::ParameterValue(_))));
    }

    #[test]
    fn partial_document_fills_defaults() {
        let t: FilterTuning = serde_json::from_str(r#"{"log_zero_sum": true}"#).unwrap();
        assert!(t.log_zero_sum);
        assert_eq!(t.max_kernel_hw, 64);
    }
}
