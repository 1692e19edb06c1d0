//! Pipeline configuration.
//!
//! One [`PipelineConfig`] is built per process (defaults, or a JSON file) and
//! shared by reference; nothing in it changes per request.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest supported number of decimal places in SVG coordinates.
pub const MAX_PRECISION: usize = 6;

/// Eye anchors and the rotation threshold.
///
/// The default indices are the eye-corner points of the 468-point face mesh
/// the upstream detector emits. Other landmark models need their own values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    pub left_anchor: usize,
    pub right_anchor: usize,
    /// Faces tilted less than this (in degrees) are left as they are.
    pub min_angle_degrees: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            left_anchor: 33,
            right_anchor: 263,
            min_angle_degrees: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Contours enclosing fewer square pixels than this are dropped.
    pub min_region_area: f64,
    /// Trace labels on the rayon thread pool.
    pub parallel: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            min_region_area: 3.0,
            parallel: true,
        }
    }
}

/// Presentation and formatting of the SVG document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvgConfig {
    /// Decimal places kept in path coordinates.
    pub precision: usize,
    pub fill: String,
    pub stroke: String,
    pub stroke_width: f64,
    /// Optional anatomical names for label values, emitted as `data-region`.
    pub region_names: BTreeMap<u8, String>,
}

impl Default for SvgConfig {
    fn default() -> Self {
        Self {
            precision: 2,
            fill: "none".into(),
            stroke: "black".into(),
            stroke_width: 1.0,
            region_names: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Requests with fewer landmarks are rejected before any stage runs.
    pub min_landmarks: usize,
    /// Maximum deviation in pixels allowed when simplifying contours.
    pub simplify_tolerance: f64,
    pub aligner: AlignerConfig,
    pub tracer: TracerConfig,
    pub svg: SvgConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_landmarks: 10,
            simplify_tolerance: 1.0,
            aligner: AlignerConfig::default(),
            tracer: TracerConfig::default(),
            svg: SvgConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(Error::InvalidInput(format!(
                "simplify_tolerance must be a non-negative number, got {}",
                self.simplify_tolerance
            )));
        }
        if !self.aligner.min_angle_degrees.is_finite() || self.aligner.min_angle_degrees < 0.0 {
            return Err(Error::InvalidInput(format!(
                "min_angle_degrees must be a non-negative number, got {}",
                self.aligner.min_angle_degrees
            )));
        }
        if self.aligner.left_anchor == self.aligner.right_anchor {
            return Err(Error::InvalidInput(format!(
                "left and right anchors are both landmark {}",
                self.aligner.left_anchor
            )));
        }
        if !self.tracer.min_region_area.is_finite() || self.tracer.min_region_area < 0.0 {
            return Err(Error::InvalidInput(format!(
                "min_region_area must be a non-negative number, got {}",
                self.tracer.min_region_area
            )));
        }
        if self.svg.precision > MAX_PRECISION {
            return Err(Error::InvalidInput(format!(
                "svg precision {} exceeds the maximum of {MAX_PRECISION}",
                self.svg.precision
            )));
        }
        if self.svg.region_names.contains_key(&0) {
            return Err(Error::InvalidInput(
                "label 0 is background and cannot be named".into(),
            ));
        }
        Ok(())
    }
}
