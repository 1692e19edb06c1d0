//! In-plane face alignment.
//!
//! The angle between two eye anchors is measured and, when it is large
//! enough, the photograph, the label map and every landmark are rotated by
//! the same matrix so the eyes end up level.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::geometric_transformations::Interpolation;

use crate::config::AlignerConfig;
use crate::error::{Error, Result};
use crate::geometry::{warp_raster, AffineTransform};
use crate::types::{LandmarkSet, Point};

/// Minimum anchor separation in pixels for a meaningful angle.
const MIN_ANCHOR_DISTANCE: f64 = 1e-6;

/// Result of [`FaceAligner::align`].
#[derive(Debug, Clone)]
pub struct AlignedFace {
    pub image: RgbaImage,
    pub landmarks: LandmarkSet,
    /// Measured eye-line angle in degrees, or 0 when no rotation was applied.
    pub angle: f64,
    /// Mapping from input coordinates to aligned coordinates.
    pub transform: AffineTransform,
}

impl AlignedFace {
    pub fn is_rotated(&self) -> bool {
        self.angle != 0.0
    }
}

/// Stateless aligner; holds only its configuration.
#[derive(Debug, Clone)]
pub struct FaceAligner {
    config: AlignerConfig,
}

impl FaceAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Number of landmarks required to address both anchors.
    pub fn required_landmarks(&self) -> usize {
        self.config.left_anchor.max(self.config.right_anchor) + 1
    }

    /// Eye-line angle in degrees, `atan2(dy, dx)` from left to right anchor.
    pub fn estimate_angle(&self, landmarks: &LandmarkSet) -> Result<f64> {
        let left = self.anchor(landmarks, self.config.left_anchor)?;
        let right = self.anchor(landmarks, self.config.right_anchor)?;

        let dx = right.x - left.x;
        let dy = right.y - left.y;
        if !dx.is_finite() || !dy.is_finite() {
            return Err(Error::GeometryFailure(
                "anchor landmarks are not finite".into(),
            ));
        }
        if dx.hypot(dy) < MIN_ANCHOR_DISTANCE {
            return Err(Error::GeometryFailure(format!(
                "anchor landmarks {} and {} coincide; rotation angle is undefined",
                self.config.left_anchor, self.config.right_anchor
            )));
        }

        Ok(dy.atan2(dx).to_degrees())
    }

    /// Rotation that levels the anchors for an image of the given size.
    pub fn correction(&self, angle: f64, width: u32, height: u32) -> AffineTransform {
        let center = Point::new(f64::from(width / 2), f64::from(height / 2));
        AffineTransform::rotation_about(center, -angle)
    }

    /// Level the face in `image`, moving `landmarks` with it.
    ///
    /// Near-upright faces (below the configured threshold) come back
    /// untouched with an angle of 0.
    pub fn align(&self, image: RgbaImage, landmarks: LandmarkSet) -> Result<AlignedFace> {
        let angle = self.estimate_angle(&landmarks)?;
        log::debug!("estimated eye-line angle: {angle:.2} degrees");

        if angle.abs() < self.config.min_angle_degrees {
            return Ok(AlignedFace {
                image,
                landmarks,
                angle: 0.0,
                transform: AffineTransform::identity(),
            });
        }

        let transform = self.correction(angle, image.width(), image.height());
        let image = warp_raster(
            &image,
            &transform,
            Interpolation::Bicubic,
            Rgba([0, 0, 0, 0]),
        )?;
        let landmarks = LandmarkSet::new(transform.apply_all(&landmarks.points));

        log::debug!("rotated face by {:.2} degrees", -angle);
        Ok(AlignedFace {
            image,
            landmarks,
            angle,
            transform,
        })
    }

    /// Apply an alignment transform to a label map.
    ///
    /// Labels are categorical, so sampling is nearest-neighbour and pixels
    /// rotated in from outside the canvas become background.
    pub fn align_labels(&self, labels: GrayImage, transform: &AffineTransform) -> Result<GrayImage> {
        if *transform == AffineTransform::identity() {
            return Ok(labels);
        }
        warp_raster(&labels, transform, Interpolation::Nearest, Luma([0]))
    }

    fn anchor(&self, landmarks: &LandmarkSet, idx: usize) -> Result<Point> {
        landmarks.get(idx).ok_or_else(|| {
            Error::InvalidInput(format!(
                "anchor landmark {idx} requested but only {} landmarks supplied (need {})",
                landmarks.num_landmarks(),
                self.required_landmarks()
            ))
        })
    }
}

impl Default for FaceAligner {
    fn default() -> Self {
        Self::new(AlignerConfig::default())
    }
}
