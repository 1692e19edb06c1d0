//! The consumer-facing transformation: align, trace, simplify, encode.
//!
//! [`Pipeline`] holds only immutable configuration, so one instance can be
//! shared by any number of concurrent callers. Every call builds fresh data
//! and either returns a complete result or the first stage error.

use std::time::Instant;

use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::aligner::{AlignedFace, FaceAligner};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::simplify::simplify_regions;
use crate::svg::{RegionContours, SvgEncoder, VectorDocument};
use crate::tracer::RegionTracer;
use crate::types::{LandmarkSet, RegionMap};

/// Pipeline stage, used to report where an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Align,
    Trace,
    Simplify,
    Encode,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Align => "align",
            Stage::Trace => "trace",
            Stage::Simplify => "simplify",
            Stage::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// Everything a successful run produces.
///
/// Landmarks and contours use different pixel conventions. A landmark at
/// `(i, j)` sits on the centre of pixel `(i, j)`, the position the raster
/// warp samples. Contour vertices sit on pixel corners, so pixel `(i, j)`
/// covers `[i, i + 1] x [j, j + 1]` and its centre is `(i + 0.5, j + 0.5)`.
/// Add half a pixel to a landmark to compare it with contour geometry.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub document: VectorDocument,
    /// Simplified contours per label, in aligned image coordinates, with
    /// vertices on pixel corners.
    pub regions: RegionMap,
    /// The same contours as plain coordinate arrays.
    pub region_contours: RegionContours,
    pub alignment: AlignedFace,
}

/// Transport shape handed back to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Base64 of the SVG document.
    pub svg: String,
    pub mask_contours: RegionContours,
}

impl PipelineOutput {
    pub fn to_response(&self) -> Response {
        Response {
            svg: self.document.to_base64(),
            mask_contours: self.region_contours.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    aligner: FaceAligner,
    tracer: RegionTracer,
    encoder: SvgEncoder,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            aligner: FaceAligner::new(config.aligner.clone()),
            tracer: RegionTracer::new(config.tracer.clone()),
            encoder: SvgEncoder::new(config.svg.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in order, failing fast on the first error.
    pub fn process(
        &self,
        image: RgbaImage,
        landmarks: LandmarkSet,
        label_map: GrayImage,
    ) -> Result<PipelineOutput> {
        self.run(image, landmarks, label_map, None)
    }

    /// Like [`process`](Self::process), but gives up between stages once
    /// `deadline` has passed. A stage that has started always finishes.
    pub fn process_with_deadline(
        &self,
        image: RgbaImage,
        landmarks: LandmarkSet,
        label_map: GrayImage,
        deadline: Instant,
    ) -> Result<PipelineOutput> {
        self.run(image, landmarks, label_map, Some(deadline))
    }

    fn run(
        &self,
        image: RgbaImage,
        landmarks: LandmarkSet,
        label_map: GrayImage,
        deadline: Option<Instant>,
    ) -> Result<PipelineOutput> {
        let check = |stage: Stage| match deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded(stage)),
            _ => Ok(()),
        };

        check(Stage::Validate)?;
        self.validate(&image, &landmarks, &label_map)
            .map_err(|e| e.in_stage(Stage::Validate))?;

        check(Stage::Align)?;
        let alignment = self
            .aligner
            .align(image, landmarks)
            .map_err(|e| e.in_stage(Stage::Align))?;
        let label_map = self
            .aligner
            .align_labels(label_map, &alignment.transform)
            .map_err(|e| e.in_stage(Stage::Align))?;

        check(Stage::Trace)?;
        let traced = self
            .tracer
            .trace(&label_map)
            .map_err(|e| e.in_stage(Stage::Trace))?;
        drop(label_map);

        check(Stage::Simplify)?;
        let regions = simplify_regions(&traced, self.config.simplify_tolerance)
            .map_err(|e| e.in_stage(Stage::Simplify))?;

        check(Stage::Encode)?;
        let (width, height) = alignment.image.dimensions();
        let document = self
            .encoder
            .encode(&regions, width, height)
            .map_err(|e| e.in_stage(Stage::Encode))?;
        let region_contours = self.encoder.region_contours(&regions);

        log::debug!(
            "processed {} regions into {} paths (angle {:.2})",
            regions.len(),
            document.paths().len(),
            alignment.angle
        );
        Ok(PipelineOutput {
            document,
            regions,
            region_contours,
            alignment,
        })
    }

    fn validate(&self, image: &RgbaImage, landmarks: &LandmarkSet, labels: &GrayImage) -> Result<()> {
        if landmarks.num_landmarks() < self.config.min_landmarks {
            return Err(Error::InvalidInput(format!(
                "{} landmarks supplied, at least {} required",
                landmarks.num_landmarks(),
                self.config.min_landmarks
            )));
        }
        if let Some(i) = landmarks.points.iter().position(|p| !p.is_finite()) {
            return Err(Error::InvalidInput(format!("landmark {i} is not finite")));
        }

        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(Error::DecodeFailure(format!("image has empty dimensions {w}x{h}")));
        }
        if image.as_raw().len() != w as usize * h as usize * 4 {
            return Err(Error::DecodeFailure("image buffer does not match its dimensions".into()));
        }
        if labels.dimensions() != (w, h) {
            let (lw, lh) = labels.dimensions();
            return Err(Error::InvalidInput(format!(
                "label map is {lw}x{lh} but image is {w}x{h}"
            )));
        }
        Ok(())
    }
}
