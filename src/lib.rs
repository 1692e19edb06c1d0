//! # face-contour
//!
//! Turns a face photograph, its landmarks and a segmentation label map into
//! an upright image plus an SVG document with one closed path per labelled
//! region.
//!
//! This crate provides:
//! - **Alignment**: level the eye line by rotating the image, the label map
//!   and the landmarks with one affine matrix
//! - **Tracing**: closed boundary contours per label, outer boundaries
//!   clockwise and holes counter-clockwise
//! - **Simplification**: Douglas-Peucker reduction within a pixel tolerance
//! - **Encoding**: deterministic SVG output plus raw contour coordinates
//!
//! ## Pipeline
//!
//! 1. Reject inputs with too few landmarks or mismatched raster sizes
//! 2. Measure the angle between the two eye anchors; rotate when it is 5° or more
//! 3. Trace every non-zero label of the aligned label map
//! 4. Simplify each contour
//! 5. Serialize paths in ascending label order
//!
//! ## Quick Start
//!
//! ```rust
//! use face_contour::{
//!     AlignerConfig, LandmarkSet, Pipeline, PipelineConfig, Point,
//! };
//! use image::{GrayImage, Luma, RgbaImage};
//!
//! let config = PipelineConfig {
//!     aligner: AlignerConfig { left_anchor: 0, right_anchor: 1, ..AlignerConfig::default() },
//!     ..PipelineConfig::default()
//! };
//! let pipeline = Pipeline::new(config).unwrap();
//!
//! let image = RgbaImage::new(100, 100);
//! let labels = GrayImage::from_fn(100, 100, |x, y| {
//!     Luma([u8::from((10..30).contains(&x) && (10..30).contains(&y))])
//! });
//! let landmarks = LandmarkSet::new(
//!     (0..10).map(|i| Point::new(30.0 + 4.0 * i as f64, 40.0)).collect(),
//! );
//!
//! let output = pipeline.process(image, landmarks, labels).unwrap();
//! assert_eq!(output.document.paths().len(), 1);
//! println!("{}", output.document);
//! ```

pub mod aligner;
mod config;
pub mod decode;
mod error;
pub mod geometry;
mod pipeline;
pub mod retry;
pub mod simplify;
pub mod svg;
pub mod tracer;
mod types;

pub use aligner::{AlignedFace, FaceAligner};
pub use config::{AlignerConfig, PipelineConfig, SvgConfig, TracerConfig, MAX_PRECISION};
pub use error::{Error, ErrorKind, Result};
pub use geometry::AffineTransform;
pub use pipeline::{Pipeline, PipelineOutput, Response, Stage};
pub use retry::RetryPolicy;
pub use simplify::simplify;
pub use svg::{PathEntry, RegionContours, SvgEncoder, VectorDocument};
pub use tracer::RegionTracer;
pub use types::{BoundingBox, Contour, LandmarkSet, Point, RegionMap, Winding};
