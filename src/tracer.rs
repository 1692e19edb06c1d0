//! Label-map boundary tracing.
//!
//! Each label is traced independently by following the cracks between
//! pixels: a boundary edge runs along a pixel side that separates a pixel of
//! the label from one that is not. Edges are walked with the region on the
//! right-hand side, which makes outer boundaries clockwise and hole
//! boundaries counter-clockwise on screen. Vertices land on integer pixel
//! corners, so a filled rectangle covering pixels `x0..x1` by `y0..y1`
//! traces to exactly `(x0, y0)`-`(x1, y1)`. The centre of pixel `(x, y)` is
//! therefore `(x + 0.5, y + 0.5)` in contour space.
//!
//! Regions are 4-connected: pixels that only touch diagonally belong to
//! separate contours. Background is therefore 8-connected, which is what
//! keeps a one-pixel-wide ring from leaking into its hole.

use image::GrayImage;
use rayon::prelude::*;

use crate::config::TracerConfig;
use crate::error::{Error, Result};
use crate::geometry::point_in_polygon;
use crate::types::{Contour, Point, RegionMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    East,
    South,
    West,
    North,
}

impl Dir {
    fn step(self) -> (i64, i64) {
        match self {
            Dir::East => (1, 0),
            Dir::South => (0, 1),
            Dir::West => (-1, 0),
            Dir::North => (0, -1),
        }
    }

    /// Right turn on screen.
    fn cw(self) -> Dir {
        match self {
            Dir::East => Dir::South,
            Dir::South => Dir::West,
            Dir::West => Dir::North,
            Dir::North => Dir::East,
        }
    }

    fn ccw(self) -> Dir {
        match self {
            Dir::East => Dir::North,
            Dir::North => Dir::West,
            Dir::West => Dir::South,
            Dir::South => Dir::East,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Dir::East => 1,
            Dir::South => 2,
            Dir::West => 4,
            Dir::North => 8,
        }
    }

    /// Pixel on the right of the edge leaving corner `(vx, vy)` in this direction.
    fn right_pixel(self, vx: i64, vy: i64) -> (i64, i64) {
        match self {
            Dir::East => (vx, vy),
            Dir::South => (vx - 1, vy),
            Dir::West => (vx - 1, vy - 1),
            Dir::North => (vx, vy - 1),
        }
    }

    fn left_pixel(self, vx: i64, vy: i64) -> (i64, i64) {
        match self {
            Dir::East => (vx, vy - 1),
            Dir::South => (vx, vy),
            Dir::West => (vx - 1, vy),
            Dir::North => (vx - 1, vy - 1),
        }
    }
}

/// Binary view of one label with per-pixel visited edge bits.
struct LabelMask<'a> {
    data: &'a [u8],
    width: i64,
    height: i64,
    label: u8,
    visited: Vec<u8>,
}

impl<'a> LabelMask<'a> {
    fn new(labels: &'a GrayImage, label: u8) -> Self {
        let (width, height) = labels.dimensions();
        Self {
            data: labels.as_raw(),
            width: i64::from(width),
            height: i64::from(height),
            label,
            visited: vec![0; width as usize * height as usize],
        }
    }

    fn inside(&self, (x, y): (i64, i64)) -> bool {
        x >= 0
            && y >= 0
            && x < self.width
            && y < self.height
            && self.data[(y * self.width + x) as usize] == self.label
    }

    fn index(&self, (x, y): (i64, i64)) -> usize {
        (y * self.width + x) as usize
    }

    fn is_visited(&self, pixel: (i64, i64), dir: Dir) -> bool {
        self.visited[self.index(pixel)] & dir.bit() != 0
    }

    fn mark(&mut self, pixel: (i64, i64), dir: Dir) {
        let i = self.index(pixel);
        self.visited[i] |= dir.bit();
    }

    /// Walk one closed boundary starting with the top edge of `(x, y)`.
    ///
    /// Returns the corner vertices only; straight runs are collapsed.
    fn follow(&mut self, x: i64, y: i64) -> Vec<Point> {
        let start = ((x, y), Dir::East);
        let limit = 4 * (self.width * self.height) as usize + 4;

        let mut steps: Vec<((i64, i64), Dir)> = Vec::new();
        let (mut v, mut d) = start;
        loop {
            self.mark(d.right_pixel(v.0, v.1), d);
            steps.push((v, d));

            let (sx, sy) = d.step();
            v = (v.0 + sx, v.1 + sy);
            let ahead_right = self.inside(d.right_pixel(v.0, v.1));
            let ahead_left = self.inside(d.left_pixel(v.0, v.1));
            d = if !ahead_right {
                d.cw()
            } else if !ahead_left {
                d
            } else {
                d.ccw()
            };

            if (v, d) == start {
                break;
            }
            if steps.len() > limit {
                log::warn!("boundary walk from ({x}, {y}) did not close; truncating");
                break;
            }
        }

        let n = steps.len();
        steps
            .iter()
            .enumerate()
            .filter(|(i, (_, dir))| steps[(i + n - 1) % n].1 != *dir)
            .map(|(_, ((vx, vy), _))| Point::new(*vx as f64, *vy as f64))
            .collect()
    }
}

/// Distinct non-background labels present in `labels`, ascending.
pub fn distinct_labels(labels: &GrayImage) -> Vec<u8> {
    let mut seen = [false; 256];
    for &v in labels.as_raw() {
        seen[v as usize] = true;
    }
    (1..=255u8).filter(|&l| seen[l as usize]).collect()
}

/// Traces every labelled region of a label map into closed contours.
#[derive(Debug, Clone, Default)]
pub struct RegionTracer {
    config: TracerConfig,
}

impl RegionTracer {
    pub fn new(config: TracerConfig) -> Self {
        Self { config }
    }

    /// Trace all non-zero labels.
    ///
    /// Labels with no contour left after degenerate filtering are omitted.
    pub fn trace(&self, labels: &GrayImage) -> Result<RegionMap> {
        if labels.width() == 0 || labels.height() == 0 {
            return Err(Error::DecodeFailure(format!(
                "label map has empty dimensions {}x{}",
                labels.width(),
                labels.height()
            )));
        }

        let present = distinct_labels(labels);
        log::debug!("tracing {} labels", present.len());

        let traced: Vec<(u8, Vec<Contour>)> = if self.config.parallel {
            present
                .par_iter()
                .map(|&label| self.trace_label(labels, label).map(|c| (label, c)))
                .collect::<Result<_>>()?
        } else {
            present
                .iter()
                .map(|&label| self.trace_label(labels, label).map(|c| (label, c)))
                .collect::<Result<_>>()?
        };

        Ok(traced
            .into_iter()
            .filter(|(_, contours)| !contours.is_empty())
            .collect())
    }

    /// Trace the boundaries of a single label in raster discovery order.
    ///
    /// Holes carry the index of the smallest outer contour enclosing them.
    pub fn trace_label(&self, labels: &GrayImage, label: u8) -> Result<Vec<Contour>> {
        let mut mask = LabelMask::new(labels, label);
        let mut raw: Vec<Contour> = Vec::new();

        for y in 0..mask.height {
            for x in 0..mask.width {
                if mask.inside((x, y)) && !mask.inside((x, y - 1)) && !mask.is_visited((x, y), Dir::East)
                {
                    raw.push(Contour::new(mask.follow(x, y))?);
                }
            }
        }

        let kept = drop_degenerate(raw, self.config.min_region_area);
        log::trace!("label {label}: {} contours", kept.len());
        Ok(kept)
    }
}

/// Remove outer contours below `min_area` and link each hole to its
/// enclosing outer.
///
/// Holes are never filtered by area: a traced hole has at least four
/// vertices, and dropping it would fill its region in.
fn drop_degenerate(contours: Vec<Contour>, min_area: f64) -> Vec<Contour> {
    let kept: Vec<Contour> = contours
        .into_iter()
        .filter(|c| c.is_hole() || c.area() >= min_area)
        .collect();

    let parents: Vec<Option<usize>> = kept
        .iter()
        .map(|c| {
            if !c.is_hole() {
                return None;
            }
            let probe = c.points()[0];
            kept.iter()
                .enumerate()
                .filter(|(_, outer)| !outer.is_hole() && point_in_polygon(probe, outer.points()))
                .min_by(|(_, a), (_, b)| a.area().total_cmp(&b.area()))
                .map(|(i, _)| i)
        })
        .collect();

    // A hole whose outer was dropped goes with it.
    let survives: Vec<bool> = kept
        .iter()
        .zip(&parents)
        .map(|(c, parent)| !c.is_hole() || parent.is_some())
        .collect();
    let mut new_index = vec![0; kept.len()];
    let mut next = 0;
    for (i, &s) in survives.iter().enumerate() {
        new_index[i] = next;
        if s {
            next += 1;
        }
    }

    kept.into_iter()
        .zip(parents)
        .zip(survives)
        .filter(|(_, s)| *s)
        .map(|((c, parent), _)| c.with_parent(parent.map(|i| new_index[i])))
        .collect()
}
