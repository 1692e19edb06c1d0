//! Ramer-Douglas-Peucker reduction for closed contours.
//!
//! The ring is split at its first vertex and the vertex farthest from it,
//! and each half is reduced independently. Retained vertices are always a
//! subset of the input in the original order, which keeps the result
//! idempotent: running it again picks the same anchors and the same split
//! points.

use crate::error::Result;
use crate::geometry::point_segment_distance;
use crate::types::{Contour, Point, RegionMap};

/// Reduce `contour` so that every input vertex lies within `tolerance`
/// pixels of the result.
///
/// Closure, winding and the hole parent link are preserved, and the result
/// never has fewer than three vertices. If reduction would flip or collapse
/// the winding the input is returned unchanged.
pub fn simplify(contour: &Contour, tolerance: f64) -> Result<Contour> {
    let points = contour.points();
    let n = points.len();
    if n <= Contour::MIN_VERTICES {
        return Ok(contour.clone());
    }
    let tolerance = tolerance.max(0.0);

    let far = farthest_from(points, 0);
    if far == 0 {
        return Ok(contour.clone());
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[far] = true;
    reduce(points, 0, far, tolerance, &mut keep);
    reduce(points, far, n, tolerance, &mut keep);

    if keep.iter().filter(|&&k| k).count() < Contour::MIN_VERTICES {
        // Only the two anchors survived; add back the vertex that strays
        // farthest from the chord between them.
        let (a, b) = (points[0], points[far]);
        let extra = (0..n)
            .filter(|&i| !keep[i])
            .map(|i| (i, point_segment_distance(points[i], a, b)))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });
        match extra {
            Some((i, d)) if d > 0.0 => keep[i] = true,
            _ => return Ok(contour.clone()),
        }
    }

    let reduced: Vec<Point> = points
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(p, _)| *p)
        .collect();

    let simplified = contour.with_points(reduced)?;
    let before = contour.signed_area();
    let after = simplified.signed_area();
    if after == 0.0 || before.signum() != after.signum() {
        return Ok(contour.clone());
    }
    Ok(simplified)
}

/// Simplify every contour of every region with the same tolerance.
pub fn simplify_regions(regions: &RegionMap, tolerance: f64) -> Result<RegionMap> {
    regions
        .iter()
        .map(|(&label, contours)| {
            let simplified = contours
                .iter()
                .map(|c| simplify(c, tolerance))
                .collect::<Result<Vec<_>>>()?;
            log::trace!(
                "label {label}: {} -> {} vertices",
                contours.iter().map(Contour::len).sum::<usize>(),
                simplified.iter().map(Contour::len).sum::<usize>()
            );
            Ok((label, simplified))
        })
        .collect()
}

/// First index of the vertex farthest from `points[from]`.
fn farthest_from(points: &[Point], from: usize) -> usize {
    let origin = points[from];
    let mut best = from;
    let mut best_dist = 0.0;
    for (i, p) in points.iter().enumerate() {
        let d = origin.distance(p);
        if d > best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

/// Mark the vertices RDP keeps strictly between `start` and `end`.
///
/// Indices wrap around the ring, so `end == points.len()` means vertex 0.
fn reduce(points: &[Point], start: usize, end: usize, tolerance: f64, keep: &mut [bool]) {
    let n = points.len();
    let mut stack = vec![(start, end)];

    while let Some((s, e)) = stack.pop() {
        if e <= s + 1 {
            continue;
        }
        let (a, b) = (points[s % n], points[e % n]);

        let mut split = None;
        let mut max_dist = 0.0;
        for i in (s + 1)..e {
            let d = point_segment_distance(points[i % n], a, b);
            if d > max_dist {
                max_dist = d;
                split = Some(i);
            }
        }

        if let Some(i) = split {
            if max_dist > tolerance {
                keep[i % n] = true;
                stack.push((i, e));
                stack.push((s, i));
            }
        }
    }
}
