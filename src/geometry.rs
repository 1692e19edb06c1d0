//! Affine transforms and small polygon helpers.
//!
//! All coordinates are image pixel coordinates with y growing downward, so a
//! positive rotation angle turns points clockwise on screen.

use image::Pixel;
use imageproc::definitions::{Clamp, Image};
use imageproc::geometric_transformations::{warp_with, Interpolation};

use crate::error::{Error, Result};
use crate::types::Point;

const DET_EPSILON: f64 = 1e-12;

/// A 2x3 affine matrix mapping (x, y, 1) to (x', y').
///
/// Composition multiplies matrices; rotation and translation are never kept
/// as separate fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    m: [[f64; 3]; 2],
}

impl AffineTransform {
    pub const fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            m: [[1.0, 0.0, tx], [0.0, 1.0, ty]],
        }
    }

    /// Rotation by `degrees` around the origin at unit scale.
    pub fn rotation(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            m: [[cos, -sin, 0.0], [sin, cos, 0.0]],
        }
    }

    /// Rotation by `degrees` around `center` at unit scale.
    pub fn rotation_about(center: Point, degrees: f64) -> Self {
        Self::translation(-center.x, -center.y)
            .then(&Self::rotation(degrees))
            .then(&Self::translation(center.x, center.y))
    }

    /// The transform that applies `self` first and `next` second.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        let a = &next.m;
        let b = &self.m;
        let mut m = [[0.0; 3]; 2];
        for (r, row) in m.iter_mut().enumerate() {
            row[0] = a[r][0] * b[0][0] + a[r][1] * b[1][0];
            row[1] = a[r][0] * b[0][1] + a[r][1] * b[1][1];
            row[2] = a[r][0] * b[0][2] + a[r][1] * b[1][2] + a[r][2];
        }
        AffineTransform { m }
    }

    pub fn determinant(&self) -> f64 {
        self.m[0][0] * self.m[1][1] - self.m[0][1] * self.m[1][0]
    }

    pub fn is_finite(&self) -> bool {
        self.m.iter().flatten().all(|v| v.is_finite())
    }

    pub fn inverse(&self) -> Result<AffineTransform> {
        let det = self.determinant();
        if !self.is_finite() || det.abs() < DET_EPSILON {
            return Err(Error::GeometryFailure(format!(
                "affine transform is not invertible (determinant {det})"
            )));
        }
        let [[a, b, c], [d, e, f]] = self.m;
        let inv = 1.0 / det;
        let (ia, ib, id, ie) = (e * inv, -b * inv, -d * inv, a * inv);
        Ok(AffineTransform {
            m: [
                [ia, ib, -(ia * c + ib * f)],
                [id, ie, -(id * c + ie * f)],
            ],
        })
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.m[0][0] * p.x + self.m[0][1] * p.y + self.m[0][2],
            self.m[1][0] * p.x + self.m[1][1] * p.y + self.m[1][2],
        )
    }

    pub fn apply_all(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|p| self.apply(*p)).collect()
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Resample `image` through `transform` into a canvas of the same size.
///
/// Each output pixel is pulled from the source through the inverse
/// transform, so a non-invertible transform is a `GeometryFailure`. Output
/// pixels that map outside the source take `fill`.
pub fn warp_raster<P>(
    image: &Image<P>,
    transform: &AffineTransform,
    interpolation: Interpolation,
    fill: P,
) -> Result<Image<P>>
where
    P: Pixel + Send + Sync,
    <P as Pixel>::Subpixel: Send + Sync + Into<f32> + Clamp<f32>,
{
    let inverse = transform.inverse()?;
    let source_of = move |x: f32, y: f32| {
        let p = inverse.apply(Point::new(f64::from(x), f64::from(y)));
        (p.x as f32, p.y as f32)
    };
    Ok(warp_with(image, source_of, interpolation, fill))
}

/// Shoelace area. Positive for clockwise vertex order in image coordinates.
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }

    area / 2.0
}

/// Distance from `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq == 0.0 {
        return p.distance(&a);
    }

    let ap = p - a;
    let t = ((ap.x * ab.x + ap.y * ab.y) / len_sq).clamp(0.0, 1.0);
    p.distance(&(a + ab * t))
}

/// Even-odd crossing test. Points exactly on an edge may land either way.
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn assert_close(a: Point, b: Point) {
        assert!(
            (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn rotation_is_clockwise_on_screen() {
        let r = AffineTransform::rotation(90.0);
        // +x axis turns into +y (down) on screen
        assert_close(r.apply(Point::new(1.0, 0.0)), Point::new(0.0, 1.0));
    }

    #[test]
    fn rotation_about_keeps_center_fixed() {
        let c = Point::new(50.0, 40.0);
        let r = AffineTransform::rotation_about(c, 33.0);
        assert_close(r.apply(c), c);
        let p = Point::new(60.0, 40.0);
        assert!((r.apply(p).distance(&c) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn composition_multiplies() {
        let a = AffineTransform::rotation(20.0);
        let b = AffineTransform::rotation(25.0);
        let composed = a.then(&b);
        let direct = AffineTransform::rotation(45.0);
        let p = Point::new(3.0, -7.0);
        assert_close(composed.apply(p), direct.apply(p));

        let t = AffineTransform::translation(5.0, 0.0).then(&AffineTransform::rotation(90.0));
        // translate first, then rotate
        assert_close(t.apply(Point::new(0.0, 0.0)), Point::new(0.0, 5.0));
    }

    #[test]
    fn inverse_round_trips() {
        let r = AffineTransform::rotation_about(Point::new(12.0, 8.0), -17.5);
        let inv = r.inverse().unwrap();
        let p = Point::new(4.25, 99.0);
        assert_close(inv.apply(r.apply(p)), p);
        assert_close(r.then(&inv).apply(p), p);
    }

    #[test]
    fn singular_transform_is_geometry_failure() {
        let flat = AffineTransform {
            m: [[1.0, 2.0, 0.0], [2.0, 4.0, 0.0]],
        };
        assert!(matches!(flat.inverse(), Err(Error::GeometryFailure(_))));

        let nan = AffineTransform {
            m: [[f64::NAN, 0.0, 0.0], [0.0, 1.0, 0.0]],
        };
        assert!(matches!(nan.inverse(), Err(Error::GeometryFailure(_))));
    }

    #[test]
    fn identity_warp_preserves_pixels() {
        let img = GrayImage::from_fn(8, 6, |x, y| Luma([(x * 10 + y) as u8]));
        let out = warp_raster(
            &img,
            &AffineTransform::identity(),
            Interpolation::Nearest,
            Luma([0]),
        )
        .unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn singular_transform_cannot_warp() {
        let img = GrayImage::from_pixel(4, 4, Luma([9]));
        let squash = AffineTransform {
            m: [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
        };
        let err = warp_raster(&img, &squash, Interpolation::Nearest, Luma([0])).unwrap_err();
        assert!(matches!(err, Error::GeometryFailure(_)));
    }

    #[test]
    fn translation_warp_moves_pixels() {
        let mut img = GrayImage::new(6, 6);
        img.put_pixel(1, 2, Luma([200]));
        let out = warp_raster(
            &img,
            &AffineTransform::translation(3.0, 1.0),
            Interpolation::Nearest,
            Luma([0]),
        )
        .unwrap();
        assert_eq!(out.get_pixel(4, 3)[0], 200);
        assert_eq!(out.get_pixel(1, 2)[0], 0);
    }

    #[test]
    fn area_sign_and_magnitude() {
        let cw = [
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 3.0),
            Point::new(0.0, 3.0),
        ];
        assert!((signed_area(&cw) - 12.0).abs() < 1e-12);
        let ccw: Vec<_> = cw.iter().rev().copied().collect();
        assert!((signed_area(&ccw) + 12.0).abs() < 1e-12);
        assert_eq!(signed_area(&cw[..2]), 0.0);
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert!((point_segment_distance(Point::new(5.0, 3.0), a, b) - 3.0).abs() < 1e-12);
        assert!((point_segment_distance(Point::new(-3.0, 4.0), a, b) - 5.0).abs() < 1e-12);
        assert!((point_segment_distance(Point::new(1.0, 1.0), a, a) - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn crossing_test() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(Point::new(5.0, 5.0), &square));
        assert!(point_in_polygon(Point::new(2.0, 3.0), &square));
        assert!(!point_in_polygon(Point::new(11.0, 5.0), &square));
        assert!(!point_in_polygon(Point::new(5.0, -1.0), &square));
    }
}
