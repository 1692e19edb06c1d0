//! SVG serialization of traced regions.
//!
//! Each outer contour becomes one `<path>` element; holes linked to it are
//! appended as extra subpaths and cut out with `fill-rule="evenodd"`. Paths
//! are written in ascending label order and, within a label, in the order the
//! tracer discovered them, so identical input always yields identical bytes.

use std::collections::BTreeMap;
use std::fmt::Write;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::SvgConfig;
use crate::error::{Error, Result};
use crate::types::{Contour, RegionMap};

/// Plain coordinates per label: one `[[x, y], ...]` ring per contour.
pub type RegionContours = BTreeMap<u8, Vec<Vec<[f64; 2]>>>;

/// One drawable `<path>` of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    pub label: u8,
    /// Path data: the outer ring followed by its holes, each closed with `Z`.
    pub d: String,
}

/// A finished SVG document and the paths it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    width: u32,
    height: u32,
    paths: Vec<PathEntry>,
    svg: String,
}

impl VectorDocument {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn paths(&self) -> &[PathEntry] {
        &self.paths
    }

    /// Paths belonging to `label`, in document order.
    pub fn paths_for(&self, label: u8) -> impl Iterator<Item = &PathEntry> {
        self.paths.iter().filter(move |p| p.label == label)
    }

    pub fn as_str(&self) -> &str {
        &self.svg
    }

    /// Canonical UTF-8 bytes of the document.
    pub fn as_bytes(&self) -> &[u8] {
        self.svg.as_bytes()
    }

    /// Standard-alphabet base64 of [`as_bytes`](Self::as_bytes), for JSON transport.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.as_bytes())
    }

    pub fn into_string(self) -> String {
        self.svg
    }
}

impl std::fmt::Display for VectorDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.svg)
    }
}

/// Stateless encoder; holds only its formatting configuration.
#[derive(Debug, Clone, Default)]
pub struct SvgEncoder {
    config: SvgConfig,
}

impl SvgEncoder {
    pub fn new(config: SvgConfig) -> Self {
        Self { config }
    }

    /// Serialize `regions` onto a `width` x `height` canvas.
    pub fn encode(&self, regions: &RegionMap, width: u32, height: u32) -> Result<VectorDocument> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!(
                "canvas must not be empty, got {width}x{height}"
            )));
        }

        let mut paths = Vec::new();
        for (&label, contours) in regions {
            if label == 0 {
                return Err(Error::InvalidInput("label 0 is background".into()));
            }
            for group in group_holes(contours) {
                let mut d = String::new();
                for contour in group {
                    if !d.is_empty() {
                        d.push(' ');
                    }
                    self.write_ring(&mut d, contour)?;
                }
                paths.push(PathEntry { label, d });
            }
        }

        let svg = self.render(&paths, width, height);
        log::debug!("encoded {} paths into {} bytes", paths.len(), svg.len());
        Ok(VectorDocument {
            width,
            height,
            paths,
            svg,
        })
    }

    /// The same contours as plain coordinates, each value parsed back from
    /// the text the document writes for it.
    pub fn region_contours(&self, regions: &RegionMap) -> RegionContours {
        let precision = self.config.precision;
        let round = |v: f64| format_coord(v, precision).parse().unwrap_or(v);

        regions
            .iter()
            .map(|(&label, contours)| {
                let rings: Vec<Vec<[f64; 2]>> = group_holes(contours)
                    .into_iter()
                    .flatten()
                    .map(|c| c.points().iter().map(|p| [round(p.x), round(p.y)]).collect())
                    .collect();
                (label, rings)
            })
            .collect()
    }

    fn write_ring(&self, out: &mut String, contour: &Contour) -> Result<()> {
        let points = contour.points();
        if points.len() < Contour::MIN_VERTICES {
            return Err(Error::InvalidInput(format!(
                "contour with {} vertices cannot be encoded",
                points.len()
            )));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "contour vertex ({}, {}) is not finite",
                bad.x, bad.y
            )));
        }

        for (i, p) in points.iter().enumerate() {
            let cmd = if i == 0 { "M" } else { " L" };
            let _ = write!(
                out,
                "{cmd} {} {}",
                format_coord(p.x, self.config.precision),
                format_coord(p.y, self.config.precision)
            );
        }
        out.push_str(" Z");
        Ok(())
    }

    fn render(&self, paths: &[PathEntry], width: u32, height: u32) -> String {
        let mut out = String::new();
        let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
        );

        let style = format!(
            r#"fill="{}" stroke="{}" stroke-width="{}" fill-rule="evenodd""#,
            xml_escape(&self.config.fill),
            xml_escape(&self.config.stroke),
            format_coord(self.config.stroke_width, MAX_STYLE_PRECISION),
        );
        for path in paths {
            let _ = write!(out, r#"  <path data-label="{}""#, path.label);
            if let Some(name) = self.config.region_names.get(&path.label) {
                let _ = write!(out, r#" data-region="{}""#, xml_escape(name));
            }
            let _ = writeln!(out, r#" d="{}" {style}/>"#, path.d);
        }

        out.push_str("</svg>\n");
        out
    }
}

const MAX_STYLE_PRECISION: usize = 3;

/// Outer contours in order, each followed by the holes linked to it.
///
/// Holes without a parent in the list are kept as groups of their own.
fn group_holes(contours: &[Contour]) -> Vec<Vec<&Contour>> {
    contours
        .iter()
        .enumerate()
        .filter(|(_, c)| hole_parent(contours, c).is_none())
        .map(|(i, outer)| {
            let mut group = vec![outer];
            group.extend(
                contours
                    .iter()
                    .filter(|c| hole_parent(contours, c) == Some(i)),
            );
            group
        })
        .collect()
}

fn hole_parent(contours: &[Contour], c: &Contour) -> Option<usize> {
    c.parent()
        .filter(|&p| c.is_hole() && p < contours.len() && !contours[p].is_hole())
}

/// Fixed-precision number with trailing zeros trimmed and no negative zero.
fn format_coord(v: f64, precision: usize) -> String {
    let mut s = format!("{v:.precision$}");
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".into();
    }
    s
}

fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn ring(points: &[(f64, f64)]) -> Contour {
        Contour::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect()).unwrap()
    }

    fn square(x: f64, y: f64, side: f64) -> Contour {
        ring(&[(x, y), (x + side, y), (x + side, y + side), (x, y + side)])
    }

    fn square_hole(x: f64, y: f64, side: f64, parent: usize) -> Contour {
        ring(&[(x, y + side), (x + side, y + side), (x + side, y), (x, y)]).with_parent(Some(parent))
    }

    #[test]
    fn coordinate_formatting() {
        assert_eq!(format_coord(10.0, 2), "10");
        assert_eq!(format_coord(10.5, 2), "10.5");
        assert_eq!(format_coord(3.14159, 2), "3.14");
        assert_eq!(format_coord(-0.001, 2), "0");
        assert_eq!(format_coord(-2.26, 1), "-2.3");
        assert_eq!(format_coord(7.0, 0), "7");
        assert_eq!(format_coord(120.0, 0), "120");
    }

    #[test]
    fn document_has_canvas_and_one_path_per_outer() {
        let mut regions = RegionMap::new();
        regions.insert(1, vec![square(10.0, 10.0, 20.0)]);

        let doc = SvgEncoder::default().encode(&regions, 100, 80).unwrap();
        let svg = doc.as_str();
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"width="100" height="80" viewBox="0 0 100 80""#));
        assert_eq!(doc.paths().len(), 1);
        assert_eq!(doc.paths()[0].d, "M 10 10 L 30 10 L 30 30 L 10 30 Z");
        assert!(svg.contains(r#"<path data-label="1" d="M 10 10 L 30 10 L 30 30 L 10 30 Z""#));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn holes_share_the_outer_path() {
        let mut regions = RegionMap::new();
        regions.insert(
            4,
            vec![
                square(0.0, 0.0, 10.0),
                square(20.0, 0.0, 5.0),
                square_hole(2.0, 2.0, 3.0, 0),
            ],
        );
        let doc = SvgEncoder::default().encode(&regions, 40, 40).unwrap();
        assert_eq!(doc.paths().len(), 2);
        assert_eq!(
            doc.paths()[0].d,
            "M 0 0 L 10 0 L 10 10 L 0 10 Z M 2 5 L 5 5 L 5 2 L 2 2 Z"
        );
        assert_eq!(doc.paths()[1].d, "M 20 0 L 25 0 L 25 5 L 20 5 Z");
        assert!(doc.as_str().contains(r#"fill-rule="evenodd""#));
    }

    #[test]
    fn paths_are_ordered_by_label() {
        let mut regions = RegionMap::new();
        regions.insert(9, vec![square(0.0, 0.0, 2.0)]);
        regions.insert(2, vec![square(5.0, 5.0, 2.0)]);
        regions.insert(5, vec![square(1.0, 1.0, 2.0), square(8.0, 8.0, 2.0)]);

        let doc = SvgEncoder::default().encode(&regions, 20, 20).unwrap();
        let labels: Vec<u8> = doc.paths().iter().map(|p| p.label).collect();
        assert_eq!(labels, vec![2, 5, 5, 9]);
        assert_eq!(doc.paths_for(5).count(), 2);
    }

    #[test]
    fn encoding_is_byte_identical() {
        let mut regions = RegionMap::new();
        regions.insert(
            1,
            vec![ring(&[(0.123456, 1.0), (10.987654, 1.5), (5.5, 9.25)])],
        );
        regions.insert(3, vec![square(2.0, 2.0, 4.0)]);
        let encoder = SvgEncoder::default();
        let a = encoder.encode(&regions, 64, 64).unwrap();
        let b = encoder.encode(&regions.clone(), 64, 64).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert!(a.as_str().contains("M 0.12 1 L 10.99 1.5 L 5.5 9.25 Z"));
    }

    #[test]
    fn region_names_and_style_are_escaped() {
        let mut config = SvgConfig::default();
        config.region_names.insert(1, "nose & \"lips\"".into());
        config.fill = "#ff0000".into();
        let mut regions = RegionMap::new();
        regions.insert(1, vec![square(0.0, 0.0, 2.0)]);

        let svg = SvgEncoder::new(config).encode(&regions, 4, 4).unwrap().into_string();
        assert!(svg.contains(r#"data-region="nose &amp; &quot;lips&quot;""#));
        assert!(svg.contains(r##"fill="#ff0000""##));
    }

    #[test]
    fn region_contours_match_document_order() {
        let mut regions = RegionMap::new();
        regions.insert(
            1,
            vec![
                square(0.0, 0.0, 10.0),
                square(20.0, 0.0, 5.0),
                square_hole(2.0, 2.0, 3.0, 0),
            ],
        );
        let rings = SvgEncoder::default().region_contours(&regions);
        let firsts: Vec<[f64; 2]> = rings[&1].iter().map(|r| r[0]).collect();
        assert_eq!(firsts, vec![[0.0, 0.0], [2.0, 5.0], [20.0, 0.0]]);
    }

    #[test]
    fn region_contours_agree_with_path_text_on_ties() {
        let mut regions = RegionMap::new();
        regions.insert(
            1,
            vec![ring(&[(0.125, 0.375), (10.625, 0.0), (10.0, 10.875), (0.0, 10.0)])],
        );
        let encoder = SvgEncoder::default();
        let doc = encoder.encode(&regions, 20, 20).unwrap();
        let rings = encoder.region_contours(&regions);

        let from_text: Vec<f64> = doc.paths()[0]
            .d
            .split_whitespace()
            .filter_map(|tok| tok.parse().ok())
            .collect();
        let from_arrays: Vec<f64> = rings[&1][0].iter().flat_map(|p| [p[0], p[1]]).collect();
        assert_eq!(from_text, from_arrays);
    }

    #[test]
    fn empty_canvas_is_invalid() {
        let err = SvgEncoder::default()
            .encode(&RegionMap::new(), 0, 10)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn base64_transport() {
        let doc = SvgEncoder::default().encode(&RegionMap::new(), 1, 1).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(doc.to_base64())
            .unwrap();
        assert_eq!(decoded, doc.as_bytes());
    }
}
