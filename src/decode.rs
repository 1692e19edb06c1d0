//! Intake helpers: turn transport payloads into pipeline inputs.
//!
//! These run before the pipeline. Anything malformed is reported as
//! [`Error::DecodeFailure`], the one error kind worth retrying.

use std::path::Path;

use base64::Engine;
use image::{DynamicImage, GrayImage, RgbaImage};

use crate::error::{Error, Result};
use crate::types::LandmarkSet;

/// Drop a `data:<mime>;base64,` prefix if present.
pub fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((head, body)) if head.starts_with("data:") => body,
        _ => payload,
    }
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(strip_data_url(payload).trim())
        .map_err(|e| Error::DecodeFailure(format!("invalid base64 payload: {e}")))
}

/// Decode an encoded photograph (PNG, JPEG, ...) into RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(load(bytes, "image")?.to_rgba8())
}

/// Decode an encoded segmentation map into 8-bit labels.
///
/// Label values are read as stored, never rescaled. 16-bit maps must keep
/// every value within `0..=255`, and colour maps are only accepted when
/// each pixel is grey (equal channels).
pub fn decode_label_map(bytes: &[u8]) -> Result<GrayImage> {
    match load(bytes, "label map")? {
        DynamicImage::ImageLuma8(labels) => Ok(labels),
        DynamicImage::ImageLuma16(wide) => {
            let (w, h) = wide.dimensions();
            let raw = wide
                .into_raw()
                .into_iter()
                .map(|v| {
                    u8::try_from(v).map_err(|_| {
                        Error::DecodeFailure(format!("label value {v} does not fit in 8 bits"))
                    })
                })
                .collect::<Result<Vec<u8>>>()?;
            from_raw_labels(w, h, raw)
        }
        DynamicImage::ImageRgb8(rgb) => {
            let (w, h) = rgb.dimensions();
            grey_channels(w, h, rgb.pixels().map(|p| [p[0], p[1], p[2]]))
        }
        DynamicImage::ImageRgba8(rgba) => {
            let (w, h) = rgba.dimensions();
            grey_channels(w, h, rgba.pixels().map(|p| [p[0], p[1], p[2]]))
        }
        other => Err(Error::DecodeFailure(format!(
            "unsupported label map pixel format {:?}",
            other.color()
        ))),
    }
}

/// Parse landmarks from JSON: `[{"x": .., "y": ..}, ...]`.
pub fn parse_landmarks(json: &str) -> Result<LandmarkSet> {
    Ok(serde_json::from_str(json)?)
}

pub fn read_image_file<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    decode_image(&std::fs::read(path)?)
}

pub fn read_label_map_file<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    decode_label_map(&std::fs::read(path)?)
}

pub fn read_landmarks_file<P: AsRef<Path>>(path: P) -> Result<LandmarkSet> {
    parse_landmarks(&std::fs::read_to_string(path)?)
}

fn grey_channels<I>(width: u32, height: u32, pixels: I) -> Result<GrayImage>
where
    I: Iterator<Item = [u8; 3]>,
{
    let raw = pixels
        .map(|[r, g, b]| {
            if r == g && g == b {
                Ok(r)
            } else {
                Err(Error::DecodeFailure(format!(
                    "label map pixel ({r}, {g}, {b}) is not grey; labels must be single-channel"
                )))
            }
        })
        .collect::<Result<Vec<u8>>>()?;
    from_raw_labels(width, height, raw)
}

fn from_raw_labels(width: u32, height: u32, raw: Vec<u8>) -> Result<GrayImage> {
    GrayImage::from_raw(width, height, raw)
        .ok_or_else(|| Error::DecodeFailure("label map buffer does not match its dimensions".into()))
}

fn load(bytes: &[u8], what: &str) -> Result<image::DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::DecodeFailure(format!("{what} data is empty")));
    }
    image::load_from_memory(bytes)
        .map_err(|e| Error::DecodeFailure(format!("failed to decode {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;
    use image::{ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
    }

    #[test]
    fn label_map_survives_png_and_base64() {
        let labels = GrayImage::from_fn(6, 4, |x, y| Luma([((x + y) % 3) as u8]));
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes(&labels));
        let payload = format!("data:image/png;base64,{encoded}");

        let decoded = decode_label_map(&decode_base64(&payload).unwrap()).unwrap();
        assert_eq!(decoded, labels);

        let rgba = decode_image(&png_bytes(&labels)).unwrap();
        assert_eq!(rgba.dimensions(), (6, 4));
    }

    #[test]
    fn sixteen_bit_labels_keep_their_values() {
        let wide: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(8, 8, |x, _| Luma([1 + u16::from(x >= 4)]));
        let mut buf = Cursor::new(Vec::new());
        wide.write_to(&mut buf, ImageFormat::Png).unwrap();

        let labels = decode_label_map(&buf.into_inner()).unwrap();
        assert_eq!(labels.get_pixel(0, 0)[0], 1);
        assert_eq!(labels.get_pixel(7, 7)[0], 2);
    }

    #[test]
    fn sixteen_bit_labels_above_255_are_rejected() {
        let wide: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(4, 4, |x, y| Luma([if (x, y) == (2, 2) { 300 } else { 1 }]));
        let mut buf = Cursor::new(Vec::new());
        wide.write_to(&mut buf, ImageFormat::Png).unwrap();

        let err = decode_label_map(&buf.into_inner()).unwrap_err();
        assert!(matches!(err, Error::DecodeFailure(_)));
    }

    #[test]
    fn colour_label_maps_must_be_grey() {
        let grey = RgbImage::from_fn(5, 5, |x, _| {
            let v = (x % 3) as u8;
            Rgb([v, v, v])
        });
        let mut buf = Cursor::new(Vec::new());
        grey.write_to(&mut buf, ImageFormat::Png).unwrap();
        let labels = decode_label_map(&buf.into_inner()).unwrap();
        assert_eq!(labels.get_pixel(2, 0)[0], 2);
        assert_eq!(labels.get_pixel(4, 3)[0], 1);

        // Distinct colours would need a colour-to-label table.
        let colour = RgbImage::from_fn(5, 5, |x, _| {
            if x < 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 255, 0])
            }
        });
        let mut buf = Cursor::new(Vec::new());
        colour.write_to(&mut buf, ImageFormat::Png).unwrap();
        let err = decode_label_map(&buf.into_inner()).unwrap_err();
        assert!(matches!(err, Error::DecodeFailure(_)));
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        assert!(matches!(decode_image(b"not an image"), Err(Error::DecodeFailure(_))));
        assert!(matches!(decode_label_map(&[]), Err(Error::DecodeFailure(_))));
        assert!(matches!(decode_base64("%%%"), Err(Error::DecodeFailure(_))));
        assert!(decode_image(b"not an image").unwrap_err().is_retryable());
    }

    #[test]
    fn landmarks_from_json() {
        let lm = parse_landmarks(r#"[{"x": 482.5, "y": 732.25}, {"x": 1, "y": 2}]"#).unwrap();
        assert_eq!(lm.num_landmarks(), 2);
        assert_eq!(lm[0], Point::new(482.5, 732.25));
        assert!(matches!(parse_landmarks("{}"), Err(Error::Json(_))));
    }
}
