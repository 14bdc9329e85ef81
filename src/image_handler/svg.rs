//! # SVG 解码器
//!
//! 使用 `usvg` 解析为场景树；用户单位按 96 DPI 换算为点。

use resvg::usvg;

use super::source::SVG_UNITS_PER_INCH;
use super::{DecodeError, DecodedImage, ImageFormat, ImagePayload};

const POINTS_PER_UNIT: f64 = 72.0 / SVG_UNITS_PER_INCH;

pub(crate) fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default()).map_err(|e| match e {
        usvg::Error::InvalidSize => DecodeError::DegenerateDimensions {
            width: 0.0,
            height: 0.0,
        },
        other => DecodeError::corrupt(ImageFormat::Svg, other.to_string()),
    })?;

    let size = tree.size();
    let width = size.width() as f64 * POINTS_PER_UNIT;
    let height = size.height() as f64 * POINTS_PER_UNIT;

    DecodedImage::new(ImageFormat::Svg, width, height, ImagePayload::Vector { tree })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_svg_and_converts_units() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="96" height="48">
            <rect width="96" height="48" fill="red"/>
        </svg>"#;

        let image = decode(svg).expect("valid svg should decode");
        assert_eq!(image.format(), ImageFormat::Svg);
        assert!((image.width() - 72.0).abs() < 1e-6);
        assert!((image.height() - 36.0).abs() < 1e-6);
        assert_eq!(image.pixel_size(), None);
    }

    #[test]
    fn malformed_svg_is_corrupt() {
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"10\" height=\"10\"><rect";

        assert!(matches!(
            decode(svg),
            Err(DecodeError::CorruptData { format: ImageFormat::Svg, .. })
        ));
    }
}
