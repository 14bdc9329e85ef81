//! # PNG 解码器
//!
//! ## 实现思路
//!
//! 1. 先做一遍轻量的块结构遍历：签名、块长度边界、块类型、IHDR 首块、IDAT 存在、IEND 结尾。
//! 2. 从 IHDR 读取尺寸并拒绝零值，从 `pHYs` 读取分辨率。
//! 3. 像素解码交给 `image`，其内部会逐块校验 CRC；任何解码失败都归为数据损坏。

use image::ImageFormat as CodecFormat;

use super::{DecodeError, DecodedImage, ImageFormat, Resolution};

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;
const INCHES_PER_METER: f64 = 0.0254;

/// 块结构遍历得到的头信息。
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PngHeader {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) dpi: Option<Resolution>,
}

fn corrupt(reason: impl Into<String>) -> DecodeError {
    DecodeError::corrupt(ImageFormat::Png, reason)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// 校验块结构并读取头信息，不解码像素。
pub(crate) fn inspect(bytes: &[u8]) -> Result<PngHeader, DecodeError> {
    if bytes.len() < SIGNATURE.len() || bytes[..SIGNATURE.len()] != SIGNATURE {
        return Err(corrupt("missing png signature"));
    }

    let mut offset = SIGNATURE.len();
    let mut dimensions: Option<(u32, u32)> = None;
    let mut dpi = None;
    let mut seen_idat = false;

    loop {
        if offset == bytes.len() {
            return Err(corrupt("truncated stream: missing IEND chunk"));
        }

        let Some(chunk_header) = bytes.get(offset..offset + 8) else {
            return Err(corrupt(format!("truncated chunk header at offset {offset}")));
        };

        let length = read_u32(&chunk_header[..4]);
        let kind = &chunk_header[4..8];
        let name = String::from_utf8_lossy(kind);

        if length > MAX_CHUNK_LEN {
            return Err(corrupt(format!(
                "chunk length {length} out of range at offset {offset}"
            )));
        }
        if !kind.iter().all(u8::is_ascii_alphabetic) {
            return Err(corrupt(format!("invalid chunk type at offset {offset}")));
        }

        let data_start = offset + 8;
        let data_end = data_start + length as usize;
        let crc_end = data_end + 4;
        if crc_end > bytes.len() {
            return Err(corrupt(format!("truncated {name} chunk at offset {offset}")));
        }
        let data = &bytes[data_start..data_end];

        match kind {
            b"IHDR" => {
                if dimensions.is_some() {
                    return Err(corrupt("duplicate IHDR chunk"));
                }
                if data.len() != 13 {
                    return Err(corrupt(format!("IHDR length {} (expected 13)", data.len())));
                }

                let (width, height) = (read_u32(&data[..4]), read_u32(&data[4..8]));
                if width == 0 || height == 0 {
                    return Err(DecodeError::DegenerateDimensions {
                        width: width as f64,
                        height: height as f64,
                    });
                }
                dimensions = Some((width, height));
            }
            _ if dimensions.is_none() => {
                return Err(corrupt(format!("first chunk must be IHDR, found {name}")));
            }
            b"IDAT" => seen_idat = true,
            b"pHYs" if data.len() == 9 && data[8] == 1 => {
                // 单位为像素/米
                let (x_ppm, y_ppm) = (read_u32(&data[..4]), read_u32(&data[4..8]));
                if x_ppm > 0 && y_ppm > 0 {
                    if x_ppm != y_ppm {
                        log::debug!("📐 PNG 横纵分辨率不同 - x: {}/m y: {}/m", x_ppm, y_ppm);
                    }
                    dpi = Some(Resolution::new(
                        x_ppm as f64 * INCHES_PER_METER,
                        y_ppm as f64 * INCHES_PER_METER,
                    ));
                }
            }
            b"IEND" => {
                if !seen_idat {
                    return Err(corrupt("no IDAT chunk before IEND"));
                }
                break;
            }
            _ => {}
        }

        offset = crc_end;
    }

    let (width, height) = dimensions.ok_or_else(|| corrupt("missing IHDR chunk"))?;
    Ok(PngHeader { width, height, dpi })
}

/// 完整解码 PNG。
pub(crate) fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let header = inspect(bytes)?;

    let pixels = image::load_from_memory_with_format(bytes, CodecFormat::Png)
        .map_err(|e| corrupt(e.to_string()))?;

    if (pixels.width(), pixels.height()) != (header.width, header.height) {
        return Err(corrupt(format!(
            "decoded size {}x{} differs from IHDR {}x{}",
            pixels.width(),
            pixels.height(),
            header.width,
            header.height
        )));
    }

    DecodedImage::raster(ImageFormat::Png, pixels, header.dpi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Rgba};
    use std::io::Cursor;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, CodecFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        // 结构遍历不校验 CRC
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn ihdr(width: u32, height: u32) -> Vec<u8> {
        let mut data = width.to_be_bytes().to_vec();
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        chunk(b"IHDR", &data)
    }

    /// 在 IEND 之前插入一个块。
    fn insert_before_iend(png: &[u8], extra: &[u8]) -> Vec<u8> {
        let iend_at = png.len() - 12;
        let mut out = png[..iend_at].to_vec();
        out.extend_from_slice(extra);
        out.extend_from_slice(&png[iend_at..]);
        out
    }

    #[test]
    fn decodes_valid_png() {
        let image = decode(&create_png_bytes(32, 16)).expect("valid png should decode");

        assert_eq!(image.pixel_size(), Some((32, 16)));
        assert_eq!(image.width(), 32.0);
        assert_eq!(image.height(), 16.0);
        assert_eq!(image.format(), ImageFormat::Png);
    }

    #[test]
    fn phys_chunk_sets_dpi() {
        // 144 dpi ≈ 5669 像素/米
        let mut phys = 5669_u32.to_be_bytes().to_vec();
        phys.extend_from_slice(&5669_u32.to_be_bytes());
        phys.push(1);

        let bytes = insert_before_iend(&create_png_bytes(8, 8), &chunk(b"pHYs", &phys));
        let header = inspect(&bytes).expect("structure should be valid");

        let dpi = header.dpi.expect("dpi should be read");
        assert!((dpi.x - 144.0).abs() < 0.01, "dpi = {dpi:?}");
        assert!((dpi.y - 144.0).abs() < 0.01, "dpi = {dpi:?}");
    }

    fn crc32(parts: &[&[u8]]) -> u32 {
        let mut crc = 0xFFFF_FFFF_u32;
        for byte in parts.iter().flat_map(|part| part.iter()) {
            crc ^= *byte as u32;
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
        !crc
    }

    fn chunk_with_crc(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&crc32(&[kind.as_slice(), data]).to_be_bytes());
        out
    }

    /// 签名 8 字节 + IHDR 25 字节之后插入，位于 IDAT 之前。
    fn insert_after_ihdr(png: &[u8], extra: &[u8]) -> Vec<u8> {
        let mut out = png[..33].to_vec();
        out.extend_from_slice(extra);
        out.extend_from_slice(&png[33..]);
        out
    }

    #[test]
    fn phys_density_converts_pixels_to_points() {
        let mut phys = 5669_u32.to_be_bytes().to_vec();
        phys.extend_from_slice(&5669_u32.to_be_bytes());
        phys.push(1);

        let bytes = insert_after_ihdr(&create_png_bytes(200, 100), &chunk_with_crc(b"pHYs", &phys));

        let image = decode(&bytes).expect("png with pHYs should decode");
        assert_eq!(image.pixel_size(), Some((200, 100)));
        assert!((image.width() - 100.0).abs() < 0.01, "width = {}", image.width());
        assert!((image.height() - 50.0).abs() < 0.01, "height = {}", image.height());
    }

    #[test]
    fn phys_chunk_keeps_axes_separate() {
        // 横向 144 dpi，纵向 72 dpi
        let mut phys = 5669_u32.to_be_bytes().to_vec();
        phys.extend_from_slice(&2835_u32.to_be_bytes());
        phys.push(1);

        let bytes = insert_after_ihdr(&create_png_bytes(200, 100), &chunk_with_crc(b"pHYs", &phys));
        let image = decode(&bytes).expect("png with anisotropic pHYs should decode");

        let dpi = image.dpi().expect("dpi should be kept");
        assert!((dpi.x - 144.0).abs() < 0.01 && (dpi.y - 72.0).abs() < 0.01, "dpi = {dpi:?}");
        assert!((image.width() - 100.0).abs() < 0.01, "width = {}", image.width());
        assert!((image.height() - 100.0).abs() < 0.05, "height = {}", image.height());
    }

    #[test]
    fn crc_mismatch_is_corrupt() {
        let mut bytes = create_png_bytes(4, 4);
        // IHDR 的 CRC 位于 8 + 4 + 4 + 13 之后
        bytes[29] ^= 0xFF;

        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::CorruptData { format: ImageFormat::Png, .. })
        ));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let bytes = create_png_bytes(16, 16);
        let truncated = &bytes[..bytes.len() - 20];

        assert!(matches!(
            inspect(truncated),
            Err(DecodeError::CorruptData { .. })
        ));
    }

    #[test]
    fn zero_width_header_is_degenerate() {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend(ihdr(0, 10));
        bytes.extend(chunk(b"IDAT", &[]));
        bytes.extend(chunk(b"IEND", &[]));

        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::DegenerateDimensions { width, height }) if width == 0.0 && height == 10.0
        ));
    }

    #[test]
    fn first_chunk_must_be_ihdr() {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend(chunk(b"IDAT", &[]));
        bytes.extend(ihdr(1, 1));
        bytes.extend(chunk(b"IEND", &[]));

        assert!(matches!(inspect(&bytes), Err(DecodeError::CorruptData { .. })));
    }

    #[test]
    fn missing_idat_is_corrupt() {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend(ihdr(1, 1));
        bytes.extend(chunk(b"IEND", &[]));

        assert!(matches!(inspect(&bytes), Err(DecodeError::CorruptData { .. })));
    }

    #[test]
    fn invalid_chunk_type_is_corrupt() {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend(ihdr(1, 1));
        bytes.extend(chunk(b"ID4T", &[]));

        assert!(matches!(inspect(&bytes), Err(DecodeError::CorruptData { .. })));
    }
}
