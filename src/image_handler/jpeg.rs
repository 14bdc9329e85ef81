//! # JPEG 解码器
//!
//! ## 实现思路
//!
//! 1. 校验 SOI，按标记段遍历：每段须以 0xFF 开头，段长度不得越界。
//! 2. SOFn 提供尺寸（零值拒绝），JFIF APP0 提供分辨率。
//! 3. 遇到 SOS 后扫描熵编码数据，跳过填充字节与 RST 标记，解析渐进式的中间段，直到 EOI。
//! 4. 像素解码交给 `image`，并核对解码尺寸与帧头一致。

use image::ImageFormat as CodecFormat;

use super::{DecodeError, DecodedImage, ImageFormat, Resolution};

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const CM_PER_INCH: f64 = 2.54;

/// 标记段遍历得到的头信息。
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct JpegHeader {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) dpi: Option<Resolution>,
}

fn corrupt(reason: impl Into<String>) -> DecodeError {
    DecodeError::corrupt(ImageFormat::Jpeg, reason)
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// SOF0..SOF15，排除 DHT(C4)、JPG(C8)、DAC(CC)。
fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// 无长度字段的独立标记：TEM 与 RST0..RST7。
fn is_standalone(marker: u8) -> bool {
    matches!(marker, 0x01 | 0xD0..=0xD7)
}

/// 读取下一个标记字节，允许任意数量的 0xFF 填充。
fn next_marker(bytes: &[u8], pos: &mut usize) -> Result<u8, DecodeError> {
    match bytes.get(*pos) {
        None => return Err(corrupt(format!("truncated stream at offset {}", *pos))),
        Some(&MARKER_PREFIX) => {}
        Some(other) => {
            return Err(corrupt(format!(
                "expected marker at offset {}, found 0x{other:02X}",
                *pos
            )));
        }
    }

    while bytes.get(*pos) == Some(&MARKER_PREFIX) {
        *pos += 1;
    }

    let marker = *bytes
        .get(*pos)
        .ok_or_else(|| corrupt(format!("truncated marker at offset {}", *pos)))?;
    if marker == 0x00 {
        return Err(corrupt(format!("invalid marker 0x00 at offset {}", *pos)));
    }
    *pos += 1;
    Ok(marker)
}

/// 读取带长度字段的段，返回段内容（不含长度字段）。
fn read_segment<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<&'a [u8], DecodeError> {
    let start = *pos;
    let length_bytes = bytes
        .get(start..start + 2)
        .ok_or_else(|| corrupt(format!("truncated segment length at offset {start}")))?;

    let length = read_u16(length_bytes) as usize;
    if length < 2 {
        return Err(corrupt(format!("segment length {length} at offset {start}")));
    }

    let end = start + length;
    let segment = bytes
        .get(start + 2..end)
        .ok_or_else(|| corrupt(format!("truncated segment at offset {start}")))?;
    *pos = end;
    Ok(segment)
}

fn parse_frame(segment: &[u8]) -> Result<(u16, u16), DecodeError> {
    if segment.len() < 6 {
        return Err(corrupt("frame header too short"));
    }

    let height = read_u16(&segment[1..3]);
    let width = read_u16(&segment[3..5]);
    if width == 0 || height == 0 {
        return Err(DecodeError::DegenerateDimensions {
            width: width as f64,
            height: height as f64,
        });
    }
    Ok((width, height))
}

fn parse_jfif_density(segment: &[u8]) -> Option<Resolution> {
    if segment.len() < 12 || !segment.starts_with(b"JFIF\0") {
        return None;
    }

    let x = read_u16(&segment[8..10]) as f64;
    let y = read_u16(&segment[10..12]) as f64;
    if x <= 0.0 || y <= 0.0 {
        return None;
    }

    match segment[7] {
        1 => Some(Resolution::new(x, y)),
        2 => Some(Resolution::new(x * CM_PER_INCH, y * CM_PER_INCH)),
        _ => None,
    }
}

/// 扫描熵编码数据直到 EOI。
fn scan_to_end(bytes: &[u8], mut pos: usize) -> Result<(), DecodeError> {
    loop {
        let Some(found) = bytes[pos..].iter().position(|&b| b == MARKER_PREFIX) else {
            return Err(corrupt("truncated stream: missing EOI marker"));
        };
        let at = pos + found;
        let Some(&marker) = bytes.get(at + 1) else {
            return Err(corrupt("truncated stream: missing EOI marker"));
        };

        match marker {
            0x00 | 0xD0..=0xD7 => pos = at + 2,
            MARKER_PREFIX => pos = at + 1,
            EOI => return Ok(()),
            SOI => return Err(corrupt(format!("unexpected SOI at offset {at}"))),
            _ => {
                // 渐进式 JPEG 在扫描之间会出现 DHT / SOS 等段
                pos = at + 2;
                read_segment(bytes, &mut pos)?;
            }
        }
    }
}

/// 校验标记序列并读取头信息，不解码像素。
pub(crate) fn inspect(bytes: &[u8]) -> Result<JpegHeader, DecodeError> {
    if bytes.len() < 2 || bytes[0] != MARKER_PREFIX || bytes[1] != SOI {
        return Err(corrupt("missing SOI marker"));
    }

    let mut pos = 2;
    let mut frame: Option<(u16, u16)> = None;
    let mut dpi = None;

    loop {
        let marker_at = pos;
        let marker = next_marker(bytes, &mut pos)?;

        if is_standalone(marker) {
            continue;
        }
        match marker {
            SOI => return Err(corrupt(format!("unexpected SOI at offset {marker_at}"))),
            EOI => return Err(corrupt("EOI before start of scan")),
            _ => {}
        }

        let segment = read_segment(bytes, &mut pos)?;
        match marker {
            m if is_start_of_frame(m) => {
                if frame.is_some() {
                    return Err(corrupt(format!("duplicate frame header at offset {marker_at}")));
                }
                frame = Some(parse_frame(segment)?);
            }
            APP0 if dpi.is_none() => dpi = parse_jfif_density(segment),
            SOS => {
                if frame.is_none() {
                    return Err(corrupt("scan before frame header"));
                }
                scan_to_end(bytes, pos)?;
                break;
            }
            _ => {}
        }
    }

    let (width, height) = frame.ok_or_else(|| corrupt("missing frame header"))?;
    Ok(JpegHeader { width, height, dpi })
}

/// 完整解码 JPEG。
pub(crate) fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let header = inspect(bytes)?;

    let pixels = image::load_from_memory_with_format(bytes, CodecFormat::Jpeg)
        .map_err(|e| corrupt(e.to_string()))?;

    if (pixels.width(), pixels.height()) != (header.width as u32, header.height as u32) {
        return Err(corrupt(format!(
            "decoded size {}x{} differs from frame header {}x{}",
            pixels.width(),
            pixels.height(),
            header.width,
            header.height
        )));
    }

    DecodedImage::raster(ImageFormat::Jpeg, pixels, header.dpi)
}
