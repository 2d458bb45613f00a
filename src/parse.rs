use anyhow::Result;
use clap::ValueEnum;
use std::path::{Path, PathBuf};

/// file extensions treated as pictures when walking the target tree
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp", "gif", "webp"];

/// smallest page the book may use
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    Legal,
    A3,
}

impl PageSize {
    pub fn dimensions_pt(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::A3 => (841.89, 1190.55),
        }
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// clap value parser: path must be an existing dir
pub fn existing_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("{:?} is not a dir", s))
    }
}

/// clap value parser: path is a regular file, or does not exist yet but its
/// parent dir does
pub fn save_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_file() {
        return Ok(path);
    }
    if path.exists() {
        return Err(format!("{:?} is not a file", s));
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if parent.is_dir() {
        Ok(path)
    } else {
        Err(format!("base dir of {:?} does not exist", s))
    }
}

/// clap value parser: path must be an existing regular file
pub fn existing_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("{:?} is not a file", s))
    }
}

pub struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    /// transform flag of the Adobe APP14 segment, if present
    pub adobe_color_transform: Option<u8>,
}

/// parse JPEG markers up to the SOF segment
pub fn parse_jpeg_header(data: &[u8]) -> Result<JpegInfo> {
    anyhow::ensure!(
        data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8,
        "Not a valid JPEG file"
    );
    let mut adobe_color_transform = None;
    let mut pos = 2;
    while pos + 4 < data.len() {
        if data[pos] != 0xFF {
            anyhow::bail!("Invalid JPEG marker at offset {}", pos);
        }
        let marker = data[pos + 1];
        // skip padding 0xFF bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // skip RST markers and standalone markers (no length field)
        if marker == 0x00 || (0xD0..=0xD9).contains(&marker) {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        // APP14 "Adobe": version(2) flags0(2) flags1(2) transform(1)
        if marker == 0xEE && len >= 14 && pos + 2 + len <= data.len() {
            let payload = &data[pos + 4..pos + 2 + len];
            if payload.starts_with(b"Adobe") {
                adobe_color_transform = Some(payload[11]);
            }
        }
        // all SOF markers: SOF0-SOF3, SOF5-SOF7, SOF9-SOF11, SOF13-SOF15
        // (excludes 0xC4=DHT, 0xC8=JPG, 0xCC=DAC)
        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            anyhow::ensure!(pos + 2 + len <= data.len() && len >= 8, "Truncated SOF");
            let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            let components = data[pos + 9];
            return Ok(JpegInfo {
                width,
                height,
                components,
                adobe_color_transform,
            });
        }
        pos += 2 + len;
    }
    anyhow::bail!("No SOF marker found in JPEG")
}

pub struct PngInfo {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlace: u8,
    pub has_trns: bool,
    pub idat_data: Vec<u8>,
    pub plte_data: Vec<u8>,
}

/// parse a PNG file to extract IHDR info and concatenated IDAT chunk data
pub fn parse_png_header(data: &[u8]) -> Result<PngInfo> {
    const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
    anyhow::ensure!(
        data.len() >= 8 && data[..8] == SIGNATURE,
        "Not a valid PNG file"
    );

    let mut pos = 8;
    let mut width = 0u32;
    let mut height = 0u32;
    let mut bit_depth = 0u8;
    let mut color_type = 0u8;
    let mut interlace = 0u8;
    let mut has_trns = false;
    let mut idat_data = Vec::new();
    let mut plte_data = Vec::new();
    let mut got_ihdr = false;

    while pos + 8 <= data.len() {
        let chunk_len =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let chunk_type = &data[pos + 4..pos + 8];
        let chunk_data_start = pos + 8;
        let chunk_end = chunk_data_start + chunk_len + 4; // +4 for CRC
        anyhow::ensure!(chunk_end <= data.len(), "Truncated PNG chunk");

        match chunk_type {
            b"IHDR" => {
                anyhow::ensure!(chunk_len >= 13, "Truncated IHDR");
                let d = &data[chunk_data_start..];
                width = u32::from_be_bytes([d[0], d[1], d[2], d[3]]);
                height = u32::from_be_bytes([d[4], d[5], d[6], d[7]]);
                bit_depth = d[8];
                color_type = d[9];
                interlace = d[12];
                got_ihdr = true;
            }
            b"PLTE" => {
                plte_data.extend_from_slice(&data[chunk_data_start..chunk_data_start + chunk_len]);
            }
            b"tRNS" => has_trns = true,
            b"IDAT" => {
                idat_data.extend_from_slice(&data[chunk_data_start..chunk_data_start + chunk_len]);
            }
            b"IEND" => break,
            _ => {}
        }

        pos = chunk_end;
    }

    anyhow::ensure!(got_ihdr, "No IHDR chunk found in PNG");
    anyhow::ensure!(!idat_data.is_empty(), "No IDAT chunks found in PNG");

    Ok(PngInfo {
        width,
        height,
        bit_depth,
        color_type,
        interlace,
        has_trns,
        idat_data,
        plte_data,
    })
}
