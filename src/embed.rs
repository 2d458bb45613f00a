use anyhow::{Context, Result};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::parse::{parse_jpeg_header, parse_png_header, PngInfo};

/// pre-processed image data ready for PDF insertion
pub enum PreparedImage {
    Jpeg {
        width: u32,
        height: u32,
        components: u8,
        /// true if CMYK values need inversion
        invert_cmyk: bool,
        data: Vec<u8>,
    },
    PngPassthrough {
        info: PngInfo,
    },
    /// decoded pixel data compressed with deflate
    Compressed {
        width: u32,
        height: u32,
        color_channels: u8,
        color_compressed: Vec<u8>,
        alpha_compressed: Option<Vec<u8>>,
    },
}

/// prepare every image in parallel, results keep input order
pub fn prepare_all(paths: &[PathBuf]) -> Vec<Result<PreparedImage>> {
    paths.par_iter().map(|path| prepare_image(path)).collect()
}

pub fn prepare_image(path: &Path) -> Result<PreparedImage> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    anyhow::ensure!(data.len() >= 4, "File too small: {}", path.display());

    // JPEG: passthrough
    if data[0] == 0xFF && data[1] == 0xD8 {
        let jpeg_info = parse_jpeg_header(&data)
            .with_context(|| format!("Failed to parse JPEG header: {}", path.display()))?;
        anyhow::ensure!(
            matches!(jpeg_info.components, 1 | 3 | 4),
            "Unsupported JPEG component count {} in {}",
            jpeg_info.components,
            path.display()
        );
        // Adobe CMYK is stored inverted unless transform is explicitly 0
        let invert_cmyk = jpeg_info.components == 4 && jpeg_info.adobe_color_transform != Some(0);
        return Ok(PreparedImage::Jpeg {
            width: jpeg_info.width,
            height: jpeg_info.height,
            components: jpeg_info.components,
            invert_cmyk,
            data,
        });
    }

    // PNG: passthrough for opaque non-interlaced without tRNS, decode otherwise
    if data.len() >= 8 && data[..8] == [137, 80, 78, 71, 13, 10, 26, 10] {
        let info = parse_png_header(&data)
            .with_context(|| format!("Failed to parse PNG header: {}", path.display()))?;

        if info.interlace != 0 || info.has_trns {
            return decode_generic_image(&data, path);
        }

        return match info.color_type {
            0 | 2 => Ok(PreparedImage::PngPassthrough { info }),
            3 => {
                anyhow::ensure!(
                    !info.plte_data.is_empty(),
                    "PNG palette image missing PLTE chunk: {}",
                    path.display()
                );
                Ok(PreparedImage::PngPassthrough { info })
            }
            4 | 6 => decode_generic_image(&data, path),
            _ => anyhow::bail!(
                "Unsupported PNG color type {} in {}",
                info.color_type,
                path.display()
            ),
        };
    }

    // TIFF, BMP, GIF, WebP decode via image crate
    decode_generic_image(&data, path)
}

/// decode any image format via image crate and compress for PDF embedding
fn decode_generic_image(data: &[u8], path: &Path) -> Result<PreparedImage> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use image::GenericImageView;

    let img = image::load_from_memory(data)
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;
    let (width, height) = img.dimensions();
    let pixel_count = (width as usize) * (height as usize);

    if img.color().has_alpha() {
        let rgba = img.into_rgba8();
        let mut color_enc = ZlibEncoder::new(
            Vec::with_capacity(pixel_count * 3 / 2),
            Compression::fast(),
        );
        let mut alpha_enc = ZlibEncoder::new(Vec::with_capacity(pixel_count / 2), Compression::fast());

        // one row at a time for cache locality
        let row_bytes = width as usize * 4;
        let mut color_row = Vec::with_capacity(width as usize * 3);
        let mut alpha_row = Vec::with_capacity(width as usize);
        for row in rgba.as_raw().chunks_exact(row_bytes.max(1)) {
            color_row.clear();
            alpha_row.clear();
            for px in row.chunks_exact(4) {
                color_row.extend_from_slice(&px[..3]);
                alpha_row.push(px[3]);
            }
            color_enc.write_all(&color_row)?;
            alpha_enc.write_all(&alpha_row)?;
        }

        Ok(PreparedImage::Compressed {
            width,
            height,
            color_channels: 3,
            color_compressed: color_enc.finish()?,
            alpha_compressed: Some(alpha_enc.finish()?),
        })
    } else {
        let (color_channels, pixels) = if img.color().channel_count() == 1 {
            (1, img.into_luma8().into_raw())
        } else {
            (3, img.into_rgb8().into_raw())
        };
        let mut enc = ZlibEncoder::new(Vec::with_capacity(pixels.len() / 2), Compression::fast());
        enc.write_all(&pixels)?;

        Ok(PreparedImage::Compressed {
            width,
            height,
            color_channels,
            color_compressed: enc.finish()?,
            alpha_compressed: None,
        })
    }
}

fn image_dict(width: u32, height: u32, color_space: Object, bits: i64, filter: &[u8]) -> lopdf::Dictionary {
    dictionary! {
        "Type" => Object::Name(b"XObject".to_vec()),
        "Subtype" => Object::Name(b"Image".to_vec()),
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => bits,
        "Filter" => Object::Name(filter.to_vec()),
    }
}

impl PreparedImage {
    /// add the image XObject (and its soft mask, if any) to `doc`
    pub fn add_to(self, doc: &mut Document) -> ObjectId {
        match self {
            PreparedImage::Jpeg {
                width,
                height,
                components,
                invert_cmyk,
                data,
            } => {
                let color_space = match components {
                    1 => b"DeviceGray".to_vec(),
                    4 => b"DeviceCMYK".to_vec(),
                    _ => b"DeviceRGB".to_vec(),
                };
                let mut dict = image_dict(width, height, Object::Name(color_space), 8, b"DCTDecode");
                if invert_cmyk {
                    dict.set(
                        "Decode",
                        Object::Array(vec![
                            1.into(), 0.into(),
                            1.into(), 0.into(),
                            1.into(), 0.into(),
                            1.into(), 0.into(),
                        ]),
                    );
                }
                doc.add_object(Stream::new(dict, data))
            }
            PreparedImage::PngPassthrough { info } => {
                let (colors, color_space) = match info.color_type {
                    0 => (1, Object::Name(b"DeviceGray".to_vec())),
                    2 => (3, Object::Name(b"DeviceRGB".to_vec())),
                    _ => {
                        let num_entries = info.plte_data.len() / 3;
                        (
                            1,
                            Object::Array(vec![
                                Object::Name(b"Indexed".to_vec()),
                                Object::Name(b"DeviceRGB".to_vec()),
                                Object::Integer(num_entries as i64 - 1),
                                Object::String(info.plte_data, lopdf::StringFormat::Hexadecimal),
                            ]),
                        )
                    }
                };
                let mut dict = image_dict(
                    info.width,
                    info.height,
                    color_space,
                    info.bit_depth as i64,
                    b"FlateDecode",
                );
                dict.set(
                    "DecodeParms",
                    dictionary! {
                        "Predictor" => 15,
                        "Colors" => colors as i64,
                        "BitsPerComponent" => info.bit_depth as i64,
                        "Columns" => info.width as i64,
                    },
                );
                doc.add_object(Stream::new(dict, info.idat_data))
            }
            PreparedImage::Compressed {
                width,
                height,
                color_channels,
                color_compressed,
                alpha_compressed,
            } => {
                let color_space = if color_channels == 1 {
                    b"DeviceGray".to_vec()
                } else {
                    b"DeviceRGB".to_vec()
                };
                let mut dict = image_dict(width, height, Object::Name(color_space), 8, b"FlateDecode");
                if let Some(alpha) = alpha_compressed {
                    let smask = image_dict(
                        width,
                        height,
                        Object::Name(b"DeviceGray".to_vec()),
                        8,
                        b"FlateDecode",
                    );
                    let smask_id = doc.add_object(Stream::new(smask, alpha));
                    dict.set("SMask", smask_id);
                }
                doc.add_object(Stream::new(dict, color_compressed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mkbook_test_embed_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn jpeg_is_passed_through() {
        let path = tmp_dir("jpeg").join("a.jpg");
        image::RgbImage::from_fn(8, 4, |x, _| image::Rgb([x as u8 * 30, 0, 0]))
            .save(&path)
            .unwrap();
        match prepare_image(&path).unwrap() {
            PreparedImage::Jpeg {
                width,
                height,
                components,
                invert_cmyk,
                ..
            } => {
                assert_eq!((width, height, components), (8, 4, 3));
                assert!(!invert_cmyk);
            }
            _ => panic!("expected JPEG passthrough"),
        }
    }

    #[test]
    fn opaque_png_is_passed_through() {
        let path = tmp_dir("png").join("a.png");
        image::GrayImage::new(5, 5).save(&path).unwrap();
        assert!(matches!(
            prepare_image(&path).unwrap(),
            PreparedImage::PngPassthrough { .. }
        ));
    }

    #[test]
    fn rgba_png_gets_soft_mask() {
        let path = tmp_dir("rgba").join("a.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 128]))
            .save(&path)
            .unwrap();
        let prepared = prepare_image(&path).unwrap();
        assert!(matches!(
            prepared,
            PreparedImage::Compressed {
                color_channels: 3,
                alpha_compressed: Some(_),
                ..
            }
        ));
        let mut doc = Document::with_version("1.5");
        let id = prepared.add_to(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"SMask").is_ok());
    }

    #[test]
    fn bmp_is_decoded() {
        let path = tmp_dir("bmp").join("a.bmp");
        image::RgbImage::new(4, 4).save(&path).unwrap();
        assert!(matches!(
            prepare_image(&path).unwrap(),
            PreparedImage::Compressed {
                alpha_compressed: None,
                ..
            }
        ));
    }

    #[test]
    fn webp_is_decoded() {
        let path = tmp_dir("webp").join("001.webp");
        image::RgbImage::from_pixel(6, 3, image::Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();
        match prepare_image(&path).unwrap() {
            PreparedImage::Compressed {
                width,
                height,
                color_channels,
                ..
            } => assert_eq!((width, height, color_channels), (6, 3, 3)),
            _ => panic!("expected decoded image"),
        }
    }

    #[test]
    fn truncated_file_is_error() {
        let path = tmp_dir("tiny").join("a.png");
        std::fs::write(&path, b"\x89P").unwrap();
        assert!(prepare_image(&path).is_err());
    }
}
