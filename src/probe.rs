use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// read (width, height) in pixels from each image header, in input order
pub fn probe_dimensions(paths: &[PathBuf]) -> Result<Vec<(u32, u32)>> {
    paths
        .par_iter()
        .map(|path| {
            dimensions(path)
                .with_context(|| format!("Failed to read image size: {}", path.display()))
        })
        .collect()
}

/// format comes from the file's magic bytes, the extension is only a fallback
fn dimensions(path: &Path) -> Result<(u32, u32)> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}
