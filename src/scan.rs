use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::parse::is_image_path;
use crate::sort::{natural_cmp, sort_natural};

/// one directory of the target tree
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub path: PathBuf,
    /// last path component, shown as the chapter title
    pub name: String,
    /// pictures directly inside this directory, naturally sorted
    pub images: Vec<PathBuf>,
}

/// display name of a directory, resolving "." and similar to the real name
pub fn dir_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        return name.to_string_lossy().into_owned();
    }
    path.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| path.display().to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// walk `root` recursively; every directory (root included) becomes a folder
pub fn scan_tree(root: &Path) -> Result<Vec<Folder>> {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut folders: HashMap<PathBuf, Folder> = HashMap::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                return Err(e).with_context(|| format!("Cannot read directory: {}", root.display()));
            }
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_dir() {
            order.push(path.to_path_buf());
            folders.insert(
                path.to_path_buf(),
                Folder {
                    path: path.to_path_buf(),
                    name: dir_name(path),
                    images: Vec::new(),
                },
            );
        } else if entry.file_type().is_file() && is_image_path(path) {
            let parent = path.parent().unwrap_or(root);
            if let Some(folder) = folders.get_mut(parent) {
                folder.images.push(path.to_path_buf());
            }
        } else {
            tracing::debug!("ignoring {}", path.display());
        }
    }

    let mut result: Vec<Folder> = order
        .into_iter()
        .filter_map(|p| folders.remove(&p))
        .collect();
    for folder in &mut result {
        folder.images.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    }
    sort_natural(&mut result, |f| f.path.to_string_lossy().into_owned());

    tracing::info!(
        "found {} folder(s), {} image(s) under {}",
        result.len(),
        result.iter().map(|f| f.images.len()).sum::<usize>(),
        root.display()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_tree(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mkbook_test_scan_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn folders_in_natural_order() {
        let root = tmp_tree("order");
        for ch in ["ch10", "ch2", "ch1"] {
            std::fs::create_dir_all(root.join(ch)).unwrap();
            std::fs::write(root.join(ch).join("1.png"), b"fake").unwrap();
        }
        let folders = scan_tree(&root).unwrap();
        let got: Vec<&str> = folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(got, vec!["mkbook_test_scan_order", "ch1", "ch2", "ch10"]);
    }

    #[test]
    fn images_filtered_and_sorted() {
        let root = tmp_tree("images");
        for f in ["p10.jpg", "p2.PNG", "p1.gif", "notes.txt", "p3.webp", "cover.psd"] {
            std::fs::write(root.join(f), b"fake").unwrap();
        }
        let folders = scan_tree(&root).unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(
            names(&folders[0].images),
            vec!["p1.gif", "p2.PNG", "p3.webp", "p10.jpg"]
        );
    }

    #[test]
    fn nested_and_empty_folders_kept() {
        let root = tmp_tree("nested");
        std::fs::create_dir_all(root.join("vol1").join("ch１")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("vol1").join("ch１").join("a.jpg"), b"fake").unwrap();
        let folders = scan_tree(&root).unwrap();
        assert_eq!(folders.len(), 4);
        let nested = folders.iter().find(|f| f.name == "ch１").unwrap();
        assert_eq!(nested.images.len(), 1);
        let empty = folders.iter().find(|f| f.name == "empty").unwrap();
        assert!(empty.images.is_empty());
    }

    #[test]
    fn missing_root_is_error() {
        let root = std::env::temp_dir().join("mkbook_test_scan_does_not_exist");
        let _ = std::fs::remove_dir_all(&root);
        assert!(scan_tree(&root).is_err());
    }

    #[test]
    fn dir_name_resolves_dot() {
        let name = dir_name(Path::new("."));
        assert!(!name.is_empty());
        assert_ne!(name, ".");
    }
}
