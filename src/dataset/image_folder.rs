//! ImageFolder Layout Scanner
//!
//! Reads a directory where every immediate sub-directory is a class and
//! every image file below it is a sample of that class:
//!
//! ```text
//! root/
//! ├── ants/
//! │   ├── 0013035.jpg
//! │   └── ...
//! └── bees/
//!     └── ...
//! ```
//!
//! Class indices follow the lexicographic order of the directory names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{FinetuneError, Result};

/// File extensions recognised as images
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// An ImageFolder tree indexed into classes and samples
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Root directory that was scanned
    pub root: PathBuf,
    /// Class names, index = label
    classes: Vec<String>,
    /// All samples, grouped by class and sorted by path within a class
    samples: Vec<ImageSample>,
}

/// Check whether a path has a recognised image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// List class directory names under `root`, sorted
pub fn find_classes(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(FinetuneError::PathNotFound(root.to_path_buf()));
    }

    let mut classes = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                classes.push(name.to_string());
            }
        }
    }
    classes.sort();

    if classes.is_empty() {
        return Err(FinetuneError::Dataset(format!(
            "No class directories found in {}",
            root.display()
        )));
    }

    Ok(classes)
}

impl ImageFolder {
    /// Scan an ImageFolder tree
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let classes = find_classes(&root)?;

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let class_dir = root.join(class_name);
            let mut class_samples = Vec::new();

            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .follow_links(true)
                .into_iter()
            {
                let entry = entry?;
                if entry.file_type().is_file() && is_image_file(entry.path()) {
                    class_samples.push(ImageSample {
                        path: entry.path().to_path_buf(),
                        label,
                    });
                }
            }

            class_samples.sort_by(|a, b| a.path.cmp(&b.path));
            debug!(
                "Class '{}' (label {}): {} samples",
                class_name,
                label,
                class_samples.len()
            );
            samples.extend(class_samples);
        }

        if samples.is_empty() {
            return Err(FinetuneError::Dataset(format!(
                "No images found in {}",
                root.display()
            )));
        }

        info!(
            "Found {} images in {} classes under {:?}",
            samples.len(),
            classes.len(),
            root
        );

        Ok(Self {
            root,
            classes,
            samples,
        })
    }

    /// Class names, index = label
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// All samples
    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the folder holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples per class
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Consume the folder, returning its samples
    pub fn into_samples(self) -> Vec<ImageSample> {
        self.samples
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Write a small solid-colour RGB image
    pub(crate) fn write_image(path: &Path, color: [u8; 3], size: (u32, u32)) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let img = image::ImageBuffer::from_fn(size.0, size.1, |_, _| image::Rgb(color));
        img.save(path).unwrap();
    }

    #[test]
    fn test_classes_sorted_and_indexed() {
        let dir = TempDir::new().unwrap();
        write_image(&dir.path().join("zebra/a.png"), [0, 0, 0], (8, 8));
        write_image(&dir.path().join("ant/a.png"), [255, 0, 0], (8, 8));
        write_image(&dir.path().join("ant/b.jpg"), [255, 0, 0], (8, 8));

        let folder = ImageFolder::open(dir.path()).unwrap();
        assert_eq!(folder.classes(), &["ant".to_string(), "zebra".to_string()]);
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.class_counts(), vec![2, 1]);
        assert!(folder.samples().iter().all(|s| s.label < 2));
    }

    #[test]
    fn test_nested_images_and_non_images() {
        let dir = TempDir::new().unwrap();
        write_image(&dir.path().join("cat/deep/x.png"), [1, 2, 3], (4, 4));
        fs::write(dir.path().join("cat/notes.txt"), "not an image").unwrap();

        let folder = ImageFolder::open(dir.path()).unwrap();
        assert_eq!(folder.len(), 1);
        assert_eq!(folder.num_classes(), 1);
    }

    #[test]
    fn test_missing_root() {
        let err = ImageFolder::open("/definitely/not/here").unwrap_err();
        assert!(matches!(err, FinetuneError::PathNotFound(_)));
    }

    #[test]
    fn test_empty_class_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        let err = ImageFolder::open(dir.path()).unwrap_err();
        assert!(matches!(err, FinetuneError::Dataset(_)));
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("x.webp")));
        assert!(!is_image_file(Path::new("x.txt")));
        assert!(!is_image_file(Path::new("noext")));
    }
}
