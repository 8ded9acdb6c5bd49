//! Content scanner: registers files on disk that have no catalog record.

pub mod media_type;
pub mod variants;

use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::{Catalog, NewRecord, RecordId};
use crate::error::{AppError, Result};
use crate::fs::operations;
use crate::fs::tree::is_hidden;
use crate::paths;

use self::variants::{VariantGenerator, VariantName};

/// Outcome of one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Records created by this scan, in walk order.
    pub registered: Vec<RecordId>,
    /// Files that already had a record (directly or as a variant).
    pub known: usize,
}

/// Recursive scan over one directory of the content root.
pub struct ContentScanner<'a> {
    root: &'a Path,
    base_url: &'a str,
    catalog: &'a dyn Catalog,
    variants: &'a dyn VariantGenerator,
    variant_mode: Option<u32>,
}

impl<'a> ContentScanner<'a> {
    pub fn new(
        root: &'a Path,
        base_url: &'a str,
        catalog: &'a dyn Catalog,
        variants: &'a dyn VariantGenerator,
    ) -> Self {
        Self {
            root,
            base_url,
            catalog,
            variants,
            variant_mode: None,
        }
    }

    /// Permission bits applied to generated variant files.
    pub fn with_variant_mode(mut self, mode: Option<u32>) -> Self {
        self.variant_mode = mode;
        self
    }

    /// Canonical URL of a file, e.g. `http://host/uploads/a/b.jpg`.
    fn canonical_url(&self, relative: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), relative)
    }

    /// Walk `dirname` depth-first and register every unreferenced file.
    ///
    /// Entries starting with `.` are skipped, including whole hidden directories. The first
    /// error aborts the remaining walk.
    pub fn scan(&self, dirname: &str) -> Result<ScanReport> {
        let start = paths::resolve(self.root, dirname)?;
        if !start.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", start.display()),
            )
            .into());
        }
        let mut report = ScanReport::default();

        let walker = WalkDir::new(&start)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()));

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = self.relative_id(entry.path())?;
            if self.is_referenced(&relative)? {
                debug!(path = %relative, "already registered");
                report.known += 1;
                continue;
            }
            report.registered.push(self.register(entry.path(), &relative)?);
        }

        info!(
            dir = dirname,
            registered = report.registered.len(),
            known = report.known,
            "scan finished"
        );
        Ok(report)
    }

    fn relative_id(&self, path: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(self.root)
            .map_err(|_| AppError::InvalidPath(path.display().to_string()))?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        Ok(segments.join("/"))
    }

    /// Whether a record references the file directly, or the file is a known derived variant
    /// of a record in the same directory.
    fn is_referenced(&self, relative: &str) -> Result<bool> {
        if self
            .catalog
            .references_file(&self.canonical_url(relative), relative)?
        {
            return Ok(true);
        }
        let filename = paths::basename(relative);
        Ok(VariantName::matches(filename)
            && self
                .catalog
                .references_derived(paths::dirname(relative), filename)?)
    }

    fn register(&self, file: &Path, relative: &str) -> Result<RecordId> {
        let title = file
            .file_stem()
            .map(|s| s.to_string_lossy().trim().to_string())
            .unwrap_or_default();
        let mime_type = media_type::detect(file);

        let id = self.catalog.insert(NewRecord {
            guid: self.canonical_url(relative),
            title,
            mime_type: mime_type.clone(),
            primary_path: relative.to_string(),
        })?;
        info!(id, path = relative, "registered untracked file");

        let derived = match self.variants.generate(file, mime_type.as_deref()) {
            Ok(derived) => derived,
            Err(e) => {
                warn!(path = relative, error = %e, "variant generation failed");
                Vec::new()
            }
        };
        if derived.is_empty() {
            return Ok(id);
        }
        self.catalog.set_derived(id, &derived)?;

        if let (Some(mode), Some(dir)) = (self.variant_mode, file.parent()) {
            for variant in &derived {
                let path = dir.join(&variant.file);
                if !path.exists() {
                    continue;
                }
                if let Err(e) = operations::set_mode(&path, mode) {
                    warn!(file = %path.display(), error = %e, "could not normalize permissions");
                }
            }
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DerivedFile, SqliteCatalog};
    use crate::scan::variants::{ImageVariants, NoVariants, VariantSize};
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    const BASE_URL: &str = "http://localhost/uploads";

    fn setup_content() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("photos").join("2024")).unwrap();
        fs::create_dir(dir.path().join(".trash")).unwrap();
        fs::write(dir.path().join("top.pdf"), "%PDF").unwrap();
        fs::write(dir.path().join("photos").join("cat.jpg"), "jpg").unwrap();
        fs::write(dir.path().join("photos").join("2024").join("dog.jpg"), "jpg").unwrap();
        fs::write(dir.path().join(".trash").join("old.jpg"), "jpg").unwrap();
        fs::write(dir.path().join(".htaccess"), "deny").unwrap();
        dir
    }

    #[test]
    fn registers_untracked_files_recursively() {
        let dir = setup_content();
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let scanner = ContentScanner::new(dir.path(), BASE_URL, &catalog, &NoVariants);

        let report = scanner.scan(paths::ROOT_ID).unwrap();
        assert_eq!(report.registered.len(), 3);
        assert_eq!(report.known, 0);

        let listed: Vec<String> = catalog
            .records_under(paths::ROOT_ID)
            .unwrap()
            .into_iter()
            .map(|r| r.primary_path)
            .collect();
        assert_eq!(listed, vec!["photos/2024/dog.jpg", "photos/cat.jpg", "top.pdf"]);
    }

    #[test]
    fn registered_record_fields() {
        let dir = setup_content();
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let scanner = ContentScanner::new(dir.path(), BASE_URL, &catalog, &NoVariants);
        scanner.scan("photos/2024").unwrap();

        let records = catalog.records_in("photos/2024").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "dog");
        assert_eq!(records[0].guid, "http://localhost/uploads/photos/2024/dog.jpg");
        assert_eq!(records[0].mime_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn second_scan_registers_nothing() {
        let dir = setup_content();
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let scanner = ContentScanner::new(dir.path(), BASE_URL, &catalog, &NoVariants);

        assert_eq!(scanner.scan(paths::ROOT_ID).unwrap().registered.len(), 3);
        let second = scanner.scan(paths::ROOT_ID).unwrap();
        assert!(second.registered.is_empty());
        assert_eq!(second.known, 3);
    }

    #[test]
    fn generated_variants_are_not_registered_on_rescan() {
        let dir = TempDir::new().unwrap();
        RgbImage::from_pixel(400, 400, Rgb([0, 120, 0]))
            .save(dir.path().join("leaf.png"))
            .unwrap();
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let generator = ImageVariants::new(VariantSize::defaults());
        let scanner = ContentScanner::new(dir.path(), BASE_URL, &catalog, &generator)
            .with_variant_mode(Some(0o755));

        let first = scanner.scan(paths::ROOT_ID).unwrap();
        assert_eq!(first.registered.len(), 1);
        let record = catalog.get(first.registered[0]).unwrap().unwrap();
        assert_eq!(record.derived.len(), 2);
        assert!(dir.path().join("leaf-150x150.png").exists());

        let second = scanner.scan(paths::ROOT_ID).unwrap();
        assert!(second.registered.is_empty());
        assert_eq!(second.known, 3);
    }

    #[test]
    fn variant_named_file_without_owner_is_registered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("poster-800x600.pdf"), "%PDF").unwrap();
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let scanner = ContentScanner::new(dir.path(), BASE_URL, &catalog, &NoVariants);
        assert_eq!(scanner.scan(paths::ROOT_ID).unwrap().registered.len(), 1);
    }

    #[test]
    fn variant_of_record_in_other_directory_is_registered() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("cat-150x150.jpg"), "jpg").unwrap();
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = catalog
            .insert(NewRecord {
                guid: format!("{}/a/cat.jpg", BASE_URL),
                title: "cat".into(),
                mime_type: None,
                primary_path: "a/cat.jpg".into(),
            })
            .unwrap();
        catalog
            .set_derived(
                id,
                &[DerivedFile {
                    suffix: "thumbnail".into(),
                    file: "cat-150x150.jpg".into(),
                    width: 150,
                    height: 150,
                }],
            )
            .unwrap();

        let scanner = ContentScanner::new(dir.path(), BASE_URL, &catalog, &NoVariants);
        assert_eq!(scanner.scan(paths::ROOT_ID).unwrap().registered.len(), 1);
    }

    #[test]
    fn moved_record_is_recognized_by_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("z")).unwrap();
        fs::write(dir.path().join("z").join("cat.jpg"), "jpg").unwrap();
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .insert(NewRecord {
                guid: format!("{}/a/cat.jpg", BASE_URL),
                title: "cat".into(),
                mime_type: None,
                primary_path: "z/cat.jpg".into(),
            })
            .unwrap();

        let scanner = ContentScanner::new(dir.path(), BASE_URL, &catalog, &NoVariants);
        let report = scanner.scan(paths::ROOT_ID).unwrap();
        assert!(report.registered.is_empty());
    }

    #[test]
    fn missing_start_directory_fails() {
        let dir = TempDir::new().unwrap();
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let scanner = ContentScanner::new(dir.path(), BASE_URL, &catalog, &NoVariants);
        assert!(scanner.scan("nope").is_err());
    }
}
