//! Template loading utilities

use super::{Template, TemplateSet};
use crate::error::ScanError;
use crate::traits::Detectable;
use crate::utils::image::ImageUtils;
use crate::Result;
use anyhow::Context;
use image::RgbaImage;
use invscan_core::Entity;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Template loader with multiple search strategies
#[derive(Debug, Clone)]
pub struct TemplateLoader {
    template_dirs: Vec<PathBuf>,
    supported_extensions: Vec<String>,
    base_path: Option<PathBuf>,
}

impl TemplateLoader {
    /// Create new template loader
    pub fn new() -> Self {
        Self {
            template_dirs: Vec::new(),
            supported_extensions: vec![
                "png".to_string(),
                "jpg".to_string(),
                "jpeg".to_string(),
                "bmp".to_string(),
                "webp".to_string(),
            ],
            base_path: None,
        }
    }

    /// Add template directory
    pub fn add_template_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.template_dirs.push(dir.as_ref().to_path_buf());
        self
    }

    /// Root that catalog `image` paths are relative to. Setting the same
    /// path twice, with or without trailing separators, is a no-op.
    pub fn set_base_path(&mut self, path: &str) {
        let trimmed = path.trim_end_matches(['/', '\\']);
        let normalized = if trimmed.is_empty() && !path.is_empty() {
            PathBuf::from(&path[..1])
        } else {
            PathBuf::from(trimmed)
        };

        if self.base_path.as_ref() != Some(&normalized) {
            debug!(base_path = ?normalized, "Template base path set");
            self.base_path = Some(normalized);
        }
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Where a catalog `image` path points, relative paths joined to the base path
    pub fn resolve_image_path(&self, image: &str) -> PathBuf {
        let path = Path::new(image);
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Load the template for one entity: its catalog image first, then the
    /// usual file-name candidates in every template directory.
    pub fn load_template(&self, entity: &Entity) -> Result<Option<Template>> {
        if let Some(image) = &entity.image {
            let path = self.resolve_image_path(image);
            if path.exists() {
                let rgba = ImageUtils::load_rgba(&path)
                    .with_context(|| format!("Failed to load template: {:?}", path))?;
                return Ok(Some(
                    Template::new(entity.clone(), rgba)
                        .with_metadata("path", path.to_string_lossy()),
                ));
            }
        }

        for candidate in self.generate_template_candidates(&entity.template_names()) {
            if let Some(path) = self.find_template_file(&candidate)? {
                let rgba = ImageUtils::load_rgba(&path)
                    .with_context(|| format!("Failed to load template: {:?}", path))?;

                return Ok(Some(
                    Template::new(entity.clone(), rgba)
                        .with_metadata("path", path.to_string_lossy())
                        .with_metadata("original_name", candidate),
                ));
            }
        }

        Ok(None)
    }

    /// Build a named set from every entity that has a template on disk.
    /// Entities without one are skipped; unreadable files are logged and skipped.
    pub fn load_template_set(&self, name: &str, entities: &[Entity]) -> TemplateSet {
        let mut set = TemplateSet::new(name);

        for entity in entities {
            match self.load_template(entity) {
                Ok(Some(template)) => set.push(template),
                Ok(None) => debug!(id = %entity.id, "No template found"),
                Err(e) => warn!(id = %entity.id, error = %e, "Skipping unreadable template"),
            }
        }

        debug!(set = name, templates = set.len(), "Loaded template set");
        set
    }

    /// Start loading a set on a blocking task. Must be called inside a
    /// tokio runtime; nothing is read until the runtime schedules the task.
    pub fn fetch(&self, name: &str, entities: Vec<Entity>, timeout: Duration) -> TemplateFetch {
        let loader = self.clone();
        let set_name = name.to_string();
        let handle = tokio::task::spawn_blocking(move || loader.load_template_set(&set_name, &entities));
        TemplateFetch::new(name, handle, timeout)
    }

    /// Generate template file name candidates
    fn generate_template_candidates(&self, names: &[String]) -> Vec<String> {
        let mut candidates = Vec::new();

        for name in names {
            for ext in &self.supported_extensions {
                let exact = format!("{}.{}", name, ext);
                if !candidates.contains(&exact) {
                    candidates.push(exact);
                }
                let lower = format!("{}.{}", name.to_lowercase(), ext);
                if !candidates.contains(&lower) {
                    candidates.push(lower);
                }
            }
        }

        candidates
    }

    /// Find template file in directories
    fn find_template_file(&self, candidate: &str) -> Result<Option<PathBuf>> {
        let dirs = self.template_dirs.iter().chain(self.base_path.iter());

        for dir in dirs {
            let path = dir.join(candidate);
            if path.exists() {
                return Ok(Some(path));
            }

            // Case-insensitive search
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let file_name = entry.file_name();
                    if file_name.to_string_lossy().eq_ignore_ascii_case(candidate) {
                        return Ok(Some(entry.path()));
                    }
                }
            }
        }

        Ok(None)
    }
}

impl Default for TemplateLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Where an image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    DataUrl(String),
    Bytes(Vec<u8>),
}

/// Decode an image on a blocking task, giving up after `timeout`.
pub async fn load_image(source: ImageSource, timeout: Duration) -> std::result::Result<RgbaImage, ScanError> {
    let task = tokio::task::spawn_blocking(move || -> std::result::Result<RgbaImage, ScanError> {
        match source {
            ImageSource::Path(path) => {
                let bytes = fs::read(&path)?;
                ImageUtils::decode_bytes(&bytes)
            }
            ImageSource::DataUrl(url) => ImageUtils::decode_data_url(&url),
            ImageSource::Bytes(bytes) => ImageUtils::decode_bytes(&bytes),
        }
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined.map_err(|err| ScanError::Decode(format!("join error: {err}")))?,
        Err(_) => Err(ScanError::Timeout(timeout)),
    }
}

/// A template set that is still loading.
///
/// The load gets a fixed time budget. A fetch that is cancelled, either
/// directly or through a [`FetchCancel`], or that runs late resolves to `None`.
#[derive(Debug)]
pub struct TemplateFetch {
    name: String,
    handle: JoinHandle<TemplateSet>,
    timeout: Duration,
    cancelled: Arc<AtomicBool>,
}

/// Cancels a [`TemplateFetch`] from another task
#[derive(Debug, Clone)]
pub struct FetchCancel(Arc<AtomicBool>);

impl FetchCancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl TemplateFetch {
    pub fn new(name: impl Into<String>, handle: JoinHandle<TemplateSet>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            handle,
            timeout,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn cancel_handle(&self) -> FetchCancel {
        FetchCancel(self.cancelled.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for the set. Failures are logged and turn into `None`.
    pub async fn resolve(self) -> Option<TemplateSet> {
        let name = self.name.clone();
        match self.try_resolve().await {
            Ok(set) => Some(set),
            Err(e) => {
                warn!(set = %name, error = %e, "Template set unavailable, skipping");
                None
            }
        }
    }

    async fn try_resolve(self) -> std::result::Result<TemplateSet, ScanError> {
        let Self { name, handle, timeout, cancelled } = self;

        if cancelled.load(Ordering::SeqCst) {
            handle.abort();
            return Err(ScanError::Cancelled(name));
        }

        let abort = handle.abort_handle();
        let set = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(set)) => set,
            Ok(Err(err)) => return Err(ScanError::Decode(format!("join error: {err}"))),
            Err(_) => {
                abort.abort();
                return Err(ScanError::Timeout(timeout));
            }
        };

        if cancelled.load(Ordering::SeqCst) {
            return Err(ScanError::Cancelled(name));
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invscan_core::Rarity;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("invscan-loader-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_png(path: &Path, color: [u8; 4]) {
        RgbaImage::from_pixel(8, 8, image::Rgba(color)).save(path).unwrap();
    }

    #[test]
    fn test_set_base_path_is_idempotent() {
        let mut loader = TemplateLoader::new();
        loader.set_base_path("assets/items/");
        let first = loader.base_path().map(Path::to_path_buf);
        loader.set_base_path("assets/items");
        loader.set_base_path("assets/items//");
        assert_eq!(loader.base_path().map(Path::to_path_buf), first);
        assert_eq!(
            loader.resolve_image_path("sword.png"),
            PathBuf::from("assets/items").join("sword.png")
        );
    }

    #[test]
    fn test_load_template_by_name_candidates() {
        let dir = temp_dir("names");
        write_png(&dir.join("Big_Bonk.png"), [200, 10, 10, 255]);

        let loader = TemplateLoader::new().add_template_dir(&dir);
        let entity = Entity::new("BigBonk", "Big Bonk", Rarity::Rare);
        let template = loader.load_template(&entity).unwrap().unwrap();

        assert_eq!(template.entity.id, "BigBonk");
        assert_eq!(template.image.dimensions(), (8, 8));

        let missing = Entity::new("ghost", "Ghost", Rarity::Common);
        assert!(loader.load_template(&missing).unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_template_from_catalog_image_path() {
        let dir = temp_dir("catalog");
        fs::create_dir_all(dir.join("items")).unwrap();
        write_png(&dir.join("items").join("anything.png"), [10, 200, 10, 255]);

        let mut loader = TemplateLoader::new();
        loader.set_base_path(dir.to_str().unwrap());
        let entity = Entity::new("clover", "Clover", Rarity::Common).with_image("items/anything.png");

        let set = loader.load_template_set("default", std::slice::from_ref(&entity));
        assert_eq!(set.len(), 1);
        assert_eq!(set.templates[0].image.get_pixel(0, 0).0, [10, 200, 10, 255]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_load_image_sources() {
        let dir = temp_dir("sources");
        let path = dir.join("frame.png");
        write_png(&path, [1, 2, 3, 255]);

        let from_path = load_image(ImageSource::Path(path.clone()), Duration::from_secs(5)).await.unwrap();
        assert_eq!(from_path.dimensions(), (8, 8));

        let bytes = fs::read(&path).unwrap();
        let from_bytes = load_image(ImageSource::Bytes(bytes), Duration::from_secs(5)).await.unwrap();
        assert_eq!(from_bytes, from_path);

        let bad = load_image(ImageSource::DataUrl("nope".into()), Duration::from_secs(5)).await;
        assert!(matches!(bad, Err(ScanError::InvalidDataUrl(_))));

        let missing = load_image(ImageSource::Path(dir.join("missing.png")), Duration::from_secs(5)).await;
        assert!(matches!(missing, Err(ScanError::Io(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_load_image_rejects_undecodable_payload() {
        use base64::Engine;

        let payload = base64::engine::general_purpose::STANDARD.encode(b"not an image at all");
        let url = format!("data:image/png;base64,{payload}");
        let junk = load_image(ImageSource::DataUrl(url), Duration::from_secs(5)).await;
        assert!(matches!(junk, Err(ScanError::Decode(_))));

        let junk = load_image(ImageSource::Bytes(vec![0x89, b'P', b'N', b'G']), Duration::from_secs(5)).await;
        assert!(matches!(junk, Err(ScanError::Decode(_))));
    }

    #[tokio::test]
    async fn test_load_image_times_out() {
        let frame = RgbaImage::from_fn(2048, 2048, |x, y| {
            image::Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8, 255])
        });
        let mut bytes = Vec::new();
        frame
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let late = load_image(ImageSource::Bytes(bytes), Duration::ZERO).await;
        assert!(matches!(late, Err(ScanError::Timeout(d)) if d == Duration::ZERO));
    }

    #[tokio::test]
    async fn test_fetch_timeout_and_cancel() {
        let slow = tokio::task::spawn_blocking(|| {
            std::thread::sleep(Duration::from_millis(300));
            TemplateSet::new("slow")
        });
        let fetch = TemplateFetch::new("slow", slow, Duration::from_millis(20));
        assert!(fetch.resolve().await.is_none());

        let quick = tokio::task::spawn_blocking(|| TemplateSet::new("quick"));
        let fetch = TemplateFetch::new("quick", quick, Duration::from_secs(5));
        fetch.cancel_handle().cancel();
        assert!(fetch.is_cancelled());
        assert!(fetch.resolve().await.is_none());

        let ok = tokio::task::spawn_blocking(|| TemplateSet::new("ok"));
        let fetch = TemplateFetch::new("ok", ok, Duration::from_secs(5));
        assert_eq!(fetch.resolve().await.map(|s| s.name), Some("ok".to_string()));
    }
}
