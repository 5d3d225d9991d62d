//! Deterministic directory walking

use std::cmp::Ordering;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

/// Preferred order of extensions for files sharing a base name
const EXTENSION_PREFERENCE: &[&str] = &["png", "jpg", "webm", "mp4", "avi", "mp3", "ogg", "wav"];

/// Directory walker configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory names skipped directly below the root
    pub skip_dirs: HashSet<String>,

    /// Maximum depth below the root, `None` for unlimited
    pub max_depth: Option<usize>,

    /// Follow symbolic links
    pub follow_links: bool,

    /// Skip hidden files/directories
    pub skip_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_dirs: HashSet::new(),
            max_depth: None,
            follow_links: true,
            skip_hidden: true,
        }
    }
}

impl ScanConfig {
    /// Only the files directly inside the root
    pub fn flat() -> Self {
        Self {
            max_depth: Some(1),
            ..Default::default()
        }
    }

    pub fn skip_dir(mut self, name: &str) -> Self {
        self.skip_dirs.insert(name.to_lowercase());
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// Walks directory trees in a stable order, checking for cancellation
/// between entries
pub struct DirScanner {
    config: ScanConfig,
}

impl Default for DirScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DirScanner {
    /// Create a new scanner with default config
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    /// Create with custom config
    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// All regular files below `root`, sorted by name with extension
    /// preference for equal base names. A missing root yields no files; a
    /// cancelled walk returns what it found so far.
    pub fn files(&self, root: &Path, cancel: &CancellationToken) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if !root.is_dir() {
            tracing::debug!("Skipping missing directory {}", root.display());
            return files;
        }

        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(self.config.follow_links)
            .sort_by(|a, b| entry_order(a.file_name(), b.file_name()));
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let iter = walker.into_iter().filter_entry(|entry| self.keep(entry));
        for entry in iter {
            if cancel.is_cancelled() {
                tracing::debug!("Walk of {} cancelled", root.display());
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry below {}: {}", root.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        files
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();

        // Skip hidden files/directories
        if self.config.skip_hidden && name.starts_with('.') {
            return false;
        }

        if entry.depth() == 1
            && entry.file_type().is_dir()
            && self.config.skip_dirs.contains(&name.to_lowercase())
        {
            return false;
        }

        true
    }
}

/// Name order with extension preference: base name first, then the
/// preferred extension, then the full name
pub fn entry_order(a: &OsStr, b: &OsStr) -> Ordering {
    let a = Path::new(a);
    let b = Path::new(b);

    a.file_stem()
        .cmp(&b.file_stem())
        .then_with(|| extension_rank(a).cmp(&extension_rank(b)))
        .then_with(|| a.cmp(b))
}

fn extension_rank(path: &Path) -> usize {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    EXTENSION_PREFERENCE
        .iter()
        .position(|known| *known == ext)
        .unwrap_or(EXTENSION_PREFERENCE.len())
}

/// Absolute, symlink-free form of an existing path
pub fn canonical_path(path: &Path) -> Option<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(canonical) => Some(canonical),
        Err(e) => {
            tracing::debug!("Cannot canonicalize {}: {}", path.display(), e);
            None
        }
    }
}

/// `file://` URL of a local path, or the text itself when it already is a
/// web URL
pub fn to_asset_url(path_or_url: &str) -> String {
    if is_web_url(path_or_url) || path_or_url.starts_with("file://") {
        return path_or_url.to_string();
    }
    format!("file://{}", path_or_url)
}

pub fn is_web_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_config_default() {
        let config = ScanConfig::default();
        assert!(config.follow_links);
        assert!(config.skip_hidden);
        assert!(config.max_depth.is_none());
        assert!(ScanConfig::default().skip_dir("Media").skip_dirs.contains("media"));
    }

    #[test]
    fn test_entry_order_prefers_png() {
        let mut names = vec!["mario.jpg", "luigi.png", "mario.png", "mario-boxFront.png"];
        names.sort_by(|a, b| entry_order(OsStr::new(a), OsStr::new(b)));
        assert_eq!(
            names,
            vec!["luigi.png", "mario.png", "mario.jpg", "mario-boxFront.png"]
        );
    }

    #[test]
    fn test_walk_is_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("b.zip"));
        touch(&root.join("a.zip"));
        touch(&root.join(".hidden.zip"));
        touch(&root.join("media/a-boxFront.png"));
        touch(&root.join("sub/c.zip"));

        let cancel = CancellationToken::new();
        let scanner = DirScanner::with_config(ScanConfig::default().skip_dir("media"));
        let names: Vec<String> = scanner
            .files(root, &cancel)
            .iter()
            .map(|path| path.strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.zip", "b.zip", "sub/c.zip"]);
    }

    #[test]
    fn test_flat_walk() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("top.png"));
        touch(&temp_dir.path().join("deep/inner.png"));

        let files = DirScanner::with_config(ScanConfig::flat())
            .files(temp_dir.path(), &CancellationToken::new());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("top.png"));
    }

    #[test]
    fn test_cancelled_walk_returns_nothing_new() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("a.zip"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(DirScanner::new().files(temp_dir.path(), &cancel).is_empty());
    }

    #[test]
    fn test_missing_root() {
        let files = DirScanner::new().files(Path::new("/nonexistent/games"), &CancellationToken::new());
        assert!(files.is_empty());
    }

    #[test]
    fn test_asset_urls() {
        assert_eq!(to_asset_url("/media/a.png"), "file:///media/a.png");
        assert_eq!(to_asset_url("https://x/y.png"), "https://x/y.png");
        assert_eq!(to_asset_url("file:///a.png"), "file:///a.png");
    }
}
