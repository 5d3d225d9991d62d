//! Records accumulated during a scan

use crate::assets::AssetTable;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque game identity, assigned to a canonical path on first sight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameId(pub usize);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A launchable file of a game
#[derive(Debug, Clone, PartialEq)]
pub struct GameFile {
    pub name: String,
    /// Canonical path
    pub path: PathBuf,
    /// Owning game (back-reference only)
    pub game: GameId,
}

impl GameFile {
    pub fn new(game: GameId, path: &Path, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.to_path_buf(),
            game,
        }
    }

    /// File name without its last extension
    pub fn basename(&self) -> String {
        file_basename(&self.path)
    }

    /// Canonical parent directory joined with the basename; the media join key
    pub fn short_path(&self) -> String {
        let dir = self
            .path
            .parent()
            .map(|parent| parent.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}/{}", dir.trim_end_matches('/'), self.basename())
    }
}

/// File name without its last extension (`game.v2.zip` -> `game.v2`)
pub fn file_basename(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Release date with independently optional parts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl ReleaseDate {
    /// Parse `YYYY`, `YYYY-M[M]` or `YYYY-M[M]-D[D]`; out of range parts are clamped
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('-');

        let year = parts.next()?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year: i32 = year.parse().ok()?;

        let mut date = Self {
            year: Some(year.clamp(1, 9999)),
            month: None,
            day: None,
        };

        if let Some(month) = parts.next() {
            date.month = Some(parse_date_part(month)?.clamp(1, 12));
        }
        if let Some(day) = parts.next() {
            if date.month.is_none() {
                return None;
            }
            date.day = Some(parse_date_part(day)?.clamp(1, 31));
        }
        if parts.next().is_some() {
            return None;
        }

        Some(date)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: Some(date.year()),
            month: Some(date.month()),
            day: Some(date.day()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }
}

fn parse_date_part(text: &str) -> Option<u32> {
    if text.is_empty() || text.len() > 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl fmt::Display for ReleaseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(year) = self.year else {
            return Ok(());
        };
        write!(f, "{:04}", year)?;
        if let Some(month) = self.month {
            write!(f, "-{:02}", month)?;
            if let Some(day) = self.day {
                write!(f, "-{:02}", day)?;
            }
        }
        Ok(())
    }
}

/// A game while the scan is running
#[derive(Debug, Clone, PartialEq)]
pub struct PendingGame {
    pub id: GameId,
    pub files: Vec<GameFile>,
    pub title: String,
    pub sort_by: String,
    pub summary: String,
    pub description: String,
    pub release: ReleaseDate,
    /// 0.0 - 1.0
    pub rating: Option<f32>,
    pub players: u32,
    pub play_count: u32,
    /// Seconds
    pub play_time: u64,
    pub last_played: Option<DateTime<Utc>>,
    pub favorite: bool,
    pub developers: Vec<String>,
    pub publishers: Vec<String>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub launch_cmd: String,
    pub workdir: String,
    pub assets: AssetTable,
    /// Tags of the collections this game belongs to
    pub collections: Vec<String>,
}

impl PendingGame {
    /// An empty game bound to its first file; title and sort key default to
    /// the file's basename
    pub fn new(id: GameId, path: &Path) -> Self {
        let basename = file_basename(path);
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            id,
            files: vec![GameFile::new(id, path, name)],
            title: basename.clone(),
            sort_by: basename,
            summary: String::new(),
            description: String::new(),
            release: ReleaseDate::default(),
            rating: None,
            players: 1,
            play_count: 0,
            play_time: 0,
            last_played: None,
            favorite: false,
            developers: Vec::new(),
            publishers: Vec::new(),
            genres: Vec::new(),
            tags: Vec::new(),
            launch_cmd: String::new(),
            workdir: String::new(),
            assets: AssetTable::default(),
            collections: Vec::new(),
        }
    }

    /// Set the title; the sort key follows unless it was set explicitly
    pub fn set_title(&mut self, title: &str) {
        let title = title.trim();
        if title.is_empty() {
            return;
        }
        if self.sort_by == self.title {
            self.sort_by = title.to_string();
        }
        self.title = title.to_string();
    }

    pub fn set_rating(&mut self, rating: f32) {
        self.rating = Some(rating.clamp(0.0, 1.0));
    }

    /// Key used when ordering games inside a collection
    pub fn sort_key(&self) -> &str {
        if self.sort_by.is_empty() {
            &self.title
        } else {
            &self.sort_by
        }
    }
}

/// A collection while the scan is running
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingCollection {
    pub tag: String,
    pub name: String,
    pub short_name: String,
    pub sort_by: String,
    pub launch_cmd: String,
    pub workdir: String,
    pub summary: String,
    pub description: String,
    pub assets: AssetTable,
    pub members: Vec<GameId>,
    pub source_dirs: Vec<PathBuf>,
}

impl PendingCollection {
    pub fn new(tag: &str, name: &str) -> Self {
        Self {
            tag: tag.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Record a directory the collection was discovered under
    pub fn add_source_dir(&mut self, dir: &Path) {
        if !self.source_dirs.iter().any(|known| known == dir) {
            self.source_dirs.push(dir.to_path_buf());
        }
    }

    pub fn sort_key(&self) -> &str {
        if self.sort_by.is_empty() {
            &self.name
        } else {
            &self.sort_by
        }
    }
}

/// Append a trimmed value unless it is empty or already present.
/// Returns whether the list changed.
pub fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || list.iter().any(|known| known == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

/// Case-insensitive grouping first, exact comparison as tiebreak
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
