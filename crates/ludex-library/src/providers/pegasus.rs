//! Native metadata files
//!
//! Every game directory may hold one metadata file describing collections
//! (with file filters selecting their games) and individual games:
//!
//! ```text
//! collection: Super Nintendo
//! shortname: snes
//! extensions: sfc, smc
//! launch: snes9x "{file.path}"
//!
//! game: Super Mario World
//! file: smw.sfc
//! developer: Nintendo
//! release: 1990-11-21
//! rating: 90%
//! assets.logo: media/smw-logo.png
//! ```

use super::Discovery;
use crate::LibraryError;
use crate::assets::AssetType;
use crate::context::SearchContext;
use crate::metafile::{self, Entry, merge_lines, split_list};
use crate::model::{GameId, PendingGame, ReleaseDate, push_unique};
use crate::scanner::{DirScanner, ScanConfig, canonical_path, is_web_url, to_asset_url};
use ludex_config::{ProviderSettings, user_config_dir};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Per-directory metadata file names, in lookup order
const METAFILE_NAMES: [&str; 4] = [
    "collections.pegasus.txt",
    "metadata.pegasus.txt",
    "collections.txt",
    "metadata.txt",
];

const MEDIA_DIR: &str = "media";

/// Compiled value patterns
struct Patterns {
    global_metafile: Regex,
    asset_key: Regex,
    count_range: Regex,
    percent: Regex,
    fraction: Regex,
}

impl Patterns {
    fn new() -> Result<Self, LibraryError> {
        Ok(Self {
            global_metafile: Regex::new(r"^(.+\.)?metadata(\.pegasus)?\.txt$")?,
            asset_key: Regex::new(r"^assets?\.(.+)$")?,
            count_range: Regex::new(r"^(\d+)(-(\d+))?$")?,
            percent: Regex::new(r"^\d+%$")?,
            fraction: Regex::new(r"^\d(\.\d+)?$")?,
        })
    }

    /// `4` or `1-4`; at least one player
    fn players(&self, text: &str) -> Option<u32> {
        let caps = self.count_range.captures(text)?;
        let a: u32 = caps.get(1)?.as_str().parse().ok()?;
        let b: u32 = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        Some(a.max(b).max(1))
    }

    /// `90%` or `0.9`
    fn rating(&self, text: &str) -> Option<f32> {
        if self.percent.is_match(text) {
            let value: f32 = text.trim_end_matches('%').parse().ok()?;
            return Some(value / 100.0);
        }
        if self.fraction.is_match(text) {
            return text.parse().ok();
        }
        None
    }
}

/// Include or exclude half of a collection's file filter
#[derive(Debug, Default)]
struct FilterGroup {
    extensions: Vec<String>,
    files: Vec<String>,
    regex: Option<Regex>,
}

/// The file selection of one `collection:` block
#[derive(Debug)]
struct FileFilter {
    tag: String,
    directories: Vec<PathBuf>,
    include: FilterGroup,
    exclude: FilterGroup,
}

impl FileFilter {
    fn new(tag: &str, base_dir: &Path) -> Self {
        Self {
            tag: tag.to_string(),
            directories: vec![base_dir.to_path_buf()],
            include: FilterGroup::default(),
            exclude: FilterGroup::default(),
        }
    }

    fn needs_scan(&self) -> bool {
        !self.include.extensions.is_empty() || self.include.regex.is_some()
    }

    fn passes(&self, path: &Path, exclude_files: &[PathBuf]) -> bool {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let text = path.to_string_lossy();

        let excluded = self.exclude.extensions.contains(&ext)
            || exclude_files.iter().any(|known| known == path)
            || self.exclude.regex.as_ref().is_some_and(|rx| rx.is_match(&text));
        if excluded {
            return false;
        }

        self.include.extensions.contains(&ext)
            || self.include.regex.as_ref().is_some_and(|rx| rx.is_match(&text))
    }
}

/// A `game:` block, applied once it is closed
#[derive(Debug)]
struct GameBlock {
    line: usize,
    title: String,
    collection: Option<String>,
    entries: Vec<Entry>,
}

/// Native metadata file provider
#[derive(Debug, Clone, Default)]
pub struct PegasusProvider {
    game_dirs: Vec<PathBuf>,
    metafiles_dir: Option<PathBuf>,
}

impl PegasusProvider {
    /// `game_dirs` (`;`-separated) extends the library-wide directories;
    /// `metafiles_dir` defaults to `<config_dir>/ludex/metafiles`
    pub fn from_settings(settings: &ProviderSettings, library_dirs: Vec<PathBuf>) -> Self {
        let mut game_dirs = library_dirs;
        for dir in settings.path_list_option("game_dirs") {
            if !game_dirs.contains(&dir) {
                game_dirs.push(dir);
            }
        }

        let metafiles_dir = settings
            .path_option("metafiles_dir")
            .or_else(|| user_config_dir().map(|dir| dir.join("metafiles")));

        Self {
            game_dirs,
            metafiles_dir,
        }
    }

    pub fn with_game_dirs(game_dirs: Vec<PathBuf>) -> Self {
        Self {
            game_dirs,
            metafiles_dir: None,
        }
    }

    pub fn with_metafiles_dir(mut self, dir: &Path) -> Self {
        self.metafiles_dir = Some(dir.to_path_buf());
        self
    }

    pub fn find(
        &self,
        ctx: &mut SearchContext,
        cancel: &CancellationToken,
    ) -> Result<Discovery, LibraryError> {
        let patterns = Patterns::new()?;
        let mut discovery = Discovery::default();
        let mut filters = Vec::new();
        let mut touched = HashSet::new();

        for path in self.global_metafiles(&patterns, cancel) {
            let mut reader = MetafileReader::new(&path, &patterns);
            reader.read(ctx, &mut filters, &mut touched);
        }

        for dir in &self.game_dirs {
            if cancel.is_cancelled() {
                break;
            }
            let Some(dir) = canonical_path(dir) else {
                tracing::warn!("Metafiles: game directory {} not found, ignored", dir.display());
                continue;
            };
            let Some(path) = find_metafile_in(&dir) else {
                tracing::warn!(
                    "Metafiles: no metadata file found in {}, directory ignored",
                    dir.display()
                );
                continue;
            };

            tracing::info!("Metafiles: found {}", path.display());
            discovery.add_metadata_dir(&dir);
            let mut reader = MetafileReader::new(&path, &patterns);
            reader.read(ctx, &mut filters, &mut touched);
        }

        for filter in &filters {
            apply_filter(filter, ctx, cancel, &mut touched);
            for dir in &filter.directories {
                discovery.add_metadata_dir(dir);
            }
        }

        discovery.game_count = touched.len();
        tracing::info!("Metafiles: found {} games", discovery.game_count);
        Ok(discovery)
    }

    fn global_metafiles(&self, patterns: &Patterns, cancel: &CancellationToken) -> Vec<PathBuf> {
        let Some(dir) = &self.metafiles_dir else {
            return Vec::new();
        };

        DirScanner::with_config(ScanConfig::flat())
            .files(dir, cancel)
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| patterns.global_metafile.is_match(&name.to_string_lossy()))
                    .unwrap_or(false)
            })
            .inspect(|path| tracing::info!("Metafiles: found {}", path.display()))
            .collect()
    }
}

fn find_metafile_in(dir: &Path) -> Option<PathBuf> {
    METAFILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Parser state for one metadata file
struct MetafileReader<'a> {
    path: &'a Path,
    source_name: String,
    dir: PathBuf,
    patterns: &'a Patterns,
    collection: Option<String>,
    filter: Option<usize>,
    game: Option<GameBlock>,
}

impl<'a> MetafileReader<'a> {
    fn new(path: &'a Path, patterns: &'a Patterns) -> Self {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self {
            path,
            source_name: path.to_string_lossy().to_string(),
            dir,
            patterns,
            collection: None,
            filter: None,
            game: None,
        }
    }

    fn warn(&self, line: usize, message: &str) {
        tracing::warn!("Metafiles: `{}`, line {}: {}", self.source_name, line, message);
    }

    fn read(
        &mut self,
        ctx: &mut SearchContext,
        filters: &mut Vec<FileFilter>,
        touched: &mut HashSet<GameId>,
    ) {
        let entries = match metafile::read_file(self.path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    "Metafiles: failed to read {}, file ignored: {}",
                    self.source_name,
                    e
                );
                return;
            }
        };

        for entry in entries {
            match entry {
                Ok(entry) => self.handle_entry(entry, ctx, filters, touched),
                Err(e) => tracing::warn!("Metafiles: {}", e),
            }
        }
        self.close_game(ctx, touched);
    }

    fn handle_entry(
        &mut self,
        entry: Entry,
        ctx: &mut SearchContext,
        filters: &mut Vec<FileFilter>,
        touched: &mut HashSet<GameId>,
    ) {
        match entry.key.as_str() {
            "collection" => {
                self.close_game(ctx, touched);

                let name = first_line(&entry);
                let tag = name.to_lowercase();
                ctx.collection_mut(&tag, name).add_source_dir(&self.dir);

                filters.push(FileFilter::new(&tag, &self.dir));
                self.filter = Some(filters.len() - 1);
                self.collection = Some(tag);
            }
            "game" => {
                self.close_game(ctx, touched);
                self.game = Some(GameBlock {
                    line: entry.line,
                    title: first_line(&entry).to_string(),
                    collection: self.collection.clone(),
                    entries: Vec::new(),
                });
            }
            key if key.starts_with("x-") => {}
            _ => {
                if let Some(game) = self.game.as_mut() {
                    game.entries.push(entry);
                } else if self.collection.is_some() {
                    self.apply_collection_entry(&entry, ctx, filters);
                } else {
                    self.warn(entry.line, "no `collection` or `game` defined yet, entry ignored");
                }
            }
        }
    }

    fn apply_collection_entry(
        &self,
        entry: &Entry,
        ctx: &mut SearchContext,
        filters: &mut [FileFilter],
    ) {
        let (Some(tag), Some(filter_index)) = (&self.collection, self.filter) else {
            return;
        };
        let Some(filter) = filters.get_mut(filter_index) else {
            return;
        };

        if let Some(kind) = self.asset_kind(entry) {
            let collection = ctx.collection_mut(tag, "");
            if let Some(kind) = kind {
                for value in entry.values.iter().filter(|value| !value.is_empty()) {
                    collection.assets.add(kind, self.asset_url(value));
                }
            }
            return;
        }

        let group = if entry.key.starts_with("ignore-") {
            &mut filter.exclude
        } else {
            &mut filter.include
        };
        let key = entry.key.trim_start_matches("ignore-");
        let is_ignore = entry.key.starts_with("ignore-");

        match key {
            "extension" | "extensions" => {
                for ext in split_list(&entry.values) {
                    let ext = ext.trim_start_matches('.').to_lowercase();
                    if !group.extensions.contains(&ext) {
                        group.extensions.push(ext);
                    }
                }
            }
            "file" | "files" => {
                for value in entry.values.iter().filter(|value| !value.is_empty()) {
                    if !group.files.contains(value) {
                        group.files.push(value.clone());
                    }
                }
            }
            "regex" => match Regex::new(first_line(entry)) {
                Ok(rx) => group.regex = Some(rx),
                Err(e) => self.warn(entry.line, &format!("invalid regular expression: {}", e)),
            },
            _ if is_ignore => self.warn(
                entry.line,
                &format!("unrecognized collection property `{}`, ignored", entry.key),
            ),
            "directory" | "directories" => {
                for value in entry.values.iter().filter(|value| !value.is_empty()) {
                    let path = self.dir.join(value);
                    match canonical_path(&path) {
                        Some(dir) => {
                            if !filter.directories.contains(&dir) {
                                filter.directories.push(dir);
                            }
                        }
                        None => self.warn(
                            entry.line,
                            &format!("directory path `{}` not found", path.display()),
                        ),
                    }
                }
            }
            _ => {
                let collection = ctx.collection_mut(tag, "");
                match key {
                    "shortname" => collection.short_name = first_line(entry).to_string(),
                    "sortname" | "sort_name" | "sort-name" => {
                        collection.sort_by = first_line(entry).to_string();
                    }
                    "launch" | "command" => collection.launch_cmd = merge_lines(&entry.values),
                    "workdir" | "cwd" => collection.workdir = first_line(entry).to_string(),
                    "summary" => collection.summary = replace_newlines(&merge_lines(&entry.values)),
                    "description" => {
                        collection.description = replace_newlines(&merge_lines(&entry.values));
                    }
                    _ => self.warn(
                        entry.line,
                        &format!("unrecognized collection property `{}`, ignored", entry.key),
                    ),
                }
            }
        }
    }

    /// `Some(kind)` for `assets.<key>` entries, with `None` inside when the
    /// key names no known category
    fn asset_kind(&self, entry: &Entry) -> Option<Option<AssetType>> {
        let caps = self.patterns.asset_key.captures(&entry.key)?;
        let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let kind = AssetType::from_key(key);
        if kind.is_none() {
            self.warn(entry.line, &format!("unknown asset type `{}`, entry ignored", key));
        }
        Some(kind)
    }

    fn asset_url(&self, value: &str) -> String {
        if is_web_url(value) {
            return value.to_string();
        }
        let path = self.dir.join(value);
        let path = canonical_path(&path).unwrap_or(path);
        to_asset_url(&path.to_string_lossy())
    }

    fn close_game(&mut self, ctx: &mut SearchContext, touched: &mut HashSet<GameId>) {
        let Some(block) = self.game.take() else {
            return;
        };

        let mut files = Vec::new();
        for entry in block.entries.iter().filter(|e| e.key == "file" || e.key == "files") {
            for value in entry.values.iter().filter(|value| !value.is_empty()) {
                match canonical_path(&self.dir.join(value)) {
                    Some(path) => {
                        if files.contains(&path) {
                            self.warn(entry.line, &format!("duplicate file `{}`", value));
                        } else {
                            files.push(path);
                        }
                    }
                    None => self.warn(entry.line, &format!("missing file `{}`", value)),
                }
            }
        }

        let Some((first, rest)) = files.split_first() else {
            self.warn(
                block.line,
                &format!("game `{}` has no existing file, entry ignored", block.title),
            );
            return;
        };

        let id = ctx.resolve_path(first);
        for path in rest {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            ctx.attach_file(id, path, &name);
        }
        if let Some(tag) = &block.collection {
            ctx.add_to_collection(id, tag);
        }
        touched.insert(id);

        let Some(game) = ctx.game_mut(id) else {
            return;
        };
        game.set_title(&block.title);
        for entry in &block.entries {
            self.apply_game_entry(game, entry);
        }
    }

    fn apply_game_entry(&self, game: &mut PendingGame, entry: &Entry) {
        if let Some(kind) = self.asset_kind(entry) {
            if let Some(kind) = kind {
                for value in entry.values.iter().filter(|value| !value.is_empty()) {
                    game.assets.add(kind, self.asset_url(value));
                }
            }
            return;
        }

        match entry.key.as_str() {
            "file" | "files" => {}
            "developer" | "developers" => extend_list(&mut game.developers, entry),
            "publisher" | "publishers" => extend_list(&mut game.publishers, entry),
            "genre" | "genres" => extend_list(&mut game.genres, entry),
            "tag" | "tags" => extend_list(&mut game.tags, entry),
            "players" => match self.patterns.players(first_line(entry)) {
                Some(players) => game.players = players,
                None => self.warn(entry.line, "failed to parse player count"),
            },
            "summary" => game.summary = replace_newlines(&merge_lines(&entry.values)),
            "description" => game.description = replace_newlines(&merge_lines(&entry.values)),
            "release" => match ReleaseDate::parse(first_line(entry)) {
                Some(date) => game.release = date,
                None => self.warn(
                    entry.line,
                    "incorrect date format, should be YYYY, YYYY-MM or YYYY-MM-DD",
                ),
            },
            "rating" => match self.patterns.rating(first_line(entry)) {
                Some(rating) => game.set_rating(rating),
                None => self.warn(entry.line, "failed to parse rating value"),
            },
            "launch" | "command" => game.launch_cmd = merge_lines(&entry.values),
            "workdir" | "cwd" => game.workdir = first_line(entry).to_string(),
            "sorttitle" | "sortname" | "sort_title" | "sort_name" | "sort-title" | "sort-name" => {
                game.sort_by = first_line(entry).to_string();
            }
            _ => self.warn(
                entry.line,
                &format!("unrecognized game property `{}`, ignored", entry.key),
            ),
        }
    }
}

fn first_line(entry: &Entry) -> &str {
    entry
        .values
        .iter()
        .find(|value| !value.is_empty())
        .map(String::as_str)
        .unwrap_or_default()
}

fn extend_list(list: &mut Vec<String>, entry: &Entry) {
    for item in split_list(&entry.values) {
        push_unique(list, &item);
    }
}

/// `\n` escapes become line breaks; `\\n` stays literal
fn replace_newlines(text: &str) -> String {
    text.replace("\\\\n", "\u{0}")
        .replace("\\n", "\n")
        .replace('\u{0}', "\\n")
}

/// Resolve listed relative paths against every filter directory
fn resolve_filelist(relpaths: &[String], dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in dirs {
        for relpath in relpaths {
            if let Some(path) = canonical_path(&dir.join(relpath)) {
                if !found.contains(&path) {
                    found.push(path);
                }
            }
        }
    }
    found
}

fn apply_filter(
    filter: &FileFilter,
    ctx: &mut SearchContext,
    cancel: &CancellationToken,
    touched: &mut HashSet<GameId>,
) {
    let mut accept = |path: &Path, ctx: &mut SearchContext| {
        let id = ctx.resolve_path(path);
        ctx.add_to_collection(id, &filter.tag);
        touched.insert(id);
    };

    let include_files = resolve_filelist(&filter.include.files, &filter.directories);
    let exclude_files = resolve_filelist(&filter.exclude.files, &filter.directories);
    for path in &include_files {
        if !exclude_files.contains(path) && path.is_file() {
            accept(path, ctx);
        }
    }

    for dir in &filter.directories {
        ctx.collection_mut(&filter.tag, "").add_source_dir(dir);
    }
    if !filter.needs_scan() {
        return;
    }

    let scanner = DirScanner::with_config(ScanConfig::default().skip_dir(MEDIA_DIR));
    for dir in &filter.directories {
        for file in scanner.files(dir, cancel) {
            let Some(path) = canonical_path(&file) else {
                continue;
            };
            if filter.passes(&path, &exclude_files) {
                accept(&path, ctx);
            }
        }
    }
}
