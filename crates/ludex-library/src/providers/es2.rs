//! EmulationStation: `es_systems.cfg` systems and `gamelist.xml` metadata

use super::Discovery;
use crate::LibraryError;
use crate::assets::AssetType;
use crate::context::SearchContext;
use crate::model::{PendingGame, ReleaseDate, push_unique};
use crate::scanner::{DirScanner, ScanConfig, canonical_path, to_asset_url};
use chrono::NaiveDateTime;
use ludex_config::{ProviderSettings, expand_home};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const MEDIA_DIR: &str = "media";
const GAMELIST_FILE: &str = "gamelist.xml";
const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const REQUIRED_SYSTEM_FIELDS: [&str; 4] = ["name", "path", "extension", "command"];

/// Child element texts of one `<system>` or `<game>` node, in document order
#[derive(Debug, Clone, Default, PartialEq)]
struct XmlRecord {
    fields: Vec<(String, String)>,
}

impl XmlRecord {
    fn push(&mut self, name: String, value: String) {
        self.fields.push((name, value));
    }

    /// First value of `key`
    fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Read the `record` children of the `root` element. A document without
/// that root is an error; a malformed document after the root keeps every
/// record closed before the fault.
fn read_records(
    xml: &str,
    source_name: &str,
    root: &str,
    record: &str,
) -> Result<Vec<XmlRecord>, LibraryError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut current: Option<XmlRecord> = None;
    let mut field: Option<String> = None;
    let mut text = String::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) if !seen_root => return Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    "ES2: {} is malformed at byte {}: {}; keeping the {} entries before it",
                    source_name,
                    reader.buffer_position(),
                    e,
                    records.len()
                );
                break;
            }
        };

        match event {
            Event::Start(e) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match depth {
                    1 => {
                        if name != root {
                            return Err(missing_root(source_name, root));
                        }
                        seen_root = true;
                    }
                    2 if name == record => current = Some(XmlRecord::default()),
                    3 if current.is_some() => {
                        field = Some(name);
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match depth {
                    0 => {
                        if name != root {
                            return Err(missing_root(source_name, root));
                        }
                        seen_root = true;
                    }
                    1 if name == record => records.push(XmlRecord::default()),
                    2 => {
                        if let Some(fields) = current.as_mut() {
                            fields.push(name, String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if depth == 3 && field.is_some() {
                    match t.unescape() {
                        Ok(value) => text.push_str(&value),
                        Err(e) => {
                            tracing::warn!(
                                "ES2: `<{}>` entry #{} in {}: {}, using the raw text",
                                record,
                                records.len() + 1,
                                source_name,
                                e
                            );
                            text.push_str(&String::from_utf8_lossy(&t));
                        }
                    }
                }
            }
            Event::CData(c) => {
                if depth == 3 && field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                match depth {
                    3 => {
                        if let (Some(name), Some(fields)) = (field.take(), current.as_mut()) {
                            fields.push(name, text.trim().to_string());
                        }
                    }
                    2 => {
                        if let Some(fields) = current.take() {
                            records.push(fields);
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => {
                if seen_root && depth > 0 {
                    tracing::warn!(
                        "ES2: {} ends before `</{}>`; keeping the {} entries before it",
                        source_name,
                        root,
                        records.len()
                    );
                }
                break;
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(missing_root(source_name, root));
    }
    Ok(records)
}

fn missing_root(source_name: &str, root: &str) -> LibraryError {
    LibraryError::parse(
        source_name,
        0,
        format!("does not have a `<{}>` root node", root),
    )
}

/// Translate EmulationStation command placeholders into launch templates
pub fn convert_command(command: &str) -> String {
    command
        .replace("\"%ROM%\"", "\"{file.path}\"")
        .replace("%ROM%", "\"{file.path}\"")
        .replace("%ROM_RAW%", "{file.path}")
        .replace("%BASENAME%", "{file.basename}")
}

/// `\` separators become `/`, a leading `~` becomes the home directory
fn normalize_system_path(raw: &str) -> PathBuf {
    expand_home(Path::new(&raw.replace('\\', "/")))
}

/// Lowercase, dot-prefixed, unique extensions
fn parse_extensions(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ext in raw.split_whitespace() {
        let mut ext = ext.to_lowercase();
        if !ext.starts_with('.') {
            ext.insert(0, '.');
        }
        if !out.contains(&ext) {
            out.push(ext);
        }
    }
    out
}

/// Systems list provider
#[derive(Debug, Clone, Default)]
pub struct Es2Provider {
    systems_file: Option<PathBuf>,
}

impl Es2Provider {
    /// `systems_file` overrides the default locations
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            systems_file: settings.path_option("systems_file"),
        }
    }

    pub fn with_systems_file(path: &Path) -> Self {
        Self {
            systems_file: Some(path.to_path_buf()),
        }
    }

    fn systems_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.systems_file {
            return path.is_file().then(|| path.clone());
        }

        let mut candidates = Vec::new();
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".emulationstation").join("es_systems.cfg"));
        }
        candidates.push(PathBuf::from("/etc/emulationstation/es_systems.cfg"));

        candidates.into_iter().find(|path| path.is_file())
    }

    pub fn find(
        &self,
        ctx: &mut SearchContext,
        cancel: &CancellationToken,
    ) -> Result<Discovery, LibraryError> {
        let mut discovery = Discovery::default();

        let Some(systems_path) = self.systems_file() else {
            tracing::warn!("ES2: system config file not found");
            return Ok(discovery);
        };
        tracing::info!("ES2: found {}", systems_path.display());

        let source_name = systems_path.to_string_lossy().to_string();
        let systems = match std::fs::read_to_string(&systems_path)
            .map_err(LibraryError::from)
            .and_then(|xml| read_records(&xml, &source_name, "systemList", "system"))
        {
            Ok(systems) => systems,
            Err(e) => {
                tracing::warn!("ES2: could not read {}: {}", source_name, e);
                return Ok(discovery);
            }
        };

        let scanner = DirScanner::with_config(ScanConfig::default().skip_dir(MEDIA_DIR));

        for (index, system) in systems.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let missing = REQUIRED_SYSTEM_FIELDS
                .iter()
                .find(|key| system.get(key).is_none_or(str::is_empty));
            if let Some(key) = missing {
                tracing::warn!(
                    "ES2: `<system>` entry #{} in {} has no `<{}>` parameter, skipped",
                    index + 1,
                    source_name,
                    key
                );
                continue;
            }

            let field = |key: &str| system.get(key).unwrap_or_default();
            let short_name = field("name");
            let display_name = match field("fullname") {
                "" => short_name,
                fullname => fullname,
            };
            let tag = short_name.to_lowercase();

            let collection = ctx.collection_mut(&tag, display_name);
            collection.short_name = short_name.to_string();
            collection.launch_cmd = convert_command(field("command"));

            let raw_root = normalize_system_path(field("path"));
            let Some(root) = canonical_path(&raw_root) else {
                tracing::warn!(
                    "ES2: directory {} of system `{}` not found",
                    raw_root.display(),
                    short_name
                );
                continue;
            };
            collection.add_source_dir(&root);
            discovery.add_metadata_dir(&root);

            let extensions = parse_extensions(field("extension"));
            for file in scanner.files(&root, cancel) {
                let name = file
                    .file_name()
                    .map(|name| name.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !extensions.iter().any(|ext| name.ends_with(ext.as_str())) {
                    continue;
                }
                let Some(path) = canonical_path(&file) else {
                    continue;
                };

                let id = ctx.resolve_path(&path);
                ctx.add_to_collection(id, &tag);
                discovery.game_count += 1;
            }
        }

        tracing::info!("ES2: found {} games", discovery.game_count);
        Ok(discovery)
    }
}

/// `gamelist.xml` metadata enricher
#[derive(Debug, Clone, Default)]
pub struct Es2GamelistEnricher {
    gamelists_dir: Option<PathBuf>,
}

impl Es2GamelistEnricher {
    /// `gamelists_dir` defaults to `~/.emulationstation/gamelists`
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let gamelists_dir = settings.path_option("gamelists_dir").or_else(|| {
            dirs::home_dir().map(|home| home.join(".emulationstation").join("gamelists"))
        });
        Self { gamelists_dir }
    }

    pub fn with_gamelists_dir(dir: &Path) -> Self {
        Self {
            gamelists_dir: Some(dir.to_path_buf()),
        }
    }

    pub fn fill(
        &self,
        ctx: &mut SearchContext,
        metadata_dirs: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<(), LibraryError> {
        // (gamelist file, directory its relative paths start from)
        let mut jobs: Vec<(PathBuf, PathBuf)> = metadata_dirs
            .iter()
            .map(|dir| (dir.join(GAMELIST_FILE), dir.clone()))
            .collect();

        if let Some(gamelists_dir) = &self.gamelists_dir {
            for collection in ctx.collections() {
                let Some(base) = collection
                    .source_dirs
                    .iter()
                    .find(|dir| metadata_dirs.contains(dir))
                else {
                    continue;
                };
                jobs.push((
                    gamelists_dir.join(&collection.tag).join(GAMELIST_FILE),
                    base.clone(),
                ));
            }
        }

        for (file, base) in jobs {
            if cancel.is_cancelled() {
                break;
            }
            if !file.is_file() {
                continue;
            }

            match apply_gamelist(ctx, &file, &base) {
                Ok(count) => tracing::info!("ES2: {} entries applied from {}", count, file.display()),
                Err(e) => tracing::warn!("ES2: {}", e),
            }
        }

        Ok(())
    }
}

/// `./` is relative to `base`, `~/` to the home directory
fn resolve_entry_path(raw: &str, base: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("./") {
        return base.join(rest);
    }
    let path = expand_home(Path::new(raw));
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}

fn apply_gamelist(ctx: &mut SearchContext, file: &Path, base: &Path) -> Result<usize, LibraryError> {
    let source_name = file.to_string_lossy().to_string();
    let xml = std::fs::read_to_string(file)?;
    let entries = read_records(&xml, &source_name, "gameList", "game")?;

    let mut applied = 0;
    for (index, entry) in entries.iter().enumerate() {
        let Some(raw_path) = entry.get("path").filter(|path| !path.is_empty()) else {
            tracing::warn!(
                "ES2: `<game>` entry #{} in {} has no `<path>` parameter",
                index + 1,
                source_name
            );
            continue;
        };

        let Some(path) = canonical_path(&resolve_entry_path(raw_path, base)) else {
            continue;
        };
        let Some(id) = ctx.game_by_path(&path) else {
            continue;
        };
        let Some(game) = ctx.game_mut(id) else {
            continue;
        };

        apply_entry(game, entry, base, &source_name, index + 1);
        applied += 1;
    }

    Ok(applied)
}

fn apply_entry(game: &mut PendingGame, entry: &XmlRecord, base: &Path, source_name: &str, number: usize) {
    for (key, value) in entry.iter() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key {
            "name" => game.set_title(value),
            "desc" => game.description = value.to_string(),
            "developer" => {
                push_unique(&mut game.developers, value);
            }
            "publisher" => {
                push_unique(&mut game.publishers, value);
            }
            "genre" => {
                push_unique(&mut game.genres, value);
            }
            "players" => match parse_players(value) {
                Some(players) => game.players = players,
                None => warn_field(source_name, number, key, value),
            },
            "rating" => match value.parse::<f32>() {
                Ok(rating) if rating.is_finite() => game.set_rating(rating),
                _ => warn_field(source_name, number, key, value),
            },
            "playcount" => match value.parse::<u32>() {
                Ok(count) => game.play_count = count,
                Err(_) => warn_field(source_name, number, key, value),
            },
            "lastplayed" => match NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
                Ok(time) => game.last_played = Some(time.and_utc()),
                Err(_) => warn_field(source_name, number, key, value),
            },
            "releasedate" => match NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
                Ok(time) => game.release = ReleaseDate::from_date(time.date()),
                Err(_) => warn_field(source_name, number, key, value),
            },
            "favorite" => {
                game.favorite = matches!(value.to_lowercase().as_str(), "yes" | "true" | "1");
            }
            "image" => add_asset(game, AssetType::BoxFront, value, base),
            "marquee" => add_asset(game, AssetType::Marquee, value, base),
            "video" => add_asset(game, AssetType::Videos, value, base),
            _ => {}
        }
    }
}

fn warn_field(source_name: &str, number: usize, key: &str, value: &str) {
    tracing::warn!(
        "ES2: `<game>` entry #{} in {}: invalid `<{}>` value `{}`, ignored",
        number,
        source_name,
        key,
        value
    );
}

/// `2` or a range like `1-4`; ranges give their maximum
fn parse_players(value: &str) -> Option<u32> {
    let mut max = None;
    for part in value.split('-') {
        let players: u32 = part.trim().parse().ok()?;
        max = Some(max.map_or(players, |m: u32| m.max(players)));
    }
    max
}

fn add_asset(game: &mut PendingGame, kind: AssetType, raw: &str, base: &Path) {
    let path = resolve_entry_path(raw, base);
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_default();
    if !kind.accepts_extension(&ext) {
        return;
    }
    if let Some(path) = canonical_path(&path) {
        game.assets.add(kind, to_asset_url(&path.to_string_lossy()));
    }
}
