//! Steam: installation manifests and the offline store cache

use super::Discovery;
use crate::LibraryError;
use crate::assets::AssetType;
use crate::context::SearchContext;
use crate::model::{ReleaseDate, push_unique};
use crate::scanner::{DirScanner, ScanConfig, canonical_path};
use chrono::NaiveDate;
use ludex_config::ProviderSettings;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub const STEAM_TAG: &str = "steam";
const STEAM_NAME: &str = "Steam";
const FLATPAK_PKG: &str = "com.valvesoftware.Steam";

/// `appid` and `name` of an `appmanifest_*.acf` file
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub appid: String,
    pub name: String,
}

/// Line patterns of Valve's text formats
pub struct ManifestReader {
    file_name: Regex,
    appid: Regex,
    name: Regex,
    base_install: Regex,
    library_path: Regex,
}

impl ManifestReader {
    pub fn new() -> Result<Self, LibraryError> {
        Ok(Self {
            file_name: Regex::new(r"^appmanifest_\d+\.acf$")?,
            appid: RegexBuilder::new(r#""appid"\s+"(\d+)""#)
                .case_insensitive(true)
                .build()?,
            name: Regex::new(r#""name"\s+"([^"]+)""#)?,
            base_install: Regex::new(r#""BaseInstallFolder_\d+"\s+"([^"]+)""#)?,
            library_path: Regex::new(r#""path"\s+"([^"]+)""#)?,
        })
    }

    pub fn is_manifest(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.file_name.is_match(&name.to_string_lossy()))
            .unwrap_or(false)
    }

    /// Read `appid` and `name`; `None` when either is missing
    pub fn read(&self, path: &Path) -> Result<Option<Manifest>, LibraryError> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.parse(&text))
    }

    pub fn parse(&self, text: &str) -> Option<Manifest> {
        let mut appid = None;
        let mut name = None;

        for line in text.lines() {
            if appid.is_none() {
                if let Some(caps) = self.appid.captures(line) {
                    appid = caps.get(1).map(|m| m.as_str().to_string());
                    continue;
                }
            }
            if name.is_none() {
                if let Some(caps) = self.name.captures(line) {
                    name = caps.get(1).map(|m| m.as_str().to_string());
                }
            }
            if appid.is_some() && name.is_some() {
                break;
            }
        }

        Some(Manifest {
            appid: appid?,
            name: name?,
        })
    }

    /// Library folders listed in `config/config.vdf` and `steamapps/libraryfolders.vdf`
    fn extra_libraries(&self, steam_dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();

        let sources = [
            (steam_dir.join("config").join("config.vdf"), &self.base_install),
            (
                steam_dir.join("steamapps").join("libraryfolders.vdf"),
                &self.library_path,
            ),
        ];
        for (file, pattern) in sources {
            let text = match std::fs::read_to_string(&file) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!("Steam: could not read {}: {}", file.display(), e);
                    continue;
                }
            };
            for caps in text.lines().filter_map(|line| pattern.captures(line)) {
                if let Some(dir) = caps.get(1) {
                    out.push(PathBuf::from(dir.as_str().replace("\\\\", "/")).join("steamapps"));
                }
            }
        }

        out
    }
}

/// Candidate Steam data directories, first existing wins
fn steam_data_candidates() -> Vec<(PathBuf, bool)> {
    let mut out = Vec::new();
    if let Some(data) = dirs::data_dir() {
        out.push((data.join("Steam"), false));
    }
    if let Some(home) = dirs::home_dir() {
        out.push((home.join(".steam").join("steam"), false));
        out.push((
            home.join(".var/app").join(FLATPAK_PKG).join("data/Steam"),
            true,
        ));
    }
    out
}

/// Installation manifest provider
#[derive(Debug, Clone, Default)]
pub struct SteamProvider {
    install_dirs: Vec<PathBuf>,
    launcher: String,
}

impl SteamProvider {
    /// `installdir` overrides detection of the Steam data directory
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let install_dirs = settings.path_list_option("installdir");
        if !install_dirs.is_empty() {
            return Self::with_install_dirs(install_dirs);
        }

        for (data_dir, flatpak) in steam_data_candidates() {
            if data_dir.is_dir() {
                tracing::info!("Steam: found data directory {}", data_dir.display());
                return Self::with_data_dir(&data_dir, flatpak);
            }
        }

        tracing::info!("Steam: no installation found");
        Self::default()
    }

    pub fn with_install_dirs(install_dirs: Vec<PathBuf>) -> Self {
        Self {
            install_dirs,
            launcher: "steam".to_string(),
        }
    }

    /// `<data>/steamapps` plus the extra library folders it lists
    pub fn with_data_dir(data_dir: &Path, flatpak: bool) -> Self {
        let mut install_dirs = vec![data_dir.join("steamapps")];
        match ManifestReader::new() {
            Ok(reader) => {
                for dir in reader.extra_libraries(data_dir) {
                    if dir.is_dir() && !install_dirs.contains(&dir) {
                        install_dirs.push(dir);
                    }
                }
            }
            Err(e) => tracing::warn!("Steam: {}", e),
        }

        let launcher = if flatpak {
            format!("flatpak run {}", FLATPAK_PKG)
        } else {
            "steam".to_string()
        };

        Self {
            install_dirs,
            launcher,
        }
    }

    pub fn install_dirs(&self) -> &[PathBuf] {
        &self.install_dirs
    }

    pub fn find(
        &self,
        ctx: &mut SearchContext,
        cancel: &CancellationToken,
    ) -> Result<Discovery, LibraryError> {
        let mut discovery = Discovery::default();
        if self.install_dirs.is_empty() {
            return Ok(discovery);
        }

        let reader = ManifestReader::new()?;
        let scanner = DirScanner::with_config(ScanConfig::flat());

        for dir in &self.install_dirs {
            let Some(dir) = canonical_path(dir) else {
                tracing::warn!("Steam: install directory {} not found", dir.display());
                continue;
            };
            discovery.add_metadata_dir(&dir);

            for file in scanner.files(&dir, cancel) {
                if !reader.is_manifest(&file) {
                    continue;
                }
                let Some(path) = canonical_path(&file) else {
                    continue;
                };

                let manifest = match reader.read(&path) {
                    Ok(Some(manifest)) => manifest,
                    Ok(None) => {
                        tracing::warn!("Steam: {} has no appid or name", path.display());
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Steam: could not read {}: {}", path.display(), e);
                        continue;
                    }
                };

                let id = ctx.resolve_path(&path);
                let collection = ctx.collection_mut(STEAM_TAG, STEAM_NAME);
                collection.short_name = STEAM_TAG.to_string();
                collection.add_source_dir(&dir);
                ctx.add_to_collection(id, STEAM_TAG);

                if let Some(game) = ctx.game_mut(id) {
                    game.set_title(&manifest.name);
                    game.launch_cmd =
                        format!("{} steam://rungameid/{}", self.launcher, manifest.appid);
                }
                discovery.game_count += 1;
            }
        }

        tracing::info!("Steam: found {} games", discovery.game_count);
        Ok(discovery)
    }
}

#[derive(Debug, Deserialize)]
struct StoreEntry {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<StoreData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoreData {
    name: String,
    short_description: String,
    about_the_game: String,
    release_date: Option<StoreReleaseDate>,
    header_image: String,
    developers: Vec<String>,
    publishers: Vec<String>,
    metacritic: Option<Metacritic>,
    genres: Vec<Genre>,
    background: String,
    screenshots: Vec<Screenshot>,
    movies: Vec<Movie>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoreReleaseDate {
    date: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Metacritic {
    score: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Genre {
    description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Screenshot {
    path_thumbnail: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Movie {
    webm: HashMap<String, String>,
}

/// Applies cached store records (`<cache_dir>/<appid>.json`) to Steam games
#[derive(Debug, Clone)]
pub struct SteamStoreEnricher {
    cache_dir: Option<PathBuf>,
}

impl SteamStoreEnricher {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let cache_dir = settings
            .path_option("cache_dir")
            .or_else(|| ludex_config::user_cache_dir().map(|dir| dir.join("steam")));
        Self { cache_dir }
    }

    pub fn with_cache_dir(cache_dir: &Path) -> Self {
        Self {
            cache_dir: Some(cache_dir.to_path_buf()),
        }
    }

    pub fn fill(&self, ctx: &mut SearchContext, cancel: &CancellationToken) -> Result<(), LibraryError> {
        let Some(cache_dir) = &self.cache_dir else {
            return Ok(());
        };
        if !cache_dir.is_dir() {
            tracing::debug!("Steam: no store cache at {}", cache_dir.display());
            return Ok(());
        }
        let Some(collection) = ctx.collection(STEAM_TAG) else {
            return Ok(());
        };

        let reader = ManifestReader::new()?;
        let members = collection.members.clone();
        let mut filled = 0;

        for id in members {
            if cancel.is_cancelled() {
                break;
            }
            let Some(manifest_path) = ctx
                .game(id)
                .and_then(|game| game.files.first())
                .map(|file| file.path.clone())
            else {
                continue;
            };
            let Ok(Some(manifest)) = reader.read(&manifest_path) else {
                continue;
            };

            let json_path = cache_dir.join(format!("{}.json", manifest.appid));
            if !json_path.is_file() {
                continue;
            }

            let data = match read_store_record(&json_path) {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::warn!("Steam: {} holds no usable record", json_path.display());
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Steam: could not read {}: {}", json_path.display(), e);
                    continue;
                }
            };

            if let Some(game) = ctx.game_mut(id) {
                apply_store_record(game, data);
                filled += 1;
            }
        }

        tracing::info!("Steam: applied {} cached store records", filled);
        Ok(())
    }
}

fn read_store_record(path: &Path) -> Result<Option<StoreData>, LibraryError> {
    let bytes = std::fs::read(path)?;
    let root: HashMap<String, StoreEntry> = serde_json::from_slice(&bytes)?;

    Ok(root
        .into_values()
        .next()
        .filter(|entry| entry.success)
        .and_then(|entry| entry.data))
}

fn apply_store_record(game: &mut crate::model::PendingGame, data: StoreData) {
    game.set_title(&data.name);
    if !data.short_description.is_empty() {
        game.summary = data.short_description;
    }
    if !data.about_the_game.is_empty() {
        game.description = data.about_the_game;
    }

    if let Some(release) = data.release_date {
        match NaiveDate::parse_from_str(release.date.trim(), "%d %b, %Y") {
            Ok(date) => game.release = ReleaseDate::from_date(date),
            Err(e) => tracing::debug!("Steam: unparsable release date `{}`: {}", release.date, e),
        }
    }

    for kind in [AssetType::Logo, AssetType::SteamGrid, AssetType::BoxFront] {
        game.assets.add(kind, data.header_image.as_str());
    }
    game.assets.add(AssetType::Background, data.background);

    for developer in &data.developers {
        push_unique(&mut game.developers, developer);
    }
    for publisher in &data.publishers {
        push_unique(&mut game.publishers, publisher);
    }
    for genre in &data.genres {
        push_unique(&mut game.genres, &genre.description);
    }

    if let Some(metacritic) = data.metacritic {
        if (0.0..=100.0).contains(&metacritic.score) {
            game.set_rating((metacritic.score / 100.0) as f32);
        }
    }

    for screenshot in data.screenshots {
        game.assets.add(AssetType::Screenshots, screenshot.path_thumbnail);
    }
    for mut movie in data.movies {
        if let Some(url) = movie.webm.remove("480") {
            game.assets.add(AssetType::Videos, url);
        }
    }
}
