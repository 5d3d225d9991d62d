//! Sealing the scan result into the read-only library

use crate::assets::AssetTable;
use crate::context::SearchContext;
use crate::model::{GameFile, GameId, PendingCollection, PendingGame, ReleaseDate, locale_cmp};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A sealed game
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub id: GameId,
    pub files: Vec<GameFile>,
    pub title: String,
    pub sort_by: String,
    pub summary: String,
    pub description: String,
    pub release: ReleaseDate,
    pub rating: Option<f32>,
    pub players: u32,
    pub play_count: u32,
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
    /// Tags of the member collections
    pub collections: Vec<String>,
}

impl From<PendingGame> for Game {
    fn from(pending: PendingGame) -> Self {
        Self {
            id: pending.id,
            files: pending.files,
            title: pending.title,
            sort_by: pending.sort_by,
            summary: pending.summary,
            description: pending.description,
            release: pending.release,
            rating: pending.rating,
            players: pending.players,
            play_count: pending.play_count,
            play_time: pending.play_time,
            last_played: pending.last_played,
            favorite: pending.favorite,
            developers: pending.developers,
            publishers: pending.publishers,
            genres: pending.genres,
            tags: pending.tags,
            launch_cmd: pending.launch_cmd,
            workdir: pending.workdir,
            assets: pending.assets,
            collections: pending.collections,
        }
    }
}

impl Game {
    pub fn sort_key(&self) -> &str {
        if self.sort_by.is_empty() {
            &self.title
        } else {
            &self.sort_by
        }
    }

    /// Path of the first launch file
    pub fn path(&self) -> Option<&Path> {
        self.files.first().map(|file| file.path.as_path())
    }

    /// Fill the launch template for one of the game's files:
    /// `{file.path}`, `{file.name}`, `{file.basename}`, `{file.dir}`
    pub fn launch_command(&self, file: &GameFile) -> String {
        let dir = file
            .path
            .parent()
            .map(|dir| dir.to_string_lossy().to_string())
            .unwrap_or_default();

        self.launch_cmd
            .replace("{file.path}", &file.path.to_string_lossy())
            .replace("{file.name}", &file.name)
            .replace("{file.basename}", &file.basename())
            .replace("{file.dir}", &dir)
    }
}

/// A sealed collection holding its member games directly
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub tag: String,
    pub name: String,
    pub short_name: String,
    pub sort_by: String,
    pub launch_cmd: String,
    pub workdir: String,
    pub summary: String,
    pub description: String,
    pub assets: AssetTable,
    pub games: Vec<Arc<Game>>,
    pub source_dirs: Vec<PathBuf>,
}

impl Collection {
    pub fn sort_key(&self) -> &str {
        if self.sort_by.is_empty() {
            &self.name
        } else {
            &self.sort_by
        }
    }
}

/// Immutable scan result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Library {
    games: Vec<Arc<Game>>,
    collections: Vec<Arc<Collection>>,
    by_id: HashMap<GameId, usize>,
    by_tag: HashMap<String, usize>,
    by_path: HashMap<PathBuf, usize>,
}

impl Library {
    /// Every game, ordered by sort key
    pub fn games(&self) -> &[Arc<Game>] {
        &self.games
    }

    /// Every collection, ordered by sort key
    pub fn collections(&self) -> &[Arc<Collection>] {
        &self.collections
    }

    pub fn game(&self, index: usize) -> Option<&Arc<Game>> {
        self.games.get(index)
    }

    pub fn game_by_id(&self, id: GameId) -> Option<&Arc<Game>> {
        self.by_id.get(&id).and_then(|index| self.games.get(*index))
    }

    pub fn game_by_path(&self, canonical: &Path) -> Option<&Arc<Game>> {
        self.by_path
            .get(canonical)
            .and_then(|index| self.games.get(*index))
    }

    pub fn collection(&self, index: usize) -> Option<&Arc<Collection>> {
        self.collections.get(index)
    }

    pub fn collection_by_tag(&self, tag: &str) -> Option<&Arc<Collection>> {
        self.by_tag
            .get(&tag.to_lowercase())
            .and_then(|index| self.collections.get(*index))
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

/// Seal the accumulated context.
///
/// Games outside every collection and collections without games are dropped.
/// Games without a launch command inherit the one of their first collection
/// that has one.
pub fn finalize(context: SearchContext) -> Library {
    let (pending_games, pending_collections) = context.into_parts();

    let launch_by_tag: HashMap<&str, (&str, &str)> = pending_collections
        .iter()
        .filter(|collection| !collection.launch_cmd.is_empty())
        .map(|collection| {
            (
                collection.tag.as_str(),
                (collection.launch_cmd.as_str(), collection.workdir.as_str()),
            )
        })
        .collect();

    let mut sealed: HashMap<GameId, Arc<Game>> = HashMap::new();
    let mut dropped_games = 0;
    for mut pending in pending_games {
        if pending.collections.is_empty() {
            tracing::debug!("Dropping game {} ({}): no collection", pending.id, pending.title);
            dropped_games += 1;
            continue;
        }

        if pending.launch_cmd.is_empty() {
            let inherited = pending
                .collections
                .iter()
                .find_map(|tag| launch_by_tag.get(tag.as_str()));
            if let Some((cmd, workdir)) = inherited {
                pending.launch_cmd = cmd.to_string();
                if pending.workdir.is_empty() {
                    pending.workdir = workdir.to_string();
                }
            }
        }

        sealed.insert(pending.id, Arc::new(Game::from(pending)));
    }

    let mut collections = Vec::new();
    for pending in pending_collections {
        match seal_collection(pending, &sealed) {
            Some(collection) => collections.push(Arc::new(collection)),
            None => continue,
        }
    }
    collections.sort_by(|a, b| {
        locale_cmp(a.sort_key(), b.sort_key()).then_with(|| a.tag.cmp(&b.tag))
    });

    let mut games: Vec<Arc<Game>> = sealed.into_values().collect();
    games.sort_by(|a, b| compare_games(a, b));

    if dropped_games > 0 {
        tracing::info!("Dropped {} games without a collection", dropped_games);
    }

    let by_id = games
        .iter()
        .enumerate()
        .map(|(index, game)| (game.id, index))
        .collect();
    let by_path = games
        .iter()
        .enumerate()
        .flat_map(|(index, game)| game.files.iter().map(move |file| (file.path.clone(), index)))
        .collect();
    let by_tag = collections
        .iter()
        .enumerate()
        .map(|(index, collection)| (collection.tag.clone(), index))
        .collect();

    Library {
        games,
        collections,
        by_id,
        by_tag,
        by_path,
    }
}

fn seal_collection(
    pending: PendingCollection,
    games: &HashMap<GameId, Arc<Game>>,
) -> Option<Collection> {
    let mut members: Vec<Arc<Game>> = pending
        .members
        .iter()
        .filter_map(|id| games.get(id).cloned())
        .collect();

    if members.is_empty() {
        tracing::debug!("Dropping collection `{}`: no games", pending.tag);
        return None;
    }
    members.sort_by(|a, b| compare_games(a, b));

    Some(Collection {
        tag: pending.tag,
        name: pending.name,
        short_name: pending.short_name,
        sort_by: pending.sort_by,
        launch_cmd: pending.launch_cmd,
        workdir: pending.workdir,
        summary: pending.summary,
        description: pending.description,
        assets: pending.assets,
        games: members,
        source_dirs: pending.source_dirs,
    })
}

fn compare_games(a: &Game, b: &Game) -> std::cmp::Ordering {
    locale_cmp(a.sort_key(), b.sort_key()).then_with(|| a.id.cmp(&b.id))
}
