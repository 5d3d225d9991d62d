//! Search context: the single-owner accumulator threaded through providers
//! and enrichers

use crate::model::{GameFile, GameId, PendingCollection, PendingGame};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Identity → game, tag → collection, and the canonical path → identity index
#[derive(Debug, Default)]
pub struct SearchContext {
    games: Vec<PendingGame>,
    collections: BTreeMap<String, PendingCollection>,
    path_index: HashMap<PathBuf, GameId>,
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of a canonical path, allocating a new game on first sight
    pub fn resolve_path(&mut self, canonical: &Path) -> GameId {
        if let Some(id) = self.path_index.get(canonical) {
            return *id;
        }

        let id = GameId(self.games.len());
        self.games.push(PendingGame::new(id, canonical));
        self.path_index.insert(canonical.to_path_buf(), id);
        tracing::trace!("New game {} for {}", id, canonical.display());
        id
    }

    /// Bind an extra launch file to an existing game. A path bound to a
    /// different game keeps its binding.
    pub fn attach_file(&mut self, id: GameId, canonical: &Path, name: &str) -> bool {
        if let Some(owner) = self.path_index.get(canonical) {
            if *owner != id {
                tracing::warn!(
                    "{} already belongs to game {}, not attaching it to {}",
                    canonical.display(),
                    owner,
                    id
                );
                return false;
            }
            return true;
        }

        let Some(game) = self.games.get_mut(id.0) else {
            tracing::warn!("Cannot attach {} to unknown game {}", canonical.display(), id);
            return false;
        };

        game.files.push(GameFile::new(id, canonical, name));
        self.path_index.insert(canonical.to_path_buf(), id);
        true
    }

    /// Identity bound to a canonical path, if any
    pub fn game_by_path(&self, canonical: &Path) -> Option<GameId> {
        self.path_index.get(canonical).copied()
    }

    pub fn game(&self, id: GameId) -> Option<&PendingGame> {
        self.games.get(id.0)
    }

    pub fn game_mut(&mut self, id: GameId) -> Option<&mut PendingGame> {
        self.games.get_mut(id.0)
    }

    /// Games in identity order
    pub fn games(&self) -> &[PendingGame] {
        &self.games
    }

    pub fn games_mut(&mut self) -> impl Iterator<Item = &mut PendingGame> {
        self.games.iter_mut()
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    /// Get or create a collection by tag; the tag is lowercased
    pub fn collection_mut(&mut self, tag: &str, name: &str) -> &mut PendingCollection {
        let tag = normalize_tag(tag);
        let collection = self
            .collections
            .entry(tag.clone())
            .or_insert_with(|| PendingCollection::new(&tag, name.trim()));

        if collection.name.is_empty() {
            collection.name = name.trim().to_string();
        }
        collection
    }

    pub fn collection(&self, tag: &str) -> Option<&PendingCollection> {
        self.collections.get(&normalize_tag(tag))
    }

    /// Collections in tag order
    pub fn collections(&self) -> impl Iterator<Item = &PendingCollection> {
        self.collections.values()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Record membership in both directions; duplicates are ignored
    pub fn add_to_collection(&mut self, id: GameId, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        let Some(collection) = self.collections.get_mut(&tag) else {
            tracing::warn!("Cannot add game {} to unknown collection `{}`", id, tag);
            return false;
        };
        let Some(game) = self.games.get_mut(id.0) else {
            tracing::warn!("Cannot add unknown game {} to collection `{}`", id, tag);
            return false;
        };

        if collection.members.contains(&id) {
            return false;
        }
        collection.members.push(id);
        if !game.collections.contains(&tag) {
            game.collections.push(tag);
        }
        true
    }

    /// Media join keys: `<canonical dir>/<basename>` of every game file
    pub fn short_paths(&self) -> HashMap<String, GameId> {
        let mut out = HashMap::new();
        for game in &self.games {
            for file in &game.files {
                out.entry(file.short_path()).or_insert(game.id);
            }
        }
        out
    }

    /// Hand the accumulated records to the finalizer
    pub fn into_parts(self) -> (Vec<PendingGame>, Vec<PendingCollection>) {
        (self.games, self.collections.into_values().collect())
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path_is_stable() {
        let mut ctx = SearchContext::new();
        let a = ctx.resolve_path(Path::new("/games/mario.zip"));
        let b = ctx.resolve_path(Path::new("/games/sonic.zip"));
        let again = ctx.resolve_path(Path::new("/games/mario.zip"));

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(ctx.game_count(), 2);
        assert_eq!(ctx.game(a).unwrap().title, "mario");
    }

    #[test]
    fn test_attach_file_conflict() {
        let mut ctx = SearchContext::new();
        let disc1 = ctx.resolve_path(Path::new("/games/ff7/disc1.chd"));
        let other = ctx.resolve_path(Path::new("/games/other.chd"));

        assert!(ctx.attach_file(disc1, Path::new("/games/ff7/disc2.chd"), "Disc 2"));
        assert_eq!(ctx.game(disc1).unwrap().files.len(), 2);
        assert_eq!(ctx.game_by_path(Path::new("/games/ff7/disc2.chd")), Some(disc1));

        // already bound elsewhere
        assert!(!ctx.attach_file(disc1, Path::new("/games/other.chd"), "Other"));
        assert_eq!(ctx.game_by_path(Path::new("/games/other.chd")), Some(other));
        assert_eq!(ctx.game(disc1).unwrap().files.len(), 2);
    }

    #[test]
    fn test_collection_membership_both_directions() {
        let mut ctx = SearchContext::new();
        let id = ctx.resolve_path(Path::new("/games/mario.zip"));
        ctx.collection_mut("NES", "Nintendo Entertainment System");
        ctx.collection_mut("steam", "Steam");

        assert!(ctx.add_to_collection(id, "nes"));
        assert!(!ctx.add_to_collection(id, "NES"));
        assert!(ctx.add_to_collection(id, "steam"));
        assert!(!ctx.add_to_collection(id, "missing"));

        assert_eq!(ctx.collection("nes").unwrap().members, vec![id]);
        assert_eq!(ctx.game(id).unwrap().collections, vec!["nes", "steam"]);
    }

    #[test]
    fn test_collection_mut_keeps_first_name() {
        let mut ctx = SearchContext::new();
        ctx.collection_mut("snes", "Super Nintendo");
        ctx.collection_mut("snes", "SNES");
        assert_eq!(ctx.collection("snes").unwrap().name, "Super Nintendo");
        assert_eq!(ctx.collection_count(), 1);
    }

    #[test]
    fn test_short_paths() {
        let mut ctx = SearchContext::new();
        let id = ctx.resolve_path(Path::new("/games/nes/mario.zip"));
        let index = ctx.short_paths();
        assert_eq!(index.get("/games/nes/mario"), Some(&id));
    }
}
