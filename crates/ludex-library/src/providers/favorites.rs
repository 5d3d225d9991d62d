//! Favorites list enricher

use crate::LibraryError;
use crate::context::SearchContext;
use crate::scanner::canonical_path;
use ludex_config::{ProviderSettings, expand_home, user_config_dir};
use std::path::{Path, PathBuf};

/// Marks the games listed in a plain text file (one path per line) as
/// favorites
#[derive(Debug, Clone, Default)]
pub struct FavoritesEnricher {
    favorites_file: Option<PathBuf>,
}

impl FavoritesEnricher {
    /// `favorites_file` defaults to `<config_dir>/ludex/favorites.txt`
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let favorites_file = settings
            .path_option("favorites_file")
            .or_else(|| user_config_dir().map(|dir| dir.join("favorites.txt")));
        Self { favorites_file }
    }

    pub fn with_file(path: &Path) -> Self {
        Self {
            favorites_file: Some(path.to_path_buf()),
        }
    }

    pub fn fill(&self, ctx: &mut SearchContext) -> Result<(), LibraryError> {
        let Some(path) = &self.favorites_file else {
            return Ok(());
        };
        if !path.is_file() {
            tracing::debug!("Favorites: no file at {}", path.display());
            return Ok(());
        }

        let text = std::fs::read_to_string(path)?;
        let mut marked = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(canonical) = canonical_path(&expand_home(Path::new(line))) else {
                continue;
            };
            let Some(id) = ctx.game_by_path(&canonical) else {
                continue;
            };
            if let Some(game) = ctx.game_mut(id) {
                game.favorite = true;
                marked += 1;
            }
        }

        tracing::info!("Favorites: marked {} games", marked);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_marks_listed_games() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().canonicalize().unwrap();
        fs::write(dir.join("mario.zip"), b"").unwrap();
        fs::write(dir.join("sonic.zip"), b"").unwrap();

        let mut ctx = SearchContext::new();
        let mario = ctx.resolve_path(&dir.join("mario.zip"));
        let sonic = ctx.resolve_path(&dir.join("sonic.zip"));

        let list = dir.join("favorites.txt");
        fs::write(
            &list,
            format!(
                "# favorites\n{}\n\n{}\n",
                dir.join("mario.zip").display(),
                dir.join("missing.zip").display()
            ),
        )
        .unwrap();

        FavoritesEnricher::with_file(&list).fill(&mut ctx).unwrap();
        assert!(ctx.game(mario).unwrap().favorite);
        assert!(!ctx.game(sonic).unwrap().favorite);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let mut ctx = SearchContext::new();
        let enricher = FavoritesEnricher::with_file(Path::new("/nonexistent/favorites.txt"));
        assert!(enricher.fill(&mut ctx).is_ok());
    }
}
