//! Play statistics enricher

use crate::LibraryError;
use crate::context::SearchContext;
use crate::database::PlaytimeDb;
use ludex_config::{ProviderSettings, user_config_dir};
use std::path::{Path, PathBuf};

/// Reads play counts, play time and last-played times from the statistics
/// database
#[derive(Debug, Clone, Default)]
pub struct PlaytimeEnricher {
    stats_db: Option<PathBuf>,
}

impl PlaytimeEnricher {
    /// `stats_db` defaults to `<config_dir>/ludex/stats.db`
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let stats_db = settings
            .path_option("stats_db")
            .or_else(|| user_config_dir().map(|dir| dir.join("stats.db")));
        Self { stats_db }
    }

    pub fn with_database(path: &Path) -> Self {
        Self {
            stats_db: Some(path.to_path_buf()),
        }
    }

    pub fn fill(&self, ctx: &mut SearchContext) -> Result<(), LibraryError> {
        let Some(path) = &self.stats_db else {
            return Ok(());
        };
        if !path.is_file() {
            tracing::debug!("Playtime: no database at {}", path.display());
            return Ok(());
        }

        let db = PlaytimeDb::open_read_only(path)?;
        let stats = db.load_stats(
            ctx.games()
                .iter()
                .flat_map(|game| game.files.iter().map(|file| file.path.as_path())),
        )?;
        if stats.is_empty() {
            return Ok(());
        }

        let mut updated = 0;
        for game in ctx.games_mut() {
            let mut found = false;
            for file in &game.files {
                let Some(file_stats) = stats.get(&file.path) else {
                    continue;
                };
                found = true;
                game.play_count = game.play_count.saturating_add(file_stats.play_count);
                game.play_time = game.play_time.saturating_add(file_stats.play_time);
                if file_stats.last_played > game.last_played {
                    game.last_played = file_stats.last_played;
                }
            }
            if found {
                updated += 1;
            }
        }

        tracing::info!("Playtime: statistics for {} games", updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_fill_from_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("stats.db");
        let start = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        {
            let mut db = PlaytimeDb::open(&db_path).unwrap();
            db.record_play(Path::new("/games/mario.zip"), start, 60).unwrap();
            db.record_play(Path::new("/games/mario-disc2.zip"), start, 40).unwrap();
        }

        let mut ctx = SearchContext::new();
        let mario = ctx.resolve_path(Path::new("/games/mario.zip"));
        ctx.attach_file(mario, Path::new("/games/mario-disc2.zip"), "Disc 2");
        let sonic = ctx.resolve_path(Path::new("/games/sonic.zip"));

        PlaytimeEnricher::with_database(&db_path)
            .fill(&mut ctx)
            .unwrap();

        let game = ctx.game(mario).unwrap();
        assert_eq!(game.play_count, 2);
        assert_eq!(game.play_time, 100);
        assert_eq!(game.last_played, DateTime::<Utc>::from_timestamp(1_060, 0));
        assert_eq!(ctx.game(sonic).unwrap().play_count, 0);
    }

    #[test]
    fn test_missing_database() {
        let mut ctx = SearchContext::new();
        let enricher = PlaytimeEnricher::with_database(Path::new("/nonexistent/stats.db"));
        assert!(enricher.fill(&mut ctx).is_ok());
    }
}
