//! Source providers and metadata enrichers
//!
//! Providers discover games and collections and report the directories that
//! may hold metadata; enrichers then fill in descriptive fields for games
//! that already exist. Both run one at a time against the same
//! [`SearchContext`].

pub mod es2;
pub mod favorites;
pub mod media;
pub mod pegasus;
pub mod playtime;
pub mod steam;

use crate::LibraryError;
use crate::context::SearchContext;
use ludex_config::LudexConfig;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub use es2::{Es2GamelistEnricher, Es2Provider};
pub use favorites::FavoritesEnricher;
pub use media::MediaEnricher;
pub use pegasus::PegasusProvider;
pub use playtime::PlaytimeEnricher;
pub use steam::{SteamProvider, SteamStoreEnricher};

/// What a provider found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub game_count: usize,
    /// Directories enrichers should look at, even when no games were found
    pub metadata_dirs: Vec<PathBuf>,
}

impl Discovery {
    pub fn add_metadata_dir(&mut self, dir: &Path) {
        if !self.metadata_dirs.iter().any(|known| known == dir) {
            self.metadata_dirs.push(dir.to_path_buf());
        }
    }
}

/// A game source
#[derive(Debug, Clone)]
pub enum Provider {
    Pegasus(PegasusProvider),
    Es2(Es2Provider),
    Steam(SteamProvider),
}

impl Provider {
    /// Configuration names, in default run order
    pub const NAMES: [&'static str; 3] = ["pegasus", "es2", "steam"];

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Pegasus(_) => "pegasus",
            Provider::Es2(_) => "es2",
            Provider::Steam(_) => "steam",
        }
    }

    /// Run the provider. Unreadable or malformed sources are logged by the
    /// provider itself, which still reports every directory it added games
    /// from. An error here comes from setup, before the context was touched,
    /// and yields an empty discovery.
    pub fn find(&self, ctx: &mut SearchContext, cancel: &CancellationToken) -> Discovery {
        let result = match self {
            Provider::Pegasus(provider) => provider.find(ctx, cancel),
            Provider::Es2(provider) => provider.find(ctx, cancel),
            Provider::Steam(provider) => provider.find(ctx, cancel),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!("Provider `{}` failed: {}", self.name(), e);
            Discovery::default()
        })
    }

    /// Build a provider by configuration name
    pub fn from_name(name: &str, config: &LudexConfig) -> Option<Self> {
        let settings = config.provider(name);
        let provider = match name {
            "pegasus" => Provider::Pegasus(PegasusProvider::from_settings(
                &settings,
                config.game_dirs(),
            )),
            "es2" => Provider::Es2(Es2Provider::from_settings(&settings)),
            "steam" => Provider::Steam(SteamProvider::from_settings(&settings)),
            _ => return None,
        };
        Some(provider)
    }

    /// Every enabled provider
    pub fn from_config(config: &LudexConfig) -> Vec<Self> {
        Self::NAMES
            .iter()
            .filter(|name| config.is_enabled(name))
            .filter_map(|name| Self::from_name(name, config))
            .collect()
    }
}

/// A metadata source for games that already exist
#[derive(Debug, Clone)]
pub enum Enricher {
    Media(MediaEnricher),
    Es2Gamelist(Es2GamelistEnricher),
    SteamStore(SteamStoreEnricher),
    Favorites(FavoritesEnricher),
    Playtime(PlaytimeEnricher),
}

impl Enricher {
    /// Configuration names, in default run order
    pub const NAMES: [&'static str; 5] = ["media", "es2_gamelist", "steam_store", "favorites", "playtime"];

    pub fn name(&self) -> &'static str {
        match self {
            Enricher::Media(_) => "media",
            Enricher::Es2Gamelist(_) => "es2_gamelist",
            Enricher::SteamStore(_) => "steam_store",
            Enricher::Favorites(_) => "favorites",
            Enricher::Playtime(_) => "playtime",
        }
    }

    /// Run the enricher. Failures are logged.
    pub fn fill(&self, ctx: &mut SearchContext, metadata_dirs: &[PathBuf], cancel: &CancellationToken) {
        let result: Result<(), LibraryError> = match self {
            Enricher::Media(enricher) => {
                enricher.fill(ctx, metadata_dirs, cancel);
                Ok(())
            }
            Enricher::Es2Gamelist(enricher) => enricher.fill(ctx, metadata_dirs, cancel),
            Enricher::SteamStore(enricher) => enricher.fill(ctx, cancel),
            Enricher::Favorites(enricher) => enricher.fill(ctx),
            Enricher::Playtime(enricher) => enricher.fill(ctx),
        };

        if let Err(e) = result {
            tracing::warn!("Enricher `{}` failed: {}", self.name(), e);
        }
    }

    /// Build an enricher by configuration name
    pub fn from_name(name: &str, config: &LudexConfig) -> Option<Self> {
        let settings = config.provider(name);
        let enricher = match name {
            "media" => Enricher::Media(MediaEnricher::new()),
            "es2_gamelist" => Enricher::Es2Gamelist(Es2GamelistEnricher::from_settings(&settings)),
            "steam_store" => Enricher::SteamStore(SteamStoreEnricher::from_settings(&settings)),
            "favorites" => Enricher::Favorites(FavoritesEnricher::from_settings(&settings)),
            "playtime" => Enricher::Playtime(PlaytimeEnricher::from_settings(&settings)),
            _ => return None,
        };
        Some(enricher)
    }

    /// Every enabled enricher
    pub fn from_config(config: &LudexConfig) -> Vec<Self> {
        Self::NAMES
            .iter()
            .filter(|name| config.is_enabled(name))
            .filter_map(|name| Self::from_name(name, config))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ludex_config::ProviderSettings;

    #[test]
    fn test_discovery_dedups_dirs() {
        let mut discovery = Discovery::default();
        discovery.add_metadata_dir(Path::new("/games/nes"));
        discovery.add_metadata_dir(Path::new("/games/snes"));
        discovery.add_metadata_dir(Path::new("/games/nes"));
        assert_eq!(discovery.metadata_dirs.len(), 2);
    }

    #[test]
    fn test_from_config_respects_enabled() {
        let mut config = LudexConfig::default();
        config.providers.insert(
            "steam".to_string(),
            ProviderSettings {
                enabled: false,
                ..Default::default()
            },
        );
        config.providers.insert(
            "favorites".to_string(),
            ProviderSettings {
                enabled: false,
                ..Default::default()
            },
        );

        let providers: Vec<&str> = Provider::from_config(&config)
            .iter()
            .map(Provider::name)
            .collect();
        assert_eq!(providers, vec!["pegasus", "es2"]);

        let enrichers: Vec<&str> = Enricher::from_config(&config)
            .iter()
            .map(Enricher::name)
            .collect();
        assert_eq!(enrichers, vec!["media", "es2_gamelist", "steam_store", "playtime"]);
    }

    #[test]
    fn test_unknown_name() {
        let config = LudexConfig::default();
        assert!(Provider::from_name("gog", &config).is_none());
        assert!(Enricher::from_name("scraper", &config).is_none());
    }
}
