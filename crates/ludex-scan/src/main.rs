//! Ludex library scanner
//!
//! Runs every configured provider and enricher, then prints the resulting
//! collections and games. Ctrl-C stops the walk early; whatever was found
//! up to that point is still printed.

use anyhow::{Context, Result};
use clap::Parser;
use ludex_config::LudexConfig;
use ludex_library::{
    AssetType, Collection, FilterSet, Game, ScanOutcome, ScanPipeline, ScanReport, default_filters,
    load_filters,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ludex-scan", version, about = "Scan and print the game library")]
struct Args {
    /// Configuration file (defaults to the system and user config files)
    #[arg(short, long, env = "LUDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Only show games accepted by this filter
    #[arg(short, long)]
    filter: Option<String>,

    /// Print the library as JSON
    #[arg(long)]
    json: bool,

    /// List the available filters and exit
    #[arg(long)]
    list_filters: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LudexConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LudexConfig::load_default().context("Failed to load config")?,
    };

    let mut filters = FilterSet::new(match config.filters_file() {
        Some(path) => load_filters(&path),
        None => default_filters(),
    });
    if args.list_filters {
        print!("{}", filter_listing(&filters));
        return Ok(());
    }
    if let Some(name) = &args.filter {
        if !filters.select(name) {
            anyhow::bail!("Unknown filter `{}`", name);
        }
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing with what was found so far");
                cancel.cancel();
            }
        }
    });

    let pipeline = ScanPipeline::from_config(&config);
    info!(
        "Scanning with {} providers and {} enrichers",
        pipeline.providers().len(),
        pipeline.enrichers().len()
    );
    let outcome = pipeline.spawn(cancel).await.context("Library scan failed")?;

    if args.json {
        println!("{}", render_json(&outcome, &filters)?);
    } else {
        print_library(&outcome, &filters);
    }

    Ok(())
}

/// Setup logging to stderr
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn filter_listing(filters: &FilterSet) -> String {
    filters
        .filters()
        .iter()
        .map(|filter| format!("{} ({} rules)\n", filter.name, filter.rules.len()))
        .collect()
}

fn render_json(outcome: &ScanOutcome, filters: &FilterSet) -> Result<String> {
    let view = LibraryView::new(outcome, filters);
    serde_json::to_string_pretty(&view).context("Failed to serialize the library")
}

fn print_library(outcome: &ScanOutcome, filters: &FilterSet) {
    for collection in outcome.library.collections() {
        let games: Vec<&Game> = visible_games(collection, filters).collect();
        if games.is_empty() {
            continue;
        }

        println!("{} [{}] - {} games", collection.name, collection.tag, games.len());
        for game in games {
            let path = game
                .path()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            println!("  {:<40} {}", game.title, path);
        }
    }

    let report = &outcome.report;
    println!(
        "\n{} games, {} collections, {} metadata directories, {} ms",
        report.games, report.collections, report.metadata_dirs, report.duration_ms
    );
    if let Some(filter) = filters.current() {
        println!("Filter: {}", filter.name);
    }
}

fn visible_games<'a>(
    collection: &'a Collection,
    filters: &'a FilterSet,
) -> impl Iterator<Item = &'a Game> {
    collection
        .games
        .iter()
        .map(|game| game.as_ref())
        .filter(|game| filters.accepts(game))
}

#[derive(Serialize)]
struct LibraryView<'a> {
    report: &'a ScanReport,
    filter: Option<&'a str>,
    collections: Vec<CollectionView<'a>>,
}

#[derive(Serialize)]
struct CollectionView<'a> {
    tag: &'a str,
    name: &'a str,
    short_name: &'a str,
    games: Vec<GameView<'a>>,
}

#[derive(Serialize)]
struct GameView<'a> {
    title: &'a str,
    files: Vec<String>,
    launch: String,
    release: String,
    rating: Option<f32>,
    players: u32,
    favorite: bool,
    play_count: u32,
    developers: &'a [String],
    genres: &'a [String],
    assets: BTreeMap<&'static str, &'a [String]>,
}

impl<'a> LibraryView<'a> {
    fn new(outcome: &'a ScanOutcome, filters: &'a FilterSet) -> Self {
        let collections = outcome
            .library
            .collections()
            .iter()
            .map(|collection| CollectionView {
                tag: &collection.tag,
                name: &collection.name,
                short_name: &collection.short_name,
                games: visible_games(collection, filters).map(GameView::new).collect(),
            })
            .filter(|view| !view.games.is_empty())
            .collect();

        Self {
            report: &outcome.report,
            filter: filters.current().map(|filter| filter.name.as_str()),
            collections,
        }
    }
}

impl<'a> GameView<'a> {
    fn new(game: &'a Game) -> Self {
        let assets = AssetType::ALL
            .iter()
            .map(|kind| (kind.as_str(), game.assets.get_all(*kind)))
            .filter(|(_, urls)| !urls.is_empty())
            .collect();

        Self {
            title: &game.title,
            files: game
                .files
                .iter()
                .map(|file| file.path.display().to_string())
                .collect(),
            launch: game
                .files
                .first()
                .map(|file| game.launch_command(file))
                .unwrap_or_default(),
            release: game.release.to_string(),
            rating: game.rating,
            players: game.players,
            favorite: game.favorite,
            play_count: game.play_count,
            developers: &game.developers,
            genres: &game.genres,
            assets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ludex_library::{Provider, providers::PegasusProvider};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "ludex-scan",
            "--config",
            "/tmp/ludex.toml",
            "--filter",
            "Favorites",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/ludex.toml")));
        assert_eq!(args.filter.as_deref(), Some("Favorites"));
        assert!(args.json);
        assert!(!args.list_filters);

        let args = Args::try_parse_from(["ludex-scan", "-f", "Multiplayer", "--list-filters"]).unwrap();
        assert_eq!(args.filter.as_deref(), Some("Multiplayer"));
        assert!(args.list_filters);

        assert!(Args::try_parse_from(["ludex-scan", "--unknown"]).is_err());
        assert!(Args::try_parse_from(["ludex-scan", "--filter"]).is_err());
    }

    #[test]
    fn test_filter_listing() {
        let filters = FilterSet::new(default_filters());
        assert_eq!(
            filter_listing(&filters),
            "Favorites (1 rules)\nMultiplayer (1 rules)\n"
        );
        assert_eq!(filter_listing(&FilterSet::new(Vec::new())), "");
    }

    fn scan_arcade(temp_dir: &TempDir) -> ScanOutcome {
        let root = temp_dir.path().canonicalize().unwrap();
        fs::write(root.join("pacman.zip"), b"").unwrap();
        fs::write(root.join("galaga.zip"), b"").unwrap();
        fs::write(
            root.join("metadata.pegasus.txt"),
            "collection: Arcade\nextension: zip\n\ngame: Pac-Man\nfile: pacman.zip\nplayers: 2\n",
        )
        .unwrap();

        ScanPipeline::new(
            vec![Provider::Pegasus(PegasusProvider::with_game_dirs(vec![root]))],
            Vec::new(),
        )
        .run(&CancellationToken::new())
    }

    #[test]
    fn test_render_json() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = scan_arcade(&temp_dir);
        let filters = FilterSet::new(default_filters());

        let json: serde_json::Value =
            serde_json::from_str(&render_json(&outcome, &filters).unwrap()).unwrap();
        assert_eq!(json["filter"], serde_json::Value::Null);
        assert_eq!(json["report"]["games"], 2);
        assert_eq!(json["collections"][0]["tag"], "arcade");
        let titles: Vec<&str> = json["collections"][0]["games"]
            .as_array()
            .unwrap()
            .iter()
            .map(|game| game["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["galaga", "Pac-Man"]);
    }

    #[test]
    fn test_render_json_with_filter() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = scan_arcade(&temp_dir);
        let mut filters = FilterSet::new(default_filters());
        assert!(filters.select("Multiplayer"));

        let json: serde_json::Value =
            serde_json::from_str(&render_json(&outcome, &filters).unwrap()).unwrap();
        assert_eq!(json["filter"], "Multiplayer");
        let games = json["collections"][0]["games"].as_array().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0]["title"], "Pac-Man");
        assert_eq!(games[0]["players"], 2);
    }
}
