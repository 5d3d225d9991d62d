//! Integration tests for the full scan pipeline

use chrono::{DateTime, Utc};
use ludex_config::{LudexConfig, ProviderSettings};
use ludex_library::providers::{
    Es2GamelistEnricher, Es2Provider, FavoritesEnricher, MediaEnricher, PegasusProvider,
    PlaytimeEnricher, SteamProvider,
};
use ludex_library::{
    AssetType, Enricher, FilterSet, Library, PlaytimeDb, Provider, ScanPipeline, default_filters,
    parse_filters,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A game tree shared by an ES2 system and a native metadata file
struct LibraryTestEnvironment {
    #[allow(dead_code)]
    temp_dir: TempDir,
    root: PathBuf,
    games_dir: PathBuf,
}

impl LibraryTestEnvironment {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp directory");
        let games_dir = root.join("games");
        fs::create_dir_all(&games_dir).expect("Failed to create games directory");

        Self {
            temp_dir,
            root,
            games_dir,
        }
    }

    fn touch(&self, relative: &str) -> PathBuf {
        let path = self.games_dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create directory");
        fs::write(&path, b"").expect("Failed to write file");
        path
    }

    fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create directory");
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    fn write_systems(&self) -> PathBuf {
        self.write(
            "es/es_systems.cfg",
            &format!(
                r#"<?xml version="1.0"?>
<systemList>
  <system>
    <name>nes</name>
    <fullname>Nintendo Entertainment System</fullname>
    <path>{}</path>
    <extension>.zip</extension>
    <command>fceux %ROM%</command>
  </system>
</systemList>
"#,
                self.games_dir.display()
            ),
        )
    }

    fn write_metafile(&self) {
        fs::write(
            self.games_dir.join("metadata.pegasus.txt"),
            "collection: Platformers\n\
             files: mario.zip\n\
             \n\
             game: Super Mario Bros.\n\
             file: mario.zip\n\
             genre: Platform\n\
             players: 1-2\n",
        )
        .expect("Failed to write metadata file");
    }

    fn pipeline(&self, extra: Vec<Enricher>) -> ScanPipeline {
        let mut enrichers = vec![
            Enricher::Media(MediaEnricher::new()),
            Enricher::Es2Gamelist(Es2GamelistEnricher::with_gamelists_dir(
                &self.root.join("es/gamelists"),
            )),
        ];
        enrichers.extend(extra);

        ScanPipeline::new(
            vec![
                Provider::Pegasus(PegasusProvider::with_game_dirs(vec![self.games_dir.clone()])),
                Provider::Es2(Es2Provider::with_systems_file(&self.root.join("es/es_systems.cfg"))),
            ],
            enrichers,
        )
    }

    fn scan(&self, extra: Vec<Enricher>) -> Library {
        self.pipeline(extra).run(&CancellationToken::new()).library
    }
}

fn standard_environment() -> LibraryTestEnvironment {
    let env = LibraryTestEnvironment::new();
    env.touch("mario.zip");
    env.touch("sonic.zip");
    env.touch("tetris.zip");
    env.touch("media/mario-boxFront.png");
    env.touch("media/mario-boxFront.jpg");
    env.touch("media/sonic.webm");
    env.write_systems();
    env.write_metafile();
    env
}

#[test]
fn test_same_file_from_two_providers() {
    let env = standard_environment();
    let library = env.scan(Vec::new());

    let mario_path = env.games_dir.join("mario.zip");
    let mario = library.game_by_path(&mario_path).expect("mario is missing");
    assert_eq!(mario.title, "Super Mario Bros.");
    assert_eq!(mario.collections, vec!["platformers", "nes"]);

    let nes = library.collection_by_tag("nes").unwrap();
    let platformers = library.collection_by_tag("platformers").unwrap();
    assert_eq!(nes.games.len(), 3);
    assert_eq!(platformers.games.len(), 1);
    assert_eq!(platformers.games[0].id, mario.id);
    assert_eq!(library.game_count(), 3);
}

#[test]
fn test_steam_manifest_listed_by_system() {
    let env = LibraryTestEnvironment::new();
    let steamapps = env.root.join("steamapps");
    fs::create_dir_all(&steamapps).expect("Failed to create steamapps directory");
    let manifest = steamapps.join("appmanifest_620.acf");
    fs::write(
        &manifest,
        "\"AppState\"\n{\n\t\"appid\"\t\t\"620\"\n\t\"name\"\t\t\"Portal 2\"\n}\n",
    )
    .expect("Failed to write manifest");
    let systems = env.write(
        "es/es_systems.cfg",
        &format!(
            r#"<systemList>
  <system>
    <name>Valve</name>
    <path>{}</path>
    <extension>.acf</extension>
    <command>steam-link %ROM%</command>
  </system>
</systemList>"#,
            steamapps.display()
        ),
    );

    let pipeline = ScanPipeline::new(
        vec![
            Provider::Es2(Es2Provider::with_systems_file(&systems)),
            Provider::Steam(SteamProvider::with_install_dirs(vec![steamapps.clone()])),
        ],
        Vec::new(),
    );
    let outcome = pipeline.run(&CancellationToken::new());
    let library = outcome.library;

    assert_eq!(
        outcome.report.provider_counts,
        vec![("es2".to_string(), 1), ("steam".to_string(), 1)]
    );
    assert_eq!(library.game_count(), 1);

    let portal = library.game_by_path(&manifest).expect("manifest game is missing");
    assert_eq!(portal.title, "Portal 2");
    assert_eq!(portal.collections, vec!["valve", "steam"]);
    assert_eq!(portal.launch_command(&portal.files[0]), "steam steam://rungameid/620");

    for tag in ["valve", "steam"] {
        let collection = library.collection_by_tag(tag).unwrap();
        assert_eq!(collection.games.len(), 1);
        assert_eq!(collection.games[0].id, portal.id);
    }
}

#[test]
fn test_rescan_is_idempotent() {
    let env = standard_environment();
    let first = env.scan(Vec::new());
    let second = env.scan(Vec::new());
    assert_eq!(first, second);
}

#[test]
fn test_media_extension_preference() {
    let env = standard_environment();
    let library = env.scan(Vec::new());

    let mario = library.game_by_path(&env.games_dir.join("mario.zip")).unwrap();
    let box_front = mario.assets.get(AssetType::BoxFront).unwrap();
    assert!(box_front.ends_with("media/mario-boxFront.png"));

    let sonic = library.game_by_path(&env.games_dir.join("sonic.zip")).unwrap();
    assert_eq!(sonic.assets.get_all(AssetType::Videos).len(), 1);
}

#[test]
fn test_launch_command_from_system() {
    let env = standard_environment();
    let library = env.scan(Vec::new());

    let sonic_path = env.games_dir.join("sonic.zip");
    let sonic = library.game_by_path(&sonic_path).unwrap();
    assert_eq!(
        sonic.launch_command(&sonic.files[0]),
        format!("fceux \"{}\"", sonic_path.display())
    );
}

#[test]
fn test_gamelist_from_shared_directory() {
    let env = standard_environment();
    env.write(
        "es/gamelists/nes/gamelist.xml",
        r#"<gameList>
  <game>
    <path>./sonic.zip</path>
    <name>Sonic the Hedgehog</name>
    <favorite>true</favorite>
  </game>
  <game>
    <path>./not-a-game.zip</path>
    <name>Nothing</name>
  </game>
</gameList>"#,
    );

    let library = env.scan(Vec::new());
    let sonic = library.game_by_path(&env.games_dir.join("sonic.zip")).unwrap();
    assert_eq!(sonic.title, "Sonic the Hedgehog");
    assert!(sonic.favorite);
    assert_eq!(library.game_count(), 3);
}

#[test]
fn test_filters_over_scanned_library() {
    let env = standard_environment();
    let favorites = env.write(
        "favorites.txt",
        &format!("{}\n", env.games_dir.join("tetris.zip").display()),
    );
    let library = env.scan(vec![Enricher::Favorites(FavoritesEnricher::with_file(&favorites))]);

    let mut filters = FilterSet::new(default_filters());
    assert!(library.games().iter().all(|game| filters.accepts(game)));

    assert!(filters.select("Favorites"));
    let favorite_titles: Vec<&str> = library
        .games()
        .iter()
        .filter(|game| filters.accepts(game))
        .map(|game| game.title.as_str())
        .collect();
    assert_eq!(favorite_titles, vec!["tetris"]);

    assert!(filters.select("Multiplayer"));
    let multiplayer: Vec<&str> = library
        .games()
        .iter()
        .filter(|game| filters.accepts(game))
        .map(|game| game.title.as_str())
        .collect();
    assert_eq!(multiplayer, vec!["Super Mario Bros."]);

    let mut custom = FilterSet::new(parse_filters(
        "filter: Mario\nrule: title contains mario\n",
        "filters.txt",
    ));
    assert!(custom.select("Mario"));
    let matched: Vec<&str> = library
        .games()
        .iter()
        .filter(|game| custom.accepts(game))
        .map(|game| game.title.as_str())
        .collect();
    assert_eq!(matched, vec!["Super Mario Bros."]);
}

#[test]
fn test_play_statistics() {
    let env = standard_environment();
    let db_path = env.root.join("stats.db");
    let mario_path = env.games_dir.join("mario.zip");
    {
        let mut db = PlaytimeDb::open(&db_path).unwrap();
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        db.record_play(&mario_path, start, 600).unwrap();
        db.record_play(&mario_path, start, 300).unwrap();
    }

    let library = env.scan(vec![Enricher::Playtime(PlaytimeEnricher::with_database(&db_path))]);
    let mario = library.game_by_path(&mario_path).unwrap();
    assert_eq!(mario.play_count, 2);
    assert_eq!(mario.play_time, 900);
    assert_eq!(
        mario.last_played,
        DateTime::<Utc>::from_timestamp(1_700_000_600, 0)
    );
}

#[test]
fn test_missing_sources_yield_empty_library() {
    let env = LibraryTestEnvironment::new();
    let outcome = env.pipeline(Vec::new()).run(&CancellationToken::new());

    assert!(outcome.library.is_empty());
    assert_eq!(
        outcome.report.provider_counts,
        vec![("pegasus".to_string(), 0), ("es2".to_string(), 0)]
    );
}

#[test]
fn test_pipeline_from_config() {
    let env = standard_environment();
    let mut config = LudexConfig::default();
    config.library.game_dirs = vec![env.games_dir.clone()];
    config.providers.insert(
        "es2".to_string(),
        ProviderSettings::default().with_option(
            "systems_file",
            env.root.join("es/es_systems.cfg").to_string_lossy(),
        ),
    );
    for name in ["steam", "steam_store", "favorites", "playtime"] {
        config.providers.insert(
            name.to_string(),
            ProviderSettings {
                enabled: false,
                ..Default::default()
            },
        );
    }
    config.providers.insert(
        "pegasus".to_string(),
        ProviderSettings::default()
            .with_option("metafiles_dir", env.root.join("metafiles").to_string_lossy()),
    );
    config.providers.insert(
        "es2_gamelist".to_string(),
        ProviderSettings::default()
            .with_option("gamelists_dir", env.root.join("es/gamelists").to_string_lossy()),
    );

    let outcome = ScanPipeline::from_config(&config).run(&CancellationToken::new());
    assert_eq!(outcome.library, env.scan(Vec::new()));
    assert_eq!(outcome.report.games, 3);
    assert_eq!(outcome.report.collections, 2);
}

#[tokio::test]
async fn test_cancelled_scan_still_finalizes() {
    let env = standard_environment();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = env.pipeline(Vec::new()).spawn(cancel).await.unwrap();
    assert!(outcome.report.cancelled);
    assert!(outcome.library.is_empty());
}
