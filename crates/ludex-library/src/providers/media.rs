//! `media/` directory enricher
//!
//! ```text
//! <dir>/mario.zip
//! <dir>/media/mario-boxFront.png     suffix-typed file
//! <dir>/media/mario.webm             extension-typed file
//! <dir>/media/Mario Bros/logo.png    per-game subdirectory
//! ```

use crate::assets::{AssetType, classify};
use crate::context::SearchContext;
use crate::model::GameId;
use crate::scanner::{DirScanner, ScanConfig, canonical_path, to_asset_url};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const MEDIA_DIR: &str = "media";
const SUFFIX_MARK: char = '-';

/// Attaches files from `<metadata dir>/media` to known games
#[derive(Debug, Clone, Default)]
pub struct MediaEnricher;

impl MediaEnricher {
    pub fn new() -> Self {
        Self
    }

    pub fn fill(&self, ctx: &mut SearchContext, metadata_dirs: &[PathBuf], cancel: &CancellationToken) {
        let lookup = build_lookup(ctx);
        let scanner = DirScanner::with_config(ScanConfig::default().with_max_depth(2));
        let mut added = 0;

        for dir in metadata_dirs {
            if cancel.is_cancelled() {
                break;
            }

            let media_dir = dir.join(MEDIA_DIR);
            if !media_dir.is_dir() {
                continue;
            }
            let dir_base = dir.to_string_lossy();
            let dir_base = dir_base.trim_end_matches('/');

            for file in scanner.files(&media_dir, cancel) {
                let Ok(relative) = file.strip_prefix(&media_dir) else {
                    continue;
                };

                let matched = match relative.components().count() {
                    1 => match_flat_file(&file, dir_base, &lookup),
                    2 => match_subdir_file(relative, &file, dir_base, &lookup),
                    _ => None,
                };
                let Some((id, kind)) = matched else {
                    continue;
                };

                let path = canonical_path(&file).unwrap_or(file);
                let url = to_asset_url(&path.to_string_lossy());
                if let Some(game) = ctx.game_mut(id) {
                    if game.assets.add(kind, url) {
                        added += 1;
                    }
                }
            }
        }

        tracing::info!("Media: attached {} assets", added);
    }
}

/// Short paths of every game file, then `<dir>/<title>` keys for files whose
/// short path is taken by another game
fn build_lookup(ctx: &SearchContext) -> HashMap<String, GameId> {
    let mut lookup = ctx.short_paths();
    for game in ctx.games() {
        for file in &game.files {
            let dir = file
                .path
                .parent()
                .map(|parent| parent.to_string_lossy().to_string())
                .unwrap_or_default();
            lookup
                .entry(format!("{}/{}", dir.trim_end_matches('/'), game.title))
                .or_insert(game.id);
        }
    }
    lookup
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `media/<basename>[-<suffix>].<ext>`
fn match_flat_file(
    file: &Path,
    dir_base: &str,
    lookup: &HashMap<String, GameId>,
) -> Option<(GameId, AssetType)> {
    let stem = file.file_stem()?.to_string_lossy().to_string();
    let ext = extension_of(file);

    let (prefix, suffix) = match stem.rfind(SUFFIX_MARK) {
        Some(pos) => stem.split_at(pos),
        None => (stem.as_str(), ""),
    };

    let (id, suffix) = match lookup.get(&format!("{}/{}", dir_base, prefix)) {
        Some(id) => (*id, suffix),
        None if !suffix.is_empty() => (*lookup.get(&format!("{}/{}", dir_base, stem))?, ""),
        None => return None,
    };

    classify(suffix, &ext).map(|kind| (id, kind))
}

/// `media/<basename>/<asset key>.<ext>`
fn match_subdir_file(
    relative: &Path,
    file: &Path,
    dir_base: &str,
    lookup: &HashMap<String, GameId>,
) -> Option<(GameId, AssetType)> {
    let game_name = relative.parent()?.to_string_lossy().to_string();
    let id = *lookup.get(&format!("{}/{}", dir_base, game_name))?;

    let key = file.file_stem()?.to_string_lossy().to_string();
    let kind = AssetType::from_key(&key)?;
    kind.accepts_extension(&extension_of(file)).then_some((id, kind))
}
