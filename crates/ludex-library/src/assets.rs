//! Asset categories and the filename-based asset matcher

use std::collections::BTreeMap;
use std::fmt;

/// Closed set of asset categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetType {
    BoxFront,
    BoxBack,
    BoxSpine,
    BoxFull,
    Cartridge,
    Logo,
    Poster,
    Marquee,
    Bezel,
    Panel,
    CabinetLeft,
    CabinetRight,
    Tile,
    Banner,
    SteamGrid,
    Flyer,
    Background,
    Music,
    TitleScreen,
    Screenshots,
    Videos,
}

const IMAGE_EXTS: &[&str] = &["png", "jpg"];
const VIDEO_EXTS: &[&str] = &["webm", "mp4", "avi"];
const AUDIO_EXTS: &[&str] = &["mp3", "ogg", "wav"];

/// Filename suffixes of the `media/` directory, including the dash
const SUFFIX_TABLE: &[(&str, AssetType)] = &[
    ("-boxFront", AssetType::BoxFront),
    ("-box_front", AssetType::BoxFront),
    ("-boxart2D", AssetType::BoxFront),
    ("-boxBack", AssetType::BoxBack),
    ("-box_back", AssetType::BoxBack),
    ("-boxSpine", AssetType::BoxSpine),
    ("-box_spine", AssetType::BoxSpine),
    ("-boxSide", AssetType::BoxSpine),
    ("-box_side", AssetType::BoxSpine),
    ("-boxFull", AssetType::BoxFull),
    ("-box_full", AssetType::BoxFull),
    ("-box", AssetType::BoxFull),
    ("-cartridge", AssetType::Cartridge),
    ("-disc", AssetType::Cartridge),
    ("-cart", AssetType::Cartridge),
    ("-logo", AssetType::Logo),
    ("-wheel", AssetType::Logo),
    ("-marquee", AssetType::Marquee),
    ("-bezel", AssetType::Bezel),
    ("-screenmarquee", AssetType::Bezel),
    ("-border", AssetType::Bezel),
    ("-steam", AssetType::SteamGrid),
    ("-steamgrid", AssetType::SteamGrid),
    ("-grid", AssetType::SteamGrid),
    ("-flyer", AssetType::Flyer),
    ("-background", AssetType::Background),
    ("-music", AssetType::Music),
    ("-screenshot", AssetType::Screenshots),
    ("-video", AssetType::Videos),
];

/// Names used by `assets.<key>` metadata entries and `media/<game>/<key>.<ext>` files
const KEY_TABLE: &[(&str, AssetType)] = &[
    ("boxfront", AssetType::BoxFront),
    ("boxFront", AssetType::BoxFront),
    ("box_front", AssetType::BoxFront),
    ("boxart2D", AssetType::BoxFront),
    ("boxart2d", AssetType::BoxFront),
    ("boxback", AssetType::BoxBack),
    ("boxBack", AssetType::BoxBack),
    ("box_back", AssetType::BoxBack),
    ("boxspine", AssetType::BoxSpine),
    ("boxSpine", AssetType::BoxSpine),
    ("box_spine", AssetType::BoxSpine),
    ("boxside", AssetType::BoxSpine),
    ("boxSide", AssetType::BoxSpine),
    ("box_side", AssetType::BoxSpine),
    ("boxfull", AssetType::BoxFull),
    ("boxFull", AssetType::BoxFull),
    ("box_full", AssetType::BoxFull),
    ("box", AssetType::BoxFull),
    ("cartridge", AssetType::Cartridge),
    ("disc", AssetType::Cartridge),
    ("cart", AssetType::Cartridge),
    ("logo", AssetType::Logo),
    ("wheel", AssetType::Logo),
    ("marquee", AssetType::Marquee),
    ("bezel", AssetType::Bezel),
    ("screenmarquee", AssetType::Bezel),
    ("border", AssetType::Bezel),
    ("panel", AssetType::Panel),
    ("cabinetleft", AssetType::CabinetLeft),
    ("cabinetLeft", AssetType::CabinetLeft),
    ("cabinet_left", AssetType::CabinetLeft),
    ("cabinetright", AssetType::CabinetRight),
    ("cabinetRight", AssetType::CabinetRight),
    ("cabinet_right", AssetType::CabinetRight),
    ("tile", AssetType::Tile),
    ("banner", AssetType::Banner),
    ("steam", AssetType::SteamGrid),
    ("steamgrid", AssetType::SteamGrid),
    ("grid", AssetType::SteamGrid),
    ("poster", AssetType::Poster),
    ("flyer", AssetType::Flyer),
    ("background", AssetType::Background),
    ("music", AssetType::Music),
    ("screenshot", AssetType::Screenshots),
    ("screenshots", AssetType::Screenshots),
    ("video", AssetType::Videos),
    ("videos", AssetType::Videos),
    ("titlescreen", AssetType::TitleScreen),
];

impl AssetType {
    pub const ALL: [AssetType; 21] = [
        AssetType::BoxFront,
        AssetType::BoxBack,
        AssetType::BoxSpine,
        AssetType::BoxFull,
        AssetType::Cartridge,
        AssetType::Logo,
        AssetType::Poster,
        AssetType::Marquee,
        AssetType::Bezel,
        AssetType::Panel,
        AssetType::CabinetLeft,
        AssetType::CabinetRight,
        AssetType::Tile,
        AssetType::Banner,
        AssetType::SteamGrid,
        AssetType::Flyer,
        AssetType::Background,
        AssetType::Music,
        AssetType::TitleScreen,
        AssetType::Screenshots,
        AssetType::Videos,
    ];

    /// Multi categories hold an ordered list of URLs
    pub fn is_multi(self) -> bool {
        matches!(self, AssetType::Screenshots | AssetType::Videos)
    }

    /// Stable snake_case name
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::BoxFront => "box_front",
            AssetType::BoxBack => "box_back",
            AssetType::BoxSpine => "box_spine",
            AssetType::BoxFull => "box_full",
            AssetType::Cartridge => "cartridge",
            AssetType::Logo => "logo",
            AssetType::Poster => "poster",
            AssetType::Marquee => "marquee",
            AssetType::Bezel => "bezel",
            AssetType::Panel => "panel",
            AssetType::CabinetLeft => "cabinet_left",
            AssetType::CabinetRight => "cabinet_right",
            AssetType::Tile => "tile",
            AssetType::Banner => "banner",
            AssetType::SteamGrid => "steam_grid",
            AssetType::Flyer => "flyer",
            AssetType::Background => "background",
            AssetType::Music => "music",
            AssetType::TitleScreen => "title_screen",
            AssetType::Screenshots => "screenshots",
            AssetType::Videos => "videos",
        }
    }

    /// File extensions accepted for this category
    pub fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            AssetType::Videos => VIDEO_EXTS,
            AssetType::Music => AUDIO_EXTS,
            _ => IMAGE_EXTS,
        }
    }

    pub fn accepts_extension(self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.allowed_extensions().contains(&ext.as_str())
    }

    /// Map a `-suffix` (dash included) through the media suffix table
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        SUFFIX_TABLE
            .iter()
            .find(|(known, _)| *known == suffix)
            .map(|(_, kind)| *kind)
    }

    /// Default category of a bare file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        if IMAGE_EXTS.contains(&ext.as_str()) {
            Some(AssetType::BoxFront)
        } else if VIDEO_EXTS.contains(&ext.as_str()) {
            Some(AssetType::Videos)
        } else if AUDIO_EXTS.contains(&ext.as_str()) {
            Some(AssetType::Music)
        } else {
            None
        }
    }

    /// Asset key lookup: exact match first, then the longest key the text starts with
    pub fn from_key(key: &str) -> Option<Self> {
        if let Some((_, kind)) = KEY_TABLE.iter().find(|(known, _)| *known == key) {
            return Some(*kind);
        }

        KEY_TABLE
            .iter()
            .filter(|(known, _)| key.starts_with(*known))
            .max_by_key(|(known, _)| known.len())
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a media file by its `-suffix` (possibly empty) and extension.
///
/// A known suffix wins when the extension suits its category; anything else
/// falls back to the extension alone.
pub fn classify(suffix: &str, ext: &str) -> Option<AssetType> {
    if !suffix.is_empty() {
        if let Some(kind) = AssetType::from_suffix(suffix) {
            if kind.accepts_extension(ext) {
                return Some(kind);
            }
        }
    }

    AssetType::from_extension(ext)
}

/// Per-category URL storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetTable {
    entries: BTreeMap<AssetType, Vec<String>>,
}

impl AssetTable {
    /// Add a URL under the category write policy: multi categories append new
    /// URLs, single categories keep their first value. Returns whether the
    /// table changed.
    pub fn add(&mut self, kind: AssetType, url: impl Into<String>) -> bool {
        let url = url.into();
        if url.is_empty() {
            return false;
        }

        let slot = self.entries.entry(kind).or_default();
        if kind.is_multi() {
            if slot.contains(&url) {
                return false;
            }
        } else if !slot.is_empty() {
            return false;
        }

        slot.push(url);
        true
    }

    /// First URL of a category
    pub fn get(&self, kind: AssetType) -> Option<&str> {
        self.entries
            .get(&kind)
            .and_then(|urls| urls.first())
            .map(String::as_str)
    }

    /// Every URL of a category
    pub fn get_all(&self, kind: AssetType) -> &[String] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetType, &[String])> {
        self.entries
            .iter()
            .filter(|(_, urls)| !urls.is_empty())
            .map(|(kind, urls)| (*kind, urls.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_suffix() {
        assert_eq!(classify("-boxFront", "png"), Some(AssetType::BoxFront));
        assert_eq!(classify("-box_back", "jpg"), Some(AssetType::BoxBack));
        assert_eq!(classify("-video", "mp4"), Some(AssetType::Videos));
        assert_eq!(classify("-music", "ogg"), Some(AssetType::Music));
        assert_eq!(classify("-wheel", "PNG"), Some(AssetType::Logo));
    }

    #[test]
    fn test_classify_falls_back_to_extension() {
        // suffix category does not allow the extension
        assert_eq!(classify("-marquee", "mp4"), Some(AssetType::Videos));
        // unknown suffix
        assert_eq!(classify("-unknown", "png"), Some(AssetType::BoxFront));
        assert_eq!(classify("", "wav"), Some(AssetType::Music));
        assert_eq!(classify("", "txt"), None);
        assert_eq!(classify("-logo", "gif"), None);
    }

    #[test]
    fn test_from_key() {
        assert_eq!(AssetType::from_key("boxFront"), Some(AssetType::BoxFront));
        assert_eq!(AssetType::from_key("screenshots"), Some(AssetType::Screenshots));
        assert_eq!(AssetType::from_key("screenshot2"), Some(AssetType::Screenshots));
        assert_eq!(AssetType::from_key("boxback_hd"), Some(AssetType::BoxBack));
        assert_eq!(AssetType::from_key("titlescreen"), Some(AssetType::TitleScreen));
        assert_eq!(AssetType::from_key("unknown"), None);
    }

    #[test]
    fn test_single_category_first_write_wins() {
        let mut table = AssetTable::default();
        assert!(table.add(AssetType::BoxFront, "file:///a.png"));
        assert!(!table.add(AssetType::BoxFront, "file:///b.png"));
        assert_eq!(table.get(AssetType::BoxFront), Some("file:///a.png"));
        assert_eq!(table.get_all(AssetType::BoxFront).len(), 1);
    }

    #[test]
    fn test_multi_category_dedup() {
        let mut table = AssetTable::default();
        assert!(table.add(AssetType::Screenshots, "file:///1.png"));
        assert!(table.add(AssetType::Screenshots, "file:///2.png"));
        assert!(!table.add(AssetType::Screenshots, "file:///1.png"));
        assert_eq!(
            table.get_all(AssetType::Screenshots),
            &["file:///1.png".to_string(), "file:///2.png".to_string()]
        );
    }

    #[test]
    fn test_empty_table() {
        let mut table = AssetTable::default();
        assert!(table.is_empty());
        assert!(!table.add(AssetType::Logo, ""));
        assert!(table.is_empty());
        assert_eq!(table.get(AssetType::Logo), None);
        assert!(table.get_all(AssetType::Videos).is_empty());
    }

    #[test]
    fn test_multi_flags() {
        let multi: Vec<_> = AssetType::ALL.iter().filter(|kind| kind.is_multi()).collect();
        assert_eq!(multi, vec![&AssetType::Screenshots, &AssetType::Videos]);
    }
}
