//! Rule-based game filters
//!
//! Filters file format, read with the metadata text reader:
//!
//! ```text
//! filter: Platformers
//! rule: genre contains platform
//! rule: title not_equals "Sonic.*"
//!
//! filter: Unplayed
//! rule: playCount not_equals [1-9][0-9]*
//! enabled: false
//! ```

use crate::LibraryError;
use crate::finalize::Game;
use crate::metafile;
use regex::{Regex, RegexBuilder};
use std::path::Path;

/// Game properties a rule can target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameProperty {
    Title,
    SortBy,
    Summary,
    Description,
    Developer,
    Publisher,
    Genre,
    Tag,
    Players,
    Rating,
    Favorite,
    PlayCount,
    PlayTime,
    LastPlayed,
    Release,
    ReleaseYear,
    ReleaseMonth,
    ReleaseDay,
    Path,
    Launch,
}

impl GameProperty {
    pub fn from_name(name: &str) -> Option<Self> {
        let property = match name {
            "title" => GameProperty::Title,
            "sortBy" => GameProperty::SortBy,
            "summary" => GameProperty::Summary,
            "description" => GameProperty::Description,
            "developer" => GameProperty::Developer,
            "publisher" => GameProperty::Publisher,
            "genre" => GameProperty::Genre,
            "tag" => GameProperty::Tag,
            "players" => GameProperty::Players,
            "rating" => GameProperty::Rating,
            "favorite" => GameProperty::Favorite,
            "playCount" => GameProperty::PlayCount,
            "playTime" => GameProperty::PlayTime,
            "lastPlayed" => GameProperty::LastPlayed,
            "release" => GameProperty::Release,
            "releaseYear" => GameProperty::ReleaseYear,
            "releaseMonth" => GameProperty::ReleaseMonth,
            "releaseDay" => GameProperty::ReleaseDay,
            "path" => GameProperty::Path,
            "launch" => GameProperty::Launch,
            _ => return None,
        };
        Some(property)
    }

    /// String form of the property for a game
    pub fn value(self, game: &Game) -> String {
        fn opt<T: ToString>(value: Option<T>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }

        match self {
            GameProperty::Title => game.title.clone(),
            GameProperty::SortBy => game.sort_key().to_string(),
            GameProperty::Summary => game.summary.clone(),
            GameProperty::Description => game.description.clone(),
            GameProperty::Developer => game.developers.join(", "),
            GameProperty::Publisher => game.publishers.join(", "),
            GameProperty::Genre => game.genres.join(", "),
            GameProperty::Tag => game.tags.join(", "),
            GameProperty::Players => game.players.to_string(),
            GameProperty::Rating => opt(game.rating),
            GameProperty::Favorite => game.favorite.to_string(),
            GameProperty::PlayCount => game.play_count.to_string(),
            GameProperty::PlayTime => game.play_time.to_string(),
            GameProperty::LastPlayed => opt(game.last_played.map(|time| time.to_rfc3339())),
            GameProperty::Release => game.release.to_string(),
            GameProperty::ReleaseYear => opt(game.release.year),
            GameProperty::ReleaseMonth => opt(game.release.month),
            GameProperty::ReleaseDay => opt(game.release.day),
            GameProperty::Path => opt(game.path().map(|path| path.display().to_string())),
            GameProperty::Launch => game.launch_cmd.clone(),
        }
    }
}

/// Boolean coercion of a property's string form
fn as_bool(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

/// Comparison performed by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    IsTrue,
    IsFalse,
    Empty,
    NotEmpty,
    Contains,
    NotContains,
    Equals,
    NotEquals,
}

impl RuleKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "is_true" => RuleKind::IsTrue,
            "is_false" => RuleKind::IsFalse,
            "empty" => RuleKind::Empty,
            "not_empty" => RuleKind::NotEmpty,
            "contains" => RuleKind::Contains,
            "not_contains" => RuleKind::NotContains,
            "equals" => RuleKind::Equals,
            "not_equals" => RuleKind::NotEquals,
            _ => return None,
        };
        Some(kind)
    }

    pub fn needs_pattern(self) -> bool {
        matches!(
            self,
            RuleKind::Contains | RuleKind::NotContains | RuleKind::Equals | RuleKind::NotEquals
        )
    }
}

/// One property test
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub property: GameProperty,
    pub kind: RuleKind,
    pattern: Option<Regex>,
}

impl FilterRule {
    /// Build a rule from its textual parts. Patterns are case-insensitive;
    /// `equals` kinds must match the whole value.
    pub fn new(property: &str, kind: &str, pattern: Option<&str>) -> Result<Self, LibraryError> {
        let property = GameProperty::from_name(property).ok_or_else(|| {
            LibraryError::InvalidRule(format!("unrecognized game property `{}`", property))
        })?;
        let kind = RuleKind::from_name(kind).ok_or_else(|| {
            LibraryError::InvalidRule(format!("unrecognized comparison `{}`", kind))
        })?;

        let pattern = if kind.needs_pattern() {
            let text = pattern
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .ok_or_else(|| {
                    LibraryError::InvalidRule("comparison requires a pattern".to_string())
                })?;

            let source = match kind {
                RuleKind::Equals | RuleKind::NotEquals => format!("^(?:{})$", text),
                _ => text.to_string(),
            };
            Some(RegexBuilder::new(&source).case_insensitive(true).build()?)
        } else {
            None
        };

        Ok(Self {
            property,
            kind,
            pattern,
        })
    }

    pub fn matches(&self, game: &Game) -> bool {
        let value = self.property.value(game);
        let found = || {
            self.pattern
                .as_ref()
                .map(|pattern| pattern.is_match(&value))
                .unwrap_or(false)
        };

        match self.kind {
            RuleKind::IsTrue => as_bool(&value),
            RuleKind::IsFalse => !as_bool(&value),
            RuleKind::Empty => value.is_empty(),
            RuleKind::NotEmpty => !value.is_empty(),
            RuleKind::Contains | RuleKind::Equals => found(),
            RuleKind::NotContains | RuleKind::NotEquals => !found(),
        }
    }
}

/// Named list of rules, combined with AND
#[derive(Debug, Clone)]
pub struct Filter {
    pub name: String,
    pub enabled: bool,
    pub rules: Vec<FilterRule>,
}

impl Filter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: FilterRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Enabled and every rule matches; no rules match everything
    pub fn accepts(&self, game: &Game) -> bool {
        self.enabled && self.rules.iter().all(|rule| rule.matches(game))
    }
}

/// Filters plus a "no filter" state, with a movable cursor
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
    index: Option<usize>,
}

impl FilterSet {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            index: None,
        }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Select a filter, or `None` for no filter. Out of range indexes are
    /// rejected.
    pub fn set_index(&mut self, index: Option<usize>) -> bool {
        if let Some(idx) = index {
            if idx >= self.filters.len() {
                tracing::warn!("Invalid filter index #{}", idx);
                return false;
            }
        }
        self.index = index;
        true
    }

    /// Select a filter by name
    pub fn select(&mut self, name: &str) -> bool {
        match self.filters.iter().position(|filter| filter.name == name) {
            Some(idx) => self.set_index(Some(idx)),
            None => false,
        }
    }

    pub fn current(&self) -> Option<&Filter> {
        self.index.and_then(|idx| self.filters.get(idx))
    }

    // Cursor positions: 0 is "no filter", n is filter n - 1
    fn position(&self) -> usize {
        self.index.map(|idx| idx + 1).unwrap_or(0)
    }

    fn set_position(&mut self, position: usize) {
        self.index = position.checked_sub(1);
    }

    fn positions(&self) -> usize {
        self.filters.len() + 1
    }

    pub fn increment(&mut self) {
        let next = (self.position() + 1) % self.positions();
        self.set_position(next);
    }

    pub fn decrement(&mut self) {
        let count = self.positions();
        let next = (self.position() + count - 1) % count;
        self.set_position(next);
    }

    pub fn increment_no_wrap(&mut self) {
        let next = (self.position() + 1).min(self.positions() - 1);
        self.set_position(next);
    }

    pub fn decrement_no_wrap(&mut self) {
        let next = self.position().saturating_sub(1);
        self.set_position(next);
    }

    /// Whether the current filter accepts the game; no filter accepts all
    pub fn accepts(&self, game: &Game) -> bool {
        self.current().map(|filter| filter.accepts(game)).unwrap_or(true)
    }
}

/// "Favorites" and "Multiplayer"
pub fn default_filters() -> Vec<Filter> {
    let mut filters = Vec::new();

    match FilterRule::new("favorite", "is_true", None) {
        Ok(rule) => filters.push(Filter::new("Favorites").with_rule(rule)),
        Err(e) => tracing::error!("Default filter rule rejected: {}", e),
    }
    match FilterRule::new("players", "not_equals", Some("1")) {
        Ok(rule) => filters.push(Filter::new("Multiplayer").with_rule(rule)),
        Err(e) => tracing::error!("Default filter rule rejected: {}", e),
    }

    filters
}

/// `<property> <comparison> [pattern]`
const RULE_PATTERN: &str = r"^([a-zA-Z\.]+) +([a-z_]+)( +.+)?$";

/// Parse filter definitions; invalid rules are logged and dropped, filters
/// left without rules are dropped too
pub fn parse_filters(text: &str, source_name: &str) -> Vec<Filter> {
    let rule_rx = match Regex::new(RULE_PATTERN) {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!("Filter rule pattern rejected: {}", e);
            return Vec::new();
        }
    };

    let mut filters: Vec<Filter> = Vec::new();
    let mut current: Option<usize> = None;

    for result in metafile::parse_str(text, source_name) {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };

        if entry.key == "filter" {
            let name = metafile::merge_lines(&entry.values);
            let idx = match filters.iter().position(|filter| filter.name == name) {
                Some(idx) => idx,
                None => {
                    filters.push(Filter::new(&name));
                    filters.len() - 1
                }
            };
            current = Some(idx);
            continue;
        }

        let Some(filter) = current.and_then(|idx| filters.get_mut(idx)) else {
            tracing::warn!(
                "{}",
                LibraryError::parse(source_name, entry.line, "no filter defined yet, entry ignored")
            );
            continue;
        };

        match entry.key.as_str() {
            key if key.starts_with("x-") => {}
            "enabled" => {
                let value = metafile::merge_lines(&entry.values);
                filter.enabled = as_bool(&value);
            }
            "rule" | "rules" => {
                for value in entry.values.iter().filter(|value| !value.is_empty()) {
                    match parse_rule(&rule_rx, value) {
                        Ok(rule) => filter.rules.push(rule),
                        Err(e) => tracing::warn!(
                            "{}",
                            LibraryError::parse(
                                source_name,
                                entry.line,
                                format!("{}, rule ignored", e)
                            )
                        ),
                    }
                }
            }
            other => tracing::warn!(
                "{}",
                LibraryError::parse(
                    source_name,
                    entry.line,
                    format!("unrecognized attribute name `{}`, ignored", other)
                )
            ),
        }
    }

    filters.retain(|filter| !filter.rules.is_empty());
    tracing::info!("Found {} custom filters", filters.len());
    filters
}

fn parse_rule(rule_rx: &Regex, text: &str) -> Result<FilterRule, LibraryError> {
    let caps = rule_rx.captures(text).ok_or_else(|| {
        LibraryError::InvalidRule(
            "rule should be in 'property comparison' or 'property comparison regex' format"
                .to_string(),
        )
    })?;

    let property = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let kind = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let pattern = caps.get(3).map(|m| unquote(m.as_str().trim()));

    FilterRule::new(property, kind, pattern)
}

fn unquote(text: &str) -> &str {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Load the filters file; a missing or unreadable file yields the defaults
pub fn load_filters(path: &Path) -> Vec<Filter> {
    if !path.exists() {
        tracing::debug!("No filters file at {}, using defaults", path.display());
        return default_filters();
    }

    match std::fs::read_to_string(path) {
        Ok(text) => parse_filters(&text, &path.to_string_lossy()),
        Err(e) => {
            tracing::warn!(
                "Could not read {}, custom filters are not loaded: {}",
                path.display(),
                e
            );
            default_filters()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SearchContext;
    use crate::finalize::finalize;
    use std::sync::Arc;

    fn game(title: &str, favorite: bool, players: u32) -> Arc<Game> {
        let mut ctx = SearchContext::new();
        let id = ctx.resolve_path(&std::path::PathBuf::from(format!("/games/{}.zip", title)));
        let pending = ctx.game_mut(id).unwrap();
        pending.set_title(title);
        pending.favorite = favorite;
        pending.players = players;
        pending.genres.push("Platform".to_string());
        ctx.collection_mut("test", "Test");
        ctx.add_to_collection(id, "test");
        finalize(ctx).game(0).unwrap().clone()
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let rule = FilterRule::new("title", "contains", Some("mario")).unwrap();
        assert!(rule.matches(&game("Super Mario Bros.", false, 1)));
        assert!(!rule.matches(&game("Sonic", false, 1)));
    }

    #[test]
    fn test_equals_is_anchored() {
        let rule = FilterRule::new("title", "equals", Some("sonic")).unwrap();
        assert!(rule.matches(&game("Sonic", false, 1)));
        assert!(!rule.matches(&game("Sonic 2", false, 1)));

        let not_rule = FilterRule::new("players", "not_equals", Some("1")).unwrap();
        assert!(!not_rule.matches(&game("Solo", false, 1)));
        assert!(not_rule.matches(&game("Party", false, 4)));
    }

    #[test]
    fn test_boolean_rules() {
        let fav = FilterRule::new("favorite", "is_true", None).unwrap();
        let not_fav = FilterRule::new("favorite", "is_false", None).unwrap();
        let played = FilterRule::new("playCount", "is_true", None).unwrap();

        let loved = game("Loved", true, 1);
        assert!(fav.matches(&loved));
        assert!(!not_fav.matches(&loved));
        assert!(!played.matches(&loved));
    }

    #[test]
    fn test_empty_rules() {
        let empty = FilterRule::new("description", "empty", None).unwrap();
        let genre = FilterRule::new("genre", "not_empty", None).unwrap();
        let g = game("Plain", false, 1);
        assert!(empty.matches(&g));
        assert!(genre.matches(&g));
    }

    #[test]
    fn test_invalid_rules() {
        assert!(matches!(
            FilterRule::new("colour", "is_true", None),
            Err(LibraryError::InvalidRule(_))
        ));
        assert!(matches!(
            FilterRule::new("title", "resembles", Some("x")),
            Err(LibraryError::InvalidRule(_))
        ));
        assert!(matches!(
            FilterRule::new("title", "contains", None),
            Err(LibraryError::InvalidRule(_))
        ));
        assert!(matches!(
            FilterRule::new("title", "contains", Some("(")),
            Err(LibraryError::Regex(_))
        ));
    }

    #[test]
    fn test_filter_composition() {
        let everything = Filter::new("All");
        assert!(everything.accepts(&game("Any", false, 1)));

        let favorites = Filter::new("Favorites")
            .with_rule(FilterRule::new("favorite", "is_true", None).unwrap());
        assert!(favorites.accepts(&game("A", true, 1)));
        assert!(!favorites.accepts(&game("B", false, 1)));

        let mut disabled = favorites.clone();
        disabled.enabled = false;
        assert!(!disabled.accepts(&game("A", true, 1)));
    }

    #[test]
    fn test_filter_set_cursor() {
        let mut set = FilterSet::new(default_filters());
        assert_eq!(set.len(), 2);
        assert!(set.current().is_none());

        set.increment();
        assert_eq!(set.current().unwrap().name, "Favorites");
        set.increment();
        assert_eq!(set.current().unwrap().name, "Multiplayer");
        set.increment();
        assert!(set.current().is_none());

        set.decrement();
        assert_eq!(set.index(), Some(1));

        set.increment_no_wrap();
        assert_eq!(set.index(), Some(1));

        set.set_index(None);
        set.decrement_no_wrap();
        assert_eq!(set.index(), None);

        assert!(!set.set_index(Some(5)));
        assert!(set.select("Multiplayer"));
        assert_eq!(set.index(), Some(1));
    }

    #[test]
    fn test_filter_set_accepts() {
        let mut set = FilterSet::new(default_filters());
        let solo = game("Solo", false, 1);
        assert!(set.accepts(&solo));

        set.select("Multiplayer");
        assert!(!set.accepts(&solo));
        assert!(set.accepts(&game("Party", false, 4)));
    }

    #[test]
    fn test_parse_filters_file() {
        let text = r#"
filter: Platformers
rule: genre contains platform
rule: title not_equals "Sonic.*"

filter: Broken
rule: colour is_true

filter: Hidden
rule: favorite is_true
enabled: false
"#;
        let filters = parse_filters(text, "filters.txt");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].name, "Platformers");
        assert_eq!(filters[0].rules.len(), 2);
        assert!(filters[0].accepts(&game("Super Mario Bros.", false, 1)));
        assert!(!filters[0].accepts(&game("Sonic 3", false, 1)));
        assert_eq!(filters[1].name, "Hidden");
        assert!(!filters[1].enabled);
    }

    #[test]
    fn test_load_filters_defaults_when_missing() {
        let filters = load_filters(Path::new("/nonexistent/filters.txt"));
        let names: Vec<&str> = filters.iter().map(|filter| filter.name.as_str()).collect();
        assert_eq!(names, vec!["Favorites", "Multiplayer"]);
    }
}
