//! Episode catalog
//!
//! Parses the extended M3U playlist written by the scraping pipeline:
//!
//! ```text
//! #EXTM3U
//! #EXTINF:-1, 1 - Episode #1 | 19 Aug 2005 | As the Worm Turns
//! #EXTVLCOPT:description=As the Worm Turns: the first Internet worms of 2005
//! https://twit.cachefly.net/audio/sn/sn0001/sn0001.mp3
//! ```
//!
//! Episodes are keyed by their catalog number.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Largest page size accepted by [`Catalog::list`]
pub const MAX_PAGE_SIZE: usize = 100;

/// Stable identifier of an episode, derived from its catalog number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeKey(u32);

impl EpisodeKey {
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.0)
    }
}

impl FromStr for EpisodeKey {
    type Err = std::num::ParseIntError;

    /// Accepts both `42` and `E0042`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches(['E', 'e']);
        digits.parse().map(Self)
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub number: u32,
    pub title: String,
    pub description: String,
    pub url: String,
}

impl Episode {
    pub fn key(&self) -> EpisodeKey {
        EpisodeKey(self.number)
    }

    /// Local file name: last path segment of the source URL
    pub fn file_name(&self) -> String {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        match path.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("episode-{:04}.mp3", self.number),
        }
    }
}

/// Ordered, immutable episode catalog
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    episodes: BTreeMap<EpisodeKey, Episode>,
}

impl Catalog {
    /// Read and parse a playlist file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::parse(&content);
        debug!("Loaded {} episodes from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Parse extended M3U text, skipping entries that do not parse
    pub fn parse(content: &str) -> Self {
        let mut episodes = BTreeMap::new();
        let mut pending: Option<(u32, String)> = None;
        let mut description: Option<String> = None;

        for (line_no, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line == "#EXTM3U" {
                continue;
            }

            if let Some(info) = line.strip_prefix("#EXTINF:") {
                pending = parse_extinf(info);
                description = None;
                if pending.is_none() {
                    warn!("Skipping unparseable catalog entry at line {}: {}", line_no + 1, line);
                }
            } else if let Some(desc) = line.strip_prefix("#EXTVLCOPT:description=") {
                description = Some(desc.trim().to_string());
            } else if line.starts_with('#') {
                continue;
            } else if let Some((number, title)) = pending.take() {
                let episode = Episode {
                    number,
                    title,
                    description: description.take().unwrap_or_else(|| line.to_string()),
                    url: line.to_string(),
                };
                if episodes.insert(episode.key(), episode).is_some() {
                    warn!("Duplicate catalog entry for episode {}, keeping the later one", number);
                }
            }
        }

        Self { episodes }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn get(&self, key: EpisodeKey) -> Option<&Episode> {
        self.episodes.get(&key)
    }

    pub fn contains(&self, key: EpisodeKey) -> bool {
        self.episodes.contains_key(&key)
    }

    /// Remote URL of an episode's source file
    pub fn episode_source_url(&self, key: EpisodeKey) -> Option<&str> {
        self.get(key).map(|e| e.url.as_str())
    }

    /// The episode that follows `key`, if the catalog has it
    pub fn next_key(&self, key: EpisodeKey) -> Option<EpisodeKey> {
        let next = EpisodeKey(key.0.checked_add(1)?);
        self.contains(next).then_some(next)
    }

    /// The episode before `key`, clamped at episode 1
    pub fn previous_key(&self, key: EpisodeKey) -> Option<EpisodeKey> {
        let prev = EpisodeKey(key.0.saturating_sub(1).max(1));
        self.contains(prev).then_some(prev)
    }

    /// One page of episodes in catalog order (`page` is 1-based)
    pub fn list(&self, page: usize, per_page: usize) -> Vec<&Episode> {
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        let start = page.max(1).saturating_sub(1).saturating_mul(per_page);
        self.episodes.values().skip(start).take(per_page).collect()
    }
}

/// Parse the part after `#EXTINF:` into (number, title)
///
/// `-1, 12 - Episode #12 | 18 Nov 2005 | Unplug & Disconnect`
fn parse_extinf(info: &str) -> Option<(u32, String)> {
    let (_duration, text) = info.split_once(',')?;
    let mut parts = text.split('|').map(str::trim);
    let head = parts.next()?;

    let (number, rest) = match head.split_once('-') {
        Some((n, rest)) => (n.trim(), rest.trim()),
        None => (head, ""),
    };
    let number: u32 = number.trim_start_matches("Episode").trim().parse().ok()?;

    let title = parts
        .filter(|p| !p.is_empty())
        .last()
        .unwrap_or(rest)
        .to_string();

    Some((number, title))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#EXTM3U
#EXTINF:-1, 1 - Episode #1 | 19 Aug 2005 | As the Worm Turns
#EXTVLCOPT:description=The first Internet worms of 2005
https://twit.cachefly.net/audio/sn/sn0001/sn0001.mp3
#EXTINF:-1, 2 - Episode #2 | 25 Aug 2005 | HoneyMonkeys
https://twit.cachefly.net/audio/sn/sn0002/sn0002.mp3
#EXTINF:-1, garbage line without a number
https://example.com/ignored.mp3
#EXTINF:-1, Episode 4
https://twit.cachefly.net/audio/sn/sn0004/sn0004.mp3?src=feed
";

    #[test]
    fn test_parse_entries() {
        let catalog = Catalog::parse(SAMPLE);
        assert_eq!(catalog.len(), 3);

        let first = catalog.get(EpisodeKey::new(1)).unwrap();
        assert_eq!(first.title, "As the Worm Turns");
        assert_eq!(first.description, "The first Internet worms of 2005");
        assert_eq!(first.file_name(), "sn0001.mp3");

        // No description line: the URL stands in
        let second = catalog.get(EpisodeKey::new(2)).unwrap();
        assert_eq!(second.description, second.url);
    }

    #[test]
    fn test_generated_short_form() {
        let catalog = Catalog::parse(SAMPLE);
        let ep = catalog.get(EpisodeKey::new(4)).unwrap();
        assert_eq!(ep.file_name(), "sn0004.mp3");
    }

    #[test]
    fn test_next_and_previous() {
        let catalog = Catalog::parse(SAMPLE);
        assert_eq!(catalog.next_key(EpisodeKey::new(1)), Some(EpisodeKey::new(2)));
        assert_eq!(catalog.next_key(EpisodeKey::new(2)), None);
        assert_eq!(catalog.next_key(EpisodeKey::new(4)), None);
        assert_eq!(catalog.previous_key(EpisodeKey::new(2)), Some(EpisodeKey::new(1)));
        assert_eq!(catalog.previous_key(EpisodeKey::new(1)), Some(EpisodeKey::new(1)));
    }

    #[test]
    fn test_pagination() {
        let mut text = String::from("#EXTM3U\n");
        for n in 1..=25 {
            text.push_str(&format!("#EXTINF:-1, {n} - Episode #{n} | date | Title {n}\n"));
            text.push_str(&format!("https://host/sn{n:04}.mp3\n"));
        }
        let catalog = Catalog::parse(&text);

        let page = catalog.list(3, 10);
        let numbers: Vec<u32> = page.iter().map(|e| e.number).collect();
        assert_eq!(numbers, (21..=25).collect::<Vec<_>>());

        assert!(catalog.list(4, 10).is_empty());
        assert_eq!(catalog.list(0, 10)[0].number, 1);
        assert_eq!(catalog.list(1, 1000).len(), 25);
    }

    #[test]
    fn test_key_display_and_parse() {
        let key = EpisodeKey::new(7);
        assert_eq!(key.to_string(), "E0007");
        assert_eq!("E0007".parse::<EpisodeKey>().unwrap(), key);
        assert_eq!("7".parse::<EpisodeKey>().unwrap(), key);
        assert!("seven".parse::<EpisodeKey>().is_err());
    }
}
