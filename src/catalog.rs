//! Command catalog and matcher
//!
//! The catalog is the fixed, ordered list of recognized command phrases
//! with their canonical responses. Matching is first-match-wins in
//! declaration order, so entry order is significant.

use serde::{Deserialize, Serialize};

/// Category tag for a recognized command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    Navigation,
    Climate,
    Music,
    Security,
    System,
}

impl std::fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandCategory::Navigation => write!(f, "navigation"),
            CommandCategory::Climate => write!(f, "climate"),
            CommandCategory::Music => write!(f, "music"),
            CommandCategory::Security => write!(f, "security"),
            CommandCategory::System => write!(f, "system"),
        }
    }
}

/// A single recognized command pattern with its canonical response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    /// Phrase matched as a substring of the normalized utterance.
    pub pattern: String,
    /// Category tag.
    pub category: CommandCategory,
    /// Canonical spoken/displayed reply.
    pub response: String,
}

impl CommandDefinition {
    fn new(pattern: &str, category: CommandCategory, response: &str) -> Self {
        Self {
            pattern: pattern.to_owned(),
            category,
            response: response.to_owned(),
        }
    }
}

/// Ordered, immutable set of command definitions.
///
/// Loaded once at startup and only read afterwards, so it is safe to
/// share behind an `Arc` across tasks.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CommandDefinition>,
}

impl Catalog {
    /// Build a catalog from an ordered list of definitions.
    pub fn new(entries: Vec<CommandDefinition>) -> Self {
        Self { entries }
    }

    /// The built-in vehicle command set.
    pub fn built_in() -> Self {
        use CommandCategory::*;
        Self::new(vec![
            CommandDefinition::new("play my playlist", Music, "Playing Mamushi"),
            CommandDefinition::new("pause music", Music, "Music paused"),
            CommandDefinition::new("navigate to home", Navigation, "Setting route to Home"),
            CommandDefinition::new(
                "set temperature to 22 degrees",
                Climate,
                "Adjusting temperature to 22°C",
            ),
            CommandDefinition::new("turn on ac", Climate, "AC activated"),
            CommandDefinition::new("turn off ac", Climate, "AC deactivated"),
            CommandDefinition::new("lock the car", Security, "Vehicle locked"),
            CommandDefinition::new("unlock the car", Security, "Vehicle unlocked"),
        ])
    }

    /// Resolve free-text input to the first matching catalog entry.
    ///
    /// The input is lowercased and trimmed, then each pattern is tested
    /// (lowercased) as a substring, in declaration order. Ties go to the
    /// earliest entry, never to the longest match. A miss is `None`, not
    /// an error.
    pub fn find_match(&self, input: &str) -> Option<&CommandDefinition> {
        let normalized = input.trim().to_lowercase();
        self.entries
            .iter()
            .find(|def| normalized.contains(&def.pattern.to_lowercase()))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::built_in()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_phrase_matches() {
        let catalog = Catalog::built_in();
        let def = catalog.find_match("lock the car").unwrap();
        assert_eq!(def.pattern, "lock the car");
        assert_eq!(def.response, "Vehicle locked");
        assert_eq!(def.category, CommandCategory::Security);
    }

    #[test]
    fn test_normalization_case_and_whitespace() {
        let catalog = Catalog::built_in();
        let def = catalog.find_match("  Turn ON AC please  ").unwrap();
        assert_eq!(def.pattern, "turn on ac");
    }

    #[test]
    fn test_substring_inside_longer_utterance() {
        let catalog = Catalog::built_in();
        let def = catalog.find_match("could you navigate to home now").unwrap();
        assert_eq!(def.category, CommandCategory::Navigation);
    }

    #[test]
    fn test_no_match_returns_none() {
        let catalog = Catalog::built_in();
        assert!(catalog.find_match("gibberish xyz").is_none());
        assert!(catalog.find_match("").is_none());
    }

    #[test]
    fn test_first_match_wins_over_later_entries() {
        use CommandCategory::*;
        let catalog = Catalog::new(vec![
            CommandDefinition::new("ac", Climate, "first"),
            CommandDefinition::new("turn on ac", Climate, "second"),
        ]);
        // Both patterns are substrings; declaration order decides, not
        // match length.
        let def = catalog.find_match("turn on ac").unwrap();
        assert_eq!(def.response, "first");
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let catalog = Catalog::built_in();
        let a = catalog.find_match("pause music").unwrap().clone();
        let b = catalog.find_match("pause music").unwrap().clone();
        assert_eq!(a, b);
    }
}
