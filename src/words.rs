//! Word bank: categorized candidate words for rounds.

use std::io::Read;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

/// One category of candidate words.
#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub name: String,
    pub words: Vec<String>,
}

static DEFAULT_TABLE: Lazy<Vec<Category>> = Lazy::new(|| {
    let raw: &[(&str, &[&str])] = &[
        ("animals", &["elephant", "giraffe", "penguin", "crocodile", "hippopotamus", "chimpanzee", "rhinoceros", "flamingo"]),
        ("movies", &["inception", "interstellar", "gladiator", "terminator", "avengers", "jurassic", "titanic", "avatar"]),
        ("food", &["spaghetti", "quesadilla", "guacamole", "bruschetta", "prosciutto", "croissant", "tiramisu", "ceviche"]),
        ("tech", &["javascript", "algorithm", "database", "encryption", "framework", "bandwidth", "cryptocurrency", "interface"]),
        ("sports", &["basketball", "volleyball", "gymnastics", "wrestling", "badminton", "lacrosse", "snowboarding", "skateboarding"]),
        ("places", &["amsterdam", "barcelona", "singapore", "istanbul", "stockholm", "reykjavik", "melbourne", "nairobi"]),
        ("random", &["xylophone", "chameleon", "labyrinth", "phenomenon", "juxtapose", "kaleidoscope", "silhouette", "whimsical"]),
    ];
    raw.iter()
        .map(|(name, words)| Category {
            name: (*name).to_string(),
            words: words.iter().map(|w| (*w).to_string()).collect(),
        })
        .collect()
});

/// A word with its category label, as drawn for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub word: String,
    pub category: String,
}

/// Static table of candidate words, grouped by category.
///
/// The table is plain data: it can come from the built-in default set or be
/// loaded from a JSON file at startup.
#[derive(Debug, Clone)]
pub struct WordBank {
    categories: Vec<Category>,
}

impl Default for WordBank {
    fn default() -> Self {
        Self { categories: DEFAULT_TABLE.clone() }
    }
}

impl WordBank {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    /// Load a category table from JSON: `[{"name": ..., "words": [...]}, ...]`.
    pub fn from_json(reader: impl Read) -> anyhow::Result<Self> {
        let categories: Vec<Category> = serde_json::from_reader(reader)?;
        anyhow::ensure!(!categories.is_empty(), "word table has no categories");
        anyhow::ensure!(
            categories.iter().all(|c| !c.words.is_empty()),
            "word table has an empty category"
        );
        Ok(Self { categories })
    }

    /// Pick a category uniformly at random, then a word uniformly within it.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Draw {
        let cat = self.categories.choose(rng).expect("word bank is non-empty");
        let word = cat.words.choose(rng).expect("category is non-empty");
        Draw { word: word.clone(), category: cat.name.clone() }
    }
}
