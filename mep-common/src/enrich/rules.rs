//! Enrichment rule table
//!
//! Rules are plain data evaluated in priority order: known-artist rules,
//! then genre rules, then the fallback bundle. The built-in table can be
//! replaced by a TOML file with the same shape:
//!
//! ```toml
//! [[artists]]
//! name = "Eagles"
//! artist_keywords = ["eagles"]
//! title_keywords = ["hotel california"]
//! mood = "Melancholic, atmospheric, and introspective"
//! genres = ["classic_rock", "soft_rock", "country_rock"]
//! context = "Evening relaxation or road trip vibes"
//! similar_tracks = ["Take It Easy", "Desperado"]
//!
//! [[genres]]
//! name = "rock"
//! keywords = ["rock"]
//! mood = "Energetic, powerful, and dynamic"
//! genres = ["classic_rock", "hard_rock", "progressive_rock"]
//! context = "High-energy activities or driving"
//! similar_tracks = ["Classic Rock Track 1"]
//!
//! [fallback]
//! mood = "Versatile and engaging"
//! context = "Casual listening during daily activities"
//! similar_tracks = ["Similar Track 1"]
//! genre_suffix = ["alternative", "indie"]
//! unknown_genres = ["alternative", "indie", "pop"]
//! ```

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Text/metadata produced when a rule matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBundle {
    pub mood: String,
    pub genres: Vec<String>,
    pub context: String,
    pub similar_tracks: Vec<String>,
}

/// Known-artist rule: artist-name substring, or one of the artist's signature titles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRule {
    pub name: String,
    pub artist_keywords: Vec<String>,
    #[serde(default)]
    pub title_keywords: Vec<String>,
    #[serde(flatten)]
    pub bundle: RuleBundle,
}

impl ArtistRule {
    /// Both inputs must already be lower-cased
    pub fn matches(&self, artist_lower: &str, title_lower: &str) -> bool {
        (!artist_lower.is_empty() && self.artist_keywords.iter().any(|k| artist_lower.contains(k.as_str())))
            || (!title_lower.is_empty() && self.title_keywords.iter().any(|k| title_lower.contains(k.as_str())))
    }
}

/// Genre rule: substring of the event's genre text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreRule {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(flatten)]
    pub bundle: RuleBundle,
}

impl GenreRule {
    pub fn matches(&self, genre_text_lower: &str) -> bool {
        !genre_text_lower.is_empty() && self.keywords.iter().any(|k| genre_text_lower.contains(k.as_str()))
    }
}

/// Bundle used when nothing matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackBundle {
    pub mood: String,
    pub context: String,
    pub similar_tracks: Vec<String>,
    /// Appended after the event's own primary genre
    pub genre_suffix: Vec<String>,
    /// Used when the event carries no genre at all
    pub unknown_genres: Vec<String>,
}

/// Ordered rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    pub artists: Vec<ArtistRule>,
    #[serde(default)]
    pub genres: Vec<GenreRule>,
    pub fallback: FallbackBundle,
}

impl RuleTable {
    /// Parse a rule table from TOML; keywords are lower-cased and validated
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: RuleTable = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse rule table failed: {}", e)))?;
        table.normalized()
    }

    /// Load a rule table from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn normalized(mut self) -> Result<Self> {
        for rule in &mut self.artists {
            lowercase_all(&mut rule.artist_keywords);
            lowercase_all(&mut rule.title_keywords);
            if rule.artist_keywords.is_empty() && rule.title_keywords.is_empty() {
                return Err(Error::Config(format!("Artist rule `{}` has no keywords", rule.name)));
            }
        }
        for rule in &mut self.genres {
            lowercase_all(&mut rule.keywords);
            if rule.keywords.is_empty() {
                return Err(Error::Config(format!("Genre rule `{}` has no keywords", rule.name)));
            }
        }
        Ok(self)
    }

    /// Built-in table
    pub fn builtin() -> Self {
        RuleTable {
            artists: builtin_artists(),
            genres: builtin_genres(),
            fallback: FallbackBundle {
                mood: "Versatile and engaging".to_string(),
                context: "Casual listening during daily activities".to_string(),
                similar_tracks: strings(&["Similar Track 1", "Similar Track 2", "Similar Track 3"]),
                genre_suffix: strings(&["alternative", "indie"]),
                unknown_genres: strings(&["alternative", "indie", "pop"]),
            },
        }
    }

    /// True when `artist_name` hits one of the known-artist keywords
    pub fn is_known_artist(&self, artist_name: &str) -> bool {
        let lower = artist_name.to_lowercase();
        self.artists.iter().any(|r| r.matches(&lower, ""))
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn lowercase_all(keywords: &mut Vec<String>) {
    keywords.retain(|k| !k.trim().is_empty());
    for k in keywords.iter_mut() {
        *k = k.trim().to_lowercase();
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn artist(
    name: &str,
    artist_keywords: &[&str],
    title_keywords: &[&str],
    mood: &str,
    genres: &[&str],
    context: &str,
    similar_tracks: &[&str],
) -> ArtistRule {
    ArtistRule {
        name: name.to_string(),
        artist_keywords: strings(artist_keywords),
        title_keywords: strings(title_keywords),
        bundle: RuleBundle {
            mood: mood.to_string(),
            genres: strings(genres),
            context: context.to_string(),
            similar_tracks: strings(similar_tracks),
        },
    }
}

fn genre(name: &str, keywords: &[&str], mood: &str, genres: &[&str], context: &str, similar_tracks: &[&str]) -> GenreRule {
    GenreRule {
        name: name.to_string(),
        keywords: strings(keywords),
        bundle: RuleBundle {
            mood: mood.to_string(),
            genres: strings(genres),
            context: context.to_string(),
            similar_tracks: strings(similar_tracks),
        },
    }
}

fn builtin_artists() -> Vec<ArtistRule> {
    vec![
        artist(
            "Eagles",
            &["eagles"],
            &["hotel california"],
            "Melancholic, atmospheric, and introspective",
            &["classic_rock", "soft_rock", "country_rock"],
            "Evening relaxation or road trip vibes",
            &["Take It Easy", "Desperado", "One of These Nights", "Lyin' Eyes", "New Kid in Town"],
        ),
        artist(
            "Queen",
            &["queen"],
            &["bohemian rhapsody"],
            "Dramatic, theatrical, and emotionally powerful",
            &["progressive_rock", "hard_rock", "art_rock"],
            "Party atmosphere or dramatic listening",
            &["We Will Rock You", "Another One Bites the Dust", "Somebody to Love", "Killer Queen", "Don't Stop Me Now"],
        ),
        artist(
            "Led Zeppelin",
            &["led zeppelin"],
            &["stairway to heaven"],
            "Epic, mystical, and transcendent",
            &["hard_rock", "progressive_rock", "blues_rock"],
            "Deep listening or spiritual experience",
            &["Whole Lotta Love", "Black Dog", "Kashmir", "Rock and Roll", "Immigrant Song"],
        ),
        artist(
            "Guns N' Roses",
            &["guns"],
            &["sweet child"],
            "Energetic, passionate, and anthemic",
            &["hard_rock", "glam_metal", "classic_rock"],
            "High-energy activities or driving",
            &["November Rain", "Paradise City", "Welcome to the Jungle", "Patience", "Estranged"],
        ),
        artist(
            "Michael Jackson",
            &["michael jackson"],
            &["billie jean"],
            "Groovy, infectious, and danceable",
            &["pop", "dance_pop", "funk"],
            "Dancing or party atmosphere",
            &["Beat It", "Thriller", "Smooth Criminal", "Man in the Mirror", "Billie Jean"],
        ),
        artist(
            "John Lennon",
            &["john lennon"],
            &["imagine"],
            "Peaceful, idealistic, and inspiring",
            &["pop", "soft_rock", "protest_song"],
            "Meditation or peaceful reflection",
            &["Give Peace a Chance", "Working Class Hero", "Instant Karma", "Imagine", "Jealous Guy"],
        ),
        artist(
            "Nirvana",
            &["nirvana"],
            &["smells like teen spirit"],
            "Raw, rebellious, and angst-filled",
            &["grunge", "alternative_rock", "punk_rock"],
            "High-energy activities or teenage rebellion",
            &["Come As You Are", "Lithium", "In Bloom", "About a Girl", "All Apologies"],
        ),
        artist(
            "Stevie Wonder",
            &["stevie wonder"],
            &["superstition"],
            "Funky, soulful, and groove-heavy",
            &["funk", "soul", "r&b"],
            "Dancing or funky vibes",
            &["Higher Ground", "Living for the City", "Sir Duke", "Superstition", "Isn't She Lovely"],
        ),
        artist(
            "Aretha Franklin",
            &["aretha franklin"],
            &["respect"],
            "Empowering, soulful, and confident",
            &["soul", "r&b", "gospel"],
            "Empowerment or confidence boost",
            &["Think", "Natural Woman", "Chain of Fools", "Respect", "I Say a Little Prayer"],
        ),
        artist(
            "Jimi Hendrix",
            &["jimi hendrix"],
            &["purple haze"],
            "Psychedelic, experimental, and mind-bending",
            &["psychedelic_rock", "hard_rock", "blues_rock"],
            "Psychedelic experience or experimental listening",
            &["All Along the Watchtower", "Voodoo Child", "Foxy Lady", "Purple Haze", "Hey Joe"],
        ),
        artist(
            "The Beach Boys",
            &["beach boys"],
            &["good vibrations"],
            "Harmonious, sunny, and feel-good",
            &["pop", "surf_rock", "baroque_pop"],
            "Summer vibes or feel-good moments",
            &["God Only Knows", "Wouldn't It Be Nice", "California Girls", "Good Vibrations", "Surfin' USA"],
        ),
        artist(
            "Marvin Gaye",
            &["marvin gaye"],
            &["what's going on"],
            "Smooth, socially conscious, and soulful",
            &["soul", "r&b", "protest_song"],
            "Reflective listening or social awareness",
            &["Mercy Mercy Me", "Inner City Blues", "Let's Get It On", "What's Going On", "Sexual Healing"],
        ),
        artist(
            "Chuck Berry",
            &["chuck berry"],
            &["johnny b. goode"],
            "Energetic, pioneering, and rock 'n' roll",
            &["rock_n_roll", "blues_rock", "classic_rock"],
            "Dancing or rock 'n' roll celebration",
            &["Maybellene", "Roll Over Beethoven", "Rock and Roll Music", "Johnny B. Goode", "Sweet Little Sixteen"],
        ),
        artist(
            "The Beatles",
            &["beatles"],
            &["i want to hold your hand"],
            "Infectious, youthful, and romantic",
            &["pop", "british_invasion", "rock_n_roll"],
            "Romantic moments or nostalgic listening",
            &["She Loves You", "A Hard Day's Night", "Help!", "I Want to Hold Your Hand", "Yesterday"],
        ),
        artist(
            "Bob Dylan",
            &["bob dylan"],
            &["like a rolling stone"],
            "Poetic, rebellious, and thought-provoking",
            &["folk_rock", "blues_rock", "protest_song"],
            "Reflective listening or cultural appreciation",
            &["Blowin' in the Wind", "The Times They Are A-Changin'", "Mr. Tambourine Man", "Like a Rolling Stone", "Knockin' on Heaven's Door"],
        ),
    ]
}

fn builtin_genres() -> Vec<GenreRule> {
    vec![
        genre(
            "rock",
            &["rock"],
            "Energetic, powerful, and dynamic",
            &["classic_rock", "hard_rock", "progressive_rock"],
            "High-energy activities or driving",
            &["Classic Rock Track 1", "Classic Rock Track 2", "Classic Rock Track 3"],
        ),
        genre(
            "pop",
            &["pop"],
            "Catchy, upbeat, and accessible",
            &["dance_pop", "synth_pop", "indie_pop"],
            "Casual listening or party atmosphere",
            &["Pop Hit 1", "Pop Hit 2", "Pop Hit 3"],
        ),
        genre(
            "soul",
            &["soul", "funk"],
            "Smooth, soulful, and groove-heavy",
            &["soul", "r&b", "funk"],
            "Dancing or soulful vibes",
            &["Soul Track 1", "Soul Track 2", "Soul Track 3"],
        ),
        genre(
            "folk",
            &["folk"],
            "Poetic, introspective, and authentic",
            &["folk_rock", "blues_rock", "protest_song"],
            "Reflective listening or cultural appreciation",
            &["Folk Song 1", "Folk Song 2", "Folk Song 3"],
        ),
        genre(
            "jazz",
            &["jazz"],
            "Smooth, sophisticated, and relaxing",
            &["jazz", "alternative", "indie"],
            "Casual listening during daily activities",
            &["Similar Track 1", "Similar Track 2", "Similar Track 3"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_has_fifteen_artists() {
        let table = RuleTable::builtin();
        assert_eq!(table.artists.len(), 15);
        assert_eq!(table.genres.len(), 5);
    }

    #[test]
    fn test_artist_rule_matches_name_or_signature_title() {
        let table = RuleTable::builtin();
        let eagles = &table.artists[0];
        assert!(eagles.matches("eagles", ""));
        assert!(eagles.matches("the eagles", "anything"));
        assert!(eagles.matches("some cover band", "hotel california (live)"));
        assert!(!eagles.matches("queen", "bohemian rhapsody"));
        assert!(!eagles.matches("", ""));
    }

    #[test]
    fn test_is_known_artist_is_case_insensitive() {
        let table = RuleTable::builtin();
        assert!(table.is_known_artist("Guns N' Roses"));
        assert!(table.is_known_artist("LED ZEPPELIN"));
        assert!(!table.is_known_artist("Unknown Artist"));
    }

    #[test]
    fn test_rule_table_from_toml() {
        let content = r#"
            [[artists]]
            name = "Daft Punk"
            artist_keywords = ["Daft Punk"]
            mood = "Robotic and euphoric"
            genres = ["french_house", "electronic"]
            context = "Dancing"
            similar_tracks = ["One More Time", "Around the World"]

            [[genres]]
            name = "electronic"
            keywords = ["electronic", "house"]
            mood = "Pulsing"
            genres = ["electronic"]
            context = "Working out"
            similar_tracks = ["Electronic Track 1"]

            [fallback]
            mood = "Unclassified"
            context = "Anywhere"
            similar_tracks = []
            genre_suffix = []
            unknown_genres = ["unknown"]
        "#;
        let table = RuleTable::from_toml_str(content).unwrap();
        assert_eq!(table.artists.len(), 1);
        // keywords are lower-cased on load
        assert_eq!(table.artists[0].artist_keywords, vec!["daft punk"]);
        assert!(table.artists[0].title_keywords.is_empty());
        assert_eq!(table.genres[0].bundle.mood, "Pulsing");
    }

    #[test]
    fn test_rule_without_keywords_rejected() {
        let content = r#"
            [[genres]]
            name = "empty"
            keywords = ["  "]
            mood = "m"
            genres = []
            context = "c"
            similar_tracks = []

            [fallback]
            mood = "m"
            context = "c"
            similar_tracks = []
            genre_suffix = []
            unknown_genres = []
        "#;
        let err = RuleTable::from_toml_str(content).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builtin_table_survives_toml_round_trip() {
        let table = RuleTable::builtin();
        let content = toml::to_string(&table).unwrap();
        assert_eq!(RuleTable::from_toml_str(&content).unwrap(), table);
    }
}
