use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::aggregate::character_averages;

/// Mean response time per character. A character with no samples is absent.
pub type CharacterAverage = BTreeMap<char, f64>;

/// Mean of per-record averages across a user's stored sessions.
pub type HistoricalAverage = BTreeMap<char, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Listen and transcribe
    #[default]
    Copy,
    /// Key the characters
    Send,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Copy => "copy",
            Mode::Send => "send",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "copy" => Some(Mode::Copy),
            "send" => Some(Mode::Send),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Blank identities count as "not signed in".
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One character attempt within a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseSample {
    #[serde(alias = "char")]
    pub character: char,
    #[serde(alias = "time")]
    pub elapsed_seconds: f64,
}

impl ResponseSample {
    pub fn new(character: char, elapsed_seconds: f64) -> Self {
        Self { character, elapsed_seconds }
    }
}

/// Mistake counts per character, kept in first-recorded order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MistakeTally {
    entries: Vec<(char, u32)>,
}

impl MistakeTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, character: char) {
        self.add(character, 1);
    }

    pub fn add(&mut self, character: char, count: u32) {
        match self.entries.iter_mut().find(|(c, _)| *c == character) {
            Some((_, n)) => *n = n.saturating_add(count),
            None => self.entries.push((character, count)),
        }
    }

    pub fn get(&self, character: char) -> u32 {
        self.entries
            .iter()
            .find(|(c, _)| *c == character)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, u32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(char, u32)> for MistakeTally {
    fn from_iter<I: IntoIterator<Item = (char, u32)>>(iter: I) -> Self {
        let mut tally = MistakeTally::new();
        for (c, n) in iter {
            tally.add(c, n);
        }
        tally
    }
}

impl Serialize for MistakeTally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (c, n) in &self.entries {
            map.serialize_entry(c, n)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MistakeTally {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TallyVisitor;

        impl<'de> Visitor<'de> for TallyVisitor {
            type Value = MistakeTally;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of single characters to mistake counts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut tally = MistakeTally::new();
                while let Some((c, n)) = access.next_entry::<char, u32>()? {
                    tally.add(c, n);
                }
                Ok(tally)
            }
        }

        deserializer.deserialize_map(TallyVisitor)
    }
}

/// Inputs handed to the results screen by the training controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInput {
    #[serde(default)]
    pub completed: bool,
    #[serde(default, alias = "elapsed_time")]
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub replay_count: u32,
    #[serde(default, alias = "mistakes_map")]
    pub mistakes: MistakeTally,
    #[serde(default, alias = "response_times")]
    pub samples: Vec<ResponseSample>,
    #[serde(alias = "level_id")]
    pub lesson_id: String,
    #[serde(default)]
    pub mode: Mode,
}

/// The one row written per completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub user_id: UserId,
    #[serde(rename = "level_id")]
    pub lesson_id: String,
    pub mode: Mode,
    #[serde(rename = "time_sec")]
    pub total_elapsed_seconds: f64,
    #[serde(rename = "tone_replays")]
    pub tone_replay_count: u32,
    pub mistakes: MistakeTally,
    pub times: CharacterAverage,
}

impl SessionResult {
    /// Averages are recomputed from the raw samples.
    pub fn from_session(user_id: UserId, input: &SessionInput) -> Self {
        Self {
            user_id,
            lesson_id: input.lesson_id.clone(),
            mode: input.mode,
            total_elapsed_seconds: input.elapsed_seconds,
            tone_replay_count: input.replay_count,
            mistakes: input.mistakes.clone(),
            times: character_averages(&input.samples),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryQuery {
    pub user_id: UserId,
    pub lesson_id: String,
    pub mode: Mode,
}

/// Per-character averages from one stored record. `None` when the row has no times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredTimes {
    pub times: Option<BTreeMap<char, f64>>,
}
