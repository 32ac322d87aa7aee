use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::protocol::Answer;

/// Snapshot of what the player last reported plus local playback state.
///
/// `values` holds the raw protocol answers keyed by lower-cased key.
/// `paused` is the last toggle issued by this server (`None` before any
/// playback); it is optimistic and never confirmed by the player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStatus {
    values: BTreeMap<String, String>,
    paused: Option<bool>,
    playing_path: Vec<String>,
}

impl PlaybackStatus {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn paused(&self) -> Option<bool> {
        self.paused
    }

    /// Kind followed by the folder segments of the current play request
    pub fn playing_path(&self) -> &[String] {
        &self.playing_path
    }
}

/// Answer keys are flattened next to the derived fields, and the derived
/// fields win when a key collides. A player answer named `paused` is
/// therefore never visible in the JSON; `paused` always reports the local
/// toggle state.
impl Serialize for PlaybackStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let answers = self
            .values
            .iter()
            .filter(|(key, _)| key.as_str() != "paused" && key.as_str() != "playing_path");

        let mut map = serializer.serialize_map(None)?;
        for (key, value) in answers {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("paused", &self.paused)?;
        map.serialize_entry("playing_path", &self.playing_path)?;
        map.end()
    }
}

/// Shared holder for the current [`PlaybackStatus`].
///
/// Writers are the channel reader and the supervisor; readers take a copy
/// and hold no lock afterwards.
#[derive(Debug, Default)]
pub struct StatusBoard {
    status: RwLock<PlaybackStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PlaybackStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_paused(&self) -> bool {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .paused
            .unwrap_or(false)
    }

    pub fn apply_answer(&self, answer: Answer) {
        self.update(|status| {
            status.values.insert(answer.key, answer.value);
        });
    }

    /// Reset for a new play request: unpaused, new path, previous answers dropped
    pub fn begin_playback(&self, playing_path: Vec<String>) {
        self.update(|status| {
            status.values.clear();
            status.paused = Some(false);
            status.playing_path = playing_path;
        });
    }

    /// Flip the local paused flag and return the new value
    pub fn toggle_paused(&self) -> bool {
        let mut paused = false;
        self.update(|status| {
            paused = !status.paused.unwrap_or(false);
            status.paused = Some(paused);
        });
        paused
    }

    pub fn reset(&self) {
        self.update(|status| *status = PlaybackStatus::default());
    }

    fn update<F: FnOnce(&mut PlaybackStatus)>(&self, f: F) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }
}
