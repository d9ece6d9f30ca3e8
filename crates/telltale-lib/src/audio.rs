//! Audio channel capability: the backend trait and a simulated backend.
//!
//! The engine never decodes or mixes audio. It asks a backend to start an
//! asset on a channel, gets a [`PlaybackId`] back, and later receives a
//! completion notification for that id. Completions for ids the engine no
//! longer tracks are ignored, so a backend may report them late.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::events::Channel;

#[derive(Debug)]
pub enum AudioError {
    /// The asset does not exist or cannot be opened.
    AssetMissing(String),
    /// Any other backend failure.
    PlaybackFailed(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::AssetMissing(a) => write!(f, "Audio asset not found: {a}"),
            AudioError::PlaybackFailed(e) => write!(f, "Audio playback failed: {e}"),
        }
    }
}

impl std::error::Error for AudioError {}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Identity of one started playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arguments of a play call.
#[derive(Debug, Clone, Copy)]
pub struct PlayRequest<'a> {
    pub channel: Channel,
    pub asset: &'a str,
    pub volume: u8,
    /// Engine clock at the time of the call.
    pub at_ms: u64,
}

/// Plays chime assets on the normal or parallel channel.
pub trait AudioBackend {
    fn play(&mut self, request: PlayRequest<'_>) -> Result<PlaybackId>;
    /// Halt a playback. Unknown or finished ids are ignored.
    fn stop(&mut self, id: PlaybackId);
}

/// Backend that "plays" for a fixed clip length and reports completions
/// through [`SimulatedAudio::take_finished`].
///
/// When `assets_dir` is set, assets that do not exist there are reported as
/// missing; otherwise every asset is considered available.
#[derive(Debug)]
pub struct SimulatedAudio {
    assets_dir: Option<PathBuf>,
    clip_ms: u64,
    clip_overrides: HashMap<String, u64>,
    next_id: u64,
    playing: BTreeMap<PlaybackId, u64>,
}

impl SimulatedAudio {
    pub fn new(clip_ms: u64) -> Self {
        Self {
            assets_dir: None,
            clip_ms: clip_ms.max(1),
            clip_overrides: HashMap::new(),
            next_id: 1,
            playing: BTreeMap::new(),
        }
    }

    /// Resolve assets against a directory.
    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }

    /// Use a specific clip length for one asset.
    pub fn with_clip(mut self, asset: &str, clip_ms: u64) -> Self {
        self.clip_overrides.insert(asset.to_string(), clip_ms.max(1));
        self
    }

    fn clip_for(&self, asset: &str) -> u64 {
        self.clip_overrides
            .get(asset)
            .copied()
            .unwrap_or(self.clip_ms)
    }

    /// Whether `asset` resolves to an existing file (always true without a directory).
    pub fn asset_exists(&self, asset: &str) -> bool {
        match self.assets_dir {
            Some(ref dir) => dir.join(asset).is_file(),
            None => true,
        }
    }

    /// Earliest time a playback finishes.
    pub fn next_completion(&self) -> Option<u64> {
        self.playing.values().min().copied()
    }

    /// Remove and return playbacks finished at or before `until`, in finish order.
    pub fn take_finished(&mut self, until: u64) -> Vec<PlaybackId> {
        let mut done: Vec<(u64, PlaybackId)> = self
            .playing
            .iter()
            .filter(|&(_, &end)| end <= until)
            .map(|(&id, &end)| (end, id))
            .collect();
        done.sort();
        for (_, id) in &done {
            self.playing.remove(id);
        }
        done.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of playbacks in progress.
    pub fn active(&self) -> usize {
        self.playing.len()
    }
}

impl AudioBackend for SimulatedAudio {
    fn play(&mut self, request: PlayRequest<'_>) -> Result<PlaybackId> {
        if !self.asset_exists(request.asset) {
            return Err(AudioError::AssetMissing(request.asset.to_string()));
        }
        let id = PlaybackId(self.next_id);
        self.next_id += 1;
        let ends = request.at_ms.saturating_add(self.clip_for(request.asset));
        self.playing.insert(id, ends);
        Ok(id)
    }

    fn stop(&mut self, id: PlaybackId) {
        self.playing.remove(&id);
    }
}

/// Recording backend for tests. Completion is delivered by the test through
/// `Orchestrator::playback_finished`.
pub mod mock {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Clone, PartialEq)]
    pub struct PlayCall {
        pub id: PlaybackId,
        pub channel: Channel,
        pub asset: String,
        pub volume: u8,
        pub at_ms: u64,
    }

    #[derive(Debug, Default)]
    pub struct MockAudio {
        /// Successful play calls, in order.
        pub plays: Vec<PlayCall>,
        /// Stop calls, in order.
        pub stops: Vec<PlaybackId>,
        /// Assets that fail with `AssetMissing`.
        pub missing: HashSet<String>,
        next_id: u64,
    }

    impl MockAudio {
        pub fn new() -> Self {
            Self::default()
        }

        /// Mark an asset as missing.
        pub fn with_missing(mut self, asset: &str) -> Self {
            self.missing.insert(asset.to_string());
            self
        }

        /// Most recent play call.
        pub fn last_play(&self) -> Option<&PlayCall> {
            self.plays.last()
        }

        /// Play calls for one asset.
        pub fn plays_of(&self, asset: &str) -> Vec<&PlayCall> {
            self.plays.iter().filter(|p| p.asset == asset).collect()
        }
    }

    impl AudioBackend for MockAudio {
        fn play(&mut self, request: PlayRequest<'_>) -> Result<PlaybackId> {
            if self.missing.contains(request.asset) {
                return Err(AudioError::AssetMissing(request.asset.to_string()));
            }
            self.next_id += 1;
            let id = PlaybackId(self.next_id);
            self.plays.push(PlayCall {
                id,
                channel: request.channel,
                asset: request.asset.to_string(),
                volume: request.volume,
                at_ms: request.at_ms,
            });
            Ok(id)
        }

        fn stop(&mut self, id: PlaybackId) {
            self.stops.push(id);
        }
    }
}
