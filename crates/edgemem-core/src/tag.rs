//! Allocation categories used for statistics bucketing.

use std::fmt;

/// Category attached to an allocation for statistics bucketing.
///
/// Tags never change allocation behaviour; they only select which row of
/// a per-tag stats table an allocation is counted against. The set is
/// closed: adding a tag means recompiling, and [`MemoryTag::COUNT`] sizes
/// every per-tag table in the workspace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MemoryTag {
    /// Untagged allocations.
    #[default]
    NoTag = 0,
    /// In-bounds level geometry and state.
    Foreground,
    /// Out-of-bounds scenery.
    Background,
    /// Interior spaces.
    Interior,
    /// General animation data.
    Animation,
    /// Locomotion animation sets.
    AnimationLocomotion,
    /// Motion-matching databases.
    AnimationMotionMatching,
    /// Particle systems.
    Particles,
    /// Props, characters and other placed actors.
    Actors,
    /// Global audio state.
    AudioGlobal,
    /// Sound effects.
    AudioSfx,
    /// Music streams.
    AudioMusic,
    /// Dialogue.
    AudioSpeech,
    /// Non-dialogue character vocalisations.
    AudioVox,
    /// Global AI state.
    Ai,
    /// AI tasks.
    AiTask,
    /// AI decision making.
    AiBrain,
    /// Frontend and HUD.
    Gui,
    /// Physics simulation.
    Physics,
    /// Cinematics.
    Cinematic,
    /// Lighting.
    Lighting,
    /// Gameplay systems.
    Gameplay,
    /// Scripting runtime.
    Script,
    /// Networking.
    Net,
    /// Debug-only data.
    Debug,
    /// Short-lived scratch data.
    Temp,
}

impl MemoryTag {
    /// Number of tags, and therefore the length of every per-tag table.
    pub const COUNT: usize = 26;

    /// Every tag in index order.
    pub const ALL: [MemoryTag; Self::COUNT] = [
        Self::NoTag,
        Self::Foreground,
        Self::Background,
        Self::Interior,
        Self::Animation,
        Self::AnimationLocomotion,
        Self::AnimationMotionMatching,
        Self::Particles,
        Self::Actors,
        Self::AudioGlobal,
        Self::AudioSfx,
        Self::AudioMusic,
        Self::AudioSpeech,
        Self::AudioVox,
        Self::Ai,
        Self::AiTask,
        Self::AiBrain,
        Self::Gui,
        Self::Physics,
        Self::Cinematic,
        Self::Lighting,
        Self::Gameplay,
        Self::Script,
        Self::Net,
        Self::Debug,
        Self::Temp,
    ];

    /// Row of this tag in a per-tag table.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`index`](Self::index). Returns `None` past the last tag.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Human-readable tag name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoTag => "NoTag",
            Self::Foreground => "Foreground",
            Self::Background => "Background",
            Self::Interior => "Interior",
            Self::Animation => "Animation",
            Self::AnimationLocomotion => "AnimationLocomotion",
            Self::AnimationMotionMatching => "AnimationMotionMatching",
            Self::Particles => "Particles",
            Self::Actors => "Actors",
            Self::AudioGlobal => "AudioGlobal",
            Self::AudioSfx => "AudioSFX",
            Self::AudioMusic => "AudioMusic",
            Self::AudioSpeech => "AudioSpeech",
            Self::AudioVox => "AudioVox",
            Self::Ai => "AI",
            Self::AiTask => "AITask",
            Self::AiBrain => "AIBrain",
            Self::Gui => "GUI",
            Self::Physics => "Physics",
            Self::Cinematic => "Cinematic",
            Self::Lighting => "Lighting",
            Self::Gameplay => "Gameplay",
            Self::Script => "Script",
            Self::Net => "Net",
            Self::Debug => "Debug",
            Self::Temp => "Temp",
        }
    }
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
