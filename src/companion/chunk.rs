use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CompanionError;

/// Emotion vocabulary the model is instructed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmotionKind {
    Joy,
    Anticipation,
    Anger,
    Disgust,
    Sadness,
    Surprise,
    Fear,
    Trust,
}

impl EmotionKind {
    pub const ALL: [EmotionKind; 8] = [
        EmotionKind::Joy,
        EmotionKind::Anticipation,
        EmotionKind::Anger,
        EmotionKind::Disgust,
        EmotionKind::Sadness,
        EmotionKind::Surprise,
        EmotionKind::Fear,
        EmotionKind::Trust,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joy => "Joy",
            Self::Anticipation => "Anticipation",
            Self::Anger => "Anger",
            Self::Disgust => "Disgust",
            Self::Sadness => "Sadness",
            Self::Surprise => "Surprise",
            Self::Fear => "Fear",
            Self::Trust => "Trust",
        }
    }
}

impl FromStr for EmotionKind {
    type Err = CompanionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| CompanionError::UnknownEmotion(raw.to_string()))
    }
}

impl fmt::Display for EmotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Character state vocabulary. Carries no intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    Serenity,
    Interest,
    Annoyance,
    Boredom,
    Pensiveness,
    Anxiety,
    Morbidness,
    Ecstasy,
    Curiosity,
    Distraction,
}

impl StateKind {
    pub const ALL: [StateKind; 10] = [
        StateKind::Serenity,
        StateKind::Interest,
        StateKind::Annoyance,
        StateKind::Boredom,
        StateKind::Pensiveness,
        StateKind::Anxiety,
        StateKind::Morbidness,
        StateKind::Ecstasy,
        StateKind::Curiosity,
        StateKind::Distraction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serenity => "Serenity",
            Self::Interest => "Interest",
            Self::Annoyance => "Annoyance",
            Self::Boredom => "Boredom",
            Self::Pensiveness => "Pensiveness",
            Self::Anxiety => "Anxiety",
            Self::Morbidness => "Morbidness",
            Self::Ecstasy => "Ecstasy",
            Self::Curiosity => "Curiosity",
            Self::Distraction => "Distraction",
        }
    }
}

impl FromStr for StateKind {
    type Err = CompanionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| CompanionError::UnknownState(raw.to_string()))
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw `{type, intensity}` shape as it appears on the wire and on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEmotion {
    #[serde(rename = "type")]
    kind: String,
    intensity: f64,
}

/// Tagged emotion with an intensity that always lies in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEmotion", into = "RawEmotion")]
pub struct Emotion {
    kind: EmotionKind,
    intensity: f64,
}

impl Emotion {
    pub fn new(kind: EmotionKind, intensity: f64) -> Result<Self, CompanionError> {
        if !(0.0..=1.0).contains(&intensity) {
            return Err(CompanionError::IntensityOutOfRange(intensity));
        }
        Ok(Self { kind, intensity })
    }

    pub fn kind(&self) -> EmotionKind {
        self.kind
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }
}

impl TryFrom<RawEmotion> for Emotion {
    type Error = CompanionError;

    fn try_from(raw: RawEmotion) -> Result<Self, Self::Error> {
        Emotion::new(raw.kind.parse()?, raw.intensity)
    }
}

impl From<Emotion> for RawEmotion {
    fn from(emotion: Emotion) -> Self {
        RawEmotion {
            kind: emotion.kind.as_str().to_string(),
            intensity: emotion.intensity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawState {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawState", into = "RawState")]
pub struct State {
    kind: StateKind,
}

impl State {
    pub fn new(kind: StateKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }
}

impl TryFrom<RawState> for State {
    type Error = CompanionError;

    fn try_from(raw: RawState) -> Result<Self, Self::Error> {
        Ok(State::new(raw.kind.parse()?))
    }
}

impl From<State> for RawState {
    fn from(state: State) -> Self {
        RawState {
            kind: state.kind.as_str().to_string(),
        }
    }
}

/// One structured fragment of an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub index: u64,
    pub text: String,
    pub emotion: Option<Emotion>,
    pub state: Option<State>,
}

/// Chunk object as emitted by the model. Every field is optional on the wire;
/// tag and intensity validation happens while deserializing the nested types.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireChunk {
    #[serde(default)]
    chunk_index: Option<u64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    emotion: Option<Emotion>,
    #[serde(default)]
    state: Option<State>,
}

impl WireChunk {
    pub(crate) fn into_record(self, default_index: u64) -> ChunkRecord {
        ChunkRecord {
            index: self.chunk_index.unwrap_or(default_index),
            text: self.text.unwrap_or_default(),
            emotion: self.emotion,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emotion_intensity_bounds_are_inclusive() {
        assert!(Emotion::new(EmotionKind::Joy, 0.0).is_ok());
        assert!(Emotion::new(EmotionKind::Joy, 1.0).is_ok());
        assert!(matches!(
            Emotion::new(EmotionKind::Joy, 1.5),
            Err(CompanionError::IntensityOutOfRange(_))
        ));
        assert!(Emotion::new(EmotionKind::Joy, -0.1).is_err());
        assert!(Emotion::new(EmotionKind::Joy, f64::NAN).is_err());
    }

    #[test]
    fn emotion_deserialization_validates_tag_and_intensity() {
        let ok: Emotion = serde_json::from_value(json!({"type": "Trust", "intensity": 0.25}))
            .expect("valid emotion");
        assert_eq!(ok.kind(), EmotionKind::Trust);
        assert_eq!(ok.intensity(), 0.25);

        assert!(serde_json::from_value::<Emotion>(json!({"type": "Glee", "intensity": 0.5})).is_err());
        assert!(serde_json::from_value::<Emotion>(json!({"type": "Joy", "intensity": 2.0})).is_err());
        assert!(serde_json::from_value::<Emotion>(json!({"type": "Joy", "intensity": "high"})).is_err());
    }

    #[test]
    fn emotion_and_state_serialize_in_wire_shape() {
        let emotion = Emotion::new(EmotionKind::Fear, 0.5).expect("emotion");
        assert_eq!(
            serde_json::to_value(emotion).expect("serialize"),
            json!({"type": "Fear", "intensity": 0.5})
        );
        let state = State::new(StateKind::Curiosity);
        assert_eq!(
            serde_json::to_value(state).expect("serialize"),
            json!({"type": "Curiosity"})
        );
    }

    #[test]
    fn wire_chunk_defaults_missing_fields() {
        let wire: WireChunk = serde_json::from_value(json!({"state": {"type": "Boredom"}}))
            .expect("wire chunk");
        let record = wire.into_record(4);
        assert_eq!(record.index, 4);
        assert_eq!(record.text, "");
        assert!(record.emotion.is_none());
        assert_eq!(record.state, Some(State::new(StateKind::Boredom)));
    }

    #[test]
    fn wire_chunk_prefers_explicit_index() {
        let wire: WireChunk =
            serde_json::from_value(json!({"chunk_index": 9, "text": "x"})).expect("wire chunk");
        assert_eq!(wire.into_record(0).index, 9);
    }

    #[test]
    fn tag_parsing_is_case_sensitive() {
        assert_eq!("Ecstasy".parse::<StateKind>().ok(), Some(StateKind::Ecstasy));
        assert!("ecstasy".parse::<StateKind>().is_err());
        assert!("joy".parse::<EmotionKind>().is_err());
    }
}
