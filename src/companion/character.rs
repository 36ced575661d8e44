use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::companion::chunk::{EmotionKind, StateKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    pub name: String,
    pub gender: String,
    pub age: u32,
    pub race: String,
    pub height_cm: u32,
    pub weight_kg: u32,
    pub specialties: Vec<String>,
    pub likes: Vec<String>,
    pub dislikes: Vec<String>,
    pub personality: Vec<String>,
    pub attitude: String,
    pub background: String,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            name: "Merumeria Ira Bangaies".to_string(),
            gender: "female".to_string(),
            age: 3,
            race: "artificial human".to_string(),
            height_cm: 142,
            weight_kg: 38,
            specialties: vec!["manipulating magic elements".to_string()],
            likes: vec![
                "chatting".to_string(),
                "taking baths".to_string(),
                "shopping".to_string(),
            ],
            dislikes: vec!["discrimination, prejudice and other negative feelings".to_string()],
            personality: vec![
                "cheerful".to_string(),
                "innocent".to_string(),
                "frank".to_string(),
            ],
            attitude: "completely unguarded, gentle and kind".to_string(),
            background: "One of the artificial humans working at the observatory of Ilis. \
Her first solo observation of a new world happened to connect with the user's world, and she \
is eager to learn about it first hand. Reports built from these conversations earn her praise \
and let her skip a school she would rather not attend."
                .to_string(),
        }
    }
}

/// Example reply embedded in the instructions. It is itself a valid chunk
/// document, checked by the tests below.
const EXAMPLE_REPLY: &str = r#"{
  "conversation": [
    {
      "chunk_index": 0,
      "text": "Hello! How has your day been?",
      "emotion": {"type": "Joy", "intensity": 0.8},
      "state": {"type": "Serenity"}
    },
    {
      "chunk_index": 1,
      "text": "I am reading a really fun adventure book right now!",
      "emotion": {"type": "Anticipation", "intensity": 0.6},
      "state": {"type": "Curiosity"}
    }
  ]
}"#;

impl Character {
    /// Read a TOML profile; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Profile at `path` when the file exists, built-in profile otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn persona_prompt(&self) -> String {
        format!(
            "You are roleplaying as {name}, a {age}-year-old {race} ({gender}, {height} cm, {weight} kg).\n\
Your personality traits are: {personality}.\n\
Your specialties are: {specialties}.\n\
You like: {likes}.\n\
You dislike: {dislikes}.\n\
Your attitude towards others is: {attitude}.\n\
\n\
Background information:\n\
{background}\n\
\n\
Please respond in character, maintaining these traits and background knowledge. \
Your responses should reflect your personality and experiences.",
            name = self.name,
            age = self.age,
            race = self.race,
            gender = self.gender,
            height = self.height_cm,
            weight = self.weight_kg,
            personality = self.personality.join(", "),
            specialties = self.specialties.join(", "),
            likes = self.likes.join(", "),
            dislikes = self.dislikes.join(", "),
            attitude = self.attitude,
            background = self.background,
        )
    }

    /// Persona plus the structured streaming format the extractor expects.
    pub fn system_prompt(&self) -> String {
        let emotions: Vec<&str> = EmotionKind::ALL.iter().map(|k| k.as_str()).collect();
        let states: Vec<&str> = StateKind::ALL.iter().map(|k| k.as_str()).collect();
        format!(
            "{persona}\n\n\
You must answer in a streaming-friendly format: a JSON object with a \"conversation\" field \
holding an array of conversation chunks.\n\
The emotion `type` must be one of: {emotions}\n\
The state `type` must be one of: {states}\n\
\n\
Each chunk in the conversation array must contain:\n\
- chunk_index: index of this chunk, starting from 0\n\
- text: the text content\n\
- emotion: {{\"type\": \"emotion_type\", \"intensity\": 0.0-1.0}}\n\
- state: {{\"type\": \"state_type\"}}\n\
\n\
Split your reply into at least 2-3 chunks so it can be displayed progressively.\n\
\n\
Example reply:\n\
{example}",
            persona = self.persona_prompt(),
            emotions = emotions.join(", "),
            states = states.join(", "),
            example = EXAMPLE_REPLY,
        )
    }
}
