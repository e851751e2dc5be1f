use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::game::AnalysisMode;

/// Uploaded screenshot bytes. Read once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub media_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Guesses the media type from a file extension; PNG otherwise.
    pub fn media_type_for(path: &str) -> &'static str {
        match path.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            _ => "image/png",
        }
    }

    pub fn reference(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("upload ({} bytes)", self.bytes.len()))
    }
}

#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract(&self, image: &ImagePayload, prompt: &str) -> anyhow::Result<String>;
}

const FIELD_SCHEMA: &str = r#"```json
{
  "effective_stack": "100",
  "hole_cards": "AsTd",
  "pot_before_flop": "6",
  "preflop_action": "BTN,BB",
  "flop_cards": "Kh7s2d",
  "flop_bet": "3",
  "turn_card": "5c",
  "turn_bet": "9",
  "river_card": null,
  "river_bet": null,
  "final_pot": null
}
```"#;

const RULES: &str = "Rules:\n\
- Amounts are whole numbers of big blinds written as digit strings.\n\
- Cards are two characters, rank (2-9, T, J, Q, K, A) then suit (s, h, d, c), written without separators.\n\
- preflop_action lists the positions (UTG, HJ, CO, BTN, SB, BB) in the order they put money in, comma separated.\n\
- Use null for anything not visible, including streets that have not been dealt.";

/// The fixed instruction sent with the screenshot.
pub fn extraction_prompt(mode: AnalysisMode) -> String {
    let subject = match mode {
        AnalysisMode::Game => {
            "This is a screenshot of an online no-limit hold'em table. Read the hand as it stands."
        }
        AnalysisMode::Gto => {
            "This is a screenshot of a GTO solver screen. Read the spot it is analysing: stacks, pot, \
             preflop line, board and bets."
        }
    };
    format!(
        "{subject}\n\nReturn exactly one ```json fenced block with these keys:\n{FIELD_SCHEMA}\n\n{RULES}"
    )
}

/// Appended on the single retry after an unreadable response.
pub const EXTRACTION_RETRY_SUFFIX: &str = "\n\nYour previous answer could not be parsed. Reply with \
     the fenced ```json block only, valid JSON, no comments and no trailing commas.";
