//! Per-turn request and result entities.

use crate::conversation::{ChatTurn, ExamContext};
use serde::{Deserialize, Serialize};

/// The student's utterance: recorded audio, or text from live recognition or typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPayload {
    Audio {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
    Text(String),
}

/// One incoming turn. The payload enum guarantees exactly one of audio or text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTurnRequest {
    pub payload: TurnPayload,
    pub history: Vec<ChatTurn>,
    pub exam_context: ExamContext,
    pub question_text: Option<String>,
    pub working_space: Option<String>,
}

impl VoiceTurnRequest {
    pub fn audio(
        bytes: Vec<u8>,
        mime_type: Option<String>,
        history: Vec<ChatTurn>,
        exam_context: ExamContext,
    ) -> Self {
        Self {
            payload: TurnPayload::Audio { bytes, mime_type },
            history,
            exam_context,
            question_text: None,
            working_space: None,
        }
    }

    pub fn text(text: impl Into<String>, history: Vec<ChatTurn>, exam_context: ExamContext) -> Self {
        Self {
            payload: TurnPayload::Text(text.into()),
            history,
            exam_context,
            question_text: None,
            working_space: None,
        }
    }

    pub fn with_question(mut self, question_text: Option<String>, working_space: Option<String>) -> Self {
        self.question_text = question_text;
        self.working_space = working_space;
        self
    }
}

/// Composed result of a turn. Empty `audio_bytes` means synthesis was skipped or failed.
///
/// Serialized as `{transcript, replyText, audioBase64}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct VoiceTurnResult {
    pub transcript: String,
    pub reply_text: String,
    #[serde(rename = "audioBase64", with = "base64_audio", default)]
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Byte))]
    pub audio_bytes: Vec<u8>,
}

impl VoiceTurnResult {
    pub fn has_audio(&self) -> bool {
        !self.audio_bytes.is_empty()
    }
}

/// Serde adapter carrying raw audio as standard base64 text.
pub mod base64_audio {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_wire_shape() {
        let result = VoiceTurnResult {
            transcript: "hi".into(),
            reply_text: "Hello there.".into(),
            audio_bytes: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["transcript"], "hi");
        assert_eq!(json["replyText"], "Hello there.");
        assert_eq!(json["audioBase64"], "AQID");
    }

    #[test]
    fn test_empty_audio_is_empty_string() {
        let json = serde_json::to_string(&VoiceTurnResult::default()).unwrap();
        assert_eq!(json, r#"{"transcript":"","replyText":"","audioBase64":""}"#);
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let err = serde_json::from_str::<VoiceTurnResult>(
            r#"{"transcript":"","replyText":"x","audioBase64":"!!"}"#,
        );
        assert!(err.is_err());
    }
}
