use tutor_core::orchestrator::DEFAULT_AUDIO_MIME;

/// Maps the MIME type a client labelled its recording with onto one the
/// transcription providers accept.
///
/// Parameters such as `;codecs=opus` are dropped and the type is lowercased.
/// Container aliases for AAC/M4A collapse to `audio/aac`; an absent or blank
/// label is assumed to be AAC, which is what the mobile recorders produce.
pub fn normalize_audio_mime(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return DEFAULT_AUDIO_MIME.to_string();
    };
    let base = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

    match base.as_str() {
        "" => DEFAULT_AUDIO_MIME.to_string(),
        "audio/m4a" | "audio/x-m4a" | "audio/mp4" | "audio/aac" | "audio/x-aac" => {
            "audio/aac".to_string()
        }
        "audio/mpeg" | "audio/mpeg3" | "audio/x-mpeg-3" => "audio/mp3".to_string(),
        "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "audio/wav".to_string(),
        _ => base,
    }
}
