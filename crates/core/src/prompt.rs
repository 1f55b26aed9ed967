//! Tutor Prompt Construction
//!
//! Builds the grounded, single-shot prompt handed to a [`crate::stages::Responder`]
//! and post-processes the model's reply so it is safe to read aloud.

use crate::conversation::{ChatTurn, ExamContext, HISTORY_LIMIT};

/// Reply returned when the student's utterance was empty or inaudible.
pub const EMPTY_UTTERANCE_REPLY: &str =
    "Sorry, I didn't catch that. Tap the microphone and ask your question again.";

/// Token the fallback transcriber is instructed to emit when it hears no speech.
pub const NO_SPEECH_SENTINEL: &str = "[[NO_SPEECH]]";

/// Maximum sentences kept in a spoken reply.
pub const MAX_REPLY_SENTENCES: usize = 4;

/// Persona used when no `tutor_persona.md` prompt file is provided.
pub const DEFAULT_PERSONA: &str = "You are a friendly, encouraging exam tutor helping a student prepare for their {exam_type} {subject} exam. \
The current topic is {topic} at {difficulty} difficulty. \
Explain ideas clearly, check understanding, and guide the student towards the answer rather than just giving it away.";

const SPOKEN_OUTPUT_RULES: &str = "Your reply will be converted to speech. \
Answer in plain conversational prose only: no markdown, no bullet points, no headings, no code blocks, no emojis. \
Keep the reply between 2 and 4 sentences.";

/// Everything a responder needs for one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPrompt {
    /// Persona, exam context, question, working notes, and output rules.
    pub system: String,
    /// Prior exchanges, oldest first.
    pub history: Vec<ChatTurn>,
    /// The new student utterance.
    pub user_text: String,
}

/// Renders tutor prompts from a persona template.
///
/// The template may reference `{exam_type}`, `{subject}`, `{topic}` and
/// `{difficulty}`; missing context values render as neutral defaults.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona_template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

impl PromptBuilder {
    pub fn new(persona_template: impl Into<String>) -> Self {
        Self {
            persona_template: persona_template.into(),
        }
    }

    pub fn build(
        &self,
        user_text: &str,
        history: &[ChatTurn],
        exam_context: &ExamContext,
        question_text: Option<&str>,
        working_space: Option<&str>,
    ) -> ReplyPrompt {
        let mut system = self
            .persona_template
            .replace("{exam_type}", or_default(&exam_context.exam_type, "upcoming"))
            .replace("{subject}", or_default(&exam_context.subject, "general"))
            .replace("{topic}", or_default(&exam_context.topic, "general revision"))
            .replace(
                "{difficulty}",
                or_default(exam_context.difficulty.as_deref().unwrap_or(""), "standard"),
            );

        if let Some(question) = non_blank(question_text) {
            system.push_str("\n\nThe student is currently working on this question:\n");
            system.push_str(question);
        }
        if let Some(notes) = non_blank(working_space) {
            system.push_str("\n\nThe student's working notes so far:\n");
            system.push_str(notes);
        }
        system.push_str("\n\n");
        system.push_str(SPOKEN_OUTPUT_RULES);

        let skip = history.len().saturating_sub(HISTORY_LIMIT);
        ReplyPrompt {
            system,
            history: history[skip..].to_vec(),
            user_text: user_text.trim().to_string(),
        }
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value.trim()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Strips markdown from a model reply and caps it at [`MAX_REPLY_SENTENCES`].
pub fn speakable(reply: &str) -> String {
    let mut lines = Vec::new();
    for raw in reply.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        let line = line.trim_start_matches('#').trim_start();
        let line = strip_list_marker(line);
        lines.push(strip_inline_markup(line));
    }

    let flattened = lines.join(" ");
    let collapsed = flattened.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_sentences(&collapsed, MAX_REPLY_SENTENCES)
}

fn strip_list_marker(line: &str) -> &str {
    for marker in ["- ", "* ", "+ ", "> "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim_start();
        }
    }
    line
}

/// Removes paired emphasis and code delimiters and keeps link labels.
///
/// A delimiter run only counts as markup when it opens at a word start and a
/// run of the same length closes it at a word end, so `2*3` and `x_1` survive.
fn strip_inline_markup(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if matches!(c, '*' | '_' | '`' | '~') {
            let run = run_len(&chars, i);
            if opens_span(&chars, i, run) {
                if let Some(close) = closing_run(&chars, i, run) {
                    let inner: String = chars[i + run..close].iter().collect();
                    out.push_str(&strip_inline_markup(&inner));
                    i = close + run;
                    continue;
                }
            }
            out.extend(&chars[i..i + run]);
            i += run;
            continue;
        }
        // [label](url) keeps only the label
        if c == '[' {
            if let Some((label, next)) = link_label(&chars, i) {
                out.push_str(&label);
                i = next;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn run_len(chars: &[char], start: usize) -> usize {
    chars[start..].iter().take_while(|&&c| c == chars[start]).count()
}

fn opens_span(chars: &[char], start: usize, run: usize) -> bool {
    let before = start.checked_sub(1).map(|p| chars[p]);
    let after = chars.get(start + run);
    before.is_none_or(|b| b.is_whitespace() || matches!(b, '(' | '[' | '"' | '\''))
        && after.is_some_and(|a| !a.is_whitespace())
}

fn closing_run(chars: &[char], open: usize, run: usize) -> Option<usize> {
    let delimiter = chars[open];
    let mut j = open + run;
    while j < chars.len() {
        if chars[j] != delimiter {
            j += 1;
            continue;
        }
        let len = run_len(chars, j);
        let after = chars.get(j + len);
        if len == run
            && !chars[j - 1].is_whitespace()
            && after.is_none_or(|a| a.is_whitespace() || a.is_ascii_punctuation())
        {
            return Some(j);
        }
        j += len;
    }
    None
}

/// Label of a `[label](url)` link starting at `open`, and the index after it.
fn link_label(chars: &[char], open: usize) -> Option<(String, usize)> {
    let close = open + chars[open..].iter().position(|&c| c == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let end = close + 1 + chars[close + 1..].iter().position(|&c| c == ')')?;
    Some((chars[open + 1..close].iter().collect(), end + 1))
}

/// Abbreviations whose final period does not end a sentence.
const ABBREVIATIONS: &[&str] = &["e.g.", "i.e.", "vs.", "approx.", "cf.", "dr.", "mr.", "mrs.", "ms."];

fn truncate_sentences(text: &str, max: usize) -> String {
    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let end = idx + c.len_utf8();
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary && !(c == '.' && ends_with_abbreviation(&text[..end])) {
                count += 1;
                if count == max {
                    return text[..end].to_string();
                }
            }
        }
    }
    text.to_string()
}

fn ends_with_abbreviation(text: &str) -> bool {
    let word = text
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or_default()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    ABBREVIATIONS.contains(&word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExamContext {
        ExamContext::new("GCSE", "Biology", "Photosynthesis")
    }

    #[test]
    fn test_build_renders_persona_and_rules() {
        let prompt = PromptBuilder::default().build(
            "  What is photosynthesis?  ",
            &[],
            &context(),
            None,
            None,
        );

        assert!(prompt.system.contains("GCSE Biology exam"));
        assert!(prompt.system.contains("Photosynthesis"));
        assert!(prompt.system.contains("between 2 and 4 sentences"));
        assert!(!prompt.system.contains("working notes"));
        assert!(prompt.history.is_empty());
        assert_eq!(prompt.user_text, "What is photosynthesis?");
    }

    #[test]
    fn test_build_includes_question_and_notes() {
        let prompt = PromptBuilder::new("Tutor for {subject}.").build(
            "Is this right?",
            &[ChatTurn::new("hi", "hello")],
            &ExamContext::default(),
            Some("Factor x^2 + 2x + 1"),
            Some("(x+1)(x+1)"),
        );

        assert!(prompt.system.starts_with("Tutor for general."));
        assert!(prompt.system.contains("Factor x^2 + 2x + 1"));
        assert!(prompt.system.contains("(x+1)(x+1)"));
        assert_eq!(prompt.history.len(), 1);
    }

    #[test]
    fn test_blank_optional_sections_are_skipped() {
        let prompt = PromptBuilder::default().build("q", &[], &context(), Some("  "), Some(""));
        assert!(!prompt.system.contains("currently working on"));
        assert!(!prompt.system.contains("working notes"));
    }

    #[test]
    fn test_build_bounds_history() {
        let history: Vec<ChatTurn> = (0..15)
            .map(|i| ChatTurn::new(format!("q{i}"), format!("a{i}")))
            .collect();
        let prompt = PromptBuilder::default().build("next", &history, &context(), None, None);
        assert_eq!(prompt.history.len(), HISTORY_LIMIT);
        assert_eq!(prompt.history[0].user, "q5");
    }

    #[test]
    fn test_speakable_strips_markdown() {
        let reply = "## Photosynthesis\n\n- **Plants** use `light` energy.\n- See [this](https://x.y) guide.";
        assert_eq!(
            speakable(reply),
            "Photosynthesis Plants use light energy. See this guide."
        );
    }

    #[test]
    fn test_speakable_caps_sentences() {
        let reply = "One. Two! Three? Four. Five. Six.";
        assert_eq!(speakable(reply), "One. Two! Three? Four.");
    }

    #[test]
    fn test_speakable_keeps_decimals_together() {
        let reply = "Pi is about 3.14 in value. That is it.";
        assert_eq!(speakable(reply), reply);
    }

    #[test]
    fn test_speakable_keeps_maths_symbols() {
        assert_eq!(speakable("2*3 is 6."), "2*3 is 6.");
        assert_eq!(speakable("Write x_1 and x_2 first."), "Write x_1 and x_2 first.");
        assert_eq!(speakable("It is ~5 metres long."), "It is ~5 metres long.");
        assert_eq!(speakable("So 2 * 3 = 6."), "So 2 * 3 = 6.");
    }

    #[test]
    fn test_speakable_strips_paired_emphasis_only() {
        assert_eq!(
            speakable("*Mass* is ~~weight~~ not the same as __weight__, and `F=ma`."),
            "Mass is weight not the same as weight, and F=ma."
        );
        assert_eq!(speakable("Try **(a)** first."), "Try (a) first.");
        assert_eq!(speakable("The interval [0, 1] is closed."), "The interval [0, 1] is closed.");
    }

    #[test]
    fn test_speakable_abbreviations_do_not_end_sentences() {
        let reply = "Use a catalyst, e.g. an enzyme. Two. Three. Four. Five.";
        assert_eq!(
            speakable(reply),
            "Use a catalyst, e.g. an enzyme. Two. Three. Four."
        );
        assert_eq!(
            speakable("One, i.e. the first. Two. Three. Four. Five."),
            "One, i.e. the first. Two. Three. Four."
        );
    }

    #[test]
    fn test_speakable_numbered_list() {
        assert_eq!(speakable("1. First step.\n2) Second step."), "First step. Second step.");
    }
}
