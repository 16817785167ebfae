//! Prompt builders and localized fallback templates.
//!
//! Every generation call demands strict JSON and nothing else; the parsing
//! side lives in `generation.rs`. Fallback templates are fixed strings used
//! when the model is unavailable or returns something unusable — the
//! dialogue must keep moving either way.

use crate::session::model::{Language, RecipientProfile};

// ── Fallback templates ──────────────────────────────────────────────

/// Session-level dead-end question (no usable topics at all).
pub fn dead_end_question(language: Language) -> String {
    match language {
        Language::En => {
            "Tell me a bit more about them — what do they spend their free time on?".to_string()
        }
        Language::Ru => {
            "Расскажите немного больше — чем они увлекаются в свободное время?".to_string()
        }
    }
}

/// Topic-scoped probe when a specific topic produced no hypotheses.
pub fn exploration_question(topic: &str, language: Language) -> String {
    match language {
        Language::En => format!("Tell me more about their interest in {topic} — what exactly do they enjoy about it?"),
        Language::Ru => format!("Расскажите подробнее про {topic} — что именно им нравится?"),
    }
}

/// Default clarifying question for a wide topic when the model omitted one.
pub fn wide_topic_question(topic: &str, language: Language) -> String {
    match language {
        Language::En => format!("{topic} is a broad area — which side of it are they most into?"),
        Language::Ru => format!("{topic} — широкая тема. Что из этого им ближе всего?"),
    }
}

fn language_name(language: Language) -> &'static str {
    match language {
        Language::En => "English",
        Language::Ru => "Russian",
    }
}

// ── Profile context ─────────────────────────────────────────────────

/// Compact recipient summary injected into every generation call.
///
/// Takes an immutable snapshot of the reaction label lists — the prompt
/// never aliases the live session state.
pub fn profile_context(profile: &RecipientProfile) -> String {
    let quiz = &profile.quiz;
    let mut lines: Vec<String> = Vec::new();

    if let Some(age) = quiz.age {
        lines.push(format!("Age: {age}"));
    }
    if let Some(ref gender) = quiz.gender {
        lines.push(format!("Gender: {gender}"));
    }
    if let Some(ref relationship) = quiz.relationship {
        lines.push(format!("Relationship to the giver: {relationship}"));
    }
    if let Some(ref occasion) = quiz.occasion {
        lines.push(format!("Occasion: {occasion}"));
    }
    if let Some(ref vibe) = quiz.vibe {
        lines.push(format!("Vibe: {vibe}"));
    }
    if let Some(budget) = quiz.budget {
        lines.push(format!("Budget: up to {budget}"));
    }
    if !profile.liked_labels.is_empty() {
        lines.push(format!(
            "Already liked (do not repeat): {}",
            profile.liked_labels.join("; ")
        ));
    }
    if !profile.ignored_labels.is_empty() {
        lines.push(format!(
            "Rejected (avoid anything similar): {}",
            profile.ignored_labels.join("; ")
        ));
    }
    if !profile.suggested_topics.is_empty() {
        lines.push(format!(
            "User-suggested directions: {}",
            profile.suggested_topics.join("; ")
        ));
    }

    if lines.is_empty() {
        "No additional recipient details.".to_string()
    } else {
        lines.join("\n")
    }
}

// ── Normalization ───────────────────────────────────────────────────

pub const NORMALIZE_SYSTEM: &str = "You turn a gift recipient's free-text interests into a short list of \
     clean, distinct gift-discovery topics. Merge duplicates, split unrelated \
     mixes, keep each topic 1-3 words. Respond with a JSON array of strings. \
     ONLY output the JSON array. No other text.";

pub fn normalize_prompt(interests: &[String], max_topics: usize) -> String {
    format!(
        "Raw interests: {interests:?}\n\nReturn at most {max_topics} topics."
    )
}

// ── Bulk classify + generate ────────────────────────────────────────

pub const BULK_SYSTEM: &str = "You are a gift discovery engine. For every topic you receive, decide \
     whether it is too WIDE to act on, and if not, propose gift hypotheses.\n\n\
     Respond with a single JSON object keyed by topic name. Each value:\n\
     - \"is_wide\": boolean\n\
     - \"question\": clarifying question (only when is_wide)\n\
     - \"branches\": up to 4 short answer options (only when is_wide)\n\
     - \"hypotheses\": array (only when not wide) of objects with\n\
       \"title\", \"description\", \"reasoning\", \"angle\" (a short tag like\n\
       \"the_optimizer\"), and \"search_queries\" (2-4 product search strings).\n\n\
     2-3 hypotheses per topic. ONLY output the JSON object. No other text.";

pub fn bulk_prompt(topics: &[String], profile: &RecipientProfile) -> String {
    format!(
        "Recipient:\n{context}\n\nTopics: {topics:?}\n\nAnswer questions and user-visible text in {language}.",
        context = profile_context(profile),
        language = language_name(profile.quiz.language),
    )
}

// ── Per-topic calls ─────────────────────────────────────────────────

pub const CLASSIFY_SYSTEM: &str = "You judge whether a gift topic is specific enough to propose gifts for, \
     or too wide and needing one clarifying question first.\n\n\
     Respond with a JSON object: {\"is_wide\": bool, \"question\": string or null, \
     \"branches\": array of up to 4 short options}. \
     ONLY output the JSON object. No other text.";

pub fn classify_prompt(topic: &str, profile: &RecipientProfile) -> String {
    format!(
        "Recipient:\n{context}\n\nTopic: {topic}\n\nQuestion text in {language}.",
        context = profile_context(profile),
        language = language_name(profile.quiz.language),
    )
}

pub const HYPOTHESES_SYSTEM: &str = "You propose gift hypotheses for one topic: distinct angles on why a \
     certain kind of gift would land, each backed by product search queries.\n\n\
     Respond with a JSON array of objects with \"title\", \"description\", \
     \"reasoning\", \"angle\" (a short tag like \"the_optimizer\"), and \
     \"search_queries\" (2-4 product search strings). 2-3 hypotheses. \
     ONLY output the JSON array. No other text.";

pub fn hypotheses_prompt(
    topic: &str,
    profile: &RecipientProfile,
    exclude_titles: &[String],
) -> String {
    let exclusions = if exclude_titles.is_empty() {
        String::new()
    } else {
        format!(
            "\nAlready shown (propose something different): {}",
            exclude_titles.join("; ")
        )
    };
    format!(
        "Recipient:\n{context}\n\nTopic: {topic}{exclusions}\n\nUser-visible text in {language}.",
        context = profile_context(profile),
        language = language_name(profile.quiz.language),
    )
}

// ── Probes ──────────────────────────────────────────────────────────

pub const PROBE_SYSTEM: &str = "You write one short, warm clarifying question to move a stuck gift \
     conversation forward, optionally with up to 4 short answer options.\n\n\
     Respond with a JSON object: {\"question\": string, \"options\": array of \
     strings}. ONLY output the JSON object. No other text.";

/// Why a probe is being requested.
#[derive(Debug, Clone, Copy)]
pub enum ProbeContext<'a> {
    /// Session-level dead end: no topics at all.
    DeadEnd,
    /// A specific topic produced no hypotheses.
    Exploration { topic: &'a str },
}

pub fn probe_prompt(context: ProbeContext<'_>, profile: &RecipientProfile) -> String {
    let situation = match context {
        ProbeContext::DeadEnd => {
            "Context: dead_end. We know almost nothing actionable about the recipient.".to_string()
        }
        ProbeContext::Exploration { topic } => format!(
            "Context: exploration. The topic \"{topic}\" is specific but we could not \
             come up with gift ideas; dig for a concrete detail."
        ),
    };
    format!(
        "Recipient:\n{context}\n\n{situation}\n\nQuestion text in {language}.",
        context = profile_context(profile),
        language = language_name(profile.quiz.language),
    )
}
