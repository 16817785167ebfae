//! Session domain model — the root aggregate of one discovery conversation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::GiftCandidate;

/// Language used for generated questions and fallback templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
}

/// Immutable quiz input. Created once per session; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAnswers {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub relationship: Option<String>,
    pub occasion: Option<String>,
    pub vibe: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub budget: Option<Decimal>,
    pub deadline: Option<NaiveDate>,
    pub effort: Option<String>,
    #[serde(default)]
    pub language: Language,
}

impl QuizAnswers {
    /// A quiz with only interests set — handy in tests and the REPL.
    pub fn from_interests(interests: Vec<String>) -> Self {
        Self {
            age: None,
            gender: None,
            relationship: None,
            occasion: None,
            vibe: None,
            interests,
            budget: None,
            deadline: None,
            effort: None,
            language: Language::default(),
        }
    }
}

/// Kind of a recorded user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Like,
    Unlike,
    Dislike,
    Undislike,
    Select,
    Comment,
    Answer,
    LoadMore,
    SuggestTopics,
}

impl InteractionKind {
    /// Short label for logging and storage.
    pub fn label(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Like => "like",
            Self::Unlike => "unlike",
            Self::Dislike => "dislike",
            Self::Undislike => "undislike",
            Self::Select => "select",
            Self::Comment => "comment",
            Self::Answer => "answer",
            Self::LoadMore => "load_more",
            Self::SuggestTopics => "suggest_topics",
        }
    }
}

/// Append-only interaction event. Ordering within a session is insertion
/// order; cross-session ordering is irrelevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInteraction {
    pub id: Uuid,
    pub kind: InteractionKind,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub value: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl UserInteraction {
    pub fn new(kind: InteractionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target_id: None,
            target_type: None,
            value: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_target(mut self, target_type: &str, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Mutable per-session recipient aggregate: quiz answers, capped interaction
/// history, reaction id/label lists, and the gift shortlist.
///
/// The label lists mirror the id lists and are handed to generation calls as
/// context, so the model stops proposing concepts the user already reacted to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientProfile {
    pub quiz: QuizAnswers,
    /// Durable Recipient row id, when the session has an owning user.
    pub recipient_id: Option<Uuid>,
    #[serde(default)]
    pub interactions: Vec<UserInteraction>,
    #[serde(default)]
    pub liked_hypotheses: Vec<Uuid>,
    #[serde(default)]
    pub liked_labels: Vec<String>,
    #[serde(default)]
    pub ignored_hypotheses: Vec<Uuid>,
    #[serde(default)]
    pub ignored_labels: Vec<String>,
    #[serde(default)]
    pub shortlist: Vec<String>,
    #[serde(default)]
    pub suggested_topics: Vec<String>,
}

impl RecipientProfile {
    pub fn new(quiz: QuizAnswers) -> Self {
        Self {
            quiz,
            recipient_id: None,
            interactions: Vec::new(),
            liked_hypotheses: Vec::new(),
            liked_labels: Vec::new(),
            ignored_hypotheses: Vec::new(),
            ignored_labels: Vec::new(),
            shortlist: Vec::new(),
            suggested_topics: Vec::new(),
        }
    }

    /// Append an interaction, keeping only the `cap` most recent entries.
    /// Full history is persisted separately, uncapped.
    pub fn record_interaction(&mut self, interaction: UserInteraction, cap: usize) {
        self.interactions.push(interaction);
        if self.interactions.len() > cap {
            let excess = self.interactions.len() - cap;
            self.interactions.drain(..excess);
        }
    }

    /// Add a hypothesis to the liked set. Idempotent; clears any dislike.
    /// Returns true if the liked set changed.
    pub fn like(&mut self, id: Uuid, label: &str) -> bool {
        self.undislike(id);
        if self.liked_hypotheses.contains(&id) {
            return false;
        }
        self.liked_hypotheses.push(id);
        self.liked_labels.push(label.to_string());
        true
    }

    /// Remove a hypothesis from the liked set. Idempotent.
    pub fn unlike(&mut self, id: Uuid) -> bool {
        match self.liked_hypotheses.iter().position(|x| *x == id) {
            Some(pos) => {
                self.liked_hypotheses.remove(pos);
                self.liked_labels.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Add a hypothesis to the ignored set. Idempotent; clears any like.
    pub fn dislike(&mut self, id: Uuid, label: &str) -> bool {
        self.unlike(id);
        if self.ignored_hypotheses.contains(&id) {
            return false;
        }
        self.ignored_hypotheses.push(id);
        self.ignored_labels.push(label.to_string());
        true
    }

    /// Remove a hypothesis from the ignored set. Idempotent.
    pub fn undislike(&mut self, id: Uuid) -> bool {
        match self.ignored_hypotheses.iter().position(|x| *x == id) {
            Some(pos) => {
                self.ignored_hypotheses.remove(pos);
                self.ignored_labels.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Clarifying question shown when a topic is too broad or yields nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueStep {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl DialogueStep {
    pub fn new(question: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            question: question.into(),
            options,
        }
    }
}

/// Track lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Ready,
    Question,
    Loading,
    Error,
}

/// One gift thesis: a titled angle plus the candidate products backing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub reasoning: String,
    /// Psychological angle tag, e.g. "the_optimizer". Free-form.
    pub angle: String,
    pub search_queries: Vec<String>,
    pub products: Vec<GiftCandidate>,
}

/// Per-topic discovery thread. Holds either a pending question or a list of
/// hypotheses — never both in a meaningful state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicTrack {
    pub id: String,
    pub topic: String,
    pub status: TrackStatus,
    pub question: Option<DialogueStep>,
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
}

impl TopicTrack {
    pub fn ready(topic: impl Into<String>, hypotheses: Vec<Hypothesis>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            status: TrackStatus::Ready,
            question: None,
            hypotheses,
        }
    }

    pub fn question(topic: impl Into<String>, step: DialogueStep) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            status: TrackStatus::Question,
            question: Some(step),
            hypotheses: Vec::new(),
        }
    }

    pub fn error(topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            status: TrackStatus::Error,
            question: None,
            hypotheses: Vec::new(),
        }
    }

    /// Swap a pending question for generated hypotheses.
    pub fn resolve_question(&mut self, hypotheses: Vec<Hypothesis>) {
        self.question = None;
        self.hypotheses = hypotheses;
        self.status = TrackStatus::Ready;
    }

    /// Replace hypotheses with a new clarifying question.
    pub fn ask(&mut self, step: DialogueStep) {
        self.question = Some(step);
        self.hypotheses.clear();
        self.status = TrackStatus::Question;
    }
}

/// Root aggregate: the complete, TTL-bound state of one discovery
/// conversation. The session is the unit of storage; interactions follow a
/// read-modify-write cycle against the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSession {
    pub id: String,
    pub profile: RecipientProfile,
    #[serde(default)]
    pub tracks: Vec<TopicTrack>,
    pub selected_track_id: Option<String>,
    pub selected_hypothesis_id: Option<Uuid>,
    /// Session-level probe for dead ends (no topics at all).
    pub current_probe: Option<DialogueStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecommendationSession {
    pub fn new(quiz: QuizAnswers) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            profile: RecipientProfile::new(quiz),
            tracks: Vec::new(),
            selected_track_id: None,
            selected_hypothesis_id: None,
            current_probe: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn find_track_mut(&mut self, track_id: &str) -> Option<&mut TopicTrack> {
        self.tracks.iter_mut().find(|t| t.id == track_id)
    }

    /// Locate a hypothesis anywhere in the session, with its track topic.
    pub fn find_hypothesis_mut(&mut self, id: Uuid) -> Option<(String, &mut Hypothesis)> {
        for track in &mut self.tracks {
            if let Some(pos) = track.hypotheses.iter().position(|h| h.id == id) {
                let topic = track.topic.clone();
                return Some((topic, &mut track.hypotheses[pos]));
            }
        }
        None
    }

    /// External projection of the session. The recipient profile is never
    /// exposed outside the engine.
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            tracks: self.tracks.clone(),
            selected_track_id: self.selected_track_id.clone(),
            selected_hypothesis_id: self.selected_hypothesis_id,
            current_probe: self.current_probe.clone(),
        }
    }
}

/// What the caller (web layer, REPL) sees of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub tracks: Vec<TopicTrack>,
    pub selected_track_id: Option<String>,
    pub selected_hypothesis_id: Option<Uuid>,
    pub current_probe: Option<DialogueStep>,
}
