//! Dialogue orchestrator — owns the session state machine.
//!
//! Every entry point follows the same cycle: load session → record the
//! interaction → mutate → save. All persistence outside the session store is
//! best-effort; upstream (LLM / embedding) failures degrade to fallback
//! questions or template text. The only terminal error a caller sees is a
//! missing session (or an unknown track/hypothesis id).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::CatalogSearch;
use crate::config::{DiscoveryConfig, RetrievalConfig};
use crate::discovery::generation::{self, GenerationClient, RawTrackPlan};
use crate::discovery::prompts::{self, ProbeContext};
use crate::discovery::tracks::{self, TrackBuilder};
use crate::embedding::EmbeddingProvider;
use crate::error::{DiscoveryError, LlmError};
use crate::fanout;
use crate::llm::LlmProvider;
use crate::retrieval::RetrievalPipeline;
use crate::session::model::{
    DialogueStep, InteractionKind, QuizAnswers, RecipientProfile, RecommendationSession,
    TopicTrack, TrackStatus, UserInteraction,
};
use crate::session::SessionStore;
use crate::store::{DiscoveryStore, Reaction};

/// A user interaction against a live session.
#[derive(Debug, Clone)]
pub enum InteractionRequest {
    /// Move the navigation cursors to a hypothesis the user is looking at.
    ViewHypothesis {
        track_id: String,
        hypothesis_id: Uuid,
    },
    /// Answer a track's clarifying question (typed or branch selection).
    AnswerQuestion { track_id: String, answer: String },
    /// Append more hypotheses to a ready track.
    LoadMore { track_id: String },
    Like { hypothesis_id: Uuid },
    Unlike { hypothesis_id: Uuid },
    Dislike { hypothesis_id: Uuid },
    Undislike { hypothesis_id: Uuid },
    /// Session-level topic hints; does not touch track state.
    SuggestTopics { topics: Vec<String> },
    /// Put a product on the shortlist; does not touch track state.
    SelectGift { product_id: String },
    Comment { text: String },
}

impl InteractionRequest {
    /// The append-only event recorded for this request.
    fn to_event(&self) -> UserInteraction {
        match self {
            Self::ViewHypothesis { hypothesis_id, .. } => {
                UserInteraction::new(InteractionKind::View)
                    .with_target("hypothesis", hypothesis_id.to_string())
            }
            Self::AnswerQuestion { track_id, answer } => {
                UserInteraction::new(InteractionKind::Answer)
                    .with_target("track", track_id.clone())
                    .with_value(answer.clone())
            }
            Self::LoadMore { track_id } => UserInteraction::new(InteractionKind::LoadMore)
                .with_target("track", track_id.clone()),
            Self::Like { hypothesis_id } => UserInteraction::new(InteractionKind::Like)
                .with_target("hypothesis", hypothesis_id.to_string()),
            Self::Unlike { hypothesis_id } => UserInteraction::new(InteractionKind::Unlike)
                .with_target("hypothesis", hypothesis_id.to_string()),
            Self::Dislike { hypothesis_id } => UserInteraction::new(InteractionKind::Dislike)
                .with_target("hypothesis", hypothesis_id.to_string()),
            Self::Undislike { hypothesis_id } => UserInteraction::new(InteractionKind::Undislike)
                .with_target("hypothesis", hypothesis_id.to_string()),
            Self::SuggestTopics { topics } => UserInteraction::new(InteractionKind::SuggestTopics)
                .with_value(topics.join("; ")),
            Self::SelectGift { product_id } => UserInteraction::new(InteractionKind::Select)
                .with_target("product", product_id.clone()),
            Self::Comment { text } => {
                UserInteraction::new(InteractionKind::Comment).with_value(text.clone())
            }
        }
    }
}

/// The discovery engine. All collaborators are injected once at construction
/// and shared behind trait objects — tests substitute stubs freely.
pub struct DiscoveryEngine {
    generation: GenerationClient,
    retrieval: RetrievalPipeline,
    sessions: Arc<dyn SessionStore>,
    store: Arc<dyn DiscoveryStore>,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embeddings: Arc<dyn EmbeddingProvider>,
        catalog: Arc<dyn CatalogSearch>,
        sessions: Arc<dyn SessionStore>,
        store: Arc<dyn DiscoveryStore>,
        config: DiscoveryConfig,
        retrieval_config: RetrievalConfig,
    ) -> Self {
        Self {
            generation: GenerationClient::new(llm, config.clone()),
            retrieval: RetrievalPipeline::new(embeddings, catalog, retrieval_config),
            sessions,
            store,
            config,
        }
    }

    fn builder(&self) -> TrackBuilder<'_> {
        TrackBuilder {
            generation: &self.generation,
            retrieval: &self.retrieval,
        }
    }

    // ── Session initialization ──────────────────────────────────────

    /// Create a session from quiz answers: normalize interests into topics,
    /// build one track per topic, save, return.
    pub async fn init_session(
        &self,
        quiz: QuizAnswers,
        owner: Option<Uuid>,
    ) -> Result<RecommendationSession, DiscoveryError> {
        let mut session = RecommendationSession::new(quiz);
        info!(session_id = %session.id, "Starting discovery session");

        if let Some(owner_id) = owner {
            match self
                .store
                .create_recipient(owner_id, &session.profile.quiz)
                .await
            {
                Ok(recipient_id) => session.profile.recipient_id = Some(recipient_id),
                Err(e) => {
                    warn!(error = %e, "Recipient persistence failed, continuing without it");
                }
            }
        }

        let topics = match self
            .generation
            .normalize_topics(&session.profile.quiz.interests)
            .await
        {
            Ok(topics) => topics,
            Err(e) => {
                warn!(error = %e, "Interest normalization failed, falling back to raw interests");
                generation::dedup_topics(
                    session.profile.quiz.interests.clone(),
                    self.config.max_topics,
                )
            }
        };

        if topics.is_empty() {
            session.current_probe = Some(self.dead_end_probe(&session.profile).await);
            self.sessions.save(&session).await?;
            return Ok(session);
        }

        let tracks = match self.generation.bulk_plan(&topics, &session.profile).await {
            Ok(plans) => self.build_tracks_bulk(&topics, plans, &session.profile).await,
            Err(e) => {
                warn!(error = %e, "Bulk generation failed, falling back to per-topic calls");
                self.build_tracks_per_topic(&topics, &session.profile).await
            }
        };

        for track in tracks.iter().filter(|t| t.status == TrackStatus::Ready) {
            if let Err(e) = self
                .store
                .save_hypotheses(&session.id, &track.topic, &track.hypotheses)
                .await
            {
                warn!(topic = %track.topic, error = %e, "Hypothesis persistence failed, continuing");
            }
        }

        session.selected_track_id = tracks.first().map(|t| t.id.clone());
        session.tracks = tracks;
        self.sessions.save(&session).await?;
        Ok(session)
    }

    async fn dead_end_probe(&self, profile: &RecipientProfile) -> DialogueStep {
        match self
            .generation
            .probe_question(ProbeContext::DeadEnd, profile)
            .await
        {
            Ok(step) => step,
            Err(e) => {
                warn!(error = %e, "Dead-end probe generation failed, using template");
                DialogueStep::new(
                    prompts::dead_end_question(profile.quiz.language),
                    Vec::new(),
                )
            }
        }
    }

    /// Build tracks from the bulk plan, concurrently across topics — each
    /// track's preview fetches are independent I/O.
    async fn build_tracks_bulk(
        &self,
        topics: &[String],
        mut plans: HashMap<String, RawTrackPlan>,
        profile: &RecipientProfile,
    ) -> Vec<TopicTrack> {
        let builder = self.builder();
        let paired: Vec<(String, RawTrackPlan)> = topics
            .iter()
            .map(|topic| (topic.clone(), plans.remove(topic).unwrap_or_default()))
            .collect();

        let futures: Vec<_> = paired
            .into_iter()
            .map(|(topic, plan)| {
                let builder = &builder;
                async move { builder.build_track(&topic, plan, profile).await }
            })
            .collect();
        join_all(futures).await
    }

    /// Per-topic fallback: classify then generate, one topic at a time but
    /// concurrently across topics. A failing topic becomes an error track —
    /// it never fails the batch.
    async fn build_tracks_per_topic(
        &self,
        topics: &[String],
        profile: &RecipientProfile,
    ) -> Vec<TopicTrack> {
        let builder = self.builder();
        let futures: Vec<_> = topics
            .iter()
            .map(|topic| self.build_topic_track(&builder, topic, profile))
            .collect();
        let settled = fanout::join_settled(futures).await;

        settled
            .into_iter()
            .map(|(index, result)| match result {
                Ok(track) => track,
                Err(e) => {
                    warn!(topic = %topics[index], error = %e, "Topic generation failed");
                    TopicTrack::error(topics[index].clone())
                }
            })
            .collect()
    }

    async fn build_topic_track(
        &self,
        builder: &TrackBuilder<'_>,
        topic: &str,
        profile: &RecipientProfile,
    ) -> Result<TopicTrack, LlmError> {
        let classified = self.generation.classify_topic(topic, profile).await?;
        if classified.is_wide {
            return Ok(builder.build_track(topic, classified, profile).await);
        }
        let hypotheses = self.generation.topic_hypotheses(topic, profile, &[]).await?;
        let plan = RawTrackPlan {
            is_wide: false,
            question: None,
            branches: Vec::new(),
            hypotheses,
        };
        Ok(builder.build_track(topic, plan, profile).await)
    }

    // ── Interaction handling ────────────────────────────────────────

    /// Apply one interaction: load → record → mutate → save.
    pub async fn interact(
        &self,
        session_id: &str,
        request: InteractionRequest,
    ) -> Result<RecommendationSession, DiscoveryError> {
        let mut session = self.sessions.get(session_id).await?.ok_or_else(|| {
            DiscoveryError::SessionNotFound {
                id: session_id.to_string(),
            }
        })?;

        let event = request.to_event();
        session
            .profile
            .record_interaction(event.clone(), self.config.history_cap);
        if let Err(e) = self.store.save_interaction(&session.id, &event).await {
            warn!(error = %e, "Interaction persistence failed, continuing");
        }

        match request {
            InteractionRequest::ViewHypothesis {
                track_id,
                hypothesis_id,
            } => {
                if session.find_track_mut(&track_id).is_none() {
                    return Err(DiscoveryError::TrackNotFound { id: track_id });
                }
                session.selected_track_id = Some(track_id);
                session.selected_hypothesis_id = Some(hypothesis_id);
            }
            InteractionRequest::AnswerQuestion { track_id, answer } => {
                self.answer_question(&mut session, &track_id, &answer).await?;
            }
            InteractionRequest::LoadMore { track_id } => {
                self.load_more(&mut session, &track_id).await?;
            }
            InteractionRequest::Like { hypothesis_id } => {
                self.like(&mut session, hypothesis_id).await?;
            }
            InteractionRequest::Unlike { hypothesis_id } => {
                self.set_reaction(&mut session, hypothesis_id, None, false).await?;
            }
            InteractionRequest::Dislike { hypothesis_id } => {
                self.set_reaction(&mut session, hypothesis_id, Some(Reaction::Disliked), false)
                    .await?;
            }
            InteractionRequest::Undislike { hypothesis_id } => {
                self.set_reaction(&mut session, hypothesis_id, None, true).await?;
            }
            InteractionRequest::SuggestTopics { topics } => {
                for topic in topics {
                    let trimmed = topic.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let known = session
                        .profile
                        .suggested_topics
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(trimmed));
                    if !known {
                        session.profile.suggested_topics.push(trimmed.to_string());
                    }
                }
            }
            InteractionRequest::SelectGift { product_id } => {
                if !session.profile.shortlist.contains(&product_id) {
                    session.profile.shortlist.push(product_id);
                }
            }
            InteractionRequest::Comment { .. } => {}
        }

        session.updated_at = Utc::now();
        self.sessions.save(&session).await?;
        Ok(session)
    }

    /// question → ready: discard the question, regenerate hypotheses for the
    /// topic refined with the user's answer. A failed or empty regeneration
    /// falls back to a fresh probe — the track never dead-ends silently.
    async fn answer_question(
        &self,
        session: &mut RecommendationSession,
        track_id: &str,
        answer: &str,
    ) -> Result<(), DiscoveryError> {
        let language = session.profile.quiz.language;
        let topic = {
            let track =
                session
                    .find_track_mut(track_id)
                    .ok_or_else(|| DiscoveryError::TrackNotFound {
                        id: track_id.to_string(),
                    })?;
            // Answers only make sense against a pending question.
            if track.status != TrackStatus::Question {
                return Ok(());
            }
            track.status = TrackStatus::Loading;
            track.topic.clone()
        };

        // Refined topic carries the answer as parenthetical context; the
        // track keeps its display topic.
        let refined = format!("{topic} ({answer})");
        let profile = session.profile.clone();
        let builder = self.builder();

        let outcome = self
            .generation
            .topic_hypotheses(&refined, &profile, &[])
            .await
            .map(tracks::sanitize);

        match outcome {
            Ok(usable) if !usable.is_empty() => {
                let hypotheses = builder.hydrate(usable, &profile).await;
                if let Err(e) = self
                    .store
                    .save_hypotheses(&session.id, &topic, &hypotheses)
                    .await
                {
                    warn!(topic = %topic, error = %e, "Hypothesis persistence failed, continuing");
                }
                if let Some(track) = session.find_track_mut(track_id) {
                    track.resolve_question(hypotheses);
                }
            }
            Ok(_) => {
                let step = match self
                    .generation
                    .probe_question(ProbeContext::Exploration { topic: &topic }, &profile)
                    .await
                {
                    Ok(step) => step,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Probe generation failed, using template");
                        DialogueStep::new(prompts::exploration_question(&topic, language), Vec::new())
                    }
                };
                if let Some(track) = session.find_track_mut(track_id) {
                    track.ask(step);
                }
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Regeneration failed, asking again");
                let step =
                    DialogueStep::new(prompts::exploration_question(&topic, language), Vec::new());
                if let Some(track) = session.find_track_mut(track_id) {
                    track.ask(step);
                }
            }
        }
        Ok(())
    }

    /// ready → ready: append freshly generated hypotheses. Existing ones are
    /// never removed or replaced.
    async fn load_more(
        &self,
        session: &mut RecommendationSession,
        track_id: &str,
    ) -> Result<(), DiscoveryError> {
        let (topic, mut exclude) = {
            let track =
                session
                    .find_track_mut(track_id)
                    .ok_or_else(|| DiscoveryError::TrackNotFound {
                        id: track_id.to_string(),
                    })?;
            if track.status != TrackStatus::Ready {
                return Ok(());
            }
            let titles: Vec<String> = track.hypotheses.iter().map(|h| h.title.clone()).collect();
            (track.topic.clone(), titles)
        };
        exclude.extend(session.profile.liked_labels.iter().cloned());
        exclude.extend(session.profile.ignored_labels.iter().cloned());

        let profile = session.profile.clone();
        let builder = self.builder();

        match self
            .generation
            .topic_hypotheses(&topic, &profile, &exclude)
            .await
            .map(tracks::sanitize)
        {
            Ok(usable) if !usable.is_empty() => {
                let hypotheses = builder.hydrate(usable, &profile).await;
                if let Err(e) = self
                    .store
                    .save_hypotheses(&session.id, &topic, &hypotheses)
                    .await
                {
                    warn!(topic = %topic, error = %e, "Hypothesis persistence failed, continuing");
                }
                if let Some(track) = session.find_track_mut(track_id) {
                    track.hypotheses.extend(hypotheses);
                }
            }
            Ok(_) => {
                warn!(topic = %topic, "Load-more produced nothing usable, track unchanged");
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Load-more generation failed, track unchanged");
            }
        }
        Ok(())
    }

    /// Like: toggle membership, persist the reaction, then deep-dive and
    /// replace the hypothesis's preview products.
    async fn like(
        &self,
        session: &mut RecommendationSession,
        hypothesis_id: Uuid,
    ) -> Result<(), DiscoveryError> {
        let (title, description, queries) = {
            let hypothesis = session
                .tracks
                .iter()
                .flat_map(|t| t.hypotheses.iter())
                .find(|h| h.id == hypothesis_id)
                .ok_or(DiscoveryError::HypothesisNotFound { id: hypothesis_id })?;
            (
                hypothesis.title.clone(),
                hypothesis.description.clone(),
                hypothesis.search_queries.clone(),
            )
        };

        session.profile.like(hypothesis_id, &title);
        if let Err(e) = self
            .store
            .update_hypothesis_reaction(hypothesis_id, Some(Reaction::Liked))
            .await
        {
            warn!(error = %e, "Reaction persistence failed, continuing");
        }

        let budget = session.profile.quiz.budget;
        let deep = self
            .retrieval
            .find_deep_products(&queries, &title, &description, budget)
            .await;
        if let Some((_, hypothesis)) = session.find_hypothesis_mut(hypothesis_id) {
            hypothesis.products = deep;
        }
        session.selected_hypothesis_id = Some(hypothesis_id);
        Ok(())
    }

    /// Unlike / dislike / undislike share one shape: find the hypothesis,
    /// toggle the profile sets, persist the reaction state.
    async fn set_reaction(
        &self,
        session: &mut RecommendationSession,
        hypothesis_id: Uuid,
        reaction: Option<Reaction>,
        undislike: bool,
    ) -> Result<(), DiscoveryError> {
        let title = session
            .tracks
            .iter()
            .flat_map(|t| t.hypotheses.iter())
            .find(|h| h.id == hypothesis_id)
            .map(|h| h.title.clone())
            .ok_or(DiscoveryError::HypothesisNotFound { id: hypothesis_id })?;

        match reaction {
            Some(Reaction::Disliked) => {
                session.profile.dislike(hypothesis_id, &title);
            }
            Some(Reaction::Liked) => {
                session.profile.like(hypothesis_id, &title);
            }
            None if undislike => {
                session.profile.undislike(hypothesis_id);
            }
            None => {
                session.profile.unlike(hypothesis_id);
            }
        }

        if let Err(e) = self
            .store
            .update_hypothesis_reaction(hypothesis_id, reaction)
            .await
        {
            warn!(error = %e, "Reaction persistence failed, continuing");
        }
        Ok(())
    }
}
