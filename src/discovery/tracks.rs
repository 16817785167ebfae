//! Track construction from raw generation plans.

use futures::future::join_all;
use tracing::warn;
use uuid::Uuid;

use crate::discovery::generation::{GenerationClient, RawHypothesis, RawTrackPlan};
use crate::discovery::prompts::{self, ProbeContext};
use crate::retrieval::RetrievalPipeline;
use crate::session::model::{DialogueStep, Hypothesis, RecipientProfile, TopicTrack};

/// Builds a `TopicTrack` out of whatever the model returned for a topic.
pub struct TrackBuilder<'a> {
    pub generation: &'a GenerationClient,
    pub retrieval: &'a RetrievalPipeline,
}

impl TrackBuilder<'_> {
    /// Turn a raw plan into a track:
    /// - wide topic → question track (default template when the model
    ///   omitted the question);
    /// - hypotheses present → preview retrieval per hypothesis, ready track;
    /// - specific but empty → topic-scoped exploration probe.
    pub async fn build_track(
        &self,
        topic: &str,
        plan: RawTrackPlan,
        profile: &RecipientProfile,
    ) -> TopicTrack {
        let language = profile.quiz.language;

        if plan.is_wide {
            let question = plan
                .question
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| prompts::wide_topic_question(topic, language));
            return TopicTrack::question(topic, DialogueStep::new(question, plan.branches));
        }

        let usable = sanitize(plan.hypotheses);
        if !usable.is_empty() {
            let hypotheses = self.hydrate(usable, profile).await;
            return TopicTrack::ready(topic, hypotheses);
        }

        let step = match self
            .generation
            .probe_question(ProbeContext::Exploration { topic }, profile)
            .await
        {
            Ok(step) => step,
            Err(e) => {
                warn!(topic, error = %e, "Probe generation failed, using template");
                DialogueStep::new(prompts::exploration_question(topic, language), Vec::new())
            }
        };
        TopicTrack::question(topic, step)
    }

    /// Attach preview products to each raw hypothesis, concurrently —
    /// each preview fetch is independent I/O.
    pub async fn hydrate(
        &self,
        raws: Vec<RawHypothesis>,
        profile: &RecipientProfile,
    ) -> Vec<Hypothesis> {
        let budget = profile.quiz.budget;
        let previews = join_all(raws.iter().map(|raw| {
            self.retrieval
                .find_preview_products(&raw.search_queries, Some(raw.title.as_str()), budget)
        }))
        .await;

        raws.into_iter()
            .zip(previews)
            .map(|(raw, products)| Hypothesis {
                id: Uuid::new_v4(),
                title: raw.title,
                description: raw.description,
                reasoning: raw.reasoning,
                angle: raw.angle,
                search_queries: raw.search_queries,
                products,
            })
            .collect()
    }
}

/// Drop raw hypotheses the engine cannot act on: a hypothesis needs a title
/// and at least one search query.
pub fn sanitize(raws: Vec<RawHypothesis>) -> Vec<RawHypothesis> {
    raws.into_iter()
        .filter(|raw| !raw.title.trim().is_empty() && !raw.search_queries.is_empty())
        .collect()
}
