//! Integration tests for the discovery dialogue and retrieval engine.
//!
//! Each test wires a real engine against in-memory libSQL stores and a
//! scripted LLM stub (no real API calls), then drives the public
//! `init_session` / `interact` surface.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use giftscout::catalog::{CatalogProduct, GiftCandidate, LibSqlCatalog};
use giftscout::config::{DiscoveryConfig, RetrievalConfig};
use giftscout::discovery::{prompts, DiscoveryEngine, InteractionRequest};
use giftscout::embedding::EmbeddingProvider;
use giftscout::error::{DiscoveryError, EmbeddingError, LlmError};
use giftscout::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use giftscout::session::{
    Language, LibSqlSessionStore, QuizAnswers, TrackStatus,
};
use giftscout::store::LibSqlStore;

// ── Stubs ───────────────────────────────────────────────────────────

/// Scripted LLM: each test supplies a closure that inspects the request
/// (usually its system prompt) and returns raw response text or an error.
struct StubLlm<F>(F);

#[async_trait]
impl<F> LlmProvider for StubLlm<F>
where
    F: Fn(&CompletionRequest) -> Result<String, String> + Send + Sync,
{
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match (self.0)(&request) {
            Ok(content) => Ok(CompletionResponse {
                content,
                input_tokens: 0,
                output_tokens: 0,
            }),
            Err(reason) => Err(LlmError::RequestFailed {
                provider: "stub".to_string(),
                reason,
            }),
        }
    }
}

/// The system prompt identifies which generation call is being made.
fn system_of(request: &CompletionRequest) -> &str {
    &request.messages[0].content
}

/// Embedding stub: fixed 2-d vectors, uniform rerank scores.
struct StubEmbeddings;

#[async_trait]
impl EmbeddingProvider for StubEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(vec![vec![1.0, 0.0]; texts.len()])
    }

    async fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.5; documents.len()])
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

async fn seeded_catalog() -> LibSqlCatalog {
    let catalog = LibSqlCatalog::new_memory().await.unwrap();
    catalog
        .upsert_product(&CatalogProduct {
            candidate: GiftCandidate {
                id: "aeropress-go".to_string(),
                title: "AeroPress Go Travel Kit".to_string(),
                price: dec!(39.99),
                currency: "USD".to_string(),
                image_url: None,
                merchant: Some("BrewShop".to_string()),
                category: Some("coffee".to_string()),
            },
            active: true,
            embedding: vec![1.0, 0.0],
        })
        .await
        .unwrap();
    catalog
}

async fn engine_with<F>(llm: F) -> DiscoveryEngine
where
    F: Fn(&CompletionRequest) -> Result<String, String> + Send + Sync + 'static,
{
    DiscoveryEngine::new(
        Arc::new(StubLlm(llm)),
        Arc::new(StubEmbeddings),
        Arc::new(seeded_catalog().await),
        Arc::new(
            LibSqlSessionStore::new_memory(Duration::from_secs(300))
                .await
                .unwrap(),
        ),
        Arc::new(LibSqlStore::new_memory().await.unwrap()),
        DiscoveryConfig::default(),
        RetrievalConfig::default(),
    )
}

fn coffee_quiz() -> QuizAnswers {
    let mut quiz = QuizAnswers::from_interests(vec!["Coffee".to_string()]);
    quiz.age = Some(30);
    quiz
}

fn coffee_bulk_response() -> String {
    json!({
        "Coffee": {
            "is_wide": false,
            "hypotheses": [{
                "title": "AeroPress Kit",
                "description": "Portable espresso-style brewing",
                "reasoning": "Daily ritual upgrade for a coffee person",
                "angle": "the_optimizer",
                "search_queries": ["aeropress"]
            }]
        }
    })
    .to_string()
}

/// The happy-path script: normalize → ["Coffee"], bulk → one hypothesis.
fn coffee_script(request: &CompletionRequest) -> Result<String, String> {
    let system = system_of(request);
    if system == prompts::NORMALIZE_SYSTEM {
        Ok(r#"["Coffee"]"#.to_string())
    } else if system == prompts::BULK_SYSTEM {
        Ok(coffee_bulk_response())
    } else if system == prompts::HYPOTHESES_SYSTEM {
        Ok(json!([{
            "title": "Espresso Scale",
            "description": "Precision brewing scale",
            "reasoning": "They already dialed in the basics",
            "angle": "the_optimizer",
            "search_queries": ["coffee scale"]
        }])
        .to_string())
    } else if system == prompts::PROBE_SYSTEM {
        Ok(r#"{"question": "What do they brew with today?", "options": []}"#.to_string())
    } else {
        Err("unexpected call".to_string())
    }
}

// ── Session initialization ──────────────────────────────────────────

#[tokio::test]
async fn coffee_quiz_yields_one_ready_track_with_preview_product() {
    let engine = engine_with(coffee_script).await;
    let session = engine.init_session(coffee_quiz(), None).await.unwrap();

    assert_eq!(session.tracks.len(), 1);
    let track = &session.tracks[0];
    assert_eq!(track.topic, "Coffee");
    assert_eq!(track.status, TrackStatus::Ready);
    assert_eq!(track.hypotheses.len(), 1);

    let hypothesis = &track.hypotheses[0];
    assert_eq!(hypothesis.title, "AeroPress Kit");
    assert!(!hypothesis.search_queries.is_empty());
    assert!(hypothesis.products.iter().any(|p| p.id == "aeropress-go"));

    assert_eq!(session.selected_track_id.as_deref(), Some(track.id.as_str()));
}

#[tokio::test]
async fn normalization_failure_falls_back_to_raw_interests() {
    let engine = engine_with(|request| {
        let system = system_of(request);
        if system == prompts::NORMALIZE_SYSTEM {
            Err("llm down".to_string())
        } else if system == prompts::BULK_SYSTEM {
            Ok(coffee_bulk_response())
        } else {
            Err("unexpected call".to_string())
        }
    })
    .await;

    let session = engine.init_session(coffee_quiz(), None).await.unwrap();
    assert_eq!(session.tracks.len(), 1);
    assert_eq!(session.tracks[0].topic, "Coffee");
}

#[tokio::test]
async fn bulk_failure_isolates_per_topic_errors() {
    let engine = engine_with(|request| {
        let system = system_of(request);
        let user = &request.messages[1].content;
        if system == prompts::NORMALIZE_SYSTEM {
            Ok(r#"["Coffee", "Gadgets"]"#.to_string())
        } else if system == prompts::BULK_SYSTEM {
            Err("bulk overloaded".to_string())
        } else if system == prompts::CLASSIFY_SYSTEM {
            if user.contains("Gadgets") {
                Err("classify failed".to_string())
            } else {
                Ok(r#"{"is_wide": false, "question": null, "branches": []}"#.to_string())
            }
        } else if system == prompts::HYPOTHESES_SYSTEM {
            Ok(json!([{
                "title": "AeroPress Kit",
                "search_queries": ["aeropress"]
            }])
            .to_string())
        } else {
            Err("unexpected call".to_string())
        }
    })
    .await;

    let quiz = QuizAnswers::from_interests(vec!["Coffee".to_string(), "Gadgets".to_string()]);
    let session = engine.init_session(quiz, None).await.unwrap();

    assert_eq!(session.tracks.len(), 2);
    let coffee = session.tracks.iter().find(|t| t.topic == "Coffee").unwrap();
    let gadgets = session.tracks.iter().find(|t| t.topic == "Gadgets").unwrap();
    assert_eq!(coffee.status, TrackStatus::Ready);
    assert_eq!(gadgets.status, TrackStatus::Error);
}

#[tokio::test]
async fn empty_interests_produce_probe_instead_of_tracks() {
    // Probe generation also fails, exercising the fixed template fallback.
    let engine = engine_with(|_| Err("llm down".to_string())).await;
    let session = engine
        .init_session(QuizAnswers::from_interests(vec![]), None)
        .await
        .unwrap();

    assert!(session.tracks.is_empty());
    let probe = session.current_probe.expect("dead end needs a probe");
    assert_eq!(probe.question, prompts::dead_end_question(Language::En));
}

#[tokio::test]
async fn wide_topic_becomes_question_track() {
    let engine = engine_with(|request| {
        let system = system_of(request);
        if system == prompts::NORMALIZE_SYSTEM {
            Ok(r#"["Sport"]"#.to_string())
        } else if system == prompts::BULK_SYSTEM {
            Ok(json!({
                "Sport": {
                    "is_wide": true,
                    "question": "Which sport are they into?",
                    "branches": ["Running", "Climbing"]
                }
            })
            .to_string())
        } else {
            Err("unexpected call".to_string())
        }
    })
    .await;

    let session = engine
        .init_session(QuizAnswers::from_interests(vec!["Sport".to_string()]), None)
        .await
        .unwrap();

    let track = &session.tracks[0];
    assert_eq!(track.status, TrackStatus::Question);
    let question = track.question.as_ref().unwrap();
    assert_eq!(question.question, "Which sport are they into?");
    assert_eq!(question.options, vec!["Running", "Climbing"]);
    assert!(track.hypotheses.is_empty());
}

// ── Interactions ────────────────────────────────────────────────────

#[tokio::test]
async fn answer_question_turns_track_ready() {
    let engine = engine_with(|request| {
        let system = system_of(request);
        if system == prompts::NORMALIZE_SYSTEM {
            Ok(r#"["Sport"]"#.to_string())
        } else if system == prompts::BULK_SYSTEM {
            Ok(json!({"Sport": {"is_wide": true, "question": "Which one?", "branches": []}})
                .to_string())
        } else if system == prompts::HYPOTHESES_SYSTEM {
            // The refined topic carries the answer as parenthetical context.
            assert!(request.messages[1].content.contains("Sport (Climbing)"));
            Ok(json!([{
                "title": "Crash Pad",
                "search_queries": ["bouldering crash pad"]
            }])
            .to_string())
        } else {
            Err("unexpected call".to_string())
        }
    })
    .await;

    let session = engine
        .init_session(QuizAnswers::from_interests(vec!["Sport".to_string()]), None)
        .await
        .unwrap();
    let track_id = session.tracks[0].id.clone();

    let session = engine
        .interact(
            &session.id,
            InteractionRequest::AnswerQuestion {
                track_id: track_id.clone(),
                answer: "Climbing".to_string(),
            },
        )
        .await
        .unwrap();

    let track = session.tracks.iter().find(|t| t.id == track_id).unwrap();
    assert_eq!(track.status, TrackStatus::Ready);
    assert!(track.question.is_none());
    assert_eq!(track.topic, "Sport"); // display topic is unchanged
    assert_eq!(track.hypotheses[0].title, "Crash Pad");
}

#[tokio::test]
async fn load_more_is_strictly_additive() {
    let engine = engine_with(coffee_script).await;
    let session = engine.init_session(coffee_quiz(), None).await.unwrap();
    let track_id = session.tracks[0].id.clone();
    let before: HashSet<Uuid> = session.tracks[0].hypotheses.iter().map(|h| h.id).collect();

    let session = engine
        .interact(
            &session.id,
            InteractionRequest::LoadMore {
                track_id: track_id.clone(),
            },
        )
        .await
        .unwrap();

    let track = session.tracks.iter().find(|t| t.id == track_id).unwrap();
    assert!(track.hypotheses.len() >= before.len());
    let after: HashSet<Uuid> = track.hypotheses.iter().map(|h| h.id).collect();
    assert!(before.is_subset(&after));
    assert!(track.hypotheses.iter().any(|h| h.title == "Espresso Scale"));
}

#[tokio::test]
async fn load_more_failure_leaves_track_unchanged() {
    let engine = engine_with(|request| {
        let system = system_of(request);
        if system == prompts::NORMALIZE_SYSTEM {
            Ok(r#"["Coffee"]"#.to_string())
        } else if system == prompts::BULK_SYSTEM {
            Ok(coffee_bulk_response())
        } else {
            Err("llm down".to_string())
        }
    })
    .await;

    let session = engine.init_session(coffee_quiz(), None).await.unwrap();
    let track_id = session.tracks[0].id.clone();

    let session = engine
        .interact(&session.id, InteractionRequest::LoadMore { track_id })
        .await
        .unwrap();
    assert_eq!(session.tracks[0].hypotheses.len(), 1);
}

#[tokio::test]
async fn like_triggers_deep_dive_and_unlike_restores_sets() {
    let engine = engine_with(coffee_script).await;
    let session = engine.init_session(coffee_quiz(), None).await.unwrap();
    let hypothesis_id = session.tracks[0].hypotheses[0].id;
    let liked_before = session.profile.liked_hypotheses.clone();

    let session = engine
        .interact(&session.id, InteractionRequest::Like { hypothesis_id })
        .await
        .unwrap();
    assert!(session.profile.liked_hypotheses.contains(&hypothesis_id));
    assert_eq!(session.profile.liked_labels, vec!["AeroPress Kit"]);
    assert_eq!(session.selected_hypothesis_id, Some(hypothesis_id));
    // Deep dive replaced the preview list with the globally ranked result.
    assert!(session.tracks[0].hypotheses[0]
        .products
        .iter()
        .any(|p| p.id == "aeropress-go"));

    // like twice stays idempotent
    let session = engine
        .interact(&session.id, InteractionRequest::Like { hypothesis_id })
        .await
        .unwrap();
    assert_eq!(session.profile.liked_hypotheses.len(), 1);

    let session = engine
        .interact(&session.id, InteractionRequest::Unlike { hypothesis_id })
        .await
        .unwrap();
    assert_eq!(session.profile.liked_hypotheses, liked_before);
    assert!(session.profile.liked_labels.is_empty());
}

#[tokio::test]
async fn dislike_undislike_round_trip() {
    let engine = engine_with(coffee_script).await;
    let session = engine.init_session(coffee_quiz(), None).await.unwrap();
    let hypothesis_id = session.tracks[0].hypotheses[0].id;

    let session = engine
        .interact(&session.id, InteractionRequest::Dislike { hypothesis_id })
        .await
        .unwrap();
    assert!(session.profile.ignored_hypotheses.contains(&hypothesis_id));
    assert_eq!(session.profile.ignored_labels, vec!["AeroPress Kit"]);

    let session = engine
        .interact(&session.id, InteractionRequest::Undislike { hypothesis_id })
        .await
        .unwrap();
    assert!(session.profile.ignored_hypotheses.is_empty());
    assert!(session.profile.ignored_labels.is_empty());
}

#[tokio::test]
async fn view_moves_navigation_cursors() {
    let engine = engine_with(coffee_script).await;
    let session = engine.init_session(coffee_quiz(), None).await.unwrap();
    let track_id = session.tracks[0].id.clone();
    let hypothesis_id = session.tracks[0].hypotheses[0].id;

    let session = engine
        .interact(
            &session.id,
            InteractionRequest::ViewHypothesis {
                track_id: track_id.clone(),
                hypothesis_id,
            },
        )
        .await
        .unwrap();
    assert_eq!(session.selected_track_id, Some(track_id));
    assert_eq!(session.selected_hypothesis_id, Some(hypothesis_id));
}

#[tokio::test]
async fn unknown_hypothesis_is_not_found() {
    let engine = engine_with(coffee_script).await;
    let session = engine.init_session(coffee_quiz(), None).await.unwrap();

    let err = engine
        .interact(
            &session.id,
            InteractionRequest::Like {
                hypothesis_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::HypothesisNotFound { .. }));
}

#[tokio::test]
async fn missing_session_is_terminal() {
    let engine = engine_with(coffee_script).await;
    let err = engine
        .interact(
            "no-such-session",
            InteractionRequest::Comment {
                text: "hello".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::SessionNotFound { .. }));
}

#[tokio::test]
async fn select_gift_and_suggest_topics_stay_off_track_state() {
    let engine = engine_with(coffee_script).await;
    let session = engine.init_session(coffee_quiz(), None).await.unwrap();
    let tracks_before = session.tracks.clone();

    let session = engine
        .interact(
            &session.id,
            InteractionRequest::SelectGift {
                product_id: "aeropress-go".to_string(),
            },
        )
        .await
        .unwrap();
    let session = engine
        .interact(
            &session.id,
            InteractionRequest::SuggestTopics {
                topics: vec!["Tea".to_string(), "tea".to_string()],
            },
        )
        .await
        .unwrap();

    assert_eq!(session.profile.shortlist, vec!["aeropress-go"]);
    assert_eq!(session.profile.suggested_topics, vec!["Tea"]);
    assert_eq!(session.tracks.len(), tracks_before.len());
    assert_eq!(
        session.tracks[0].hypotheses.len(),
        tracks_before[0].hypotheses.len()
    );
}

#[tokio::test]
async fn interaction_history_never_exceeds_cap() {
    let engine = engine_with(coffee_script).await;
    let session = engine.init_session(coffee_quiz(), None).await.unwrap();

    let mut last = session;
    for i in 0..35 {
        last = engine
            .interact(
                &last.id,
                InteractionRequest::Comment {
                    text: format!("note {i}"),
                },
            )
            .await
            .unwrap();
    }
    assert_eq!(last.profile.interactions.len(), 30);
}
