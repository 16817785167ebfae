use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use giftscout::catalog::LibSqlCatalog;
use giftscout::config::{DiscoveryConfig, RetrievalConfig};
use giftscout::discovery::{DiscoveryEngine, InteractionRequest};
use giftscout::embedding::{JinaClient, JinaConfig};
use giftscout::llm::{LlmBackend, LlmConfig, create_provider};
use giftscout::session::{LibSqlSessionStore, QuizAnswers};
use giftscout::store::LibSqlStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ── LLM provider ────────────────────────────────────────────────
    let backend = match std::env::var("GIFTSCOUT_LLM_BACKEND").as_deref() {
        Ok("openai") => LlmBackend::OpenAi,
        _ => LlmBackend::Anthropic,
    };
    let key_var = match backend {
        LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        LlmBackend::OpenAi => "OPENAI_API_KEY",
    };
    let api_key = std::env::var(key_var).unwrap_or_else(|_| {
        eprintln!("Error: {key_var} not set");
        std::process::exit(1);
    });
    let model = std::env::var("GIFTSCOUT_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let llm = create_provider(&LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model: model.clone(),
    })?;

    // ── Embedding / rerank client ───────────────────────────────────
    let jina_key = std::env::var("JINA_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: JINA_API_KEY not set");
        std::process::exit(1);
    });
    let embeddings = Arc::new(JinaClient::new(JinaConfig::new(
        secrecy::SecretString::from(jina_key),
    ))?);

    // ── Storage ─────────────────────────────────────────────────────
    let data_dir = std::env::var("GIFTSCOUT_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let config = DiscoveryConfig::default();

    let catalog = Arc::new(
        LibSqlCatalog::new_local(std::path::Path::new(&format!("{data_dir}/catalog.db"))).await?,
    );
    let sessions = Arc::new(
        LibSqlSessionStore::new_local(
            std::path::Path::new(&format!("{data_dir}/sessions.db")),
            config.session_ttl,
        )
        .await?,
    );
    let store = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&format!("{data_dir}/giftscout.db"))).await?,
    );

    let engine = DiscoveryEngine::new(
        llm,
        embeddings,
        catalog,
        sessions,
        store,
        config,
        RetrievalConfig::default(),
    );

    eprintln!("🎁 GiftScout v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {model}");
    eprintln!("   Data: {data_dir}");
    eprintln!("   Enter comma-separated interests to start, then:");
    eprintln!("   like <hypothesis-id> | dislike <hypothesis-id> | more <track-id>");
    eprintln!("   answer <track-id> <text> | view <track-id> <hypothesis-id>");
    eprintln!("   select <product-id> | topics <a,b> | quit\n");

    run_repl(engine).await
}

/// Minimal stdin/stdout loop for driving a session locally.
async fn run_repl(engine: DiscoveryEngine) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();
    let mut session_id: Option<String> = None;

    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        if line == "quit" {
            break;
        }

        let result = match session_id.clone() {
            None => {
                let interests: Vec<String> = line
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                let session = engine
                    .init_session(QuizAnswers::from_interests(interests), None)
                    .await;
                session.map(|s| {
                    session_id = Some(s.id.clone());
                    s
                })
            }
            Some(id) => match parse_command(&line) {
                Some(request) => engine.interact(&id, request).await,
                None => {
                    eprintln!("Unrecognized command");
                    eprint!("> ");
                    continue;
                }
            },
        };

        match result {
            Ok(session) => {
                println!("{}", serde_json::to_string_pretty(&session.view())?);
            }
            Err(e) => eprintln!("Error: {e}"),
        }
        eprint!("> ");
    }
    Ok(())
}

fn parse_command(line: &str) -> Option<InteractionRequest> {
    let mut parts = line.splitn(3, ' ');
    let verb = parts.next()?;
    match verb {
        "view" => Some(InteractionRequest::ViewHypothesis {
            track_id: parts.next()?.to_string(),
            hypothesis_id: Uuid::parse_str(parts.next()?).ok()?,
        }),
        "like" => Some(InteractionRequest::Like {
            hypothesis_id: Uuid::parse_str(parts.next()?).ok()?,
        }),
        "unlike" => Some(InteractionRequest::Unlike {
            hypothesis_id: Uuid::parse_str(parts.next()?).ok()?,
        }),
        "dislike" => Some(InteractionRequest::Dislike {
            hypothesis_id: Uuid::parse_str(parts.next()?).ok()?,
        }),
        "undislike" => Some(InteractionRequest::Undislike {
            hypothesis_id: Uuid::parse_str(parts.next()?).ok()?,
        }),
        "more" => Some(InteractionRequest::LoadMore {
            track_id: parts.next()?.to_string(),
        }),
        "answer" => Some(InteractionRequest::AnswerQuestion {
            track_id: parts.next()?.to_string(),
            answer: parts.next()?.to_string(),
        }),
        "select" => Some(InteractionRequest::SelectGift {
            product_id: parts.next()?.to_string(),
        }),
        "topics" => Some(InteractionRequest::SuggestTopics {
            topics: parts
                .next()?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
        }),
        _ => None,
    }
}
