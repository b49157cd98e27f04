use std::{env, sync::Once};

use rustydigest::{
    config,
    pipeline::{AnalysisCategory, AnalysisSection, DigestApi, DigestService, PipelineOverrides},
    summarization::{Summarizer, SummaryKind, get_summarizer},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() -> &'static config::Config {
    INIT.call_once(|| {
        set_default_env("SUMMARIZATION_PROVIDER", "ollama");
        set_default_env("SUMMARIZATION_MODEL", "llama3.1");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        set_default_env("PIPELINE_CHUNK_SIZE", "100");
        set_default_env("PIPELINE_TOKEN_MAX", "200");
        config::init_config().expect("live configuration");
    });
    config::get_config()
}

fn long_document() -> String {
    (1..=12)
        .map(|n| {
            format!(
                "Section {n}. The quarterly review covered hiring, infrastructure spend and \
                 customer churn. Item {n} focused on reducing deploy times across regions."
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
#[ignore = "Requires live Ollama"]
async fn live_ollama_single_summary() {
    let config = init_config_once();
    let summarizer = get_summarizer(config).expect("summarizer");
    let summary = summarizer
        .summarize(
            SummaryKind::Map,
            "Rust is a systems language focused on safety and speed.",
        )
        .await
        .expect("failed to request summary from provider");
    assert!(!summary.trim().is_empty(), "summary should not be empty");
}

#[tokio::test]
#[ignore = "Requires live Ollama"]
async fn live_ollama_full_digest_run() {
    let config = init_config_once();
    let service = DigestService::from_config(config).expect("service");
    let sections = vec![AnalysisSection::new(
        AnalysisCategory::Functional,
        "Deploy pipeline has three manual approval steps.",
    )];

    let summary = service
        .summarize(long_document(), sections, PipelineOverrides::default())
        .await
        .expect("digest run");

    assert!(summary.chunk_count > 1, "document should span several chunks");
    assert!(!summary.final_summary.trim().is_empty());
    assert_eq!(service.metrics_snapshot().runs_completed, 1);
}
