//! Appealflow - 保险拒赔申诉工作流
//!
//! 用法：`appealflow <case.json> [rules.json]`
//! 入口：初始化日志、加载配置、打开模式记忆、运行工作流并以 JSON 打印最终状态。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use appealflow::case::{CaseDocuments, PolicyRules};
use appealflow::config::{load_config, AppConfig};
use appealflow::core::{create_llm_from_config, AppealOrchestrator};
use appealflow::llm::LlmClient;
use appealflow::memory::SqlitePatternStore;
use appealflow::observability;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let mut args = std::env::args().skip(1);
    let case_path = args
        .next()
        .context("Usage: appealflow <case.json> [rules.json]")?;
    let documents: CaseDocuments = read_json(Path::new(&case_path))?;
    let rules = match args.next() {
        Some(path) => read_json(Path::new(&path))?,
        None => PolicyRules::default(),
    };

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let llm = create_llm_from_config(&cfg);
    let mut orchestrator = AppealOrchestrator::with_llm(
        llm.clone(),
        Duration::from_secs(cfg.llm.timeouts.request),
        cfg.workflow.max_iterations,
    )
    .context("Failed to build appeal workflow")?
    .with_suggestion_threshold(cfg.memory.suggestion_threshold);

    if cfg.memory.enabled {
        let db_path = match &cfg.app.data_dir {
            Some(dir) if cfg.memory.database_path.is_relative() => {
                dir.join(cfg.memory.database_path.file_name().unwrap_or_default())
            }
            _ => cfg.memory.database_path.clone(),
        };
        match SqlitePatternStore::open(&db_path) {
            Ok(store) => orchestrator = orchestrator.with_memory(Arc::new(store)),
            Err(e) => tracing::warn!(
                "Pattern memory unavailable at {} ({}), continuing without it",
                db_path.display(),
                e
            ),
        }
    }

    let final_state = orchestrator
        .run_workflow(documents, rules)
        .await
        .context("Appeal workflow failed")?;

    let usage = llm.token_usage();
    tracing::info!(
        "Workflow finished ({}). Token usage: prompt={}, completion={}, total={}",
        final_state.termination_reason(),
        usage.prompt,
        usage.completion,
        usage.total()
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&final_state).context("Failed to serialize final state")?
    );
    Ok(())
}
