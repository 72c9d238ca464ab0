use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::{Config, get_config_dir};
use crate::domains::{Domain, ScholarshipDomain, UniversityDomain};
use crate::embeddings::HfInferenceClient;
use crate::engine::{RagEngine, RagResponse};
use crate::query::StudentProfile;
use crate::store::SupabaseClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DomainArg {
    Scholarships,
    Universities,
}

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir().context("Failed to resolve config directory")?;
    Config::load(config_dir)
}

fn build_engine<D: Domain>(config: &Config) -> Result<RagEngine<D>> {
    let store = SupabaseClient::new(&config.supabase).context("Failed to create record store")?;
    let embedder =
        HfInferenceClient::new(&config.embeddings).context("Failed to create embedding client")?;

    Ok(RagEngine::new(Arc::new(store), Arc::new(embedder))
        .with_top_k(config.retrieval.top_k)
        .with_batch_size(config.embeddings.batch_size as usize))
}

fn load_profile(path: Option<&Path>) -> Result<Option<StudentProfile>> {
    let Some(path) = path else {
        return Ok(None);
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile file: {}", path.display()))?;
    let profile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse profile file: {}", path.display()))?;

    Ok(Some(profile))
}

fn print_response<S: serde::Serialize>(response: &RagResponse<S>) -> Result<()> {
    if response.relevant_docs.is_empty() {
        println!("No matching documents.");
        return Ok(());
    }

    for (position, doc) in response.relevant_docs.iter().enumerate() {
        println!("--- Match {} ---", position + 1);
        println!("{}", doc);
        println!();
    }

    println!("Sources:");
    let sources =
        serde_json::to_string_pretty(&response.sources).context("Failed to render sources")?;
    println!("{}", sources);

    Ok(())
}

async fn query_domain<D: Domain>(
    config: &Config,
    question: &str,
    profile: Option<&StudentProfile>,
) -> Result<()> {
    let engine = build_engine::<D>(config)?;
    let response = engine.query(question, profile).await;
    print_response(&response)
}

/// Run a one-off retrieval query and print the matches
#[inline]
pub async fn run_query(domain: DomainArg, question: &str, profile_path: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let profile = load_profile(profile_path)?;

    match domain {
        DomainArg::Scholarships => {
            query_domain::<ScholarshipDomain>(&config, question, profile.as_ref()).await
        }
        DomainArg::Universities => {
            query_domain::<UniversityDomain>(&config, question, profile.as_ref()).await
        }
    }
}

async fn refresh_domain<D: Domain>(config: &Config) -> Result<()> {
    let engine = build_engine::<D>(config)?;
    engine.refresh().await?;
    println!("Rebuilt {} index from record store.", D::LABEL);
    Ok(())
}

/// Rebuild a domain's index from the latest record store contents
#[inline]
pub async fn run_refresh(domain: DomainArg) -> Result<()> {
    let config = load_config()?;

    match domain {
        DomainArg::Scholarships => refresh_domain::<ScholarshipDomain>(&config).await,
        DomainArg::Universities => refresh_domain::<UniversityDomain>(&config).await,
    }
}

async fn upsert_domain<D: Domain>(config: &Config, row: Value) -> Result<()> {
    let record: D::Record = serde_json::from_value(row)
        .with_context(|| format!("Record does not match the {} table shape", D::TABLE))?;

    let engine = build_engine::<D>(config)?;
    if engine.upsert_record(&record).await {
        println!(
            "Upserted {} record {}.",
            D::LABEL,
            D::record_id(&record).unwrap_or("<unknown>")
        );
    } else {
        println!("Failed to upsert {} record.", D::LABEL);
    }
    Ok(())
}

/// Insert or update a record from a JSON file, then rebuild the index
#[inline]
pub async fn run_upsert(domain: DomainArg, file: &Path) -> Result<()> {
    let config = load_config()?;

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read record file: {}", file.display()))?;
    let mut row: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse record file: {}", file.display()))?;

    // new records get an id before they hit the store
    if let Some(object) = row.as_object_mut() {
        let missing_id = object.get("id").is_none_or(Value::is_null);
        if missing_id {
            let id = Uuid::new_v4().to_string();
            info!("Assigning generated id {} to new record", id);
            object.insert("id".to_string(), Value::String(id));
        }
    }

    match domain {
        DomainArg::Scholarships => upsert_domain::<ScholarshipDomain>(&config, row).await,
        DomainArg::Universities => upsert_domain::<UniversityDomain>(&config, row).await,
    }
}

/// Print the active configuration with secrets redacted
#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = get_config_dir().context("Failed to resolve config directory")?;
    let mut config = Config::load(&config_dir)?;

    if !config.supabase.service_role_key.is_empty() {
        config.supabase.service_role_key = "<redacted>".to_string();
    }
    if !config.embeddings.api_key.is_empty() {
        config.embeddings.api_key = "<redacted>".to_string();
    }

    println!("Config directory: {}", config_dir.display());
    println!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render config")?
    );

    Ok(())
}
