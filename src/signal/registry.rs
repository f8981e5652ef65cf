//! Signal registry: pack construction, caching, and per-chunk lookup.
//!
//! Packs are built from monolith slices and cached in a bounded TTL+LRU
//! cache keyed by `(policy area, slice fingerprint)`, so a modified
//! monolith can never serve stale packs. The registry is shared across
//! document workers; the caches are internally synchronized and the
//! hit/miss statistics sit behind a read-preferring lock.

use crate::config::SignalConfig;
use crate::error::Result;
use crate::graph::Chunk;
use crate::ids::PolicyArea;
use crate::signal::monolith::MonolithProvider;
use crate::signal::pack::{
    ChunkContext, FilterStats, MatchMode, ResolvedSignal, SignalPack, SignalPattern,
};
use moka::sync::Cache;
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::warn;

/// Cache statistics exposed for the run's diagnostic log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    /// Pack cache hits.
    pub hits: u64,
    /// Pack cache misses (pack rebuilt from the monolith).
    pub misses: u64,
    /// Age in seconds of the most recent cache hit's entry.
    pub last_hit_age_s: Option<u64>,
}

/// The signal registry.
pub struct SignalRegistry {
    provider: Arc<MonolithProvider>,
    ttl_s: u64,
    pack_cache: Cache<String, (Arc<SignalPack>, Instant)>,
    chunk_cache: Cache<String, Arc<Vec<ResolvedSignal>>>,
    stats: RwLock<RegistryStats>,
}

impl SignalRegistry {
    /// Creates a registry over a loaded monolith provider.
    #[must_use]
    pub fn new(provider: Arc<MonolithProvider>, config: &SignalConfig) -> Self {
        let pack_cache = Cache::builder()
            .max_capacity(config.signal_cache_size)
            .time_to_live(std::time::Duration::from_secs(config.signal_cache_ttl_s))
            .build();
        let chunk_cache = Cache::builder()
            .max_capacity(config.signal_cache_size * 8)
            .time_to_live(std::time::Duration::from_secs(config.signal_cache_ttl_s))
            .build();
        Self {
            provider,
            ttl_s: config.signal_cache_ttl_s,
            pack_cache,
            chunk_cache,
            stats: RwLock::new(RegistryStats::default()),
        }
    }

    /// Returns the signal pack for a policy area, building it on miss.
    ///
    /// The cache key includes the monolith slice fingerprint, so packs
    /// built from an older monolith can never be returned.
    ///
    /// # Errors
    ///
    /// Returns an error if pack construction fails.
    pub fn pack_for(&self, pa: PolicyArea) -> Result<Arc<SignalPack>> {
        let fingerprint = self.provider.fingerprint_for(pa).to_string();
        let key = format!("{pa}:{fingerprint}");

        if let Some((pack, inserted_at)) = self.pack_cache.get(&key) {
            if let Ok(mut stats) = self.stats.write() {
                stats.hits += 1;
                stats.last_hit_age_s = Some(inserted_at.elapsed().as_secs());
            }
            return Ok(pack);
        }

        let pack = Arc::new(self.build_pack(pa, fingerprint)?);
        self.pack_cache.insert(key, (Arc::clone(&pack), Instant::now()));
        if let Ok(mut stats) = self.stats.write() {
            stats.misses += 1;
        }
        Ok(pack)
    }

    /// Filters a pack's patterns for a chunk context.
    ///
    /// # Errors
    ///
    /// Propagates pack construction errors.
    pub fn filter_for_context(
        &self,
        pa: PolicyArea,
        context: &ChunkContext,
    ) -> Result<(Vec<SignalPattern>, FilterStats)> {
        let pack = self.pack_for(pa)?;
        Ok(pack.filter_for_context(context))
    }

    /// Resolves the signals relevant to a chunk for the required types.
    ///
    /// Results are LRU-cached per (chunk id, required types, fingerprint).
    /// Always returns a list (possibly empty per type is an error at the
    /// irrigation layer, not here).
    ///
    /// # Errors
    ///
    /// Propagates pack construction errors.
    pub fn signals_for_chunk(
        &self,
        chunk: &Chunk,
        pa: PolicyArea,
        required_types: &[String],
    ) -> Result<Arc<Vec<ResolvedSignal>>> {
        let fingerprint = self.provider.fingerprint_for(pa);
        let key = format!("{}:{}:{}", chunk.id, required_types.join(","), fingerprint);
        if let Some(cached) = self.chunk_cache.get(&key) {
            return Ok(cached);
        }

        let pack = self.pack_for(pa)?;
        let context = ChunkContext {
            section: chunk.policy.eje.clone(),
            chapter: chunk.policy.programa.clone(),
            policy_area: chunk.policy_area_id.clone(),
        };
        let (applicable, _) = pack.filter_for_context(&context);

        let mut signals = Vec::with_capacity(required_types.len());
        for signal_type in required_types {
            signals.push(resolve_signal(signal_type, pa, &applicable));
        }

        let signals = Arc::new(signals);
        self.chunk_cache.insert(key, Arc::clone(&signals));
        Ok(signals)
    }

    /// Snapshot of the registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.stats.read().map(|s| *s).unwrap_or_default()
    }

    /// Pack TTL in seconds.
    #[must_use]
    pub const fn ttl_s(&self) -> u64 {
        self.ttl_s
    }

    /// The monolith provider behind this registry.
    #[must_use]
    pub fn provider(&self) -> &MonolithProvider {
        &self.provider
    }

    /// Builds a pack from the monolith slice for one policy area.
    fn build_pack(&self, pa: PolicyArea, fingerprint: String) -> Result<SignalPack> {
        let questions = self.provider.questions_for(pa);
        let mut patterns = Vec::new();
        for question in questions {
            for (index, raw) in question.patterns.iter().enumerate() {
                match pattern_from_value(raw, pa, question.question_global, index) {
                    Some(pattern) => patterns.push(pattern),
                    None => {
                        warn!(
                            policy_area = %pa,
                            question_global = question.question_global,
                            pattern_index = index,
                            "skipping non-object pattern entry during pack build"
                        );
                    }
                }
            }
        }

        Ok(SignalPack {
            policy_area: pa,
            version: self.provider.monolith().schema_version.clone(),
            patterns,
            source_fingerprint: fingerprint,
            valid_from: None,
            valid_to: None,
            ttl_s: self.ttl_s,
        })
    }
}

/// Converts a raw monolith pattern dict into a typed pattern.
///
/// Returns `None` for non-object entries; field defaults are permissive
/// because the irrigation layer re-validates question patterns strictly.
fn pattern_from_value(
    raw: &Value,
    pa: PolicyArea,
    question_global: u32,
    index: usize,
) -> Option<SignalPattern> {
    let map = raw.as_object()?;
    let text = map
        .get("text")
        .or_else(|| map.get("pattern"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let id = map
        .get("id")
        .and_then(Value::as_str)
        .map_or_else(|| format!("{pa}-q{question_global}-p{index}"), str::to_string);
    let match_mode = match map.get("match_mode").and_then(Value::as_str) {
        Some("regex") => MatchMode::Regex,
        _ => MatchMode::Substring,
    };
    let weight = map
        .get("weight")
        .or_else(|| map.get("confidence"))
        .and_then(Value::as_f64)
        .unwrap_or(1.0)
        .clamp(0.0, 1.0);
    let category = map
        .get("category")
        .and_then(Value::as_str)
        .unwrap_or("general")
        .to_string();
    let expansions = map
        .get("expansions")
        .or_else(|| map.get("synonyms"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let context = map
        .get("context")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let expected_elements = map
        .get("expected_elements")
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    let failure_contract = map
        .get("failure_contract")
        .and_then(Value::as_str)
        .map(str::to_string);
    let policy_area_id = map
        .get("policy_area_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(SignalPattern {
        id,
        text,
        match_mode,
        weight,
        category,
        expansions,
        context,
        expected_elements,
        failure_contract,
        policy_area_id,
    })
}

/// Builds one resolved signal of the given type from applicable patterns.
fn resolve_signal(
    signal_type: &str,
    pa: PolicyArea,
    applicable: &[SignalPattern],
) -> ResolvedSignal {
    let payload = match signal_type {
        "patterns" => {
            let ids: Vec<&str> = applicable.iter().map(|p| p.id.as_str()).collect();
            json!({"patterns": ids, "count": ids.len()})
        }
        "expansions" => {
            let mut synonyms: Vec<&str> = applicable
                .iter()
                .flat_map(|p| p.expansions.iter().map(String::as_str))
                .collect();
            synonyms.sort_unstable();
            synonyms.dedup();
            json!({"synonyms": synonyms})
        }
        "expected_elements" => {
            let elements: Vec<Value> = applicable
                .iter()
                .filter_map(|p| p.expected_elements.as_ref())
                .filter_map(|schema| serde_json::to_value(schema).ok())
                .collect();
            json!({"elements": elements})
        }
        "failure_contract" => {
            let contracts: Vec<&str> = applicable
                .iter()
                .filter_map(|p| p.failure_contract.as_deref())
                .collect();
            json!({"contract": contracts})
        }
        // Unknown types resolve to an empty payload; the irrigation
        // layer's per-type field validation turns that into a hard stop.
        _ => json!({}),
    };

    ResolvedSignal {
        signal_type: signal_type.to_string(),
        name: format!("{pa}:{signal_type}"),
        payload,
    }
}
