//! Context assembly.
//!
//! A context document is made of these sections, in order:
//!
//! 1. **Header**: one line naming the request
//! 2. **Current Model State**: live adapter data, when connected
//! 3. **Relevant Knowledge**: similar operations, patterns, error fixes
//! 4. **Recent Events**: the tail of the event bus history
//! 5. **Purpose guidance**: analysis, optimization or variant guidance
//! 6. **User Request**: the arguments, pretty-printed
//!
//! Sections are separated by a blank line and omitted when empty. No
//! failure of a collaborator aborts assembly: the affected section is
//! dropped and a warning logged.

use crate::cache::{ContextCache, DEFAULT_CACHE_TTL};
use crate::purpose::Purpose;
use crate::sections::{self, ModelState, section};
use cadlens_core::adapter::CadAdapter;
use cadlens_core::event::EventBus;
use cadlens_core::{Payload, canonical_json};
use cadlens_knowledge::KnowledgeStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tunables for the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    /// Freshness window for cached documents.
    pub cache_ttl: Duration,
    pub similar_operations: usize,
    pub design_patterns: usize,
    pub error_solutions: usize,
    pub recent_events: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            similar_operations: 3,
            design_patterns: 3,
            error_solutions: 3,
            recent_events: 5,
        }
    }
}

/// Composes model state, knowledge and event history into one document.
pub struct ContextBuilder {
    knowledge: Arc<KnowledgeStore>,
    events: Option<EventBus>,
    settings: ContextSettings,
    cache: ContextCache,
}

impl ContextBuilder {
    pub fn new(
        knowledge: Arc<KnowledgeStore>,
        events: Option<EventBus>,
        settings: ContextSettings,
    ) -> Self {
        let cache = ContextCache::new(settings.cache_ttl);
        Self {
            knowledge,
            events,
            settings,
            cache,
        }
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Build a fresh document for `purpose` and cache it.
    pub async fn build_context(
        &self,
        adapter: Option<&dyn CadAdapter>,
        purpose: &Purpose,
        arguments: &Payload,
    ) -> String {
        let mut parts = vec![purpose.header()];

        if let Some(adapter) = adapter.filter(|a| a.is_connected()) {
            if let Some(state) = self.model_state(adapter).await {
                parts.push(section("Current Model State", &sections::model_state(&state)));
            }
        }

        let knowledge = self.knowledge_section(purpose, arguments).await;
        if !knowledge.is_empty() {
            parts.push(section("Relevant Knowledge", &knowledge));
        }

        if let Some(events) = self.events_section() {
            parts.push(section("Recent Events", &events));
        }

        if let Some((heading, body)) = self.purpose_section(adapter, purpose, arguments).await {
            parts.push(section(heading, &body));
        }

        let request = serde_json::to_string_pretty(&Value::Object(arguments.clone()))
            .unwrap_or_else(|_| "{}".to_string());
        parts.push(section("User Request", &request));

        let context = parts.join("\n\n");
        self.cache.insert(purpose, arguments, context.clone());
        debug!(purpose = %purpose, chars = context.len(), "Built context");
        context
    }

    /// The cached document for this request, if still fresh.
    pub fn get_cached(&self, purpose: &Purpose, arguments: &Payload) -> Option<String> {
        self.cache.get(purpose, arguments)
    }

    /// Serve from cache when fresh, otherwise build.
    pub async fn build_or_cached(
        &self,
        adapter: Option<&dyn CadAdapter>,
        purpose: &Purpose,
        arguments: &Payload,
    ) -> String {
        match self.get_cached(purpose, arguments) {
            Some(context) => {
                debug!(purpose = %purpose, "Serving cached context");
                context
            }
            None => self.build_context(adapter, purpose, arguments).await,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Context cache cleared");
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop expired cache entries, returning how many went.
    pub fn prune_cache(&self) -> usize {
        self.cache.prune()
    }

    async fn model_state(&self, adapter: &dyn CadAdapter) -> Option<ModelState> {
        let info = match adapter.model_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!(adapter = adapter.name(), error = %e, "Model info unavailable");
                return None;
            }
        };

        let features = adapter
            .features()
            .await
            .inspect_err(|e| warn!(error = %e, "Features unavailable"))
            .ok();
        let configurations = adapter
            .configurations()
            .await
            .inspect_err(|e| warn!(error = %e, "Configurations unavailable"))
            .ok();
        // Parts without solid bodies have no mass properties; not worth a warning.
        let mass = adapter
            .mass_properties()
            .await
            .inspect_err(|e| debug!(error = %e, "Mass properties unavailable"))
            .ok();

        Some(ModelState {
            info,
            features,
            configurations,
            mass,
        })
    }

    async fn knowledge_section(&self, purpose: &Purpose, arguments: &Payload) -> String {
        let mut blocks = Vec::new();

        let query = format!(
            "{} {}",
            purpose.name(),
            canonical_json(&Value::Object(arguments.clone()))
        );
        match self
            .knowledge
            .find_similar_operations(&query, self.settings.similar_operations, None)
            .await
        {
            Ok(hits) if !hits.is_empty() => blocks.push(sections::similar_operations(&hits)),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Similar operation lookup failed"),
        }

        if *purpose == Purpose::OptimizeDesign {
            if let Some(goal) = sections::optimization_goal(arguments) {
                match self
                    .knowledge
                    .find_design_patterns(&goal, None, self.settings.design_patterns)
                    .await
                {
                    Ok(hits) if !hits.is_empty() => blocks.push(sections::design_patterns(&hits)),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Design pattern lookup failed"),
                }
            }
        }

        let recent_error = self
            .events
            .as_ref()
            .and_then(|bus| bus.latest_matching(|e| e.kind.is_error()))
            .and_then(|event| sections::error_message(&event));
        if let Some(message) = recent_error {
            match self
                .knowledge
                .find_error_solutions(&message, None, self.settings.error_solutions)
                .await
            {
                Ok(hits) if !hits.is_empty() => blocks.push(sections::error_solutions(&hits)),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Error solution lookup failed"),
            }
        }

        blocks.join("\n\n")
    }

    fn events_section(&self) -> Option<String> {
        let bus = self.events.as_ref()?;
        let recent = bus.history(None, self.settings.recent_events);
        if recent.is_empty() {
            return None;
        }
        Some(sections::recent_events(&recent, &bus.statistics()))
    }

    async fn purpose_section(
        &self,
        adapter: Option<&dyn CadAdapter>,
        purpose: &Purpose,
        arguments: &Payload,
    ) -> Option<(&'static str, String)> {
        match purpose {
            Purpose::AnalyzeModel => {
                Some(("Analysis Guidance", sections::analysis_guidance(arguments)))
            }
            Purpose::OptimizeDesign => {
                Some(("Optimization Strategy", sections::optimization_strategy(arguments)))
            }
            Purpose::CreateVariants => {
                let features = match adapter.filter(|a| a.is_connected()) {
                    Some(adapter) => adapter
                        .features()
                        .await
                        .inspect_err(|e| warn!(error = %e, "Features unavailable for variants"))
                        .ok(),
                    None => None,
                };
                Some((
                    "Variant Generation",
                    sections::variant_generation(arguments, features.as_deref()),
                ))
            }
            Purpose::Custom(_) => None,
        }
    }
}
