//! # Key Resolver
//!
//! Generalizes `psenger_throttler::key_generator::{KeyGenerator, KeyStrategy}`
//! into a registry of pure, named functions: a `Rule` carries a
//! `key_strategy_id` string rather than a `KeyStrategy` value, so rule sets
//! stay plain serializable data and new resolvers can be registered without
//! touching the `Rule` schema.

use crate::error::{FluxGateError, Result};
use crate::model::{RateLimitKey, RequestContext, Scope};
use std::collections::HashMap;
use std::sync::Arc;

/// A pure function from request context to rate-limit key. No I/O, no time,
/// no mutable state.
pub trait KeyResolver: Send + Sync {
    /// Returns `None` when the context lacks the attribute this resolver
    /// needs (e.g. no authenticated user on a `per-user` rule); callers
    /// treat a missing key as "this rule does not apply" rather than an error.
    fn resolve(&self, context: &RequestContext) -> Option<RateLimitKey>;
}

struct GlobalResolver;
impl KeyResolver for GlobalResolver {
    fn resolve(&self, _context: &RequestContext) -> Option<RateLimitKey> {
        Some(RateLimitKey::new("global"))
    }
}

struct IpResolver;
impl KeyResolver for IpResolver {
    fn resolve(&self, context: &RequestContext) -> Option<RateLimitKey> {
        context.client_ip.as_deref().map(sanitize).map(RateLimitKey::new)
    }
}

struct UserResolver;
impl KeyResolver for UserResolver {
    fn resolve(&self, context: &RequestContext) -> Option<RateLimitKey> {
        context.user_id.as_deref().map(sanitize).map(RateLimitKey::new)
    }
}

struct ApiKeyResolver;
impl KeyResolver for ApiKeyResolver {
    fn resolve(&self, context: &RequestContext) -> Option<RateLimitKey> {
        context.api_key.as_deref().map(sanitize).map(RateLimitKey::new)
    }
}

/// Reads a named attribute from `RequestContext::attributes`, for
/// deployments whose subject identity lives outside the built-in fields
/// (the `Custom` scope).
struct CustomAttributeResolver {
    attribute_name: String,
}
impl KeyResolver for CustomAttributeResolver {
    fn resolve(&self, context: &RequestContext) -> Option<RateLimitKey> {
        context.attributes.get(&self.attribute_name).map(|v| sanitize(v)).map(RateLimitKey::new)
    }
}

/// Concatenates several resolvers' keys with `:`, skipping the whole
/// composite (returning `None`) if any component resolver can't produce one —
/// a composite key is only meaningful when every part is present.
struct CompositeResolver {
    components: Vec<Arc<dyn KeyResolver>>,
}
impl KeyResolver for CompositeResolver {
    fn resolve(&self, context: &RequestContext) -> Option<RateLimitKey> {
        let mut parts = Vec::with_capacity(self.components.len());
        for component in &self.components {
            parts.push(component.resolve(context)?.as_str().to_string());
        }
        Some(RateLimitKey::new(parts.join(":")))
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ':' || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

/// Registry mapping `key_strategy_id` to a resolver. Built once at startup;
/// an id absent from the registry is fatal only the first time a rule that
/// names it is actually evaluated — lazy rather than eager validation
/// avoids rejecting valid rule sets that use resolvers registered after
/// this process's other rule sets were loaded.
pub struct KeyResolverRegistry {
    resolvers: HashMap<String, Arc<dyn KeyResolver>>,
}

impl KeyResolverRegistry {
    /// Registers the built-in resolver for each `Scope` variant under its
    /// conventional id (`"global"`, `"per-ip"`, `"per-user"`, `"per-api-key"`).
    pub fn with_defaults() -> Self {
        let mut registry = Self { resolvers: HashMap::new() };
        registry.register("global", Arc::new(GlobalResolver));
        registry.register("per-ip", Arc::new(IpResolver));
        registry.register("per-user", Arc::new(UserResolver));
        registry.register("per-api-key", Arc::new(ApiKeyResolver));
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, resolver: Arc<dyn KeyResolver>) {
        self.resolvers.insert(id.into(), resolver);
    }

    /// Registers a resolver that reads `attribute_name` from
    /// `RequestContext::attributes`, under `id`.
    pub fn register_custom_attribute(&mut self, id: impl Into<String>, attribute_name: impl Into<String>) {
        self.register(
            id,
            Arc::new(CustomAttributeResolver { attribute_name: attribute_name.into() }),
        );
    }

    /// Registers a composite resolver under `id` that joins the keys of
    /// `component_ids` (each of which must already be registered) with `:`.
    pub fn register_composite(&mut self, id: impl Into<String>, component_ids: &[&str]) -> Result<()> {
        let components = component_ids
            .iter()
            .map(|cid| self.get(cid).cloned())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                FluxGateError::InvalidArgument(
                    "composite key strategy references an unregistered component resolver".to_string(),
                )
            })?;
        self.register(id, Arc::new(CompositeResolver { components }));
        Ok(())
    }

    fn get(&self, id: &str) -> Option<&Arc<dyn KeyResolver>> {
        self.resolvers.get(id)
    }

    /// Resolves `key_strategy_id` against `context`. Unknown ids are a
    /// fatal `UnknownKeyStrategy` error; a registered resolver that
    /// can't produce a key for this context returns `Ok(None)`.
    pub fn resolve(&self, key_strategy_id: &str, context: &RequestContext) -> Result<Option<RateLimitKey>> {
        let resolver = self
            .get(key_strategy_id)
            .ok_or_else(|| FluxGateError::UnknownKeyStrategy(key_strategy_id.to_string()))?;
        Ok(resolver.resolve(context))
    }

    /// Convenience for the conventional scope→resolver-id mapping used when
    /// a `Rule`'s `key_strategy_id` is one of the built-in defaults.
    pub fn default_strategy_id(scope: Scope) -> &'static str {
        match scope {
            Scope::Global => "global",
            Scope::PerIp => "per-ip",
            Scope::PerUser => "per-user",
            Scope::PerApiKey => "per-api-key",
            Scope::Custom => "custom",
        }
    }
}

impl Default for KeyResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RequestContext {
        RequestContext::builder()
            .client_ip("203.0.113.7")
            .user_id("user-42")
            .api_key("key-abc")
            .attribute("tenant", "acme")
            .build()
    }

    #[test]
    fn global_resolver_ignores_context() {
        let registry = KeyResolverRegistry::with_defaults();
        let key = registry.resolve("global", &RequestContext::default()).unwrap();
        assert_eq!(key.unwrap().as_str(), "global");
    }

    #[test]
    fn per_ip_resolver_returns_none_without_ip() {
        let registry = KeyResolverRegistry::with_defaults();
        let key = registry.resolve("per-ip", &RequestContext::default()).unwrap();
        assert!(key.is_none());
    }

    #[test]
    fn unknown_strategy_is_fatal() {
        let registry = KeyResolverRegistry::with_defaults();
        let err = registry.resolve("does-not-exist", &context()).unwrap_err();
        assert!(matches!(err, FluxGateError::UnknownKeyStrategy(_)));
    }

    #[test]
    fn custom_attribute_resolver_reads_named_attribute() {
        let mut registry = KeyResolverRegistry::with_defaults();
        registry.register_custom_attribute("per-tenant", "tenant");
        let key = registry.resolve("per-tenant", &context()).unwrap();
        assert_eq!(key.unwrap().as_str(), "acme");
    }

    #[test]
    fn composite_resolver_joins_components_and_requires_all_present() {
        let mut registry = KeyResolverRegistry::with_defaults();
        registry.register_composite("per-user-and-ip", &["per-user", "per-ip"]).unwrap();
        let key = registry.resolve("per-user-and-ip", &context()).unwrap();
        assert_eq!(key.unwrap().as_str(), "user-42:203.0.113.7");

        let partial = RequestContext::builder().user_id("user-42").build();
        let key = registry.resolve("per-user-and-ip", &partial).unwrap();
        assert!(key.is_none());
    }

    #[test]
    fn sanitize_strips_unsafe_characters() {
        let registry = KeyResolverRegistry::with_defaults();
        let ctx = RequestContext::builder().client_ip("2001:db8::1%eth0").build();
        let key = registry.resolve("per-ip", &ctx).unwrap().unwrap();
        assert!(!key.as_str().contains('%'));
    }
}
