// ABOUTME: Immutable ID tables built from the template registry for one schema version,
// ABOUTME: and a thread-safe cache of those tables keyed by (format, schema ID).

use crate::builtin;
use crate::error::{Error, Result};
use crate::template::{Template, TemplateRegistry};
use crate::types::{limits, FORMAT_VERSION};
use crate::value::Value;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Template tables for one (format, schema ID) pair.
///
/// ID 0 is reserved for null. Built-in templates follow in a fixed order,
/// then one ID per registry slot. Slots without a variant for this schema
/// leave a gap so that later IDs never move.
pub struct Schema {
    format: u32,
    schema_id: u32,
    templates: Vec<Option<Arc<dyn Template>>>,
    by_type: HashMap<TypeId, usize>,
    by_name: HashMap<&'static str, usize>,
    fallbacks: Vec<usize>,
}

impl Schema {
    /// Build and validate the tables for `schema_id`.
    pub fn build(format: u32, schema_id: u32, registry: &TemplateRegistry) -> Result<Self> {
        if format != FORMAT_VERSION {
            return Err(Error::UnsupportedValue(format!(
                "format version {format} (supported: {FORMAT_VERSION})"
            )));
        }
        if schema_id == 0 {
            return Err(Error::SchemaConflict("schema ID must be positive".into()));
        }

        let builtins = builtin::templates();
        let first_user_id = builtins.len() + 1;
        let mut templates: Vec<Option<Arc<dyn Template>>> =
            Vec::with_capacity(first_user_id + registry.len());
        templates.push(None);
        templates.extend(builtins.into_iter().map(Some));

        for (index, variants) in registry.slots().iter().enumerate() {
            let mut chosen: Option<&Arc<dyn Template>> = None;
            for variant in variants.iter().filter(|t| t.supports_schema(schema_id)) {
                if let Some(previous) = chosen {
                    return Err(Error::SchemaConflict(format!(
                        "ID {} has two templates for schema {schema_id}: {} and {}",
                        first_user_id + index,
                        previous.type_name(),
                        variant.type_name()
                    )));
                }
                chosen = Some(variant);
            }
            templates.push(chosen.cloned());
        }
        while matches!(templates.last(), Some(None)) && templates.len() > 1 {
            templates.pop();
        }

        let mut by_type = HashMap::new();
        let mut by_name = HashMap::new();
        let mut user_fallbacks = Vec::new();
        let mut builtin_fallbacks = Vec::new();
        for (id, template) in templates.iter().enumerate() {
            let Some(template) = template else { continue };
            if template.type_name().is_empty() {
                return Err(Error::SchemaConflict(format!("ID {id} has an unnamed template")));
            }
            if template.is_main_template() {
                if let Some(other) = by_type.insert(template.target_type(), id) {
                    return Err(Error::SchemaConflict(format!(
                        "{} is claimed by IDs {other} and {id}",
                        template.type_name()
                    )));
                }
                by_name.entry(template.type_name()).or_insert(id);
            }
            if template.is_fallback() {
                if id < first_user_id {
                    builtin_fallbacks.push(id);
                } else {
                    user_fallbacks.push(id);
                }
            }
        }
        user_fallbacks.extend(builtin_fallbacks);

        Ok(Self {
            format,
            schema_id,
            templates,
            by_type,
            by_name,
            fallbacks: user_fallbacks,
        })
    }

    #[must_use]
    pub fn format(&self) -> u32 {
        self.format
    }

    #[must_use]
    pub fn schema_id(&self) -> u32 {
        self.schema_id
    }

    /// One past the highest assigned ID.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.len() <= 1
    }

    /// The template for a wire ID.
    pub fn template(&self, id: usize) -> Result<&Arc<dyn Template>> {
        self.templates
            .get(id)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                Error::UnresolvedTemplate(format!("no template with ID {id} in schema {}", self.schema_id))
            })
    }

    /// The ID of the main template for a runtime type.
    #[must_use]
    pub fn id_of_type(&self, type_id: TypeId) -> Option<usize> {
        self.by_type.get(&type_id).copied()
    }

    /// The ID of the main template whose type name is `name`.
    #[must_use]
    pub fn id_of_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Fallback template IDs in the order they are consulted.
    #[must_use]
    pub fn fallbacks(&self) -> &[usize] {
        &self.fallbacks
    }

    /// Find the template for a non-null value: exact type first, then the
    /// first fallback that accepts it.
    pub fn lookup(&self, value: &Value) -> Result<(usize, Arc<dyn Template>)> {
        let type_id = value
            .type_id()
            .ok_or_else(|| Error::UnresolvedTemplate("null has no template".into()))?;
        let id = self
            .id_of_type(type_id)
            .or_else(|| {
                self.fallbacks
                    .iter()
                    .copied()
                    .find(|&id| self.templates[id].as_ref().is_some_and(|t| t.accepts(value)))
            })
            .ok_or_else(|| {
                Error::UnresolvedTemplate(format!(
                    "no template for {} in schema {}",
                    value.type_name(),
                    self.schema_id
                ))
            })?;
        Ok((id, Arc::clone(self.template(id)?)))
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("format", &self.format)
            .field("schema_id", &self.schema_id)
            .field("len", &self.templates.len())
            .finish()
    }
}

/// Builds schemas on demand and caches them.
///
/// Safe to share between threads; concurrent requests for the same key
/// observe one build. Schema IDs come from the streams being read, so the
/// cache holds at most `cache_limit` schemas; past that, schemas are built
/// per request and dropped with the pass that used them.
pub struct SchemaManager {
    registry: TemplateRegistry,
    cache: Mutex<HashMap<(u32, u32), Arc<Schema>>>,
    cache_limit: usize,
}

impl SchemaManager {
    #[must_use]
    pub fn new(registry: TemplateRegistry) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
            cache_limit: limits::MAX_CACHED_SCHEMAS,
        }
    }

    /// Cap the number of cached schemas (default: `limits::MAX_CACHED_SCHEMAS`).
    #[must_use]
    pub fn with_cache_limit(mut self, cache_limit: usize) -> Self {
        self.cache_limit = cache_limit;
        self
    }

    /// Number of schemas currently cached.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// The schema for `(format, schema_id)`, built on first use.
    ///
    /// A failed build is not cached; the next request tries again.
    pub fn schema(&self, format: u32, schema_id: u32) -> Result<Arc<Schema>> {
        let mut cache = self.cache.lock();
        if let Some(schema) = cache.get(&(format, schema_id)) {
            trace!(format, schema_id, "schema cache hit");
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(Schema::build(format, schema_id, &self.registry)?);
        debug!(
            format,
            schema_id,
            templates = schema.len(),
            fallbacks = schema.fallbacks().len(),
            "built schema"
        );
        if cache.len() < self.cache_limit {
            cache.insert((format, schema_id), Arc::clone(&schema));
        } else {
            debug!(format, schema_id, limit = self.cache_limit, "schema cache full");
        }
        Ok(schema)
    }
}

impl Default for SchemaManager {
    fn default() -> Self {
        Self::new(TemplateRegistry::new())
    }
}
