// src/engine.rs
//
// One store handle shared by the introspector and the resolver.

use crate::config::{IntrospectorConfig, ResolverConfig, Settings, SettingsError};
use crate::error::{Error, QueryError, ResolveError};
use crate::graph::{Connection, GraphStore};
use crate::introspection::{SchemaDescription, SchemaIntrospector};
use crate::metrics::{MetricResolver, ResolutionResult};
use crate::tools;
use std::sync::Arc;

pub struct MetricEngine<S> {
    introspector: SchemaIntrospector<S>,
    resolver: MetricResolver<S>,
}

impl MetricEngine<Connection> {
    /// Open the store named by `[store] path` and build the schema description.
    pub fn open(settings: &Settings) -> Result<Self, Error> {
        let path = settings
            .store
            .resolved_path()?
            .ok_or_else(|| SettingsError::InvalidConfig("store.path is not set".to_string()))?;
        let conn = Connection::open(path)?;
        MetricEngine::new(Arc::new(conn), settings)
    }
}

impl<S: GraphStore> MetricEngine<S> {
    pub fn new(store: Arc<S>, settings: &Settings) -> Result<Self, Error> {
        let introspector =
            SchemaIntrospector::new(Arc::clone(&store), IntrospectorConfig::from(settings))?;
        let resolver = MetricResolver::new(store, ResolverConfig::from(settings));
        Ok(MetricEngine {
            introspector,
            resolver,
        })
    }

    pub fn introspector(&self) -> &SchemaIntrospector<S> {
        &self.introspector
    }

    pub fn resolver(&self) -> &MetricResolver<S> {
        &self.resolver
    }

    pub fn schema(&self) -> Arc<SchemaDescription> {
        self.introspector.schema()
    }

    pub fn resolve<A: AsRef<str>, D: AsRef<str>>(
        &self,
        aliases: &[A],
        dimensions: &[D],
    ) -> Result<ResolutionResult, ResolveError> {
        self.resolver.resolve(aliases, dimensions)
    }

    pub fn metadata_query(&self, text: &str) -> Result<Vec<serde_json::Value>, QueryError> {
        tools::metadata_query(self.resolver.store().as_ref(), text)
    }

    pub fn tool_description(&self) -> String {
        tools::tool_description(&self.schema())
    }
}
