//! Named, lazily built pipelines.
//!
//! A [`PipelineRegistry`] maps `(name, result type)` to a factory. The first
//! [`get_pipeline`](PipelineRegistry::get_pipeline) call for a key runs the
//! factory; every later call, including concurrent first calls, receives the
//! same `Arc<Pipeline<T>>`.

use crate::errors::RegistryError;
use crate::events::{get_event_sink, EventSink};
use crate::pipeline::{Pipeline, PipelineBuilder, PipelineConfig};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Factory function type for configuring a pipeline.
pub type PipelineFactory<T> = Arc<dyn Fn(&mut PipelineBuilder<T>, &BuildContext) + Send + Sync>;

/// Information handed to a factory while its pipeline is built.
#[derive(Clone)]
pub struct BuildContext {
    name: String,
    result_type: &'static str,
    event_sink: Arc<dyn EventSink>,
}

impl BuildContext {
    /// Returns the pipeline name being built.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the result type name of the pipeline.
    #[must_use]
    pub fn result_type(&self) -> &'static str {
        self.result_type
    }

    /// Returns the registry's event sink.
    #[must_use]
    pub fn event_sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.event_sink)
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("name", &self.name)
            .field("result_type", &self.result_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
    name: String,
    type_id: TypeId,
}

impl RegistryKey {
    fn of<T: 'static>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// One registered factory and its built pipeline.
///
/// `factory` holds a `PipelineFactory<T>` and `pipeline` an
/// `Arc<Pipeline<T>>` for the `T` in the entry's key.
struct RegistryEntry {
    result_type: &'static str,
    factory: Box<dyn Any + Send + Sync>,
    pipeline: OnceLock<Box<dyn Any + Send + Sync>>,
    build_lock: Mutex<()>,
}

impl RegistryEntry {
    fn built<T: Send + 'static>(&self) -> Option<Arc<Pipeline<T>>> {
        self.pipeline
            .get()
            .and_then(|p| p.downcast_ref::<Arc<Pipeline<T>>>())
            .cloned()
    }
}

/// Registry of named pipelines, keyed by name and result type.
pub struct PipelineRegistry {
    entries: DashMap<RegistryKey, Arc<RegistryEntry>>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl PipelineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            event_sink: None,
        }
    }

    /// Sets the event sink handed to every pipeline this registry builds.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Registers a factory for `(name, T)`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if the key is taken.
    pub fn add_pipeline<T, F>(&self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        T: Send + 'static,
        F: Fn(&mut PipelineBuilder<T>, &BuildContext) + Send + Sync + 'static,
    {
        let name = name.into();
        let result_type = type_name::<T>();
        let factory: PipelineFactory<T> = Arc::new(factory);

        match self.entries.entry(RegistryKey::of::<T>(&name)) {
            Entry::Occupied(_) => Err(RegistryError::already_registered(name, result_type)),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(RegistryEntry {
                    result_type,
                    factory: Box::new(factory),
                    pipeline: OnceLock::new(),
                    build_lock: Mutex::new(()),
                }));
                debug!(pipeline = %name, result_type, "Registered resilience pipeline");
                Ok(())
            }
        }
    }

    /// Registers a factory that applies a declarative configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if the key is taken.
    pub fn add_pipeline_from_config<T>(
        &self,
        name: impl Into<String>,
        config: PipelineConfig,
    ) -> Result<(), RegistryError>
    where
        T: Send + 'static,
    {
        self.add_pipeline::<T, _>(name, move |builder, _| {
            config.apply(builder);
        })
    }

    /// Returns the pipeline for `(name, T)`, building it on first use.
    ///
    /// The first build of a key runs the factory under a blocking per-key
    /// lock. Concurrent first callers for that key block their thread
    /// (including a tokio worker) until the build finishes, so factories
    /// should stay cheap. A factory may look up other keys, but looking up
    /// its own key deadlocks.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown key and `Build` if the factory
    /// produced an invalid pipeline. A failed build is not cached.
    pub fn get_pipeline<T: Send + 'static>(&self, name: &str) -> Result<Arc<Pipeline<T>>, RegistryError> {
        let not_found = || RegistryError::not_found(name, type_name::<T>());

        let entry = self
            .entries
            .get(&RegistryKey::of::<T>(name))
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(not_found)?;

        if let Some(pipeline) = entry.built::<T>() {
            return Ok(pipeline);
        }

        let _guard = entry.build_lock.lock();
        if let Some(pipeline) = entry.built::<T>() {
            return Ok(pipeline);
        }

        let factory = entry
            .factory
            .downcast_ref::<PipelineFactory<T>>()
            .ok_or_else(not_found)?;

        let event_sink = self.event_sink.clone().unwrap_or_else(get_event_sink);
        let context = BuildContext {
            name: name.to_string(),
            result_type: entry.result_type,
            event_sink: Arc::clone(&event_sink),
        };

        let mut builder = PipelineBuilder::new();
        builder.with_name(name).with_event_sink(event_sink);
        factory(&mut builder, &context);

        let pipeline = builder.build().map_err(|source| {
            warn!(pipeline = %name, error = %source, "Failed to build resilience pipeline");
            RegistryError::Build {
                name: name.to_string(),
                source,
            }
        })?;
        let pipeline = Arc::new(pipeline);

        if entry.pipeline.set(Box::new(Arc::clone(&pipeline))).is_err() {
            // Unreachable while the build lock is held.
            return entry.built::<T>().ok_or_else(not_found);
        }

        info!(
            pipeline = %name,
            result_type = entry.result_type,
            strategies = pipeline.len(),
            "Built resilience pipeline"
        );
        Ok(pipeline)
    }

    /// Returns true if a factory is registered for `(name, T)`.
    #[must_use]
    pub fn contains<T: 'static>(&self, name: &str) -> bool {
        self.entries.contains_key(&RegistryKey::of::<T>(name))
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lists registered names with their result types.
    #[must_use]
    pub fn list_pipelines(&self) -> Vec<(String, &'static str)> {
        let mut pipelines: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().name.clone(), e.value().result_type))
            .collect();
        pipelines.sort_unstable();
        pipelines
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.list_pipelines())
            .finish_non_exhaustive()
    }
}
