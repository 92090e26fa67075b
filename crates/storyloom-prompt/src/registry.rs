/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Data sources.
//!
//! A task supplies a [`SourceRegistry`] mapping source names (`turns`,
//! `characters`, `lore`, ...) to resolvers over its already-loaded data.
//! Loop variables and the root context are not part of any registry:
//! [`ScopedRegistry`] intercepts the reserved `$`-names and delegates
//! everything else.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{RenderError, RenderResult, ResolveError};
use crate::model::DataRef;
use crate::path::{PathSegment, get_in, parse_path};
use crate::scope::{ExecutionScope, RESERVED_SOURCES, ReservedRef};

/// True for `$item`, `$index`, `$parent`, `$globals` and `$ctx`.
pub fn is_reserved_source(name: &str) -> bool {
    RESERVED_SOURCES.contains(&name)
}

/// Trait for resolving a named source.
///
/// Implementations return the whole value of the source; any `path` on the
/// data reference is applied afterwards. `Ok(None)` means "no data" and is
/// never an error. `Err` is reserved for unexpected failures and aborts the
/// render.
pub trait SourceResolver: Send + Sync {
    fn resolve(
        &self,
        context: &Value,
        args: &Map<String, Value>,
    ) -> Result<Option<Value>, ResolveError>;
}

impl<F> SourceResolver for F
where
    F: Fn(&Value, &Map<String, Value>) -> Result<Option<Value>, ResolveError> + Send + Sync,
{
    fn resolve(
        &self,
        context: &Value,
        args: &Map<String, Value>,
    ) -> Result<Option<Value>, ResolveError> {
        self(context, args)
    }
}

/// Resolver that reads a path out of the render context.
#[derive(Debug, Clone)]
pub struct ContextPath {
    segments: Vec<PathSegment>,
}

impl ContextPath {
    /// Returns `None` when `path` does not parse.
    pub fn new(path: &str) -> Option<Self> {
        parse_path(path).map(|segments| Self { segments })
    }
}

impl SourceResolver for ContextPath {
    fn resolve(
        &self,
        context: &Value,
        _args: &Map<String, Value>,
    ) -> Result<Option<Value>, ResolveError> {
        Ok(get_in(context, &self.segments).cloned())
    }
}

/// Named, pluggable data sources for one task kind.
#[derive(Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Box<dyn SourceResolver>>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where each name reads the context key of the same name.
    pub fn from_context_keys<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(Self::new(), |registry, name| {
            let name = name.into();
            let resolver = ContextPath {
                segments: vec![PathSegment::Key(name.clone())],
            };
            registry.with_source(name, resolver)
        })
    }

    /// Register (or replace) a source.
    pub fn with_source(mut self, name: impl Into<String>, resolver: impl SourceResolver + 'static) -> Self {
        self.register(name, resolver);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, resolver: impl SourceResolver + 'static) {
        self.sources.insert(name.into(), Box::new(resolver));
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Source names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    fn get(&self, name: &str) -> Option<&dyn SourceResolver> {
        self.sources.get(name).map(|r| r.as_ref())
    }
}

/// Registry decorator that resolves reserved names against the scope chain.
#[derive(Debug, Clone, Copy)]
pub struct ScopedRegistry<'r> {
    inner: &'r SourceRegistry,
}

impl<'r> ScopedRegistry<'r> {
    pub fn new(inner: &'r SourceRegistry) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &'r SourceRegistry {
        self.inner
    }

    /// Resolve a data reference at the given scope.
    ///
    /// Missing sources, missing paths and unparseable paths all yield
    /// `Ok(None)`. Only a failing registry resolver produces an error.
    pub fn resolve<'a>(
        &self,
        data_ref: &DataRef,
        scope: &ExecutionScope<'a>,
    ) -> RenderResult<Option<Cow<'a, Value>>> {
        let Some(path) = parse_path(data_ref.path.as_deref().unwrap_or("")) else {
            trace!(source = %data_ref, "unparseable path resolves to nothing");
            return Ok(None);
        };

        if data_ref.source.starts_with('$') {
            let mut segments = Vec::with_capacity(path.len() + 1);
            segments.push(PathSegment::Key(data_ref.source.clone()));
            segments.extend(path);
            return Ok(match ReservedRef::from_segments(&segments, level_arg(&data_ref.args)) {
                Ok(reserved) => scope.resolve_reserved(&reserved),
                Err(_) => None,
            });
        }

        let Some(resolver) = self.inner.get(&data_ref.source) else {
            trace!(source = %data_ref.source, "unknown source resolves to nothing");
            return Ok(None);
        };
        let value = resolver
            .resolve(scope.context(), &data_ref.args)
            .map_err(|error| RenderError::Resolver {
                source_name: data_ref.source.clone(),
                error,
            })?;
        Ok(value
            .and_then(|v| get_in(&v, &path).cloned())
            .map(Cow::Owned))
    }
}

/// `args.level` on a `$parent` reference.
fn level_arg(args: &Map<String, Value>) -> Option<usize> {
    args.get("level")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}
