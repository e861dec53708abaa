//! What a stage sees of the build while it runs.

use crate::cache::{CacheDirectory, CacheKey};
use crate::config::Settings;
use crate::core::LoomError;
use crate::fetch::{Fetcher, HttpTransport};
use crate::host::{DependencyResolver, RunConfigSink};
use crate::provider::graph::{Node, NodeId, Provider, ProviderGraph};
use anyhow::Result;
use std::cell::Ref;
use std::path::PathBuf;

/// Collaborators shared by every stage of a build.
pub struct Environment {
    pub settings: Settings,
    pub cache: CacheDirectory,
    pub fetcher: Fetcher,
    pub resolver: Box<dyn DependencyResolver>,
    pub run_configs: Box<dyn RunConfigSink>,
}

impl Environment {
    pub fn new(
        settings: Settings,
        transport: Box<dyn HttpTransport>,
        resolver: Box<dyn DependencyResolver>,
        run_configs: Box<dyn RunConfigSink>,
    ) -> Self {
        let cache = CacheDirectory::new(&settings.global_cache_dir, &settings.project_cache_dir);
        let fetcher = Fetcher::new(transport, settings.offline);
        Self {
            settings,
            cache,
            fetcher,
            resolver,
            run_configs,
        }
    }
}

/// Handle passed to [`Provider::setup`], [`Provider::install`] and [`Provider::load`].
///
/// Reads of other stages go through [`dependency`](Self::dependency), which only succeeds
/// for declared dependencies that are already installed.
pub struct StageContext<'g> {
    graph: &'g ProviderGraph,
    node: NodeId,
}

impl<'g> StageContext<'g> {
    pub(crate) const fn new(graph: &'g ProviderGraph, node: NodeId) -> Self {
        Self { graph, node }
    }

    pub fn env(&self) -> &'g Environment {
        self.graph.env()
    }

    pub fn settings(&self) -> &'g Settings {
        &self.graph.env().settings
    }

    pub fn cache(&self) -> &'g CacheDirectory {
        &self.graph.env().cache
    }

    pub fn fetcher(&self) -> &'g Fetcher {
        &self.graph.env().fetcher
    }

    pub fn resolver(&self) -> &'g dyn DependencyResolver {
        self.graph.env().resolver.as_ref()
    }

    pub fn run_configs(&self) -> &'g dyn RunConfigSink {
        self.graph.env().run_configs.as_ref()
    }

    pub fn progress(&self) -> bool {
        self.settings().progress
    }

    /// Whether this stage writes into the project cache.
    pub fn projectmapped(&self) -> Result<bool> {
        self.graph.is_projectmapped(self.node)
    }

    /// Output path for `template` under this stage's cache root.
    pub fn output_path(&self, key: &CacheKey, template: &str) -> Result<PathBuf> {
        self.cache().resolve_output_path(key, template, self.projectmapped()?)
    }

    /// Output path that is always in the shared cache, for downloads keyed by their URL.
    pub fn global_path(&self, relative: &str) -> Result<PathBuf> {
        self.cache().resolve_output_path(&CacheKey::new(), relative, false)
    }

    /// An installed dependency's provider.
    pub fn dependency<P: Provider>(&self, node: Node<P>) -> Result<Ref<'g, P>> {
        self.check_declared(node.id())?;
        self.graph.get(node)
    }

    /// A dependency's cache key, readable from setup onwards.
    pub fn dependency_key(&self, node: impl Into<NodeId>) -> Result<CacheKey> {
        let node = node.into();
        self.check_declared(node)?;
        let key = self.graph.cache_key(node)?;
        Ok(key.unwrap_or_default())
    }

    fn check_declared(&self, node: NodeId) -> Result<()> {
        if self.graph.dependencies(self.node)?.contains(&node) {
            return Ok(());
        }
        Err(LoomError::UndeclaredDependency {
            stage: self.graph.name(self.node)?.to_string(),
            dependency: self.graph.name(node)?.to_string(),
        }
        .into())
    }
}
