//! The fixed stage topology of an oldloom build.

use crate::mappings::Namespace;
use crate::provider::access_transformed::AccessTransformedProvider;
use crate::provider::assets::AssetsProvider;
use crate::provider::binpatched::BinpatchedProvider;
use crate::provider::context::Environment;
use crate::provider::forge::ForgeProvider;
use crate::provider::graph::{Node, NodeId, NodeState, ProviderGraph};
use crate::provider::jarmodded::JarmoddedProvider;
use crate::provider::libraries::LibrariesProvider;
use crate::provider::mappings::MappingsProvider;
use crate::provider::merged::MergedProvider;
use crate::provider::minecraft::MinecraftProvider;
use crate::provider::mod_dependencies::ModDependenciesProvider;
use crate::provider::natives::NativesProvider;
use crate::provider::remapped::RemappedProvider;
use crate::provider::run_configs::RunConfigsProvider;
use anyhow::Result;
use std::path::PathBuf;

/// Every stage of the pipeline, wired in dependency order
///
/// ```text
/// minecraft  -> libraries, natives, assets, binpatched, run-configs
/// forge      -> binpatched, jarmodded, access-transformed
/// binpatched -> merged -> jarmodded -> access-transformed -> remapped -> mod-dependencies
/// merged     -> mappings -> access-transformed, remapped, mod-dependencies
/// libraries  -> remapped, mod-dependencies
/// natives, assets -> run-configs
/// ```
pub struct Pipeline {
    pub graph: ProviderGraph,
    pub minecraft: Node<MinecraftProvider>,
    pub libraries: Node<LibrariesProvider>,
    pub natives: Node<NativesProvider>,
    pub assets: Node<AssetsProvider>,
    pub forge: Node<ForgeProvider>,
    pub binpatched: Node<BinpatchedProvider>,
    pub merged: Node<MergedProvider>,
    pub jarmodded: Node<JarmoddedProvider>,
    pub mappings: Node<MappingsProvider>,
    pub access_transformed: Node<AccessTransformedProvider>,
    pub remapped: Node<RemappedProvider>,
    pub mod_dependencies: Node<ModDependenciesProvider>,
    pub run_configs: Node<RunConfigsProvider>,
}

impl Pipeline {
    pub fn new(env: Environment) -> Self {
        let mut graph = ProviderGraph::new(env);
        let minecraft = graph.add(MinecraftProvider::new(), []);
        let libraries = graph.add(LibrariesProvider::new(minecraft), [minecraft.id()]);
        let natives = graph.add(NativesProvider::new(minecraft), [minecraft.id()]);
        let assets = graph.add(AssetsProvider::new(minecraft), [minecraft.id()]);
        let forge = graph.add(ForgeProvider::new(), []);
        let binpatched = graph.add(
            BinpatchedProvider::new(minecraft, forge),
            [minecraft.id(), forge.id()],
        );
        let merged = graph.add(MergedProvider::new(binpatched), [binpatched.id()]);
        let jarmodded = graph.add(JarmoddedProvider::new(merged, forge), [merged.id(), forge.id()]);
        let mappings = graph.add(MappingsProvider::new(merged), [merged.id()]);
        let access_transformed = graph.add(
            AccessTransformedProvider::new(jarmodded, forge, mappings),
            [jarmodded.id(), forge.id(), mappings.id()],
        );
        let remapped = graph.add(
            RemappedProvider::new(access_transformed, mappings, libraries),
            [access_transformed.id(), mappings.id(), libraries.id()],
        );
        let mod_dependencies = graph.add(
            ModDependenciesProvider::new(mappings, remapped, libraries),
            [mappings.id(), remapped.id(), libraries.id()],
        );
        let run_configs = graph.add(
            RunConfigsProvider::new(minecraft, natives, assets),
            [minecraft.id(), natives.id(), assets.id()],
        );

        Self {
            graph,
            minecraft,
            libraries,
            natives,
            assets,
            forge,
            binpatched,
            merged,
            jarmodded,
            mappings,
            access_transformed,
            remapped,
            mod_dependencies,
            run_configs,
        }
    }

    /// Install every stage.
    pub fn install_all(&self) -> Result<()> {
        self.graph.install_all()
    }

    pub fn reach(&self, node: impl Into<NodeId>) -> Result<()> {
        self.graph.reach(node, NodeState::Installed)
    }

    /// The game jar in `namespace`, installing whatever it needs.
    pub fn game_jar(&self, namespace: Namespace) -> Result<PathBuf> {
        self.reach(self.remapped)?;
        Ok(self.graph.get(self.remapped)?.jar(namespace).to_path_buf())
    }

    /// Stage run configurations, returning the files written.
    pub fn stage_run_configs(&self) -> Result<Vec<PathBuf>> {
        self.reach(self.run_configs)?;
        Ok(self.graph.get(self.run_configs)?.staged().to_vec())
    }
}
