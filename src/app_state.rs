use crate::artifact::ArtifactPipeline;
use crate::cli::CommandLineArgs;
use crate::dataset::SharedDataset;
use crate::metadata::MetadataCache;
use crate::render::{HeatmapRenderer, Renderer};
use crate::resource_manager::ResourceManager;
use crate::slice::SliceExtractor;

use std::sync::Arc;

/// Shared application state passed to each request handler.
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// The dataset being served.
    pub dataset: SharedDataset,

    /// Dataset metadata, computed on first use.
    pub metadata_cache: MetadataCache,

    /// Slice extractor.
    pub extractor: SliceExtractor,

    /// Image pipeline.
    pub pipeline: ArtifactPipeline,

    /// Resource manager.
    pub resource_manager: ResourceManager,
}

impl AppState {
    /// Create and return an [AppState] rendering with the default [HeatmapRenderer].
    pub fn new(args: &CommandLineArgs, dataset: SharedDataset) -> Self {
        Self::with_renderer(args, dataset, Arc::new(HeatmapRenderer::default()))
    }

    /// Create and return an [AppState] rendering with `renderer`.
    pub fn with_renderer(
        args: &CommandLineArgs,
        dataset: SharedDataset,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let render_limit = args.render_limit.or_else(|| Some(num_cpus::get()));
        let resource_manager = ResourceManager::new(render_limit, args.use_rayon);
        let extractor = SliceExtractor::new(dataset.clone(), args);
        let pipeline = ArtifactPipeline::from_args(args, renderer);

        Self {
            args: args.clone(),
            dataset,
            metadata_cache: MetadataCache::new(),
            extractor,
            pipeline,
            resource_manager,
        }
    }
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
