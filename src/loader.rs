//! Builds a [`NodeGraph`] from a root file.
//!
//! Loading runs in waves. Every queued node of a wave does its I/O (read
//! content, locate and read its map, probe candidate source paths)
//! independently, concurrently in the async flavour. The results are then
//! folded into the graph one at a time, and that fold is the only place the
//! path cache is written, so a file referenced by several parents in the
//! same wave still gets exactly one node.

use crate::chain::Chain;
use crate::codec::DecodeCache;
use crate::comment::{decode_url, find_source_mapping_url, is_data_url};
use crate::node::{LoadState, NodeGraph, NodeId};
use crate::options::Options;
use crate::path;
use crate::sourcemap::SourceMap;
use crate::{Result, SourceryError};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, trace, warn};

struct FetchRequest {
    id: NodeId,
    path: Option<PathBuf>,
    content: Option<String>,
    map: Option<SourceMap>,
}

struct Fetched {
    id: NodeId,
    content: Option<String>,
    map: Option<SourceMap>,
    children: Vec<ChildSource>,
}

struct ChildSource {
    path: Option<PathBuf>,
    content: Option<String>,
}

enum MapReference {
    Inline(SourceMap),
    External(PathBuf),
}

fn label(path: Option<&Path>) -> String {
    path.map_or_else(|| "<content>".to_string(), path::slash)
}

fn map_reference(content: &str, origin: Option<&Path>) -> Result<Option<MapReference>> {
    let Some(url) = find_source_mapping_url(content) else {
        return Ok(None);
    };

    if is_data_url(url) {
        return SourceMap::from_data_url(url, &label(origin)).map(|map| Some(MapReference::Inline(map)));
    }

    let dir = origin.map_or_else(path::cwd, path::parent_dir);
    let decoded = decode_url(url);
    Ok(Some(MapReference::External(path::resolve(
        &dir,
        path::strip_file_protocol(&decoded),
    ))))
}

/// Candidate locations for one `sources` entry, in priority order: the
/// node's own directory, then each session root, all joined with the map's
/// `sourceRoot`.
fn source_candidates(
    node_path: Option<&Path>,
    map: &SourceMap,
    roots: &[PathBuf],
    source: &str,
) -> Vec<PathBuf> {
    let map_root = map
        .source_root
        .as_deref()
        .map_or("", path::strip_file_protocol);
    let source = path::strip_file_protocol(source);

    node_path
        .map(|p| path::resolve(&path::parent_dir(p), map_root))
        .into_iter()
        .chain(roots.iter().map(|root| path::resolve(root, map_root)))
        .map(|root| path::resolve(&root, source))
        .collect()
}

fn source_entry(map: &SourceMap, index: usize) -> Option<&str> {
    map.source(index).filter(|s| !s.is_empty())
}

fn rewrap_malformed(err: SourceryError, origin: Option<&Path>) -> SourceryError {
    match err {
        SourceryError::MalformedMapping { reason } => SourceryError::MalformedMapping {
            reason: format!("{}: {reason}", label(origin)),
        },
        other => other,
    }
}

fn read_source_sync(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable source, treating as original");
            None
        }
    }
}

fn read_map_sync(path: &Path) -> Result<Option<SourceMap>> {
    match std::fs::read_to_string(path) {
        Ok(json) => SourceMap::parse(&json, &path::slash(path)).map(Some),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "referenced source map is unreadable");
            Ok(None)
        }
    }
}

fn fetch_sync(request: FetchRequest, roots: &[PathBuf]) -> Result<Fetched> {
    let FetchRequest {
        id,
        path,
        content,
        map,
    } = request;

    let content = content.or_else(|| path.as_deref().and_then(read_source_sync));

    let map = match (&content, map) {
        (_, Some(supplied)) => Some(supplied),
        (None, None) => None,
        (Some(text), None) => match map_reference(text, path.as_deref())? {
            None => None,
            Some(MapReference::Inline(map)) => Some(map),
            Some(MapReference::External(file)) => read_map_sync(&file)?,
        },
    };

    let children = map.as_ref().map_or_else(Vec::new, |map| {
        (0..map.sources.len())
            .map(|i| ChildSource {
                path: source_entry(map, i).and_then(|source| {
                    let candidates = source_candidates(path.as_deref(), map, roots, source);
                    let found = candidates.iter().position(|c| c.exists());
                    pick_existing(candidates, found)
                }),
                content: map.source_content(i).map(str::to_string),
            })
            .collect()
    });

    Ok(Fetched {
        id,
        content,
        map,
        children,
    })
}

/// First candidate that exists, else the first candidate regardless.
fn pick_existing(mut candidates: Vec<PathBuf>, found: Option<usize>) -> Option<PathBuf> {
    if candidates.is_empty() {
        return None;
    }
    Some(candidates.swap_remove(found.unwrap_or(0)))
}

async fn read_source(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable source, treating as original");
            None
        }
    }
}

async fn read_map(path: &Path) -> Result<Option<SourceMap>> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => SourceMap::parse(&json, &path::slash(path)).map(Some),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "referenced source map is unreadable");
            Ok(None)
        }
    }
}

async fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    let mut found = None;
    for (i, candidate) in candidates.iter().enumerate() {
        if tokio::fs::try_exists(candidate).await.unwrap_or(false) {
            found = Some(i);
            break;
        }
    }
    pick_existing(candidates, found)
}

async fn fetch(request: FetchRequest, roots: &[PathBuf]) -> Result<Fetched> {
    let FetchRequest {
        id,
        path,
        content,
        map,
    } = request;

    let content = match (content, path.as_deref()) {
        (Some(content), _) => Some(content),
        (None, Some(file)) => read_source(file).await,
        (None, None) => None,
    };

    let map = match (&content, map) {
        (_, Some(supplied)) => Some(supplied),
        (None, None) => None,
        (Some(text), None) => match map_reference(text, path.as_deref())? {
            None => None,
            Some(MapReference::Inline(map)) => Some(map),
            Some(MapReference::External(file)) => read_map(&file).await?,
        },
    };

    let mut children = Vec::new();
    if let Some(map) = &map {
        for i in 0..map.sources.len() {
            let resolved = match source_entry(map, i) {
                Some(source) => {
                    first_existing(source_candidates(path.as_deref(), map, roots, source)).await
                }
                None => None,
            };
            children.push(ChildSource {
                path: resolved,
                content: map.source_content(i).map(str::to_string),
            });
        }
    }

    Ok(Fetched {
        id,
        content,
        map,
        children,
    })
}

/// One load session: the node arena, its path cache and the decode cache.
#[derive(Debug)]
pub struct Loader {
    graph: NodeGraph,
    decode_cache: DecodeCache,
    source_roots: Vec<PathBuf>,
}

impl Loader {
    /// Seeds the session with the content and map overrides from `options`.
    pub fn new(options: &Options) -> Self {
        let mut source_roots: Vec<PathBuf> = Vec::new();
        for root in options
            .source_roots
            .iter()
            .map(path::absolute)
            .chain(std::iter::once(path::cwd()))
        {
            if !source_roots.contains(&root) {
                source_roots.push(root);
            }
        }

        let mut graph = NodeGraph::new();
        for (file, content) in &options.content {
            graph.attach(Some(path::absolute(file)), Some(content.clone()));
        }
        for (file, map) in &options.sourcemaps {
            let id = graph.attach(Some(path::absolute(file)), None);
            if let Some(node) = graph.get_mut(id) {
                node.map = Some(map.clone());
            }
        }

        Self {
            graph,
            decode_cache: DecodeCache::new(options.decode_cache_capacity),
            source_roots,
        }
    }

    fn input_path(file: &Path) -> PathBuf {
        let raw = file.to_string_lossy();
        path::absolute(path::strip_file_protocol(&raw))
    }

    /// Registers a file-backed root.
    pub fn add_root(&mut self, file: impl AsRef<Path>) -> NodeId {
        self.graph.attach(Some(Self::input_path(file.as_ref())), None)
    }

    /// Registers a root whose content is supplied by the caller. The given
    /// content wins over anything else known for the same path.
    pub fn add_content(&mut self, file: Option<&Path>, content: String) -> Result<NodeId> {
        if file.is_none() && content.is_empty() {
            return Err(SourceryError::MissingInput);
        }

        let id = self.graph.attach(file.map(Self::input_path), None);
        if let Some(node) = self.graph.get_mut(id)
            && node.state != LoadState::Loaded
        {
            node.content = Some(content);
        }
        Ok(id)
    }

    fn enqueue(&mut self, root: NodeId) -> Vec<NodeId> {
        match self.graph.get_mut(root) {
            Some(node) if node.state == LoadState::Unvisited => {
                node.state = LoadState::Queued;
                vec![root]
            }
            _ => Vec::new(),
        }
    }

    fn begin_fetch(&mut self, id: NodeId) -> Option<FetchRequest> {
        let node = self.graph.get_mut(id)?;
        if node.state != LoadState::Queued {
            return None;
        }
        node.state = LoadState::Fetching;
        Some(FetchRequest {
            id,
            path: node.path.clone(),
            content: node.content.take(),
            map: node.map.take(),
        })
    }

    /// Folds one node's I/O results into the graph and returns the children
    /// that still need loading.
    fn integrate(&mut self, fetched: Fetched) -> Result<Vec<NodeId>> {
        let Fetched {
            id,
            content,
            map,
            children,
        } = fetched;

        let node_path = {
            let Some(node) = self.graph.get_mut(id) else {
                return Ok(Vec::new());
            };
            node.content = content;
            node.state = LoadState::Loaded;
            node.path.clone()
        };

        let Some(mut map) = map else {
            trace!(node = %label(node_path.as_deref()), "original source");
            return Ok(Vec::new());
        };

        if let Some(file) = &node_path {
            map.file = Some(path::slash(file));
        }

        let started = Instant::now();
        let mappings = self
            .decode_cache
            .decode(&map.mappings)
            .map_err(|e| rewrap_malformed(e, node_path.as_deref()))?;
        let decoding_time = started.elapsed();

        let mut sources = Vec::with_capacity(children.len());
        let mut pending = Vec::new();
        for child in children {
            let child_id = self.graph.attach(child.path, child.content);
            if let Some(child_node) = self.graph.get_mut(child_id)
                && child_node.state == LoadState::Unvisited
            {
                child_node.state = LoadState::Queued;
                pending.push(child_id);
            }
            sources.push(child_id);
        }

        debug!(
            node = %label(node_path.as_deref()),
            sources = sources.len(),
            lines = mappings.len(),
            "resolved source map"
        );

        if let Some(node) = self.graph.get_mut(id) {
            node.map = Some(map);
            node.mappings = Some(mappings);
            node.sources = Some(sources);
            node.decoding_time = decoding_time;
        }

        Ok(pending)
    }

    /// Loads `root` and everything reachable from it with blocking I/O.
    pub fn load_sync(&mut self, root: NodeId) -> Result<()> {
        let mut wave = self.enqueue(root);
        while !wave.is_empty() {
            let requests: Vec<_> = wave.into_iter().filter_map(|id| self.begin_fetch(id)).collect();
            let mut next = Vec::new();
            for request in requests {
                let fetched = fetch_sync(request, &self.source_roots)?;
                next.extend(self.integrate(fetched)?);
            }
            wave = next;
        }
        Ok(())
    }

    /// Loads `root` and everything reachable from it; the I/O of each wave
    /// runs concurrently.
    pub async fn load(&mut self, root: NodeId) -> Result<()> {
        let mut wave = self.enqueue(root);
        while !wave.is_empty() {
            let requests: Vec<_> = wave.into_iter().filter_map(|id| self.begin_fetch(id)).collect();
            let roots = &self.source_roots;
            let results = join_all(requests.into_iter().map(|request| fetch(request, roots))).await;

            let mut next = Vec::new();
            for fetched in results {
                next.extend(self.integrate(fetched?)?);
            }
            wave = next;
        }
        Ok(())
    }

    pub const fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub const fn decode_cache(&self) -> &DecodeCache {
        &self.decode_cache
    }

    pub fn finish(self) -> Arc<NodeGraph> {
        Arc::new(self.graph)
    }

    /// Wraps the session in a [`Chain`], or `None` when `root` turned out
    /// to be an original source.
    pub fn into_chain(self, root: NodeId) -> Option<Chain> {
        let original = self
            .graph
            .get(root)
            .is_none_or(crate::node::Node::is_original_source);
        if original {
            debug!("root has no source map");
            return None;
        }
        Some(Chain::new(self.finish(), root))
    }
}

/// Loads the chain rooted at `file`, reading files asynchronously.
#[instrument(skip_all, fields(path = %file.as_ref().display()))]
pub async fn load(file: impl AsRef<Path>, options: &Options) -> Result<Option<Chain>> {
    let mut loader = Loader::new(options);
    let root = loader.add_root(file.as_ref());
    loader.load(root).await?;
    Ok(loader.into_chain(root))
}

/// Blocking twin of [`load`].
#[instrument(skip_all, fields(path = %file.as_ref().display()))]
pub fn load_sync(file: impl AsRef<Path>, options: &Options) -> Result<Option<Chain>> {
    let mut loader = Loader::new(options);
    let root = loader.add_root(file.as_ref());
    loader.load_sync(root)?;
    Ok(loader.into_chain(root))
}

/// Loads a chain whose root content is already in memory, as stream and
/// bundler adapters have it. `file` anchors relative map references.
#[instrument(skip_all)]
pub fn load_content(file: Option<&Path>, content: String, options: &Options) -> Result<Option<Chain>> {
    let mut loader = Loader::new(options);
    let root = loader.add_content(file, content)?;
    loader.load_sync(root)?;
    Ok(loader.into_chain(root))
}
