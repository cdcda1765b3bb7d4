use crate::codec::Mappings;
use crate::options::Flatten;
use crate::sourcemap::SourceMap;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Handle to a [`Node`] inside its [`NodeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadState {
    Unvisited,
    Queued,
    Fetching,
    Loaded,
}

/// One physical or virtual file in a chain of transformations.
#[derive(Debug)]
pub struct Node {
    pub(crate) path: Option<PathBuf>,
    pub(crate) content: Option<String>,
    pub(crate) map: Option<SourceMap>,
    pub(crate) mappings: Option<Arc<Mappings>>,
    pub(crate) sources: Option<Vec<NodeId>>,
    pub(crate) state: LoadState,
    pub(crate) decoding_time: Duration,
}

impl Node {
    fn new(path: Option<PathBuf>, content: Option<String>) -> Self {
        Self {
            path,
            content,
            map: None,
            mappings: None,
            sources: None,
            state: LoadState::Unvisited,
            decoding_time: Duration::ZERO,
        }
    }

    /// Resolved absolute path; `None` for content-only nodes.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub const fn map(&self) -> Option<&SourceMap> {
        self.map.as_ref()
    }

    pub fn mappings(&self) -> Option<&Mappings> {
        self.mappings.as_deref()
    }

    pub fn sources(&self) -> &[NodeId] {
        self.sources.as_deref().unwrap_or_default()
    }

    pub const fn is_original_source(&self) -> bool {
        self.map.is_none()
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub const fn decoding_time(&self) -> Duration {
        self.decoding_time
    }
}

/// Arena owning every node of one load session. File-backed nodes are
/// deduplicated by resolved path; content-only nodes are never shared.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    by_path: FxHashMap<PathBuf, NodeId>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn lookup(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Returns the node for `path`, creating it on first sight. A node that
    /// has not started loading yet takes `content` if it has none.
    pub(crate) fn attach(&mut self, path: Option<PathBuf>, content: Option<String>) -> NodeId {
        let Some(path) = path else {
            return self.push(Node::new(None, content));
        };

        if let Some(&id) = self.by_path.get(&path) {
            let node = &mut self.nodes[id.0];
            let pending = matches!(node.state, LoadState::Unvisited | LoadState::Queued);
            if pending && node.content.is_none() {
                node.content = content;
            }
            return id;
        }

        let id = self.push(Node::new(Some(path.clone()), content));
        self.by_path.insert(path, id);
        id
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// True when every child of `id` ended up with content.
    pub fn has_complete_content(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|node| {
            node.sources()
                .iter()
                .all(|&child| self.get(child).is_some_and(|c| c.content.is_some()))
        })
    }

    /// Whether tracing stops at `id` under `flatten`. Computed on demand so
    /// one graph can be queried under different policies.
    pub fn is_terminal(&self, id: NodeId, flatten: Flatten) -> bool {
        let Some(node) = self.get(id) else {
            return true;
        };

        node.map.is_none()
            || node.mappings.is_none()
            || node.sources().is_empty()
            || (flatten == Flatten::Existing && !self.has_complete_content(id))
    }

    /// Total time spent decoding mappings across the session.
    pub fn decoding_time(&self) -> Duration {
        self.nodes.iter().map(|node| node.decoding_time).sum()
    }
}
