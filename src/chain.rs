use crate::codec::{self, Line, Origin, Segment};
use crate::node::{NodeGraph, NodeId};
use crate::options::{ABSOLUTE_PATH, BASE_PATH, Flatten, Options, RELATIVE_PATH};
use crate::path;
use crate::sourcemap::SourceMap;
use crate::trace::Trace;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Timings are in milliseconds. Purely observational.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub decoding_time: f64,
    pub encoding_time: f64,
    pub tracing_time: f64,
    pub untraceable: usize,
}

/// A loaded graph rooted at the most-transformed artifact.
#[derive(Debug, Clone)]
pub struct Chain {
    graph: Arc<NodeGraph>,
    root: NodeId,
    encoding_time: Duration,
    tracing_time: Duration,
    untraceable: usize,
}

/// First-seen ordering of values, each assigned the next index.
struct Interner<K> {
    index: FxHashMap<K, u32>,
    order: Vec<K>,
}

impl<K: Copy + Eq + std::hash::Hash> Interner<K> {
    fn new() -> Self {
        Self {
            index: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    fn intern(&mut self, key: K) -> u32 {
        *self.index.entry(key).or_insert_with(|| {
            self.order.push(key);
            (self.order.len() - 1) as u32
        })
    }
}

/// Renders `source` through a path template. Unknown placeholders are left
/// as they are.
pub fn render_source_path(template: &str, source: &Path, base: &Path) -> String {
    let rendered = template
        .replace(ABSOLUTE_PATH, &path::slash(source))
        .replace(RELATIVE_PATH, &path::slash(&path::relative(base, source)))
        .replace(BASE_PATH, &path::file_name(source));
    rendered.replace('\\', "/")
}

impl Chain {
    pub const fn new(graph: Arc<NodeGraph>, root: NodeId) -> Self {
        Self {
            graph,
            root,
            encoding_time: Duration::ZERO,
            tracing_time: Duration::ZERO,
            untraceable: 0,
        }
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub const fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.graph.get(self.root).and_then(|node| node.path())
    }

    pub fn root_content(&self) -> Option<&str> {
        self.graph.get(self.root).and_then(|node| node.content())
    }

    pub fn stats(&self) -> Stats {
        Stats {
            decoding_time: as_millis(self.graph.decoding_time()),
            encoding_time: as_millis(self.encoding_time),
            tracing_time: as_millis(self.tracing_time),
            untraceable: self.untraceable,
        }
    }

    /// Traces a one-based line and zero-based column in the root artifact.
    pub fn trace(&self, line: u32, column: Option<u32>, options: &Options) -> Option<Trace<'_>> {
        let line = line.checked_sub(1)?;
        self.graph.trace(self.root, line, column, None, options.flatten)
    }

    /// Directory that `[relative-path]` sources are rendered against.
    fn source_base(&self, options: &Options) -> PathBuf {
        options.base.as_ref().map_or_else(
            || self.root_path().map_or_else(path::cwd, path::parent_dir),
            path::absolute,
        )
    }

    fn render_sources(&self, ids: &[NodeId], options: &Options) -> (Vec<Option<String>>, Vec<Option<String>>) {
        let base = self.source_base(options);
        ids.iter()
            .map(|&id| {
                let node = self.graph.get(id);
                // content-only nodes keep a null source
                let source = node
                    .and_then(|n| n.path())
                    .map(|p| render_source_path(&options.source_path_template, p, &base));
                let content = if options.exclude_content {
                    None
                } else {
                    node.and_then(|n| n.content()).map(str::to_string)
                };
                (source, content)
            })
            .unzip()
    }

    /// Builds the flattened map, or `None` when the root is itself
    /// terminal under `options.flatten`.
    #[instrument(skip_all, fields(flatten = %options.flatten))]
    pub fn apply(&mut self, options: &Options) -> Option<SourceMap> {
        let graph = Arc::clone(&self.graph);
        let root = graph.get(self.root)?;
        let root_map = root.map()?;
        let root_mappings = root.mappings()?;

        let policy = match options.flatten {
            Flatten::Off => Flatten::Full,
            other => other,
        };
        if graph.is_terminal(self.root, policy) {
            debug!("nothing to flatten");
            return None;
        }

        let (lines, source_ids, names): (Vec<Line>, Vec<NodeId>, Vec<String>) =
            if options.flatten == Flatten::Off {
                (
                    root_mappings.clone(),
                    root.sources().to_vec(),
                    root_map.names.clone(),
                )
            } else {
                let started = Instant::now();
                let (lines, sources, names, untraceable) =
                    flatten_lines(&graph, self.root, options.flatten);
                self.tracing_time = started.elapsed();
                self.untraceable = untraceable;
                (lines, sources, names.into_iter().map(str::to_string).collect())
            };

        let started = Instant::now();
        let mappings = codec::encode(&lines);
        self.encoding_time = started.elapsed();

        let (sources, sources_content) = self.render_sources(&source_ids, options);

        debug!(
            sources = sources.len(),
            names = names.len(),
            untraceable = self.untraceable,
            "flattened source map"
        );

        Some(SourceMap {
            version: 3,
            file: root.path().map(path::file_name),
            sources,
            sources_content,
            names,
            mappings,
            source_root: options.source_root.clone(),
        })
    }
}

fn as_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}

/// Re-traces every mapped segment of `root` to its ultimate origin.
/// Returns the new lines, the source nodes and names in first-seen order,
/// and how many segments could not be traced.
fn flatten_lines<'g>(
    graph: &'g NodeGraph,
    root: NodeId,
    flatten: Flatten,
) -> (Vec<Line>, Vec<NodeId>, Vec<&'g str>, usize) {
    let mut sources = Interner::new();
    let mut names = Interner::new();
    let mut untraceable = 0usize;

    let Some(node) = graph.get(root) else {
        return (Vec::new(), Vec::new(), Vec::new(), 0);
    };
    let map = node.map();
    let children = node.sources();

    let lines = node
        .mappings()
        .map(|mappings| {
            mappings
                .iter()
                .map(|line| {
                    line.iter()
                        .filter_map(|segment| {
                            let origin = segment.origin?;
                            let hint = origin.name.and_then(|i| map?.name(i));
                            let traced = children.get(origin.source as usize).and_then(|&child| {
                                graph.trace(child, origin.line, Some(origin.column), hint, flatten)
                            });

                            let Some(traced) = traced else {
                                untraceable += 1;
                                return None;
                            };

                            Some(Segment {
                                generated_column: segment.generated_column,
                                origin: Some(Origin {
                                    source: sources.intern(traced.node),
                                    line: traced.line - 1,
                                    column: traced.column,
                                    name: traced.name.map(|name| names.intern(name)),
                                }),
                            })
                        })
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default();

    (lines, sources.order, names.order, untraceable)
}
