use crate::codec::Origin;
use crate::node::{NodeGraph, NodeId};
use crate::options::Flatten;
use std::path::Path;
use tracing::warn;

/// Where a generated position ends up after following every map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trace<'g> {
    /// The terminal node reached.
    pub node: NodeId,
    /// Its path; `None` for content-only nodes.
    pub source: Option<&'g Path>,
    /// One-based line.
    pub line: u32,
    /// Zero-based column; 0 when only the line could be traced.
    pub column: u32,
    pub name: Option<&'g str>,
}

impl NodeGraph {
    /// Traces a zero-based position in `id` back to its origin.
    ///
    /// `column == None` asks for a line-level trace. When no segment starts
    /// exactly at `column`, the first segment of the line is followed
    /// instead and column precision is dropped from there on. A name found
    /// deeper in the chain replaces `name`; levels without one pass it
    /// through. Returns `None` when the position is not mapped.
    pub fn trace<'g>(
        &'g self,
        id: NodeId,
        line: u32,
        column: Option<u32>,
        name: Option<&'g str>,
        flatten: Flatten,
    ) -> Option<Trace<'g>> {
        let (mut id, mut line, mut column, mut name) = (id, line, column, name);

        // a map cycle would otherwise never reach a terminal node
        for _ in 0..=self.len() {
            let node = self.get(id)?;

            if self.is_terminal(id, flatten) {
                return Some(Trace {
                    node: id,
                    source: node.path(),
                    line: line + 1,
                    column: column.unwrap_or(0),
                    name,
                });
            }

            let segments = node.mappings()?.get(line as usize)?;
            let first = segments.first()?;

            let exact = column.and_then(|column| {
                segments
                    .iter()
                    .take_while(|s| s.generated_column <= column)
                    .find(|s| s.generated_column == column)
            });

            let (origin, next_column): (Origin, Option<u32>) = match exact {
                Some(segment) => {
                    let origin = segment.origin?;
                    (origin, Some(origin.column))
                }
                None => (first.origin?, None),
            };

            if let Some(found) = origin.name.and_then(|index| node.map()?.name(index)) {
                name = Some(found);
            }

            id = *node.sources().get(origin.source as usize)?;
            line = origin.line;
            column = next_column;
        }

        warn!(node = id.index(), "source map chain loops back on itself");
        None
    }
}
