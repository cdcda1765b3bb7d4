use crate::codec::DEFAULT_CACHE_CAPACITY;
use crate::sourcemap::SourceMap;
use rustc_hash::FxHashMap;
use std::default::Default;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const ABSOLUTE_PATH: &str = "[absolute-path]";
pub const RELATIVE_PATH: &str = "[relative-path]";
pub const BASE_PATH: &str = "[base-path]";

#[derive(Debug, Clone)]
pub struct Options {
    pub flatten: Flatten,
    pub exclude_content: bool,
    pub source_root: Option<String>,
    pub source_path_template: String,
    pub base: Option<PathBuf>,
    pub source_mapping_url: SourceMappingUrl,
    /// Extra directories searched when resolving a map's `sources`.
    pub source_roots: Vec<PathBuf>,
    /// In-memory content, keyed by file path, consulted before disk.
    pub content: FxHashMap<PathBuf, String>,
    /// In-memory maps, keyed by the generated file's path.
    pub sourcemaps: FxHashMap<PathBuf, SourceMap>,
    pub decode_cache_capacity: usize,
}

/// How far tracing recurses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flatten {
    /// Always follow maps down to the deepest original source.
    #[default]
    Full,
    /// Stop at a node whose children's content was not available.
    Existing,
    /// Do not trace; re-emit the root map as-is.
    Off,
}

/// What the appended `sourceMappingURL` comment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMappingUrl {
    Inline,
    AbsolutePath,
    /// The map file name, which sits next to the destination.
    #[default]
    RelativePath,
    /// The map path relative to `base`.
    BasePath,
}

impl Options {
    pub const fn include_content(&self) -> bool {
        !self.exclude_content
    }

    /// Applies the older boolean switches. `inline` wins over
    /// `absolute_path`.
    #[must_use]
    pub fn with_legacy_flags(mut self, inline: bool, absolute_path: bool) -> Self {
        if inline {
            self.source_mapping_url = SourceMappingUrl::Inline;
        } else if absolute_path {
            self.source_mapping_url = SourceMappingUrl::AbsolutePath;
        }
        self
    }

    #[must_use]
    pub fn with_content(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.content.insert(path.into(), content.into());
        self
    }

    #[must_use]
    pub fn with_sourcemap(mut self, path: impl Into<PathBuf>, map: SourceMap) -> Self {
        self.sourcemaps.insert(path.into(), map);
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            flatten: Flatten::Full,
            exclude_content: false,
            source_root: None,
            source_path_template: RELATIVE_PATH.to_string(),
            base: None,
            source_mapping_url: SourceMappingUrl::RelativePath,
            source_roots: Vec::new(),
            content: FxHashMap::default(),
            sourcemaps: FxHashMap::default(),
            decode_cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl FromStr for Flatten {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "existing" => Ok(Self::Existing),
            "none" | "false" | "off" => Ok(Self::Off),
            other => Err(format!(
                "unknown flatten policy '{other}' (expected full, existing or none)"
            )),
        }
    }
}

impl fmt::Display for Flatten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Existing => "existing",
            Self::Off => "none",
        })
    }
}

impl FromStr for SourceMappingUrl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline" => Ok(Self::Inline),
            ABSOLUTE_PATH => Ok(Self::AbsolutePath),
            RELATIVE_PATH => Ok(Self::RelativePath),
            BASE_PATH => Ok(Self::BasePath),
            other => Err(format!("unknown sourceMappingURL mode '{other}'")),
        }
    }
}
