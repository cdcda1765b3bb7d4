use crate::chain::Chain;
use crate::comment::{source_mapping_comment, strip_source_mapping_comment};
use crate::options::{Options, SourceMappingUrl};
use crate::path;
use crate::sourcemap::SourceMap;
use crate::{Result, SourceryError};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Everything [`Chain::write`] would put on disk, computed up front.
#[derive(Debug, Clone)]
pub struct Emit {
    /// Absolute destination of the artifact.
    pub dest: PathBuf,
    /// Rewritten artifact content; `None` when the root had no content.
    pub content: Option<String>,
    pub map: Option<SourceMap>,
    /// Whether the map is embedded in `content` as a data URL.
    pub inline: bool,
}

impl Emit {
    pub fn map_path(&self) -> PathBuf {
        map_path_for(&self.dest)
    }

    /// The map JSON to write next to the artifact, if any.
    pub fn map_file(&self) -> Result<Option<(PathBuf, String)>> {
        match &self.map {
            Some(map) if !self.inline => Ok(Some((self.map_path(), map.to_json()?))),
            _ => Ok(None),
        }
    }
}

fn map_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".map");
    PathBuf::from(name)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SourceryError + '_ {
    move |source| SourceryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn reference_url(map: &SourceMap, dest: &Path, base: &Path, mode: SourceMappingUrl) -> Result<String> {
    let map_path = map_path_for(dest);
    Ok(match mode {
        SourceMappingUrl::Inline => map.to_url()?,
        SourceMappingUrl::AbsolutePath => path::slash(&map_path),
        SourceMappingUrl::RelativePath => path::file_name(&map_path),
        SourceMappingUrl::BasePath => path::slash(&path::relative(base, &map_path)),
    })
}

impl Chain {
    /// Computes the destination, rewritten content and flattened map
    /// without touching the filesystem. `dest` defaults to the root file;
    /// `options.base` defaults to the destination directory.
    pub fn content_and_map(&mut self, dest: Option<&Path>, options: &Options) -> Result<Emit> {
        let dest = match dest.or_else(|| self.root_path()) {
            Some(dest) => path::absolute(dest),
            None => return Err(SourceryError::MissingInput),
        };

        let base = options
            .base
            .as_ref()
            .map_or_else(|| path::parent_dir(&dest), path::absolute);
        let options = Options {
            base: Some(base.clone()),
            ..options.clone()
        };

        let map = self.apply(&options);
        let stripped = self
            .root_content()
            .map(|content| strip_source_mapping_comment(content, &dest).into_owned());

        let content = match (&map, stripped) {
            (Some(map), Some(mut content)) => {
                let url = reference_url(map, &dest, &base, options.source_mapping_url)?;
                content.push_str(&source_mapping_comment(&url, &dest));
                Some(content)
            }
            (_, stripped) => stripped,
        };

        Ok(Emit {
            dest,
            content,
            map,
            inline: options.source_mapping_url == SourceMappingUrl::Inline,
        })
    }

    /// Writes the artifact and, unless inlined, its `.map` sibling.
    #[instrument(skip_all)]
    pub fn write_sync(&mut self, dest: Option<&Path>, options: &Options) -> Result<Emit> {
        let emit = self.content_and_map(dest, options)?;
        write_emit_sync(&emit)?;
        Ok(emit)
    }

    /// Async twin of [`Chain::write_sync`].
    #[instrument(skip_all)]
    pub async fn write(&mut self, dest: Option<&Path>, options: &Options) -> Result<Emit> {
        let emit = self.content_and_map(dest, options)?;
        write_emit(&emit).await?;
        Ok(emit)
    }
}

pub fn write_emit_sync(emit: &Emit) -> Result<()> {
    let map_file = emit.map_file()?;

    let dir = path::parent_dir(&emit.dest);
    std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;

    if let Some(content) = &emit.content {
        std::fs::write(&emit.dest, content).map_err(io_error(&emit.dest))?;
        debug!(path = %emit.dest.display(), "wrote artifact");
    }
    if let Some((map_path, json)) = map_file {
        std::fs::write(&map_path, json).map_err(io_error(&map_path))?;
        debug!(path = %map_path.display(), "wrote source map");
    }
    Ok(())
}

pub async fn write_emit(emit: &Emit) -> Result<()> {
    let map_file = emit.map_file()?;

    let dir = path::parent_dir(&emit.dest);
    tokio::fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

    if let Some(content) = &emit.content {
        tokio::fs::write(&emit.dest, content)
            .await
            .map_err(io_error(&emit.dest))?;
        debug!(path = %emit.dest.display(), "wrote artifact");
    }
    if let Some((map_path, json)) = map_file {
        tokio::fs::write(&map_path, json)
            .await
            .map_err(io_error(&map_path))?;
        debug!(path = %map_path.display(), "wrote source map");
    }
    Ok(())
}
