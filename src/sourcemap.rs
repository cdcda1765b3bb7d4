use crate::{Result, SourceryError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DATA_URL_PREFIX: &str = "data:application/json;charset=utf-8;base64,";

lazy_static! {
    static ref XSSI_GUARD: Regex = Regex::new(r"^\)\]\}'[^\n]*\n").expect("valid XSSI regex");
    static ref BASE64_PAYLOAD: Regex = Regex::new(r"base64,(.+)$").expect("valid data URL regex");
}

/// A version 3 source map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub sources: Vec<Option<String>>,
    #[serde(default)]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
}

impl SourceMap {
    pub fn new(file: Option<String>) -> Self {
        Self {
            version: 3,
            file,
            sources: Vec::new(),
            sources_content: Vec::new(),
            names: Vec::new(),
            mappings: String::new(),
            source_root: None,
        }
    }

    /// Parses map JSON, stripping a leading `)]}'` XSSI guard line.
    /// `url` only labels the error.
    pub fn parse(json: &str, url: &str) -> Result<Self> {
        let body = XSSI_GUARD.replace(json, "");
        let map: Self =
            serde_json::from_str(&body).map_err(|e| SourceryError::InvalidSourceMap {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if map.version != 3 {
            return Err(SourceryError::InvalidSourceMap {
                url: url.to_string(),
                reason: format!("unsupported version {}", map.version),
            });
        }

        Ok(map)
    }

    /// Decodes a `data:` URL carrying a base64 JSON payload.
    pub fn from_data_url(url: &str, origin: &str) -> Result<Self> {
        let label = format!("data URI in {origin}");
        let payload = BASE64_PAYLOAD
            .captures(url)
            .and_then(|c| c.get(1))
            .ok_or_else(|| SourceryError::InvalidSourceMap {
                url: label.clone(),
                reason: "sourceMappingURL is not base64-encoded".to_string(),
            })?;

        let bytes = STANDARD
            .decode(payload.as_str().trim_end())
            .map_err(|e| SourceryError::InvalidSourceMap {
                url: label.clone(),
                reason: e.to_string(),
            })?;
        let json = String::from_utf8(bytes).map_err(|e| SourceryError::InvalidSourceMap {
            url: label.clone(),
            reason: e.to_string(),
        })?;

        Self::parse(&json, &label)
    }

    pub fn source(&self, index: usize) -> Option<&str> {
        self.sources.get(index).and_then(Option::as_deref)
    }

    pub fn source_content(&self, index: usize) -> Option<&str> {
        self.sources_content.get(index).and_then(Option::as_deref)
    }

    pub fn name(&self, index: u32) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_url(&self) -> Result<String> {
        let json = self.to_json()?;
        Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(json)))
    }
}
