//! Image allow-list, loaded once at startup.
//!
//! The allow-list file carries one full image reference per line, e.g.
//! `gcr.io/hail-vdc/hail-jupyter:2024-08`. The short name callers use is
//! the path segment between the final `/` and the tag separator.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ConfigError, Error, Result};

/// The fixed set of image references callers may request.
#[derive(Debug, Clone)]
pub struct ImageCatalog {
    images: HashMap<String, String>,
}

impl ImageCatalog {
    /// Load the catalog from the allow-list file. A missing or unparseable
    /// file is fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ImageList {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse allow-list file content.
    pub fn parse(content: &str) -> Result<Self> {
        let mut images = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            let name = short_name(entry).ok_or_else(|| ConfigError::ImageEntry {
                line: idx + 1,
                entry: entry.to_string(),
            })?;
            images.insert(name.to_string(), entry.to_string());
        }
        if images.is_empty() {
            return Err(Error::Config(ConfigError::ImageEntry {
                line: 0,
                entry: "allow-list is empty".to_string(),
            }));
        }
        Ok(Self { images })
    }

    /// Resolve a short name to its full image reference.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.images.get(name).map(String::as_str)
    }

    /// Short names available to callers.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// The segment between the final `/` and the following `:` tag separator.
fn short_name(image_ref: &str) -> Option<&str> {
    let after_slash = image_ref.rsplit_once('/')?.1;
    let (name, _tag) = after_slash.split_once(':')?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_names_from_full_refs() {
        let catalog = ImageCatalog::parse(
            "gcr.io/hail-vdc/hail:0.2.11\ngcr.io/hail-vdc/hail-jupyter:2024-08\n",
        )
        .unwrap();
        assert_eq!(catalog.resolve("hail"), Some("gcr.io/hail-vdc/hail:0.2.11"));
        assert_eq!(
            catalog.resolve("hail-jupyter"),
            Some("gcr.io/hail-vdc/hail-jupyter:2024-08")
        );
        assert_eq!(catalog.resolve("not-a-real-image"), None);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn skips_blank_lines() {
        let catalog = ImageCatalog::parse("\ngcr.io/x/img:1\n\n").unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn rejects_untagged_entries() {
        let err = ImageCatalog::parse("gcr.io/x/img\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn rejects_empty_file() {
        assert!(ImageCatalog::parse("").is_err());
    }

    #[test]
    fn load_fails_on_missing_file() {
        assert!(ImageCatalog::load("/definitely/not/here").is_err());
    }
}
