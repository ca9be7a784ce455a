use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Class of forwarding rule.
///
/// The set is closed: each variant owns a rule collection in the registry
/// and a path namespace on the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// SQL injection
    #[serde(rename = "sqlis")]
    Sqli,
    /// Cross-site scripting
    #[serde(rename = "xsss")]
    Xss,
    /// File upload
    #[serde(rename = "fus")]
    FileUpload,
}

impl Category {
    /// Every category, in resolution order.
    pub const ALL: [Category; 3] = [Category::Sqli, Category::Xss, Category::FileUpload];

    /// Path segment used on the analyzer.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sqli => "sqlis",
            Category::Xss => "xsss",
            Category::FileUpload => "fus",
        }
    }

    /// Default registry collection holding this category's enabled rules.
    #[inline]
    pub fn default_collection(&self) -> &'static str {
        match self {
            Category::Sqli => "analyzer-sqlis",
            Category::Xss => "analyzer-xsss",
            Category::FileUpload => "analyzer-fus",
        }
    }

    /// Parse from the analyzer path segment.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlis" => Some(Category::Sqli),
            "xsss" => Some(Category::Xss),
            "fus" => Some(Category::FileUpload),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while loading a category table.
#[derive(Error, Debug)]
pub enum CategoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown category: {0}")]
    Unknown(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Lookup table from category to registry collection name.
///
/// Iteration follows `Category` ordering so resolution is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    entries: BTreeMap<Category, String>,
}

impl CategoryTable {
    /// Build a table from explicit pairs.
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Category, S)>,
        S: Into<String>,
    {
        CategoryTable {
            entries: pairs.into_iter().map(|(c, s)| (c, s.into())).collect(),
        }
    }

    /// Load a table from a YAML mapping of `category: collection`.
    ///
    /// Categories missing from the file are disabled.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CategoryError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a table from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, CategoryError> {
        let raw: BTreeMap<String, String> = serde_yaml::from_str(content)?;

        let mut entries = BTreeMap::new();
        for (key, collection) in raw {
            let category = Category::from_str(&key).ok_or_else(|| CategoryError::Unknown(key.clone()))?;
            let collection = collection.trim();
            if collection.is_empty() {
                return Err(CategoryError::Validation(format!(
                    "Empty collection name for category {}",
                    category
                )));
            }
            entries.insert(category, collection.to_string());
        }

        if entries.is_empty() {
            return Err(CategoryError::Validation(
                "Category table cannot be empty".to_string(),
            ));
        }

        Ok(CategoryTable { entries })
    }

    /// Collection name for a category, if enabled.
    pub fn collection(&self, category: Category) -> Option<&str> {
        self.entries.get(&category).map(String::as_str)
    }

    /// Iterate `(category, collection)` pairs in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &str)> {
        self.entries.iter().map(|(c, s)| (*c, s.as_str()))
    }

    /// Collection names that must exist before serving traffic.
    pub fn collections(&self) -> Vec<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        CategoryTable::new(Category::ALL.iter().map(|c| (*c, c.default_collection())))
    }
}
