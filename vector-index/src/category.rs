//! Category names.
//!
//! A category names one corpus and, through [`crate::IndexLayout`], one
//! directory under the persistence root. The only way to obtain a
//! [`Category`] is through validation, so any code holding one can build
//! paths from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// A validated category name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

impl Category {
    /// Validate and wrap a category name.
    ///
    /// Rejects the empty string, `/`, `\`, NUL, and the `.`/`..` path
    /// components.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_valid(&name) {
            return Err(IndexError::InvalidCategory(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Category {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Category {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Category {
    type Error = IndexError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Category {
    type Error = IndexError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["land_law", "family-law", "Luật Đất đai", "v1.2"] {
            let category = Category::new(name).unwrap();
            assert_eq!(category.as_str(), name);
        }
    }

    #[test]
    fn test_rejects_separators_and_traversal() {
        for name in ["", "a/b", "a\\b", "/", "\\", "..", ".", "x\0y"] {
            let err = Category::new(name).unwrap_err();
            assert!(matches!(err, IndexError::InvalidCategory(ref n) if n == name));
        }
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Category = serde_json::from_str("\"civil_law\"").unwrap();
        assert_eq!(ok.to_string(), "civil_law");

        let bad = serde_json::from_str::<Category>("\"../etc\"");
        assert!(bad.is_err());
    }
}
