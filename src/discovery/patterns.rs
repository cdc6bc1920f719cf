//! Glob pattern lists as they appear in configuration.

use serde::{Deserialize, Serialize};

/// One glob pattern or a list of them.
///
/// Deserializes from either `files = "mw/*.toml"` or `files = ["a/*.toml", "b/*.json"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Patterns {
    /// Iterate over the individual patterns.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Patterns::One(p) => std::slice::from_ref(p),
            Patterns::Many(ps) => ps,
        };
        slice.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        match self {
            Patterns::One(_) => 1,
            Patterns::Many(ps) => ps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Patterns {
    fn default() -> Self {
        Patterns::Many(Vec::new())
    }
}

impl From<&str> for Patterns {
    fn from(pattern: &str) -> Self {
        Patterns::One(pattern.to_string())
    }
}

impl From<String> for Patterns {
    fn from(pattern: String) -> Self {
        Patterns::One(pattern)
    }
}

impl From<Vec<String>> for Patterns {
    fn from(patterns: Vec<String>) -> Self {
        Patterns::Many(patterns)
    }
}

impl From<Vec<&str>> for Patterns {
    fn from(patterns: Vec<&str>) -> Self {
        Patterns::Many(patterns.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        files: Patterns,
    }

    #[test]
    fn test_single_or_list() {
        let one: Holder = toml::from_str(r#"files = "mw/*.toml""#).unwrap();
        assert_eq!(one.files.iter().collect::<Vec<_>>(), vec!["mw/*.toml"]);

        let many: Holder = toml::from_str(r#"files = ["a/*.toml", "b/*.json"]"#).unwrap();
        assert_eq!(many.files.len(), 2);
        assert_eq!(many.files.iter().last(), Some("b/*.json"));
    }

    #[test]
    fn test_default_is_empty() {
        assert!(Patterns::default().is_empty());
    }
}
