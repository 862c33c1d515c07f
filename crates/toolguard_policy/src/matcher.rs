//! Tool-name patterns for rule selection.

use regex::Regex;

/// Which tools a rule applies to
#[derive(Debug, Clone)]
pub enum ToolPattern {
    /// `*`: every tool
    Any,
    /// Exact tool name
    Exact(String),
    /// Glob with `*` wildcards, e.g. `get_*`
    Glob {
        /// Pattern as written
        source: String,
        /// Anchored regex equivalent
        regex: Regex,
    },
}

impl ToolPattern {
    /// Parse a pattern
    ///
    /// # Errors
    ///
    /// Returns error message if the pattern is empty
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err("empty tool pattern".to_string());
        }
        if pattern == "*" {
            return Ok(Self::Any);
        }
        if !pattern.contains('*') {
            return Ok(Self::Exact(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| e.to_string())?;
        Ok(Self::Glob {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Check whether a tool name matches
    #[must_use]
    pub fn matches(&self, tool: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(name) => name == tool,
            Self::Glob { regex, .. } => regex.is_match(tool),
        }
    }

    /// Pattern as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Any => "*",
            Self::Exact(name) => name,
            Self::Glob { source, .. } => source,
        }
    }
}

impl PartialEq for ToolPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard() {
        let pattern = ToolPattern::parse("*").unwrap();
        assert!(pattern.matches("get_weather"));
        assert!(pattern.matches("transfer_money"));
    }

    #[test]
    fn test_exact() {
        let pattern = ToolPattern::parse("transfer_money").unwrap();
        assert!(pattern.matches("transfer_money"));
        assert!(!pattern.matches("transfer_money_v2"));
    }

    #[test]
    fn test_glob() {
        let pattern = ToolPattern::parse("get_*").unwrap();
        assert!(pattern.matches("get_weather"));
        assert!(pattern.matches("get_stock_price"));
        assert!(!pattern.matches("book_flight"));

        let pattern = ToolPattern::parse("*_money").unwrap();
        assert!(pattern.matches("transfer_money"));
        assert!(!pattern.matches("money_transfer"));
    }

    #[test]
    fn test_glob_escapes_regex_characters() {
        let pattern = ToolPattern::parse("a.b*").unwrap();
        assert!(pattern.matches("a.bc"));
        assert!(!pattern.matches("axbc"));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(ToolPattern::parse("  ").is_err());
    }
}
