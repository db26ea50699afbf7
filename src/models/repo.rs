//! Repository reference used as the aggregation/deduplication key.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Identifies one repository on one provider. Value equality on all fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoIdentifier {
    pub provider: String,
    pub owner: String,
    pub name: String,
}

impl RepoIdentifier {
    pub fn new(
        provider: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Display ordering: case-insensitive owner, then case-insensitive name.
    ///
    /// Exact strings and the provider break remaining ties so that repeated
    /// sorts over the same set are byte-identical.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.owner
            .to_lowercase()
            .cmp(&other.owner.to_lowercase())
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
            .then_with(|| self.owner.cmp(&other.owner))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.provider.cmp(&other.provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_value() {
        let a = RepoIdentifier::new("github", "acme", "widget");
        let b = RepoIdentifier::new("github", "acme", "widget");
        assert_eq!(a, b);
        assert_ne!(a, RepoIdentifier::new("bitbucket", "acme", "widget"));
    }

    #[test]
    fn display_order_is_owner_then_name_case_insensitive() {
        let mut repos = vec![
            RepoIdentifier::new("github", "Zeta", "api"),
            RepoIdentifier::new("github", "acme", "Widget"),
            RepoIdentifier::new("bitbucket", "acme", "backend"),
        ];
        repos.sort_by(|a, b| a.display_cmp(b));
        let names: Vec<&str> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["backend", "Widget", "api"]);
    }

    #[test]
    fn display_order_ties_broken_deterministically() {
        let a = RepoIdentifier::new("github", "acme", "widget");
        let b = RepoIdentifier::new("bitbucket", "acme", "widget");
        assert_eq!(a.display_cmp(&b), Ordering::Greater);
        assert_eq!(b.display_cmp(&a), Ordering::Less);
    }
}
