// ABOUTME: Category filtering applied to fetched transactions
// ABOUTME: Handles include/exclude category lists and their validation

use std::collections::BTreeSet;

use crate::error::SyncError;

/// Include/exclude rules over provider categories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    include: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
}

impl CategoryFilter {
    /// Creates a filter from request options
    ///
    /// An empty include list is treated as "no include filter".
    pub fn new(
        include_categories: Option<Vec<String>>,
        exclude_categories: Option<Vec<String>>,
    ) -> Result<Self, SyncError> {
        let include = normalize("include", include_categories)?;
        let exclude = normalize("exclude", exclude_categories)?.unwrap_or_default();

        if let Some(include) = &include {
            if let Some(conflict) = include.intersection(&exclude).next() {
                return Err(SyncError::Validation(format!(
                    "category '{}' is both included and excluded",
                    conflict
                )));
            }
        }

        Ok(Self { include, exclude })
    }

    /// Creates an empty filter (keep everything)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_empty()
    }

    /// Whether a transaction with this category should be kept.
    ///
    /// Uncategorised transactions never satisfy an include list.
    pub fn allows(&self, category: Option<&str>) -> bool {
        if let Some(category) = category {
            if self.exclude.contains(category) {
                return false;
            }
        }

        match (&self.include, category) {
            (None, _) => true,
            (Some(include), Some(category)) => include.contains(category),
            (Some(_), None) => false,
        }
    }

    pub fn include_categories(&self) -> Option<&BTreeSet<String>> {
        self.include.as_ref()
    }

    pub fn exclude_categories(&self) -> &BTreeSet<String> {
        &self.exclude
    }
}

fn normalize(
    label: &str,
    categories: Option<Vec<String>>,
) -> Result<Option<BTreeSet<String>>, SyncError> {
    let Some(categories) = categories else {
        return Ok(None);
    };

    let mut set = BTreeSet::new();
    for category in categories {
        let trimmed = category.trim();
        if trimmed.is_empty() {
            return Err(SyncError::Validation(format!(
                "{} categories cannot contain an empty name",
                label
            )));
        }
        set.insert(trimmed.to_string());
    }

    Ok(if set.is_empty() { None } else { Some(set) })
}
