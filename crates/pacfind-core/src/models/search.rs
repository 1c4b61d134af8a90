use crate::models::{CoreError, PackageRecord, SourceTag};

/// Case folding applied to every package-name comparison.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// True when two package names are equal after case folding.
pub fn names_match(a: &str, b: &str) -> bool {
    fold_name(a) == fold_name(b)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum QueryMode {
    Substring,
    Exact,
}

/// A search term bound to a matching mode. Matching is case-insensitive in both modes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Query {
    text: String,
    needle: String,
    mode: QueryMode,
}

impl Query {
    pub fn substring(text: impl Into<String>) -> Self {
        Self::with_mode(text, QueryMode::Substring)
    }

    pub fn exact(text: impl Into<String>) -> Self {
        Self::with_mode(text, QueryMode::Exact)
    }

    fn with_mode(text: impl Into<String>, mode: QueryMode) -> Self {
        let text = text.into();
        let needle = fold_name(&text);
        Self { text, needle, mode }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn matches(&self, name: &str) -> bool {
        let candidate = fold_name(name);
        match self.mode {
            QueryMode::Substring => candidate.contains(&self.needle),
            QueryMode::Exact => candidate == self.needle,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceFailure {
    pub source: SourceTag,
    pub error: CoreError,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AggregationResult {
    /// Arrival order across sources; not a ranking.
    pub records: Vec<PackageRecord>,
    pub failures: Vec<SourceFailure>,
    pub cancelled: bool,
    /// Configured sources, including ones that failed to register.
    pub sources: usize,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when every configured source failed, as opposed to "no matches".
    pub fn is_total_failure(&self) -> bool {
        self.sources > 0 && self.records.is_empty() && self.failures.len() >= self.sources
    }

    pub fn records_from<'a>(
        &'a self,
        source: &'a SourceTag,
    ) -> impl Iterator<Item = &'a PackageRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| &record.source == source)
    }
}
