//! Row predicates for `find` and `query`.

/// How one key of a row is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// The stored value equals this string exactly.
    Equals(String),
    /// The stored value matches this regular expression (unanchored).
    Matches(String),
}

impl From<&str> for Predicate {
    fn from(value: &str) -> Self {
        Predicate::Equals(value.to_string())
    }
}

impl From<String> for Predicate {
    fn from(value: String) -> Self {
        Predicate::Equals(value)
    }
}

impl From<&String> for Predicate {
    fn from(value: &String) -> Self {
        Predicate::Equals(value.clone())
    }
}

/// Predicate constructors.
pub mod op {
    use super::Predicate;

    /// Matches values against `pattern` with the backend's regex operator.
    pub fn re(pattern: impl Into<String>) -> Predicate {
        Predicate::Matches(pattern.into())
    }
}

/// A conjunction of per-key predicates. The empty filter matches every row.
///
/// A row lacking one of the filtered keys never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    terms: Vec<(String, Predicate)>,
}

impl Filter {
    /// The empty filter.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an exact-match term.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push((key.into(), Predicate::Equals(value.into())));
        self
    }

    /// Adds a regex term.
    pub fn re(mut self, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.terms.push((key.into(), op::re(pattern)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.terms.iter().map(|(key, predicate)| (key.as_str(), predicate))
    }
}

impl<K, P> FromIterator<(K, P)> for Filter
where
    K: Into<String>,
    P: Into<Predicate>,
{
    fn from_iter<I: IntoIterator<Item = (K, P)>>(iter: I) -> Self {
        Self {
            terms: iter
                .into_iter()
                .map(|(key, predicate)| (key.into(), predicate.into()))
                .collect(),
        }
    }
}

impl<K, P, const N: usize> From<[(K, P); N]> for Filter
where
    K: Into<String>,
    P: Into<Predicate>,
{
    fn from(terms: [(K, P); N]) -> Self {
        terms.into_iter().collect()
    }
}

impl<K, P> From<Vec<(K, P)>> for Filter
where
    K: Into<String>,
    P: Into<Predicate>,
{
    fn from(terms: Vec<(K, P)>) -> Self {
        terms.into_iter().collect()
    }
}

/// A filtered, ordered, paged scan request handed to a dialect.
#[derive(Debug, Clone, Default)]
pub struct Select<'a> {
    pub filter: Option<&'a Filter>,
    /// Sort ascending by this key's string value; missing sorts as "".
    pub order_by: Option<&'a str>,
    /// Keyset cursor: only rows with a greater id.
    pub after_id: Option<i64>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl<'a> Select<'a> {
    pub(crate) fn terms(&self) -> impl Iterator<Item = (&'a str, &'a Predicate)> {
        self.filter.into_iter().flat_map(|filter| filter.terms())
    }
}
