//! Path-glob key filters
//!
//! A pattern is split into `/`-separated components and each component is matched
//! against one path component with `*`, `?` and `[...]` wildcards; no wildcard ever
//! crosses a `/`. Relative patterns are anchored at the end of the key, so `*.yaml`
//! matches `a/b/c.yaml`. A pattern with a leading `/` must match the whole key.

use datakube_common::{DatakubeError, Result};
use glob::Pattern;

/// One compiled glob pattern
#[derive(Debug, Clone)]
pub struct PathGlob {
    absolute: bool,
    components: Vec<Pattern>,
}

fn components(path: &str) -> impl DoubleEndedIterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty() && *part != ".")
}

impl PathGlob {
    pub fn new(pattern: &str) -> Result<Self> {
        let absolute = pattern.starts_with('/');
        let components = components(pattern)
            .map(|part| {
                Pattern::new(part).map_err(|e| {
                    DatakubeError::Config(format!("invalid prefix filter '{pattern}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if components.is_empty() {
            return Err(DatakubeError::Config(format!(
                "invalid prefix filter '{pattern}': empty pattern"
            )));
        }

        Ok(Self {
            absolute,
            components,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        let parts: Vec<&str> = components(key).collect();

        if self.absolute {
            if parts.len() != self.components.len() {
                return false;
            }
        } else if parts.len() < self.components.len() {
            return false;
        }

        parts
            .iter()
            .rev()
            .zip(self.components.iter().rev())
            .all(|(part, glob)| glob.matches(part))
    }
}

/// A set of globs; a key is selected when the set is empty or any glob matches.
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    globs: Vec<PathGlob>,
}

impl KeyFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let globs = patterns
            .iter()
            .map(|pattern| PathGlob::new(pattern.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { globs })
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    pub fn selects(&self, key: &str) -> bool {
        self.globs.is_empty() || self.globs.iter().any(|glob| glob.matches(key))
    }
}
