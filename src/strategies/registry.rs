//! Process-wide mapping from strategy identifiers to factories.

use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

use super::{binary, fraz, grid, guess, guess_first, midpoint, random, Search};

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A read-mostly registry of named factories.
pub struct Registry<T> {
    factories: RwLock<BTreeMap<String, Factory<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, id: impl Into<String>, factory: impl Fn() -> T + Send + Sync + 'static) {
        self.factories
            .write()
            .expect("registry lock poisoned")
            .insert(id.into(), Box::new(factory));
    }

    /// Construct a fresh instance of the named plugin.
    pub fn build(&self, id: &str) -> Option<T> {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .get(id)
            .map(|f| f())
    }

    pub fn names(&self) -> Vec<String> {
        self.factories
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide search strategy registry, seeded with the built-in
/// strategies on first use. External code may register additional factories
/// before building a strategy tree.
pub fn search_plugins() -> &'static Registry<Box<dyn Search>> {
    static PLUGINS: OnceLock<Registry<Box<dyn Search>>> = OnceLock::new();
    PLUGINS.get_or_init(|| {
        let registry = Registry::new();
        registry.register("guess", || Box::new(guess::Guess::default()) as Box<dyn Search>);
        registry.register("guess_midpoint", || {
            Box::new(midpoint::GuessMidpoint::default()) as Box<dyn Search>
        });
        registry.register("binary", || {
            Box::new(binary::BinarySearch::default()) as Box<dyn Search>
        });
        registry.register("random", || {
            Box::new(random::RandomSearch::default()) as Box<dyn Search>
        });
        registry.register("fraz", || Box::new(fraz::Fraz::default()) as Box<dyn Search>);
        registry.register("guess_first", || {
            Box::new(guess_first::GuessFirst::default()) as Box<dyn Search>
        });
        registry.register("dist_gridsearch", || {
            Box::new(grid::DistGridSearch::default()) as Box<dyn Search>
        });
        registry
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_strategies_are_registered() {
        let names = search_plugins().names();
        for expected in [
            "binary",
            "dist_gridsearch",
            "fraz",
            "guess",
            "guess_first",
            "guess_midpoint",
            "random",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn build_constructs_fresh_instances() {
        let a = search_plugins().build("guess").unwrap();
        let b = search_plugins().build("guess").unwrap();
        assert_eq!(a.prefix(), "guess");
        assert_eq!(b.prefix(), "guess");
        assert!(search_plugins().build("no_such_strategy").is_none());
    }
}
