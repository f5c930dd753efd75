//! Session name generation.
//!
//! Display names are built from four bundled word lists and stay unique
//! for as long as the session that owns them is alive.

use std::collections::HashSet;
use std::sync::Mutex;

use rand::Rng;
use tracing::warn;

use crate::core::{FALLBACK_SESSION_NAME, NAME_GENERATE_ATTEMPTS};

const ADJECTIVES: &[&str] = &[
    "Bold", "Brave", "Brisk", "Calm", "Clever", "Daring", "Eager", "Fancy", "Fuzzy", "Gentle",
    "Grand", "Happy", "Humble", "Icy", "Jolly", "Keen", "Kind", "Loud", "Lucky", "Mellow",
    "Merry", "Nimble", "Noble", "Odd", "Plucky", "Proud", "Quiet", "Rapid", "Regal", "Sleepy",
    "Sturdy", "Swift", "Tidy", "Tiny", "Vivid", "Wild", "Witty", "Young", "Zesty",
];

const NOUNS: &[&str] = &[
    "Badger", "Bison", "Condor", "Crane", "Dingo", "Ermine", "Falcon", "Ferret", "Gecko", "Hare",
    "Heron", "Ibex", "Jackal", "Kestrel", "Lemur", "Lynx", "Marmot", "Mole", "Moose", "Newt",
    "Ocelot", "Osprey", "Otter", "Panther", "Puffin", "Quail", "Rabbit", "Raven", "Seal", "Stoat",
    "Tapir", "Toad", "Viper", "Vole", "Walrus", "Weasel", "Wombat", "Yak", "Zebra",
];

const VERBS: &[&str] = &[
    "Climbs", "Crawls", "Dashes", "Dives", "Drifts", "Flips", "Floats", "Gallops", "Glides",
    "Hides", "Hops", "Jumps", "Leaps", "Marches", "Naps", "Paddles", "Prowls", "Rambles", "Rolls",
    "Runs", "Sails", "Scampers", "Skips", "Slides", "Sneaks", "Soars", "Spins", "Sprints",
    "Stomps", "Struts", "Swims", "Swoops", "Trots", "Tumbles", "Waddles", "Wades", "Wanders",
    "Whirls", "Zooms",
];

const ADVERBS: &[&str] = &[
    "Boldly", "Bravely", "Briskly", "Calmly", "Coolly", "Daily", "Deftly", "Dimly", "Eagerly",
    "Early", "Fiercely", "Fondly", "Freely", "Gently", "Gladly", "Keenly", "Lazily", "Lightly",
    "Loudly", "Madly", "Merrily", "Neatly", "Nightly", "Nimbly", "Oddly", "Proudly", "Quickly",
    "Quietly", "Rarely", "Sadly", "Sharply", "Shyly", "Slowly", "Slyly", "Smoothly", "Softly",
    "Swiftly", "Warmly", "Wildly",
];

/// Generator of unique human-readable session names.
///
/// Word lists are compiled in and immutable; the in-use set is guarded
/// by a single mutex so concurrent generate/release calls never observe
/// a name as both free and taken.
pub struct NamePool {
    lists: [&'static [&'static str]; 4],
    in_use: Mutex<HashSet<String>>,
}

impl NamePool {
    /// Create a pool over the bundled word lists.
    pub fn new() -> Self {
        Self {
            lists: [ADJECTIVES, NOUNS, VERBS, ADVERBS],
            in_use: Mutex::new(HashSet::new()),
        }
    }

    /// Generate and reserve a fresh name.
    ///
    /// Concatenates one word from each list (adjective, noun, verb,
    /// adverb). Retries on collision with a name already in use; after
    /// [`NAME_GENERATE_ATTEMPTS`] failures returns
    /// [`FALLBACK_SESSION_NAME`] without reserving it.
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        for _ in 0..NAME_GENERATE_ATTEMPTS {
            let candidate: String = self
                .lists
                .iter()
                .map(|list| list[rng.gen_range(0..list.len())])
                .collect();

            let mut in_use = self.in_use.lock().expect("name pool lock");
            if !in_use.contains(&candidate) {
                in_use.insert(candidate.clone());
                return candidate;
            }
        }

        warn!(
            attempts = NAME_GENERATE_ATTEMPTS,
            "name generation exhausted, using fallback"
        );
        FALLBACK_SESSION_NAME.to_string()
    }

    /// Reserve an explicitly requested name.
    ///
    /// Returns `false` if the name is already in use.
    pub fn claim(&self, name: &str) -> bool {
        let mut in_use = self.in_use.lock().expect("name pool lock");
        if in_use.contains(name) {
            return false;
        }
        in_use.insert(name.to_string());
        true
    }

    /// Release a name back to the pool. No-op if absent.
    pub fn release(&self, name: &str) {
        self.in_use.lock().expect("name pool lock").remove(name);
    }

    /// Whether a name is currently reserved.
    pub fn is_in_use(&self, name: &str) -> bool {
        self.in_use.lock().expect("name pool lock").contains(name)
    }
}

impl Default for NamePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tiny_pool() -> NamePool {
        // One word per list: exactly one possible candidate.
        NamePool {
            lists: [&["Solo"], &["Crab"], &["Sits"], &["Still"]],
            in_use: Mutex::new(HashSet::new()),
        }
    }

    #[test]
    fn test_generate_reserves_name() {
        let pool = NamePool::new();
        let name = pool.generate();
        assert!(pool.is_in_use(&name));
        assert!(!pool.claim(&name));
    }

    #[test]
    fn test_release_frees_name() {
        let pool = NamePool::new();
        let name = pool.generate();
        pool.release(&name);
        assert!(!pool.is_in_use(&name));
        assert!(pool.claim(&name));
    }

    #[test]
    fn test_release_absent_is_noop() {
        let pool = NamePool::new();
        pool.release("NeverReserved");
    }

    #[test]
    fn test_fallback_after_exhaustion() {
        let pool = tiny_pool();
        assert_eq!(pool.generate(), "SoloCrabSitsStill");

        // Every candidate now collides; all attempts fail.
        let fallback = pool.generate();
        assert_eq!(fallback, FALLBACK_SESSION_NAME);
        assert!(!pool.is_in_use(FALLBACK_SESSION_NAME));
    }

    #[test]
    fn test_claim_race_single_winner() {
        let pool = Arc::new(NamePool::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(std::thread::spawn(move || pool.claim("ContestedName")));
        }
        let winners: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_concurrent_generate_unique() {
        let pool = Arc::new(NamePool::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(std::thread::spawn(move || {
                (0..50).map(|_| pool.generate()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(seen.insert(name), "duplicate name issued");
            }
        }
    }
}
