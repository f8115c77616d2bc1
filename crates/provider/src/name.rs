//! Collision-free resource naming.

use std::sync::LazyLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::ResourceInfo;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LENGTH: usize = 6;
const DEFAULT_SEPARATOR: char = '-';

/// Letters (`L*`), decimal digits (`Nd`), `_` and `-`.
static KEPT_CHARACTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{Nd}_-]$").expect("name character pattern is valid"));

/// Generates collision-free names from a single seed.
///
/// A fresh generator is created for every RPC call, so names are stable within
/// one operation and differ across operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameGenerator {
    seed: u64,
}

impl NameGenerator {
    /// Create a generator from operating system randomness.
    pub fn from_entropy() -> Self {
        Self { seed: rand::random() }
    }

    /// Create a generator with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Append a random suffix to `name`, separated by a hyphen.
    pub fn collision_free_name(&self, name: &str) -> String {
        self.collision_free_name_with_separator(name, DEFAULT_SEPARATOR)
    }

    /// Keep letters, decimal digits, `_` and `-`, turn whitespace into
    /// `separator`, drop everything else, lowercase the result and append
    /// `separator` plus a six character suffix.
    ///
    /// Other numeric characters such as roman numerals (`Ⅻ`) or superscripts
    /// are not decimal digits and are dropped.
    pub fn collision_free_name_with_separator(&self, name: &str, separator: char) -> String {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let suffix: String = (0..SUFFIX_LENGTH)
            .map(|_| char::from(SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())]))
            .collect();

        let mut buffer = [0u8; 4];
        let normalized: String = name
            .chars()
            .filter_map(|character| {
                if KEPT_CHARACTER.is_match(character.encode_utf8(&mut buffer)) {
                    Some(character)
                } else if character.is_whitespace() {
                    Some(separator)
                } else {
                    None
                }
            })
            .flat_map(char::to_lowercase)
            .collect();

        format!("{normalized}{separator}{suffix}")
    }

    /// Collision-free form of the resource's user-supplied name.
    pub fn resource_name(&self, resource: &ResourceInfo) -> String {
        self.collision_free_name(resource.raw_resource_name())
    }

    pub fn resource_name_with_separator(&self, resource: &ResourceInfo, separator: char) -> String {
        self.collision_free_name_with_separator(resource.raw_resource_name(), separator)
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Use an explicitly configured name when present, otherwise derive a
/// collision-free one from the resource.
pub fn determine_resource_name(input_name: Option<&str>, resource: &ResourceInfo, names: &NameGenerator) -> String {
    match input_name {
        Some(name) => name.to_string(),
        None => names.resource_name(resource),
    }
}
