//! Site identifier generation.
//!
//! Sites are managed by an external collaborator; this module only supplies
//! the woodland-themed public identifier format that site rows carry,
//! e.g. `pine-owl-AB12CD`.

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "mossy", "ancient", "twisted", "golden", "silver", "whispering", "hidden", "misty", "wild",
    "verdant", "dappled", "rustling", "peaceful", "mighty", "gentle", "dancing", "sleeping",
    "glowing", "silent", "eternal", "sacred", "luminous", "amber", "emerald",
];

const NOUNS: &[&str] = &[
    "oak", "pine", "birch", "willow", "maple", "cedar", "acorn", "mushroom", "fern", "moss",
    "brook", "clearing", "hollow", "grove", "canopy", "branch", "leaf", "squirrel", "deer", "owl",
    "fox", "badger", "wren", "firefly",
];

const SUFFIX_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 6;

/// Generate a site identifier of the form `adjective-noun-XXXXXX`.
///
/// Uniqueness is enforced by the store's UNIQUE constraint, not here; the
/// caller retries on a collision.
pub fn generate_identifier() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"mossy");
    let noun = NOUNS.choose(&mut rng).unwrap_or(&"acorn");
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())] as char)
        .collect();
    format!("{}-{}-{}", adjective, noun, suffix)
}
