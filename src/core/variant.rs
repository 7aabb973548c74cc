/// Seed and variant generation: reproducible per-session personalization.
///
/// Everything here except the profile draw is a pure function of its
/// inputs: the same session walking the same path sees the same seeds,
/// descriptors, and phrasing, while different sessions diverge.

use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use crate::schema::session::{PersonalityTrait, SessionId, SessionProfile};

/// Dynamic seeds fall in `[0, SEED_MODULUS)`.
pub const SEED_MODULUS: u64 = 999_999;

/// Number of traits and styles drawn for a new session.
pub const PROFILE_SIZE: usize = 3;

/// Style preferences a session profile draws from.
pub const STYLE_OPTIONS: [&str; 10] = [
    "fantasy",
    "medieval",
    "ethereal",
    "mystical",
    "dramatic",
    "whimsical",
    "dark",
    "bright",
    "colorful",
    "muted",
];

/// Catalog of extra descriptors selected by session hash.
pub const UNIQUE_STYLES: [&str; 16] = [
    "cinematic lighting",
    "golden hour",
    "blue hour",
    "mist",
    "ray tracing",
    "dramatic shadows",
    "soft focus",
    "high contrast",
    "low saturation",
    "high saturation",
    "dreamlike",
    "surreal",
    "watercolor style",
    "oil painting style",
    "concept art",
    "digital art",
];

/// Verbs after which an adverb may be inserted. Case-sensitive.
pub const COMMON_VERBS: [&str; 16] = [
    "Take", "Go", "Explore", "Talk", "Help", "Ignore", "Follow", "Leave", "Examine", "Search",
    "Ask", "Fight", "Run", "Hide", "Climb", "Jump",
];

/// SHA-256 digest of a session id, treated as a 256-bit unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHash([u8; 32]);

impl SessionHash {
    pub fn of(id: &SessionId) -> Self {
        Self(sha256(id.as_str()))
    }

    /// The digest modulo `m`.
    pub fn rem(&self, m: u64) -> u64 {
        digest_rem(&self.0, m)
    }

    /// `(hash + offset) mod len`, as an index into a list of `len` items.
    pub fn pick(&self, offset: usize, len: usize) -> usize {
        debug_assert!(len > 0);
        let len = len as u64;
        ((self.rem(len) + offset as u64 % len) % len) as usize
    }
}

fn sha256(input: &str) -> [u8; 32] {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Big-endian remainder of an arbitrary-length digest.
fn digest_rem(bytes: &[u8], m: u64) -> u64 {
    let m = m as u128;
    bytes
        .iter()
        .fold(0u128, |acc, &b| (acc * 256 + b as u128) % m) as u64
}

/// Derive the illustration seed for a node visit.
///
/// With a session id the seed hashes `"{base}-{path}-{session}"`; without
/// one it falls back to the base seed offset by a hash of the path alone.
pub fn dynamic_seed(base_seed: u64, path: &[String], session: Option<&SessionId>) -> u64 {
    let joined = path.concat();
    match session {
        Some(id) => {
            let combined = format!("{}-{}-{}", base_seed, joined, id);
            digest_rem(&sha256(&combined), SEED_MODULUS)
        }
        None => {
            let path_rem = digest_rem(&sha256(&joined), SEED_MODULUS);
            (base_seed % SEED_MODULUS + path_rem) % SEED_MODULUS
        }
    }
}

/// Draw three personality traits for a new session.
pub fn derive_personality_traits<R: Rng + ?Sized>(rng: &mut R) -> Vec<PersonalityTrait> {
    PersonalityTrait::ALL
        .choose_multiple(rng, PROFILE_SIZE)
        .copied()
        .collect()
}

/// Draw three style preferences for a new session.
pub fn derive_style_preferences<R: Rng + ?Sized>(rng: &mut R) -> Vec<String> {
    STYLE_OPTIONS
        .choose_multiple(rng, PROFILE_SIZE)
        .map(|s| s.to_string())
        .collect()
}

/// Draw a complete profile. Callers pass an entropy-seeded RNG in
/// production; the profile is not reproducible from the session id.
pub fn draw_profile<R: Rng + ?Sized>(rng: &mut R) -> SessionProfile {
    SessionProfile {
        traits: derive_personality_traits(rng),
        styles: derive_style_preferences(rng),
    }
}

/// Extend a base illustration prompt with journey-derived descriptors.
///
/// Appends `styles`, then sentiment descriptors, then one to three
/// catalog descriptors chosen by session hash, then `seed:{token}`.
pub fn enhance_prompt(
    base_prompt: &str,
    sentiment: &FxHashMap<String, u32>,
    styles: &[String],
    session: Option<&SessionHash>,
    token: u64,
) -> String {
    let tally = |tag: &str| sentiment.get(tag).copied().unwrap_or(0);
    let mut elements: Vec<&str> = styles.iter().map(String::as_str).collect();

    if tally("kind") > tally("selfish") {
        elements.push("warm light");
    } else {
        elements.push("cool tones");
    }
    if tally("adventurous") > 1 {
        elements.push("vibrant");
    }
    if tally("cautious") > 1 {
        elements.push("muted colors");
    }

    if let Some(hash) = session {
        let count = 1 + hash.rem(3) as usize;
        for i in 0..count {
            elements.push(UNIQUE_STYLES[hash.pick(i, UNIQUE_STYLES.len())]);
        }
    }

    format!("{}, {}, seed:{}", base_prompt, elements.join(", "), token)
}

/// Insert a personality adverb after the first recognized verb.
///
/// Text without a recognized verb (or whose verb is the last word) comes
/// back unchanged, as does any text when `traits` is empty.
pub fn personalize_choice_text(
    text: &str,
    choice_index: usize,
    traits: &[PersonalityTrait],
    hash: &SessionHash,
) -> String {
    let adverbs: Vec<&str> = traits.iter().flat_map(|t| t.adverbs()).collect();
    if adverbs.is_empty() {
        return text.to_string();
    }
    let adverb = adverbs[hash.pick(choice_index, adverbs.len())];

    let words: Vec<&str> = text.split_whitespace().collect();
    for (j, word) in words.iter().enumerate() {
        if COMMON_VERBS.contains(word) && j + 1 < words.len() {
            return format!(
                "{} {} {}",
                words[..=j].join(" "),
                adverb,
                words[j + 1..].join(" ")
            );
        }
    }
    text.to_string()
}

/// Whether `text` contains a verb personalization can act on.
pub fn has_personalizable_verb(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .iter()
        .enumerate()
        .any(|(j, w)| COMMON_VERBS.contains(w) && j + 1 < words.len())
}
