//! Issue identifiers: `tg-` followed by lowercase base36.
//!
//! Ids are opaque to every other layer. Generation draws random suffixes and
//! checks them against the ids already in the log, growing the suffix after
//! repeated collisions.

use rand::Rng;
use std::collections::BTreeSet;

pub const ID_PREFIX: &str = "tg-";

const MIN_SUFFIX: usize = 4;
const MAX_SUFFIX: usize = 12;
const ATTEMPTS_PER_LENGTH: usize = 8;
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("issue id '{0}' must start with 'tg-'")]
    MissingPrefix(String),

    #[error("issue id '{0}' must have a 4-12 character base36 suffix")]
    BadSuffix(String),

    #[error("could not find a free issue id after exhausting suffix lengths")]
    Exhausted,
}

/// Check that `id` is a well-formed issue id.
///
/// # Errors
///
/// [`IdError::MissingPrefix`] or [`IdError::BadSuffix`].
pub fn validate(id: &str) -> Result<(), IdError> {
    let Some(suffix) = id.strip_prefix(ID_PREFIX) else {
        return Err(IdError::MissingPrefix(id.to_string()));
    };
    let ok_len = (MIN_SUFFIX..=MAX_SUFFIX).contains(&suffix.len());
    let ok_chars = suffix
        .bytes()
        .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase());
    if ok_len && ok_chars {
        Ok(())
    } else {
        Err(IdError::BadSuffix(id.to_string()))
    }
}

/// Generate an id not present in `existing`.
///
/// # Errors
///
/// [`IdError::Exhausted`] if every suffix length up to the maximum keeps
/// colliding.
pub fn generate(existing: &BTreeSet<String>) -> Result<String, IdError> {
    generate_with(&mut rand::thread_rng(), existing)
}

/// Same as [`generate`] with a caller-provided RNG.
///
/// # Errors
///
/// [`IdError::Exhausted`] when no free id was found.
pub fn generate_with<R: Rng + ?Sized>(
    rng: &mut R,
    existing: &BTreeSet<String>,
) -> Result<String, IdError> {
    for len in MIN_SUFFIX..=MAX_SUFFIX {
        for _ in 0..ATTEMPTS_PER_LENGTH {
            let candidate = random_id(rng, len);
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
        }
        tracing::debug!(len, "issue id collisions, lengthening suffix");
    }
    Err(IdError::Exhausted)
}

fn random_id<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    let mut id = String::with_capacity(ID_PREFIX.len() + len);
    id.push_str(ID_PREFIX);
    for _ in 0..len {
        let idx = rng.gen_range(0..ALPHABET.len());
        id.push(char::from(ALPHABET[idx]));
    }
    id
}
