//! Short random identifier generation.
//!
//! Ids have the form `prefix-xxxxxx`: a two-letter prefix (`ar` for tasks,
//! `sp` for specs) and a lowercase hex suffix drawn from the thread-local
//! CSPRNG. The wire format accepts any suffix of at least four hex chars
//! (`^[a-z]{2,3}-[0-9a-f]{4,}$`); we generate six to keep collisions rare.
//! Generation does no I/O; callers retry on the rare duplicate insert.

use rand::Rng;

/// Prefix for task ids.
pub const TASK_ID_PREFIX: &str = "ar";
/// Prefix for spec ids.
pub const SPEC_ID_PREFIX: &str = "sp";

/// Minimum hex-suffix length accepted on input.
const MIN_SUFFIX_LEN: usize = 4;
/// Random bytes per generated id (two hex chars each).
const ID_SUFFIX_BYTES: usize = 3;

fn generate(prefix: &str) -> String {
    let mut bytes = [0u8; ID_SUFFIX_BYTES];
    rand::rng().fill(&mut bytes[..]);
    format!("{prefix}-{}", hex::encode(bytes))
}

/// Generate a fresh task id (`ar-xxxxxx`).
pub fn generate_task_id() -> String {
    generate(TASK_ID_PREFIX)
}

/// Generate a fresh spec id (`sp-xxxxxx`).
pub fn generate_spec_id() -> String {
    generate(SPEC_ID_PREFIX)
}

fn is_valid(id: &str, prefix: &str) -> bool {
    let Some(suffix) = id
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };
    suffix.len() >= MIN_SUFFIX_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Whether `id` is a well-formed task id.
pub fn is_valid_task_id(id: &str) -> bool {
    is_valid(id, TASK_ID_PREFIX)
}

/// Whether `id` is a well-formed spec id.
pub fn is_valid_spec_id(id: &str) -> bool {
    is_valid(id, SPEC_ID_PREFIX)
}
