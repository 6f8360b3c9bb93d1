//! Nickname helpers.
//!
//! Guest nicknames have the form `guestNNNN`, which fits within IRC's
//! traditional 9-character limit.

use rand::RngExt;

/// Characters besides letters and digits that RFC 2812 allows in a nick.
const SPECIAL: &[char] = &['[', ']', '\\', '`', '_', '^', '{', '|', '}', '-'];

/// Generate a random nickname like `guest0427`.
pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let num: u16 = rng.random_range(0..10000);
    format!("guest{num:04}")
}

/// A nick must start with a letter or special character and contain only
/// letters, digits and specials after that.
pub fn is_valid_nickname(nick: &str) -> bool {
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || SPECIAL.contains(&first)) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || SPECIAL.contains(&c))
}
