//! Random code generation for blob names and one-off identifiers.

use std::ops::BitOr;

use rand::Rng;

const DIGITS: &str = "0123456789";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LIMITED_SPECIAL: &str = "!@#$%*-_+=?";
const ALL_SPECIAL: &str = "!@#$%^&*()-_+=[]{}|;:,.<>?/~";

/// Characters that are easily confused when read back by a human.
const SIMILAR: &str = "0O1lI5S2Z";

/// Longest code [`random_code`] will produce.
pub const MAX_CODE_LEN: usize = 1024;

/// Bit set of character groups to draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharGroups(u8);

impl CharGroups {
    pub const DIGITS: CharGroups = CharGroups(1);
    pub const LOWER: CharGroups = CharGroups(1 << 1);
    pub const UPPER: CharGroups = CharGroups(1 << 2);
    pub const LIMITED_SPECIAL: CharGroups = CharGroups(1 << 3);
    pub const ALL_SPECIAL: CharGroups = CharGroups(1 << 4);
    /// Modifier: drop look-alike characters from whatever else is selected.
    pub const NO_SIMILAR: CharGroups = CharGroups(1 << 5);

    /// Lowercase, uppercase and digits.
    pub const ALPHANUMERIC: CharGroups = CharGroups(1 | (1 << 1) | (1 << 2));

    pub fn contains(self, other: CharGroups) -> bool {
        self.0 & other.0 == other.0
    }

    fn alphabet(self) -> Vec<char> {
        let mut groups = self;
        // NO_SIMILAR alone selects nothing; fall back to the default set.
        if groups.0 & !Self::NO_SIMILAR.0 == 0 {
            groups = groups | Self::ALPHANUMERIC;
        }

        let mut chars = String::new();
        if groups.contains(Self::DIGITS) {
            chars.push_str(DIGITS);
        }
        if groups.contains(Self::LOWER) {
            chars.push_str(LOWER);
        }
        if groups.contains(Self::UPPER) {
            chars.push_str(UPPER);
        }
        if groups.contains(Self::ALL_SPECIAL) {
            chars.push_str(ALL_SPECIAL);
        } else if groups.contains(Self::LIMITED_SPECIAL) {
            chars.push_str(LIMITED_SPECIAL);
        }

        let no_similar = groups.contains(Self::NO_SIMILAR);
        chars
            .chars()
            .filter(|c| !no_similar || !SIMILAR.contains(*c))
            .collect()
    }
}

impl Default for CharGroups {
    fn default() -> Self {
        Self::ALPHANUMERIC
    }
}

impl BitOr for CharGroups {
    type Output = CharGroups;

    fn bitor(self, rhs: Self) -> Self::Output {
        CharGroups(self.0 | rhs.0)
    }
}

/// Generate a random code of `len` characters (clamped to `1..=1024`)
/// drawn from `groups`.
pub fn random_code(len: usize, groups: CharGroups) -> String {
    let len = len.clamp(1, MAX_CODE_LEN);
    let alphabet = groups.alphabet();
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_alphanumeric() {
        let code = random_code(200, CharGroups::default());
        assert_eq!(code.len(), 200);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_length_clamped() {
        assert_eq!(random_code(0, CharGroups::DIGITS).len(), 1);
        assert_eq!(random_code(5000, CharGroups::DIGITS).len(), MAX_CODE_LEN);
    }

    #[test]
    fn test_digits_only() {
        let code = random_code(64, CharGroups::DIGITS);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_no_similar() {
        let code = random_code(500, CharGroups::ALPHANUMERIC | CharGroups::NO_SIMILAR);
        assert!(!code.chars().any(|c| SIMILAR.contains(c)));
    }

    #[test]
    fn test_no_similar_alone_uses_default_set() {
        let code = random_code(100, CharGroups::NO_SIMILAR);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_limited_special() {
        let code = random_code(300, CharGroups::LIMITED_SPECIAL);
        assert!(code.chars().all(|c| LIMITED_SPECIAL.contains(c)));
    }

    #[test]
    fn test_codes_differ() {
        let a = random_code(11, CharGroups::default());
        let b = random_code(11, CharGroups::default());
        assert_ne!(a, b);
    }
}
