//! Directory keys.
//!
//! The directory is keyed by Substrate SS58 addresses. Validation is purely
//! syntactic: length, leading network character, and the Base58 alphabet. No
//! checksum is verified.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Base58 alphabet (no `0`, `O`, `I`, `l`).
pub const SS58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Shortest accepted key, in characters.
pub const MIN_KEY_LEN: usize = 47;

/// Longest accepted key, in characters.
pub const MAX_KEY_LEN: usize = 48;

/// Why a string is not a valid directory key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyViolation {
    /// Length outside `MIN_KEY_LEN..=MAX_KEY_LEN`.
    #[error("invalid SS58 address length {0}: expected {MIN_KEY_LEN} or {MAX_KEY_LEN} characters")]
    Length(usize),
    /// First character is not `1`..=`6`.
    #[error("invalid SS58 address prefix {0:?}: expected a leading digit 1-6")]
    Prefix(char),
    /// A character outside the Base58 alphabet.
    #[error("invalid SS58 address character {ch:?} at position {position}")]
    Alphabet {
        /// The offending character.
        ch: char,
        /// Zero-based character position.
        position: usize,
    },
}

fn is_base58(ch: char) -> bool {
    matches!(ch, '1'..='9' | 'A'..='H' | 'J'..='N' | 'P'..='Z' | 'a'..='k' | 'm'..='z')
}

/// Check that `s` is syntactically an SS58 address.
///
/// Checks run in order (length, prefix, alphabet) and the first failure is
/// reported.
pub fn validate_directory_key(s: &str) -> Result<(), KeyViolation> {
    let len = s.chars().count();
    if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&len) {
        return Err(KeyViolation::Length(len));
    }

    let mut chars = s.chars();
    match chars.next() {
        Some('1'..='6') => {}
        Some(other) => return Err(KeyViolation::Prefix(other)),
        None => return Err(KeyViolation::Length(0)),
    }

    for (offset, ch) in chars.enumerate() {
        if !is_base58(ch) {
            return Err(KeyViolation::Alphabet {
                ch,
                position: offset + 1,
            });
        }
    }

    Ok(())
}

/// A syntactically valid SS58 address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryKey(String);

impl DirectoryKey {
    /// Validate and wrap.
    pub fn parse(s: impl Into<String>) -> Result<Self, KeyViolation> {
        let s = s.into();
        validate_directory_key(&s)?;
        Ok(Self(s))
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the key text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DirectoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DirectoryKey {
    type Err = KeyViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for DirectoryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for DirectoryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DirectoryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    // Alice's well-known dev account.
    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    #[test]
    fn test_accepts_real_address() {
        assert_eq!(ALICE.len(), 48);
        assert_eq!(validate_directory_key(ALICE), Ok(()));
        assert_eq!(DirectoryKey::parse(ALICE).unwrap().as_str(), ALICE);
    }

    #[test]
    fn test_accepts_47_chars() {
        let short = &ALICE[..47];
        assert_eq!(validate_directory_key(short), Ok(()));
    }

    #[test]
    fn test_rejects_length() {
        assert_eq!(validate_directory_key(""), Err(KeyViolation::Length(0)));
        assert_eq!(
            validate_directory_key(&ALICE[..46]),
            Err(KeyViolation::Length(46))
        );
        assert_eq!(
            validate_directory_key(&format!("{ALICE}1")),
            Err(KeyViolation::Length(49))
        );
    }

    #[test]
    fn test_rejects_prefix() {
        let bad = format!("7{}", &ALICE[1..]);
        assert_eq!(validate_directory_key(&bad), Err(KeyViolation::Prefix('7')));
        let bad = format!("G{}", &ALICE[1..]);
        assert_eq!(validate_directory_key(&bad), Err(KeyViolation::Prefix('G')));
    }

    #[test]
    fn test_rejects_excluded_characters() {
        for excluded in ['0', 'O', 'I', 'l', '-', ' '] {
            let bad = format!("{}{excluded}{}", &ALICE[..10], &ALICE[11..]);
            assert_matches!(
                validate_directory_key(&bad),
                Err(KeyViolation::Alphabet { ch, position: 10 }) if ch == excluded
            );
        }
    }

    #[test]
    fn test_rejects_multibyte_by_char_count() {
        // 48 chars, one of which is multi-byte.
        let bad = format!("{}é", &ALICE[..47]);
        assert_eq!(bad.chars().count(), 48);
        assert_matches!(
            validate_directory_key(&bad),
            Err(KeyViolation::Alphabet { ch: 'é', position: 47 })
        );
    }

    #[test]
    fn test_serde_validates() {
        let json = format!("\"{ALICE}\"");
        let key: DirectoryKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key.as_str(), ALICE);
        assert!(serde_json::from_str::<DirectoryKey>("\"nope\"").is_err());
    }

    #[test]
    fn test_alphabet_constant_matches_predicate() {
        assert_eq!(SS58_ALPHABET.len(), 58);
        assert!(SS58_ALPHABET.chars().all(is_base58));
        for ch in ['0', 'O', 'I', 'l'] {
            assert!(!is_base58(ch));
        }
    }

    fn arb_valid_key() -> impl Strategy<Value = String> {
        let alphabet: Vec<char> = SS58_ALPHABET.chars().collect();
        (
            prop::sample::select(vec!['1', '2', '3', '4', '5', '6']),
            prop::collection::vec(prop::sample::select(alphabet), 46..=47),
        )
            .prop_map(|(first, rest)| core::iter::once(first).chain(rest).collect())
    }

    proptest! {
        #[test]
        fn test_valid_keys_accepted(key in arb_valid_key()) {
            prop_assert_eq!(validate_directory_key(&key), Ok(()));
        }

        #[test]
        fn test_wrong_length_always_length_violation(s in "[1-6][a-km-zA-HJ-NP-Z1-9]{0,80}") {
            let len = s.chars().count();
            prop_assume!(!(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&len));
            prop_assert_eq!(validate_directory_key(&s), Err(KeyViolation::Length(len)));
        }

        #[test]
        fn test_bad_prefix_reported(key in arb_valid_key(), first in "[7-9A-Za-z]") {
            let bad: String = first.chars().chain(key.chars().skip(1)).collect();
            let ch = first.chars().next().unwrap();
            prop_assert_eq!(validate_directory_key(&bad), Err(KeyViolation::Prefix(ch)));
        }
    }
}
