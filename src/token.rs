//! Correlation tokens tying an authorization window to its status checks

use rand::Rng;
use std::fmt;

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_RANDOM_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Generate a fresh token: `prefix` followed by 9 random base-36 chars
    pub fn generate(prefix: &str) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..TOKEN_RANDOM_LEN)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect();
        CorrelationToken(format!("{prefix}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationToken {
    fn from(value: &str) -> Self {
        CorrelationToken(value.to_string())
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_has_prefix_and_suffix() {
        let token = CorrelationToken::generate("datocms_");
        let suffix = token.as_str().strip_prefix("datocms_").unwrap();
        assert_eq!(suffix.len(), TOKEN_RANDOM_LEN);
        assert!(suffix.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn generated_tokens_differ() {
        let a = CorrelationToken::generate("p_");
        let b = CorrelationToken::generate("p_");
        assert_ne!(a, b);
    }
}
