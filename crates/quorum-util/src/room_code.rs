use rand::Rng;

/// Uppercase alphanumerics only; codes are read out loud and typed on phones.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const CODE_LENGTH: usize = 6;

/// Generate a random shareable room code. Uniqueness is the caller's
/// responsibility (retry against the rooms table on collision).
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Whether a client-supplied string even looks like a room code.
pub fn is_valid_format(code: &str) -> bool {
    code.len() == CODE_LENGTH
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_match_the_expected_format() {
        for _ in 0..64 {
            let code = generate();
            assert!(is_valid_format(&code), "bad code: {code}");
        }
    }

    #[test]
    fn format_check_rejects_lowercase_and_wrong_lengths() {
        assert!(is_valid_format("ABC123"));
        assert!(!is_valid_format("abc123"));
        assert!(!is_valid_format("ABC12"));
        assert!(!is_valid_format("ABC1234"));
        assert!(!is_valid_format("ABC-12"));
    }
}
