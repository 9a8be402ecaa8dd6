use base64::Engine;
use rand::RngCore;

/// Number of random bytes behind a generated state value.
const STATE_BYTES: usize = 32;

/// Generates an unpredictable `state` value for a single flow.
///
/// Bytes come from the thread-local CSPRNG and are encoded as URL-safe base64
/// without padding, so the value can travel in a query string untouched.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_generation() {
        let state = generate_state();

        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(state.len(), 43);
        assert!(state
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_states_are_not_repeated() {
        let first = generate_state();
        let second = generate_state();
        assert_ne!(first, second);
    }
}
