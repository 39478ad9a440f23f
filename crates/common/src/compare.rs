//! Timing-safe comparison for secrets arriving over the wire

/// Compare two byte strings without short-circuiting on the first mismatch.
///
/// Length is not hidden; only the content comparison runs in constant time.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_match() {
        assert!(constant_time_eq(b"aB3xYz", b"aB3xYz"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn differing_inputs_do_not_match() {
        assert!(!constant_time_eq(b"aB3xYz", b"aB3xYZ"));
        assert!(!constant_time_eq(b"aB3xYz", b"aB3xY"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
