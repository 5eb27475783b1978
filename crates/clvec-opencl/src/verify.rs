//! Bit-exact comparison of device output against the CPU reference.

use serde::Serialize;

/// Outcome of checking one session's output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    /// Every element matched the reference bit for bit.
    Passed,
    /// The first element that differs, with both operands and both results.
    Mismatch { index: usize, a: f32, b: f32, expected: f32, actual: f32 },
    /// The session failed before producing output.
    NotPerformed,
}

impl Verification {
    pub fn passed(&self) -> bool {
        matches!(self, Verification::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verification::Passed => "passed",
            Verification::Mismatch { .. } => "failed",
            Verification::NotPerformed => "not performed",
        }
    }
}

/// Compare `actual` against `expected`, stopping at the first difference.
///
/// Floats are compared by bit pattern: host and device perform the same
/// single-precision add, so no tolerance is applied.
pub fn verify(a: &[f32], b: &[f32], expected: &[f32], actual: &[f32]) -> Verification {
    let n = expected.len();
    for i in 0..n {
        let got = actual.get(i).copied().unwrap_or(f32::NAN);
        if got.to_bits() != expected[i].to_bits() {
            return Verification::Mismatch {
                index: i,
                a: a.get(i).copied().unwrap_or(f32::NAN),
                b: b.get(i).copied().unwrap_or(f32::NAN),
                expected: expected[i],
                actual: got,
            };
        }
    }
    Verification::Passed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_output_passes() {
        let v = verify(&[1.0, 2.0], &[3.0, 4.0], &[4.0, 6.0], &[4.0, 6.0]);
        assert_eq!(v, Verification::Passed);
        assert!(v.passed());
    }

    #[test]
    fn reports_first_mismatch_only() {
        let v = verify(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], &[2.0, 3.0, 4.0], &[2.0, -1.0, 0.0]);
        assert_eq!(
            v,
            Verification::Mismatch { index: 1, a: 2.0, b: 1.0, expected: 3.0, actual: -1.0 }
        );
        assert_eq!(v.label(), "failed");
    }

    #[test]
    fn signed_zero_is_a_mismatch() {
        let v = verify(&[0.0], &[0.0], &[0.0], &[-0.0]);
        assert!(matches!(v, Verification::Mismatch { index: 0, .. }));
    }

    #[test]
    fn short_output_is_a_mismatch() {
        let v = verify(&[1.0, 1.0], &[1.0, 1.0], &[2.0, 2.0], &[2.0]);
        assert!(matches!(v, Verification::Mismatch { index: 1, .. }));
    }

    #[test]
    fn not_performed_is_distinct_from_failed() {
        assert_eq!(Verification::NotPerformed.label(), "not performed");
        assert!(!Verification::NotPerformed.passed());
    }
}
