//! Cleartext evaluation on a single node, used to check the secure protocol.

use crate::lut::LookupTable;
use crate::{Parameters, Ring, Transform};

/// Table lookup the secure protocol computes shares of.
///
/// Haar: `intercepts[seg(x)]`. Biorthogonal: `slopes[seg(x)] * digit(x) +
/// intercepts[seg(x)]`.
pub fn evaluate<R: Ring>(
    transform: Transform,
    params: &Parameters,
    slopes: &LookupTable<R>,
    intercepts: &LookupTable<R>,
    x: R,
) -> R {
    let segment = params.segment_of(x.value());
    let intercept = intercepts.get(segment).unwrap_or_default();
    match transform {
        Transform::Haar => intercept,
        Transform::Biorthogonal => {
            let slope = slopes.get(segment).unwrap_or_default();
            slope * R::from_u64(params.digit_of(x.value())) + intercept
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Z64;

    #[test]
    fn test_piecewise_linear() {
        let params = Parameters::new::<Z64>(8, 2).unwrap();
        let intercepts = LookupTable::new(vec![10, 20, 30, 40].into_iter().map(Z64::new).collect());
        let slopes = LookupTable::new(vec![1, 2, 3, 4].into_iter().map(Z64::new).collect());

        // Segment 2, digit 5.
        let x = Z64::new((0b10u64 << 62) | (5 << 56) | 0xffff);
        assert_eq!(evaluate(Transform::Haar, &params, &slopes, &intercepts, x), Z64::new(30));
        assert_eq!(
            evaluate(Transform::Biorthogonal, &params, &slopes, &intercepts, x),
            Z64::new(3 * 5 + 30)
        );
    }
}
