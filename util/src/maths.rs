//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Limit a value to the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T 
where
    T: Float
{
    if value > max {
        max
    }
    else if value < min {
        min
    }
    else {
        value
    }
}

/// Scale factor which limits the norm of a vector to `max_norm`.
///
/// Returns 1 if the norm is already within the limit or `max_norm` is not
/// positive.
pub fn saturation_scale<T>(norm: T, max_norm: T) -> T
where
    T: Float
{
    if max_norm > T::zero() && norm > max_norm {
        max_norm / norm
    }
    else {
        T::one()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(1.5f64, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-0.5f64, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.25f64, 0.0, 1.0), 0.25);
    }

    #[test]
    fn test_saturation() {
        assert_eq!(saturation_scale(10f64, 5.0), 0.5);
        assert_eq!(saturation_scale(2f64, 5.0), 1.0);
        assert_eq!(saturation_scale(2f64, 0.0), 1.0);
    }
}
