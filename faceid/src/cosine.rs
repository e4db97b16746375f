use crate::error::FaceIdError;

/// Compute the cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]` where 1 means identical direction and -1
/// opposite direction. Uses f64 intermediate precision and clamps the result
/// to absorb rounding.
///
/// Fails with [`FaceIdError::DimensionMismatch`] when lengths differ and with
/// [`FaceIdError::DegenerateVector`] when either vector has zero magnitude
/// (including empty vectors) or a non-finite component.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, FaceIdError> {
    if a.len() != b.len() {
        return Err(FaceIdError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;

    for (&x, &y) in a.iter().zip(b) {
        let x = f64::from(x);
        let y = f64::from(y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if !(dot.is_finite() && norm_a.is_finite() && norm_b.is_finite())
        || norm_a == 0.0
        || norm_b == 0.0
    {
        return Err(FaceIdError::DegenerateVector);
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return Err(FaceIdError::DegenerateVector);
    }
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}
