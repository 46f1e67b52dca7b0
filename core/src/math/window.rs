use std::f64::consts::PI;

/// Periodic Hann window of `len` points.
pub fn hann(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|n| (0.5 - 0.5 * (2.0 * PI * n as f64 / len as f64).cos()) as f32)
        .collect()
}

/// Symmetric Hamming window of `len` points.
pub fn hamming(len: usize) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / (len - 1) as f64).cos())
        .collect()
}
