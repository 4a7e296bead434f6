// Utility functions for ranking-engine

/// Logistic squash: 1 / (1 + exp(-x)).
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// ln(1 + x) with negative inputs clamped to zero.
pub fn log1p_clamped(x: f64) -> f64 {
    x.max(0.0).ln_1p()
}

/// Time decay with an explicit e-folding scale: exp(-age / scale).
pub fn exponential_decay(age: f64, scale: f64) -> f64 {
    (-age / scale).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-9);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_log1p_clamped() {
        assert!((log1p_clamped(0.0)).abs() < 1e-9);
        assert!((log1p_clamped(std::f64::consts::E - 1.0) - 1.0).abs() < 1e-9);
        assert!((log1p_clamped(-5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_exponential_decay() {
        assert!((exponential_decay(0.0, 72.0) - 1.0).abs() < 1e-9);
        assert!((exponential_decay(72.0, 72.0) - (-1.0f64).exp()).abs() < 1e-9);
        assert!(exponential_decay(720.0, 72.0) < 0.001);
    }
}
