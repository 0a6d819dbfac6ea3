//! Bounded quartering search for a one-dimensional minimum.
//!
//! Each iteration evaluates the bracket midpoint and the two quarter points:
//!
//! - left quarter better than the midpoint: keep the left half;
//! - otherwise right quarter better: keep the right half;
//! - otherwise: keep the inner half between the quarter points.
//!
//! The search stops after `max_iterations` or once the bracket is narrower
//! than `tolerance`, and returns the bracket center. It is meant for cheap,
//! roughly unimodal objectives over a large integer-like range.

/// Parameters of [`grid_search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSearchConfig {
    /// Bracket width below which the search stops. Default 500.
    pub tolerance: f64,
    /// Maximum number of bracket updates. Default 5.
    pub max_iterations: u32,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            tolerance: 500.0,
            max_iterations: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSearchResult {
    /// Center of the final bracket.
    pub parameter: f64,
    pub lower: f64,
    pub upper: f64,
    pub iterations: u32,
}

/// Search `[lower, upper]` for the parameter minimizing `f`.
pub fn grid_search<F>(
    mut f: F,
    lower: f64,
    upper: f64,
    config: &GridSearchConfig,
) -> GridSearchResult
where
    F: FnMut(f64) -> f64,
{
    let (mut lower, mut upper) = (lower, upper);
    let mut iterations = 0;

    while iterations < config.max_iterations && (upper - lower) > config.tolerance {
        let mid = 0.5 * (lower + upper);
        let quarter = 0.25 * (upper - lower);
        let left = mid - quarter;
        let right = mid + quarter;

        let f_mid = f(mid);
        if f(left) < f_mid {
            upper = mid;
        } else if f(right) < f_mid {
            lower = mid;
        } else {
            lower = left;
            upper = right;
        }
        iterations += 1;
    }

    GridSearchResult {
        parameter: 0.5 * (lower + upper),
        lower,
        upper,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_quadratic_minimum() {
        let target = 12345.0;
        let result = grid_search(
            |p| (p - target) * (p - target),
            100.0,
            100000.0,
            &GridSearchConfig::default(),
        );
        assert!(result.iterations <= 5);
        assert!(
            (result.parameter - target).abs() <= 500.0,
            "got {}",
            result.parameter
        );
    }

    #[test]
    fn stops_on_tolerance() {
        let config = GridSearchConfig {
            tolerance: 500.0,
            max_iterations: 100,
        };
        let result = grid_search(|p| (p - 3000.0).abs(), 0.0, 10000.0, &config);
        assert!(result.upper - result.lower <= 500.0);
        assert!(result.iterations < 100);
        assert!((result.parameter - 3000.0).abs() <= 500.0);
    }

    #[test]
    fn inner_half_fallback() {
        // Minimum exactly at the midpoint: both quarter points are worse.
        let mut calls = Vec::new();
        let config = GridSearchConfig {
            tolerance: 0.0,
            max_iterations: 1,
        };
        let result = grid_search(
            |p| {
                calls.push(p);
                (p - 50.0).abs()
            },
            0.0,
            100.0,
            &config,
        );
        assert_eq!(result.lower, 25.0);
        assert_eq!(result.upper, 75.0);
        assert_eq!(result.parameter, 50.0);
        assert_eq!(calls, vec![50.0, 25.0, 75.0]);
    }

    #[test]
    fn narrow_bracket_is_returned_untouched() {
        let result = grid_search(|p| p, 10.0, 20.0, &GridSearchConfig::default());
        assert_eq!(result.iterations, 0);
        assert_eq!(result.parameter, 15.0);
    }
}
