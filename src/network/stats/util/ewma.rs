/// Exponentially weighted moving average over a stream of samples.
///
/// Each new sample is blended into the running value with weight `alpha`, so
/// older samples fade out geometrically. Used to smooth throughput readings.
///
/// # Example
///
/// ```rust
/// use netgate::network::stats::util::ewma::Ewma;
///
/// let mut ewma = Ewma::new(0.5);
/// ewma.update(10.0);
/// assert_eq!(ewma.update(20.0), 15.0);
/// ```
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    current_value: Option<f64>,
}

impl Ewma {
    /// Creates an average with smoothing factor `alpha`.
    ///
    /// # Arguments
    ///
    /// * `alpha` - Weight of the newest sample, in `(0, 1]`
    ///
    /// # Panics
    ///
    /// Panics if `alpha` is outside `(0, 1]`.
    pub fn new(alpha: f64) -> Self {
        assert!(
            alpha > 0.0 && alpha <= 1.0,
            "Alpha should be between 0 and 1"
        );
        Self {
            alpha,
            current_value: None,
        }
    }

    /// Blends `sample` into the average and returns the new value.
    ///
    /// The first sample becomes the average as-is.
    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.current_value {
            Some(current) => current.mul_add(1.0 - self.alpha, sample * self.alpha),
            None => sample,
        };
        self.current_value = Some(next);
        next
    }

    /// Current average, or `None` before the first sample.
    pub fn get(&self) -> Option<f64> {
        self.current_value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Forgets every sample, keeping `alpha`.
    pub fn reset(&mut self) {
        self.current_value = None;
    }
}
