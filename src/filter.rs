//! Signal filtering.

/// Trait for stateful filters that smooth a stream of values.
pub trait Filter<V> {
    /// Pushes a new raw value into the filter and returns the filtered value.
    fn push(&mut self, value: V) -> V;

    /// Resets the filter to its initial state, forgetting all previously pushed values.
    fn reset(&mut self);
}

/// Exponential Moving Average, a weighted moving average whose weight decreases exponentially.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f32,
    last: Option<f32>,
}

impl Ema {
    /// Creates a new Exponential Moving Average filter.
    ///
    /// The `alpha` parameter must be between 0.0 and 1.0 and defines how quickly the weight of
    /// older values should decay. Values close to 1.0 very strongly favor recent values over older
    /// values, while values closer to 0.0 favor more recent values less strongly.
    ///
    /// # Panics
    ///
    /// This method will panic if `alpha` is not in between 0.0 and 1.0.
    pub fn new(alpha: f32) -> Self {
        assert!((0.0..=1.0).contains(&alpha), "invalid EMA alpha {alpha}");
        Self { alpha, last: None }
    }
}

impl Filter<f32> for Ema {
    fn push(&mut self, value: f32) -> f32 {
        let avg = match self.last {
            Some(last) => self.alpha * value + (1.0 - self.alpha) * last,
            None => value,
        };
        self.last = Some(avg);
        avg
    }

    fn reset(&mut self) {
        self.last = None;
    }
}
