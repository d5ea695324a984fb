use serde::{Deserialize, Serialize};

/// Piecewise-linear schedule over global training steps
///
/// y(t) = initial                                  t <= start
///      = initial + (t - start)/(end - start) * (last - initial)
///      = last                                     t >= end
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearDecay {
    pub start: usize,
    pub end: usize,
    pub initial: f64,
    pub last: f64,
}

impl LinearDecay {
    pub fn new(start: usize, end: usize, initial: f64, last: f64) -> Self {
        Self {
            start,
            end,
            initial,
            last,
        }
    }

    /// The same value at every step
    pub fn constant(value: f64) -> Self {
        Self::new(0, 0, value, value)
    }

    /// Schedule from optional command-line style bounds; a missing or
    /// empty window means "already at the final value"
    pub fn from_window(start: Option<usize>, end: Option<usize>, initial: f64, last: f64) -> Self {
        match (start, end) {
            (Some(s), Some(e)) if e > s => Self::new(s, e, initial, last),
            _ => Self::constant(last),
        }
    }

    pub fn get_y(&self, step: usize) -> f64 {
        if step <= self.start {
            return if self.end <= self.start {
                self.last
            } else {
                self.initial
            };
        }
        if step >= self.end {
            return self.last;
        }
        let frac = (step - self.start) as f64 / (self.end - self.start) as f64;
        self.initial + frac * (self.last - self.initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_outside_the_window_linear_inside() {
        let sched = LinearDecay::new(10, 20, 2.0, 0.5);
        assert_eq!(sched.get_y(0), 2.0);
        assert_eq!(sched.get_y(10), 2.0);
        approx::assert_abs_diff_eq!(sched.get_y(15), 1.25, epsilon = 1e-12);
        assert_eq!(sched.get_y(20), 0.5);
        assert_eq!(sched.get_y(1000), 0.5);
    }

    #[test]
    fn missing_window_is_constant() {
        let sched = LinearDecay::from_window(None, Some(10), 3.0, 1.6);
        assert_eq!(sched.get_y(0), 1.6);
        assert_eq!(sched.get_y(5), 1.6);

        let sched = LinearDecay::from_window(Some(5), Some(5), 3.0, 1.6);
        assert_eq!(sched.get_y(5), 1.6);
        assert_eq!(LinearDecay::constant(0.7).get_y(123), 0.7);
    }
}
