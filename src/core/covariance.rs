use crate::core::resolution::ResolutionSchedule;
use crate::core::tensor::OrderTensor;

/// Running cross-order sums of per-sub-bin indicator products.
///
/// Only pairs with `a <= b` are stored; lookups normalize the pair order.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSums {
    orders: usize,
    sums: OrderTensor<u64>,
}

impl CrossSums {
    pub fn zeros(orders: usize, schedule: &ResolutionSchedule) -> Self {
        Self {
            orders,
            sums: OrderTensor::zeros(orders * orders, schedule),
        }
    }

    #[inline]
    fn pair(&self, a: usize, b: usize) -> usize {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        lo * self.orders + hi
    }

    /// Adds one event's indicator products for `resolution`.
    ///
    /// `indicators` holds one row per order, rows `stride` cells apart, each
    /// row covering the resolution's sub-bins.
    pub fn accumulate(&mut self, resolution: usize, indicators: &[u8], stride: usize) {
        for a in 0..self.orders {
            let wa = &indicators[a * stride..];
            for b in a..self.orders {
                let wb = &indicators[b * stride..];
                let pair = self.pair(a, b);
                let row = self.sums.row_mut(pair, resolution);
                for (j, cell) in row.iter_mut().enumerate() {
                    *cell += u64::from(wa[j] * wb[j]);
                }
            }
        }
    }

    pub fn sum(&self, a: usize, b: usize, resolution: usize) -> u64 {
        self.sums.row_sum(self.pair(a, b), resolution)
    }

    /// Covariance between the mean rates of orders `a` and `b`.
    ///
    /// Every (event, sub-bin) cell is one observation, so with
    /// `T = events * sub_bins` this is `(S_ab - T * rate_a * rate_b) / T^2`.
    pub fn covariance_of_means(
        &self,
        a: usize,
        b: usize,
        resolution: usize,
        sub_bins: usize,
        events: u64,
        rate_a: f64,
        rate_b: f64,
    ) -> f64 {
        if events == 0 {
            return 0.0;
        }
        let t = events as f64 * sub_bins as f64;
        (self.sum(a, b, resolution) as f64 - t * rate_a * rate_b) / (t * t)
    }

    pub fn merge(&mut self, other: &Self) -> bool {
        self.orders == other.orders && self.sums.merge(&other.sums)
    }
}
