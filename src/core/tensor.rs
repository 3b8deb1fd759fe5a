use crate::core::resolution::ResolutionSchedule;
use std::iter::Sum;
use std::ops::AddAssign;

/// Flat `(order, resolution, sub-bin)` arena.
///
/// All resolutions of one order share a row of `total_sub_bins` cells, so a
/// tensor is allocated once at construction and never grows.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTensor<T> {
    orders: usize,
    width: usize,
    offsets: Vec<usize>,
    sub_bins: Vec<usize>,
    data: Vec<T>,
}

impl<T> OrderTensor<T>
where
    T: Copy + Default + AddAssign + Sum<T>,
{
    pub fn zeros(orders: usize, schedule: &ResolutionSchedule) -> Self {
        let width = schedule.total_sub_bins();
        Self {
            orders,
            width,
            offsets: (0..schedule.len()).map(|i| schedule.offset(i)).collect(),
            sub_bins: schedule.iter().map(|r| r.sub_bins()).collect(),
            data: vec![T::default(); orders * width],
        }
    }

    #[inline]
    pub fn orders(&self) -> usize {
        self.orders
    }

    #[inline]
    fn index(&self, order: usize, resolution: usize, sub_bin: usize) -> usize {
        debug_assert!(order < self.orders);
        debug_assert!(sub_bin < self.sub_bins[resolution]);
        order * self.width + self.offsets[resolution] + sub_bin
    }

    #[inline]
    pub fn get(&self, order: usize, resolution: usize, sub_bin: usize) -> T {
        self.data[self.index(order, resolution, sub_bin)]
    }

    #[inline]
    pub fn add(&mut self, order: usize, resolution: usize, sub_bin: usize, v: T) {
        let i = self.index(order, resolution, sub_bin);
        self.data[i] += v;
    }

    pub fn row(&self, order: usize, resolution: usize) -> &[T] {
        let start = self.index(order, resolution, 0);
        &self.data[start..start + self.sub_bins[resolution]]
    }

    pub fn row_mut(&mut self, order: usize, resolution: usize) -> &mut [T] {
        let start = self.index(order, resolution, 0);
        let len = self.sub_bins[resolution];
        &mut self.data[start..start + len]
    }

    /// Sum over all sub-bins of one `(order, resolution)` row.
    pub fn row_sum(&self, order: usize, resolution: usize) -> T {
        self.row(order, resolution).iter().copied().sum()
    }

    pub fn same_shape(&self, other: &Self) -> bool {
        self.orders == other.orders && self.offsets == other.offsets && self.sub_bins == other.sub_bins
    }

    /// Elementwise `self += other`. Returns `false` (and leaves `self`
    /// untouched) when the shapes differ.
    pub fn merge(&mut self, other: &Self) -> bool {
        if !self.same_shape(other) {
            return false;
        }
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        true
    }
}
