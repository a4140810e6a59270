//! Mapping from the free optimisation vector to full coefficient vectors.
//!
//! A clamped root pins some coefficients (typically D0 = D1 = 0) while the
//! rest are searched. `CoefficientLayout` expresses that declaratively; any
//! closure with the right signature works as well.

/// Free vector A → full coefficient vector D.
pub trait CoefficientMap {
    fn expand(&self, free: &[f64]) -> Vec<f64>;
}

impl<F: Fn(&[f64]) -> Vec<f64>> CoefficientMap for F {
    fn expand(&self, free: &[f64]) -> Vec<f64> {
        self(free)
    }
}

/// Joint free vector → (upper D, lower D) for a coupled system.
pub trait JointCoefficientMap {
    fn split(&self, free: &[f64]) -> (Vec<f64>, Vec<f64>);
}

impl<F: Fn(&[f64]) -> (Vec<f64>, Vec<f64>)> JointCoefficientMap for F {
    fn split(&self, free: &[f64]) -> (Vec<f64>, Vec<f64>) {
        self(free)
    }
}

/// Fixed-length coefficient vector with some entries pinned.
///
/// Free entries are filled from A in increasing index order.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientLayout {
    len: usize,
    pinned: Vec<(usize, f64)>,
}

impl CoefficientLayout {
    pub fn new(len: usize) -> Self {
        Self { len, pinned: Vec::new() }
    }

    /// Clamped cantilever root: D0 = D1 = 0, remaining `len - 2` free.
    pub fn clamped_root(len: usize) -> Self {
        Self::new(len).pin(0, 0.0).pin(1, 0.0)
    }

    /// Pin entry `index` to `value`. Pinning twice keeps the last value;
    /// indices past the end are ignored.
    pub fn pin(mut self, index: usize, value: f64) -> Self {
        if index < self.len {
            self.pinned.retain(|(i, _)| *i != index);
            self.pinned.push((index, value));
            self.pinned.sort_by_key(|(i, _)| *i);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free_len(&self) -> usize {
        self.len - self.pinned.len()
    }

    fn pinned_value(&self, index: usize) -> Option<f64> {
        self.pinned.iter().find(|(i, _)| *i == index).map(|(_, v)| *v)
    }

    /// Free entries of a full coefficient vector (inverse of `expand`).
    pub fn compress(&self, full: &[f64]) -> Vec<f64> {
        (0..self.len.min(full.len()))
            .filter(|&i| self.pinned_value(i).is_none())
            .map(|i| full[i])
            .collect()
    }
}

impl CoefficientMap for CoefficientLayout {
    /// Missing free entries read as zero; surplus ones are ignored.
    fn expand(&self, free: &[f64]) -> Vec<f64> {
        let mut values = free.iter().copied();
        (0..self.len)
            .map(|i| match self.pinned_value(i) {
                Some(v) => v,
                None => values.next().unwrap_or(0.0),
            })
            .collect()
    }
}

/// Upper layout followed by lower layout in one joint free vector.
#[derive(Debug, Clone, PartialEq)]
pub struct JointLayout {
    pub upper: CoefficientLayout,
    pub lower: CoefficientLayout,
}

impl JointLayout {
    pub fn new(upper: CoefficientLayout, lower: CoefficientLayout) -> Self {
        Self { upper, lower }
    }

    pub fn free_len(&self) -> usize {
        self.upper.free_len() + self.lower.free_len()
    }
}

impl JointCoefficientMap for JointLayout {
    fn split(&self, free: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let cut = self.upper.free_len().min(free.len());
        (self.upper.expand(&free[..cut]), self.lower.expand(&free[cut..]))
    }
}
