use crate::real;

pub const EXP_TABLE_SIZE: usize = 1000;
pub const MAX_EXP: real = 6.0;

/// Precomputed logistic function `1 / (1 + e^-x)` on `[-max_exp, max_exp)`.
///
/// Each worker keeps its own copy next to its random number generator.
#[derive(Debug, Clone)]
pub struct SigmoidTable {
    table: Vec<real>,
    max_exp: real,
}

impl Default for SigmoidTable {
    fn default() -> Self {
        SigmoidTable::new(EXP_TABLE_SIZE, MAX_EXP)
    }
}

impl SigmoidTable {
    pub fn new(size: usize, max_exp: real) -> Self {
        assert!(size > 0 && max_exp > 0.0);
        let table = (0..size)
            .map(|i| {
                let x = (i as real / size as real * 2.0 - 1.0) * max_exp;
                let e = (x as f64).exp() as real; // Precompute the exp() table
                e / (e + 1.0) // Precompute f(x) = x / (x + 1)
            })
            .collect();
        SigmoidTable { table, max_exp }
    }

    pub fn max_exp(&self) -> real {
        self.max_exp
    }

    /// Approximate the logistic function, saturating to exactly 0 and 1
    /// outside the table's range.
    pub fn get(&self, x: real) -> real {
        if x >= self.max_exp {
            1.0
        } else if x <= -self.max_exp {
            0.0
        } else {
            self.lookup(x)
        }
    }

    /// Like `get`, but `None` where the function is saturated.
    pub fn get_unclipped(&self, x: real) -> Option<real> {
        if x <= -self.max_exp || x >= self.max_exp || x.is_nan() {
            None
        } else {
            Some(self.lookup(x))
        }
    }

    fn lookup(&self, x: real) -> real {
        let scale = self.table.len() as real / self.max_exp / 2.0;
        let i = ((x + self.max_exp) * scale) as usize;
        self.table[i.min(self.table.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_outside_range() {
        let s = SigmoidTable::default();
        assert_eq!(s.get(MAX_EXP), 1.0);
        assert_eq!(s.get(100.0), 1.0);
        assert_eq!(s.get(-MAX_EXP), 0.0);
        assert_eq!(s.get(-100.0), 0.0);
        assert_eq!(s.get_unclipped(MAX_EXP), None);
        assert_eq!(s.get_unclipped(-7.0), None);
    }

    #[test]
    fn non_decreasing() {
        let s = SigmoidTable::default();
        let mut prev = 0.0;
        let mut x = -8.0;
        while x < 8.0 {
            let y = s.get(x);
            assert!(y >= prev, "sigmoid({x}) = {y} < {prev}");
            prev = y;
            x += 0.001;
        }
    }

    #[test]
    fn close_to_exact() {
        let s = SigmoidTable::default();
        for &x in &[-5.0f32, -1.0, 0.0, 0.5, 2.0, 5.9] {
            let exact = 1.0 / (1.0 + (-x).exp());
            assert!((s.get(x) - exact).abs() < 0.01, "x = {x}");
        }
    }
}
