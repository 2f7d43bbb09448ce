//! Moving-average indicators over closing prices.
//!
//! - `IndicatorPoint`: one dated value with a warm-up validity flag
//! - `IndicatorSeries`: a series aligned 1:1 with its input bars

pub mod sma;

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub period: usize,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index` if the warm-up is complete there.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_at_hides_warmup_points() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = IndicatorSeries {
            period: 2,
            values: vec![
                IndicatorPoint {
                    date,
                    valid: false,
                    value: 0.0,
                },
                IndicatorPoint {
                    date,
                    valid: true,
                    value: 1.5,
                },
            ],
        };
        assert_eq!(series.value_at(0), None);
        assert_eq!(series.value_at(1), Some(1.5));
        assert_eq!(series.value_at(2), None);
    }
}
