//! FILENAME: core/data-model/src/aggregate.rs
//! Running aggregate for one cell of the cube.
//!
//! The engine creates one `AggregateValue` per group/aggregate pair through
//! the value provider, feeds it member values and merges partial results
//! when it builds in parallel. Variance uses Welford's algorithm.

use crate::descriptors::AggregateFunction;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateValue {
    function: AggregateFunction,
    count: u64,
    count_numbers: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    product: Option<f64>,
    mean: f64,
    m2: f64,
}

impl AggregateValue {
    pub fn new(function: AggregateFunction) -> Self {
        AggregateValue {
            function,
            count: 0,
            count_numbers: 0,
            sum: 0.0,
            min: None,
            max: None,
            product: None,
            mean: 0.0,
            m2: 0.0,
        }
    }

    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    /// Adds one member value. Empty values are skipped entirely; other
    /// non-numeric values only count toward `Count`.
    pub fn accumulate(&mut self, value: &Value) {
        match value {
            Value::Empty => {}
            Value::Number(n) => self.add_number(n.as_f64()),
            _ => self.count += 1,
        }
    }

    fn add_number(&mut self, value: f64) {
        self.count += 1;
        self.count_numbers += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.product = Some(self.product.map_or(value, |p| p * value));

        let delta = value - self.mean;
        self.mean += delta / (self.count_numbers as f64);
        self.m2 += delta * (value - self.mean);
    }

    /// Folds a partial result computed for the same function.
    pub fn merge(&mut self, other: &AggregateValue) {
        if other.count == 0 {
            return;
        }

        let combined = self.count_numbers + other.count_numbers;
        if self.count_numbers > 0 && other.count_numbers > 0 {
            let delta = other.mean - self.mean;
            self.mean += delta * (other.count_numbers as f64) / (combined as f64);
            self.m2 += other.m2
                + delta * delta * (self.count_numbers as f64) * (other.count_numbers as f64)
                    / (combined as f64);
        } else if other.count_numbers > 0 {
            self.mean = other.mean;
            self.m2 = other.m2;
        }

        self.count += other.count;
        self.count_numbers = combined;
        self.sum += other.sum;
        if let Some(m) = other.min {
            self.min = Some(self.min.map_or(m, |s| s.min(m)));
        }
        if let Some(m) = other.max {
            self.max = Some(self.max.map_or(m, |s| s.max(m)));
        }
        if let Some(p) = other.product {
            self.product = Some(self.product.map_or(p, |s| s * p));
        }
    }

    /// Final value. Functions with no numeric input yield `Value::Empty`,
    /// except the counts which yield zero.
    pub fn result(&self) -> Value {
        let n = self.count_numbers as f64;
        let number = match self.function {
            AggregateFunction::Count => Some(self.count as f64),
            AggregateFunction::CountNumbers => Some(n),
            AggregateFunction::Sum => (self.count_numbers > 0).then_some(self.sum),
            AggregateFunction::Average => (self.count_numbers > 0).then(|| self.sum / n),
            AggregateFunction::Min => self.min,
            AggregateFunction::Max => self.max,
            AggregateFunction::Product => self.product,
            AggregateFunction::Var => (self.count_numbers > 1).then(|| self.m2 / (n - 1.0)),
            AggregateFunction::VarP => (self.count_numbers > 0).then(|| self.m2 / n),
            AggregateFunction::StdDev => {
                (self.count_numbers > 1).then(|| (self.m2 / (n - 1.0)).sqrt())
            }
            AggregateFunction::StdDevP => (self.count_numbers > 0).then(|| (self.m2 / n).sqrt()),
        };
        number.map(Value::number).unwrap_or(Value::Empty)
    }
}
