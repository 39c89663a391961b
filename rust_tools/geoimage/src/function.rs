//! Per-pixel transforms applied when deriving one band from another.

use crate::error::{GeoImageError, Result};
use ndarray::{Array2, Zip};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Pow,
    /// Clip to at most the operand.
    Min,
    /// Clip to at least the operand.
    Max,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    Abs,
    Sqrt,
    Log,
    Log10,
    Exp,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
            Operation::Pow => "pow",
            Operation::Min => "min",
            Operation::Max => "max",
            Operation::Greater => "gt",
            Operation::GreaterEqual => "ge",
            Operation::Less => "lt",
            Operation::LessEqual => "le",
            Operation::Equal => "eq",
            Operation::NotEqual => "ne",
            Operation::Abs => "abs",
            Operation::Sqrt => "sqrt",
            Operation::Log => "log",
            Operation::Log10 => "log10",
            Operation::Exp => "exp",
        }
    }

    /// Whether the operation reads its operand.
    pub fn takes_operand(self) -> bool {
        !matches!(
            self,
            Operation::Abs | Operation::Sqrt | Operation::Log | Operation::Log10 | Operation::Exp
        )
    }

    pub fn apply(self, value: f64, operand: f64) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            Operation::Add => value + operand,
            Operation::Subtract => value - operand,
            Operation::Multiply => value * operand,
            Operation::Divide => value / operand,
            Operation::Pow => value.powf(operand),
            Operation::Min => value.min(operand),
            Operation::Max => value.max(operand),
            Operation::Greater => truth(value > operand),
            Operation::GreaterEqual => truth(value >= operand),
            Operation::Less => truth(value < operand),
            Operation::LessEqual => truth(value <= operand),
            Operation::Equal => truth(value == operand),
            Operation::NotEqual => truth(value != operand),
            Operation::Abs => value.abs(),
            Operation::Sqrt => value.sqrt(),
            Operation::Log => value.ln(),
            Operation::Log10 => value.log10(),
            Operation::Exp => value.exp(),
        }
    }
}

impl FromStr for Operation {
    type Err = GeoImageError;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "add" | "+" => Operation::Add,
            "subtract" | "-" => Operation::Subtract,
            "multiply" | "scale" | "*" => Operation::Multiply,
            "divide" | "/" => Operation::Divide,
            "pow" => Operation::Pow,
            "min" => Operation::Min,
            "max" => Operation::Max,
            "gt" | ">" => Operation::Greater,
            "ge" | ">=" => Operation::GreaterEqual,
            "lt" | "<" => Operation::Less,
            "le" | "<=" => Operation::LessEqual,
            "eq" | "==" => Operation::Equal,
            "ne" | "!=" => Operation::NotEqual,
            "abs" => Operation::Abs,
            "sqrt" => Operation::Sqrt,
            "log" => Operation::Log,
            "log10" => Operation::Log10,
            "exp" => Operation::Exp,
            other => return Err(GeoImageError::UnknownFunction(other.to_string())),
        };
        Ok(op)
    }
}

/// A named operation with its operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Function {
    pub operation: Operation,
    pub operand: f64,
}

impl Function {
    pub fn new(operation: Operation, operand: f64) -> Self {
        Self { operation, operand }
    }

    pub fn apply(&self, value: f64) -> f64 {
        self.operation.apply(value, self.operand)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation.name(), self.operand)
    }
}

/// Parses `"<name> <operand>"`, or just `"<name>"` for operand-free operations.
impl FromStr for Function {
    type Err = GeoImageError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| GeoImageError::InvalidFunction(s.to_string()))?;
        let operation: Operation = name.parse()?;
        let operand = match parts.next() {
            Some(text) => text
                .parse::<f64>()
                .map_err(|_| GeoImageError::InvalidFunction(s.to_string()))?,
            None if !operation.takes_operand() => 0.0,
            None => return Err(GeoImageError::InvalidFunction(s.to_string())),
        };
        if parts.next().is_some() {
            return Err(GeoImageError::InvalidFunction(s.to_string()));
        }
        Ok(Function::new(operation, operand))
    }
}

/// Ordered list of functions, applied first to last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionPipeline {
    functions: Vec<Function>,
}

impl FunctionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Function> {
        self.functions.iter()
    }

    pub fn apply(&self, value: f64) -> f64 {
        self.functions.iter().fold(value, |v, f| f.apply(v))
    }

    /// Transform a tile in place; pixels not flagged in `valid` are untouched.
    pub fn apply_tile(&self, tile: &mut Array2<f64>, valid: &Array2<bool>) {
        if self.is_empty() {
            return;
        }
        Zip::from(tile).and(valid).for_each(|v, &ok| {
            if ok {
                *v = self.apply(*v);
            }
        });
    }
}

impl<'a> IntoIterator for &'a FunctionPipeline {
    type Item = &'a Function;
    type IntoIter = std::slice::Iter<'a, Function>;

    fn into_iter(self) -> Self::IntoIter {
        self.functions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_parse_with_operand() {
        let f: Function = "scale 2.5".parse().unwrap();
        assert_eq!(f.operation, Operation::Multiply);
        assert_eq!(f.operand, 2.5);
        assert_eq!(f.to_string(), "multiply 2.5");
    }

    #[test]
    fn test_parse_operand_free() {
        let f: Function = "sqrt".parse().unwrap();
        assert_eq!(f.operation, Operation::Sqrt);
        assert_eq!(f.apply(9.0), 3.0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "frobnicate 1".parse::<Function>(),
            Err(GeoImageError::UnknownFunction(_))
        ));
        assert!(matches!(
            "add".parse::<Function>(),
            Err(GeoImageError::InvalidFunction(_))
        ));
        assert!(matches!(
            "add one".parse::<Function>(),
            Err(GeoImageError::InvalidFunction(_))
        ));
        assert!("add 1 2".parse::<Function>().is_err());
    }

    #[test]
    fn test_pipeline_order() {
        let mut pipeline = FunctionPipeline::new();
        pipeline.push(Function::new(Operation::Add, 1.0));
        pipeline.push(Function::new(Operation::Multiply, 3.0));
        assert_eq!(pipeline.apply(1.0), 6.0);
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_comparisons_and_clips() {
        assert_eq!(Operation::Greater.apply(2.0, 1.0), 1.0);
        assert_eq!(Operation::LessEqual.apply(2.0, 1.0), 0.0);
        assert_eq!(Operation::Min.apply(5.0, 3.0), 3.0);
        assert_eq!(Operation::Max.apply(1.0, 3.0), 3.0);
    }

    #[test]
    fn test_apply_tile_skips_invalid_pixels() {
        let mut pipeline = FunctionPipeline::new();
        pipeline.push("* 10".parse().unwrap());
        let mut tile = arr2(&[[1.0, -9999.0], [2.0, 3.0]]);
        let valid = arr2(&[[true, false], [true, false]]);
        pipeline.apply_tile(&mut tile, &valid);
        assert_eq!(tile, arr2(&[[10.0, -9999.0], [20.0, 3.0]]));
    }
}
