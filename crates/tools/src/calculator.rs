//! Calculator tool: safe arithmetic without handing anything to a shell or interpreter.
//!
//! Grammar, lowest to highest precedence:
//!
//! ```text
//! sum     = product (("+" | "-") product)*
//! product = power (("*" | "/" | "%") power)*
//! power   = unary ("^" power)?
//! unary   = "-" unary | "+" unary | atom
//! atom    = NUMBER | "(" sum ")"
//! ```

use async_trait::async_trait;
use quill_core::error::ToolError;
use quill_core::tool::{ParamType, Tool, ToolParameter};
use serde_json::{Map, Value, json};
use std::iter::Peekable;
use std::str::Chars;

pub struct CalculatorTool {
    parameters: Vec<ToolParameter>,
}

impl CalculatorTool {
    pub fn new() -> Self {
        Self {
            parameters: vec![ToolParameter::required(
                "expression",
                ParamType::String,
                "Arithmetic expression, e.g. '(2 + 3) * 4' or '2 ^ 10'",
            )],
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, and decimals."
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let expr = arguments
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("'expression' must be a string".into()))?;

        let value = evaluate(expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: "calculator".into(),
            reason,
        })?;
        Ok(json!(format_number(value)))
    }
}

/// Deepest allowed nesting of parentheses, signs and exponents.
const MAX_DEPTH: usize = 128;

/// Render integral results without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut parser = ExprParser {
        chars: expr.chars().peekable(),
        depth: 0,
    };
    let value = parser.sum()?;
    parser.skip_ws();
    if let Some(c) = parser.chars.peek() {
        return Err(format!("Unexpected character '{c}'"));
    }
    if !value.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(value)
}

struct ExprParser<'a> {
    chars: Peekable<Chars<'a>>,
    depth: usize,
}

impl ExprParser<'_> {
    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    /// Consume `op` if it is the next non-space character.
    fn eat(&mut self, op: char) -> bool {
        self.skip_ws();
        self.chars.next_if_eq(&op).is_some()
    }

    /// Run `parse` one nesting level down, failing past [`MAX_DEPTH`].
    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Result<f64, String>) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("Expression nested too deeply".into());
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn sum(&mut self) -> Result<f64, String> {
        let mut acc = self.product()?;
        loop {
            if self.eat('+') {
                acc += self.product()?;
            } else if self.eat('-') {
                acc -= self.product()?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn product(&mut self) -> Result<f64, String> {
        let mut acc = self.power()?;
        loop {
            if self.eat('*') {
                acc *= self.power()?;
            } else if self.eat('/') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    return Err("Division by zero".into());
                }
                acc /= divisor;
            } else if self.eat('%') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    return Err("Modulo by zero".into());
                }
                acc %= divisor;
            } else {
                return Ok(acc);
            }
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if self.eat('^') {
            // Right-associative: 2^3^2 = 2^(3^2)
            let exponent = self.nested(Self::power)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.eat('-') {
            return Ok(-self.nested(Self::unary)?);
        }
        if self.eat('+') {
            return self.nested(Self::unary);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<f64, String> {
        if self.eat('(') {
            let inner = self.nested(Self::sum)?;
            if !self.eat(')') {
                return Err("Expected closing parenthesis".into());
            }
            return Ok(inner);
        }

        self.skip_ws();
        let mut literal = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }
        if literal.is_empty() {
            return match self.chars.peek() {
                Some(c) => Err(format!("Unexpected character '{c}'")),
                None => Err("Unexpected end of expression".into()),
            };
        }
        literal
            .parse()
            .map_err(|_| format!("Invalid number: {literal}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::tool::{ToolCall, ToolRegistry};

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("((1 + 2) * (3 + 4))").unwrap(), 21.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), 4.0);
    }

    #[test]
    fn modulo_and_decimals() {
        assert_eq!(evaluate("17 % 5").unwrap(), 2.0);
        assert!((evaluate("3.14 * 2").unwrap() - 6.28).abs() < 1e-12);
        assert_eq!(evaluate("+4 - -1").unwrap(), 5.0);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("5 % 0").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("1.2.3").is_err());
        assert!(evaluate("__import__('os')").is_err());
        assert!(evaluate("3 4").is_err());
    }

    #[test]
    fn nesting_is_bounded() {
        let shallow = format!("{}7{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&shallow).unwrap(), 7.0);

        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(evaluate(&deep).unwrap_err(), "Expression nested too deeply");
        assert!(evaluate(&"-".repeat(10_000)).is_err());
        assert!(evaluate(&"2^".repeat(10_000)).is_err());
    }

    #[test]
    fn integral_results_drop_fraction() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[tokio::test]
    async fn tool_execute() {
        let tool = CalculatorTool::new();
        let mut args = Map::new();
        args.insert("expression".into(), json!("10 / 4"));
        assert_eq!(tool.execute(args).await.unwrap(), json!("2.5"));
    }

    #[tokio::test]
    async fn tool_reports_evaluation_errors() {
        let tool = CalculatorTool::new();
        let mut args = Map::new();
        args.insert("expression".into(), json!("1 / 0"));
        let err = tool.execute(args).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("Division by zero"));
    }

    #[tokio::test]
    async fn deeply_nested_expression_fails_through_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CalculatorTool::new()));

        let expression = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let call = ToolCall {
            id: "call_1".into(),
            name: "calculator".into(),
            arguments: json!({ "expression": expression }),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("nested too deeply"));
    }

    #[test]
    fn tool_definition() {
        let def = CalculatorTool::new().to_definition();
        assert_eq!(def.name, "calculator");
        assert_eq!(def.parameters["required"][0], "expression");
    }
}
