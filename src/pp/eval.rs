//! Constant integer expressions for `#if` / `#elif`.
//!
//! Operates on already macro-expanded tokens; `defined(..)` has been
//! replaced with `0`/`1` before evaluation. Undefined identifiers evaluate
//! to zero, as in C. Division and modulo by zero are recoverable: the
//! result is zero and a diagnostic is reported through `diag`.

use super::token::PTok;

pub fn eval(tokens: &[PTok], diag: &mut dyn FnMut(String)) -> Result<i64, String> {
    let tokens: Vec<&PTok> = tokens.iter().filter(|t| !t.is_space()).collect();
    let mut eval = Eval {
        tokens,
        pos: 0,
        diag,
    };
    let value = eval.ternary()?;
    if eval.pos != eval.tokens.len() {
        return Err(format!(
            "unexpected '{}' in conditional expression",
            eval.tokens[eval.pos]
        ));
    }
    Ok(value)
}

struct Eval<'a> {
    tokens: Vec<&'a PTok>,
    pos: usize,
    diag: &'a mut dyn FnMut(String),
}

impl Eval<'_> {
    fn peek_punct(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(PTok::Punct(p)) => Some(p),
            _ => None,
        }
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.peek_punct() == Some(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ternary(&mut self) -> Result<i64, String> {
        let condition = self.logical_or()?;
        if !self.eat("?") {
            return Ok(condition);
        }
        let if_true = self.ternary()?;
        if !self.eat(":") {
            return Err("expected ':' in conditional expression".into());
        }
        let if_false = self.ternary()?;
        Ok(if condition != 0 { if_true } else { if_false })
    }

    fn binary(
        &mut self,
        ops: &[&str],
        operand: fn(&mut Self) -> Result<i64, String>,
    ) -> Result<i64, String> {
        let mut left = operand(self)?;
        loop {
            let Some(op) = self.peek_punct().filter(|p| ops.contains(p)) else {
                return Ok(left);
            };
            self.pos += 1;
            let right = operand(self)?;
            left = self.apply(op, left, right);
        }
    }

    fn logical_or(&mut self) -> Result<i64, String> {
        self.binary(&["||"], Self::logical_and)
    }

    fn logical_and(&mut self) -> Result<i64, String> {
        self.binary(&["&&"], Self::bit_or)
    }

    fn bit_or(&mut self) -> Result<i64, String> {
        self.binary(&["|"], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> Result<i64, String> {
        self.binary(&["^"], Self::bit_and)
    }

    fn bit_and(&mut self) -> Result<i64, String> {
        self.binary(&["&"], Self::equality)
    }

    fn equality(&mut self) -> Result<i64, String> {
        self.binary(&["==", "!="], Self::relational)
    }

    fn relational(&mut self) -> Result<i64, String> {
        self.binary(&["<", ">", "<=", ">="], Self::shift)
    }

    fn shift(&mut self) -> Result<i64, String> {
        self.binary(&["<<", ">>"], Self::additive)
    }

    fn additive(&mut self) -> Result<i64, String> {
        self.binary(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<i64, String> {
        self.binary(&["*", "/", "%"], Self::unary)
    }

    fn apply(&mut self, op: &str, left: i64, right: i64) -> i64 {
        match op {
            "||" => i64::from(left != 0 || right != 0),
            "&&" => i64::from(left != 0 && right != 0),
            "|" => left | right,
            "^" => left ^ right,
            "&" => left & right,
            "==" => i64::from(left == right),
            "!=" => i64::from(left != right),
            "<" => i64::from(left < right),
            ">" => i64::from(left > right),
            "<=" => i64::from(left <= right),
            ">=" => i64::from(left >= right),
            "<<" => left.wrapping_shl(right as u32),
            ">>" => left.wrapping_shr(right as u32),
            "+" => left.wrapping_add(right),
            "-" => left.wrapping_sub(right),
            "*" => left.wrapping_mul(right),
            "/" => {
                if right == 0 {
                    (self.diag)("division by zero in conditional expression".into());
                    0
                } else {
                    left.wrapping_div(right)
                }
            }
            "%" => {
                if right == 0 {
                    (self.diag)("modulo by zero in conditional expression".into());
                    0
                } else {
                    left.wrapping_rem(right)
                }
            }
            _ => unreachable!("unhandled operator {op}"),
        }
    }

    fn unary(&mut self) -> Result<i64, String> {
        if self.eat("!") {
            return Ok(i64::from(self.unary()? == 0));
        }
        if self.eat("~") {
            return Ok(!self.unary()?);
        }
        if self.eat("-") {
            return Ok(self.unary()?.wrapping_neg());
        }
        if self.eat("+") {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<i64, String> {
        if self.eat("(") {
            let value = self.ternary()?;
            if !self.eat(")") {
                return Err("expected ')' in conditional expression".into());
            }
            return Ok(value);
        }
        match self.tokens.get(self.pos) {
            Some(PTok::Number(text)) => {
                self.pos += 1;
                parse_int(text)
                    .ok_or_else(|| format!("invalid integer constant '{text}'"))
            }
            Some(PTok::CharLit(text)) => {
                self.pos += 1;
                // value of the first character after the opening quote
                Ok(text.chars().nth(1).map_or(0, |c| c as i64))
            }
            // undefined identifiers evaluate to 0
            Some(PTok::Word(_)) => {
                self.pos += 1;
                Ok(0)
            }
            Some(other) => Err(format!("unexpected '{other}' in conditional expression")),
            None => Err("unexpected end of conditional expression".into()),
        }
    }
}

/// Parses a pp-number as an integer, honoring `0x`/octal prefixes and
/// ignoring `u`/`l` suffixes.
pub fn parse_int(text: &str) -> Option<i64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let (digits, radix) = if let Some(hex) = digits.strip_prefix("0x").or(digits.strip_prefix("0X"))
    {
        (hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (&digits[1..], 8)
    } else {
        (digits, 10)
    };
    i64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::super::token::{PLexer, PTok};
    use super::eval;

    fn run(source: &str) -> i64 {
        let tokens: Vec<PTok> = PLexer::run(source).into_iter().map(|(t, _)| t).collect();
        eval(&tokens, &mut |d| panic!("unexpected diagnostic: {d}")).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run("1 + 2 * 3"), 7);
        assert_eq!(run("(1 + 2) * 3"), 9);
        assert_eq!(run("10 % 4 + 6 / 2"), 5);
        assert_eq!(run("1 << 4 | 3"), 19);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(run("3 > 2 && 2 >= 2"), 1);
        assert_eq!(run("1 == 2 || !0"), 1);
        assert_eq!(run("~0 == -1"), 1);
    }

    #[test]
    fn ternary() {
        assert_eq!(run("1 ? 10 : 20"), 10);
        assert_eq!(run("0 ? 10 : 0 ? 20 : 30"), 30);
    }

    #[test]
    fn radix_prefixes() {
        assert_eq!(run("0x1F"), 31);
        assert_eq!(run("017"), 15);
        assert_eq!(run("42u"), 42);
    }

    #[test]
    fn undefined_identifier_is_zero() {
        assert_eq!(run("UNDEFINED + 1"), 1);
    }

    #[test]
    fn division_by_zero_recovers() {
        let tokens: Vec<PTok> = PLexer::run("1 / 0").into_iter().map(|(t, _)| t).collect();
        let mut reported = Vec::new();
        let value = eval(&tokens, &mut |d| reported.push(d)).unwrap();
        assert_eq!(value, 0);
        assert_eq!(reported.len(), 1);
    }

    #[test]
    fn malformed_is_error() {
        let tokens: Vec<PTok> = PLexer::run("1 +").into_iter().map(|(t, _)| t).collect();
        assert!(eval(&tokens, &mut |_| {}).is_err());
    }
}
