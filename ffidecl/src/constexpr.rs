//! Integer constant evaluation for enum members, array lengths and
//! `#define` constants.

use crate::ast::{BinOp, ConstExpr};
use crate::error::{Error, Result};
use crate::source::SourceLoc;

/// parse a C integer literal: decimal, octal (leading 0), hex (0x) or
/// binary (0b), with `u`/`l`/`ll` suffixes in any case and order. the value
/// is independent of the suffix.
pub fn parse_int_literal(text: &str) -> std::result::Result<i64, String> {
    let t = text.trim();
    if t.is_empty() {
        return Err("empty integer constant".to_string());
    }

    // split off the suffix: at most one 'u' and at most two adjacent 'l's
    let mut end = t.len();
    let bytes = t.as_bytes();
    while end > 0 && matches!(bytes[end - 1], b'u' | b'U' | b'l' | b'L') {
        end -= 1;
    }
    let suffix = &t[end..];
    if !valid_suffix(suffix) {
        return Err(format!("invalid integer suffix '{}'", suffix));
    }

    let digits = &t[..end];
    let (radix, rest) = if let Some(r) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, r)
    } else if let Some(r) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, r)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    if rest.is_empty() {
        return Err(format!("invalid integer constant '{}'", text));
    }
    u64::from_str_radix(rest, radix)
        .map(|v| v as i64)
        .map_err(|_| format!("invalid integer constant '{}'", text))
}

fn valid_suffix(s: &str) -> bool {
    let mut u = 0;
    let mut l = 0;
    for c in s.chars() {
        match c {
            'u' | 'U' => u += 1,
            'l' | 'L' => l += 1,
            _ => return false,
        }
    }
    u <= 1 && l <= 2
}

/// evaluate a constant expression. `lookup` resolves names to previously
/// evaluated constants. division truncates toward zero; division by zero is
/// reported, not panicked on.
pub fn eval_expr(
    expr: &ConstExpr,
    files: &[String],
    lookup: &dyn Fn(&str) -> Option<i64>,
) -> Result<i64> {
    match expr {
        ConstExpr::Literal(text, loc) => {
            parse_int_literal(text).map_err(|msg| Error::syntax(files, *loc, msg))
        }
        ConstExpr::Name(name, loc) => lookup(name)
            .ok_or_else(|| Error::unknown_identifier(files, *loc, name)),
        ConstExpr::Unary { op, operand } => {
            let v = eval_expr(operand, files, lookup)?;
            Ok(match op {
                '-' => v.wrapping_neg(),
                '~' => !v,
                _ => v,
            })
        }
        ConstExpr::Binary { op, lhs, rhs } => {
            let a = eval_expr(lhs, files, lookup)?;
            let b = eval_expr(rhs, files, lookup)?;
            match op {
                BinOp::Add => Ok(a.wrapping_add(b)),
                BinOp::Sub => Ok(a.wrapping_sub(b)),
                BinOp::Mul => Ok(a.wrapping_mul(b)),
                BinOp::Div => {
                    if b == 0 {
                        Err(Error::eval(
                            files,
                            loc_of(lhs),
                            "division by zero in constant expression",
                        ))
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                }
                BinOp::Shl => Ok(a.wrapping_shl(b as u32 & 63)),
                BinOp::Shr => Ok(a.wrapping_shr(b as u32 & 63)),
                BinOp::BitAnd => Ok(a & b),
                BinOp::BitXor => Ok(a ^ b),
                BinOp::BitOr => Ok(a | b),
            }
        }
    }
}

fn loc_of(expr: &ConstExpr) -> SourceLoc {
    match expr {
        ConstExpr::Literal(_, loc) | ConstExpr::Name(_, loc) => *loc,
        ConstExpr::Unary { operand, .. } => loc_of(operand),
        ConstExpr::Binary { lhs, .. } => loc_of(lhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bases() {
        assert_eq!(parse_int_literal("10").unwrap(), 10);
        assert_eq!(parse_int_literal("010").unwrap(), 8);
        assert_eq!(parse_int_literal("0x10").unwrap(), 16);
        assert_eq!(parse_int_literal("0b10").unwrap(), 2);
        assert_eq!(parse_int_literal("0").unwrap(), 0);
    }

    #[test]
    fn test_suffixes_do_not_change_the_value() {
        for suffix in ["", "u", "U", "l", "L", "ll", "LL", "ul", "uLL", "Lu"] {
            assert_eq!(
                parse_int_literal(&format!("0b10{}", suffix)).unwrap(),
                2,
                "suffix {}",
                suffix
            );
            assert_eq!(parse_int_literal(&format!("010{}", suffix)).unwrap(), 8);
            assert_eq!(parse_int_literal(&format!("10{}", suffix)).unwrap(), 10);
            assert_eq!(parse_int_literal(&format!("0x10{}", suffix)).unwrap(), 16);
        }
    }

    #[test]
    fn test_bad_literals() {
        assert!(parse_int_literal("0x").is_err());
        assert!(parse_int_literal("10uu").is_err());
        assert!(parse_int_literal("10lll").is_err());
        assert!(parse_int_literal("1a0").is_err());
        assert!(parse_int_literal("\"blah\"").is_err());
    }

    #[test]
    fn test_large_hex_wraps_to_i64() {
        assert_eq!(parse_int_literal("0xFFFFFFFFFFFFFFFF").unwrap(), -1);
    }
}
