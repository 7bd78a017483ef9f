//! Arithmetic and comparison.
//!
//! Integer math is checked: overflow raises a math error instead of
//! wrapping. An integer division that isn't exact produces a decimal.

use std::cmp::Ordering;

use crate::error::{Error, ErrorId, Result};
use crate::function::Bounce;
use crate::interp::{Frame, Interp};
use crate::scan::days_in_month;
use crate::value::{Date, Kind, Payload, Tuple, Value};

use super::{logic, out, type_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Subtract,
    Multiply,
    Divide,
}

fn overflow() -> Error {
    Error::raised(ErrorId::Overflow)
}

fn zero_divide() -> Error {
    Error::raised(ErrorId::ZeroDivide)
}

fn integers(op: Op, a: i64, b: i64) -> Result<Value> {
    let n = match op {
        Op::Add => a.checked_add(b),
        Op::Subtract => a.checked_sub(b),
        Op::Multiply => a.checked_mul(b),
        Op::Divide => {
            if b == 0 {
                return Err(zero_divide());
            }
            if a % b != 0 {
                return Ok(Value::decimal(a as f64 / b as f64));
            }
            a.checked_div(b)
        }
    };
    n.map(Value::integer).ok_or_else(overflow)
}

fn decimals(op: Op, a: f64, b: f64) -> Result<f64> {
    let d = match op {
        Op::Add => a + b,
        Op::Subtract => a - b,
        Op::Multiply => a * b,
        Op::Divide if b == 0.0 => return Err(zero_divide()),
        Op::Divide => a / b,
    };
    if d.is_finite() { Ok(d) } else { Err(overflow()) }
}

fn pair_of(value: Value) -> Option<(f64, f64)> {
    match value.payload {
        Payload::Pair(x, y) => Some((x, y)),
        _ => value.as_decimal().filter(|_| value.kind.is_number()).map(|d| (d, d)),
    }
}

/// Days since 0000-03-01 in the proleptic Gregorian calendar.
fn date_to_days(date: Date) -> i64 {
    let month = i64::from(date.month);
    let (year, month) = if month <= 2 {
        (i64::from(date.year) - 1, month + 9)
    } else {
        (i64::from(date.year), month - 3)
    };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let doy = (153 * month + 2) / 5 + i64::from(date.day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe
}

fn days_to_date(days: i64) -> Result<Date> {
    let era = days.div_euclid(146_097);
    let doe = days - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    let year = i32::try_from(year).map_err(|_| overflow())?;
    debug_assert!(day as u8 <= days_in_month(year, month as u8));
    Ok(Date {
        year,
        month: month as u8,
        day: day as u8,
    })
}

fn tuples(op: Op, a: Tuple, b: &[u8]) -> Result<Value> {
    let len = a.parts().len().max(b.len());
    let mut parts = Vec::with_capacity(len);
    for n in 0..len {
        let x = i64::from(a.parts().get(n).copied().unwrap_or(0));
        let y = i64::from(b.get(n).copied().unwrap_or(0));
        let part = match op {
            Op::Add => x + y,
            Op::Subtract => x - y,
            Op::Multiply => x * y,
            Op::Divide if y == 0 => return Err(zero_divide()),
            Op::Divide => x / y,
        };
        parts.push(part.clamp(0, 255) as u8);
    }
    Tuple::new(&parts).map(Value::tuple).ok_or_else(overflow)
}

fn arithmetic(op: Op, a: Value, b: Value) -> Result<Value> {
    match (a.payload, b.payload) {
        (Payload::Integer(x), Payload::Integer(y)) if a.kind == Kind::Integer && b.kind == Kind::Integer => {
            integers(op, x, y)
        }
        _ if a.kind.is_number() && b.kind.is_number() => {
            let (x, y) = (a.as_decimal().unwrap_or_default(), b.as_decimal().unwrap_or_default());
            decimals(op, x, y).map(Value::decimal)
        }
        _ if a.kind == Kind::Pair || b.kind == Kind::Pair => {
            let ((ax, ay), (bx, by)) = match (pair_of(a), pair_of(b)) {
                (Some(left), Some(right)) => (left, right),
                _ => return Err(type_error(if pair_of(a).is_none() { a } else { b })),
            };
            Ok(Value::pair(decimals(op, ax, bx)?, decimals(op, ay, by)?))
        }
        (Payload::Char(c), Payload::Integer(n)) if matches!(op, Op::Add | Op::Subtract) => {
            let n = if op == Op::Add { n } else { n.checked_neg().ok_or_else(overflow)? };
            let code = i64::from(u32::from(c)).checked_add(n).ok_or_else(overflow)?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(Value::char)
                .ok_or_else(|| Error::arg(ErrorId::OutOfRange, Value::integer(code)))
        }
        (Payload::Time(x), Payload::Time(y)) if matches!(op, Op::Add | Op::Subtract) => {
            let t = if op == Op::Add { x.checked_add(y) } else { x.checked_sub(y) };
            t.map(Value::time).ok_or_else(overflow)
        }
        (Payload::Time(x), _) if b.kind.is_number() && matches!(op, Op::Multiply | Op::Divide) => {
            let scaled = decimals(op, x as f64, b.as_decimal().unwrap_or_default())?;
            Ok(Value::time(scaled.round() as i64))
        }
        (Payload::Date(date), Payload::Integer(days)) if matches!(op, Op::Add | Op::Subtract) => {
            let days = if op == Op::Add { days } else { days.checked_neg().ok_or_else(overflow)? };
            let shifted = date_to_days(date).checked_add(days).ok_or_else(overflow)?;
            Ok(Value::date(days_to_date(shifted)?))
        }
        (Payload::Date(x), Payload::Date(y)) if op == Op::Subtract => {
            Ok(Value::integer(date_to_days(x) - date_to_days(y)))
        }
        (Payload::Tuple(x), Payload::Tuple(y)) => tuples(op, x, y.parts()),
        (Payload::Tuple(x), Payload::Integer(n)) if b.kind == Kind::Integer => {
            let byte = n.clamp(0, 255) as u8;
            tuples(op, x, &vec![byte; x.parts().len()])
        }
        _ => Err(type_error(if a.kind.is_number() { b } else { a })),
    }
}

fn binary(interp: &Interp, frame: &Frame, op: Op) -> Result<Bounce> {
    out(arithmetic(op, interp.arg(frame, 1), interp.arg(frame, 2))?)
}

pub fn add(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    binary(interp, frame, Op::Add)
}

pub fn subtract(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    binary(interp, frame, Op::Subtract)
}

pub fn multiply(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    binary(interp, frame, Op::Multiply)
}

pub fn divide(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    binary(interp, frame, Op::Divide)
}

pub fn remainder(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let (a, b) = (interp.arg(frame, 1), interp.arg(frame, 2));
    match (a.as_integer(), b.as_integer()) {
        (Some(_), Some(0)) => Err(zero_divide()),
        (Some(x), Some(y)) => out(Value::integer(x.checked_rem(y).ok_or_else(overflow)?)),
        _ => {
            let (x, y) = (a.as_decimal().unwrap_or_default(), b.as_decimal().unwrap_or_default());
            if y == 0.0 {
                return Err(zero_divide());
            }
            out(Value::decimal(x % y))
        }
    }
}

pub fn negate(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    out(match value.payload {
        Payload::Integer(n) => Value::integer(n.checked_neg().ok_or_else(overflow)?),
        Payload::Decimal(d) => Value::decimal(-d),
        Payload::Pair(x, y) => Value::pair(-x, -y),
        Payload::Time(t) => Value::time(t.checked_neg().ok_or_else(overflow)?),
        _ => return Err(type_error(value)),
    })
}

pub fn abs(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    out(match value.payload {
        Payload::Integer(n) => Value::integer(n.checked_abs().ok_or_else(overflow)?),
        Payload::Decimal(d) => Value::decimal(d.abs()),
        Payload::Pair(x, y) => Value::pair(x.abs(), y.abs()),
        Payload::Time(t) => Value::time(t.checked_abs().ok_or_else(overflow)?),
        _ => return Err(type_error(value)),
    })
}

fn pick_extreme(interp: &Interp, frame: &Frame, wanted: Ordering) -> Result<Bounce> {
    let (a, b) = (interp.arg(frame, 1), interp.arg(frame, 2));
    let order = compare_values(interp, a, b, false).ok_or_else(|| type_error(b))?;
    out(if order == wanted || order == Ordering::Equal { a } else { b })
}

pub fn min(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    pick_extreme(interp, frame, Ordering::Less)
}

pub fn max(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    pick_extreme(interp, frame, Ordering::Greater)
}

// ── comparison ───────────────────────────────────────────────────

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Equality as `=` (loose) or `==` (strict) sees it. Loose equality lets
/// integers equal decimals, ignores character case and compares words by
/// their canon spelling.
pub(crate) fn values_equal(interp: &Interp, a: Value, b: Value, strict: bool) -> bool {
    if a.kind != b.kind {
        if strict {
            return false;
        }
        if a.kind.is_number() && b.kind.is_number() {
            return a.as_decimal() == b.as_decimal();
        }
        if !(a.kind.is_any_word() && b.kind.is_any_word()) {
            return false;
        }
    }
    match (a.payload, b.payload) {
        (Payload::Char(x), Payload::Char(y)) => x == y || (!strict && fold(x) == fold(y)),
        (Payload::Word(x), Payload::Word(y)) => {
            if strict {
                x.spelling == y.spelling
            } else {
                interp.symbols.same(x.spelling, y.spelling)
            }
        }
        (Payload::Series(x), Payload::Series(y)) => {
            if x.series == y.series && x.index == y.index {
                return true;
            }
            if a.kind.is_any_string() {
                let (Ok(left), Ok(right)) = (interp.heap.chars(x.series), interp.heap.chars(y.series)) else {
                    return false;
                };
                let (left, right) = (left.get(x.index..).unwrap_or_default(), right.get(y.index..).unwrap_or_default());
                return left.len() == right.len()
                    && left.iter().zip(right).all(|(&l, &r)| l == r || (!strict && fold(l) == fold(r)));
            }
            if a.kind == Kind::Binary {
                let (Ok(left), Ok(right)) = (interp.heap.bytes(x.series), interp.heap.bytes(y.series)) else {
                    return false;
                };
                return left.get(x.index..) == right.get(y.index..);
            }
            let (Ok(left), Ok(right)) = (interp.heap.array(x.series), interp.heap.array(y.series)) else {
                return false;
            };
            let (left, right) = (left.get(x.index..).unwrap_or_default(), right.get(y.index..).unwrap_or_default());
            left.len() == right.len()
                && left.iter().zip(right).all(|(&l, &r)| {
                    let l = interp.derelativize(l, x.specifier);
                    let r = interp.derelativize(r, y.specifier);
                    values_equal(interp, l, r, strict)
                })
        }
        (Payload::Function(x), Payload::Function(y)) => x.paramlist == y.paramlist,
        (Payload::Typeset(x), Payload::Typeset(y)) => x.bits == y.bits,
        (x, y) => x == y,
    }
}

/// Ordering for `<` and friends; `None` when the two can't be ordered.
pub(crate) fn compare_values(interp: &Interp, a: Value, b: Value, strict: bool) -> Option<Ordering> {
    if a.kind.is_number() && b.kind.is_number() {
        return match (a.as_integer(), b.as_integer()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_decimal()?.partial_cmp(&b.as_decimal()?),
        };
    }
    if a.kind.is_any_string() && b.kind.is_any_string() {
        let (x, y) = (a.as_series()?, b.as_series()?);
        let left = interp.heap.chars(x.series).ok()?.get(x.index..)?;
        let right = interp.heap.chars(y.series).ok()?.get(y.index..)?;
        let key = |c: &char| if strict { *c } else { fold(*c) };
        return Some(left.iter().map(key).cmp(right.iter().map(key)));
    }
    if a.kind.is_any_word() && b.kind.is_any_word() {
        let (x, y) = (a.symbol()?, b.symbol()?);
        let left = interp.symbols.spelling(x).chars().map(fold);
        return Some(left.cmp(interp.symbols.spelling(y).chars().map(fold)));
    }
    match (a.payload, b.payload) {
        (Payload::Char(x), Payload::Char(y)) if strict => Some(x.cmp(&y)),
        (Payload::Char(x), Payload::Char(y)) => Some(fold(x).cmp(&fold(y))),
        (Payload::Time(x), Payload::Time(y)) => Some(x.cmp(&y)),
        (Payload::Date(x), Payload::Date(y)) => Some((x.year, x.month, x.day).cmp(&(y.year, y.month, y.day))),
        (Payload::Tuple(x), Payload::Tuple(y)) => Some(x.parts().cmp(y.parts())),
        (Payload::Pair(ax, ay), Payload::Pair(bx, by)) => match ay.partial_cmp(&by)? {
            Ordering::Equal => ax.partial_cmp(&bx),
            order => Some(order),
        },
        _ => None,
    }
}

fn ordered(interp: &Interp, frame: &Frame, test: fn(Ordering) -> bool) -> Result<Bounce> {
    let (a, b) = (interp.arg(frame, 1), interp.arg(frame, 2));
    match compare_values(interp, a, b, false) {
        Some(order) => logic(test(order)),
        None => Err(Error::with_args(
            ErrorId::InvalidType,
            vec![Value::datatype(if compare_values(interp, a, a, false).is_none() { a.kind } else { b.kind })],
        )),
    }
}

pub fn equal_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    logic(values_equal(interp, interp.arg(frame, 1), interp.arg(frame, 2), false))
}

pub fn not_equal_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    logic(!values_equal(interp, interp.arg(frame, 1), interp.arg(frame, 2), false))
}

pub fn strict_equal_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    logic(values_equal(interp, interp.arg(frame, 1), interp.arg(frame, 2), true))
}

pub fn same_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let (a, b) = (interp.arg(frame, 1), interp.arg(frame, 2));
    logic(a.kind == b.kind && a.payload == b.payload)
}

pub fn lesser_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    ordered(interp, frame, Ordering::is_lt)
}

pub fn greater_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    ordered(interp, frame, Ordering::is_gt)
}

pub fn lesser_or_equal_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    ordered(interp, frame, Ordering::is_le)
}

pub fn greater_or_equal_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    ordered(interp, frame, Ordering::is_ge)
}

pub fn zero_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let value = interp.arg(frame, 1);
    logic(match value.payload {
        Payload::Integer(n) => n == 0,
        Payload::Decimal(d) => d == 0.0,
        Payload::Pair(x, y) => x == 0.0 && y == 0.0,
        Payload::Time(t) => t == 0,
        Payload::Char(c) => c == '\0',
        Payload::Tuple(tuple) => tuple.parts().iter().all(|&part| part == 0),
        _ => false,
    })
}

fn parity(value: Value) -> Result<i64> {
    match value.payload {
        Payload::Integer(n) => Ok(n),
        Payload::Char(c) => Ok(i64::from(u32::from(c))),
        _ => Err(type_error(value)),
    }
}

pub fn even_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    logic(parity(interp.arg(frame, 1))? % 2 == 0)
}

pub fn odd_q(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    logic(parity(interp.arg(frame, 1))? % 2 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    fn eval(interp: &mut Interp, text: &str) -> Value {
        interp.do_text(text).expect(text)
    }

    #[test]
    fn integer_math_is_checked() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "7 / 2"), Value::decimal(3.5));
        assert_eq!(eval(&mut interp, "8 / 2"), Value::integer(4));
        assert_eq!(eval(&mut interp, "1 + 2.5"), Value::decimal(3.5));
        let err = interp.do_text("9223372036854775807 + 1").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::Overflow));
        let err = interp.do_text("1.5 / 0").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::ZeroDivide));
        assert_eq!(eval(&mut interp, "remainder 7 3"), Value::integer(1));
        assert_eq!(eval(&mut interp, "abs -4"), Value::integer(4));
    }

    #[test]
    fn scalar_math() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "1x2 + 3"), Value::pair(4.0, 5.0));
        assert_eq!(eval(&mut interp, r#"#"a" + 1"#), Value::char('b'));
        let value = eval(&mut interp, "1.2.3 + 1.1.1");
        assert_eq!(interp.mold(value), "2.3.4");
        let value = eval(&mut interp, "2024-02-28 + 1");
        assert_eq!(interp.mold(value), "2024-02-29");
        let value = eval(&mut interp, "1999-12-31 + 1");
        assert_eq!(interp.mold(value), "2000-01-01");
        assert_eq!(eval(&mut interp, "2024-03-01 - 2024-02-01"), Value::integer(29));
    }

    #[test]
    fn equality_is_loose_or_strict() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "1 = 1.0"), Value::TRUE);
        assert_eq!(eval(&mut interp, "1 == 1.0"), Value::FALSE);
        assert_eq!(eval(&mut interp, r#""abc" = "ABC""#), Value::TRUE);
        assert_eq!(eval(&mut interp, r#""abc" == "ABC""#), Value::FALSE);
        assert_eq!(eval(&mut interp, "[a [1 2]] = [A [1 2]]"), Value::TRUE);
        assert_eq!(eval(&mut interp, "'foo = 'FOO"), Value::TRUE);
        assert_eq!(eval(&mut interp, "1 <> 2"), Value::TRUE);
        assert_eq!(eval(&mut interp, "b: [1] same? b b"), Value::TRUE);
        assert_eq!(eval(&mut interp, "same? [1] [1]"), Value::FALSE);
    }

    #[test]
    fn ordering() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "1 < 2.5"), Value::TRUE);
        assert_eq!(eval(&mut interp, r#""apple" < "Banana""#), Value::TRUE);
        assert_eq!(eval(&mut interp, "2 >= 2"), Value::TRUE);
        assert_eq!(eval(&mut interp, "max 3 7"), Value::integer(7));
        assert_eq!(eval(&mut interp, "min 3 7"), Value::integer(3));
        let err = interp.do_text("[1] < [2]").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::InvalidType));
    }

    #[test]
    fn predicates() {
        let mut interp = interp();
        assert_eq!(eval(&mut interp, "zero? 0.0"), Value::TRUE);
        assert_eq!(eval(&mut interp, "even? 4"), Value::TRUE);
        assert_eq!(eval(&mut interp, "odd? 4"), Value::FALSE);
    }

    #[test]
    fn calendar_round_trip() {
        for (year, month, day) in [(2000, 2, 29), (1970, 1, 1), (-1, 12, 31), (2100, 3, 1)] {
            let date = Date { year, month, day };
            assert_eq!(days_to_date(date_to_days(date)).unwrap(), date);
        }
    }
}
