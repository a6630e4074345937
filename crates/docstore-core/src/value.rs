//! The attribute-value sum type -- the scalar/collection value every item
//! attribute holds.
//!
//! Mirrors the managed store's typed attribute value: exactly one of the
//! variants below is ever set, matching the wire encoding's one-key JSON
//! object (`{"S": "..."}`, `{"N": "..."}`, ...). Equality is structural and
//! variant-aware: sets compare as sets, lists and maps compare by
//! position/key, numbers compare as decimal strings (never coerced to a
//! binary float).

use std::collections::BTreeSet;

/// A single attribute value.
///
/// `N` is stored as the caller's canonical decimal string and is never
/// reformatted or coerced to a binary float -- callers that need numeric
/// comparison should go through `docstore-codec`'s collation encoding or a
/// decimal parse at the point of use.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    S(String),
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null,
    SS(BTreeSet<String>),
    NS(BTreeSet<String>),
    BS(BTreeSet<Vec<u8>>),
    L(Vec<AttributeValue>),
    M(std::collections::BTreeMap<String, AttributeValue>),
}

/// The type tag used by `attribute_type()` and the wire JSON key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    S,
    N,
    B,
    Bool,
    Null,
    SS,
    NS,
    BS,
    L,
    M,
}

impl AttributeValue {
    /// Returns the type tag for this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            AttributeValue::S(_) => ValueType::S,
            AttributeValue::N(_) => ValueType::N,
            AttributeValue::B(_) => ValueType::B,
            AttributeValue::Bool(_) => ValueType::Bool,
            AttributeValue::Null => ValueType::Null,
            AttributeValue::SS(_) => ValueType::SS,
            AttributeValue::NS(_) => ValueType::NS,
            AttributeValue::BS(_) => ValueType::BS,
            AttributeValue::L(_) => ValueType::L,
            AttributeValue::M(_) => ValueType::M,
        }
    }

    /// The wire JSON key for this value's type (`"S"`, `"N"`, ...).
    pub fn type_tag(&self) -> &'static str {
        match self.value_type() {
            ValueType::S => "S",
            ValueType::N => "N",
            ValueType::B => "B",
            ValueType::Bool => "BOOL",
            ValueType::Null => "NULL",
            ValueType::SS => "SS",
            ValueType::NS => "NS",
            ValueType::BS => "BS",
            ValueType::L => "L",
            ValueType::M => "M",
        }
    }

    /// `true` for the three key-eligible scalar types (S, N, B).
    pub fn is_key_type(&self) -> bool {
        matches!(self, AttributeValue::S(_) | AttributeValue::N(_) | AttributeValue::B(_))
    }

    /// The `size()` of this value per §4.3: string byte length, binary byte
    /// length, element count for sets/lists, key count for maps. Numbers and
    /// booleans have no defined size.
    pub fn size(&self) -> Option<usize> {
        match self {
            AttributeValue::S(s) => Some(s.len()),
            AttributeValue::B(b) => Some(b.len()),
            AttributeValue::SS(s) => Some(s.len()),
            AttributeValue::NS(s) => Some(s.len()),
            AttributeValue::BS(s) => Some(s.len()),
            AttributeValue::L(l) => Some(l.len()),
            AttributeValue::M(m) => Some(m.len()),
            AttributeValue::N(_) | AttributeValue::Bool(_) | AttributeValue::Null => None,
        }
    }

    /// Substring/element/key-containment check used by the `contains()`
    /// condition function.
    pub fn contains(&self, needle: &AttributeValue) -> bool {
        match self {
            AttributeValue::S(s) => matches!(needle, AttributeValue::S(n) if s.contains(n.as_str())),
            AttributeValue::SS(set) => matches!(needle, AttributeValue::S(n) if set.contains(n)),
            AttributeValue::NS(set) => {
                matches!(needle, AttributeValue::N(n) if set.iter().any(|v| decimal_eq(v, n)))
            }
            AttributeValue::BS(set) => matches!(needle, AttributeValue::B(n) if set.contains(n)),
            AttributeValue::L(list) => list.iter().any(|v| v == needle),
            AttributeValue::M(map) => {
                matches!(needle, AttributeValue::S(key) if map.contains_key(key))
            }
            _ => false,
        }
    }
}

/// Decimal-string equality: `"1"` and `"1.0"` are the same number. Used for
/// N comparisons so canonical-string storage never breaks equality.
pub fn decimal_eq(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (parse_decimal_parts(a), parse_decimal_parts(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Splits a decimal string into `(sign, integer_digits, fraction_digits)`
/// with leading/trailing zeros normalized, so two differently formatted
/// representations of the same number compare equal.
fn parse_decimal_parts(s: &str) -> Option<(bool, String, String)> {
    let s = s.trim();
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rest, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let int_trimmed = int_part.trim_start_matches('0');
    let frac_trimmed = frac_part.trim_end_matches('0');
    let is_zero = int_trimmed.is_empty() && frac_trimmed.is_empty();
    Some((if is_zero { false } else { neg }, int_trimmed.to_string(), frac_trimmed.to_string()))
}

/// Exact decimal addition (`a + b`), never routed through a binary float.
/// Returns `None` if either operand is not a valid decimal string.
pub fn decimal_add(a: &str, b: &str) -> Option<String> {
    decimal_sum(a, b, false)
}

/// Exact decimal subtraction (`a - b`), never routed through a binary float.
pub fn decimal_sub(a: &str, b: &str) -> Option<String> {
    decimal_sum(a, b, true)
}

fn decimal_sum(a: &str, b: &str, subtract: bool) -> Option<String> {
    let (a_neg, a_int, a_frac) = decimal_components(a)?;
    let (b_neg, b_int, b_frac) = decimal_components(b)?;
    let b_neg = if subtract { !b_neg } else { b_neg };

    let scale = a_frac.len().max(b_frac.len());
    let int_width = a_int.len().max(b_int.len());
    let a_digits = format!("{:0>int_width$}{:0<scale$}", a_int, a_frac);
    let b_digits = format!("{:0>int_width$}{:0<scale$}", b_int, b_frac);

    let (result_neg, result_digits) = if a_neg == b_neg {
        (a_neg, add_magnitude(&a_digits, &b_digits))
    } else {
        match cmp_magnitude(&a_digits, &b_digits) {
            std::cmp::Ordering::Equal => (false, "0".repeat(a_digits.len())),
            std::cmp::Ordering::Greater => (a_neg, sub_magnitude(&a_digits, &b_digits)),
            std::cmp::Ordering::Less => (b_neg, sub_magnitude(&b_digits, &a_digits)),
        }
    };

    Some(format_decimal(result_neg, &result_digits, scale))
}

/// Splits a decimal string into `(sign, integer_digits, fraction_digits)`
/// without trimming -- used for arithmetic, which needs the digit strings
/// padded to a common width rather than normalized for equality.
fn decimal_components(s: &str) -> Option<(bool, String, String)> {
    let s = s.trim();
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rest, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    Some((neg, int_part.to_string(), frac_part.to_string()))
}

/// Schoolbook addition of two equal-length unsigned digit strings.
fn add_magnitude(a: &str, b: &str) -> String {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut result = Vec::with_capacity(a.len() + 1);
    let mut carry = 0u8;
    for i in (0..a.len()).rev() {
        let sum = (a[i] - b'0') + (b[i] - b'0') + carry;
        result.push(b'0' + sum % 10);
        carry = sum / 10;
    }
    if carry > 0 {
        result.push(b'0' + carry);
    }
    result.reverse();
    String::from_utf8(result).expect("digit bytes are valid utf8")
}

/// Schoolbook subtraction `a - b` of two equal-length unsigned digit
/// strings, where `a >= b`.
fn sub_magnitude(a: &str, b: &str) -> String {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut result = vec![0u8; a.len()];
    let mut borrow = 0i8;
    for i in (0..a.len()).rev() {
        let mut diff = (a[i] - b'0') as i8 - (b[i] - b'0') as i8 - borrow;
        if diff < 0 {
            diff += 10;
            borrow = 1;
        } else {
            borrow = 0;
        }
        result[i] = b'0' + diff as u8;
    }
    String::from_utf8(result).expect("digit bytes are valid utf8")
}

/// Compares two equal-length unsigned digit strings; digit-string order
/// equals numeric order when both operands share a width.
fn cmp_magnitude(a: &str, b: &str) -> std::cmp::Ordering {
    a.cmp(b)
}

/// Reassembles a signed digit string of `scale` fractional digits into a
/// canonical decimal literal, trimming the zeros that padding introduced.
fn format_decimal(neg: bool, digits: &str, scale: usize) -> String {
    let split_at = digits.len() - scale;
    let (int_part, frac_part) = digits.split_at(split_at);
    let int_trimmed = int_part.trim_start_matches('0');
    let int_trimmed = if int_trimmed.is_empty() { "0" } else { int_trimmed };
    let frac_trimmed = frac_part.trim_end_matches('0');

    let is_zero = int_trimmed == "0" && frac_trimmed.is_empty();
    let sign = if neg && !is_zero { "-" } else { "" };

    if frac_trimmed.is_empty() {
        format!("{sign}{int_trimmed}")
    } else {
        format!("{sign}{int_trimmed}.{frac_trimmed}")
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue::*;
        match (self, other) {
            (S(a), S(b)) => a == b,
            (N(a), N(b)) => decimal_eq(a, b),
            (B(a), B(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Null, Null) => true,
            (SS(a), SS(b)) => a == b,
            (NS(a), NS(b)) => a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| decimal_eq(x, y))),
            (BS(a), BS(b)) => a == b,
            (L(a), L(b)) => a == b,
            (M(a), M(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_by_decimal_value() {
        assert_eq!(AttributeValue::N("1".into()), AttributeValue::N("1.0".into()));
        assert_eq!(AttributeValue::N("-0".into()), AttributeValue::N("0".into()));
        assert_ne!(AttributeValue::N("1".into()), AttributeValue::N("2".into()));
    }

    #[test]
    fn sets_compare_as_sets() {
        let a = AttributeValue::SS(BTreeSet::from(["x".to_string(), "y".to_string()]));
        let b = AttributeValue::SS(BTreeSet::from(["y".to_string(), "x".to_string()]));
        assert_eq!(a, b);
    }

    #[test]
    fn contains_on_string() {
        let v = AttributeValue::S("hello world".into());
        assert!(v.contains(&AttributeValue::S("world".into())));
        assert!(!v.contains(&AttributeValue::S("xyz".into())));
    }

    #[test]
    fn decimal_add_is_exact_past_f64_precision() {
        assert_eq!(decimal_add("100000000000000001", "1").as_deref(), Some("100000000000000002"));
        assert_eq!(decimal_add("1.5", "2.25").as_deref(), Some("3.75"));
        assert_eq!(decimal_add("-5", "3").as_deref(), Some("-2"));
        assert_eq!(decimal_add("5", "-5").as_deref(), Some("0"));
    }

    #[test]
    fn decimal_sub_is_exact() {
        assert_eq!(decimal_sub("3", "1.5").as_deref(), Some("1.5"));
        assert_eq!(decimal_sub("1", "2").as_deref(), Some("-1"));
        assert_eq!(decimal_sub("100000000000000002", "1").as_deref(), Some("100000000000000001"));
    }

    #[test]
    fn size_is_defined_for_collections_only() {
        assert_eq!(AttributeValue::S("abc".into()).size(), Some(3));
        assert_eq!(AttributeValue::N("123".into()).size(), None);
        assert_eq!(AttributeValue::L(vec![AttributeValue::Bool(true)]).size(), Some(1));
    }
}
