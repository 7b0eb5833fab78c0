//! Runtime values and the operations defined on them.
//!
//! Everything a declaration value can evaluate to lives here: numbers with
//! attached units, rgba colors, strings, lists, and booleans. Operations
//! return `Result<Value, String>` carrying the message only; the evaluator
//! wraps it with the location of the expression it was computing.
//!
//! Numbers keep full `f64` resolution through every intermediate operation.
//! The `precision` option is applied exactly once, in [`format_number`],
//! when a value is stringified into CSS. Rounding earlier would make
//! results depend on the shape of the expression tree rather than its
//! mathematical value.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// CSS color keywords the arithmetic engine understands. Idents outside
/// this table never silently become colors.
static NAMED_COLORS: Lazy<HashMap<&'static str, (u8, u8, u8)>> = Lazy::new(|| {
    HashMap::from([
        ("black", (0x00, 0x00, 0x00)),
        ("silver", (0xc0, 0xc0, 0xc0)),
        ("gray", (0x80, 0x80, 0x80)),
        ("grey", (0x80, 0x80, 0x80)),
        ("white", (0xff, 0xff, 0xff)),
        ("maroon", (0x80, 0x00, 0x00)),
        ("red", (0xff, 0x00, 0x00)),
        ("purple", (0x80, 0x00, 0x80)),
        ("fuchsia", (0xff, 0x00, 0xff)),
        ("magenta", (0xff, 0x00, 0xff)),
        ("green", (0x00, 0x80, 0x00)),
        ("lime", (0x00, 0xff, 0x00)),
        ("olive", (0x80, 0x80, 0x00)),
        ("yellow", (0xff, 0xff, 0x00)),
        ("navy", (0x00, 0x00, 0x80)),
        ("blue", (0x00, 0x00, 0xff)),
        ("teal", (0x00, 0x80, 0x80)),
        ("aqua", (0x00, 0xff, 0xff)),
        ("cyan", (0x00, 0xff, 0xff)),
        ("orange", (0xff, 0xa5, 0x00)),
        ("brown", (0xa5, 0x2a, 0x2a)),
        ("pink", (0xff, 0xc0, 0xcb)),
        ("gold", (0xff, 0xd7, 0x00)),
        ("indigo", (0x4b, 0x00, 0x82)),
        ("violet", (0xee, 0x82, 0xee)),
        ("crimson", (0xdc, 0x14, 0x3c)),
        ("coral", (0xff, 0x7f, 0x50)),
        ("salmon", (0xfa, 0x80, 0x72)),
        ("khaki", (0xf0, 0xe6, 0x8c)),
        ("turquoise", (0x40, 0xe0, 0xd0)),
        ("transparent", (0x00, 0x00, 0x00)),
    ])
});

pub fn named_color(name: &str) -> Option<(u8, u8, u8)> {
    NAMED_COLORS.get(name).copied()
}

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number { value: f64, unit: String },
    Color { r: u8, g: u8, b: u8, a: f64 },
    Str { text: String, quoted: bool },
    List { items: Vec<Value>, comma: bool },
    Bool(bool),
}

impl Value {
    pub fn number(value: f64) -> Self {
        Value::Number {
            value,
            unit: String::new(),
        }
    }

    pub fn unquoted(text: impl Into<String>) -> Self {
        Value::Str {
            text: text.into(),
            quoted: false,
        }
    }

    /// Everything except `false` is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    /// Serialize into CSS text. `precision` caps decimal digits; this is
    /// the single place rounding happens.
    pub fn to_css(&self, precision: u32) -> String {
        match self {
            Value::Number { value, unit } => {
                format!("{}{}", format_number(*value, precision), unit)
            }
            Value::Color { r, g, b, a } => {
                if *a >= 1.0 {
                    format!("#{r:02x}{g:02x}{b:02x}")
                } else {
                    format!("rgba({r}, {g}, {b}, {})", format_number(*a, precision))
                }
            }
            Value::Str { text, quoted } => {
                if *quoted {
                    format!("\"{text}\"")
                } else {
                    text.clone()
                }
            }
            Value::List { items, comma } => {
                let sep = if *comma { ", " } else { " " };
                items
                    .iter()
                    .map(|item| item.to_css(precision))
                    .collect::<Vec<_>>()
                    .join(sep)
            }
            Value::Bool(b) => b.to_string(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Number { .. } => "number",
            Value::Color { .. } => "color",
            Value::Str { .. } => "string",
            Value::List { .. } => "list",
            Value::Bool(_) => "bool",
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value, String> {
        if let Some(((ar, ag, ab, aa), (br, bg, bb, _))) = color_operands(self, rhs) {
            return Ok(color(
                ar as i32 + br as i32,
                ag as i32 + bg as i32,
                ab as i32 + bb as i32,
                aa,
            ));
        }
        match (self, rhs) {
            (
                Value::Number { value: a, unit: ua },
                Value::Number { value: b, unit: ub },
            ) => {
                let unit = combine_units(ua, ub, "add")?;
                Ok(Value::Number {
                    value: a + b,
                    unit,
                })
            }
            (Value::Color { r, g, b, a }, Value::Number { value, unit }) => {
                require_unitless(unit, "add to a color")?;
                let n = *value as i32;
                Ok(color(*r as i32 + n, *g as i32 + n, *b as i32 + n, *a))
            }
            (Value::Str { text, quoted }, other) => Ok(Value::Str {
                text: format!("{text}{}", other.to_css_unquoted()),
                quoted: *quoted,
            }),
            (other, Value::Str { text, quoted }) => Ok(Value::Str {
                text: format!("{}{text}", other.to_css_unquoted()),
                quoted: *quoted,
            }),
            (a, b) => Err(format!("cannot add {} and {}", a.type_name(), b.type_name())),
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, String> {
        if let Some(((ar, ag, ab, aa), (br, bg, bb, _))) = color_operands(self, rhs) {
            return Ok(color(
                ar as i32 - br as i32,
                ag as i32 - bg as i32,
                ab as i32 - bb as i32,
                aa,
            ));
        }
        match (self, rhs) {
            (
                Value::Number { value: a, unit: ua },
                Value::Number { value: b, unit: ub },
            ) => {
                let unit = combine_units(ua, ub, "subtract")?;
                Ok(Value::Number {
                    value: a - b,
                    unit,
                })
            }
            (Value::Color { r, g, b, a }, Value::Number { value, unit }) => {
                require_unitless(unit, "subtract from a color")?;
                let n = *value as i32;
                Ok(color(*r as i32 - n, *g as i32 - n, *b as i32 - n, *a))
            }
            (a, b) => Err(format!(
                "cannot subtract {} from {}",
                b.type_name(),
                a.type_name()
            )),
        }
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, String> {
        match (self, rhs) {
            (
                Value::Number { value: a, unit: ua },
                Value::Number { value: b, unit: ub },
            ) => {
                if !ua.is_empty() && !ub.is_empty() {
                    return Err(format!(
                        "cannot multiply {a}{ua} by {b}{ub}: the result would carry a squared unit"
                    ));
                }
                let unit = if ua.is_empty() { ub } else { ua };
                Ok(Value::Number {
                    value: a * b,
                    unit: unit.clone(),
                })
            }
            (Value::Color { r, g, b, a }, Value::Number { value, unit })
            | (Value::Number { value, unit }, Value::Color { r, g, b, a }) => {
                require_unitless(unit, "multiply a color by")?;
                Ok(color(
                    (*r as f64 * value) as i32,
                    (*g as f64 * value) as i32,
                    (*b as f64 * value) as i32,
                    *a,
                ))
            }
            (a, b) => Err(format!(
                "cannot multiply {} by {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    pub fn div(&self, rhs: &Value) -> Result<Value, String> {
        match (self, rhs) {
            (
                Value::Number { value: a, unit: ua },
                Value::Number { value: b, unit: ub },
            ) => {
                if *b == 0.0 {
                    return Err("division by zero".to_string());
                }
                let unit = if ua == ub {
                    String::new()
                } else if ub.is_empty() {
                    ua.clone()
                } else {
                    return Err(format!("cannot divide units '{ua}' and '{ub}'"));
                };
                Ok(Value::Number {
                    value: a / b,
                    unit,
                })
            }
            (Value::Color { r, g, b, a }, Value::Number { value, unit }) => {
                require_unitless(unit, "divide a color by")?;
                if *value == 0.0 {
                    return Err("division by zero".to_string());
                }
                Ok(color(
                    (*r as f64 / value) as i32,
                    (*g as f64 / value) as i32,
                    (*b as f64 / value) as i32,
                    *a,
                ))
            }
            (a, b) => Err(format!(
                "cannot divide {} by {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    pub fn rem(&self, rhs: &Value) -> Result<Value, String> {
        match (self, rhs) {
            (
                Value::Number { value: a, unit: ua },
                Value::Number { value: b, unit: ub },
            ) => {
                if *b == 0.0 {
                    return Err("modulo by zero".to_string());
                }
                let unit = combine_units(ua, ub, "take the modulo of")?;
                Ok(Value::Number {
                    value: a % b,
                    unit,
                })
            }
            (a, b) => Err(format!(
                "cannot take the modulo of {} and {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    /// Ordering comparison; only defined between compatible numbers.
    pub fn compare(&self, rhs: &Value) -> Result<std::cmp::Ordering, String> {
        match (self, rhs) {
            (
                Value::Number { value: a, unit: ua },
                Value::Number { value: b, unit: ub },
            ) => {
                if ua != ub && !ua.is_empty() && !ub.is_empty() {
                    return Err(format!("cannot compare units '{ua}' and '{ub}'"));
                }
                a.partial_cmp(b)
                    .ok_or_else(|| "cannot compare these numbers".to_string())
            }
            (a, b) => Err(format!(
                "cannot order {} and {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    /// Equality as the stylesheet language sees it: `5px == 5px`,
    /// `"a" == a` is false against quoted, numbers compare by value+unit.
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (
                Value::Number { value: a, unit: ua },
                Value::Number { value: b, unit: ub },
            ) => a == b && ua == ub,
            (a, b) => a == b,
        }
    }

    fn to_css_unquoted(&self) -> String {
        match self {
            Value::Str { text, .. } => text.clone(),
            // String concatenation happens before final precision is known;
            // full default precision keeps it deterministic.
            other => other.to_css(10),
        }
    }
}

/// Clamp channel math back into a color.
fn color(r: i32, g: i32, b: i32, a: f64) -> Value {
    let clamp = |v: i32| v.clamp(0, 255) as u8;
    Value::Color {
        r: clamp(r),
        g: clamp(g),
        b: clamp(b),
        a,
    }
}

/// Extract two rgba operand tuples when color math applies: two colors, a
/// color and a color keyword, or two color keywords.
fn color_operands(a: &Value, b: &Value) -> Option<((u8, u8, u8, f64), (u8, u8, u8, f64))> {
    let as_color = |v: &Value| match v {
        Value::Color { r, g, b, a } => Some((*r, *g, *b, *a)),
        Value::Str { text, quoted: false } => {
            named_color(text).map(|(r, g, b)| (r, g, b, 1.0))
        }
        _ => None,
    };
    match (a, b) {
        (Value::Color { .. }, _) | (_, Value::Color { .. }) => Some((as_color(a)?, as_color(b)?)),
        (Value::Str { quoted: false, text: ta }, Value::Str { quoted: false, text: tb })
            if named_color(ta).is_some() && named_color(tb).is_some() =>
        {
            Some((as_color(a)?, as_color(b)?))
        }
        _ => None,
    }
}

fn combine_units(a: &str, b: &str, verb: &str) -> Result<String, String> {
    if a == b || b.is_empty() {
        Ok(a.to_string())
    } else if a.is_empty() {
        Ok(b.to_string())
    } else {
        Err(format!("cannot {verb} incompatible units '{a}' and '{b}'"))
    }
}

fn require_unitless(unit: &str, verb: &str) -> Result<(), String> {
    if unit.is_empty() {
        Ok(())
    } else {
        Err(format!("cannot {verb} a number with unit '{unit}'"))
    }
}

/// Round to at most `precision` decimal digits and strip trailing zeros.
/// `-0` collapses to `0`.
pub fn format_number(value: f64, precision: u32) -> String {
    let formatted = format!("{:.*}", precision as usize, value);
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(value: f64) -> Value {
        Value::Number {
            value,
            unit: "px".to_string(),
        }
    }

    #[test]
    fn test_number_formatting_trims_zeros() {
        assert_eq!(format_number(10.0, 5), "10");
        assert_eq!(format_number(1.5, 5), "1.5");
        assert_eq!(format_number(1.0 / 3.0, 5), "0.33333");
        assert_eq!(format_number(2.0 / 3.0, 5), "0.66667");
    }

    #[test]
    fn test_precision_zero() {
        assert_eq!(format_number(1.6, 0), "2");
        assert_eq!(format_number(10.0, 0), "10");
    }

    #[test]
    fn test_negative_zero_collapses() {
        assert_eq!(format_number(-0.0001, 2), "0");
    }

    #[test]
    fn test_rounding_happens_once_at_stringification() {
        // (1/3) * 3 is exactly 1.0 in f64; rounding intermediates to 5
        // digits would give 0.99999.
        let third = Value::number(1.0 / 3.0);
        let product = third.mul(&Value::number(3.0)).unwrap();
        assert_eq!(product.to_css(5), "1");
    }

    #[test]
    fn test_add_same_units() {
        assert_eq!(px(4.0).add(&px(6.0)).unwrap(), px(10.0));
    }

    #[test]
    fn test_add_unitless_adopts_unit() {
        assert_eq!(px(4.0).add(&Value::number(6.0)).unwrap(), px(10.0));
        assert_eq!(Value::number(4.0).add(&px(6.0)).unwrap(), px(10.0));
    }

    #[test]
    fn test_add_incompatible_units_fails() {
        let em = Value::Number {
            value: 1.0,
            unit: "em".to_string(),
        };
        let err = px(4.0).add(&em).unwrap_err();
        assert!(err.contains("px"));
        assert!(err.contains("em"));
    }

    #[test]
    fn test_mul_unit_rules() {
        assert_eq!(px(4.0).mul(&Value::number(2.0)).unwrap(), px(8.0));
        assert!(px(4.0).mul(&px(2.0)).is_err());
    }

    #[test]
    fn test_div_cancels_units() {
        assert_eq!(px(10.0).div(&px(4.0)).unwrap(), Value::number(2.5));
        assert_eq!(px(10.0).div(&Value::number(4.0)).unwrap(), px(2.5));
        assert!(px(10.0).div(&Value::number(0.0)).is_err());
    }

    #[test]
    fn test_color_addition_clamps() {
        let a = Value::Color {
            r: 250,
            g: 16,
            b: 0,
            a: 1.0,
        };
        let b = Value::Color {
            r: 16,
            g: 16,
            b: 16,
            a: 1.0,
        };
        assert_eq!(
            a.add(&b).unwrap(),
            Value::Color {
                r: 255,
                g: 32,
                b: 16,
                a: 1.0
            }
        );
    }

    #[test]
    fn test_named_colors_mix() {
        let red = Value::unquoted("red");
        let blue = Value::unquoted("blue");
        assert_eq!(
            red.add(&blue).unwrap(),
            Value::Color {
                r: 255,
                g: 0,
                b: 255,
                a: 1.0
            }
        );
    }

    #[test]
    fn test_string_concatenation() {
        let a = Value::Str {
            text: "foo".to_string(),
            quoted: true,
        };
        let b = Value::unquoted("bar");
        assert_eq!(
            a.add(&b).unwrap(),
            Value::Str {
                text: "foobar".to_string(),
                quoted: true
            }
        );
    }

    #[test]
    fn test_color_css_forms() {
        let opaque = Value::Color {
            r: 255,
            g: 0,
            b: 255,
            a: 1.0,
        };
        assert_eq!(opaque.to_css(5), "#ff00ff");
        let translucent = Value::Color {
            r: 16,
            g: 32,
            b: 48,
            a: 0.5,
        };
        assert_eq!(translucent.to_css(5), "rgba(16, 32, 48, 0.5)");
    }

    #[test]
    fn test_list_css() {
        let list = Value::List {
            items: vec![px(1.0), Value::unquoted("solid"), Value::unquoted("red")],
            comma: false,
        };
        assert_eq!(list.to_css(5), "1px solid red");
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::number(0.0).is_truthy());
        assert!(Value::unquoted("false").is_truthy());
        assert!(!Value::Bool(false).is_truthy());
    }

    #[test]
    fn test_compare() {
        use std::cmp::Ordering;
        assert_eq!(px(1.0).compare(&px(2.0)).unwrap(), Ordering::Less);
        assert_eq!(
            Value::number(3.0).compare(&px(3.0)).unwrap(),
            Ordering::Equal
        );
        let em = Value::Number {
            value: 1.0,
            unit: "em".to_string(),
        };
        assert!(px(1.0).compare(&em).is_err());
    }
}
