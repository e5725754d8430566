//! Rendering of numeric values in [`Session::read_formatted`](crate::session::Session).

use crate::datatypes::Value;

pub trait NumberFormat {
    fn format(&self, value: &Value) -> String;
}

impl<F: Fn(&Value) -> String> NumberFormat for F {
    fn format(&self, value: &Value) -> String {
        self(value)
    }
}

/// `Value`'s own `Display`: `10000.0`, `-12`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Plain;

impl NumberFormat for Plain {
    fn format(&self, value: &Value) -> String {
        value.to_string()
    }
}

/// Digit grouping with locale-specific separators: `10,000.0`, `10.000,0`.
#[derive(Clone, Copy, Debug)]
pub struct Grouped {
    pub thousands: char,
    pub decimal: char,
}

impl Grouped {
    pub const EN: Self = Self { thousands: ',', decimal: '.' };
    pub const DE: Self = Self { thousands: '.', decimal: ',' };

    fn group(&self, digits: &str, out: &mut String) {
        for (i, digit) in digits.chars().enumerate() {
            if i != 0 && (digits.len() - i) % 3 == 0 {
                out.push(self.thousands);
            }
            out.push(digit);
        }
    }
}

impl NumberFormat for Grouped {
    fn format(&self, value: &Value) -> String {
        let plain = match value {
            Value::Integer(_) | Value::Scaled(_) => value.to_string(),
            _ => return value.to_string(),
        };
        if plain.contains(['e', 'E']) || !plain.starts_with(|c: char| c == '-' || c.is_ascii_digit())
        {
            // Exponent notation, NaN and infinities are left alone.
            return plain.replace('.', &self.decimal.to_string());
        }
        let (sign, unsigned) = match plain.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", plain.as_str()),
        };
        let (integral, fraction) = match unsigned.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (unsigned, None),
        };
        let mut out = String::with_capacity(plain.len() + plain.len() / 3 + 1);
        out.push_str(sign);
        self.group(integral, &mut out);
        if let Some(fraction) = fraction {
            out.push(self.decimal);
            out.push_str(fraction);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain() {
        assert_eq!(Plain.format(&Value::Scaled(10000.0)), "10000.0");
        assert_eq!(Plain.format(&Value::Integer(429)), "429");
    }

    #[test]
    fn grouped() {
        assert_eq!(Grouped::EN.format(&Value::Scaled(10000.0)), "10,000.0");
        assert_eq!(Grouped::DE.format(&Value::Scaled(1234567.25)), "1.234.567,25");
        assert_eq!(Grouped::EN.format(&Value::Integer(-1234)), "-1,234");
        assert_eq!(Grouped::EN.format(&Value::Integer(999)), "999");
        assert_eq!(Grouped::EN.format(&Value::Scaled(-0.5)), "-0.5");
        assert_eq!(Grouped::EN.format(&Value::Text("SUN2000".into())), "SUN2000");
    }

    #[test]
    fn closures() {
        let fixed = |v: &Value| format!("{:.2}", v.as_f64().unwrap_or_default());
        assert_eq!(fixed.format(&Value::Scaled(1.5)), "1.50");
    }
}
