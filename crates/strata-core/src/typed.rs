//! Conversion between stored strings and typed values.

/// A type that can be read from and written to a config value.
pub trait ConfigValueType: Sized {
    /// `None` when the text cannot be interpreted as `Self`.
    fn parse_config(raw: &str) -> Option<Self>;
    fn format_config(&self) -> String;
}

impl ConfigValueType for String {
    fn parse_config(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn format_config(&self) -> String {
        self.clone()
    }
}

impl ConfigValueType for bool {
    fn parse_config(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if ["true", "yes", "on", "1"].iter().any(|t| raw.eq_ignore_ascii_case(t)) {
            Some(true)
        } else if ["false", "no", "off", "0"].iter().any(|t| raw.eq_ignore_ascii_case(t)) {
            Some(false)
        } else {
            None
        }
    }

    fn format_config(&self) -> String {
        let text = if *self { "True" } else { "False" };
        text.to_string()
    }
}

/// Longest leading substring that looks like a number, so `"42 ; note"` reads as 42.
fn numeric_prefix(raw: &str, allow_fraction: bool) -> &str {
    let raw = raw.trim_start();
    let bytes = raw.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {}
            b'.' if allow_fraction && !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if allow_fraction && !seen_exp && end > 0 => {
                seen_exp = true;
                if matches!(bytes.get(end + 1), Some(b'+' | b'-')) {
                    end += 1;
                }
            }
            _ => break,
        }
        end += 1;
    }
    &raw[..end]
}

macro_rules! integer_config_type {
    ($($ty:ty),*) => {$(
        impl ConfigValueType for $ty {
            fn parse_config(raw: &str) -> Option<Self> {
                numeric_prefix(raw, false).parse().ok()
            }

            fn format_config(&self) -> String {
                self.to_string()
            }
        }
    )*};
}

macro_rules! float_config_type {
    ($($ty:ty),*) => {$(
        impl ConfigValueType for $ty {
            fn parse_config(raw: &str) -> Option<Self> {
                let prefix = numeric_prefix(raw, true);
                prefix
                    .parse()
                    .ok()
                    .or_else(|| prefix.trim_end_matches(['e', 'E', '+', '-']).parse().ok())
            }

            fn format_config(&self) -> String {
                self.to_string()
            }
        }
    )*};
}

integer_config_type!(i32, i64, u32, u64);
float_config_type!(f32, f64);
