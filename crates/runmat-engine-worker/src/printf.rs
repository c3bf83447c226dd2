//! `sprintf`-style formatting shared by `sprintf`, `fprintf`, `error` and
//! `num2str`.

use std::iter::Peekable;
use std::str::Chars;

use runmat_mx::{MxArray, Payload};

use crate::array::{class_name, real_f64};
use crate::error::{EvalError, EvalResult};

/// One formatting argument after flattening.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatArg {
    Num(f64),
    Text(String),
}

/// Flatten values column-major: char arrays are one text argument, numeric
/// and logical arrays one argument per element.
pub fn flatten_args(values: &[MxArray]) -> EvalResult<Vec<FormatArg>> {
    let mut out = Vec::new();
    for v in values {
        match v.payload() {
            Payload::Char(units) => out.push(FormatArg::Text(String::from_utf16_lossy(units))),
            Payload::Cell(_) | Payload::Struct { .. } => {
                return Err(EvalError::invalid(format!(
                    "Formatting of {} values is not supported.",
                    class_name(v)
                )))
            }
            _ => out.extend(real_f64(v)?.into_iter().map(FormatArg::Num)),
        }
    }
    Ok(out)
}

struct ArgCursor<'a> {
    args: &'a [FormatArg],
    index: usize,
}

impl ArgCursor<'_> {
    fn next(&mut self) -> Option<&FormatArg> {
        let arg = self.args.get(self.index);
        if arg.is_some() {
            self.index += 1;
        }
        arg
    }

    fn remaining(&self) -> usize {
        self.args.len().saturating_sub(self.index)
    }
}

#[derive(Clone, Copy, Default)]
struct Flags {
    zero_pad: bool,
    left_align: bool,
    sign_plus: bool,
    sign_space: bool,
}

struct Spec {
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

/// Expand `\n`, `\t`, `\\` and friends.
pub fn decode_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\u{7}'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Apply `fmt` to `args`, recycling the format while arguments remain.
pub fn format(fmt: &str, args: &[FormatArg]) -> EvalResult<String> {
    let fmt = decode_escapes(fmt);
    let mut cursor = ArgCursor { args, index: 0 };
    let mut out = String::new();
    loop {
        let before = cursor.index;
        let consumed_any = format_once(&fmt, &mut cursor, &mut out)?;
        if cursor.remaining() == 0 || !consumed_any || cursor.index == before {
            break;
        }
    }
    Ok(out)
}

/// One pass over the format. Returns whether it contains any conversion.
fn format_once(fmt: &str, cursor: &mut ArgCursor<'_>, out: &mut String) -> EvalResult<bool> {
    let mut chars = fmt.chars().peekable();
    let mut has_conversion = false;
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let spec = parse_spec(&mut chars)?;
        has_conversion = true;
        let start_index = cursor.index;
        match cursor.next() {
            Some(arg) => out.push_str(&apply(&spec, arg)),
            // Out of arguments after the first pass: stop at this conversion
            None if start_index > 0 => break,
            None => {}
        }
    }
    Ok(has_conversion)
}

fn parse_number(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    let mut value: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    value
}

fn parse_spec(chars: &mut Peekable<Chars<'_>>) -> EvalResult<Spec> {
    let mut flags = Flags::default();
    loop {
        match chars.peek() {
            Some('0') => flags.zero_pad = true,
            Some('-') => flags.left_align = true,
            Some('+') => flags.sign_plus = true,
            Some(' ') => flags.sign_space = true,
            Some('#') => {}
            _ => break,
        }
        chars.next();
    }
    let width = parse_number(chars);
    let precision = if chars.peek() == Some(&'.') {
        chars.next();
        Some(parse_number(chars).unwrap_or(0))
    } else {
        None
    };
    while matches!(chars.peek(), Some('l' | 'h')) {
        chars.next();
    }
    let conversion = chars
        .next()
        .ok_or_else(|| EvalError::invalid("Incomplete format specifier."))?;
    if !"diufeEgGsScxXo".contains(conversion) {
        return Err(EvalError::invalid(format!(
            "Unsupported format conversion '%{conversion}'."
        )));
    }
    Ok(Spec {
        flags,
        width,
        precision,
        conversion,
    })
}

fn apply(spec: &Spec, arg: &FormatArg) -> String {
    let body = match (spec.conversion, arg) {
        ('s' | 'S', FormatArg::Text(s)) => truncate(s, spec.precision),
        ('s' | 'S', FormatArg::Num(v)) => {
            if v.fract() == 0.0 && v.is_finite() {
                format!("{}", *v as i64)
            } else {
                short_g(*v)
            }
        }
        ('c', FormatArg::Num(v)) => char::from_u32(*v as u32).map(String::from).unwrap_or_default(),
        ('c', FormatArg::Text(s)) => s.clone(),
        // text under a numeric conversion prints as text
        (_, FormatArg::Text(s)) => s.clone(),
        (conv, FormatArg::Num(v)) => return numeric(spec, conv, *v),
    };
    pad(body, spec.width, spec.flags, false)
}

fn truncate(s: &str, precision: Option<usize>) -> String {
    match precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    }
}

fn numeric(spec: &Spec, conv: char, v: f64) -> String {
    if !v.is_finite() {
        let text = if v.is_nan() {
            "NaN"
        } else if v > 0.0 {
            "Inf"
        } else {
            "-Inf"
        };
        return pad(with_sign(text.to_string(), v, spec.flags), spec.width, spec.flags, false);
    }
    let integral = v.fract() == 0.0;
    let body = match conv {
        'd' | 'i' | 'u' if integral => format!("{}", v.abs() as i128),
        // Non-integers under %d print like %e
        'd' | 'i' | 'u' => exponent(v.abs(), spec.precision.unwrap_or(6), false),
        'x' if integral => format!("{:x}", v.abs() as u128),
        'X' if integral => format!("{:X}", v.abs() as u128),
        'o' if integral => format!("{:o}", v.abs() as u128),
        'f' => format!("{:.*}", spec.precision.unwrap_or(6), v.abs()),
        'e' | 'E' => exponent(v.abs(), spec.precision.unwrap_or(6), conv == 'E'),
        'g' | 'G' => general(v.abs(), spec.precision.unwrap_or(6), conv == 'G'),
        _ => exponent(v.abs(), spec.precision.unwrap_or(6), false),
    };
    let signed = with_sign(body, v, spec.flags);
    pad(signed, spec.width, spec.flags, true)
}

fn with_sign(body: String, v: f64, flags: Flags) -> String {
    if v.is_sign_negative() && v != 0.0 && !body.starts_with('-') {
        format!("-{body}")
    } else if flags.sign_plus && !body.starts_with('-') {
        format!("+{body}")
    } else if flags.sign_space && !body.starts_with('-') {
        format!(" {body}")
    } else {
        body
    }
}

fn pad(body: String, width: Option<usize>, flags: Flags, numeric: bool) -> String {
    let len = body.chars().count();
    let Some(width) = width.filter(|w| *w > len) else {
        return body;
    };
    let fill = width - len;
    if flags.left_align {
        format!("{body}{}", " ".repeat(fill))
    } else if flags.zero_pad && numeric {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (c.to_string(), body[1..].to_string()),
            _ => (String::new(), body),
        };
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

/// C-style `%e`: at least two exponent digits with an explicit sign.
pub fn exponent(v: f64, precision: usize, upper: bool) -> String {
    let s = format!("{:.*e}", precision, v);
    let (mantissa, exp) = s.split_once('e').unwrap_or((&s, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{:02}", exp.abs())
}

fn trim_fraction(mut s: String) -> String {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

/// C-style `%g`.
pub fn general(v: f64, precision: usize, upper: bool) -> String {
    let p = precision.max(1);
    if v == 0.0 {
        return "0".to_string();
    }
    let exp = v.abs().log10().floor() as i32;
    if exp < -4 || exp >= p as i32 {
        let s = exponent(v, p - 1, upper);
        let e = if upper { 'E' } else { 'e' };
        match s.split_once(e) {
            Some((mantissa, rest)) => format!("{}{e}{rest}", trim_fraction(mantissa.to_string())),
            None => s,
        }
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        trim_fraction(format!("{:.*}", decimals, v))
    }
}

/// Compact rendering used by `num2str` and `%s` of non-integers.
pub fn short_g(v: f64) -> String {
    if v.is_nan() {
        return "NaN".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf".into() } else { "-Inf".into() };
    }
    let body = general(v.abs(), 5, false);
    if v < 0.0 {
        format!("-{body}")
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<FormatArg> {
        values.iter().copied().map(FormatArg::Num).collect()
    }

    #[test]
    fn integers_floats_and_widths() {
        assert_eq!(format("%d apples", &nums(&[3.0])).unwrap(), "3 apples");
        assert_eq!(format("%5.2f|", &nums(&[3.14159])).unwrap(), " 3.14|");
        assert_eq!(format("%-4d|%04d", &nums(&[7.0, 42.0])).unwrap(), "7   |0042");
        assert_eq!(format("%e", &nums(&[12345.678])).unwrap(), "1.234568e+04");
        assert_eq!(format("%g %g", &nums(&[0.0001, 1e7])).unwrap(), "0.0001 1e+07");
    }

    #[test]
    fn format_recycles_over_arguments() {
        assert_eq!(
            format("%d,", &nums(&[1.0, 2.0, 3.0])).unwrap(),
            "1,2,3,"
        );
        assert_eq!(format("%d and %d\\n", &nums(&[1.0])).unwrap(), "1 and ");
        assert_eq!(format("done\\n", &[]).unwrap(), "done\n");
    }

    #[test]
    fn text_and_escapes() {
        let args = vec![FormatArg::Text("world".into())];
        assert_eq!(format("hello %s\\t!", &args).unwrap(), "hello world\t!");
        assert_eq!(format("100%%", &[]).unwrap(), "100%");
        assert_eq!(format("%d", &nums(&[1.5])).unwrap(), "1.500000e+00");
    }

    #[test]
    fn short_g_trims() {
        assert_eq!(short_g(3.0), "3");
        assert_eq!(short_g(3.14159265), "3.1416");
        assert_eq!(short_g(-0.5), "-0.5");
        assert_eq!(short_g(123456.0), "1.2346e+05");
    }
}
