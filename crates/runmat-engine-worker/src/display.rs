//! Command-window style rendering of values: `x = ...` after unsuppressed
//! statements and the body printed by `disp`.

use runmat_mx::{MxArray, Payload};

use crate::array::{class_name, imag_f64, real_f64};
use crate::printf::{exponent, short_g};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Style {
    Integer,
    Fixed,
    Scientific,
}

fn style_for(values: &[f64]) -> Style {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let max = finite.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if finite.iter().all(|v| v.fract() == 0.0) && max < 1e10 {
        Style::Integer
    } else if max >= 1e5 || (max > 0.0 && max < 1e-3) {
        Style::Scientific
    } else {
        Style::Fixed
    }
}

fn format_with(style: Style, v: f64) -> String {
    if v.is_nan() {
        return "NaN".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf".into() } else { "-Inf".into() };
    }
    match style {
        Style::Integer => format!("{}", if v == 0.0 { 0 } else { v as i64 }),
        Style::Fixed => format!("{v:.4}"),
        Style::Scientific => {
            let s = exponent(v.abs(), 4, false);
            if v < 0.0 {
                format!("-{s}")
            } else {
                s
            }
        }
    }
}

fn column_width(style: Style, w: usize) -> usize {
    match style {
        Style::Integer => (w + 3).max(6),
        Style::Fixed => w + 4,
        Style::Scientific => w + 3,
    }
}

fn dims(shape: &[usize]) -> String {
    shape
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join("x")
}

fn quoted(units: &[u16]) -> String {
    format!("'{}'", String::from_utf16_lossy(units).replace('\'', "''"))
}

/// Formatted cells of one 2-D page, row by row.
fn numeric_cells(re: &[f64], im: Option<&[f64]>, rows: usize, cols: usize) -> Vec<Vec<String>> {
    let style = style_for(re);
    let im_style = im.map(style_for);
    (0..rows)
        .map(|r| {
            (0..cols)
                .map(|c| {
                    let k = r + c * rows;
                    let real = format_with(style, re[k]);
                    match (im, im_style) {
                        (Some(im), Some(s)) => {
                            let sign = if im[k] < 0.0 { '-' } else { '+' };
                            format!("{real} {sign} {}i", format_with(s, im[k].abs()))
                        }
                        _ => real,
                    }
                })
                .collect()
        })
        .collect()
}

fn render_grid(cells: &[Vec<String>], style: Style) -> String {
    let w = cells.iter().flatten().map(|s| s.chars().count()).max().unwrap_or(0);
    let width = column_width(style, w);
    let mut out = String::new();
    for row in cells {
        for cell in row {
            out.push_str(&format!("{cell:>width$}"));
        }
        out.push('\n');
    }
    out
}

fn numeric_body(a: &MxArray) -> String {
    let (Ok(re), Ok(im)) = (real_f64(a), imag_f64(a)) else {
        return String::new();
    };
    let shape = a.shape();
    let (rows, cols) = (shape[0], shape[1]);
    let page = rows * cols;
    let pages = if page == 0 { 0 } else { re.len() / page };
    let style = style_for(&re);
    let mut out = String::new();
    for p in 0..pages {
        if pages > 1 {
            let mut idx = Vec::new();
            let mut rest = p;
            for &d in &shape[2..] {
                idx.push((rest % d + 1).to_string());
                rest /= d;
            }
            out.push_str(&format!("(:,:,{}) =\n\n", idx.join(",")));
        }
        let range = p * page..(p + 1) * page;
        let cells = numeric_cells(&re[range.clone()], im.as_ref().map(|im| &im[range]), rows, cols);
        out.push_str(&render_grid(&cells, style));
        if pages > 1 && p + 1 < pages {
            out.push('\n');
        }
    }
    out
}

fn char_body(units: &[u16], rows: usize, cols: usize, indent: &str, quote: bool) -> String {
    let mut out = String::new();
    for r in 0..rows {
        let row: Vec<u16> = (0..cols).map(|c| units[r + c * rows]).collect();
        let text = if quote {
            quoted(&row)
        } else {
            String::from_utf16_lossy(&row)
        };
        out.push_str(&format!("{indent}{text}\n"));
    }
    out
}

/// Short form used inside cell and struct listings.
fn brief(a: &MxArray) -> String {
    match a.payload() {
        Payload::Char(units) if a.rows() <= 1 => quoted(units),
        Payload::Numeric { .. } | Payload::Logical(_) if a.numel() == 1 => {
            let re = real_f64(a).unwrap_or_default();
            let im = imag_f64(a).unwrap_or_default();
            match (re.first(), im.as_ref().and_then(|v| v.first())) {
                (Some(&r), Some(&i)) => {
                    let sign = if i < 0.0 { '-' } else { '+' };
                    format!("{} {sign} {}i", short_g(r), short_g(i.abs()))
                }
                (Some(&r), None) => short_g(r),
                _ => String::new(),
            }
        }
        Payload::Numeric { .. } | Payload::Logical(_) if a.shape() == [0, 0] => "[]".into(),
        Payload::Numeric { .. } | Payload::Logical(_)
            if a.rows() == 1 && a.shape().len() == 2 && a.cols() <= 10 =>
        {
            let re = real_f64(a).unwrap_or_default();
            format!(
                "[{}]",
                re.iter().map(|&v| short_g(v)).collect::<Vec<_>>().join(" ")
            )
        }
        _ => format!("[{} {}]", dims(a.shape()), class_name(a)),
    }
}

fn cell_entry(a: &MxArray) -> String {
    match a.payload() {
        Payload::Char(_) if a.rows() <= 1 => format!("{{{}}}", brief(a)),
        Payload::Numeric { .. } | Payload::Logical(_) if a.numel() == 1 => {
            format!("{{[{}]}}", brief(a))
        }
        _ => format!("{{{} {}}}", dims(a.shape()), class_name(a)),
    }
}

fn body(a: &MxArray, for_disp: bool) -> String {
    let shape = a.shape();
    match a.payload() {
        Payload::Cell(items) => {
            if items.is_empty() {
                return "  {}\n".to_string();
            }
            let mut out = if for_disp {
                String::new()
            } else {
                format!("  {} cell array\n\n", dims(shape))
            };
            let (rows, cols) = (a.rows(), a.cols());
            let cells: Vec<Vec<String>> = (0..rows)
                .map(|r| (0..cols).map(|c| cell_entry(&items[r + c * rows])).collect())
                .collect();
            let w = cells.iter().flatten().map(|s| s.chars().count()).max().unwrap_or(0);
            for row in cells {
                out.push_str("   ");
                for cell in row {
                    out.push_str(&format!(" {cell:<w$}"));
                }
                out.truncate(out.trim_end().len());
                out.push('\n');
            }
            out
        }
        Payload::Struct { fields, values } => {
            if a.numel() == 1 {
                let mut out = if for_disp {
                    String::new()
                } else {
                    "  struct with fields:\n\n".to_string()
                };
                let w = fields.iter().map(String::len).max().unwrap_or(0);
                for (name, value) in fields.iter().zip(values) {
                    out.push_str(&format!("    {name:>w$}: {}\n", brief(value)));
                }
                out
            } else {
                let mut out = format!("  {} struct array with fields:\n\n", dims(shape));
                for name in fields {
                    out.push_str(&format!("    {name}\n"));
                }
                out
            }
        }
        Payload::Sparse(sp) => {
            let entries: Vec<_> = sp.entries().collect();
            if entries.is_empty() {
                return format!("   All zero sparse: {}\n", dims(shape));
            }
            let re: Vec<f64> = entries.iter().map(|e| e.2).collect();
            let style = style_for(&re);
            let labels: Vec<String> = entries
                .iter()
                .map(|(r, c, _, _)| format!("({},{})", r + 1, c + 1))
                .collect();
            let lw = labels.iter().map(String::len).max().unwrap_or(0);
            let mut out = String::new();
            for (label, (_, _, re, im)) in labels.iter().zip(&entries) {
                let mut value = format_with(style, *re);
                if sp.imag.is_some() {
                    let sign = if *im < 0.0 { '-' } else { '+' };
                    value = format!("{value} {sign} {}i", format_with(style, im.abs()));
                }
                out.push_str(&format!("   {label:>lw$}{value:>w$}\n", w = column_width(style, value.len())));
            }
            out
        }
        Payload::Char(units) => {
            if a.numel() == 0 {
                return if for_disp {
                    String::new()
                } else {
                    format!("  {} empty char array\n", dims(shape))
                };
            }
            if shape.len() > 2 {
                return format!("  {} char array\n", dims(shape));
            }
            if for_disp {
                char_body(units, a.rows(), a.cols(), "", false)
            } else {
                char_body(units, a.rows(), a.cols(), "    ", true)
            }
        }
        Payload::Numeric { .. } | Payload::Logical(_) => {
            if shape == [0, 0] {
                return if for_disp { String::new() } else { "     []\n".into() };
            }
            if a.numel() == 0 {
                return format!("  {} empty {} array\n", dims(shape), class_name(a));
            }
            numeric_body(a)
        }
    }
}

/// `name = ...` as shown after an unsuppressed statement.
pub fn display(name: &str, a: &MxArray) -> String {
    format!("{name} =\n\n{}\n", body(a, false))
}

/// What `disp(a)` prints.
pub fn disp(a: &MxArray) -> String {
    body(a, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::from_f64;

    #[test]
    fn scalars_and_matrices() {
        assert_eq!(display("x", &MxArray::scalar(5.0)), "x =\n\n     5\n\n");
        let m = from_f64(&[2, 2], vec![1.0, 3.0, 2.0, 4.0]).unwrap();
        assert_eq!(display("m", &m), "m =\n\n     1     2\n     3     4\n\n");
        assert_eq!(display("y", &MxArray::scalar(1.5)), "y =\n\n    1.5000\n\n");
        assert_eq!(display("e", &MxArray::empty()), "e =\n\n     []\n\n");
    }

    #[test]
    fn char_and_disp() {
        let s = MxArray::char_row("it's");
        assert_eq!(display("s", &s), "s =\n\n    'it''s'\n\n");
        assert_eq!(disp(&s), "it's\n");
        assert_eq!(disp(&MxArray::scalar(42.0)), "    42\n");
    }

    #[test]
    fn containers() {
        let mut s = MxArray::structure(&[1, 1], &["a", "name"]).unwrap();
        if let Payload::Struct { values, .. } = s.payload_mut() {
            values[0] = MxArray::scalar(1.0);
            values[1] = MxArray::char_row("x");
        }
        assert_eq!(
            display("s", &s),
            "s =\n\n  struct with fields:\n\n       a: 1\n    name: 'x'\n\n"
        );
        let c = MxArray::from_parts(
            vec![1, 2],
            Payload::Cell(vec![MxArray::scalar(1.0), MxArray::char_row("ab")]),
        )
        .unwrap();
        assert_eq!(
            display("c", &c),
            "c =\n\n  1x2 cell array\n\n    {[1]}  {'ab'}\n\n"
        );
    }
}
