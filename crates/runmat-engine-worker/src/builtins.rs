//! The builtin function table.
//!
//! Every builtin receives the evaluated arguments and the number of
//! requested outputs (`0` for a bare statement) and returns its outputs.

use std::thread;
use std::time::Duration;

use num_complex::Complex64;
use runmat_mx::{ElementType, MxArray, Payload};

use crate::array::{
    canonical_shape, class_name, convert, dense, element_limit, from_bools, from_f64, imag_f64,
    is_empty_matrix, linear, logical_scalar, numeric, real_f64, sparse_from_triplets, subscripts,
    try_filled, ClassKind,
};
use crate::display;
use crate::error::{EvalError, EvalResult, TOO_MANY_OUTPUTS, UNDEFINED_FUNCTION};
use crate::interp::Interpreter;
use crate::ops;
use crate::parser::UnOp;
use crate::printf;

pub type BuiltinFn = fn(&mut Interpreter, Vec<MxArray>, usize) -> EvalResult<Vec<MxArray>>;

pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic builtins
    pub max_args: Option<usize>,
    pub max_outputs: usize,
    pub implementation: BuiltinFn,
}

const ANY: usize = usize::MAX;

macro_rules! builtin {
    ($name:literal, $min:expr, $max:expr, $out:expr, $f:path) => {
        Builtin {
            name: $name,
            min_args: $min,
            max_args: $max,
            max_outputs: $out,
            implementation: $f,
        }
    };
}

static BUILTINS: &[Builtin] = &[
    // construction
    builtin!("zeros", 0, None, 1, zeros),
    builtin!("ones", 0, None, 1, ones),
    builtin!("eye", 0, None, 1, eye),
    builtin!("cell", 0, None, 1, cell),
    builtin!("struct", 0, None, 1, structure),
    builtin!("meshgrid", 1, Some(2), 2, meshgrid),
    builtin!("sparse", 1, Some(6), 1, sparse),
    builtin!("full", 1, Some(1), 1, full),
    builtin!("pi", 0, Some(0), 1, pi),
    builtin!("eps", 0, Some(0), 1, eps),
    builtin!("Inf", 0, None, 1, inf),
    builtin!("inf", 0, None, 1, inf),
    builtin!("NaN", 0, None, 1, nan),
    builtin!("nan", 0, None, 1, nan),
    builtin!("true", 0, None, 1, true_),
    builtin!("false", 0, None, 1, false_),
    // shape
    builtin!("size", 1, Some(2), ANY, size),
    builtin!("numel", 1, Some(1), 1, numel),
    builtin!("length", 1, Some(1), 1, length),
    builtin!("ndims", 1, Some(1), 1, ndims),
    builtin!("isempty", 1, Some(1), 1, isempty),
    builtin!("isscalar", 1, Some(1), 1, isscalar),
    builtin!("reshape", 2, None, 1, reshape),
    builtin!("transpose", 1, Some(1), 1, transpose),
    builtin!("ctranspose", 1, Some(1), 1, ctranspose),
    builtin!("nnz", 1, Some(1), 1, nnz),
    builtin!("find", 1, Some(1), 3, find),
    // reductions
    builtin!("sum", 1, Some(2), 1, sum),
    builtin!("prod", 1, Some(2), 1, prod),
    builtin!("max", 1, Some(3), 2, max),
    builtin!("min", 1, Some(3), 2, min),
    builtin!("any", 1, Some(2), 1, any),
    builtin!("all", 1, Some(2), 1, all),
    // element-wise math
    builtin!("abs", 1, Some(1), 1, abs),
    builtin!("sqrt", 1, Some(1), 1, sqrt),
    builtin!("exp", 1, Some(1), 1, exp),
    builtin!("log", 1, Some(1), 1, log),
    builtin!("sin", 1, Some(1), 1, sin),
    builtin!("cos", 1, Some(1), 1, cos),
    builtin!("tan", 1, Some(1), 1, tan),
    builtin!("floor", 1, Some(1), 1, floor),
    builtin!("ceil", 1, Some(1), 1, ceil),
    builtin!("round", 1, Some(1), 1, round),
    builtin!("fix", 1, Some(1), 1, fix),
    builtin!("real", 1, Some(1), 1, real),
    builtin!("imag", 1, Some(1), 1, imag),
    builtin!("mod", 2, Some(2), 1, modulo),
    builtin!("rem", 2, Some(2), 1, rem),
    // classes
    builtin!("class", 1, Some(1), 1, class),
    builtin!("double", 1, Some(1), 1, to_double),
    builtin!("single", 1, Some(1), 1, to_single),
    builtin!("int8", 1, Some(1), 1, to_int8),
    builtin!("int16", 1, Some(1), 1, to_int16),
    builtin!("int32", 1, Some(1), 1, to_int32),
    builtin!("int64", 1, Some(1), 1, to_int64),
    builtin!("uint8", 1, Some(1), 1, to_uint8),
    builtin!("uint16", 1, Some(1), 1, to_uint16),
    builtin!("uint32", 1, Some(1), 1, to_uint32),
    builtin!("uint64", 1, Some(1), 1, to_uint64),
    builtin!("logical", 1, Some(1), 1, to_logical),
    builtin!("char", 1, None, 1, to_char),
    builtin!("isnumeric", 1, Some(1), 1, isnumeric),
    builtin!("ischar", 1, Some(1), 1, ischar),
    builtin!("iscell", 1, Some(1), 1, iscell),
    builtin!("isstruct", 1, Some(1), 1, isstruct),
    builtin!("islogical", 1, Some(1), 1, islogical),
    builtin!("issparse", 1, Some(1), 1, issparse),
    builtin!("isreal", 1, Some(1), 1, isreal),
    builtin!("isequal", 2, None, 1, isequal),
    // structs
    builtin!("fieldnames", 1, Some(1), 1, fieldnames),
    builtin!("isfield", 2, Some(2), 1, isfield),
    // text
    builtin!("num2str", 1, Some(2), 1, num2str),
    builtin!("sprintf", 1, None, 1, sprintf),
    builtin!("strcat", 1, None, 1, strcat),
    builtin!("strcmp", 2, Some(2), 1, strcmp),
    builtin!("upper", 1, Some(1), 1, upper),
    builtin!("lower", 1, Some(1), 1, lower),
    // command window and control
    builtin!("disp", 1, Some(1), 0, disp),
    builtin!("display", 1, Some(1), 0, display),
    builtin!("fprintf", 1, None, 1, fprintf),
    builtin!("error", 1, None, 0, error),
    builtin!("deal", 1, None, ANY, deal),
    builtin!("clear", 0, None, 0, clear),
    builtin!("pause", 0, Some(1), 0, pause),
    builtin!("exit", 0, Some(1), 0, exit),
    builtin!("quit", 0, Some(1), 0, exit),
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Check the call shape against the table entry, then run it.
pub fn invoke(
    builtin: &Builtin,
    interp: &mut Interpreter,
    args: Vec<MxArray>,
    nargout: usize,
) -> EvalResult<Vec<MxArray>> {
    if args.len() < builtin.min_args {
        return Err(EvalError::new("MATLAB:minrhs", "Not enough input arguments."));
    }
    if builtin.max_args.is_some_and(|max| args.len() > max) {
        return Err(EvalError::new("MATLAB:TooManyInputs", "Too many input arguments."));
    }
    if nargout > builtin.max_outputs {
        return Err(EvalError::new(TOO_MANY_OUTPUTS, "Too many output arguments."));
    }
    (builtin.implementation)(interp, args, nargout)
}

fn one(value: MxArray) -> EvalResult<Vec<MxArray>> {
    Ok(vec![value])
}

fn undefined_for(name: &str, a: &MxArray) -> EvalError {
    EvalError::new(
        UNDEFINED_FUNCTION,
        format!(
            "Undefined function '{name}' for input arguments of type '{}'.",
            class_name(a)
        ),
    )
}

fn is_text(a: &MxArray) -> bool {
    matches!(a.payload(), Payload::Char(_))
}

fn text_of(a: &MxArray, what: &str) -> EvalResult<String> {
    match a.payload() {
        Payload::Char(units) => Ok(String::from_utf16_lossy(units)),
        _ => Err(EvalError::invalid(format!(
            "{what} must be a character vector."
        ))),
    }
}

fn scalar_of(a: &MxArray, what: &str) -> EvalResult<f64> {
    match real_f64(a)?.as_slice() {
        [v] => Ok(*v),
        _ => Err(EvalError::invalid(format!("{what} must be a scalar."))),
    }
}

fn count_of(a: &MxArray, what: &str) -> EvalResult<usize> {
    let v = scalar_of(a, what)?;
    if v.is_nan() || v.fract() != 0.0 {
        return Err(EvalError::invalid(format!("{what} must be an integer.")));
    }
    Ok(v.max(0.0) as usize)
}

/// Optional dimension argument, zero-based.
fn dim_arg(a: Option<&MxArray>) -> EvalResult<Option<usize>> {
    match a {
        None => Ok(None),
        Some(a) => match count_of(a, "Dimension argument")? {
            0 => Err(EvalError::invalid(
                "Dimension argument must be a positive integer scalar.",
            )),
            d => Ok(Some(d - 1)),
        },
    }
}

/// Size arguments of `zeros`-like constructors plus a trailing class name.
fn dims_and_class(args: &[MxArray], default: ElementType) -> EvalResult<(Vec<usize>, ElementType)> {
    let mut args = args;
    let mut ty = default;
    if let Some((last, rest)) = args.split_last() {
        if is_text(last) {
            let name = text_of(last, "Class name")?;
            ty = ElementType::from_class_name(&name)
                .ok_or_else(|| EvalError::invalid(format!("Unknown class '{name}'.")))?;
            args = rest;
        }
    }
    let dims = match args {
        [] => vec![1, 1],
        [single] if single.numel() == 1 => {
            let n = count_of(single, "Size argument")?;
            vec![n, n]
        }
        [vector] => real_f64(vector)?
            .into_iter()
            .map(|d| d.max(0.0) as usize)
            .collect(),
        many => many
            .iter()
            .map(|d| count_of(d, "Size argument"))
            .collect::<EvalResult<_>>()?,
    };
    element_limit(&dims)?;
    Ok((canonical_shape(&dims), ty))
}

fn filled(args: &[MxArray], default: ElementType, value: f64) -> EvalResult<MxArray> {
    let (dims, ty) = dims_and_class(args, default)?;
    let n: usize = dims.iter().product();
    numeric(ty, &dims, &try_filled(n, value)?, None)
}

fn complex_values(a: &MxArray) -> EvalResult<Vec<Complex64>> {
    let re = real_f64(a)?;
    let im = imag_f64(a)?;
    Ok(match im {
        Some(im) => re.iter().zip(&im).map(|(&r, &i)| Complex64::new(r, i)).collect(),
        None => re.iter().map(|&r| Complex64::new(r, 0.0)).collect(),
    })
}

fn complex_array(ty: ElementType, shape: &[usize], values: &[Complex64]) -> EvalResult<MxArray> {
    let re: Vec<f64> = values.iter().map(|z| z.re).collect();
    let im: Vec<f64> = values.iter().map(|z| z.im).collect();
    numeric(ty, shape, &re, Some(&im))
}

/// Class kept by reductions and rounding: numeric classes stay, logical
/// and char become double.
fn numeric_class(a: &MxArray) -> ElementType {
    match a.element_type() {
        Some(t) if t.is_numeric() => t,
        _ => ElementType::Float64,
    }
}

fn zeros(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let (dims, ty) = dims_and_class(&args, ElementType::Float64)?;
    one(MxArray::zeros(ty, &dims)?)
}

fn ones(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(filled(&args, ElementType::Float64, 1.0)?)
}

fn eye(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let (dims, ty) = dims_and_class(&args, ElementType::Float64)?;
    if dims.len() > 2 {
        return Err(EvalError::invalid("eye supports 2-D sizes only."));
    }
    let (r, c) = (dims[0], dims[1]);
    let values: Vec<f64> = (0..r * c)
        .map(|k| if k % r.max(1) == k / r.max(1) { 1.0 } else { 0.0 })
        .collect();
    one(numeric(ty, &dims, &values, None)?)
}

fn cell(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let (dims, _) = dims_and_class(&args, ElementType::Float64)?;
    one(MxArray::cell(&dims)?)
}

fn structure(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    if args.len() % 2 != 0 {
        return Err(EvalError::invalid(
            "Field and value input arguments must come in pairs.",
        ));
    }
    let mut names = Vec::with_capacity(args.len() / 2);
    let mut shape: Option<Vec<usize>> = None;
    for pair in args.chunks(2) {
        names.push(text_of(&pair[0], "Field name")?);
        if let Payload::Cell(_) = pair[1].payload() {
            if pair[1].numel() != 1 {
                let own = pair[1].shape().to_vec();
                match &shape {
                    Some(s) if *s != own => {
                        return Err(EvalError::invalid(
                            "Array dimensions of cell inputs must match.",
                        ))
                    }
                    _ => shape = Some(own),
                }
            }
        }
    }
    let shape = shape.unwrap_or_else(|| vec![1, 1]);
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut s = MxArray::structure(&shape, &refs)?;
    let numel = s.numel();
    let nf = names.len();
    if let Payload::Struct { values, .. } = s.payload_mut() {
        for (fi, pair) in args.chunks(2).enumerate() {
            for e in 0..numel {
                values[e * nf + fi] = match pair[1].payload() {
                    Payload::Cell(items) if items.len() == 1 => items[0].clone(),
                    Payload::Cell(items) => items[e].clone(),
                    _ => pair[1].clone(),
                };
            }
        }
    }
    one(s)
}

fn meshgrid(_: &mut Interpreter, args: Vec<MxArray>, nargout: usize) -> EvalResult<Vec<MxArray>> {
    let x = real_f64(&args[0])?;
    let y = match args.get(1) {
        Some(y) => real_f64(y)?,
        None => x.clone(),
    };
    let (nx, ny) = (x.len(), y.len());
    element_limit(&[ny, nx])?;
    // X repeats x along rows, Y repeats y along columns; both are ny x nx
    let xx: Vec<f64> = (0..nx * ny).map(|k| x[k / ny.max(1)]).collect();
    let mut out = vec![from_f64(&[ny, nx], xx)?];
    if nargout > 1 {
        let yy: Vec<f64> = (0..nx * ny).map(|k| y[k % ny.max(1)]).collect();
        out.push(from_f64(&[ny, nx], yy)?);
    }
    Ok(out)
}

fn sparse(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    match args.len() {
        1 => {
            let a = &args[0];
            if matches!(a.payload(), Payload::Sparse(_)) {
                return one(a.clone());
            }
            if a.shape().len() > 2 {
                return Err(EvalError::invalid("Sparse matrices must be 2-D."));
            }
            let values = complex_values(a)?;
            let rows = a.rows();
            let triplets = values
                .iter()
                .enumerate()
                .map(|(k, z)| (k % rows.max(1), k / rows.max(1), z.re, z.im));
            one(sparse_from_triplets(rows, a.cols(), triplets, a.is_complex())?)
        }
        2 => {
            let m = count_of(&args[0], "Row count")?;
            let n = count_of(&args[1], "Column count")?;
            one(sparse_from_triplets(m, n, std::iter::empty(), false)?)
        }
        3 | 5 | 6 => {
            let index = |a: &MxArray| -> EvalResult<Vec<usize>> {
                real_f64(a)?
                    .into_iter()
                    .map(|v| {
                        if v >= 1.0 && v.fract() == 0.0 {
                            Ok(v as usize - 1)
                        } else {
                            Err(EvalError::subscript(
                                "Sparse indices must be positive integers.",
                            ))
                        }
                    })
                    .collect()
            };
            let (i, j) = (index(&args[0])?, index(&args[1])?);
            let v = complex_values(&args[2])?;
            let len = i.len().max(j.len()).max(v.len());
            let expands = |n: usize| n == 1 || n == len;
            if !expands(i.len()) || !expands(j.len()) || !expands(v.len()) {
                return Err(EvalError::invalid(
                    "Vectors must be the same length.",
                ));
            }
            let at = |xs: &[usize], k: usize| if xs.len() == 1 { xs[0] } else { xs[k] };
            let (m, n) = if args.len() >= 5 {
                (count_of(&args[3], "Row count")?, count_of(&args[4], "Column count")?)
            } else {
                (
                    i.iter().max().map_or(0, |m| m + 1),
                    j.iter().max().map_or(0, |n| n + 1),
                )
            };
            let triplets = (0..len).map(|k| {
                let z = if v.len() == 1 { v[0] } else { v[k] };
                (at(&i, k), at(&j, k), z.re, z.im)
            });
            one(sparse_from_triplets(m, n, triplets, args[2].is_complex())?)
        }
        _ => Err(EvalError::invalid("Wrong number of arguments to sparse.")),
    }
}

fn full(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(dense(&args[0])?.into_owned())
}

fn pi(_: &mut Interpreter, _: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(MxArray::scalar(std::f64::consts::PI))
}

fn eps(_: &mut Interpreter, _: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(MxArray::scalar(f64::EPSILON))
}

fn inf(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(filled(&args, ElementType::Float64, f64::INFINITY)?)
}

fn nan(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(filled(&args, ElementType::Float64, f64::NAN)?)
}

fn true_(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(filled(&args, ElementType::Logical, 1.0)?)
}

fn false_(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(filled(&args, ElementType::Logical, 0.0)?)
}

fn size(_: &mut Interpreter, args: Vec<MxArray>, nargout: usize) -> EvalResult<Vec<MxArray>> {
    let shape = args[0].shape().to_vec();
    if let Some(d) = dim_arg(args.get(1))? {
        return one(MxArray::scalar(shape.get(d).copied().unwrap_or(1) as f64));
    }
    if nargout <= 1 {
        let dims: Vec<f64> = shape.iter().map(|&d| d as f64).collect();
        return one(from_f64(&[1, dims.len()], dims)?);
    }
    Ok((0..nargout)
        .map(|k| {
            let d = if k + 1 < nargout {
                shape.get(k).copied().unwrap_or(1)
            } else {
                shape.iter().skip(k).product()
            };
            MxArray::scalar(d as f64)
        })
        .collect())
}

fn numel(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(MxArray::scalar(args[0].numel() as f64))
}

fn length(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let shape = args[0].shape();
    let n = if shape.contains(&0) {
        0
    } else {
        shape.iter().copied().max().unwrap_or(0)
    };
    one(MxArray::scalar(n as f64))
}

fn ndims(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(MxArray::scalar(canonical_shape(args[0].shape()).len() as f64))
}

fn isempty(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(logical_scalar(args[0].numel() == 0))
}

fn isscalar(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(logical_scalar(args[0].numel() == 1))
}

fn reshape(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let a = dense(&args[0])?.into_owned();
    let requested: Vec<Option<usize>> = if args.len() == 2 {
        real_f64(&args[1])?
            .into_iter()
            .map(|d| Some(d.max(0.0) as usize))
            .collect()
    } else {
        args[1..]
            .iter()
            .map(|d| {
                if is_empty_matrix(d) {
                    Ok(None)
                } else {
                    count_of(d, "Size argument").map(Some)
                }
            })
            .collect::<EvalResult<_>>()?
    };
    let numel = a.numel();
    let known: usize = requested.iter().flatten().product();
    let dims: Vec<usize> = match requested.iter().filter(|d| d.is_none()).count() {
        0 => requested.iter().flatten().copied().collect(),
        1 if known > 0 && numel % known == 0 => requested
            .iter()
            .map(|d| d.unwrap_or(numel / known))
            .collect(),
        1 => {
            return Err(EvalError::new(
                "MATLAB:getReshapeDims:notDivisible",
                format!("Size must be divisible by {known}."),
            ))
        }
        _ => {
            return Err(EvalError::invalid(
                "Only one size argument can be [] in reshape.",
            ))
        }
    };
    if dims.iter().product::<usize>() != numel {
        return Err(EvalError::new(
            "MATLAB:getReshapeDims:notSameNumel",
            "Number of elements must not change. Use [] as one of the size inputs to automatically calculate the appropriate size for that dimension.",
        ));
    }
    let (_, payload) = a.into_parts();
    one(MxArray::from_parts(canonical_shape(&dims), payload)?)
}

fn transpose(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(ops::unary(UnOp::NonConjugateTranspose, &args[0])?)
}

fn ctranspose(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(ops::unary(UnOp::Transpose, &args[0])?)
}

fn nnz(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let count = match args[0].payload() {
        Payload::Sparse(sp) => sp
            .entries()
            .filter(|&(_, _, re, im)| re != 0.0 || im != 0.0)
            .count(),
        _ => complex_values(&args[0])?
            .iter()
            .filter(|z| **z != Complex64::default())
            .count(),
    };
    one(MxArray::scalar(count as f64))
}

fn find(_: &mut Interpreter, args: Vec<MxArray>, nargout: usize) -> EvalResult<Vec<MxArray>> {
    let a = &args[0];
    let values = complex_values(a)?;
    let hits: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(k, z)| (*z != Complex64::default()).then_some(k))
        .collect();
    let n = hits.len();
    let row = a.shape().len() == 2 && a.rows() == 1;
    let shape = if row { [1, n] } else { [n, 1] };
    if nargout <= 1 {
        let idx = hits.iter().map(|&k| (k + 1) as f64).collect();
        return one(from_f64(&shape, idx)?);
    }
    let rows = a.rows().max(1);
    let mut out = vec![
        from_f64(&shape, hits.iter().map(|&k| (k % rows + 1) as f64).collect())?,
        from_f64(&shape, hits.iter().map(|&k| (k / rows + 1) as f64).collect())?,
    ];
    if nargout > 2 {
        let picked: Vec<Complex64> = hits.iter().map(|&k| values[k]).collect();
        out.push(complex_array(numeric_class(a), &shape, &picked)?);
    }
    Ok(out)
}

/// Output shape and, per output element, the input positions reduced
/// into it.
fn lanes(shape: &[usize], dim: Option<usize>) -> (Vec<usize>, Vec<Vec<usize>>) {
    if dim.is_none() && shape == [0, 0] {
        return (vec![1, 1], vec![Vec::new()]);
    }
    let dim = dim.unwrap_or_else(|| shape.iter().position(|&d| d != 1).unwrap_or(0));
    let numel: usize = shape.iter().product();
    if dim >= shape.len() {
        return (shape.to_vec(), (0..numel).map(|k| vec![k]).collect());
    }
    let len = shape[dim];
    let mut out = shape.to_vec();
    out[dim] = 1;
    let total: usize = out.iter().product();
    let lanes = (0..total)
        .map(|k| {
            let mut subs = subscripts(k, &out);
            (0..len)
                .map(|i| {
                    subs[dim] = i;
                    linear(&subs, shape)
                })
                .collect()
        })
        .collect();
    (out, lanes)
}

fn reduce_complex(
    args: &[MxArray],
    name: &str,
    f: impl Fn(&mut dyn Iterator<Item = Complex64>) -> Complex64,
) -> EvalResult<MxArray> {
    let a = &args[0];
    if matches!(a.payload(), Payload::Cell(_) | Payload::Struct { .. }) {
        return Err(undefined_for(name, a));
    }
    let values = complex_values(a)?;
    let (shape, lanes) = lanes(a.shape(), dim_arg(args.get(1))?);
    let out: Vec<Complex64> = lanes
        .iter()
        .map(|lane| f(&mut lane.iter().map(|&i| values[i])))
        .collect();
    complex_array(numeric_class(a), &shape, &out)
}

fn sum(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(reduce_complex(&args, "sum", |it| it.sum())?)
}

fn prod(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(reduce_complex(&args, "prod", |it| it.product())?)
}

fn extremum(args: Vec<MxArray>, nargout: usize, largest: bool) -> EvalResult<Vec<MxArray>> {
    let name = if largest { "max" } else { "min" };
    let a = &args[0];
    if let Some(b) = args.get(1).filter(|b| !is_empty_matrix(b)) {
        if nargout > 1 {
            return Err(EvalError::new(
                TOO_MANY_OUTPUTS,
                format!("{name} with two matrices to compare and two output arguments is not supported."),
            ));
        }
        return one(ops::elementwise_real(name, a, b, |x, y| {
            if x.is_nan() {
                y
            } else if y.is_nan() || (largest && x >= y) || (!largest && x <= y) {
                x
            } else {
                y
            }
        })?);
    }
    if matches!(a.payload(), Payload::Cell(_) | Payload::Struct { .. }) {
        return Err(undefined_for(name, a));
    }
    if a.numel() == 0 && args.get(2).is_none() {
        return Ok(vec![MxArray::empty(), MxArray::empty()]);
    }
    let values = real_f64(a)?;
    let (shape, lanes) = lanes(a.shape(), dim_arg(args.get(2))?);
    let mut best = Vec::with_capacity(lanes.len());
    let mut index = Vec::with_capacity(lanes.len());
    for lane in &lanes {
        let mut pick: Option<(usize, f64)> = None;
        for (pos, &i) in lane.iter().enumerate() {
            let v = values[i];
            if v.is_nan() {
                continue;
            }
            let better = match pick {
                None => true,
                Some((_, cur)) => (largest && v > cur) || (!largest && v < cur),
            };
            if better {
                pick = Some((pos, v));
            }
        }
        let (pos, v) = pick.unwrap_or((0, f64::NAN));
        best.push(v);
        index.push((pos + 1) as f64);
    }
    let mut out = vec![numeric(numeric_class(a), &shape, &best, None)?];
    if nargout > 1 {
        out.push(from_f64(&shape, index)?);
    }
    Ok(out)
}

fn max(_: &mut Interpreter, args: Vec<MxArray>, nargout: usize) -> EvalResult<Vec<MxArray>> {
    extremum(args, nargout, true)
}

fn min(_: &mut Interpreter, args: Vec<MxArray>, nargout: usize) -> EvalResult<Vec<MxArray>> {
    extremum(args, nargout, false)
}

fn truth_reduce(args: &[MxArray], every: bool) -> EvalResult<MxArray> {
    let a = &args[0];
    let values = complex_values(a)?;
    let (shape, lanes) = lanes(a.shape(), dim_arg(args.get(1))?);
    let out = lanes
        .iter()
        .map(|lane| {
            let mut nonzero = lane.iter().map(|&i| values[i] != Complex64::default());
            if every {
                nonzero.all(|b| b)
            } else {
                nonzero.any(|b| b)
            }
        })
        .collect();
    from_bools(&shape, out)
}

fn any(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(truth_reduce(&args, false)?)
}

fn all(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(truth_reduce(&args, true)?)
}

/// Element-wise math. `leaves_reals` marks real inputs whose result is
/// complex (such as `sqrt(-1)`); `keep_integers` keeps integer classes.
fn map_elements(
    name: &str,
    a: &MxArray,
    keep_integers: bool,
    real: fn(f64) -> f64,
    complex: fn(Complex64) -> Complex64,
    leaves_reals: fn(f64) -> bool,
) -> EvalResult<MxArray> {
    if matches!(a.payload(), Payload::Cell(_) | Payload::Struct { .. }) {
        return Err(undefined_for(name, a));
    }
    let a = dense(a)?;
    let class = match numeric_class(&a) {
        t if t.is_integer() && !keep_integers => ElementType::Float64,
        t => t,
    };
    let re = real_f64(&a)?;
    if !a.is_complex() && !re.iter().any(|&x| leaves_reals(x)) {
        let out: Vec<f64> = re.into_iter().map(real).collect();
        return numeric(class, a.shape(), &out, None);
    }
    let out: Vec<Complex64> = complex_values(&a)?.into_iter().map(complex).collect();
    complex_array(class, a.shape(), &out)
}

fn never(_: f64) -> bool {
    false
}

fn negative(x: f64) -> bool {
    x < 0.0
}

fn abs(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements("abs", &args[0], true, f64::abs, |z| Complex64::new(z.norm(), 0.0), never)?)
}

fn sqrt(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements("sqrt", &args[0], false, f64::sqrt, Complex64::sqrt, negative)?)
}

fn exp(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements("exp", &args[0], false, f64::exp, Complex64::exp, never)?)
}

fn log(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements("log", &args[0], false, f64::ln, Complex64::ln, negative)?)
}

fn sin(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements("sin", &args[0], false, f64::sin, Complex64::sin, never)?)
}

fn cos(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements("cos", &args[0], false, f64::cos, Complex64::cos, never)?)
}

fn tan(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements("tan", &args[0], false, f64::tan, Complex64::tan, never)?)
}

fn floor(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements(
        "floor",
        &args[0],
        true,
        f64::floor,
        |z| Complex64::new(z.re.floor(), z.im.floor()),
        never,
    )?)
}

fn ceil(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements(
        "ceil",
        &args[0],
        true,
        f64::ceil,
        |z| Complex64::new(z.re.ceil(), z.im.ceil()),
        never,
    )?)
}

fn round(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements(
        "round",
        &args[0],
        true,
        f64::round,
        |z| Complex64::new(z.re.round(), z.im.round()),
        never,
    )?)
}

fn fix(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_elements(
        "fix",
        &args[0],
        true,
        f64::trunc,
        |z| Complex64::new(z.re.trunc(), z.im.trunc()),
        never,
    )?)
}

fn real(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let a = dense(&args[0])?;
    one(numeric(numeric_class(&a), a.shape(), &real_f64(&a)?, None)?)
}

fn imag(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let a = dense(&args[0])?;
    let im = imag_f64(&a)?.unwrap_or_else(|| vec![0.0; a.numel()]);
    one(numeric(numeric_class(&a), a.shape(), &im, None)?)
}

fn modulo(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(ops::elementwise_real("mod", &args[0], &args[1], |x, y| {
        if y == 0.0 {
            return x;
        }
        let r = x % y;
        if r != 0.0 && (r < 0.0) != (y < 0.0) {
            r + y
        } else {
            r
        }
    })?)
}

fn rem(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(ops::elementwise_real("rem", &args[0], &args[1], |x, y| {
        if y == 0.0 {
            f64::NAN
        } else {
            x % y
        }
    })?)
}

fn class(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(MxArray::char_row(class_name(&args[0])))
}

macro_rules! class_converter {
    ($($name:ident => $ty:ident),* $(,)?) => {
        $(
            fn $name(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
                one(convert(&args[0], &ClassKind::Dense(ElementType::$ty))?)
            }
        )*
    };
}

class_converter!(
    to_double => Float64,
    to_single => Float32,
    to_int8 => Int8,
    to_int16 => Int16,
    to_int32 => Int32,
    to_int64 => Int64,
    to_uint8 => UInt8,
    to_uint16 => UInt16,
    to_uint32 => UInt32,
    to_uint64 => UInt64,
    to_logical => Logical,
);

/// Rows of text as a char matrix, padded with blanks.
fn char_matrix(rows: &[Vec<u16>]) -> EvalResult<MxArray> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let n = rows.len();
    let mut units = vec![u16::from(b' '); n * width];
    for (r, row) in rows.iter().enumerate() {
        for (c, &u) in row.iter().enumerate() {
            units[r + c * n] = u;
        }
    }
    Ok(MxArray::from_parts(vec![n, width], Payload::Char(units))?)
}

fn to_char(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    if let [single] = args.as_slice() {
        if let Payload::Cell(items) = single.payload() {
            let rows = items
                .iter()
                .map(|item| text_of(item, "Cell element").map(|s| s.encode_utf16().collect()))
                .collect::<EvalResult<Vec<Vec<u16>>>>()?;
            return one(char_matrix(&rows)?);
        }
        return one(convert(single, &ClassKind::Dense(ElementType::Char))?);
    }
    let rows = args
        .iter()
        .map(|a| {
            let c = convert(a, &ClassKind::Dense(ElementType::Char))?;
            match c.payload() {
                Payload::Char(units) if c.rows() <= 1 => Ok(units.clone()),
                _ => Err(EvalError::invalid("char arguments must be rows of text.")),
            }
        })
        .collect::<EvalResult<Vec<_>>>()?;
    one(char_matrix(&rows)?)
}

fn isnumeric(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let numeric = args[0].element_type().is_some_and(ElementType::is_numeric);
    one(logical_scalar(numeric))
}

fn ischar(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(logical_scalar(is_text(&args[0])))
}

fn iscell(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(logical_scalar(matches!(args[0].payload(), Payload::Cell(_))))
}

fn isstruct(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(logical_scalar(matches!(args[0].payload(), Payload::Struct { .. })))
}

fn islogical(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(logical_scalar(matches!(args[0].payload(), Payload::Logical(_))))
}

fn issparse(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(logical_scalar(matches!(args[0].payload(), Payload::Sparse(_))))
}

fn isreal(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(logical_scalar(!args[0].is_complex()))
}

/// Value equality ignoring numeric class, as `isequal` defines it.
fn values_equal(a: &MxArray, b: &MxArray) -> bool {
    if canonical_shape(a.shape()) != canonical_shape(b.shape()) {
        return false;
    }
    match (a.payload(), b.payload()) {
        (Payload::Cell(x), Payload::Cell(y)) => x.iter().zip(y).all(|(p, q)| values_equal(p, q)),
        (
            Payload::Struct { fields: fa, values: va },
            Payload::Struct { fields: fb, values: vb },
        ) => {
            fa.len() == fb.len()
                && fa.iter().enumerate().all(|(ia, name)| {
                    fb.iter().position(|f| f == name).is_some_and(|ib| {
                        (0..a.numel()).all(|e| {
                            values_equal(&va[e * fa.len() + ia], &vb[e * fb.len() + ib])
                        })
                    })
                })
        }
        (Payload::Cell(_) | Payload::Struct { .. }, _)
        | (_, Payload::Cell(_) | Payload::Struct { .. }) => false,
        _ => match (complex_values(a), complex_values(b)) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        },
    }
}

fn isequal(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let first = &args[0];
    one(logical_scalar(args[1..].iter().all(|b| values_equal(first, b))))
}

fn fieldnames(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let Payload::Struct { fields, .. } = args[0].payload() else {
        return Err(undefined_for("fieldnames", &args[0]));
    };
    let names: Vec<MxArray> = fields.iter().map(|f| MxArray::char_row(f)).collect();
    one(MxArray::from_parts(vec![names.len(), 1], Payload::Cell(names))?)
}

fn isfield(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let fields: &[String] = match args[0].payload() {
        Payload::Struct { fields, .. } => fields,
        _ => &[],
    };
    let has = |name: &MxArray| match name.payload() {
        Payload::Char(units) => fields.contains(&String::from_utf16_lossy(units)),
        _ => false,
    };
    match args[1].payload() {
        Payload::Cell(items) => {
            let found = items.iter().map(has).collect();
            one(from_bools(args[1].shape(), found)?)
        }
        _ => one(logical_scalar(has(&args[1]))),
    }
}

fn num_text(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else if !v.is_finite() {
        printf::short_g(v)
    } else {
        let digits = (v.abs().log10().floor().max(0.0) as usize) + 5;
        printf::general(v, digits, false)
    }
}

fn num2str(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let a = &args[0];
    if is_text(a) {
        return one(a.clone());
    }
    if let Some(format) = args.get(1) {
        let text = if is_text(format) {
            printf::format(&text_of(format, "Format")?, &printf::flatten_args(&args[..1])?)?
        } else {
            let precision = count_of(format, "Precision")?;
            real_f64(a)?
                .iter()
                .map(|&v| printf::general(v, precision, false))
                .collect::<Vec<_>>()
                .join("  ")
        };
        return one(MxArray::char_row(&text));
    }
    let values = real_f64(a)?;
    if values.len() == 1 {
        return one(MxArray::char_row(&num_text(values[0])));
    }
    if a.shape().len() > 2 {
        return Err(EvalError::invalid("num2str supports 2-D input only."));
    }
    let (rows, cols) = (a.rows(), a.cols());
    let texts: Vec<String> = values.iter().map(|&v| num_text(v)).collect();
    let width = texts.iter().map(String::len).max().unwrap_or(0);
    let lines: Vec<Vec<u16>> = (0..rows)
        .map(|r| {
            let line: Vec<String> = (0..cols)
                .map(|c| format!("{:>width$}", texts[r + c * rows]))
                .collect();
            line.join("  ").encode_utf16().collect()
        })
        .collect();
    one(char_matrix(&lines)?)
}

fn sprintf(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let format = text_of(&args[0], "Format")?;
    let text = printf::format(&format, &printf::flatten_args(&args[1..])?)?;
    one(MxArray::char_row(&text))
}

fn strcat(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let mut out = String::new();
    for a in &args {
        if matches!(a.payload(), Payload::Cell(_)) {
            return Err(undefined_for("strcat", a));
        }
        let text = text_of(a, "strcat argument")?;
        out.push_str(text.trim_end_matches([' ', '\t', '\n']));
    }
    one(MxArray::char_row(&out))
}

fn text_equal(a: &MxArray, b: &MxArray) -> bool {
    match (a.payload(), b.payload()) {
        (Payload::Char(x), Payload::Char(y)) => {
            x == y && (x.is_empty() || a.shape() == b.shape())
        }
        _ => false,
    }
}

fn strcmp(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let (a, b) = (&args[0], &args[1]);
    match (a.payload(), b.payload()) {
        (Payload::Cell(x), Payload::Cell(y)) => {
            if x.len() != y.len() {
                return Err(EvalError::invalid("Cell arrays must be the same size."));
            }
            let eq = x.iter().zip(y).map(|(p, q)| text_equal(p, q)).collect();
            one(from_bools(a.shape(), eq)?)
        }
        (Payload::Cell(x), _) => {
            let eq = x.iter().map(|p| text_equal(p, b)).collect();
            one(from_bools(a.shape(), eq)?)
        }
        (_, Payload::Cell(y)) => {
            let eq = y.iter().map(|q| text_equal(a, q)).collect();
            one(from_bools(b.shape(), eq)?)
        }
        _ => one(logical_scalar(text_equal(a, b))),
    }
}

fn map_case(a: &MxArray, upper: bool) -> EvalResult<MxArray> {
    match a.payload() {
        Payload::Char(units) => {
            let mapped = units
                .iter()
                .map(|&u| {
                    let Some(c) = char::from_u32(u32::from(u)) else {
                        return u;
                    };
                    let mut changed: Box<dyn Iterator<Item = char>> = if upper {
                        Box::new(c.to_uppercase())
                    } else {
                        Box::new(c.to_lowercase())
                    };
                    match (changed.next(), changed.next()) {
                        (Some(x), None) => u16::try_from(u32::from(x)).unwrap_or(u),
                        _ => u,
                    }
                })
                .collect();
            Ok(MxArray::from_parts(a.shape().to_vec(), Payload::Char(mapped))?)
        }
        Payload::Cell(items) => {
            let mapped = items
                .iter()
                .map(|item| map_case(item, upper))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(MxArray::from_parts(a.shape().to_vec(), Payload::Cell(mapped))?)
        }
        _ => Ok(a.clone()),
    }
}

fn upper(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_case(&args[0], true)?)
}

fn lower(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    one(map_case(&args[0], false)?)
}

fn disp(interp: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let text = display::disp(&args[0]);
    interp.print(&text);
    Ok(Vec::new())
}

fn display(interp: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let text = display::display("ans", &args[0]);
    interp.print(&text);
    Ok(Vec::new())
}

fn fprintf(interp: &mut Interpreter, args: Vec<MxArray>, nargout: usize) -> EvalResult<Vec<MxArray>> {
    // fprintf(1, ...) and fprintf(2, ...) both go to the command window
    let rest = match args.first() {
        Some(fid) if !is_text(fid) && fid.numel() == 1 => &args[1..],
        _ => &args[..],
    };
    let Some((format, values)) = rest.split_first() else {
        return Err(EvalError::new("MATLAB:minrhs", "Not enough input arguments."));
    };
    let text = printf::format(&text_of(format, "Format")?, &printf::flatten_args(values)?)?;
    interp.print(&text);
    if nargout > 0 {
        return one(MxArray::scalar(text.len() as f64));
    }
    Ok(Vec::new())
}

fn looks_like_identifier(s: &str) -> bool {
    s.contains(':')
        && s
            .split(':')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

fn error(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let first = text_of(&args[0], "Error message")?;
    if args.len() == 1 {
        return Err(EvalError::new("", first));
    }
    let (identifier, format, rest) = if looks_like_identifier(&first) {
        (first, text_of(&args[1], "Error message")?, &args[2..])
    } else {
        (String::new(), first, &args[1..])
    };
    let message = printf::format(&format, &printf::flatten_args(rest)?)?;
    Err(EvalError::new(identifier, message))
}

fn deal(_: &mut Interpreter, args: Vec<MxArray>, nargout: usize) -> EvalResult<Vec<MxArray>> {
    let wanted = nargout.max(1);
    if args.len() == 1 {
        return Ok(vec![args[0].clone(); wanted]);
    }
    if args.len() != wanted {
        return Err(EvalError::new(
            "MATLAB:deal:narginchk",
            "The number of outputs should match the number of inputs.",
        ));
    }
    Ok(args)
}

fn clear(interp: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    if args.is_empty() {
        interp.clear_all();
        return Ok(Vec::new());
    }
    for a in &args {
        let name = text_of(a, "Variable name")?;
        match name.as_str() {
            "all" | "variables" | "-all" => interp.clear_all(),
            _ => {
                interp.remove(&name);
            }
        }
    }
    Ok(Vec::new())
}

fn pause(_: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let Some(arg) = args.first() else {
        return Ok(Vec::new());
    };
    let seconds = scalar_of(arg, "Pause duration")?;
    if seconds.is_nan() || seconds < 0.0 {
        return Err(EvalError::invalid(
            "Pause duration must be a non-negative number.",
        ));
    }
    let duration = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
    thread::sleep(duration);
    Ok(Vec::new())
}

fn exit(interp: &mut Interpreter, args: Vec<MxArray>, _: usize) -> EvalResult<Vec<MxArray>> {
    let code = match args.first() {
        Some(a) => scalar_of(a, "Exit status")? as i32,
        None => 0,
    };
    Err(interp.request_exit(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<MxArray>, nargout: usize) -> EvalResult<Vec<MxArray>> {
        let mut interp = Interpreter::new();
        invoke(lookup(name).unwrap(), &mut interp, args, nargout)
    }

    fn row(values: &[f64]) -> MxArray {
        from_f64(&[1, values.len()], values.to_vec()).unwrap()
    }

    #[test]
    fn meshgrid_shapes() {
        let out = call("meshgrid", vec![row(&[1.0, 2.0, 3.0]), row(&[10.0, 20.0])], 2).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].shape(), &[2, 3]);
        assert_eq!(real_f64(&out[0]).unwrap(), vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        assert_eq!(real_f64(&out[1]).unwrap(), vec![10.0, 20.0, 10.0, 20.0, 10.0, 20.0]);
    }

    #[test]
    fn reductions_follow_first_non_singleton_dimension() {
        let m = from_f64(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(real_f64(&call("sum", vec![m.clone()], 1).unwrap()[0]).unwrap(), vec![3.0, 7.0]);
        assert_eq!(
            real_f64(&call("sum", vec![m.clone(), MxArray::scalar(2.0)], 1).unwrap()[0]).unwrap(),
            vec![4.0, 6.0]
        );
        assert_eq!(real_f64(&call("prod", vec![row(&[2.0, 3.0, 4.0])], 1).unwrap()[0]).unwrap(), vec![24.0]);
        assert_eq!(real_f64(&call("sum", vec![MxArray::empty()], 1).unwrap()[0]).unwrap(), vec![0.0]);
        let out = call("max", vec![row(&[3.0, f64::NAN, 7.0, 1.0])], 2).unwrap();
        assert_eq!(real_f64(&out[0]).unwrap(), vec![7.0]);
        assert_eq!(real_f64(&out[1]).unwrap(), vec![3.0]);
    }

    #[test]
    fn sparse_round_trip_keeps_pattern() {
        let s = call(
            "sparse",
            vec![row(&[1.0, 3.0, 1.0]), row(&[1.0, 2.0, 1.0]), row(&[5.0, 0.0, 2.0])],
            1,
        )
        .unwrap()
        .remove(0);
        assert_eq!(s.shape(), &[3, 2]);
        assert_eq!(real_f64(&call("nnz", vec![s.clone()], 1).unwrap()[0]).unwrap(), vec![1.0]);
        let full = call("full", vec![s], 1).unwrap().remove(0);
        assert_eq!(real_f64(&full).unwrap(), vec![7.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn struct_builds_arrays_from_cells() {
        let names = MxArray::from_parts(
            vec![1, 2],
            Payload::Cell(vec![MxArray::char_row("a"), MxArray::char_row("b")]),
        )
        .unwrap();
        let s = call("struct", vec![MxArray::char_row("name"), names, MxArray::char_row("k"), MxArray::scalar(1.0)], 1)
            .unwrap()
            .remove(0);
        assert_eq!(s.shape(), &[1, 2]);
        assert_eq!(s.field(1, "name").unwrap(), &MxArray::char_row("b"));
        assert_eq!(s.field(1, "k").unwrap(), &MxArray::scalar(1.0));
    }

    #[test]
    fn text_functions() {
        let text = call("num2str", vec![MxArray::scalar(std::f64::consts::PI)], 1).unwrap();
        assert_eq!(text[0], MxArray::char_row("3.1416"));
        let joined = call("strcat", vec![MxArray::char_row("ab  "), MxArray::char_row("cd")], 1).unwrap();
        assert_eq!(joined[0], MxArray::char_row("abcd"));
        let up = call("upper", vec![MxArray::char_row("MiXed")], 1).unwrap();
        assert_eq!(up[0], MxArray::char_row("MIXED"));
        let same = call("isequal", vec![MxArray::scalar(1.0), convert(&MxArray::scalar(1.0), &ClassKind::Dense(ElementType::Int8)).unwrap()], 1).unwrap();
        assert_eq!(same[0], logical_scalar(true));
    }

    #[test]
    fn error_carries_identifier_and_formatted_message() {
        let err = call(
            "error",
            vec![MxArray::char_row("pkg:bad"), MxArray::char_row("value %d too large"), MxArray::scalar(7.0)],
            0,
        )
        .unwrap_err();
        assert_eq!(err.identifier, "pkg:bad");
        assert_eq!(err.message, "value 7 too large");
        let plain = call("error", vec![MxArray::char_row("50% done")], 0).unwrap_err();
        assert_eq!(plain.message, "50% done");
    }

    #[test]
    fn arity_is_checked() {
        assert_eq!(call("numel", vec![], 1).unwrap_err().identifier, "MATLAB:minrhs");
        assert_eq!(
            call("disp", vec![MxArray::scalar(1.0)], 1).unwrap_err().identifier,
            TOO_MANY_OUTPUTS
        );
        assert!(lookup("undefinedFn").is_none());
    }
}
