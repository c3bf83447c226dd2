//! Operators: element-wise arithmetic with implicit expansion, matrix
//! products, comparisons, logical operators and ranges.
//!
//! Sparse operands take part as full matrices; results are full.

use num_complex::Complex64;
use runmat_mx::{ElementType, MxArray, Payload};

use crate::array::{
    class_name, element_limit, from_bools, imag_f64, linear, numeric, real_f64, subscripts,
    transpose, try_filled, MAX_ELEMENTS,
};
use crate::error::{EvalError, EvalResult, DIMENSION_MISMATCH, UNDEFINED_FUNCTION};
use crate::parser::{BinOp, UnOp};

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Pow => "^",
        BinOp::ElemMul => ".*",
        BinOp::ElemDiv => "./",
        BinOp::ElemPow => ".^",
        BinOp::Equal => "==",
        BinOp::NotEqual => "~=",
        BinOp::Less => "<",
        BinOp::LessEqual => "<=",
        BinOp::Greater => ">",
        BinOp::GreaterEqual => ">=",
        BinOp::And => "&",
        BinOp::Or => "|",
        BinOp::AndAnd => "&&",
        BinOp::OrOr => "||",
    }
}

fn undefined_operator(op: &str, class: &str) -> EvalError {
    EvalError::new(
        UNDEFINED_FUNCTION,
        format!("Undefined operator '{op}' for input arguments of type '{class}'."),
    )
}

/// Numeric view of one operand.
struct Operand {
    re: Vec<f64>,
    im: Option<Vec<f64>>,
    shape: Vec<usize>,
    class: ElementType,
}

impl Operand {
    fn new(a: &MxArray, op: &str) -> EvalResult<Self> {
        if matches!(a.payload(), Payload::Cell(_) | Payload::Struct { .. }) {
            return Err(undefined_operator(op, class_name(a)));
        }
        Ok(Operand {
            re: real_f64(a)?,
            im: imag_f64(a)?,
            shape: a.shape().to_vec(),
            class: a.element_type().unwrap_or(ElementType::Float64),
        })
    }

    fn is_scalar(&self) -> bool {
        self.re.len() == 1
    }

    fn at(&self, i: usize) -> Complex64 {
        Complex64::new(self.re[i], self.im.as_ref().map_or(0.0, |im| im[i]))
    }
}

fn result_class(a: ElementType, b: ElementType) -> EvalResult<ElementType> {
    match (a.is_integer(), b.is_integer()) {
        (true, true) if a != b => Err(EvalError::new(
            "MATLAB:mixedClasses",
            "Integers can only be combined with integers of the same class, or scalar doubles.",
        )),
        (true, _) => Ok(a),
        (_, true) => Ok(b),
        _ if a == ElementType::Float32 || b == ElementType::Float32 => Ok(ElementType::Float32),
        _ => Ok(ElementType::Float64),
    }
}

/// Implicit expansion: each dimension must match or be 1.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> EvalResult<Vec<usize>> {
    let rank = a.len().max(b.len());
    let out = (0..rank)
        .map(|d| {
            let (x, y) = (a.get(d).copied().unwrap_or(1), b.get(d).copied().unwrap_or(1));
            match (x, y) {
                _ if x == y => Ok(x),
                (1, _) => Ok(y),
                (_, 1) => Ok(x),
                _ => Err(EvalError::new(
                    DIMENSION_MISMATCH,
                    "Arrays have incompatible sizes for this operation.",
                )),
            }
        })
        .collect::<EvalResult<Vec<usize>>>()?;
    element_limit(&out)?;
    Ok(out)
}

/// For each element of `out`, the linear index of the `src` element that
/// expands onto it.
fn source_indices(out: &[usize], src: &[usize]) -> Vec<usize> {
    let n: usize = out.iter().product();
    if out == src {
        return (0..n).collect();
    }
    if src.iter().product::<usize>() == 1 {
        return vec![0; n];
    }
    (0..n)
        .map(|k| {
            let subs: Vec<usize> = subscripts(k, out)
                .into_iter()
                .enumerate()
                .map(|(d, s)| if src.get(d).copied().unwrap_or(1) == 1 { 0 } else { s })
                .collect();
            linear(&subs, src)
        })
        .collect()
}

fn real_op(op: BinOp, x: f64, y: f64) -> f64 {
    match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::ElemMul | BinOp::Mul => x * y,
        BinOp::ElemDiv | BinOp::Div => x / y,
        _ => x.powf(y),
    }
}

fn complex_op(op: BinOp, x: Complex64, y: Complex64) -> Complex64 {
    match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::ElemMul | BinOp::Mul => x * y,
        BinOp::ElemDiv | BinOp::Div => x / y,
        _ => {
            if y.im == 0.0 && y.re.fract() == 0.0 && y.re.abs() <= i32::MAX as f64 {
                x.powi(y.re as i32)
            } else {
                x.powc(y)
            }
        }
    }
}

fn arithmetic(op: BinOp, a: &MxArray, b: &MxArray) -> EvalResult<MxArray> {
    let sym = symbol(op);
    let (x, y) = (Operand::new(a, sym)?, Operand::new(b, sym)?);
    let class = result_class(x.class, y.class)?;
    let shape = broadcast_shape(&x.shape, &y.shape)?;
    let ia = source_indices(&shape, &x.shape);
    let ib = source_indices(&shape, &y.shape);
    let pairs = || ia.iter().copied().zip(ib.iter().copied());
    let complex = x.im.is_some()
        || y.im.is_some()
        || (op == BinOp::ElemPow && pairs().any(|(i, j)| x.re[i] < 0.0 && y.re[j].fract() != 0.0));
    if complex {
        let (re, im): (Vec<f64>, Vec<f64>) = pairs()
            .map(|(i, j)| {
                let z = complex_op(op, x.at(i), y.at(j));
                (z.re, z.im)
            })
            .unzip();
        numeric(class, &shape, &re, Some(&im))
    } else {
        let re: Vec<f64> = pairs().map(|(i, j)| real_op(op, x.re[i], y.re[j])).collect();
        numeric(class, &shape, &re, None)
    }
}

fn matmul(a: &MxArray, b: &MxArray) -> EvalResult<MxArray> {
    let (x, y) = (Operand::new(a, "*")?, Operand::new(b, "*")?);
    if x.is_scalar() || y.is_scalar() {
        return arithmetic(BinOp::ElemMul, a, b);
    }
    if x.shape.len() > 2 || y.shape.len() > 2 {
        return Err(EvalError::invalid(
            "Arguments must be 2-D, or at least one argument must be scalar.",
        ));
    }
    let (m, k, n) = (x.shape[0], x.shape[1], y.shape[1]);
    if k != y.shape[0] {
        return Err(EvalError::new(
            "MATLAB:innerdim",
            "Inner matrix dimensions must agree.",
        ));
    }
    let class = result_class(x.class, y.class)?;
    if x.im.is_some() || y.im.is_some() {
        let mut re = vec![0.0; m * n];
        let mut im = vec![0.0; m * n];
        for j in 0..n {
            for i in 0..m {
                let z: Complex64 = (0..k).map(|p| x.at(i + p * m) * y.at(p + j * k)).sum();
                re[i + j * m] = z.re;
                im[i + j * m] = z.im;
            }
        }
        numeric(class, &[m, n], &re, Some(&im))
    } else {
        let mut re = vec![0.0; m * n];
        for j in 0..n {
            for p in 0..k {
                let bpj = y.re[p + j * k];
                for i in 0..m {
                    re[i + j * m] += x.re[i + p * m] * bpj;
                }
            }
        }
        numeric(class, &[m, n], &re, None)
    }
}

fn matrix_power(a: &MxArray, b: &MxArray) -> EvalResult<MxArray> {
    let (x, y) = (Operand::new(a, "^")?, Operand::new(b, "^")?);
    if x.is_scalar() && y.is_scalar() {
        return arithmetic(BinOp::ElemPow, a, b);
    }
    let square = x.shape.len() == 2 && x.shape[0] == x.shape[1];
    let exponent = y.re.first().copied().unwrap_or(f64::NAN);
    if !square || !y.is_scalar() || exponent < 0.0 || exponent.fract() != 0.0 {
        return Err(EvalError::invalid(
            "Matrix power requires a square matrix and a non-negative integer exponent; use .^ for element-wise power.",
        ));
    }
    let n = x.shape[0];
    let identity: Vec<f64> = (0..n * n).map(|k| if k % (n + 1) == 0 { 1.0 } else { 0.0 }).collect();
    let mut result = numeric(ElementType::Float64, &[n, n], &identity, None)?;
    for _ in 0..exponent as u64 {
        result = matmul(&result, a)?;
    }
    Ok(result)
}

fn compare(op: BinOp, a: &MxArray, b: &MxArray) -> EvalResult<MxArray> {
    let sym = symbol(op);
    let (x, y) = (Operand::new(a, sym)?, Operand::new(b, sym)?);
    let shape = broadcast_shape(&x.shape, &y.shape)?;
    let ia = source_indices(&shape, &x.shape);
    let ib = source_indices(&shape, &y.shape);
    let values = ia
        .iter()
        .zip(&ib)
        .map(|(&i, &j)| match op {
            BinOp::Equal => x.at(i) == y.at(j),
            BinOp::NotEqual => x.at(i) != y.at(j),
            BinOp::Less => x.re[i] < y.re[j],
            BinOp::LessEqual => x.re[i] <= y.re[j],
            BinOp::Greater => x.re[i] > y.re[j],
            _ => x.re[i] >= y.re[j],
        })
        .collect();
    from_bools(&shape, values)
}

fn logical_op(op: BinOp, a: &MxArray, b: &MxArray) -> EvalResult<MxArray> {
    let sym = symbol(op);
    let (x, y) = (Operand::new(a, sym)?, Operand::new(b, sym)?);
    let shape = broadcast_shape(&x.shape, &y.shape)?;
    let ia = source_indices(&shape, &x.shape);
    let ib = source_indices(&shape, &y.shape);
    let values = ia
        .iter()
        .zip(&ib)
        .map(|(&i, &j)| {
            let (p, q) = (x.at(i) != Complex64::default(), y.at(j) != Complex64::default());
            if op == BinOp::And {
                p && q
            } else {
                p || q
            }
        })
        .collect();
    from_bools(&shape, values)
}

/// Real element-wise `f` with implicit expansion, for functions such as
/// `mod` and two-argument `max`.
pub fn elementwise_real(
    name: &str,
    a: &MxArray,
    b: &MxArray,
    f: impl Fn(f64, f64) -> f64,
) -> EvalResult<MxArray> {
    let (x, y) = (Operand::new(a, name)?, Operand::new(b, name)?);
    let class = result_class(x.class, y.class)?;
    let shape = broadcast_shape(&x.shape, &y.shape)?;
    let ia = source_indices(&shape, &x.shape);
    let ib = source_indices(&shape, &y.shape);
    let re: Vec<f64> = ia.iter().zip(&ib).map(|(&i, &j)| f(x.re[i], y.re[j])).collect();
    numeric(class, &shape, &re, None)
}

/// Value of a condition or short-circuit operand.
pub fn to_logical_scalar(a: &MxArray, context: &str) -> EvalResult<bool> {
    let x = Operand::new(a, context)?;
    if !x.is_scalar() {
        return Err(EvalError::new(
            "MATLAB:nonLogicalConditional",
            format!(
                "Operands to the {context} operator must be convertible to logical scalar values."
            ),
        ));
    }
    Ok(x.at(0) != Complex64::default())
}

pub fn binary(op: BinOp, a: &MxArray, b: &MxArray) -> EvalResult<MxArray> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::ElemMul | BinOp::ElemDiv | BinOp::ElemPow => {
            arithmetic(op, a, b)
        }
        BinOp::Mul => matmul(a, b),
        BinOp::Div => {
            if b.numel() == 1 {
                arithmetic(BinOp::ElemDiv, a, b)
            } else {
                Err(EvalError::invalid(
                    "Matrix right division needs a scalar divisor; use ./ for element-wise division.",
                ))
            }
        }
        BinOp::Pow => matrix_power(a, b),
        BinOp::Equal
        | BinOp::NotEqual
        | BinOp::Less
        | BinOp::LessEqual
        | BinOp::Greater
        | BinOp::GreaterEqual => compare(op, a, b),
        BinOp::And | BinOp::Or => logical_op(op, a, b),
        BinOp::AndAnd => Ok(crate::array::logical_scalar(
            to_logical_scalar(a, "&&")? && to_logical_scalar(b, "&&")?,
        )),
        BinOp::OrOr => Ok(crate::array::logical_scalar(
            to_logical_scalar(a, "||")? || to_logical_scalar(b, "||")?,
        )),
    }
}

pub fn unary(op: UnOp, a: &MxArray) -> EvalResult<MxArray> {
    match op {
        UnOp::Transpose => transpose(a, true),
        UnOp::NonConjugateTranspose => transpose(a, false),
        UnOp::Not => {
            let x = Operand::new(a, "~")?;
            let values = (0..x.re.len()).map(|i| x.at(i) == Complex64::default()).collect();
            from_bools(&x.shape, values)
        }
        UnOp::Plus | UnOp::Minus => {
            let x = Operand::new(a, if op == UnOp::Plus { "+" } else { "-" })?;
            let class = if x.class.is_numeric() {
                x.class
            } else {
                ElementType::Float64
            };
            let sign = if op == UnOp::Minus { -1.0 } else { 1.0 };
            let re: Vec<f64> = x.re.iter().map(|v| sign * v).collect();
            let im: Option<Vec<f64>> = x.im.map(|im| im.iter().map(|v| sign * v).collect());
            numeric(class, &x.shape, &re, im.as_deref())
        }
    }
}

/// `start:stop` or `start:step:stop` as a row vector.
pub fn range(start: &MxArray, step: Option<&MxArray>, stop: &MxArray) -> EvalResult<MxArray> {
    let first = |a: &MxArray| -> EvalResult<Option<f64>> {
        Ok(Operand::new(a, ":")?.re.first().copied())
    };
    let (Some(lo), Some(hi)) = (first(start)?, first(stop)?) else {
        return numeric(ElementType::Float64, &[1, 0], &[], None);
    };
    let by = match step {
        Some(s) => match first(s)? {
            Some(v) => v,
            None => return numeric(ElementType::Float64, &[1, 0], &[], None),
        },
        None => 1.0,
    };
    let span = (hi - lo) / by;
    let values: Vec<f64> = if by == 0.0 || !span.is_finite() || span < 0.0 {
        Vec::new()
    } else {
        // tolerate rounding in steps such as 0:0.1:1
        let count = (span + span.abs() * 1e-12 + 1e-12).floor() + 1.0;
        if count > MAX_ELEMENTS as f64 {
            return Err(EvalError::size_limit());
        }
        let mut values = try_filled(count as usize, 0.0)?;
        for (i, v) in values.iter_mut().enumerate() {
            *v = lo + i as f64 * by;
        }
        values
    };
    let class = if step.is_none()
        && start.element_type() == Some(ElementType::Char)
        && stop.element_type() == Some(ElementType::Char)
    {
        ElementType::Char
    } else {
        ElementType::Float64
    };
    numeric(class, &[1, values.len()], &values, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::from_f64;

    fn m(shape: &[usize], values: &[f64]) -> MxArray {
        from_f64(shape, values.to_vec()).unwrap()
    }

    #[test]
    fn implicit_expansion() {
        let col = m(&[2, 1], &[1.0, 2.0]);
        let row = m(&[1, 3], &[10.0, 20.0, 30.0]);
        let sum = binary(BinOp::Add, &col, &row).unwrap();
        assert_eq!(sum.shape(), &[2, 3]);
        assert_eq!(
            real_f64(&sum).unwrap(),
            vec![11.0, 12.0, 21.0, 22.0, 31.0, 32.0]
        );
        let bad = binary(BinOp::Add, &m(&[1, 2], &[1.0, 2.0]), &row).unwrap_err();
        assert_eq!(bad.identifier, DIMENSION_MISMATCH);
    }

    #[test]
    fn matrix_product_and_inner_dimensions() {
        let a = m(&[2, 2], &[1.0, 3.0, 2.0, 4.0]);
        let b = m(&[2, 1], &[1.0, 1.0]);
        assert_eq!(real_f64(&binary(BinOp::Mul, &a, &b).unwrap()).unwrap(), vec![3.0, 7.0]);
        assert_eq!(
            binary(BinOp::Mul, &b, &b).unwrap_err().identifier,
            "MATLAB:innerdim"
        );
        let sq = binary(BinOp::Pow, &a, &MxArray::scalar(2.0)).unwrap();
        assert_eq!(real_f64(&sq).unwrap(), vec![7.0, 15.0, 10.0, 22.0]);
    }

    #[test]
    fn integer_arithmetic_saturates() {
        let a = numeric(ElementType::Int8, &[1, 1], &[100.0], None).unwrap();
        let r = binary(BinOp::Add, &a, &a).unwrap();
        assert_eq!(r.element_type(), Some(ElementType::Int8));
        assert_eq!(real_f64(&r).unwrap(), vec![127.0]);
        let b = numeric(ElementType::Int16, &[1, 1], &[1.0], None).unwrap();
        assert!(binary(BinOp::Add, &a, &b).is_err());
    }

    #[test]
    fn negative_base_fractional_power_is_complex() {
        let r = binary(BinOp::ElemPow, &MxArray::scalar(-4.0), &MxArray::scalar(0.5)).unwrap();
        assert!(r.is_complex());
        let im = imag_f64(&r).unwrap().unwrap();
        assert!((im[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn ranges() {
        assert_eq!(
            real_f64(&range(&MxArray::scalar(1.0), None, &MxArray::scalar(4.0)).unwrap()).unwrap(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
        let tenths = range(
            &MxArray::scalar(0.0),
            Some(&MxArray::scalar(0.1)),
            &MxArray::scalar(1.0),
        )
        .unwrap();
        assert_eq!(tenths.shape(), &[1, 11]);
        let empty = range(&MxArray::scalar(3.0), None, &MxArray::scalar(1.0)).unwrap();
        assert_eq!(empty.shape(), &[1, 0]);
    }

    #[test]
    fn comparisons_yield_logical() {
        let r = binary(
            BinOp::Less,
            &m(&[1, 3], &[1.0, 5.0, 3.0]),
            &MxArray::scalar(3.0),
        )
        .unwrap();
        assert_eq!(r.element_type(), Some(ElementType::Logical));
        assert_eq!(real_f64(&r).unwrap(), vec![1.0, 0.0, 0.0]);
        let cell = MxArray::cell(&[1, 1]).unwrap();
        assert_eq!(
            binary(BinOp::Add, &cell, &cell).unwrap_err().identifier,
            UNDEFINED_FUNCTION
        );
    }
}
