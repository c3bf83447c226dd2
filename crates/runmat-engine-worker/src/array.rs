//! Class-agnostic array plumbing: gather, scatter, resize, concatenation
//! and class conversion over column-major [`MxArray`] blocks.

use runmat_mx::{ElementType, MxArray, NumericData, Payload, SparseData};
use std::borrow::Cow;

use crate::error::{EvalError, EvalResult, CONCAT_MISMATCH};

/// Class of a value as far as concatenation and assignment care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassKind {
    Dense(ElementType),
    Cell,
    Struct(Vec<String>),
}

pub fn class_name(a: &MxArray) -> &'static str {
    match a.payload() {
        Payload::Cell(_) => "cell",
        Payload::Struct { .. } => "struct",
        _ => a.element_type().map_or("double", ElementType::class_name),
    }
}

pub fn class_kind(a: &MxArray) -> ClassKind {
    match a.payload() {
        Payload::Cell(_) => ClassKind::Cell,
        Payload::Struct { fields, .. } => ClassKind::Struct(fields.clone()),
        _ => ClassKind::Dense(a.element_type().unwrap_or(ElementType::Float64)),
    }
}

/// Largest element count one array may hold.
pub const MAX_ELEMENTS: usize = 1 << 31;

/// Element count of `shape`, refused past [`MAX_ELEMENTS`].
pub fn element_limit(shape: &[usize]) -> EvalResult<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .filter(|&n| n <= MAX_ELEMENTS)
        .ok_or_else(EvalError::size_limit)
}

/// `n` copies of `value`; allocation failure is an evaluation error.
pub fn try_filled<T: Clone>(n: usize, value: T) -> EvalResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n).map_err(|_| EvalError::size_limit())?;
    v.resize(n, value);
    Ok(v)
}

/// Drop trailing singleton dimensions beyond the second.
pub fn canonical_shape(shape: &[usize]) -> Vec<usize> {
    let mut shape = shape.to_vec();
    while shape.len() > 2 && shape.last() == Some(&1) {
        shape.pop();
    }
    while shape.len() < 2 {
        shape.push(1);
    }
    shape
}

/// Column-major subscripts of linear index `k`.
pub fn subscripts(mut k: usize, shape: &[usize]) -> Vec<usize> {
    shape
        .iter()
        .map(|&d| {
            let d = d.max(1);
            let s = k % d;
            k /= d;
            s
        })
        .collect()
}

/// Column-major linear index of `subs` in `shape` (missing dims are 0).
pub fn linear(subs: &[usize], shape: &[usize]) -> usize {
    let mut stride = 1;
    let mut k = 0;
    for (i, &d) in shape.iter().enumerate() {
        k += subs.get(i).copied().unwrap_or(0) * stride;
        stride *= d;
    }
    k
}

pub fn is_empty_matrix(a: &MxArray) -> bool {
    a.shape() == [0, 0]
}

pub fn is_vector(shape: &[usize]) -> bool {
    shape.len() == 2 && (shape[0] == 1 || shape[1] == 1)
}

/// Sparse values as a full double array; everything else borrowed.
pub fn dense(a: &MxArray) -> EvalResult<Cow<'_, MxArray>> {
    let Payload::Sparse(sp) = a.payload() else {
        return Ok(Cow::Borrowed(a));
    };
    let len = element_limit(&[sp.nrows, sp.ncols])?;
    let mut real = try_filled(len, 0.0)?;
    let mut imag = match sp.imag {
        Some(_) => Some(try_filled(len, 0.0)?),
        None => None,
    };
    for (r, c, re, im) in sp.entries() {
        real[r + c * sp.nrows] = re;
        if let Some(imag) = imag.as_mut() {
            imag[r + c * sp.nrows] = im;
        }
    }
    let full = MxArray::from_parts(
        vec![sp.nrows, sp.ncols],
        Payload::Numeric {
            real: NumericData::Float64(real),
            imag: imag.map(NumericData::Float64),
        },
    )?;
    Ok(Cow::Owned(full))
}

/// Default-filled array of the same class as `a`.
pub fn blank_like(a: &MxArray, shape: &[usize]) -> EvalResult<MxArray> {
    let shape = canonical_shape(shape);
    Ok(match a.payload() {
        Payload::Numeric { real, imag } => {
            let ty = real.element_type();
            if imag.is_some() {
                MxArray::complex_zeros(ty, &shape)?
            } else {
                MxArray::zeros(ty, &shape)?
            }
        }
        Payload::Logical(_) => MxArray::zeros(ElementType::Logical, &shape)?,
        Payload::Char(_) => MxArray::zeros(ElementType::Char, &shape)?,
        Payload::Cell(_) => MxArray::cell(&shape)?,
        Payload::Struct { fields, .. } => {
            let names: Vec<&str> = fields.iter().map(String::as_str).collect();
            MxArray::structure(&shape, &names)?
        }
        Payload::Sparse(_) => MxArray::zeros(ElementType::Float64, &shape)?,
    })
}

/// Elements `idx` of dense `a`, arranged in `shape`.
pub fn gather(a: &MxArray, idx: &[usize], shape: &[usize]) -> EvalResult<MxArray> {
    let a = dense(a)?;
    let numel = a.numel();
    if let Some(&bad) = idx.iter().find(|&&i| i >= numel) {
        return Err(EvalError::subscript(format!(
            "Index exceeds the number of array elements. Index must not exceed {numel} (was {}).",
            bad + 1
        )));
    }
    let payload = match a.payload() {
        Payload::Numeric { real, imag } => Payload::Numeric {
            real: real.gather(idx),
            imag: imag.as_ref().map(|im| im.gather(idx)),
        },
        Payload::Logical(v) => Payload::Logical(idx.iter().map(|&i| v[i]).collect()),
        Payload::Char(v) => Payload::Char(idx.iter().map(|&i| v[i]).collect()),
        Payload::Cell(v) => Payload::Cell(idx.iter().map(|&i| v[i].clone()).collect()),
        Payload::Struct { fields, values } => {
            let nf = fields.len();
            Payload::Struct {
                fields: fields.clone(),
                values: idx
                    .iter()
                    .flat_map(|&i| values[i * nf..(i + 1) * nf].iter().cloned())
                    .collect(),
            }
        }
        Payload::Sparse(_) => return Err(EvalError::invalid("sparse storage cannot be gathered")),
    };
    Ok(MxArray::from_parts(canonical_shape(shape), payload)?)
}

fn numeric_scatter(
    dst: &mut NumericData,
    dst_idx: &[usize],
    src: &NumericData,
    src_idx: &[usize],
) -> EvalResult<()> {
    macro_rules! pairs {
        ($($variant:ident),*) => {
            match (dst, src) {
                $(
                    (NumericData::$variant(d), NumericData::$variant(s)) => {
                        for (&a, &b) in dst_idx.iter().zip(src_idx) {
                            d[a] = s[b];
                        }
                        Ok(())
                    }
                )*
                (d, s) => Err(EvalError::invalid(format!(
                    "cannot store {} values in a {} array",
                    s.element_type(),
                    d.element_type()
                ))),
            }
        };
    }
    pairs!(Int8, Int16, Int32, Int64, UInt8, UInt16, UInt32, UInt64, Float32, Float64)
}

/// `dst[dst_idx[k]] = src[src_idx[k]]`; both arrays dense and of one class.
pub fn scatter(
    dst: &mut MxArray,
    dst_idx: &[usize],
    src: &MxArray,
    src_idx: &[usize],
) -> EvalResult<()> {
    let src = dense(src)?;
    match (dst.payload_mut(), src.payload()) {
        (
            Payload::Numeric { real: dr, imag: di },
            Payload::Numeric { real: sr, imag: si },
        ) => {
            numeric_scatter(dr, dst_idx, sr, src_idx)?;
            if si.is_some() && di.is_none() {
                *di = Some(NumericData::zeros(dr.element_type(), dr.len())?);
            }
            if let Some(di) = di.as_mut() {
                match si {
                    Some(si) => numeric_scatter(di, dst_idx, si, src_idx)?,
                    None => {
                        let zeros = NumericData::zeros(sr.element_type(), sr.len())?;
                        numeric_scatter(di, dst_idx, &zeros, src_idx)?;
                    }
                }
            }
        }
        (Payload::Logical(d), Payload::Logical(s)) => {
            for (&a, &b) in dst_idx.iter().zip(src_idx) {
                d[a] = s[b];
            }
        }
        (Payload::Char(d), Payload::Char(s)) => {
            for (&a, &b) in dst_idx.iter().zip(src_idx) {
                d[a] = s[b];
            }
        }
        (Payload::Cell(d), Payload::Cell(s)) => {
            for (&a, &b) in dst_idx.iter().zip(src_idx) {
                d[a] = s[b].clone();
            }
        }
        (
            Payload::Struct { fields: df, values: dv },
            Payload::Struct { fields: sf, values: sv },
        ) => {
            if df.len() != sf.len() || !sf.iter().all(|f| df.contains(f)) {
                return Err(EvalError::new(
                    "MATLAB:heterogeneousStrucAssignment",
                    "Subscripted assignment between dissimilar structures.",
                ));
            }
            let nf = df.len();
            for (&a, &b) in dst_idx.iter().zip(src_idx) {
                for (j, name) in sf.iter().enumerate() {
                    if let Some(i) = df.iter().position(|f| f == name) {
                        dv[a * nf + i] = sv[b * nf + j].clone();
                    }
                }
            }
        }
        (d, _) => {
            return Err(EvalError::invalid(format!(
                "cannot assign {} values into {} array",
                class_name(&src),
                payload_class(d)
            )))
        }
    }
    Ok(())
}

fn payload_class(p: &Payload) -> &'static str {
    match p {
        Payload::Numeric { real, .. } => real.element_type().class_name(),
        Payload::Logical(_) => "logical",
        Payload::Char(_) => "char",
        Payload::Cell(_) => "cell",
        Payload::Struct { .. } => "struct",
        Payload::Sparse(_) => "double",
    }
}

/// Grow `a` to `shape` (every dimension at least as large), keeping each
/// element at its subscripts.
pub fn resize(a: &MxArray, shape: &[usize]) -> EvalResult<MxArray> {
    element_limit(shape)?;
    let a = dense(a)?;
    let mut out = blank_like(&a, shape)?;
    let old = a.shape().to_vec();
    let new = out.shape().to_vec();
    let dst: Vec<usize> = (0..a.numel())
        .map(|k| linear(&subscripts(k, &old), &new))
        .collect();
    let src: Vec<usize> = (0..a.numel()).collect();
    scatter(&mut out, &dst, &a, &src)?;
    Ok(out)
}

/// Remove imaginary parts that are entirely zero.
pub fn drop_zero_imag(mut a: MxArray) -> MxArray {
    if let Payload::Numeric { imag, .. } = a.payload_mut() {
        if imag.as_ref().is_some_and(NumericData::is_all_zero) {
            *imag = None;
        }
    }
    a
}

/// Real parts as `f64`.
pub fn real_f64(a: &MxArray) -> EvalResult<Vec<f64>> {
    let a = dense(a)?;
    match a.payload() {
        Payload::Numeric { real, .. } => Ok(real.to_f64_vec()),
        Payload::Logical(v) => Ok(v.iter().map(|&b| f64::from(u8::from(b))).collect()),
        Payload::Char(v) => Ok(v.iter().map(|&c| f64::from(c)).collect()),
        _ => Err(EvalError::new(
            "MATLAB:invalidConversion",
            format!("Conversion to double from {} is not possible.", class_name(&a)),
        )),
    }
}

pub fn imag_f64(a: &MxArray) -> EvalResult<Option<Vec<f64>>> {
    let a = dense(a)?;
    Ok(match a.payload() {
        Payload::Numeric { imag, .. } => imag.as_ref().map(NumericData::to_f64_vec),
        _ => None,
    })
}

pub fn from_f64(shape: &[usize], values: Vec<f64>) -> EvalResult<MxArray> {
    Ok(MxArray::from_parts(
        canonical_shape(shape),
        Payload::Numeric {
            real: NumericData::Float64(values),
            imag: None,
        },
    )?)
}

pub fn from_bools(shape: &[usize], values: Vec<bool>) -> EvalResult<MxArray> {
    Ok(MxArray::from_parts(
        canonical_shape(shape),
        Payload::Logical(values),
    )?)
}

pub fn logical_scalar(value: bool) -> MxArray {
    MxArray::from_parts(vec![1, 1], Payload::Logical(vec![value])).unwrap_or_else(|_| MxArray::empty())
}

/// Numeric array of class `ty` from real (and optional imaginary) parts.
pub fn numeric(
    ty: ElementType,
    shape: &[usize],
    real: &[f64],
    imag: Option<&[f64]>,
) -> EvalResult<MxArray> {
    let payload = match ty {
        ElementType::Logical => Payload::Logical(real.iter().map(|&x| x != 0.0).collect()),
        ElementType::Char => Payload::Char(real.iter().map(|&x| x as u16).collect()),
        _ => Payload::Numeric {
            real: NumericData::from_f64(ty, real)?,
            imag: imag
                .filter(|im| im.iter().any(|&x| x != 0.0))
                .map(|im| NumericData::from_f64(ty, im))
                .transpose()?,
        },
    };
    Ok(MxArray::from_parts(canonical_shape(shape), payload)?)
}

/// Convert dense, cell or struct values to `target`.
pub fn convert(a: &MxArray, target: &ClassKind) -> EvalResult<MxArray> {
    match target {
        ClassKind::Cell => match a.payload() {
            Payload::Cell(_) => Ok(a.clone()),
            _ => Ok(MxArray::from_parts(vec![1, 1], Payload::Cell(vec![a.clone()]))?),
        },
        ClassKind::Struct(fields) => match a.payload() {
            Payload::Struct { fields: own, values } => {
                if own == fields {
                    return Ok(a.clone());
                }
                if own.len() != fields.len() || !fields.iter().all(|f| own.contains(f)) {
                    return Err(EvalError::new(
                        "MATLAB:catenate:structFieldBad",
                        "Concatenation of structures requires the same field names.",
                    ));
                }
                let nf = fields.len();
                let order: Vec<usize> = fields
                    .iter()
                    .filter_map(|f| own.iter().position(|o| o == f))
                    .collect();
                let values = (0..a.numel())
                    .flat_map(|e| order.iter().map(move |&i| e * nf + i))
                    .map(|slot| values[slot].clone())
                    .collect();
                Ok(MxArray::from_parts(
                    a.shape().to_vec(),
                    Payload::Struct {
                        fields: fields.clone(),
                        values,
                    },
                )?)
            }
            _ => Err(EvalError::new(
                "MATLAB:invalidConversion",
                format!("Conversion to struct from {} is not possible.", class_name(a)),
            )),
        },
        ClassKind::Dense(ty) => {
            let d = dense(a)?;
            if d.element_type() == Some(*ty) {
                return Ok(d.into_owned());
            }
            if *ty == ElementType::Logical {
                let re = real_f64(&d)?;
                if re.iter().any(|x| x.is_nan()) {
                    return Err(EvalError::new(
                        "MATLAB:nologicalnan",
                        "NaN's cannot be converted to logicals.",
                    ));
                }
            }
            let re = real_f64(&d)?;
            let im = imag_f64(&d)?;
            numeric(*ty, d.shape(), &re, im.as_deref())
        }
    }
}

/// Class that concatenating `parts` produces.
pub fn common_class(parts: &[MxArray]) -> ClassKind {
    if parts.iter().any(|p| matches!(p.payload(), Payload::Cell(_))) {
        return ClassKind::Cell;
    }
    if let Some(fields) = parts.iter().find_map(|p| match p.payload() {
        Payload::Struct { fields, .. } => Some(fields.clone()),
        _ => None,
    }) {
        return ClassKind::Struct(fields);
    }
    let types: Vec<ElementType> = parts
        .iter()
        .map(|p| p.element_type().unwrap_or(ElementType::Float64))
        .collect();
    let ty = if types.contains(&ElementType::Char) {
        ElementType::Char
    } else if let Some(int) = types.iter().find(|t| t.is_integer()) {
        *int
    } else if types.contains(&ElementType::Float32) {
        ElementType::Float32
    } else if !types.is_empty() && types.iter().all(|t| *t == ElementType::Logical) {
        ElementType::Logical
    } else {
        ElementType::Float64
    };
    ClassKind::Dense(ty)
}

fn concat_mismatch() -> EvalError {
    EvalError::new(
        CONCAT_MISMATCH,
        "Dimensions of arrays being concatenated are not consistent.",
    )
}

/// `[a, b, ...]` (`vertical == false`) or `[a; b; ...]`.
pub fn concat(parts: Vec<MxArray>, vertical: bool) -> EvalResult<MxArray> {
    let class = common_class(&parts);
    let kept: Vec<MxArray> = parts
        .iter()
        .filter(|p| !is_empty_matrix(p))
        .map(|p| convert(p, &class))
        .collect::<EvalResult<_>>()?;
    let Some(first) = kept.first() else {
        // Only [] pieces: keep the class of the first one
        return Ok(match parts.into_iter().next() {
            Some(p) => convert(&p, &class)?,
            None => MxArray::empty(),
        });
    };
    if kept.len() == 1 {
        return Ok(first.clone());
    }
    if kept.iter().any(|p| p.shape().len() > 2) {
        return Err(EvalError::invalid(
            "Concatenation of arrays with more than two dimensions is not supported.",
        ));
    }
    let (rows, cols) = if vertical {
        let cols = first.cols();
        if kept.iter().any(|p| p.cols() != cols) {
            return Err(concat_mismatch());
        }
        (kept.iter().map(MxArray::rows).sum::<usize>(), cols)
    } else {
        let rows = first.rows();
        if kept.iter().any(|p| p.rows() != rows) {
            return Err(concat_mismatch());
        }
        (rows, kept.iter().map(MxArray::cols).sum::<usize>())
    };
    let mut out = blank_like(first, &[rows, cols])?;
    let mut offset = 0;
    for part in &kept {
        let (pr, pc) = (part.rows(), part.cols());
        let dst: Vec<usize> = if vertical {
            (0..pr * pc)
                .map(|k| (offset + k % pr.max(1)) + (k / pr.max(1)) * rows)
                .collect()
        } else {
            (offset * rows..offset * rows + pr * pc).collect()
        };
        let src: Vec<usize> = (0..pr * pc).collect();
        scatter(&mut out, &dst, part, &src)?;
        offset += if vertical { pr } else { pc };
    }
    Ok(drop_zero_imag(out))
}

/// Compressed-column sparse double from `(row, col, re, im)` triplets.
/// Duplicates are summed and zero entries dropped.
pub fn sparse_from_triplets(
    nrows: usize,
    ncols: usize,
    triplets: impl IntoIterator<Item = (usize, usize, f64, f64)>,
    complex: bool,
) -> EvalResult<MxArray> {
    if ncols > MAX_ELEMENTS || nrows.checked_mul(ncols).is_none() {
        return Err(EvalError::size_limit());
    }
    let mut entries: Vec<(usize, usize, f64, f64)> = triplets.into_iter().collect();
    if entries.iter().any(|&(r, c, _, _)| r >= nrows || c >= ncols) {
        return Err(EvalError::subscript("Sparse index exceeds the matrix dimensions."));
    }
    entries.sort_by_key(|&(r, c, _, _)| (c, r));
    let mut merged: Vec<(usize, usize, f64, f64)> = Vec::with_capacity(entries.len());
    for (r, c, re, im) in entries {
        match merged.last_mut() {
            Some(last) if last.0 == r && last.1 == c => {
                last.2 += re;
                last.3 += im;
            }
            _ => merged.push((r, c, re, im)),
        }
    }
    merged.retain(|&(_, _, re, im)| re != 0.0 || im != 0.0);
    let complex = complex && merged.iter().any(|&(_, _, _, im)| im != 0.0);

    let mut col_ptr = vec![0usize; ncols + 1];
    for &(_, c, _, _) in &merged {
        col_ptr[c + 1] += 1;
    }
    for c in 0..ncols {
        col_ptr[c + 1] += col_ptr[c];
    }
    let data = SparseData {
        nrows,
        ncols,
        col_ptr,
        row_idx: merged.iter().map(|e| e.0).collect(),
        real: merged.iter().map(|e| e.2).collect(),
        imag: complex.then(|| merged.iter().map(|e| e.3).collect()),
    };
    Ok(MxArray::from_parts(vec![nrows, ncols], Payload::Sparse(data))?)
}

/// 2-D transpose, conjugating complex values when `conjugate` is set.
pub fn transpose(a: &MxArray, conjugate: bool) -> EvalResult<MxArray> {
    if a.shape().len() > 2 {
        return Err(EvalError::invalid("Transpose on N-D array is not defined."));
    }
    let (r, c) = (a.rows(), a.cols());
    if let Payload::Sparse(sp) = a.payload() {
        let triplets: Vec<(usize, usize, f64, f64)> =
            sp.entries().map(|(i, j, re, im)| (j, i, re, im)).collect();
        return sparse_from_triplets(
            c,
            r,
            triplets
                .into_iter()
                .map(|(i, j, re, im)| (i, j, re, if conjugate { -im } else { im })),
            sp.imag.is_some(),
        );
    }
    // output (i, j) is input (j, i); output is c x r
    let idx: Vec<usize> = (0..r * c)
        .map(|k| {
            let (i, j) = (k % c.max(1), k / c.max(1));
            j + i * r
        })
        .collect();
    let mut out = gather(a, &idx, &[c, r])?;
    if conjugate {
        if let Payload::Numeric { imag: Some(im), .. } = out.payload_mut() {
            let ty = im.element_type();
            let negated: Vec<f64> = im.to_f64_vec().into_iter().map(|x| -x).collect();
            *im = NumericData::from_f64(ty, &negated)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[f64]) -> MxArray {
        from_f64(&[1, values.len()], values.to_vec()).unwrap()
    }

    #[test]
    fn concat_rows_and_columns() {
        let top = concat(vec![row(&[1.0, 2.0]), row(&[3.0])], false).unwrap();
        assert_eq!(top.shape(), &[1, 3]);
        let m = concat(vec![top.clone(), row(&[4.0, 5.0, 6.0])], true).unwrap();
        assert_eq!(m.shape(), &[2, 3]);
        assert_eq!(real_f64(&m).unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert!(concat(vec![top, row(&[1.0])], true).is_err());
    }

    #[test]
    fn concat_promotes_to_char_and_skips_empty() {
        let c = concat(
            vec![MxArray::char_row("ab"), MxArray::empty(), row(&[99.0])],
            false,
        )
        .unwrap();
        assert_eq!(c, MxArray::char_row("abc"));
    }

    #[test]
    fn resize_keeps_subscripts() {
        let m = from_f64(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let grown = resize(&m, &[3, 3]).unwrap();
        assert_eq!(
            real_f64(&grown).unwrap(),
            vec![1.0, 2.0, 0.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn transpose_moves_elements() {
        let m = from_f64(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let t = transpose(&m, true).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(real_f64(&t).unwrap(), vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn gather_checks_bounds() {
        let m = row(&[1.0, 2.0]);
        let err = gather(&m, &[2], &[1, 1]).unwrap_err();
        assert_eq!(err.identifier, "MATLAB:badsubscript");
    }
}
