//! Tree-walking evaluator: owns the workspace and runs parsed programs.

use std::collections::BTreeMap;

use log::debug;
use runmat_mx::{is_valid_identifier, ElementType, MxArray, Payload};

use crate::array::{
    blank_like, class_kind, class_name, concat, convert, drop_zero_imag, element_limit, gather,
    is_empty_matrix, is_vector, linear, real_f64, resize, scatter, subscripts, ClassKind,
};
use crate::builtins;
use crate::display::display;
use crate::error::{EvalError, EvalResult, BAD_SUBSCRIPT, TOO_MANY_OUTPUTS};
use crate::ops;
use crate::parser::{parse, BinOp, Expr, Stmt, Subscript};

/// Identifier of the error that unwinds a program after `exit`/`quit`.
pub const EXIT_REQUESTED: &str = "RunMat:exit";

/// One evaluated subscript, zero-based.
#[derive(Debug, Clone)]
struct IndexList {
    positions: Vec<usize>,
    /// Shape of the index value, used to orient linear-index results
    shape: Vec<usize>,
    colon: bool,
    logical: bool,
}

/// Right-hand side of an indexed assignment.
enum Rhs {
    Value(MxArray),
    /// `x(i) = []`
    Delete,
}

impl Rhs {
    fn into_value(self) -> MxArray {
        match self {
            Rhs::Value(v) => v,
            Rhs::Delete => MxArray::empty(),
        }
    }
}

/// Size `end` stands for in subscript `k` of `n`.
fn end_value(shape: &[usize], k: usize, n: usize) -> usize {
    if n == 1 {
        shape.iter().product()
    } else if k + 1 < n {
        shape.get(k).copied().unwrap_or(1)
    } else {
        shape.iter().skip(k).product()
    }
}

fn index_list(value: &MxArray) -> EvalResult<IndexList> {
    match value.payload() {
        Payload::Logical(mask) => {
            let positions: Vec<usize> = mask
                .iter()
                .enumerate()
                .filter_map(|(i, &b)| b.then_some(i))
                .collect();
            let n = positions.len();
            let row = value.shape().len() == 2 && value.rows() == 1;
            Ok(IndexList {
                positions,
                shape: if row { vec![1, n] } else { vec![n, 1] },
                colon: false,
                logical: true,
            })
        }
        Payload::Cell(_) | Payload::Struct { .. } => Err(EvalError::subscript(format!(
            "Subscript indices of class {} are not supported.",
            class_name(value)
        ))),
        _ => {
            let positions = real_f64(value)?
                .into_iter()
                .map(|v| {
                    if v >= 1.0 && v.fract() == 0.0 && v.is_finite() {
                        Ok(v as usize - 1)
                    } else {
                        Err(EvalError::subscript(
                            "Array indices must be positive integers or logical values.",
                        ))
                    }
                })
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(IndexList {
                positions,
                shape: value.shape().to_vec(),
                colon: false,
                logical: false,
            })
        }
    }
}

/// Linear positions selected by `lists` in an array of `shape`, and the
/// shape of the selection.
fn selection(shape: &[usize], lists: &[IndexList]) -> EvalResult<(Vec<usize>, Vec<usize>)> {
    if let [list] = lists {
        let n = list.positions.len();
        let base_is_row = shape.len() == 2 && shape[0] == 1;
        let out = if list.colon {
            vec![n, 1]
        } else if list.logical
            || (is_vector(shape) && shape.iter().product::<usize>() != 1 && is_vector(&list.shape))
        {
            if base_is_row {
                vec![1, n]
            } else {
                vec![n, 1]
            }
        } else {
            list.shape.clone()
        };
        return Ok((list.positions.clone(), out));
    }
    let n = lists.len();
    let dims: Vec<usize> = (0..n).map(|k| end_value(shape, k, n)).collect();
    for (k, list) in lists.iter().enumerate() {
        if list.positions.iter().any(|&p| p >= dims[k]) {
            return Err(EvalError::subscript(format!(
                "Index in position {} exceeds array bounds. Index must not exceed {}.",
                k + 1,
                dims[k]
            )));
        }
    }
    let out: Vec<usize> = lists.iter().map(|l| l.positions.len()).collect();
    element_limit(&out)?;
    Ok((cartesian(lists, &out, &dims), out))
}

fn cartesian(lists: &[IndexList], out: &[usize], dims: &[usize]) -> Vec<usize> {
    let total: usize = out.iter().product();
    (0..total)
        .map(|k| {
            let picked: Vec<usize> = subscripts(k, out)
                .iter()
                .enumerate()
                .map(|(d, &i)| lists[d].positions[i])
                .collect();
            linear(&picked, dims)
        })
        .collect()
}

/// Class an indexed assignment leaves behind.
fn assigned_class(target: ElementType, value: ElementType) -> ElementType {
    match (target, value) {
        (t, v) if t == v => t,
        (ElementType::Logical, v) => v,
        (ElementType::Float64, v) if v.is_integer() || v == ElementType::Float32 => v,
        (t, _) => t,
    }
}

fn invalid_conversion(to: &str, from: &str) -> EvalError {
    EvalError::new(
        "MATLAB:invalidConversion",
        format!("Conversion to {to} from {from} is not possible."),
    )
}

/// Struct `s` with every name of `names` present, appending missing fields.
fn with_fields(s: MxArray, names: &[String]) -> EvalResult<MxArray> {
    let (shape, payload) = s.into_parts();
    let Payload::Struct { mut fields, values } = payload else {
        return Err(EvalError::invalid("expected a struct"));
    };
    let old = fields.len();
    for name in names {
        if !fields.contains(name) {
            fields.push(name.clone());
        }
    }
    if fields.len() == old {
        return Ok(MxArray::from_parts(shape, Payload::Struct { fields, values })?);
    }
    let numel: usize = shape.iter().product();
    let mut grown = Vec::with_capacity(numel * fields.len());
    for e in 0..numel {
        grown.extend(values[e * old..(e + 1) * old].iter().cloned());
        grown.extend((old..fields.len()).map(|_| MxArray::empty()));
    }
    Ok(MxArray::from_parts(
        shape,
        Payload::Struct {
            fields,
            values: grown,
        },
    )?)
}

/// Bring the target and the assigned value to a common class.
fn reconcile(base: MxArray, value: MxArray) -> EvalResult<(MxArray, MxArray)> {
    match (class_kind(&base), class_kind(&value)) {
        (ClassKind::Cell, ClassKind::Cell) => Ok((base, value)),
        (ClassKind::Cell, _) => Err(invalid_conversion("cell", class_name(&value))),
        (_, ClassKind::Cell) => Err(invalid_conversion(class_name(&base), "cell")),
        (ClassKind::Struct(bf), ClassKind::Struct(vf)) => {
            let base = with_fields(base, &vf)?;
            let fields = base.field_names().to_vec();
            let value = with_fields(value, &bf)?;
            let value = convert(&value, &ClassKind::Struct(fields))?;
            Ok((base, value))
        }
        (ClassKind::Struct(_), _) => Err(invalid_conversion("struct", class_name(&value))),
        (_, ClassKind::Struct(_)) => Err(invalid_conversion(class_name(&base), "struct")),
        (ClassKind::Dense(t), ClassKind::Dense(v)) => {
            let class = ClassKind::Dense(assigned_class(t, v));
            Ok((convert(&base, &class)?, convert(&value, &class)?))
        }
    }
}

fn as_cell(value: MxArray) -> EvalResult<MxArray> {
    Ok(MxArray::from_parts(vec![1, 1], Payload::Cell(vec![value]))?)
}

fn is_delete_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Tensor(rows) if rows.iter().all(Vec::is_empty))
}

/// Workspace plus the evaluator state of one engine.
#[derive(Debug, Default)]
pub struct Interpreter {
    vars: BTreeMap<String, MxArray>,
    /// Display output of the running request when it is being captured
    capture: Option<String>,
    ends: Vec<usize>,
    exit_code: Option<i32>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&MxArray> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: &str, value: MxArray) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.vars.remove(name).is_some()
    }

    pub fn clear_all(&mut self) {
        self.vars.clear();
    }

    /// Variable names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub(crate) fn request_exit(&mut self, code: i32) -> EvalError {
        self.exit_code = Some(code);
        EvalError::new(EXIT_REQUESTED, "exit requested")
    }

    /// Command-window output: buffered while capturing, else stderr.
    pub fn print(&mut self, text: &str) {
        match self.capture.as_mut() {
            Some(buffer) => buffer.push_str(text),
            None => eprint!("{text}"),
        }
    }

    /// Run `code`; returns the captured output (empty unless `capture`)
    /// together with the outcome.
    pub fn run(&mut self, code: &str, capture: bool) -> (String, EvalResult<()>) {
        self.capture = capture.then(String::new);
        self.ends.clear();
        let result = self.run_program(code);
        (self.capture.take().unwrap_or_default(), result)
    }

    fn run_program(&mut self, code: &str) -> EvalResult<()> {
        let program = parse(code)?;
        debug!("running {} statement(s)", program.body.len());
        for stmt in &program.body {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn show(&mut self, name: &str, suppressed: bool) {
        if suppressed {
            return;
        }
        if let Some(value) = self.vars.get(name) {
            let text = display(name, value);
            self.print(&text);
        }
    }

    fn exec(&mut self, stmt: &Stmt) -> EvalResult<()> {
        let suppressed = stmt.is_suppressed();
        match stmt {
            Stmt::ExprStmt(expr, _) => {
                if let Expr::Ident(name) = expr {
                    if self.vars.contains_key(name) {
                        self.show(name, suppressed);
                        return Ok(());
                    }
                }
                let values = match expr {
                    Expr::Ident(name) => self.call_named(name, &[], 0)?,
                    Expr::FuncCall(name, args) if !self.vars.contains_key(name) => {
                        self.call_named(name, args, 0)?
                    }
                    _ => self.eval_multi(expr)?,
                };
                for value in values {
                    self.set("ans", value);
                    self.show("ans", suppressed);
                }
            }
            Stmt::Assign(name, expr, _) => {
                let value = self.eval(expr)?;
                self.set(name, value);
                self.show(name, suppressed);
            }
            Stmt::MultiAssign(names, expr, _) => {
                let nargout = names.len();
                let values = match expr {
                    Expr::FuncCall(name, args) if !self.vars.contains_key(name) => {
                        self.call_named(name, args, nargout)?
                    }
                    Expr::Ident(name) if !self.vars.contains_key(name) => {
                        self.call_named(name, &[], nargout)?
                    }
                    _ => self.eval_multi(expr)?,
                };
                if values.len() < nargout {
                    return Err(EvalError::new(TOO_MANY_OUTPUTS, "Too many output arguments."));
                }
                for (name, value) in names.iter().zip(values) {
                    if let Some(name) = name {
                        self.set(name, value);
                        self.show(name, suppressed);
                    }
                }
            }
            Stmt::AssignLValue(lv, expr, _) => {
                let rhs = if is_delete_literal(expr)
                    && matches!(lv.path.last(), Some(Subscript::Paren(_)))
                {
                    Rhs::Delete
                } else {
                    Rhs::Value(self.eval(expr)?)
                };
                let current = self.vars.get(&lv.name).cloned();
                let updated = self.assign_path(current, &lv.path, rhs)?;
                self.set(&lv.name, updated);
                self.show(&lv.name, suppressed);
            }
        }
        Ok(())
    }

    /// Evaluate to exactly one value.
    pub(crate) fn eval(&mut self, expr: &Expr) -> EvalResult<MxArray> {
        let mut values = self.eval_multi(expr)?;
        if values.is_empty() {
            return Err(EvalError::new(
                TOO_MANY_OUTPUTS,
                "Too many output arguments.",
            ));
        }
        Ok(values.swap_remove(0))
    }

    /// Evaluate to a comma-separated list (`c{:}` and `s.f` over struct
    /// arrays produce several values).
    fn eval_multi(&mut self, expr: &Expr) -> EvalResult<Vec<MxArray>> {
        let value = match expr {
            Expr::Number(v) => MxArray::scalar(*v),
            Expr::Str(s) => MxArray::char_row(s),
            Expr::Ident(name) => match self.vars.get(name) {
                Some(v) => v.clone(),
                None => return self.call_named(name, &[], 1),
            },
            Expr::End => match self.ends.last() {
                Some(&n) => MxArray::scalar(n as f64),
                None => {
                    return Err(EvalError::invalid(
                        "'end' is only valid inside an index expression.",
                    ))
                }
            },
            Expr::Colon => return Err(EvalError::invalid("':' is only valid as a subscript.")),
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                ops::unary(*op, &v)?
            }
            Expr::Binary(lhs, op @ (BinOp::AndAnd | BinOp::OrOr), rhs) => {
                let sym = if *op == BinOp::AndAnd { "&&" } else { "||" };
                let left = ops::to_logical_scalar(&self.eval(lhs)?, sym)?;
                let result = match (op, left) {
                    (BinOp::AndAnd, false) => false,
                    (BinOp::OrOr, true) => true,
                    _ => ops::to_logical_scalar(&self.eval(rhs)?, sym)?,
                };
                crate::array::logical_scalar(result)
            }
            Expr::Binary(lhs, op, rhs) => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                ops::binary(*op, &a, &b)?
            }
            Expr::Tensor(rows) => {
                let mut stacked = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut parts = Vec::with_capacity(row.len());
                    for e in row {
                        parts.extend(self.eval_multi(e)?);
                    }
                    stacked.push(concat(parts, false)?);
                }
                concat(stacked, true)?
            }
            Expr::Cell(rows) => {
                if rows.iter().all(Vec::is_empty) {
                    MxArray::cell(&[0, 0])?
                } else {
                    let mut stacked = Vec::with_capacity(rows.len());
                    for row in rows {
                        let mut parts = Vec::with_capacity(row.len());
                        for e in row {
                            for v in self.eval_multi(e)? {
                                parts.push(as_cell(v)?);
                            }
                        }
                        stacked.push(concat(parts, false)?);
                    }
                    concat(stacked, true)?
                }
            }
            Expr::Range(start, step, stop) => {
                let a = self.eval(start)?;
                let s = match step {
                    Some(s) => Some(self.eval(s)?),
                    None => None,
                };
                let b = self.eval(stop)?;
                ops::range(&a, s.as_ref(), &b)?
            }
            Expr::FuncCall(name, args) => match self.vars.get(name) {
                Some(base) => {
                    let base = base.clone();
                    self.index_paren(&base, args)?
                }
                None => return self.call_named(name, args, 1),
            },
            Expr::Index(base, args) => {
                let base = self.eval(base)?;
                self.index_paren(&base, args)?
            }
            Expr::IndexCell(base, args) => {
                let base = self.eval(base)?;
                return self.index_brace(&base, args);
            }
            Expr::Member(base, field) => {
                let mut out = Vec::new();
                for value in self.eval_multi(base)? {
                    out.extend(field_values(&value, field)?);
                }
                return Ok(out);
            }
        };
        Ok(vec![value])
    }

    fn call_named(&mut self, name: &str, args: &[Expr], nargout: usize) -> EvalResult<Vec<MxArray>> {
        let Some(builtin) = builtins::lookup(name) else {
            return Err(EvalError::undefined(name));
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Expr::Colon => values.push(MxArray::char_row(":")),
                _ => values.extend(self.eval_multi(arg)?),
            }
        }
        let mut outputs = builtins::invoke(builtin, self, values, nargout)?;
        outputs.truncate(nargout.max(1));
        Ok(outputs)
    }

    fn eval_index_lists(&mut self, shape: &[usize], args: &[Expr]) -> EvalResult<Vec<IndexList>> {
        let n = args.len();
        let mut lists = Vec::with_capacity(n);
        for (k, arg) in args.iter().enumerate() {
            let extent = end_value(shape, k, n);
            if matches!(arg, Expr::Colon) {
                lists.push(IndexList {
                    positions: (0..extent).collect(),
                    shape: vec![extent, 1],
                    colon: true,
                    logical: false,
                });
                continue;
            }
            self.ends.push(extent);
            let value = self.eval(arg);
            self.ends.pop();
            lists.push(index_list(&value?)?);
        }
        Ok(lists)
    }

    fn index_paren(&mut self, base: &MxArray, args: &[Expr]) -> EvalResult<MxArray> {
        if args.is_empty() {
            return Ok(base.clone());
        }
        let lists = self.eval_index_lists(base.shape(), args)?;
        let (idx, shape) = selection(base.shape(), &lists)?;
        gather(base, &idx, &shape)
    }

    fn index_brace(&mut self, base: &MxArray, args: &[Expr]) -> EvalResult<Vec<MxArray>> {
        let Payload::Cell(items) = base.payload() else {
            return Err(EvalError::new(
                "MATLAB:cellRefFromNonCell",
                "Brace indexing is not supported for variables of this type.",
            ));
        };
        let lists = self.eval_index_lists(base.shape(), args)?;
        let (idx, _) = selection(base.shape(), &lists)?;
        idx.into_iter()
            .map(|i| {
                items.get(i).cloned().ok_or_else(|| {
                    EvalError::subscript(format!(
                        "Index exceeds the number of array elements. Index must not exceed {}.",
                        items.len()
                    ))
                })
            })
            .collect()
    }

    /// Store `rhs` at `path` inside `target`, returning the updated value.
    fn assign_path(
        &mut self,
        target: Option<MxArray>,
        path: &[Subscript],
        rhs: Rhs,
    ) -> EvalResult<MxArray> {
        let Some((step, rest)) = path.split_first() else {
            return Ok(rhs.into_value());
        };
        match step {
            Subscript::Field(name) => {
                let base = match target {
                    Some(t) if !is_empty_matrix(&t) => t,
                    _ => MxArray::structure(&[1, 1], &[])?,
                };
                if !matches!(base.payload(), Payload::Struct { .. }) {
                    return Err(EvalError::invalid(format!(
                        "Unable to perform assignment because dot indexing is not supported for variables of class '{}'.",
                        class_name(&base)
                    )));
                }
                if base.numel() != 1 {
                    return Err(EvalError::invalid(
                        "Field assignment to a struct array requires an index, as in s(i).name = value.",
                    ));
                }
                if !is_valid_identifier(name) {
                    return Err(EvalError::invalid(format!("Invalid field name '{name}'.")));
                }
                let mut base = with_fields(base, std::slice::from_ref(name))?;
                let slot = base
                    .field_names()
                    .iter()
                    .position(|f| f == name)
                    .ok_or_else(|| EvalError::invalid("field vanished"))?;
                let Payload::Struct { values, .. } = base.payload_mut() else {
                    return Err(EvalError::invalid("expected a struct"));
                };
                let current = std::mem::replace(&mut values[slot], MxArray::empty());
                let inner = if rest.is_empty() { None } else { Some(current) };
                let updated = self.assign_path(inner, rest, rhs)?;
                if let Payload::Struct { values, .. } = base.payload_mut() {
                    values[slot] = updated;
                }
                Ok(base)
            }
            Subscript::Paren(args) => {
                let base = target.unwrap_or_else(MxArray::empty);
                let lists = self.eval_index_lists(base.shape(), args)?;
                if rest.is_empty() {
                    return match rhs {
                        Rhs::Delete => delete_elements(base, lists),
                        Rhs::Value(v) => assign_indexed(base, lists, v),
                    };
                }
                let element = match single_position(base.shape(), &lists) {
                    Some(i) => Some(gather(&base, &[i], &[1, 1])?),
                    None if matches!(base.payload(), Payload::Struct { .. }) => {
                        Some(blank_like(&base, &[1, 1])?)
                    }
                    None => None,
                };
                let updated = self.assign_path(element, rest, rhs)?;
                assign_indexed(base, lists, updated)
            }
            Subscript::Brace(args) => {
                let base = match target {
                    Some(t) if !is_empty_matrix(&t) || matches!(t.payload(), Payload::Cell(_)) => t,
                    _ => MxArray::cell(&[0, 0])?,
                };
                let Payload::Cell(items) = base.payload() else {
                    return Err(EvalError::new(
                        "MATLAB:cellRefFromNonCell",
                        "Brace indexing is not supported for variables of this type.",
                    ));
                };
                let lists = self.eval_index_lists(base.shape(), args)?;
                if lists.iter().any(|l| l.positions.len() != 1) && !lists.is_empty() {
                    return Err(EvalError::invalid(
                        "Brace assignment must address exactly one cell.",
                    ));
                }
                let element = single_position(base.shape(), &lists).and_then(|i| items.get(i).cloned());
                let inner = if rest.is_empty() { None } else { element };
                let updated = self.assign_path(inner, rest, Rhs::Value(rhs.into_value()))?;
                assign_indexed(base, lists, as_cell(updated)?)
            }
        }
    }
}

/// Values of `field` over every element of struct `value`.
fn field_values(value: &MxArray, field: &str) -> EvalResult<Vec<MxArray>> {
    let Payload::Struct { fields, values } = value.payload() else {
        return Err(EvalError::invalid(format!(
            "Dot indexing is not supported for variables of class '{}'.",
            class_name(value)
        )));
    };
    let Some(slot) = fields.iter().position(|f| f == field) else {
        return Err(EvalError::new(
            "MATLAB:nonExistentField",
            format!("Unrecognized field name \"{field}\"."),
        ));
    };
    let nf = fields.len();
    Ok((0..value.numel()).map(|e| values[e * nf + slot].clone()).collect())
}

/// The in-bounds linear position when every subscript names one element.
fn single_position(shape: &[usize], lists: &[IndexList]) -> Option<usize> {
    if lists.is_empty() || lists.iter().any(|l| l.positions.len() != 1) {
        return None;
    }
    let n = lists.len();
    let dims: Vec<usize> = (0..n).map(|k| end_value(shape, k, n)).collect();
    let subs: Vec<usize> = lists.iter().map(|l| l.positions[0]).collect();
    if subs.iter().zip(&dims).any(|(s, d)| s >= d) {
        return None;
    }
    Some(linear(&subs, &dims))
}

/// `base(lists) = value`, growing `base` as needed.
fn assign_indexed(base: MxArray, mut lists: Vec<IndexList>, value: MxArray) -> EvalResult<MxArray> {
    let adopt = is_empty_matrix(&base)
        && matches!(class_kind(&base), ClassKind::Dense(ElementType::Float64));
    let base = if adopt {
        blank_like(&value, &[0, 0])?
    } else {
        crate::array::dense(&base)?.into_owned()
    };
    let value = crate::array::dense(&value)?.into_owned();
    let (base, value) = reconcile(base, value)?;

    let n = lists.len();
    for (k, list) in lists.iter_mut().enumerate() {
        if list.colon && list.positions.is_empty() {
            let extent = if n == 1 {
                value.numel()
            } else {
                value.shape().get(k).copied().unwrap_or(1)
            };
            list.positions = (0..extent).collect();
        }
    }

    let shape = base.shape().to_vec();
    let (dst, grown) = if n == 1 {
        let positions = lists[0].positions.clone();
        let needed = positions.iter().max().map_or(0, |m| m + 1);
        let numel: usize = shape.iter().product();
        let grown = if needed <= numel {
            shape.clone()
        } else if shape == [0, 0] || (shape.len() == 2 && shape[0] == 1) {
            vec![1, needed]
        } else if shape.len() == 2 && shape[1] == 1 {
            vec![needed, 1]
        } else {
            return Err(EvalError::new(
                BAD_SUBSCRIPT,
                "Attempt to grow array along ambiguous dimension.",
            ));
        };
        (positions, grown)
    } else {
        let mut dims: Vec<usize> = (0..n).map(|k| end_value(&shape, k, n)).collect();
        let mut growing = false;
        for (k, list) in lists.iter().enumerate() {
            let needed = list.positions.iter().max().map_or(0, |m| m + 1);
            if needed > dims[k] {
                dims[k] = needed;
                growing = true;
            }
        }
        if growing && n < shape.len() {
            return Err(EvalError::subscript(
                "Cannot grow an array through a subscript that spans several dimensions.",
            ));
        }
        let counts: Vec<usize> = lists.iter().map(|l| l.positions.len()).collect();
        element_limit(&counts)?;
        let dst = cartesian(&lists, &counts, &dims);
        let grown = if growing { dims } else { shape.clone() };
        (dst, grown)
    };

    let mut out = if grown == shape { base } else { resize(&base, &grown)? };
    let count = dst.len();
    let src: Vec<usize> = if value.numel() == 1 {
        vec![0; count]
    } else if value.numel() == count {
        (0..count).collect()
    } else {
        return Err(EvalError::new(
            "MATLAB:subsassignnumelmismatch",
            format!(
                "Unable to perform assignment because the left and right sides have a different number of elements ({count} and {}).",
                value.numel()
            ),
        ));
    };
    scatter(&mut out, &dst, &value, &src)?;
    Ok(drop_zero_imag(out))
}

/// `base(lists) = []`.
fn delete_elements(base: MxArray, lists: Vec<IndexList>) -> EvalResult<MxArray> {
    let base = crate::array::dense(&base)?.into_owned();
    let shape = base.shape().to_vec();
    if let [list] = lists.as_slice() {
        let numel = base.numel();
        if list.colon {
            return blank_like(&base, &[0, 0]);
        }
        if let Some(&bad) = list.positions.iter().find(|&&p| p >= numel) {
            return Err(EvalError::subscript(format!(
                "Index {} exceeds the number of array elements ({numel}).",
                bad + 1
            )));
        }
        let kept: Vec<usize> = (0..numel).filter(|i| !list.positions.contains(i)).collect();
        let column = shape.len() == 2 && shape[1] == 1 && shape[0] != 1;
        let out = if column {
            vec![kept.len(), 1]
        } else {
            vec![1, kept.len()]
        };
        return gather(&base, &kept, &out);
    }
    let n = lists.len();
    let dims: Vec<usize> = (0..n).map(|k| end_value(&shape, k, n)).collect();
    let partial: Vec<usize> = (0..n)
        .filter(|&k| {
            let mut covered: Vec<usize> = lists[k].positions.clone();
            covered.sort_unstable();
            covered.dedup();
            covered != (0..dims[k]).collect::<Vec<_>>()
        })
        .collect();
    let dim = match partial.as_slice() {
        [] => return blank_like(&base, &[0, 0]),
        [d] => *d,
        _ => {
            return Err(EvalError::new(
                "MATLAB:nullAssignmentNonColon",
                "A null assignment can have only one non-colon index.",
            ))
        }
    };
    if lists[dim].positions.iter().any(|&p| p >= dims[dim]) {
        return Err(EvalError::subscript(format!(
            "Index in position {} exceeds array bounds.",
            dim + 1
        )));
    }
    let kept: Vec<usize> = (0..dims[dim])
        .filter(|i| !lists[dim].positions.contains(i))
        .collect();
    let mut out_dims = dims.clone();
    out_dims[dim] = kept.len();
    let total: usize = out_dims.iter().product();
    let idx: Vec<usize> = (0..total)
        .map(|k| {
            let mut subs = subscripts(k, &out_dims);
            subs[dim] = kept[subs[dim]];
            linear(&subs, &dims)
        })
        .collect();
    gather(&base, &idx, &out_dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(interp: &mut Interpreter, code: &str) -> String {
        let (out, result) = interp.run(code, true);
        result.unwrap();
        out
    }

    fn values(interp: &Interpreter, name: &str) -> Vec<f64> {
        real_f64(interp.get(name).unwrap()).unwrap()
    }

    #[test]
    fn assignment_and_display() {
        let mut interp = Interpreter::new();
        assert_eq!(run(&mut interp, "x = 5"), "x =\n\n     5\n\n");
        assert_eq!(run(&mut interp, "y = x + 1;"), "");
        assert_eq!(values(&interp, "y"), vec![6.0]);
        assert_eq!(run(&mut interp, "x * 2;"), "");
        assert_eq!(values(&interp, "ans"), vec![10.0]);
    }

    #[test]
    fn indexing_with_end_and_colon() {
        let mut interp = Interpreter::new();
        run(&mut interp, "m = [1 2 3; 4 5 6]; a = m(end, :); b = m(:); c = m(2, end);");
        assert_eq!(interp.get("a").unwrap().shape(), &[1, 3]);
        assert_eq!(values(&interp, "a"), vec![4.0, 5.0, 6.0]);
        assert_eq!(interp.get("b").unwrap().shape(), &[6, 1]);
        assert_eq!(values(&interp, "c"), vec![6.0]);
        run(&mut interp, "v = 10:10:50; w = v([1 3]); z = v(v > 25);");
        assert_eq!(values(&interp, "w"), vec![10.0, 30.0]);
        assert_eq!(values(&interp, "z"), vec![30.0, 40.0, 50.0]);
    }

    #[test]
    fn growth_and_deletion() {
        let mut interp = Interpreter::new();
        run(&mut interp, "x(3) = 7; y = zeros(2); y(3, 3) = 1;");
        assert_eq!(values(&interp, "x"), vec![0.0, 0.0, 7.0]);
        assert_eq!(interp.get("y").unwrap().shape(), &[3, 3]);
        run(&mut interp, "v = 1:5; v([2 4]) = []; m = [1 2; 3 4]; m(1, :) = [];");
        assert_eq!(values(&interp, "v"), vec![1.0, 3.0, 5.0]);
        assert_eq!(values(&interp, "m"), vec![3.0, 4.0]);
    }

    #[test]
    fn structs_and_cells() {
        let mut interp = Interpreter::new();
        run(
            &mut interp,
            "s.name = 'probe'; s.data(2) = 4; c = {1, 'two'}; c{4} = s; n = c{2}; t(2).a = 1;",
        );
        let s = interp.get("s").unwrap();
        assert_eq!(s.field_names(), &["name".to_string(), "data".to_string()]);
        assert_eq!(real_f64(s.field(0, "data").unwrap()).unwrap(), vec![0.0, 4.0]);
        assert_eq!(interp.get("c").unwrap().shape(), &[1, 4]);
        assert_eq!(interp.get("n").unwrap(), &MxArray::char_row("two"));
        assert_eq!(interp.get("t").unwrap().shape(), &[1, 2]);
    }

    #[test]
    fn oversized_arrays_are_evaluation_errors() {
        let mut interp = Interpreter::new();
        run(&mut interp, "keep = 1;");
        for code in [
            "x = 1:1e20;",
            "x = 0:1e-30:1;",
            "x = ones(1e6, 1e6);",
            "x = zeros(1, 2^62);",
            "x = zeros([1e10 1e10]);",
            "x = true(1e5);",
            "x = cell(1e6, 1e6);",
            "x = (1:1e5)' + (1:1e5);",
            "[a, b] = meshgrid(1:1e5);",
            "x = full(sparse(1e6, 1e6));",
            "s = sparse(1e6, 1e6); s(1) = 1;",
            "x = sparse(1, 1e20);",
            "y = []; y(1e6, 1e6) = 1;",
            "z = []; z(1:1e5, 1:1e5) = 1;",
        ] {
            let (_, result) = interp.run(code, true);
            let err = result.expect_err(code);
            assert_eq!(err.identifier, crate::error::SIZE_LIMIT, "{code}");
        }
        assert!(!interp.names().contains(&"x".to_string()));
        assert_eq!(values(&interp, "keep"), vec![1.0]);
    }

    #[test]
    fn errors_leave_workspace_consistent() {
        let mut interp = Interpreter::new();
        run(&mut interp, "x = [1 2 3];");
        let (_, result) = interp.run("x(2) = 9; y = undefinedFn(1, 2); z = 1;", true);
        let err = result.unwrap_err();
        assert_eq!(err.identifier, "MATLAB:UndefinedFunction");
        assert_eq!(err.message, "Undefined function or variable 'undefinedFn'.");
        assert_eq!(values(&interp, "x"), vec![1.0, 9.0, 3.0]);
        assert!(interp.get("z").is_none());
        let (_, result) = interp.run("x(0)", true);
        assert_eq!(result.unwrap_err().identifier, BAD_SUBSCRIPT);
    }

    #[test]
    fn multiple_outputs() {
        let mut interp = Interpreter::new();
        run(&mut interp, "[r, c] = size(ones(2, 3)); [a, ~] = deal(1, 2);");
        assert_eq!(values(&interp, "r"), vec![2.0]);
        assert_eq!(values(&interp, "c"), vec![3.0]);
        assert_eq!(values(&interp, "a"), vec![1.0]);
        let (_, result) = interp.run("[p, q] = numel(1);", true);
        assert_eq!(result.unwrap_err().identifier, TOO_MANY_OUTPUTS);
    }
}
