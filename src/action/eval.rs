use crate::error::RuntimeError;
use crate::parser::{BinOp, Expr, LValue, Var};
use crate::runtime::{ArrayId, Slot, Value};

use super::{Executor, Flow, Signal};

/// A resolved assignment target: subscripts and field numbers are
/// evaluated once, so `a[i++] += 1` touches a single element.
pub(crate) enum Place<'p> {
    Var(&'p Var),
    Field(usize),
    Element(ArrayId, String),
}

impl<'a> Executor<'a> {
    pub(crate) fn eval(&mut self, expr: &Expr) -> Flow<Value> {
        match expr {
            Expr::NumberLit(n) => Ok(Value::from_number(*n)),
            Expr::StringLit(s) => Ok(Value::from_string(s.as_str())),
            Expr::Regex(re) => {
                let re = self.regex(re)?;
                Ok(Value::from_bool(re.is_match(self.rt.record.text())))
            }
            Expr::Var(var) => Ok(self.rt.get_var(var)?),
            Expr::Field(idx_expr) => {
                let idx = self.field_index(idx_expr)?;
                Ok(self.rt.get_field(idx))
            }
            Expr::ArrayRef(array, keys) => {
                let key = self.subscript(keys)?;
                let id = self.rt.array_id(array)?;
                Ok(self.rt.arrays.get_mut(id).get_or_vivify(&key))
            }
            Expr::ArrayIn(keys, array) => {
                let key = self.subscript(keys)?;
                let id = self.rt.array_id(array)?;
                Ok(Value::from_bool(self.rt.arrays.get(id).contains(&key)))
            }
            Expr::BinOp(left, op, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(self.binop(l, *op, r)?)
            }
            Expr::LogicalAnd(left, right) => {
                if !self.eval(left)?.is_truthy() {
                    return Ok(Value::from_bool(false));
                }
                Ok(Value::from_bool(self.eval(right)?.is_truthy()))
            }
            Expr::LogicalOr(left, right) => {
                if self.eval(left)?.is_truthy() {
                    return Ok(Value::from_bool(true));
                }
                Ok(Value::from_bool(self.eval(right)?.is_truthy()))
            }
            Expr::LogicalNot(inner) => Ok(Value::from_bool(!self.eval(inner)?.is_truthy())),
            Expr::Match(subject, pattern) => Ok(Value::from_bool(self.is_match(subject, pattern)?)),
            Expr::NotMatch(subject, pattern) => Ok(Value::from_bool(!self.is_match(subject, pattern)?)),
            Expr::Assign(target, value) => {
                let place = self.place(target)?;
                let val = self.eval(value)?;
                self.store(place, val.clone())?;
                Ok(val)
            }
            Expr::CompoundAssign(target, op, value) => {
                let place = self.place(target)?;
                let current = self.load(&place)?;
                let rhs = self.eval(value)?;
                let result = self.binop(current, *op, rhs)?;
                self.store(place, result.clone())?;
                Ok(result)
            }
            Expr::Increment(target, pre) => self.step(target, 1.0, *pre),
            Expr::Decrement(target, pre) => self.step(target, -1.0, *pre),
            Expr::UnaryMinus(inner) => Ok(Value::from_number(-self.eval(inner)?.to_number())),
            Expr::UnaryPlus(inner) => Ok(Value::from_number(self.eval(inner)?.to_number())),
            Expr::Concat(left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                let convfmt = self.rt.convfmt();
                let mut s = l.into_string_with(convfmt);
                s.push_str(&r.to_str_with(convfmt));
                Ok(Value::from_string(s))
            }
            Expr::Ternary(cond, then_expr, else_expr) => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }
            Expr::BuiltinCall(builtin, args) => self.call_builtin(*builtin, args),
            Expr::FuncCall(name, args) => self.call_user(name, args),
        }
    }

    pub(crate) fn eval_string(&mut self, expr: &Expr) -> Flow<String> {
        let v = self.eval(expr)?;
        Ok(v.into_string_with(self.rt.convfmt()))
    }

    fn binop(&self, l: Value, op: BinOp, r: Value) -> Result<Value, RuntimeError> {
        let convfmt = self.rt.convfmt();
        let cmp = |want: fn(std::cmp::Ordering) -> bool| Value::from_bool(want(l.compare(&r, convfmt)));
        Ok(match op {
            BinOp::Eq => cmp(|o| o.is_eq()),
            BinOp::Ne => cmp(|o| o.is_ne()),
            BinOp::Lt => cmp(|o| o.is_lt()),
            BinOp::Le => cmp(|o| o.is_le()),
            BinOp::Gt => cmp(|o| o.is_gt()),
            BinOp::Ge => cmp(|o| o.is_ge()),
            _ => Value::from_number(arith(l.to_number(), op, r.to_number())?),
        })
    }

    fn is_match(&mut self, subject: &Expr, pattern: &Expr) -> Flow<bool> {
        let text = self.eval_string(subject)?;
        let re = self.regex_operand(pattern)?;
        Ok(re.is_match(&text))
    }

    /// The regex for a pattern operand: a literal is used as written, any
    /// other expression is evaluated and its string value compiled.
    pub(crate) fn regex_operand(&mut self, pattern: &Expr) -> Flow<regex::Regex> {
        let source = match pattern {
            Expr::Regex(re) => return Ok(self.regex(re)?),
            other => self.eval_string(other)?,
        };
        Ok(self.regex(&source)?)
    }

    pub(crate) fn field_index(&mut self, expr: &Expr) -> Flow<usize> {
        let n = self.eval(expr)?.to_number();
        if n < 0.0 {
            return Err(RuntimeError::NegativeField(n as i64).into());
        }
        Ok(n as usize)
    }

    /// Evaluate a subscript list and join it with SUBSEP.
    pub(crate) fn subscript(&mut self, keys: &[Expr]) -> Flow<String> {
        if let [single] = keys {
            return self.eval_string(single);
        }
        let mut key = String::new();
        for (i, k) in keys.iter().enumerate() {
            if i > 0 {
                key.push_str(self.rt.subsep());
            }
            let part = self.eval_string(k)?;
            key.push_str(&part);
        }
        Ok(key)
    }

    pub(crate) fn place<'p>(&mut self, target: &'p LValue) -> Flow<Place<'p>> {
        match target {
            LValue::Var(var) => Ok(Place::Var(var)),
            LValue::Field(idx) => Ok(Place::Field(self.field_index(idx)?)),
            LValue::ArrayRef(array, keys) => {
                let key = self.subscript(keys)?;
                let id = self.rt.array_id(array)?;
                Ok(Place::Element(id, key))
            }
        }
    }

    pub(crate) fn load(&mut self, place: &Place<'_>) -> Result<Value, RuntimeError> {
        match place {
            Place::Var(var) => self.rt.get_var(var),
            Place::Field(idx) => Ok(self.rt.get_field(*idx)),
            Place::Element(id, key) => Ok(self.rt.arrays.get_mut(*id).get_or_vivify(key)),
        }
    }

    pub(crate) fn store(&mut self, place: Place<'_>, value: Value) -> Result<(), RuntimeError> {
        match place {
            Place::Var(var) => self.rt.set_var(var, value),
            Place::Field(idx) => {
                let text = value.into_string_with(self.rt.convfmt());
                self.rt.set_field(idx, &text)
            }
            Place::Element(id, key) => {
                self.rt.arrays.get_mut(id).set(key, value);
                Ok(())
            }
        }
    }

    fn step(&mut self, target: &LValue, delta: f64, pre: bool) -> Flow<Value> {
        let place = self.place(target)?;
        let old = self.load(&place)?.to_number();
        let new = old + delta;
        self.store(place, Value::from_number(new))?;
        Ok(Value::from_number(if pre { new } else { old }))
    }

    /// Call a user-defined function. Arrays are passed by reference;
    /// everything else by value. Missing arguments are uninitialised locals.
    pub(crate) fn call_user(&mut self, name: &str, args: &[Expr]) -> Flow<Value> {
        let Some(&func) = self.functions.get(name) else {
            return Err(RuntimeError::UndefinedFunction(name.to_string()).into());
        };
        if args.len() > func.params.len() {
            return Err(RuntimeError::TooManyArgs {
                name: name.to_string(),
                given: args.len(),
                accepted: func.params.len(),
            }
            .into());
        }

        let mut locals = Vec::with_capacity(func.params.len());
        for (i, arg) in args.iter().enumerate() {
            let slot = match arg {
                Expr::Var(var @ (Var::Global(_) | Var::Local(_))) => {
                    if func.array_params[i] {
                        Slot::Array(self.rt.array_id(var)?)
                    } else if let Some(id) = self.rt.existing_array(var) {
                        Slot::Array(id)
                    } else {
                        Slot::Scalar(self.rt.get_var(var)?)
                    }
                }
                _ if func.array_params[i] => {
                    return Err(RuntimeError::ScalarAsArray(func.params[i].clone()).into());
                }
                other => Slot::Scalar(self.eval(other)?),
            };
            locals.push(slot);
        }
        locals.resize(func.params.len(), Slot::Uninit);

        self.rt.push_frame(locals)?;
        let result = self.exec_block(&func.body);
        self.rt.pop_frame();

        match result? {
            Some(Signal::Return(v)) => Ok(v),
            _ => Ok(Value::default()),
        }
    }
}

fn arith(l: f64, op: BinOp, r: f64) -> Result<f64, RuntimeError> {
    Ok(match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => {
            if r == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            l / r
        }
        BinOp::Mod => {
            if r == 0.0 {
                return Err(RuntimeError::ModuloByZero);
            }
            l % r
        }
        BinOp::Pow => l.powf(r),
        // plain numeric comparison; values are compared in `binop`
        BinOp::Eq => f64::from(u8::from(l == r)),
        BinOp::Ne => f64::from(u8::from(l != r)),
        BinOp::Lt => f64::from(u8::from(l < r)),
        BinOp::Le => f64::from(u8::from(l <= r)),
        BinOp::Gt => f64::from(u8::from(l > r)),
        BinOp::Ge => f64::from(u8::from(l >= r)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        assert_eq!(arith(7.0, BinOp::Mod, 3.0).unwrap(), 1.0);
        assert_eq!(arith(-7.0, BinOp::Mod, 3.0).unwrap(), -1.0);
        assert_eq!(arith(2.0, BinOp::Pow, 10.0).unwrap(), 1024.0);
        assert!(matches!(arith(1.0, BinOp::Div, 0.0), Err(RuntimeError::DivisionByZero)));
        assert!(matches!(arith(1.0, BinOp::Mod, 0.0), Err(RuntimeError::ModuloByZero)));
    }
}
