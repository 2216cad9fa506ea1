use crate::builtins::math;
use crate::builtins::{Builtin, expand_replacement, string};
use crate::error::RuntimeError;
use crate::field::FieldSplitter;
use crate::parser::{Expr, LValue};
use crate::runtime::Value;

use super::eval::Place;
use super::{Executor, Flow};

impl<'a> Executor<'a> {
    /// Built-ins that need interpreter state: arrays, the record, the
    /// regex cache, the RNG or the output stream. Argument counts were
    /// checked by the parser.
    pub(crate) fn call_builtin(&mut self, builtin: Builtin, args: &[Expr]) -> Flow<Value> {
        match builtin {
            Builtin::Length => self.builtin_length(args),
            Builtin::Substr => {
                let s = self.eval_string(&args[0])?;
                let m = self.eval(&args[1])?.to_number();
                let n = match args.get(2) {
                    Some(e) => Some(self.eval(e)?.to_number()),
                    None => None,
                };
                Ok(Value::from_string(string::substr(&s, m, n)))
            }
            Builtin::Index => {
                let s = self.eval_string(&args[0])?;
                let t = self.eval_string(&args[1])?;
                Ok(Value::from_number(string::index(&s, &t) as f64))
            }
            Builtin::Split => self.builtin_split(args),
            Builtin::Sub => self.builtin_sub(args, false),
            Builtin::Gsub => self.builtin_sub(args, true),
            Builtin::Match => self.builtin_match(args),
            Builtin::Sprintf => Ok(Value::from_string(self.format(args)?)),
            Builtin::Tolower => Ok(Value::from_string(string::tolower(&self.eval_string(&args[0])?))),
            Builtin::Toupper => Ok(Value::from_string(string::toupper(&self.eval_string(&args[0])?))),
            Builtin::Int => self.math1(args, math::int),
            Builtin::Sqrt => self.math1(args, f64::sqrt),
            Builtin::Exp => self.math1(args, f64::exp),
            Builtin::Log => self.math1(args, f64::ln),
            Builtin::Sin => self.math1(args, f64::sin),
            Builtin::Cos => self.math1(args, f64::cos),
            Builtin::Atan2 => {
                let y = self.eval(&args[0])?.to_number();
                let x = self.eval(&args[1])?.to_number();
                Ok(Value::from_number(y.atan2(x)))
            }
            Builtin::Rand => Ok(Value::from_number(self.rt.rng.next_f64())),
            Builtin::Srand => {
                let seed = match args.first() {
                    Some(e) => self.eval(e)?.to_number(),
                    None => math::time_seed(),
                };
                Ok(Value::from_number(self.rt.rng.reseed(seed)))
            }
            Builtin::Fflush => {
                if let Some(e) = args.first() {
                    self.eval(e)?;
                }
                self.flush()?;
                Ok(Value::from_number(0.0))
            }
        }
    }

    fn math1(&mut self, args: &[Expr], f: fn(f64) -> f64) -> Flow<Value> {
        let x = self.eval(&args[0])?.to_number();
        Ok(Value::from_number(f(x)))
    }

    /// `length`, `length(s)`, or `length(arr)` for an array's element count.
    fn builtin_length(&mut self, args: &[Expr]) -> Flow<Value> {
        let n = match args.first() {
            None => string::length(self.rt.record.text()),
            Some(Expr::Var(var)) if self.rt.existing_array(var).is_some() => {
                self.rt.existing_array(var).map_or(0, |id| self.rt.arrays.get(id).len())
            }
            Some(e) => string::length(&self.eval_string(e)?),
        };
        Ok(Value::from_number(n as f64))
    }

    /// `split(s, a[, sep])`: clear `a`, fill it with the pieces of `s` as
    /// strnums keyed 1..n, and return n.
    fn builtin_split(&mut self, args: &[Expr]) -> Flow<Value> {
        let text = self.eval_string(&args[0])?;
        let splitter = match args.get(2) {
            None => self.rt.splitter_for(None)?,
            Some(Expr::Regex(re)) => FieldSplitter::regex(re)?,
            Some(e) => {
                let sep = self.eval_string(e)?;
                self.rt.splitter_for(Some(&sep))?
            }
        };
        let pieces = splitter.split(&text);

        let Expr::Var(var) = &args[1] else {
            return Err(RuntimeError::ScalarAsArray("split target".to_string()).into());
        };
        let id = self.rt.array_id(var)?;
        let arr = self.rt.arrays.get_mut(id);
        arr.clear();
        let n = pieces.len();
        for (i, piece) in pieces.into_iter().enumerate() {
            arr.set((i + 1).to_string(), Value::from_input(piece));
        }
        Ok(Value::from_number(n as f64))
    }

    /// `sub(re, repl[, target])` / `gsub(...)`: replace the first or every
    /// match in `target` (default `$0`) and return the count.
    fn builtin_sub(&mut self, args: &[Expr], global: bool) -> Flow<Value> {
        let re = self.regex_operand(&args[0])?;
        let repl = self.eval_string(&args[1])?;
        let target = match args.get(2) {
            Some(Expr::Var(v)) => Some(LValue::Var(v.clone())),
            Some(Expr::Field(idx)) => Some(LValue::Field(idx.clone())),
            Some(Expr::ArrayRef(v, keys)) => Some(LValue::ArrayRef(v.clone(), keys.clone())),
            // the parser only lets lvalues through
            Some(_) | None => None,
        };
        let place = match &target {
            Some(target) => self.place(target)?,
            None => Place::Field(0),
        };
        let text = self.load(&place)?.into_string_with(self.rt.convfmt());

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut count = 0;
        for m in re.find_iter(&text) {
            out.push_str(&text[last..m.start()]);
            expand_replacement(&repl, m.as_str(), &mut out);
            last = m.end();
            count += 1;
            if !global {
                break;
            }
        }
        if count > 0 {
            out.push_str(&text[last..]);
            self.store(place, Value::from_string(out))?;
        }
        Ok(Value::from_number(count as f64))
    }

    /// `match(s, re[, a])`: set RSTART and RLENGTH (in characters) and
    /// optionally fill `a` with the match and its capture groups.
    fn builtin_match(&mut self, args: &[Expr]) -> Flow<Value> {
        let text = self.eval_string(&args[0])?;
        let re = self.regex_operand(&args[1])?;
        let caps = re.captures(&text);

        let (start, length) = match caps.as_ref().and_then(|c| c.get(0)) {
            Some(m) => (
                text[..m.start()].chars().count() + 1,
                m.as_str().chars().count() as f64,
            ),
            None => (0, -1.0),
        };
        self.rt.set_global("RSTART", Value::from_number(start as f64))?;
        self.rt.set_global("RLENGTH", Value::from_number(length))?;

        if let Some(Expr::Var(var)) = args.get(2) {
            let subsep = self.rt.subsep().to_string();
            let id = self.rt.array_id(var)?;
            let arr = self.rt.arrays.get_mut(id);
            arr.clear();
            if let Some(caps) = &caps {
                for (i, group) in caps.iter().enumerate() {
                    let Some(group) = group else { continue };
                    let start = text[..group.start()].chars().count() + 1;
                    let length = group.as_str().chars().count();
                    arr.set(format!("{i}{subsep}start"), Value::from_number(start as f64));
                    arr.set(format!("{i}{subsep}length"), Value::from_number(length as f64));
                    arr.set(i.to_string(), Value::from_input(group.as_str()));
                }
            }
        }
        Ok(Value::from_number(start as f64))
    }
}
