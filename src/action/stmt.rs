use crate::builtins::Format;
use crate::error::RuntimeError;
use crate::parser::{Expr, Statement};
use crate::runtime::{Value, ValueArg};

use super::{CACHE_LIMIT, Executor, Flow, Signal, Unwind};

impl<'a> Executor<'a> {
    pub(crate) fn exec_block(&mut self, block: &[Statement]) -> Flow<Option<Signal>> {
        for stmt in block {
            if let Some(signal) = self.exec_stmt(stmt)? {
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }

    pub(crate) fn exec_stmt(&mut self, stmt: &Statement) -> Flow<Option<Signal>> {
        match stmt {
            Statement::Print(args) => {
                self.exec_print(args)?;
                Ok(None)
            }
            Statement::Printf(args) => {
                self.exec_printf(args)?;
                Ok(None)
            }
            Statement::If(cond, then_block, else_block) => {
                if self.eval(cond)?.is_truthy() {
                    self.exec_block(then_block)
                } else if let Some(else_block) = else_block {
                    self.exec_block(else_block)
                } else {
                    Ok(None)
                }
            }
            Statement::While(cond, body) => {
                while self.eval(cond)?.is_truthy() {
                    match self.exec_block(body)? {
                        Some(Signal::Break) => break,
                        Some(Signal::Continue) | None => {}
                        Some(ret @ Signal::Return(_)) => return Ok(Some(ret)),
                    }
                }
                Ok(None)
            }
            Statement::DoWhile(body, cond) => {
                loop {
                    match self.exec_block(body)? {
                        Some(Signal::Break) => break,
                        Some(Signal::Continue) | None => {}
                        Some(ret @ Signal::Return(_)) => return Ok(Some(ret)),
                    }
                    if !self.eval(cond)?.is_truthy() {
                        break;
                    }
                }
                Ok(None)
            }
            Statement::For(init, cond, update, body) => {
                if let Some(init) = init {
                    self.exec_stmt(init)?;
                }
                loop {
                    if let Some(cond) = cond
                        && !self.eval(cond)?.is_truthy()
                    {
                        break;
                    }
                    match self.exec_block(body)? {
                        Some(Signal::Break) => break,
                        Some(Signal::Continue) | None => {}
                        Some(ret @ Signal::Return(_)) => return Ok(Some(ret)),
                    }
                    if let Some(update) = update {
                        self.exec_stmt(update)?;
                    }
                }
                Ok(None)
            }
            Statement::ForIn(key_var, array, body) => {
                let id = self.rt.array_id(array)?;
                let keys = self.rt.arrays.get(id).keys();
                for key in keys {
                    // keys deleted by the body are skipped
                    if !self.rt.arrays.get(id).contains(&key) {
                        continue;
                    }
                    self.rt.set_var(key_var, Value::from_input(key))?;
                    match self.exec_block(body)? {
                        Some(Signal::Break) => break,
                        Some(Signal::Continue) | None => {}
                        Some(ret @ Signal::Return(_)) => return Ok(Some(ret)),
                    }
                }
                Ok(None)
            }
            Statement::Delete(array, keys) => {
                let key = match keys {
                    Some(keys) => Some(self.subscript(keys)?),
                    None => None,
                };
                let id = self.rt.array_id(array)?;
                let arr = self.rt.arrays.get_mut(id);
                match key {
                    Some(key) => arr.remove(&key),
                    None => arr.clear(),
                }
                Ok(None)
            }
            Statement::Next => Err(Unwind::Next),
            Statement::NextFile => Err(Unwind::NextFile),
            Statement::Exit(code) => {
                let code = match code {
                    Some(e) => self.eval(e)?.to_number() as i32,
                    None => self.exit_code.unwrap_or(0),
                };
                Err(Unwind::Exit(code))
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::default(),
                };
                Ok(Some(Signal::Return(value)))
            }
            Statement::Break => Ok(Some(Signal::Break)),
            Statement::Continue => Ok(Some(Signal::Continue)),
            Statement::Block(block) => self.exec_block(block),
            Statement::Expression(expr) => {
                self.eval(expr)?;
                Ok(None)
            }
        }
    }

    /// `print`: arguments joined by OFS, terminated by ORS. Numbers go
    /// through OFMT unless integral.
    fn exec_print(&mut self, args: &[Expr]) -> Flow<()> {
        let mut line = String::new();
        if args.is_empty() {
            line.push_str(self.rt.record.text());
        } else {
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    line.push_str(self.rt.ofs());
                }
                let v = self.eval(arg)?;
                line.push_str(&v.to_str_with(self.rt.ofmt()));
            }
        }
        line.push_str(self.rt.ors());
        self.write(&line)?;
        Ok(())
    }

    fn exec_printf(&mut self, args: &[Expr]) -> Flow<()> {
        let text = self.format(args)?;
        self.write(&text)?;
        Ok(())
    }

    /// Evaluate a format and its arguments, as `printf` and `sprintf` do.
    pub(crate) fn format(&mut self, args: &[Expr]) -> Flow<String> {
        let Some((fmt_expr, rest)) = args.split_first() else {
            return Ok(String::new());
        };
        let fmt = self.eval_string(fmt_expr)?;
        let values = rest.iter().map(|e| self.eval(e)).collect::<Flow<Vec<Value>>>()?;

        if !self.format_cache.contains_key(&fmt) {
            let compiled = Format::compile(&fmt).map_err(RuntimeError::from)?;
            if self.format_cache.len() >= CACHE_LIMIT {
                self.format_cache.clear();
            }
            self.format_cache.insert(fmt.clone(), compiled);
        }
        let convfmt = self.rt.convfmt();
        let args: Vec<ValueArg<'_>> = values.iter().map(|value| ValueArg { value, convfmt }).collect();
        match self.format_cache.get(&fmt) {
            Some(compiled) => Ok(compiled.render(&args).map_err(RuntimeError::from)?),
            None => Ok(String::new()),
        }
    }

    pub(crate) fn write(&mut self, text: &str) -> Result<(), RuntimeError> {
        self.out.write_all(text.as_bytes()).map_err(RuntimeError::Output)
    }
}
