mod array;
mod record;
mod value;

use rustc_hash::FxHashMap;

pub use self::array::{ArrayArena, ArrayId, AwkArray};
pub use self::record::Record;
pub use self::value::{Value, ValueArg};

use crate::builtins::math::Rng;
use crate::error::RuntimeError;
use crate::field::FieldSplitter;
use crate::parser::Var;

/// Maximum depth of nested user-function calls.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Highest field number (and `NF`) an assignment may create.
pub const MAX_FIELDS: usize = 1 << 20;

/// Built-in variables with behaviour attached, stored as dedicated fields
/// rather than in the globals map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    Nr,
    Nf,
    Fnr,
    Fs,
    Ofs,
    Rs,
    Ors,
    Filename,
    Subsep,
    Convfmt,
    Ofmt,
}

impl Special {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "NR" => Special::Nr,
            "NF" => Special::Nf,
            "FNR" => Special::Fnr,
            "FS" => Special::Fs,
            "OFS" => Special::Ofs,
            "RS" => Special::Rs,
            "ORS" => Special::Ors,
            "FILENAME" => Special::Filename,
            "SUBSEP" => Special::Subsep,
            "CONVFMT" => Special::Convfmt,
            "OFMT" => Special::Ofmt,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Special::Nr => "NR",
            Special::Nf => "NF",
            Special::Fnr => "FNR",
            Special::Fs => "FS",
            Special::Ofs => "OFS",
            Special::Rs => "RS",
            Special::Ors => "ORS",
            Special::Filename => "FILENAME",
            Special::Subsep => "SUBSEP",
            Special::Convfmt => "CONVFMT",
            Special::Ofmt => "OFMT",
        }
    }
}

/// What a variable currently holds. A variable becomes a scalar or an
/// array on first use and keeps that shape.
#[derive(Debug, Clone, Default)]
pub enum Slot {
    #[default]
    Uninit,
    Scalar(Value),
    Array(ArrayId),
}

/// Locals of one active user-function call.
#[derive(Debug, Default)]
struct Frame {
    locals: Vec<Slot>,
    /// Arrays created for this frame's own locals, released on return.
    owned: Vec<ArrayId>,
}

/// All interpreter state: variables, arrays, the current record and the
/// call stack. Owned by the caller and borrowed by the executor.
#[derive(Debug)]
pub struct Runtime {
    globals: FxHashMap<String, Slot>,
    pub arrays: ArrayArena,
    frame: Frame,
    saved_frames: Vec<Frame>,
    pub record: Record,
    splitter: Option<FieldSplitter>,
    pub rng: Rng,
    nr: f64,
    fnr: f64,
    fs: String,
    ofs: String,
    rs: String,
    ors: String,
    filename: String,
    subsep: String,
    convfmt: String,
    ofmt: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            globals: FxHashMap::default(),
            arrays: ArrayArena::default(),
            frame: Frame::default(),
            saved_frames: Vec::new(),
            record: Record::default(),
            splitter: None,
            rng: Rng::default(),
            nr: 0.0,
            fnr: 0.0,
            fs: " ".to_string(),
            ofs: " ".to_string(),
            rs: "\n".to_string(),
            ors: "\n".to_string(),
            filename: String::new(),
            subsep: "\x1c".to_string(),
            convfmt: "%.6g".to_string(),
            ofmt: "%.6g".to_string(),
        }
    }

    // --- special variables ---

    pub fn ofs(&self) -> &str {
        &self.ofs
    }

    pub fn ors(&self) -> &str {
        &self.ors
    }

    pub fn rs(&self) -> &str {
        &self.rs
    }

    pub fn subsep(&self) -> &str {
        &self.subsep
    }

    pub fn convfmt(&self) -> &str {
        &self.convfmt
    }

    pub fn ofmt(&self) -> &str {
        &self.ofmt
    }

    pub fn nr(&self) -> f64 {
        self.nr
    }

    pub fn fnr(&self) -> f64 {
        self.fnr
    }

    pub fn get_special(&self, var: Special) -> Value {
        match var {
            Special::Nr => Value::from_number(self.nr),
            Special::Fnr => Value::from_number(self.fnr),
            Special::Nf => Value::from_number(self.record.nf() as f64),
            Special::Fs => Value::from_string(self.fs.as_str()),
            Special::Ofs => Value::from_string(self.ofs.as_str()),
            Special::Rs => Value::from_string(self.rs.as_str()),
            Special::Ors => Value::from_string(self.ors.as_str()),
            Special::Filename => Value::from_input(self.filename.as_str()),
            Special::Subsep => Value::from_string(self.subsep.as_str()),
            Special::Convfmt => Value::from_string(self.convfmt.as_str()),
            Special::Ofmt => Value::from_string(self.ofmt.as_str()),
        }
    }

    pub fn set_special(&mut self, var: Special, value: Value) -> Result<(), RuntimeError> {
        match var {
            Special::Nr => self.nr = value.to_number(),
            Special::Fnr => self.fnr = value.to_number(),
            Special::Nf => {
                let n = value.to_number();
                if n > MAX_FIELDS as f64 {
                    return Err(RuntimeError::FieldTooLarge(n));
                }
                self.record.set_nf(n.max(0.0) as usize, &self.ofs);
            }
            _ => {
                let s = value.into_string_with(&self.convfmt);
                match var {
                    Special::Fs => {
                        self.fs = s;
                        self.splitter = None;
                    }
                    Special::Rs => {
                        self.rs = s;
                        self.splitter = None;
                    }
                    Special::Ofs => self.ofs = s,
                    Special::Ors => self.ors = s,
                    Special::Filename => self.filename = s,
                    Special::Subsep => self.subsep = s,
                    Special::Convfmt => self.convfmt = s,
                    Special::Ofmt => self.ofmt = s,
                    Special::Nr | Special::Fnr | Special::Nf => {}
                }
            }
        }
        Ok(())
    }

    pub fn increment_nr(&mut self) {
        self.nr += 1.0;
        self.fnr += 1.0;
    }

    pub fn reset_fnr(&mut self) {
        self.fnr = 0.0;
    }

    pub fn set_filename(&mut self, name: &str) {
        self.filename.clear();
        self.filename.push_str(name);
    }

    // --- record ---

    /// The splitter for the current `FS`/`RS`, compiled on first use.
    fn splitter(&mut self) -> Result<&FieldSplitter, RuntimeError> {
        match &mut self.splitter {
            Some(s) => Ok(s),
            slot => Ok(slot.insert(FieldSplitter::new(&self.fs, self.rs.is_empty())?)),
        }
    }

    /// Replace `$0` and re-split it under the current `FS`.
    pub fn set_record(&mut self, text: &str) -> Result<(), RuntimeError> {
        self.splitter()?;
        if let Some(splitter) = &self.splitter {
            self.record.set_text(text, splitter);
        }
        Ok(())
    }

    pub fn get_field(&self, idx: usize) -> Value {
        Value::from_input(self.record.field(idx))
    }

    pub fn set_field(&mut self, idx: usize, value: &str) -> Result<(), RuntimeError> {
        if idx == 0 {
            return self.set_record(value);
        }
        if idx > MAX_FIELDS {
            return Err(RuntimeError::FieldTooLarge(idx as f64));
        }
        self.record.set_field(idx, value, &self.ofs);
        Ok(())
    }

    /// A splitter for `split()`'s separator argument.
    pub fn splitter_for(&mut self, sep: Option<&str>) -> Result<FieldSplitter, RuntimeError> {
        match sep {
            None => self.splitter().cloned(),
            Some(sep) => FieldSplitter::new(sep, false),
        }
    }

    // --- variables ---

    fn slot(&self, var: &Var) -> Option<&Slot> {
        match var {
            Var::Global(name) => self.globals.get(name),
            Var::Local(idx) => self.frame.locals.get(*idx),
            Var::Special(_) => None,
        }
    }

    fn slot_mut(&mut self, var: &Var) -> Option<&mut Slot> {
        match var {
            Var::Global(name) => {
                if !self.globals.contains_key(name) {
                    self.globals.insert(name.clone(), Slot::Uninit);
                }
                self.globals.get_mut(name)
            }
            Var::Local(idx) => self.frame.locals.get_mut(*idx),
            Var::Special(_) => None,
        }
    }

    pub fn get_var(&self, var: &Var) -> Result<Value, RuntimeError> {
        if let Var::Special(sp) = var {
            return Ok(self.get_special(*sp));
        }
        match self.slot(var) {
            None | Some(Slot::Uninit) => Ok(Value::default()),
            Some(Slot::Scalar(v)) => Ok(v.clone()),
            Some(Slot::Array(_)) => Err(RuntimeError::ArrayAsScalar(self.var_name(var))),
        }
    }

    pub fn set_var(&mut self, var: &Var, value: Value) -> Result<(), RuntimeError> {
        if let Var::Special(sp) = var {
            return self.set_special(*sp, value);
        }
        match self.slot_mut(var) {
            Some(Slot::Array(_)) => {}
            Some(slot) => {
                *slot = Slot::Scalar(value);
                return Ok(());
            }
            None => return Ok(()),
        }
        Err(RuntimeError::ArrayAsScalar(self.var_name(var)))
    }

    /// The array a variable names, creating it if the variable is unset.
    pub fn array_id(&mut self, var: &Var) -> Result<ArrayId, RuntimeError> {
        let existing = match self.slot_mut(var) {
            Some(Slot::Array(id)) => Some(Some(*id)),
            Some(Slot::Uninit) => Some(None),
            Some(Slot::Scalar(_)) | None => None,
        };
        match existing {
            Some(Some(id)) => return Ok(id),
            Some(None) => {}
            None => return Err(RuntimeError::ScalarAsArray(self.var_name(var))),
        }
        let id = self.arrays.alloc();
        if let Var::Local(_) = var {
            self.frame.owned.push(id);
        }
        if let Some(slot) = self.slot_mut(var) {
            *slot = Slot::Array(id);
        }
        Ok(id)
    }

    /// The array a variable names, if it already is one.
    pub fn existing_array(&self, var: &Var) -> Option<ArrayId> {
        match self.slot(var) {
            Some(Slot::Array(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn is_uninit(&self, var: &Var) -> bool {
        matches!(self.slot(var), None | Some(Slot::Uninit)) && !matches!(var, Var::Special(_))
    }

    fn var_name(&self, var: &Var) -> String {
        match var {
            Var::Global(name) => name.clone(),
            Var::Local(idx) => format!("local #{}", idx + 1),
            Var::Special(sp) => sp.name().to_string(),
        }
    }

    /// Convenience accessors by name, for the driver and for tests.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        match Special::from_name(name) {
            Some(sp) => self.set_special(sp, value),
            None => self.set_var(&Var::Global(name.to_string()), value),
        }
    }

    pub fn global(&self, name: &str) -> Value {
        let var = match Special::from_name(name) {
            Some(sp) => Var::Special(sp),
            None => Var::Global(name.to_string()),
        };
        self.get_var(&var).unwrap_or_default()
    }

    pub fn set_global_element(&mut self, name: &str, key: &str, value: Value) -> Result<(), RuntimeError> {
        let id = self.array_id(&Var::Global(name.to_string()))?;
        self.arrays.get_mut(id).set(key, value);
        Ok(())
    }

    pub fn global_array(&self, name: &str) -> Option<&AwkArray> {
        self.existing_array(&Var::Global(name.to_string()))
            .map(|id| self.arrays.get(id))
    }

    // --- call frames ---

    pub fn call_depth(&self) -> usize {
        self.saved_frames.len()
    }

    /// Enter a function call with its parameter slots.
    pub fn push_frame(&mut self, locals: Vec<Slot>) -> Result<(), RuntimeError> {
        if self.saved_frames.len() >= MAX_CALL_DEPTH {
            return Err(RuntimeError::RecursionLimit(MAX_CALL_DEPTH));
        }
        let callee = Frame { locals, owned: Vec::new() };
        let caller = std::mem::replace(&mut self.frame, callee);
        self.saved_frames.push(caller);
        Ok(())
    }

    /// Leave the current call, releasing arrays its locals created.
    pub fn pop_frame(&mut self) {
        if let Some(caller) = self.saved_frames.pop() {
            let done = std::mem::replace(&mut self.frame, caller);
            for id in done.owned {
                self.arrays.release(id);
            }
        }
    }
}
