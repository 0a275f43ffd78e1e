// src/slicer/scripts.rs

//! Mutate script sandbox
//!
//! Each slice may carry a `mutate` script in an embedded expression
//! language. Scripts see exactly one object, `content`, with three verbs:
//!
//! - `content.read(path)` — path must be a selected regular file
//! - `content.write(path, text)` — path must be declared `mutable` by the
//!   slice owning the script
//! - `content.list(path)` — path must be a selected directory or a parent
//!   of selected content; returns sorted basenames
//!
//! The interpreter has no filesystem or system access of its own; every
//! effect goes through these bindings, and violations surface as errors
//! naming the offending slice.

use crate::error::{Error, Result};
use crate::fsutil::clean_abs;
use crate::hash::sha256;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Position, Scope};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// One write performed by a script, for the report's mutate pass
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptWrite {
    /// Rooted relative path
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

struct Shared {
    root: PathBuf,
    /// Every selected rooted path of the run; directories end with `/`
    selected: BTreeSet<String>,
    /// Paths the current slice declared `mutable: true`
    mutable: BTreeSet<String>,
    writes: Vec<ScriptWrite>,
}

impl Shared {
    fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_start_matches('/'))
    }
}

#[derive(Clone)]
struct Content(Rc<RefCell<Shared>>);

fn runtime(message: String) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(message.into(), Position::NONE))
}

impl Content {
    fn read(&mut self, path: &str) -> std::result::Result<String, Box<EvalAltResult>> {
        let shared = self.0.borrow();
        let clean = clean_abs(path);
        if shared.selected.contains(&clean) {
            let data = std::fs::read(shared.abs(&clean))
                .map_err(|e| runtime(format!("cannot read file {clean}: {e}")))?;
            return Ok(String::from_utf8_lossy(&data).to_string());
        }
        if shared.selected.contains(&format!("{clean}/")) {
            return Err(runtime(format!("content is not a file: {clean}")));
        }
        Err(runtime(format!(
            "cannot read file which is not selected: {clean}"
        )))
    }

    fn write(&mut self, path: &str, data: &str) -> std::result::Result<(), Box<EvalAltResult>> {
        let mut shared = self.0.borrow_mut();
        let clean = clean_abs(path);
        if !shared.mutable.contains(&clean) {
            return Err(runtime(format!(
                "cannot write file which is not mutable: {clean}"
            )));
        }
        let abs = shared.abs(&clean);
        std::fs::write(&abs, data)
            .map_err(|e| runtime(format!("cannot write file {clean}: {e}")))?;
        shared.writes.push(ScriptWrite {
            path: clean,
            sha256: sha256(data.as_bytes()),
            size: data.len() as u64,
        });
        Ok(())
    }

    fn list(&mut self, path: &str) -> std::result::Result<Array, Box<EvalAltResult>> {
        let shared = self.0.borrow();
        let clean = clean_abs(path);
        if clean != "/" && shared.selected.contains(&clean) {
            return Err(runtime(format!("content is not a directory: {clean}")));
        }
        let dir = if clean == "/" {
            clean
        } else {
            format!("{clean}/")
        };
        if !shared.selected.iter().any(|p| p.starts_with(&dir)) {
            return Err(runtime(format!(
                "cannot list directory which is not selected: {dir}"
            )));
        }
        let abs = shared.abs(&dir);
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&abs)
            .map_err(|e| runtime(format!("cannot list directory {dir}: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| runtime(format!("cannot list directory {dir}: {e}")))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names.into_iter().map(Dynamic::from).collect())
    }
}

/// Options for [`run_script`]
pub struct RunScriptOptions<'a> {
    /// Name of the slice owning the script, used in error messages
    pub slice: String,
    pub script: &'a str,
    /// Target tree the run materializes into
    pub root: &'a Path,
    /// Every selected rooted path of the run
    pub selected: &'a BTreeSet<String>,
    /// Paths this slice may overwrite
    pub mutable: BTreeSet<String>,
}

/// Run one slice's mutate script and return the writes it performed
pub fn run_script(options: RunScriptOptions) -> Result<Vec<ScriptWrite>> {
    let shared = Rc::new(RefCell::new(Shared {
        root: options.root.to_path_buf(),
        selected: options.selected.clone(),
        mutable: options.mutable,
        writes: Vec::new(),
    }));

    let mut engine = Engine::new();
    engine.register_type_with_name::<Content>("Content");
    engine.register_fn("read", Content::read);
    engine.register_fn("write", Content::write);
    engine.register_fn("list", Content::list);

    let mut scope = Scope::new();
    scope.push("content", Content(shared.clone()));

    engine
        .run_with_scope(&mut scope, options.script)
        .map_err(|err| Error::Script {
            slice: options.slice.clone(),
            message: script_message(&err),
        })?;

    let writes = shared.borrow_mut().writes.split_off(0);
    Ok(writes)
}

fn script_message(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => value.to_string(),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => script_message(inner),
        other => other.to_string(),
    }
}
