//! The tree-walking evaluator.
//!
//! [`Interpreter`] owns every piece of mutable state: variable scopes, the
//! object heap, registries, the output stack and the builtin table. One
//! instance is one isolation unit; nothing is shared between instances, so
//! hosts may run several on parallel threads.
//!
//! Statement execution returns `RunResult<()>`: the `Err` channel carries
//! the non-local signals (`return`, `break`, `continue`, `goto`, throwables,
//! `exit`), each consumed at exactly one level on the way up.

mod call;
mod class_decl;
mod expr;
mod lvalue;

use std::{cell::RefCell, path::PathBuf, rc::Rc};

use ahash::AHashMap;

use crate::{
    ast::{Decl, DeclKind, Expr, ExprKind, Program, Stmt, StmtKind, UseKind},
    builtins,
    exception::{DiagLevel, ErrorKind, FatalError, RunResult, Signal, Thrown},
    globals::{Globals, NsContext},
    heap::{Heap, ObjectId},
    output::OutputStack,
    parse::parse,
    scope::Scope,
    tracer::{ExecTracer, NoopTracer},
    types::{ArrayKey, Builtin, PhpArray},
    value::{Value, loose_eq},
};

/// Superglobals visible from every scope without a `global` declaration.
const SUPERGLOBALS: &[&str] =
    &["GLOBALS", "_GET", "_POST", "_SERVER", "_COOKIE", "_FILES", "_REQUEST", "_ENV", "_SESSION"];

/// Request data used to populate the superglobals of a fresh interpreter.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub uri: String,
    pub query_string: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub get: Vec<(String, String)>,
    pub post: Vec<(String, String)>,
    pub files: Vec<(String, String)>,
}

/// One call frame: local scope plus the object/class context used by
/// `$this`, `self::`, `static::` and visibility checks.
pub(crate) struct Frame {
    pub scope: Scope,
    pub this: Option<ObjectId>,
    /// The class the running method was declared in (`self`).
    pub class: Option<Rc<crate::types::ClassDef>>,
    /// Late-static-binding class (`static`).
    pub static_class: Option<Rc<crate::types::ClassDef>>,
    pub func_name: String,
    /// Positional arguments as bound, for `func_get_args`.
    pub args: Vec<Value>,
}

pub struct Interpreter {
    pub(crate) globals: Globals,
    pub(crate) heap: Heap,
    pub(crate) output: OutputStack,
    pub(crate) builtins: AHashMap<String, Rc<Builtin>>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) ns: Rc<NsContext>,
    pub(crate) strict_types: bool,
    /// Depth of enclosing `@` operators; diagnostics stay silent while > 0.
    pub(crate) suppress: u32,
    /// Collectors for generator bodies currently materializing, innermost
    /// last. `yield` appends to the top collector.
    pub(crate) gen_sink: Vec<Vec<(Value, Value)>>,
    pub(crate) tracer: Box<dyn ExecTracer>,
    pub(crate) current_file: PathBuf,
    pub(crate) cur_line: u32,
    /// Status of an `exit` that reached the top, for the host to mirror.
    pub(crate) exit_status: Option<i32>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut interp = Self {
            globals: Globals::default(),
            heap: Heap::default(),
            output: OutputStack::default(),
            builtins: AHashMap::new(),
            frames: Vec::new(),
            ns: Rc::new(NsContext::default()),
            strict_types: false,
            suppress: 0,
            gen_sink: Vec::new(),
            tracer: Box::new(NoopTracer),
            current_file: PathBuf::from("php input"),
            cur_line: 0,
            exit_status: None,
        };
        builtins::install(&mut interp);
        interp.define_core_constants();
        interp.bootstrap_classes();
        interp.set_request_context(RequestContext::default());
        interp
    }

    pub fn with_tracer(tracer: Box<dyn ExecTracer>) -> Self {
        let mut interp = Self::new();
        interp.tracer = tracer;
        interp
    }

    // --- embedding API ---

    /// Registers a host builtin under `name` (case-insensitive).
    pub fn register_builtin(
        &mut self,
        name: &str,
        func: impl Fn(&mut Self, Vec<Value>) -> RunResult<Value> + 'static,
    ) {
        let builtin = Rc::new(Builtin { name: name.to_owned(), func: Rc::new(func) });
        self.builtins.insert(name.to_ascii_lowercase(), builtin);
    }

    pub fn set_current_dir(&mut self, dir: impl Into<PathBuf>) {
        self.current_file = dir.into().join("php input");
    }

    /// Populates `$_SERVER`, `$_GET`, `$_POST`, `$_COOKIE`, `$_FILES` and
    /// `$_REQUEST` from the host request.
    pub fn set_request_context(&mut self, ctx: RequestContext) {
        let mut server = PhpArray::default();
        if !ctx.method.is_empty() {
            server.insert(ArrayKey::str("REQUEST_METHOD"), Value::string(ctx.method));
        }
        if !ctx.uri.is_empty() {
            server.insert(ArrayKey::str("REQUEST_URI"), Value::string(ctx.uri));
        }
        if !ctx.query_string.is_empty() {
            server.insert(ArrayKey::str("QUERY_STRING"), Value::string(ctx.query_string.clone()));
        }
        for (name, value) in &ctx.headers {
            let key = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
            server.insert(ArrayKey::str(key), Value::string(value.clone()));
        }
        let pairs_array = |pairs: &[(String, String)]| {
            let mut array = PhpArray::default();
            for (key, value) in pairs {
                array.insert(ArrayKey::str(key.clone()), Value::string(value.clone()));
            }
            array
        };
        let mut get = pairs_array(&ctx.get);
        if get.is_empty() && !ctx.query_string.is_empty() {
            for pair in ctx.query_string.split('&') {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                if !key.is_empty() {
                    get.insert(ArrayKey::str(key), Value::string(value));
                }
            }
        }
        let post = pairs_array(&ctx.post);
        let mut request = PhpArray::default();
        for (key, value) in get.iter() {
            request.insert(key.clone(), value.clone());
        }
        for (key, value) in post.iter() {
            request.insert(key.clone(), value.clone());
        }
        let vars = &mut self.globals.vars;
        vars.set("_SERVER", Value::array(server));
        vars.set("_GET", Value::array(get));
        vars.set("_POST", Value::array(post));
        vars.set("_COOKIE", Value::array(pairs_array(&ctx.cookies)));
        vars.set("_FILES", Value::array(pairs_array(&ctx.files)));
        vars.set("_REQUEST", Value::array(request));
        vars.set("_ENV", Value::empty_array());
        vars.set("_SESSION", Value::empty_array());
    }

    /// Parses and evaluates one source text in the interpreter's global
    /// scope. The accumulated output is read separately via
    /// [`take_output`](Self::take_output).
    pub fn eval(&mut self, source: &str) -> Result<Value, FatalError> {
        let (program, errors) = parse(source);
        if let Some(first) = errors.into_iter().next() {
            let rendered = format!(
                "\nParse error: {} in {} on line {}\n",
                first.message,
                self.current_file.display(),
                first.pos.line
            );
            self.output.write(rendered.as_bytes());
            return Err(FatalError::Parse(first));
        }
        self.run_program(&program)
    }

    /// Loads, parses and evaluates a file, updating the current-file context
    /// used by `__FILE__`, relative includes and diagnostics.
    pub fn eval_file(&mut self, path: impl Into<PathBuf>) -> Result<Value, FatalError> {
        let path = path.into();
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                let parse_error = crate::parse::ParseError {
                    message: format!("cannot open {}: {err}", path.display()),
                    pos: crate::token::Pos::start(),
                };
                return Err(FatalError::Parse(parse_error));
            }
        };
        self.current_file = path;
        self.eval(&source)
    }

    /// Drains the process output accumulated so far, flushing any open
    /// `ob_start` buffers in LIFO order.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.output.finish()
    }

    pub fn take_output_string(&mut self) -> String {
        String::from_utf8_lossy(&self.take_output()).into_owned()
    }

    /// Exit status requested by `exit`/`die`, if any.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Runs `__destruct` for live objects and flushes buffers. Call once
    /// when the host is done with the instance.
    pub fn shutdown(&mut self) {
        for id in self.heap.live_ids() {
            let has_destructor = self
                .heap
                .get(id)
                .is_some_and(|obj| obj.class.find_method("__destruct").is_some());
            if has_destructor {
                let _ = self.call_method_by_name(id, "__destruct", Vec::new());
            }
        }
    }

    fn run_program(&mut self, program: &Program) -> Result<Value, FatalError> {
        let previous_strict = self.strict_types;
        let previous_ns = Rc::clone(&self.ns);
        self.strict_types = program.strict_types;
        self.hoist_declarations(&program.stmts);
        self.ns = Rc::clone(&previous_ns);
        let result = self.exec_stmts(&program.stmts);
        self.strict_types = previous_strict;
        self.ns = previous_ns;
        match result {
            Ok(()) => Ok(Value::Null),
            Err(Signal::Return(value)) => Ok(value),
            Err(Signal::Exit(status)) => {
                self.exit_status = Some(status);
                Ok(Value::Null)
            }
            Err(Signal::Throw(thrown)) => {
                let message = self.thrown_message(&thrown);
                let rendered = format!(
                    "\nFatal error: Uncaught {}: {} in {}:{}\nStack trace:\n#0 {{main}}\n  thrown in {} on line {}\n",
                    thrown.class_name,
                    message,
                    self.current_file.display(),
                    self.cur_line,
                    self.current_file.display(),
                    self.cur_line,
                );
                self.output.write(rendered.as_bytes());
                Err(FatalError::UncaughtThrow { class_name: thrown.class_name, message })
            }
            Err(Signal::Break(_) | Signal::Continue(_)) => {
                let rendered = "\nFatal error: 'break' not in the 'loop' or 'switch' context\n";
                self.output.write(rendered.as_bytes());
                Err(FatalError::UncaughtThrow {
                    class_name: "Error".to_owned(),
                    message: "break/continue outside loop".to_owned(),
                })
            }
            Err(Signal::Goto(label)) => {
                let rendered = format!("\nFatal error: 'goto' to undefined label '{label}'\n");
                self.output.write(rendered.as_bytes());
                Err(FatalError::UncaughtThrow {
                    class_name: "Error".to_owned(),
                    message: format!("goto to undefined label '{label}'"),
                })
            }
        }
    }

    /// Message stored on a throwable object.
    pub(crate) fn thrown_message(&self, thrown: &Thrown) -> String {
        if let Value::Object(id) = &thrown.value {
            if let Some(obj) = self.heap.get(*id) {
                if let Some(message) = obj.props.get("message") {
                    return message.display_lossy();
                }
            }
        }
        String::new()
    }

    /// Pre-declares unconditional top-level functions and classes so calls
    /// may precede their declaration in source order.
    fn hoist_declarations(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let StmtKind::Decl(decl) = &stmt.kind {
                match &decl.kind {
                    DeclKind::Namespace { name, body } => {
                        let previous = Rc::clone(&self.ns);
                        self.ns = Rc::new(NsContext {
                            prefix: name.clone().unwrap_or_default(),
                            ..NsContext::default()
                        });
                        if let Some(body) = body {
                            self.hoist_declarations(body);
                            self.ns = previous;
                        }
                    }
                    DeclKind::Use { kind, items } => self.apply_use(*kind, items),
                    DeclKind::Function(func) => self.declare_function(func),
                    DeclKind::Class(class) => {
                        let _ = self.declare_class_like(class);
                    }
                    _ => {}
                }
            }
        }
    }

    // --- frames & scopes ---

    pub(crate) fn scope(&self) -> &Scope {
        self.frames.last().map_or(&self.globals.vars, |f| &f.scope)
    }

    pub(crate) fn scope_mut(&mut self) -> &mut Scope {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.scope,
            None => &mut self.globals.vars,
        }
    }

    pub(crate) fn is_superglobal(name: &str) -> bool {
        SUPERGLOBALS.contains(&name)
    }

    pub(crate) fn frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn current_this(&self) -> Option<ObjectId> {
        self.frames.last().and_then(|f| f.this)
    }

    pub(crate) fn current_class(&self) -> Option<Rc<crate::types::ClassDef>> {
        self.frames.last().and_then(|f| f.class.clone())
    }

    pub(crate) fn static_class(&self) -> Option<Rc<crate::types::ClassDef>> {
        self.frames.last().and_then(|f| f.static_class.clone())
    }

    // --- diagnostics ---

    pub(crate) fn diag(&mut self, level: DiagLevel, message: &str) {
        self.tracer.on_diagnostic(level, message, self.cur_line);
        if self.suppress == 0 {
            let rendered = format!(
                "\n{level}: {message} in {} on line {}\n",
                self.current_file.display(),
                self.cur_line
            );
            self.output.write(rendered.as_bytes());
        }
    }

    pub(crate) fn notice(&mut self, message: &str) {
        self.diag(DiagLevel::Notice, message);
    }

    pub(crate) fn warning(&mut self, message: &str) {
        self.diag(DiagLevel::Warning, message);
    }

    /// Builds a throwable of the given engine error class.
    pub(crate) fn error(&mut self, kind: ErrorKind, message: impl Into<String>) -> Signal {
        let message = message.into();
        let class_name: &'static str = kind.into();
        let class = self
            .globals
            .lookup_class(&class_name.to_ascii_lowercase())
            .or_else(|| self.globals.lookup_class("error"))
            .expect("error classes are bootstrapped");
        let id = self.heap.alloc(Rc::clone(&class));
        let file = self.current_file.display().to_string();
        let line = i64::from(self.cur_line);
        if let Some(obj) = self.heap.get_mut(id) {
            obj.props.insert("message".to_owned(), Value::string(message));
            obj.props.insert("code".to_owned(), Value::Int(0));
            obj.props.insert("file".to_owned(), Value::string(file));
            obj.props.insert("line".to_owned(), Value::Int(line));
            obj.props.insert("previous".to_owned(), Value::Null);
        }
        Signal::Throw(Thrown { value: Value::Object(id), class_name: class.name.clone() })
    }

    // --- statements ---

    pub(crate) fn exec_stmts(&mut self, stmts: &[Stmt]) -> RunResult<()> {
        let mut index = 0;
        while index < stmts.len() {
            match self.exec_stmt(&stmts[index]) {
                Ok(()) => index += 1,
                Err(Signal::Goto(label)) => {
                    let target = stmts.iter().position(
                        |s| matches!(&s.kind, StmtKind::Label(l) if *l == label),
                    );
                    match target {
                        Some(at) => index = at + 1,
                        None => return Err(Signal::Goto(label)),
                    }
                }
                Err(signal) => return Err(signal),
            }
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> RunResult<()> {
        self.cur_line = stmt.pos.line;
        match &stmt.kind {
            StmtKind::Empty | StmtKind::Label(_) | StmtKind::HaltCompiler | StmtKind::Bad => Ok(()),
            StmtKind::Expr(expr) => {
                self.eval_expr(expr)?;
                Ok(())
            }
            StmtKind::Block(body) => self.exec_stmts(body),
            StmtKind::Echo(exprs) => {
                for expr in exprs {
                    let value = self.eval_expr(expr)?;
                    self.echo_value(value)?;
                }
                Ok(())
            }
            StmtKind::InlineHtml(bytes) => {
                self.output.write(bytes);
                Ok(())
            }
            StmtKind::If { cond, then, elseifs, else_ } => {
                if self.eval_expr(cond)?.truthy() {
                    return self.exec_stmts(then);
                }
                for (cond, body) in elseifs {
                    if self.eval_expr(cond)?.truthy() {
                        return self.exec_stmts(body);
                    }
                }
                if let Some(body) = else_ {
                    return self.exec_stmts(body);
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                while self.eval_expr(cond)?.truthy() {
                    if self.run_loop_body(body)? {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::DoWhile { body, cond } => {
                loop {
                    if self.run_loop_body(body)? {
                        break;
                    }
                    if !self.eval_expr(cond)?.truthy() {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::For { init, cond, step, body } => {
                for expr in init {
                    self.eval_expr(expr)?;
                }
                loop {
                    let mut keep_going = true;
                    for expr in cond {
                        keep_going = self.eval_expr(expr)?.truthy();
                    }
                    if !keep_going {
                        break;
                    }
                    if self.run_loop_body(body)? {
                        break;
                    }
                    for expr in step {
                        self.eval_expr(expr)?;
                    }
                }
                Ok(())
            }
            StmtKind::Foreach { subject, key_var, value_var, by_ref, body } => {
                self.exec_foreach(subject, key_var.as_ref(), value_var, *by_ref, body)
            }
            StmtKind::Switch { subject, cases } => self.exec_switch(subject, cases),
            StmtKind::Break(level) => Err(Signal::Break(*level)),
            StmtKind::Continue(level) => Err(Signal::Continue(*level)),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                Err(Signal::Return(value))
            }
            StmtKind::Goto(label) => Err(Signal::Goto(label.clone())),
            StmtKind::Throw(expr) => {
                let value = self.eval_expr(expr)?;
                Err(self.throw_value(value))
            }
            StmtKind::Try { body, catches, finally } => self.exec_try(body, catches, finally.as_deref()),
            StmtKind::Global(names) => {
                for name in names {
                    let slot = self.globals.vars.slot(name);
                    if let Some(frame) = self.frames.last_mut() {
                        frame.scope.bind_slot(name, slot);
                    }
                }
                Ok(())
            }
            StmtKind::StaticVars(vars) => {
                for (name, init) in vars {
                    let func = self.frames.last().map_or_else(String::new, |f| f.func_name.clone());
                    let key = format!("{func}::{name}");
                    let slot = match self.globals.statics.get(&key) {
                        Some(slot) => Rc::clone(slot),
                        None => {
                            let initial = match init {
                                Some(expr) => self.eval_expr(expr)?,
                                None => Value::Null,
                            };
                            let slot = Rc::new(RefCell::new(initial));
                            self.globals.statics.insert(key, Rc::clone(&slot));
                            slot
                        }
                    };
                    self.scope_mut().bind_slot(name, slot);
                }
                Ok(())
            }
            StmtKind::Unset(targets) => {
                for target in targets {
                    self.unset_target(target)?;
                }
                Ok(())
            }
            StmtKind::Declare { body, .. } => {
                // strict_types is consumed at program level; other
                // directives (ticks, encoding) are accepted and ignored.
                match body {
                    Some(body) => self.exec_stmts(body),
                    None => Ok(()),
                }
            }
            StmtKind::Decl(decl) => self.exec_decl(decl),
        }
    }

    /// Runs a loop body once. `Ok(true)` means the loop should break.
    fn run_loop_body(&mut self, body: &[Stmt]) -> RunResult<bool> {
        match self.exec_stmts(body) {
            Ok(()) => Ok(false),
            Err(Signal::Break(1)) => Ok(true),
            Err(Signal::Break(n)) => Err(Signal::Break(n - 1)),
            Err(Signal::Continue(1)) => Ok(false),
            Err(Signal::Continue(n)) => Err(Signal::Continue(n - 1)),
            Err(signal) => Err(signal),
        }
    }

    fn exec_switch(&mut self, subject: &Expr, cases: &[crate::ast::SwitchCase]) -> RunResult<()> {
        let value = self.eval_expr(subject)?;
        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let test_value = self.eval_expr(test)?;
                if loose_eq(&value, &test_value, &self.heap) {
                    start = Some(index);
                    break;
                }
            }
        }
        if start.is_none() {
            start = cases.iter().position(|c| c.test.is_none());
        }
        let Some(start) = start else { return Ok(()) };
        for case in &cases[start..] {
            match self.exec_stmts(&case.body) {
                Ok(()) => {}
                Err(Signal::Break(1)) => return Ok(()),
                Err(Signal::Break(n)) => return Err(Signal::Break(n - 1)),
                Err(Signal::Continue(1)) => return Ok(()),
                Err(Signal::Continue(n)) => return Err(Signal::Continue(n - 1)),
                Err(signal) => return Err(signal),
            }
        }
        Ok(())
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        catches: &[crate::ast::CatchClause],
        finally: Option<&[Stmt]>,
    ) -> RunResult<()> {
        let mut result = self.exec_stmts(body);
        if let Err(Signal::Throw(thrown)) = &result {
            let thrown = thrown.clone();
            if let Some(clause) = self.matching_catch(catches, &thrown) {
                if let Some(var) = &clause.var {
                    self.scope_mut().set(var, thrown.value.clone());
                }
                result = self.exec_stmts(&clause.body);
            }
        }
        if let Some(finally_body) = finally {
            match self.exec_stmts(finally_body) {
                Ok(()) => {}
                // A signal raised in finally supersedes the in-flight one.
                Err(signal) => return Err(signal),
            }
        }
        result
    }

    fn matching_catch<'c>(
        &self,
        catches: &'c [crate::ast::CatchClause],
        thrown: &Thrown,
    ) -> Option<&'c crate::ast::CatchClause> {
        let class = match &thrown.value {
            Value::Object(id) => Rc::clone(&self.heap.get(*id)?.class),
            _ => return None,
        };
        catches.iter().find(|clause| {
            clause.types.iter().any(|ty| {
                let resolved = self.ns.resolve_class(ty);
                class.instance_of(&resolved)
            })
        })
    }

    /// Validates and wraps a value thrown by user code.
    pub(crate) fn throw_value(&mut self, value: Value) -> Signal {
        match value.clone().deref() {
            Value::Object(id) => {
                let class_name = self
                    .heap
                    .get(id)
                    .map_or_else(|| "Exception".to_owned(), |obj| obj.class.name.clone());
                let throwable = self
                    .heap
                    .get(id)
                    .is_some_and(|obj| obj.class.instance_of("throwable"));
                if throwable {
                    Signal::Throw(Thrown { value: Value::Object(id), class_name })
                } else {
                    self.error(
                        ErrorKind::Error,
                        format!("Cannot throw objects that do not implement Throwable, {class_name} given"),
                    )
                }
            }
            other => self.error(
                ErrorKind::Error,
                format!("Can only throw objects, {} given", other.type_display()),
            ),
        }
    }

    // --- declarations ---

    fn exec_decl(&mut self, decl: &Decl) -> RunResult<()> {
        match &decl.kind {
            DeclKind::Namespace { name, body } => {
                let fresh = Rc::new(NsContext {
                    prefix: name.clone().unwrap_or_default(),
                    ..NsContext::default()
                });
                match body {
                    Some(body) => {
                        let previous = std::mem::replace(&mut self.ns, fresh);
                        let result = self.exec_stmts(body);
                        self.ns = previous;
                        result
                    }
                    None => {
                        self.ns = fresh;
                        Ok(())
                    }
                }
            }
            DeclKind::Use { kind, items } => {
                self.apply_use(*kind, items);
                Ok(())
            }
            DeclKind::Const(entries) => {
                for (name, expr) in entries {
                    let value = self.eval_expr(expr)?;
                    let fq = if self.ns.prefix.is_empty() {
                        name.clone()
                    } else {
                        format!("{}\\{name}", self.ns.prefix)
                    };
                    if self.globals.constants.contains_key(&fq) {
                        self.warning(&format!("Constant {fq} already defined"));
                    } else {
                        self.globals.constants.insert(fq, value);
                    }
                }
                Ok(())
            }
            DeclKind::Function(func) => {
                self.declare_function(func);
                Ok(())
            }
            DeclKind::Class(class) => self.declare_class_like(class),
            DeclKind::Bad => Ok(()),
        }
    }

    fn apply_use(&mut self, kind: UseKind, items: &[crate::ast::UseItem]) {
        let ns = Rc::make_mut(&mut self.ns);
        for item in items {
            let last = item.path.rsplit('\\').next().unwrap_or(&item.path).to_owned();
            let alias = item.alias.clone().unwrap_or(last);
            match kind {
                UseKind::Class => {
                    ns.class_aliases.insert(alias.to_ascii_lowercase(), item.path.clone());
                }
                UseKind::Function => {
                    ns.func_aliases.insert(alias.to_ascii_lowercase(), item.path.clone());
                }
                UseKind::Const => {
                    ns.const_aliases.insert(alias, item.path.clone());
                }
            }
        }
    }

    // --- output ---

    /// `echo`/`print`/inline-text write path: coerces through `__toString`
    /// and routes bytes to the top output sink.
    pub(crate) fn echo_value(&mut self, value: Value) -> RunResult<()> {
        let bytes = self.coerce_to_string(value)?;
        self.output.write(&bytes);
        Ok(())
    }

    /// String coercion including the object cases the pure value layer
    /// cannot handle.
    pub(crate) fn coerce_to_string(&mut self, value: Value) -> RunResult<Vec<u8>> {
        match value.deref() {
            Value::Object(id) => {
                let class = self
                    .heap
                    .get(id)
                    .map(|obj| Rc::clone(&obj.class))
                    .ok_or_else(|| self.error(ErrorKind::Error, "stale object handle"))?;
                if class.find_method("__tostring").is_some() {
                    let result = self.call_method_by_name(id, "__toString", Vec::new())?;
                    match result.deref() {
                        Value::Str(s) => Ok(s.to_vec()),
                        _ => Err(self.error(
                            ErrorKind::TypeError,
                            format!("{}::__toString(): Return value must be of type string", class.name),
                        )),
                    }
                } else if class.kind == crate::ast::ClassKind::Enum {
                    Err(self.error(
                        ErrorKind::Error,
                        format!("Object of class {} could not be converted to string", class.name),
                    ))
                } else {
                    Err(self.error(
                        ErrorKind::Error,
                        format!("Object of class {} could not be converted to string", class.name),
                    ))
                }
            }
            Value::Array(_) => {
                self.notice("Array to string conversion");
                Ok(b"Array".to_vec())
            }
            Value::Closure(_) => Err(self.error(
                ErrorKind::Error,
                "Object of class Closure could not be converted to string",
            )),
            Value::Generator(_) => Err(self.error(
                ErrorKind::Error,
                "Object of class Generator could not be converted to string",
            )),
            other => Ok(other.to_bytes_lossy()),
        }
    }

    // --- foreach ---

    fn exec_foreach(
        &mut self,
        subject: &Expr,
        key_var: Option<&Expr>,
        value_var: &Expr,
        by_ref: bool,
        body: &[Stmt],
    ) -> RunResult<()> {
        let subject_value = self.eval_expr(subject)?.deref();
        match subject_value {
            Value::Array(array) => {
                if by_ref {
                    return self.foreach_array_by_ref(subject, key_var, value_var, body);
                }
                // The Rc clone is the iteration snapshot: body mutations to
                // the source array do not disturb it.
                for (key, value) in array.iter() {
                    if let Some(kv) = key_var {
                        self.assign_to(kv, key.to_value())?;
                    }
                    self.assign_to(value_var, value.clone().deref())?;
                    if self.run_loop_body(body)? {
                        break;
                    }
                }
                Ok(())
            }
            Value::Generator(gen) => {
                gen.borrow_mut().rewind();
                loop {
                    let (valid, key, value) = {
                        let g = gen.borrow();
                        (g.valid(), g.key(), g.current())
                    };
                    if !valid {
                        break;
                    }
                    if let Some(kv) = key_var {
                        self.assign_to(kv, key)?;
                    }
                    self.assign_to(value_var, value)?;
                    let stop = self.run_loop_body(body)?;
                    gen.borrow_mut().advance();
                    if stop {
                        break;
                    }
                }
                Ok(())
            }
            Value::Object(id) => {
                let props: Vec<(String, Value)> = {
                    let Some(obj) = self.heap.get(id) else { return Ok(()) };
                    let in_class = self
                        .current_class()
                        .is_some_and(|c| Rc::ptr_eq(&c, &obj.class));
                    obj.props
                        .iter()
                        .filter(|(name, _)| {
                            in_class
                                || obj.class.find_prop(name.as_str()).is_none_or(|p| {
                                    p.visibility == crate::ast::Visibility::Public
                                })
                        })
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect()
                };
                for (name, value) in props {
                    if let Some(kv) = key_var {
                        self.assign_to(kv, Value::string(name))?;
                    }
                    self.assign_to(value_var, value.deref())?;
                    if self.run_loop_body(body)? {
                        break;
                    }
                }
                Ok(())
            }
            Value::Null => {
                self.warning("foreach() argument must be of type array|object, null given");
                Ok(())
            }
            other => {
                self.warning(&format!(
                    "foreach() argument must be of type array|object, {} given",
                    other.type_display()
                ));
                Ok(())
            }
        }
    }

    /// By-ref iteration writes through to the source array's cells; the
    /// subject must be writable for that to mean anything.
    fn foreach_array_by_ref(
        &mut self,
        subject: &Expr,
        key_var: Option<&Expr>,
        value_var: &Expr,
        body: &[Stmt],
    ) -> RunResult<()> {
        let value_name = match &value_var.kind {
            ExprKind::Variable(name) => name.clone(),
            _ => {
                return Err(self.error(
                    ErrorKind::Error,
                    "foreach by reference requires a variable as value",
                ));
            }
        };
        let keys: Vec<ArrayKey> = match self.eval_expr(subject)?.deref() {
            Value::Array(array) => array.keys().cloned().collect(),
            _ => return Ok(()),
        };
        for key in keys {
            let slot = self.ref_into_index(subject, &key)?;
            if let Some(kv) = key_var {
                self.assign_to(kv, key.to_value())?;
            }
            self.scope_mut().bind_slot(&value_name, slot);
            if self.run_loop_body(body)? {
                break;
            }
        }
        Ok(())
    }
}
