//! Assembly emission.
//!
//! Two passes over the tree: the first collects function signatures,
//! user labels, and string literals (ids are assignment order); the
//! second emits main-program code and, into a separate buffer appended
//! after the main `EXIT_OP`, the function bodies.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::strings::{store::GameStrings, text as strings_text};
use crate::uwscript::ast::{
    AssignOp, BinOp, Expr, ExprKind, IfArm, LValue, Span, Stmt, StmtKind, UnOp,
};
use crate::uwscript::lexer::Lexer;
use crate::uwscript::temps::TempAllocator;
use crate::uwscript::{parser, CompileError};

#[derive(Debug)]
pub struct CompiledProgram {
    pub assembly: String,
    pub strings_text: String,
    pub warnings: Vec<String>,
}

pub fn compile(source: &str, block_id: u16) -> Result<CompiledProgram, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = parser::parse(tokens)?;
    let mut generator = Generator::new(block_id);
    generator.collect_program(&program);
    generator.generate_program(&program)?;
    Ok(generator.finish())
}

/// Imported-function ids reachable as builtin calls.
fn builtin_id(name: &str) -> Option<u16> {
    Some(match name {
        "compare" => 4,
        "random" => 5,
        "contains" => 7,
        "string_length" => 11,
        "get_quest" => 15,
        "set_quest" => 16,
        "gronk_door" => 37,
        "clear_screen" => 100,
        "set_pixel" => 101,
        "draw_line" => 102,
        "draw_rect" => 103,
        "fill_rect" => 104,
        "draw_circle" => 105,
        "draw_sprite" => 106,
        "print" => 107,
        "flip_display" => 109,
        "play_tone" => 200,
        "is_key_pressed" => 300,
        "is_key_released" => 301,
        "math_sin" => 501,
        "math_cos" => 502,
        "math_sqrt" => 503,
        "delay_ms" => 900,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarType {
    Integer,
    Str,
    Array,
}

struct FunctionScope {
    params: Vec<String>,
    /// Parameters and locals in declaration order, for the header.
    order: Vec<String>,
    offsets: BTreeMap<String, i32>,
    next_local: u16,
}

impl FunctionScope {
    fn new(params: &[String]) -> Self {
        let mut offsets = BTreeMap::new();
        let mut order = Vec::new();
        // The rightmost parameter sits closest to the frame, at -2;
        // earlier parameters below it.
        let count = params.len() as i32;
        for (index, param) in params.iter().enumerate() {
            let offset = -(2 + (count - 1 - index as i32));
            offsets.insert(param.clone(), offset);
            order.push(param.clone());
        }
        Self {
            params: params.to_vec(),
            order,
            offsets,
            next_local: 0,
        }
    }

    fn lookup(&self, name: &str) -> Option<i32> {
        self.offsets.get(name).copied()
    }

    fn allocate(&mut self, name: &str, size: u16) -> i32 {
        if let Some(offset) = self.lookup(name) {
            return offset;
        }
        let offset = i32::from(self.next_local);
        self.next_local += size;
        self.offsets.insert(name.to_string(), offset);
        self.order.push(name.to_string());
        offset
    }
}

enum EmitTarget {
    Main,
    Function,
}

struct Generator {
    block_id: u16,
    string_literals: Vec<String>,
    globals: BTreeMap<String, u16>,
    global_order: Vec<String>,
    next_global: u16,
    var_types: BTreeMap<String, VarType>,
    var_sizes: BTreeMap<String, u16>,
    functions: BTreeMap<String, Vec<String>>,
    function_order: Vec<String>,
    scopes: BTreeMap<String, FunctionScope>,
    user_labels: BTreeSet<String>,
    label_counter: usize,
    main_code: Vec<String>,
    func_code: Vec<String>,
    target: EmitTarget,
    current_function: Option<String>,
    temps: TempAllocator,
    warnings: Vec<String>,
}

impl Generator {
    fn new(block_id: u16) -> Self {
        Self {
            block_id,
            string_literals: Vec::new(),
            globals: BTreeMap::new(),
            global_order: Vec::new(),
            next_global: 0,
            var_types: BTreeMap::new(),
            var_sizes: BTreeMap::new(),
            functions: BTreeMap::new(),
            function_order: Vec::new(),
            scopes: BTreeMap::new(),
            user_labels: BTreeSet::new(),
            label_counter: 0,
            main_code: Vec::new(),
            func_code: Vec::new(),
            target: EmitTarget::Main,
            current_function: None,
            temps: TempAllocator::new(),
            warnings: Vec::new(),
        }
    }

    // ---- first pass ----

    fn collect_program(&mut self, program: &[Stmt]) {
        for stmt in program {
            self.collect_stmt(stmt);
        }
    }

    fn collect_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let { value, .. } => self.collect_expr(value),
            StmtKind::Assign { target, value, .. } => {
                if let LValue::Element { index, .. } = target {
                    self.collect_expr(index);
                }
                self.collect_expr(value);
            }
            StmtKind::If { arms, else_body } => {
                for IfArm { cond, body } in arms {
                    self.collect_expr(cond);
                    for stmt in body {
                        self.collect_stmt(stmt);
                    }
                }
                for stmt in else_body {
                    self.collect_stmt(stmt);
                }
            }
            StmtKind::While { cond, body } => {
                self.collect_expr(cond);
                for stmt in body {
                    self.collect_stmt(stmt);
                }
            }
            StmtKind::Function { name, params, body } => {
                self.functions.insert(name.clone(), params.clone());
                self.function_order.push(name.clone());
                self.scopes
                    .insert(name.clone(), FunctionScope::new(params));
                for stmt in body {
                    self.collect_stmt(stmt);
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.collect_expr(value);
                }
            }
            StmtKind::Say(expr) => self.collect_expr(expr),
            StmtKind::Menu { items, .. } => {
                for item in items {
                    self.collect_expr(item);
                }
            }
            StmtKind::FilterMenu { entries, .. } => {
                for (item, flag) in entries {
                    self.collect_expr(item);
                    self.collect_expr(flag);
                }
            }
            StmtKind::Label(name) => {
                self.user_labels.insert(name.clone());
            }
            StmtKind::Expr(expr) => self.collect_expr(expr),
            StmtKind::Ask { .. } | StmtKind::Goto(_) | StmtKind::Exit => {}
        }
    }

    fn collect_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Str(text) => self.add_literal(text),
            ExprKind::Array(elements) => {
                for element in elements {
                    self.collect_expr(element);
                }
            }
            ExprKind::Index { base, index } => {
                self.collect_expr(base);
                self.collect_expr(index);
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.collect_expr(arg);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.collect_expr(lhs);
                self.collect_expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.collect_expr(operand),
            ExprKind::Number(_) | ExprKind::Bool(_) | ExprKind::Ident(_) => {}
        }
    }

    fn add_literal(&mut self, text: &str) {
        if !self.string_literals.iter().any(|s| s == text) {
            self.string_literals.push(text.to_string());
        }
    }

    fn literal_index(&self, text: &str) -> Option<usize> {
        self.string_literals.iter().position(|s| s == text)
    }

    // ---- emission plumbing ----

    fn emit(&mut self, line: impl Into<String>) {
        let line = line.into();
        match self.target {
            EmitTarget::Main => self.main_code.push(line),
            EmitTarget::Function => self.func_code.push(line),
        }
    }

    fn new_label(&mut self) -> String {
        let label = format!("label_{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    // ---- variables ----

    fn lookup_variable(&self, name: &str) -> Option<i32> {
        if let Some(function) = &self.current_function {
            if let Some(offset) = self.scopes[function].lookup(name) {
                return Some(offset);
            }
        }
        self.globals.get(name).map(|&offset| i32::from(offset))
    }

    fn allocate_variable(&mut self, name: &str, size: u16) -> i32 {
        if let Some(function) = &self.current_function {
            let function = function.clone();
            return self
                .scopes
                .get_mut(&function)
                .expect("current function has a scope")
                .allocate(name, size);
        }
        if let Some(&offset) = self.globals.get(name) {
            return i32::from(offset);
        }
        let offset = self.next_global;
        self.next_global += size;
        self.globals.insert(name.to_string(), offset);
        self.global_order.push(name.to_string());
        i32::from(offset)
    }

    // ---- second pass ----

    fn generate_program(&mut self, program: &[Stmt]) -> Result<(), CompileError> {
        self.emit("START");
        for stmt in program {
            if let StmtKind::Function { name, params, body } = &stmt.kind {
                self.generate_function(name, params, body)?;
            } else {
                self.generate_stmt(stmt)?;
            }
        }
        self.emit("EXIT_OP");
        Ok(())
    }

    fn generate_function(
        &mut self,
        name: &str,
        _params: &[String],
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        self.current_function = Some(name.to_string());
        self.target = EmitTarget::Function;

        self.emit(format!("{name}:"));
        self.emit("PUSHBP");
        self.emit("SPTOBP");
        // Local-cell budget is patched in after the body is generated.
        let reserve_at = self.func_code.len();
        self.emit("PUSHI 0");
        self.emit("ADDSP");

        for stmt in body {
            self.generate_stmt(stmt)?;
        }

        let explicit_return = matches!(body.last(), Some(stmt) if matches!(stmt.kind, StmtKind::Return(_)));
        if !explicit_return {
            self.emit("PUSHI 0");
            self.emit("SAVE_REG");
            self.emit("BPTOSP");
            self.emit("POPBP");
            self.emit("RET");
        }

        let locals = self.scopes[name].next_local;
        self.func_code[reserve_at] = format!("PUSHI {locals}");

        self.target = EmitTarget::Main;
        self.current_function = None;
        Ok(())
    }

    fn generate_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::Let { name, value } => self.generate_let(name, value),
            StmtKind::Assign { target, op, value } => {
                self.generate_assign(target, *op, value, stmt.span)
            }
            StmtKind::If { arms, else_body } => {
                let end = self.new_label();
                for IfArm { cond, body } in arms {
                    let next = self.new_label();
                    self.generate_expr(cond)?;
                    self.emit(format!("BEQ {next}"));
                    for stmt in body {
                        self.generate_stmt(stmt)?;
                    }
                    self.emit(format!("JMP {end}"));
                    self.emit(format!("{next}:"));
                }
                for stmt in else_body {
                    self.generate_stmt(stmt)?;
                }
                self.emit(format!("{end}:"));
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let start = self.new_label();
                let end = self.new_label();
                self.emit(format!("{start}:"));
                self.generate_expr(cond)?;
                self.emit(format!("BEQ {end}"));
                for stmt in body {
                    self.generate_stmt(stmt)?;
                }
                self.emit(format!("JMP {start}"));
                self.emit(format!("{end}:"));
                Ok(())
            }
            StmtKind::Function { .. } => {
                unreachable!("the parser keeps function definitions at top level")
            }
            StmtKind::Return(value) => {
                match value {
                    Some(value) => self.generate_expr(value)?,
                    None => self.emit("PUSHI 0"),
                }
                self.emit("SAVE_REG");
                self.emit("BPTOSP");
                self.emit("POPBP");
                self.emit("RET");
                Ok(())
            }
            StmtKind::Say(expr) => {
                self.generate_expr(expr)?;
                self.emit("SAY_OP");
                Ok(())
            }
            StmtKind::Ask { var } => {
                self.emit("PUSHI 0");
                self.emit("CALLI 3");
                self.emit("POP");
                if let Some(var) = var {
                    let offset = self.allocate_variable(var, 1);
                    self.var_types.insert(var.clone(), VarType::Integer);
                    self.emit("PUSH_REG");
                    self.store_to_offset(offset);
                }
                Ok(())
            }
            StmtKind::Menu { var, items } => self.generate_menu(var.as_deref(), items),
            StmtKind::FilterMenu { var, entries } => {
                self.generate_filtermenu(var.as_deref(), entries)
            }
            StmtKind::Goto(label) => {
                if !self.user_labels.contains(label) {
                    return Err(CompileError::UndefinedLabel {
                        name: label.clone(),
                        line: stmt.span.line,
                    });
                }
                self.emit(format!("JMP {label}"));
                Ok(())
            }
            StmtKind::Label(name) => {
                self.emit(format!("{name}:"));
                Ok(())
            }
            StmtKind::Exit => {
                self.emit("EXIT_OP");
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.generate_expr(expr)?;
                // A bare expression's value is unused.
                self.emit("POP");
                Ok(())
            }
        }
    }

    /// `PUSHI_EFF off; SWAP; STO` with the value already on the stack.
    fn store_to_offset(&mut self, offset: i32) {
        self.emit(format!("PUSHI_EFF {offset}"));
        self.emit("SWAP");
        self.emit("STO");
    }

    fn generate_let(&mut self, name: &str, value: &Expr) -> Result<(), CompileError> {
        if let ExprKind::Array(elements) = &value.kind {
            self.generate_expr(value)?;
            let size = elements.len() as u16;
            let offset = self.allocate_variable(name, size);
            self.var_types.insert(name.to_string(), VarType::Array);
            self.var_sizes.insert(name.to_string(), size);
            // Elements were pushed in reverse, so the first element is
            // on top and lands in the lowest cell.
            for index in 0..i32::from(size) {
                self.store_to_offset(offset + index);
            }
            return Ok(());
        }

        self.generate_expr(value)?;
        let var_type = match &value.kind {
            ExprKind::Str(_) => VarType::Str,
            _ => VarType::Integer,
        };
        let offset = self.allocate_variable(name, 1);
        self.var_types.insert(name.to_string(), var_type);
        self.store_to_offset(offset);
        Ok(())
    }

    fn generate_assign(
        &mut self,
        target: &LValue,
        op: AssignOp,
        value: &Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        match target {
            LValue::Name(name) => {
                let offset = self.lookup_variable(name).ok_or_else(|| {
                    CompileError::UndefinedVariable {
                        name: name.clone(),
                        line: span.line,
                    }
                })?;
                self.generate_expr(value)?;
                if let Some(mnemonic) = compound_mnemonic(op) {
                    self.emit(format!("PUSHI_EFF {offset}"));
                    self.emit("FETCHM");
                    self.emit("SWAP");
                    self.emit(mnemonic);
                }
                self.store_to_offset(offset);
                Ok(())
            }
            LValue::Element { name, index } => {
                self.generate_expr(value)?;
                self.push_element_address(name, index, span)?;
                self.emit("SWAP");
                self.emit("STO");
                Ok(())
            }
        }
    }

    /// Push the absolute address of `name[index]`.
    ///
    /// A declared array lives at a BP-relative base; any other name is
    /// treated as holding an array base address (arrays are passed to
    /// functions by address).
    fn push_element_address(
        &mut self,
        name: &str,
        index: &Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        let offset = self.lookup_variable(name).ok_or_else(|| {
            CompileError::UndefinedVariable {
                name: name.to_string(),
                line: span.line,
            }
        })?;
        match self.var_types.get(name) {
            Some(VarType::Array) => {
                self.emit("PUSHBP");
                self.emit(format!("PUSHI {offset}"));
                self.emit("OPADD");
            }
            None => {
                self.emit(format!("PUSHI_EFF {offset}"));
                self.emit("FETCHM");
            }
            Some(_) => {
                return Err(CompileError::NotAnArray {
                    name: name.to_string(),
                    line: span.line,
                });
            }
        }
        self.generate_expr(index)?;
        self.emit("OPADD");
        Ok(())
    }

    fn generate_menu(
        &mut self,
        var: Option<&str>,
        items: &[Expr],
    ) -> Result<(), CompileError> {
        self.temps.enter_scope();
        let array = self.temps.allocate_block(items.len() as u16 + 1);

        for (index, item) in items.iter().enumerate() {
            self.generate_expr(item)?;
            self.store_to_offset(i32::from(array) + index as i32);
        }
        self.emit("PUSHI 0");
        self.store_to_offset(i32::from(array) + items.len() as i32);

        self.emit(format!("PUSHI_EFF {array}"));
        self.emit("PUSHI 1");
        self.emit("CALLI 0");
        self.emit("POP");
        self.store_menu_result(var);
        self.temps.exit_scope();
        Ok(())
    }

    fn generate_filtermenu(
        &mut self,
        var: Option<&str>,
        entries: &[(Expr, Expr)],
    ) -> Result<(), CompileError> {
        self.temps.enter_scope();
        let strings = self.temps.allocate_block(entries.len() as u16 + 1);
        let flags = self.temps.allocate_block(entries.len() as u16);

        for (index, (item, flag)) in entries.iter().enumerate() {
            self.generate_expr(item)?;
            self.store_to_offset(i32::from(strings) + index as i32);
            self.generate_expr(flag)?;
            self.store_to_offset(i32::from(flags) + index as i32);
        }
        self.emit("PUSHI 0");
        self.store_to_offset(i32::from(strings) + entries.len() as i32);

        self.emit(format!("PUSHI_EFF {flags}"));
        self.emit(format!("PUSHI_EFF {strings}"));
        self.emit("PUSHI 2");
        self.emit("CALLI 1");
        self.emit("POP");
        self.store_menu_result(var);
        self.temps.exit_scope();
        Ok(())
    }

    fn store_menu_result(&mut self, var: Option<&str>) {
        if let Some(var) = var {
            let offset = self.allocate_variable(var, 1);
            self.var_types.insert(var.to_string(), VarType::Integer);
            self.emit("PUSH_REG");
            self.store_to_offset(offset);
        }
    }

    fn generate_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Number(value) => {
                self.emit(format!("PUSHI {value}"));
                Ok(())
            }
            ExprKind::Bool(value) => {
                self.emit(format!("PUSHI {}", u16::from(*value)));
                Ok(())
            }
            ExprKind::Str(text) => {
                let index = match self.literal_index(text) {
                    Some(index) => index,
                    None => {
                        self.add_literal(text);
                        self.string_literals.len() - 1
                    }
                };
                self.emit(format!("PUSHI {index}"));
                Ok(())
            }
            ExprKind::Ident(name) => {
                let offset = self.lookup_variable(name).ok_or_else(|| {
                    CompileError::UndefinedVariable {
                        name: name.clone(),
                        line: expr.span.line,
                    }
                })?;
                if self.var_types.get(name) == Some(&VarType::Array) {
                    // An array name is its absolute base address.
                    self.emit("PUSHBP");
                    self.emit(format!("PUSHI {offset}"));
                    self.emit("OPADD");
                } else {
                    self.emit(format!("PUSHI_EFF {offset}"));
                    self.emit("FETCHM");
                }
                Ok(())
            }
            ExprKind::Array(elements) => {
                // Reverse push order so sequential stores see the first
                // element on top.
                for element in elements.iter().rev() {
                    self.generate_expr(element)?;
                }
                Ok(())
            }
            ExprKind::Index { base, index } => {
                let ExprKind::Ident(name) = &base.kind else {
                    return Err(CompileError::Parse {
                        line: expr.span.line,
                        column: expr.span.column,
                        message: "only simple array names can be indexed".to_string(),
                    });
                };
                let name = name.clone();
                self.push_element_address(&name, index, expr.span)?;
                self.emit("FETCHM");
                Ok(())
            }
            ExprKind::Call { name, args } => self.generate_call(name, args, expr.span),
            ExprKind::Binary { op, lhs, rhs } => {
                self.generate_binary(*op, lhs, rhs, expr.span)
            }
            ExprKind::Unary { op, operand } => {
                self.generate_expr(operand)?;
                self.emit(match op {
                    UnOp::Neg => "OPNEG",
                    UnOp::Not => "OPNOT",
                });
                Ok(())
            }
        }
    }

    fn generate_call(
        &mut self,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<(), CompileError> {
        if let Some(id) = builtin_id(name) {
            // Builtin arguments travel by address: evaluate each into a
            // scratch cell, then pass the cell addresses and the count.
            self.temps.enter_scope();
            let mut cells = Vec::with_capacity(args.len());
            for arg in args {
                let cell = self.temps.allocate();
                self.generate_expr(arg)?;
                self.store_to_offset(i32::from(cell));
                cells.push(cell);
            }
            for cell in cells {
                self.emit(format!("PUSHI_EFF {cell}"));
            }
            self.emit(format!("PUSHI {}", args.len()));
            self.emit(format!("CALLI {id}"));
            self.temps.exit_scope();
            return Ok(());
        }

        let Some(params) = self.functions.get(name) else {
            return Err(CompileError::UndefinedFunction {
                name: name.to_string(),
                line: span.line,
            });
        };
        let param_count = params.len();
        for arg in args {
            self.generate_expr(arg)?;
        }
        self.emit(format!("CALL {name}"));
        for _ in 0..param_count {
            self.emit("POP");
        }
        self.emit("PUSH_REG");
        Ok(())
    }

    fn generate_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        if op == BinOp::Add {
            if self.try_substitution(lhs, rhs, span)? {
                return Ok(());
            }
        }
        self.generate_expr(lhs)?;
        self.generate_expr(rhs)?;
        self.emit(match op {
            BinOp::Add => "OPADD",
            BinOp::Sub => "OPSUB",
            BinOp::Mul => "OPMUL",
            BinOp::Div => "OPDIV",
            BinOp::Mod => "OPMOD",
            BinOp::Eq => "TSTEQ",
            BinOp::Ne => "TSTNE",
            BinOp::Lt => "TSTLT",
            BinOp::Gt => "TSTGT",
            BinOp::Le => "TSTLE",
            BinOp::Ge => "TSTGE",
            BinOp::And => "OPAND",
            BinOp::Or => "OPOR",
        });
        Ok(())
    }

    /// `"literal" + var` (either order) compiles to a single composite
    /// string carrying a substitution directive; no runtime
    /// concatenation exists. Returns true when the rewrite applied.
    fn try_substitution(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<bool, CompileError> {
        let nested_add =
            |expr: &Expr| matches!(&expr.kind, ExprKind::Binary { op: BinOp::Add, .. });
        if nested_add(lhs) || nested_add(rhs) {
            self.warnings.push(format!(
                "line {}: multiple string concatenations are not supported; \
                 use separate statements",
                span.line
            ));
            return Ok(false);
        }

        let (literal, variable, literal_first) = match (&lhs.kind, &rhs.kind) {
            (ExprKind::Str(text), ExprKind::Ident(name)) => (text, name, true),
            (ExprKind::Ident(name), ExprKind::Str(text)) => (text, name, false),
            _ => return Ok(false),
        };
        let Some(offset) = self.lookup_variable(variable) else {
            return Ok(false);
        };

        let directive = if self.var_types.get(variable) == Some(&VarType::Str) {
            format!("@SS{offset}")
        } else {
            format!("@SI{offset}")
        };
        let composite = if literal_first {
            format!("{literal}{directive}")
        } else {
            format!("{directive}{literal}")
        };

        let index = match self.literal_index(&composite) {
            Some(index) => index,
            None => match self.literal_index(literal) {
                Some(index) => {
                    self.string_literals[index] = composite;
                    index
                }
                None => {
                    self.string_literals.push(composite);
                    self.string_literals.len() - 1
                }
            },
        };
        self.emit(format!("PUSHI {index}"));
        Ok(true)
    }

    // ---- output assembly ----

    fn finish(self) -> CompiledProgram {
        let mut out = String::new();
        let _ = writeln!(out, "; UWScript compiled to UW assembly");
        let _ = writeln!(out, "; String Block: {}", self.block_id);
        let _ = writeln!(out, "; String literals:");
        for (index, literal) in self.string_literals.iter().enumerate() {
            let _ = writeln!(out, "; {index}: \"{}\"", literal.replace('\n', "\\n"));
        }
        out.push('\n');

        let _ = writeln!(out, "; Global Variables:");
        for name in &self.global_order {
            let offset = self.globals[name];
            let description = match self.var_types.get(name) {
                Some(VarType::Array) => {
                    format!("array[{}]", self.var_sizes.get(name).copied().unwrap_or(0))
                }
                Some(VarType::Str) => "string".to_string(),
                _ => "integer".to_string(),
            };
            let _ = writeln!(out, "; {name} -> {offset} ({description})");
        }
        out.push('\n');

        let _ = writeln!(out, "; Function Scopes:");
        for name in &self.function_order {
            let scope = &self.scopes[name];
            let _ = writeln!(out, "; Function {name}:");
            let _ = writeln!(out, ";   Parameters: {}", scope.params.join(", "));
            for var in &scope.order {
                let kind = if scope.params.contains(var) {
                    "parameter"
                } else {
                    "local"
                };
                let _ = writeln!(out, ";   {var} -> {} ({kind})", scope.offsets[var]);
            }
        }
        out.push('\n');

        let _ = writeln!(
            out,
            "; Temp variables - Total used: {}",
            self.temps.total_used()
        );
        let _ = writeln!(
            out,
            "; Temp variables - Currently allocated: {}",
            self.temps.currently_allocated()
        );
        let _ = writeln!(
            out,
            "; Temp variables - Max temp var: {}",
            self.temps.high_water()
        );
        out.push('\n');

        for line in self.main_code.iter().chain(&self.func_code) {
            out.push_str(line);
            out.push('\n');
        }

        let mut strings = GameStrings::new();
        strings.insert_block(self.block_id, self.string_literals);
        CompiledProgram {
            assembly: out,
            strings_text: strings_text::format(&strings),
            warnings: self.warnings,
        }
    }
}

fn compound_mnemonic(op: AssignOp) -> Option<&'static str> {
    match op {
        AssignOp::Assign => None,
        AssignOp::Add => Some("OPADD"),
        AssignOp::Sub => Some("OPSUB"),
        AssignOp::Mul => Some("OPMUL"),
        AssignOp::Div => Some("OPDIV"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembly_of(source: &str) -> String {
        compile(source, 1).unwrap().assembly
    }

    #[test]
    fn let_stores_through_effective_address() {
        let asm = assembly_of("let x = 5\n");
        assert!(asm.contains("PUSHI 5\nPUSHI_EFF 0\nSWAP\nSTO"));
        assert!(asm.contains("; x -> 0 (integer)"));
    }

    #[test]
    fn program_is_bracketed_by_start_and_exit() {
        let asm = assembly_of("let x = 1\n");
        let code: Vec<&str> = asm
            .lines()
            .filter(|l| !l.starts_with(';') && !l.is_empty())
            .collect();
        assert_eq!(code.first(), Some(&"START"));
        assert_eq!(code.last(), Some(&"EXIT_OP"));
    }

    #[test]
    fn if_chain_has_one_branch_per_arm() {
        let asm = assembly_of(
            "let c = 2\nif c == 1\nsay \"A\"\nelseif c == 2\nsay \"B\"\nelse\nsay \"C\"\nendif\n",
        );
        assert_eq!(asm.matches("BEQ").count(), 2);
        assert_eq!(asm.matches("JMP").count(), 2);
        assert_eq!(asm.matches("SAY_OP").count(), 3);
    }

    #[test]
    fn while_loops_back_to_condition() {
        let asm = assembly_of("let i = 0\nwhile i < 5\ni += 1\nendwhile\n");
        assert!(asm.contains("label_0:"));
        assert!(asm.contains("BEQ label_1"));
        assert!(asm.contains("JMP label_0"));
        assert!(asm.contains("label_1:"));
    }

    #[test]
    fn functions_are_emitted_after_main_exit() {
        let asm = assembly_of("function f()\nreturn 1\nendfunction\nlet r = f()\n");
        let exit_at = asm.find("EXIT_OP").unwrap();
        let f_at = asm.find("\nf:\n").unwrap();
        assert!(f_at > exit_at);
        assert!(asm.contains("f:\nPUSHBP\nSPTOBP\nPUSHI 0\nADDSP"));
        assert!(asm.contains("SAVE_REG\nBPTOSP\nPOPBP\nRET"));
    }

    #[test]
    fn parameters_bind_rightmost_at_minus_two() {
        let asm = assembly_of(
            "function f(x, y)\nreturn x * 2 + y\nendfunction\nlet r = f(3, 4)\n",
        );
        assert!(asm.contains(";   x -> -3 (parameter)"));
        assert!(asm.contains(";   y -> -2 (parameter)"));
        // call site pushes left to right, pops both, then the result
        assert!(asm.contains("PUSHI 3\nPUSHI 4\nCALL f\nPOP\nPOP\nPUSH_REG"));
    }

    #[test]
    fn function_locals_reserve_frame_cells() {
        let asm = assembly_of(
            "function g()\nlet a = 1\nlet b = 2\nreturn a + b\nendfunction\nlet r = g()\n",
        );
        assert!(asm.contains("g:\nPUSHBP\nSPTOBP\nPUSHI 2\nADDSP"));
    }

    #[test]
    fn array_literal_reserves_and_fills_cells() {
        let asm = assembly_of("let a = [10, 20, 30]\n");
        assert!(asm.contains("; a -> 0 (array[3])"));
        // Reverse push order, then sequential stores.
        assert!(asm.contains("PUSHI 30\nPUSHI 20\nPUSHI 10"));
        assert!(asm.contains("PUSHI_EFF 0\nSWAP\nSTO\nPUSHI_EFF 1\nSWAP\nSTO"));
    }

    #[test]
    fn array_access_addresses_through_bp() {
        let asm = assembly_of("let a = [1, 2]\nlet v = a[1]\n");
        assert!(asm.contains("PUSHBP\nPUSHI 0\nOPADD\nPUSHI 1\nOPADD\nFETCHM"));
    }

    #[test]
    fn say_with_variable_becomes_substituted_literal() {
        let compiled = compile("let hp = 75\nsay \"HP: \" + hp\n", 1).unwrap();
        assert!(compiled.assembly.contains("; 0: \"HP: @SI0\""));
        assert!(compiled.strings_text.contains("0: HP: @SI0"));
        // One PUSHI for the composite, then SAY_OP; no OPADD for it.
        assert!(compiled.assembly.contains("PUSHI 0\nSAY_OP"));
    }

    #[test]
    fn string_typed_variables_use_ss() {
        let compiled =
            compile("let name = \"Garamon\"\nsay \"I am \" + name\n", 1).unwrap();
        // "name" is at offset 0 and string-typed.
        assert!(compiled.assembly.contains("\"I am @SS0\""));
    }

    #[test]
    fn chained_concatenation_warns_and_falls_back() {
        let compiled = compile("let a = 1\nlet b = 2\nsay \"x\" + a + b\n", 1).unwrap();
        assert!(!compiled.warnings.is_empty());
    }

    #[test]
    fn menu_builds_terminated_array_and_calls_babl_menu() {
        let asm = assembly_of("menu choice [\"Hail\", \"Bye\"]\n");
        assert!(asm.contains("PUSHI_EFF 1000\nSWAP\nSTO"));
        assert!(asm.contains("PUSHI_EFF 1001\nSWAP\nSTO"));
        // terminator, then the call
        assert!(asm.contains("PUSHI 0\nPUSHI_EFF 1002\nSWAP\nSTO"));
        assert!(asm.contains("PUSHI_EFF 1000\nPUSHI 1\nCALLI 0\nPOP\nPUSH_REG"));
    }

    #[test]
    fn filtermenu_uses_two_arrays() {
        let asm = assembly_of("filtermenu c [\"A\", 1, \"B\", 0]\n");
        // strings block 1000..=1002, flags block 1003..=1004
        assert!(asm.contains("PUSHI_EFF 1003\nPUSHI_EFF 1000\nPUSHI 2\nCALLI 1"));
    }

    #[test]
    fn builtin_arguments_pass_by_temp_address() {
        let asm = assembly_of("clear_screen(3)\n");
        assert!(asm.contains("PUSHI 3\nPUSHI_EFF 1000\nSWAP\nSTO"));
        assert!(asm.contains("PUSHI_EFF 1000\nPUSHI 1\nCALLI 100"));
        // Statement-level call discards the pushed result.
        assert!(asm.contains("CALLI 100\nPOP"));
    }

    #[test]
    fn ask_stores_via_result_register() {
        let asm = assembly_of("ask answer\n");
        assert!(asm.contains("PUSHI 0\nCALLI 3\nPOP\nPUSH_REG\nPUSHI_EFF 0\nSWAP\nSTO"));
    }

    #[test]
    fn goto_requires_a_known_label() {
        assert!(matches!(
            compile("goto nowhere\n", 1),
            Err(CompileError::UndefinedLabel { .. })
        ));
        let asm = assembly_of("label top\ngoto top\n");
        assert!(asm.contains("top:\nJMP top"));
    }

    #[test]
    fn undefined_variable_and_function_errors() {
        assert!(matches!(
            compile("let x = y\n", 1),
            Err(CompileError::UndefinedVariable { .. })
        ));
        assert!(matches!(
            compile("let x = frob(1)\n", 1),
            Err(CompileError::UndefinedFunction { .. })
        ));
    }

    #[test]
    fn indexing_a_scalar_is_an_error() {
        assert!(matches!(
            compile("let x = 5\nlet y = x[0]\n", 1),
            Err(CompileError::NotAnArray { .. })
        ));
    }

    #[test]
    fn strings_file_uses_the_requested_block() {
        let compiled = compile("say \"Hail!\"\n", 7).unwrap();
        assert!(compiled.strings_text.contains("block: 0007; 1 strings."));
        assert!(compiled.assembly.contains("; String Block: 7"));
    }
}
