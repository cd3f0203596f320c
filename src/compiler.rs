// File: src/compiler.rs
//
// Bytecode compiler for Lucy. Walks the AST, emits a `code[]` per function
// body (backpatching local jumps the way a single-pass assembler would),
// then concatenates every body into one flat `code[]` and rewrites each
// function constant's placeholder address into its final absolute offset —
// the two-pass layout the reference code generator performs.

use std::collections::VecDeque;

use crate::ast::{AssignOp, BinaryOp, Expression, Literal, MemberKind, Statement, UnaryOp};
use crate::bytecode::{CodeProgram, Const, FunctionConst, OpCode};
use crate::errors::{ErrorKind, LucyError, SourceLocation};

struct LoopFrame {
    continue_addr: usize,
    break_patches: Vec<usize>,
}

struct PendingFn {
    segment_index: usize,
    params: Vec<String>,
    body: Vec<Statement>,
}

/// Compiles a whole program (one module) into a `CodeProgram`.
pub struct Compiler {
    const_pool: Vec<Const>,
    name_pool: Vec<String>,
    segments: Vec<Vec<OpCode>>,
    pending: VecDeque<PendingFn>,
    next_segment: usize,

    // state for the segment currently being compiled
    code: Vec<OpCode>,
    loop_stack: Vec<LoopFrame>,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            const_pool: Vec::new(),
            name_pool: Vec::new(),
            segments: Vec::new(),
            pending: VecDeque::new(),
            next_segment: 1,
            code: Vec::new(),
            loop_stack: Vec::new(),
        }
    }

    pub fn compile_program(body: &[Statement]) -> Result<CodeProgram, LucyError> {
        let mut compiler = Compiler::new();
        let top = compiler.compile_segment(&[], body)?;
        compiler.segments.push(top);

        while let Some(pending) = compiler.pending.pop_front() {
            let code = compiler.compile_segment(&pending.params, &pending.body)?;
            debug_assert_eq!(compiler.segments.len(), pending.segment_index);
            compiler.segments.push(code);
        }

        Ok(compiler.finish())
    }

    fn add_const(&mut self, value: Const) -> usize {
        if let Some(idx) = self.const_pool.iter().position(|existing| existing == &value) {
            return idx;
        }
        self.const_pool.push(value);
        self.const_pool.len() - 1
    }

    fn add_name(&mut self, name: &str) -> usize {
        if let Some(idx) = self.name_pool.iter().position(|existing| existing == name) {
            return idx;
        }
        self.name_pool.push(name.to_string());
        self.name_pool.len() - 1
    }

    fn emit(&mut self, op: OpCode) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn patch_jump(&mut self, at: usize, target: usize) {
        self.code[at] = match self.code[at] {
            OpCode::For(_) => OpCode::For(target),
            OpCode::Jump(_) => OpCode::Jump(target),
            OpCode::JumpIfTrue(_) => OpCode::JumpIfTrue(target),
            OpCode::JumpIfFalse(_) => OpCode::JumpIfFalse(target),
            OpCode::JumpIfTrueOrPop(_) => OpCode::JumpIfTrueOrPop(target),
            OpCode::JumpIfFalseOrPop(_) => OpCode::JumpIfFalseOrPop(target),
            other => other,
        };
    }

    fn reserve_segment(&mut self) -> usize {
        let idx = self.next_segment;
        self.next_segment += 1;
        idx
    }

    fn compile_segment(
        &mut self,
        params: &[String],
        body: &[Statement],
    ) -> Result<Vec<OpCode>, LucyError> {
        let saved_code = std::mem::take(&mut self.code);
        let saved_loops = std::mem::take(&mut self.loop_stack);

        for param in params.iter().rev() {
            let idx = self.add_name(param);
            self.emit(OpCode::Store(idx));
        }
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        let null_idx = self.add_const(Const::Null);
        self.emit(OpCode::LoadConst(null_idx));
        self.emit(OpCode::Return);

        let finished = std::mem::replace(&mut self.code, saved_code);
        self.loop_stack = saved_loops;
        Ok(finished)
    }

    fn finish(self) -> CodeProgram {
        let mut base = vec![0usize; self.segments.len()];
        for i in 1..self.segments.len() {
            base[i] = base[i - 1] + self.segments[i - 1].len();
        }

        let mut code = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            for op in segment {
                code.push(offset_jump(*op, base[i]));
            }
        }

        let const_pool = self
            .const_pool
            .into_iter()
            .map(|c| match c {
                Const::Function(mut f) if f.extend.is_none() => {
                    f.address = base[f.address];
                    Const::Function(f)
                }
                other => other,
            })
            .collect();

        CodeProgram { code, const_pool, name_pool: self.name_pool }
    }

    // ---- statements ----

    fn compile_stmt(&mut self, stmt: &Statement) -> Result<(), LucyError> {
        match stmt {
            Statement::Block { body, .. } => {
                for s in body {
                    self.compile_stmt(s)?;
                }
                Ok(())
            }
            Statement::If { test, then, or_else, .. } => self.compile_if(test, then, or_else),
            Statement::Loop { body, .. } => self.compile_loop(None, body),
            Statement::While { test, body, .. } => self.compile_loop(Some(test), body),
            Statement::For { var, iter, body, .. } => self.compile_for(var, iter, body),
            Statement::Break { span } => {
                if self.loop_stack.is_empty() {
                    return Err(LucyError::new(
                        ErrorKind::UnsyntacticBreak,
                        "'break' outside any loop".to_string(),
                        SourceLocation::from_location(span.start),
                    ));
                }
                let at = self.emit(OpCode::Jump(0));
                self.loop_stack.last_mut().unwrap().break_patches.push(at);
                Ok(())
            }
            Statement::Continue { span } => {
                let Some(target) = self.loop_stack.last().map(|frame| frame.continue_addr) else {
                    return Err(LucyError::new(
                        ErrorKind::UnsyntacticContinue,
                        "'continue' outside any loop".to_string(),
                        SourceLocation::from_location(span.start),
                    ));
                };
                self.emit(OpCode::Jump(target));
                Ok(())
            }
            Statement::Goto { call, .. } => {
                let Expression::Call { callee, args, .. } = call else {
                    unreachable!("parser guarantees goto's operand is a Call")
                };
                let k = self.compile_call_site(callee, args)?;
                self.emit(OpCode::Goto(k));
                Ok(())
            }
            Statement::Return { value, .. } => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        let idx = self.add_const(Const::Null);
                        self.emit(OpCode::LoadConst(idx));
                    }
                }
                self.emit(OpCode::Return);
                Ok(())
            }
            Statement::Global { names, .. } => {
                for name in names {
                    let idx = self.add_name(name);
                    self.emit(OpCode::Global(idx));
                }
                Ok(())
            }
            Statement::Import { path, alias, .. } => {
                let dotted = path.join(".");
                let const_idx = self.add_const(Const::String(dotted));
                self.emit(OpCode::Import(const_idx));
                let bind_name = alias.clone().unwrap_or_else(|| path.last().unwrap().clone());
                let name_idx = self.add_name(&bind_name);
                self.emit(OpCode::Store(name_idx));
                Ok(())
            }
            Statement::FromImport { path, items, star, .. } => {
                let dotted = path.join(".");
                let const_idx = self.add_const(Const::String(dotted));
                self.emit(OpCode::Import(const_idx));
                if *star {
                    self.emit(OpCode::ImportStar);
                } else {
                    for item in items.as_ref().expect("non-star from-import has items") {
                        let name_idx = self.add_name(&item.name);
                        self.emit(OpCode::ImportFrom(name_idx));
                        let bind = item.alias.clone().unwrap_or_else(|| item.name.clone());
                        let bind_idx = self.add_name(&bind);
                        self.emit(OpCode::Store(bind_idx));
                    }
                    self.emit(OpCode::Pop);
                }
                Ok(())
            }
            Statement::Assignment { target, op, value, .. } => self.compile_assignment(target, op, value),
            Statement::Expr { expr, .. } => {
                self.compile_expr(expr)?;
                self.emit(OpCode::Pop);
                Ok(())
            }
        }
    }

    fn compile_if(
        &mut self,
        test: &Expression,
        then: &[Statement],
        or_else: &Option<Vec<Statement>>,
    ) -> Result<(), LucyError> {
        self.compile_expr(test)?;
        let to_else = self.emit(OpCode::JumpIfFalse(0));
        for s in then {
            self.compile_stmt(s)?;
        }
        let to_end = self.emit(OpCode::Jump(0));
        self.patch_jump(to_else, self.here());
        if let Some(alt) = or_else {
            for s in alt {
                self.compile_stmt(s)?;
            }
        }
        self.patch_jump(to_end, self.here());
        Ok(())
    }

    fn compile_loop(&mut self, test: Option<&Expression>, body: &[Statement]) -> Result<(), LucyError> {
        let continue_addr = self.here();
        let break_patch_here = if let Some(test_expr) = test {
            self.compile_expr(test_expr)?;
            Some(self.emit(OpCode::JumpIfFalse(0)))
        } else {
            None
        };
        self.loop_stack.push(LoopFrame { continue_addr, break_patches: Vec::new() });
        for s in body {
            self.compile_stmt(s)?;
        }
        self.emit(OpCode::Jump(continue_addr));
        let end = self.here();
        if let Some(at) = break_patch_here {
            self.patch_jump(at, end);
        }
        let frame = self.loop_stack.pop().unwrap();
        for at in frame.break_patches {
            self.patch_jump(at, end);
        }
        Ok(())
    }

    fn compile_for(&mut self, var: &str, iter: &Expression, body: &[Statement]) -> Result<(), LucyError> {
        self.compile_expr(iter)?;
        let continue_addr = self.here();
        let to_break = self.emit(OpCode::For(0));
        let name_idx = self.add_name(var);
        self.emit(OpCode::Store(name_idx));
        self.loop_stack.push(LoopFrame { continue_addr, break_patches: Vec::new() });
        for s in body {
            self.compile_stmt(s)?;
        }
        self.emit(OpCode::Jump(continue_addr));
        let end = self.here();
        self.patch_jump(to_break, end);
        let frame = self.loop_stack.pop().unwrap();
        for at in frame.break_patches {
            self.patch_jump(at, end);
        }
        self.emit(OpCode::Pop);
        Ok(())
    }

    fn compile_assignment(
        &mut self,
        target: &Expression,
        op: &AssignOp,
        value: &Expression,
    ) -> Result<(), LucyError> {
        match target {
            Expression::Identifier { name, .. } => {
                let name_idx = self.add_name(name);
                if let Some(binop) = compound_binop(op) {
                    self.emit(OpCode::LoadName(name_idx));
                    self.compile_expr(value)?;
                    self.emit_binop(binop);
                } else {
                    self.compile_expr(value)?;
                }
                self.emit(OpCode::Store(name_idx));
                Ok(())
            }
            Expression::Member { object, property, kind, .. } => {
                self.compile_expr(object)?;
                self.compile_member_key(property, *kind)?;
                if let Some(binop) = compound_binop(op) {
                    self.emit(OpCode::DupTwo);
                    self.emit_get(*kind);
                    self.compile_expr(value)?;
                    self.emit_binop(binop);
                } else {
                    self.compile_expr(value)?;
                }
                self.emit_set(*kind);
                self.emit(OpCode::Pop);
                Ok(())
            }
            other => Err(LucyError::new(
                ErrorKind::AssigningToRvalue,
                "left-hand side of assignment must be an identifier or member expression"
                    .to_string(),
                SourceLocation::from_location(other.span().start),
            )),
        }
    }

    fn compile_member_key(&mut self, property: &Expression, kind: MemberKind) -> Result<(), LucyError> {
        match kind {
            MemberKind::Dot => self.compile_expr(property),
            MemberKind::Index => self.compile_expr(property),
        }
    }

    fn emit_get(&mut self, kind: MemberKind) {
        match kind {
            MemberKind::Dot => self.emit(OpCode::GetAttr),
            MemberKind::Index => self.emit(OpCode::GetItem),
        };
    }

    fn emit_set(&mut self, kind: MemberKind) {
        match kind {
            MemberKind::Dot => self.emit(OpCode::SetAttr),
            MemberKind::Index => self.emit(OpCode::SetItem),
        };
    }

    // ---- expressions ----

    fn compile_expr(&mut self, expr: &Expression) -> Result<(), LucyError> {
        match expr {
            Expression::Literal { value, .. } => {
                let c = match value {
                    Literal::Null => Const::Null,
                    Literal::Bool(b) => Const::Bool(*b),
                    Literal::Int(i) => Const::Int(*i),
                    Literal::Float(f) => Const::Float(*f),
                    Literal::String(s) => Const::String(s.clone()),
                };
                let idx = self.add_const(c);
                self.emit(OpCode::LoadConst(idx));
                Ok(())
            }
            Expression::Identifier { name, .. } => {
                let idx = self.add_name(name);
                self.emit(OpCode::LoadName(idx));
                Ok(())
            }
            Expression::Function { params, body, is_closure, .. } => {
                let effective_closure = *is_closure || body_contains_closure(body);
                let segment_index = self.reserve_segment();
                self.pending.push_back(PendingFn {
                    segment_index,
                    params: params.clone(),
                    body: body.clone(),
                });
                let const_idx = self.add_const(Const::Function(FunctionConst {
                    params_num: params.len(),
                    address: segment_index,
                    is_closure: effective_closure,
                    extend: None,
                }));
                self.emit(OpCode::LoadConst(const_idx));
                Ok(())
            }
            Expression::Table { properties, .. } => {
                for prop in properties {
                    self.compile_expr(&prop.key)?;
                    self.compile_expr(&prop.value)?;
                }
                self.emit(OpCode::BuildTable(properties.len()));
                Ok(())
            }
            Expression::Unary { op, arg, .. } => {
                self.compile_expr(arg)?;
                match op {
                    UnaryOp::Neg => {
                        self.emit(OpCode::Neg);
                    }
                    UnaryOp::Not => {
                        self.emit(OpCode::Not);
                    }
                    UnaryOp::Pos => {}
                }
                Ok(())
            }
            Expression::Binary { op, left, right, .. } => self.compile_binary(*op, left, right),
            Expression::Member { object, property, kind, .. } => {
                self.compile_expr(object)?;
                self.compile_member_key(property, *kind)?;
                self.emit_get(*kind);
                Ok(())
            }
            Expression::Call { callee, args, .. } => {
                let k = self.compile_call_site(callee, args)?;
                self.emit(OpCode::Call(k));
                Ok(())
            }
        }
    }

    fn compile_binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), LucyError> {
        match op {
            BinaryOp::And => {
                self.compile_expr(left)?;
                let at = self.emit(OpCode::JumpIfFalseOrPop(0));
                self.compile_expr(right)?;
                self.patch_jump(at, self.here());
                Ok(())
            }
            BinaryOp::Or => {
                self.compile_expr(left)?;
                let at = self.emit(OpCode::JumpIfTrueOrPop(0));
                self.compile_expr(right)?;
                self.patch_jump(at, self.here());
                Ok(())
            }
            _ => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_binop(op);
                Ok(())
            }
        }
    }

    fn emit_binop(&mut self, op: BinaryOp) {
        match op {
            BinaryOp::Add => self.emit(OpCode::Add),
            BinaryOp::Sub => self.emit(OpCode::Sub),
            BinaryOp::Mul => self.emit(OpCode::Mul),
            BinaryOp::Div => self.emit(OpCode::Div),
            BinaryOp::Mod => self.emit(OpCode::Mod),
            BinaryOp::Is => self.emit(OpCode::Is),
            BinaryOp::Eq => self.emit(OpCode::CompareOp(2)),
            BinaryOp::Ne => self.emit(OpCode::CompareOp(3)),
            BinaryOp::Lt => self.emit(OpCode::CompareOp(0)),
            BinaryOp::Le => self.emit(OpCode::CompareOp(1)),
            BinaryOp::Gt => self.emit(OpCode::CompareOp(4)),
            BinaryOp::Ge => self.emit(OpCode::CompareOp(5)),
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops handled separately"),
        };
    }

    /// Emits callee + argument code, applying the `obj.m(args)` method-call
    /// sugar when the callee is a dotted member access. Returns the total
    /// argument count `k` to pass to `CALL`/`GOTO`.
    fn compile_call_site(&mut self, callee: &Expression, args: &[Expression]) -> Result<usize, LucyError> {
        if let Expression::Member { object, property, kind: MemberKind::Dot, .. } = callee {
            self.compile_expr(object)?;
            self.emit(OpCode::Dup);
            self.compile_expr(property)?;
            self.emit(OpCode::GetAttr);
            self.emit(OpCode::RotTwo);
            for arg in args {
                self.compile_expr(arg)?;
            }
            Ok(args.len() + 1)
        } else {
            self.compile_expr(callee)?;
            for arg in args {
                self.compile_expr(arg)?;
            }
            Ok(args.len())
        }
    }
}

fn compound_binop(op: &AssignOp) -> Option<BinaryOp> {
    Some(match op {
        AssignOp::Assign => return None,
        AssignOp::AddAssign => BinaryOp::Add,
        AssignOp::SubAssign => BinaryOp::Sub,
        AssignOp::MulAssign => BinaryOp::Mul,
        AssignOp::DivAssign => BinaryOp::Div,
        AssignOp::ModAssign => BinaryOp::Mod,
    })
}

fn offset_jump(op: OpCode, base: usize) -> OpCode {
    match op {
        OpCode::For(t) => OpCode::For(t + base),
        OpCode::Jump(t) => OpCode::Jump(t + base),
        OpCode::JumpIfTrue(t) => OpCode::JumpIfTrue(t + base),
        OpCode::JumpIfFalse(t) => OpCode::JumpIfFalse(t + base),
        OpCode::JumpIfTrueOrPop(t) => OpCode::JumpIfTrueOrPop(t + base),
        OpCode::JumpIfFalseOrPop(t) => OpCode::JumpIfFalseOrPop(t + base),
        other => other,
    }
}

/// Closure-capture propagation (§9): a function must be treated as a
/// closure (i.e. it captures `base_closure`) if it is written with `|...|`
/// syntax or if any function nested inside it, at any depth, is.
fn body_contains_closure(body: &[Statement]) -> bool {
    body.iter().any(stmt_contains_closure)
}

fn stmt_contains_closure(stmt: &Statement) -> bool {
    match stmt {
        Statement::Block { body, .. } | Statement::Loop { body, .. } => body_contains_closure(body),
        Statement::If { test, then, or_else, .. } => {
            expr_contains_closure(test)
                || body_contains_closure(then)
                || or_else.as_ref().is_some_and(|b| body_contains_closure(b))
        }
        Statement::While { test, body, .. } => {
            expr_contains_closure(test) || body_contains_closure(body)
        }
        Statement::For { iter, body, .. } => {
            expr_contains_closure(iter) || body_contains_closure(body)
        }
        Statement::Goto { call, .. } => expr_contains_closure(call),
        Statement::Return { value, .. } => value.as_ref().is_some_and(expr_contains_closure),
        Statement::Assignment { target, value, .. } => {
            expr_contains_closure(target) || expr_contains_closure(value)
        }
        Statement::Expr { expr, .. } => expr_contains_closure(expr),
        Statement::Break { .. }
        | Statement::Continue { .. }
        | Statement::Global { .. }
        | Statement::Import { .. }
        | Statement::FromImport { .. } => false,
    }
}

fn expr_contains_closure(expr: &Expression) -> bool {
    match expr {
        Expression::Function { is_closure, body, .. } => *is_closure || body_contains_closure(body),
        Expression::Table { properties, .. } => properties
            .iter()
            .any(|p| expr_contains_closure(&p.key) || expr_contains_closure(&p.value)),
        Expression::Unary { arg, .. } => expr_contains_closure(arg),
        Expression::Binary { left, right, .. } => {
            expr_contains_closure(left) || expr_contains_closure(right)
        }
        Expression::Member { object, property, .. } => {
            expr_contains_closure(object) || expr_contains_closure(property)
        }
        Expression::Call { callee, args, .. } => {
            expr_contains_closure(callee) || args.iter().any(expr_contains_closure)
        }
        Expression::Literal { .. } | Expression::Identifier { .. } => false,
    }
}

/// Compiles a full program's statement list into a linear `CodeProgram`.
pub fn compile(body: &[Statement]) -> Result<CodeProgram, LucyError> {
    Compiler::compile_program(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn compiles_arithmetic_and_loop() {
        let body = parse("a = 0; i = 0; while i < 10 { a = a + i; i = i + 1; }").unwrap();
        let prog = compile(&body).unwrap();
        assert!(prog.jumps_resolved());
        assert!(prog.code.iter().any(|op| matches!(op, OpCode::Add)));
    }

    #[test]
    fn dedups_const_pool_type_strict() {
        let body = parse("a = 1; b = true;").unwrap();
        let prog = compile(&body).unwrap();
        let has_int_one = prog.const_pool.iter().any(|c| matches!(c, Const::Int(1)));
        let has_bool_true = prog.const_pool.iter().any(|c| matches!(c, Const::Bool(true)));
        assert!(has_int_one && has_bool_true);
    }

    #[test]
    fn nested_function_addresses_land_after_top_level() {
        let body = parse("f = func() { return 1; };").unwrap();
        let prog = compile(&body).unwrap();
        let Const::Function(fc) =
            prog.const_pool.iter().find(|c| matches!(c, Const::Function(_))).unwrap()
        else {
            unreachable!()
        };
        assert!(fc.address > 0);
        assert!(fc.address < prog.code.len());
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let body = parse("break;").unwrap();
        assert!(compile(&body).is_err());
    }

    #[test]
    fn closure_flag_propagates_to_enclosing_function() {
        let body = parse("make = func() { c = 0; return |v| { c = c + v; return c; }; };").unwrap();
        let prog = compile(&body).unwrap();
        let closures: Vec<_> = prog
            .const_pool
            .iter()
            .filter_map(|c| match c {
                Const::Function(fc) => Some(fc.is_closure),
                _ => None,
            })
            .collect();
        assert_eq!(closures.len(), 2);
        assert!(closures.iter().all(|&c| c));
    }
}
