// Closure capture analysis. Captures take the most restrictive mode the
// body demands: read -> shared borrow, write -> exclusive borrow,
// consume -> by-value. `move` closures force by-value capture of every
// free variable.

use super::{BorrowChecker, Borrower, Ctx};
use std::collections::{BTreeMap, HashSet};
use tml_ast as ast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum CaptureMode {
    Read,
    Write,
    Consume,
}

impl<'a> BorrowChecker<'a> {
    pub(crate) fn analyze_closure(
        &mut self,
        is_move: bool,
        params: &[(ast::Pattern, Option<ast::TypeExpr>)],
        body: &ast::Expr,
        span: &ast::Span,
    ) {
        let mut bound: HashSet<String> = HashSet::new();
        for (pattern, _) in params {
            for name in pattern.bindings() {
                bound.insert(name.to_string());
            }
        }

        let mut captures: BTreeMap<String, CaptureMode> = BTreeMap::new();
        collect_captures(body, &mut bound, &mut captures);

        for (name, mode) in &captures {
            let Some(state) = self.place(name) else {
                continue; // not an outer local
            };
            let copy = state.copy;
            let mutable = state.mutable;
            let mut_borrow = state.live_mut().cloned();

            if let Some(moved_at) = state.moved.clone() {
                self.report_with_label(
                    "B014",
                    format!("closure captures `{}` after it was moved", name),
                    span,
                    &moved_at,
                    "value moved here",
                );
                continue;
            }
            if let Some(borrow) = &mut_borrow {
                self.report_with_label(
                    "B015",
                    format!(
                        "closure capture of `{}` conflicts with an existing mutable borrow",
                        name
                    ),
                    span,
                    &borrow.span,
                    "mutable borrow occurs here",
                );
                continue;
            }

            let effective = if is_move { CaptureMode::Consume } else { *mode };
            match effective {
                CaptureMode::Read => {
                    if let Some(place) = self.place_mut(name) {
                        place.borrows.push(Borrower {
                            holder: None,
                            span: span.clone(),
                            mutable: false,
                        });
                    }
                }
                CaptureMode::Write => {
                    if !mutable {
                        self.use_place(name, Ctx::BorrowMut, span);
                        continue;
                    }
                    if let Some(place) = self.place_mut(name) {
                        place.borrows.push(Borrower {
                            holder: None,
                            span: span.clone(),
                            mutable: true,
                        });
                    }
                }
                CaptureMode::Consume => {
                    if !copy {
                        if let Some(place) = self.place_mut(name) {
                            place.moved = Some(span.clone());
                        }
                    }
                }
            }
        }

        // Captured-by-reference borrows from a closure expression are
        // scoped like expression temporaries; the conservative model
        // releases them with the statement.
    }
}

fn collect_captures(
    expr: &ast::Expr,
    bound: &mut HashSet<String>,
    captures: &mut BTreeMap<String, CaptureMode>,
) {
    match &expr.kind {
        ast::ExprKind::Ident(name) => {
            if !bound.contains(name) {
                upgrade(captures, name, CaptureMode::Read);
            }
        }
        ast::ExprKind::Assign { target, value, .. } => {
            if let ast::ExprKind::Ident(name) = &target.kind {
                if !bound.contains(name) {
                    upgrade(captures, name, CaptureMode::Write);
                }
            } else {
                collect_captures(target, bound, captures);
            }
            collect_captures(value, bound, captures);
        }
        ast::ExprKind::Block(block) => {
            let shadow: Vec<String> = collect_block(block, bound, captures);
            for name in shadow {
                bound.remove(&name);
            }
        }
        ast::ExprKind::Binary { lhs, rhs, .. } => {
            collect_captures(lhs, bound, captures);
            collect_captures(rhs, bound, captures);
        }
        ast::ExprKind::Unary { operand, .. } => collect_captures(operand, bound, captures),
        ast::ExprKind::Call { callee, args, .. } => {
            collect_captures(callee, bound, captures);
            for arg in args {
                collect_captures(arg, bound, captures);
            }
        }
        ast::ExprKind::MethodCall { receiver, args, .. } => {
            collect_captures(receiver, bound, captures);
            for arg in args {
                collect_captures(arg, bound, captures);
            }
        }
        ast::ExprKind::Field { object, .. } => collect_captures(object, bound, captures),
        ast::ExprKind::Index { object, index } => {
            collect_captures(object, bound, captures);
            collect_captures(index, bound, captures);
        }
        ast::ExprKind::If {
            cond,
            then_block,
            else_branch,
        } => {
            collect_captures(cond, bound, captures);
            collect_block(then_block, bound, captures);
            if let Some(else_expr) = else_branch {
                collect_captures(else_expr, bound, captures);
            }
        }
        ast::ExprKind::While { cond, body, .. } => {
            collect_captures(cond, bound, captures);
            collect_block(body, bound, captures);
        }
        ast::ExprKind::Loop { body, .. } => {
            collect_block(body, bound, captures);
        }
        ast::ExprKind::For {
            pattern,
            iter,
            body,
            ..
        } => {
            collect_captures(iter, bound, captures);
            for name in pattern.bindings() {
                bound.insert(name.to_string());
            }
            collect_block(body, bound, captures);
        }
        ast::ExprKind::When { scrutinee, arms } => {
            collect_captures(scrutinee, bound, captures);
            for arm in arms {
                for name in arm.pattern.bindings() {
                    bound.insert(name.to_string());
                }
                if let Some(guard) = &arm.guard {
                    collect_captures(guard, bound, captures);
                }
                collect_captures(&arm.body, bound, captures);
            }
        }
        ast::ExprKind::Return(Some(inner))
        | ast::ExprKind::Try(inner)
        | ast::ExprKind::Await(inner)
        | ast::ExprKind::Cast { expr: inner, .. }
        | ast::ExprKind::Is { expr: inner, .. } => collect_captures(inner, bound, captures),
        ast::ExprKind::StructLit { fields, base, .. } => {
            for (_, value) in fields {
                collect_captures(value, bound, captures);
            }
            if let Some(base_expr) = base {
                collect_captures(base_expr, bound, captures);
            }
        }
        ast::ExprKind::Tuple(elems) | ast::ExprKind::Array(elems) => {
            for elem in elems {
                collect_captures(elem, bound, captures);
            }
        }
        ast::ExprKind::ArrayRepeat { elem, count } => {
            collect_captures(elem, bound, captures);
            collect_captures(count, bound, captures);
        }
        ast::ExprKind::Range { start, end, .. } => {
            collect_captures(start, bound, captures);
            collect_captures(end, bound, captures);
        }
        ast::ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            collect_captures(cond, bound, captures);
            collect_captures(then_expr, bound, captures);
            collect_captures(else_expr, bound, captures);
        }
        ast::ExprKind::InterpolatedString(parts) => {
            for part in parts {
                if let ast::InterpPart::Expr(inner) = part {
                    collect_captures(inner, bound, captures);
                }
            }
        }
        ast::ExprKind::Closure { params, body, .. } => {
            // Nested closure: its parameters shadow, its free variables
            // propagate outward.
            let mut inner_bound = bound.clone();
            for (pattern, _) in params {
                for name in pattern.bindings() {
                    inner_bound.insert(name.to_string());
                }
            }
            collect_captures(body, &mut inner_bound, captures);
        }
        ast::ExprKind::New { args, .. } => {
            for arg in args {
                collect_captures(arg, bound, captures);
            }
        }
        _ => {}
    }
}

/// Walk a block, tracking `let`/`var` bindings as locally bound. Returns
/// the names newly bound so callers can unbind.
fn collect_block(
    block: &ast::Block,
    bound: &mut HashSet<String>,
    captures: &mut BTreeMap<String, CaptureMode>,
) -> Vec<String> {
    let mut introduced = Vec::new();
    for stmt in &block.stmts {
        match stmt {
            ast::Stmt::Let { pattern, value, .. } => {
                collect_captures(value, bound, captures);
                for name in pattern.bindings() {
                    if bound.insert(name.to_string()) {
                        introduced.push(name.to_string());
                    }
                }
            }
            ast::Stmt::LetElse {
                pattern,
                value,
                else_block,
                ..
            } => {
                collect_captures(value, bound, captures);
                collect_block(else_block, bound, captures);
                for name in pattern.bindings() {
                    if bound.insert(name.to_string()) {
                        introduced.push(name.to_string());
                    }
                }
            }
            ast::Stmt::Var { name, value, .. } => {
                collect_captures(value, bound, captures);
                if bound.insert(name.clone()) {
                    introduced.push(name.clone());
                }
            }
            ast::Stmt::Expr(expr) => collect_captures(expr, bound, captures),
            ast::Stmt::Decl(_) => {}
        }
    }
    introduced
}

fn upgrade(captures: &mut BTreeMap<String, CaptureMode>, name: &str, mode: CaptureMode) {
    let entry = captures.entry(name.to_string()).or_insert(mode);
    if mode > *entry {
        *entry = mode;
    }
}
