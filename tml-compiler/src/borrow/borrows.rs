// Borrow tracking per place: shared XOR exclusive, no moves or
// assignments while borrowed, `var` required for mutable borrows.

use super::{BorrowChecker, Borrower, Ctx};
use tml_ast as ast;

impl<'a> BorrowChecker<'a> {
    /// All uses of a bare identifier funnel through here.
    pub(crate) fn use_place(&mut self, name: &str, ctx: Ctx, range: &ast::Span) {
        let Some(state) = self.place(name) else {
            return; // unknown names are the type checker's problem
        };
        let moved = state.moved.clone();
        let moved_fields = state.moved_fields.clone();
        let copy = state.copy;
        let mutable = state.mutable;
        let mut_borrow = state.live_mut().cloned();
        let has_shared = state.live_shared().next().is_some();

        // Any use of a fully moved place.
        if let Some(moved_at) = &moved {
            let code = match ctx {
                Ctx::BorrowShared | Ctx::BorrowMut => "B005",
                _ => "B001",
            };
            let verb = match ctx {
                Ctx::BorrowShared | Ctx::BorrowMut => "borrow",
                Ctx::Consume => "move",
                Ctx::Read => "use",
            };
            self.report_with_label(
                code,
                format!("cannot {} `{}`: value was moved", verb, name),
                range,
                moved_at,
                "value moved here",
            );
            return;
        }

        // Whole-value use of a partially moved place.
        if !moved_fields.is_empty() && matches!(ctx, Ctx::Consume | Ctx::BorrowShared | Ctx::BorrowMut)
        {
            let (field, moved_at) = moved_fields[0].clone();
            self.report_with_label(
                "B016",
                format!(
                    "cannot use `{}`: its field `{}` was moved out",
                    name, field
                ),
                range,
                &moved_at,
                "field moved here",
            );
            return;
        }

        match ctx {
            Ctx::Read => {
                if let Some(borrow) = &mut_borrow {
                    self.report_with_label(
                        "B013",
                        format!("cannot use `{}` while it is mutably borrowed", name),
                        range,
                        &borrow.span,
                        "mutable borrow occurs here",
                    );
                }
            }
            Ctx::Consume => {
                if copy {
                    return;
                }
                if has_shared || mut_borrow.is_some() {
                    let borrow_span = mut_borrow
                        .as_ref()
                        .map(|b| b.span.clone())
                        .or_else(|| {
                            self.place(name)
                                .and_then(|p| p.live_shared().next().map(|b| b.span.clone()))
                        })
                        .unwrap_or_else(|| range.clone());
                    self.report_with_label(
                        "B002",
                        format!("cannot move `{}` while it is borrowed", name),
                        range,
                        &borrow_span,
                        "borrow occurs here",
                    );
                    return;
                }
                if let Some(place) = self.place_mut(name) {
                    place.moved = Some(range.clone());
                }
            }
            Ctx::BorrowShared => {
                if let Some(borrow) = &mut_borrow {
                    self.report_with_label(
                        "B009",
                        format!(
                            "cannot borrow `{}` as shared: it is already mutably borrowed",
                            name
                        ),
                        range,
                        &borrow.span,
                        "mutable borrow occurs here",
                    );
                    return;
                }
                if let Some(place) = self.place_mut(name) {
                    place.borrows.push(Borrower {
                        holder: None,
                        span: range.clone(),
                        mutable: false,
                    });
                }
            }
            Ctx::BorrowMut => {
                if !mutable {
                    let decl_span = self
                        .place(name)
                        .map(|p| p.decl_span.clone())
                        .unwrap_or_else(|| range.clone());
                    self.report_with_label(
                        "B006",
                        format!(
                            "cannot mutably borrow `{}`: it is not declared `var`",
                            name
                        ),
                        range,
                        &decl_span,
                        "declared immutable here",
                    );
                }
                if let Some(borrow) = &mut_borrow {
                    self.report_with_label(
                        "B008",
                        format!("cannot mutably borrow `{}` twice", name),
                        range,
                        &borrow.span,
                        "first mutable borrow occurs here",
                    );
                    return;
                }
                if has_shared {
                    let shared_span = self
                        .place(name)
                        .and_then(|p| p.live_shared().next().map(|b| b.span.clone()))
                        .unwrap_or_else(|| range.clone());
                    self.report_with_label(
                        "B007",
                        format!(
                            "cannot mutably borrow `{}`: it is already borrowed as shared",
                            name
                        ),
                        range,
                        &shared_span,
                        "shared borrow occurs here",
                    );
                    return;
                }
                if let Some(place) = self.place_mut(name) {
                    place.borrows.push(Borrower {
                        holder: None,
                        span: range.clone(),
                        mutable: true,
                    });
                }
            }
        }
    }

    /// Field projection: consuming one field poisons only that field.
    pub(crate) fn use_field(
        &mut self,
        object: &ast::Expr,
        field: &str,
        ctx: Ctx,
        range: &ast::Span,
    ) {
        let ast::ExprKind::Ident(name) = &object.kind else {
            self.walk_expr(object, Ctx::Read);
            return;
        };
        let Some(state) = self.place(name) else {
            return;
        };

        if let Some(moved_at) = state.moved.clone() {
            self.report_with_label(
                "B001",
                format!("cannot use `{}.{}`: `{}` was moved", name, field, name),
                range,
                &moved_at,
                "value moved here",
            );
            return;
        }
        if let Some((_, moved_at)) = state
            .moved_fields
            .iter()
            .find(|(f, _)| f == field)
            .cloned()
        {
            self.report_with_label(
                "B011",
                format!("field `{}.{}` was already moved out", name, field),
                range,
                &moved_at,
                "field moved here",
            );
            return;
        }

        if matches!(ctx, Ctx::Consume) && !state.copy && !self.field_is_copy(name, field) {
            if let Some(place) = self.place_mut(name) {
                place
                    .moved_fields
                    .push((field.to_string(), range.clone()));
            }
        }
    }

    fn field_is_copy(&self, place: &str, field: &str) -> bool {
        // Without per-field types we only know field copy-ness for
        // structs visible in the environment; default to copy.
        let _ = place;
        for info in self.env.structs.values() {
            if let Some(f) = info.fields.iter().find(|f| f.name == field) {
                return f.ty.is_copy();
            }
        }
        true
    }

    /// Assignment to a place: rejected while any borrow is live (B004),
    /// otherwise it revives a moved-out place.
    pub(crate) fn check_assign(&mut self, name: &str, range: &ast::Span) {
        let Some(state) = self.place(name) else {
            return;
        };
        let borrow = state
            .borrows
            .first()
            .cloned();
        if let Some(borrow) = borrow {
            self.report_with_label(
                "B004",
                format!("cannot assign to `{}` while it is borrowed", name),
                range,
                &borrow.span,
                "borrow of the value occurs here",
            );
            return;
        }
        if let Some(place) = self.place_mut(name) {
            place.moved = None;
            place.moved_fields.clear();
        }
    }
}
