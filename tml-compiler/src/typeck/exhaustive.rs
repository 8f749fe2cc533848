// `when` exhaustiveness: enum variants, boolean both-sides, and
// wildcard/binding arms are the coverage primitives. Guarded arms never
// count toward coverage. A missing case is reported with a concrete
// witness the user can paste into a new arm.

use super::TypeChecker;
use crate::ty::Ty;
use tml_ast as ast;

impl<'a> TypeChecker<'a> {
    pub(crate) fn check_exhaustive(
        &mut self,
        scrutinee_ty: &Ty,
        arms: &[ast::WhenArm],
        span: &ast::Span,
    ) {
        let ty = self.apply(scrutinee_ty);

        // Any unguarded wildcard or binding covers everything.
        let has_catch_all = arms
            .iter()
            .any(|arm| arm.guard.is_none() && pattern_catches_all(&arm.pattern));
        if has_catch_all {
            return;
        }

        match ty.deref_all() {
            Ty::Named { name, .. } => {
                let Some(info) = self.env.enums.get(name).cloned() else {
                    // Structs and other named types need a catch-all.
                    self.missing_case(span, "_");
                    return;
                };
                let mut covered: Vec<bool> = vec![false; info.variants.len()];
                for arm in arms {
                    if arm.guard.is_some() {
                        continue;
                    }
                    mark_covered_variants(&arm.pattern, &info, &mut covered);
                }
                for (i, variant) in info.variants.iter().enumerate() {
                    if !covered[i] {
                        let witness = if variant.payload.is_empty() {
                            variant.name.clone()
                        } else {
                            let holes = vec!["_"; variant.payload.len()].join(", ");
                            format!("{}({})", variant.name, holes)
                        };
                        self.missing_case(span, &witness);
                        return; // one witness is enough
                    }
                }
            }
            Ty::Bool => {
                let mut has_true = false;
                let mut has_false = false;
                for arm in arms {
                    if arm.guard.is_some() {
                        continue;
                    }
                    mark_bool(&arm.pattern, &mut has_true, &mut has_false);
                }
                if !has_true {
                    self.missing_case(span, "true");
                } else if !has_false {
                    self.missing_case(span, "false");
                }
            }
            Ty::Error | Ty::Var(_) => {}
            _ => {
                // Integers, strings, chars: literal arms can never cover
                // the whole domain.
                self.missing_case(span, "_");
            }
        }
    }

    fn missing_case(&mut self, span: &ast::Span, witness: &str) {
        self.error_with_help(
            "T037",
            format!("`when` is not exhaustive: `{}` is not covered", witness),
            span,
            format!("add an arm `{} => …` or a catch-all `_ => …`", witness),
        );
    }
}

fn pattern_catches_all(pattern: &ast::Pattern) -> bool {
    match pattern {
        ast::Pattern::Wildcard { .. } | ast::Pattern::Ident { .. } => true,
        ast::Pattern::Or { alts, .. } => alts.iter().any(pattern_catches_all),
        _ => false,
    }
}

fn mark_covered_variants(
    pattern: &ast::Pattern,
    info: &crate::env::EnumInfo,
    covered: &mut [bool],
) {
    match pattern {
        ast::Pattern::Enum { variant, args, .. } => {
            if let Some((idx, _)) = info.variant(variant) {
                // A variant pattern covers its variant only when every
                // payload slot is itself irrefutable.
                if args.iter().all(pattern_catches_all) || args.is_empty() {
                    covered[idx] = true;
                }
            }
        }
        ast::Pattern::Or { alts, .. } => {
            for alt in alts {
                mark_covered_variants(alt, info, covered);
            }
        }
        _ => {}
    }
}

fn mark_bool(pattern: &ast::Pattern, has_true: &mut bool, has_false: &mut bool) {
    match pattern {
        ast::Pattern::Literal {
            value: ast::Literal::Bool(b),
            ..
        } => {
            if *b {
                *has_true = true;
            } else {
                *has_false = true;
            }
        }
        ast::Pattern::Or { alts, .. } => {
            for alt in alts {
                mark_bool(alt, has_true, has_false);
            }
        }
        _ => {}
    }
}
