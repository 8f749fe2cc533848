// Behavior (trait) and impl validation: every `impl Behavior for T`
// must exist, cover all non-default methods, and match signatures after
// `This` substitution.

use super::TypeChecker;
use crate::ty::Ty;
use std::collections::HashMap;

impl<'a> TypeChecker<'a> {
    pub(crate) fn validate_impls(&mut self) {
        let impls = self.env.impls.clone();
        for imp in &impls {
            let Some(behavior_name) = &imp.behavior else {
                continue; // inherent impl: nothing to cover
            };
            let Some(behavior) = self.env.behaviors.get(behavior_name).cloned() else {
                self.error(
                    "T025",
                    format!("unknown behavior `{}`", behavior_name),
                    &imp.span,
                );
                continue;
            };

            let mut this_map = HashMap::new();
            this_map.insert("This".to_string(), imp.self_ty.clone());

            for bm in &behavior.methods {
                let provided = imp.methods.iter().find(|m| m.name == bm.sig.name);
                match provided {
                    None if !bm.has_default => {
                        self.error_with_help(
                            "T026",
                            format!(
                                "impl of `{}` for `{}` is missing method `{}`",
                                behavior_name, imp.self_name, bm.sig.name
                            ),
                            &imp.span,
                            format!("add `func {}(…)` to the impl block", bm.sig.name),
                        );
                    }
                    None => {} // default body fills the gap
                    Some(sig) => {
                        let expected_params: Vec<Ty> = bm
                            .sig
                            .params
                            .iter()
                            .filter(|(n, _)| n != "this")
                            .map(|(_, t)| t.substitute(&this_map))
                            .collect();
                        let actual_params: Vec<Ty> = sig
                            .params
                            .iter()
                            .filter(|(n, _)| n != "this")
                            .map(|(_, t)| t.clone())
                            .collect();
                        if expected_params.len() != actual_params.len() {
                            self.error(
                                "T004",
                                format!(
                                    "method `{}` of behavior `{}` takes {} parameters, impl has {}",
                                    bm.sig.name,
                                    behavior_name,
                                    expected_params.len(),
                                    actual_params.len()
                                ),
                                &sig.span,
                            );
                            continue;
                        }
                        let expected_ret = bm.sig.ret.substitute(&this_map);
                        let params_ok = expected_params
                            .iter()
                            .zip(&actual_params)
                            .all(|(e, a)| self.impl_types_match(e, a));
                        if !params_ok || !self.impl_types_match(&expected_ret, &sig.ret) {
                            self.error(
                                "T001",
                                format!(
                                    "method `{}` does not match its declaration in behavior `{}`",
                                    bm.sig.name, behavior_name
                                ),
                                &sig.span,
                            );
                        }
                    }
                }
            }

            // Methods an impl adds that the behavior never declared.
            for sig in &imp.methods {
                if behavior.method(&sig.name).is_none() {
                    self.error(
                        "T006",
                        format!(
                            "method `{}` is not a member of behavior `{}`",
                            sig.name, behavior_name
                        ),
                        &sig.span,
                    );
                }
            }
        }
    }

    fn impl_types_match(&self, expected: &Ty, actual: &Ty) -> bool {
        // Generic impl parameters line up by position; a named parameter
        // on either side matches anything structurally compatible.
        match (expected, actual) {
            (Ty::Named { name, args: a1, .. }, Ty::Named { name: n2, args: a2, .. }) => {
                name == n2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| self.impl_types_match(x, y))
            }
            (Ty::Named { args, .. }, _) if args.is_empty() => true,
            (_, Ty::Named { args, .. }) if args.is_empty() => true,
            (Ty::Ref { inner: i1, .. }, Ty::Ref { inner: i2, .. }) => {
                self.impl_types_match(i1, i2)
            }
            _ => expected == actual,
        }
    }
}
