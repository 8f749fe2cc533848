// Class hierarchy validation: acyclic extends chains, virtual/override
// pairing, abstract instantiation rules, value-class restrictions, and
// interface coverage.

use super::TypeChecker;
use crate::env::{ClassInfo, MethodInfo};
use crate::ty::Ty;

impl<'a> TypeChecker<'a> {
    pub(crate) fn validate_classes(&mut self) {
        let names: Vec<String> = self.env.classes.keys().cloned().collect();
        for name in &names {
            self.validate_class(name);
        }
    }

    fn validate_class(&mut self, name: &str) {
        let Some(class) = self.env.classes.get(name).cloned() else {
            return;
        };

        self.check_base_chain(&class);
        self.check_modifier_conflicts(&class);
        self.check_overrides(&class);
        self.check_interfaces(&class);
        if !class.is_abstract {
            self.check_abstract_coverage(&class);
        }
    }

    fn check_base_chain(&mut self, class: &ClassInfo) {
        let Some(base) = &class.base else {
            return;
        };

        let Some(base_info) = self.env.classes.get(base).cloned() else {
            self.error(
                "T046",
                format!(
                    "base class `{}` of `{}` not found",
                    base, class.name
                ),
                &class.span,
            );
            return;
        };

        if base_info.is_sealed {
            self.error(
                "T046",
                format!(
                    "cannot extend `{}`: the class is sealed",
                    base
                ),
                &class.span,
            );
        }
        if base_info.is_value_class != class.is_value_class {
            self.error(
                "T044",
                format!(
                    "`{}` and its base `{}` disagree on `@value`",
                    class.name, base
                ),
                &class.span,
            );
        }

        // Cycle detection along the extends chain.
        let mut seen = vec![class.name.clone()];
        let mut cursor = Some(base.clone());
        while let Some(current) = cursor {
            if seen.contains(&current) {
                self.error_with_help(
                    "T039",
                    format!(
                        "circular inheritance involving `{}`",
                        class.name
                    ),
                    &class.span,
                    format!("chain: {} -> {}", seen.join(" -> "), current),
                );
                return;
            }
            seen.push(current.clone());
            cursor = self.env.classes.get(&current).and_then(|c| c.base.clone());
        }
    }

    fn check_modifier_conflicts(&mut self, class: &ClassInfo) {
        if class.is_value_class && class.is_pooled {
            self.error_with_help(
                "T044",
                format!(
                    "class `{}` cannot be both `@value` and `@pool`",
                    class.name
                ),
                &class.span,
                "value classes live on the stack; pooled classes are heap-managed",
            );
        }
        if class.is_value_class {
            for method in &class.methods {
                if method.is_virtual {
                    self.error_with_help(
                        "T042",
                        format!(
                            "value class `{}` cannot declare virtual method `{}`",
                            class.name, method.sig.name
                        ),
                        &method.sig.span,
                        "value classes have no vtable; remove `virtual` or `@value`",
                    );
                }
            }
        }
    }

    fn check_overrides(&mut self, class: &ClassInfo) {
        for method in &class.methods {
            if !method.is_override {
                continue;
            }
            let Some(base) = &class.base else {
                self.error(
                    "T063",
                    format!(
                        "`{}` marks `{}` as override but has no base class",
                        class.name, method.sig.name
                    ),
                    &method.sig.span,
                );
                continue;
            };

            match self.find_virtual_upward(base, &method.sig.name) {
                Some(parent_method) => {
                    if !parent_method.is_virtual && !parent_method.is_override {
                        self.error(
                            "T064",
                            format!(
                                "cannot override non-virtual method `{}`",
                                method.sig.name
                            ),
                            &method.sig.span,
                        );
                    }
                    self.check_override_signature(class, method, &parent_method);
                }
                None => {
                    self.error(
                        "T065",
                        format!(
                            "override `{}` has no matching method in the base chain of `{}`",
                            method.sig.name, class.name
                        ),
                        &method.sig.span,
                    );
                }
            }
        }
    }

    fn find_virtual_upward(&self, base: &str, method: &str) -> Option<MethodInfo> {
        for info in self.env.class_chain(base) {
            if let Some(m) = info.method(method) {
                return Some(m.clone());
            }
        }
        None
    }

    /// Override and overridden signatures must agree parameter by
    /// parameter and on the return type (receivers excluded).
    fn check_override_signature(
        &mut self,
        class: &ClassInfo,
        method: &MethodInfo,
        parent: &MethodInfo,
    ) {
        let own: Vec<&Ty> = method
            .sig
            .params
            .iter()
            .filter(|(n, _)| n != "this")
            .map(|(_, t)| t)
            .collect();
        let inherited: Vec<&Ty> = parent
            .sig
            .params
            .iter()
            .filter(|(n, _)| n != "this")
            .map(|(_, t)| t)
            .collect();

        let params_match = own.len() == inherited.len()
            && own.iter().zip(&inherited).all(|(a, b)| self.types_equal_for_override(a, b));
        let ret_match = self.types_equal_for_override(&method.sig.ret, &parent.sig.ret);

        if !params_match || !ret_match {
            self.error_with_help(
                "T058",
                format!(
                    "override `{}::{}` does not match the overridden signature",
                    class.name, method.sig.name
                ),
                &method.sig.span,
                format!(
                    "expected `({}) -> {}`",
                    inherited
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                    parent.sig.ret
                ),
            );
        }
    }

    fn types_equal_for_override(&self, a: &Ty, b: &Ty) -> bool {
        // Receiver-dependent class types compare by name only.
        match (a, b) {
            (Ty::Class { name: n1, .. }, Ty::Class { name: n2, .. }) => n1 == n2,
            _ => a == b,
        }
    }

    fn check_interfaces(&mut self, class: &ClassInfo) {
        for interface in &class.interfaces {
            let Some(behavior) = self.env.behaviors.get(interface).cloned() else {
                self.error(
                    "T047",
                    format!(
                        "interface `{}` implemented by `{}` not found",
                        interface, class.name
                    ),
                    &class.span,
                );
                continue;
            };

            for bm in &behavior.methods {
                if bm.has_default {
                    continue;
                }
                if self.env.find_class_method(&class.name, &bm.sig.name).is_none() {
                    self.error_with_help(
                        "T026",
                        format!(
                            "class `{}` is missing method `{}` required by behavior `{}`",
                            class.name, bm.sig.name, interface
                        ),
                        &class.span,
                        format!("implement `func {}(…)` in the class body", bm.sig.name),
                    );
                }
            }
        }
    }

    /// A concrete class must implement every abstract method introduced
    /// by abstract ancestors (virtual methods without bodies).
    fn check_abstract_coverage(&mut self, class: &ClassInfo) {
        let chain: Vec<ClassInfo> = self
            .env
            .class_chain(&class.name)
            .into_iter()
            .skip(1)
            .cloned()
            .collect();
        for ancestor in &chain {
            if !ancestor.is_abstract {
                continue;
            }
            for method in &ancestor.methods {
                let is_abstract_method = method.is_virtual && !method.sig.has_body;
                if !is_abstract_method {
                    continue;
                }
                let implemented = self
                    .env
                    .class_chain(&class.name)
                    .iter()
                    .take_while(|c| c.name != ancestor.name)
                    .any(|c| {
                        c.method(&method.sig.name)
                            .map(|m| m.sig.has_body)
                            .unwrap_or(false)
                    });
                if !implemented {
                    self.error_with_help(
                        "T045",
                        format!(
                            "class `{}` does not implement abstract method `{}` from `{}`",
                            class.name, method.sig.name, ancestor.name
                        ),
                        &class.span,
                        format!("add `override func {}(…) {{ … }}`", method.sig.name),
                    );
                }
            }
        }
    }
}
