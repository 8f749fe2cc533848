// Monomorphization queues. Instantiations are requested on demand at
// call sites and type references; the queues drain to a fixed point
// after the main pass because instantiated bodies can request more.

use super::{CgResult, CodegenError, LlvmIrGen, PendingFn};
use crate::env::FuncSig;
use crate::ty::Ty;
use std::collections::HashMap;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    /// Queue the instantiation of a generic function for the given
    /// substitution and return its mangled symbol stem immediately.
    pub(crate) fn require_fn_instantiation(
        &mut self,
        name: &str,
        sig: &FuncSig,
        subst: &HashMap<String, Ty>,
        span: &ast::Span,
    ) -> CgResult<String> {
        let args: Vec<Ty> = sig
            .generics
            .iter()
            .map(|g| subst.get(&g.name).cloned().unwrap_or(Ty::Unit))
            .collect();
        let mangled = super::mangle::mangle_name(name, &args);

        if self.instantiated.contains(&mangled) {
            return Ok(mangled);
        }
        self.instantiated.insert(mangled.clone());

        let decl = self.fn_decls.get(name).cloned().ok_or_else(|| {
            CodegenError::with_span(
                "C007",
                format!("no declaration found for generic function `{}`", name),
                span.clone(),
            )
        })?;

        self.pending_fns.push(PendingFn {
            decl,
            subst: subst.clone(),
            mangled: mangled.clone(),
        });
        Ok(mangled)
    }

    /// Generic struct methods instantiate together with their type: the
    /// impl's method bodies are emitted once per argument tuple.
    pub(crate) fn require_method_instantiation(
        &mut self,
        type_name: &str,
        type_args: &[Ty],
        method: &str,
        span: &ast::Span,
    ) -> CgResult<()> {
        let mangled_ty = super::mangle::mangle_name(type_name, type_args);
        let key = format!("{}_{}", mangled_ty, method);
        if self.instantiated.contains(&key) {
            return Ok(());
        }
        self.instantiated.insert(key.clone());

        // Find the impl block declaring this method.
        let mut found = None;
        for decl in &self.module.decls {
            let ast::Decl::Impl(imp) = decl else { continue };
            let self_name = match &imp.self_type {
                ast::TypeExpr::Named { path, .. } => {
                    path.last().cloned().unwrap_or_default()
                }
                _ => continue,
            };
            if self_name != type_name {
                continue;
            }
            if let Some(m) = imp.methods.iter().find(|m| m.name == method) {
                found = Some((imp.generics.clone(), m.clone()));
                break;
            }
        }
        let Some((impl_generics, method_decl)) = found else {
            return Err(CodegenError::with_span(
                "C008",
                format!(
                    "missing implementation of `{}::{}` for instantiation",
                    type_name, method
                ),
                span.clone(),
            ));
        };

        // The impl generics line up with the type's parameters.
        let type_params = self
            .env
            .structs
            .get(type_name)
            .map(|s| s.type_params.clone())
            .or_else(|| self.env.enums.get(type_name).map(|e| e.type_params.clone()))
            .unwrap_or_default();
        let mut subst: HashMap<String, Ty> = type_params
            .iter()
            .cloned()
            .zip(type_args.iter().cloned())
            .collect();
        for (g, arg) in impl_generics.iter().zip(type_args) {
            subst.insert(g.name.clone(), arg.clone());
        }
        subst.insert(
            "This".to_string(),
            Ty::Named {
                name: type_name.to_string(),
                module: String::new(),
                args: type_args.to_vec(),
            },
        );

        self.pending_fns.push(PendingFn {
            decl: method_decl,
            subst,
            mangled: key,
        });
        Ok(())
    }

    /// Drain the instantiation queues until nothing new is requested.
    pub(crate) fn drain_pending(&mut self) {
        // A generous bound against runaway recursive instantiation.
        let mut rounds = 0;
        while !self.pending_fns.is_empty() {
            rounds += 1;
            if rounds > 64 {
                self.record_error(CodegenError::new(
                    "C007",
                    "generic instantiation did not reach a fixed point",
                ));
                return;
            }
            let batch: Vec<PendingFn> = std::mem::take(&mut self.pending_fns);
            for pending in batch {
                self.gen_function(
                    &pending.decl,
                    None,
                    &pending.subst,
                    Some(pending.mangled.clone()),
                );
            }
        }
    }
}
