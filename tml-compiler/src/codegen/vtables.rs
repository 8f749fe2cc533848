// Vtable emission: one global per class that dispatches virtually,
// slots in a stable order (behavior declaration order first, then the
// class's own virtual method order; inherited methods reuse parent
// slots). Dyn-behavior fat pointers reuse these globals.

use super::LlvmIrGen;

impl<'a> LlvmIrGen<'a> {
    /// Make sure `@vtable.Class` exists (used before emission order is
    /// final; the global text lands in the globals buffer).
    pub(crate) fn require_vtable(&mut self, class: &str) {
        if self.vtables_emitted.contains(class) {
            return;
        }
        if !self.env.class_needs_vtable(class) {
            return;
        }
        self.vtables_emitted.insert(class.to_string());

        let slots = self.env.vtable_layout(class);
        let mut entries = Vec::new();
        for method in &slots {
            match self.env.vtable_impl_class(class, method) {
                Some(owner) => entries.push(format!("ptr @tml_{}_{}", owner, method)),
                None => entries.push("ptr null".to_string()),
            }
        }
        if entries.is_empty() {
            entries.push("ptr null".to_string());
        }
        self.globals.push_str(&format!(
            "@vtable.{} = internal constant [{} x ptr] [{}]\n",
            class,
            entries.len(),
            entries.join(", ")
        ));
    }

    /// Emit vtables for every class in the environment that needs one.
    pub(crate) fn emit_all_vtables(&mut self) {
        let classes: Vec<String> = self.env.classes.keys().cloned().collect();
        for class in classes {
            self.require_vtable(&class);
        }
    }

    /// Build a `dyn Behavior` fat pointer from a concrete receiver.
    pub(crate) fn gen_dyn_fat_pointer(&mut self, data_ptr: &str, class: &str) -> String {
        self.require_vtable(class);
        let with_data = self.fresh_reg();
        self.emit_line(format!(
            "  {} = insertvalue {{ ptr, ptr }} poison, ptr {}, 0",
            with_data, data_ptr
        ));
        let fat = self.fresh_reg();
        self.emit_line(format!(
            "  {} = insertvalue {{ ptr, ptr }} {}, ptr @vtable.{}, 1",
            fat, with_data, class
        ));
        fat
    }
}
