//! Variable models referenced by variable events.

use crate::context::MutationContext;
use crate::error::VariableError;
use crate::events::{EventKind, VarCreate, VarDelete, VarRename};
use crate::id::{Uid, VariableId};
use crate::serialization::VariableState;

#[derive(Debug, Clone, PartialEq)]
pub struct VariableModel {
    pub id: VariableId,
    pub name: String,
    pub var_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct VariableMap {
    variables: Vec<VariableModel>,
}

impl VariableMap {
    /// Create a variable, or return the existing one with the same name and
    /// type. Names compare case-insensitively.
    pub fn create_variable(
        &mut self,
        ctx: &mut MutationContext,
        name: &str,
        var_type: &str,
        id: Option<VariableId>,
    ) -> Result<VariableId, VariableError> {
        if let Some(existing) = self.get_variable(name, None) {
            if existing.var_type != var_type {
                return Err(VariableError::NameInUse {
                    name: name.to_owned(),
                    existing_type: existing.var_type.clone(),
                });
            }
            if id.is_some_and(|id| id != existing.id) {
                return Err(VariableError::IdInUse {
                    id: existing.id,
                    existing: existing.name.clone(),
                });
            }
            return Ok(existing.id);
        }
        if let Some(id) = id
            && let Some(existing) = self.get_variable_by_id(id)
        {
            return Err(VariableError::IdInUse {
                id,
                existing: existing.name.clone(),
            });
        }

        let id = id.unwrap_or_else(Uid::generate);
        self.variables.push(VariableModel {
            id,
            name: name.to_owned(),
            var_type: var_type.to_owned(),
        });
        ctx.fire(EventKind::VarCreate(VarCreate {
            var_id: id,
            var_type: var_type.to_owned(),
            var_name: name.to_owned(),
        }));
        Ok(id)
    }

    pub fn delete_variable(
        &mut self,
        ctx: &mut MutationContext,
        id: VariableId,
    ) -> Result<(), VariableError> {
        let index = self
            .variables
            .iter()
            .position(|v| v.id == id)
            .ok_or(VariableError::NotFound(id))?;
        let removed = self.variables.remove(index);
        ctx.fire(EventKind::VarDelete(VarDelete {
            var_id: id,
            var_type: removed.var_type,
            var_name: removed.name,
        }));
        Ok(())
    }

    pub fn rename_variable(
        &mut self,
        ctx: &mut MutationContext,
        id: VariableId,
        new_name: &str,
    ) -> Result<(), VariableError> {
        let variable = self
            .variables
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(VariableError::NotFound(id))?;
        if variable.name == new_name {
            return Ok(());
        }
        let old_name = std::mem::replace(&mut variable.name, new_name.to_owned());
        ctx.fire(EventKind::VarRename(VarRename {
            var_id: id,
            old_name,
            new_name: new_name.to_owned(),
        }));
        Ok(())
    }

    pub fn get_variable_by_id(&self, id: VariableId) -> Option<&VariableModel> {
        self.variables.iter().find(|v| v.id == id)
    }

    /// Look up by name, optionally restricted to one type.
    pub fn get_variable(&self, name: &str, var_type: Option<&str>) -> Option<&VariableModel> {
        self.variables.iter().find(|v| {
            v.name.eq_ignore_ascii_case(name) && var_type.is_none_or(|t| t == v.var_type)
        })
    }

    pub fn all(&self) -> &[VariableModel] {
        &self.variables
    }

    pub fn save(&self) -> Vec<VariableState> {
        self.variables
            .iter()
            .map(|v| VariableState {
                id: v.id,
                name: v.name.clone(),
                var_type: v.var_type.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_idempotent_per_name_and_type() {
        let mut vars = VariableMap::default();
        let mut ctx = MutationContext::default();
        let a = vars.create_variable(&mut ctx, "count", "", None).unwrap();
        let b = vars.create_variable(&mut ctx, "Count", "", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.events().len(), 1);
    }

    #[test]
    fn create_rejects_reused_id() {
        let mut vars = VariableMap::default();
        let mut ctx = MutationContext::default();
        let id = Uid::intern("var_dup");
        vars.create_variable(&mut ctx, "x", "", Some(id)).unwrap();
        assert!(matches!(
            vars.create_variable(&mut ctx, "y", "", Some(id)),
            Err(VariableError::IdInUse { .. })
        ));
    }

    #[test]
    fn rename_and_delete_fire_events() {
        let mut vars = VariableMap::default();
        let mut ctx = MutationContext::default();
        let id = vars.create_variable(&mut ctx, "x", "", None).unwrap();
        vars.rename_variable(&mut ctx, id, "y").unwrap();
        vars.delete_variable(&mut ctx, id).unwrap();

        let names: Vec<_> = ctx.events().iter().map(|e| e.type_name()).collect();
        assert_eq!(names, vec!["var_create", "var_rename", "var_delete"]);
        assert_eq!(
            vars.delete_variable(&mut ctx, id),
            Err(VariableError::NotFound(id))
        );
    }
}
