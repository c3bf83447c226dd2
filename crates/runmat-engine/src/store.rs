//! Named-variable stores.
//!
//! A [`Session`] workspace is one store; a persisted-file codec would be
//! another. [`MemoryStore`] keeps variables in process memory.

use runmat_mx::{
    to_default, ForeignAllocator, ForeignValue, HostValue, MxArray, Ownership, ToForeign,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::session::Session;

/// Something that holds named foreign values.
pub trait VariableStore {
    /// Names of the stored variables, sorted.
    fn variable_names(&self) -> Result<Vec<String>>;

    /// Fresh host-owned copy of `name`.
    fn get_value(&self, name: &str) -> Result<ForeignValue>;

    /// Store a host-owned value; on success it is no longer host-owned.
    fn put_value(&self, name: &str, value: &mut ForeignValue) -> Result<()>;

    fn get_converted(&self, name: &str) -> Result<HostValue> {
        let mut value = self.get_value(name)?;
        let converted = to_default(&value)?;
        value.release()?;
        Ok(converted)
    }

    fn put(&self, name: &str, value: &dyn ToForeign) -> Result<()> {
        let mut foreign = value.to_foreign()?;
        self.put_value(name, &mut foreign)
    }

    /// Store several host values; stops at the first failure.
    fn put_many(&self, values: &[(&str, HostValue)]) -> Result<()> {
        for (name, value) in values {
            self.put(name, value)?;
        }
        Ok(())
    }
}

impl VariableStore for Session {
    fn variable_names(&self) -> Result<Vec<String>> {
        Session::variable_names(self)
    }

    fn get_value(&self, name: &str) -> Result<ForeignValue> {
        Session::get_value(self, name)
    }

    fn put_value(&self, name: &str, value: &mut ForeignValue) -> Result<()> {
        Session::put_value(self, name, value)
    }

    fn get_converted(&self, name: &str) -> Result<HostValue> {
        Session::get_converted(self, name)
    }
}

/// Copy `names` (every variable when empty) from one store into another.
pub fn copy_variables(
    from: &dyn VariableStore,
    to: &dyn VariableStore,
    names: &[&str],
) -> Result<()> {
    let names: Vec<String> = if names.is_empty() {
        from.variable_names()?
    } else {
        names.iter().map(|n| n.to_string()).collect()
    };
    for name in &names {
        let mut value = from.get_value(name)?;
        if let Err(err) = to.put_value(name, &mut value) {
            if value.ownership() == Ownership::HostOwned {
                value.release()?;
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Variables held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    variables: Mutex<BTreeMap<String, MxArray>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VariableStore for MemoryStore {
    fn variable_names(&self) -> Result<Vec<String>> {
        let variables = self.variables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(variables.keys().cloned().collect())
    }

    fn get_value(&self, name: &str) -> Result<ForeignValue> {
        let array = {
            let variables = self.variables.lock().unwrap_or_else(|e| e.into_inner());
            variables
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::UndefinedVariable(name.to_string()))?
        };
        Ok(ForeignAllocator::global().adopt(array)?)
    }

    fn put_value(&self, name: &str, value: &mut ForeignValue) -> Result<()> {
        if !runmat_mx::is_valid_identifier(name) {
            return Err(EngineError::InvalidArgument(format!(
                "'{name}' is not a valid variable name"
            )));
        }
        let array = value.array()?.clone();
        value.transfer_to_session()?;
        let mut variables = self.variables.lock().unwrap_or_else(|e| e.into_inner());
        variables.insert(name.to_string(), array);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runmat_mx::HostArray;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store
            .put_many(&[
                ("b", HostValue::from("text")),
                ("a", HostValue::Array(HostArray::vector(vec![1.0, 2.0]))),
            ])
            .unwrap();
        assert_eq!(store.variable_names().unwrap(), vec!["a", "b"]);
        assert_eq!(store.get_converted("b").unwrap(), HostValue::from("text"));
        assert!(matches!(
            store.get_value("missing"),
            Err(EngineError::UndefinedVariable(_))
        ));
    }

    #[test]
    fn copies_between_stores() {
        let from = MemoryStore::new();
        from.put("x", &1.0f64).unwrap();
        from.put("y", &HostValue::from("two")).unwrap();
        let to = MemoryStore::new();
        copy_variables(&from, &to, &[]).unwrap();
        assert_eq!(to.variable_names().unwrap(), vec!["x", "y"]);
        assert_eq!(to.get_converted("y").unwrap(), HostValue::from("two"));

        let partial = MemoryStore::new();
        assert!(matches!(
            copy_variables(&from, &partial, &["x", "nope"]),
            Err(EngineError::UndefinedVariable(_))
        ));
        assert_eq!(partial.variable_names().unwrap(), vec!["x"]);
    }

    #[test]
    fn stored_values_change_owner() {
        let store = MemoryStore::new();
        let mut v = 5i32.to_foreign().unwrap();
        store.put_value("v", &mut v).unwrap();
        assert_eq!(v.ownership(), Ownership::SessionOwned);
        assert!(matches!(store.put_value("w", &mut v), Err(EngineError::Mx(_))));
        assert!(matches!(
            store.put("bad name", &1.0f64),
            Err(EngineError::InvalidArgument(_))
        ));
    }
}
