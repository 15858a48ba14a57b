//! Name resolution for expression evaluation
//!
//! An expression sees the execution's `data` and `variables` maps. The two
//! roots are addressable by name (`data.amount`, `variables.loopIndex`) and
//! every key of either map is also visible unqualified. On a name clash the
//! variable wins.

use serde_json::{Map, Value};

/// Read-only view over an execution's data and variables
#[derive(Debug, Clone, Copy)]
pub struct ExpressionScope<'a> {
    data: &'a Map<String, Value>,
    variables: &'a Map<String, Value>,
}

impl<'a> ExpressionScope<'a> {
    pub fn new(data: &'a Map<String, Value>, variables: &'a Map<String, Value>) -> Self {
        Self { data, variables }
    }

    pub fn data(&self) -> &'a Map<String, Value> {
        self.data
    }

    pub fn variables(&self) -> &'a Map<String, Value> {
        self.variables
    }

    /// Resolve a root identifier, `None` when nothing by that name exists
    pub fn resolve(&self, name: &str) -> Option<Value> {
        match name {
            "data" => Some(Value::Object(self.data.clone())),
            "variables" => Some(Value::Object(self.variables.clone())),
            _ => self
                .variables
                .get(name)
                .or_else(|| self.data.get(name))
                .cloned(),
        }
    }

    /// Resolve a dotted path such as `data.user.name` or `items.0`
    pub fn lookup_path(&self, path: &str) -> Option<Value> {
        let mut parts = path.split('.');
        let mut current = self.resolve(parts.next()?.trim())?;

        for part in parts {
            current = match current {
                Value::Object(mut map) => map.remove(part.trim())?,
                Value::Array(mut items) => {
                    let idx: usize = part.trim().parse().ok()?;
                    if idx >= items.len() {
                        return None;
                    }
                    items.swap_remove(idx)
                }
                _ => return None,
            };
        }

        Some(current)
    }
}
