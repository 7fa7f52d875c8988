//! Caller-side parameters and their mapping onto statement slots.

pub(crate) mod binder;

use crate::types::Value;

/// One caller-supplied parameter: an optional name plus its value.
///
/// Names may be given with or without their sigil (`:id`, `@id`, `$id` or `id`).
/// Unnamed parameters bind positionally.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: Option<String>,
    value: Value,
}

impl Parameter {
    #[must_use]
    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }

    #[must_use]
    pub fn positional(value: Value) -> Self {
        Self { name: None, value }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Ordered parameters of one command.
///
/// Every mutation marks the collection dirty, which forces the command to remap all of its
/// statements before the next bind.
#[derive(Debug, Clone, Default)]
pub struct ParameterCollection {
    items: Vec<Parameter>,
    dirty: bool,
}

impl ParameterCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, param: Parameter) -> &mut Self {
        self.items.push(param);
        self.dirty = true;
        self
    }

    pub fn add(&mut self, value: Value) -> &mut Self {
        self.push(Parameter::positional(value))
    }

    pub fn add_named(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.push(Parameter::named(name, value))
    }

    /// Replace the value of the parameter at `index`. Returns `false` if out of range.
    pub fn set_value(&mut self, index: usize, value: Value) -> bool {
        match self.items.get_mut(index) {
            Some(param) => {
                param.value = value;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Replace the value of the first parameter named `name` (sigil and case insensitive).
    /// Returns `false` if no such parameter exists.
    pub fn set_named(&mut self, name: &str, value: Value) -> bool {
        match self.position(name) {
            Some(index) => self.set_value(index, value),
            None => false,
        }
    }

    /// Index of the first parameter whose name matches `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|p| p.name().is_some_and(|n| binder::names_match(n, name)))
    }

    pub fn remove(&mut self, index: usize) -> Option<Parameter> {
        if index < self.items.len() {
            self.dirty = true;
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.dirty = true;
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.items.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

impl FromIterator<Parameter> for ParameterCollection {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            dirty: true,
        }
    }
}

impl FromIterator<Value> for ParameterCollection {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        iter.into_iter().map(Parameter::positional).collect()
    }
}
