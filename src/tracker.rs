// ABOUTME: Position bookkeeping for repeated values during a single pack or unpack.
// ABOUTME: Both sides number tracked values in the order their full encodings appear.

use crate::error::{Error, Result};
use crate::value::{ObjectRef, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Assigns positions to tracked values while writing.
///
/// Positions start at 1 and are shared between identity-tracked objects
/// and equality-tracked strings.
#[derive(Debug, Default)]
pub struct PackTracker {
    objects: HashMap<u64, usize>,
    strings: HashMap<Rc<str>, usize>,
    count: usize,
}

impl PackTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the earlier position of `obj`, or records it and returns None.
    pub fn track_identity(&mut self, obj: &ObjectRef) -> Option<usize> {
        if let Some(&pos) = self.objects.get(&obj.handle()) {
            return Some(pos);
        }
        let pos = self.next_position();
        self.objects.insert(obj.handle(), pos);
        None
    }

    /// Returns the position of an earlier equal string, or records this one.
    pub fn track_equal(&mut self, s: &Rc<str>) -> Option<usize> {
        if let Some(&pos) = self.strings.get(s) {
            return Some(pos);
        }
        let pos = self.next_position();
        self.strings.insert(Rc::clone(s), pos);
        None
    }

    /// Consume a position for a value that can never be referenced again.
    pub fn skip_position(&mut self) {
        self.next_position();
    }

    /// Number of positions handed out so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn next_position(&mut self) -> usize {
        self.count += 1;
        self.count
    }
}

/// Records decoded values by position while reading.
///
/// A position is reserved before its value is built; references to it fail
/// until the value (or its pre-created shell) is filled in.
#[derive(Debug, Default)]
pub struct UnpackTracker {
    values: Vec<Option<Value>>,
}

impl UnpackTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next position.
    pub fn reserve(&mut self) -> usize {
        self.values.push(None);
        self.values.len()
    }

    pub fn fill(&mut self, pos: usize, value: Value) {
        if let Some(slot) = pos.checked_sub(1).and_then(|i| self.values.get_mut(i)) {
            *slot = Some(value);
        }
    }

    /// The value at `pos`, failing for unknown or still-unfilled positions.
    pub fn get(&self, pos: usize) -> Result<Value> {
        pos.checked_sub(1)
            .and_then(|i| self.values.get(i))
            .and_then(Option::clone)
            .ok_or(Error::InvalidReference(pos))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
