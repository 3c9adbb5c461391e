//! Caller-owned queue of task names.

use crate::result;
use crate::task::PriorResults;

/// Ordered task names for one invocation, consumed front to back.
///
/// The queue never reorders: sequencing is the caller's responsibility.
/// Consumption moves a cursor instead of shifting the names, so the
/// full list and the remaining tail stay inspectable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQueue {
    names: Vec<String>,
    cursor: usize,
}

impl TaskQueue {
    /// Create a queue from task names in execution order.
    pub fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            cursor: 0,
        }
    }

    /// Queue of the names that have no stored result yet.
    pub fn pending_against<I, N>(names: I, prior: &PriorResults) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !prior.contains_key(name)),
        )
    }

    /// Queue of the names with no stored result or a stored failure.
    pub fn retry_failed<I, N>(names: I, prior: &PriorResults) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self::new(names.into_iter().map(Into::into).filter(|name: &String| {
            prior.get(name).map_or(true, result::is_failed)
        }))
    }

    /// Next name without consuming it.
    pub fn peek(&self) -> Option<&str> {
        self.names.get(self.cursor).map(String::as_str)
    }

    /// Consume and return the next name.
    pub fn pop(&mut self) -> Option<String> {
        let name = self.names.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(name)
    }

    /// Names not yet consumed.
    pub fn remaining(&self) -> &[String] {
        &self.names[self.cursor..]
    }

    /// Names already consumed.
    pub fn consumed(&self) -> &[String] {
        &self.names[..self.cursor]
    }

    /// Number of names not yet consumed.
    pub fn len(&self) -> usize {
        self.names.len() - self.cursor
    }

    /// True once every name has been consumed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<N: Into<String>> FromIterator<N> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = N>>(iter: I) -> Self {
        Self::new(iter)
    }
}
