//! Back-stack of visited page ids.

/// Ordered record of visited pages, newest last.
///
/// The stack includes the current page at the top. Pushing the id that is
/// already on top is suppressed so a reload never creates a self-loop.
#[derive(Clone, Debug, Default)]
pub struct NavigationHistory {
    stack: Vec<String>,
}

impl NavigationHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a visit, returning whether the stack changed.
    pub fn push(&mut self, id: &str) -> bool {
        if self.top() == Some(id) {
            return false;
        }
        self.stack.push(id.to_owned());
        true
    }

    /// Removes and returns the newest entry.
    pub fn pop(&mut self) -> Option<String> {
        self.stack.pop()
    }

    /// Returns the newest entry.
    pub fn top(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    /// Number of recorded visits.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns whether no visit is recorded.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drops every recorded visit.
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// The visit order, oldest first.
    pub fn as_slice(&self) -> &[String] {
        &self.stack
    }
}
