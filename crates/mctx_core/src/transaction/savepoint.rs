//! Savepoint markers.

/// A position in a transaction's operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SavepointMarker {
    sequence_in_log: u64,
}

impl SavepointMarker {
    /// Log position recorded when the savepoint was set.
    #[must_use]
    pub const fn sequence_in_log(self) -> u64 {
        self.sequence_in_log
    }
}

/// LIFO stack of savepoint markers.
///
/// Markers are strictly increasing from bottom to top.
#[derive(Debug, Default)]
pub struct SavepointStack {
    markers: Vec<SavepointMarker>,
}

impl SavepointStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a marker at `sequence_in_log`.
    ///
    /// Positions must be strictly increasing; a stale position is raised to
    /// one past the current top.
    pub fn push(&mut self, sequence_in_log: u64) -> SavepointMarker {
        let sequence_in_log = match self.markers.last() {
            Some(top) if sequence_in_log <= top.sequence_in_log => top.sequence_in_log + 1,
            _ => sequence_in_log,
        };
        let marker = SavepointMarker { sequence_in_log };
        self.markers.push(marker);
        marker
    }

    /// Removes and returns the most recent marker.
    pub fn pop(&mut self) -> Option<SavepointMarker> {
        self.markers.pop()
    }

    /// Returns the most recent marker.
    #[must_use]
    pub fn top(&self) -> Option<SavepointMarker> {
        self.markers.last().copied()
    }

    /// Number of markers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Returns true if no savepoint is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Removes every marker.
    pub fn clear(&mut self) {
        self.markers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_is_lifo() {
        let mut stack = SavepointStack::new();
        stack.push(1);
        stack.push(5);

        assert_eq!(stack.pop().map(SavepointMarker::sequence_in_log), Some(5));
        assert_eq!(stack.pop().map(SavepointMarker::sequence_in_log), Some(1));
        assert!(stack.pop().is_none());
    }

    #[test]
    fn markers_strictly_increase() {
        let mut stack = SavepointStack::new();
        let a = stack.push(3);
        let b = stack.push(3);
        let c = stack.push(2);

        assert!(a < b && b < c);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.top(), Some(c));
    }

    #[test]
    fn clear_empties() {
        let mut stack = SavepointStack::new();
        stack.push(0);
        stack.clear();
        assert!(stack.is_empty());
    }
}
