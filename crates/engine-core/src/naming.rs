//! Hierarchical node naming: dot-separated path components, root is `n0`.
//! Grounded on `skelet0wn/utilities.py::get_previous_name`.

/// Depth of a node name: the count of dots. `n0` has depth 0, `n0.2.1` has depth 2.
pub fn depth(name: &str) -> usize {
    name.matches('.').count()
}

/// Derived child name for a Sequence slot: `<parent>.<index>`.
pub fn sequence_child_name(parent: &str, index: usize) -> String {
    format!("{parent}.{index}")
}

/// Derived child name for a Parallel slot: `<parent>.f` or `<parent>.b`.
pub fn parallel_child_name(parent: &str, slot: ParallelSlot) -> String {
    format!("{parent}.{}", slot.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelSlot {
    Front,
    Back,
}

impl ParallelSlot {
    fn as_str(self) -> &'static str {
        match self {
            ParallelSlot::Front => "f",
            ParallelSlot::Back => "b",
        }
    }
}

/// The "previous sibling" of a node name: same path with its last component
/// decremented by one, provided that component is a non-negative integer
/// strictly greater than zero. Non-numeric slots (Parallel's `f`/`b`)
/// intentionally have no previous.
pub fn previous(name: &str) -> Option<String> {
    let (prefix, last) = name.rsplit_once('.')?;
    let slot: i64 = last.parse().ok()?;
    if slot <= 0 {
        return None;
    }
    Some(format!("{prefix}.{}", slot - 1))
}
