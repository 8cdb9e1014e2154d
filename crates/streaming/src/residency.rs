/// What a session knows about one address.
///
/// `Empty` is final for the whole subtree: the server answered with zero
/// points, so no descendant can hold data either.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CellState {
    /// Never asked, or asked and since evicted.
    #[default]
    Unknown,
    Empty,
    /// Decoded and handed to the renderer.
    Populated,
}

impl CellState {
    pub fn is_resolved(self) -> bool {
        self != CellState::Unknown
    }
}
