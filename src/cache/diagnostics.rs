//! Tile action diagnostics

/// What happened to a tile, reported when diagnostics are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Tile became resident through `add`
    Add,
    /// Tile removed by `remove`
    Remove,
    /// Tile removed by `flush`
    RemoveFromFlush,
    /// Tile evicted from memory by the eviction pass
    RemoveFromMemoryControl,
    /// Resident tile refreshed by `add`
    UpdateFromAdd,
    /// Resident tile refreshed by `get`
    UpdateFromGetTile,
    /// Tile restored from the swap space
    SwapIn,
    /// Tile written to the swap space
    SwapOut,
    /// Swap space refused to store the tile
    SwapOutFailed,
}

impl CacheAction {
    /// Returns every action, in declaration order
    pub fn all() -> &'static [CacheAction] {
        &[
            CacheAction::Add,
            CacheAction::Remove,
            CacheAction::RemoveFromFlush,
            CacheAction::RemoveFromMemoryControl,
            CacheAction::UpdateFromAdd,
            CacheAction::UpdateFromGetTile,
            CacheAction::SwapIn,
            CacheAction::SwapOut,
            CacheAction::SwapOutFailed,
        ]
    }

    /// Returns the name of this action
    pub fn name(&self) -> &'static str {
        match self {
            CacheAction::Add => "add",
            CacheAction::Remove => "remove",
            CacheAction::RemoveFromFlush => "remove_by_flush",
            CacheAction::RemoveFromMemoryControl => "remove_by_memory_control",
            CacheAction::UpdateFromAdd => "timestamp_update_by_add",
            CacheAction::UpdateFromGetTile => "timestamp_update_by_get_tile",
            CacheAction::SwapIn => "swap_in",
            CacheAction::SwapOut => "swap_out",
            CacheAction::SwapOutFailed => "swap_out_failed",
        }
    }
}
