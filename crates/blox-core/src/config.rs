//! Tunable constants for dragging, bumping and grid snapping.

use serde::{Deserialize, Serialize};

/// Distances (in workspace units) that govern connection search and bumps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DragConfig {
    /// Search radius while no candidate is held; also the bump distance.
    pub snap_radius: f64,
    /// Search radius while a candidate is already held.
    pub connecting_snap_radius: f64,
    /// How much closer a new candidate must be to replace the held one.
    pub current_connection_preference: f64,
    /// Pointer travel (screen pixels) before a press becomes a drag.
    pub drag_radius: f64,
    /// Debounce for warning-text updates while dragging.
    pub bump_delay_ms: u64,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            snap_radius: 28.0,
            connecting_snap_radius: 28.0,
            current_connection_preference: 8.0,
            drag_radius: 5.0,
            bump_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridOptions {
    /// Grid pitch; zero disables the grid.
    pub spacing: f64,
    /// Snap dropped roots to grid points.
    pub snap: bool,
}

impl GridOptions {
    /// Spacing to snap to, when snapping is on.
    pub fn snap_spacing(&self) -> Option<f64> {
        (self.snap && self.spacing > 0.0).then_some(self.spacing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DragConfig = serde_json::from_str(r#"{"snapRadius": 48}"#).unwrap();
        assert_eq!(config.snap_radius, 48.0);
        assert_eq!(config.connecting_snap_radius, 28.0);
        assert_eq!(config.current_connection_preference, 8.0);
    }

    #[test]
    fn grid_snaps_only_when_enabled() {
        assert_eq!(GridOptions::default().snap_spacing(), None);
        let grid = GridOptions {
            spacing: 20.0,
            snap: true,
        };
        assert_eq!(grid.snap_spacing(), Some(20.0));
    }
}
