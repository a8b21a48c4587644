//! Navigation state: current page, rotation and zoom
//!
//! All mutations go through [`NavigationState::apply`], which validates
//! a [`Command`] against the loaded document and returns the
//! [`Effect`]s the viewer must carry out. Page and rotation changes feed
//! the render pipeline; scale changes only resize the attached surface.

use crate::viewport::Rotation;

/// Degrees added or removed by one rotate step
pub const ROTATION_STEP: i32 = 90;

/// Scales are rounded to this many steps per unit so repeated zoom
/// steps land back on the value they started from.
const SCALE_RESOLUTION: f64 = 1_000_000.0;

/// Zoom step size and lower bound
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomLimits {
    pub step: f64,
    pub min_scale: f64,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            step: 0.15,
            min_scale: 0.1,
        }
    }
}

impl ZoomLimits {
    /// Normalize a requested scale, returning `None` for NaN or infinity.
    #[must_use]
    pub fn clamp(&self, scale: f64) -> Option<f64> {
        if !scale.is_finite() {
            return None;
        }
        let snapped = (scale * SCALE_RESOLUTION).round() / SCALE_RESOLUTION;
        Some(snapped.max(self.min_scale))
    }
}

/// Caller-visible navigation inputs
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavigationState {
    /// 1-based page number; 0 means nothing is displayed
    pub page: u32,
    pub rotation: Rotation,
    pub scale: f64,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            page: 0,
            rotation: Rotation::ZERO,
            scale: 1.0,
        }
    }
}

/// Commands that modify navigation state
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Go to a 1-based page number
    GoToPage(u32),
    NextPage,
    PreviousPage,
    /// Show nothing (page 0)
    ClearPage,
    /// A new document finished loading; jump to its first page
    ResetForDocument { initial_page: u32 },
    RotateClockwise,
    RotateCounterclockwise,
    SetRotation(i32),
    ZoomIn,
    ZoomOut,
    SetScale(f64),
}

/// Effects produced by state changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Page or rotation changed
    RunPipeline,
    /// Re-run the pipeline even if page and rotation look unchanged
    ForcePipeline,
    /// Only the scale changed
    Resize,
}

impl NavigationState {
    /// Apply a command and return resulting effects.
    ///
    /// `page_count` is `None` while no document is loaded.
    #[must_use]
    pub fn apply(
        &mut self,
        cmd: Command,
        page_count: Option<u32>,
        zoom: &ZoomLimits,
    ) -> Vec<Effect> {
        match cmd {
            Command::GoToPage(page) => self.go_to_page(page, page_count),

            Command::NextPage => match page_count {
                Some(count) if self.page < count => self.go_to_page(self.page + 1, page_count),
                _ => vec![],
            },

            Command::PreviousPage => {
                if self.page <= 1 {
                    vec![]
                } else {
                    self.go_to_page(self.page - 1, page_count)
                }
            }

            Command::ClearPage => {
                if self.page == 0 {
                    vec![]
                } else {
                    self.page = 0;
                    vec![Effect::RunPipeline]
                }
            }

            Command::ResetForDocument { initial_page } => {
                self.page = initial_page.min(page_count.unwrap_or(0));
                vec![Effect::ForcePipeline]
            }

            Command::RotateClockwise => self.set_rotation(self.rotation.rotated_by(ROTATION_STEP)),

            Command::RotateCounterclockwise => {
                self.set_rotation(self.rotation.rotated_by(-ROTATION_STEP))
            }

            Command::SetRotation(degrees) => self.set_rotation(Rotation::new(degrees)),

            Command::ZoomIn => self.set_scale(self.scale + zoom.step, zoom),

            Command::ZoomOut => self.set_scale(self.scale - zoom.step, zoom),

            Command::SetScale(scale) => self.set_scale(scale, zoom),
        }
    }

    fn go_to_page(&mut self, page: u32, page_count: Option<u32>) -> Vec<Effect> {
        let Some(count) = page_count else {
            return vec![];
        };

        if page == 0 || page > count || page == self.page {
            return vec![];
        }

        self.page = page;
        vec![Effect::RunPipeline]
    }

    fn set_rotation(&mut self, rotation: Rotation) -> Vec<Effect> {
        if self.rotation == rotation {
            return vec![];
        }
        self.rotation = rotation;
        vec![Effect::RunPipeline]
    }

    fn set_scale(&mut self, scale: f64, zoom: &ZoomLimits) -> Vec<Effect> {
        let Some(scale) = zoom.clamp(scale) else {
            return vec![];
        };

        if (self.scale - scale).abs() <= f64::EPSILON {
            return vec![];
        }
        self.scale = scale;
        vec![Effect::Resize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(state: &mut NavigationState, cmd: Command, page_count: Option<u32>) -> Vec<Effect> {
        state.apply(cmd, page_count, &ZoomLimits::default())
    }

    #[test]
    fn go_to_page_updates_and_runs_pipeline() {
        let mut state = NavigationState::default();

        let effects = apply(&mut state, Command::GoToPage(3), Some(10));
        assert_eq!(state.page, 3);
        assert_eq!(effects, vec![Effect::RunPipeline]);
    }

    #[test]
    fn go_to_page_rejects_out_of_range_and_unloaded() {
        let mut state = NavigationState {
            page: 2,
            ..NavigationState::default()
        };

        assert!(apply(&mut state, Command::GoToPage(11), Some(10)).is_empty());
        assert!(apply(&mut state, Command::GoToPage(0), Some(10)).is_empty());
        assert!(apply(&mut state, Command::GoToPage(5), None).is_empty());
        assert_eq!(state.page, 2);
    }

    #[test]
    fn go_to_same_page_is_not_a_change() {
        let mut state = NavigationState {
            page: 4,
            ..NavigationState::default()
        };
        assert!(apply(&mut state, Command::GoToPage(4), Some(10)).is_empty());
    }

    #[test]
    fn next_and_previous_stop_at_bounds() {
        let mut state = NavigationState {
            page: 3,
            ..NavigationState::default()
        };

        assert!(apply(&mut state, Command::NextPage, Some(3)).is_empty());
        assert_eq!(state.page, 3);

        state.page = 1;
        assert!(apply(&mut state, Command::PreviousPage, Some(3)).is_empty());
        assert_eq!(state.page, 1);

        assert_eq!(apply(&mut state, Command::NextPage, Some(3)), vec![Effect::RunPipeline]);
        assert_eq!(state.page, 2);
    }

    #[test]
    fn previous_from_cleared_view_is_ignored() {
        let mut state = NavigationState::default();
        assert!(apply(&mut state, Command::PreviousPage, Some(3)).is_empty());
        assert_eq!(state.page, 0);
    }

    #[test]
    fn next_from_cleared_view_selects_first_page() {
        let mut state = NavigationState::default();
        assert_eq!(apply(&mut state, Command::NextPage, Some(3)), vec![Effect::RunPipeline]);
        assert_eq!(state.page, 1);
    }

    #[test]
    fn reset_forces_pipeline_even_without_change() {
        let mut state = NavigationState {
            page: 1,
            ..NavigationState::default()
        };

        let effects = apply(
            &mut state,
            Command::ResetForDocument { initial_page: 1 },
            Some(5),
        );
        assert_eq!(state.page, 1);
        assert_eq!(effects, vec![Effect::ForcePipeline]);
    }

    #[test]
    fn reset_clamps_to_page_count() {
        let mut state = NavigationState::default();
        let _ = apply(&mut state, Command::ResetForDocument { initial_page: 7 }, Some(2));
        assert_eq!(state.page, 2);

        let _ = apply(&mut state, Command::ResetForDocument { initial_page: 1 }, Some(0));
        assert_eq!(state.page, 0);
    }

    #[test]
    fn rotation_wraps_in_both_directions() {
        let mut state = NavigationState::default();

        let _ = apply(&mut state, Command::RotateCounterclockwise, None);
        assert_eq!(state.rotation.degrees(), 270);

        for _ in 0..3 {
            let _ = apply(&mut state, Command::RotateClockwise, None);
        }
        assert_eq!(state.rotation.degrees(), 180);

        let effects = apply(&mut state, Command::SetRotation(540), None);
        assert!(effects.is_empty());
        assert_eq!(state.rotation.degrees(), 180);
    }

    #[test]
    fn zoom_steps_are_symmetric() {
        let mut state = NavigationState::default();

        assert_eq!(apply(&mut state, Command::ZoomIn, None), vec![Effect::Resize]);
        assert_eq!(state.scale, 1.15);
        assert_eq!(apply(&mut state, Command::ZoomOut, None), vec![Effect::Resize]);
        assert_eq!(state.scale, 1.0);
    }

    #[test]
    fn scale_never_drops_below_minimum() {
        let mut state = NavigationState::default();
        for _ in 0..20 {
            let _ = apply(&mut state, Command::ZoomOut, None);
        }
        assert_eq!(state.scale, 0.1);
        assert!(apply(&mut state, Command::ZoomOut, None).is_empty());
    }

    #[test]
    fn non_finite_scale_is_ignored() {
        let mut state = NavigationState::default();
        assert!(apply(&mut state, Command::SetScale(f64::NAN), None).is_empty());
        assert!(apply(&mut state, Command::SetScale(f64::INFINITY), None).is_empty());
        assert_eq!(state.scale, 1.0);
    }

    #[test]
    fn clear_page_only_fires_once() {
        let mut state = NavigationState {
            page: 2,
            ..NavigationState::default()
        };
        assert_eq!(apply(&mut state, Command::ClearPage, Some(3)), vec![Effect::RunPipeline]);
        assert!(apply(&mut state, Command::ClearPage, Some(3)).is_empty());
    }
}
