//! Window drag initiation from marked regions of the frame

use egui::{Pos2, Rect};

use crate::platform::HostWindow;

/// One element on the path from a pointer-down target up to the root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameNode {
    /// Element is part of a draggable region
    pub windrag: bool,
    /// Element handles the click itself (buttons, menu items)
    pub interactive: bool,
}

impl FrameNode {
    pub const fn drag_region() -> Self {
        Self {
            windrag: true,
            interactive: false,
        }
    }

    pub const fn plain() -> Self {
        Self {
            windrag: false,
            interactive: false,
        }
    }

    pub const fn control() -> Self {
        Self {
            windrag: false,
            interactive: true,
        }
    }
}

/// Whether a pointer-down on `path[0]` should move the window.
///
/// Walks from the target towards the root: the nearest drag marker wins,
/// but an interactive element on the way keeps the click for itself.
pub fn should_start_drag(path: &[FrameNode]) -> bool {
    for node in path {
        if node.interactive {
            return false;
        }
        if node.windrag {
            return true;
        }
    }
    false
}

/// Path from a press at `pos` inside a drag region up to the region.
///
/// `controls` are the rects of the interactive widgets laid out in the
/// region; a press on one of them gets the control as its target.
pub fn path_at(pos: Pos2, controls: &[Rect]) -> Vec<FrameNode> {
    let target = if controls.iter().any(|rect| rect.contains(pos)) {
        FrameNode::control()
    } else {
        FrameNode::plain()
    };
    vec![target, FrameNode::drag_region()]
}

/// Requests a host window move when the pointer lands on a drag region
pub fn on_pointer_down(path: &[FrameNode], window: &dyn HostWindow) -> bool {
    if should_start_drag(path) {
        window.start_drag();
        true
    } else {
        false
    }
}
