//! Follow-the-bottom behaviour for the message view
//!
//! Two states: `Following`, where new content scrolls the view to the
//! bottom, and `UserOverridden`, entered when the user scrolls up. The view
//! goes back to following when the user scrolls down to within the threshold
//! of the bottom, or after the idle delay if the view was left near the bottom.

use crate::config::ScrollConfig;
use std::time::{Duration, Instant};
use tracing::trace;

/// Offsets closer than this are treated as unchanged
const OFFSET_EPSILON: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollMode {
    Following,
    UserOverridden,
}

#[derive(Debug, Clone)]
pub struct AutoScroll {
    mode: ScrollMode,
    threshold: f32,
    idle_delay: Duration,
    last_offset: Option<f32>,
    last_scroll_at: Option<Instant>,
    near_bottom: bool,
}

impl Default for AutoScroll {
    fn default() -> Self {
        Self::new(&ScrollConfig::default())
    }
}

impl AutoScroll {
    pub fn new(config: &ScrollConfig) -> Self {
        Self {
            mode: ScrollMode::Following,
            threshold: config.threshold_px,
            idle_delay: Duration::from_millis(config.idle_delay_ms),
            last_offset: None,
            last_scroll_at: None,
            near_bottom: true,
        }
    }

    pub fn mode(&self) -> ScrollMode {
        self.mode
    }

    pub fn is_following(&self) -> bool {
        self.mode == ScrollMode::Following
    }

    /// Report the scroll position. `max_offset` is the offset of the very bottom.
    pub fn on_scroll(&mut self, offset: f32, max_offset: f32, now: Instant) {
        let distance = (max_offset - offset).max(0.0);
        self.near_bottom = distance <= self.threshold;

        let Some(previous) = self.last_offset.replace(offset) else {
            return;
        };
        let delta = offset - previous;
        if delta.abs() < OFFSET_EPSILON {
            return;
        }
        self.last_scroll_at = Some(now);

        if delta < 0.0 {
            if self.mode == ScrollMode::Following {
                trace!("User scrolled up, {:.0}px from bottom", distance);
            }
            self.mode = ScrollMode::UserOverridden;
        } else if self.near_bottom {
            self.mode = ScrollMode::Following;
        }
    }

    /// Resume following once scrolling has been idle near the bottom
    pub fn tick(&mut self, now: Instant) {
        if self.mode != ScrollMode::UserOverridden || !self.near_bottom {
            return;
        }
        let idle = self
            .last_scroll_at
            .map(|at| now.duration_since(at) >= self.idle_delay)
            .unwrap_or(true);
        if idle {
            self.mode = ScrollMode::Following;
        }
    }

    /// The content grew or changed; answers whether to jump to the bottom
    pub fn on_content_changed(&mut self) -> bool {
        if self.near_bottom {
            self.mode = ScrollMode::Following;
        }
        self.mode == ScrollMode::Following
    }

    /// Force following, e.g. after the user sends a message
    pub fn scroll_to_bottom(&mut self) {
        self.mode = ScrollMode::Following;
        self.near_bottom = true;
    }
}
