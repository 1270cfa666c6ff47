//! Event masks and notification filters.

use std::ops::BitOr;

/// Set of roster events a watcher subscribed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EventMask(u32);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const LAUNCHED: EventMask = EventMask(0x01);
    pub const QUIT: EventMask = EventMask(0x02);
    pub const ACTIVATED: EventMask = EventMask(0x04);
    pub const ALL: EventMask = EventMask(0x07);

    pub fn from_bits(bits: u32) -> Self {
        EventMask(bits & Self::ALL.0)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether any event is in both masks.
    pub fn intersects(&self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

/// Selects the watchers a notification goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherFilter {
    /// Every watcher.
    All,
    /// Watchers subscribed to at least one of these events.
    Events(EventMask),
}

impl WatcherFilter {
    pub fn accepts(&self, subscribed: EventMask) -> bool {
        match self {
            WatcherFilter::All => true,
            WatcherFilter::Events(mask) => subscribed.intersects(*mask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_filter_matches_overlapping_masks() {
        let quit = WatcherFilter::Events(EventMask::QUIT);
        assert!(quit.accepts(EventMask::LAUNCHED | EventMask::QUIT));
        assert!(!quit.accepts(EventMask::ACTIVATED));
        assert!(!quit.accepts(EventMask::NONE));
        assert!(WatcherFilter::All.accepts(EventMask::NONE));
    }

    #[test]
    fn unknown_bits_are_ignored() {
        assert_eq!(EventMask::from_bits(0xff), EventMask::ALL);
    }
}
