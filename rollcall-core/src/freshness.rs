//! Freshness merge policy.
//!
//! Applied at every point where new protocol information is obtained:
//! live information always wins (including a live refresh over live data),
//! cached file information only fills a gap, and nothing ever lowers the
//! current source.

use crate::types::InfoSource;

impl InfoSource {
    /// Whether information from `self` may replace information currently
    /// held from `current`.
    pub fn supersedes(self, current: InfoSource) -> bool {
        match self {
            InfoSource::Live => true,
            InfoSource::File => current == InfoSource::None,
            InfoSource::None => false,
        }
    }
}

/// The source after attempting to install information from `incoming`.
pub fn merge(current: InfoSource, incoming: InfoSource) -> InfoSource {
    if incoming.supersedes(current) {
        incoming
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [InfoSource; 3] = [InfoSource::None, InfoSource::File, InfoSource::Live];

    #[test]
    fn live_always_supersedes() {
        for current in ALL {
            assert!(InfoSource::Live.supersedes(current));
        }
    }

    #[test]
    fn file_only_fills_a_gap() {
        assert!(InfoSource::File.supersedes(InfoSource::None));
        assert!(!InfoSource::File.supersedes(InfoSource::File));
        assert!(!InfoSource::File.supersedes(InfoSource::Live));
    }

    #[test]
    fn merge_never_decreases() {
        for current in ALL {
            for incoming in ALL {
                assert!(merge(current, incoming) >= current);
            }
        }
    }

    #[test]
    fn slow_file_read_after_live_keeps_live() {
        let after_rpc = merge(InfoSource::None, InfoSource::Live);
        assert_eq!(merge(after_rpc, InfoSource::File), InfoSource::Live);
    }
}
