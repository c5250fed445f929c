//! Port allocation across an installation directory.
//!
//! Allocation is a pure function of the hint, the reserved set and the search
//! window, so a given sequence of installs always yields the same port map.

use std::collections::BTreeSet;

use crate::error::{PluginError, Result};

/// Prometheus, Grafana, Pushgateway, API.
pub const DEFAULT_BASE_PORTS: [u16; 4] = [9090, 3000, 9091, 8080];

pub const DEFAULT_SEARCH_WINDOW: u16 = 1000;

/// Union of the base stack's fixed ports and every assigned plugin port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservedPorts {
    base: BTreeSet<u16>,
    assigned: BTreeSet<u16>,
}

impl ReservedPorts {
    pub fn new(base: impl IntoIterator<Item = u16>) -> Self {
        Self {
            base: base.into_iter().collect(),
            assigned: BTreeSet::new(),
        }
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.base.contains(&port) || self.assigned.contains(&port)
    }

    /// Mark a port as assigned. Returns false if it was already reserved.
    pub fn reserve(&mut self, port: u16) -> bool {
        if self.is_reserved(port) {
            return false;
        }
        self.assigned.insert(port)
    }

    /// Release an assigned port. Base ports are never released.
    pub fn release(&mut self, port: u16) -> bool {
        self.assigned.remove(&port)
    }

    pub fn base(&self) -> &BTreeSet<u16> {
        &self.base
    }

    /// Every reserved port, ascending.
    pub fn all(&self) -> BTreeSet<u16> {
        self.base.union(&self.assigned).copied().collect()
    }
}

/// Smallest port in `[hint, hint + window - 1]` (capped at 65535) that is
/// not reserved.
pub fn allocate(hint: u16, reserved: &ReservedPorts, window: u16) -> Result<u16> {
    if window == 0 {
        return Err(PluginError::PortExhausted { hint, window });
    }
    let last = (u32::from(hint) + u32::from(window) - 1).min(u32::from(u16::MAX)) as u16;
    (hint..=last)
        .find(|port| !reserved.is_reserved(*port))
        .ok_or(PluginError::PortExhausted { hint, window })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ReservedPorts {
        ReservedPorts::new(DEFAULT_BASE_PORTS)
    }

    #[test]
    fn test_allocate_returns_hint_when_free() {
        assert_eq!(allocate(9106, &base(), 1000).unwrap(), 9106);
    }

    #[test]
    fn test_allocate_skips_reserved() {
        let mut reserved = base();
        reserved.reserve(9127);
        reserved.reserve(9128);
        assert_eq!(allocate(9127, &reserved, 1000).unwrap(), 9129);
    }

    #[test]
    fn test_allocate_skips_base_ports() {
        assert_eq!(allocate(9090, &base(), 1000).unwrap(), 9092);
    }

    #[test]
    fn test_allocate_is_deterministic() {
        let mut reserved = base();
        reserved.reserve(9200);
        let first = allocate(9200, &reserved, 10).unwrap();
        let second = allocate(9200, &reserved, 10).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_window_exhausted() {
        let mut reserved = base();
        reserved.reserve(9300);
        reserved.reserve(9301);
        let err = allocate(9300, &reserved, 2).unwrap_err();
        assert!(matches!(err, PluginError::PortExhausted { hint: 9300, window: 2 }));
        assert_eq!(allocate(9300, &reserved, 3).unwrap(), 9302);
    }

    #[test]
    fn test_window_capped_at_max_port() {
        let mut reserved = ReservedPorts::default();
        assert_eq!(allocate(65535, &reserved, 1000).unwrap(), 65535);
        reserved.reserve(65535);
        assert!(allocate(65535, &reserved, 1000).is_err());
    }

    #[test]
    fn test_zero_window() {
        assert!(allocate(9100, &base(), 0).is_err());
    }

    #[test]
    fn test_release_never_frees_base_ports() {
        let mut reserved = base();
        assert!(!reserved.release(9090));
        assert!(reserved.is_reserved(9090));

        assert!(reserved.reserve(9500));
        assert!(!reserved.reserve(9500));
        assert!(!reserved.reserve(3000));
        assert!(reserved.release(9500));
        assert!(!reserved.is_reserved(9500));
    }

    #[test]
    fn test_all_is_union() {
        let mut reserved = base();
        reserved.reserve(9106);
        let all: Vec<u16> = reserved.all().into_iter().collect();
        assert_eq!(all, vec![3000, 8080, 9090, 9091, 9106]);
        assert!(reserved.base().contains(&3000));
        assert!(!reserved.base().contains(&9106));
    }
}
