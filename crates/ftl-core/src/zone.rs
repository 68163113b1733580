//! Zone state machine for the `conzone_zoned` namespace (spec.md §4.12,
//! §4.13). A zone's data lives on exactly one dedicated line per tier —
//! `dies_per_zone` equals `blks_per_line` for every geometry this workspace
//! targets, so a zone never competes with another zone for a line the way
//! block-namespace writes compete for the free list; `ZoneManager` binds each
//! zone's write pointer straight to its own line id instead of drawing from
//! [`ftl_lines::LineManager`]'s free list.

use ftl_types::Lpn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneState {
    Empty,
    ImplicitOpen,
    ExplicitOpen,
    Closed,
    Full,
    ReadOnly,
    Offline,
}

impl ZoneState {
    fn is_open(self) -> bool {
        matches!(self, ZoneState::ImplicitOpen | ZoneState::ExplicitOpen)
    }
}

/// One zone's write cursor and accounting. `wp` is the next writable LPN,
/// always `slba + (pages written so far)` — sequential-write-only, per ZNS.
#[derive(Debug, Clone, Copy)]
pub struct Zone {
    pub id: u32,
    pub slba: Lpn,
    pub wp: Lpn,
    pub capacity_pgs: u64,
    pub state: ZoneState,
    /// Bumped on every full transition (spec.md §8 S1: "`zone_write_cnt=1`").
    pub write_cnt: u64,
}

impl Zone {
    fn new(id: u32, slba: Lpn, capacity_pgs: u64) -> Self {
        Zone {
            id,
            slba,
            wp: slba,
            capacity_pgs,
            state: ZoneState::Empty,
            write_cnt: 0,
        }
    }

    pub fn zslba(&self) -> Lpn {
        self.slba
    }

    fn is_full(&self) -> bool {
        self.wp.0 == self.slba.0 + self.capacity_pgs
    }
}

/// Owns every zone in the namespace plus the open/active resource counters
/// ZNS bounds (spec.md §4.13 "resources (open/active) available"). Sized by
/// the caller from geometry; this workspace has no dedicated
/// `max_open_zones`/`max_active_zones` geometry field, so `ZoneManager::new`
/// takes them directly (see DESIGN.md).
pub struct ZoneManager {
    zones: Vec<Zone>,
    zone_size_pgs: u64,
    max_open: u32,
    max_active: u32,
    open_cnt: u32,
    active_cnt: u32,
}

impl ZoneManager {
    pub fn new(num_zones: u32, zone_size_pgs: u64, zone_capacity_pgs: u64, max_open: u32, max_active: u32) -> Self {
        let zones = (0..num_zones)
            .map(|id| Zone::new(id, Lpn(id as u64 * zone_size_pgs), zone_capacity_pgs))
            .collect();
        ZoneManager {
            zones,
            zone_size_pgs,
            max_open,
            max_active,
            open_cnt: 0,
            active_cnt: 0,
        }
    }

    pub fn zone(&self, id: u32) -> &Zone {
        &self.zones[id as usize]
    }

    pub fn zone_mut(&mut self, id: u32) -> &mut Zone {
        &mut self.zones[id as usize]
    }

    pub fn num_zones(&self) -> u32 {
        self.zones.len() as u32
    }

    /// Whether an additional zone could be opened right now without
    /// exceeding `max_open` (spec.md §4.13 "resources (open/active)
    /// available").
    pub fn open_resources_available(&self) -> bool {
        self.open_cnt < self.max_open
    }

    /// Whether an additional zone could transition out of `Empty` right now
    /// without exceeding `max_active`.
    pub fn active_resources_available(&self) -> bool {
        self.active_cnt < self.max_active
    }

    /// Forces `zid` offline, releasing whatever resource slot it held.
    /// Offline zones never transition back (spec.md §2: zone state machine
    /// is referenced, not redesigned, but `Offline` is a terminal sink any
    /// implementation must still model for `zns_err_offline`).
    pub fn set_offline(&mut self, zid: u32) {
        let zone = &mut self.zones[zid as usize];
        let was_open = zone.state.is_open();
        let was_active = !matches!(zone.state, ZoneState::Empty | ZoneState::Full | ZoneState::Offline);
        zone.state = ZoneState::Offline;
        if was_open {
            self.open_cnt -= 1;
        }
        if was_active {
            self.active_cnt -= 1;
        }
    }

    /// Which zone an LPN falls in, or `None` if `lpn` is past the last zone.
    pub fn zone_of(&self, lpn: Lpn) -> Option<u32> {
        let id = lpn.0 / self.zone_size_pgs;
        if id < self.zones.len() as u64 {
            Some(id as u32)
        } else {
            None
        }
    }

    /// True if `[lpn, lpn+nlb)` stays within one zone.
    pub fn within_zone_boundary(&self, zid: u32, lpn: Lpn, nlb: u32) -> bool {
        let zone = self.zone(zid);
        let end = lpn.0 + nlb as u64;
        end <= zone.slba.0 + self.zone_size_pgs
    }

    /// Transitions `zid` into an open state, consuming an open-resource slot
    /// if it wasn't already open. Returns `false` (no state change) if the
    /// open-resource limit is exhausted.
    pub fn open(&mut self, zid: u32, explicit: bool) -> bool {
        let zone = &self.zones[zid as usize];
        if zone.state.is_open() {
            return true;
        }
        if !matches!(zone.state, ZoneState::Empty | ZoneState::Closed) {
            return false;
        }
        if self.open_cnt >= self.max_open {
            return false;
        }
        if zone.state == ZoneState::Empty && self.active_cnt >= self.max_active {
            return false;
        }
        if zone.state == ZoneState::Empty {
            self.active_cnt += 1;
        }
        self.open_cnt += 1;
        self.zones[zid as usize].state = if explicit {
            ZoneState::ExplicitOpen
        } else {
            ZoneState::ImplicitOpen
        };
        true
    }

    pub fn close(&mut self, zid: u32) {
        let zone = &mut self.zones[zid as usize];
        if zone.state.is_open() {
            zone.state = ZoneState::Closed;
            self.open_cnt -= 1;
        }
    }

    pub fn finish(&mut self, zid: u32) {
        let zone = &mut self.zones[zid as usize];
        let was_open = zone.state.is_open();
        let was_active = !matches!(zone.state, ZoneState::Empty | ZoneState::Full | ZoneState::Offline);
        zone.wp = Lpn(zone.slba.0 + zone.capacity_pgs);
        zone.state = ZoneState::Full;
        if was_open {
            self.open_cnt -= 1;
        }
        if was_active {
            self.active_cnt -= 1;
        }
    }

    /// Advances `zid`'s write pointer by `nlb` pages, transitioning to
    /// `Full` and releasing its open/active resource slots once it reaches
    /// `zslba + capacity` (spec.md §4.13 "full transition").
    pub fn advance_wp(&mut self, zid: u32, nlb: u32) {
        let zone = &mut self.zones[zid as usize];
        zone.wp = Lpn(zone.wp.0 + nlb as u64);
        if zone.is_full() {
            let was_open = zone.state.is_open();
            zone.state = ZoneState::Full;
            zone.write_cnt += 1;
            if was_open {
                self.open_cnt -= 1;
            }
            self.active_cnt -= 1;
        }
    }

    /// Resets `zid` back to `Empty`, releasing whatever resource slot it
    /// held (spec.md §4.12).
    pub fn reset(&mut self, zid: u32) {
        let zone = &mut self.zones[zid as usize];
        let was_open = zone.state.is_open();
        let was_active = !matches!(zone.state, ZoneState::Empty | ZoneState::Offline);
        zone.wp = zone.slba;
        zone.state = ZoneState::Empty;
        if was_open {
            self.open_cnt -= 1;
        }
        if was_active {
            self.active_cnt -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_open_on_first_write_then_full_releases_resources() {
        let mut zm = ZoneManager::new(2, 16, 12, 1, 1);
        assert!(zm.open(0, false));
        assert_eq!(zm.zone(0).state, ZoneState::ImplicitOpen);
        zm.advance_wp(0, 12);
        assert_eq!(zm.zone(0).state, ZoneState::Full);
        assert_eq!(zm.zone(0).write_cnt, 1);
        // resources released: zone 1 can now open even with max_open=1.
        assert!(zm.open(1, false));
    }

    #[test]
    fn open_resource_limit_is_enforced() {
        let mut zm = ZoneManager::new(2, 16, 12, 1, 2);
        assert!(zm.open(0, true));
        assert!(!zm.open(1, true), "max_open=1 should reject a second concurrent open zone");
    }

    #[test]
    fn reset_returns_to_empty_and_releases_active_slot() {
        let mut zm = ZoneManager::new(1, 16, 12, 1, 1);
        zm.open(0, false);
        zm.advance_wp(0, 4);
        zm.reset(0);
        assert_eq!(zm.zone(0).state, ZoneState::Empty);
        assert_eq!(zm.zone(0).wp, zm.zone(0).slba);
    }
}
