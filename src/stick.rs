//! Thumbstick calibration and zones
//!
//! The stick runs in one of five modes. `ABSOLUTE` forwards raw samples as
//! absolute axis events, `KEYS` normalizes every sample into the unit square
//! and tests it against the named [`Zone`]s, and the three `CAL*` modes
//! record calibration reference points instead of producing output.
//!
//! Normalization is piecewise linear around the calibrated center, so the
//! center maps to 0.5 on both axes even for an off-center stick:
//!
//! ```text
//! v <= c : (v - lo) / (2 * (c - lo))
//! v >  c : 1 - (hi - v) / (2 * (hi - c))
//! ```

use crate::action::Action;
use crate::frame::StickSample;
use crate::keys::KeyTables;
use regex::Regex;
use std::fmt::{self, Write};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Operating mode of the stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StickMode {
    Absolute,
    #[default]
    Keys,
    CalCenter,
    CalBounds,
    CalNorth,
}

impl StickMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StickMode::Absolute => "ABSOLUTE",
            StickMode::Keys => "KEYS",
            StickMode::CalCenter => "CALCENTER",
            StickMode::CalBounds => "CALBOUNDS",
            StickMode::CalNorth => "CALNORTH",
        }
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(
            self,
            StickMode::CalCenter | StickMode::CalBounds | StickMode::CalNorth
        )
    }
}

impl FromStr for StickMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABSOLUTE" => Ok(StickMode::Absolute),
            "KEYS" => Ok(StickMode::Keys),
            "CALCENTER" => Ok(StickMode::CalCenter),
            "CALBOUNDS" => Ok(StickMode::CalBounds),
            "CALNORTH" => Ok(StickMode::CalNorth),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StickMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coord<T> {
    pub x: T,
    pub y: T,
}

impl<T> Coord<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle, `tl` top-left and `br` bottom-right, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds<T> {
    pub tl: Coord<T>,
    pub br: Coord<T>,
}

impl<T: Copy + PartialOrd> Bounds<T> {
    pub const fn new(tl: Coord<T>, br: Coord<T>) -> Self {
        Self { tl, br }
    }

    pub fn contains(&self, pos: Coord<T>) -> bool {
        self.tl.x <= pos.x && self.tl.y <= pos.y && pos.x <= self.br.x && pos.y <= self.br.y
    }

    /// Grow the rectangle so it includes `pos`.
    pub fn expand(&mut self, pos: Coord<T>) {
        if pos.x < self.tl.x {
            self.tl.x = pos.x;
        }
        if pos.y < self.tl.y {
            self.tl.y = pos.y;
        }
        if pos.x > self.br.x {
            self.br.x = pos.x;
        }
        if pos.y > self.br.y {
            self.br.y = pos.y;
        }
    }
}

impl<T: fmt::Display> fmt::Display for Bounds<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ {} x {} / {} x {} }}",
            self.tl.x, self.tl.y, self.br.x, self.br.y
        )
    }
}

/// Raw calibration reference points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub bounds: Bounds<i32>,
    pub center: Coord<i32>,
    pub north: Coord<i32>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            bounds: Bounds::new(Coord::new(0, 0), Coord::new(255, 255)),
            center: Coord::new(127, 127),
            north: Coord::new(127, 0),
        }
    }
}

impl Calibration {
    /// Map a raw position into the unit square.
    pub fn normalize(&self, pos: Coord<i32>) -> Coord<f64> {
        Coord::new(
            scale(pos.x, self.bounds.tl.x, self.bounds.br.x, self.center.x),
            scale(pos.y, self.bounds.tl.y, self.bounds.br.y, self.center.y),
        )
    }
}

fn scale(v: i32, lo: i32, hi: i32, c: i32) -> f64 {
    let (v, lo, hi, c) = (v as f64, lo as f64, hi as f64, c as f64);
    if v <= c {
        (v - lo) / (2.0 * (c - lo))
    } else {
        1.0 - (hi - v) / (2.0 * (hi - c))
    }
}

/// Called when the stick leaves a calibration mode.
pub trait Recalibrate {
    fn recalibrate(&mut self, _calibration: &Calibration) {}
}

/// Keeps the calibration points as recorded.
#[derive(Debug, Default)]
pub struct KeepCalibration;

impl Recalibrate for KeepCalibration {}

/// Named rectangle of normalized stick space.
#[derive(Debug, Clone)]
pub struct Zone {
    name: String,
    bounds: Bounds<f64>,
    action: Option<Arc<Action>>,
    active: bool,
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Zone {
    pub fn new(name: impl Into<String>, bounds: Bounds<f64>, action: Option<Arc<Action>>) -> Self {
        Self {
            name: name.into(),
            bounds,
            action,
            active: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> Bounds<f64> {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Bounds<f64>) {
        self.bounds = bounds;
    }

    pub fn action(&self) -> Option<&Arc<Action>> {
        self.action.as_ref()
    }

    pub fn set_action(&mut self, action: Option<Arc<Action>>) {
        self.action = action;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Test `pos` against the zone.
    ///
    /// Returns the edge to fire: `Some(true)` on every test that lands
    /// inside, `Some(false)` once when the stick leaves, `None` otherwise.
    /// A zone without an action never fires and keeps no state.
    pub fn test(&mut self, pos: Coord<f64>) -> Option<(Arc<Action>, bool)> {
        let action = self.action.as_ref()?;
        let was_active = self.active;
        self.active = self.bounds.contains(pos);
        if self.active {
            Some((action.clone(), true))
        } else if was_active {
            Some((action.clone(), false))
        } else {
            None
        }
    }
}

/// Result of feeding one sample to the stick.
#[derive(Debug)]
pub enum StickOutput {
    /// Sample consumed by calibration.
    Calibrating,
    /// Raw position for the absolute axes.
    Absolute(Coord<i32>),
    /// Zone actions to trigger, in zone order.
    Zones(Vec<(Arc<Action>, bool)>),
}

const DEFAULT_ZONES: &[(&str, [f64; 4], &str)] = &[
    ("STICK_UP", [0.0, 0.0, 1.0, 0.3], "KEY_UP"),
    ("STICK_DOWN", [0.0, 0.7, 1.0, 1.0], "KEY_DOWN"),
    ("STICK_LEFT", [0.0, 0.0, 0.3, 1.0], "KEY_LEFT"),
    ("STICK_RIGHT", [0.7, 0.0, 1.0, 1.0], "KEY_RIGHT"),
];

pub struct Stick {
    mode: StickMode,
    calibration: Calibration,
    current: Coord<i32>,
    zones: Vec<Zone>,
    recalibrate: Box<dyn Recalibrate + Send>,
}

impl fmt::Debug for Stick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stick")
            .field("mode", &self.mode)
            .field("calibration", &self.calibration)
            .field("current", &self.current)
            .field("zones", &self.zones)
            .finish_non_exhaustive()
    }
}

impl Stick {
    /// Stick in `KEYS` mode with the four arrow-key zones.
    pub fn new(tables: &KeyTables) -> Self {
        let zones = DEFAULT_ZONES
            .iter()
            .map(|&(name, [x1, y1, x2, y2], keys)| {
                let action = match Action::parse(tables, keys) {
                    Ok(action) => Some(Arc::new(action)),
                    Err(e) => {
                        error!("default zone {} left unbound: {}", name, e);
                        None
                    }
                };
                Zone::new(
                    name,
                    Bounds::new(Coord::new(x1, y1), Coord::new(x2, y2)),
                    action,
                )
            })
            .collect();
        Self {
            mode: StickMode::Keys,
            calibration: Calibration::default(),
            current: Coord::new(0, 0),
            zones,
            recalibrate: Box::new(KeepCalibration),
        }
    }

    /// Replace the hook run when a calibration mode is left.
    pub fn set_recalibrate(&mut self, hook: Box<dyn Recalibrate + Send>) {
        self.recalibrate = hook;
    }

    pub fn mode(&self) -> StickMode {
        self.mode
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn set_mode(&mut self, mode: StickMode) {
        if mode == self.mode {
            return;
        }
        if self.mode.is_calibrating() {
            self.recalibrate.recalibrate(&self.calibration);
        }
        if mode == StickMode::CalBounds {
            self.calibration.bounds =
                Bounds::new(Coord::new(255, 255), Coord::new(0, 0));
        }
        info!("stick mode {} -> {}", self.mode, mode);
        self.mode = mode;
    }

    /// Look up a zone, creating an empty one when `create` is set.
    pub fn zone(&mut self, name: &str, create: bool) -> Option<&mut Zone> {
        match self.zones.iter().position(|z| z.name == name) {
            Some(i) => self.zones.get_mut(i),
            None if create => {
                self.zones.push(Zone::new(name, Bounds::default(), None));
                self.zones.last_mut()
            }
            None => None,
        }
    }

    /// Remove a zone by name. Returns whether it existed.
    pub fn remove_zone(&mut self, name: &str) -> bool {
        let before = self.zones.len();
        self.zones.retain(|z| z.name != name);
        self.zones.len() != before
    }

    pub fn filtered_zone_names(&self, pattern: &Regex) -> Vec<String> {
        self.zones
            .iter()
            .filter(|z| pattern.is_match(&z.name))
            .map(|z| z.name.clone())
            .collect()
    }

    /// Feed one raw sample.
    pub fn update(&mut self, sample: StickSample) -> StickOutput {
        let pos = Coord::new(sample.x, sample.y);
        self.current = pos;
        match self.mode {
            StickMode::CalCenter => {
                self.calibration.center = pos;
                StickOutput::Calibrating
            }
            StickMode::CalNorth => {
                self.calibration.north = pos;
                StickOutput::Calibrating
            }
            StickMode::CalBounds => {
                self.calibration.bounds.expand(pos);
                StickOutput::Calibrating
            }
            StickMode::Absolute => StickOutput::Absolute(pos),
            StickMode::Keys => {
                let norm = self.calibration.normalize(pos);
                debug!("stick {},{} -> {:.3},{:.3}", pos.x, pos.y, norm.x, norm.y);
                StickOutput::Zones(self.zones.iter_mut().filter_map(|z| z.test(norm)).collect())
            }
        }
    }

    pub fn dump(&self, tables: &KeyTables, out: &mut String) {
        let c = &self.calibration;
        let _ = writeln!(
            out,
            "STICK mode={} bounds={} center={},{} north={},{}",
            self.mode, c.bounds, c.center.x, c.center.y, c.north.x, c.north.y
        );
        for zone in &self.zones {
            let action = zone
                .action
                .as_ref()
                .map(|a| a.describe(tables))
                .unwrap_or_else(|| "(no action)".to_string());
            let _ = writeln!(out, "   {} {} {}", zone.name, zone.bounds, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fired(output: StickOutput) -> Vec<bool> {
        match output {
            StickOutput::Zones(hits) => hits.into_iter().map(|(_, pressed)| pressed).collect(),
            other => panic!("expected zone output, got {other:?}"),
        }
    }

    #[test]
    fn test_mode_names() {
        for name in ["ABSOLUTE", "KEYS", "CALCENTER", "CALBOUNDS", "CALNORTH"] {
            let mode: StickMode = name.parse().unwrap();
            assert_eq!(mode.as_str(), name);
        }
        assert!("keys".parse::<StickMode>().is_err());
    }

    #[test]
    fn test_default_zones() {
        let stick = Stick::new(&KeyTables::new());
        let names: Vec<&str> = stick.zones().iter().map(|z| z.name()).collect();
        assert_eq!(names, ["STICK_UP", "STICK_DOWN", "STICK_LEFT", "STICK_RIGHT"]);
        assert!(stick.zones().iter().all(|z| z.action().is_some()));
        assert_eq!(stick.mode(), StickMode::Keys);
    }

    #[test]
    fn test_default_zone_keys_parse() {
        let tables = KeyTables::new();
        for &(name, _, keys) in DEFAULT_ZONES {
            assert!(Action::parse(&tables, keys).is_ok(), "zone {name}: {keys}");
        }
    }

    #[test]
    fn test_normalize_default_calibration() {
        let cal = Calibration::default();
        let n = cal.normalize(Coord::new(0, 255));
        assert_eq!(n.x, 0.0);
        assert_eq!(n.y, 1.0);
        let n = cal.normalize(Coord::new(127, 127));
        assert_eq!(n.x, 0.5);
        assert_eq!(n.y, 0.5);
    }

    #[test]
    fn test_zone_fires_continuously_inside() {
        let tables = KeyTables::new();
        let action = Arc::new(Action::parse(&tables, "A").unwrap());
        let mut zone = Zone::new(
            "LEFT",
            Bounds::new(Coord::new(0.0, 0.0), Coord::new(0.3, 1.0)),
            Some(action),
        );
        let edges: Vec<Option<bool>> = [(0.1, 0.5), (0.1, 0.5), (0.9, 0.5), (0.9, 0.5)]
            .into_iter()
            .map(|(x, y)| zone.test(Coord::new(x, y)).map(|(_, pressed)| pressed))
            .collect();
        assert_eq!(edges, [Some(true), Some(true), Some(false), None]);
    }

    #[test]
    fn test_zone_without_action_is_silent() {
        let mut zone = Zone::new(
            "EMPTY",
            Bounds::new(Coord::new(0.0, 0.0), Coord::new(1.0, 1.0)),
            None,
        );
        assert!(zone.test(Coord::new(0.5, 0.5)).is_none());
        assert!(!zone.is_active());
    }

    #[test]
    fn test_keys_mode_tests_zones() {
        let mut stick = Stick::new(&KeyTables::new());
        // far left, vertically centered: only STICK_LEFT
        assert_eq!(fired(stick.update(StickSample { x: 0, y: 127 })), [true]);
        // back to center: STICK_LEFT releases
        assert_eq!(fired(stick.update(StickSample { x: 127, y: 127 })), [false]);
        assert!(fired(stick.update(StickSample { x: 127, y: 127 })).is_empty());
        // top-right corner: STICK_UP and STICK_RIGHT
        assert_eq!(fired(stick.update(StickSample { x: 255, y: 0 })), [true, true]);
    }

    #[test]
    fn test_absolute_mode_passes_raw() {
        let mut stick = Stick::new(&KeyTables::new());
        stick.set_mode(StickMode::Absolute);
        match stick.update(StickSample { x: 10, y: 200 }) {
            StickOutput::Absolute(pos) => assert_eq!(pos, Coord::new(10, 200)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_calbounds_expands_from_nothing() {
        let mut stick = Stick::new(&KeyTables::new());
        stick.set_mode(StickMode::CalBounds);
        assert_eq!(
            stick.calibration().bounds,
            Bounds::new(Coord::new(255, 255), Coord::new(0, 0))
        );
        for (x, y) in [(20, 127), (230, 127), (127, 15), (127, 240)] {
            assert!(matches!(
                stick.update(StickSample { x, y }),
                StickOutput::Calibrating
            ));
        }
        assert_eq!(
            stick.calibration().bounds,
            Bounds::new(Coord::new(20, 15), Coord::new(230, 240))
        );
    }

    #[test]
    fn test_calcenter_and_calnorth_record_points() {
        let mut stick = Stick::new(&KeyTables::new());
        stick.set_mode(StickMode::CalCenter);
        stick.update(StickSample { x: 120, y: 130 });
        stick.set_mode(StickMode::CalNorth);
        stick.update(StickSample { x: 125, y: 3 });
        assert_eq!(stick.calibration().center, Coord::new(120, 130));
        assert_eq!(stick.calibration().north, Coord::new(125, 3));
    }

    struct CountingHook(Arc<AtomicUsize>);

    impl Recalibrate for CountingHook {
        fn recalibrate(&mut self, _calibration: &Calibration) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_recalibrate_runs_on_leaving_calibration() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut stick = Stick::new(&KeyTables::new());
        stick.set_recalibrate(Box::new(CountingHook(count.clone())));

        stick.set_mode(StickMode::Absolute);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        stick.set_mode(StickMode::CalCenter);
        stick.set_mode(StickMode::CalCenter);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        stick.set_mode(StickMode::CalBounds);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        stick.set_mode(StickMode::Keys);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zone_lookup_and_removal() {
        let mut stick = Stick::new(&KeyTables::new());
        assert!(stick.zone("EXTRA", false).is_none());
        let zone = stick.zone("EXTRA", true).unwrap();
        assert_eq!(zone.bounds(), Bounds::default());
        assert!(zone.action().is_none());
        assert_eq!(stick.zones().len(), 5);

        let pattern = Regex::new("^STICK_.*$").unwrap();
        assert_eq!(stick.filtered_zone_names(&pattern).len(), 4);

        assert!(stick.remove_zone("EXTRA"));
        assert!(!stick.remove_zone("EXTRA"));
        assert_eq!(stick.zones().len(), 4);
    }

    #[test]
    fn test_bounds_display() {
        let b = Bounds::new(Coord::new(0.0, 0.7), Coord::new(1.0, 1.0));
        assert_eq!(b.to_string(), "{ 0 x 0.7 / 1 x 1 }");
    }
}
