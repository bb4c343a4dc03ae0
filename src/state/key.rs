use std::hash::{Hash, Hasher};

use crate::prelude::{StationIndex, SV};

/// Type of unknown a [StateKey] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKind {
    /// Satellite orbit component (0..3 position, 3..6 velocity)
    Orbit,
    /// Satellite clock offset (m)
    SatClock,
    /// Receiver system bias (m)
    RecSysBias,
    /// Carrier phase ambiguity (m)
    Ambiguity,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Orbit => write!(f, "ORBIT"),
            Self::SatClock => write!(f, "SAT_CLOCK"),
            Self::RecSysBias => write!(f, "REC_SYS_BIAS"),
            Self::Ambiguity => write!(f, "AMBIGUITY"),
        }
    }
}

/// [StateKey] uniquely identifies one scalar unknown of the network filter.
///
/// The station back reference is a lookup index only: it does not take part
/// in equality nor hashing, two keys naming the same unknown are equal
/// whether or not they carry it.
#[derive(Debug, Clone)]
pub struct StateKey {
    /// [StateKind]
    pub kind: StateKind,
    /// Satellite this state relates to
    pub sv: Option<SV>,
    /// Station this state relates to
    pub station: Option<String>,
    /// Component or signal index
    pub sub: usize,
    /// Lookup index into the station table
    pub station_ref: Option<StationIndex>,
}

impl PartialEq for StateKey {
    fn eq(&self, rhs: &Self) -> bool {
        self.kind == rhs.kind
            && self.sv == rhs.sv
            && self.station == rhs.station
            && self.sub == rhs.sub
    }
}

impl Eq for StateKey {}

impl Hash for StateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.sv.hash(state);
        self.station.hash(state);
        self.sub.hash(state);
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(station) = &self.station {
            write!(f, " {}", station)?;
        }
        if let Some(sv) = self.sv {
            write!(f, " {}", sv)?;
        }
        write!(f, " {}", self.sub)
    }
}

impl StateKey {
    /// Builds a new [StateKey]
    pub fn new(kind: StateKind) -> Self {
        Self {
            kind,
            sv: None,
            station: None,
            sub: 0,
            station_ref: None,
        }
    }

    /// Satellite clock offset of this [SV]
    pub fn sat_clock(sv: SV) -> Self {
        Self::new(StateKind::SatClock).with_sv(sv)
    }

    /// Receiver clock (system bias) of this station
    pub fn rec_clock(station: &str) -> Self {
        Self::new(StateKind::RecSysBias).with_station(station)
    }

    /// Carrier phase ambiguity of (station, [SV], signal)
    pub fn ambiguity(station: &str, sv: SV, signal: usize) -> Self {
        Self::new(StateKind::Ambiguity)
            .with_station(station)
            .with_sv(sv)
            .with_sub(signal)
    }

    /// Orbit component of this [SV]
    pub fn orbit(sv: SV, component: usize) -> Self {
        Self::new(StateKind::Orbit).with_sv(sv).with_sub(component)
    }

    /// Copies and returns [StateKey] with [SV]
    pub fn with_sv(&self, sv: SV) -> Self {
        let mut s = self.clone();
        s.sv = Some(sv);
        s
    }

    /// Copies and returns [StateKey] with station identifier
    pub fn with_station(&self, station: &str) -> Self {
        let mut s = self.clone();
        s.station = Some(station.to_string());
        s
    }

    /// Copies and returns [StateKey] with sub index
    pub fn with_sub(&self, sub: usize) -> Self {
        let mut s = self.clone();
        s.sub = sub;
        s
    }

    /// Copies and returns [StateKey] with station back reference
    pub fn with_station_ref(&self, index: StationIndex) -> Self {
        let mut s = self.clone();
        s.station_ref = Some(index);
        s
    }

    /// True for orbit position components
    pub(crate) fn is_orbit_position(&self) -> bool {
        self.kind == StateKind::Orbit && self.sub < 3
    }

    /// True for orbit velocity components
    pub(crate) fn is_orbit_velocity(&self) -> bool {
        self.kind == StateKind::Orbit && self.sub >= 3
    }
}
