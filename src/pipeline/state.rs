use log::{debug, warn};
use nalgebra::DMatrix;

use crate::{
    pipeline::{Reaction, ReactionContext},
    prelude::{NoiseModel, StateKey, StateKind},
};

/// Runs the measurement chain on every row referring to this state.
pub fn cascade_to_measurements(ctx: &mut ReactionContext, key: &StateKey) -> Reaction {
    if !ctx.opts.reject_on_state_error {
        return Reaction::Continue;
    }

    let Some(pos) = ctx.registry.position(key) else {
        return Reaction::Continue;
    };

    ctx.trace.append(&format!(
        "bad state detected {} - rejecting all referencing measurements",
        key
    ));

    ctx.registry.statistics.state_rejection += 1;

    if pos >= ctx.batch.num_states() {
        return Reaction::Continue;
    }

    for row in ctx.batch.rows_referencing(pos) {
        ctx.reject_measurement(row);
    }

    Reaction::Continue
}

/// Clock glitch: removes the clock and every ambiguity linked to it.
/// A receiver clock glitch also drops the station clock correction.
pub fn clock_glitch(ctx: &mut ReactionContext, key: &StateKey) -> Reaction {
    if !ctx.opts.reinit_on_clock_error {
        return Reaction::Continue;
    }

    let linked = |candidate: &StateKey| match key.kind {
        StateKind::SatClock => {
            candidate.sv == key.sv
                && matches!(candidate.kind, StateKind::Ambiguity | StateKind::SatClock)
        },
        StateKind::RecSysBias => {
            candidate.station == key.station
                && matches!(candidate.kind, StateKind::Ambiguity | StateKind::RecSysBias)
        },
        _ => false,
    };

    if !matches!(key.kind, StateKind::SatClock | StateKind::RecSysBias) {
        return Reaction::Continue;
    }

    ctx.trace
        .append(&format!("bad clock detected {} - resetting linked states", key));

    ctx.registry.statistics.clock_glitch += 1;

    // registered key carries the station reference
    let station_ref = ctx
        .registry
        .position(key)
        .and_then(|pos| ctx.registry.keys()[pos].station_ref)
        .or(key.station_ref)
        .or_else(|| {
            key.station
                .as_deref()
                .and_then(|id| ctx.stations.index_of(id))
        });

    let removed = ctx
        .registry
        .keys()
        .iter()
        .filter(|candidate| linked(*candidate))
        .cloned()
        .collect::<Vec<_>>();

    for candidate in removed.iter() {
        ctx.remove_state(candidate);
    }

    if key.kind == StateKind::RecSysBias {
        if let Some(station) = station_ref.and_then(|index| ctx.stations.get_mut(index)) {
            debug!("{} - resetting clock correction", station.id);
            station.net_clock_correction_m = None;
            ctx.trace.append("- resetting clock adjustment");
        }
    }

    Reaction::Continue
}

/// Orbit glitch: inflates the covariance of this orbit, out of band.
/// Position components receive a one time increment, velocity components
/// also carry a decaying profile for the upcoming epochs.
pub fn orbit_glitch(ctx: &mut ReactionContext, key: &StateKey) -> Reaction {
    if key.kind != StateKind::Orbit {
        return Reaction::Continue;
    }

    ctx.trace
        .append(&format!("bad orbit state detected {}", key));

    ctx.registry.statistics.orbit_state_reject += 1;

    let Some(t) = ctx.registry.epoch() else {
        warn!("orbit glitch on {} prior first time update", key);
        return Reaction::Suppress;
    };

    let opts = ctx.opts;
    let n = ctx.registry.len();

    let f = DMatrix::<f64>::identity(n, n);
    let mut q = DMatrix::<f64>::zeros(n, n);
    let mut trails = Vec::new();

    for (pos, candidate) in ctx.registry.keys().iter().enumerate() {
        if candidate.kind != StateKind::Orbit
            || candidate.sv != key.sv
            || candidate.station != key.station
        {
            continue;
        }
        if candidate.is_orbit_position() {
            q[(pos, pos)] = opts.orbit_pos_proc_noise.powi(2);
        } else if candidate.is_orbit_velocity() {
            q[(pos, pos)] = opts.orbit_vel_proc_noise.powi(2);
            trails.push(candidate.clone());
        }
    }

    for candidate in trails.iter() {
        let model = NoiseModel::exponential(
            opts.orbit_vel_proc_noise_trail,
            opts.orbit_vel_proc_noise_trail_tau,
            Some(t),
        );
        if let Err(e) = ctx.registry.set_noise_model(candidate, model) {
            warn!("orbit glitch: {}", e);
        }
    }

    if let Err(e) = ctx.registry.manual_transition(&f, &q, t) {
        warn!("orbit glitch: {}", e);
    }

    Reaction::Suppress
}
