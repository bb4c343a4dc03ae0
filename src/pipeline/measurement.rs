use log::debug;

use crate::{
    measurement::{MeasExtension, MeasKind, SignalCounter},
    pipeline::{Reaction, ReactionContext},
    prelude::StateKind,
};

/// Scales row and column of the measurement covariance by the deweighting factor.
/// A zero factor disables deweighting.
pub fn deweight(ctx: &mut ReactionContext, row: usize) -> Reaction {
    let factor = ctx.opts.deweight_factor;
    if factor == 0.0 {
        return Reaction::Continue;
    }

    ctx.trace
        .append(&format!("deweighting {}", ctx.batch.keys[row]));

    ctx.registry.statistics.meas_deweight += 1;
    ctx.batch.deweight(row, factor);
    Reaction::Continue
}

/// Pseudo observations constrain states directly: bad ones are state failures.
/// Every orbit state this row refers to goes through the state chain.
pub fn pseudo_obs_cascade(ctx: &mut ReactionContext, row: usize) -> Reaction {
    if !ctx.batch.extensions[row].pseudo_obs {
        return Reaction::Continue;
    }

    let orbits = ctx
        .registry
        .keys()
        .iter()
        .enumerate()
        .filter(|(pos, key)| {
            key.kind == StateKind::Orbit
                && *pos < ctx.batch.num_states()
                && ctx.batch.h[(row, *pos)] != 0.0
        })
        .map(|(_, key)| key.clone())
        .collect::<Vec<_>>();

    for key in orbits.iter() {
        ctx.reject_state(key);
    }

    Reaction::Continue
}

/// Increments the phase reject counter of this row.
/// The handle is released so it can no longer be reset during this pass.
pub fn phase_reject_count(ctx: &mut ReactionContext, row: usize) -> Reaction {
    let Some(counter) = ctx.batch.extensions[row].phase_reject.take() else {
        return Reaction::Continue;
    };

    let count = counter.increment();

    ctx.trace.append(&format!(
        "incrementing phase reject count of {} to {}",
        ctx.batch.keys[row], count
    ));

    Reaction::Continue
}

/// Tags the raw signal behind a rejected phase measurement.
pub fn signal_errors(ctx: &mut ReactionContext, row: usize) -> Reaction {
    let key = &ctx.batch.keys[row];
    if key.kind != MeasKind::PhasMeas {
        return Reaction::Continue;
    }

    let Some(obs_ref) = ctx.batch.extensions[row].obs else {
        return Reaction::Continue;
    };

    let Some(station) = ctx.stations.get_mut(obs_ref.station) else {
        return Reaction::Continue;
    };

    let tagged = station
        .observations
        .get_mut(obs_ref.observation)
        .and_then(|obs| obs.signals.get_mut(key.signal))
        .map(|signal| signal.phase_error = true)
        .is_some();

    if tagged {
        station.summary.phase_rejections += 1;
        debug!("{} - phase error", key);
    }

    Reaction::Continue
}

/// Deweights every row of the station this row belongs to.
/// Deweighted rows are no longer considered used.
pub fn station_deweight(ctx: &mut ReactionContext, row: usize) -> Reaction {
    let factor = ctx.opts.deweight_factor;
    if factor == 0.0 {
        return Reaction::Continue;
    }

    let Some(station) = ctx.batch.keys[row].station.clone() else {
        return Reaction::Continue;
    };

    for i in 0..ctx.batch.len() {
        if ctx.batch.keys[i].station.as_deref() != Some(station.as_str()) {
            continue;
        }

        ctx.trace
            .append(&format!("deweighting {}", ctx.batch.keys[i]));

        ctx.registry.statistics.station_deweight += 1;
        ctx.batch.deweight(i, factor);

        if let Some(used) = &ctx.batch.extensions[i].used {
            used.set(false);
        }
    }

    Reaction::Continue
}

/// Zeros a live counter, then its alternate.
/// Nothing is reset once the primary handle was released.
fn reset_pair(primary: &Option<SignalCounter>, alternate: &Option<SignalCounter>) {
    let Some(primary) = primary else {
        return;
    };
    primary.reset();

    if let Some(alternate) = alternate {
        alternate.reset();
    }
}

/// Zeros the live phase and ionosphere outage counters of a used row.
pub fn reset_outage(ext: &MeasExtension) {
    if let Some(counter) = &ext.phase_outage {
        counter.reset();
    }
    reset_pair(&ext.iono_outage, &ext.iono_outage_alt);
}

/// Zeros the live phase reject counter of a used row.
/// Counters released by [phase_reject_count] are left untouched.
pub fn reset_phase_reject(ext: &MeasExtension) {
    if let Some(counter) = &ext.phase_reject {
        counter.reset();
    }
}
