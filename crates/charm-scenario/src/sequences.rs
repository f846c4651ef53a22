// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The event sequences a unit sees when it is deployed and when it is removed.

use tracing::{debug, info};

use crate::context::Context;
use crate::error::Result;
use crate::event::Event;
use crate::framework::Charm;
use crate::runtime::Output;
use crate::state::State;

/// Events delivered while a unit comes up against `template`.
///
/// Storage is attached first, then `install`, one `relation-created` per
/// relation, `leader-elected` (or `leader-settings-changed` for a
/// non-leader), `config-changed` and `start`.
pub fn startup_sequence(template: &State) -> Vec<Event> {
    let mut events: Vec<Event> = template
        .storages
        .iter()
        .map(Event::storage_attached)
        .collect();
    events.push(Event::install());
    events.extend(template.relations.iter().map(Event::relation_created));
    events.push(if template.leader {
        Event::leader_elected()
    } else {
        Event::leader_settings_changed()
    });
    events.push(Event::config_changed());
    events.push(Event::start());
    events
}

/// Events delivered while a unit is torn down.
pub fn teardown_sequence(template: &State) -> Vec<Event> {
    let mut events: Vec<Event> = template
        .relations
        .iter()
        .map(Event::relation_broken)
        .collect();
    events.extend(template.storages.iter().map(Event::storage_detaching));
    events.push(Event::stop());
    events.push(Event::remove());
    events
}

/// Play both sequences against a leader and a non-leader copy of `template`,
/// feeding each output State into the next dispatch.
///
/// Returns every dispatch's output in order, or the first failure.
pub fn check_builtin_sequences(
    ctx: &Context,
    charm: &dyn Charm,
    template: &State,
) -> Result<Vec<Output>> {
    let mut outputs = Vec::new();
    for leader in [true, false] {
        let initial = template.clone().with_leader(leader);
        for (sequence, events) in [
            ("startup", startup_sequence(&initial)),
            ("teardown", teardown_sequence(&initial)),
        ] {
            debug!(sequence, leader, events = events.len(), "playing sequence");
            let mut state = initial.clone();
            for event in events {
                let output = ctx.run(charm, event, &state)?;
                state = output.state.clone();
                outputs.push(output);
            }
        }
    }
    info!(dispatches = outputs.len(), "builtin sequences passed");
    Ok(outputs)
}
