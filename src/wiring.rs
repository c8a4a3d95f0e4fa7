//! Connects component events to the outbound control channel.
//!
//! Components log their own transitions; this layer only translates alarm
//! events into the unsolicited wire messages the remote client renders.

use std::sync::Arc;

use crate::net::protocol::ServerMessage;
use crate::net::Outbound;
use crate::slot::user_slot::CardBlocked;
use crate::slot::{KeySlot, TheftReport, UserSlot};

pub fn wire_alerts(key_slots: &[Arc<KeySlot>], user_slot: &UserSlot, outbound: &Arc<Outbound>) {
    for slot in key_slots {
        let out = Arc::clone(outbound);
        slot.events
            .key_stolen
            .add_listener("alerts", move |origin, report: &TheftReport| {
                let key_name = match &report.key {
                    Some(key) => key.name.clone(),
                    None => report.uid.clone(),
                };
                out.push(ServerMessage::KeyStolen {
                    slot_name: origin.to_string(),
                    key_name,
                    deceptive_replacement: report.replacement.clone(),
                });
            });

        let out = Arc::clone(outbound);
        slot.events
            .unauthorized_place
            .add_listener("alerts", move |origin, key| {
                out.push(ServerMessage::UnauthKeyPlaceAttempt {
                    slot_name: origin.to_string(),
                    key_name: key.name.clone(),
                });
            });

        let out = Arc::clone(outbound);
        slot.events
            .unknown_key_placed
            .add_listener("alerts", move |origin, uid: &String| {
                out.push(ServerMessage::UnknownKeyPlaced {
                    slot_name: origin.to_string(),
                    key_id: uid.clone(),
                });
            });
    }

    let out = Arc::clone(outbound);
    user_slot
        .events
        .unknown_user
        .add_listener("alerts", move |_origin, uid: &String| {
            out.push(ServerMessage::UnrecognizedUserCard {
                card_id: uid.clone(),
            });
        });

    let out = Arc::clone(outbound);
    user_slot
        .events
        .card_blocked
        .add_listener("alerts", move |_origin, blocked: &CardBlocked| {
            out.push(ServerMessage::UserCardBlocked {
                blocked_user: blocked.blocked.name.clone(),
                current_user: blocked.current.name.clone(),
            });
        });
}
