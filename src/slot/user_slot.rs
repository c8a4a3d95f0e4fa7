//! User-identification reader: debounced card reads routed to the session.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::catalog::{Catalog, UserRecord};
use crate::error::Error;
use crate::event::Event;
use crate::rfid::CardReader;
use crate::session::{CardLoginOutcome, LoginMethod, SessionManager};

#[derive(Debug, Clone)]
pub struct CardBlocked {
    pub blocked: UserRecord,
    pub current: UserRecord,
}

pub struct UserSlotEvents {
    pub user_found: Event<(UserRecord, LoginMethod)>,
    pub unknown_user: Event<String>,
    pub card_blocked: Event<CardBlocked>,
}

pub struct UserSlot {
    reader: Arc<dyn CardReader>,
    catalog: Arc<Catalog>,
    session: Arc<SessionManager>,
    reader_timeout: Duration,
    last_uid: Mutex<Option<String>>,
    pub events: UserSlotEvents,
}

impl UserSlot {
    pub fn new(
        reader: Arc<dyn CardReader>,
        catalog: Arc<Catalog>,
        session: Arc<SessionManager>,
        reader_timeout: Duration,
    ) -> Arc<UserSlot> {
        Arc::new(UserSlot {
            reader,
            catalog,
            session,
            reader_timeout,
            last_uid: Mutex::new(None),
            events: UserSlotEvents {
                user_found: Event::new("user-reader"),
                unknown_user: Event::new("user-reader"),
                card_blocked: Event::new("user-reader"),
            },
        })
    }

    pub fn tick(&self) {
        let card_now = match self.reader.read_uid(self.reader_timeout) {
            Ok(card) => card,
            Err(Error::BusBusy) => {
                debug!("user-reader: bus busy, skipping tick");
                return;
            }
            Err(e) => {
                warn!("user-reader: reader fault treated as no card: {e}");
                None
            }
        };

        {
            let mut last = self.last_uid.lock();
            if *last == card_now {
                return;
            }
            *last = card_now.clone();
        }

        let Some(uid) = card_now else { return };

        match self.catalog.user_by_uid(&uid) {
            Some(user) => match self.session.on_card_user(user) {
                CardLoginOutcome::Opened => {
                    info!("user found by card: {user}");
                    self.events
                        .user_found
                        .trigger(&(user.clone(), LoginMethod::Card));
                }
                CardLoginOutcome::Blocked { current } => {
                    warn!("user card blocked while {} is active: {user}", current.name);
                    self.events.card_blocked.trigger(&CardBlocked {
                        blocked: user.clone(),
                        current,
                    });
                }
                CardLoginOutcome::SameUser => {}
            },
            None => {
                warn!("unknown user card: {uid}");
                self.events.unknown_user.trigger(&uid);
            }
        }
    }

    pub fn cleanup(&self) {
        self.reader.cleanup();
    }
}
