//! Single-session discipline and capability lifecycle.
//!
//! At most one user holds the controller at any time, whether they walked up
//! with a card or logged in remotely. Opening a session mints one capability
//! token; the token authorizes exactly one unlock request, and minting or
//! consuming a token invalidates its predecessor. A session ends on explicit
//! logout, on its expiry timer, or when the relock cycle of a granted unlock
//! completes.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;

use crate::catalog::{Catalog, UserRecord};
use crate::event::Event;
use crate::net::protocol::{KeySelectionOption, ServerMessage, UnlockStatus};
use crate::net::Outbound;
use crate::slot::{KeySlot, LockCause};
use crate::timer::TimerHandle;
use crate::token::{self, Claims, TokenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    Card,
    Password,
}

/// What became of a user card presented to the session manager.
pub enum CardLoginOutcome {
    Opened,
    SameUser,
    Blocked { current: UserRecord },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionFailureReason {
    Outdated,
    InvalidSignature,
    Malformed,
    Timeout,
    UnlockPending,
    NoSuchSlot,
    AccessDenied,
}

impl SelectionFailureReason {
    /// Human-readable reason delivered to the client.
    pub fn message(&self) -> &'static str {
        match self {
            SelectionFailureReason::Outdated => "Authentication Token is outdated",
            SelectionFailureReason::InvalidSignature => "Invalid signature for JWT token",
            SelectionFailureReason::Malformed => "Invalid JWT Format",
            SelectionFailureReason::Timeout => "Timed out",
            SelectionFailureReason::UnlockPending => "Another unlock is already in progress",
            SelectionFailureReason::NoSuchSlot => "No such key slot",
            SelectionFailureReason::AccessDenied => "Access Denied",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionFailure {
    pub reason: SelectionFailureReason,
    pub token: String,
    pub slot_id: usize,
}

pub struct SessionEvents {
    pub user_login: Event<(UserRecord, LoginMethod)>,
    pub login_blocked: Event<String>,
    pub login_failed: Event<String>,
    pub key_selection_failed: Event<SelectionFailure>,
}

struct PendingUnlock {
    request_id: String,
    slot_index: usize,
}

struct ActiveSession {
    user: UserRecord,
    /// Most recently minted capability; `None` once consumed.
    capability: Option<String>,
    pending_unlock: Option<PendingUnlock>,
    expiry_timer: Option<TimerHandle>,
    /// Distinguishes this session from any later one with the same user, so
    /// a stale expiry timer cannot tear down its successor.
    epoch: u64,
}

#[derive(Default)]
struct SessionState {
    active: Option<ActiveSession>,
    epoch_counter: u64,
}

pub struct SessionManager {
    catalog: Arc<Catalog>,
    slots: Vec<Arc<KeySlot>>,
    secret: Vec<u8>,
    session_timeout: Duration,
    outbound: Arc<Outbound>,
    state: Mutex<SessionState>,
    pub events: SessionEvents,
    /// Self-reference for expiry timers and slot listeners.
    weak: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        catalog: Arc<Catalog>,
        slots: Vec<Arc<KeySlot>>,
        secret: Vec<u8>,
        session_timeout: Duration,
        outbound: Arc<Outbound>,
    ) -> Arc<SessionManager> {
        let manager = Arc::new_cyclic(|weak| SessionManager {
            catalog,
            slots,
            secret,
            session_timeout,
            outbound,
            state: Mutex::new(SessionState::default()),
            events: SessionEvents {
                user_login: Event::new("session"),
                login_blocked: Event::new("session"),
                login_failed: Event::new("session"),
                key_selection_failed: Event::new("session"),
            },
            weak: weak.clone(),
        });
        manager.wire_slots();
        manager
    }

    /// Subscribe to every slot's lock-completion event so a pending unlock
    /// can be acknowledged when its relock cycle finishes.
    fn wire_slots(&self) {
        for (index, slot) in self.slots.iter().enumerate() {
            let weak = self.weak.clone();
            slot.events
                .solenoid_locked
                .add_listener("session", move |_origin, cause: &LockCause| {
                    if let Some(manager) = weak.upgrade() {
                        manager.on_slot_locked(index, cause);
                    }
                });
        }
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.state.lock().active.as_ref().map(|a| a.user.clone())
    }

    /// A known user presented their card at the user reader.
    pub fn on_card_user(&self, user: &UserRecord) -> CardLoginOutcome {
        let login = {
            let mut state = self.state.lock();
            match &state.active {
                Some(active) if active.user.id == user.id => return CardLoginOutcome::SameUser,
                Some(active) => {
                    return CardLoginOutcome::Blocked {
                        current: active.user.clone(),
                    }
                }
                None => self.open_session_locked(&mut state, user),
            }
        };
        self.after_open(user, LoginMethod::Card, None, login);
        CardLoginOutcome::Opened
    }

    /// A remote client asked to log in with a username and password.
    pub fn on_password_login(
        &self,
        username: &str,
        password: &str,
        request_id: &str,
    ) -> ServerMessage {
        let blocked_by = {
            let state = self.state.lock();
            state.active.as_ref().map(|a| a.user.name.clone())
        };
        if let Some(current) = blocked_by {
            warn!("login blocked for {username}: session held by {current}");
            self.events.login_blocked.trigger(&username.to_string());
            return ServerMessage::login_blocked(request_id.to_string(), current);
        }

        let Some(user) = self.catalog.verify_credentials(username, password).cloned() else {
            warn!("login failed for {username}");
            self.events.login_failed.trigger(&username.to_string());
            return ServerMessage::login_failed(request_id.to_string());
        };

        let opened = {
            let mut state = self.state.lock();
            match &state.active {
                // Lost the race against a card login between the check above
                // and now; report blocked with the winner's name.
                Some(active) => Err(active.user.name.clone()),
                None => Ok(self.open_session_locked(&mut state, &user)),
            }
        };
        match opened {
            Err(current) => {
                self.events.login_blocked.trigger(&username.to_string());
                ServerMessage::login_blocked(request_id.to_string(), current)
            }
            Ok(capability) => {
                self.after_open(&user, LoginMethod::Password, Some(request_id), capability)
            }
        }
    }

    fn open_session_locked(&self, state: &mut SessionState, user: &UserRecord) -> String {
        let claims = Claims {
            username: user.username.clone(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.session_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        };
        let capability = token::mint(&self.secret, &claims);
        state.epoch_counter += 1;
        let epoch = state.epoch_counter;
        let weak = self.weak.clone();
        let timer = TimerHandle::schedule("session-expiry", self.session_timeout, move || {
            if let Some(manager) = weak.upgrade() {
                manager.expire(epoch);
            }
        });
        state.active = Some(ActiveSession {
            user: user.clone(),
            capability: Some(capability.clone()),
            pending_unlock: None,
            expiry_timer: Some(timer),
            epoch,
        });
        capability
    }

    /// Post-open bookkeeping done outside the state lock: the login event,
    /// and the login message with the per-slot options.
    fn after_open(
        &self,
        user: &UserRecord,
        via: LoginMethod,
        request_id: Option<&str>,
        capability: String,
    ) -> ServerMessage {
        info!("session opened for {user}");
        self.events.user_login.trigger(&(user.clone(), via));
        let message = ServerMessage::login_success(
            request_id.map(str::to_string),
            capability,
            user.name.clone(),
            self.key_options(user),
        );
        if request_id.is_none() {
            // Card logins have no request to answer; push unsolicited.
            self.outbound.push(message.clone());
        }
        message
    }

    /// The option list for the login response: one row per slot.
    pub fn key_options(&self, user: &UserRecord) -> Vec<KeySelectionOption> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let slot_id = index + 1;
                match slot.current_key() {
                    None => KeySelectionOption::insert_key(slot_id, slot.name()),
                    Some(key) if user.is_authorized_for(&key.id) => {
                        KeySelectionOption::remove_key(slot_id, slot.name(), &key.name)
                    }
                    Some(_) => KeySelectionOption::access_denied(slot_id, slot.name()),
                }
            })
            .collect()
    }

    /// Validate an unlock request. Returns an immediate failure response, or
    /// `None` when the unlock was granted and the acknowledgment will follow
    /// the slot's relock cycle.
    pub fn on_unlock_request(
        &self,
        token_str: &str,
        slot_id: usize,
        request_id: &str,
    ) -> Option<ServerMessage> {
        let verdict = self.validate_unlock(token_str, slot_id, request_id);
        match verdict {
            Ok(slot) => {
                info!("unlock granted for slot {}", slot.name());
                slot.unlock();
                None
            }
            Err(reason) => {
                warn!("unlock refused for slot {slot_id}: {}", reason.message());
                self.events.key_selection_failed.trigger(&SelectionFailure {
                    reason,
                    token: token_str.to_string(),
                    slot_id,
                });
                Some(ServerMessage::unlock_result(
                    request_id.to_string(),
                    UnlockStatus::Failed,
                    Some(reason.message().to_string()),
                ))
            }
        }
    }

    fn validate_unlock(
        &self,
        token_str: &str,
        slot_id: usize,
        request_id: &str,
    ) -> Result<Arc<KeySlot>, SelectionFailureReason> {
        let mut state = self.state.lock();
        let active = state
            .active
            .as_mut()
            .ok_or(SelectionFailureReason::Outdated)?;

        // Single use: only the most recently minted token matches, and this
        // attempt consumes it whatever happens next.
        if active.capability.as_deref() != Some(token_str) {
            return Err(SelectionFailureReason::Outdated);
        }
        active.capability = None;

        let claims = token::verify(&self.secret, token_str).map_err(|e| match e {
            TokenError::InvalidSignature => SelectionFailureReason::InvalidSignature,
            TokenError::Malformed => SelectionFailureReason::Malformed,
        })?;
        if claims.username != active.user.username {
            return Err(SelectionFailureReason::Outdated);
        }
        if Utc::now() >= claims.expires_at {
            return Err(SelectionFailureReason::Timeout);
        }
        if active.pending_unlock.is_some() {
            return Err(SelectionFailureReason::UnlockPending);
        }
        let slot = slot_id
            .checked_sub(1)
            .and_then(|index| self.slots.get(index))
            .ok_or(SelectionFailureReason::NoSuchSlot)?;

        // Empty slot: the user is inserting a key. Occupied slot: the key
        // must be one of theirs.
        if let Some(key) = slot.current_key() {
            if !active.user.is_authorized_for(&key.id) {
                return Err(SelectionFailureReason::AccessDenied);
            }
        }

        active.pending_unlock = Some(PendingUnlock {
            request_id: request_id.to_string(),
            slot_index: slot_id - 1,
        });
        // The relock cycle now bounds the session; the expiry timer would
        // only race it.
        if let Some(timer) = active.expiry_timer.take() {
            timer.cancel();
        }
        Ok(Arc::clone(slot))
    }

    /// Listener on every slot's lock-completion: acknowledge the pending
    /// unlock and close the session.
    fn on_slot_locked(&self, slot_index: usize, cause: &LockCause) {
        let status = match cause {
            LockCause::KeyInserted(_) | LockCause::KeyRemoved(_) => UnlockStatus::Success,
            LockCause::AutoRelock => UnlockStatus::NoChange,
            LockCause::Bootstrap => return,
        };
        let response = {
            let mut state = self.state.lock();
            let awaited = match &state.active {
                Some(active) => matches!(
                    &active.pending_unlock,
                    Some(pending) if pending.slot_index == slot_index
                ),
                None => false,
            };
            if !awaited {
                return;
            }
            let Some(session) = state.active.take() else {
                return;
            };
            if let Some(timer) = session.expiry_timer {
                timer.cancel();
            }
            info!("session closed for {} after unlock cycle", session.user.username);
            session
                .pending_unlock
                .map(|pending| (pending.request_id, status))
        };
        if let Some((request_id, status)) = response {
            self.outbound
                .push(ServerMessage::unlock_result(request_id, status, None));
        }
    }

    /// Session expiry timer: closes the session if this exact session is
    /// still active and no unlock is in flight.
    fn expire(&self, epoch: u64) {
        let expired_user = {
            let mut state = self.state.lock();
            let this_session = matches!(
                &state.active,
                Some(active) if active.epoch == epoch && active.pending_unlock.is_none()
            );
            if this_session {
                state.active.take().map(|session| session.user)
            } else {
                None
            }
        };
        if let Some(user) = expired_user {
            info!("session for {} timed out", user.username);
        }
    }

    /// Explicit logout: drops the session and invalidates the capability.
    pub fn logout(&self) {
        let mut state = self.state.lock();
        if let Some(session) = state.active.take() {
            if let Some(timer) = session.expiry_timer {
                timer.cancel();
            }
            info!("logged out {}", session.user.username);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KeyRecord;
    use crate::hw::MemoryPin;
    use crate::net::protocol::LoginStatus;
    use crate::rfid::{CardReader, MemoryReader};
    use crate::slot::SlotConfig;
    use std::collections::HashSet;
    use std::thread;

    const SECRET: &[u8] = b"test-secret";

    fn user(id: &str, username: &str, keys: &[&str]) -> UserRecord {
        UserRecord {
            id: id.into(),
            uid: format!("{id}-card"),
            username: username.into(),
            name: format!("{username} name"),
            credential_hash: Some(bcrypt::hash("pw", 4).unwrap()),
            authorized_for: keys.iter().map(|k| k.to_string()).collect::<HashSet<_>>(),
        }
    }

    struct Rig {
        manager: Arc<SessionManager>,
        slots: Vec<Arc<KeySlot>>,
        readers: Vec<Arc<MemoryReader>>,
        outbound: Arc<Outbound>,
    }

    fn rig(slot_count: usize) -> Rig {
        let keys = vec![
            KeyRecord {
                id: "k1".into(),
                uid: "aa11".into(),
                name: "Server Room".into(),
            },
            KeyRecord {
                id: "k2".into(),
                uid: "bb22".into(),
                name: "Workshop".into(),
            },
        ];
        let users = vec![user("u1", "ada", &["k1"]), user("u2", "grace", &["k1", "k2"])];
        let catalog = Arc::new(Catalog::from_records(keys, users));

        let mut slots = Vec::new();
        let mut readers = Vec::new();
        for i in 0..slot_count {
            let reader = Arc::new(MemoryReader::new());
            let slot = KeySlot::new(
                SlotConfig {
                    name: format!("slot-{}", i + 1),
                    reader_timeout: Duration::from_millis(1),
                    relock_timeout: Duration::from_millis(50),
                    solenoid_settle: Duration::from_millis(1),
                    theft_window: Duration::from_millis(40),
                    init_locked: true,
                },
                Arc::clone(&reader) as Arc<dyn CardReader>,
                Arc::clone(&catalog),
                Arc::new(MemoryPin::new(false)),
            );
            slots.push(slot);
            readers.push(reader);
        }

        let outbound = Outbound::new();
        let manager = SessionManager::new(
            catalog,
            slots.clone(),
            SECRET.to_vec(),
            Duration::from_secs(60),
            Arc::clone(&outbound),
        );
        Rig {
            manager,
            slots,
            readers,
            outbound,
        }
    }

    fn login(rig: &Rig, username: &str) -> String {
        match rig.manager.on_password_login(username, "pw", "req-login") {
            ServerMessage::Login {
                status: LoginStatus::Success,
                jwt: Some(jwt),
                ..
            } => jwt,
            other => panic!("expected login success, got {other:?}"),
        }
    }

    fn insert_key(rig: &Rig, slot: usize, uid: &str) {
        rig.slots[slot].unlock();
        rig.readers[slot].set_card(Some(uid));
        rig.slots[slot].tick();
        assert!(rig.slots[slot].is_locked());
        // the relock acknowledgment (if any) is not under test here
        rig.outbound.drain();
        rig.manager.logout();
    }

    #[test]
    fn password_login_mints_capability_and_options() {
        let rig = rig(2);
        let response = rig.manager.on_password_login("ada", "pw", "1");
        match response {
            ServerMessage::Login {
                id,
                status,
                jwt,
                name,
                key_data,
                ..
            } => {
                assert_eq!(id.as_deref(), Some("1"));
                assert_eq!(status, LoginStatus::Success);
                assert_eq!(name.as_deref(), Some("ada name"));
                let jwt = jwt.unwrap();
                let claims = token::verify(SECRET, &jwt).unwrap();
                assert_eq!(claims.username, "ada");
                // both slots empty: both rows are insert options
                let options = key_data.unwrap();
                assert_eq!(options.len(), 2);
                assert!(options.iter().all(|o| o.key_name.is_none()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_credentials_fail() {
        let rig = rig(1);
        let response = rig.manager.on_password_login("ada", "wrong", "1");
        assert!(matches!(
            response,
            ServerMessage::Login {
                status: LoginStatus::Failed,
                ..
            }
        ));
        assert!(rig.manager.current_user().is_none());
    }

    #[test]
    fn second_login_is_blocked_with_current_user() {
        let rig = rig(1);
        login(&rig, "ada");
        let response = rig.manager.on_password_login("grace", "pw", "2");
        match response {
            ServerMessage::Login {
                status: LoginStatus::Blocked,
                current_user,
                ..
            } => assert_eq!(current_user.as_deref(), Some("ada name")),
            other => panic!("unexpected {other:?}"),
        }
        // ada still owns the session
        assert_eq!(rig.manager.current_user().unwrap().username, "ada");
    }

    #[test]
    fn card_login_pushes_unsolicited_message() {
        let rig = rig(1);
        let catalog_user = rig.manager.catalog.user_by_uid("u1-card").unwrap().clone();
        assert!(matches!(
            rig.manager.on_card_user(&catalog_user),
            CardLoginOutcome::Opened
        ));
        let pushed = rig.outbound.drain();
        assert_eq!(pushed.len(), 1);
        match &pushed[0] {
            ServerMessage::Login { id, status, .. } => {
                assert!(id.is_none());
                assert_eq!(*status, LoginStatus::Success);
            }
            other => panic!("unexpected {other:?}"),
        }
        // same card again: no-op
        assert!(matches!(
            rig.manager.on_card_user(&catalog_user),
            CardLoginOutcome::SameUser
        ));
        // different user's card: blocked
        let other_user = rig.manager.catalog.user_by_uid("u2-card").unwrap().clone();
        assert!(matches!(
            rig.manager.on_card_user(&other_user),
            CardLoginOutcome::Blocked { .. }
        ));
    }

    #[test]
    fn unlock_of_unauthorized_key_is_denied() {
        let rig = rig(1);
        insert_key(&rig, 0, "bb22"); // k2, ada is not authorized
        let jwt = login(&rig, "ada");
        let response = rig.manager.on_unlock_request(&jwt, 1, "3").unwrap();
        match response {
            ServerMessage::UnlockKeySlot {
                status, reason, ..
            } => {
                assert_eq!(status, UnlockStatus::Failed);
                assert_eq!(reason.as_deref(), Some("Access Denied"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rig.slots[0].is_locked());
    }

    #[test]
    fn capability_is_single_use() {
        let rig = rig(1);
        insert_key(&rig, 0, "bb22");
        let failures = Arc::new(Mutex::new(Vec::new()));
        {
            let failures = Arc::clone(&failures);
            rig.manager.events.key_selection_failed.add_listener(
                "t",
                move |_origin, failure: &SelectionFailure| {
                    failures.lock().push(failure.reason);
                },
            );
        }
        let jwt = login(&rig, "ada");
        // first attempt consumes the token (and fails authorization)
        let first = rig.manager.on_unlock_request(&jwt, 1, "4").unwrap();
        assert!(matches!(
            first,
            ServerMessage::UnlockKeySlot {
                status: UnlockStatus::Failed,
                ..
            }
        ));
        // replay is rejected as outdated
        let second = rig.manager.on_unlock_request(&jwt, 1, "5").unwrap();
        match second {
            ServerMessage::UnlockKeySlot { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("Authentication Token is outdated"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            *failures.lock(),
            vec![
                SelectionFailureReason::AccessDenied,
                SelectionFailureReason::Outdated
            ]
        );
    }

    #[test]
    fn forged_token_is_rejected() {
        let rig = rig(1);
        login(&rig, "ada");
        let forged = token::mint(
            b"wrong-secret",
            &Claims {
                username: "ada".into(),
                expires_at: Utc::now() + chrono::Duration::seconds(60),
            },
        );
        // not the stored capability, so it cannot even match
        let response = rig.manager.on_unlock_request(&forged, 1, "6").unwrap();
        match response {
            ServerMessage::UnlockKeySlot { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("Authentication Token is outdated"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn out_of_range_slot_fails() {
        let rig = rig(1);
        let jwt = login(&rig, "ada");
        let response = rig.manager.on_unlock_request(&jwt, 9, "7").unwrap();
        match response {
            ServerMessage::UnlockKeySlot { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("No such key slot"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn granted_unlock_acknowledges_after_insert_and_logs_out() {
        let rig = rig(1);
        let jwt = login(&rig, "ada");
        assert!(rig.manager.on_unlock_request(&jwt, 1, "8").is_none());
        assert!(!rig.slots[0].is_locked());
        // the user inserts their key; the slot relocks
        rig.readers[0].set_card(Some("aa11"));
        rig.slots[0].tick();
        assert!(rig.slots[0].is_locked());
        let pushed = rig.outbound.drain();
        assert_eq!(
            pushed,
            vec![ServerMessage::unlock_result(
                "8".into(),
                UnlockStatus::Success,
                None
            )]
        );
        // the unlock cycle ended the session
        assert!(rig.manager.current_user().is_none());
    }

    #[test]
    fn granted_unlock_with_no_action_reports_no_change() {
        let rig = rig(1);
        let jwt = login(&rig, "ada");
        assert!(rig.manager.on_unlock_request(&jwt, 1, "9").is_none());
        // nobody touches the slot; the auto-relock closes the cycle
        thread::sleep(Duration::from_millis(120));
        assert!(rig.slots[0].is_locked());
        let pushed = rig.outbound.drain();
        assert_eq!(
            pushed,
            vec![ServerMessage::unlock_result(
                "9".into(),
                UnlockStatus::NoChange,
                None
            )]
        );
        assert!(rig.manager.current_user().is_none());
    }

    #[test]
    fn session_expires_without_activity() {
        let rig = rig(1);
        let outbound = Outbound::new();
        let manager = SessionManager::new(
            Arc::clone(&rig.manager.catalog),
            rig.slots.clone(),
            SECRET.to_vec(),
            Duration::from_millis(30),
            outbound,
        );
        let response = manager.on_password_login("ada", "pw", "10");
        assert!(matches!(
            response,
            ServerMessage::Login {
                status: LoginStatus::Success,
                ..
            }
        ));
        thread::sleep(Duration::from_millis(100));
        assert!(manager.current_user().is_none());
        // and the next login proceeds
        let again = manager.on_password_login("grace", "pw", "11");
        assert!(matches!(
            again,
            ServerMessage::Login {
                status: LoginStatus::Success,
                ..
            }
        ));
    }

    #[test]
    fn key_options_reflect_slot_contents() {
        let rig = rig(2);
        insert_key(&rig, 0, "bb22"); // k2
        let grace = rig.manager.catalog.user_by_username("grace").unwrap().clone();
        let ada = rig.manager.catalog.user_by_username("ada").unwrap().clone();

        let grace_options = rig.manager.key_options(&grace);
        assert_eq!(grace_options[0].key_name.as_deref(), Some("Workshop"));
        assert_eq!(grace_options[1].key_name, None);
        assert_eq!(grace_options[1].access_denied, None);

        let ada_options = rig.manager.key_options(&ada);
        assert_eq!(ada_options[0].access_denied, Some(true));
        assert_eq!(ada_options[1].key_name, None);
    }
}
