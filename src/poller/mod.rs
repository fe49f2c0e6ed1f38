//! Client-side cooperative polling.
//!
//! The platform has no push channel: clients learn about state changes by
//! periodically fetching their unread notifications. Each feature runs its
//! own single-threaded loop (incoming-call detection polls tighter than game
//! matchmaking), reconciles against a watermark of already-processed signals,
//! and surfaces *edges* only; a poll that returns the same state again fires
//! nothing. Ringtones, countdowns and redirects are the consumer's reaction
//! to the emitted events; the poller itself never mutates a session.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::models::notification::{Notification, NotificationKind};
use crate::models::session::SessionStatus;
use crate::repositories::store::SignalStore;
use crate::services::signals;

/// Default poll interval for incoming-call detection, in seconds.
pub const CALL_POLL_INTERVAL_SECS: u64 = 2;

/// Default poll interval for game-matchmaking detection, in seconds.
pub const GAME_POLL_INTERVAL_SECS: u64 = 3;

/// What a poller fetches. Implemented in-process over the store; an embedded
/// client would implement this over its HTTP transport.
#[async_trait]
pub trait SignalFeed: Send + Sync {
    async fn unread_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>>;
    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<()>;
}

/// In-process feed over the signal store.
#[derive(Clone)]
pub struct StoreFeed {
    store: Arc<dyn SignalStore>,
}

impl StoreFeed {
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SignalFeed for StoreFeed {
    async fn unread_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        signals::list_unread(self.store.as_ref(), user_id).await
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<()> {
        signals::mark_read(self.store.as_ref(), notification_id, user_id).await
    }
}

/// Which feature a poller serves; decides interval and relevant signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollFeature {
    IncomingCalls,
    GameMatchmaking,
}

impl PollFeature {
    pub fn default_interval(&self) -> Duration {
        match self {
            PollFeature::IncomingCalls => Duration::from_secs(CALL_POLL_INTERVAL_SECS),
            PollFeature::GameMatchmaking => Duration::from_secs(GAME_POLL_INTERVAL_SECS),
        }
    }

    fn relevant(&self, kind: NotificationKind) -> bool {
        match self {
            PollFeature::IncomingCalls => matches!(
                kind,
                NotificationKind::CallIncoming
                    | NotificationKind::CallRinging
                    | NotificationKind::CallAnswered
                    | NotificationKind::CallDeclined
                    | NotificationKind::CallEnded
                    | NotificationKind::CallMissed
                    | NotificationKind::CallFailed
            ),
            PollFeature::GameMatchmaking => matches!(
                kind,
                NotificationKind::GameInvitationReceived
                    | NotificationKind::GameStarted
                    | NotificationKind::GameDeclined
                    | NotificationKind::GameCancelled
                    | NotificationKind::GameFinished
                    | NotificationKind::GameExpired
                    | NotificationKind::PlayerAnswered
                    | NotificationKind::ForfeitResponded
            ),
        }
    }
}

/// The session status a signal implies on the observing side, used for
/// edge detection. Progress signals carry no status and always surface.
fn implied_status(kind: NotificationKind) -> Option<SessionStatus> {
    match kind {
        NotificationKind::CallIncoming => Some(SessionStatus::Calling),
        NotificationKind::CallRinging => Some(SessionStatus::Ringing),
        NotificationKind::CallAnswered => Some(SessionStatus::Connected),
        NotificationKind::CallDeclined | NotificationKind::GameDeclined => {
            Some(SessionStatus::Declined)
        }
        NotificationKind::CallEnded => Some(SessionStatus::Ended),
        NotificationKind::CallMissed => Some(SessionStatus::Missed),
        NotificationKind::CallFailed => Some(SessionStatus::Failed),
        NotificationKind::GameInvitationReceived => Some(SessionStatus::Pending),
        NotificationKind::GameStarted => Some(SessionStatus::Active),
        NotificationKind::GameCancelled => Some(SessionStatus::Cancelled),
        NotificationKind::GameFinished => Some(SessionStatus::Finished),
        NotificationKind::GameExpired => Some(SessionStatus::Expired),
        NotificationKind::PlayerAnswered | NotificationKind::ForfeitResponded => None,
    }
}

/// The last-observed state a client used, to avoid re-triggering side
/// effects for signals already handled.
#[derive(Debug, Default)]
pub struct Watermark {
    seen: HashSet<Uuid>,
    last_status: HashMap<Uuid, SessionStatus>,
}

impl Watermark {
    /// Records the notification and reports whether it is a new edge.
    /// A repeated signal, or one re-announcing the already-known status of
    /// its session, is absorbed silently.
    fn observe(&mut self, notification: &Notification) -> bool {
        if !self.seen.insert(notification.id) {
            return false;
        }

        match (notification.session_ref, implied_status(notification.kind)) {
            (Some(session_id), Some(status)) => {
                if self.last_status.get(&session_id) == Some(&status) {
                    false
                } else {
                    self.last_status.insert(session_id, status);
                    true
                }
            }
            _ => true,
        }
    }
}

/// An edge detected by a poll tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Start ringing; the consumer should also acknowledge the call.
    IncomingCall { session_id: Uuid, caller_id: Option<Uuid> },
    /// The callee's device is ringing.
    CallRinging { session_id: Uuid },
    /// The call connected; redirect into the call UI.
    CallConnected { session_id: Uuid },
    /// The call reached a terminal status; dismiss ringing UI.
    CallTerminated { session_id: Uuid, status: SessionStatus },
    /// A game invitation awaits a response.
    GameInvitation { session_id: Uuid, from: Option<Uuid> },
    /// Both participants are bound; the local countdown may begin.
    GameStarted { session_id: Uuid },
    /// The game reached a terminal status; payload carries the outcome.
    GameTerminated {
        session_id: Uuid,
        status: SessionStatus,
        outcome: Option<serde_json::Value>,
    },
    /// The opponent reported progress; merge without a full refetch.
    OpponentProgress { session_id: Uuid, payload: Option<serde_json::Value> },
}

fn to_event(notification: &Notification) -> Option<PollEvent> {
    let session_id = notification.session_ref?;
    match notification.kind {
        NotificationKind::CallIncoming => Some(PollEvent::IncomingCall {
            session_id,
            caller_id: notification.actor_id,
        }),
        NotificationKind::CallRinging => Some(PollEvent::CallRinging { session_id }),
        NotificationKind::CallAnswered => Some(PollEvent::CallConnected { session_id }),
        NotificationKind::CallDeclined
        | NotificationKind::CallEnded
        | NotificationKind::CallMissed
        | NotificationKind::CallFailed => Some(PollEvent::CallTerminated {
            session_id,
            status: implied_status(notification.kind)?,
        }),
        NotificationKind::GameInvitationReceived => Some(PollEvent::GameInvitation {
            session_id,
            from: notification.actor_id,
        }),
        NotificationKind::GameStarted => Some(PollEvent::GameStarted { session_id }),
        NotificationKind::GameDeclined
        | NotificationKind::GameCancelled
        | NotificationKind::GameFinished
        | NotificationKind::GameExpired => Some(PollEvent::GameTerminated {
            session_id,
            status: implied_status(notification.kind)?,
            outcome: notification.payload.clone(),
        }),
        NotificationKind::PlayerAnswered | NotificationKind::ForfeitResponded => {
            Some(PollEvent::OpponentProgress {
                session_id,
                payload: notification.payload.clone(),
            })
        }
    }
}

/// One feature's cooperative polling loop for one user.
pub struct ClientPoller {
    feed: Arc<dyn SignalFeed>,
    user_id: Uuid,
    feature: PollFeature,
    interval: Duration,
    watermark: Watermark,
}

impl ClientPoller {
    pub fn new(feed: Arc<dyn SignalFeed>, user_id: Uuid, feature: PollFeature) -> Self {
        let interval = feature.default_interval();
        Self::with_interval(feed, user_id, feature, interval)
    }

    pub fn with_interval(
        feed: Arc<dyn SignalFeed>,
        user_id: Uuid,
        feature: PollFeature,
        interval: Duration,
    ) -> Self {
        Self { feed, user_id, feature, watermark: Watermark::default(), interval }
    }

    /// One poll tick: fetch unread, reconcile against the watermark, return
    /// the detected edges. Every relevant signal is marked read afterwards,
    /// edge or not, so repeats from an earlier failed tick drain out.
    pub async fn poll_once(&mut self) -> Result<Vec<PollEvent>> {
        let unread = self.feed.unread_notifications(self.user_id).await?;
        let mut events = Vec::new();

        for notification in unread {
            if !self.feature.relevant(notification.kind) {
                continue;
            }

            if self.watermark.observe(&notification) {
                if let Some(event) = to_event(&notification) {
                    events.push(event);
                }
            }

            self.feed.mark_read(notification.id, self.user_id).await?;
        }

        Ok(events)
    }

    /// Drives `poll_once` on the feature's interval, sending edges to `tx`,
    /// until the token is cancelled or the receiver is dropped.
    ///
    /// Cancellation mid-tick drops the in-flight fetch without advancing the
    /// watermark; the signals stay unread and surface on the next poller.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<PollEvent>,
        cancel_token: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(events) => {
                            for event in events {
                                if tx.send(event).await.is_err() {
                                    tracing::debug!("Poll consumer dropped, stopping poller");
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Poll tick failed for {}: {}", self.user_id, e);
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    tracing::debug!(
                        "Poller for {} ({:?}) cancelled",
                        self.user_id,
                        self.feature
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FakeFeed {
        notifications: Mutex<Vec<Notification>>,
    }

    impl FakeFeed {
        fn new(notifications: Vec<Notification>) -> Self {
            Self { notifications: Mutex::new(notifications) }
        }
    }

    #[async_trait]
    impl SignalFeed for FakeFeed {
        async fn unread_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
            Ok(self
                .notifications
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.user_id == user_id && !n.is_read)
                .cloned()
                .collect())
        }

        async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<()> {
            let mut notifications = self.notifications.lock().unwrap();
            if let Some(n) = notifications
                .iter_mut()
                .find(|n| n.id == notification_id && n.user_id == user_id)
            {
                n.is_read = true;
            }
            Ok(())
        }
    }

    fn user() -> Uuid {
        Uuid::from_u128(0xB)
    }

    fn signal(kind: NotificationKind, session_ref: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: user(),
            actor_id: Some(Uuid::from_u128(0xA)),
            kind,
            session_ref: Some(session_ref),
            payload: None,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn repeated_signal_fires_one_edge() {
        let session_id = Uuid::new_v4();
        // Two rows announcing the same incoming call, e.g. after a duplicated
        // fan-out: the ringtone must start once.
        let feed = Arc::new(FakeFeed::new(vec![
            signal(NotificationKind::CallIncoming, session_id),
            signal(NotificationKind::CallIncoming, session_id),
        ]));

        let mut poller =
            ClientPoller::new(feed.clone(), user(), PollFeature::IncomingCalls);
        let events = poller.poll_once().await.unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PollEvent::IncomingCall { .. }));

        // Both rows were drained regardless.
        assert!(feed.unread_notifications(user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_poll_is_quiet() {
        let session_id = Uuid::new_v4();
        let feed = Arc::new(FakeFeed::new(vec![signal(
            NotificationKind::GameInvitationReceived,
            session_id,
        )]));

        let mut poller =
            ClientPoller::new(feed, user(), PollFeature::GameMatchmaking);
        assert_eq!(poller.poll_once().await.unwrap().len(), 1);
        assert!(poller.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_progression_fires_each_edge() {
        let session_id = Uuid::new_v4();
        let feed = Arc::new(FakeFeed::new(vec![
            signal(NotificationKind::CallRinging, session_id),
            signal(NotificationKind::CallAnswered, session_id),
        ]));

        let mut poller =
            ClientPoller::new(feed, user(), PollFeature::IncomingCalls);
        let events = poller.poll_once().await.unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PollEvent::CallRinging { .. }));
        assert!(matches!(events[1], PollEvent::CallConnected { .. }));
    }

    #[tokio::test]
    async fn irrelevant_kinds_are_left_unread() {
        let session_id = Uuid::new_v4();
        let feed = Arc::new(FakeFeed::new(vec![
            signal(NotificationKind::GameStarted, session_id),
            signal(NotificationKind::CallIncoming, session_id),
        ]));

        let mut poller =
            ClientPoller::new(feed.clone(), user(), PollFeature::IncomingCalls);
        let events = poller.poll_once().await.unwrap();
        assert_eq!(events.len(), 1);

        // The game signal stays for the matchmaking poller.
        let remaining = feed.unread_notifications(user()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, NotificationKind::GameStarted);
    }

    #[tokio::test]
    async fn progress_signals_always_surface() {
        let session_id = Uuid::new_v4();
        let feed = Arc::new(FakeFeed::new(vec![
            signal(NotificationKind::PlayerAnswered, session_id),
            signal(NotificationKind::PlayerAnswered, session_id),
        ]));

        let mut poller =
            ClientPoller::new(feed, user(), PollFeature::GameMatchmaking);
        // Distinct progress signals are distinct edges even at equal status.
        assert_eq!(poller.poll_once().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let feed = Arc::new(FakeFeed::new(vec![]));
        let poller = ClientPoller::with_interval(
            feed,
            user(),
            PollFeature::IncomingCalls,
            Duration::from_millis(5),
        );

        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(tx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
