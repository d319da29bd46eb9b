//! Merges server-pushed invalidations with periodic paginated pulls
//! into one notification view.
//!
//! The channel only signals that the collection changed; payloads are
//! always fetched over REST. Mark-read is optimistic with rollback on
//! server rejection. Polling is a fixed interval: a failed pull leaves
//! the existing list intact and waits for the next tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, NotificationItem};
use crate::channel::bus::EventBus;
use crate::channel::events;
use crate::config::SyncConfig;
use crate::session::{AuthError, SessionManager};

/// Errors from notification sync operations.
#[derive(Debug)]
pub enum NotificationError {
    Auth(AuthError),
    Api(ApiError),
}

impl std::fmt::Display for NotificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationError::Auth(e) => write!(f, "Auth error: {}", e),
            NotificationError::Api(e) => write!(f, "API error: {}", e),
        }
    }
}

impl std::error::Error for NotificationError {}

impl From<AuthError> for NotificationError {
    fn from(e: AuthError) -> Self {
        NotificationError::Auth(e)
    }
}

impl From<ApiError> for NotificationError {
    fn from(e: ApiError) -> Self {
        NotificationError::Api(e)
    }
}

struct NotifState {
    items: Vec<NotificationItem>,
    unread: u32,
    skip: usize,
    take: usize,
}

/// Reconciles pushed invalidations and periodic pulls into one
/// unread-count/list view. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct NotificationSyncEngine {
    api: ApiClient,
    session: SessionManager,
    poll_interval: Duration,
    inner: Arc<Mutex<NotifState>>,
    poll_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl NotificationSyncEngine {
    pub fn new(api: ApiClient, session: SessionManager, config: &SyncConfig) -> Self {
        Self {
            api,
            session,
            poll_interval: config.notification_poll_interval,
            inner: Arc::new(Mutex::new(NotifState {
                items: Vec::new(),
                unread: 0,
                skip: 0,
                take: config.notification_page_size,
            })),
            poll_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Fetch one page, replacing the current items and adopting the
    /// server-declared unread count. A failure leaves state untouched.
    pub async fn fetch_page(&self, skip: usize, take: usize) -> Result<(), NotificationError> {
        let token = self.session.get_valid_token().await?;
        let mut page = self.api.notifications(&token, skip, take).await?;
        page.items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut st = self.inner.lock().unwrap();
        st.items = page.items;
        st.unread = page.unread;
        st.skip = skip;
        st.take = take;
        Ok(())
    }

    /// Re-fetch the page last requested (used by the poll tick and by
    /// push invalidations).
    pub async fn refresh(&self) -> Result<(), NotificationError> {
        let (skip, take) = {
            let st = self.inner.lock().unwrap();
            (st.skip, st.take)
        };
        self.fetch_page(skip, take).await
    }

    /// Mark one notification read, optimistically.
    ///
    /// A second call for an already-read id is a no-op that issues no
    /// network request; a server rejection rolls the local flip back.
    pub async fn mark_read(&self, id: &str) -> Result<(), NotificationError> {
        let flipped = {
            let mut st = self.inner.lock().unwrap();
            match st.items.iter_mut().find(|item| item.id == id) {
                Some(item) if !item.read => {
                    item.read = true;
                    st.unread = st.unread.saturating_sub(1);
                    true
                }
                _ => false,
            }
        };
        if !flipped {
            return Ok(());
        }

        let result: Result<(), NotificationError> = async {
            let token = self.session.get_valid_token().await?;
            self.api.mark_read(&token, id).await?;
            Ok(())
        }
        .await;

        if let Err(e) = &result {
            warn!("mark_read({}) rejected, rolling back: {}", id, e);
            let mut st = self.inner.lock().unwrap();
            // An interleaved pull may have replaced the page; only
            // restore the count when the flip is actually undone, so
            // unread never drifts from the server-declared value.
            if let Some(item) = st.items.iter_mut().find(|item| item.id == id) {
                if item.read {
                    item.read = false;
                    st.unread = st.unread.saturating_add(1);
                }
            }
        }
        result
    }

    /// Mark every notification read, optimistically, with rollback.
    pub async fn mark_all_read(&self) -> Result<(), NotificationError> {
        let previous = {
            let mut st = self.inner.lock().unwrap();
            let snapshot: Vec<bool> = st.items.iter().map(|item| item.read).collect();
            let unread = st.unread;
            for item in st.items.iter_mut() {
                item.read = true;
            }
            st.unread = 0;
            (snapshot, unread)
        };

        let result: Result<(), NotificationError> = async {
            let token = self.session.get_valid_token().await?;
            self.api.mark_all_read(&token).await?;
            Ok(())
        }
        .await;

        if let Err(e) = &result {
            warn!("mark_all_read rejected, rolling back: {}", e);
            let mut st = self.inner.lock().unwrap();
            let (snapshot, unread) = previous;
            for (item, was_read) in st.items.iter_mut().zip(snapshot) {
                item.read = was_read;
            }
            st.unread = unread;
        }
        result
    }

    /// Wire push invalidations from `bus`: a support message triggers
    /// an immediate out-of-cycle pull.
    pub fn attach(&self, bus: &EventBus) -> crate::channel::SubscriptionId {
        let engine = self.clone();
        bus.on(events::SUPPORT_MESSAGE, move |_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.refresh().await {
                    warn!("Invalidation-triggered pull failed: {}", e);
                }
            });
        })
    }

    /// Start the fixed-interval poll loop. Idempotent while running.
    pub fn start_polling(&self) {
        let mut task = self.poll_task.lock().unwrap();
        if task.is_some() {
            return;
        }
        let engine = self.clone();
        let interval = self.poll_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the caller decides
            // when to do the initial fetch, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = engine.refresh().await {
                    debug!("Notification poll failed, retrying next tick: {}", e);
                }
            }
        }));
    }

    /// Stop the poll loop.
    pub fn stop(&self) {
        if let Some(task) = self.poll_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Drop all notification state (sign-out).
    pub fn clear(&self) {
        self.stop();
        let mut st = self.inner.lock().unwrap();
        st.items.clear();
        st.unread = 0;
        st.skip = 0;
    }

    /// Snapshot of the current page, newest first.
    pub fn items(&self) -> Vec<NotificationItem> {
        self.inner.lock().unwrap().items.clone()
    }

    pub fn unread(&self) -> u32 {
        self.inner.lock().unwrap().unread
    }
}

impl Drop for NotificationSyncEngine {
    fn drop(&mut self) {
        // Last clone going away takes the poll loop with it
        if Arc::strong_count(&self.poll_task) == 1 {
            self.stop();
        }
    }
}
