//! Background push receiver.
//!
//! Two entry points lead to the same [`NotificationReceiver::present`]: the
//! raw push path, which works from the first event, and the messaging-callback
//! path, which only works once the foreground has handed over the messaging
//! configuration. Either one firing is enough; the device coalesces repeats by tag.

use crate::domain::notification::{Notification, PushPayload};
use crate::domain::ports::{ClientWindowsRef, NotificationSinkRef, WindowId};
use crate::error::Result;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const ROOT_URL: &str = "/";

/// Credentials handed over by the foreground application. Opaque here.
#[derive(Clone, PartialEq, Eq)]
pub struct MessagingConfig {
    pub credentials: String,
}

impl std::fmt::Debug for MessagingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingConfig")
            .field("credentials", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum PushEvent {
    Raw(Vec<u8>),
    Message(PushPayload),
    Configure(MessagingConfig),
    Click(Notification),
}

/// Where a notification click took the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    Navigate { url: String, window: WindowId },
    Focus(WindowId),
    OpenRoot(WindowId),
}

pub struct NotificationReceiver {
    sink: NotificationSinkRef,
    windows: ClientWindowsRef,
    messaging: OnceLock<MessagingConfig>,
}

impl NotificationReceiver {
    pub fn new(sink: NotificationSinkRef, windows: ClientWindowsRef) -> Self {
        Self {
            sink,
            windows,
            messaging: OnceLock::new(),
        }
    }

    pub fn configure(&self, config: MessagingConfig) {
        if self.messaging.set(config).is_err() {
            debug!("Messaging already configured, ignoring repeat configuration");
        } else {
            info!("Messaging channel configured");
        }
    }

    pub fn is_configured(&self) -> bool {
        self.messaging.get().is_some()
    }

    /// Raw push path. Malformed payloads are logged and dropped.
    pub async fn on_push(&self, raw: &[u8]) -> Option<Notification> {
        let payload = match PushPayload::from_slice(raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, bytes = raw.len(), "Dropping push payload");
                return None;
            }
        };
        self.present_or_log(payload).await
    }

    /// Messaging-callback path. Inactive until configured; the raw path covers that window.
    pub async fn on_message(&self, payload: PushPayload) -> Option<Notification> {
        if !self.is_configured() {
            debug!("Messaging not configured yet, leaving payload to the raw push path");
            return None;
        }
        self.present_or_log(payload).await
    }

    async fn present_or_log(&self, payload: PushPayload) -> Option<Notification> {
        match self.present(payload).await {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!(error = %e, "Dropping push payload");
                None
            }
        }
    }

    /// Normalizes a payload and shows it.
    pub async fn present(&self, payload: PushPayload) -> Result<Notification> {
        let notification = payload.normalize()?;
        self.sink.show(notification.clone()).await?;
        info!(tag = %notification.tag, title = %notification.title, "Notification shown");
        Ok(notification)
    }

    /// Routes the vendor back into a live application window.
    pub async fn on_click(&self, notification: &Notification) -> Result<ClickAction> {
        if let Some(url) = &notification.url {
            let window = self.windows.open(url).await?;
            return Ok(ClickAction::Navigate {
                url: url.clone(),
                window,
            });
        }
        if let Some(window) = self.windows.list().await?.first().copied() {
            self.windows.focus(window).await?;
            return Ok(ClickAction::Focus(window));
        }
        let window = self.windows.open(ROOT_URL).await?;
        Ok(ClickAction::OpenRoot(window))
    }

    async fn handle(&self, event: PushEvent) {
        match event {
            PushEvent::Raw(raw) => {
                self.on_push(&raw).await;
            }
            PushEvent::Message(payload) => {
                self.on_message(payload).await;
            }
            PushEvent::Configure(config) => self.configure(config),
            PushEvent::Click(notification) => {
                if let Err(e) = self.on_click(&notification).await {
                    warn!(tag = %notification.tag, error = %e, "Could not route notification click");
                }
            }
        }
    }

    /// Runs the receiver on its own task, independent of any foreground view.
    ///
    /// The task ends once every [`ReceiverHandle`] clone has been dropped and
    /// the queue has drained. A `buffer_size` of zero is treated as one.
    pub fn spawn(self: Arc<Self>, buffer_size: usize) -> (ReceiverHandle, JoinHandle<()>) {
        let (sender, mut listener) = mpsc::channel(buffer_size.max(1));
        let join = tokio::spawn(async move {
            debug!("Notification receiver started");
            while let Some(event) = listener.recv().await {
                self.handle(event).await;
            }
            debug!("Notification receiver stopped");
        });
        (ReceiverHandle { sender }, join)
    }
}

#[derive(Clone)]
pub struct ReceiverHandle {
    sender: mpsc::Sender<PushEvent>,
}

impl ReceiverHandle {
    pub async fn deliver(&self, event: PushEvent) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "Notification receiver is gone, event lost");
        }
    }
}
