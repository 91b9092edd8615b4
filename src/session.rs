use tokio::sync::watch;

/// Who is signed in on this client. Views hold a receiver and react to changes.
#[derive(Clone)]
pub struct Session {
    current: watch::Sender<Option<String>>,
}

impl Session {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        tracing::debug!("Session signed in as {}", user_id);
        self.current.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        tracing::debug!("Session signed out");
        self.current.send_replace(None);
    }

    pub fn user_id(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.current.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
