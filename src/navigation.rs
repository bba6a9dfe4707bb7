//! Navigation and wall-clock collaborators injected into the wizard.

use std::sync::Mutex;

use chrono::{Local, NaiveDateTime};
use tracing::info;

/// Leaves the wizard: history back, or off to sign in.
pub trait Navigator: Send + Sync {
    /// Go back past the wizard's first step.
    fn back(&self);

    /// Send the user to sign in. Returns the URL navigated to.
    fn redirect_to_login(&self, return_url: &str) -> String;
}

/// `{login_path}?returnUrl={urlencoded return_url}`.
pub fn login_url(login_path: &str, return_url: &str) -> String {
    format!("{login_path}?returnUrl={}", urlencoding::encode(return_url))
}

/// Navigator that records where it was sent, for headless front ends.
pub struct HistoryNavigator {
    login_path: String,
    visited: Mutex<Vec<String>>,
    back_count: Mutex<usize>,
}

impl HistoryNavigator {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
            visited: Mutex::new(Vec::new()),
            back_count: Mutex::new(0),
        }
    }

    /// URLs redirected to, oldest first.
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// How many times the wizard navigated back past its first step.
    pub fn back_count(&self) -> usize {
        self.back_count.lock().map(|n| *n).unwrap_or_default()
    }
}

impl Navigator for HistoryNavigator {
    fn back(&self) {
        if let Ok(mut n) = self.back_count.lock() {
            *n += 1;
        }
        info!("Navigated back out of the booking wizard");
    }

    fn redirect_to_login(&self, return_url: &str) -> String {
        let url = login_url(&self.login_path, return_url);
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(url.clone());
        }
        info!(url = %url, "Redirecting to login");
        url
    }
}

/// Source of "now" for same-day slot filtering.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stuck at one instant.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
