use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl AuthPayload {
    #[inline]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub ip: String,
    pub email: String,
    pub success: bool,
    pub user_id: Option<Uuid>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub ip: String,
    pub email: String,
    pub success: bool,
    pub user_id: Option<Uuid>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Recorded,
    /// This attempt pushed the account over the threshold and it is now blocked.
    Locked,
}

/// When repeated failures block an account.
///
/// Counting starts at the latest of: an administrative unblock, the last
/// successful login (when `reset_on_success`), and the start of the rolling
/// `window` (when set). With none of them every failure ever made counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub window: Option<Duration>,
    pub reset_on_success: bool,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            window: None,
            reset_on_success: true,
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_failed_attempts: u32) -> Self {
        Self {
            max_failed_attempts,
            ..Self::default()
        }
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    pub fn reset_on_success(mut self, reset: bool) -> Self {
        self.reset_on_success = reset;
        self
    }

    /// Earliest failure timestamp that still counts.
    ///
    /// `reset_at` is the user's last administrative unblock.
    pub fn count_since(
        &self,
        now: DateTime<Utc>,
        last_success: Option<DateTime<Utc>>,
        reset_at: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let window_start = self
            .window
            .and_then(|w| chrono::Duration::from_std(w).ok())
            .map(|w| now - w);
        let last_success = last_success.filter(|_| self.reset_on_success);

        [window_start, last_success, reset_at].into_iter().flatten().max()
    }

    #[inline]
    pub fn should_block(&self, failures: u64) -> bool {
        self.max_failed_attempts > 0 && failures >= u64::from(self.max_failed_attempts)
    }
}
