use chrono::{DateTime, Duration, Utc};

use crate::models::{ResultsRelease, Session, SessionType};

impl Session {
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        now >= self.visible_from
    }

    pub fn is_waiting_to_open(&self, now: DateTime<Utc>) -> bool {
        self.is_visible(now) && now < self.start
    }

    pub fn is_opened(&self, now: DateTime<Utc>) -> bool {
        self.is_visible(now) && self.start <= now && now < self.end
    }

    pub fn is_in_grace_period(&self, now: DateTime<Utc>) -> bool {
        self.end <= now && grace_period_end(self).map_or(true, |grace_end| now < grace_end)
    }

    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.end
    }

    pub fn is_accepting_submissions(&self, now: DateTime<Utc>) -> bool {
        self.is_opened(now) || self.is_in_grace_period(now)
    }

    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        match self.results_release {
            ResultsRelease::At(at) => now >= at,
            ResultsRelease::Published(_) => true,
            ResultsRelease::Manual | ResultsRelease::Never => false,
        }
    }

    pub fn is_closing_within_hours(&self, hours: i64, now: DateTime<Utc>) -> bool {
        // An hour count past the calendar's range means no upper bound.
        let within = Duration::try_hours(hours.max(0))
            .and_then(|window| now.checked_add_signed(window))
            .map_or(true, |limit| self.end <= limit);
        self.session_type == SessionType::Standard && self.end > now && within
    }

    pub fn needs_open_email(&self, now: DateTime<Utc>) -> bool {
        self.session_type == SessionType::Standard
            && !self.sent_open_email
            && self.is_opened(now)
            && !self.is_closed(now)
    }

    pub fn needs_published_email(&self, now: DateTime<Utc>) -> bool {
        self.session_type == SessionType::Standard
            && !self.sent_published_email
            && self.is_published(now)
    }
}

/// `None` when the grace period runs past the representable calendar.
pub fn grace_period_end(session: &Session) -> Option<DateTime<Utc>> {
    Duration::try_minutes(session.grace_period_minutes.max(0))
        .and_then(|grace| session.end.checked_add_signed(grace))
}
