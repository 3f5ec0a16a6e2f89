use std::fmt::Write as _;

use crate::appointments::Appointment;
use crate::mail::Email;
use crate::users::User;

const DATE_FORMAT: &str = "%A %-d %B %Y, %H:%M UTC";

/// Texts of a reminder for a single appointment
#[derive(Debug)]
pub struct ReminderContent {
    pub subject: String,
    pub text: String,
    pub html: String,
    /// Short line for the in-app notification
    pub summary: String,
}

impl ReminderContent {
    pub fn new(appointment: &Appointment, owner: &User) -> Self {
        let starts_at = appointment.start_date_time.format(DATE_FORMAT).to_string();
        let ends_at = appointment.end_date_time.format("%H:%M UTC").to_string();

        let subject = format!("Reminder: {} on {starts_at}", appointment.title);
        let summary = format!("{} starts {starts_at}", appointment.title);

        let mut text = format!(
            "Hi {},\n\nThis is a reminder for your upcoming appointment.\n\n{}\nWhen: {starts_at} until {ends_at} ({} minutes)\n",
            owner.name, appointment.title, appointment.duration
        );
        let mut html = format!(
            "<p>Hi {},</p><p>This is a reminder for your upcoming appointment.</p><h2>{}</h2><p><strong>When:</strong> {starts_at} until {ends_at} ({} minutes)</p>",
            escape(&owner.name),
            escape(&appointment.title),
            appointment.duration
        );

        if let Some(location) = &appointment.location {
            let _ = writeln!(text, "Where: {location}");
            let _ = write!(html, "<p><strong>Where:</strong> {}</p>", escape(location));
        }

        if let Some(description) = &appointment.description {
            let _ = writeln!(text, "\n{description}");
            let _ = write!(html, "<p>{}</p>", escape(description));
        }

        Self {
            subject,
            text,
            html,
            summary,
        }
    }

    /// The email version, addressed to `to`
    pub fn to_email(&self, to: &str) -> Email {
        Email {
            to: to.to_string(),
            subject: self.subject.clone(),
            html: self.html.clone(),
            text: self.text.clone(),
        }
    }
}

/// Escape user provided text for use in HTML
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            ch => escaped.push(ch),
        }
    }

    escaped
}
