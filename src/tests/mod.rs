
mod appointments;
mod reminders;
