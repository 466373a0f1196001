//! Customer booking flow: pick a time, describe the visit, get a confirmation.
//!
//! ```text
//! SelectTime --select_slot--> EnterDetails --submit--> Confirmed
//!      ^                           |                       |
//!      +----------back-------------+                       |
//!      +----------------------book_another-----------------+
//! ```
//!
//! Availability lookups are tagged with a [`SlotRequest`]; only the answer to the
//! latest request for the currently selected date is ever shown.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::{
    auth::Session,
    gateway::{Gateway, GatewayError},
    models::{NewBooking, BOOKING_SCHEDULED},
};

/// Length of a customer-booked appointment.
pub const DEFAULT_DURATION_MINUTES: i64 = 30;

pub const SLOTS_FAILURE_MESSAGE: &str = "We couldn't load available times. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardStep {
    SelectTime,
    EnterDetails,
    Confirmed,
}

impl WizardStep {
    pub fn from_query(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("details") | Some("2") => Self::EnterDetails,
            Some("confirmed") | Some("3") => Self::Confirmed,
            _ => Self::SelectTime,
        }
    }

    pub fn requires_session(self) -> bool {
        !matches!(self, Self::SelectTime)
    }

    pub fn number(self) -> u8 {
        match self {
            Self::SelectTime => 1,
            Self::EnterDetails => 2,
            Self::Confirmed => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRequest {
    pub date: NaiveDate,
    pub seq: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub booking_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub message: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("This step isn't available yet.")]
    WrongStep,
    #[error("That time is no longer available. Please pick another one.")]
    UnknownSlot,
    #[error("Please tell us what you'd like done.")]
    MissingMessage,
    #[error("This time slot was just booked by someone else. Please pick another time.")]
    SlotTaken,
    #[error("We couldn't create your booking. Please try again.")]
    SubmitFailed,
}

#[derive(Clone, Debug)]
pub struct BookingWizard {
    step: WizardStep,
    selected_date: NaiveDate,
    slots: Vec<NaiveDateTime>,
    slots_for: Option<NaiveDate>,
    pending: Option<SlotRequest>,
    next_seq: u64,
    slots_error: Option<String>,
    selected_slot: Option<NaiveDateTime>,
    phone: String,
    message: String,
    submit_error: Option<WizardError>,
    confirmation: Option<Confirmation>,
}

impl BookingWizard {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            step: WizardStep::SelectTime,
            selected_date: today,
            slots: Vec::new(),
            slots_for: None,
            pending: None,
            next_seq: 0,
            slots_error: None,
            selected_slot: None,
            phone: String::new(),
            message: String::new(),
            submit_error: None,
            confirmation: None,
        }
    }

    pub fn confirmed(today: NaiveDate, confirmation: Confirmation) -> Self {
        let mut wizard = Self::new(today);
        wizard.selected_date = confirmation.start.date();
        wizard.selected_slot = Some(confirmation.start);
        wizard.message = confirmation.message.clone();
        wizard.confirmation = Some(confirmation);
        wizard.step = WizardStep::Confirmed;
        wizard
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    pub fn slots(&self) -> &[NaiveDateTime] {
        &self.slots
    }

    pub fn slots_error(&self) -> Option<&str> {
        self.slots_error.as_deref()
    }

    pub fn is_loading_slots(&self) -> bool {
        self.pending.is_some()
    }

    pub fn selected_slot(&self) -> Option<NaiveDateTime> {
        self.selected_slot
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn submit_error(&self) -> Option<&WizardError> {
        self.submit_error.as_ref()
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.confirmation.as_ref()
    }

    /// Changes the date and returns the availability request to issue, if any.
    /// Re-selecting the current date while its slots are loading or loaded is a no-op.
    pub fn select_date(&mut self, date: NaiveDate) -> Option<SlotRequest> {
        if self.step != WizardStep::SelectTime {
            return None;
        }
        let in_flight = self.pending.is_some_and(|request| request.date == date);
        if date == self.selected_date && (in_flight || self.slots_for == Some(date)) {
            return None;
        }
        self.selected_date = date;
        Some(self.issue_request())
    }

    /// Forces a new lookup for the current date, e.g. after a failed fetch.
    pub fn reload_slots(&mut self) -> SlotRequest {
        self.issue_request()
    }

    fn issue_request(&mut self) -> SlotRequest {
        self.next_seq += 1;
        let request = SlotRequest {
            date: self.selected_date,
            seq: self.next_seq,
        };
        self.slots.clear();
        self.slots_for = None;
        self.slots_error = None;
        self.selected_slot = None;
        self.pending = Some(request);
        request
    }

    /// Applies an availability answer. Answers to superseded requests are dropped
    /// and `false` is returned.
    pub fn apply_slots(
        &mut self,
        request: SlotRequest,
        result: Result<Vec<NaiveDateTime>, GatewayError>,
    ) -> bool {
        if self.pending != Some(request) || request.date != self.selected_date {
            log::debug!("Dropping stale availability for {} (#{})", request.date, request.seq);
            return false;
        }
        self.pending = None;
        match result {
            Ok(mut slots) => {
                slots.sort();
                slots.dedup();
                self.slots = slots;
                self.slots_for = Some(request.date);
            }
            Err(err) => {
                log::error!("Availability lookup for {} failed: {err}", request.date);
                self.slots.clear();
                self.slots_error = Some(SLOTS_FAILURE_MESSAGE.to_string());
            }
        }
        true
    }

    pub fn select_slot(&mut self, slot: NaiveDateTime) -> Result<(), WizardError> {
        if self.step != WizardStep::SelectTime {
            return Err(WizardError::WrongStep);
        }
        if !self.slots.contains(&slot) {
            return Err(WizardError::UnknownSlot);
        }
        self.selected_slot = Some(slot);
        self.submit_error = None;
        self.step = WizardStep::EnterDetails;
        Ok(())
    }

    pub fn back(&mut self) {
        if self.step == WizardStep::EnterDetails {
            self.step = WizardStep::SelectTime;
            self.submit_error = None;
        }
    }

    pub fn set_details(&mut self, phone: &str, message: &str) {
        self.phone = phone.trim().to_string();
        self.message = message.trim().to_string();
    }

    pub async fn submit(&mut self, gateway: &Gateway, session: &Session) -> Result<(), WizardError> {
        let result = self.try_submit(gateway, session).await;
        if let Err(err) = &result {
            self.submit_error = Some(err.clone());
        }
        result
    }

    async fn try_submit(&mut self, gateway: &Gateway, session: &Session) -> Result<(), WizardError> {
        if self.step != WizardStep::EnterDetails {
            return Err(WizardError::WrongStep);
        }
        let Some(start) = self.selected_slot else {
            return Err(WizardError::WrongStep);
        };
        if self.message.is_empty() {
            return Err(WizardError::MissingMessage);
        }

        let phone = (!self.phone.is_empty()).then_some(self.phone.as_str());
        let customer = gateway
            .find_or_create_customer(&session.user.id, &session.user.email, phone)
            .await
            .map_err(|err| {
                log::error!("Customer lookup for {} failed: {err}", session.user.email);
                WizardError::SubmitFailed
            })?;

        let end = start + Duration::minutes(DEFAULT_DURATION_MINUTES);
        let message = compose_message(&self.message, &self.phone);
        let booking = gateway
            .create_booking(NewBooking {
                customer_id: customer.id,
                service_id: None,
                staff_id: None,
                start_time: start,
                end_time: end,
                status: BOOKING_SCHEDULED.to_string(),
                notes: None,
                message: Some(message.clone()),
            })
            .await
            .map_err(|err| {
                if err.is_slot_conflict() {
                    log::warn!("Slot {start} was taken before {} could book it", session.user.email);
                    WizardError::SlotTaken
                } else {
                    log::error!("Booking creation failed: {err}");
                    WizardError::SubmitFailed
                }
            })?;

        log::info!("Booking {} created for {} at {start}", booking.id, session.user.email);
        self.confirmation = Some(Confirmation {
            booking_id: booking.id,
            start,
            end,
            message,
        });
        self.submit_error = None;
        self.step = WizardStep::Confirmed;
        Ok(())
    }

    pub fn book_another(&mut self, today: NaiveDate) {
        *self = Self::new(today);
    }
}

/// Booking note sent to the shop: the customer's text plus the phone number when given.
pub fn compose_message(message: &str, phone: &str) -> String {
    let message = message.trim();
    let phone = phone.trim();
    if phone.is_empty() {
        message.to_string()
    } else {
        format!("{message}\n\nPhone: {phone}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::AuthProvider,
        gateway::SLOT_CONFLICT_CODE,
        models::NewCustomer,
        test_utils::{at, setup_pool},
    };

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    /// A wizard on the details step for `slot`, as if it was listed when the page loaded.
    fn details_for(slot: NaiveDateTime) -> BookingWizard {
        let mut wizard = BookingWizard::new(date("2024-05-01"));
        let request = wizard.select_date(slot.date()).unwrap();
        assert!(wizard.apply_slots(request, Ok(vec![slot])));
        wizard.select_slot(slot).unwrap();
        wizard
    }

    #[test]
    fn latest_selected_date_wins_over_late_answers() {
        let mut wizard = BookingWizard::new(date("2024-05-01"));
        let first = wizard.select_date(date("2024-05-06")).unwrap();
        let second = wizard.select_date(date("2024-05-07")).unwrap();

        assert!(wizard.apply_slots(second, Ok(vec![at("2024-05-07T10:00")])));
        assert!(!wizard.apply_slots(first, Ok(vec![at("2024-05-06T09:00")])));

        assert_eq!(wizard.selected_date(), date("2024-05-07"));
        assert_eq!(wizard.slots(), &[at("2024-05-07T10:00")]);
    }

    #[test]
    fn reselecting_the_same_date_issues_no_request() {
        let mut wizard = BookingWizard::new(date("2024-05-01"));
        let request = wizard.select_date(date("2024-05-06")).unwrap();
        assert!(wizard.is_loading_slots());
        assert_eq!(wizard.select_date(date("2024-05-06")), None);

        assert!(wizard.apply_slots(request, Ok(vec![at("2024-05-06T09:00")])));
        assert_eq!(wizard.select_date(date("2024-05-06")), None);
        assert_eq!(wizard.slots().len(), 1);
    }

    #[test]
    fn switching_back_to_an_earlier_date_ignores_its_old_request() {
        let mut wizard = BookingWizard::new(date("2024-05-01"));
        let stale = wizard.select_date(date("2024-05-06")).unwrap();
        wizard.select_date(date("2024-05-07")).unwrap();
        let fresh = wizard.select_date(date("2024-05-06")).unwrap();

        assert!(!wizard.apply_slots(stale, Ok(vec![at("2024-05-06T09:00")])));
        assert!(wizard.is_loading_slots());
        assert!(wizard.apply_slots(fresh, Ok(vec![at("2024-05-06T11:00")])));
        assert_eq!(wizard.slots(), &[at("2024-05-06T11:00")]);
    }

    #[test]
    fn failed_lookup_is_reported_without_changing_step() {
        let mut wizard = BookingWizard::new(date("2024-05-01"));
        let request = wizard.select_date(date("2024-05-06")).unwrap();
        wizard.apply_slots(request, Err(GatewayError::NotFound("settings")));

        assert_eq!(wizard.step(), WizardStep::SelectTime);
        assert_eq!(wizard.slots_error(), Some(SLOTS_FAILURE_MESSAGE));
        let retry = wizard.reload_slots();
        assert_eq!(retry.date, date("2024-05-06"));
        assert!(wizard.slots_error().is_none());
    }

    #[test]
    fn only_listed_slots_can_be_selected() {
        let mut wizard = BookingWizard::new(date("2024-05-01"));
        let request = wizard.select_date(date("2024-05-06")).unwrap();
        wizard.apply_slots(request, Ok(vec![at("2024-05-06T09:00")]));

        assert_eq!(
            wizard.select_slot(at("2024-05-06T09:30")),
            Err(WizardError::UnknownSlot)
        );
        wizard.select_slot(at("2024-05-06T09:00")).unwrap();
        assert_eq!(wizard.step(), WizardStep::EnterDetails);
        assert_eq!(wizard.select_date(date("2024-05-08")), None);

        wizard.back();
        assert_eq!(wizard.step(), WizardStep::SelectTime);
        assert_eq!(wizard.selected_slot(), Some(at("2024-05-06T09:00")));
    }

    #[test]
    fn only_the_first_step_is_public() {
        assert_eq!(WizardStep::from_query(None), WizardStep::SelectTime);
        assert_eq!(WizardStep::from_query(Some("details")), WizardStep::EnterDetails);
        assert_eq!(WizardStep::from_query(Some("confirmed")), WizardStep::Confirmed);
        assert!(!WizardStep::SelectTime.requires_session());
        assert!(WizardStep::EnterDetails.requires_session());
        assert!(WizardStep::Confirmed.requires_session());
    }

    #[test]
    fn phone_is_appended_to_message() {
        assert_eq!(compose_message(" Need a haircut ", ""), "Need a haircut");
        assert_eq!(
            compose_message("Beard trim", "555-0100"),
            "Beard trim\n\nPhone: 555-0100"
        );
    }

    #[tokio::test]
    async fn authenticated_customer_books_a_slot_end_to_end() {
        let pool = setup_pool().await;
        let gateway = Gateway::new(pool.clone());
        let auth = AuthProvider::new(pool, chrono::Duration::hours(1));
        let session = auth.sign_up("casey@example.com", "secret1").await.unwrap();

        let t1 = at("2024-05-06T10:00");
        let t2 = at("2024-05-06T10:30");
        let mut wizard = BookingWizard::new(date("2024-05-01"));
        let request = wizard.select_date(date("2024-05-06")).unwrap();
        assert!(wizard.apply_slots(request, Ok(vec![t1, t2])));
        wizard.select_slot(t1).unwrap();
        wizard.set_details("", "Need a haircut");
        wizard.submit(&gateway, &session).await.unwrap();

        assert_eq!(wizard.step(), WizardStep::Confirmed);
        let confirmation = wizard.confirmation().unwrap().clone();
        assert_eq!(confirmation.start, t1);
        assert_eq!(confirmation.message, "Need a haircut");

        let booking = gateway.get_booking(&confirmation.booking_id).await.unwrap();
        assert_eq!(booking.start_time, "2024-05-06T10:00:00");
        assert_eq!(booking.end_time, "2024-05-06T10:30:00");
        assert_eq!(booking.service_id, None);
        assert_eq!(booking.staff_id, None);
        assert_eq!(booking.message.as_deref(), Some("Need a haircut"));
        assert_eq!(booking.status, BOOKING_SCHEDULED);

        let customer = gateway.get_customer(&booking.customer_id).await.unwrap();
        assert_eq!(customer.email.as_deref(), Some("casey@example.com"));
        assert_eq!(customer.user_id.as_deref(), Some(session.user.id.as_str()));

        wizard.book_another(date("2024-05-02"));
        assert_eq!(wizard.step(), WizardStep::SelectTime);
        assert_eq!(wizard.selected_date(), date("2024-05-02"));
        assert!(wizard.confirmation().is_none());
        assert!(wizard.message().is_empty());
    }

    #[tokio::test]
    async fn taken_slot_keeps_details_step_with_conflict_message() {
        let pool = setup_pool().await;
        let gateway = Gateway::new(pool.clone());
        let auth = AuthProvider::new(pool, chrono::Duration::hours(1));
        let session = auth.sign_up("late@example.com", "secret1").await.unwrap();

        let other = gateway
            .create_customer(NewCustomer {
                name: "Early Bird".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        gateway
            .create_booking(NewBooking {
                customer_id: other.id,
                service_id: None,
                staff_id: None,
                start_time: at("2024-05-06T10:00"),
                end_time: at("2024-05-06T10:30"),
                status: BOOKING_SCHEDULED.to_string(),
                notes: None,
                message: None,
            })
            .await
            .unwrap();

        let mut wizard = details_for(at("2024-05-06T10:00"));
        wizard.set_details("555-0101", "Skin fade");
        let err = wizard.submit(&gateway, &session).await.unwrap_err();

        assert_eq!(err, WizardError::SlotTaken);
        assert_eq!(wizard.step(), WizardStep::EnterDetails);
        assert_eq!(wizard.submit_error(), Some(&WizardError::SlotTaken));
        assert!(WizardError::SlotTaken.to_string().contains("just booked"));
        assert_eq!(SLOT_CONFLICT_CODE, "23P01");
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_write() {
        let pool = setup_pool().await;
        let gateway = Gateway::new(pool.clone());
        let auth = AuthProvider::new(pool, chrono::Duration::hours(1));
        let session = auth.sign_up("quiet@example.com", "secret1").await.unwrap();

        let mut wizard = details_for(at("2024-05-06T10:00"));
        wizard.set_details("", "   ");

        assert_eq!(
            wizard.submit(&gateway, &session).await,
            Err(WizardError::MissingMessage)
        );
        assert_eq!(gateway.count_customers().await.unwrap(), 0);
    }
}
