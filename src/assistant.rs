//! Conversational assistant behind `/query/smart`.
//!
//! Most messages are answered by the [`RagEngine`]. A message asking to cancel
//! a booking starts a short dialogue instead: the assistant asks for the phone
//! number if it does not know it, cancels the only active booking of that
//! number, or lists the active bookings and waits for a booking ID. The state
//! of that dialogue lives in memory per session; every message is also stored
//! in the chat history.

use crate::booking::{normalize_phone, Booking, BookingService, BookingStatus, ChatRole};
use crate::error::{BusbotError, Result};
use crate::rag::RagEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A message sent to the assistant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartQuery {
    pub query: String,
    /// Continue an existing conversation. A new id is issued when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// The assistant's reply and the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmartReply {
    pub message: String,
    pub session_id: String,
}

/// What the session is waiting for.
#[derive(Debug, Default)]
enum Pending {
    #[default]
    Nothing,
    Phone,
    BookingId(Vec<Booking>),
}

#[derive(Debug, Default)]
struct Session {
    pending: Pending,
    phone: Option<String>,
}

/// Session-keyed assistant.
#[derive(Default)]
pub struct Assistant {
    sessions: Mutex<HashMap<String, Session>>,
}

impl Assistant {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .lock()
            .map_err(|e| BusbotError::Rag(format!("Failed to acquire session lock: {}", e)))
    }

    /// Answer one message of a conversation.
    #[instrument(skip_all, fields(session = request.session_id.as_deref().unwrap_or("new")))]
    pub async fn respond(
        &self,
        request: SmartQuery,
        bookings: &BookingService,
        engine: &RagEngine,
    ) -> Result<SmartReply> {
        let text = request.query.trim();
        if text.is_empty() {
            return Err(BusbotError::InvalidInput("query must not be empty".to_string()));
        }

        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let request_phone = request
            .phone
            .as_deref()
            .map(normalize_phone)
            .filter(|phone| !phone.is_empty());

        bookings.save_chat_message(&session_id, ChatRole::User, &request.query, request_phone.as_deref())?;

        let scripted = {
            let mut sessions = self.sessions()?;
            let session = sessions.entry(session_id.clone()).or_default();
            cancel_dialogue(session, text, request_phone, bookings)?
                .map(|message| (message, session.phone.clone()))
        };

        let (message, phone) = match scripted {
            Some(reply) => reply,
            None => {
                let answer = engine.ask(text).await?;
                let phone = self
                    .sessions()?
                    .get(&session_id)
                    .and_then(|session| session.phone.clone());
                (answer.text, phone)
            }
        };

        bookings.save_chat_message(&session_id, ChatRole::Assistant, &message, phone.as_deref())?;
        Ok(SmartReply { message, session_id })
    }

    /// Forget a session's dialogue state.
    pub fn end_session(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions()?.remove(session_id).is_some())
    }
}

/// Whether a message asks to cancel a booking rather than asking about cancellation rules.
pub fn is_cancel_request(text: &str) -> bool {
    let text = text.to_lowercase();
    let mentions_cancel = text
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.starts_with("cancel"));
    let about_rules = ["policy", "policies", "rule", "refund", "fee", "charge"]
        .iter()
        .any(|word| text.contains(word));
    mentions_cancel && !about_rules
}

/// Advance the cancellation dialogue. `None` means the message is not part of it.
fn cancel_dialogue(
    session: &mut Session,
    text: &str,
    request_phone: Option<String>,
    bookings: &BookingService,
) -> Result<Option<String>> {
    match std::mem::take(&mut session.pending) {
        Pending::Phone => {
            let phone = normalize_phone(text);
            session.phone = Some(phone.clone());
            return cancel_for_phone(session, &phone, bookings).map(Some);
        }
        Pending::BookingId(candidates) => {
            let wanted = text.trim();
            match candidates
                .iter()
                .position(|b| b.booking_id.eq_ignore_ascii_case(wanted))
            {
                Some(index) => return cancel_one(&candidates[index].booking_id, bookings).map(Some),
                None => {
                    session.pending = Pending::BookingId(candidates);
                    return Ok(Some(format!("Booking ID {} not found. Please check again.", wanted)));
                }
            }
        }
        Pending::Nothing => {}
    }

    if !is_cancel_request(text) {
        return Ok(None);
    }

    if let Some(phone) = request_phone {
        session.phone = Some(phone);
    }
    match session.phone.clone() {
        Some(phone) => cancel_for_phone(session, &phone, bookings).map(Some),
        None => {
            debug!("Asking for the phone number");
            session.pending = Pending::Phone;
            Ok(Some(
                "To cancel your booking, please provide your phone number.".to_string(),
            ))
        }
    }
}

fn cancel_for_phone(session: &mut Session, phone: &str, bookings: &BookingService) -> Result<String> {
    let active: Vec<Booking> = bookings
        .by_phone(phone)?
        .into_iter()
        .filter(|b| b.status == BookingStatus::Active)
        .collect();

    match active.as_slice() {
        [] => Ok(format!("No active bookings found for phone number {}", phone)),
        [only] => cancel_one(&only.booking_id, bookings),
        several => {
            let mut message = String::from("You have multiple active bookings:\n");
            for b in several {
                message.push_str(&format!(
                    "{} → {} on {} (ID: {})\n",
                    b.from_district, b.to_district, b.travel_date, b.booking_id
                ));
            }
            message.push_str("\nPlease provide the Booking ID you want to cancel.");
            session.pending = Pending::BookingId(active);
            Ok(message)
        }
    }
}

fn cancel_one(booking_id: &str, bookings: &BookingService) -> Result<String> {
    if bookings.cancel(booking_id)? {
        info!("Cancelled booking {} from the assistant", booking_id);
        Ok(format!("Booking {} has been cancelled successfully.", booking_id))
    } else {
        Ok(format!("Booking {} is no longer active.", booking_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::NewBooking;
    use crate::catalog::tests::sample_catalog;
    use crate::catalog::CatalogService;
    use crate::embedding::HashingEmbedder;
    use crate::rag::{AnswerGenerator, Generator, Retriever};
    use crate::vector_store::MemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedGenerator;

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok("from the model".to_string())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    fn engine() -> RagEngine {
        let retriever = Retriever::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashingEmbedder::new(64)),
        );
        RagEngine::new(retriever, AnswerGenerator::new(Arc::new(FixedGenerator)))
    }

    fn book(service: &BookingService, to: &str, point: &str, provider: &str) -> Booking {
        let catalog = CatalogService::new(sample_catalog());
        service
            .create(
                &catalog,
                NewBooking {
                    name: "Rahim Uddin".to_string(),
                    phone: "01712345678".to_string(),
                    bus_provider: provider.to_string(),
                    from_district: "Dhaka".to_string(),
                    to_district: to.to_string(),
                    dropping_point: point.to_string(),
                    travel_date: "2026-11-02".to_string(),
                    num_passengers: 1,
                },
            )
            .unwrap()
    }

    fn query(text: &str, session: Option<&str>) -> SmartQuery {
        SmartQuery {
            query: text.to_string(),
            session_id: session.map(str::to_string),
            phone: None,
        }
    }

    #[test]
    fn test_cancel_request_detection() {
        assert!(is_cancel_request("Please cancel my ticket"));
        assert!(is_cancel_request("I want a cancellation"));
        assert!(!is_cancel_request("What is the cancellation policy of Hanif?"));
        assert!(!is_cancel_request("Buses from Dhaka to Sylhet?"));
    }

    #[tokio::test]
    async fn test_asks_for_phone_then_cancels_single_booking() {
        let bookings = BookingService::in_memory().unwrap();
        let booking = book(&bookings, "Rajshahi", "Shaheb Bazar", "Hanif");
        let assistant = Assistant::new();
        let engine = engine();

        let first = assistant
            .respond(query("I want to cancel my booking", None), &bookings, &engine)
            .await
            .unwrap();
        assert!(first.message.contains("provide your phone number"));

        let second = assistant
            .respond(query("+8801712345678", Some(&first.session_id)), &bookings, &engine)
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(
            second.message,
            format!("Booking {} has been cancelled successfully.", booking.booking_id)
        );
        assert_eq!(
            bookings.get(&booking.booking_id).unwrap().unwrap().status,
            BookingStatus::Cancelled
        );

        let history = bookings.chat_history(&first.session_id, 10).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].phone.as_deref(), Some("01712345678"));
    }

    #[tokio::test]
    async fn test_several_bookings_wait_for_an_id() {
        let bookings = BookingService::in_memory().unwrap();
        let rajshahi = book(&bookings, "Rajshahi", "Shaheb Bazar", "Hanif");
        let sylhet = book(&bookings, "Sylhet", "Kadamtali", "Ena");
        let assistant = Assistant::new();
        let engine = engine();

        let request = SmartQuery {
            phone: Some("01712345678".to_string()),
            ..query("cancel my ticket", Some("s1"))
        };
        let listing = assistant.respond(request, &bookings, &engine).await.unwrap();
        assert!(listing.message.contains(&format!("Dhaka → Sylhet on 2026-11-02 (ID: {})", sylhet.booking_id)));
        assert!(listing.message.contains(&rajshahi.booking_id));

        let wrong = assistant
            .respond(query("BK99999", Some("s1")), &bookings, &engine)
            .await
            .unwrap();
        assert_eq!(wrong.message, "Booking ID BK99999 not found. Please check again.");

        let done = assistant
            .respond(query(&sylhet.booking_id, Some("s1")), &bookings, &engine)
            .await
            .unwrap();
        assert!(done.message.contains("cancelled successfully"));
        assert_eq!(
            bookings.get(&sylhet.booking_id).unwrap().unwrap().status,
            BookingStatus::Cancelled
        );
        assert_eq!(
            bookings.get(&rajshahi.booking_id).unwrap().unwrap().status,
            BookingStatus::Active
        );
    }

    #[tokio::test]
    async fn test_no_active_bookings() {
        let bookings = BookingService::in_memory().unwrap();
        let assistant = Assistant::new();

        let request = SmartQuery {
            phone: Some("01800000000".to_string()),
            ..query("cancel", None)
        };
        let reply = assistant.respond(request, &bookings, &engine()).await.unwrap();
        assert_eq!(reply.message, "No active bookings found for phone number 01800000000");
    }

    #[tokio::test]
    async fn test_other_questions_go_to_the_engine() {
        let bookings = BookingService::in_memory().unwrap();
        let assistant = Assistant::new();

        // Empty index: the engine answers with the canned reply, not an error.
        let reply = assistant
            .respond(query("Which buses go to Sylhet?", Some("s2")), &bookings, &engine())
            .await
            .unwrap();
        assert!(!reply.message.is_empty());
        assert_eq!(bookings.chat_history("s2", 10).unwrap().len(), 2);

        let err = assistant
            .respond(query("   ", Some("s2")), &bookings, &engine())
            .await
            .unwrap_err();
        assert!(matches!(err, BusbotError::InvalidInput(_)));
    }
}
