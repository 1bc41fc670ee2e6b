use super::conversation::{Conversation, ConversationKey, ConversationLocks};
use super::delivery::{CourierUpdate, DeliveryOrchestrator};
use super::intent::{Intent, IntentResolver};
use super::lifecycle::{OrderLifecycle, TransitionRequest};
use super::notifications::NotificationDispatcher;
use crate::domain::message::{InboundMessage, Message};
use crate::domain::order::{Order, OrderId};
use crate::domain::party::{Customer, Pharmacy};
use crate::domain::ports::{ChatTransport, CourierClient, Repositories};
use crate::error::{Result, RxError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reply sent when anything unexpected happens while handling a message.
pub const APOLOGY: &str =
    "Sorry, something went wrong while processing your message. Please try again in a moment.";

/// Result of handling one inbound chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundOutcome {
    /// Text for the webhook response. `None` for duplicates.
    pub reply: Option<String>,
    pub intent: Option<Intent>,
}

impl InboundOutcome {
    fn apology() -> Self {
        Self {
            reply: Some(APOLOGY.to_string()),
            intent: None,
        }
    }
}

/// The order lifecycle engine.
///
/// Entry points for the four external triggers: inbound chat messages, chat
/// status callbacks, courier webhooks, and dashboard transitions.
pub struct Engine {
    repos: Repositories,
    lifecycle: Arc<OrderLifecycle>,
    resolver: IntentResolver,
    locks: ConversationLocks,
}

impl Engine {
    pub fn new(
        repos: Repositories,
        transport: Arc<dyn ChatTransport>,
        courier: Option<Arc<dyn CourierClient>>,
        courier_timeout: Duration,
    ) -> Self {
        let notifier = Arc::new(NotificationDispatcher::new(transport, repos.messages.clone()));
        let delivery = Arc::new(DeliveryOrchestrator::new(
            repos.deliveries.clone(),
            courier,
            notifier.clone(),
            courier_timeout,
        ));
        let lifecycle = Arc::new(OrderLifecycle::new(repos.clone(), delivery, notifier));
        let resolver = IntentResolver::new(repos.clone(), lifecycle.clone());
        Self {
            repos,
            lifecycle,
            resolver,
            locks: ConversationLocks::new(),
        }
    }

    pub fn lifecycle(&self) -> &OrderLifecycle {
        &self.lifecycle
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Adds a pharmacy, or updates the one already using its chat number.
    pub async fn register_pharmacy(&self, mut pharmacy: Pharmacy) -> Result<Pharmacy> {
        if pharmacy.chat_number.trim().is_empty() {
            return Err(RxError::Validation(format!(
                "Pharmacy {} has no chat number",
                pharmacy.name
            )));
        }
        if let Some(existing) = self
            .repos
            .pharmacies
            .find_by_chat_number(&pharmacy.chat_number)
            .await?
        {
            pharmacy.id = existing.id;
        }
        self.repos.pharmacies.store(pharmacy.clone()).await?;
        info!(name = %pharmacy.name, chat_number = %pharmacy.chat_number, "pharmacy registered");
        Ok(pharmacy)
    }

    /// Handles an inbound chat message and returns the reply for the webhook.
    ///
    /// Customers never see internal errors. Anything unexpected is logged and
    /// answered with [`APOLOGY`]. Only a malformed payload is returned as an error.
    pub async fn handle_inbound(&self, message: InboundMessage) -> Result<InboundOutcome> {
        if message.from.trim().is_empty() || message.to.trim().is_empty() {
            return Err(RxError::Validation(
                "Inbound message needs a sender and a recipient".to_string(),
            ));
        }

        let _guard = self
            .locks
            .acquire(ConversationKey::new(&message.to, &message.from))
            .await;

        match self.process_inbound(&message).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(
                    from = %message.from,
                    to = %message.to,
                    error = %e,
                    "failed to handle inbound message, apologising"
                );
                Ok(InboundOutcome::apology())
            }
        }
    }

    async fn process_inbound(&self, message: &InboundMessage) -> Result<InboundOutcome> {
        // A recorded message counts as handled once it is attributed to an
        // order. An unattributed one failed last time and is classified again.
        let seen = if message.provider_message_id.is_empty() {
            None
        } else {
            self.repos
                .messages
                .find_by_provider_id(&message.provider_message_id)
                .await?
        };
        if seen.as_ref().is_some_and(|record| record.order_id.is_some()) {
            debug!(provider_message_id = %message.provider_message_id, "duplicate inbound message");
            return Ok(InboundOutcome {
                reply: None,
                intent: None,
            });
        }

        let pharmacy = self
            .repos
            .pharmacies
            .find_by_chat_number(message.to.trim())
            .await?
            .ok_or_else(|| RxError::not_found("pharmacy", message.to.trim()))?;
        let customer = self.upsert_customer(message).await?;

        let message_id = match seen {
            Some(record) => {
                info!(provider_message_id = %message.provider_message_id, "retrying unhandled inbound message");
                record.id
            }
            None => {
                let record = Message::inbound(message);
                let message_id = record.id;
                self.repos.messages.insert(record).await?;
                message_id
            }
        };

        let orders = self
            .repos
            .orders
            .list_for_customer(pharmacy.id, customer.id)
            .await?;
        let conversation = Conversation {
            pharmacy,
            customer,
            orders,
        };

        let (intent, reply) = self
            .resolver
            .resolve(message, message_id, &conversation)
            .await?;
        Ok(InboundOutcome {
            reply: Some(reply),
            intent: Some(intent),
        })
    }

    async fn upsert_customer(&self, message: &InboundMessage) -> Result<Customer> {
        let phone = message.from.trim();
        let profile_name = message
            .profile_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        match self.repos.customers.find_by_phone(phone).await? {
            Some(mut customer) => {
                if let Some(name) = profile_name
                    && customer.name.as_deref() != Some(name)
                {
                    customer.name = Some(name.to_string());
                    self.repos.customers.store(customer.clone()).await?;
                }
                Ok(customer)
            }
            None => {
                let customer = Customer::new(phone, profile_name.map(str::to_string));
                self.repos.customers.store(customer.clone()).await?;
                info!(phone, "new customer");
                Ok(customer)
            }
        }
    }

    /// Records a delivery status reported by the chat transport. No order side effects.
    pub async fn handle_chat_status(&self, provider_message_id: &str, status: &str) -> Result<bool> {
        let found = self
            .repos
            .messages
            .update_delivery_status(provider_message_id, status)
            .await?;
        if !found {
            debug!(provider_message_id, status, "status callback for unknown message");
        }
        Ok(found)
    }

    /// Courier webhook. Always acknowledged: failures are logged, never returned.
    pub async fn handle_courier_webhook(&self, update: CourierUpdate) {
        if let Err(e) = self.lifecycle.handle_courier_update(&update).await {
            warn!(
                provider_order_id = %update.provider_order_id,
                status = %update.status,
                error = %e,
                "courier webhook could not be applied"
            );
        }
    }

    /// Dashboard transition API.
    pub async fn transition(&self, order_id: OrderId, request: TransitionRequest) -> Result<Order> {
        self.lifecycle.transition(order_id, request).await
    }

    /// Most recent order a customer placed at a pharmacy.
    pub async fn latest_order(&self, pharmacy_number: &str, customer_phone: &str) -> Result<Order> {
        let pharmacy = self
            .repos
            .pharmacies
            .find_by_chat_number(pharmacy_number.trim())
            .await?
            .ok_or_else(|| RxError::not_found("pharmacy", pharmacy_number))?;
        let customer = self
            .repos
            .customers
            .find_by_phone(customer_phone.trim())
            .await?
            .ok_or_else(|| RxError::not_found("customer", customer_phone))?;
        self.repos
            .orders
            .list_for_customer(pharmacy.id, customer.id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RxError::not_found("order", customer_phone))
    }
}
