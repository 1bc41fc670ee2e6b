use super::csv::event_reader::ReplayEvent;
use super::csv::order_writer::OrderSummary;
use crate::application::delivery::CourierUpdate;
use crate::application::engine::Engine;
use crate::error::{Result, RxError};
use tracing::info;

/// Feeds one replay event into the engine.
pub async fn apply(engine: &Engine, event: ReplayEvent) -> Result<()> {
    match event {
        ReplayEvent::Message(message) => {
            let from = message.from.clone();
            let outcome = engine.handle_inbound(message).await?;
            if let Some(reply) = outcome.reply {
                info!(to = %from, reply = %reply, "reply");
            }
        }
        ReplayEvent::Transition {
            pharmacy,
            customer,
            request,
        } => {
            let order = engine.latest_order(&pharmacy, &customer).await?;
            engine.transition(order.id, request).await?;
        }
        ReplayEvent::Courier {
            pharmacy,
            customer,
            status,
            courier_name,
            courier_phone,
        } => {
            let order = engine.latest_order(&pharmacy, &customer).await?;
            let provider_order_id = engine
                .lifecycle()
                .delivery(order.id)
                .await?
                .and_then(|d| d.provider_order_id)
                .ok_or_else(|| {
                    RxError::Validation(format!(
                        "Order {} has no courier booking",
                        order.order_number
                    ))
                })?;
            engine
                .handle_courier_webhook(CourierUpdate {
                    provider_order_id,
                    status,
                    courier_name,
                    courier_phone,
                })
                .await;
        }
        ReplayEvent::ChatStatus { message_id, status } => {
            engine.handle_chat_status(&message_id, &status).await?;
        }
    }
    Ok(())
}

/// Summary rows for every order, oldest first.
pub async fn summaries(engine: &Engine) -> Result<Vec<OrderSummary>> {
    let repos = engine.repositories();
    let mut rows = Vec::new();
    for order in repos.orders.list_all().await? {
        let phone = repos
            .customers
            .get(order.customer_id)
            .await?
            .map(|c| c.phone)
            .unwrap_or_default();
        let delivery = repos.deliveries.get_by_order(order.id).await?;
        rows.push(OrderSummary::new(&order, &phone, delivery.as_ref()));
    }
    Ok(rows)
}
