use crate::domain::delivery::Delivery;
use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One output row per order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
    pub order_number: String,
    pub customer: String,
    pub status: String,
    pub items: String,
    pub requires_rx: bool,
    pub payment_method: String,
    pub total: String,
    pub delivery_address: String,
    pub delivery_status: String,
}

impl OrderSummary {
    pub fn new(order: &Order, customer_phone: &str, delivery: Option<&Delivery>) -> Self {
        Self {
            order_number: order.order_number.to_string(),
            customer: customer_phone.to_string(),
            status: order.status.to_string(),
            items: order.items_summary(),
            requires_rx: order.requires_rx,
            payment_method: order
                .payment_method
                .map(|m| m.to_string())
                .unwrap_or_default(),
            total: order
                .total_amount
                .map(|a| a.to_string())
                .unwrap_or_default(),
            delivery_address: order.delivery_address.clone().unwrap_or_default(),
            delivery_status: delivery.map(|d| d.status.to_string()).unwrap_or_default(),
        }
    }
}

pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header and one row per summary, then flushes.
    pub fn write_orders(&mut self, orders: impl IntoIterator<Item = OrderSummary>) -> Result<()> {
        let mut wrote_any = false;
        for order in orders {
            self.writer.serialize(order)?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "order_number",
                "customer",
                "status",
                "items",
                "requires_rx",
                "payment_method",
                "total",
                "delivery_address",
                "delivery_status",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::extractor;
    use crate::domain::order::{Amount, OrderStatus, PaymentMethod};
    use crate::domain::party::{CustomerId, PharmacyId};
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_rows() {
        let extraction = extractor::extract("Crocin x2, Insulin x1");
        let mut order = Order::new(
            "ABC234".parse().unwrap(),
            PharmacyId::new(),
            CustomerId::new(),
            "Crocin x2, Insulin x1",
            extraction.items,
            extraction.requires_rx,
        );
        order.status = OrderStatus::Confirmed;
        order.payment_method = Some(PaymentMethod::Cod);
        order.total_amount = Some(Amount::new(dec!(120.00)).unwrap());

        let mut out = Vec::new();
        OrderWriter::new(&mut out)
            .write_orders([OrderSummary::new(&order, "+919999999999", None)])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "order_number,customer,status,items,requires_rx,payment_method,total,delivery_address,delivery_status"
        );
        assert_eq!(
            lines.next().unwrap(),
            "ABC234,+919999999999,confirmed,Crocin x2; Insulin x1,true,cod,120,,"
        );
    }

    #[test]
    fn test_empty_output_still_has_header() {
        let mut out = Vec::new();
        OrderWriter::new(&mut out).write_orders([]).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("order_number,customer,status"));
    }
}
