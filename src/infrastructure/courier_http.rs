//! HTTP client for a same-day courier API.
//!
//! Requests and responses follow the provider's JSON envelope: every response
//! carries `is_successful`, and failures list `errors` plus per-field
//! `parameter_errors`, which map onto [`CourierError::fields`].

use crate::domain::ports::{
    CourierBooking, CourierClient, CourierError, CourierOrderStatus, CourierPoint,
};
use crate::error::{Result, RxError};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const AUTH_HEADER: &str = "X-DV-Auth-Token";
const MATTER: &str = "Medicines";

pub struct HttpCourierClient {
    http: Client,
    base_url: String,
    api_token: String,
}

impl HttpCourierClient {
    pub fn new(base_url: &str, api_token: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RxError::Internal(Box::new(e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, CourierError> {
        let response = self
            .http
            .post(format!("{}/{path}", self.base_url))
            .header(AUTH_HEADER, &self.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| CourierError::new(format!("courier request failed: {e}")))?;
        decode(response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<T, CourierError> {
        let response = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .header(AUTH_HEADER, &self.api_token)
            .query(query)
            .send()
            .await
            .map_err(|e| CourierError::new(format!("courier request failed: {e}")))?;
        decode(response).await
    }
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    matter: &'static str,
    points: [RequestPoint<'a>; 2],
}

impl<'a> OrderRequest<'a> {
    fn new(pickup: &'a CourierPoint, dropoff: &'a CourierPoint, reference: Option<&'a str>) -> Self {
        Self {
            matter: MATTER,
            points: [
                RequestPoint::new(pickup, None),
                RequestPoint::new(dropoff, reference),
            ],
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestPoint<'a> {
    address: &'a str,
    contact_person: ContactPerson<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_order_id: Option<&'a str>,
}

impl<'a> RequestPoint<'a> {
    fn new(point: &'a CourierPoint, client_order_id: Option<&'a str>) -> Self {
        Self {
            address: &point.address,
            contact_person: ContactPerson {
                phone: &point.phone,
                name: point.contact.as_deref(),
            },
            client_order_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct ContactPerson<'a> {
    phone: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    order_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: RemoteOrder,
}

#[derive(Debug, Deserialize)]
struct OrdersEnvelope {
    #[serde(default)]
    orders: Vec<RemoteOrder>,
}

#[derive(Debug, Deserialize)]
struct RemoteOrder {
    #[serde(default)]
    order_id: Option<Value>,
    #[serde(default)]
    order_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_amount: Option<Decimal>,
    #[serde(default)]
    points: Vec<RemotePoint>,
    #[serde(default)]
    courier: Option<RemoteCourier>,
}

#[derive(Debug, Deserialize)]
struct RemotePoint {
    #[serde(default)]
    tracking_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteCourier {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    surname: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Failure {
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    parameter_errors: Option<Value>,
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<T, CourierError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| CourierError::new(format!("courier response unreadable: {e}")))?;
    let body: Value = serde_json::from_str(&text).map_err(|_| {
        CourierError::new(format!(
            "courier returned HTTP {status}: {}",
            text.chars().take(200).collect::<String>()
        ))
    })?;

    let successful = body
        .get("is_successful")
        .and_then(Value::as_bool)
        .unwrap_or(status.is_success());
    if !status.is_success() || !successful {
        return Err(failure(status, body));
    }
    serde_json::from_value(body)
        .map_err(|e| CourierError::new(format!("unexpected courier response: {e}")))
}

fn failure(status: reqwest::StatusCode, body: Value) -> CourierError {
    let parsed: Failure = serde_json::from_value(body).unwrap_or(Failure {
        errors: Vec::new(),
        parameter_errors: None,
    });
    let message = if parsed.errors.is_empty() {
        format!("courier returned HTTP {status}")
    } else {
        parsed.errors.join(", ")
    };
    let mut fields = BTreeMap::new();
    if let Some(params) = &parsed.parameter_errors {
        flatten_parameter_errors("", params, &mut fields);
    }
    CourierError { message, fields }
}

/// Parameter errors nest like the request (`points.1.address`); flatten them to dotted keys.
fn flatten_parameter_errors(prefix: &str, value: &Value, out: &mut BTreeMap<String, Vec<String>>) {
    let key = |child: &str| {
        if prefix.is_empty() {
            child.to_string()
        } else {
            format!("{prefix}.{child}")
        }
    };
    match value {
        Value::Object(map) => {
            for (name, child) in map {
                flatten_parameter_errors(&key(name), child, out);
            }
        }
        Value::Array(items) if items.iter().all(Value::is_string) => {
            let errors = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            out.insert(prefix.to_string(), errors);
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                if !child.is_null() {
                    flatten_parameter_errors(&key(&i.to_string()), child, out);
                }
            }
        }
        Value::String(s) => {
            out.entry(prefix.to_string()).or_default().push(s.clone());
        }
        _ => {}
    }
}

fn id_string(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

impl RemoteOrder {
    fn courier_status(self) -> CourierOrderStatus {
        let (courier_name, courier_phone) = match self.courier {
            Some(courier) => {
                let name = match (courier.name, courier.surname) {
                    (Some(name), Some(surname)) => Some(format!("{name} {surname}")),
                    (name, None) => name,
                    (None, surname) => surname,
                };
                (name, courier.phone)
            }
            None => (None, None),
        };
        CourierOrderStatus {
            status: self.status.unwrap_or_default(),
            courier_name,
            courier_phone,
        }
    }
}

#[async_trait]
impl CourierClient for HttpCourierClient {
    async fn calculate_price(
        &self,
        pickup: &CourierPoint,
        dropoff: &CourierPoint,
    ) -> std::result::Result<Decimal, CourierError> {
        let envelope: OrderEnvelope = self
            .post("calculate-order", &OrderRequest::new(pickup, dropoff, None))
            .await?;
        envelope
            .order
            .payment_amount
            .ok_or_else(|| CourierError::new("courier quote carried no price"))
    }

    async fn create_order(
        &self,
        pickup: &CourierPoint,
        dropoff: &CourierPoint,
        reference: &str,
    ) -> std::result::Result<CourierBooking, CourierError> {
        let envelope: OrderEnvelope = self
            .post("create-order", &OrderRequest::new(pickup, dropoff, Some(reference)))
            .await?;
        let order = envelope.order;
        let provider_order_id = id_string(&order.order_id)
            .ok_or_else(|| CourierError::new("courier booking carried no order id"))?;
        Ok(CourierBooking {
            provider_order_id,
            provider_order_number: order.order_name,
            tracking_url: order.points.iter().rev().find_map(|p| p.tracking_url.clone()),
            price: order.payment_amount,
            status: order.status.unwrap_or_default(),
        })
    }

    async fn cancel_order(&self, provider_order_id: &str) -> std::result::Result<(), CourierError> {
        let _: Value = self
            .post(
                "cancel-order",
                &CancelRequest {
                    order_id: provider_order_id,
                },
            )
            .await?;
        Ok(())
    }

    async fn get_order(
        &self,
        provider_order_id: &str,
    ) -> std::result::Result<CourierOrderStatus, CourierError> {
        let envelope: OrdersEnvelope = self
            .get("orders", &[("order_id", provider_order_id)])
            .await?;
        envelope
            .orders
            .into_iter()
            .next()
            .map(RemoteOrder::courier_status)
            .ok_or_else(|| CourierError::new(format!("courier order {provider_order_id} not found")))
    }
}
