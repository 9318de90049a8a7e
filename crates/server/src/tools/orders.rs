//! Order and after-sales tools.
//!
//! These return fixed-shape placeholder data until the order backend is
//! exposed to this server. Only the argument validation and scope gating are
//! real.

use async_trait::async_trait;
use chrono::{Days, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{Tool, ToolContext, ToolError, parse_args};

const AVAILABLE_STOCK: u32 = 50;
const MAX_ORDER_QUANTITY: u32 = 100;
const UNIT_PRICE: f64 = 299.99;
const CURRENCY: &str = "USD";

/// Accept ids sent either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a non-empty id, got {other}"
        ))),
    }
}

/// Short uppercase reference such as `ORD-1A2B3C4D`.
fn reference(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("{prefix}-{}", id.get(..8).unwrap_or(&id))
}

fn date_in(days: u64) -> String {
    Utc::now()
        .date_naive()
        .checked_add_days(Days::new(days))
        .unwrap_or_else(|| Utc::now().date_naive())
        .to_string()
}

fn require_quantity(quantity: u32) -> Result<u32, ToolError> {
    if quantity == 0 {
        return Err(ToolError::InvalidArguments(
            "quantity must be at least 1".to_string(),
        ));
    }
    Ok(quantity)
}

// =============================================================================
// check_purchase_feasibility
// =============================================================================

#[derive(Debug, Deserialize)]
struct FeasibilityArgs {
    #[serde(deserialize_with = "string_or_number")]
    product_id: String,
    quantity: u32,
}

pub struct CheckPurchaseFeasibility;

#[async_trait]
impl Tool for CheckPurchaseFeasibility {
    fn name(&self) -> &'static str {
        "check_purchase_feasibility"
    }

    fn description(&self) -> &'static str {
        "Check whether a product can be purchased in the requested quantity."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string" },
                "quantity": { "type": "integer", "minimum": 1 }
            },
            "required": ["product_id", "quantity"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let args: FeasibilityArgs = parse_args(args)?;
        let quantity = require_quantity(args.quantity)?;
        let feasible = quantity <= AVAILABLE_STOCK;
        let message = if feasible {
            "Purchase is feasible".to_string()
        } else {
            format!("Only {AVAILABLE_STOCK} units available")
        };

        Ok(json!({
            "status": "success",
            "product_id": args.product_id,
            "requested_quantity": quantity,
            "available_stock": AVAILABLE_STOCK,
            "is_feasible": feasible,
            "can_purchase": feasible,
            "restrictions": {
                "min_order_quantity": 1,
                "max_order_quantity": MAX_ORDER_QUANTITY,
                "requires_age_verification": false,
                "ships_to_region": true
            },
            "message": message,
        }))
    }
}

// =============================================================================
// place_order
// =============================================================================

#[derive(Debug, Deserialize)]
struct PlaceOrderArgs {
    #[serde(deserialize_with = "string_or_number")]
    product_id: String,
    quantity: u32,
    #[serde(default)]
    customer_info: Map<String, Value>,
}

pub struct PlaceOrder;

#[async_trait]
impl Tool for PlaceOrder {
    fn name(&self) -> &'static str {
        "place_order"
    }

    fn description(&self) -> &'static str {
        "Place an order for a product. customer_info may include name, email, phone, \
         shipping_address and payment_method."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string" },
                "quantity": { "type": "integer", "minimum": 1 },
                "customer_info": { "type": "object" }
            },
            "required": ["product_id", "quantity", "customer_info"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let args: PlaceOrderArgs = parse_args(args)?;
        let quantity = require_quantity(args.quantity)?;
        let customer = |key: &str, fallback: &str| {
            args.customer_info
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };

        Ok(json!({
            "status": "success",
            "order_id": reference("ORD"),
            "product_id": args.product_id,
            "quantity": quantity,
            "unit_price": UNIT_PRICE,
            "total_price": UNIT_PRICE * f64::from(quantity),
            "currency": CURRENCY,
            "order_status": "confirmed",
            "customer": {
                "name": customer("name", "Customer"),
                "email": customer("email", "customer@example.com")
            },
            "estimated_delivery": date_in(5),
            "tracking_number": reference("TRK"),
            "message": "Order placed successfully",
        }))
    }
}

// =============================================================================
// check_order
// =============================================================================

#[derive(Debug, Deserialize)]
struct OrderRef {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
}

pub struct CheckOrder;

#[async_trait]
impl Tool for CheckOrder {
    fn name(&self) -> &'static str {
        "check_order"
    }

    fn description(&self) -> &'static str {
        "Check the status of an existing order."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "order_id": { "type": "string" } },
            "required": ["order_id"]
        })
    }

    fn required_scope(&self) -> Option<&'static str> {
        Some("read_orders")
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let OrderRef { order_id } = parse_args(args)?;

        Ok(json!({
            "status": "success",
            "order_id": order_id,
            "order_status": "shipped",
            "order_date": date_in(0),
            "items": [{
                "product_id": "PROD-001",
                "product_name": "Premium Laptop - Model A",
                "quantity": 1,
                "unit_price": UNIT_PRICE,
                "subtotal": UNIT_PRICE
            }],
            "total_price": UNIT_PRICE,
            "currency": CURRENCY,
            "shipping": {
                "status": "in_transit",
                "tracking_number": "TRK-123456",
                "estimated_delivery": date_in(5),
                "carrier": "Standard Shipping"
            },
            "payment": {
                "method": "credit_card",
                "status": "paid",
                "last_four_digits": "1234"
            },
            "customer": {
                "name": "John Doe",
                "email": "john@example.com"
            },
        }))
    }
}

// =============================================================================
// modify_order
// =============================================================================

#[derive(Debug, Deserialize)]
struct ModifyOrderArgs {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
    modifications: Map<String, Value>,
}

pub struct ModifyOrder;

#[async_trait]
impl Tool for ModifyOrder {
    fn name(&self) -> &'static str {
        "modify_order"
    }

    fn description(&self) -> &'static str {
        "Modify an existing order, e.g. quantity, shipping_address or delivery_date."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order_id": { "type": "string" },
                "modifications": { "type": "object" }
            },
            "required": ["order_id", "modifications"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let args: ModifyOrderArgs = parse_args(args)?;
        if args.modifications.is_empty() {
            return Err(ToolError::InvalidArguments(
                "modifications must not be empty".to_string(),
            ));
        }
        let delivery = args
            .modifications
            .get("delivery_date")
            .and_then(Value::as_str)
            .map_or_else(|| date_in(7), String::from);

        Ok(json!({
            "status": "success",
            "order_id": args.order_id,
            "modification_status": "updated",
            "modifications_applied": args.modifications,
            "message": "Order modified successfully",
            "updated_order": {
                "order_id": args.order_id,
                "order_status": "updated",
                "total_price": 349.99,
                "currency": CURRENCY,
                "estimated_delivery": delivery
            },
            "note": "Some modifications may affect delivery time or total cost",
        }))
    }
}

// =============================================================================
// cancel_order
// =============================================================================

#[derive(Debug, Deserialize)]
struct CancelOrderArgs {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
    reason: String,
}

pub struct CancelOrder;

#[async_trait]
impl Tool for CancelOrder {
    fn name(&self) -> &'static str {
        "cancel_order"
    }

    fn description(&self) -> &'static str {
        "Cancel an existing order and start the refund."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order_id": { "type": "string" },
                "reason": { "type": "string" }
            },
            "required": ["order_id", "reason"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let args: CancelOrderArgs = parse_args(args)?;

        Ok(json!({
            "status": "success",
            "order_id": args.order_id,
            "cancellation_status": "cancelled",
            "reason": args.reason,
            "refund": {
                "amount": UNIT_PRICE,
                "currency": CURRENCY,
                "method": "original_payment_method",
                "estimated_processing_time": "3-5 business days"
            },
            "cancelled_at": Utc::now().to_rfc3339(),
            "message": "Order cancelled successfully. Refund will be processed within 3-5 business days.",
        }))
    }
}

// =============================================================================
// handle_after_sales
// =============================================================================

#[derive(Debug, Deserialize)]
struct AfterSalesArgs {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
    issue_type: String,
    description: String,
}

pub struct HandleAfterSales;

#[async_trait]
impl Tool for HandleAfterSales {
    fn name(&self) -> &'static str {
        "handle_after_sales"
    }

    fn description(&self) -> &'static str {
        "Open an after-sales ticket (refund, exchange, repair or complaint) for an order."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order_id": { "type": "string" },
                "issue_type": {
                    "type": "string",
                    "description": "e.g. refund, exchange, repair, complaint"
                },
                "description": { "type": "string" }
            },
            "required": ["order_id", "issue_type", "description"]
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let args: AfterSalesArgs = parse_args(args)?;
        let ticket_id = reference("TICKET");

        Ok(json!({
            "status": "success",
            "ticket_id": ticket_id,
            "order_id": args.order_id,
            "issue_type": args.issue_type,
            "description": args.description,
            "ticket_status": "open",
            "priority": "medium",
            "created_at": Utc::now().to_rfc3339(),
            "assigned_to": "Support Team",
            "estimated_resolution": "2-3 business days",
            "next_steps": [
                "Our support team will review your request",
                "You will receive an email update within 24 hours",
                "Please keep your order ID handy for reference"
            ],
            "message": format!(
                "After-sales ticket {ticket_id} created successfully. Our team will contact you shortly."
            ),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tools::tests::context;

    async fn call(tool: &dyn Tool, args: Value) -> Result<Value, ToolError> {
        tool.call(&context("http://127.0.0.1:1", None), args).await
    }

    #[tokio::test]
    async fn test_feasibility_within_stock() {
        let result = call(
            &CheckPurchaseFeasibility,
            json!({"product_id": 123, "quantity": 3}),
        )
        .await
        .unwrap();
        assert_eq!(result["product_id"], "123");
        assert_eq!(result["is_feasible"], true);
        assert_eq!(result["message"], "Purchase is feasible");
    }

    #[tokio::test]
    async fn test_feasibility_over_stock() {
        let result = call(
            &CheckPurchaseFeasibility,
            json!({"product_id": "P1", "quantity": 80}),
        )
        .await
        .unwrap();
        assert_eq!(result["can_purchase"], false);
        assert_eq!(result["message"], "Only 50 units available");
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let err = call(&PlaceOrder, json!({"product_id": "P1", "quantity": 0}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_place_order_totals_and_customer() {
        let result = call(
            &PlaceOrder,
            json!({
                "product_id": "P1",
                "quantity": 2,
                "customer_info": {"name": "Mei", "email": "mei@example.tw"}
            }),
        )
        .await
        .unwrap();
        assert!(result["order_id"].as_str().unwrap().starts_with("ORD-"));
        assert!((result["total_price"].as_f64().unwrap() - 599.98).abs() < 1e-9);
        assert_eq!(result["customer"]["name"], "Mei");
        assert_eq!(result["order_status"], "confirmed");
    }

    #[tokio::test]
    async fn test_modify_order_uses_requested_delivery_date() {
        let result = call(
            &ModifyOrder,
            json!({"order_id": "ORD-1", "modifications": {"delivery_date": "2026-12-24"}}),
        )
        .await
        .unwrap();
        assert_eq!(result["updated_order"]["estimated_delivery"], "2026-12-24");
        assert_eq!(
            result["modifications_applied"]["delivery_date"],
            "2026-12-24"
        );
    }

    #[tokio::test]
    async fn test_modify_order_requires_changes() {
        let err = call(&ModifyOrder, json!({"order_id": "ORD-1", "modifications": {}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_cancel_order_echoes_reason() {
        let result = call(
            &CancelOrder,
            json!({"order_id": "ORD-1", "reason": "changed my mind"}),
        )
        .await
        .unwrap();
        assert_eq!(result["cancellation_status"], "cancelled");
        assert_eq!(result["reason"], "changed my mind");
    }

    #[tokio::test]
    async fn test_after_sales_ticket_in_message() {
        let result = call(
            &HandleAfterSales,
            json!({"order_id": "ORD-1", "issue_type": "repair", "description": "cracked"}),
        )
        .await
        .unwrap();
        let ticket = result["ticket_id"].as_str().unwrap();
        assert!(ticket.starts_with("TICKET-"));
        assert!(result["message"].as_str().unwrap().contains(ticket));
    }

    #[tokio::test]
    async fn test_blank_order_id_rejected() {
        let err = call(&CheckOrder, json!({"order_id": "  "})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn test_reference_format() {
        let id = reference("ORD");
        assert_eq!(id.len(), 12);
        assert!(id.get(4..).unwrap().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
