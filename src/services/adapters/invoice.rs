// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use validator::Validate;

use super::{number_at, put_text, text_at};
use crate::error::AppError;
use crate::models::{Invoice, InvoiceLine, InvoiceStatus, SyncedRecord};
use crate::services::qbo::RemoteEntity;
use crate::services::sync::{EntityAdapter, EntityLink};

const DATE_FORMAT: &str = "%Y-%m-%d";

const LINKS: &[EntityLink] = &[EntityLink {
    remote_field: "customer_remote_id",
    entity: "customer",
    local_field: "customer_local_id",
}];

/// Maps local invoices to QuickBooks `Invoice` entities.
pub struct InvoiceAdapter;

impl EntityAdapter for InvoiceAdapter {
    fn entity(&self) -> &'static str {
        "invoice"
    }

    fn remote_type_name(&self) -> &'static str {
        "Invoice"
    }

    fn to_remote_payload(&self, record: &SyncedRecord) -> Result<Map<String, Value>, AppError> {
        let invoice: Invoice = record.typed()?;
        invoice
            .validate()
            .map_err(|e| AppError::BadRequest(format!("Invalid invoice: {}", e)))?;

        let customer_ref = invoice
            .customer_remote_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(
                    "Invoice customer must be synced before the invoice".to_string(),
                )
            })?;

        let mut payload = Map::new();
        payload.insert("CustomerRef".to_string(), json!({ "value": customer_ref }));
        put_text(&mut payload, "DocNumber", invoice.invoice_number.as_deref());
        if let Some(date) = invoice.txn_date {
            payload.insert("TxnDate".to_string(), json!(date.format(DATE_FORMAT).to_string()));
        }
        if let Some(date) = invoice.due_date {
            payload.insert("DueDate".to_string(), json!(date.format(DATE_FORMAT).to_string()));
        }
        put_text(&mut payload, "PrivateNote", invoice.private_note.as_deref());
        if let Some(memo) = invoice.customer_memo.as_deref().filter(|m| !m.is_empty()) {
            payload.insert("CustomerMemo".to_string(), json!({ "value": memo }));
        }

        let lines: Vec<Value> = invoice
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| line_to_remote(idx + 1, line))
            .collect();
        payload.insert("Line".to_string(), Value::Array(lines));

        Ok(payload)
    }

    fn from_remote_payload(&self, remote: &RemoteEntity) -> Result<Map<String, Value>, AppError> {
        let f = &remote.fields;
        let date = |key: &str| {
            text_at(f, key).and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok())
        };

        let lines: Vec<InvoiceLine> = f
            .get("Line")
            .and_then(Value::as_array)
            .map(|lines| lines.iter().filter_map(line_from_remote).collect())
            .unwrap_or_default();

        let total_amount = number_at(f, "/TotalAmt").unwrap_or_default();
        let tax_amount = number_at(f, "/TxnTaxDetail/TotalTax").unwrap_or_default();
        let invoice = Invoice {
            customer_remote_id: text_at(f, "/CustomerRef/value"),
            customer_local_id: None,
            invoice_number: text_at(f, "/DocNumber"),
            txn_date: date("/TxnDate"),
            due_date: date("/DueDate"),
            subtotal: lines.iter().map(|l| l.amount).sum(),
            tax_amount,
            total_amount,
            balance: number_at(f, "/Balance").unwrap_or(total_amount),
            status: InvoiceStatus::from_email_status(text_at(f, "/EmailStatus").as_deref()),
            private_note: text_at(f, "/PrivateNote"),
            customer_memo: text_at(f, "/CustomerMemo/value"),
            lines,
        };

        let mut fields = match serde_json::to_value(invoice) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(AppError::BadRequest("Invoice is not an object".to_string())),
            Err(e) => return Err(AppError::Internal(e.into())),
        };
        // Filled in by link resolution; an unresolved link keeps the local value.
        fields.remove("customer_local_id");
        Ok(fields)
    }

    fn links(&self) -> &'static [EntityLink] {
        LINKS
    }
}

fn line_to_remote(line_num: usize, line: &InvoiceLine) -> Value {
    let mut detail = Map::new();
    detail.insert("Qty".to_string(), json!(line.quantity));
    detail.insert("UnitPrice".to_string(), json!(line.unit_price));
    if let Some(item) = line.item_remote_id.as_deref() {
        detail.insert("ItemRef".to_string(), json!({ "value": item }));
    }

    let mut out = Map::new();
    out.insert("LineNum".to_string(), json!(line_num));
    out.insert("Amount".to_string(), json!(line.amount));
    out.insert("DetailType".to_string(), json!("SalesItemLineDetail"));
    put_text(&mut out, "Description", line.description.as_deref());
    out.insert("SalesItemLineDetail".to_string(), Value::Object(detail));
    Value::Object(out)
}

/// Only sales lines; subtotal and discount lines are derived remotely.
fn line_from_remote(line: &Value) -> Option<InvoiceLine> {
    let line = line.as_object()?;
    if text_at(line, "/DetailType").as_deref() != Some("SalesItemLineDetail") {
        return None;
    }
    Some(InvoiceLine {
        description: text_at(line, "/Description"),
        amount: number_at(line, "/Amount").unwrap_or_default(),
        quantity: number_at(line, "/SalesItemLineDetail/Qty").unwrap_or(1.0),
        unit_price: number_at(line, "/SalesItemLineDetail/UnitPrice").unwrap_or_default(),
        item_remote_id: text_at(line, "/SalesItemLineDetail/ItemRef/value"),
    })
}
