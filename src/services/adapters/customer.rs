// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use serde_json::{json, Map, Value};
use validator::Validate;

use super::{put_text, text_at};
use crate::error::AppError;
use crate::models::{Address, Customer, SyncedRecord};
use crate::services::qbo::RemoteEntity;
use crate::services::sync::EntityAdapter;

/// Maps local customers to QuickBooks `Customer` entities.
pub struct CustomerAdapter;

impl EntityAdapter for CustomerAdapter {
    fn entity(&self) -> &'static str {
        "customer"
    }

    fn remote_type_name(&self) -> &'static str {
        "Customer"
    }

    fn to_remote_payload(&self, record: &SyncedRecord) -> Result<Map<String, Value>, AppError> {
        let customer: Customer = record.typed()?;
        customer
            .validate()
            .map_err(|e| AppError::BadRequest(format!("Invalid customer: {}", e)))?;

        let mut payload = Map::new();
        payload.insert("DisplayName".to_string(), json!(customer.name.trim()));
        put_text(&mut payload, "CompanyName", customer.company_name.as_deref());
        if let Some(email) = customer.email.as_deref().filter(|e| !e.is_empty()) {
            payload.insert("PrimaryEmailAddr".to_string(), json!({ "Address": email }));
        }
        if let Some(phone) = customer.phone.as_deref().filter(|p| !p.is_empty()) {
            payload.insert("PrimaryPhone".to_string(), json!({ "FreeFormNumber": phone }));
        }
        if let Some(addr) = customer.billing_address.as_ref().filter(|a| a.is_present()) {
            payload.insert("BillAddr".to_string(), Value::Object(address_to_remote(addr)));
        }
        if let Some(addr) = customer.shipping_address.as_ref().filter(|a| a.is_present()) {
            payload.insert("ShipAddr".to_string(), Value::Object(address_to_remote(addr)));
        }
        Ok(payload)
    }

    fn from_remote_payload(&self, remote: &RemoteEntity) -> Result<Map<String, Value>, AppError> {
        let f = &remote.fields;
        let customer = Customer {
            name: text_at(f, "/DisplayName").unwrap_or_default(),
            company_name: text_at(f, "/CompanyName"),
            email: text_at(f, "/PrimaryEmailAddr/Address"),
            phone: text_at(f, "/PrimaryPhone/FreeFormNumber"),
            billing_address: address_from_remote(f, "BillAddr"),
            shipping_address: address_from_remote(f, "ShipAddr"),
        };

        match serde_json::to_value(customer) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(AppError::BadRequest("Customer is not an object".to_string())),
            Err(e) => Err(AppError::Internal(e.into())),
        }
    }
}

fn address_to_remote(addr: &Address) -> Map<String, Value> {
    let mut out = Map::new();
    put_text(&mut out, "Line1", addr.line1.as_deref());
    put_text(&mut out, "Line2", addr.line2.as_deref());
    put_text(&mut out, "City", addr.city.as_deref());
    put_text(&mut out, "CountrySubDivisionCode", addr.state.as_deref());
    put_text(&mut out, "PostalCode", addr.postal_code.as_deref());
    put_text(&mut out, "Country", addr.country.as_deref());
    out
}

fn address_from_remote(fields: &Map<String, Value>, key: &str) -> Option<Address> {
    fields.get(key)?.as_object()?;
    let at = |leaf: &str| text_at(fields, &format!("/{}/{}", key, leaf));
    let addr = Address {
        line1: at("Line1"),
        line2: at("Line2"),
        city: at("City"),
        state: at("CountrySubDivisionCode"),
        postal_code: at("PostalCode"),
        country: at("Country"),
    };
    addr.is_present().then_some(addr)
}
