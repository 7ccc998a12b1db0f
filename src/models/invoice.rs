// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Invoice entity (local shape).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Invoice as stored in a `SyncedRecord`'s fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Invoice {
    /// Remote ID of the billed customer (QuickBooks `CustomerRef`)
    pub customer_remote_id: Option<String>,
    /// Local ID of the billed customer, resolved on pull when known
    pub customer_local_id: Option<String>,
    #[validate(length(max = 21))]
    pub invoice_number: Option<String>,
    pub txn_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default)]
    pub tax_amount: f64,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub status: InvoiceStatus,
    pub private_note: Option<String>,
    pub customer_memo: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub lines: Vec<InvoiceLine>,
}

/// One sales line on an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct InvoiceLine {
    pub description: Option<String>,
    pub amount: f64,
    #[validate(range(min = 0.0))]
    pub quantity: f64,
    pub unit_price: f64,
    /// Remote item ID (QuickBooks `ItemRef`)
    pub item_remote_id: Option<String>,
}

/// Delivery status, derived from QuickBooks `EmailStatus`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Pending,
    Sent,
}

impl InvoiceStatus {
    pub fn from_email_status(email_status: Option<&str>) -> Self {
        match email_status {
            Some("EmailSent") => InvoiceStatus::Sent,
            Some("NeedToSend") => InvoiceStatus::Pending,
            _ => InvoiceStatus::Draft,
        }
    }
}

impl Invoice {
    /// Recompute subtotal and total from the lines.
    pub fn calculate_totals(&mut self) {
        self.subtotal = self.lines.iter().map(|line| line.amount).sum();
        self.total_amount = self.subtotal + self.tax_amount;
    }

    pub fn is_paid(&self) -> bool {
        self.balance <= 0.0
    }

    /// Past due and still carrying a balance.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date.is_some_and(|due| due < today) && !self.is_paid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(amount: f64) -> InvoiceLine {
        InvoiceLine {
            amount,
            quantity: 1.0,
            unit_price: amount,
            ..Default::default()
        }
    }

    #[test]
    fn test_calculate_totals() {
        let mut invoice = Invoice {
            tax_amount: 5.0,
            lines: vec![line(10.0), line(32.5)],
            ..Default::default()
        };
        invoice.calculate_totals();

        assert_eq!(invoice.subtotal, 42.5);
        assert_eq!(invoice.total_amount, 47.5);
    }

    #[test]
    fn test_overdue_requires_balance() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut invoice = Invoice {
            due_date: NaiveDate::from_ymd_opt(2026, 2, 1),
            balance: 100.0,
            ..Default::default()
        };
        assert!(invoice.is_overdue(today));

        invoice.balance = 0.0;
        assert!(invoice.is_paid());
        assert!(!invoice.is_overdue(today));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            InvoiceStatus::from_email_status(Some("EmailSent")),
            InvoiceStatus::Sent
        );
        assert_eq!(
            InvoiceStatus::from_email_status(Some("NeedToSend")),
            InvoiceStatus::Pending
        );
        assert_eq!(InvoiceStatus::from_email_status(None), InvoiceStatus::Draft);
    }
}
