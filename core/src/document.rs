//! Structured document records as delivered by the extraction collaborator.
//!
//! RULE: the engine never parses raw text. Anything the extractor could
//! not read arrives here as `None`, never as a guessed value.

use crate::{
    error::{EngineError, EngineResult},
    indicator::{FraudIndicator, IndicatorKind},
    types::{DocumentId, MinorUnits, VendorId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Receipt,
    PurchaseOrder,
    CreditNote,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price: MinorUnits,
    pub amount: MinorUnits,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: i64, unit_price: MinorUnits) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            amount: quantity.saturating_mul(unit_price),
        }
    }

    /// Billed value of the line. Falls back to qty × price when the
    /// extractor left `amount` at zero.
    pub fn billed(&self) -> MinorUnits {
        if self.amount != 0 {
            self.amount
        } else {
            self.quantity.saturating_mul(self.unit_price)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    #[serde(default)]
    pub document_number: String,
    pub document_type: DocumentType,
    pub vendor_id: VendorId,
    #[serde(default)]
    pub vendor_name: Option<String>,
    /// Expense category used to pick the vendor history bucket.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub total_amount: Option<MinorUnits>,
    #[serde(default)]
    pub tax_amount: Option<MinorUnits>,
    #[serde(default)]
    pub subtotal: Option<MinorUnits>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub indicators: Vec<FraudIndicator>,
}

fn default_currency() -> String {
    "USD".into()
}

impl DocumentRecord {
    pub fn new(
        id: impl Into<DocumentId>,
        document_number: impl Into<String>,
        document_type: DocumentType,
        vendor_id: impl Into<VendorId>,
    ) -> Self {
        Self {
            id: id.into(),
            document_number: document_number.into(),
            document_type,
            vendor_id: vendor_id.into(),
            vendor_name: None,
            category: None,
            total_amount: None,
            tax_amount: None,
            subtotal: None,
            currency: default_currency(),
            issue_date: None,
            due_date: None,
            line_items: Vec::new(),
            indicators: Vec::new(),
        }
    }

    pub fn with_total(mut self, total: MinorUnits) -> Self {
        self.total_amount = Some(total);
        self
    }

    pub fn with_issue_date(mut self, date: NaiveDate) -> Self {
        self.issue_date = Some(date);
        self
    }

    pub fn with_indicator(mut self, kind: IndicatorKind) -> Self {
        self.indicators.push(FraudIndicator::new(kind));
        self
    }

    pub fn with_line_item(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self
    }

    /// Reject records that cannot even key a result.
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidInput {
                document_id: self.id.clone(),
                reason: "record id is empty".into(),
            });
        }
        if self.vendor_id.trim().is_empty() {
            return Err(EngineError::InvalidInput {
                document_id: self.id.clone(),
                reason: "vendor reference is empty".into(),
            });
        }
        Ok(())
    }

    /// Total amount if present and non-negative.
    pub fn known_total(&self) -> Option<MinorUnits> {
        self.total_amount.filter(|t| *t >= 0)
    }

    /// Total billed: the stated total, or the sum of line items when the
    /// total could not be read.
    pub fn billed_total(&self) -> MinorUnits {
        self.known_total()
            .unwrap_or_else(|| {
                self.line_items
                    .iter()
                    .map(LineItem::billed)
                    .fold(0, MinorUnits::saturating_add)
            })
    }

    /// Trimmed document number, `None` when blank.
    pub fn number_key(&self) -> Option<&str> {
        let n = self.document_number.trim();
        (!n.is_empty()).then_some(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_requires_id_and_vendor() {
        let ok = DocumentRecord::new("d-1", "INV-1", DocumentType::Invoice, "v-1");
        assert!(ok.validate().is_ok());

        let no_id = DocumentRecord::new("  ", "INV-1", DocumentType::Invoice, "v-1");
        assert!(matches!(no_id.validate(), Err(EngineError::InvalidInput { .. })));

        let no_vendor = DocumentRecord::new("d-2", "INV-1", DocumentType::Invoice, "");
        assert!(matches!(no_vendor.validate(), Err(EngineError::InvalidInput { .. })));
    }

    #[test]
    fn billed_total_falls_back_to_line_items() {
        let doc = DocumentRecord::new("d-1", "INV-1", DocumentType::Invoice, "v-1")
            .with_line_item(LineItem::new("Paper", 10, 250))
            .with_line_item(LineItem::new("Toner", 2, 4_000));
        assert_eq!(doc.billed_total(), 10_500);

        let doc = doc.with_total(11_000);
        assert_eq!(doc.billed_total(), 11_000);
    }

    #[test]
    fn line_item_sum_saturates() {
        let doc = DocumentRecord::new("d-1", "INV-1", DocumentType::Invoice, "v-1")
            .with_line_item(LineItem::new("Hull", 1, i64::MAX))
            .with_line_item(LineItem::new("Paint", 1, 10));
        assert_eq!(doc.billed_total(), i64::MAX);
    }

    #[test]
    fn negative_total_is_not_known() {
        let doc = DocumentRecord::new("d-1", "INV-1", DocumentType::Invoice, "v-1").with_total(-5);
        assert_eq!(doc.known_total(), None);
    }
}
