//! Prompt construction for batched bill extraction.
//!
//! The default-value rules live in [`FIELD_RULES`] so the prompt text and the
//! response parser agree on what an unrecoverable field becomes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use super::pdf::ExtractedDocument;

/// Output schema the model must follow, embedded at build time.
pub const RESPONSE_SCHEMA: &str = include_str!("schema/bill-response.v1.json");

/// Identifier of [`RESPONSE_SCHEMA`].
pub const SCHEMA_VERSION: &str = "bill-response.v1";

/// System instruction sent alongside every extraction prompt.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a billing data extraction engine. \
     You read the text of bill and invoice documents and answer with machine-readable JSON only.";

/// A field of an extracted bill record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillField {
    Subject,
    Company,
    Date,
    Amount,
}

impl BillField {
    /// JSON key in the model's reply.
    pub fn key(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Company => "company",
            Self::Date => "date",
            Self::Amount => "amount",
        }
    }
}

/// What a field becomes when the document does not reveal it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultRule {
    Text(&'static str),
    /// The date the run was invoked.
    Today,
    Amount(Decimal),
}

impl DefaultRule {
    /// Render the rule as prompt text.
    fn describe(&self, today: NaiveDate) -> String {
        match self {
            Self::Text(value) => format!("\"{value}\""),
            Self::Today => format!("today's date ({})", today.format("%Y-%m-%d")),
            Self::Amount(value) => format!("{value:.1}"),
        }
    }

    /// The rule as the JSON value the model would have written.
    pub fn value(&self, today: NaiveDate) -> Value {
        match self {
            Self::Text(value) => Value::from(*value),
            Self::Today => Value::from(today.format("%Y-%m-%d").to_string()),
            Self::Amount(value) => Value::from(value.to_string()),
        }
    }
}

/// Extraction instruction plus fallback for one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: BillField,
    /// What to extract, phrased for the model.
    pub instruction: &'static str,
    pub default: DefaultRule,
}

/// Extraction rules in prompt order.
pub static FIELD_RULES: [FieldRule; 4] = [
    FieldRule {
        field: BillField::Subject,
        instruction: "Subject/Description of the bill",
        default: DefaultRule::Text("Unknown"),
    },
    FieldRule {
        field: BillField::Company,
        instruction: "Company name or service provider issuing the bill",
        default: DefaultRule::Text("Unknown"),
    },
    FieldRule {
        field: BillField::Date,
        instruction: "Date the bill is due",
        default: DefaultRule::Today,
    },
    FieldRule {
        field: BillField::Amount,
        instruction: "Total amount to be paid (as a decimal number)",
        default: DefaultRule::Amount(Decimal::ZERO),
    },
];

/// Look up the rule for a field.
pub fn rule_for(field: BillField) -> Option<&'static FieldRule> {
    FIELD_RULES.iter().find(|rule| rule.field == field)
}

/// Build the single extraction prompt covering every document in the batch.
pub fn build_prompt(documents: &[ExtractedDocument], today: NaiveDate) -> String {
    let mut prompt = String::with_capacity(
        RESPONSE_SCHEMA.len() + documents.iter().map(|d| d.text.len() + 64).sum::<usize>() + 1024,
    );

    prompt.push_str(&format!(
        "Analyze these {} bill/invoice document(s) and extract information from each one.\n\n",
        documents.len()
    ));

    prompt.push_str("For each document, extract:\n");
    for (i, rule) in FIELD_RULES.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, rule.instruction));
    }

    prompt.push_str(&format!(
        "\nReturn your response as a JSON array that conforms to this schema ({SCHEMA_VERSION}):\n{}\n",
        RESPONSE_SCHEMA.trim_end()
    ));

    prompt.push_str("\nRules:\n");
    for rule in &FIELD_RULES {
        prompt.push_str(&format!(
            "- If you cannot determine the {} for a document, use {}\n",
            rule.field.key(),
            rule.default.describe(today)
        ));
    }
    prompt.push_str(&format!(
        "- Return exactly one object for each document ({} in total), in the order the documents appear\n",
        documents.len()
    ));
    prompt.push_str("- Return ONLY the JSON array, no additional text or explanation\n");

    for (i, doc) in documents.iter().enumerate() {
        prompt.push_str(&format!(
            "\n--- Document {}: {} ---\n{}\n--- End Document ---\n",
            i + 1,
            doc.file_name,
            doc.text.trim_end()
        ));
    }

    prompt
}
